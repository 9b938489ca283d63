use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use std::fmt;
use std::sync::atomic::{ AtomicI64, Ordering };
use uuid::Uuid;

pub const NEW_CONVERSATION_TITLE: &str = "New Conversation";
const TITLE_WORDS: usize = 6;
const TITLE_MAX_CHARS: usize = 30;

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Returns the current time in milliseconds, bumped past the last value handed
/// out so two ids minted in the same millisecond still differ.
pub fn next_id_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match
            LAST_ID_MILLIS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {
                return next;
            }
            Err(actual) => {
                last = actual;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// "User" / "Assistant", as used in headings.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_prefix(role.as_str(), role, content)
    }

    /// Builds a message whose id uses `prefix` instead of the role name.
    pub fn with_prefix(prefix: &str, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("{}-{}", prefix, next_id_millis()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: next_id_millis().to_string(),
            title: NEW_CONVERSATION_TITLE.to_string(),
            last_message: String::new(),
            timestamp: Utc::now(),
            messages: Vec::new(),
            message_count: 0,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = conversation_title(&message.content);
        }
        self.last_message = message.content.clone();
        self.timestamp = Utc::now();
        self.messages.push(message);
        self.message_count = self.messages.len();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// First six words of the opening message, cut to 30 characters with an ellipsis.
pub fn conversation_title(first_message: &str) -> String {
    let words = first_message.split(' ').take(TITLE_WORDS).collect::<Vec<_>>().join(" ");
    if words.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = words.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        words
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionConfig {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>
    ) -> Self {
        Self {
            app_name: app_name.into().trim().to_string(),
            user_id: user_id.into().trim().to_string(),
            session_id: session_id.into().trim().to_string(),
        }
    }

    /// Same app, fresh random user and session ids.
    pub fn random(app_name: impl Into<String>) -> Self {
        Self::new(
            app_name,
            format!("user_{}", random_suffix()),
            format!("session_{}", random_suffix())
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("google-map-adk", "user", "s_123")
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..9].to_string()
}
