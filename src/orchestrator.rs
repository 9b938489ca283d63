use crate::client::AgentTransport;
use crate::models::adk::{ final_response_text, AdkContent, AdkEvent, RunRequest };
use crate::models::chat::{ ChatMessage, Role, SessionConfig };
use crate::store::ConversationStore;
use log::{ debug, error, info, warn };
use serde_json::Value as JsonValue;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{ broadcast, watch, Mutex, RwLock };

pub const NO_RESPONSE_TEXT: &str = "No response received from agent.";
const REPLY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Not connected to the ADK server. Please check your connection.")]
    Disconnected,

    #[error("Message is empty")]
    EmptyMessage,
}

/// Diagnostic shown in place of a reply when a turn fails.
pub fn failure_text(adk_endpoint: &str) -> String {
    format!(
        "Error: Failed to communicate with ADK server. Please ensure the server is running on {}",
        adk_endpoint
    )
}

/// Reply text for a `/run` result: the last model text, or the fallback.
/// Anything other than an array counts as "no response"; array elements that
/// are not event objects are skipped.
pub fn response_text(events: &JsonValue) -> String {
    let parsed: Vec<AdkEvent> = match events.as_array() {
        Some(items) =>
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
        None => Vec::new(),
    };
    final_response_text(&parsed).unwrap_or_else(|| NO_RESPONSE_TEXT.to_string())
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one user turn: optimistic user message, remote call, reply or
/// diagnostic. Replies are also published to subscribers.
pub struct ChatOrchestrator {
    transport: Arc<dyn AgentTransport>,
    store: Arc<Mutex<ConversationStore>>,
    session: RwLock<SessionConfig>,
    connected: watch::Receiver<bool>,
    loading: AtomicBool,
    replies: broadcast::Sender<ChatMessage>,
    adk_endpoint: String,
}

impl ChatOrchestrator {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        store: Arc<Mutex<ConversationStore>>,
        connected: watch::Receiver<bool>,
        session: SessionConfig,
        adk_endpoint: impl Into<String>
    ) -> Self {
        let (replies, _) = broadcast::channel(REPLY_CHANNEL_CAPACITY);
        Self {
            transport,
            store,
            session: RwLock::new(session),
            connected,
            loading: AtomicBool::new(false),
            replies,
            adk_endpoint: adk_endpoint.into(),
        }
    }

    pub fn store(&self) -> Arc<Mutex<ConversationStore>> {
        Arc::clone(&self.store)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn session(&self) -> SessionConfig {
        self.session.read().await.clone()
    }

    pub async fn set_session(&self, session: SessionConfig) {
        info!(
            "Session set to app={} user={} session={}",
            session.app_name,
            session.user_id,
            session.session_id
        );
        *self.session.write().await = session;
    }

    /// Every assistant message appended by `send_message`, in order.
    pub fn subscribe_replies(&self) -> broadcast::Receiver<ChatMessage> {
        self.replies.subscribe()
    }

    /// Returns the assistant message appended for this turn (a real reply or
    /// the failure diagnostic). Rejected sends leave the store untouched.
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.is_connected() {
            warn!("Send rejected: gateway disconnected");
            return Err(ChatError::Disconnected);
        }

        let conversation_id = self.store.lock().await.append_message(ChatMessage::user(text));
        let _loading = LoadingGuard::set(&self.loading);

        let session = self.session().await;
        let request = RunRequest {
            app_name: session.app_name,
            user_id: session.user_id,
            session_id: session.session_id,
            new_message: serde_json::json!(AdkContent::user_text(text)),
        };

        let reply = match self.transport.run_turn(&request).await {
            Ok(events) => {
                debug!("Received events: {}", events);
                ChatMessage::assistant(response_text(&events))
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                ChatMessage::with_prefix("error", Role::Assistant, failure_text(&self.adk_endpoint))
            }
        };

        self.store.lock().await.append_to(&conversation_id, reply.clone());
        let _ = self.replies.send(reply.clone());
        Ok(reply)
    }
}
