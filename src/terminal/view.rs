use chrono::{ DateTime, Local, Utc };
use crate::models::chat::{ ChatMessage, Conversation, Role };

pub const SUGGESTED_QUERIES: [&str; 4] = [
    "Show me restaurants near Times Square",
    "Find directions to Central Park",
    "What's the traffic like to LAX airport?",
    "Search for gas stations nearby",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Nothing said yet: offer the suggested queries.
    Suggestions,
    Messages,
}

pub fn current_view(messages: &[ChatMessage]) -> View {
    if messages.is_empty() { View::Suggestions } else { View::Messages }
}

pub fn render_suggestions() -> String {
    let mut out = String::from(
        "I can help you find places, get directions, check traffic, and explore the world around you.\n\
         Try one of these (/suggest <n>):\n"
    );
    for (i, query) in SUGGESTED_QUERIES.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, query));
    }
    out
}

pub fn render_message(message: &ChatMessage, agent_name: &str) -> String {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => agent_name,
    };
    format!(
        "[{}] {}: {}",
        message.timestamp.with_timezone(&Local).format("%H:%M"),
        who,
        message.content
    )
}

pub fn render_messages(messages: &[ChatMessage], agent_name: &str) -> String {
    match current_view(messages) {
        View::Suggestions => render_suggestions(),
        View::Messages =>
            messages
                .iter()
                .map(|m| render_message(m, agent_name))
                .collect::<Vec<_>>()
                .join("\n"),
    }
}

/// "Just now", "5m ago", "3h ago", "2d ago", or the date for anything older.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then);
    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        then.with_timezone(&Local).format("%Y-%m-%d").to_string()
    }
}

pub fn render_conversation_list(
    conversations: &[Conversation],
    current: Option<&str>,
    now: DateTime<Utc>
) -> String {
    if conversations.is_empty() {
        return "No conversations yet. Use /new to start one.".to_string();
    }
    conversations
        .iter()
        .map(|c| {
            let marker = if current == Some(c.id.as_str()) { "*" } else { " " };
            format!(
                "{} {}  {}  ({} messages, {})",
                marker,
                c.id,
                c.title,
                c.message_count,
                relative_time(c.timestamp, now)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_status(connected: bool, voice: Option<(bool, bool)>) -> String {
    let mut parts = vec![(if connected { "Connected" } else { "Disconnected" }).to_string()];
    if let Some((output_enabled, muted)) = voice {
        if output_enabled {
            parts.push("Voice Output Enabled".to_string());
        }
        if !muted {
            parts.push("Audio Unmuted".to_string());
        }
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn suggestions_give_way_to_messages() {
        let mut conv = Conversation::new();
        assert_eq!(current_view(&conv.messages), View::Suggestions);
        assert!(render_messages(&conv.messages, "Agent").contains("Find directions to Central Park"));

        conv.push(ChatMessage::user("hi"));
        assert_eq!(current_view(&conv.messages), View::Messages);
        let rendered = render_messages(&conv.messages, "Agent");
        assert!(rendered.ends_with("You: hi"));
        assert!(!rendered.contains("Central Park"));
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::seconds(20), now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        let old = now - Duration::days(30);
        assert_eq!(relative_time(old, now), old.with_timezone(&Local).format("%Y-%m-%d").to_string());
    }

    #[test]
    fn list_marks_current_conversation() {
        let a = Conversation::new();
        let b = Conversation::new();
        let out = render_conversation_list(&[b.clone(), a.clone()], Some(&a.id), Utc::now());
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("  "));
        assert!(lines[1].starts_with("* "));
    }

    #[test]
    fn status_line_shows_voice_indicators() {
        assert_eq!(render_status(true, None), "Connected");
        assert_eq!(render_status(false, Some((true, false))), "Disconnected | Voice Output Enabled | Audio Unmuted");
        assert_eq!(render_status(true, Some((false, true))), "Connected");
    }
}
