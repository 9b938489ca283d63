use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

pub const MODEL_ROLE: &str = "model";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdkPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdkContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<AdkPart>,
}

impl AdkContent {
    /// A single-part user turn.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![AdkPart { text: Some(text.into()) }],
        }
    }

    fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .find(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdkEvent {
    #[serde(default)]
    pub content: Option<AdkContent>,
}

/// Text of the last model-authored event that carries any text, taking the
/// first text part of that event.
pub fn final_response_text(events: &[AdkEvent]) -> Option<String> {
    events
        .iter()
        .filter_map(|event| event.content.as_ref())
        .filter(|content| content.role.as_deref() == Some(MODEL_ROLE))
        .filter_map(|content| content.first_text())
        .last()
        .map(str::to_owned)
}

/// `POST /run` body as sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: JsonValue,
}

/// `POST /run` body as expected by the ADK server.
#[derive(Debug, Serialize)]
pub struct AdkRunRequest<'a> {
    pub app_name: &'a str,
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub new_message: &'a JsonValue,
}

impl<'a> From<&'a RunRequest> for AdkRunRequest<'a> {
    fn from(req: &'a RunRequest) -> Self {
        Self {
            app_name: &req.app_name,
            user_id: &req.user_id,
            session_id: &req.session_id,
            new_message: &req.new_message,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Body of `GET /health`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adk_server_status: Option<u16>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_apps: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionState::Connected
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}
