use async_trait::async_trait;
use crate::models::adk::{ HealthResponse, RunRequest };
use log::debug;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("{0}")]
    Agent(String),
}

#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// True when the gateway reports the agent server as reachable. Never fails.
    async fn check_health(&self) -> bool;

    /// Sends one turn and returns the agent's raw event list.
    async fn run_turn(&self, request: &RunRequest) -> Result<JsonValue, ClientError>;
}

/// Talks to the gateway's HTTP surface.
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

#[async_trait]
impl AgentTransport for GatewayClient {
    async fn check_health(&self) -> bool {
        let resp = match self.client.get(self.url("/health")).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Health probe failed: {}", e);
                return false;
            }
        };
        match resp.json::<HealthResponse>().await {
            Ok(health) => health.is_connected(),
            Err(e) => {
                debug!("Health probe returned an unreadable body: {}", e);
                false
            }
        }
    }

    async fn run_turn(&self, request: &RunRequest) -> Result<JsonValue, ClientError> {
        let resp = self.client.post(self.url("/run")).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        let events = resp.json::<JsonValue>().await?;
        if let Some(message) = reported_error(&events) {
            return Err(ClientError::Agent(message));
        }
        Ok(events)
    }
}

/// The gateway's `error` field, when it is set to something meaningful.
/// `null`, `false`, `0` and `""` count as no error.
fn reported_error(body: &JsonValue) -> Option<String> {
    match body.get("error")? {
        JsonValue::Null | JsonValue::Bool(false) => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
