use crate::models::adk::{ AdkRunRequest, ConnectionState, HealthResponse, RunRequest };
use log::{ debug, info, warn };
use reqwest::{ Method, StatusCode };
use serde_json::{ json, Value as JsonValue };
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid ADK server URL '{0}': {1}")]
    InvalidBaseUrl(String, url::ParseError),

    #[error("ADK server URL '{0}' cannot carry path segments")]
    OpaqueBaseUrl(String),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned {0}")]
    Unhealthy(u16),

    #[error("ADK Server responded with status: {status} - {body}")]
    Status {
        status: u16,
        body: String,
    },
}

/// A response relayed from the ADK server without interpretation.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct AdkGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl AdkGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let mut parsed = Url::parse(base_url).map_err(|e|
            GatewayError::InvalidBaseUrl(base_url.to_string(), e)
        )?;
        if parsed.cannot_be_a_base() {
            return Err(GatewayError::OpaqueBaseUrl(base_url.to_string()));
        }
        // Joining relative paths onto a base without a trailing slash drops its last segment.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host and port of the ADK server, for human-readable messages.
    pub fn endpoint(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => self.base_url.to_string(),
        }
    }

    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Probes `/list-apps`. Failures are reported in the returned value, never as an error.
    pub async fn check_health(&self) -> HealthResponse {
        match self.list_apps().await {
            Ok((status, apps)) => {
                debug!("ADK server reachable ({}), apps: {}", status, apps);
                HealthResponse {
                    status: ConnectionState::Connected,
                    adk_server_status: Some(status.as_u16()),
                    message: "ADK server is reachable".to_string(),
                    available_apps: Some(apps),
                    error: None,
                }
            }
            Err(e) => {
                warn!("ADK health check failed: {}", e);
                HealthResponse {
                    status: ConnectionState::Disconnected,
                    adk_server_status: None,
                    message: format!("ADK server is not reachable on {}: {}", self.endpoint(), e),
                    available_apps: None,
                    error: Some("Cannot reach ADK server".to_string()),
                }
            }
        }
    }

    async fn list_apps(&self) -> Result<(StatusCode, JsonValue), GatewayError> {
        let resp = self.client.get(self.url_for(&["list-apps"])).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Unhealthy(status.as_u16()));
        }
        let apps = resp.json::<JsonValue>().await?;
        Ok((status, apps))
    }

    /// Creates the remote session if needed. The ADK server tolerates repeated
    /// creation, so any failure here is logged and otherwise ignored.
    pub async fn ensure_session(&self, app_name: &str, user_id: &str, session_id: &str) {
        let url = self.url_for(&["apps", app_name, "users", user_id, "sessions", session_id]);
        match self.client.post(url).json(&json!({ "state": {} })).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Session {}/{}/{} created", app_name, user_id, session_id);
            }
            Ok(resp) => {
                info!(
                    "Session creation note: {}/{}/{} returned {} (may already exist)",
                    app_name,
                    user_id,
                    session_id,
                    resp.status()
                );
            }
            Err(e) => {
                info!("Session creation note: {}", e);
            }
        }
    }

    /// Runs one turn and returns the ADK event list untouched.
    pub async fn run_turn(&self, request: &RunRequest) -> Result<JsonValue, GatewayError> {
        self.ensure_session(&request.app_name, &request.user_id, &request.session_id).await;

        let payload = AdkRunRequest::from(request);
        let resp = self.client.post(self.url_for(&["run"])).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json::<JsonValue>().await?)
    }

    /// Relays an arbitrary request to `<base>/<path>`.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        content_type: Option<&str>,
        body: Vec<u8>
    ) -> Result<ForwardedResponse, GatewayError> {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let mut url = self.url_for(&segments);
        url.set_query(query);
        debug!("Forwarding {} {}", method, url);

        let mut req = self.client.request(method, url).body(body);
        if let Some(ct) = content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, ct);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.bytes().await?.to_vec();
        Ok(ForwardedResponse { status, content_type, body })
    }
}
