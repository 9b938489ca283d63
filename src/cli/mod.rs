use clap::Parser;
use std::fmt;
use std::str::FromStr;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// What to run: the HTTP gateway (serve) or the terminal chat client (chat)
    #[arg(long, env = "ADK_CHAT_MODE", default_value = "serve")]
    pub mode: String,

    // --- Gateway Args ---
    /// Host address and port for the gateway to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Reserved path prefix. Requests under it are answered by the gateway or forwarded to the ADK server.
    #[arg(long, env = "ROUTE_PREFIX", default_value = "/api/adk")]
    pub route_prefix: String,

    /// Base URL of the remote ADK agent server.
    #[arg(long, env = "ADK_BASE_URL", default_value = "http://localhost:8000")]
    pub adk_base_url: String,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format) for serving HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for serving HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    // --- Client Args ---
    /// Gateway URL the chat client talks to (including the reserved prefix).
    #[arg(long, env = "GATEWAY_URL", default_value = "http://127.0.0.1:3000/api/adk")]
    pub gateway_url: String,

    /// ADK app name (the agent folder on the ADK server)
    #[arg(long, env = "ADK_APP_NAME", default_value = "google-map-adk")]
    pub app_name: String,

    #[arg(long, env = "ADK_USER_ID", default_value = "user")]
    pub user_id: String,

    #[arg(long, env = "ADK_SESSION_ID", default_value = "s_123")]
    pub session_id: String,

    /// Seconds between gateway health probes.
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value = "30")]
    pub health_interval_secs: u64,

    /// Directory exported conversations are written to.
    #[arg(long, env = "EXPORT_DIR", default_value = ".")]
    pub export_dir: String,

    // --- Voice Args ---
    /// Speak assistant replies from startup.
    #[arg(long, env = "VOICE_OUTPUT", default_value = "false")]
    pub voice_output: bool,

    /// Delay in milliseconds between an assistant reply arriving and it being spoken.
    #[arg(long, env = "SPEAK_DELAY_MS", default_value = "500")]
    pub speak_delay_ms: u64,

    /// Command that records one utterance and prints its transcript on stdout.
    #[arg(long, env = "SPEECH_RECOGNIZE_CMD")]
    pub speech_recognize_cmd: Option<String>,

    /// Command that reads text on stdin and speaks it.
    #[arg(long, env = "SPEECH_SYNTHESIZE_CMD")]
    pub speech_synthesize_cmd: Option<String>,

    /// Locale used for recognition and voice selection.
    #[arg(long, env = "SPEECH_LANG", default_value = "en-US")]
    pub speech_lang: String,

    /// Voices offered by the synthesizer, as `name=lang` pairs separated by commas
    /// (e.g. "Google US English=en-US,Alex=en-US").
    #[arg(long, env = "SPEECH_VOICES", default_value = "")]
    pub speech_voices: String,

    /// Substring of the voice name preferred among voices matching the locale.
    #[arg(long, env = "PREFERRED_VOICE", default_value = "Google")]
    pub preferred_voice: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Chat,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRunModeError {
    message: String,
}

impl fmt::Display for ParseRunModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseRunModeError {}

impl FromStr for RunMode {
    type Err = ParseRunModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serve" | "gateway" => Ok(RunMode::Serve),
            "chat" | "client" => Ok(RunMode::Chat),
            _ =>
                Err(ParseRunModeError {
                    message: format!("Invalid run mode: '{}' (expected serve or chat)", s),
                }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Serve => write!(f, "serve"),
            RunMode::Chat => write!(f, "chat"),
        }
    }
}
