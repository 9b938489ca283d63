pub mod view;

use crate::cli::Args;
use crate::client::{ AgentTransport, GatewayClient };
use crate::export::{ self, ExportFormat };
use crate::gateway::AdkGateway;
use crate::models::chat::SessionConfig;
use crate::orchestrator::ChatOrchestrator;
use crate::prober::HealthProber;
use crate::store::ConversationStore;
use crate::voice::{ InputState, VoiceBridge };
use chrono::Utc;
use log::{ debug, info };
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::{ mpsc, Mutex };

const AGENT_NAME: &str = "Google Maps AI";

const HELP: &str = "\
Commands:
  /new                         start a new conversation
  /list                        list conversations
  /open <id>                   switch to a conversation
  /delete <id>                 delete a conversation
  /export <txt|json|md|csv>    export the current conversation
  /copy                        print the current conversation as text
  /session                     show the current session
  /session <app> <user> <id>   replace the session
  /session random              random user and session ids
  /suggest <n>                 send a suggested query
  /listen                      dictate a message (voice)
  /stop                        stop dictating
  /voice on|off                speak assistant replies
  /mute, /unmute               silence voice output
  /status                      connection and voice status
  /help                        this text
  /quit                        exit
Anything else is sent to the agent. An empty line sends dictated text.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    SendPending,
    New,
    List,
    Open(String),
    Delete(String),
    Export(String),
    Copy,
    ShowSession,
    SetSession(SessionConfig),
    RandomSession,
    Suggest(usize),
    Listen,
    StopListening,
    VoiceOutput(bool),
    Mute(bool),
    Status,
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::SendPending;
    }
    if !line.starts_with('/') {
        return Command::Send(line.to_string());
    }

    let mut words = line[1..].split_whitespace();
    let name = words.next().unwrap_or("").to_lowercase();
    let rest: Vec<&str> = words.collect();
    match (name.as_str(), rest.as_slice()) {
        ("new", []) => Command::New,
        ("list" | "ls", []) => Command::List,
        ("open" | "select", [id]) => Command::Open(id.to_string()),
        ("delete" | "rm", [id]) => Command::Delete(id.to_string()),
        ("export", [format]) => Command::Export(format.to_string()),
        ("copy", []) => Command::Copy,
        ("session", []) => Command::ShowSession,
        ("session", ["random"]) => Command::RandomSession,
        ("session", [app, user, session]) => Command::SetSession(SessionConfig::new(*app, *user, *session)),
        ("suggest", [n]) =>
            match n.parse::<usize>() {
                Ok(n) if (1..=view::SUGGESTED_QUERIES.len()).contains(&n) => Command::Suggest(n),
                _ => Command::Invalid(format!("No suggestion numbered '{}'", n)),
            }
        ("listen", []) => Command::Listen,
        ("stop", []) => Command::StopListening,
        ("voice", ["on"]) => Command::VoiceOutput(true),
        ("voice", ["off"]) => Command::VoiceOutput(false),
        ("mute", []) => Command::Mute(true),
        ("unmute", []) => Command::Mute(false),
        ("status", []) => Command::Status,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        _ => Command::Invalid(format!("Unknown command '{}'. Type /help for commands.", line)),
    }
}

pub struct Outcome {
    pub output: String,
    pub quit: bool,
}

impl Outcome {
    fn say(output: impl Into<String>) -> Self {
        Self { output: output.into(), quit: false }
    }
}

pub struct Terminal {
    orchestrator: Arc<ChatOrchestrator>,
    voice: VoiceBridge,
    export_dir: PathBuf,
    pending_input: Option<String>,
    transcripts_tx: mpsc::UnboundedSender<Option<String>>,
    transcripts_rx: mpsc::UnboundedReceiver<Option<String>>,
}

impl Terminal {
    pub fn new(orchestrator: Arc<ChatOrchestrator>, voice: VoiceBridge, export_dir: PathBuf) -> Self {
        let (transcripts_tx, transcripts_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            voice,
            export_dir,
            pending_input: None,
            transcripts_tx,
            transcripts_rx,
        }
    }

    /// Waits for the result of a `/listen` started earlier. The recognized
    /// text becomes the pending input sent by the next empty line.
    pub async fn next_transcript(&mut self) -> Outcome {
        match self.transcripts_rx.recv().await {
            Some(Some(text)) => {
                let out = format!("Heard: \"{}\" (press Enter to send)", text);
                self.pending_input = Some(text);
                Outcome::say(out)
            }
            Some(None) => Outcome::say("Nothing heard."),
            None => std::future::pending().await,
        }
    }

    fn voice_state(&self) -> Option<(bool, bool)> {
        self.voice.controls().map(|c| (c.is_output_enabled(), c.is_muted()))
    }

    pub fn status_line(&self) -> String {
        view::render_status(self.orchestrator.is_connected(), self.voice_state())
    }

    async fn session_text(&self) -> String {
        let s = self.orchestrator.session().await;
        format!("App: {}\nUser: {}\nSession: {}", s.app_name, s.user_id, s.session_id)
    }

    async fn send(&mut self, text: String) -> Outcome {
        match self.orchestrator.send_message(&text).await {
            Ok(reply) => Outcome::say(view::render_message(&reply, AGENT_NAME)),
            Err(e) => Outcome::say(format!("! {}", e)),
        }
    }

    pub async fn handle(&mut self, command: Command) -> Outcome {
        let store = self.orchestrator.store();
        match command {
            Command::Send(text) => self.send(text).await,
            Command::SendPending =>
                match self.pending_input.take() {
                    Some(text) => self.send(text).await,
                    None => Outcome::say(""),
                }
            Command::Suggest(n) => self.send(view::SUGGESTED_QUERIES[n - 1].to_string()).await,
            Command::New => {
                let mut store = store.lock().await;
                let id = store.create_conversation().id.clone();
                Outcome::say(format!("Started conversation {}\n{}", id, view::render_suggestions()))
            }
            Command::List => {
                let store = store.lock().await;
                Outcome::say(
                    view::render_conversation_list(store.conversations(), store.current_id(), Utc::now())
                )
            }
            Command::Open(id) => {
                let mut store = store.lock().await;
                if store.select_conversation(&id) {
                    Outcome::say(view::render_messages(store.active_messages(), AGENT_NAME))
                } else {
                    Outcome::say(format!("! No conversation '{}'", id))
                }
            }
            Command::Delete(id) => {
                let mut store = store.lock().await;
                if store.delete_conversation(&id) {
                    Outcome::say(format!("Deleted conversation {}", id))
                } else {
                    Outcome::say(format!("! No conversation '{}'", id))
                }
            }
            Command::Export(format) => self.export(&store, &format).await,
            Command::Copy => {
                let store = store.lock().await;
                match store.current() {
                    Some(conversation) => Outcome::say(export::transcript(conversation)),
                    None => Outcome::say("! No conversation selected"),
                }
            }
            Command::ShowSession => Outcome::say(self.session_text().await),
            Command::SetSession(session) => {
                self.orchestrator.set_session(session).await;
                Outcome::say(self.session_text().await)
            }
            Command::RandomSession => {
                let app = self.orchestrator.session().await.app_name;
                self.orchestrator.set_session(SessionConfig::random(app)).await;
                Outcome::say(self.session_text().await)
            }
            Command::Listen =>
                match self.voice.controls() {
                    Some(controls) if controls.input_state() == InputState::Listening => {
                        Outcome::say("! Already listening")
                    }
                    Some(controls) => {
                        let controls = Arc::clone(controls);
                        let transcripts = self.transcripts_tx.clone();
                        tokio::spawn(async move {
                            let _ = transcripts.send(controls.listen().await);
                        });
                        Outcome::say("Listening... (/stop to cancel)")
                    }
                    None => Outcome::say("! Voice input is not available"),
                }
            Command::StopListening =>
                match self.voice.controls() {
                    Some(controls) if controls.stop_listening() => Outcome::say("Stopped listening."),
                    Some(_) => Outcome::say("! Not listening"),
                    None => Outcome::say("! Voice input is not available"),
                }
            Command::VoiceOutput(enabled) =>
                match self.voice.controls() {
                    Some(controls) => {
                        controls.set_output_enabled(enabled);
                        Outcome::say(self.status_line())
                    }
                    None => Outcome::say("! Voice output is not available"),
                }
            Command::Mute(muted) =>
                match self.voice.controls() {
                    Some(controls) => {
                        controls.set_muted(muted);
                        Outcome::say(self.status_line())
                    }
                    None => Outcome::say("! Voice output is not available"),
                }
            Command::Status => Outcome::say(self.status_line()),
            Command::Help => Outcome::say(HELP),
            Command::Quit => Outcome { output: String::new(), quit: true },
            Command::Invalid(message) => Outcome::say(format!("! {}", message)),
        }
    }

    async fn export(&self, store: &Arc<Mutex<ConversationStore>>, format: &str) -> Outcome {
        let format = match format.parse::<ExportFormat>() {
            Ok(f) => f,
            Err(e) => {
                return Outcome::say(format!("! {}", e));
            }
        };
        let file = {
            let store = store.lock().await;
            let Some(conversation) = store.current() else {
                return Outcome::say("! No conversation selected");
            };
            match export::export(conversation, format) {
                Ok(file) => file,
                Err(e) => {
                    return Outcome::say(format!("! {}", e));
                }
            }
        };
        match export::save(&self.export_dir, &file).await {
            Ok(path) => Outcome::say(format!("Saved {}", path.display())),
            Err(e) => Outcome::say(format!("! {}", e)),
        }
    }
}

pub async fn run(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport: Arc<dyn AgentTransport> = Arc::new(GatewayClient::new(&args.gateway_url));
    let prober = HealthProber::spawn(
        Arc::clone(&transport),
        Duration::from_secs(args.health_interval_secs.max(1))
    );

    let store = Arc::new(Mutex::new(ConversationStore::new()));
    store.lock().await.create_conversation();

    let session = SessionConfig::new(&args.app_name, &args.user_id, &args.session_id);
    let adk_endpoint = AdkGateway::new(&args.adk_base_url)
        .map(|gateway| gateway.endpoint())
        .unwrap_or_else(|_| args.adk_base_url.clone());
    let orchestrator = Arc::new(
        ChatOrchestrator::new(transport, store, prober.status(), session, adk_endpoint)
    );

    let voice = VoiceBridge::detect(args);
    let auto_speak = voice
        .controls()
        .map(|controls| {
            controls.spawn_auto_speak(
                orchestrator.subscribe_replies(),
                Duration::from_millis(args.speak_delay_ms)
            )
        });

    let mut terminal = Terminal::new(orchestrator, voice, PathBuf::from(&args.export_dir));
    info!("Chat client using gateway {}", args.gateway_url);

    println!("Welcome to {} ({})", AGENT_NAME, args.gateway_url);
    println!("{}", view::render_suggestions());
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let outcome = tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                terminal.handle(parse_command(&line)).await
            }
            heard = terminal.next_transcript() => heard,
        };
        if !outcome.output.is_empty() {
            println!("{}", outcome.output);
        }
        if outcome.quit {
            break;
        }
    }

    debug!("Shutting down chat client");
    prober.stop();
    if let Some(task) = auto_speak {
        task.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::models::adk::RunRequest;
    use crate::voice::tests::FakeSpeech;
    use crate::voice::VoiceControls;
    use async_trait::async_trait;
    use serde_json::{ json, Value as JsonValue };
    use tokio::sync::watch;

    struct Echo;

    #[async_trait]
    impl AgentTransport for Echo {
        async fn check_health(&self) -> bool {
            true
        }

        async fn run_turn(&self, request: &RunRequest) -> Result<JsonValue, ClientError> {
            let text = request.new_message["parts"][0]["text"].as_str().unwrap_or("").to_string();
            Ok(json!([{ "content": { "role": "model", "parts": [{ "text": format!("echo: {}", text) }] } }]))
        }
    }

    fn terminal(connected: bool) -> (Terminal, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(connected);
        let store = Arc::new(Mutex::new(ConversationStore::new()));
        let orch = Arc::new(
            ChatOrchestrator::new(Arc::new(Echo), store, rx, SessionConfig::default(), "http://localhost:8000")
        );
        let dir = std::env::temp_dir().join(format!("adk-chat-term-{}", uuid::Uuid::new_v4()));
        (Terminal::new(orch, VoiceBridge::Unavailable, dir), tx)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("hello there"), Command::Send("hello there".into()));
        assert_eq!(parse_command("   "), Command::SendPending);
        assert_eq!(parse_command("/open 123"), Command::Open("123".into()));
        assert_eq!(parse_command("/export csv"), Command::Export("csv".into()));
        assert_eq!(parse_command("/session random"), Command::RandomSession);
        assert_eq!(
            parse_command("/session maps bob s_1"),
            Command::SetSession(SessionConfig::new("maps", "bob", "s_1"))
        );
        assert_eq!(parse_command("/voice on"), Command::VoiceOutput(true));
        assert_eq!(parse_command("/suggest 2"), Command::Suggest(2));
        assert!(matches!(parse_command("/suggest 9"), Command::Invalid(_)));
        assert!(matches!(parse_command("/open"), Command::Invalid(_)));
        assert_eq!(parse_command("/QUIT"), Command::Quit);
    }

    #[tokio::test]
    async fn sending_shows_reply() {
        let (mut term, _tx) = terminal(true);
        let out = term.handle(Command::Send("hi".into())).await;
        assert!(out.output.ends_with("Google Maps AI: echo: hi"));
        let out = term.handle(Command::Suggest(2)).await;
        assert!(out.output.ends_with("echo: Find directions to Central Park"));
    }

    #[tokio::test]
    async fn disconnected_send_prints_notice() {
        let (mut term, _tx) = terminal(false);
        let out = term.handle(Command::Send("hi".into())).await;
        assert_eq!(out.output, "! Not connected to the ADK server. Please check your connection.");
        assert!(term.orchestrator.store().lock().await.conversations().is_empty());
    }

    #[tokio::test]
    async fn conversation_management_round_trip() {
        let (mut term, _tx) = terminal(true);
        term.handle(Command::Send("first".into())).await;
        let first = term.orchestrator.store().lock().await.current_id().unwrap().to_string();
        term.handle(Command::New).await;
        term.handle(Command::Send("second".into())).await;

        let out = term.handle(Command::Open(first.clone())).await;
        assert!(out.output.contains("You: first"));
        assert!(!out.output.contains("second"));

        let copy = term.handle(Command::Copy).await;
        assert_eq!(copy.output, "USER: first\n\nASSISTANT: echo: first");

        let out = term.handle(Command::Delete(first)).await;
        assert!(out.output.starts_with("Deleted"));
        let out = term.handle(Command::Copy).await;
        assert_eq!(out.output, "! No conversation selected");
    }

    #[tokio::test]
    async fn export_writes_file_and_rejects_pdf() {
        let (mut term, _tx) = terminal(true);
        term.handle(Command::Send("hi".into())).await;

        let out = term.handle(Command::Export("pdf".into())).await;
        assert_eq!(out.output, "! Unsupported export format: pdf");

        let out = term.handle(Command::Export("md".into())).await;
        assert!(out.output.starts_with("Saved "));
        let path = out.output.trim_start_matches("Saved ").to_string();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("# hi\n\n## User\n\nhi\n"));
        tokio::fs::remove_dir_all(&term.export_dir).await.unwrap();
    }

    #[tokio::test]
    async fn session_commands_replace_session() {
        let (mut term, _tx) = terminal(true);
        let out = term.handle(Command::SetSession(SessionConfig::new("maps", "bob", "s_1"))).await;
        assert_eq!(out.output, "App: maps\nUser: bob\nSession: s_1");
        term.handle(Command::RandomSession).await;
        let session = term.orchestrator.session().await;
        assert_eq!(session.app_name, "maps");
        assert!(session.user_id.starts_with("user_"));
    }

    #[tokio::test]
    async fn voice_commands_without_voice_support() {
        let (mut term, _tx) = terminal(true);
        assert_eq!(term.handle(Command::Listen).await.output, "! Voice input is not available");
        assert_eq!(term.handle(Command::Mute(true)).await.output, "! Voice output is not available");
        assert_eq!(term.handle(Command::Status).await.output, "Connected");
        assert!(term.handle(Command::Quit).await.quit);
    }

    fn with_voice(term: Terminal, backend: Arc<FakeSpeech>) -> (Terminal, Arc<VoiceControls>) {
        let controls = Arc::new(VoiceControls::new(backend, "en-US", "Google"));
        let term = Terminal::new(
            term.orchestrator,
            VoiceBridge::Available(Arc::clone(&controls)),
            term.export_dir
        );
        (term, controls)
    }

    #[tokio::test]
    async fn dictated_text_is_sent_on_empty_line() {
        let (term, _tx) = terminal(true);
        let backend = Arc::new(FakeSpeech::default());
        *backend.transcript.lock().unwrap() = Some(Ok("Find parking".into()));
        let (mut term, _controls) = with_voice(term, backend);

        assert_eq!(term.handle(Command::Listen).await.output, "Listening... (/stop to cancel)");
        let heard = term.next_transcript().await;
        assert_eq!(heard.output, "Heard: \"Find parking\" (press Enter to send)");

        let out = term.handle(parse_command("")).await;
        assert!(out.output.ends_with("echo: Find parking"));
        assert_eq!(term.handle(Command::SendPending).await.output, "");
    }

    #[tokio::test]
    async fn stop_cancels_running_dictation() {
        let (term, _tx) = terminal(true);
        let backend = Arc::new(FakeSpeech { block_recognition: true, ..Default::default() });
        let (mut term, controls) = with_voice(term, backend);

        assert_eq!(term.handle(Command::StopListening).await.output, "! Not listening");
        term.handle(Command::Listen).await;
        while controls.input_state() != InputState::Listening {
            tokio::task::yield_now().await;
        }
        assert_eq!(term.handle(Command::Listen).await.output, "! Already listening");
        assert_eq!(term.handle(parse_command("/stop")).await.output, "Stopped listening.");
        assert_eq!(term.next_transcript().await.output, "Nothing heard.");
        assert_eq!(controls.input_state(), InputState::Idle);
    }
}
