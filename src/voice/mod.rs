pub mod command;

use async_trait::async_trait;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Role };
use log::{ debug, error, info, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DEFAULT_SPEAK_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}")]
    Exit {
        command: String,
        status: std::process::ExitStatus,
    },

    #[error("No speech was recognized")]
    NoSpeech,

    #[error("Recognition was cancelled")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, lang: impl Into<String>, voice: Option<Voice>) -> Self {
        Self {
            text: text.into(),
            lang: lang.into(),
            voice,
            rate: 0.9,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Records a single utterance and returns its transcript.
    async fn recognize(&self, lang: &str) -> Result<String, VoiceError>;

    /// Aborts an in-flight `recognize`, which then returns `Cancelled`.
    fn cancel_recognition(&self);

    fn voices(&self) -> Vec<Voice>;

    /// Starts speaking and returns without waiting for playback to finish.
    async fn speak(&self, utterance: Utterance) -> Result<(), VoiceError>;

    /// Stops whatever is currently being spoken.
    fn cancel_speech(&self);
}

/// Parses `name=lang` pairs separated by commas. Entries without `=` are skipped.
pub fn parse_voices(spec: &str) -> Vec<Voice> {
    spec.split(',')
        .filter_map(|entry| {
            let (name, lang) = entry.split_once('=')?;
            let (name, lang) = (name.trim(), lang.trim());
            if name.is_empty() || lang.is_empty() {
                return None;
            }
            Some(Voice { name: name.to_string(), lang: lang.to_string() })
        })
        .collect()
}

/// A voice whose language shares the locale's prefix, preferring one whose
/// name contains `preferred`.
pub fn select_voice<'a>(voices: &'a [Voice], locale: &str, preferred: &str) -> Option<&'a Voice> {
    let prefix = locale.split(['-', '_']).next().unwrap_or(locale);
    let matches_lang = |v: &&Voice| v.lang.starts_with(prefix);
    voices
        .iter()
        .filter(matches_lang)
        .find(|v| !preferred.is_empty() && v.name.contains(preferred))
        .or_else(|| voices.iter().find(matches_lang))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Listening,
}

pub struct VoiceControls {
    backend: Arc<dyn SpeechBackend>,
    lang: String,
    preferred_voice: String,
    listening: AtomicBool,
    output_enabled: AtomicBool,
    muted: AtomicBool,
}

impl VoiceControls {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        lang: impl Into<String>,
        preferred_voice: impl Into<String>
    ) -> Self {
        Self {
            backend,
            lang: lang.into(),
            preferred_voice: preferred_voice.into(),
            listening: AtomicBool::new(false),
            output_enabled: AtomicBool::new(false),
            muted: AtomicBool::new(false),
        }
    }

    pub fn input_state(&self) -> InputState {
        if self.listening.load(Ordering::SeqCst) { InputState::Listening } else { InputState::Idle }
    }

    pub fn is_output_enabled(&self) -> bool {
        self.output_enabled.load(Ordering::SeqCst)
    }

    pub fn set_output_enabled(&self, enabled: bool) {
        self.output_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn should_speak(&self) -> bool {
        self.is_output_enabled() && !self.is_muted()
    }

    /// Single-shot recognition. Returns the transcript, or `None` when nothing
    /// was recognized, recognition failed, or a recognition is already running.
    pub async fn listen(&self) -> Option<String> {
        if self.listening.swap(true, Ordering::SeqCst) {
            debug!("Already listening");
            return None;
        }
        let result = self.backend.recognize(&self.lang).await;
        self.listening.store(false, Ordering::SeqCst);
        match result {
            Ok(transcript) if !transcript.trim().is_empty() => Some(transcript.trim().to_string()),
            Ok(_) => None,
            Err(VoiceError::Cancelled) => {
                debug!("Speech recognition stopped");
                None
            }
            Err(e) => {
                error!("Speech recognition error: {}", e);
                None
            }
        }
    }

    /// Cancels the running recognition. `listen` goes back to idle once the
    /// recognizer has actually stopped.
    pub fn stop_listening(&self) -> bool {
        if !self.listening.load(Ordering::SeqCst) {
            return false;
        }
        self.backend.cancel_recognition();
        true
    }

    /// Speaks `text` if output is enabled and unmuted, interrupting anything
    /// already being spoken. Returns whether speech was started.
    pub async fn speak(&self, text: &str) -> bool {
        if !self.should_speak() {
            return false;
        }
        self.backend.cancel_speech();
        let voices = self.backend.voices();
        let voice = select_voice(&voices, &self.lang, &self.preferred_voice).cloned();
        match self.backend.speak(Utterance::new(text, self.lang.as_str(), voice)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Speech synthesis failed: {}", e);
                false
            }
        }
    }

    /// Speaks each assistant reply `delay` after it arrives, provided output
    /// is enabled and unmuted both when it arrives and when the delay ends.
    pub fn spawn_auto_speak(
        self: &Arc<Self>,
        mut replies: broadcast::Receiver<ChatMessage>,
        delay: Duration
    ) -> JoinHandle<()> {
        let controls = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match replies.recv().await {
                    Ok(message) => {
                        if message.role != Role::Assistant || !controls.should_speak() {
                            continue;
                        }
                        tokio::time::sleep(delay).await;
                        controls.speak(&message.content).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Auto-speak skipped {} replies", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        })
    }
}

pub enum VoiceBridge {
    Available(Arc<VoiceControls>),
    Unavailable,
}

impl VoiceBridge {
    /// Speech is available only when both a recognizer and a synthesizer
    /// command are configured and can be found.
    pub fn detect(args: &Args) -> Self {
        match command::CommandSpeech::from_args(args) {
            Some(backend) => {
                info!("Voice controls available (lang {})", args.speech_lang);
                let controls = VoiceControls::new(
                    Arc::new(backend),
                    args.speech_lang.clone(),
                    args.preferred_voice.clone()
                );
                controls.set_output_enabled(args.voice_output);
                VoiceBridge::Available(Arc::new(controls))
            }
            None => {
                info!("Voice controls unavailable: no usable recognizer/synthesizer commands");
                VoiceBridge::Unavailable
            }
        }
    }

    pub fn controls(&self) -> Option<&Arc<VoiceControls>> {
        match self {
            VoiceBridge::Available(controls) => Some(controls),
            VoiceBridge::Unavailable => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    pub(crate) struct FakeSpeech {
        pub transcript: Mutex<Option<Result<String, ()>>>,
        pub spoken: Mutex<Vec<Utterance>>,
        pub cancels: Mutex<usize>,
        pub voices: Vec<Voice>,
        pub block_recognition: bool,
        pub stop: Notify,
    }

    #[async_trait]
    impl SpeechBackend for FakeSpeech {
        async fn recognize(&self, _lang: &str) -> Result<String, VoiceError> {
            if self.block_recognition {
                self.stop.notified().await;
                return Err(VoiceError::Cancelled);
            }
            match self.transcript.lock().unwrap().take() {
                Some(Ok(t)) => Ok(t),
                Some(Err(())) => Err(VoiceError::NoSpeech),
                None => Ok(String::new()),
            }
        }

        fn cancel_recognition(&self) {
            self.stop.notify_one();
        }

        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        async fn speak(&self, utterance: Utterance) -> Result<(), VoiceError> {
            self.spoken.lock().unwrap().push(utterance);
            Ok(())
        }

        fn cancel_speech(&self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    fn voice(name: &str, lang: &str) -> Voice {
        Voice { name: name.into(), lang: lang.into() }
    }

    fn controls(backend: Arc<FakeSpeech>) -> Arc<VoiceControls> {
        Arc::new(VoiceControls::new(backend, "en-US", "Google"))
    }

    #[test]
    fn parses_voice_list() {
        let voices = parse_voices("Google US English=en-US, Alex=en-US,broken,=fr");
        assert_eq!(voices, vec![voice("Google US English", "en-US"), voice("Alex", "en-US")]);
    }

    #[test]
    fn prefers_named_voice_matching_language() {
        let voices = vec![
            voice("Thomas", "fr-FR"),
            voice("Alex", "en-US"),
            voice("Google UK English", "en-GB"),
        ];
        assert_eq!(select_voice(&voices, "en-US", "Google").unwrap().name, "Google UK English");
        assert_eq!(select_voice(&voices, "en-US", "Samantha").unwrap().name, "Alex");
        assert_eq!(select_voice(&voices, "de-DE", "Google"), None);
        assert_eq!(select_voice(&voices, "fr", "").unwrap().name, "Thomas");
    }

    #[tokio::test]
    async fn speaks_only_when_enabled_and_unmuted() {
        let backend = Arc::new(FakeSpeech::default());
        let controls = controls(backend.clone());

        let combos = [
            (false, false, false),
            (false, true, false),
            (true, true, false),
            (true, false, true),
        ];
        for (enabled, muted, expect) in combos {
            controls.set_output_enabled(enabled);
            controls.set_muted(muted);
            assert_eq!(controls.speak("hello").await, expect, "enabled={} muted={}", enabled, muted);
        }
        assert_eq!(backend.spoken.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn speaking_cancels_previous_utterance_and_picks_voice() {
        let backend = Arc::new(FakeSpeech {
            voices: vec![voice("Alex", "en-US"), voice("Google US English", "en-US")],
            ..Default::default()
        });
        let controls = controls(backend.clone());
        controls.set_output_enabled(true);
        controls.speak("one").await;
        controls.speak("two").await;

        assert_eq!(*backend.cancels.lock().unwrap(), 2);
        let spoken = backend.spoken.lock().unwrap();
        assert_eq!(spoken[1].text, "two");
        assert_eq!(spoken[1].voice.as_ref().unwrap().name, "Google US English");
        assert_eq!(spoken[1].rate, 0.9);
        assert_eq!(spoken[1].volume, 0.8);
    }

    #[tokio::test]
    async fn listen_returns_transcript_and_goes_idle() {
        let backend = Arc::new(FakeSpeech::default());
        *backend.transcript.lock().unwrap() = Some(Ok(" Find parking ".into()));
        let controls = controls(backend);
        assert_eq!(controls.listen().await.as_deref(), Some("Find parking"));
        assert_eq!(controls.input_state(), InputState::Idle);
    }

    #[tokio::test]
    async fn recognition_error_is_swallowed() {
        let backend = Arc::new(FakeSpeech::default());
        *backend.transcript.lock().unwrap() = Some(Err(()));
        let controls = controls(backend);
        assert_eq!(controls.listen().await, None);
        assert_eq!(controls.input_state(), InputState::Idle);
    }

    #[tokio::test]
    async fn stop_listening_cancels_recognition() {
        let backend = Arc::new(FakeSpeech { block_recognition: true, ..Default::default() });
        let controls = controls(backend);
        let listener = {
            let controls = Arc::clone(&controls);
            tokio::spawn(async move { controls.listen().await })
        };
        while controls.input_state() != InputState::Listening {
            tokio::task::yield_now().await;
        }
        assert!(controls.stop_listening());
        assert_eq!(listener.await.unwrap(), None);
        assert_eq!(controls.input_state(), InputState::Idle);
    }

    #[test]
    fn stop_listening_when_idle_does_nothing() {
        let backend = Arc::new(FakeSpeech::default());
        let controls = controls(backend);
        assert!(!controls.stop_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_speak_waits_then_speaks_assistant_replies() {
        let backend = Arc::new(FakeSpeech::default());
        let controls = controls(backend.clone());
        controls.set_output_enabled(true);
        let (tx, rx) = broadcast::channel(4);
        let task = controls.spawn_auto_speak(rx, DEFAULT_SPEAK_DELAY);

        tx.send(ChatMessage::user("ignored")).unwrap();
        tx.send(ChatMessage::assistant("Turn left")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backend.spoken.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let spoken: Vec<String> = backend.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect();
        assert_eq!(spoken, vec!["Turn left".to_string()]);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_speak_respects_mute_at_speaking_time() {
        let backend = Arc::new(FakeSpeech::default());
        let controls = controls(backend.clone());
        controls.set_output_enabled(true);
        let (tx, rx) = broadcast::channel(4);
        let _task = controls.spawn_auto_speak(rx, DEFAULT_SPEAK_DELAY);

        tx.send(ChatMessage::assistant("Turn left")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        controls.set_muted(true);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(backend.spoken.lock().unwrap().is_empty());
    }
}
