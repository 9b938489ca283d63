use async_trait::async_trait;
use crate::cli::Args;
use super::{ parse_voices, SpeechBackend, Utterance, Voice, VoiceError };
use log::{ debug, warn };
use std::path::{ Path, PathBuf };
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{ Child, Command };
use tokio::sync::Notify;

/// Speech through external programs: the recognizer prints one transcript on
/// stdout, the synthesizer reads the text to speak on stdin. Both get the
/// locale in `SPEECH_LANG`. The synthesizer also gets `SPEECH_RATE`,
/// `SPEECH_PITCH` and `SPEECH_VOLUME`, plus `--voice <name>` when a voice was
/// chosen.
pub struct CommandSpeech {
    recognize_cmd: Vec<String>,
    synthesize_cmd: Vec<String>,
    voices: Vec<Voice>,
    speaking: Mutex<Option<Child>>,
    stop_recognition: Notify,
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolves a program name the way a shell would: paths are checked directly,
/// bare names are searched on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

impl CommandSpeech {
    pub fn new(recognize_cmd: &str, synthesize_cmd: &str, voices: Vec<Voice>) -> Option<Self> {
        let Some(recognize_cmd) = shlex::split(recognize_cmd) else {
            warn!("Unbalanced quotes in speech recognizer command: {}", recognize_cmd);
            return None;
        };
        let Some(synthesize_cmd) = shlex::split(synthesize_cmd) else {
            warn!("Unbalanced quotes in speech synthesizer command: {}", synthesize_cmd);
            return None;
        };
        for cmd in [&recognize_cmd, &synthesize_cmd] {
            let program = cmd.first()?;
            if find_program(program).is_none() {
                warn!("Speech program '{}' not found", program);
                return None;
            }
        }
        Some(Self {
            recognize_cmd,
            synthesize_cmd,
            voices,
            speaking: Mutex::new(None),
            stop_recognition: Notify::new(),
        })
    }

    pub fn from_args(args: &Args) -> Option<Self> {
        let recognize = args.speech_recognize_cmd.as_deref()?;
        let synthesize = args.speech_synthesize_cmd.as_deref()?;
        Self::new(recognize, synthesize, parse_voices(&args.speech_voices))
    }

    fn command(parts: &[String]) -> Command {
        let mut cmd = Command::new(&parts[0]);
        cmd.args(&parts[1..]);
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SpeechBackend for CommandSpeech {
    async fn recognize(&self, lang: &str) -> Result<String, VoiceError> {
        let program = self.recognize_cmd.join(" ");
        let child = Self::command(&self.recognize_cmd)
            .env("SPEECH_LANG", lang)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| VoiceError::Spawn { command: program.clone(), source })?;

        // Dropping the output future drops the child, which kills it.
        let output = tokio::select! {
            out = child.wait_with_output() => out.map_err(|source| VoiceError::Spawn {
                command: program.clone(),
                source,
            })?,
            _ = self.stop_recognition.notified() => return Err(VoiceError::Cancelled),
        };
        if !output.status.success() {
            return Err(VoiceError::Exit { command: program, status: output.status });
        }
        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(VoiceError::NoSpeech);
        }
        debug!("Recognized: {}", transcript);
        Ok(transcript)
    }

    // notify_one keeps a permit, so a cancel that lands before `recognize`
    // starts waiting still stops it.
    fn cancel_recognition(&self) {
        self.stop_recognition.notify_one();
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), VoiceError> {
        let program = self.synthesize_cmd.join(" ");
        let mut cmd = Self::command(&self.synthesize_cmd);
        cmd.env("SPEECH_LANG", &utterance.lang)
            .env("SPEECH_RATE", utterance.rate.to_string())
            .env("SPEECH_PITCH", utterance.pitch.to_string())
            .env("SPEECH_VOLUME", utterance.volume.to_string());
        if let Some(voice) = &utterance.voice {
            cmd.arg("--voice").arg(&voice.name);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| VoiceError::Spawn { command: program.clone(), source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(utterance.text.as_bytes()).await
                .map_err(|source| VoiceError::Spawn { command: program.clone(), source })?;
        }

        if let Ok(mut speaking) = self.speaking.lock() {
            *speaking = Some(child);
        }
        Ok(())
    }

    fn cancel_speech(&self) {
        if let Ok(mut speaking) = self.speaking.lock() {
            if let Some(mut child) = speaking.take() {
                let _ = child.start_kill();
            }
        }
    }
}
