//! Speech synthesis seam and the espeak-ng subprocess engine.
//!
//! The announcer only depends on [`SpeechSynthesizer`]; the concrete engine
//! shells out to espeak-ng with a randomly selected Spanish voice, killing
//! the process when the silence token fires.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TtsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("failed to launch speech process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("speech process exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// How an utterance ended. Silence is expected control flow, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Completed,
    Silenced,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` aloud; abort promptly when `cancel` fires.
    async fn speak(&self, text: &str, cancel: &CancellationToken)
        -> Result<SpeakOutcome, TtsError>;

    fn available_voices(&self) -> Vec<String>;
}

pub struct EspeakSynthesizer {
    program: String,
    rate: u32,
    voices: Vec<String>,
    rng: Mutex<StdRng>,
}

impl EspeakSynthesizer {
    /// Query the installed voices for the configured language, falling back
    /// to the configured list (and finally the bare language code) so there
    /// is always something to speak with.
    pub async fn load(config: &TtsConfig) -> Self {
        let mut voices = match list_voices(&config.program, &config.language).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => {
                warn!("no installed {} voices found, using configured list", config.language);
                config.voices.clone()
            }
            Err(e) => {
                warn!("could not query {} voices: {e}, using configured list", config.program);
                config.voices.clone()
            }
        };
        if voices.is_empty() {
            voices.push(config.language.clone());
        }
        info!("{} voices available for '{}'", voices.len(), config.language);

        Self {
            program: config.program.clone(),
            rate: config.rate,
            voices,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    fn pick_voice(&self) -> String {
        let mut rng = self.rng.lock().unwrap();
        let idx = rng.random_range(0..self.voices.len());
        self.voices[idx].clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for EspeakSynthesizer {
    async fn speak(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<SpeakOutcome, TtsError> {
        let voice = self.pick_voice();
        debug!(%voice, "selected voice");

        let mut child = Command::new(&self.program)
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(SpeakOutcome::Completed)
                } else {
                    Err(TtsError::Failed(status))
                }
            }
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                info!("speech silenced mid-utterance");
                Ok(SpeakOutcome::Silenced)
            }
        }
    }

    fn available_voices(&self) -> Vec<String> {
        self.voices.clone()
    }
}

/// Parse `espeak-ng --voices=<lang>` output: one voice per line after the
/// header, language code in the second column.
async fn list_voices(program: &str, language: &str) -> std::io::Result<Vec<String>> {
    let output = Command::new(program)
        .arg(format!("--voices={language}"))
        .output()
        .await?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|code| code.starts_with(language))
        .map(str::to_string)
        .collect())
}
