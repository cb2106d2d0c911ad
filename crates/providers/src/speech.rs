//! Speech engine backed by external commands.
//!
//! Transcription and synthesis are delegated to whatever programs the user
//! configures (a local whisper build, a TTS CLI, ...). `{input}` and
//! `{output}` placeholders in the command templates are replaced with
//! shell-quoted file paths.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use mindthread_core::error::SpeechError;
use mindthread_core::speech::SpeechEngine;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs configured shell commands for speech work.
pub struct CommandSpeechEngine {
    transcribe_command: Option<String>,
    synthesize_command: Option<String>,
    output_dir: PathBuf,
}

impl CommandSpeechEngine {
    pub fn new(
        transcribe_command: Option<String>,
        synthesize_command: Option<String>,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            transcribe_command,
            synthesize_command,
            output_dir: output_dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Build from the `[speech]` config section. `None` when nothing is configured.
    pub fn from_config(config: &mindthread_config::SpeechConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self::new(
            config.transcribe_command.clone(),
            config.synthesize_command.clone(),
            config.output_dir.as_ref().map(PathBuf::from),
        ))
    }

    /// Run a command line through the platform shell, returning trimmed stdout.
    async fn run(command_line: &str) -> Result<String, String> {
        debug!(command = %command_line, "Running speech command");

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", command_line]).output().await
        } else {
            Command::new("sh").args(["-c", command_line]).output().await
        }
        .map_err(|e| e.to_string())?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(exit_code = code, stderr = %stderr, "Speech command failed");
            return Err(format!("exit code {code}: {stderr}"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quote a path for `sh -c`.
fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if cfg!(target_os = "windows") {
        format!("\"{raw}\"")
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError> {
        let template = self
            .transcribe_command
            .as_deref()
            .ok_or(SpeechError::NotConfigured)?;

        if !audio_path.exists() {
            return Err(SpeechError::TranscriptionFailed(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }

        let command_line = template.replace("{input}", &shell_quote(audio_path));
        let text = Self::run(&command_line)
            .await
            .map_err(SpeechError::TranscriptionFailed)?;

        if text.is_empty() {
            return Err(SpeechError::TranscriptionFailed("empty transcript".into()));
        }
        Ok(text)
    }

    async fn synthesize(&self, text: &str) -> Result<PathBuf, SpeechError> {
        let template = self
            .synthesize_command
            .as_deref()
            .ok_or(SpeechError::NotConfigured)?;

        let id = uuid::Uuid::new_v4();
        let input = self.output_dir.join(format!("mindthread-{id}.txt"));
        let output = self.output_dir.join(format!("mindthread-{id}.wav"));

        tokio::fs::write(&input, text)
            .await
            .map_err(|e| SpeechError::SynthesisFailed(e.to_string()))?;

        let command_line = template
            .replace("{input}", &shell_quote(&input))
            .replace("{output}", &shell_quote(&output));
        let result = Self::run(&command_line).await;
        let _ = tokio::fs::remove_file(&input).await;
        result.map_err(SpeechError::SynthesisFailed)?;

        if !output.exists() {
            return Err(SpeechError::SynthesisFailed(format!(
                "command produced no file at {}",
                output.display()
            )));
        }
        Ok(output)
    }
}
