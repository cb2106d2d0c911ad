//! Speech engine trait — transcription and synthesis.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use crate::error::SpeechError;

/// Converts audio to text and back. Engine internals are out of scope.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio_path` to text.
    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError>;

    /// Synthesize `text` and return the path of the produced audio file.
    async fn synthesize(&self, text: &str) -> Result<PathBuf, SpeechError>;
}
