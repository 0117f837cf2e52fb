// ABOUTME: Text-to-speech pipeline that writes one audio artifact to a fixed path
// ABOUTME: Gated by the TTS flag; failures are logged and yield no artifact

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{parse_flag, TtsConfig};
use crate::traits::{SpeechBackend, SpeechRequest};

/// Process-wide switch for speech synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtsFlag(bool);

impl TtsFlag {
    pub const ENABLED: TtsFlag = TtsFlag(true);
    pub const DISABLED: TtsFlag = TtsFlag(false);

    /// Parse a configuration string: "true" (any case) or "1" enable
    pub fn parse(value: &str) -> Self {
        Self(parse_flag(value))
    }

    pub fn is_enabled(self) -> bool {
        self.0
    }
}

impl From<bool> for TtsFlag {
    fn from(enabled: bool) -> Self {
        Self(enabled)
    }
}

/// Audio produced by one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisArtifact {
    pub source_text: String,
    pub file_path: PathBuf,
}

/// Turns text into an audio file at a single, fixed location.
///
/// The output path is one slot: every call overwrites it and the last writer
/// wins. Writes are serialized and land via rename, so a reader sees either
/// the previous file or the new one in full.
pub struct SpeechSynthesizer {
    flag: TtsFlag,
    backend: Arc<dyn SpeechBackend>,
    model: String,
    voice: String,
    format: String,
    output_path: PathBuf,
    slot: Mutex<()>,
}

impl SpeechSynthesizer {
    pub fn new(flag: TtsFlag, backend: Arc<dyn SpeechBackend>, output_path: impl Into<PathBuf>) -> Self {
        let defaults = TtsConfig::default();
        Self {
            flag,
            backend,
            model: defaults.model,
            voice: defaults.voice,
            format: defaults.format,
            output_path: output_path.into(),
            slot: Mutex::new(()),
        }
    }

    pub fn from_config(config: &TtsConfig, backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            flag: TtsFlag::from(config.enabled),
            backend,
            model: config.model.clone(),
            voice: config.voice.clone(),
            format: config.format.clone(),
            output_path: PathBuf::from(&config.output_path),
            slot: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.is_enabled()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Synthesize `text` and return where the audio was written.
    /// None means synthesis is off or failed for this call.
    pub async fn synthesize(&self, text: &str) -> Option<SynthesisArtifact> {
        if !self.flag.is_enabled() {
            return None;
        }
        if text.trim().is_empty() {
            tracing::debug!("Skipping speech synthesis for empty text");
            return None;
        }

        match self.try_synthesize(text).await {
            Ok(artifact) => {
                tracing::info!(
                    path = %artifact.file_path.display(),
                    chars = text.chars().count(),
                    "Speech synthesized"
                );
                Some(artifact)
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Speech synthesis failed");
                None
            }
        }
    }

    async fn try_synthesize(&self, text: &str) -> Result<SynthesisArtifact> {
        let request = SpeechRequest {
            model: self.model.clone(),
            voice: self.voice.clone(),
            format: self.format.clone(),
            input: text.to_string(),
        };
        let audio = self
            .backend
            .synthesize(&request)
            .await
            .context("Speech request failed")?;

        let _slot = self.slot.lock().await;
        write_replacing(&self.output_path, &audio).await?;

        Ok(SynthesisArtifact {
            source_text: text.to_string(),
            file_path: self.output_path.clone(),
        })
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_replacing(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, data)
        .await
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("Failed to move audio into {}", path.display()))?;
    Ok(())
}
