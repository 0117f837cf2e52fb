// ABOUTME: OpenAI text-to-speech backend for the speech synthesizer
// ABOUTME: POSTs to {base_url}/audio/speech and returns the raw audio bytes

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use herald_core::config::TtsConfig;
use herald_core::traits::{SpeechBackend, SpeechRequest};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSpeech {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

// Keep the API key out of logs
impl std::fmt::Debug for OpenAiSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSpeech")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiSpeech {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// None when no API key is configured
    pub fn from_config(config: &TtsConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(api_key, config.base_url.clone()))
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }
}

#[async_trait]
impl SpeechBackend for OpenAiSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let body = SpeechBody {
            model: &request.model,
            voice: &request.voice,
            input: &request.input,
            response_format: &request.format,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Speech endpoint returned {}: {}", status, body);
        }

        let audio = response
            .bytes()
            .await
            .context("Failed to read speech response")?;
        tracing::debug!(bytes = audio.len(), model = %request.model, "Received synthesized audio");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let speech = OpenAiSpeech::new("sk-test", "https://api.openai.com/v1/");
        assert_eq!(speech.endpoint(), "https://api.openai.com/v1/audio/speech");
    }

    #[test]
    fn test_from_config_requires_api_key() {
        assert!(OpenAiSpeech::from_config(&TtsConfig::default()).is_none());
        let config = TtsConfig {
            api_key: Some("sk-test".to_string()),
            ..TtsConfig::default()
        };
        assert!(OpenAiSpeech::from_config(&config).is_some());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let speech = OpenAiSpeech::new("sk-secret", "https://api.openai.com/v1");
        let debug = format!("{:?}", speech);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
