//! Speech synthesis adapter.
//!
//! The pipeline treats text-to-speech as an opaque remote service: one
//! request per speaking block, one audio file written per request.
//! [`OpenAiSpeech`] targets the OpenAI-compatible `/audio/speech`
//! endpoint; tests substitute their own [`SpeechSynthesizer`].

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::config::{SynthesisConfig, VoicePolicy, VoicesConfig};
use crate::error::PipelineError;

/// Resolves requested voice identifiers against the service's fixed
/// voice set.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    allowed: Vec<String>,
    default_voice: String,
    policy: VoicePolicy,
}

impl VoiceRegistry {
    pub fn new(voices: &VoicesConfig, policy: VoicePolicy) -> Self {
        Self {
            allowed: voices.allowed.iter().map(|v| v.to_lowercase()).collect(),
            default_voice: voices.default_voice.to_lowercase(),
            policy,
        }
    }

    /// Map a requested voice to one the service accepts.
    ///
    /// Identifiers are lowercased before the allow-list check. Under
    /// [`VoicePolicy::Remap`] an unrecognized identifier is substituted
    /// with the default voice and logged as a warning; under
    /// [`VoicePolicy::Strict`] it is a synthesis error.
    pub fn resolve(&self, requested: &str) -> Result<String, PipelineError> {
        let voice = requested.to_lowercase();
        if self.allowed.contains(&voice) {
            return Ok(voice);
        }

        match self.policy {
            VoicePolicy::Remap => {
                warn!(
                    requested,
                    substitute = %self.default_voice,
                    "unrecognized voice identifier, substituting default"
                );
                Ok(self.default_voice.clone())
            }
            VoicePolicy::Strict => Err(PipelineError::Synthesis(format!(
                "unknown voice '{}' (allowed: {})",
                requested,
                self.allowed.join(", ")
            ))),
        }
    }
}

/// External speech-synthesis service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Convert `text` to speech with an already-resolved voice and
    /// write the audio to `out_path`, creating parent directories as
    /// needed. Exactly one service call per invocation; failures are
    /// fatal to the containing run and are not retried here.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out_path: &Path,
    ) -> Result<(), PipelineError>;
}

/// OpenAI-compatible `/audio/speech` client.
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(config: &SynthesisConfig, api_key: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out_path: &Path,
    ) -> Result<(), PipelineError> {
        let url = format!("{}/audio/speech", self.api_base);
        let payload = json!({
            "model": self.model,
            "input": text,
            "voice": voice,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Synthesis(format!(
                "service returned {}: {}",
                status, detail
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(PipelineError::Synthesis(
                "service returned an empty audio payload".to_string(),
            ));
        }

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(out_path, &audio).await?;

        Ok(())
    }
}
