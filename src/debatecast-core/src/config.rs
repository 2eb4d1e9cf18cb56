//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::turns::Speaker;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub voices: VoicesConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

/// Voice selection for the two debaters.
#[derive(Debug, Clone, Deserialize)]
pub struct VoicesConfig {
    pub for_voice: String,
    pub against_voice: String,
    /// Substitute for unrecognized voice identifiers.
    pub default_voice: String,
    /// The synthesis service's fixed voice set.
    #[serde(default = "default_allowed_voices")]
    pub allowed: Vec<String>,
}

impl VoicesConfig {
    /// Voice identifier configured for a speaker.
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::For => &self.for_voice,
            Speaker::Against => &self.against_voice,
        }
    }
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            for_voice: "alloy".to_string(),
            against_voice: "onyx".to_string(),
            default_voice: "alloy".to_string(),
            allowed: default_allowed_voices(),
        }
    }
}

fn default_allowed_voices() -> Vec<String> {
    [
        "alloy", "echo", "fable", "onyx", "nova", "shimmer", "ash", "sage", "coral",
    ]
    .iter()
    .map(|v| v.to_string())
    .collect()
}

/// How to treat a voice identifier outside the allowed set.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoicePolicy {
    /// Substitute the default voice and log a warning.
    #[default]
    Remap,
    /// Fail the synthesis request.
    Strict,
}

/// Speech-synthesis service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    pub api_base: String,
    pub model: String,
    /// Maximum characters per synthesis request.
    pub max_chunk_chars: usize,
    #[serde(default)]
    pub voice_policy: VoicePolicy,
    pub request_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "tts-1".to_string(),
            max_chunk_chars: 3800,
            voice_policy: VoicePolicy::Remap,
            request_timeout_secs: 120,
        }
    }
}

/// Pipeline-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Which speaker opens each turn in the assembled program.
    pub lead_speaker: Speaker,
    /// Gap inserted between spoken segments.
    pub silence_seconds: f64,
    /// Root under which per-run working directories are created.
    pub temp_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lead_speaker: Speaker::Against,
            silence_seconds: 1.0,
            temp_dir: "temp_audio".to_string(),
        }
    }
}

/// Audio concatenation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    pub sample_rate: u32,
    pub bitrate: String,
    /// Use the concat demuxer's `-c copy` path instead of re-encoding.
    /// Only safe when every segment shares identical codec parameters.
    pub lossless_concat: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bitrate: "192k".to_string(),
            lossless_concat: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PipelineError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.voices.default_voice, "alloy");
        assert_eq!(config.pipeline.lead_speaker, Speaker::Against);
        assert_eq!(config.synthesis.voice_policy, VoicePolicy::Remap);
        assert!(!config.assembly.lossless_concat);
        assert_eq!(config.voices.allowed.len(), 9);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [voices]
            for_voice = "nova"
            against_voice = "echo"
            default_voice = "alloy"

            [synthesis]
            api_base = "http://localhost:8080/v1"
            model = "tts-1-hd"
            max_chunk_chars = 2000
            voice_policy = "strict"
            request_timeout_secs = 30

            [pipeline]
            lead_speaker = "for"
            silence_seconds = 0.5
            temp_dir = "/tmp/debatecast"

            [assembly]
            sample_rate = 48000
            bitrate = "256k"
            lossless_concat = true
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.voices.for_voice, "nova");
        assert_eq!(config.synthesis.voice_policy, VoicePolicy::Strict);
        assert_eq!(config.pipeline.lead_speaker, Speaker::For);
        assert_eq!(config.pipeline.silence_seconds, 0.5);
        assert!(config.assembly.lossless_concat);
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let toml = r#"
            [voices]
            for_voice = "shimmer"
            against_voice = "onyx"
            default_voice = "alloy"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.voices.for_voice, "shimmer");
        assert_eq!(config.synthesis.model, "tts-1");
        assert_eq!(config.pipeline.silence_seconds, 1.0);
    }

    #[test]
    fn test_voice_for_speaker() {
        let voices = VoicesConfig::default();
        assert_eq!(voices.voice_for(Speaker::For), "alloy");
        assert_eq!(voices.voice_for(Speaker::Against), "onyx");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("voices = nonsense").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
