//! Error types for the podcast pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Upstream stream error: {0}")]
    Upstream(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("Malformed input blocks: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
