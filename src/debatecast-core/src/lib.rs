//! Debatecast Core Library
//!
//! Turn-tracking and audio-assembly pipeline for two-speaker debate
//! podcasts: aggregates a streaming debate into per-turn utterances,
//! sequences them, synthesizes speech for each block, and merges the
//! segments into one audio artifact.

pub mod assembler;
pub mod chunker;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sequencer;
pub mod tts;
pub mod turns;

pub use assembler::{AudioBackend, AudioSegment, FfmpegAssembler};
pub use config::{Config, VoicePolicy, VoicesConfig};
pub use error::PipelineError;
pub use pipeline::{
    PipelineCallback, PipelineEvent, PipelineState, PodcastArtifact, PodcastPipeline,
};
pub use sequencer::{RawBlock, SpeakingBlock};
pub use tts::{OpenAiSpeech, SpeechSynthesizer, VoiceRegistry};
pub use turns::{Speaker, StreamEvent, TextEvent, TurnAggregator};
