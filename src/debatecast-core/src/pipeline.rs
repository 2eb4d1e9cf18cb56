//! Pipeline orchestration.
//!
//! Drives one podcast run end to end: stream ingestion → turn
//! aggregation → sequencing → speech synthesis → audio assembly.
//! Each run owns a private working directory under the configured
//! temp root; every failure path (including a caller abandoning the
//! run) removes it, so a caller only ever sees a complete artifact or
//! a single terminal error.

use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::info;

use crate::assembler::{AudioBackend, AudioSegment};
use crate::chunker;
use crate::config::Config;
use crate::error::PipelineError;
use crate::sequencer::{self, RawBlock, SpeakingBlock};
use crate::tts::{SpeechSynthesizer, VoiceRegistry};
use crate::turns::{Speaker, StreamEvent, TurnAggregator};

/// Orchestrator phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming,
    Aggregating,
    Sequencing,
    Synthesizing,
    Assembling,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Idle => "idle",
            PipelineState::Streaming => "streaming",
            PipelineState::Aggregating => "aggregating",
            PipelineState::Sequencing => "sequencing",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Assembling => "assembling",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Terminal output of one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PodcastArtifact {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub block_count: usize,
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The run entered a new phase.
    StateChanged(PipelineState),
    /// A content delta arrived from the text-generation stream.
    Delta {
        speaker: Speaker,
        turn: u32,
        delta: String,
    },
    /// One speaking block has been synthesized.
    BlockSynthesized {
        completed: usize,
        total: usize,
        speaker: Speaker,
        turn: u32,
    },
    /// The run produced its artifact.
    Finished {
        audio_path: PathBuf,
        duration_seconds: f64,
    },
}

/// Callback for pipeline events.
pub type PipelineCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// Run-scoped working directory, removed on drop unless the run
/// completed. Covers failure paths and abandoned (cancelled) runs
/// alike.
struct RunDir {
    path: PathBuf,
    keep: bool,
}

impl RunDir {
    fn create(temp_root: &Path) -> Result<Self, PipelineError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let nonce: u16 = rand::thread_rng().r#gen();
        let path = temp_root.join(format!("podcast_{}_{:04x}", millis, nonce));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory; the caller now owns the artifact inside it.
    fn disarm(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Orchestrates one or more podcast runs. Runs share no mutable
/// state: all per-run data lives on the stack of `run_*`.
pub struct PodcastPipeline {
    config: Config,
    registry: VoiceRegistry,
    synthesizer: Box<dyn SpeechSynthesizer>,
    assembler: Box<dyn AudioBackend>,
    callback: Option<PipelineCallback>,
}

impl PodcastPipeline {
    pub fn new(
        config: Config,
        synthesizer: Box<dyn SpeechSynthesizer>,
        assembler: Box<dyn AudioBackend>,
    ) -> Self {
        let registry = VoiceRegistry::new(&config.voices, config.synthesis.voice_policy);
        Self {
            config,
            registry,
            synthesizer,
            assembler,
            callback: None,
        }
    }

    /// Set a callback for pipeline events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Consume a live text-generation stream and produce the podcast.
    ///
    /// Deltas are folded into turns as they arrive; sequencing,
    /// synthesis and assembly start once the sender closes the
    /// channel. An in-stream error event aborts the run.
    pub async fn run_stream(
        &self,
        mut rx: mpsc::Receiver<StreamEvent>,
    ) -> Result<PodcastArtifact, PipelineError> {
        self.emit(PipelineEvent::StateChanged(PipelineState::Streaming));

        let mut aggregator = TurnAggregator::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Delta(text_event) => {
                    self.emit(PipelineEvent::Delta {
                        speaker: text_event.speaker,
                        turn: text_event.turn,
                        delta: text_event.delta.clone(),
                    });
                    self.fail_on_error(aggregator.ingest(text_event))?;
                }
                StreamEvent::Error(reason) => {
                    aggregator.fail(reason);
                    break;
                }
            }
        }

        if let Some(reason) = aggregator.failure() {
            self.emit(PipelineEvent::StateChanged(PipelineState::Failed));
            return Err(PipelineError::Upstream(reason.to_string()));
        }

        self.emit(PipelineEvent::StateChanged(PipelineState::Aggregating));
        let turns = aggregator.finish();
        if turns.is_empty() {
            self.emit(PipelineEvent::StateChanged(PipelineState::Failed));
            return Err(PipelineError::Upstream(
                "stream ended before any turn was produced".to_string(),
            ));
        }

        self.emit(PipelineEvent::StateChanged(PipelineState::Sequencing));
        let blocks = sequencer::sequence(
            &turns,
            self.config.pipeline.lead_speaker,
            &self.config.voices,
        );
        if blocks.is_empty() {
            self.emit(PipelineEvent::StateChanged(PipelineState::Failed));
            return Err(PipelineError::MalformedInput(
                "stream produced no non-empty turns".to_string(),
            ));
        }

        self.fail_on_error(self.produce(blocks).await)
    }

    /// Produce a podcast from pre-formed conversation blocks (any of
    /// the legacy shapes).
    pub async fn run_blocks(&self, raw: Vec<RawBlock>) -> Result<PodcastArtifact, PipelineError> {
        self.emit(PipelineEvent::StateChanged(PipelineState::Sequencing));
        let blocks = self.fail_on_error(sequencer::normalize_blocks(&raw, &self.config.voices))?;
        self.fail_on_error(self.produce(blocks).await)
    }

    /// Synthesis + assembly over an already-ordered block sequence.
    async fn produce(&self, blocks: Vec<SpeakingBlock>) -> Result<PodcastArtifact, PipelineError> {
        let blocks = expand_chunks(blocks, self.config.synthesis.max_chunk_chars);
        let run_dir = RunDir::create(Path::new(&self.config.pipeline.temp_dir))?;
        info!(run_dir = %run_dir.path().display(), blocks = blocks.len(), "starting synthesis");

        self.emit(PipelineEvent::StateChanged(PipelineState::Synthesizing));
        let total = blocks.len();
        let mut segments = Vec::with_capacity(total);
        for block in &blocks {
            let voice = self.registry.resolve(&block.voice_id)?;
            let file_path = run_dir.path().join(format!(
                "{}_turn_{}_{:03}.mp3",
                block.speaker.display_name(),
                block.turn,
                block.sequence_index
            ));
            self.synthesizer
                .synthesize(&block.text, &voice, &file_path)
                .await?;
            segments.push(AudioSegment {
                file_path,
                speaker: block.speaker,
                turn: block.turn,
                sequence_index: block.sequence_index,
            });
            self.emit(PipelineEvent::BlockSynthesized {
                completed: segments.len(),
                total,
                speaker: block.speaker,
                turn: block.turn,
            });
        }

        self.emit(PipelineEvent::StateChanged(PipelineState::Assembling));
        let output = run_dir.path().join("final_podcast.mp3");
        let duration_seconds = self
            .assembler
            .assemble(
                &segments,
                self.config.pipeline.silence_seconds,
                run_dir.path(),
                &output,
            )
            .await?;

        run_dir.disarm();
        self.emit(PipelineEvent::StateChanged(PipelineState::Done));
        self.emit(PipelineEvent::Finished {
            audio_path: output.clone(),
            duration_seconds,
        });

        Ok(PodcastArtifact {
            audio_path: output,
            duration_seconds,
            block_count: total,
        })
    }

    /// Emit the Failed state alongside an error result.
    fn fail_on_error<T>(&self, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        if result.is_err() {
            self.emit(PipelineEvent::StateChanged(PipelineState::Failed));
        }
        result
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Split blocks whose text exceeds the synthesis bound into
/// consecutive per-chunk blocks, re-indexing the whole sequence.
fn expand_chunks(blocks: Vec<SpeakingBlock>, max_chars: usize) -> Vec<SpeakingBlock> {
    let mut expanded = Vec::with_capacity(blocks.len());
    for block in blocks {
        for text in chunker::chunk(&block.text, max_chars) {
            expanded.push(SpeakingBlock {
                sequence_index: expanded.len(),
                speaker: block.speaker,
                turn: block.turn,
                text,
                voice_id: block.voice_id.clone(),
            });
        }
    }
    expanded
}
