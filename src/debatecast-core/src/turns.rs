//! Turn aggregation for the debate text stream.
//!
//! The text-generation service emits incremental content deltas tagged
//! with a speaker and a turn number, in no guaranteed cross-speaker
//! order. [`TurnAggregator`] folds those deltas into complete per-turn
//! utterances: each (speaker, turn) key opens on its first delta and
//! closes when a later turn for the same speaker begins, or when the
//! stream ends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::PipelineError;

/// One of the two debaters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The optimistic debater, registered first.
    For,
    /// The skeptical debater, registered second.
    Against,
}

impl Speaker {
    /// The opposing speaker.
    pub fn other(self) -> Self {
        match self {
            Speaker::For => Speaker::Against,
            Speaker::Against => Speaker::For,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Speaker::For => "for",
            Speaker::Against => "against",
        }
    }
}

/// An incremental text fragment from the generation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEvent {
    pub speaker: Speaker,
    /// Turn number, starting at 1.
    pub turn: u32,
    /// Content delta to append to the turn's text.
    pub delta: String,
}

/// One item on the upstream stream. Channel close signals the end of
/// the stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(TextEvent),
    Error(String),
}

/// Lifecycle of a (speaker, turn) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    /// Still receiving deltas.
    Open,
    /// Finalized, eligible for sequencing.
    Closed,
}

#[derive(Debug)]
struct TurnEntry {
    text: String,
    state: TurnState,
}

/// Completed turn texts for both speakers, keyed by turn number.
#[derive(Debug, Default)]
pub struct TurnsBySpeaker {
    turns: BTreeMap<(Speaker, u32), String>,
}

impl TurnsBySpeaker {
    /// Text of a closed turn, if present.
    pub fn get(&self, speaker: Speaker, turn: u32) -> Option<&str> {
        self.turns.get(&(speaker, turn)).map(String::as_str)
    }

    /// Highest closed turn across both speakers.
    pub fn max_turn(&self) -> u32 {
        self.turns.keys().map(|&(_, t)| t).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn insert(&mut self, speaker: Speaker, turn: u32, text: String) {
        self.turns.insert((speaker, turn), text);
    }
}

/// Folds stream deltas into per-turn utterances.
///
/// Run-scoped: one aggregator per pipeline run, never shared.
#[derive(Debug, Default)]
pub struct TurnAggregator {
    entries: BTreeMap<(Speaker, u32), TurnEntry>,
    /// Set when the upstream stream reported an error; further deltas
    /// are rejected but already-closed turns remain usable.
    failed: Option<String>,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta in. Starting a higher turn for a speaker closes
    /// all of that speaker's lower open turns; deltas for a closed key
    /// are ignored.
    pub fn ingest(&mut self, event: TextEvent) -> Result<(), PipelineError> {
        if let Some(reason) = &self.failed {
            return Err(PipelineError::Upstream(reason.clone()));
        }
        if event.turn == 0 {
            return Err(PipelineError::Upstream(
                "turn numbers start at 1".to_string(),
            ));
        }

        // A new turn for this speaker finalizes the earlier ones.
        for ((speaker, turn), entry) in self.entries.iter_mut() {
            if *speaker == event.speaker && *turn < event.turn && entry.state == TurnState::Open {
                entry.state = TurnState::Closed;
            }
        }

        let entry = self
            .entries
            .entry((event.speaker, event.turn))
            .or_insert_with(|| TurnEntry {
                text: String::new(),
                state: TurnState::Open,
            });

        if entry.state == TurnState::Closed {
            debug!(
                speaker = event.speaker.display_name(),
                turn = event.turn,
                "dropping delta for already-closed turn"
            );
            return Ok(());
        }

        entry.text.push_str(&event.delta);
        Ok(())
    }

    /// Record an upstream stream error. Open turns stop growing;
    /// closed turns stay readable.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.failed.is_none() {
            self.failed = Some(reason.into());
        }
    }

    /// The upstream error, if one was reported.
    pub fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    /// Close every remaining open turn (flush-on-end) and return the
    /// completed turn texts.
    pub fn finish(mut self) -> TurnsBySpeaker {
        let mut turns = TurnsBySpeaker::default();
        for ((speaker, turn), entry) in std::mem::take(&mut self.entries) {
            turns.insert(speaker, turn, entry.text);
        }
        turns
    }

    /// Completed turn texts from the already-closed keys only, for
    /// graceful degradation after an upstream error.
    pub fn finish_closed(mut self) -> TurnsBySpeaker {
        let mut turns = TurnsBySpeaker::default();
        for ((speaker, turn), entry) in std::mem::take(&mut self.entries) {
            if entry.state == TurnState::Closed {
                turns.insert(speaker, turn, entry.text);
            }
        }
        turns
    }
}
