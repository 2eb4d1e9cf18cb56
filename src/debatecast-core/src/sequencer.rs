//! Sequencing of completed turns into an ordered list of speaking
//! blocks, plus normalization of the legacy pre-formed block shapes.

use serde::{Deserialize, Serialize};

use crate::config::VoicesConfig;
use crate::error::PipelineError;
use crate::turns::{Speaker, TurnsBySpeaker};

/// One finalized, orderable unit of text-to-be-spoken.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakingBlock {
    pub sequence_index: usize,
    pub speaker: Speaker,
    pub turn: u32,
    pub text: String,
    pub voice_id: String,
}

/// A conversation block as callers have historically supplied it.
///
/// Three shapes are accepted: `{type, turn, content}` (turn-based),
/// `{input, turn, name}` (sort-by-turn fallback) and `{input, name}`
/// (pure sequential fallback). Unknown extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "type")]
    pub speaker_type: Option<String>,
    pub turn: Option<u32>,
    pub content: Option<String>,
    pub input: Option<String>,
    pub name: Option<String>,
}

/// Interleave the closed turns of both speakers into a deterministic
/// global order.
///
/// For each turn from 1 to the highest closed turn, the `lead` speaker
/// is emitted first, then the other speaker. A turn whose text is
/// blank or missing for one speaker is skipped for that speaker only;
/// no placeholder block is produced.
pub fn sequence(
    turns: &TurnsBySpeaker,
    lead: Speaker,
    voices: &VoicesConfig,
) -> Vec<SpeakingBlock> {
    let mut blocks = Vec::new();

    for turn in 1..=turns.max_turn() {
        for speaker in [lead, lead.other()] {
            if let Some(text) = turns.get(speaker, turn) {
                if text.trim().is_empty() {
                    continue;
                }
                blocks.push(SpeakingBlock {
                    sequence_index: blocks.len(),
                    speaker,
                    turn,
                    text: text.trim().to_string(),
                    voice_id: voices.voice_for(speaker).to_string(),
                });
            }
        }
    }

    blocks
}

/// Normalize pre-formed legacy blocks into the canonical block
/// sequence. Runs once at pipeline entry; downstream components never
/// re-derive the format.
///
/// Priority order:
/// 1. every block carries `type` + `content`: already normalized,
///    given order preserved;
/// 2. blocks carry `input` and at least one carries `turn`:
///    stable-sorted by turn ascending;
/// 3. blocks carry `input` only: given order, speaker inferred from a
///    name-prefix heuristic against the known voice identifiers.
///
/// Anything else is [`PipelineError::MalformedInput`], raised before
/// any synthesis call is made.
pub fn normalize_blocks(
    raw: &[RawBlock],
    voices: &VoicesConfig,
) -> Result<Vec<SpeakingBlock>, PipelineError> {
    if raw.is_empty() {
        return Err(PipelineError::MalformedInput(
            "no conversation blocks supplied".to_string(),
        ));
    }

    let all_typed = raw
        .iter()
        .all(|b| b.speaker_type.is_some() && b.content.is_some());
    let all_input = raw.iter().all(|b| b.input.is_some());

    let blocks = if all_typed {
        normalize_typed(raw, voices)?
    } else if all_input && raw.iter().any(|b| b.turn.is_some()) {
        let mut ordered: Vec<&RawBlock> = raw.iter().collect();
        ordered.sort_by_key(|b| b.turn.unwrap_or(u32::MAX));
        normalize_sequential(&ordered, voices)
    } else if all_input {
        let ordered: Vec<&RawBlock> = raw.iter().collect();
        normalize_sequential(&ordered, voices)
    } else {
        return Err(PipelineError::MalformedInput(
            "blocks match none of the known shapes (type/content, input+turn, input)".to_string(),
        ));
    };

    if blocks.is_empty() {
        return Err(PipelineError::MalformedInput(
            "no non-empty conversation blocks found".to_string(),
        ));
    }

    Ok(blocks)
}

fn normalize_typed(
    raw: &[RawBlock],
    voices: &VoicesConfig,
) -> Result<Vec<SpeakingBlock>, PipelineError> {
    let mut blocks = Vec::new();

    for (i, block) in raw.iter().enumerate() {
        let kind = block.speaker_type.as_deref().unwrap_or_default();
        let speaker = match kind {
            "believer" => Speaker::For,
            "skeptic" => Speaker::Against,
            other => {
                return Err(PipelineError::MalformedInput(format!(
                    "unknown speaker type '{}'",
                    other
                )));
            }
        };
        let content = block.content.as_deref().unwrap_or_default();
        if content.trim().is_empty() {
            continue;
        }
        blocks.push(SpeakingBlock {
            sequence_index: blocks.len(),
            speaker,
            turn: block.turn.unwrap_or(i as u32 + 1),
            text: content.trim().to_string(),
            voice_id: voices.voice_for(speaker).to_string(),
        });
    }

    Ok(blocks)
}

fn normalize_sequential(ordered: &[&RawBlock], voices: &VoicesConfig) -> Vec<SpeakingBlock> {
    let mut blocks = Vec::new();

    for (i, block) in ordered.iter().enumerate() {
        let input = block.input.as_deref().unwrap_or_default();
        if input.trim().is_empty() {
            continue;
        }
        let speaker = infer_speaker(block.name.as_deref().unwrap_or_default(), voices);
        blocks.push(SpeakingBlock {
            sequence_index: blocks.len(),
            speaker,
            turn: block.turn.unwrap_or(i as u32 + 1),
            text: input.trim().to_string(),
            voice_id: voices.voice_for(speaker).to_string(),
        });
    }

    blocks
}

/// Name-prefix heuristic for blocks that carry no speaker tag: the
/// block belongs to the For speaker when its name mentions "Believer"
/// or starts with a known voice identifier.
fn infer_speaker(name: &str, voices: &VoicesConfig) -> Speaker {
    let lowered = name.to_lowercase();
    if name.contains("Believer") || voices.allowed.iter().any(|v| lowered.starts_with(v.as_str()))
    {
        Speaker::For
    } else {
        Speaker::Against
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> VoicesConfig {
        VoicesConfig::default()
    }

    fn turns(entries: &[(Speaker, u32, &str)]) -> TurnsBySpeaker {
        let mut t = TurnsBySpeaker::default();
        for (speaker, turn, text) in entries {
            t.insert(*speaker, *turn, text.to_string());
        }
        t
    }

    #[test]
    fn test_sequence_interleaves_lead_first() {
        let t = turns(&[
            (Speaker::For, 1, "for one"),
            (Speaker::Against, 1, "against one"),
            (Speaker::For, 2, "for two"),
            (Speaker::Against, 2, "against two"),
        ]);
        let blocks = sequence(&t, Speaker::Against, &voices());
        let order: Vec<(Speaker, u32)> = blocks.iter().map(|b| (b.speaker, b.turn)).collect();
        assert_eq!(
            order,
            vec![
                (Speaker::Against, 1),
                (Speaker::For, 1),
                (Speaker::Against, 2),
                (Speaker::For, 2),
            ]
        );
        assert_eq!(blocks.len(), 4);
        for (i, b) in blocks.iter().enumerate() {
            assert_eq!(b.sequence_index, i);
        }
    }

    #[test]
    fn test_sequence_lead_is_configurable() {
        let t = turns(&[
            (Speaker::For, 1, "for one"),
            (Speaker::Against, 1, "against one"),
        ]);
        let blocks = sequence(&t, Speaker::For, &voices());
        assert_eq!(blocks[0].speaker, Speaker::For);
        assert_eq!(blocks[1].speaker, Speaker::Against);
    }

    #[test]
    fn test_sequence_skips_blank_turn_without_placeholder() {
        let t = turns(&[
            (Speaker::Against, 1, "b one"),
            (Speaker::For, 1, "a one"),
            (Speaker::Against, 2, "b two"),
            (Speaker::For, 2, "   "),
        ]);
        let blocks = sequence(&t, Speaker::Against, &voices());
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.last().map(|b| (b.speaker, b.turn)), Some((Speaker::Against, 2)));
    }

    #[test]
    fn test_sequence_is_deterministic() {
        let t = turns(&[
            (Speaker::For, 1, "x"),
            (Speaker::Against, 1, "y"),
            (Speaker::Against, 3, "z"),
        ]);
        let a = sequence(&t, Speaker::Against, &voices());
        let b = sequence(&t, Speaker::Against, &voices());
        let order_a: Vec<usize> = a.iter().map(|blk| blk.sequence_index).collect();
        let order_b: Vec<usize> = b.iter().map(|blk| blk.sequence_index).collect();
        assert_eq!(order_a, order_b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_sequence_assigns_speaker_voices() {
        let t = turns(&[(Speaker::For, 1, "x"), (Speaker::Against, 1, "y")]);
        let blocks = sequence(&t, Speaker::Against, &voices());
        assert_eq!(blocks[0].voice_id, voices().against_voice);
        assert_eq!(blocks[1].voice_id, voices().for_voice);
    }

    fn typed(kind: &str, turn: u32, content: &str) -> RawBlock {
        RawBlock {
            speaker_type: Some(kind.to_string()),
            turn: Some(turn),
            content: Some(content.to_string()),
            input: None,
            name: None,
        }
    }

    fn legacy(input: &str, turn: Option<u32>, name: &str) -> RawBlock {
        RawBlock {
            speaker_type: None,
            turn,
            content: None,
            input: Some(input.to_string()),
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_normalize_typed_preserves_given_order() {
        let raw = vec![
            typed("skeptic", 1, "s1"),
            typed("believer", 1, "b1"),
            typed("skeptic", 2, "s2"),
        ];
        let blocks = normalize_blocks(&raw, &voices()).unwrap();
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["s1", "b1", "s2"]);
        assert_eq!(blocks[0].speaker, Speaker::Against);
        assert_eq!(blocks[1].speaker, Speaker::For);
    }

    #[test]
    fn test_normalize_typed_skips_blank_content() {
        let raw = vec![typed("skeptic", 1, "  "), typed("believer", 1, "b1")];
        let blocks = normalize_blocks(&raw, &voices()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "b1");
    }

    #[test]
    fn test_normalize_input_with_turns_sorts_ascending() {
        let raw = vec![
            legacy("third", Some(3), "Skeptic"),
            legacy("first", Some(1), "Believer's Perspective"),
            legacy("second", Some(2), "Skeptic"),
        ];
        let blocks = normalize_blocks(&raw, &voices()).unwrap();
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_normalize_plain_input_keeps_order_and_infers_speaker() {
        let raw = vec![
            legacy("one", None, "Believer's Perspective (Part 1)"),
            legacy("two", None, "The Skeptic"),
            legacy("three", None, "alloy narrator"),
        ];
        let blocks = normalize_blocks(&raw, &voices()).unwrap();
        assert_eq!(blocks[0].speaker, Speaker::For);
        assert_eq!(blocks[1].speaker, Speaker::Against);
        // Name starts with a known voice identifier.
        assert_eq!(blocks[2].speaker, Speaker::For);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_normalize_unknown_shape_is_malformed() {
        let raw = vec![RawBlock {
            speaker_type: None,
            turn: Some(1),
            content: Some("orphan content".to_string()),
            input: None,
            name: None,
        }];
        let err = normalize_blocks(&raw, &voices()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }

    #[test]
    fn test_normalize_unknown_speaker_type_is_malformed() {
        let raw = vec![typed("moderator", 1, "hello")];
        let err = normalize_blocks(&raw, &voices()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }

    #[test]
    fn test_normalize_empty_input_is_malformed() {
        let err = normalize_blocks(&[], &voices()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }
}
