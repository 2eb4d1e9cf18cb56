//! Text chunking for speech synthesis.
//!
//! The synthesis service enforces a maximum input length per request,
//! so long utterances are split into bounded chunks at sentence
//! boundaries, falling back to word boundaries for overlong sentences.

/// Split text into chunks no longer than `max_len` characters.
///
/// Sentences (terminated by `.`, `!`, `?` or `;`) are accumulated into
/// a buffer; when adding the next sentence would exceed `max_len` the
/// buffer is flushed and the sentence starts a new one. A single
/// sentence longer than `max_len` is split on word boundaries with the
/// same flush rule.
///
/// A lone token with no spaces that itself exceeds `max_len` is emitted
/// verbatim rather than dropped, so one chunk may exceed the limit in
/// that case.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if sentence.len() > max_len {
            flush(&mut chunks, &mut buffer);
            chunk_words(sentence, max_len, &mut chunks, &mut buffer);
            continue;
        }

        if !buffer.is_empty() && buffer.len() + 1 + sentence.len() > max_len {
            flush(&mut chunks, &mut buffer);
        }
        push_piece(&mut buffer, sentence);
    }

    flush(&mut chunks, &mut buffer);
    chunks
}

/// Accumulate words of an overlong sentence into `buffer`, flushing
/// whenever the next word would not fit.
fn chunk_words(sentence: &str, max_len: usize, chunks: &mut Vec<String>, buffer: &mut String) {
    for word in sentence.split_whitespace() {
        if !buffer.is_empty() && buffer.len() + 1 + word.len() > max_len {
            flush(chunks, buffer);
        }
        // An unsplittable token beyond the limit goes out as-is.
        push_piece(buffer, word);
    }
    flush(chunks, buffer);
}

fn push_piece(buffer: &mut String, piece: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(piece);
}

fn flush(chunks: &mut Vec<String>, buffer: &mut String) {
    if !buffer.trim().is_empty() {
        chunks.push(std::mem::take(buffer).trim().to_string());
    } else {
        buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk("", 100).is_empty());
        assert!(chunk("   ", 100).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk("Hello world.", 100);
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn test_sentences_accumulate_until_limit() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = chunk(text, 32);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "One two three. Four five six.");
        assert_eq!(chunks[1], "Seven eight nine.");
    }

    #[test]
    fn test_chunk_lengths_bounded() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta! Iota kappa lambda mu?";
        for c in chunk(text, 30) {
            assert!(c.len() <= 30, "chunk too long: {:?}", c);
        }
    }

    #[test]
    fn test_long_sentence_splits_on_words() {
        let sentence = "word ".repeat(20).trim().to_string() + ".";
        let chunks = chunk(&sentence, 25);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 25);
        }
    }

    #[test]
    fn test_unsplittable_token_emitted_verbatim() {
        let token = "x".repeat(50);
        let text = format!("short. {} tail.", token);
        let chunks = chunk(&text, 20);
        assert!(chunks.iter().any(|c| c.contains(&token)));
    }

    #[test]
    fn test_roundtrip_preserves_words() {
        let text = "The quick brown fox jumps. Over the lazy dog! And then some; more words here?";
        let chunks = chunk(text, 25);
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }
}
