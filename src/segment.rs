//! Sentence segmentation over streamed fragments

/// Splits a fragment stream into speakable sentences
///
/// Fragments accumulate in a buffer; whenever the buffer ends in `.`,
/// `?`, or `!` the whole buffer is emitted as one sentence and cleared.
/// Only the buffer's final character is inspected after each append, so
/// terminators inside a fragment never split it, while a fragment that
/// happens to end on an abbreviation dot will.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, returning a completed sentence when one forms
    #[must_use]
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);

        let last = self.buffer.chars().last()?;
        if matches!(last, '.' | '?' | '!') {
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    /// Flush whatever remains once the stream has ended
    ///
    /// Returns the trimmed remainder, or `None` when nothing is left.
    #[must_use]
    pub fn finish(self) -> Option<String> {
        let remainder = self.buffer.trim();
        if remainder.is_empty() {
            None
        } else {
            Some(remainder.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_all(fragments: &[&str]) -> Vec<String> {
        let mut segmenter = SentenceSegmenter::new();
        let mut sentences = Vec::new();
        for fragment in fragments {
            if let Some(sentence) = segmenter.push(fragment) {
                sentences.push(sentence);
            }
        }
        if let Some(remainder) = segmenter.finish() {
            sentences.push(remainder);
        }
        sentences
    }

    #[test]
    fn emits_on_terminal_punctuation() {
        let sentences = segment_all(&["Hello", " world", ".", " Next", " one", "!"]);
        assert_eq!(sentences, vec!["Hello world.".to_string(), " Next one!".to_string()]);
    }

    #[test]
    fn unterminated_remainder_is_flushed_trimmed() {
        let sentences = segment_all(&["no terminator here"]);
        assert_eq!(sentences, vec!["no terminator here".to_string()]);

        let sentences = segment_all(&["  padded remainder  "]);
        assert_eq!(sentences, vec!["padded remainder".to_string()]);
    }

    #[test]
    fn mid_fragment_terminators_do_not_split() {
        // Two full sentences in one fragment come out as one
        let sentences = segment_all(&["One. Two."]);
        assert_eq!(sentences, vec!["One. Two.".to_string()]);

        let sentences = segment_all(&["Mr. Smith spoke"]);
        assert_eq!(sentences, vec!["Mr. Smith spoke".to_string()]);
    }

    #[test]
    fn question_and_exclamation_terminate() {
        let sentences = segment_all(&["Really?", " Yes!"]);
        assert_eq!(sentences, vec!["Really?".to_string(), " Yes!".to_string()]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(segment_all(&[]).is_empty());
        assert!(segment_all(&["", ""]).is_empty());
        assert!(segment_all(&["   "]).is_empty());
    }

    #[test]
    fn same_fragments_always_segment_the_same_way() {
        let fragments = ["The current", " time is 10:00", ".", " Anything else", "?"];
        let first = segment_all(&fragments);
        let second = segment_all(&fragments);
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec!["The current time is 10:00.".to_string(), " Anything else?".to_string()]
        );
    }
}
