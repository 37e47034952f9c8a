/// Marker substring the engine embeds in the text of non-speech spans.
/// Treated as an opaque containment check.
pub const NONSPEECH_MARKER: &str = "[n::";

/// One item of an engine response frame, already narrowed to the two kinds
/// the stabilizer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedItem {
    /// Timestamp marker delimiting one text span from the next.
    Boundary { timestamp_ms: f64, provisional: bool },
    /// Text fragment; fragments already contain any needed whitespace.
    Fragment {
        text: String,
        provisional: bool,
        sentence_start: bool,
    },
}

/// Emitted transcript span. Never mutated after emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub start_ms: f64,
    pub end_ms: f64,
    pub is_final: bool,
    pub nonspeech: bool,
}

/// Result of processing one engine response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub track: String,
    pub tokens: Vec<Token>,
    pub final_audio_proc_ms: f64,
    pub total_audio_proc_ms: f64,
}

/// Converts the engine's ordered tagged-item stream into well-formed
/// transcript tokens, carrying committed state across frames so provisional
/// lookahead text is never mixed irrecoverably into final text.
///
/// Single-owner: exactly one task advances a stabilizer, in frame arrival
/// order.
#[derive(Debug)]
pub struct Stabilizer {
    track: String,
    committed_text: String,
    committed_ms: f64,
    observed_ms: f64,
    working_text: String,
}

impl Stabilizer {
    pub fn new(track: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            committed_text: String::new(),
            committed_ms: 0.0,
            observed_ms: 0.0,
            working_text: String::new(),
        }
    }

    /// Processes one frame's items and produces the frame's event. The event
    /// may carry zero tokens.
    pub fn process_frame(&mut self, items: Vec<TaggedItem>) -> TranscriptEvent {
        let mut tokens = Vec::new();
        self.working_text = self.committed_text.clone();
        let mut working_start = self.committed_ms;
        let mut in_provisional_run = false;

        for item in items {
            match item {
                TaggedItem::Boundary {
                    timestamp_ms,
                    provisional,
                } => {
                    if timestamp_ms > self.observed_ms {
                        self.observed_ms = timestamp_ms;
                    }
                    // A repeated boundary timestamp never re-emits.
                    if !self.working_text.is_empty() && timestamp_ms != self.committed_ms {
                        let is_final = !provisional;
                        tokens.push(Token {
                            text: self.working_text.clone(),
                            start_ms: working_start,
                            end_ms: timestamp_ms,
                            is_final,
                            nonspeech: self.working_text.contains(NONSPEECH_MARKER),
                        });
                        if is_final {
                            self.committed_text.clear();
                            self.committed_ms = timestamp_ms;
                        }
                    }
                    self.working_text.clear();
                    working_start = timestamp_ms;
                    in_provisional_run = false;
                }
                TaggedItem::Fragment {
                    text,
                    provisional,
                    sentence_start,
                } => {
                    let text = if sentence_start {
                        capitalize_first_alpha(&text)
                    } else {
                        text
                    };
                    if provisional && !in_provisional_run {
                        // Confirmed-but-unflushed text carries forward across
                        // frames even though no final boundary sealed it yet.
                        self.committed_text = self.working_text.clone();
                    }
                    self.working_text.push_str(&text);
                    in_provisional_run = provisional;
                }
            }
        }

        TranscriptEvent {
            track: self.track.clone(),
            tokens,
            final_audio_proc_ms: self.committed_ms,
            total_audio_proc_ms: self.observed_ms,
        }
    }

    /// Stream-end flush: seals any trailing working text into one synthetic
    /// final token.
    pub fn finish(&mut self) -> Option<TranscriptEvent> {
        if self.working_text.is_empty() || self.committed_ms == self.observed_ms {
            return None;
        }
        let token = Token {
            text: self.working_text.clone(),
            start_ms: self.committed_ms,
            end_ms: self.observed_ms,
            is_final: true,
            nonspeech: self.working_text.contains(NONSPEECH_MARKER),
        };
        self.working_text.clear();
        Some(TranscriptEvent {
            track: self.track.clone(),
            tokens: vec![token],
            final_audio_proc_ms: self.observed_ms,
            total_audio_proc_ms: self.observed_ms,
        })
    }
}

/// Upper-cases the first alphabetic character, leaving leading whitespace and
/// the remainder untouched.
fn capitalize_first_alpha(text: &str) -> String {
    match text.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, c)) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..idx]);
            out.extend(c.to_uppercase());
            out.push_str(&text[idx + c.len_utf8()..]);
            out
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(timestamp_ms: f64) -> TaggedItem {
        TaggedItem::Boundary {
            timestamp_ms,
            provisional: false,
        }
    }

    fn lookahead_boundary(timestamp_ms: f64) -> TaggedItem {
        TaggedItem::Boundary {
            timestamp_ms,
            provisional: true,
        }
    }

    fn fragment(text: &str) -> TaggedItem {
        TaggedItem::Fragment {
            text: text.to_string(),
            provisional: false,
            sentence_start: false,
        }
    }

    fn lookahead_fragment(text: &str) -> TaggedItem {
        TaggedItem::Fragment {
            text: text.to_string(),
            provisional: true,
            sentence_start: false,
        }
    }

    #[test]
    fn concatenates_fragments_without_separator() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("hello "),
            fragment("world"),
            boundary(10.0),
        ]);
        assert_eq!(event.tokens.len(), 1);
        let token = &event.tokens[0];
        assert_eq!(token.text, "hello world");
        assert_eq!(token.start_ms, 0.0);
        assert_eq!(token.end_ms, 10.0);
        assert!(token.is_final);
        assert!(!token.nonspeech);
        assert_eq!(event.final_audio_proc_ms, 10.0);
        assert_eq!(event.total_audio_proc_ms, 10.0);
    }

    #[test]
    fn groups_final_and_lookahead_text_into_one_provisional_token() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("final"),
            lookahead_fragment("partial"),
            lookahead_boundary(10.0),
        ]);
        assert_eq!(event.tokens.len(), 1);
        let token = &event.tokens[0];
        assert_eq!(token.text, "finalpartial");
        assert!(!token.is_final);
        // The provisional boundary does not advance commitment.
        assert_eq!(event.final_audio_proc_ms, 0.0);
        assert_eq!(event.total_audio_proc_ms, 10.0);
    }

    #[test]
    fn confirmed_text_carries_forward_across_frames() {
        let mut stabilizer = Stabilizer::new("pnc");
        stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("stay "),
            lookahead_fragment("guess"),
            lookahead_boundary(10.0),
        ]);
        // The next frame revises the lookahead; the confirmed prefix remains.
        let event = stabilizer.process_frame(vec![fragment("put"), boundary(20.0)]);
        assert_eq!(event.tokens.len(), 1);
        assert_eq!(event.tokens[0].text, "stay put");
        assert_eq!(event.tokens[0].start_ms, 0.0);
        assert_eq!(event.tokens[0].end_ms, 20.0);
        assert!(event.tokens[0].is_final);
        assert_eq!(event.final_audio_proc_ms, 20.0);
    }

    #[test]
    fn repeated_boundary_timestamp_never_reemits() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("a"),
            boundary(10.0),
            fragment("b"),
            boundary(10.0),
            fragment("c"),
            boundary(20.0),
        ]);
        let texts: Vec<&str> = event.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert_eq!(event.tokens[1].start_ms, 10.0);
        assert_eq!(event.tokens[1].end_ms, 20.0);
    }

    #[test]
    fn sentence_start_capitalizes_first_letter_only() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(vec![
            boundary(0.0),
            TaggedItem::Fragment {
                text: " hello there".to_string(),
                provisional: false,
                sentence_start: true,
            },
            boundary(10.0),
        ]);
        assert_eq!(event.tokens[0].text, " Hello there");
    }

    #[test]
    fn nonspeech_marker_flags_token() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("[n::cough]"),
            boundary(10.0),
        ]);
        assert!(event.tokens[0].nonspeech);
    }

    #[test]
    fn empty_frame_produces_no_tokens_and_keeps_state() {
        let mut stabilizer = Stabilizer::new("pnc");
        let event = stabilizer.process_frame(Vec::new());
        assert!(event.tokens.is_empty());
        assert_eq!(event.final_audio_proc_ms, 0.0);
        assert_eq!(event.total_audio_proc_ms, 0.0);
    }

    #[test]
    fn finish_flushes_trailing_text_as_final() {
        let mut stabilizer = Stabilizer::new("pnc");
        stabilizer.process_frame(vec![
            boundary(0.0),
            fragment("a"),
            lookahead_boundary(10.0),
            lookahead_fragment("c"),
        ]);
        let closing = stabilizer.finish().expect("flush");
        assert_eq!(closing.tokens.len(), 1);
        let token = &closing.tokens[0];
        assert_eq!(token.text, "c");
        assert_eq!(token.start_ms, 0.0);
        assert_eq!(token.end_ms, 10.0);
        assert!(token.is_final);
        assert_eq!(closing.final_audio_proc_ms, 10.0);
        assert_eq!(closing.total_audio_proc_ms, 10.0);
        assert!(stabilizer.finish().is_none());
    }

    #[test]
    fn finish_is_quiet_without_unflushed_text() {
        let mut stabilizer = Stabilizer::new("pnc");
        stabilizer.process_frame(vec![boundary(0.0), fragment("done"), boundary(10.0)]);
        assert!(stabilizer.finish().is_none());
    }

    #[test]
    fn capitalization_handles_non_letters_and_unicode() {
        assert_eq!(capitalize_first_alpha("  žluva"), "  Žluva");
        assert_eq!(capitalize_first_alpha("42nd"), "42Nd");
        assert_eq!(capitalize_first_alpha("..."), "...");
        assert_eq!(capitalize_first_alpha(""), "");
    }
}
