//! Comment-recording sub-mode.
//!
//! While a session is recording, recognized speech is content, never
//! commands: the only phrase with meaning is the terminator. The session is
//! a pure state machine like the wake gate — the runtime applies the
//! returned effects (restart the dedicated engine, update the preview,
//! finish and save).

/// Phrases that end the recording session.
pub const STOP_PHRASES: &[&str] = &["stop comment", "end comment"];

/// Effects the runtime applies after a session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Update the live recording preview (interim text, not persisted).
    Preview(String),
    /// The dedicated engine stopped itself mid-session; start it again.
    RestartEngine,
    /// Session over. `Some(text)` is the comment to persist; `None` means
    /// the buffer was empty and there is nothing to save.
    Finish(Option<String>),
}

/// One comment-recording session, created on "add comment".
#[derive(Debug)]
pub struct CommentSession {
    /// Word index in the narration the comment anchors to.
    anchor_words: usize,
    buffer: String,
    recording: bool,
}

impl CommentSession {
    pub fn new(anchor_words: usize) -> Self {
        Self {
            anchor_words,
            buffer: String::new(),
            recording: true,
        }
    }

    pub fn anchor_words(&self) -> usize {
        self.anchor_words
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Handle one utterance from the dedicated engine.
    pub fn handle_transcript(&mut self, raw: &str, is_final: bool) -> Vec<SessionEffect> {
        if !self.recording {
            return Vec::new();
        }

        if let Some(idx) = stop_phrase_index(raw) {
            // Words spoken before the terminator in the same utterance are
            // still content, kept with their original casing.
            if is_final {
                let prefix = raw[..idx].trim().to_string();
                self.append(&prefix);
            }
            return self.finish();
        }

        if is_final {
            self.append(raw.trim());
            vec![SessionEffect::Preview(self.buffer.clone())]
        } else {
            vec![SessionEffect::Preview(format!(
                "{} {}",
                self.buffer,
                raw.trim()
            )
            .trim()
            .to_string())]
        }
    }

    /// The dedicated engine ended on its own (a pause in speech). Keep the
    /// session alive by restarting it.
    pub fn engine_ended(&mut self) -> Vec<SessionEffect> {
        if self.recording {
            vec![SessionEffect::RestartEngine]
        } else {
            Vec::new()
        }
    }

    /// A recognition error inside the session. Recoverable reasons restart
    /// the engine; anything else ends the session with whatever was
    /// captured.
    pub fn engine_error(&mut self, reason: &str) -> Vec<SessionEffect> {
        if !self.recording {
            return Vec::new();
        }
        match reason {
            "no-speech" | "audio-capture" => vec![SessionEffect::RestartEngine],
            _ => self.finish(),
        }
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(text);
    }

    fn finish(&mut self) -> Vec<SessionEffect> {
        self.recording = false;
        let text = self.buffer.trim().to_string();
        let saved = if text.is_empty() { None } else { Some(text) };
        vec![SessionEffect::Finish(saved)]
    }
}

/// Byte index of the earliest stop phrase in `raw`, matched
/// case-insensitively against the raw text so the index is valid for
/// slicing it.
fn stop_phrase_index(raw: &str) -> Option<usize> {
    STOP_PHRASES
        .iter()
        .filter_map(|phrase| {
            (0..=raw.len().checked_sub(phrase.len())?).find(|&i| {
                raw.is_char_boundary(i)
                    && raw.as_bytes()[i..i + phrase.len()].eq_ignore_ascii_case(phrase.as_bytes())
            })
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finals_accumulate_and_stop_phrase_finishes() {
        let mut s = CommentSession::new(12);
        assert_eq!(s.anchor_words(), 12);
        s.handle_transcript("the intro needs", true);
        s.handle_transcript("a citation", true);
        let effects = s.handle_transcript("Stop Comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some(
                "the intro needs a citation".to_string()
            ))]
        );
        assert!(!s.is_recording());
    }

    #[test]
    fn no_utterance_is_ever_a_command() {
        // Command-looking text is content while recording.
        let mut s = CommentSession::new(0);
        let effects = s.handle_transcript("pause", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Preview("pause".to_string())]
        );
        s.handle_transcript("extract text and summarize", true);
        let effects = s.handle_transcript("end comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some(
                "pause extract text and summarize".to_string()
            ))]
        );
    }

    #[test]
    fn interim_feeds_preview_without_persisting() {
        let mut s = CommentSession::new(0);
        s.handle_transcript("fix the", true);
        let effects = s.handle_transcript("formatting here", false);
        assert_eq!(
            effects,
            vec![SessionEffect::Preview("fix the formatting here".to_string())]
        );
        // The interim never entered the buffer.
        let effects = s.handle_transcript("stop comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some("fix the".to_string()))]
        );
    }

    #[test]
    fn text_before_stop_phrase_in_same_final_is_kept() {
        let mut s = CommentSession::new(0);
        let effects = s.handle_transcript("needs a citation stop comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some("needs a citation".to_string()))]
        );
    }

    #[test]
    fn prefix_before_stop_phrase_keeps_original_casing() {
        let mut s = CommentSession::new(0);
        let effects = s.handle_transcript("Needs A Citation Stop Comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some("Needs A Citation".to_string()))]
        );
    }

    #[test]
    fn empty_buffer_finishes_with_nothing_to_save() {
        let mut s = CommentSession::new(0);
        let effects = s.handle_transcript("stop comment", true);
        assert_eq!(effects, vec![SessionEffect::Finish(None)]);
    }

    #[test]
    fn engine_end_mid_session_restarts() {
        let mut s = CommentSession::new(0);
        s.handle_transcript("first half", true);
        assert_eq!(s.engine_ended(), vec![SessionEffect::RestartEngine]);
        s.handle_transcript("second half", true);
        let effects = s.handle_transcript("end comment", true);
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some("first half second half".to_string()))]
        );
    }

    #[test]
    fn recoverable_error_restarts_fatal_error_finishes() {
        let mut s = CommentSession::new(0);
        s.handle_transcript("partial note", true);
        assert_eq!(s.engine_error("no-speech"), vec![SessionEffect::RestartEngine]);
        assert!(s.is_recording());
        let effects = s.engine_error("not-allowed");
        assert_eq!(
            effects,
            vec![SessionEffect::Finish(Some("partial note".to_string()))]
        );
        assert!(!s.is_recording());
    }

    #[test]
    fn events_after_finish_are_ignored() {
        let mut s = CommentSession::new(0);
        s.handle_transcript("stop comment", true);
        assert!(s.handle_transcript("more text", true).is_empty());
        assert!(s.engine_ended().is_empty());
        assert!(s.engine_error("no-speech").is_empty());
    }
}
