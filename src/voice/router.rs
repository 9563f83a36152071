//! Transcript-to-action routing.
//!
//! An ordered rule table matched by substring containment, first match wins.
//! Precedence is most-specific-first: counted skip phrasings come before the
//! generic skip rule, and "stop listening" comes before the bare "stop", so
//! no rule shadows a longer phrasing. The unit tests pin this order.

use crate::ipc::ButtonMode;

/// Every action a voice command can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DownloadFile,
    ExtractText,
    ForceOcr,
    SpeakText,
    Pause,
    Resume,
    Skip { seconds: i64 },
    AddComment,
    ShowComments,
    SummarizeComments,
    ClearComments,
    Buttons(ButtonMode),
    Wake,
    Sleep,
    Help,
    /// No rule matched; the caller must surface a visible signal.
    Unknown,
}

/// Ordered rule table. Each entry: trigger substrings, action.
static RULES: &[(&[&str], Action)] = &[
    // Counted skips before the generic skip/back rules.
    (&["skip 15", "forward 15", "skip fifteen"], Action::Skip { seconds: 15 }),
    (&["skip 5", "forward 5", "skip five"], Action::Skip { seconds: 5 }),
    (&["back 15", "rewind 15", "back fifteen"], Action::Skip { seconds: -15 }),
    (&["back 5", "rewind 5", "back five"], Action::Skip { seconds: -5 }),
    // Wake control before the generic skips ("go back to sleep" contains
    // "go back") and before playback ("stop listening" contains "stop").
    (
        &["go to sleep", "stop listening", "sleep", "deactivate"],
        Action::Sleep,
    ),
    (&["skip", "fast forward", "forward"], Action::Skip { seconds: 10 }),
    (&["go back", "rewind", "back"], Action::Skip { seconds: -10 }),
    // Playback control before speak-text: "stop speaking" contains "speak".
    (&["pause", "stop speaking", "stop reading", "stop"], Action::Pause),
    (&["resume", "continue", "keep going"], Action::Resume),
    // Extraction. "force ocr" before plain extract so "extract with ocr"
    // lands on the OCR path.
    (&["force ocr", "use ocr", "ocr"], Action::ForceOcr),
    (&["extract", "copy text", "get the text"], Action::ExtractText),
    (&["download"], Action::DownloadFile),
    (&["speak", "read aloud", "read the document", "read it"], Action::SpeakText),
    // Comments.
    (&["add comment", "new comment", "make a comment"], Action::AddComment),
    (&["show comments", "list comments", "read comments"], Action::ShowComments),
    (
        &["summarize", "summary", "generate feedback"],
        Action::SummarizeComments,
    ),
    (
        &["clear comments", "delete comments", "remove comments"],
        Action::ClearComments,
    ),
    // Buttons.
    (&["remove buttons", "hide buttons"], Action::Buttons(ButtonMode::Remove)),
    (&["force buttons"], Action::Buttons(ButtonMode::Force)),
    (&["add buttons", "show buttons"], Action::Buttons(ButtonMode::Add)),
    (&["wake up", "hello"], Action::Wake),
    (&["help", "what can i say", "commands"], Action::Help),
];

/// Map a transcript to an action: lower-cased substring containment against
/// the ordered table, first match wins, `Unknown` otherwise.
pub fn route(transcript: &str) -> Action {
    let text = transcript.trim().to_lowercase();
    if text.is_empty() {
        return Action::Unknown;
    }
    for (triggers, action) in RULES {
        if triggers.iter().any(|t| text.contains(t)) {
            return *action;
        }
    }
    Action::Unknown
}

/// Spoken-help listing for the `help` action.
pub fn help_text() -> String {
    "You can say: download file, extract text, force OCR, speak text, pause, \
     resume, skip 5, 10 or 15 seconds forward or back, add comment, show \
     comments, summarize comments, clear comments, add or remove buttons, \
     go to sleep, or help."
        .to_string()
}
