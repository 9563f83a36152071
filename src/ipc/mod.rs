//! IPC protocol types for communication with the host extension page.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> core).
//!
//! The host side owns every physical engine: the speech recognizer and
//! synthesizer, the PDF text layer, the OCR worker, and the page DOM. The
//! core drives them through these messages and receives their events back.

pub mod bridge;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::comments::CommentRecord;

// ---------------------------------------------------------------------------
// Events: core -> host (stdout)
// ---------------------------------------------------------------------------

/// Status severity for user-visible indicator updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A synthesis request sent to the host's speech synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub rate: f64,
    pub pitch: f64,
    pub volume: f64,
}

/// Which UI button action the host should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonMode {
    Add,
    Force,
    Remove,
}

/// All events emitted to the host via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Ready {},
    /// Update the visible status indicator.
    Status { message: String, severity: Severity },
    /// Wake state changed (awake = accepting commands beyond the wake phrase).
    WakeChanged { awake: bool },
    /// Whether the recognition engine should be running at all.
    ListeningChanged { listening: bool },
    /// Start a continuous recognition session. Every event the host sends
    /// back for this session must carry the same `generation`.
    StartRecognition {
        generation: u64,
        lang: String,
        continuous: bool,
        interim: bool,
    },
    /// Stop the recognition session with this generation.
    StopRecognition { generation: u64 },
    /// Speak an utterance through the host synthesizer.
    Speak { utterance: Utterance },
    /// Cancel any in-flight synthesis.
    CancelSpeech {},
    /// Playback state for the host's play/pause indicator.
    SpeakingChanged { speaking: bool, paused: bool },
    /// Comment-recording indicator with a live transcript preview.
    RecordingIndicator { active: bool, preview: String },
    /// Comment listing for the current assignment.
    Comments { comments: Vec<CommentRecord> },
    /// A generated feedback summary. `source` names the provider that
    /// produced it ("gemini", "openai", "local").
    Summary { text: String, source: String },
    /// Extracted document text, also placed on the clipboard.
    ExtractedText { file_id: String, text: String },
    /// A file entered the cache (either freshly fetched or restored).
    FileCached { file_id: String, file_name: String },
    /// Render/remove the helper buttons on the page.
    Buttons { mode: ButtonMode },
    /// Ask the host PDF engine for the text layer of every page.
    PdfTextRequest { request_id: String, data: String },
    /// Ask the host PDF engine to rasterize every page to an image.
    /// For plain image input the host replies with the image as one page.
    RenderPagesRequest { request_id: String, data: String },
    /// Ask the host OCR worker to recognize one page image.
    OcrRequest { request_id: String, image: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    Ping {},
    Stop {},
    /// User toggled the voice system on or off.
    SetVoiceEnabled { enabled: bool },
    /// The host page navigated; the URL carries the assignment id.
    PageChanged { url: String },
    /// User clicked delete on a comment in the host's list.
    DeleteComment { id: i64 },
    /// The host detected a file link. When `already_cached` is false the
    /// host's network layer has fetched the bytes and base64-encoded them
    /// into `data`.
    FileDetected {
        url: String,
        file_name: String,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        already_cached: bool,
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        mime_type: Option<String>,
    },
    // Recognition engine events, tagged with the generation of the session
    // they belong to so stale events from a torn-down engine are discarded.
    RecognitionStarted { generation: u64 },
    RecognitionResult {
        generation: u64,
        transcript: String,
        is_final: bool,
    },
    RecognitionError { generation: u64, reason: String },
    RecognitionEnded { generation: u64 },
    // Synthesis engine events.
    SynthesisStarted {},
    SynthesisEnded {},
    SynthesisError { reason: String },
    // Engine replies correlated by request id.
    PdfTextReply {
        request_id: String,
        #[serde(default)]
        pages: Vec<String>,
        #[serde(default)]
        error: Option<String>,
    },
    RenderPagesReply {
        request_id: String,
        #[serde(default)]
        pages: Vec<String>,
        #[serde(default)]
        error: Option<String>,
    },
    OcrReply {
        request_id: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// UiSender
// ---------------------------------------------------------------------------

/// Cloneable handle for emitting events toward the host.
///
/// Events flow through a channel drained by the stdout writer task, so any
/// component (or spawned task) can hold a sender without touching stdout
/// directly. Tests capture the receiving end instead.
#[derive(Clone)]
pub struct UiSender {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiSender {
    /// Create a sender and the receiver the writer task (or a test) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: UiEvent) {
        // Receiver dropped means the process is shutting down.
        let _ = self.tx.send(event);
    }

    /// Shorthand for the status indicator every failure path must update.
    pub fn status(&self, message: impl Into<String>, severity: Severity) {
        self.send(UiEvent::Status {
            message: message.into(),
            severity,
        });
    }
}

// ---------------------------------------------------------------------------
// CallTable: request/reply correlation for host engine calls
// ---------------------------------------------------------------------------

/// Reply payload for a correlated host engine call.
#[derive(Debug, Clone)]
pub enum HostReply {
    Pages(Vec<String>),
    Text(String),
    Failure(String),
}

/// Pending host engine calls keyed by request id.
///
/// The main loop completes entries when the matching reply command arrives;
/// the awaiting task gets the payload through a oneshot channel.
#[derive(Clone, Default)]
pub struct CallTable {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<HostReply>>>>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh request id and get the receiver for its reply.
    pub fn register(&self) -> (String, oneshot::Receiver<HostReply>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(id.clone(), tx);
        (id, rx)
    }

    /// Complete a pending call. Returns false for unknown ids (late or
    /// duplicate replies), which are logged and dropped.
    pub fn complete(&self, request_id: &str, reply: HostReply) -> bool {
        match self.inner.lock().unwrap().remove(request_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                warn!(request_id, "Reply for unknown request id");
                false
            }
        }
    }

    /// Drop a pending call without completing it (timeout path).
    pub fn forget(&self, request_id: &str) {
        self.inner.lock().unwrap().remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_event_serializes_with_event_tag() {
        let ev = UiEvent::Status {
            message: "ready".to_string(),
            severity: Severity::Info,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["data"]["message"], "ready");
        assert_eq!(json["data"]["severity"], "info");
    }

    #[test]
    fn host_command_deserializes_with_command_tag() {
        let cmd: HostCommand = serde_json::from_str(
            r#"{"command": "recognition_result", "generation": 3,
                "transcript": "hey lector", "is_final": true}"#,
        )
        .unwrap();
        match cmd {
            HostCommand::RecognitionResult {
                generation,
                transcript,
                is_final,
            } => {
                assert_eq!(generation, 3);
                assert_eq!(transcript, "hey lector");
                assert!(is_final);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn file_detected_defaults_optional_fields() {
        let cmd: HostCommand = serde_json::from_str(
            r#"{"command": "file_detected", "url": "https://lms/a/1/file.pdf",
                "file_name": "file.pdf"}"#,
        )
        .unwrap();
        match cmd {
            HostCommand::FileDetected {
                already_cached,
                data,
                mime_type,
                ..
            } => {
                assert!(!already_cached);
                assert!(data.is_none());
                assert!(mime_type.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn call_table_round_trip() {
        let calls = CallTable::new();
        let (id, rx) = calls.register();
        assert!(calls.complete(&id, HostReply::Text("hi".to_string())));
        match rx.await.unwrap() {
            HostReply::Text(t) => assert_eq!(t, "hi"),
            other => panic!("unexpected reply: {:?}", other),
        }
        // Second completion for the same id is dropped.
        assert!(!calls.complete(&id, HostReply::Text("again".to_string())));
    }
}
