//! Lector core — voice assistant engine for an LMS reader companion.
//!
//! The core owns the wake-gated voice command state machine, TTS playback
//! position tracking, the comment store, the file cache, extraction
//! orchestration, and the summarization chain. Everything physical — the
//! speech recognizer/synthesizer, the PDF text layer, the OCR worker, the
//! page DOM — lives on the host side of a JSON-line IPC boundary on
//! stdin/stdout, exactly at the event contracts in `src/ipc`.

pub mod app;
pub mod cache;
pub mod comments;
pub mod config;
pub mod extract;
pub mod ipc;
pub mod playback;
pub mod storage;
pub mod summarize;
pub mod voice;
