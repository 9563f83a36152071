//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel into the async main loop; a writer task drains the UI event
//! channel to stdout as JSON lines.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{HostCommand, Severity, UiEvent};

/// Emit a `UiEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &UiEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Ignore write/flush errors — pipe may be closed.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Spawn the task that drains UI events to stdout.
pub fn spawn_ui_writer(mut rx: mpsc::UnboundedReceiver<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            emit_event(&event);
        }
        debug!("UI writer task exiting");
    })
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `HostCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (host gone) or on unrecoverable
/// read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<HostCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<HostCommand>(trimmed) {
                        Ok(cmd) => {
                            debug!(?cmd, "Received command from host");
                            if tx.send(cmd).is_err() {
                                break; // Receiver dropped — main task is gone.
                            }
                        }
                        Err(e) => {
                            error!("Invalid JSON command: {} — input: {}", e, trimmed);
                            emit_event(&UiEvent::Status {
                                message: format!("Invalid JSON command: {}", e),
                                severity: Severity::Error,
                            });
                        }
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break; // stdin closed
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}
