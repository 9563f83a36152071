//! Voice command system: recognition engine lifecycle, wake gating, and the
//! comment sub-mode.
//!
//! Exactly one recognition session generation is live at any time — the main
//! wake-gated session or the comment session's dedicated engine, never both.
//! A transition always stops the old generation before starting the next,
//! and every incoming engine event carries the generation it belongs to so
//! events from a torn-down engine are discarded.

pub mod comment_session;
pub mod router;
pub mod wake;

use tracing::{debug, info, warn};

use crate::ipc::{Severity, UiEvent, UiSender};
use comment_session::{CommentSession, SessionEffect};
use wake::{WakeEffect, WakeGate};

/// Delay before restarting recognition after a recoverable engine error.
pub const ENGINE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Recognition engine contract: start or stop a session. Events come back
/// separately, tagged with the generation passed to `start`.
pub trait RecognitionEngine: Send {
    fn start(&self, generation: u64);
    fn stop(&self, generation: u64);
}

/// Host-delegated recognizer: the host runs the continuous,
/// interim-enabled recognition session and streams events back.
pub struct HostRecognizer {
    ui: UiSender,
    lang: String,
}

impl HostRecognizer {
    pub fn new(ui: UiSender, lang: &str) -> Self {
        Self {
            ui,
            lang: lang.to_string(),
        }
    }
}

impl RecognitionEngine for HostRecognizer {
    fn start(&self, generation: u64) {
        self.ui.send(UiEvent::StartRecognition {
            generation,
            lang: self.lang.clone(),
            continuous: true,
            interim: true,
        });
    }

    fn stop(&self, generation: u64) {
        self.ui.send(UiEvent::StopRecognition { generation });
    }
}

/// What the app loop must do after a voice event: route a command, persist a
/// comment, or adjust a timer. Engine and UI side effects happen inside the
/// system itself.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutput {
    /// Route this transcript through the command router.
    Command(String),
    /// Persist a comment captured by the session.
    SaveComment { text: String, anchor_words: usize },
    ArmWakeDeadline,
    DisarmWakeDeadline,
    ArmDebounce(String),
    DisarmDebounce,
    /// Restart the engine after `ENGINE_RETRY_DELAY`.
    ArmEngineRestart,
}

/// The voice system: engine handle, generation counter, wake gate, and the
/// optional comment session.
pub struct VoiceSystem {
    ui: UiSender,
    engine: Box<dyn RecognitionEngine>,
    gate: WakeGate,
    session: Option<CommentSession>,
    enabled: bool,
    listening: bool,
    generation: u64,
}

impl VoiceSystem {
    pub fn new(ui: UiSender, engine: Box<dyn RecognitionEngine>, wake_phrase: &str) -> Self {
        Self {
            ui,
            engine,
            gate: WakeGate::new(wake_phrase),
            session: None,
            enabled: false,
            listening: false,
            generation: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_awake(&self) -> bool {
        self.gate.is_awake()
    }

    pub fn in_comment_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the host confirmed an engine is actually running (may lag
    /// `is_enabled` across restarts).
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User toggle. Enabling starts a fresh dormant session; disabling tears
    /// everything down, discarding any comment session in progress.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<VoiceOutput> {
        if enabled == self.enabled {
            return Vec::new();
        }
        self.enabled = enabled;
        if enabled {
            self.start_engine();
            self.ui
                .status("Voice control enabled — say the wake phrase", Severity::Success);
            return Vec::new();
        }

        let mut out = Vec::new();
        if self.session.take().is_some() {
            self.ui.send(UiEvent::RecordingIndicator {
                active: false,
                preview: String::new(),
            });
            self.ui
                .status("Comment recording discarded", Severity::Warning);
        }
        let effects = self.gate.force_sleep();
        out.extend(self.apply_gate_effects(effects));
        self.stop_engine();
        self.ui.status("Voice control disabled", Severity::Info);
        out
    }

    /// Engine confirmed the session started.
    pub fn handle_started(&mut self, generation: u64) {
        if self.is_stale(generation) {
            return;
        }
        self.listening = true;
        self.ui.send(UiEvent::ListeningChanged { listening: true });
    }

    /// One recognition result from the host engine.
    pub fn handle_result(
        &mut self,
        generation: u64,
        transcript: &str,
        is_final: bool,
    ) -> Vec<VoiceOutput> {
        if self.is_stale(generation) || !self.enabled {
            return Vec::new();
        }
        if self.session.is_some() {
            let effects = self
                .session
                .as_mut()
                .unwrap()
                .handle_transcript(transcript, is_final);
            return self.apply_session_effects(effects);
        }
        let effects = self.gate.handle_transcript(transcript, is_final);
        self.apply_gate_effects(effects)
    }

    /// Recognition error. Recoverable reasons schedule a retry; anything
    /// else disables voice mode until the user re-enables it.
    pub fn handle_error(&mut self, generation: u64, reason: &str) -> Vec<VoiceOutput> {
        if self.is_stale(generation) {
            return Vec::new();
        }
        if self.session.is_some() {
            let effects = self.session.as_mut().unwrap().engine_error(reason);
            return self.apply_session_effects(effects);
        }
        self.listening = false;
        self.ui.send(UiEvent::ListeningChanged { listening: false });
        match reason {
            "no-speech" | "audio-capture" => {
                debug!(reason, "Recoverable recognition error, retrying");
                vec![VoiceOutput::ArmEngineRestart]
            }
            _ => {
                warn!(reason, "Fatal recognition error, disabling voice mode");
                self.enabled = false;
                let effects = self.gate.force_sleep();
                let mut out = self.apply_gate_effects(effects);
                out.push(VoiceOutput::DisarmDebounce);
                self.ui.status(
                    format!("Voice recognition failed ({}) — voice mode off", reason),
                    Severity::Error,
                );
                out
            }
        }
    }

    /// The engine's session ended. A continuous session ending on its own is
    /// restarted (both in the main mode and mid-comment).
    pub fn handle_ended(&mut self, generation: u64) -> Vec<VoiceOutput> {
        if self.is_stale(generation) {
            return Vec::new();
        }
        if self.session.is_some() {
            let effects = self.session.as_mut().unwrap().engine_ended();
            return self.apply_session_effects(effects);
        }
        if self.enabled {
            debug!("Main recognition session ended, restarting");
            self.start_engine();
        }
        Vec::new()
    }

    /// The 2 s retry timer fired.
    pub fn retry_elapsed(&mut self) {
        if self.enabled && self.session.is_none() {
            self.start_engine();
        }
    }

    /// The 10 s wake deadline fired.
    pub fn deadline_elapsed(&mut self) -> Vec<VoiceOutput> {
        let effects = self.gate.deadline_elapsed();
        self.apply_gate_effects(effects)
    }

    /// The 1.5 s interim debounce fired with `pending` unsuperseded.
    pub fn debounce_elapsed(&mut self, pending: String) -> Vec<VoiceOutput> {
        let effects = self.gate.debounce_elapsed(pending);
        self.apply_gate_effects(effects)
    }

    /// The "wake up" voice command.
    pub fn wake_command(&mut self) -> Vec<VoiceOutput> {
        let effects = self.gate.refresh();
        self.apply_gate_effects(effects)
    }

    /// The "go to sleep" voice command.
    pub fn sleep_command(&mut self) -> Vec<VoiceOutput> {
        let effects = self.gate.force_sleep();
        self.apply_gate_effects(effects)
    }

    /// Enter the comment sub-mode: force the gate dormant, tear down the
    /// main engine, start the dedicated one.
    pub fn begin_comment_session(&mut self, anchor_words: usize) -> Vec<VoiceOutput> {
        if self.session.is_some() {
            self.ui
                .status("Already recording a comment", Severity::Warning);
            return Vec::new();
        }
        let effects = self.gate.force_sleep();
        let mut out = self.apply_gate_effects(effects);
        // Main engine goes away entirely; the session gets a fresh one.
        self.stop_engine();
        self.session = Some(CommentSession::new(anchor_words));
        self.start_engine();
        self.ui.send(UiEvent::RecordingIndicator {
            active: true,
            preview: String::new(),
        });
        self.ui.status(
            "Recording comment — say 'stop comment' to finish",
            Severity::Info,
        );
        info!(anchor_words, "Comment session started");
        out.push(VoiceOutput::DisarmWakeDeadline);
        out.push(VoiceOutput::DisarmDebounce);
        out
    }

    // -- internal --

    fn is_stale(&self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                event_generation = generation,
                current = self.generation,
                "Dropping stale engine event"
            );
            return true;
        }
        false
    }

    fn start_engine(&mut self) {
        self.generation += 1;
        self.engine.start(self.generation);
    }

    fn stop_engine(&mut self) {
        self.engine.stop(self.generation);
        self.listening = false;
        self.ui.send(UiEvent::ListeningChanged { listening: false });
    }

    fn apply_gate_effects(&mut self, effects: Vec<WakeEffect>) -> Vec<VoiceOutput> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                WakeEffect::Awoke => {
                    self.ui.send(UiEvent::WakeChanged { awake: true });
                    self.ui.status("Listening for commands", Severity::Success);
                }
                WakeEffect::Slept => {
                    self.ui.send(UiEvent::WakeChanged { awake: false });
                    self.ui.status("Voice dormant — say the wake phrase", Severity::Info);
                }
                WakeEffect::Dispatch(text) => out.push(VoiceOutput::Command(text)),
                WakeEffect::ArmDeadline => out.push(VoiceOutput::ArmWakeDeadline),
                WakeEffect::DisarmDeadline => out.push(VoiceOutput::DisarmWakeDeadline),
                WakeEffect::ArmDebounce(text) => out.push(VoiceOutput::ArmDebounce(text)),
                WakeEffect::DisarmDebounce => out.push(VoiceOutput::DisarmDebounce),
            }
        }
        out
    }

    fn apply_session_effects(&mut self, effects: Vec<SessionEffect>) -> Vec<VoiceOutput> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                SessionEffect::Preview(preview) => {
                    self.ui.send(UiEvent::RecordingIndicator {
                        active: true,
                        preview,
                    });
                }
                SessionEffect::RestartEngine => {
                    debug!("Comment engine ended mid-session, restarting");
                    self.start_engine();
                }
                SessionEffect::Finish(saved) => {
                    let anchor = self
                        .session
                        .as_ref()
                        .map(|s| s.anchor_words())
                        .unwrap_or(0);
                    self.session = None;
                    self.ui.send(UiEvent::RecordingIndicator {
                        active: false,
                        preview: String::new(),
                    });
                    // Dedicated engine goes away; normal listening resumes
                    // dormant on a fresh generation.
                    self.stop_engine();
                    self.start_engine();
                    match saved {
                        Some(text) => {
                            out.push(VoiceOutput::SaveComment {
                                text,
                                anchor_words: anchor,
                            });
                        }
                        None => {
                            self.ui.status("No comment to save", Severity::Warning);
                        }
                    }
                    info!("Comment session ended");
                }
            }
        }
        out
    }
}
