//! Wake-phrase gating for the command stream.
//!
//! The gate is a pure state machine: each entry point takes one recognition
//! event and returns the effects the runtime must apply (dispatch a command,
//! arm or disarm a timer, announce the wake state). Timers live in the app
//! loop; the gate only decides.

use std::time::Duration;

/// Inactivity window before the gate drops back to dormant.
pub const WAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an interim transcript waits for a final before being dispatched
/// as a command anyway.
pub const INTERIM_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Interim phrases dispatched immediately, without waiting for a final
/// transcript or the debounce window.
const URGENT_PHRASES: &[&str] = &["pause", "stop", "resume", "continue"];

/// Effects the runtime applies after a gate transition.
#[derive(Debug, Clone, PartialEq)]
pub enum WakeEffect {
    /// The gate woke up: notify the UI.
    Awoke,
    /// The gate went dormant: notify the UI.
    Slept,
    /// Route this text through the command router.
    Dispatch(String),
    /// (Re)start the 10 s deactivation timer.
    ArmDeadline,
    /// Cancel the deactivation timer.
    DisarmDeadline,
    /// (Re)start the 1.5 s interim debounce holding this text.
    ArmDebounce(String),
    /// Cancel any pending interim debounce.
    DisarmDebounce,
}

/// Dormant-vs-awake command gate.
#[derive(Debug)]
pub struct WakeGate {
    wake_phrase: String,
    awake: bool,
}

impl WakeGate {
    pub fn new(wake_phrase: &str) -> Self {
        Self {
            wake_phrase: wake_phrase.trim().to_lowercase(),
            awake: false,
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Handle one recognized utterance (interim or final).
    pub fn handle_transcript(&mut self, raw: &str, is_final: bool) -> Vec<WakeEffect> {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return Vec::new();
        }

        if !self.awake {
            // Dormant: nothing passes but wake detection. The wake utterance
            // itself is never routed as a command.
            if text.contains(&self.wake_phrase) {
                self.awake = true;
                return vec![WakeEffect::Awoke, WakeEffect::ArmDeadline];
            }
            return Vec::new();
        }

        if is_final {
            return vec![
                WakeEffect::DisarmDebounce,
                WakeEffect::Dispatch(text),
                WakeEffect::ArmDeadline,
            ];
        }

        // Interim: urgent phrases jump the queue, everything else waits for
        // a final through the debounce.
        if URGENT_PHRASES.iter().any(|p| text.contains(p)) {
            return vec![
                WakeEffect::DisarmDebounce,
                WakeEffect::Dispatch(text),
                WakeEffect::ArmDeadline,
            ];
        }
        vec![WakeEffect::ArmDebounce(text)]
    }

    /// The deactivation timer fired.
    pub fn deadline_elapsed(&mut self) -> Vec<WakeEffect> {
        if !self.awake {
            return Vec::new();
        }
        self.awake = false;
        vec![WakeEffect::Slept, WakeEffect::DisarmDebounce]
    }

    /// The interim debounce fired with `pending` still unsuperseded.
    pub fn debounce_elapsed(&mut self, pending: String) -> Vec<WakeEffect> {
        if !self.awake {
            return Vec::new();
        }
        vec![WakeEffect::Dispatch(pending), WakeEffect::ArmDeadline]
    }

    /// Explicit deactivation: the sleep command, or entering the comment
    /// session (which tears the engine down entirely).
    pub fn force_sleep(&mut self) -> Vec<WakeEffect> {
        if !self.awake {
            return Vec::new();
        }
        self.awake = false;
        vec![
            WakeEffect::Slept,
            WakeEffect::DisarmDeadline,
            WakeEffect::DisarmDebounce,
        ]
    }

    /// Explicit wake command while already awake just refreshes the timer.
    pub fn refresh(&mut self) -> Vec<WakeEffect> {
        if self.awake {
            vec![WakeEffect::ArmDeadline]
        } else {
            self.awake = true;
            vec![WakeEffect::Awoke, WakeEffect::ArmDeadline]
        }
    }
}
