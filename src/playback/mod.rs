//! Text-to-speech playback with pause/resume/skip.
//!
//! The synthesis engine has no native seek, so position is an estimate:
//! elapsed wall clock times a fixed speaking rate (2.5 words/sec, ~150 wpm).
//! Pause and skip cancel the in-flight utterance and re-speak the remainder;
//! resume restarts the estimator against the truncated text rather than the
//! absolute original position (preserved behavior of the original system —
//! `words_spoken` is the single place to change if that is ever corrected).

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SpeechSettings;
use crate::ipc::{Severity, UiEvent, UiSender, Utterance};

/// Estimated speaking rate. An estimator, not a measurement: the synthesis
/// engine reports no ground-truth position.
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Reason string the host sends when synthesis ends because we cancelled it.
pub const INTERRUPTED: &str = "interrupted";

/// How many words were spoken in `elapsed`, by the fixed-rate estimate.
pub fn words_spoken(elapsed: Duration) -> usize {
    (elapsed.as_secs_f64() * WORDS_PER_SECOND).floor() as usize
}

/// New word position after skipping `delta_secs` from `current`, clamped to
/// `[0, word_count]`.
pub fn skip_target(current: usize, delta_secs: i64, word_count: usize) -> usize {
    let delta_words = (delta_secs.unsigned_abs() as f64 * WORDS_PER_SECOND) as usize;
    if delta_secs >= 0 {
        (current + delta_words).min(word_count)
    } else {
        current.saturating_sub(delta_words)
    }
}

// ---------------------------------------------------------------------------
// Synthesis engine boundary
// ---------------------------------------------------------------------------

/// Synthesis engine contract: issue or cancel a request. Events come back
/// separately (see `SynthesisEvent`).
pub trait SynthesisEngine: Send {
    fn speak(&self, utterance: &Utterance);
    fn cancel(&self);
}

/// Host-delegated synthesizer: requests travel over IPC.
pub struct HostSynthesizer {
    ui: UiSender,
}

impl HostSynthesizer {
    pub fn new(ui: UiSender) -> Self {
        Self { ui }
    }
}

impl SynthesisEngine for HostSynthesizer {
    fn speak(&self, utterance: &Utterance) {
        self.ui.send(UiEvent::Speak {
            utterance: utterance.clone(),
        });
    }

    fn cancel(&self) {
        self.ui.send(UiEvent::CancelSpeech {});
    }
}

/// Engine events the host reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Error(String),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Narration state for the current utterance.
#[derive(Debug)]
struct Narration {
    text: String,
    word_count: usize,
    position_words: usize,
    speaking: bool,
    paused: bool,
    started_at: Instant,
}

/// Drives playback: at most one synthesis request in flight, always
/// cancelled before a new one is issued.
pub struct PlaybackController {
    engine: Box<dyn SynthesisEngine>,
    ui: UiSender,
    settings: SpeechSettings,
    narration: Option<Narration>,
    /// Set when we cancel our own request, so the resulting end/error event
    /// is not read as a user stop or a real failure.
    interrupting: bool,
    /// Whether a synthesis request is outstanding at the host. Cancelling
    /// when none is avoids arming `interrupting` with no event to consume it.
    request_live: bool,
}

impl PlaybackController {
    pub fn new(engine: Box<dyn SynthesisEngine>, ui: UiSender, settings: SpeechSettings) -> Self {
        Self {
            engine,
            ui,
            settings,
            narration: None,
            interrupting: false,
            request_live: false,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.narration.as_ref().is_some_and(|n| n.speaking)
    }

    pub fn is_paused(&self) -> bool {
        self.narration.as_ref().is_some_and(|n| n.paused)
    }

    /// Current word-index estimate: live position while speaking, the frozen
    /// position while paused, 0 otherwise.
    pub fn position_estimate(&self) -> usize {
        self.position_estimate_at(Instant::now())
    }

    pub fn position_estimate_at(&self, now: Instant) -> usize {
        match &self.narration {
            Some(n) if n.speaking => {
                words_spoken(now.duration_since(n.started_at)).min(n.word_count)
            }
            Some(n) if n.paused => n.position_words,
            _ => 0,
        }
    }

    /// Start speaking `text` from the beginning, cancelling anything in
    /// flight.
    pub fn speak(&mut self, text: &str) {
        self.speak_at(text, Instant::now());
    }

    pub fn speak_at(&mut self, text: &str, now: Instant) {
        if text.trim().is_empty() {
            self.ui.status("Nothing to read", Severity::Warning);
            return;
        }
        self.cancel_current();
        let word_count = text.split_whitespace().count();
        self.narration = Some(Narration {
            text: text.to_string(),
            word_count,
            position_words: 0,
            speaking: false,
            paused: false,
            started_at: now,
        });
        self.engine.speak(&Utterance {
            text: text.to_string(),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            volume: self.settings.volume,
        });
        self.request_live = true;
        debug!(words = word_count, "Synthesis requested");
    }

    /// Pause playback, freezing the estimated position. Returns the frozen
    /// position, or `None` when nothing was being spoken (a visible status
    /// is emitted instead of a silent no-op).
    pub fn pause(&mut self) -> Option<usize> {
        self.pause_at(Instant::now())
    }

    pub fn pause_at(&mut self, now: Instant) -> Option<usize> {
        let Some(n) = self.narration.as_mut() else {
            self.ui.status("Nothing is being read", Severity::Warning);
            return None;
        };
        if !n.speaking || n.paused {
            self.ui.status("Nothing is being read", Severity::Warning);
            return None;
        }
        let position = words_spoken(now.duration_since(n.started_at)).min(n.word_count);
        n.position_words = position;
        n.paused = true;
        n.speaking = false;
        self.cancel_current();
        self.emit_speaking_state();
        self.ui.status(
            format!("Paused at word {}", position),
            Severity::Info,
        );
        Some(position)
    }

    /// Resume from the paused position, or start over when stopped with text
    /// still loaded.
    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    pub fn resume_at(&mut self, now: Instant) {
        enum Plan {
            Remaining(String),
            StartOver(String),
            Already,
            NoMore,
            NoText,
        }
        let plan = match &self.narration {
            Some(n) if n.paused => {
                let remaining = n
                    .text
                    .split_whitespace()
                    .skip(n.position_words)
                    .collect::<Vec<_>>()
                    .join(" ");
                if remaining.is_empty() {
                    Plan::NoMore
                } else {
                    Plan::Remaining(remaining)
                }
            }
            Some(n) if n.speaking => Plan::Already,
            Some(n) => Plan::StartOver(n.text.clone()),
            None => Plan::NoText,
        };
        match plan {
            // Estimator restarts against the truncated text.
            Plan::Remaining(text) => self.speak_at(&text, now),
            // Stopped with text loaded: treat resume as start over.
            Plan::StartOver(text) => self.speak_at(&text, now),
            Plan::Already => self.ui.status("Already reading", Severity::Info),
            Plan::NoMore => {
                if let Some(n) = self.narration.as_mut() {
                    n.paused = false;
                }
                self.emit_speaking_state();
                self.ui.status("No more text to read", Severity::Info);
            }
            Plan::NoText => self.ui.status("No text to read", Severity::Warning),
        }
    }

    /// Skip forward or back by `delta_secs` of estimated speech, clamped to
    /// the text bounds. Only valid while speaking.
    pub fn skip(&mut self, delta_secs: i64) {
        self.skip_at(delta_secs, Instant::now());
    }

    pub fn skip_at(&mut self, delta_secs: i64, now: Instant) {
        let remaining = match &self.narration {
            Some(n) if n.speaking => {
                let current = words_spoken(now.duration_since(n.started_at)).min(n.word_count);
                let target = skip_target(current, delta_secs, n.word_count);
                n.text
                    .split_whitespace()
                    .skip(target)
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            _ => {
                self.ui.status("Nothing is being read", Severity::Warning);
                return;
            }
        };
        if remaining.is_empty() {
            // Clamped to the end: stop cleanly.
            self.cancel_current();
            if let Some(n) = self.narration.as_mut() {
                n.position_words = n.word_count;
                n.speaking = false;
                n.paused = false;
            }
            self.emit_speaking_state();
            self.ui.status("Skipped to the end", Severity::Info);
            return;
        }
        self.speak_at(&remaining, now);
        self.ui.status(
            format!(
                "Skipped {} {} seconds",
                if delta_secs >= 0 { "forward" } else { "back" },
                delta_secs.abs()
            ),
            Severity::Info,
        );
    }

    /// Stop playback entirely and clear the narration.
    pub fn stop(&mut self) {
        self.cancel_current();
        self.narration = None;
        self.emit_speaking_state();
    }

    /// Apply a synthesis engine event from the host.
    pub fn handle_engine_event(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started => {
                if let Some(n) = self.narration.as_mut() {
                    n.speaking = true;
                    n.paused = false;
                }
                self.emit_speaking_state();
            }
            SynthesisEvent::Ended => {
                if self.interrupting {
                    // Our own cancel; the caller already set the next state.
                    self.interrupting = false;
                    return;
                }
                self.request_live = false;
                if let Some(n) = self.narration.as_mut() {
                    n.speaking = false;
                    n.paused = false;
                    n.position_words = n.word_count;
                }
                self.emit_speaking_state();
            }
            SynthesisEvent::Error(reason) => {
                if reason == INTERRUPTED {
                    self.interrupting = false;
                    return;
                }
                self.request_live = false;
                if let Some(n) = self.narration.as_mut() {
                    n.speaking = false;
                    n.paused = false;
                }
                self.emit_speaking_state();
                warn!(reason = %reason, "Synthesis failed");
                self.ui
                    .status(format!("Speech failed: {}", reason), Severity::Error);
            }
        }
    }

    fn cancel_current(&mut self) {
        if self.request_live {
            self.interrupting = true;
            self.request_live = false;
            self.engine.cancel();
        }
    }

    fn emit_speaking_state(&self) {
        self.ui.send(UiEvent::SpeakingChanged {
            speaking: self.is_speaking(),
            paused: self.is_paused(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSynthState {
        spoken: Vec<String>,
        cancels: usize,
    }

    #[derive(Clone, Default)]
    struct RecordingSynth(Arc<Mutex<RecordingSynthState>>);

    impl RecordingSynth {
        fn spoken(&self) -> Vec<String> {
            self.0.lock().unwrap().spoken.clone()
        }
        fn cancels(&self) -> usize {
            self.0.lock().unwrap().cancels
        }
    }

    impl SynthesisEngine for RecordingSynth {
        fn speak(&self, utterance: &Utterance) {
            self.0.lock().unwrap().spoken.push(utterance.text.clone());
        }
        fn cancel(&self) {
            self.0.lock().unwrap().cancels += 1;
        }
    }

    fn controller() -> (PlaybackController, RecordingSynth) {
        let (ui, _rx) = UiSender::channel();
        let synth = RecordingSynth::default();
        let ctl = PlaybackController::new(
            Box::new(synth.clone()),
            ui,
            SpeechSettings::default(),
        );
        (ctl, synth)
    }

    const TEN_WORDS: &str = "one two three four five six seven eight nine ten";

    #[test]
    fn words_spoken_at_fixed_rate() {
        assert_eq!(words_spoken(Duration::from_secs(2)), 5);
        assert_eq!(words_spoken(Duration::from_secs(0)), 0);
        assert_eq!(words_spoken(Duration::from_millis(900)), 2);
    }

    #[test]
    fn pause_after_two_seconds_freezes_position_five() {
        let (mut ctl, synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);

        let pos = ctl.pause_at(start + Duration::from_secs(2));
        assert_eq!(pos, Some(5));
        assert!(ctl.is_paused());
        assert!(!ctl.is_speaking());
        assert_eq!(synth.cancels(), 1);
    }

    #[test]
    fn resume_speaks_words_six_through_ten() {
        let (mut ctl, synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.pause_at(start + Duration::from_secs(2));

        ctl.resume_at(start + Duration::from_secs(5));
        assert_eq!(synth.spoken().last().unwrap(), "six seven eight nine ten");
    }

    #[test]
    fn pause_past_the_end_clamps_to_word_count() {
        let (mut ctl, _synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        let pos = ctl.pause_at(start + Duration::from_secs(60));
        assert_eq!(pos, Some(10));
    }

    #[test]
    fn resume_with_nothing_left_reports_no_more_text() {
        let (mut ctl, synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.pause_at(start + Duration::from_secs(60));
        let requests_before = synth.spoken().len();
        ctl.resume_at(start + Duration::from_secs(61));
        assert_eq!(synth.spoken().len(), requests_before);
        assert!(!ctl.is_paused());
    }

    #[test]
    fn pause_while_idle_is_a_visible_no_op() {
        let (ui, mut rx) = UiSender::channel();
        let synth = RecordingSynth::default();
        let mut ctl = PlaybackController::new(
            Box::new(synth.clone()),
            ui,
            SpeechSettings::default(),
        );
        assert_eq!(ctl.pause(), None);
        assert_eq!(synth.cancels(), 0);
        // The status indicator was updated, never a silent no-op.
        let mut saw_status = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, UiEvent::Status { .. }) {
                saw_status = true;
            }
        }
        assert!(saw_status);
    }

    #[test]
    fn skip_target_clamps_at_both_ends() {
        // +10s = 25 words, clamped to the 10-word text.
        assert_eq!(skip_target(5, 10, 10), 10);
        // -10s from word 5 clamps at 0.
        assert_eq!(skip_target(5, -10, 10), 0);
        // Within range moves by |delta| * 2.5 words.
        assert_eq!(skip_target(10, 5, 100), 22);
        assert_eq!(skip_target(40, -5, 100), 28);
    }

    #[test]
    fn skip_forward_then_back_never_overshoots() {
        for start in 0..30usize {
            let forward = skip_target(start, 10, 30);
            let back = skip_target(forward, -10, 30);
            assert!(back <= start.max(forward));
        }
    }

    #[test]
    fn skip_respeaks_the_remainder() {
        let (mut ctl, synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        // At t=0, skip +2s = 5 words forward.
        ctl.skip_at(2, start);
        assert_eq!(synth.spoken().last().unwrap(), "six seven eight nine ten");
    }

    #[test]
    fn skip_past_end_stops_cleanly() {
        let (mut ctl, _synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.skip_at(60, start);
        assert!(!ctl.is_speaking());
        assert!(!ctl.is_paused());
    }

    #[test]
    fn interrupted_error_after_our_cancel_leaves_state_alone() {
        let (mut ctl, _synth) = controller();
        let start = Instant::now();
        ctl.speak_at(TEN_WORDS, start);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.pause_at(start + Duration::from_secs(2));
        ctl.handle_engine_event(SynthesisEvent::Error(INTERRUPTED.to_string()));
        assert!(ctl.is_paused());
        assert_eq!(ctl.position_estimate(), 5);
    }

    #[test]
    fn real_error_stops_playback() {
        let (mut ctl, _synth) = controller();
        ctl.speak(TEN_WORDS);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.handle_engine_event(SynthesisEvent::Error("synthesis-failed".to_string()));
        assert!(!ctl.is_speaking());
        assert!(!ctl.is_paused());
    }

    #[test]
    fn natural_end_stops_playback() {
        let (mut ctl, _synth) = controller();
        ctl.speak(TEN_WORDS);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.handle_engine_event(SynthesisEvent::Ended);
        assert!(!ctl.is_speaking());
        // Stopped: estimate reports 0 (nothing live, nothing frozen).
        assert_eq!(ctl.position_estimate(), 0);
    }

    #[test]
    fn resume_when_stopped_restarts_from_beginning() {
        let (mut ctl, synth) = controller();
        ctl.speak(TEN_WORDS);
        ctl.handle_engine_event(SynthesisEvent::Started);
        ctl.handle_engine_event(SynthesisEvent::Ended);
        ctl.resume();
        assert_eq!(synth.spoken().last().unwrap(), TEN_WORDS);
    }
}
