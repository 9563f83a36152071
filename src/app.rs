//! Application loop: host command dispatch, timer ownership, and the glue
//! between the voice system, playback, extraction, comments, and cache.

use std::collections::VecDeque;
use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{file_id_from_url, CachedFile, FileCache};
use crate::comments::{assignment_id_from_url, CommentStore};
use crate::config::CoreConfig;
use crate::extract::{ExtractionOrchestrator, HostOcrEngine, HostPdfEngine};
use crate::ipc::{
    ButtonMode, CallTable, HostCommand, HostReply, Severity, UiEvent, UiSender,
};
use crate::playback::{HostSynthesizer, PlaybackController, SynthesisEvent};
use crate::storage::Storage;
use crate::summarize::Summarizer;
use crate::voice::router::{self, Action};
use crate::voice::wake::{INTERIM_DEBOUNCE, WAKE_TIMEOUT};
use crate::voice::{
    HostRecognizer, RecognitionEngine, VoiceOutput, VoiceSystem, ENGINE_RETRY_DELAY,
};

/// Results sent back to the loop from spawned background tasks.
enum TaskResult {
    Extracted {
        file_id: String,
        text: String,
        source_label: &'static str,
        speak: bool,
    },
    Summary {
        text: String,
        source: &'static str,
    },
}

pub struct App {
    ui: UiSender,
    voice: VoiceSystem,
    playback: PlaybackController,
    comments: CommentStore,
    cache: FileCache,
    summarizer: Arc<Summarizer>,
    calls: CallTable,
    host_rx: mpsc::UnboundedReceiver<HostCommand>,
    task_tx: mpsc::UnboundedSender<TaskResult>,
    task_rx: mpsc::UnboundedReceiver<TaskResult>,
    page_url: String,
    /// Most recently detected file: (file id, file name).
    current_file: Option<(String, String)>,
    last_extracted: String,
    // One-shot timers owned by the loop; the state machines only ask for
    // them to be armed or disarmed.
    wake_deadline: Option<Instant>,
    debounce: Option<(Instant, String)>,
    engine_restart: Option<Instant>,
}

impl App {
    pub fn new(
        cfg: &CoreConfig,
        ui: UiSender,
        storage: Storage,
        host_rx: mpsc::UnboundedReceiver<HostCommand>,
    ) -> Self {
        let calls = CallTable::new();
        let recognizer: Box<dyn RecognitionEngine> =
            Box::new(HostRecognizer::new(ui.clone(), &cfg.language));
        let synthesizer = Box::new(HostSynthesizer::new(ui.clone()));
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        Self {
            voice: VoiceSystem::new(ui.clone(), recognizer, &cfg.wake_phrase),
            playback: PlaybackController::new(synthesizer, ui.clone(), cfg.speech.clone()),
            comments: CommentStore::new(storage.clone()),
            cache: FileCache::new(storage, cfg.cache_limit_bytes),
            summarizer: Arc::new(Summarizer::new(&cfg.summarizer)),
            calls,
            host_rx,
            task_tx,
            task_rx,
            page_url: String::new(),
            current_file: None,
            last_extracted: String::new(),
            wake_deadline: None,
            debounce: None,
            engine_restart: None,
            ui,
        }
    }

    /// Main loop: runs until the host sends `stop` or closes stdin.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                cmd = self.host_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_host_command(cmd) {
                                break;
                            }
                        }
                        None => {
                            info!("Host closed stdin, shutting down");
                            break;
                        }
                    }
                }
                Some(result) = self.task_rx.recv() => {
                    self.handle_task_result(result);
                }
                _ = sleep_until_opt(self.wake_deadline) => {
                    self.wake_deadline = None;
                    let outputs = self.voice.deadline_elapsed();
                    self.apply_voice_outputs(outputs);
                }
                _ = sleep_until_opt(self.debounce.as_ref().map(|d| d.0)) => {
                    if let Some((_, pending)) = self.debounce.take() {
                        let outputs = self.voice.debounce_elapsed(pending);
                        self.apply_voice_outputs(outputs);
                    }
                }
                _ = sleep_until_opt(self.engine_restart) => {
                    self.engine_restart = None;
                    self.voice.retry_elapsed();
                }
            }
        }
    }

    /// Returns false when the loop should stop.
    fn handle_host_command(&mut self, cmd: HostCommand) -> bool {
        match cmd {
            HostCommand::Ping {} => self.ui.send(UiEvent::Pong {}),
            HostCommand::Stop {} => {
                self.playback.stop();
                self.ui.send(UiEvent::Stopping {});
                return false;
            }
            HostCommand::SetVoiceEnabled { enabled } => {
                let outputs = self.voice.set_enabled(enabled);
                self.apply_voice_outputs(outputs);
            }
            HostCommand::PageChanged { url } => {
                debug!(%url, "Page changed");
                self.page_url = url;
            }
            HostCommand::DeleteComment { id } => {
                if self.comments.delete(id) {
                    self.ui.status("Comment deleted", Severity::Success);
                } else {
                    self.ui
                        .status("Comment was already gone", Severity::Warning);
                }
                let assignment = assignment_id_from_url(&self.page_url);
                let list = self.comments.for_assignment(&assignment);
                self.ui.send(UiEvent::Comments { comments: list });
            }
            HostCommand::FileDetected {
                url,
                file_name,
                file_id,
                already_cached,
                data,
                mime_type,
            } => {
                self.handle_file_detected(url, file_name, file_id, already_cached, data, mime_type);
            }
            HostCommand::RecognitionStarted { generation } => {
                self.voice.handle_started(generation);
            }
            HostCommand::RecognitionResult {
                generation,
                transcript,
                is_final,
            } => {
                let outputs = self.voice.handle_result(generation, &transcript, is_final);
                self.apply_voice_outputs(outputs);
            }
            HostCommand::RecognitionError { generation, reason } => {
                let outputs = self.voice.handle_error(generation, &reason);
                self.apply_voice_outputs(outputs);
            }
            HostCommand::RecognitionEnded { generation } => {
                let outputs = self.voice.handle_ended(generation);
                self.apply_voice_outputs(outputs);
            }
            HostCommand::SynthesisStarted {} => {
                self.playback.handle_engine_event(SynthesisEvent::Started);
            }
            HostCommand::SynthesisEnded {} => {
                self.playback.handle_engine_event(SynthesisEvent::Ended);
            }
            HostCommand::SynthesisError { reason } => {
                self.playback
                    .handle_engine_event(SynthesisEvent::Error(reason));
            }
            HostCommand::PdfTextReply {
                request_id,
                pages,
                error,
            }
            | HostCommand::RenderPagesReply {
                request_id,
                pages,
                error,
            } => {
                let reply = match error {
                    Some(reason) => HostReply::Failure(reason),
                    None => HostReply::Pages(pages),
                };
                self.calls.complete(&request_id, reply);
            }
            HostCommand::OcrReply {
                request_id,
                text,
                error,
            } => {
                let reply = match error {
                    Some(reason) => HostReply::Failure(reason),
                    None => HostReply::Text(text.unwrap_or_default()),
                };
                self.calls.complete(&request_id, reply);
            }
        }
        true
    }

    fn handle_file_detected(
        &mut self,
        url: String,
        file_name: String,
        file_id: Option<String>,
        already_cached: bool,
        data: Option<String>,
        mime_type: Option<String>,
    ) {
        let id = file_id.unwrap_or_else(|| file_id_from_url(&url));
        info!(file_id = %id, %file_name, "File detected");
        self.current_file = Some((id.clone(), file_name.clone()));
        self.last_extracted.clear();
        self.ui.send(UiEvent::Buttons {
            mode: ButtonMode::Add,
        });

        if self.cache.contains(&id) {
            self.ui.send(UiEvent::FileCached {
                file_id: id,
                file_name: file_name.clone(),
            });
            self.ui
                .status(format!("Using cached copy of {}", file_name), Severity::Info);
            return;
        }

        let Some(encoded) = data else {
            if already_cached {
                // Host believed we had it but our cache evicted it; the
                // host will resend with data on the next detection.
                debug!(file_id = %id, "Cached flag set but entry missing");
            } else {
                warn!(file_id = %id, "File detected without data");
            }
            return;
        };
        let bytes = match base64::engine::general_purpose::STANDARD.decode(&encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Invalid file payload from host: {}", e);
                self.ui
                    .status("Could not read the detected file", Severity::Error);
                return;
            }
        };

        self.cache.insert(CachedFile {
            file_id: id.clone(),
            file_name: file_name.clone(),
            mime_type: mime_type.unwrap_or_else(|| "application/pdf".to_string()),
            bytes,
            cached_at: Utc::now(),
        });
        self.ui.send(UiEvent::FileCached {
            file_id: id,
            file_name: file_name.clone(),
        });
        self.ui
            .status(format!("Cached {}", file_name), Severity::Success);
    }

    /// Drain voice outputs, performing commands as they surface. Commands
    /// can produce further outputs (wake/sleep, comment sessions), so this
    /// works through a queue rather than recursing.
    fn apply_voice_outputs(&mut self, outputs: Vec<VoiceOutput>) {
        let mut queue: VecDeque<VoiceOutput> = outputs.into();
        while let Some(output) = queue.pop_front() {
            match output {
                VoiceOutput::Command(text) => {
                    let action = router::route(&text);
                    debug!(%text, ?action, "Dispatching command");
                    queue.extend(self.perform(action, &text));
                }
                VoiceOutput::SaveComment { text, anchor_words } => {
                    self.save_comment(&text, anchor_words);
                }
                VoiceOutput::ArmWakeDeadline => {
                    self.wake_deadline = Some(Instant::now() + WAKE_TIMEOUT);
                }
                VoiceOutput::DisarmWakeDeadline => self.wake_deadline = None,
                VoiceOutput::ArmDebounce(text) => {
                    self.debounce = Some((Instant::now() + INTERIM_DEBOUNCE, text));
                }
                VoiceOutput::DisarmDebounce => self.debounce = None,
                VoiceOutput::ArmEngineRestart => {
                    self.engine_restart = Some(Instant::now() + ENGINE_RETRY_DELAY);
                }
            }
        }
    }

    fn perform(&mut self, action: Action, raw: &str) -> Vec<VoiceOutput> {
        match action {
            Action::DownloadFile => self.download_current_file(),
            Action::ExtractText => self.start_extraction(false, false),
            Action::ForceOcr => self.start_extraction(true, false),
            Action::SpeakText => {
                if !self.last_extracted.is_empty() {
                    let text = self.last_extracted.clone();
                    self.playback.speak(&text);
                } else if self.current_file.is_some() {
                    self.start_extraction(false, true);
                } else {
                    self.ui
                        .status("Nothing to read — open a document first", Severity::Warning);
                }
            }
            Action::Pause => {
                let _ = self.playback.pause();
            }
            Action::Resume => self.playback.resume(),
            Action::Skip { seconds } => self.playback.skip(seconds),
            Action::AddComment => {
                // Pause narration while recording; the frozen position is
                // the comment anchor.
                let anchor = if self.playback.is_speaking() {
                    self.playback.pause().unwrap_or(0)
                } else {
                    self.playback.position_estimate()
                };
                return self.voice.begin_comment_session(anchor);
            }
            Action::ShowComments => self.show_comments(),
            Action::SummarizeComments => self.start_summary(),
            Action::ClearComments => {
                self.comments.clear();
                self.ui.send(UiEvent::Comments { comments: vec![] });
                self.ui.status("All comments cleared", Severity::Success);
            }
            Action::Buttons(mode) => self.ui.send(UiEvent::Buttons { mode }),
            Action::Wake => return self.voice.wake_command(),
            Action::Sleep => return self.voice.sleep_command(),
            Action::Help => self.ui.status(router::help_text(), Severity::Info),
            Action::Unknown => {
                self.ui.status(
                    format!("Didn't catch \"{}\" — say 'help' for commands", raw),
                    Severity::Warning,
                );
            }
        }
        Vec::new()
    }

    fn download_current_file(&mut self) {
        let Some((file_id, file_name)) = self.current_file.clone() else {
            self.ui
                .status("No document to download", Severity::Warning);
            return;
        };
        let Some(file) = self.cache.get(&file_id) else {
            self.ui
                .status("Document is not cached yet", Severity::Warning);
            return;
        };
        let dir = dirs::download_dir().unwrap_or_else(crate::config::get_data_dir);
        let path = dir.join(&file_name);
        match std::fs::write(&path, &file.bytes) {
            Ok(()) => {
                info!(path = %path.display(), "File downloaded");
                self.ui
                    .status(format!("Downloaded {}", file_name), Severity::Success);
            }
            Err(e) => {
                warn!("Download failed: {}", e);
                self.ui
                    .status(format!("Could not save {}", file_name), Severity::Error);
            }
        }
    }

    fn start_extraction(&mut self, force_ocr: bool, speak: bool) {
        let Some((file_id, _)) = self.current_file.clone() else {
            self.ui
                .status("No document detected on this page", Severity::Warning);
            return;
        };
        let Some(file) = self.cache.get(&file_id) else {
            self.ui
                .status("Document is not cached yet", Severity::Warning);
            return;
        };

        let is_image = file.mime_type.starts_with("image/");
        self.ui.status(
            if force_ocr {
                "Running OCR…"
            } else {
                "Extracting text…"
            },
            Severity::Info,
        );

        let orchestrator = ExtractionOrchestrator::new(
            HostPdfEngine::new(self.ui.clone(), self.calls.clone()),
            HostOcrEngine::new(self.ui.clone(), self.calls.clone()),
        );
        let task_tx = self.task_tx.clone();
        let bytes = file.bytes;
        tokio::spawn(async move {
            let (text, source) = orchestrator.extract(&bytes, is_image, force_ocr).await;
            let _ = task_tx.send(TaskResult::Extracted {
                file_id,
                text,
                source_label: source.label(),
                speak,
            });
        });
    }

    fn show_comments(&mut self) {
        let assignment = assignment_id_from_url(&self.page_url);
        let list = self.comments.for_assignment(&assignment);
        let count = list.len();
        self.ui.send(UiEvent::Comments { comments: list });
        self.ui.status(
            match count {
                0 => "No comments yet".to_string(),
                1 => "1 comment".to_string(),
                n => format!("{} comments", n),
            },
            Severity::Info,
        );
    }

    fn start_summary(&mut self) {
        let assignment = assignment_id_from_url(&self.page_url);
        let list = self.comments.for_assignment(&assignment);
        if list.is_empty() {
            self.ui
                .status("No comments to summarize", Severity::Warning);
            return;
        }
        self.ui.status("Summarizing comments…", Severity::Info);

        let summarizer = Arc::clone(&self.summarizer);
        let document = self.last_extracted.clone();
        let task_tx = self.task_tx.clone();
        tokio::spawn(async move {
            let (text, source) = summarizer.summarize(&list, &document).await;
            let _ = task_tx.send(TaskResult::Summary { text, source });
        });
    }

    fn save_comment(&mut self, text: &str, anchor_words: usize) {
        let assignment = assignment_id_from_url(&self.page_url);
        let file_name = self
            .current_file
            .as_ref()
            .map(|(_, name)| name.clone())
            .unwrap_or_default();
        let record = self
            .comments
            .add(text, anchor_words, &assignment, &file_name);
        self.ui.status(
            format!("Comment saved at word {}", record.position_words),
            Severity::Success,
        );
        let list = self.comments.for_assignment(&assignment);
        self.ui.send(UiEvent::Comments { comments: list });
    }

    fn handle_task_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::Extracted {
                file_id,
                text,
                source_label,
                speak,
            } => {
                if text.trim().is_empty() {
                    self.ui
                        .status("No text could be extracted", Severity::Warning);
                    return;
                }
                self.last_extracted = text.clone();
                copy_to_clipboard(&text);
                self.ui.send(UiEvent::ExtractedText {
                    file_id,
                    text: text.clone(),
                });
                self.ui.status(
                    format!("Text extracted ({}) and copied", source_label),
                    Severity::Success,
                );
                if speak {
                    self.playback.speak(&text);
                }
            }
            TaskResult::Summary { text, source } => {
                self.ui.send(UiEvent::Summary {
                    text,
                    source: source.to_string(),
                });
                self.ui.status("Feedback summary ready", Severity::Success);
            }
        }
    }
}

fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_text(text.to_string()) {
                warn!("Clipboard write failed: {}", e);
            }
        }
        Err(e) => warn!("Clipboard unavailable: {}", e),
    }
}

/// Pends forever when no deadline is armed, so it can sit in a `select!`.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
