//! UI-side application state: inputs, run control, status list and log.
//!
//! Rendering lives in `main.rs`; this type owns every piece of state the
//! window shows and is only ever touched from the UI thread.

use std::{path::PathBuf, sync::Arc};

use eframe::egui;
use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{debug, error, info, warn};

use crate::{
    bridge::{CancelToken, Dispatcher, RunRequest, UiEvent, UiMessage, run_download},
    engine::{DownloadEngine, EngineOptions},
    error::AppError,
    model::{DownloadItem, ItemUpdate, LogEntry, LogLevel},
    settings::{Settings, SettingsStore},
};

/// Two-state run control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Start enabled, stop disabled
    Idle,
    /// Start disabled, stop enabled
    Running,
}

/// Blocking dialog shown on top of the main window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

pub struct AppState<E: DownloadEngine> {
    /// Playlist URL input
    pub url: String,
    /// Output directory input
    pub output_dir: String,
    pub settings: Settings,
    store: SettingsStore,
    items: Vec<DownloadItem>,
    log: Vec<LogEntry>,
    notices: Vec<Notice>,
    run_state: RunState,
    /// Id of the most recent run; messages from older runs are stale
    run_id: u64,
    /// Set once the current run's `Finished` was applied
    run_finished: bool,
    cancel: CancelToken,
    engine: Arc<E>,
    runtime: Handle,
    repaint: Option<egui::Context>,
    tx: UnboundedSender<UiMessage>,
    rx: UnboundedReceiver<UiMessage>,
}

impl<E: DownloadEngine> AppState<E> {
    pub fn new(engine: Arc<E>, store: SettingsStore, runtime: Handle, repaint: Option<egui::Context>) -> Self {
        let settings = store.load();
        let (tx, rx) = unbounded_channel();
        Self {
            url: String::new(),
            output_dir: String::new(),
            settings,
            store,
            items: Vec::new(),
            log: Vec::new(),
            notices: Vec::new(),
            run_state: RunState::Idle,
            run_id: 0,
            run_finished: true,
            cancel: CancelToken::new(),
            engine,
            runtime,
            repaint,
            tx,
            rx,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn can_start(&self) -> bool {
        self.run_state() == RunState::Idle
    }

    pub fn can_stop(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn items(&self) -> &[DownloadItem] {
        &self.items
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Mean completion of every entry seen this run, 0.0..=1.0
    pub fn overall_progress(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.items.iter().map(|item| item.percent).sum();
        sum / self.items.len() as f32 / 100.0
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notices.first()
    }

    pub fn dismiss_notice(&mut self) {
        if !self.notices.is_empty() {
            self.notices.remove(0);
        }
    }

    fn push_notice(&mut self, kind: NoticeKind, title: &str, message: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// Appends to the log pane and mirrors the line to tracing.
    pub fn log_message(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        match entry.level {
            LogLevel::Error => error!(target: "ui_log", "{}", entry.message),
            LogLevel::Warning => warn!(target: "ui_log", "{}", entry.message),
            LogLevel::Info | LogLevel::Success => info!(target: "ui_log", "{}", entry.message),
        }
        self.log.push(entry);
    }

    /// Validates inputs and launches a worker for a new run.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.run_state == RunState::Running {
            let err = AppError::RunInProgress;
            self.log_message(LogLevel::Warning, format!("Start ignored: {err}"));
            return Err(err);
        }
        let url = self.url.trim().to_string();
        let output_dir = self.output_dir.trim().to_string();
        if url.is_empty() || output_dir.is_empty() {
            self.push_notice(
                NoticeKind::Error,
                "Error",
                "Please provide a playlist URL and output directory",
            );
            return Err(AppError::MissingInput);
        }

        self.items.clear();
        self.log.clear();
        self.run_id += 1;
        self.run_finished = false;
        self.cancel = CancelToken::new();
        self.run_state = RunState::Running;

        let request = RunRequest {
            url,
            options: EngineOptions::for_run(&self.settings, &PathBuf::from(output_dir)),
        };
        let dispatcher = Dispatcher::new(self.run_id, self.tx.clone(), self.repaint.clone());
        info!(run = self.run_id, "launching download worker");
        self.runtime.spawn(run_download(
            Arc::clone(&self.engine),
            request,
            self.cancel.clone(),
            dispatcher,
        ));
        Ok(())
    }

    /// Requests cancellation and optimistically returns to Idle.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Idle {
            return;
        }
        self.cancel.cancel();
        self.log_message(LogLevel::Warning, "Stopping download...");
        self.run_state = RunState::Idle;
    }

    /// Applies every queued worker message; returns how many were applied.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            if self.apply(message) {
                applied += 1;
            }
        }
        applied
    }

    fn apply(&mut self, message: UiMessage) -> bool {
        if message.run != self.run_id || self.run_finished {
            debug!(run = message.run, current = self.run_id, "dropping stale ui event");
            return false;
        }
        match message.event {
            UiEvent::Item(update) => self.upsert_item(update),
            UiEvent::Log { level, message } => self.log_message(level, message),
            UiEvent::Finished(outcome) => {
                debug!(run = self.run_id, ?outcome, "run finished");
                self.run_finished = true;
                self.run_state = RunState::Idle;
                self.push_notice(NoticeKind::Info, "Complete", "Download process finished!");
            }
        }
        true
    }

    fn upsert_item(&mut self, update: ItemUpdate) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == update.id) {
            item.title = update.title;
            if let Some(percent) = update.percent {
                item.percent = percent;
            }
            item.status = update.status;
        } else {
            self.items.push(DownloadItem {
                id: update.id,
                title: update.title,
                percent: update.percent.unwrap_or(0.0),
                status: update.status,
            });
        }
    }

    /// Replaces the URL input with clipboard text as-is.
    pub fn paste_url(&mut self, clipboard: Result<String, AppError>) {
        match clipboard {
            Ok(text) => self.url = text,
            Err(err) => self.log_message(LogLevel::Warning, err.to_string()),
        }
    }

    /// Applies a folder picker result; `None` means the dialog was cancelled.
    pub fn choose_directory(&mut self, picked: Option<PathBuf>) {
        if let Some(path) = picked {
            self.output_dir = path.display().to_string();
        }
    }

    /// Persists `settings` and makes them current for the next run.
    pub fn save_settings(&mut self, settings: Settings) {
        match self.store.save(&settings) {
            Ok(()) => {
                self.settings = settings;
                self.push_notice(
                    NoticeKind::Info,
                    "Settings Saved",
                    "Settings have been updated successfully",
                );
            }
            Err(err) => {
                error!(%err, "saving settings failed");
                self.push_notice(NoticeKind::Error, "Error", format!("Could not save settings: {err}"));
            }
        }
    }
}
