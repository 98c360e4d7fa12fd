//! Worker-to-UI progress bridge.
//!
//! The engine runs on a tokio worker and reports through [`ProgressHook`].
//! Everything the UI must see is posted through a [`Dispatcher`] and applied
//! later on the UI thread; the only state flowing the other way is the
//! [`CancelToken`].

use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use eframe::egui;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::{
    engine::{DownloadEngine, EngineOptions},
    error::AppError,
    model::{ItemStatus, ItemUpdate, LogLevel},
    progress::{EngineEvent, percent},
};

/// Cooperative cancellation flag shared between the UI and one run's engine callback
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Work scheduled onto the UI thread
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Item(ItemUpdate),
    Log { level: LogLevel, message: String },
    /// Always the last event of a run
    Finished(RunOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiMessage {
    pub run: u64,
    pub event: UiEvent,
}

/// Non-blocking "run on UI thread" primitive for one run
#[derive(Clone)]
pub struct Dispatcher {
    run: u64,
    tx: UnboundedSender<UiMessage>,
    repaint: Option<egui::Context>,
}

impl Dispatcher {
    pub fn new(run: u64, tx: UnboundedSender<UiMessage>, repaint: Option<egui::Context>) -> Self {
        Self { run, tx, repaint }
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn post(&self, event: UiEvent) {
        let message = UiMessage {
            run: self.run,
            event,
        };
        if self.tx.send(message).is_err() {
            debug!(run = self.run, "ui closed, dropping event");
            return;
        }
        if let Some(ctx) = &self.repaint {
            ctx.request_repaint();
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.post(UiEvent::Log {
            level,
            message: message.into(),
        });
    }
}

/// The engine's progress callback
pub struct ProgressHook {
    cancel: CancelToken,
    dispatcher: Dispatcher,
}

impl ProgressHook {
    pub fn new(cancel: CancelToken, dispatcher: Dispatcher) -> Self {
        Self { cancel, dispatcher }
    }

    /// Returns `Break` once cancellation was requested; nothing is posted then.
    pub fn on_event(&mut self, event: EngineEvent) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }

        match event {
            EngineEvent::Downloading {
                id,
                title,
                downloaded,
                total,
            } => self.dispatcher.post(UiEvent::Item(ItemUpdate {
                id,
                title,
                percent: Some(percent(downloaded, total)),
                status: ItemStatus::Downloading,
            })),
            EngineEvent::Finished { id, title } => self.dispatcher.post(UiEvent::Item(ItemUpdate {
                id,
                title,
                percent: None,
                status: ItemStatus::Done,
            })),
            EngineEvent::Error { filename, message } => {
                warn!(%filename, %message, "entry failed");
                self.dispatcher
                    .log(LogLevel::Error, format!("Error downloading {filename}: {message}"));
            }
        }
        ControlFlow::Continue(())
    }
}

/// Everything the worker needs for one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub url: String,
    pub options: EngineOptions,
}

/// Posts `Finished` when dropped, so the UI is restored on every exit path.
struct FinishGuard {
    dispatcher: Dispatcher,
    outcome: Option<RunOutcome>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            let err = AppError::WorkerAborted;
            error!(run = self.dispatcher.run(), "{err}");
            self.dispatcher.log(LogLevel::Error, format!("Error: {err}"));
            RunOutcome::Failed(err.to_string())
        });
        self.dispatcher.post(UiEvent::Finished(outcome));
    }
}

/// Worker entry point: invokes the engine once and reports the outcome.
pub async fn run_download<E: DownloadEngine>(
    engine: Arc<E>,
    request: RunRequest,
    cancel: CancelToken,
    dispatcher: Dispatcher,
) -> RunOutcome {
    let mut guard = FinishGuard {
        dispatcher: dispatcher.clone(),
        outcome: None,
    };
    info!(run = dispatcher.run(), url = %request.url, "run started");
    dispatcher.log(LogLevel::Info, format!("Starting download of {}", request.url));

    let mut hook = ProgressHook::new(cancel, dispatcher.clone());
    let mut on_event = |event: EngineEvent| hook.on_event(event);
    let result = engine
        .download(&request.url, &request.options, &mut on_event)
        .await;

    let outcome = match result {
        Ok(()) => {
            info!(run = dispatcher.run(), "run completed");
            dispatcher.log(LogLevel::Success, "Download completed!");
            RunOutcome::Completed
        }
        Err(err) => {
            error!(run = dispatcher.run(), %err, "run failed");
            dispatcher.log(LogLevel::Error, format!("Error: {err}"));
            match err {
                AppError::Cancelled => RunOutcome::Cancelled,
                other => RunOutcome::Failed(other.to_string()),
            }
        }
    };
    guard.outcome = Some(outcome.clone());
    outcome
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    use super::*;
    use crate::{engine::testing::ScriptedEngine, settings::Settings};

    fn request() -> RunRequest {
        RunRequest {
            url: "https://example.com/playlist?list=ABC".into(),
            options: EngineOptions::for_run(&Settings::default(), Path::new("/tmp/out")),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<UiMessage>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            assert_eq!(msg.run, 1);
            events.push(msg.event);
        }
        events
    }

    fn downloading(id: &str, downloaded: u64, total: Option<u64>) -> EngineEvent {
        EngineEvent::Downloading {
            id: id.into(),
            title: format!("title {id}"),
            downloaded,
            total,
        }
    }

    #[test]
    fn hook_posts_item_updates_with_percent() {
        let (tx, mut rx) = unbounded_channel();
        let mut hook = ProgressHook::new(CancelToken::new(), Dispatcher::new(1, tx, None));

        assert!(hook.on_event(downloading("v1", 50, Some(200))).is_continue());
        assert!(hook.on_event(downloading("v2", 10, None)).is_continue());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                UiEvent::Item(ItemUpdate {
                    id: "v1".into(),
                    title: "title v1".into(),
                    percent: Some(25.0),
                    status: ItemStatus::Downloading,
                }),
                UiEvent::Item(ItemUpdate {
                    id: "v2".into(),
                    title: "title v2".into(),
                    percent: Some(0.0),
                    status: ItemStatus::Downloading,
                }),
            ]
        );
    }

    #[test]
    fn hook_logs_entry_errors() {
        let (tx, mut rx) = unbounded_channel();
        let mut hook = ProgressHook::new(CancelToken::new(), Dispatcher::new(1, tx, None));
        let flow = hook.on_event(EngineEvent::Error {
            filename: "song.webm".into(),
            message: "HTTP Error 403".into(),
        });
        assert!(flow.is_continue());
        assert_eq!(
            drain(&mut rx),
            vec![UiEvent::Log {
                level: LogLevel::Error,
                message: "Error downloading song.webm: HTTP Error 403".into(),
            }]
        );
    }

    #[test]
    fn cancelled_hook_signals_break_and_posts_nothing() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = CancelToken::new();
        let mut hook = ProgressHook::new(cancel.clone(), Dispatcher::new(1, tx, None));
        cancel.cancel();
        assert!(hook.on_event(downloading("v1", 1, Some(2))).is_break());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn dispatch_after_ui_closed_is_ignored() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        Dispatcher::new(1, tx, None).log(LogLevel::Info, "nobody listening");
    }

    #[tokio::test]
    async fn successful_run_logs_and_finishes() {
        let (tx, mut rx) = unbounded_channel();
        let engine = Arc::new(ScriptedEngine::new(vec![downloading("v1", 50, Some(200))]));
        let outcome = run_download(
            engine.clone(),
            request(),
            CancelToken::new(),
            Dispatcher::new(1, tx, None),
        )
        .await;

        assert_eq!(outcome, RunOutcome::Completed);
        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&UiEvent::Log {
                level: LogLevel::Info,
                message: "Starting download of https://example.com/playlist?list=ABC".into(),
            })
        );
        assert_eq!(
            events[events.len() - 2],
            UiEvent::Log {
                level: LogLevel::Success,
                message: "Download completed!".into(),
            }
        );
        assert_eq!(events.last(), Some(&UiEvent::Finished(RunOutcome::Completed)));
        assert_eq!(engine.seen_options.lock().unwrap()[0], request().options);
    }

    #[tokio::test]
    async fn engine_failure_is_logged_then_finished() {
        let (tx, mut rx) = unbounded_channel();
        let mut engine = ScriptedEngine::new(Vec::new());
        engine.fail_with_code = Some(2);
        let outcome = run_download(
            Arc::new(engine),
            request(),
            CancelToken::new(),
            Dispatcher::new(1, tx, None),
        )
        .await;

        let message = AppError::EngineFailed { code: Some(2) }.to_string();
        assert_eq!(outcome, RunOutcome::Failed(message.clone()));
        let events = drain(&mut rx);
        assert!(events.contains(&UiEvent::Log {
            level: LogLevel::Error,
            message: format!("Error: {message}"),
        }));
        assert_eq!(events.last(), Some(&UiEvent::Finished(RunOutcome::Failed(message))));
    }

    #[tokio::test]
    async fn cancellation_before_callback_aborts_run() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        let engine = Arc::new(ScriptedEngine::new(vec![
            downloading("v1", 1, Some(10)),
            downloading("v1", 2, Some(10)),
        ]));
        let outcome = run_download(engine.clone(), request(), cancel, Dispatcher::new(1, tx, None)).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(*engine.hook_results.lock().unwrap(), vec![ControlFlow::Break(())]);
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, UiEvent::Item(_))));
        assert_eq!(events.last(), Some(&UiEvent::Finished(RunOutcome::Cancelled)));
    }

    #[tokio::test]
    async fn aborted_worker_still_finishes() {
        let (tx, mut rx) = unbounded_channel();
        let mut engine = ScriptedEngine::new(vec![downloading("v1", 1, Some(10))]);
        engine.pause_before = Some(0);
        let engine = Arc::new(engine);

        let task = tokio::spawn(run_download(
            engine.clone(),
            request(),
            CancelToken::new(),
            Dispatcher::new(1, tx, None),
        ));
        engine.paused.notified().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&UiEvent::Finished(RunOutcome::Failed(AppError::WorkerAborted.to_string())))
        );
    }
}
