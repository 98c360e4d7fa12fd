use thiserror::Error;

/// Errors surfaced by the downloader.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("please provide a playlist URL and output directory")]
    MissingInput,

    #[error("a download is already running")]
    RunInProgress,

    #[error("download cancelled")]
    Cancelled,

    #[error("download engine not found: {binary}")]
    EngineMissing { binary: String },

    #[error("download engine exited with code {code:?}")]
    EngineFailed { code: Option<i32> },

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("download worker stopped unexpectedly")]
    WorkerAborted,
}
