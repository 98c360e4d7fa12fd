use std::{
    future::Future,
    io::ErrorKind,
    ops::ControlFlow,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, trace, warn};

use crate::{
    error::AppError,
    progress::{EngineEvent, PROGRESS_TEMPLATE, parse_line},
    settings::Settings,
};

/// Per-connection socket timeout handed to the engine
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress callback invoked by the engine; `Break` asks it to abort the run.
pub type ProgressCallback<'a> = dyn FnMut(EngineEvent) -> ControlFlow<()> + Send + 'a;

/// External download/extraction engine.
///
/// Implementations call `hook` zero or more times per playlist entry and must
/// abort the remaining run with [`AppError::Cancelled`] once it returns `Break`.
pub trait DownloadEngine: Send + Sync + 'static {
    fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        hook: &mut ProgressCallback<'_>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Full option bundle for one engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub format_filter: String,
    pub output_template: PathBuf,
    /// Skip entries that fail instead of aborting the playlist
    pub ignore_errors: bool,
    pub retries: u32,
    pub concurrency: u32,
    pub postprocessors: Vec<String>,
    pub socket_timeout: Duration,
    /// Human-oriented progress bar output; progress still flows through the hook
    pub console_progress: bool,
}

impl EngineOptions {
    pub fn for_run(settings: &Settings, output_dir: &Path) -> Self {
        Self {
            format_filter: format!("bestaudio[ext={}]/bestaudio/best", settings.format),
            output_template: output_dir.join("%(title)s.%(ext)s"),
            ignore_errors: true,
            retries: settings.retries,
            concurrency: settings.concurrency.max(1),
            postprocessors: Vec::new(),
            socket_timeout: SOCKET_TIMEOUT,
            console_progress: false,
        }
    }

    /// Renders the bundle as yt-dlp command-line arguments.
    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_owned(),
            self.format_filter.clone(),
            "-o".to_owned(),
            self.output_template.to_string_lossy().into_owned(),
            "--retries".to_owned(),
            self.retries.to_string(),
            "--concurrent-fragments".to_owned(),
            self.concurrency.to_string(),
            "--socket-timeout".to_owned(),
            self.socket_timeout.as_secs().to_string(),
        ];
        if self.ignore_errors {
            args.push("--ignore-errors".to_owned());
        }
        for pp in &self.postprocessors {
            args.push("--use-postprocessor".to_owned());
            args.push(pp.clone());
        }
        args.push("--encoding".to_owned());
        args.push("utf-8".to_owned());
        if !self.console_progress {
            args.push("--quiet".to_owned());
        }
        // Forces progress lines even in quiet mode, one per line.
        args.push("--progress".to_owned());
        args.push("--newline".to_owned());
        args.push("--progress-template".to_owned());
        args.push(PROGRESS_TEMPLATE.to_owned());
        args.push(url.to_owned());
        args
    }
}

/// Drives the `yt-dlp` executable as a child process
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    binary: PathBuf,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Uses `YT_DLP_PATH` when set, otherwise the platform binary name on `PATH`.
    pub fn from_env() -> Self {
        match std::env::var_os("YT_DLP_PATH") {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => {
                let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
                Self::new(bin)
            }
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl DownloadEngine for YtDlpEngine {
    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        hook: &mut ProgressCallback<'_>,
    ) -> Result<(), AppError> {
        let args = options.to_args(url);
        info!(binary = %self.binary.display(), url, "spawning yt-dlp");
        debug!(?args, "yt-dlp arguments");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => AppError::EngineMissing {
                    binary: self.binary.display().to_string(),
                },
                _ => AppError::Io(err),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io(std::io::Error::other("yt-dlp stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io(std::io::Error::other("yt-dlp stderr not captured")))?;
        // Raw segments: titles may arrive in a non-UTF-8 code page.
        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let (mut out_open, mut err_open) = (true, true);
        let mut item_errors = 0usize;

        while out_open || err_open {
            let raw = tokio::select! {
                next = out_lines.next_segment(), if out_open => match next? {
                    Some(raw) => raw,
                    None => {
                        out_open = false;
                        continue;
                    }
                },
                next = err_lines.next_segment(), if err_open => match next? {
                    Some(raw) => raw,
                    None => {
                        err_open = false;
                        continue;
                    }
                },
            };
            let line = String::from_utf8_lossy(&raw);

            let Some(event) = parse_line(&line) else {
                trace!(line = %line, "yt-dlp output");
                continue;
            };
            if matches!(event, EngineEvent::Error { .. }) {
                item_errors += 1;
            }
            if hook(event).is_break() {
                info!("cancellation requested, terminating yt-dlp");
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill yt-dlp");
                }
                return Err(AppError::Cancelled);
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else if item_errors > 0 {
            // Failing entries were skipped and already reported through the hook.
            debug!(code = ?status.code(), item_errors, "yt-dlp finished with skipped entries");
            Ok(())
        } else {
            Err(AppError::EngineFailed {
                code: status.code(),
            })
        }
    }
}
