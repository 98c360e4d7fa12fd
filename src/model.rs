/// Represents the current state of a playlist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Engine is still reporting bytes for this entry
    Downloading,
    /// Engine reported the entry as finished
    Done,
}

impl ItemStatus {
    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Downloading => "⬇️ Downloading",
            ItemStatus::Done => "✅ Done",
        }
    }
}

/// Data structure for tracking one playlist entry in the status list
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadItem {
    /// Engine identifier, unique per playlist entry
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Progress percentage (0.0 to 100.0, one decimal place)
    pub percent: f32,
    pub status: ItemStatus,
}

impl DownloadItem {
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}

/// One change to an entry, produced on the worker and applied on the UI thread
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub id: String,
    pub title: String,
    /// `None` keeps the current percentage
    pub percent: Option<f32>,
    pub status: ItemStatus,
}

/// Severity of a log pane entry; only drives the display colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}
