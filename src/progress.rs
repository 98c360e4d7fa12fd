//! Parsing of the engine's line-oriented output into progress events.

/// Marker that starts every line produced by our `--progress-template`
pub const PROGRESS_MARKER: &str = "pldl-progress";

/// Template handed to yt-dlp; fields are tab separated, title last
pub const PROGRESS_TEMPLATE: &str = "download:pldl-progress\t%(info.id)s\t%(progress.status)s\t%(progress.downloaded_bytes)s\t%(progress.total_bytes)s\t%(progress.total_bytes_estimate)s\t%(info.title)s";

/// Progress callback payload reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Downloading {
        id: String,
        title: String,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        id: String,
        title: String,
    },
    Error {
        filename: String,
        message: String,
    },
}

/// Percent complete with one decimal place; unknown or zero totals report 0.
pub fn percent(downloaded: u64, total: Option<u64>) -> f32 {
    match total {
        Some(total) if total > 0 => {
            let raw = (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
            ((raw * 10.0).round() / 10.0) as f32
        }
        _ => 0.0,
    }
}

pub fn parse_line(line: &str) -> Option<EngineEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        return parse_progress_fields(rest.strip_prefix('\t')?);
    }
    if let Some(rest) = line.strip_prefix("ERROR:") {
        return Some(parse_error_line(rest.trim()));
    }
    None
}

fn parse_progress_fields(fields: &str) -> Option<EngineEvent> {
    let mut parts = fields.splitn(6, '\t');
    let id = parts.next()?.to_string();
    let status = parts.next()?;
    let downloaded = parts.next()?;
    let total = parts.next()?;
    let estimate = parts.next()?;
    let title = parts.next().unwrap_or_default().to_string();
    if id.is_empty() || id == "NA" {
        return None;
    }

    match status {
        "downloading" => Some(EngineEvent::Downloading {
            id,
            title,
            downloaded: parse_bytes(downloaded).unwrap_or(0),
            total: parse_bytes(total).or_else(|| parse_bytes(estimate)),
        }),
        "finished" => Some(EngineEvent::Finished { id, title }),
        "error" => Some(EngineEvent::Error {
            filename: if title.is_empty() { id } else { title },
            message: "download failed".to_string(),
        }),
        _ => None,
    }
}

/// `ERROR: [youtube] abc123: Video unavailable` → filename `abc123`
fn parse_error_line(rest: &str) -> EngineEvent {
    if let Some(after_tag) = rest.strip_prefix('[').and_then(|r| r.split_once("] ")) {
        if let Some((subject, message)) = after_tag.1.split_once(": ") {
            return EngineEvent::Error {
                filename: subject.to_string(),
                message: message.to_string(),
            };
        }
    }
    EngineEvent::Error {
        filename: "unknown".to_string(),
        message: rest.to_string(),
    }
}

fn parse_bytes(field: &str) -> Option<u64> {
    let value = field.trim().parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}
