//! Settings persistence: a flat JSON record in the working directory.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Fixed relative location of the settings file
pub const SETTINGS_FILE: &str = "settings.json";

/// Audio container requested from the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Webm,
    Mp3,
    M4a,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 3] = [AudioFormat::Webm, AudioFormat::Mp3, AudioFormat::M4a];

    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Webm => "webm",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-tunable engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Concurrent fragment downloads, always at least 1
    #[serde(rename = "concurrent")]
    pub concurrency: u32,
    pub format: AudioFormat,
    pub retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            format: AudioFormat::Webm,
            retries: 5,
        }
    }
}

impl Settings {
    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }
}

/// Reads and writes [`Settings`] at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored record, falling back to defaults on any failure.
    pub fn load(&self) -> Settings {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "settings file unreadable, using defaults");
                return Settings::default();
            }
        };
        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings.normalized(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "settings file corrupt, using defaults");
                Settings::default()
            }
        }
    }

    /// Overwrites the settings file with `settings`.
    pub fn save(&self, settings: &Settings) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, format!("{json}\n"))?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SettingsStore::new(path).load(), Settings::default());
    }

    #[test]
    fn unknown_format_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"concurrent": 2, "format": "flac", "retries": 1}"#).unwrap();
        assert_eq!(SettingsStore::new(path).load(), Settings::default());
    }

    #[test]
    fn round_trips_every_format() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        for format in AudioFormat::ALL {
            for (concurrency, retries) in [(1, 0), (4, 7), (10, 10)] {
                let settings = Settings {
                    concurrency,
                    format,
                    retries,
                };
                store.save(&settings).unwrap();
                assert_eq!(store.load(), settings);
            }
        }
    }

    #[test]
    fn reads_concurrent_key_and_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"concurrent": 6, "format": "m4a"}"#).unwrap();
        let settings = SettingsStore::new(path).load();
        assert_eq!(settings.concurrency, 6);
        assert_eq!(settings.format, AudioFormat::M4a);
        assert_eq!(settings.retries, Settings::default().retries);
    }

    #[test]
    fn zero_concurrency_is_raised_to_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"concurrent": 0, "format": "mp3", "retries": 2}"#).unwrap();
        assert_eq!(SettingsStore::new(path).load().concurrency, 1);
    }
}
