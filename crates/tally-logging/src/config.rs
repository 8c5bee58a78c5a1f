//! Configuration types for the logging system
//!
//! Every section deserializes with defaults, so a config file only needs
//! the keys it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Days of daily-rotated log files kept when a log directory is set
const DAILY_RETENTION: usize = 30;

/// Main logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub default_level: String,

    pub console: ConsoleConfig,

    /// Rolling JSONL files, off unless configured
    pub file: Option<FileConfig>,

    /// Shape of JSON records on both console and file
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Write JSONL files into `dir` as well as to the console
    ///
    /// Keeps the rotation and prefix of an existing file section and only
    /// moves it; otherwise starts daily rotation.
    pub fn log_to_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        match &mut self.file {
            Some(file) => file.directory = dir,
            None => self.file = Some(FileConfig::daily(dir)),
        }
    }

    /// Human-readable, colored console output
    pub fn use_pretty_console(&mut self) {
        self.console.pretty = true;
        self.console.ansi = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Pretty text instead of JSON lines
    pub pretty: bool,
    /// ANSI colors; only honored with `pretty`
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

/// Rolling file output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File names are `<prefix>.<date>.log`
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Oldest files beyond this count are deleted; `None` keeps all
    pub max_files: Option<usize>,
}

impl FileConfig {
    /// Daily files under `directory`, a month of history
    pub fn daily(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rotation: RotationStrategy::Daily,
            max_files: Some(DAILY_RETENTION),
            ..Default::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "tally".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, appended forever
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    pub include_spans: bool,
    /// Source file and line of each event
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}
