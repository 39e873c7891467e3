//! Persistent record of fatal conditions, tagged with the build that hit them

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, warn};

/// Entries kept in memory; older ones are dropped first
const MAX_ENTRIES: usize = 256;

/// One logged condition
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub tag: String,
    pub message: String,
}

impl ErrorEntry {
    /// `<rfc3339> [tag] message`
    pub fn to_line(&self) -> String {
        format!("{} [{}] {}", self.timestamp.to_rfc3339(), self.tag, self.message)
    }
}

/// Error log shared by the worker and the server.
///
/// The most recent entries are kept in memory and, when a file is
/// configured, every entry is appended to it as one line.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Mutex<Vec<ErrorEntry>>,
    file: Option<PathBuf>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            file: Some(path.into()),
        }
    }

    pub fn add(&self, tag: &str, message: impl Into<String>) {
        let entry = ErrorEntry {
            timestamp: Utc::now(),
            tag: tag.to_string(),
            message: message.into(),
        };
        error!(tag = %entry.tag, "{}", entry.message);

        if let Some(path) = &self.file {
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{}", entry.to_line()));
            if let Err(e) = written {
                warn!("Cannot append to error log {}: {}", path.display(), e);
            }
        }

        let mut entries = self.entries.lock();
        if entries.len() == MAX_ENTRIES {
            entries.remove(0);
        }
        entries.push(entry);
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
