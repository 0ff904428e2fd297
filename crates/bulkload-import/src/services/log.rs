//! Append-only import log
//!
//! Every reported message goes to `tracing`; when a log file is configured it
//! is also appended there as `<RFC 3339 timestamp> [LEVEL] message`.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::config::ImportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

pub struct ImportLogger {
    file: Option<(PathBuf, Mutex<File>)>,
}

impl ImportLogger {
    /// Logger that only emits tracing events
    pub fn tracing_only() -> Self {
        Self { file: None }
    }

    /// Logger that also appends to `path`, creating it if needed
    pub fn with_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Some((path, Mutex::new(file))),
        })
    }

    pub fn from_config(config: &ImportConfig) -> io::Result<Self> {
        match &config.log_file {
            Some(path) => Self::with_file(path),
            None => Ok(Self::tracing_only()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!(target: "bulkload::import", "{}", message),
            LogLevel::Warn => warn!(target: "bulkload::import", "{}", message),
            LogLevel::Error => error!(target: "bulkload::import", "{}", message),
        }

        let Some((path, file)) = &self.file else {
            return;
        };
        let line = format!("{} [{}] {}\n", chrono::Utc::now().to_rfc3339(), level, message);
        let written = match file.lock() {
            Ok(mut file) => file.write_all(line.as_bytes()),
            Err(_) => Err(io::Error::other("import log lock poisoned")),
        };
        if let Err(e) = written {
            warn!("Failed to write import log {}: {}", path.display(), e);
        }
    }
}

impl Default for ImportLogger {
    fn default() -> Self {
        Self::tracing_only()
    }
}

impl fmt::Debug for ImportLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportLogger")
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_log_lines_are_timestamped_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.log");

        let logger = ImportLogger::with_file(&path).unwrap();
        logger.log(LogLevel::Info, "Row 2: Created Acme");
        logger.log(LogLevel::Error, "Row 3: Failed to create Globex: Name can't be blank");
        drop(logger);

        let reopened = ImportLogger::with_file(&path).unwrap();
        reopened.log(LogLevel::Warn, "1 warning");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] Row 2: Created Acme"));
        assert!(lines[1].contains("[ERROR] Row 3"));
        assert!(lines[2].ends_with("[WARN] 1 warning"));

        let timestamp = lines[0].split(' ').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_from_config_without_file_is_tracing_only() {
        let logger = ImportLogger::from_config(&ImportConfig::default()).unwrap();
        assert!(logger.path().is_none());
        logger.log(LogLevel::Info, "no file");
    }
}
