//! Process-wide import configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling on records per import
pub const DEFAULT_LINE_ITEM_LIMIT: usize = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Settings shared by every import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Imports with more records than this are rejected before processing
    pub line_item_limit: usize,
    /// Discard the whole run when any row reports an error or warning
    pub rollback_on_error: bool,
    /// Copy the uploaded file name into every record
    pub pass_filename: bool,
    /// Record field the file name is written to
    pub filename_field: String,
    /// Fields never assigned from input, even if the model declares them
    pub excluded_fields: Vec<String>,
    /// Append every reported message to this file
    pub log_file: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            line_item_limit: DEFAULT_LINE_ITEM_LIMIT,
            rollback_on_error: false,
            pass_filename: false,
            filename_field: "filename".to_string(),
            excluded_fields: ["id", "_id", "created_at", "updated_at"]
                .into_iter()
                .map(String::from)
                .collect(),
            log_file: None,
        }
    }
}

impl ImportConfig {
    /// Defaults overridden by `BULKLOAD_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BULKLOAD_LINE_ITEM_LIMIT") {
            config.line_item_limit =
                value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        key: "BULKLOAD_LINE_ITEM_LIMIT".to_string(),
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(value) = lookup("BULKLOAD_ROLLBACK_ON_ERROR") {
            config.rollback_on_error = parse_flag("BULKLOAD_ROLLBACK_ON_ERROR", &value)?;
        }
        if let Some(value) = lookup("BULKLOAD_PASS_FILENAME") {
            config.pass_filename = parse_flag("BULKLOAD_PASS_FILENAME", &value)?;
        }
        if let Some(value) = lookup("BULKLOAD_LOG_FILE").filter(|v| !v.trim().is_empty()) {
            config.log_file = Some(PathBuf::from(value));
        }

        Ok(config)
    }

    pub fn with_line_item_limit(mut self, limit: usize) -> Self {
        self.line_item_limit = limit;
        self
    }

    pub fn with_rollback_on_error(mut self, enabled: bool) -> Self {
        self.rollback_on_error = enabled;
        self
    }

    pub fn with_pass_filename(mut self, enabled: bool) -> Self {
        self.pass_filename = enabled;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded_fields.iter().any(|excluded| excluded == field)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
