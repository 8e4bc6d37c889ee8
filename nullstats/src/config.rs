//! Collector configuration.
//!
//! A [`CollectorConfig`] enumerates everything a [`crate::Collector`] needs:
//! where its files live, which time zone defines a calendar day, and which
//! hits are dropped before they reach the log. It can be built in code or
//! loaded from JSON:
//!
//! ```json
//! {
//!   "dir": "/var/lib/nullstats",
//!   "zone": { "kind": "fixed", "offset_seconds": 3600 },
//!   "filter": { "skip_assets": true, "internal_markers": ["/_"] }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::filter::HitFilter;
use crate::zone::Zone;

/// Default name of the live event log.
pub const DEFAULT_LOG_FILE: &str = "log.csv";

/// Default name of the historical stats snapshot.
pub const DEFAULT_HISTORY_FILE: &str = "stats.csv";

/// Configuration for a [`crate::Collector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Directory holding the log and history files.
    pub dir: PathBuf,
    /// Time zone for calendar days and hourly buckets.
    #[serde(default)]
    pub zone: Zone,
    /// Pre-filter applied to every hit.
    #[serde(default)]
    pub filter: HitFilter,
    /// File name of the live event log within `dir`.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// File name of the historical snapshot within `dir`.
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

fn default_history_file() -> String {
    DEFAULT_HISTORY_FILE.to_string()
}

impl CollectorConfig {
    /// Creates a configuration for `dir` with UTC days and the default filter.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            zone: Zone::default(),
            filter: HitFilter::default(),
            log_file: default_log_file(),
            history_file: default_history_file(),
        }
    }

    /// Sets the time zone.
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Sets the hit filter.
    pub fn with_filter(mut self, filter: HitFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be read or parsed, or any [`CollectorConfig::validate`] error.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that a directory is configured and file names are plain names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDirectory`] or
    /// [`ConfigError::InvalidFileName`].
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingDirectory.into());
        }
        for (field, value) in [("log", &self.log_file), ("history", &self.history_file)] {
            if value.is_empty() || value.contains(['/', '\\']) {
                return Err(ConfigError::InvalidFileName {
                    field,
                    value: value.clone(),
                }
                .into());
            }
        }
        if self.log_file == self.history_file {
            return Err(ConfigError::InvalidFileName {
                field: "history",
                value: self.history_file.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Full path of the live event log.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.log_file)
    }

    /// Full path of the historical snapshot.
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(&self.history_file)
    }
}
