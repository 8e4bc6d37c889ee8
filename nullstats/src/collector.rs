//! Rollover orchestrator: the engine's entry point for hits and reports.
//!
//! The [`Collector`] owns the live event log and the cached historical
//! snapshot of one directory. Every hit goes through it; when a hit belongs to
//! another calendar day than the open log, the finished period is folded into
//! the history before the hit is recorded.
//!
//! # Rollover
//!
//! ```text
//! hit(day D+1) ──► close log ──► load stats.csv ──► parse log.csv (hourly)
//!                                                          │
//!     append hit ◄── truncate log ◄── write stats.csv ◄── merge into history
//! ```
//!
//! `stats.csv` is always written before `log.csv` is truncated. If the process
//! dies anywhere before the truncation, the next start reopens the old log,
//! sees its old start day, and repeats the fold. Merging overwrites the
//! day's column, so repeating it does not double-count.
//!
//! # Locking
//!
//! All state sits behind one mutex, held for the whole of every operation,
//! including the read-only [`Collector::stats`] which re-reads the live log.
//! There is no background thread: a rollover happens on the first hit after
//! midnight, however late that is.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result, StatsError};
use crate::hit::Hit;
use crate::log::{Appender, parse_log};
use crate::report::Report;
use crate::stats::Stats;

/// Collects hits into a directory and produces daily/historical stats.
///
/// The collector is `Send + Sync`; share it between request handlers with an
/// `Arc`. Only one collector may use a directory at a time.
#[derive(Debug)]
pub struct Collector {
    config: CollectorConfig,
    state: Mutex<State>,
}

/// Mutable engine state, guarded by the collector lock.
#[derive(Debug, Default)]
struct State {
    /// Open log of the current period; `None` until first needed.
    appender: Option<Appender>,
    /// Historical stats, loaded lazily from disk.
    history: Option<Stats>,
}

impl Collector {
    /// Creates a collector. No files are touched until the first operation.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ConfigError`] if the configuration is invalid.
    pub fn new(config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(State::default()),
        })
    }

    /// Returns the collector configuration.
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Records a hit, rolling the log over first if the hit starts a new day.
    ///
    /// Returns `false` if the hit was dropped by the filter. A hit dated on
    /// an earlier day than the open period rolls over too.
    ///
    /// # Errors
    ///
    /// Returns any I/O or parse error from the log or history files; nothing
    /// is retried.
    pub fn hit(&self, hit: &Hit) -> Result<bool> {
        if !self.config.filter.accepts(&hit.path) {
            tracing::trace!(path = %hit.path, "hit filtered");
            return Ok(false);
        }

        let mut state = self.lock()?;
        let zone = self.config.zone;
        if let Some(start) = state.appender(&self.config)?.start_time()
            && zone.date_of(hit.timestamp) != zone.date_of(start)
        {
            state.fold(&self.config)?;
        }

        state.appender(&self.config)?.append(hit)?;
        Ok(true)
    }

    /// Folds the current log into the history now, whatever its day.
    ///
    /// Returns `false` if the log was empty and there was nothing to fold.
    ///
    /// # Errors
    ///
    /// Returns any I/O or parse error from the log or history files.
    pub fn rollover(&self) -> Result<bool> {
        let mut state = self.lock()?;
        if state.appender(&self.config)?.start_time().is_none() {
            return Ok(false);
        }
        state.fold(&self.config)?;
        Ok(true)
    }

    /// Returns the live period's hourly stats and the history including the
    /// live period.
    ///
    /// The live period is merged into a copy of the history; nothing is
    /// written to disk.
    ///
    /// # Errors
    ///
    /// Returns any I/O or parse error from the log or history files.
    pub fn stats(&self) -> Result<(Stats, Stats)> {
        let mut state = self.lock()?;
        let daily = parse_log(self.config.log_path(), self.config.zone)?;
        let mut history = state.history(&self.config)?.clone();
        history.merge(&daily)?;
        Ok((daily, history))
    }

    /// Builds the report context handed to a renderer.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Collector::stats`].
    pub fn report<E>(&self, extension: Option<E>) -> Result<Report<E>> {
        let (daily, history) = self.stats()?;
        Ok(Report::new(daily, history, extension))
    }

    /// Closes the live log. A later hit reopens it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LogError::Close`] if the final sync fails.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(appender) = state.appender.take() {
            appender.close()?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CollectorError::LockPoisoned.into())
    }
}

impl State {
    /// Returns the open appender, reopening the log without truncation if needed.
    fn appender(&mut self, config: &CollectorConfig) -> Result<&mut Appender> {
        let appender = match self.appender.take() {
            Some(appender) => appender,
            None => Appender::open(config.log_path(), false)?,
        };
        Ok(self.appender.insert(appender))
    }

    /// Returns the cached history, loading it from disk on first use.
    fn history(&mut self, config: &CollectorConfig) -> Result<&mut Stats> {
        let history = match self.history.take() {
            Some(history) => history,
            None => load_history(&config.history_path())?,
        };
        Ok(self.history.insert(history))
    }

    /// Folds the current log into the history and starts a fresh log.
    fn fold(&mut self, config: &CollectorConfig) -> Result<()> {
        if let Some(appender) = self.appender.take() {
            appender.close()?;
        }

        let daily = parse_log(config.log_path(), config.zone)?;
        let history = self.history(config)?;
        history.merge(&daily)?;
        save_history(&config.history_path(), history)?;

        tracing::info!(
            period = ?daily.start,
            days = history.width(),
            "rolled over event log into history"
        );

        // Truncate only after the history is safely on disk.
        self.appender = Some(Appender::open(config.log_path(), true)?);
        Ok(())
    }
}

/// Reads the history file; a missing file is an empty history.
fn load_history(path: &Path) -> Result<Stats> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no history yet");
            return Ok(Stats::default());
        }
        Err(source) => {
            return Err(StatsError::Read {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };
    let stats = Stats::decode(&text)?;
    tracing::debug!(path = %path.display(), days = stats.width(), "loaded history");
    Ok(stats)
}

/// Replaces the history file atomically: temp file, sync, rename.
fn save_history(path: &Path, history: &Stats) -> Result<()> {
    let write_err = |source| StatsError::Write {
        path: path.to_path_buf(),
        source,
    };
    let temp_path = path.with_extension("csv.tmp");
    let mut file = File::create(&temp_path).map_err(write_err)?;
    file.write_all(history.encode().as_bytes())
        .map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);
    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}
