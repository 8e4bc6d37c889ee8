//! Error types for the nullstats aggregation engine.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all nullstats operations.
///
/// Every fallible operation in the crate returns this type. The variants group
/// failures by concern: I/O on the live event log, malformed persisted data,
/// historical snapshot handling, configuration, and collector state.
#[derive(Error, Debug)]
pub enum NullstatsError {
    /// Error opening, reading, or writing the live event log.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Persisted data (stats snapshot or event log) is malformed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error merging or persisting historical stats.
    #[error("stats error: {0}")]
    Stats(#[from] StatsError),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Collector state error.
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),
}

/// Errors that can occur while working with the append-only event log.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log file (or its parent directory) could not be opened or created.
    #[error("failed to open log '{}': {source}", path.display())]
    Open {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the log file failed.
    #[error("failed to read log '{}': {source}", path.display())]
    Read {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending an event line failed.
    #[error("failed to append to log '{}': {source}", path.display())]
    Append {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing or closing the log failed.
    #[error("failed to close log '{}': {source}", path.display())]
    Close {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced when decoding persisted stats or log lines.
///
/// Each malformed-input case has its own variant so that a corrupt file is
/// never silently coerced into empty or zeroed data. Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first line of a non-empty stats file is not a `#` header.
    #[error("line 1: expected '#' header, found {found:?}")]
    MissingHeader {
        /// The offending first line.
        found: String,
    },

    /// The header does not hold exactly a timestamp and an interval.
    #[error("line 1: header must contain a timestamp and an interval, found {count} field(s)")]
    HeaderFields {
        /// Number of comma-separated fields found.
        count: usize,
    },

    /// The header timestamp is not valid RFC 3339.
    #[error("line 1: invalid timestamp {value:?}: {reason}")]
    Timestamp {
        /// The raw timestamp text.
        value: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// The header interval is not a valid duration literal.
    #[error("line 1: invalid interval {value:?}: {reason}")]
    Duration {
        /// The raw duration text.
        value: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// A data row has fewer than two fields.
    #[error("line {line}: expected a name and at least one value")]
    RowFields {
        /// Line number.
        line: usize,
    },

    /// A data row holds a value that is not an integer.
    #[error("line {line}: invalid counter value {value:?}")]
    Value {
        /// Line number.
        line: usize,
        /// The raw value text.
        value: String,
    },

    /// A data row is wider or narrower than the rows before it in the same frame.
    #[error("line {line}: row has {found} value(s), frame width is {expected}")]
    RowWidth {
        /// Line number.
        line: usize,
        /// Width established by the previous rows.
        expected: usize,
        /// Width of this row.
        found: usize,
    },

    /// Non-empty lines follow the last frame.
    #[error("line {line}: unexpected data after the last frame")]
    TrailingData {
        /// Line number.
        line: usize,
    },

    /// A complete event log line is structurally invalid.
    #[error("log line {line}: {reason}")]
    MalformedLogLine {
        /// Line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

/// Errors that can occur while merging or persisting historical stats.
#[derive(Error, Debug)]
pub enum StatsError {
    /// The period being merged starts before the first day of the history.
    #[error("cannot merge period starting {period} into history starting {history}")]
    BeforeHistory {
        /// Calendar day of the period being merged.
        period: String,
        /// First calendar day of the history.
        history: String,
    },

    /// The historical snapshot exists but could not be read.
    #[error("failed to read history '{}': {source}", path.display())]
    Read {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The historical snapshot could not be written.
    #[error("failed to write history '{}': {source}", path.display())]
    Write {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No storage directory was configured.
    #[error("no storage directory configured")]
    MissingDirectory,

    /// A file name setting is empty or contains a path separator.
    #[error("invalid {field} file name {value:?}")]
    InvalidFileName {
        /// Which setting was invalid.
        field: &'static str,
        /// The configured value.
        value: String,
    },

    /// A time zone specification could not be understood.
    #[error("invalid time zone {value:?}: expected 'utc', 'local', or an offset like '+02:00'")]
    InvalidZone {
        /// The rejected specification.
        value: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::CollectorConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors about the collector's own state.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// A thread panicked while holding the collector lock.
    #[error("collector lock poisoned by a panicked thread")]
    LockPoisoned,
}

/// Type alias for `Result<T, NullstatsError>`.
pub type Result<T> = std::result::Result<T, NullstatsError>;
