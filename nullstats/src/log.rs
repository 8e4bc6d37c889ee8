//! Append-only event log for the live period.
//!
//! Each hit is one line:
//!
//! ```text
//! <unix seconds>,<path>,<session>,<referrer>,<country>,<device>\n
//! ```
//!
//! The [`Appender`] writes lines and remembers the timestamp of the first one,
//! which decides when the period rolls over. On reopen it recovers that
//! timestamp from the first bytes of the file, without scanning the rest.
//! [`parse_log`] rebuilds hourly [`Stats`] from a log file.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{LogError, ParseError, Result};
use crate::hit::Hit;
use crate::stats::Stats;
use crate::zone::Zone;

/// Bytes read from the head of an existing log to recover its start time.
/// Enough for any 64-bit unix timestamp.
const START_PREFIX_LEN: u64 = 64;

/// Chunk size for scanning backwards over a torn tail.
const TAIL_CHUNK: usize = 4096;

/// Number of comma-separated fields in a log line.
const FIELDS: usize = 6;

/// Row name under which unique sessions are counted.
pub const SESSIONS_ROW: &str = "sessions";

/// Append-only writer for one period's event log.
#[derive(Debug)]
pub struct Appender {
    file: File,
    path: PathBuf,
    start: Option<DateTime<Utc>>,
    line: String,
}

impl Appender {
    /// Opens (creating if needed) the log at `path`.
    ///
    /// With `truncate` the previous content is discarded, which starts a new
    /// period. Otherwise a torn final line (no trailing newline) is cut off,
    /// the start time is recovered from the first line, and subsequent
    /// appends go to the end of the file.
    ///
    /// # Errors
    ///
    /// Returns [`LogError`] on I/O failure, or [`ParseError::MalformedLogLine`]
    /// if a non-empty log does not start with a unix timestamp.
    pub fn open<P: AsRef<Path>>(path: P, truncate: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| LogError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_err)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(&path)
            .map_err(open_err)?;
        if !truncate {
            cut_torn_tail(&mut file, &path)?;
        }
        file.rewind().map_err(|source| LogError::Read {
            path: path.clone(),
            source,
        })?;

        let mut prefix = Vec::with_capacity(START_PREFIX_LEN as usize);
        (&mut file)
            .take(START_PREFIX_LEN)
            .read_to_end(&mut prefix)
            .map_err(|source| LogError::Read {
                path: path.clone(),
                source,
            })?;
        let start = if prefix.is_empty() {
            None
        } else {
            Some(leading_timestamp(&prefix)?)
        };

        file.seek(SeekFrom::End(0))
            .map_err(|source| LogError::Read {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), truncate, ?start, "opened event log");
        Ok(Self {
            file,
            path,
            start,
            line: String::new(),
        })
    }

    /// Returns the timestamp of the first hit in the log, or `None` if the
    /// log is empty.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one hit as a complete line.
    ///
    /// The line is handed to the OS in a single write; commas and line breaks
    /// inside fields are replaced so every line keeps its six fields.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Append`] if the write fails.
    pub fn append(&mut self, hit: &Hit) -> Result<()> {
        self.line.clear();
        self.line.push_str(&hit.timestamp.timestamp().to_string());
        for field in [
            &hit.path,
            &hit.session,
            &hit.referrer,
            &hit.country,
            &hit.device,
        ] {
            self.line.push(',');
            push_field(&mut self.line, field);
        }
        self.line.push('\n');

        self.file
            .write_all(self.line.as_bytes())
            .map_err(|source| LogError::Append {
                path: self.path.clone(),
                source,
            })?;
        if self.start.is_none() {
            self.start = Some(hit.timestamp);
        }
        Ok(())
    }

    /// Flushes the log to disk and releases the file handle.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Close`] if the final sync fails.
    pub fn close(self) -> Result<()> {
        self.file.sync_data().map_err(|source| LogError::Close {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "closed event log");
        Ok(())
    }
}

fn push_field(line: &mut String, field: &str) {
    if field.contains([',', '\n', '\r']) {
        line.extend(
            field
                .chars()
                .map(|c| if matches!(c, ',' | '\n' | '\r') { '_' } else { c }),
        );
    } else {
        line.push_str(field);
    }
}

/// Truncates the file after its last newline if the final line is incomplete.
fn cut_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    let read_err = |source| LogError::Read {
        path: path.to_path_buf(),
        source,
    };
    let len = file.metadata().map_err(read_err)?.len();
    if len == 0 {
        return Ok(());
    }

    let mut buf = vec![0u8; TAIL_CHUNK];
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let begin = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk_len = usize::try_from(end - begin).unwrap_or(TAIL_CHUNK);
        let chunk = &mut buf[..chunk_len];
        file.seek(SeekFrom::Start(begin)).map_err(read_err)?;
        file.read_exact(chunk).map_err(read_err)?;
        if end == len && chunk.last() == Some(&b'\n') {
            return Ok(());
        }
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = begin + pos as u64 + 1;
            break;
        }
        end = begin;
    }

    tracing::warn!(
        path = %path.display(),
        dropped = len - keep,
        "cutting torn trailing log line"
    );
    file.set_len(keep).map_err(|source| LogError::Append {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Parses the (optionally negative) decimal number at the start of a log as
/// unix seconds.
fn leading_timestamp(prefix: &[u8]) -> std::result::Result<DateTime<Utc>, ParseError> {
    let sign = usize::from(prefix.first() == Some(&b'-'));
    let digits = sign
        + prefix[sign..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
    let unix = std::str::from_utf8(&prefix[..digits])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::MalformedLogLine {
            line: 1,
            reason: "log does not start with a unix timestamp".to_string(),
        })?;
    from_unix(unix, 1)
}

fn from_unix(unix: i64, line: usize) -> std::result::Result<DateTime<Utc>, ParseError> {
    Utc.timestamp_opt(unix, 0)
        .single()
        .ok_or_else(|| ParseError::MalformedLogLine {
            line,
            reason: format!("timestamp {unix} out of range"),
        })
}

/// Parses one log line (without its trailing newline) into a [`Hit`].
///
/// # Errors
///
/// Returns [`ParseError::MalformedLogLine`] if the line does not have six
/// fields or its timestamp is not an integer.
pub fn parse_line(line: &str, line_no: usize) -> std::result::Result<Hit, ParseError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELDS {
        return Err(ParseError::MalformedLogLine {
            line: line_no,
            reason: format!("expected {FIELDS} fields, found {}", fields.len()),
        });
    }
    let unix: i64 = fields[0].parse().map_err(|_| ParseError::MalformedLogLine {
        line: line_no,
        reason: format!("invalid timestamp {:?}", fields[0]),
    })?;
    Ok(Hit {
        timestamp: from_unix(unix, line_no)?,
        path: fields[1].to_string(),
        session: fields[2].to_string(),
        referrer: fields[3].to_string(),
        country: fields[4].to_string(),
        device: fields[5].to_string(),
    })
}

/// Reads a log file into hourly stats, bucketing hours in `zone`.
///
/// Every hit counts towards its path. The first hit of each session (and
/// every hit without a session) counts one session and, when present, its
/// referrer, country, and device. A missing file yields empty stats. A final
/// line without a newline is a torn write and is skipped.
///
/// # Errors
///
/// Returns [`LogError::Read`] on I/O failure or
/// [`ParseError::MalformedLogLine`] for a complete line that is invalid.
pub fn parse_log<P: AsRef<Path>>(path: P, zone: Zone) -> Result<Stats> {
    let path = path.as_ref();
    let mut stats = Stats::hourly();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
        Err(source) => {
            return Err(LogError::Read {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };

    let mut reader = BufReader::new(file);
    let mut sessions = HashSet::new();
    let mut buf = String::new();
    let mut line_no = 0;
    let mut events = 0usize;
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).map_err(|source| LogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let Some(line) = buf.strip_suffix('\n') else {
            tracing::warn!(path = %path.display(), line = line_no, "skipping torn trailing log line");
            break;
        };
        if line.is_empty() {
            continue;
        }

        let hit = parse_line(line, line_no)?;
        if stats.start.is_none() {
            stats.start = Some(zone.midnight(hit.timestamp));
        }
        let hour = zone.hour_of(hit.timestamp) as usize;
        events += 1;

        if !hit.path.is_empty() {
            stats.paths.row(&hit.path).values[hour] += 1;
        }
        if hit.session.is_empty() || sessions.insert(hit.session.clone()) {
            stats.sessions.row(SESSIONS_ROW).values[hour] += 1;
            if !hit.referrer.is_empty() {
                stats.referrers.row(&hit.referrer).values[hour] += 1;
            }
            if !hit.country.is_empty() {
                stats.countries.row(&hit.country).values[hour] += 1;
            }
            if !hit.device.is_empty() {
                stats.devices.row(&hit.device).values[hour] += 1;
            }
        }
    }

    tracing::debug!(path = %path.display(), events, sessions = sessions.len(), "parsed event log");
    Ok(stats)
}
