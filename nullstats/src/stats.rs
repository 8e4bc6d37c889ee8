//! Period snapshots: five frames sharing a start time and bucket interval.
//!
//! A [`Stats`] value is either the hourly view of one live period (24 buckets,
//! 1h interval) or the daily historical record (one bucket per calendar day,
//! 24h interval). This module owns the text encoding of snapshots and the
//! merge that folds a finished period into the history.
//!
//! # File Format
//!
//! ```text
//! #2021-01-01T00:00:00Z,24h0m0s     <- header: start, interval
//! /,12,7,3                          <- paths frame rows
//! /about,1,0,2
//!                                   <- blank line ends the frame
//! sessions,8,5,2                    <- sessions frame
//!
//! google.com,3,1,0                  <- referrers frame
//!
//! DE,4,2,1                          <- countries frame
//!
//! desktop,6,3,1                     <- devices frame
//!
//! ```
//!
//! Rows are written in sorted order, so equal snapshots always encode to
//! identical text.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, SecondsFormat, TimeZone};
use serde::{Serialize, Serializer};

use crate::duration;
use crate::error::{ParseError, StatsError};
use crate::frame::Frame;

/// Bucket interval of the historical record.
pub const DAILY: Duration = Duration::from_secs(24 * 3600);

/// Bucket interval of a live period.
pub const HOURLY: Duration = Duration::from_secs(3600);

/// Number of hourly buckets in a live period.
pub const HOURS_PER_DAY: usize = 24;

/// Header timestamp written for a snapshot without a start.
const UNSET_START: &str = "0001-01-01T00:00:00Z";

/// The statistical dimensions, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Page paths.
    Paths,
    /// Unique sessions (a single `sessions` row).
    Sessions,
    /// Referrer hosts.
    Referrers,
    /// Visitor countries.
    Countries,
    /// Device classes.
    Devices,
}

impl Dimension {
    /// All dimensions in file order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Paths,
        Dimension::Sessions,
        Dimension::Referrers,
        Dimension::Countries,
        Dimension::Devices,
    ];

    /// Lowercase name of the dimension.
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Paths => "paths",
            Dimension::Sessions => "sessions",
            Dimension::Referrers => "referrers",
            Dimension::Countries => "countries",
            Dimension::Devices => "devices",
        }
    }
}

/// Aggregated site statistics over a time period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Local midnight of the first bucket, or `None` if nothing was recorded.
    pub start: Option<DateTime<FixedOffset>>,
    /// Duration of one bucket.
    #[serde(serialize_with = "serialize_interval")]
    pub interval: Duration,
    /// Page path counts.
    pub paths: Frame,
    /// Unique session counts, under the single row `sessions`.
    pub sessions: Frame,
    /// Referrer counts, one per session.
    pub referrers: Frame,
    /// Country counts, one per session.
    pub countries: Frame,
    /// Device class counts, one per session.
    pub devices: Frame,
}

fn serialize_interval<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&duration::format(*interval))
}

impl Default for Stats {
    /// An empty daily snapshot: no start, 24h interval.
    fn default() -> Self {
        Self::with_width(DAILY, 0)
    }
}

impl Stats {
    /// Creates empty stats whose frames all have `width` buckets.
    pub fn with_width(interval: Duration, width: usize) -> Self {
        Self {
            start: None,
            interval,
            paths: Frame::with_width(width),
            sessions: Frame::with_width(width),
            referrers: Frame::with_width(width),
            countries: Frame::with_width(width),
            devices: Frame::with_width(width),
        }
    }

    /// Creates empty stats for one live period: 24 hourly buckets.
    pub fn hourly() -> Self {
        Self::with_width(HOURLY, HOURS_PER_DAY)
    }

    /// Returns the frame for a dimension.
    pub fn frame(&self, dimension: Dimension) -> &Frame {
        match dimension {
            Dimension::Paths => &self.paths,
            Dimension::Sessions => &self.sessions,
            Dimension::Referrers => &self.referrers,
            Dimension::Countries => &self.countries,
            Dimension::Devices => &self.devices,
        }
    }

    /// Returns the frame for a dimension, mutably.
    pub fn frame_mut(&mut self, dimension: Dimension) -> &mut Frame {
        match dimension {
            Dimension::Paths => &mut self.paths,
            Dimension::Sessions => &mut self.sessions,
            Dimension::Referrers => &mut self.referrers,
            Dimension::Countries => &mut self.countries,
            Dimension::Devices => &mut self.devices,
        }
    }

    /// Returns all frames in file order.
    pub fn frames(&self) -> [&Frame; 5] {
        [
            &self.paths,
            &self.sessions,
            &self.referrers,
            &self.countries,
            &self.devices,
        ]
    }

    fn frames_mut(&mut self) -> [&mut Frame; 5] {
        [
            &mut self.paths,
            &mut self.sessions,
            &mut self.referrers,
            &mut self.countries,
            &mut self.devices,
        ]
    }

    /// Returns the number of buckets (the width shared by all frames).
    pub fn width(&self) -> usize {
        self.frames().iter().map(|frame| frame.len()).max().unwrap_or(0)
    }

    /// Resizes every frame to `width` buckets.
    pub fn grow(&mut self, width: usize) {
        for frame in self.frames_mut() {
            frame.grow(width);
        }
    }

    /// Encodes the snapshot in the line-oriented text format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push('#');
        match &self.start {
            Some(start) => out.push_str(&start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => out.push_str(UNSET_START),
        }
        out.push(',');
        out.push_str(&duration::format(self.interval));
        out.push('\n');

        for frame in self.frames() {
            for row in frame {
                out.push_str(&row.name);
                for value in &row.values {
                    out.push(',');
                    out.push_str(&value.to_string());
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Decodes a snapshot from its text format.
    ///
    /// Empty input yields empty daily stats (no history yet).
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing the first malformed line.
    pub fn decode(text: &str) -> Result<Self, ParseError> {
        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .enumerate()
            .map(|(i, line)| (i + 1, line));

        let header = match lines.next() {
            None | Some((_, "")) => return Ok(Self::default()),
            Some((_, header)) => header,
        };
        let (start, interval) = parse_header(header)?;

        let mut stats = Self::with_width(interval, 0);
        stats.start = start;

        let mut width: Option<usize> = None;
        for frame in stats.frames_mut() {
            for (line_no, line) in lines.by_ref() {
                if line.is_empty() {
                    break;
                }
                let mut fields = line.split(',');
                let name = fields.next().unwrap_or_default();
                let values = fields
                    .map(|field| {
                        field.parse::<u64>().map_err(|_| ParseError::Value {
                            line: line_no,
                            value: field.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if values.is_empty() {
                    return Err(ParseError::RowFields { line: line_no });
                }
                match width {
                    None => width = Some(values.len()),
                    Some(expected) if expected != values.len() => {
                        return Err(ParseError::RowWidth {
                            line: line_no,
                            expected,
                            found: values.len(),
                        });
                    }
                    Some(_) => {}
                }
                frame.grow(values.len());
                frame.row(name).values = values;
            }
        }

        if let Some((line, _)) = lines.find(|(_, line)| !line.is_empty()) {
            return Err(ParseError::TrailingData { line });
        }

        stats.grow(width.unwrap_or(0));
        Ok(stats)
    }

    /// Folds a finished period into this historical record.
    ///
    /// The period's buckets are summed per row and written into the history
    /// column of the period's calendar day, growing the history as needed.
    /// The column is overwritten, not added to, so merging the same period
    /// twice leaves the history unchanged. A period with no start is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::BeforeHistory`] if the period's day precedes the
    /// first day of the history.
    pub fn merge(&mut self, period: &Stats) -> Result<(), StatsError> {
        let Some(period_start) = period.start else {
            return Ok(());
        };
        let history_start = *self.start.get_or_insert_with(|| calendar_day(period_start));

        let days = (period_start.date_naive() - history_start.date_naive()).num_days();
        let column = usize::try_from(days).map_err(|_| StatsError::BeforeHistory {
            period: period_start.date_naive().to_string(),
            history: history_start.date_naive().to_string(),
        })?;

        // Never shrink: a late period may land before the newest column.
        self.grow(self.width().max(column + 1));
        for (history_frame, period_frame) in self.frames_mut().into_iter().zip(period.frames()) {
            for row in period_frame {
                history_frame.row(&row.name).values[column] = row.total();
            }
        }
        Ok(())
    }
}

/// Midnight of the calendar day of `ts`, at the same offset.
fn calendar_day(ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let naive = ts.date_naive().and_time(NaiveTime::MIN);
    ts.offset().from_local_datetime(&naive).single().unwrap_or(ts)
}

fn parse_header(line: &str) -> Result<(Option<DateTime<FixedOffset>>, Duration), ParseError> {
    let Some(body) = line.strip_prefix('#') else {
        return Err(ParseError::MissingHeader {
            found: line.to_string(),
        });
    };
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != 2 {
        return Err(ParseError::HeaderFields {
            count: fields.len(),
        });
    }
    let (timestamp, interval) = (fields[0], fields[1]);

    let start = if timestamp == UNSET_START {
        None
    } else {
        let parsed =
            DateTime::parse_from_rfc3339(timestamp).map_err(|e| ParseError::Timestamp {
                value: timestamp.to_string(),
                reason: e.to_string(),
            })?;
        Some(parsed)
    };
    let interval = duration::parse(interval).map_err(|reason| ParseError::Duration {
        value: interval.to_string(),
        reason,
    })?;
    Ok((start, interval))
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Stats {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format!("{s}T00:00:00Z")).unwrap()
    }

    fn hourly_on(date: &str) -> Stats {
        let mut stats = Stats::hourly();
        stats.start = Some(day(date));
        stats
    }

    /// Deterministic pseudo-random source so the test needs no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn test_encode_format() {
        let mut stats = Stats::with_width(DAILY, 2);
        stats.start = Some(day("2021-01-01"));
        stats.paths.row("/b").values = vec![1, 2];
        stats.paths.row("/a").values = vec![3, 4];
        stats.sessions.row("sessions").values = vec![5, 6];

        assert_eq!(
            stats.encode(),
            "#2021-01-01T00:00:00Z,24h0m0s\n/a,3,4\n/b,1,2\n\nsessions,5,6\n\n\n\n\n"
        );
    }

    #[test]
    fn test_roundtrip_random_frames() {
        let mut rng = Lcg(42);
        let mut stats = Stats::with_width(Duration::from_secs(3 * 3600), 30);
        stats.start = Some(DateTime::parse_from_rfc3339("2021-06-15T13:45:10+02:00").unwrap());
        for dimension in Dimension::ALL {
            let frame = stats.frame_mut(dimension);
            for _ in 0..=rng.next(4) {
                let name = format!("row{}", rng.next(1000));
                let row = frame.row(&name);
                for value in &mut row.values {
                    *value = rng.next(100);
                }
            }
        }

        let parsed = Stats::decode(&stats.encode()).unwrap();
        assert_eq!(parsed, stats);
        assert_eq!(parsed.width(), 30);
    }

    #[test]
    fn test_roundtrip_unset_start() {
        let mut stats = Stats::default();
        stats.paths.grow(1);
        stats.paths.row("/").values[0] = 9;
        let parsed = Stats::decode(&stats.encode()).unwrap();
        assert_eq!(parsed.start, None);
        assert_eq!(parsed, stats);
    }

    #[test]
    fn test_decode_empty_input() {
        let stats = Stats::decode("").unwrap();
        assert_eq!(stats.start, None);
        assert_eq!(stats.interval, DAILY);
        assert!(stats.frames().iter().all(|frame| frame.is_empty()));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Stats::decode("2021-01-01T00:00:00Z,24h\n"),
            Err(ParseError::MissingHeader { .. })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z\n"),
            Err(ParseError::HeaderFields { count: 1 })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h,x\n"),
            Err(ParseError::HeaderFields { count: 3 })
        ));
        assert!(matches!(
            Stats::decode("#yesterday,24h\n"),
            Err(ParseError::Timestamp { .. })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,forever\n"),
            Err(ParseError::Duration { .. })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h\n/a\n"),
            Err(ParseError::RowFields { line: 2 })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h\n/a,1\n/b,x\n"),
            Err(ParseError::Value { line: 3, .. })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h\n/a,-1\n"),
            Err(ParseError::Value { line: 2, .. })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h\n/a,1\n\nsessions,1,2\n"),
            Err(ParseError::RowWidth { line: 4, expected: 1, found: 2 })
        ));
        assert!(matches!(
            Stats::decode("#2021-01-01T00:00:00Z,24h\n\n\n\n\n\nextra,1\n"),
            Err(ParseError::TrailingData { line: 7 })
        ));
    }

    #[test]
    fn test_decode_fills_empty_frames_to_width() {
        let stats = Stats::decode("#2021-01-01T00:00:00Z,24h\n\n\n\nDE,1,2,3\n\n").unwrap();
        assert_eq!(stats.width(), 3);
        assert_eq!(stats.paths.len(), 3);
        assert_eq!(stats.devices.len(), 3);
        assert_eq!(stats.countries.get("DE").unwrap().values, [1, 2, 3]);
    }

    #[test]
    fn test_merge_sums_hours_into_day() {
        let mut daily = hourly_on("2021-01-01");
        let row = daily.paths.row("/a");
        row.values[0] = 1;
        row.values[23] = 2;

        let mut history = Stats::default();
        history.merge(&daily).unwrap();

        assert_eq!(history.start, Some(day("2021-01-01")));
        assert_eq!(history.paths.len(), 1);
        assert_eq!(history.paths.get("/a").unwrap().values, [3]);
        assert_eq!(history.width(), 1);
    }

    #[test]
    fn test_merge_later_day_grows_history() {
        let mut history = Stats::default();

        let mut first = hourly_on("2021-01-01");
        first.paths.row("/a").values[5] = 4;
        history.merge(&first).unwrap();

        let mut third = hourly_on("2021-01-03");
        third.paths.row("/b").values[1] = 2;
        third.sessions.row("sessions").values[1] = 1;
        history.merge(&third).unwrap();

        assert_eq!(history.width(), 3);
        assert_eq!(history.paths.get("/a").unwrap().values, [4, 0, 0]);
        assert_eq!(history.paths.get("/b").unwrap().values, [0, 0, 2]);
        assert_eq!(history.sessions.get("sessions").unwrap().values, [0, 0, 1]);
        assert_eq!(history.devices.len(), 3);
    }

    #[test]
    fn test_merge_earlier_day_keeps_later_columns() {
        let mut history = Stats::default();
        for (date, views) in [("2021-01-01", 1), ("2021-01-02", 2), ("2021-01-03", 3)] {
            let mut daily = hourly_on(date);
            daily.paths.row("/a").values[12] = views;
            history.merge(&daily).unwrap();
        }

        let mut late = hourly_on("2021-01-02");
        late.paths.row("/a").values[23] = 5;
        history.merge(&late).unwrap();

        assert_eq!(history.width(), 3);
        assert_eq!(history.paths.get("/a").unwrap().values, [1, 5, 3]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut history = Stats::default();
        let mut daily = hourly_on("2021-01-02");
        daily.paths.row("/x").values[3] = 7;
        daily.countries.row("FR").values[3] = 1;

        history.merge(&daily).unwrap();
        let once = history.clone();
        history.merge(&daily).unwrap();
        assert_eq!(history, once);
    }

    #[test]
    fn test_merge_empty_period_is_noop() {
        let mut history = Stats::default();
        history.merge(&Stats::hourly()).unwrap();
        assert_eq!(history, Stats::default());
    }

    #[test]
    fn test_merge_before_history_fails() {
        let mut history = Stats::default();
        history.merge(&hourly_on("2021-01-05")).unwrap();
        let err = history.merge(&hourly_on("2021-01-04")).unwrap_err();
        assert!(matches!(err, StatsError::BeforeHistory { .. }));
    }

    #[test]
    fn test_merge_offset_period_uses_local_day() {
        let mut history = Stats::default();
        let mut daily = Stats::hourly();
        daily.start = Some(DateTime::parse_from_rfc3339("2021-01-02T00:00:00+05:00").unwrap());
        daily.paths.row("/").values[0] = 1;
        history.merge(&daily).unwrap();
        assert_eq!(
            history.start.unwrap().to_rfc3339(),
            "2021-01-02T00:00:00+05:00"
        );
    }
}
