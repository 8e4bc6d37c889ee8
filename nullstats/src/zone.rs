//! Time zone configuration for calendar-day bucketing.
//!
//! Periods roll over at local midnight and hourly buckets follow local hours,
//! so every timestamp the engine buckets goes through a [`Zone`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Time zone in which calendar days and hours are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Zone {
    /// Coordinated Universal Time.
    #[default]
    Utc,
    /// The host's local time zone, including daylight saving transitions.
    Local,
    /// A fixed offset east of UTC.
    Fixed {
        /// Offset in seconds east of UTC.
        offset_seconds: i32,
    },
}

impl Zone {
    /// Converts a UTC instant to this zone, keeping the concrete offset.
    pub fn localize(self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Zone::Utc => ts.fixed_offset(),
            Zone::Local => ts.with_timezone(&Local).fixed_offset(),
            Zone::Fixed { offset_seconds } => match FixedOffset::east_opt(offset_seconds) {
                Some(offset) => ts.with_timezone(&offset),
                None => ts.fixed_offset(),
            },
        }
    }

    /// Returns the calendar day of `ts` in this zone.
    pub fn date_of(self, ts: DateTime<Utc>) -> NaiveDate {
        self.localize(ts).date_naive()
    }

    /// Returns the hour of day (0..24) of `ts` in this zone.
    pub fn hour_of(self, ts: DateTime<Utc>) -> u32 {
        self.localize(ts).hour()
    }

    /// Returns local midnight of the calendar day containing `ts`.
    pub fn midnight(self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = self.localize(ts);
        let naive = local.date_naive().and_time(NaiveTime::MIN);
        match self {
            // Midnight can be skipped or repeated by a DST change; take the
            // earliest valid instant, or fall back to the event's own offset.
            Zone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map_or_else(|| fixed_midnight(local), |dt| dt.fixed_offset()),
            Zone::Utc | Zone::Fixed { .. } => fixed_midnight(local),
        }
    }
}

fn fixed_midnight(local: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let naive = local.date_naive().and_time(NaiveTime::MIN);
    local
        .offset()
        .from_local_datetime(&naive)
        .single()
        .unwrap_or(local)
}

impl FromStr for Zone {
    type Err = ConfigError;

    /// Parses `utc`, `local`, or a `+HH:MM` / `-HH:MM` / `+HHMM` offset.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidZone {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" => return Ok(Zone::Utc),
            "local" => return Ok(Zone::Local),
            _ => {}
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        Ok(Zone::Fixed {
            offset_seconds: sign * (hours * 3600 + minutes * 60),
        })
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Utc => f.write_str("utc"),
            Zone::Local => f.write_str("local"),
            Zone::Fixed { offset_seconds } => {
                let sign = if *offset_seconds < 0 { '-' } else { '+' };
                let abs = offset_seconds.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}
