//! # nullstats
//!
//! Crash-safe daily/hourly aggregation engine for privacy-friendly web
//! analytics.
//!
//! nullstats records page hits into an append-only event log for the current
//! day, and folds each finished day into a compact daily history. All state is
//! two plain-text files in one directory; there is no database, no background
//! thread and no cookie storage.
//!
//! ## Key Properties
//!
//! - One line per hit, one `write` per line
//! - Hourly stats for today, rebuilt from the log on demand
//! - Daily history with one column per calendar day
//! - Rollover is idempotent: a crash mid-rollover never double-counts
//! - Sessions, referrers, countries and devices are counted once per session
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nullstats::{Collector, CollectorConfig, Device, Hit};
//! use chrono::Utc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let collector = Collector::new(CollectorConfig::new("./site-stats"))?;
//!
//! // Record a hit (static assets and "/_" paths are dropped)
//! collector.hit(
//!     &Hit::new(Utc::now(), "/blog/hello")
//!         .with_session("a1b2c3")
//!         .with_referrer("news.ycombinator.com")
//!         .with_device(Device::Desktop),
//! )?;
//!
//! // Today's hourly stats and the daily history including today
//! let (daily, history) = collector.stats()?;
//! for row in history.paths.top(10) {
//!     println!("{}: {}", row.name, row.total());
//! }
//! # let _ = daily;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Collector`]: Top-level handle; owns a directory, rolls days over
//! - [`Stats`]: Five [`Frame`]s sharing a start time and bucket interval
//! - [`Appender`]: Append-only writer for the live event log
//! - [`Report`]: Daily + history + caller data, for renderers
//!
//! ## Modules
//!
//! - [`collector`]: Hit recording, rollover, read path
//! - [`config`]: Directory, time zone and filter configuration
//! - [`stats`]: Snapshot text format and merge
//! - [`frame`]: Named, sorted rows of counters
//! - [`log`]: Event log append and parse
//! - [`hit`]: Hit events and country lookup
//! - [`filter`]: Asset/internal path pre-filter
//! - [`zone`]: Calendar-day time zones
//! - [`duration`]: Interval literals
//! - [`report`]: Report context
//! - [`error`]: Error types

pub mod collector;
pub mod config;
pub mod duration;
pub mod error;
pub mod filter;
pub mod frame;
pub mod hit;
pub mod log;
pub mod report;
pub mod stats;
pub mod zone;

pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{NullstatsError, Result};
pub use filter::HitFilter;
pub use frame::{Frame, Row};
pub use hit::{CountryLookup, Device, Hit, NoCountryLookup, StaticCountries};
pub use log::Appender;
pub use report::{Report, Totals};
pub use stats::{Dimension, Stats};
pub use zone::Zone;
