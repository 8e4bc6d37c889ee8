//! Report context handed to renderers.
//!
//! A [`Report`] bundles today's hourly stats, the daily history (including
//! today) and an optional caller-supplied extension such as site metadata.
//! The engine does no rendering itself; it only supplies the data.

use serde::Serialize;

use crate::frame::Row;
use crate::stats::{Dimension, Stats};

/// Stats for one rendering pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report<E = ()> {
    /// Hourly stats of the live period.
    pub daily: Stats,
    /// Daily history, with the live period merged in.
    pub history: Stats,
    /// Caller data passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<E>,
}

/// Headline numbers of a [`Report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Page views in the live period.
    pub views_today: u64,
    /// Sessions in the live period.
    pub sessions_today: u64,
    /// Page views over the whole history.
    pub views_total: u64,
    /// Sessions over the whole history.
    pub sessions_total: u64,
    /// Days covered by the history.
    pub days: usize,
}

impl<E> Report<E> {
    /// Creates a report.
    pub fn new(daily: Stats, history: Stats, extension: Option<E>) -> Self {
        Self {
            daily,
            history,
            extension,
        }
    }

    /// Sums views and sessions for today and for the whole history.
    pub fn totals(&self) -> Totals {
        Totals {
            views_today: frame_total(&self.daily, Dimension::Paths),
            sessions_today: frame_total(&self.daily, Dimension::Sessions),
            views_total: frame_total(&self.history, Dimension::Paths),
            sessions_total: frame_total(&self.history, Dimension::Sessions),
            days: self.history.width(),
        }
    }

    /// The `n` busiest rows of a history dimension.
    pub fn top(&self, dimension: Dimension, n: usize) -> Vec<&Row> {
        self.history.frame(dimension).top(n)
    }
}

fn frame_total(stats: &Stats, dimension: Dimension) -> u64 {
    stats.frame(dimension).iter().map(Row::total).sum()
}
