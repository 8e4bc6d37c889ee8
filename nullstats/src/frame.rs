//! Named time-series matrix used by every statistics dimension.
//!
//! A [`Frame`] maps string keys (page paths, referrer hosts, country codes,
//! ...) to fixed-width rows of counters, one counter per time bucket. Rows are
//! kept sorted by name at all times so that lookups are a binary search and
//! serialization is deterministic.
//!
//! # Layout
//!
//! ```text
//!             bucket 0   bucket 1   ...   bucket N-1
//! "/"         [   12   ,    7     , ... ,    3     ]
//! "/about"    [    1   ,    0     , ... ,    2     ]
//! "/blog"     [    4   ,    9     , ... ,    0     ]
//! ```
//!
//! Every row has the frame's *width* (N). Growing a frame zero-fills new
//! buckets in every row; shrinking drops trailing buckets for good.

use serde::Serialize;

/// A single named time series within a [`Frame`].
///
/// The row has a unique name within its frame and one counter per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    /// Row key (page path, referrer, country code, ...).
    pub name: String,
    /// One counter per bucket.
    pub values: Vec<u64>,
}

impl Row {
    fn zeroed(name: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            values: vec![0; width],
        }
    }

    /// Returns the counter at bucket `i`, or 0 if `i` is out of range.
    pub fn get(&self, i: usize) -> u64 {
        self.values.get(i).copied().unwrap_or(0)
    }

    /// Sums the trailing `n` buckets (fewer if the row is narrower).
    pub fn last(&self, n: usize) -> u64 {
        let skip = self.values.len().saturating_sub(n);
        self.values[skip..].iter().sum()
    }

    /// Sums all buckets.
    pub fn total(&self) -> u64 {
        self.values.iter().sum()
    }
}

/// A matrix-shaped data frame of named integer time series, sorted by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    /// Explicit width; 0 means "infer from the first row".
    #[serde(skip)]
    width: usize,
    rows: Vec<Row>,
}

impl Frame {
    /// Creates an empty frame with the given width.
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            rows: Vec::new(),
        }
    }

    /// Returns the frame width: the number of buckets in every row.
    ///
    /// A frame that was never grown takes its width from its first row.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            self.rows.first().map_or(0, |row| row.values.len())
        } else {
            self.width
        }
    }

    /// Returns true if the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the rows in ascending name order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Iterates over rows in ascending name order.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Resizes every row to `width` buckets.
    ///
    /// New buckets are zero; shrinking discards the trailing buckets. Rows
    /// created later also get this width.
    pub fn grow(&mut self, width: usize) {
        if width == self.len() {
            return;
        }
        self.width = width;
        for row in &mut self.rows {
            row.values.resize(width, 0);
        }
    }

    /// Returns the row with the given name, inserting a zeroed one at its
    /// sorted position if it does not exist yet.
    pub fn row(&mut self, name: &str) -> &mut Row {
        let index = match self.find(name) {
            Ok(index) => index,
            Err(index) => {
                let width = self.len();
                self.rows.insert(index, Row::zeroed(name, width));
                index
            }
        };
        &mut self.rows[index]
    }

    /// Looks up a row without inserting.
    pub fn get(&self, name: &str) -> Option<&Row> {
        self.find(name).ok().map(|index| &self.rows[index])
    }

    /// Removes the row with the given name. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        match self.find(name) {
            Ok(index) => {
                self.rows.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns up to `n` rows ordered by descending total, ties by name.
    pub fn top(&self, n: usize) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.iter().collect();
        // Stable sort keeps the name order for equal totals.
        rows.sort_by_key(|row| std::cmp::Reverse(row.total()));
        rows.truncate(n);
        rows
    }

    /// Binary search by name: `Ok(index)` if present, `Err(insert_at)` otherwise.
    fn find(&self, name: &str) -> Result<usize, usize> {
        self.rows.binary_search_by(|row| row.name.as_str().cmp(name))
    }
}

/// Frames compare by content. The width of a frame without rows is not part
/// of its value, matching what survives encoding.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl Eq for Frame {}

impl<'a> IntoIterator for &'a Frame {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
