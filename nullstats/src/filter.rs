//! Pre-filter that keeps static assets and internal pages out of the log.

use serde::{Deserialize, Serialize};

/// Default marker for internal/administrative paths, e.g. `/_/stats/`.
pub const DEFAULT_INTERNAL_MARKER: &str = "/_";

/// Decides which page paths are worth recording.
///
/// Rejected hits are silently dropped by the collector; they are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitFilter {
    /// Drop paths whose last segment has a file extension (`/style.css`).
    pub skip_assets: bool,
    /// Drop paths containing any of these substrings.
    pub internal_markers: Vec<String>,
}

impl Default for HitFilter {
    fn default() -> Self {
        Self {
            skip_assets: true,
            internal_markers: vec![DEFAULT_INTERNAL_MARKER.to_string()],
        }
    }
}

impl HitFilter {
    /// A filter that accepts every path.
    pub fn accept_all() -> Self {
        Self {
            skip_assets: false,
            internal_markers: Vec::new(),
        }
    }

    /// Returns true if a hit on `path` should be recorded.
    pub fn accepts(&self, path: &str) -> bool {
        if self.skip_assets && has_extension(path) {
            return false;
        }
        !self
            .internal_markers
            .iter()
            .any(|marker| !marker.is_empty() && path.contains(marker.as_str()))
    }
}

/// True if the last path segment contains a dot.
fn has_extension(path: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.contains('.')
}
