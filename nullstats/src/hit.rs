//! The normalized page-visit event consumed by the engine.
//!
//! Turning an HTTP request into a [`Hit`] (session fingerprinting, referrer
//! cleanup, bot detection) happens outside this crate. The engine only needs
//! the already-sanitized fields, plus a pluggable [`CountryLookup`] for
//! callers that resolve countries from IP addresses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single page visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// When the visit happened.
    pub timestamp: DateTime<Utc>,
    /// Requested page path, e.g. `/blog/post`.
    pub path: String,
    /// Opaque, privacy-preserving session fingerprint.
    pub session: String,
    /// Referrer host, e.g. `google.com`.
    pub referrer: String,
    /// ISO country code, e.g. `DE`.
    pub country: String,
    /// Device class, see [`Device`].
    pub device: String,
}

impl Hit {
    /// Creates a hit for `path` at `timestamp` with every other field empty.
    pub fn new(timestamp: DateTime<Utc>, path: impl Into<String>) -> Self {
        Self {
            timestamp,
            path: path.into(),
            session: String::new(),
            referrer: String::new(),
            country: String::new(),
            device: String::new(),
        }
    }

    /// Sets the session fingerprint.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Sets the referrer host.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    /// Sets the country code.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Resolves the country code for `ip` through `lookup`.
    ///
    /// The country is left untouched when the lookup has no answer, so a
    /// caller can fall back to another source (e.g. `Accept-Language`).
    pub fn with_country_from<L: CountryLookup + ?Sized>(mut self, lookup: &L, ip: &str) -> Self {
        if let Some(country) = lookup.country(ip) {
            self.country = country;
        }
        self
    }

    /// Sets the device class.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device.as_str().to_string();
        self
    }
}

/// Device classes recorded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Phones and tablets.
    Mobile,
    /// Everything else.
    Desktop,
}

impl Device {
    /// Returns the value stored in the event log.
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Mobile => "mobile",
            Device::Desktop => "desktop",
        }
    }
}

/// Resolves an IP address to an ISO country code.
pub trait CountryLookup {
    /// Returns the country code for `ip`, or `None` if unknown.
    fn country(&self, ip: &str) -> Option<String>;
}

impl<F> CountryLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn country(&self, ip: &str) -> Option<String> {
        self(ip)
    }
}

/// A lookup that never knows the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCountryLookup;

impl CountryLookup for NoCountryLookup {
    fn country(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// A fixed IP to country table.
#[derive(Debug, Clone, Default)]
pub struct StaticCountries(HashMap<String, String>);

impl StaticCountries {
    /// Builds a table from `(ip, country)` pairs.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(ip, country)| (ip.into(), country.into()))
                .collect(),
        )
    }
}

impl CountryLookup for StaticCountries {
    fn country(&self, ip: &str) -> Option<String> {
        self.0.get(ip).cloned()
    }
}
