//! OAI-PMH datestamp codec.
//!
//! Converts between wall-clock time and the ISO-8601 UTC datestamps the
//! protocol uses for selective harvesting (section 3.3 of the OAI-PMH
//! specification). Providers advertise one of two granularities in their
//! Identify response; `from`/`until` arguments must match it.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{HarvesterError, Result};

/// Datestamp granularity supported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Day granularity: `YYYY-MM-DD`.
    Day,
    /// Second granularity: `YYYY-MM-DDThh:mm:ssZ`.
    Second,
}

impl Granularity {
    /// Parse the granularity token from an Identify response.
    ///
    /// Returns `None` for anything other than the two tokens the protocol
    /// allows.
    #[must_use]
    pub fn from_identify(token: &str) -> Option<Self> {
        if token == "YYYY-MM-DD" {
            Some(Self::Day)
        } else if token.eq_ignore_ascii_case("YYYY-MM-DDThh:mm:ssZ") {
            Some(Self::Second)
        } else {
            None
        }
    }

    /// Human-readable label used in log output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "days",
            Self::Second => "seconds",
        }
    }
}

/// Format a time as an OAI datestamp at the given granularity.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use oai_harvester::datestamp::{format_datestamp, Granularity};
///
/// let t = Utc.with_ymd_and_hms(2004, 12, 31, 23, 59, 59).unwrap();
/// assert_eq!(format_datestamp(t, Granularity::Day), "2004-12-31");
/// assert_eq!(
///     format_datestamp(t, Granularity::Second),
///     "2004-12-31T23:59:59Z"
/// );
/// ```
#[must_use]
pub fn format_datestamp(time: DateTime<Utc>, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => time.format("%Y-%m-%d").to_string(),
        Granularity::Second => time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}

/// Parse an OAI datestamp in either the short form `YYYY-MM-DD` or the
/// long form `YYYY-MM-DDThh:mm:ssZ` (case-insensitive markers).
///
/// Two normalization rules apply before parsing:
///
/// * Any year before 1970 yields the Unix epoch instead of an error, so a
///   malformed lower bound degrades to "match nothing newer than the
///   epoch" rather than aborting the request.
/// * The short form is coerced to `T01:00:00Z` so a single internal
///   representation covers both granularities.
///
/// # Examples
/// ```
/// use oai_harvester::datestamp::parse_datestamp;
///
/// let t = parse_datestamp("2003-12-31T23:59:59Z").unwrap();
/// assert_eq!(t.timestamp(), 1072915199);
/// assert_eq!(parse_datestamp("1955-06-15").unwrap().timestamp(), 0);
/// ```
pub fn parse_datestamp(stamp: &str) -> Result<DateTime<Utc>> {
    let year: i32 = stamp
        .get(0..4)
        .and_then(|y| y.parse().ok())
        .ok_or_else(|| HarvesterError::InvalidDatestamp(stamp.to_string()))?;
    if year < 1970 {
        return Ok(DateTime::UNIX_EPOCH);
    }

    let mut normalized = stamp.to_ascii_lowercase();
    if normalized.len() == 10 {
        normalized.push_str("t01:00:00z");
    }

    let parsed = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dt%H:%M:%Sz")
        .map_err(|_| HarvesterError::InvalidDatestamp(stamp.to_string()))?;
    Ok(parsed.and_utc())
}
