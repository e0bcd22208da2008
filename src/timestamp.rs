//! Timestamp strings from layer properties and the image creation time.
//!
//! Accepted forms, tried in order:
//! 1. the whole string as a base-10 integer of milliseconds since the epoch
//! 2. `2024-05-01T12:30:00+02:00` (RFC 3339)
//! 3. `2024-05-01T12:30:00Z`
//! 4. `2024-05-01 12:30:00`
//! 5. `2024-05-01`
//! 6. `2024-05-01T12:30:00`
//!
//! Forms without an offset are read as UTC.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// A timestamp string matched none of the accepted forms.
///
/// Carries the time a caller should use if it decides to carry on.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "failed to parse timestamp '{input}': expected milliseconds since epoch or an RFC 3339 date-time"
)]
pub struct TimestampError {
    input: String,
    fallback: OffsetDateTime,
}

impl TimestampError {
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Current time captured when parsing failed.
    pub fn fallback(&self) -> OffsetDateTime {
        self.fallback
    }
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    Rfc3339,
    Zulu,
    SpaceSeparated,
    DateOnly,
    NoOffset,
}

const LAYOUTS: [Layout; 5] = [
    Layout::Rfc3339,
    Layout::Zulu,
    Layout::SpaceSeparated,
    Layout::DateOnly,
    Layout::NoOffset,
];

impl Layout {
    fn parse(self, input: &str) -> Option<OffsetDateTime> {
        match self {
            Layout::Rfc3339 => OffsetDateTime::parse(input, &Rfc3339).ok(),
            Layout::Zulu => PrimitiveDateTime::parse(
                input,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
            )
            .ok()
            .map(PrimitiveDateTime::assume_utc),
            Layout::SpaceSeparated => PrimitiveDateTime::parse(
                input,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            )
            .ok()
            .map(PrimitiveDateTime::assume_utc),
            Layout::DateOnly => Date::parse(input, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|date| date.midnight().assume_utc()),
            Layout::NoOffset => PrimitiveDateTime::parse(
                input,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
            .ok()
            .map(PrimitiveDateTime::assume_utc),
        }
    }
}

/// Parse a timestamp string.
///
/// On failure the error holds the current time as a fallback.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime, TimestampError> {
    if let Some(ts) = parse_millis(input) {
        return Ok(ts);
    }

    for layout in LAYOUTS {
        if let Some(ts) = layout.parse(input) {
            return Ok(ts);
        }
    }

    Err(TimestampError {
        input: input.to_string(),
        fallback: OffsetDateTime::now_utc(),
    })
}

/// Parse the image creation time, always yielding a usable time.
///
/// The error, if any, is returned alongside so the caller can decide whether
/// falling back to "now" is acceptable.
pub fn parse_creation_time(input: &str) -> (OffsetDateTime, Option<TimestampError>) {
    match parse_timestamp(input) {
        Ok(ts) => (ts, None),
        Err(err) => (err.fallback(), Some(err)),
    }
}

/// Seconds since the epoch, clamped to zero for pre-epoch times.
pub(crate) fn unix_seconds(ts: OffsetDateTime) -> u64 {
    u64::try_from(ts.unix_timestamp()).unwrap_or(0)
}

fn parse_millis(input: &str) -> Option<OffsetDateTime> {
    let ms: i64 = input.parse().ok()?;
    // Only the canonical decimal rendering counts, so "+5" or "0042" fall
    // through to the date layouts.
    if ms.to_string() != input {
        return None;
    }
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}
