use chrono::{DateTime, Datelike, SecondsFormat, Utc};

use crate::error::BridgeError;

/// Parses an RFC3339 timestamp and normalizes it to UTC.
///
/// The grammar is chrono's strict RFC3339 one: four-digit year, two-digit
/// fields, a `T`, `t` or space separator, optional fractional seconds and a
/// mandatory `Z` or `±hh:mm` designator. Whole and fractional seconds go
/// through the same parser.
pub fn parse(value: &str) -> Result<DateTime<Utc>, BridgeError> {
    let instant = DateTime::parse_from_rfc3339(value)
        .map_err(|_| invalid(value))?
        .with_timezone(&Utc);
    // An offset can carry 9999-12-31 or 0000-01-01 out of four-digit years.
    if !(0..=9999).contains(&instant.year()) {
        return Err(invalid(value));
    }
    Ok(instant)
}

/// Canonical wire form: UTC, whole seconds, `Z` suffix.
pub fn render(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn invalid(value: &str) -> BridgeError {
    BridgeError::InvalidTimestamp(value.to_string())
}
