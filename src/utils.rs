use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::errors::ValidationError;

/// The naive layouts accepted alongside RFC 3339.
///
/// A timestamp without an offset is taken to be UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses an ISO-8601 point in time.
///
/// The text must be exact, surrounding whitespace is rejected.
pub fn parse_iso8601(text: &str) -> Result<DateTime<Utc>, ValidationError> {
    if text.len() != text.trim().len() {
        return Err(ValidationError(text.to_string()));
    }

    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    let midnight = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0));
    if let Some(dt) = midnight {
        return Ok(Utc.from_utc_datetime(&dt));
    }

    Err(ValidationError(text.to_string()))
}

/// Patient ids are always generated as version 4 uuids.
#[inline]
pub fn is_uuid_v4(id: &Uuid) -> bool {
    id.get_version_num() == 4
}

#[cfg(test)]
pub(crate) fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, micro: u32) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_micro_opt(h, min, s, micro))
        .unwrap();
    Utc.from_utc_datetime(&naive)
}
