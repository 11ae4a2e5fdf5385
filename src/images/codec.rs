use chrono::{DateTime, Utc};

use crate::errors::{DecodeError, DecodeFailure};
use crate::utils::parse_iso8601;

/// Fixed width rendering so that keys under the same patient prefix
/// sort lexicographically in chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Separates the patient id from the image name in a key.
pub const KEY_SEPARATOR: char = '/';

const TIMESTAMP_MARKER: char = 'Z';

/// The listing prefix which selects every image owned by the patient.
#[inline]
pub fn patient_prefix(patient_id: &str) -> String {
    format!("{}{}", patient_id, KEY_SEPARATOR)
}

/// Gets the extension of a filename including the leading `.`.
///
/// Hidden files (`.bashrc`) and names ending in a dot have no extension.
pub fn file_extension(filename: &str) -> &str {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);

    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) if idx == name.len() - 1 => "",
        Some(idx) => &name[idx..],
    }
}

/// Builds the storage key for an image taken at `timestamp`.
pub fn encode_key(patient_id: &str, timestamp: DateTime<Utc>, filename: &str) -> String {
    debug_assert!(!patient_id.contains(KEY_SEPARATOR));

    format!(
        "{}{}{}",
        patient_prefix(patient_id),
        timestamp.format(TIMESTAMP_FORMAT),
        file_extension(filename),
    )
}

/// Recovers the capture timestamp and extension from a storage key.
///
/// Keys written by current code end the timestamp with a `Z` marker (`z` is
/// also accepted),
/// older keys carry a naive or offset timestamp followed directly by the
/// extension. Both are accepted.
pub fn decode_key(key: &str) -> Result<(DateTime<Utc>, String), DecodeError> {
    let (_, name) = key
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| DecodeError::new(key, DecodeFailure::MissingPatientPrefix))?;

    if let Some(idx) = name.find(|c: char| c.eq_ignore_ascii_case(&TIMESTAMP_MARKER)) {
        let (text, extension) = name.split_at(idx + TIMESTAMP_MARKER.len_utf8());
        match parse_iso8601(&text.to_ascii_uppercase()) {
            Ok(timestamp) => return Ok((timestamp, extension.to_string())),
            Err(_) if name.contains('.') => {
                trace!(key = %key, "marker segment is not a timestamp, retrying on extension");
            },
            Err(e) => {
                return Err(DecodeError::new(key, DecodeFailure::InvalidTimestamp(e.0)));
            },
        }
    }

    match name.rfind('.') {
        Some(idx) => {
            let (text, extension) = name.split_at(idx);
            let timestamp = parse_iso8601(text)
                .map_err(|e| DecodeError::new(key, DecodeFailure::InvalidTimestamp(e.0)))?;
            Ok((timestamp, extension.to_string()))
        },
        None => Err(DecodeError::new(key, DecodeFailure::AmbiguousTimestamp)),
    }
}
