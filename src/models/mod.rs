//! Data models for Campus Pulse.
//!
//! Shared by the feed service and the client library, so both sides agree on the
//! camelCase JSON shape of every row.

mod change;
mod comment;
mod community;
mod mess;
mod post;
mod profile;
mod vote;

pub use change::*;
pub use comment::*;
pub use community::*;
pub use mess::*;
pub use post::*;
pub use profile::*;
pub use vote::*;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

/// Format a timestamp the way it is stored: RFC 3339, microseconds, `Z` suffix.
///
/// Fixed width keeps lexical order equal to chronological order in SQLite.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, falling back to the epoch for malformed text.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!("Malformed timestamp {:?}: {}", raw, e);
            DateTime::<Utc>::default()
        }
    }
}

/// Decode loosely-typed rows into typed records, dropping the ones that don't fit.
pub fn decode_rows<T: DeserializeOwned>(kind: &str, rows: Vec<serde_json::Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Dropping malformed {} row: {}", kind, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_format_is_sortable() {
        let early = parse_timestamp("2024-03-01T09:00:00.000001Z");
        let late = parse_timestamp("2024-03-01T10:00:00Z");
        assert!(format_timestamp(&early) < format_timestamp(&late));
        assert_eq!(format_timestamp(&late), "2024-03-01T10:00:00.000000Z");
    }

    #[test]
    fn test_parse_timestamp_malformed_defaults_to_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }

    #[test]
    fn test_decode_rows_drops_malformed() {
        let rows = vec![
            json!({ "id": "c1", "name": "Hostel Life" }),
            json!({ "id": 42 }),
            json!({ "id": "c2", "name": "Placements" }),
        ];
        let communities: Vec<Community> = decode_rows("community", rows);
        assert_eq!(communities.len(), 2);
        assert_eq!(communities[1].name, "Placements");
    }
}
