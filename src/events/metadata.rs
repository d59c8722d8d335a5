// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event envelope metadata and audit attribution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordering metadata carried by every domain event
///
/// - `version` is non-decreasing within one aggregate stream.
/// - `sequence` is non-decreasing per `connection_id`; it lets the hub drop
///   stale or duplicated device reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub sequence: u64,
    pub version: u64,
    /// Unix nanoseconds
    pub timestamp: i64,
    #[serde(default)]
    pub hub_id: String,
}

impl EventMetadata {
    pub fn new(
        version: u64,
        connection_id: impl Into<String>,
        sequence: u64,
        hub_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            sequence,
            version,
            timestamp: unix_nanos(timestamp),
            hub_id: hub_id.into(),
        }
    }

    /// Whether `incoming` supersedes this metadata.
    ///
    /// Reports from another connection are always accepted; reports from the
    /// same connection must carry a strictly greater sequence number.
    pub fn is_superseded_by(&self, incoming: &EventMetadata) -> bool {
        self.connection_id != incoming.connection_id || incoming.sequence > self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp)
    }
}

/// Attribution of an event; immutable once created
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub owner: String,
}

impl AuditContext {
    pub fn new(
        user_id: impl Into<String>,
        correlation_id: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            correlation_id: correlation_id.into(),
            owner: owner.into(),
        }
    }
}

pub(crate) fn unix_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = DateTime::parse_from_rfc3339("2026-01-19T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let meta = EventMetadata::new(3, "conn", 7, "hub", ts);
        assert_eq!(meta.timestamp(), ts);
        assert_eq!(meta.version, 3);
    }
}
