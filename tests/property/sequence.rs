// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Device Report Ordering
//!
//! A resource accepts a report from the connection of its latest change
//! only when the sequence number grows. Reports from another connection are
//! always accepted.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use test_case::test_case;

use ocf_cloud_hub::aggregate::{
    CommandMetadata, NotifyResourceChangedRequest, ResourceStateCommand,
    ResourceStateSnapshotTaken,
};
use ocf_cloud_hub::content::{Content, Status, APPLICATION_JSON};
use ocf_cloud_hub::events::{EventMetadata, ResourceId};
use ocf_cloud_hub::{AggregateModel, CommandContext};

fn ctx() -> CommandContext {
    let now = DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    CommandContext::new("alice", "user", "hub-1", now)
}

fn notify(connection: &str, sequence: u64) -> ResourceStateCommand {
    ResourceStateCommand::NotifyResourceChanged(NotifyResourceChangedRequest {
        resource_id: ResourceId::new("dev-1", "/light"),
        content: Content::new(APPLICATION_JSON, b"{}".to_vec()),
        status: Status::Ok,
        correlation_id: String::new(),
        command_metadata: Some(CommandMetadata::new(connection, sequence)),
    })
}

fn metadata(connection: &str, sequence: u64) -> EventMetadata {
    EventMetadata {
        connection_id: connection.into(),
        sequence,
        ..EventMetadata::default()
    }
}

#[test_case("conn", 5, "conn", 6 => true ; "greater sequence")]
#[test_case("conn", 5, "conn", 5 => false ; "duplicate")]
#[test_case("conn", 5, "conn", 4 => false ; "stale")]
#[test_case("conn", 5, "other", 0 => true ; "new connection")]
fn test_validate_sequence(latest_conn: &str, latest: u64, incoming_conn: &str, incoming: u64) -> bool {
    let mut state = ResourceStateSnapshotTaken::default();
    state
        .handle_command(&ctx(), notify(latest_conn, latest), 0)
        .unwrap();
    state.validate_sequence(&metadata(incoming_conn, incoming))
}

#[test]
fn test_first_report_always_accepted() {
    let state = ResourceStateSnapshotTaken::default();
    assert!(state.validate_sequence(&metadata("conn", 0)));
}

proptest! {
    #[test]
    fn prop_accepted_sequences_strictly_increase(
        reports in prop::collection::vec((0usize..2, 0u64..50), 1..60)
    ) {
        let connections = ["conn-a", "conn-b"];
        let mut state = ResourceStateSnapshotTaken::default();
        let mut version = 0;
        let mut last: Option<(usize, u64)> = None;

        for (connection, sequence) in reports {
            let events = state
                .handle_command(&ctx(), notify(connections[connection], sequence), version)
                .unwrap();
            let expected = match last {
                Some((c, s)) if c == connection => sequence > s,
                _ => true,
            };
            prop_assert_eq!(!events.is_empty(), expected);
            if expected {
                version += 1;
                last = Some((connection, sequence));
            }
        }
    }
}
