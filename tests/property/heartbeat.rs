// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Service Heartbeats
//!
//! Whatever order heartbeats arrive in, a service is never listed as both
//! valid and expired, and a rejected heartbeat leaves the state untouched.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use ocf_cloud_hub::aggregate::{
    ConfirmExpiredServicesRequest, ServiceHeartbeatRequest, ServiceMetadataCommand,
    ServiceMetadataSnapshotTaken,
};
use ocf_cloud_hub::{AggregateModel, CommandContext, HubError};

#[derive(Debug, Clone)]
enum Step {
    Heartbeat { service: u8, ttl_secs: i64 },
    ConfirmExpired,
}

fn step_strategy() -> impl Strategy<Value = (Step, i64)> {
    let step = prop_oneof![
        4 => (0u8..5, 1i64..120).prop_map(|(service, ttl_secs)| Step::Heartbeat { service, ttl_secs }),
        1 => Just(Step::ConfirmExpired),
    ];
    (step, 0i64..90)
}

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn assert_disjoint(state: &ServiceMetadataSnapshotTaken) {
    for service in &state.services_heartbeat.valid {
        assert!(
            state.services_heartbeat.find_expired(&service.service_id).is_none(),
            "{} is both valid and expired",
            service.service_id
        );
    }
}

proptest! {
    #[test]
    fn prop_valid_and_expired_are_disjoint(
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let mut state = ServiceMetadataSnapshotTaken::default();
        let mut now = start();
        let mut version = 0;

        for (step, advance_secs) in steps {
            now += Duration::seconds(advance_secs);
            let ctx = CommandContext::new("", "", "hub-1", now);
            let command = match step {
                Step::Heartbeat { service, ttl_secs } => {
                    ServiceMetadataCommand::Heartbeat(ServiceHeartbeatRequest {
                        service_id: format!("service-{service}"),
                        time_to_live: Duration::seconds(ttl_secs),
                        timestamp: now,
                    })
                }
                Step::ConfirmExpired => {
                    ServiceMetadataCommand::ConfirmExpiredServices(ConfirmExpiredServicesRequest {
                        service_ids: state
                            .services_heartbeat
                            .expired
                            .iter()
                            .map(|s| s.service_id.clone())
                            .collect(),
                    })
                }
            };

            let before = state.clone();
            match state.handle_command(&ctx, command, version) {
                Ok(events) => version += events.len() as u64,
                Err(HubError::FailedPrecondition(_)) => prop_assert_eq!(&state, &before),
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
            assert_disjoint(&state);
        }
    }
}
