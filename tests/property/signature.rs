// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Webhook Signatures

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use ocf_cloud_hub::cloud2cloud::signature::{sign, verify, SignedFields};
use ocf_cloud_hub::cloud2cloud::EventType;

#[test]
fn test_known_signature() {
    let fields = SignedFields {
        content_type: "b",
        event_type: EventType::DevicesOnline,
        subscription_id: "c",
        sequence_number: 0,
        timestamp: Utc.timestamp_opt(0, 999_999_999).unwrap(),
        body: b"",
    };
    assert_eq!(
        sign("a", &fields).unwrap(),
        "72150f5f9795e728fa594ece9fa6aa2f0e8877e8d36be89246782cfed00216c3"
    );
}

proptest! {
    #[test]
    fn prop_signature_verifies(
        secret in "[a-zA-Z0-9]{1,32}",
        sequence_number in any::<u64>(),
        seconds in 0i64..4_000_000_000,
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let fields = SignedFields {
            content_type: "application/json",
            event_type: EventType::ResourceChanged,
            subscription_id: "sub-1",
            sequence_number,
            timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
            body: &body,
        };
        let signature = sign(&secret, &fields).unwrap();
        prop_assert_eq!(signature.len(), 64);
        prop_assert!(verify(&secret, &fields, &signature));
        let other_secret = format!("{}x", secret);
        prop_assert!(!verify(&other_secret, &fields, &signature));
    }

    #[test]
    fn prop_any_body_change_changes_signature(
        body in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let fields = |body: &[u8]| -> String {
            sign(
                "secret",
                &SignedFields {
                    content_type: "application/json",
                    event_type: EventType::ResourcesPublished,
                    subscription_id: "sub-1",
                    sequence_number: 7,
                    timestamp,
                    body,
                },
            )
            .unwrap()
        };
        let mut tampered = body.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        prop_assert_ne!(fields(&body), fields(&tampered));
    }

    #[test]
    fn prop_sequence_number_is_signed(sequence_number in 0u64..u64::MAX) {
        let timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let signed = |sequence_number| {
            sign(
                "secret",
                &SignedFields {
                    content_type: "application/json",
                    event_type: EventType::DevicesOffline,
                    subscription_id: "sub-1",
                    sequence_number,
                    timestamp,
                    body: b"[]",
                },
            )
            .unwrap()
        };
        prop_assert_ne!(signed(sequence_number), signed(sequence_number + 1));
    }
}
