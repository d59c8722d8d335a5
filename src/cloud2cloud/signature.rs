// Copyright (c) 2025 - Cowboy AI, Inc.
//! Webhook notification signatures
//!
//! ```text
//! hex(HMAC-SHA256(secret, "{contentType}:{eventType}:{subscriptionId}:{seq}:{unixSeconds}:{body}"))
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::subscription::EventType;
use crate::errors::{HubError, HubResult};

type HmacSha256 = Hmac<Sha256>;

/// Signed fields of one notification
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub content_type: &'a str,
    pub event_type: EventType,
    pub subscription_id: &'a str,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub body: &'a [u8],
}

fn keyed_mac(secret: &str, fields: &SignedFields<'_>) -> HubResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| HubError::Internal(format!("cannot create signature: {e}")))?;
    mac.update(
        format!(
            "{}:{}:{}:{}:{}:",
            fields.content_type,
            fields.event_type.as_str(),
            fields.subscription_id,
            fields.sequence_number,
            fields.timestamp.timestamp(),
        )
        .as_bytes(),
    );
    mac.update(fields.body);
    Ok(mac)
}

/// Hex encoded `Event-Signature` header value.
pub fn sign(secret: &str, fields: &SignedFields<'_>) -> HubResult<String> {
    let mac = keyed_mac(secret, fields)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a received signature in constant time.
pub fn verify(secret: &str, fields: &SignedFields<'_>, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    keyed_mac(secret, fields)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(body: &[u8]) -> SignedFields<'_> {
        SignedFields {
            content_type: "b",
            event_type: EventType::DevicesOnline,
            subscription_id: "c",
            sequence_number: 0,
            // one nanosecond before the first second
            timestamp: Utc.timestamp_opt(0, 999_999_999).unwrap(),
            body,
        }
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sign("a", &fields(b"")).unwrap(),
            "72150f5f9795e728fa594ece9fa6aa2f0e8877e8d36be89246782cfed00216c3"
        );
    }

    #[test]
    fn test_verify() {
        let signature = sign("a", &fields(b"{}")).unwrap();
        assert!(verify("a", &fields(b"{}"), &signature));
        assert!(!verify("a", &fields(b"[]"), &signature));
        assert!(!verify("b", &fields(b"{}"), &signature));
        assert!(!verify("a", &fields(b"{}"), "not-hex"));
    }
}
