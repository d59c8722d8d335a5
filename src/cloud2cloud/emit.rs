// Copyright (c) 2025 - Cowboy AI, Inc.
//! Signed webhook delivery
//!
//! One POST per notification. The outcome tells the caller whether the
//! subscription must be removed:
//!
//! | response | event                   | remove | result |
//! |----------|-------------------------|--------|--------|
//! | 200      | subscription_canceled   | true   | ok     |
//! | 200      | other                   | false  | ok     |
//! | 410      | any                     | true   | error  |
//! | other    | subscription_canceled   | true   | error  |
//! | other    | other                   | false  | error  |
//!
//! The subscriber's `Accept-Encoding` is forwarded unchanged. Bodies are
//! sent with the identity encoding, so no `Content-Encoding` is set.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::signature::{sign, SignedFields};
use super::subscription::{EventType, Subscription};
use crate::content::{encode_value, negotiate_accept};
use crate::errors::{HubError, HubResult};

pub const CORRELATION_ID_HEADER: &str = "Correlation-ID";
pub const SUBSCRIPTION_ID_HEADER: &str = "Subscription-ID";
pub const EVENT_TYPE_HEADER: &str = "Event-Type";
pub const SEQUENCE_NUMBER_HEADER: &str = "Sequence-Number";
pub const EVENT_TIMESTAMP_HEADER: &str = "Event-Timestamp";
pub const EVENT_SIGNATURE_HEADER: &str = "Event-Signature";

/// Result of one delivery
#[derive(Debug)]
pub struct EmitOutcome {
    /// Whether the subscription has to be torn down
    pub remove: bool,
    pub result: HubResult<()>,
}

impl EmitOutcome {
    fn failed(event_type: EventType, err: HubError) -> Self {
        Self {
            remove: event_type == EventType::SubscriptionCanceled,
            result: Err(err),
        }
    }
}

/// HTTP client posting signed notifications
#[derive(Debug, Clone)]
pub struct EventEmitter {
    client: reqwest::Client,
    timeout: Duration,
}

impl EventEmitter {
    pub fn new(timeout: Duration) -> HubResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, timeout })
    }

    /// Sends `payload` as notification `sequence_number` of `sub`.
    ///
    /// `None` sends an empty body.
    pub async fn emit(
        &self,
        sub: &Subscription,
        sequence_number: u64,
        event_type: EventType,
        payload: Option<&Value>,
    ) -> EmitOutcome {
        self.emit_at(sub, sequence_number, event_type, payload, Utc::now())
            .await
    }

    pub async fn emit_at(
        &self,
        sub: &Subscription,
        sequence_number: u64,
        event_type: EventType,
        payload: Option<&Value>,
        timestamp: DateTime<Utc>,
    ) -> EmitOutcome {
        let content_type = match negotiate_accept(&sub.accept) {
            Ok(content_type) => content_type,
            Err(e) => return EmitOutcome::failed(event_type, e),
        };
        let body = match payload {
            Some(value) => match encode_value(content_type, value) {
                Ok(body) => body,
                Err(e) => return EmitOutcome::failed(event_type, e),
            },
            None => Vec::new(),
        };
        let signature = match sign(
            &sub.signing_secret,
            &SignedFields {
                content_type,
                event_type,
                subscription_id: &sub.id,
                sequence_number,
                timestamp,
                body: &body,
            },
        ) {
            Ok(signature) => signature,
            Err(e) => return EmitOutcome::failed(event_type, e),
        };

        let mut request = self
            .client
            .post(&sub.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(CORRELATION_ID_HEADER, &sub.correlation_id)
            .header(SUBSCRIPTION_ID_HEADER, &sub.id)
            .header(EVENT_TYPE_HEADER, event_type.as_str())
            .header(SEQUENCE_NUMBER_HEADER, sequence_number.to_string())
            .header(EVENT_TIMESTAMP_HEADER, timestamp.timestamp().to_string())
            .header(EVENT_SIGNATURE_HEADER, signature)
            .body(body);
        if !sub.accept_encoding.is_empty() {
            request = request.header(reqwest::header::ACCEPT_ENCODING, &sub.accept_encoding);
        }
        let response = request.send().await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return EmitOutcome::failed(event_type, HubError::from(e)),
        };

        debug!(
            subscription_id = %sub.id,
            event_type = %event_type,
            sequence_number,
            status = response.status().as_u16(),
            "delivered notification"
        );
        classify(event_type, response.status(), &sub.url)
    }
}

/// Maps a webhook response status to a delivery outcome.
pub fn classify(event_type: EventType, status: StatusCode, url: &str) -> EmitOutcome {
    match status {
        StatusCode::OK => EmitOutcome {
            remove: event_type == EventType::SubscriptionCanceled,
            result: Ok(()),
        },
        StatusCode::GONE => EmitOutcome {
            remove: true,
            result: Err(HubError::Http(format!(
                "{url} responded 410: subscription is gone"
            ))),
        },
        status => EmitOutcome::failed(
            event_type,
            HubError::Http(format!("{url} responded {}", status.as_u16())),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(EventType::DevicesOnline, 200 => (false, true))]
    #[test_case(EventType::SubscriptionCanceled, 200 => (true, true))]
    #[test_case(EventType::DevicesOnline, 410 => (true, false))]
    #[test_case(EventType::SubscriptionCanceled, 410 => (true, false))]
    #[test_case(EventType::DevicesOnline, 500 => (false, false))]
    #[test_case(EventType::SubscriptionCanceled, 500 => (true, false))]
    #[test_case(EventType::ResourceChanged, 204 => (false, false) ; "only 200 acknowledges")]
    fn test_classify(event_type: EventType, status: u16) -> (bool, bool) {
        let outcome = classify(
            event_type,
            StatusCode::from_u16(status).unwrap(),
            "http://localhost",
        );
        (outcome.remove, outcome.result.is_ok())
    }
}
