// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscribe/unsubscribe HTTP API
//!
//! ```text
//! POST   /api/v1/devices/subscriptions
//! DELETE /api/v1/devices/subscriptions/{subscriptionId}
//! POST   /api/v1/devices/{deviceId}/subscriptions
//! DELETE /api/v1/devices/{deviceId}/subscriptions/{subscriptionId}
//! POST   /api/v1/devices/{deviceId}/{href}/subscriptions
//! DELETE /api/v1/devices/{deviceId}/{href}/subscriptions/{subscriptionId}
//! ```
//!
//! Hrefs may contain slashes, so everything below `/api/v1/devices/` is
//! routed by [`parse_route`].

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{bearer_token, AccessTokenValidator, AuthRules};
use super::emit::CORRELATION_ID_HEADER;
use super::manager::SubscriptionManager;
use super::subscription::{EventType, Subscription, SubscriptionType};
use crate::content::negotiate_accept;
use crate::errors::{HubError, HubResult};
use crate::events::normalize_href;

pub const API_PREFIX: &str = "/api/v1/devices";

/// Error rendered as a plain-text response
#[derive(Debug)]
pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.to_string()).into_response()
    }
}

/// Body of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub events_url: String,
    pub event_types: Vec<String>,
    pub signing_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscription_id: String,
}

/// Scope and action decoded from a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub subscription_type: SubscriptionType,
    pub device_id: String,
    pub href: String,
    /// Present for unsubscribe requests
    pub subscription_id: Option<String>,
}

/// Decodes the path below `/api/v1/devices/`.
pub fn parse_route(path: &str, method: &Method) -> HubResult<Route> {
    let invalid = || HubError::NotFound(format!("unknown route '{path}'"));
    let mut segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let subscription_id = if *method == Method::DELETE {
        let id = segments.pop().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        Some(id.to_string())
    } else {
        None
    };
    if segments.pop() != Some("subscriptions") {
        return Err(invalid());
    }

    let (subscription_type, device_id, href) = match segments.as_slice() {
        [] => (SubscriptionType::Devices, String::new(), String::new()),
        [device_id] if !device_id.is_empty() => {
            (SubscriptionType::Device, device_id.to_string(), String::new())
        }
        [device_id, href @ ..] if !device_id.is_empty() && !href.is_empty() => (
            SubscriptionType::Resource,
            device_id.to_string(),
            normalize_href(&href.join("/")),
        ),
        _ => return Err(invalid()),
    };
    Ok(Route {
        subscription_type,
        device_id,
        href,
        subscription_id,
    })
}

/// Owner and token of an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub owner: String,
    pub access_token: String,
}

#[derive(Clone)]
struct AuthState {
    rules: Arc<AuthRules>,
    validator: Arc<dyn AccessTokenValidator>,
}

async fn authenticate(State(auth): State<AuthState>, mut request: Request, next: Next) -> Response {
    if !auth.rules.requires_auth(request.uri().path()) {
        return next.run(request).await;
    }
    let caller = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| HubError::Unauthenticated("missing authorization header".into()))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| HubError::Unauthenticated("invalid authorization header".into()))
        })
        .and_then(bearer_token)
        .and_then(|token| {
            let owner = auth.validator.validate(token)?;
            Ok(Caller {
                owner,
                access_token: token.to_string(),
            })
        });
    match caller {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Builds the subscription API router.
pub fn router(
    manager: Arc<SubscriptionManager>,
    validator: Arc<dyn AccessTokenValidator>,
    rules: AuthRules,
) -> Router {
    let auth = AuthState {
        rules: Arc::new(rules),
        validator,
    };
    Router::new()
        .route("/healthz", get(health))
        .route(
            &format!("{API_PREFIX}/{{*path}}"),
            axum::routing::post(subscribe).delete(unsubscribe),
        )
        .layer(middleware::from_fn_with_state(auth, authenticate))
        .with_state(manager)
}

async fn health() -> impl IntoResponse {
    "ok"
}

fn header_values(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Builds the subscription described by a subscribe request.
pub fn subscription_from_request(
    route: &Route,
    headers: &HeaderMap,
    caller: &Caller,
    request: SubscriptionRequest,
) -> HubResult<Subscription> {
    let accept = header_values(headers, header::ACCEPT.as_str());
    negotiate_accept(&accept)?;
    let mut accept_encoding = header_values(headers, header::ACCEPT_ENCODING.as_str());
    if accept_encoding.len() > 1 {
        return Err(HubError::InvalidArgument(
            "Accept-Encoding must carry at most one value".into(),
        ));
    }
    let event_types = request
        .event_types
        .iter()
        .map(|t| t.parse::<EventType>())
        .collect::<HubResult<Vec<_>>>()?;
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mut sub = Subscription::new(
        route.subscription_type,
        request.events_url,
        event_types,
        request.signing_secret,
        &caller.owner,
    )
    .with_access_token(&caller.access_token)
    .with_correlation_id(correlation_id)
    .with_accept(accept)
    .with_accept_encoding(accept_encoding.pop().unwrap_or_default());
    sub.device_id = route.device_id.clone();
    sub.href = route.href.clone();
    sub.validate()?;
    Ok(sub)
}

async fn subscribe(
    State(manager): State<Arc<SubscriptionManager>>,
    Extension(caller): Extension<Caller>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let route = parse_route(&path, &Method::POST)?;
    let sub = subscription_from_request(&route, &headers, &caller, request)?;
    let sub = manager.store(sub).await?;

    if let Err(e) = manager.connect(&sub.id).await {
        warn!(subscription_id = %sub.id, error = %e, "cannot connect new subscription");
        // a subscriber rejecting the initial state is already being torn down
        match manager.pull_out(&sub.id, &sub.href).await {
            Ok(_) | Err(HubError::NotFound(_)) => {}
            Err(pull_err) => {
                warn!(subscription_id = %sub.id, error = %pull_err, "cannot remove failed subscription")
            }
        }
        return Err(e.into());
    }

    info!(subscription_id = %sub.id, owner = %sub.owner, "subscribed");
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            subscription_id: sub.id,
        }),
    ))
}

async fn unsubscribe(
    State(manager): State<Arc<SubscriptionManager>>,
    Extension(caller): Extension<Caller>,
    Path(path): Path<String>,
) -> Result<StatusCode, ApiError> {
    let route = parse_route(&path, &Method::DELETE)?;
    let Some(id) = route.subscription_id else {
        return Err(HubError::NotFound(format!("unknown route '{path}'")).into());
    };
    let Some(sub) = manager.subscription(&id) else {
        return Err(HubError::NotFound(format!("subscription {id}")).into());
    };
    if sub.owner != caller.owner {
        return Err(HubError::PermissionDenied(format!("subscription {id}")).into());
    }
    if sub.subscription_type != route.subscription_type || sub.device_id != route.device_id {
        return Err(HubError::NotFound(format!("subscription {id}")).into());
    }

    let popped = manager.pull_out(&id, &route.href).await?;
    tokio::spawn(async move {
        if let Err(e) = manager.cancel_subscription(&popped).await {
            warn!(subscription_id = %popped.id, error = %e, "cannot notify canceled subscription");
        }
    });
    Ok(StatusCode::ACCEPTED)
}
