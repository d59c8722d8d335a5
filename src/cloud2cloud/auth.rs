// Copyright (c) 2025 - Cowboy AI, Inc.
//! Access tokens and route rules of the subscription API

use std::collections::HashMap;

use crate::errors::{HubError, HubResult};

/// Resolves an access token to the owner it was issued for
pub trait AccessTokenValidator: Send + Sync {
    fn validate(&self, access_token: &str) -> HubResult<String>;
}

/// Validator over a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    owners: HashMap<String, String>,
}

impl StaticTokenValidator {
    pub fn new(owners: HashMap<String, String>) -> Self {
        Self { owners }
    }
}

impl AccessTokenValidator for StaticTokenValidator {
    fn validate(&self, access_token: &str) -> HubResult<String> {
        if access_token.is_empty() {
            return Err(HubError::Unauthenticated("missing access token".into()));
        }
        self.owners
            .get(access_token)
            .cloned()
            .ok_or_else(|| HubError::Unauthenticated("invalid access token".into()))
    }
}

/// Paths served without authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRules {
    whitelist: Vec<String>,
}

impl Default for AuthRules {
    fn default() -> Self {
        Self {
            whitelist: vec!["/healthz".to_string()],
        }
    }
}

impl AuthRules {
    pub fn new(whitelist: Vec<String>) -> Self {
        Self { whitelist }
    }

    pub fn requires_auth(&self, path: &str) -> bool {
        !self.whitelist.iter().any(|allowed| path == allowed)
    }
}

/// Token of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> HubResult<&str> {
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(HubError::Unauthenticated(
            "authorization header is not a bearer token".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_validator() {
        let validator =
            StaticTokenValidator::new(HashMap::from([("t1".to_string(), "alice".to_string())]));
        assert_eq!(validator.validate("t1").unwrap(), "alice");
        assert!(matches!(
            validator.validate("t2"),
            Err(HubError::Unauthenticated(_))
        ));
        assert!(validator.validate("").is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("bearer abc").unwrap(), "abc");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer ").is_err());
    }

    #[test]
    fn test_whitelist() {
        let rules = AuthRules::default();
        assert!(!rules.requires_auth("/healthz"));
        assert!(rules.requires_auth("/api/v1/devices/subscriptions"));
    }
}
