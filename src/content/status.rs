// Copyright (c) 2025 - Cowboy AI, Inc.
//! Operation status and its CoAP / HTTP mappings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a device operation as recorded in events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Unknown,
    Ok,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Unavailable,
    NotImplemented,
    Accepted,
    Error,
    MethodNotAllowed,
    Created,
    Canceled,
}

/// CoAP response code, `class << 5 | detail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoapCode(pub u8);

impl CoapCode {
    pub const CREATED: CoapCode = CoapCode::new(2, 1);
    pub const DELETED: CoapCode = CoapCode::new(2, 2);
    pub const VALID: CoapCode = CoapCode::new(2, 3);
    pub const CHANGED: CoapCode = CoapCode::new(2, 4);
    pub const CONTENT: CoapCode = CoapCode::new(2, 5);
    pub const CONTINUE: CoapCode = CoapCode::new(2, 31);
    pub const BAD_REQUEST: CoapCode = CoapCode::new(4, 0);
    pub const UNAUTHORIZED: CoapCode = CoapCode::new(4, 1);
    pub const BAD_OPTION: CoapCode = CoapCode::new(4, 2);
    pub const FORBIDDEN: CoapCode = CoapCode::new(4, 3);
    pub const NOT_FOUND: CoapCode = CoapCode::new(4, 4);
    pub const METHOD_NOT_ALLOWED: CoapCode = CoapCode::new(4, 5);
    pub const NOT_ACCEPTABLE: CoapCode = CoapCode::new(4, 6);
    pub const PRECONDITION_FAILED: CoapCode = CoapCode::new(4, 12);
    pub const REQUEST_ENTITY_TOO_LARGE: CoapCode = CoapCode::new(4, 13);
    pub const UNSUPPORTED_MEDIA_TYPE: CoapCode = CoapCode::new(4, 15);
    pub const INTERNAL_SERVER_ERROR: CoapCode = CoapCode::new(5, 0);
    pub const NOT_IMPLEMENTED: CoapCode = CoapCode::new(5, 1);
    pub const BAD_GATEWAY: CoapCode = CoapCode::new(5, 2);
    pub const SERVICE_UNAVAILABLE: CoapCode = CoapCode::new(5, 3);
    pub const GATEWAY_TIMEOUT: CoapCode = CoapCode::new(5, 4);

    pub const fn new(class: u8, detail: u8) -> Self {
        CoapCode((class << 5) | (detail & 0x1f))
    }

    pub fn class(&self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(&self) -> u8 {
        self.0 & 0x1f
    }
}

impl fmt::Display for CoapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// Operation a CoAP response answers; selects the success code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapOperation {
    Retrieve,
    Update,
    Create,
    Delete,
}

impl Status {
    pub fn from_coap_code(code: CoapCode) -> Self {
        match code {
            CoapCode::CONTENT | CoapCode::VALID | CoapCode::CHANGED | CoapCode::DELETED => {
                Status::Ok
            }
            CoapCode::CREATED => Status::Created,
            CoapCode::CONTINUE => Status::Accepted,
            CoapCode::BAD_REQUEST
            | CoapCode::BAD_OPTION
            | CoapCode::NOT_ACCEPTABLE
            | CoapCode::PRECONDITION_FAILED
            | CoapCode::REQUEST_ENTITY_TOO_LARGE
            | CoapCode::UNSUPPORTED_MEDIA_TYPE => Status::BadRequest,
            CoapCode::UNAUTHORIZED => Status::Unauthorized,
            CoapCode::FORBIDDEN => Status::Forbidden,
            CoapCode::NOT_FOUND => Status::NotFound,
            CoapCode::METHOD_NOT_ALLOWED => Status::MethodNotAllowed,
            CoapCode::NOT_IMPLEMENTED => Status::NotImplemented,
            CoapCode::SERVICE_UNAVAILABLE | CoapCode::GATEWAY_TIMEOUT => Status::Unavailable,
            _ => Status::Error,
        }
    }

    /// CoAP code for this status when answering `operation`.
    pub fn to_coap_code(&self, operation: CoapOperation) -> CoapCode {
        match self {
            Status::Ok => match operation {
                CoapOperation::Retrieve => CoapCode::CONTENT,
                CoapOperation::Update => CoapCode::CHANGED,
                CoapOperation::Create => CoapCode::CREATED,
                CoapOperation::Delete => CoapCode::DELETED,
            },
            Status::Created => CoapCode::CREATED,
            Status::Accepted => CoapCode::CONTINUE,
            Status::BadRequest => CoapCode::BAD_REQUEST,
            Status::Unauthorized => CoapCode::UNAUTHORIZED,
            Status::Forbidden => CoapCode::FORBIDDEN,
            Status::NotFound => CoapCode::NOT_FOUND,
            Status::MethodNotAllowed => CoapCode::METHOD_NOT_ALLOWED,
            Status::NotImplemented => CoapCode::NOT_IMPLEMENTED,
            Status::Unavailable | Status::Canceled => CoapCode::SERVICE_UNAVAILABLE,
            Status::Unknown | Status::Error => CoapCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::NotImplemented => 501,
            Status::Unavailable | Status::Canceled => 503,
            Status::Unknown | Status::Error => 500,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Status::Ok | Status::Created | Status::Accepted)
    }
}
