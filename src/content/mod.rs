// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Content and Content-Format Conversion
//!
//! Devices report resource representations tagged either by a MIME content
//! type or by a CoAP content-format number. This module normalizes both,
//! converts payloads between JSON and the CBOR family, and negotiates the
//! representation sent to webhook subscribers.
//!
//! # Authority
//!
//! When both `content_type` and `coap_content_format` are set, the content
//! type wins. `coap_content_format == -1` means unset.
//!
//! # Conversion Matrix
//!
//! ```text
//! from \ to     json        cbor        ocf+cbor
//! json          as-is       encode      encode
//! cbor          decode      as-is       relabel
//! ocf+cbor      decode      relabel     as-is
//! ```
//!
//! Everything else is rejected with `InvalidArgument`.

pub mod cbor;
pub mod status;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HubError, HubResult};

pub use status::{CoapCode, CoapOperation, Status};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_LINK_FORMAT: &str = "application/link-format";
pub const APPLICATION_XML: &str = "application/xml";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_CBOR: &str = "application/cbor";
pub const APPLICATION_OCF_CBOR: &str = "application/vnd.ocf+cbor";

/// Media types understood by the hub, with their CoAP content-format numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    TextPlain,
    LinkFormat,
    Xml,
    OctetStream,
    Json,
    Cbor,
    OcfCbor,
}

impl MediaType {
    const ALL: [MediaType; 7] = [
        MediaType::TextPlain,
        MediaType::LinkFormat,
        MediaType::Xml,
        MediaType::OctetStream,
        MediaType::Json,
        MediaType::Cbor,
        MediaType::OcfCbor,
    ];

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaType::TextPlain => TEXT_PLAIN,
            MediaType::LinkFormat => APPLICATION_LINK_FORMAT,
            MediaType::Xml => APPLICATION_XML,
            MediaType::OctetStream => APPLICATION_OCTET_STREAM,
            MediaType::Json => APPLICATION_JSON,
            MediaType::Cbor => APPLICATION_CBOR,
            MediaType::OcfCbor => APPLICATION_OCF_CBOR,
        }
    }

    pub fn coap_content_format(&self) -> i32 {
        match self {
            MediaType::TextPlain => 0,
            MediaType::LinkFormat => 40,
            MediaType::Xml => 41,
            MediaType::OctetStream => 42,
            MediaType::Json => 50,
            MediaType::Cbor => 60,
            MediaType::OcfCbor => 10000,
        }
    }

    /// Parses a MIME type, ignoring parameters such as `; charset=utf-8`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|m| m.content_type().eq_ignore_ascii_case(essence))
    }

    pub fn from_coap_content_format(format: i32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.coap_content_format() == format)
    }

    pub fn is_cbor(&self) -> bool {
        matches!(self, MediaType::Cbor | MediaType::OcfCbor)
    }
}

/// Resource representation attached to events and commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "unset_coap_content_format")]
    pub coap_content_format: i32,
}

fn unset_coap_content_format() -> i32 {
    -1
}

impl Default for Content {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            content_type: String::new(),
            coap_content_format: -1,
        }
    }
}

impl Content {
    /// Content tagged by MIME type; the CoAP format is filled in when known.
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        let content_type = content_type.into();
        let coap_content_format = MediaType::from_content_type(&content_type)
            .map(|m| m.coap_content_format())
            .unwrap_or(-1);
        Self {
            data,
            content_type,
            coap_content_format,
        }
    }

    pub fn from_media_type(media_type: MediaType, data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: media_type.content_type().to_string(),
            coap_content_format: media_type.coap_content_format(),
        }
    }

    /// JSON content for a value.
    pub fn json(value: &Value) -> HubResult<Self> {
        Ok(Self::from_media_type(MediaType::Json, serde_json::to_vec(value)?))
    }

    /// Authoritative media type of this content, if recognized.
    pub fn media_type(&self) -> Option<MediaType> {
        if !self.content_type.is_empty() {
            return MediaType::from_content_type(&self.content_type);
        }
        if self.coap_content_format >= 0 {
            return MediaType::from_coap_content_format(self.coap_content_format);
        }
        None
    }

    /// Content type string, derived from the CoAP format when only that is set.
    pub fn effective_content_type(&self) -> String {
        if !self.content_type.is_empty() {
            return self.content_type.clone();
        }
        self.media_type()
            .map(|m| m.content_type().to_string())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the payload into a JSON value.
    ///
    /// Empty payloads decode to `null`; text payloads to a JSON string.
    pub fn to_value(&self) -> HubResult<Value> {
        if self.data.is_empty() {
            return Ok(Value::Null);
        }
        match self.media_type() {
            Some(MediaType::Json) => Ok(serde_json::from_slice(&self.data)?),
            Some(m) if m.is_cbor() => cbor::decode(&self.data),
            Some(MediaType::TextPlain) => Ok(Value::String(
                String::from_utf8_lossy(&self.data).into_owned(),
            )),
            _ => Err(HubError::InvalidArgument(format!(
                "cannot decode content of type '{}'",
                self.effective_content_type()
            ))),
        }
    }

    /// Converts the payload to `target_content_type`.
    ///
    /// An empty target or an identical type returns the content unchanged.
    pub fn convert_to(&self, target_content_type: &str) -> HubResult<Content> {
        if target_content_type.is_empty() {
            return Ok(self.clone());
        }
        let Some(target) = MediaType::from_content_type(target_content_type) else {
            return Err(HubError::InvalidArgument(format!(
                "cannot convert content to unsupported content type '{target_content_type}'"
            )));
        };
        let Some(source) = self.media_type() else {
            return Err(HubError::InvalidArgument(format!(
                "cannot convert content from unsupported content type '{}'",
                self.effective_content_type()
            )));
        };
        if source == target || self.data.is_empty() {
            return Ok(Content::from_media_type(target, self.data.clone()));
        }
        let data = match (source, target) {
            (s, t) if s.is_cbor() && t.is_cbor() => self.data.clone(),
            (MediaType::Json, t) if t.is_cbor() => {
                let value: Value = serde_json::from_slice(&self.data).map_err(|e| {
                    HubError::InvalidArgument(format!("cannot decode JSON content: {e}"))
                })?;
                cbor::encode(&value)?
            }
            (s, MediaType::Json) if s.is_cbor() => {
                let value = cbor::decode(&self.data).map_err(|e| {
                    HubError::InvalidArgument(format!("cannot decode CBOR content: {e}"))
                })?;
                serde_json::to_vec(&value)?
            }
            (s, t) => {
                return Err(HubError::InvalidArgument(format!(
                    "cannot convert content from '{}' to '{}'",
                    s.content_type(),
                    t.content_type()
                )))
            }
        };
        Ok(Content::from_media_type(target, data))
    }
}

/// Encodes a value for a negotiated webhook content type.
pub fn encode_value(content_type: &str, value: &Value) -> HubResult<Vec<u8>> {
    match MediaType::from_content_type(content_type) {
        Some(MediaType::Json) => Ok(serde_json::to_vec(value)?),
        Some(m) if m.is_cbor() => cbor::encode(value),
        _ => Err(HubError::InvalidArgument(format!(
            "unsupported content type '{content_type}'"
        ))),
    }
}

/// Picks the webhook payload encoding from an `Accept` list.
///
/// An empty list or a wildcard selects JSON.
pub fn negotiate_accept(accept: &[String]) -> HubResult<&'static str> {
    if accept.is_empty() {
        return Ok(APPLICATION_JSON);
    }
    for entry in accept {
        let essence = entry.split(';').next().unwrap_or("").trim();
        match essence {
            "*/*" | "application/*" => return Ok(APPLICATION_JSON),
            _ => match MediaType::from_content_type(essence) {
                Some(MediaType::Json) => return Ok(APPLICATION_JSON),
                Some(MediaType::OcfCbor) | Some(MediaType::Cbor) => {
                    return Ok(APPLICATION_OCF_CBOR)
                }
                _ => {}
            },
        }
    }
    Err(HubError::InvalidArgument(format!(
        "unsupported accept '{}'",
        accept.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_type_wins_over_coap_format() {
        let content = Content {
            data: vec![],
            content_type: APPLICATION_JSON.to_string(),
            coap_content_format: 60,
        };
        assert_eq!(content.media_type(), Some(MediaType::Json));

        let coap_only = Content {
            data: vec![],
            content_type: String::new(),
            coap_content_format: 10000,
        };
        assert_eq!(coap_only.media_type(), Some(MediaType::OcfCbor));
        assert_eq!(coap_only.effective_content_type(), APPLICATION_OCF_CBOR);
    }

    #[test]
    fn test_convert_json_to_ocf_cbor_and_back() {
        let value = json!({"power": 5});
        let json_content = Content::json(&value).unwrap();

        let cbor_content = json_content.convert_to(APPLICATION_OCF_CBOR).unwrap();
        assert_eq!(cbor_content.coap_content_format, 10000);
        assert_eq!(cbor_content.to_value().unwrap(), value);

        let back = cbor_content.convert_to(APPLICATION_JSON).unwrap();
        assert_eq!(back.to_value().unwrap(), value);
    }

    #[test]
    fn test_convert_same_type_is_identity() {
        let content = Content::new(APPLICATION_JSON, b"{\"a\":1}".to_vec());
        assert_eq!(content.convert_to(APPLICATION_JSON).unwrap(), content);
        assert_eq!(content.convert_to("").unwrap(), content);
    }

    #[test]
    fn test_convert_unsupported() {
        let content = Content::new(TEXT_PLAIN, b"hello".to_vec());
        let err = content.convert_to(APPLICATION_JSON).unwrap_err();
        assert!(matches!(err, HubError::InvalidArgument(_)));

        let json = Content::new(APPLICATION_JSON, b"{}".to_vec());
        assert!(json.convert_to("image/png").is_err());
    }

    #[test]
    fn test_negotiate_accept() {
        assert_eq!(negotiate_accept(&[]).unwrap(), APPLICATION_JSON);
        assert_eq!(
            negotiate_accept(&["application/vnd.ocf+cbor".to_string()]).unwrap(),
            APPLICATION_OCF_CBOR
        );
        assert_eq!(
            negotiate_accept(&["text/html".to_string(), "*/*".to_string()]).unwrap(),
            APPLICATION_JSON
        );
        assert!(negotiate_accept(&["text/html".to_string()]).is_err());
    }
}
