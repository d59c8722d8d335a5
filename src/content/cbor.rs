// Copyright (c) 2025 - Cowboy AI, Inc.
//! CBOR ⇄ JSON value translation
//!
//! Resource representations travel as CBOR between devices and the hub and
//! as JSON towards most webhook subscribers. Both directions go through
//! `serde_json::Value` so that decoded payloads stay semantically equal.
//!
//! Indefinite-length items, half-precision floats and non-scalar map keys
//! are rejected.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use serde_json::{Map, Number, Value};

use crate::errors::{HubError, HubResult};

const MAX_DEPTH: usize = 64;

type EncodeError = minicbor::encode::Error<std::convert::Infallible>;

fn encode_err(err: EncodeError) -> HubError {
    HubError::Serialization(format!("cbor encode: {err}"))
}

fn decode_err(err: minicbor::decode::Error) -> HubError {
    HubError::Serialization(format!("cbor decode: {err}"))
}

/// Encode a JSON value as CBOR.
pub fn encode(value: &Value) -> HubResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    encode_value(&mut enc, value).map_err(encode_err)?;
    Ok(buf)
}

/// Serialize any `Serialize` type to CBOR through its JSON value.
pub fn to_vec<T: serde::Serialize>(value: &T) -> HubResult<Vec<u8>> {
    encode(&serde_json::to_value(value)?)
}

fn encode_value(enc: &mut Encoder<&mut Vec<u8>>, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Null => {
            enc.null()?;
        }
        Value::Bool(b) => {
            enc.bool(*b)?;
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                enc.u64(u)?;
            } else if let Some(i) = n.as_i64() {
                enc.i64(i)?;
            } else {
                enc.f64(n.as_f64().unwrap_or(f64::NAN))?;
            }
        }
        Value::String(s) => {
            enc.str(s)?;
        }
        Value::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_value(enc, item)?;
            }
        }
        Value::Object(map) => {
            enc.map(map.len() as u64)?;
            for (key, item) in map {
                enc.str(key)?;
                encode_value(enc, item)?;
            }
        }
    }
    Ok(())
}

/// Decode a single CBOR item into a JSON value.
///
/// Byte strings have no JSON counterpart; they become arrays of numbers.
pub fn decode(data: &[u8]) -> HubResult<Value> {
    let mut dec = Decoder::new(data);
    let value = decode_value(&mut dec, 0)?;
    if dec.position() != data.len() {
        return Err(HubError::Serialization(format!(
            "cbor decode: {} trailing bytes",
            data.len() - dec.position()
        )));
    }
    Ok(value)
}

fn decode_value(dec: &mut Decoder<'_>, depth: usize) -> HubResult<Value> {
    if depth > MAX_DEPTH {
        return Err(HubError::Serialization("cbor decode: nesting too deep".into()));
    }
    let ty = dec.datatype().map_err(decode_err)?;
    match ty {
        Type::Null => {
            dec.null().map_err(decode_err)?;
            Ok(Value::Null)
        }
        Type::Undefined => {
            dec.undefined().map_err(decode_err)?;
            Ok(Value::Null)
        }
        Type::Bool => Ok(Value::Bool(dec.bool().map_err(decode_err)?)),
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => {
            Ok(Value::Number(dec.u64().map_err(decode_err)?.into()))
        }
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
            Ok(Value::Number(dec.i64().map_err(decode_err)?.into()))
        }
        Type::F32 => float(dec.f32().map_err(decode_err)? as f64),
        Type::F64 => float(dec.f64().map_err(decode_err)?),
        Type::String => Ok(Value::String(dec.str().map_err(decode_err)?.to_string())),
        Type::Bytes => {
            let bytes = dec.bytes().map_err(decode_err)?;
            Ok(Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
        }
        Type::Array => {
            let len = definite(dec.array().map_err(decode_err)?)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(decode_value(dec, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        Type::Map => {
            let len = definite(dec.map().map_err(decode_err)?)?;
            let mut map = Map::new();
            for _ in 0..len {
                let key = decode_key(dec)?;
                let item = decode_value(dec, depth + 1)?;
                map.insert(key, item);
            }
            Ok(Value::Object(map))
        }
        Type::Tag => {
            dec.tag().map_err(decode_err)?;
            decode_value(dec, depth + 1)
        }
        Type::StringIndef | Type::BytesIndef | Type::ArrayIndef | Type::MapIndef => Err(
            HubError::Serialization("cbor decode: indefinite-length CBOR not allowed".into()),
        ),
        other => Err(HubError::Serialization(format!(
            "cbor decode: unsupported data type {other:?}"
        ))),
    }
}

fn decode_key(dec: &mut Decoder<'_>) -> HubResult<String> {
    match dec.datatype().map_err(decode_err)? {
        Type::String => Ok(dec.str().map_err(decode_err)?.to_string()),
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => {
            Ok(dec.u64().map_err(decode_err)?.to_string())
        }
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
            Ok(dec.i64().map_err(decode_err)?.to_string())
        }
        other => Err(HubError::Serialization(format!(
            "cbor decode: unsupported map key {other:?}"
        ))),
    }
}

fn definite(len: Option<u64>) -> HubResult<usize> {
    let Some(len) = len else {
        return Err(HubError::Serialization(
            "cbor decode: indefinite-length CBOR not allowed".into(),
        ));
    };
    usize::try_from(len).map_err(|_| HubError::Serialization("cbor decode: length overflow".into()))
}

fn float(f: f64) -> HubResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| HubError::Serialization(format!("cbor decode: {f} has no JSON form")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_cbor_equivalence() {
        let value = json!({
            "power": 42,
            "offset": -7,
            "ratio": 0.5,
            "name": "lamp",
            "on": true,
            "tags": ["a", "b"],
            "nested": {"none": null}
        });

        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_known_encoding() {
        // {"state": true}
        let bytes = encode(&json!({"state": true})).unwrap();
        assert_eq!(bytes, vec![0xa1, 0x65, b's', b't', b'a', b't', b'e', 0xf5]);
    }

    #[test]
    fn test_integer_map_keys_become_strings() {
        // {1: "x"}
        let value = decode(&[0xa1, 0x01, 0x61, b'x']).unwrap();
        assert_eq!(value, json!({"1": "x"}));
    }

    #[test]
    fn test_rejects_indefinite_length() {
        // [_ 1]
        let err = decode(&[0x9f, 0x01, 0xff]).unwrap_err();
        assert!(err.to_string().contains("indefinite"));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        assert!(decode(&[0x01, 0x02]).is_err());
    }
}
