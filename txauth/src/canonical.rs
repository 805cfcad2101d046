//! Deterministic byte encoding of transaction payloads.
//!
//! Payload bytes that parse as JSON are encoded from the value tree, so key
//! order, whitespace and `100` vs `100.0` do not change the result. Anything
//! else is an opaque record signed exactly as given. Every element is
//! type-tagged and length-prefixed (u64, big endian).

use crypto::hashes::sha256;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

pub const CANONICAL_DOMAIN: &[u8] = b"txauth/canonical/v1";
pub const MAX_DEPTH: usize = 64;

const RECURSION_LIMIT: &str = "recursion limit exceeded";

const TAG_OPAQUE: u8 = b'r';
const TAG_JSON: u8 = b'j';
const TAG_NULL: u8 = b'n';
const TAG_BOOL: u8 = b'b';
const TAG_UINT: u8 = b'u';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'f';
const TAG_STRING: u8 = b's';
const TAG_ARRAY: u8 = b'a';
const TAG_OBJECT: u8 = b'o';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    #[error("payload nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,

    #[error("payload is not representable as JSON: {0}")]
    Serialize(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalPayload {
    bytes: Vec<u8>,
    digest: [u8; 32],
}

impl CanonicalPayload {
    pub fn from_bytes(payload: &[u8]) -> Result<Self, CanonicalError> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => Self::from_json(&value),
            // serde_json stops at 128 levels; that is still JSON, just too deep.
            Err(err) if err.to_string().starts_with(RECURSION_LIMIT) => {
                Err(CanonicalError::TooDeep)
            }
            Err(_) => {
                let mut out = Vec::with_capacity(CANONICAL_DOMAIN.len() + payload.len() + 9);
                out.extend_from_slice(CANONICAL_DOMAIN);
                out.push(TAG_OPAQUE);
                put_bytes(&mut out, payload);
                Ok(Self::finish(out))
            }
        }
    }

    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, CanonicalError> {
        let value =
            serde_json::to_value(value).map_err(|err| CanonicalError::Serialize(err.to_string()))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, CanonicalError> {
        let mut out = Vec::with_capacity(CANONICAL_DOMAIN.len() + 64);
        out.extend_from_slice(CANONICAL_DOMAIN);
        out.push(TAG_JSON);
        encode_value(&mut out, value, 0)?;
        Ok(Self::finish(out))
    }

    fn finish(bytes: Vec<u8>) -> Self {
        let digest = sha256(&bytes);
        Self { bytes, digest }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_be_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn encode_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::TooDeep);
    }
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(flag) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*flag));
        }
        Value::Number(number) => encode_number(out, number),
        Value::String(text) => {
            out.push(TAG_STRING);
            put_bytes(out, text.as_bytes());
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            put_len(out, items.len());
            for item in items {
                encode_value(out, item, depth + 1)?;
            }
        }
        Value::Object(map) => encode_object(out, map, depth)?,
    }
    Ok(())
}

fn encode_object(
    out: &mut Vec<u8>,
    map: &Map<String, Value>,
    depth: usize,
) -> Result<(), CanonicalError> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    out.push(TAG_OBJECT);
    put_len(out, entries.len());
    for (key, value) in entries {
        put_bytes(out, key.as_bytes());
        encode_value(out, value, depth + 1)?;
    }
    Ok(())
}

// 2^63 and 2^64 as f64.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// Every integral number is encoded as its exact decimal integer, whether it
/// was written as `100`, `100.0` or `1e2`.
fn encode_number(out: &mut Vec<u8>, number: &Number) {
    if let Some(unsigned) = number.as_u64() {
        put_integer(out, TAG_UINT, &unsigned.to_string());
    } else if let Some(signed) = number.as_i64() {
        put_integer(out, TAG_INT, &signed.to_string());
    } else {
        let float = number.as_f64().unwrap_or(f64::NAN);
        if float.is_finite() && float.fract() == 0.0 {
            if float >= 0.0 && float < U64_LIMIT {
                put_integer(out, TAG_UINT, &(float as u64).to_string());
            } else if float < 0.0 && float >= -I64_LIMIT {
                put_integer(out, TAG_INT, &(float as i64).to_string());
            } else if float > 0.0 {
                put_integer(out, TAG_UINT, &format!("{float:.0}"));
            } else {
                put_integer(out, TAG_INT, &format!("{float:.0}"));
            }
        } else {
            out.push(TAG_FLOAT);
            put_bytes(out, float.to_string().as_bytes());
        }
    }
}

fn put_integer(out: &mut Vec<u8>, tag: u8, digits: &str) {
    out.push(tag);
    put_bytes(out, digits.as_bytes());
}
