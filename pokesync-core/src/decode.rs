//! Message decoding
//!
//! Bus payloads are gzip-compressed JSON objects. Decoding never touches the
//! store and has no side effects.

use crate::error::DecodeError;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;

/// A decoded bus message: a generic string-keyed JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Decompress and parse one raw bus payload.
pub fn decode(payload: &[u8]) -> Result<Document, DecodeError> {
    let mut decoder = GzDecoder::new(payload);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| DecodeError::Decompress {
            reason: e.to_string(),
        })?;
    parse_document(&raw)
}

/// Parse an uncompressed JSON object, e.g. one poison-file line.
pub fn parse_document(raw: &[u8]) -> Result<Document, DecodeError> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| DecodeError::Json {
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            found: json_kind(&other).to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
