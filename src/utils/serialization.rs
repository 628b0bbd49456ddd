// src/utils/serialization.rs
//! Best-effort decoding helpers for values read from chain storage.
//!
//! Storage values arrive with byte strings rendered as `0x` hex. These helpers
//! turn them back into text and structured metadata. None of them fail: a value
//! that cannot be decoded is returned in its raw form.

use log::debug;
use serde_json::{json, Map, Value};

/// Prefix marking a hex-encoded byte string.
pub const HEX_PREFIX: &str = "0x";

/// Decodes a `0x`-prefixed hex string into UTF-8 text.
///
/// # Arguments
/// * `raw` - Value as read from storage
///
/// # Returns
/// - The decoded text with embedded NUL bytes stripped, when `raw` is
///   well-formed hex of valid UTF-8
/// - `raw` unchanged otherwise (no prefix, odd length, bad digits, invalid UTF-8)
pub fn decode_hex_text(raw: &str) -> String {
    let Some(digits) = raw.strip_prefix(HEX_PREFIX) else {
        return raw.to_string();
    };

    match hex::decode(digits)
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()))
    {
        Ok(text) => text.replace('\0', ""),
        Err(e) => {
            debug!("Keeping raw value, hex decoding failed: {}", e);
            raw.to_string()
        }
    }
}

/// Encodes text as `0x`-prefixed hex, the way the chain returns byte fields.
#[cfg(test)]
pub fn encode_hex_text(text: &str) -> String {
    format!("{}{}", HEX_PREFIX, hex::encode(text.as_bytes()))
}

/// Parses a credential's free-form metadata into a JSON object.
///
/// The raw value is hex-decoded first and then parsed as JSON. When either
/// step fails, or the JSON is not an object, the result is `{ "text": <raw> }`
/// so callers always receive an object. Empty input yields an empty object.
pub fn parse_metadata(raw: &str) -> Map<String, Value> {
    if raw.is_empty() {
        return Map::new();
    }

    let text = decode_hex_text(raw);
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("text".to_string(), json!(raw));
            map
        }
    }
}

/// Serializes metadata for submission as a credential's metadata bytes.
pub fn encode_metadata(data: &Map<String, Value>) -> String {
    Value::Object(data.clone()).to_string()
}
