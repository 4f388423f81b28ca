//! Wire envelope codec.
//!
//! AcornDB payloads are JSON trees. Values JSON cannot carry natively travel
//! as tagged envelope objects: binary buffers as
//! `{"customType":"buffer","string":"<base64>"}` and file attachments as
//! `{"customType":"file","dataUrl":..,"name":..,"type":..}`. On the client
//! side a buffer keeps its raw bytes (`{"customType":"buffer","bytes":[..]}`);
//! [`encode`] and [`decode`] rewrite between the two forms in place.
//!
//! ISO-8601 instants are plain strings on the wire and stay strings in the
//! tree; [`parse_iso_date`] gives typed access to any field that matches the
//! date pattern.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::warn;

/// Marker key shared by all envelope objects.
const CUSTOM_TYPE: &str = "customType";

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2}(?:\.\d*)?)(?:Z|([+-])([\d:]*))?$")
            .expect("ISO date pattern compiles")
    })
}

/// Whether a string looks like an ISO-8601 instant as produced by the server.
pub fn is_iso_date(s: &str) -> bool {
    iso_date_regex().is_match(s)
}

/// Parse a JSON value as an ISO-8601 instant, if it is one.
pub fn parse_iso_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    let s = value.as_str()?;
    if !is_iso_date(s) {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

/// Raw binary payload, the client-side face of a buffer envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Client-form envelope: raw bytes, ready for [`encode`].
    pub fn to_value(&self) -> Value {
        json!({ CUSTOM_TYPE: "buffer", "bytes": self.0 })
    }

    /// Read a buffer envelope in either client or wire form.
    pub fn from_value(value: &Value) -> Option<Blob> {
        let map = value.as_object()?;
        if map.get(CUSTOM_TYPE)?.as_str()? != "buffer" {
            return None;
        }
        if let Some(bytes) = map.get("bytes") {
            return bytes_from_array(bytes).ok().map(Blob);
        }
        let encoded = map.get("string")?.as_str()?;
        BASE64.decode(encoded).ok().map(Blob)
    }
}

/// Rewrites client-form envelopes to their wire form, in place.
///
/// Walks every enumerable field of objects and arrays; primitives and
/// unrecognized objects pass through untouched. A transform failure on one
/// field is logged and leaves that field as-is without aborting traversal of
/// its siblings.
pub fn encode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            match map.get(CUSTOM_TYPE).and_then(Value::as_str) {
                Some("buffer") => {
                    match buffer_to_wire(map) {
                        Ok(Some(replacement)) => *value = replacement,
                        Ok(None) => {}
                        Err(e) => warn!("leaving buffer field unencoded: {e}"),
                    }
                    return;
                }
                Some("file") => {
                    if let Err(e) = check_file_envelope(map) {
                        warn!("malformed file envelope: {e}");
                    }
                    return;
                }
                _ => {}
            }
            for child in map.values_mut() {
                encode(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                encode(child);
            }
        }
        _ => {}
    }
}

/// Rewrites wire-form envelopes to their client form, in place.
///
/// Same traversal and failure isolation as [`encode`]. Date strings are left
/// alone; see [`parse_iso_date`].
pub fn decode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            match map.get(CUSTOM_TYPE).and_then(Value::as_str) {
                Some("buffer") => {
                    match buffer_to_client(map) {
                        Ok(Some(replacement)) => *value = replacement,
                        Ok(None) => {}
                        Err(e) => warn!("leaving buffer field undecoded: {e}"),
                    }
                    return;
                }
                Some("file") => {
                    if let Err(e) = check_file_envelope(map) {
                        warn!("malformed file envelope: {e}");
                    }
                    return;
                }
                _ => {}
            }
            for child in map.values_mut() {
                decode(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                decode(child);
            }
        }
        _ => {}
    }
}

fn buffer_to_wire(map: &Map<String, Value>) -> Result<Option<Value>, String> {
    if map.contains_key("string") {
        // Already wire form.
        return Ok(None);
    }
    let bytes = map
        .get("bytes")
        .ok_or_else(|| "buffer envelope has neither bytes nor string".to_string())?;
    let raw = bytes_from_array(bytes)?;
    Ok(Some(json!({
        CUSTOM_TYPE: "buffer",
        "string": BASE64.encode(raw),
    })))
}

fn buffer_to_client(map: &Map<String, Value>) -> Result<Option<Value>, String> {
    if map.contains_key("bytes") {
        // Already client form.
        return Ok(None);
    }
    let encoded = map
        .get("string")
        .and_then(Value::as_str)
        .ok_or_else(|| "buffer envelope has neither string nor bytes".to_string())?;
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| format!("invalid base64 payload: {e}"))?;
    Ok(Some(json!({ CUSTOM_TYPE: "buffer", "bytes": raw })))
}

fn bytes_from_array(value: &Value) -> Result<Vec<u8>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| "bytes payload is not an array".to_string())?;
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .filter(|n| *n <= u8::MAX as u64)
                .map(|n| n as u8)
                .ok_or_else(|| format!("bytes payload holds a non-byte value: {item}"))
        })
        .collect()
}

fn check_file_envelope(map: &Map<String, Value>) -> Result<(), String> {
    for key in ["dataUrl", "name", "type"] {
        if map.get(key).and_then(Value::as_str).is_none() {
            return Err(format!("file envelope missing {key}"));
        }
    }
    Ok(())
}
