// Hora Payload Normalization
// Unwraps the upstream response (often JSON-in-a-string) into a TimeWindowSet

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HoraError, HoraResult};
use crate::hora::{HoraWindow, Lord, TimeWindowSet, WindowEntry};

/// Field the API nests the window map under.
const OUTPUT_FIELD: &str = "output";

/// Accepted naive timestamp layouts (fractional seconds optional).
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct RawWindow {
    lord: String,
    starts_at: String,
    ends_at: String,
}

/// Build a `TimeWindowSet` from a raw API (or cache) response.
///
/// `output` may hold the window map as a JSON-encoded string or as a
/// structured value. Without `output` the top-level object is taken as the
/// map and scalar metadata fields (`statusCode`, `fetched_at`) are skipped.
/// Naive timestamps are read in `basis`.
pub fn normalize_payload(raw: &Value, basis: FixedOffset) -> HoraResult<TimeWindowSet> {
    let (container, lenient) = unwrap_output(raw)?;
    let set = build_set(&container, lenient, basis)?;

    if set.is_empty() {
        return Err(HoraError::Parse("payload contains no hora windows".into()));
    }

    debug!("Normalized {} hora windows", set.len());
    Ok(set)
}

/// Like `normalize_payload`, but degrades to an empty set plus the error.
pub fn normalize_payload_or_empty(
    raw: &Value,
    basis: FixedOffset,
) -> (TimeWindowSet, Option<HoraError>) {
    match normalize_payload(raw, basis) {
        Ok(set) => (set, None),
        Err(e) => {
            warn!("Discarding hora payload: {}", e);
            (TimeWindowSet::empty(), Some(e))
        }
    }
}

/// Returns the window container and whether non-object entries may be skipped.
fn unwrap_output(raw: &Value) -> HoraResult<(Value, bool)> {
    match raw {
        Value::Object(map) => match map.get(OUTPUT_FIELD) {
            Some(Value::String(encoded)) => Ok((decode_string(encoded)?, false)),
            Some(v @ (Value::Object(_) | Value::Array(_))) => Ok((v.clone(), false)),
            Some(Value::Null) => Err(HoraError::Parse("`output` is null".into())),
            Some(other) => Err(HoraError::Parse(format!(
                "`output` has unexpected type: {}",
                type_name(other)
            ))),
            None => Ok((raw.clone(), true)),
        },
        Value::Array(_) => Ok((raw.clone(), false)),
        other => Err(HoraError::Parse(format!(
            "response is not an object: {}",
            type_name(other)
        ))),
    }
}

/// Decode a JSON-encoded string, tolerating one extra layer of encoding.
fn decode_string(encoded: &str) -> HoraResult<Value> {
    let decoded: Value = serde_json::from_str(encoded)
        .map_err(|e| HoraError::Parse(format!("`output` is not valid JSON: {}", e)))?;
    match decoded {
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| HoraError::Parse(format!("`output` is not valid JSON: {}", e))),
        v => Ok(v),
    }
}

fn build_set(container: &Value, lenient: bool, basis: FixedOffset) -> HoraResult<TimeWindowSet> {
    let mut entries = Vec::new();

    match container {
        Value::Object(map) => {
            for (key, value) in map {
                if !value.is_object() {
                    if lenient {
                        continue;
                    }
                    return Err(HoraError::Parse(format!(
                        "window '{}' is not an object",
                        key
                    )));
                }
                entries.push(parse_entry(key, value, basis)?);
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                entries.push(parse_entry(&(i + 1).to_string(), value, basis)?);
            }
        }
        other => {
            return Err(HoraError::Parse(format!(
                "window container has unexpected type: {}",
                type_name(other)
            )))
        }
    }

    Ok(TimeWindowSet::new(entries))
}

fn parse_entry(key: &str, value: &Value, basis: FixedOffset) -> HoraResult<WindowEntry> {
    let raw: RawWindow = serde_json::from_value(value.clone())
        .map_err(|e| HoraError::Parse(format!("window '{}': {}", key, e)))?;

    let starts_at = parse_timestamp(&raw.starts_at, basis)
        .map_err(|e| HoraError::Parse(format!("window '{}' starts_at: {}", key, e)))?;
    let ends_at = parse_timestamp(&raw.ends_at, basis)
        .map_err(|e| HoraError::Parse(format!("window '{}' ends_at: {}", key, e)))?;

    if starts_at >= ends_at {
        return Err(HoraError::Parse(format!(
            "window '{}' ends at {} before it starts at {}",
            key, raw.ends_at, raw.starts_at
        )));
    }

    Ok(WindowEntry {
        key: key.to_string(),
        window: HoraWindow {
            lord: Lord::parse(&raw.lord),
            starts_at,
            ends_at,
        },
    })
}

/// Parse an API timestamp. Offset-carrying RFC 3339 values keep their
/// offset; naive values are placed in `basis`.
pub(crate) fn parse_timestamp(raw: &str, basis: FixedOffset) -> Result<DateTime<FixedOffset>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return naive
                .and_local_timezone(basis)
                .single()
                .ok_or_else(|| format!("ambiguous local time '{}'", raw));
        }
    }
    Err(format!("unrecognized timestamp '{}'", raw))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
