use crate::errors::{Error, Result};
use crate::model::DeviceRecord;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Where a device's position was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    /// `device_state` carries the coordinates itself
    Direct,
    /// First module object nested inside `device_state` carrying coordinates
    NestedSearch,
    /// `device_offline_position`, position only
    OfflineFallback,
}

/// Strategies in the order they are attempted.
pub const POSITION_STRATEGIES: [PositionSource; 3] = [
    PositionSource::Direct,
    PositionSource::NestedSearch,
    PositionSource::OfflineFallback,
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPosition<'a> {
    pub source: PositionSource,
    pub latitude: f64,
    pub longitude: f64,
    /// Live telemetry object the position came from; `None` for the offline fallback.
    pub state: Option<&'a Map<String, Value>>,
}

/// Pulls the node list out of an upstream topology document.
///
/// Absent or null `data`/`list` yields an empty batch; anything that cannot
/// be read as a list at all is a shape error.
pub fn extract_nodes(payload: Value) -> Result<Vec<Value>> {
    let mut payload = match payload {
        Value::Object(map) => map,
        other => {
            return Err(Error::Shape(format!(
                "expected an object at the top level, got {}",
                kind(&other)
            )))
        }
    };

    let mut data = match payload.remove("data") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::Shape(format!(
                "expected `data` to be an object, got {}",
                kind(&other)
            )))
        }
    };

    match data.remove("list") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(nodes)) => Ok(nodes),
        Some(other) => Err(Error::Shape(format!(
            "expected `data.list` to be an array, got {}",
            kind(&other)
        ))),
    }
}

/// Converts one raw topology node into a canonical record.
///
/// Returns `None` only when the node has no usable device serial; every other
/// missing or malformed field degrades to null.
pub fn normalize(node: &Value) -> Option<DeviceRecord> {
    normalize_at(node, Utc::now())
}

pub(crate) fn normalize_at(node: &Value, now: DateTime<Utc>) -> Option<DeviceRecord> {
    let host = node.get("host")?.as_object()?;
    let id = device_id(host.get("device_sn"))?;

    let online = truthy(host.get("device_online_status"));
    let display_name = host
        .get("device_project_callsign")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());

    let device_state = host.get("device_state").and_then(Value::as_object);
    let offline = host.get("device_offline_position").and_then(Value::as_object);

    let position = resolve_position(device_state, offline);
    let state = position.as_ref().and_then(|p| p.state);

    let altitude = state.and_then(|s| number(s.get("height")));
    let heading = state.and_then(|s| {
        number(s.get("attitude_head")).or_else(|| number(s.get("heading")))
    });
    let battery_percent = state
        .and_then(|s| s.get("battery"))
        .and_then(Value::as_object)
        .and_then(|b| number(b.get("capacity_percent")));
    let flight_state = state
        .and_then(|s| s.get("mode_code"))
        .filter(|v| !v.is_null())
        .cloned();

    let updated_at = offline
        .and_then(|o| epoch_millis(o.get("timestamp")))
        .unwrap_or(now);

    Some(DeviceRecord {
        id,
        display_name,
        online,
        latitude: position.as_ref().map(|p| p.latitude),
        longitude: position.as_ref().map(|p| p.longitude),
        altitude,
        heading,
        battery_percent,
        flight_state,
        updated_at,
    })
}

/// Walks `POSITION_STRATEGIES` in order and returns the first hit.
pub fn resolve_position<'a>(
    device_state: Option<&'a Map<String, Value>>,
    offline: Option<&'a Map<String, Value>>,
) -> Option<ResolvedPosition<'a>> {
    POSITION_STRATEGIES
        .iter()
        .find_map(|strategy| try_strategy(*strategy, device_state, offline))
}

fn try_strategy<'a>(
    strategy: PositionSource,
    device_state: Option<&'a Map<String, Value>>,
    offline: Option<&'a Map<String, Value>>,
) -> Option<ResolvedPosition<'a>> {
    let (object, state) = match strategy {
        PositionSource::Direct => {
            let ds = device_state?;
            (ds, Some(ds))
        }
        PositionSource::NestedSearch => {
            let module = device_state?
                .values()
                .filter_map(Value::as_object)
                .find(|m| coordinates(m).is_some())?;
            (module, Some(module))
        }
        PositionSource::OfflineFallback => (offline?, None),
    };

    let (latitude, longitude) = coordinates(object)?;
    Some(ResolvedPosition {
        source: strategy,
        latitude,
        longitude,
        state,
    })
}

fn coordinates(object: &Map<String, Value>) -> Option<(f64, f64)> {
    Some((number(object.get("latitude"))?, number(object.get("longitude"))?))
}

fn device_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value?.as_f64()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
    }
}

/// Zero, absent or out-of-range timestamps all count as "no timestamp".
fn epoch_millis(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let ms = value?.as_f64()?;
    if ms == 0.0 || !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
