use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical, schema-stable view of one device's latest telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub display_name: String,
    pub online: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub battery_percent: Option<f64>,
    /// Upstream flight mode code, passed through untouched
    pub flight_state: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

/// Messages pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Snapshot { devices: Vec<DeviceRecord> },
    TelemetryUpdate { devices: Vec<DeviceRecord> },
    Error { message: String },
}
