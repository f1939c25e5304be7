use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};

/// How a simulated device reports its position upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reporting {
    /// Coordinates directly on `device_state`
    Direct,
    /// Coordinates inside a dock module under `device_state`
    Nested,
    /// Offline; only `device_offline_position` is populated
    Offline,
}

#[derive(Debug, Clone)]
pub struct Drone {
    pub sn: Option<String>,
    pub callsign: String,
    pub reporting: Reporting,
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
    pub heading: f64,
    pub battery: f64,
    pub mode_code: u8,
    pub last_seen_ms: i64,
}

impl Drone {
    pub fn random(index: usize, reporting: Reporting, with_sn: bool) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            sn: with_sn.then(|| format!("1581F{:07}SIM", index)),
            callsign: format!("Drone {}", index + 1),
            reporting,
            latitude: rng.gen_range(40.60..40.80),
            longitude: rng.gen_range(-74.10..-73.90),
            height: rng.gen_range(30.0..120.0),
            heading: rng.gen_range(-180.0..180.0),
            battery: rng.gen_range(20.0..100.0),
            mode_code: rng.gen_range(0..15),
            last_seen_ms: Utc::now().timestamp_millis() - rng.gen_range(60_000..3_600_000),
        }
    }

    /// Random walk for live devices; offline ones stay put.
    pub fn drift(&mut self) {
        if self.reporting == Reporting::Offline {
            return;
        }
        let mut rng = rand::thread_rng();
        self.latitude += rng.gen_range(-0.0005..0.0005);
        self.longitude += rng.gen_range(-0.0005..0.0005);
        self.height = (self.height + rng.gen_range(-2.0..2.0)).clamp(0.0, 500.0);
        self.heading = (self.heading + rng.gen_range(-10.0..10.0) + 540.0) % 360.0 - 180.0;
        self.battery = (self.battery - rng.gen_range(0.0..0.2)).max(0.0);
    }

    pub fn to_node(&self) -> Value {
        let state = json!({
            "latitude": self.latitude,
            "longitude": self.longitude,
            "height": self.height,
            "attitude_head": self.heading,
            "battery": { "capacity_percent": self.battery.round() },
            "mode_code": self.mode_code,
        });

        let (online, device_state, offline_position) = match self.reporting {
            Reporting::Direct => (1, state, json!({})),
            Reporting::Nested => (1, json!({ "dock_module": state, "network_state": { "quality": 5 } }), json!({})),
            Reporting::Offline => (
                0,
                json!({}),
                json!({
                    "latitude": self.latitude,
                    "longitude": self.longitude,
                    "timestamp": self.last_seen_ms,
                }),
            ),
        };

        json!({
            "host": {
                "device_sn": self.sn,
                "device_project_callsign": self.callsign,
                "device_online_status": online,
                "device_state": device_state,
                "device_offline_position": offline_position,
            }
        })
    }
}

pub fn topology(fleet: &[Drone]) -> Value {
    json!({
        "code": 0,
        "message": "OK",
        "data": { "list": fleet.iter().map(Drone::to_node).collect::<Vec<_>>() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_node_has_only_offline_position() {
        let drone = Drone::random(3, Reporting::Offline, true);
        let node = drone.to_node();

        assert_eq!(node["host"]["device_online_status"], 0);
        assert!(node["host"]["device_state"].as_object().unwrap().is_empty());
        assert!(node["host"]["device_offline_position"]["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_nested_node_position_under_module() {
        let node = Drone::random(0, Reporting::Nested, true).to_node();
        assert!(node["host"]["device_state"]["dock_module"]["latitude"].is_f64());
        assert!(node["host"]["device_state"].get("latitude").is_none());
    }

    #[test]
    fn test_missing_serial_serializes_null() {
        let node = Drone::random(1, Reporting::Direct, false).to_node();
        assert!(node["host"]["device_sn"].is_null());
    }

    #[test]
    fn test_offline_drone_does_not_drift() {
        let mut drone = Drone::random(2, Reporting::Offline, true);
        let (lat, lng) = (drone.latitude, drone.longitude);
        drone.drift();
        assert_eq!((drone.latitude, drone.longitude), (lat, lng));
    }
}
