use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const KNOWN_KEYS: [&str; 4] = ["battery", "imu", "arm", "temp"];

/// Rover orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Imu {
    pub pitch: f64,
    pub roll: f64,
}

/// Most recent status record received from the rover.
///
/// The snapshot keeps the object exactly as it arrived and exposes typed
/// views over the well-known keys. A key that is missing, or that carries a
/// value of an unexpected shape, reads as unknown (`None`) rather than failing
/// the whole message; anything the console does not understand stays
/// available through [`TelemetrySnapshot::extra`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TelemetrySnapshot {
    battery: Option<f64>,
    imu: Option<Imu>,
    arm: Option<f64>,
    temp: Option<f64>,
    fields: Map<String, Value>,
}

impl TelemetrySnapshot {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        let battery = fields.get("battery").and_then(Value::as_f64);
        let imu = fields.get("imu").and_then(parse_imu);
        let arm = fields.get("arm").and_then(parse_arm);
        let temp = fields.get("temp").and_then(Value::as_f64);
        Self {
            battery,
            imu,
            arm,
            temp,
            fields,
        }
    }

    /// Battery charge in percent.
    pub fn battery(&self) -> Option<f64> {
        self.battery
    }

    pub fn imu(&self) -> Option<Imu> {
        self.imu
    }

    /// Arm joint position in degrees.
    pub fn arm(&self) -> Option<f64> {
        self.arm
    }

    /// Board temperature in degrees Celsius.
    pub fn temp(&self) -> Option<f64> {
        self.temp
    }

    /// Raw value for any key, known or not.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Keys the typed views do not cover.
    pub fn extra(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One-line human summary used for history entries.
    pub fn summary(&self) -> String {
        let battery = self
            .battery
            .map(|value| format!("{value}%"))
            .unwrap_or_else(|| "--".into());
        let imu = self
            .imu
            .map(|imu| format!("pitch {} roll {}", imu.pitch, imu.roll))
            .unwrap_or_else(|| "--".into());
        let arm = self
            .arm
            .map(|value| format!("{value}°"))
            .unwrap_or_else(|| "--".into());
        let temp = self
            .temp
            .map(|value| format!("{value}°C"))
            .unwrap_or_else(|| "--".into());
        let mut line = format!("battery {battery}, imu {imu}, arm {arm}, temp {temp}");
        let extra: Vec<String> = self
            .extra()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        if !extra.is_empty() {
            line.push_str(", ");
            line.push_str(&extra.join(", "));
        }
        line
    }
}

impl From<Map<String, Value>> for TelemetrySnapshot {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

impl From<TelemetrySnapshot> for Map<String, Value> {
    fn from(snapshot: TelemetrySnapshot) -> Self {
        snapshot.fields
    }
}

fn parse_imu(value: &Value) -> Option<Imu> {
    let object = value.as_object()?;
    Some(Imu {
        pitch: object.get("pitch")?.as_f64()?,
        roll: object.get("roll")?.as_f64()?,
    })
}

// Older rover builds report the arm as `{"joint1": angle}`.
fn parse_arm(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Object(joints) => joints.get("joint1").and_then(Value::as_f64),
        _ => None,
    }
}

/// Telemetry as produced by a rover before it goes on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu: Option<Imu>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryReport {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn typed_views_read_known_keys() {
        let snapshot = TelemetrySnapshot::from_map(object(json!({
            "battery": 80,
            "imu": { "pitch": 1.0, "roll": -0.5 },
            "arm": 90,
            "temp": 24.5
        })));

        assert_eq!(snapshot.battery(), Some(80.0));
        assert_eq!(
            snapshot.imu(),
            Some(Imu {
                pitch: 1.0,
                roll: -0.5
            })
        );
        assert_eq!(snapshot.arm(), Some(90.0));
        assert_eq!(snapshot.temp(), Some(24.5));
        assert_eq!(snapshot.extra().count(), 0);
    }

    #[test]
    fn missing_and_misshapen_keys_read_as_unknown() {
        let snapshot = TelemetrySnapshot::from_map(object(json!({
            "battery": "low",
            "imu": { "pitch": 2.0 }
        })));

        assert_eq!(snapshot.battery(), None);
        assert_eq!(snapshot.imu(), None);
        assert_eq!(snapshot.arm(), None);
        assert_eq!(snapshot.get("battery"), Some(&json!("low")));
    }

    #[test]
    fn unknown_keys_are_kept() {
        let snapshot = TelemetrySnapshot::from_map(object(json!({
            "battery": 70,
            "gps": { "lat": 1.5, "lon": 2.5 },
            "mode": "auto"
        })));

        let extra: Vec<&str> = snapshot.extra().map(|(key, _)| key.as_str()).collect();
        assert_eq!(extra, vec!["gps", "mode"]);
        assert!(snapshot.summary().contains("mode=\"auto\""));
    }

    #[test]
    fn legacy_joint_object_reads_as_arm_angle() {
        let snapshot = TelemetrySnapshot::from_map(object(json!({ "arm": { "joint1": 42 } })));
        assert_eq!(snapshot.arm(), Some(42.0));
    }

    #[test]
    fn report_omits_unset_fields() {
        let report = TelemetryReport {
            battery: Some(90),
            ..TelemetryReport::default()
        }
        .with_extra("flag", "stowed");

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value, json!({ "battery": 90, "flag": "stowed" }));
    }
}
