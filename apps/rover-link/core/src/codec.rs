//! Textual wire format for the link: one JSON object per websocket text
//! message, in both directions.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{Command, TelemetryReport, TelemetrySnapshot};

const COMMAND_NAMES: [&str; 4] = ["move", "arm", "camera", "flag"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

impl DecodeError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::UnknownCommand(_) => "unknown_command",
        }
    }
}

pub fn encode_command(command: &Command) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(command)?)
}

/// Parses an inbound command. Extra keys are ignored.
pub fn decode_command(payload: &[u8]) -> Result<Command, DecodeError> {
    let object = parse_object(payload)?;
    let name = match object.get("cmd") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(DecodeError::Malformed("`cmd` must be a string".into())),
        None => return Err(DecodeError::Malformed("missing `cmd`".into())),
    };
    if !COMMAND_NAMES.contains(&name.as_str()) {
        return Err(DecodeError::UnknownCommand(name));
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|err| DecodeError::Malformed(err.to_string()))
}

pub fn encode_telemetry(report: &TelemetryReport) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(report)?)
}

/// Parses an inbound telemetry message. Only a payload that is not a JSON
/// object is an error; absent or unfamiliar keys are carried as-is.
pub fn decode_telemetry(payload: &[u8]) -> Result<TelemetrySnapshot, DecodeError> {
    parse_object(payload).map(TelemetrySnapshot::from_map)
}

fn parse_object(payload: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(DecodeError::Malformed(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(err) => Err(DecodeError::Malformed(err.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, FlagAction, Imu};
    use serde_json::json;

    #[test]
    fn every_command_variant_survives_the_wire() {
        let commands = [
            Command::Move {
                direction: Direction::BackwardLeft,
                speed: 0.5,
            },
            Command::Arm {
                joint: 1,
                angle: 135,
            },
            Command::Camera { angle: -30 },
            Command::Flag {
                action: FlagAction::Drop,
            },
        ];

        for command in commands {
            let wire = encode_command(&command).expect("encode");
            let decoded = decode_command(wire.as_bytes()).expect("decode");
            assert_eq!(decoded, command, "wire form: {wire}");
        }
    }

    #[test]
    fn move_without_speed_uses_normal_multiplier() {
        let command = decode_command(br#"{"cmd":"move","dir":"left"}"#).unwrap();
        assert_eq!(
            command,
            Command::Move {
                direction: Direction::Left,
                speed: 1.0
            }
        );
    }

    #[test]
    fn integer_speed_is_accepted() {
        let command = decode_command(br#"{"cmd":"move","dir":"forward","speed":1}"#).unwrap();
        assert_eq!(
            command,
            Command::Move {
                direction: Direction::Forward,
                speed: 1.0
            }
        );
    }

    #[test]
    fn unknown_command_is_reported_by_name() {
        let err = decode_command(br#"{"cmd":"dance"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownCommand(name) if name == "dance"));
    }

    #[test]
    fn command_without_discriminator_is_malformed() {
        let err = decode_command(br#"{"dir":"forward"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn telemetry_rejects_non_objects() {
        for payload in [&b"not json"[..], b"[1,2,3]", b"42", b""] {
            let err = decode_telemetry(payload).unwrap_err();
            assert!(matches!(err, DecodeError::Malformed(_)));
        }
    }

    #[test]
    fn empty_object_is_an_all_unknown_snapshot() {
        let snapshot = decode_telemetry(b"{}").unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.battery(), None);
    }

    #[test]
    fn report_decodes_into_equivalent_snapshot() {
        let report = TelemetryReport {
            battery: Some(77),
            imu: Some(Imu {
                pitch: 1.25,
                roll: -0.5,
            }),
            arm: Some(90),
            temp: Some(22.5),
            extra: Map::new(),
        }
        .with_extra("camera", 10);

        let snapshot = decode_telemetry(encode_telemetry(&report).unwrap().as_bytes()).unwrap();
        assert_eq!(snapshot.battery(), Some(77.0));
        assert_eq!(snapshot.arm(), Some(90.0));
        assert_eq!(snapshot.get("camera"), Some(&json!(10)));
    }

    fn wire(command: Command) -> Value {
        serde_json::from_str(&encode_command(&command).unwrap()).unwrap()
    }

    #[test]
    fn commands_serialise_with_cmd_tag() {
        assert_eq!(
            wire(Command::Move {
                direction: Direction::BackwardRight,
                speed: 0.5
            }),
            json!({ "cmd": "move", "dir": "backward_right", "speed": 0.5 })
        );
        assert_eq!(
            wire(Command::Arm { joint: 1, angle: 45 }),
            json!({ "cmd": "arm", "joint": 1, "angle": 45 })
        );
        assert_eq!(
            wire(Command::Camera { angle: -20 }),
            json!({ "cmd": "camera", "angle": -20 })
        );
        assert_eq!(
            wire(Command::Flag {
                action: FlagAction::Drop
            }),
            json!({ "cmd": "flag", "action": "drop" })
        );
    }

    #[test]
    fn report_omits_absent_readings_and_flattens_extras() {
        let report = TelemetryReport {
            imu: Some(Imu {
                pitch: 0.5,
                roll: 1.0,
            }),
            ..TelemetryReport::default()
        }
        .with_extra("flag", "stowed");

        let value: Value = serde_json::from_str(&encode_telemetry(&report).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "imu": { "pitch": 0.5, "roll": 1.0 }, "flag": "stowed" })
        );
    }
}
