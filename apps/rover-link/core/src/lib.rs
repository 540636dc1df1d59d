//! Core primitives shared by the operator console and the rover peer.
//!
//! Both ends of the link consume this crate so the wire shapes for commands
//! and telemetry have a single source of truth.

pub mod codec;
pub mod command;
pub mod telemetry;

pub use codec::{
    decode_command, decode_telemetry, encode_command, encode_telemetry, DecodeError,
    EncodeError,
};
pub use command::{
    Command, Direction, FlagAction, ParseSpeedError, SpeedPreset, UnknownDirection, ARM_ANGLE_RANGE,
    CAMERA_ANGLE_RANGE, DEFAULT_ARM_JOINT,
};
pub use telemetry::{Imu, TelemetryReport, TelemetrySnapshot};

/// Default websocket address the console dials and the peer listens on.
pub const DEFAULT_ROVER_URL: &str = "ws://localhost:8765";
