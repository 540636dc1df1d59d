use rover_link_core::{Command, Direction, FlagAction, DEFAULT_ARM_JOINT};
use tracing::warn;

use crate::SessionContext;

/// What the operator asked for, before session context is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Move {
        direction: Direction,
        /// Overrides the active multiplier when set.
        speed: Option<f64>,
    },
    Arm {
        joint: u8,
        angle: i32,
    },
    Camera {
        angle: i32,
    },
    CenterCamera,
    Flag(FlagAction),
}

impl Intent {
    pub fn drive(direction: Direction) -> Self {
        Intent::Move {
            direction,
            speed: None,
        }
    }

    pub fn arm(angle: i32) -> Self {
        Intent::Arm {
            joint: DEFAULT_ARM_JOINT,
            angle,
        }
    }

    pub fn camera(angle: i32) -> Self {
        Intent::Camera { angle }
    }

    pub fn drop_flag() -> Self {
        Intent::Flag(FlagAction::Drop)
    }
}

/// Turns an intent into the command that goes on the wire.
///
/// Movement without an explicit speed picks up the context's active
/// multiplier. An explicit speed that is not a positive finite number is
/// replaced by the active multiplier as well. Angles outside the actuator
/// ranges are clamped.
pub fn build(intent: Intent, context: &SessionContext) -> Command {
    let command = match intent {
        Intent::Move { direction, speed } => {
            let speed = match speed {
                Some(speed) if speed.is_finite() && speed > 0.0 => speed,
                Some(speed) => {
                    warn!(speed, "ignoring invalid speed; using active multiplier");
                    context.multiplier()
                }
                None => context.multiplier(),
            };
            Command::Move { direction, speed }
        }
        Intent::Arm { joint, angle } => Command::Arm { joint, angle },
        Intent::Camera { angle } => Command::Camera { angle },
        Intent::CenterCamera => Command::Camera { angle: 0 },
        Intent::Flag(action) => Command::Flag { action },
    };

    if command.angles_in_range() {
        command
    } else {
        let clamped = command.clone().clamp_angles();
        warn!(requested = ?command, sent = ?clamped, "angle out of range; clamping");
        clamped
    }
}
