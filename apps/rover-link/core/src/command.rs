use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Servo range accepted for arm joints, in degrees.
pub const ARM_ANGLE_RANGE: RangeInclusive<i32> = 0..=180;

/// Pan range accepted for the camera mount, in degrees. Zero is centered.
pub const CAMERA_ANGLE_RANGE: RangeInclusive<i32> = -90..=90;

/// The main arm joint. The rover only actuates this one today.
pub const DEFAULT_ARM_JOINT: u8 = 1;

/// Operator-issued instruction sent to the rover.
///
/// On the wire every command is a JSON object whose `cmd` key names the
/// variant, e.g. `{"cmd":"move","dir":"forward","speed":1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Move {
        #[serde(rename = "dir")]
        direction: Direction,
        /// Rovers fall back to their current multiplier when this is absent.
        #[serde(default = "normal_speed")]
        speed: f64,
    },
    Arm {
        joint: u8,
        angle: i32,
    },
    Camera {
        angle: i32,
    },
    Flag {
        action: FlagAction,
    },
}

fn normal_speed() -> f64 {
    SpeedPreset::Normal.factor()
}

impl Command {
    /// Value of the `cmd` discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Arm { .. } => "arm",
            Command::Camera { .. } => "camera",
            Command::Flag { .. } => "flag",
        }
    }

    /// Returns `true` if every angle carried by the command is inside its
    /// actuator range. Commands without angles are always in range.
    pub fn angles_in_range(&self) -> bool {
        match self {
            Command::Arm { angle, .. } => ARM_ANGLE_RANGE.contains(angle),
            Command::Camera { angle } => CAMERA_ANGLE_RANGE.contains(angle),
            Command::Move { .. } | Command::Flag { .. } => true,
        }
    }

    /// Saturates any angle into its actuator range.
    pub fn clamp_angles(self) -> Self {
        match self {
            Command::Arm { joint, angle } => Command::Arm {
                joint,
                angle: clamp_into(&ARM_ANGLE_RANGE, angle),
            },
            Command::Camera { angle } => Command::Camera {
                angle: clamp_into(&CAMERA_ANGLE_RANGE, angle),
            },
            other => other,
        }
    }
}

fn clamp_into(range: &RangeInclusive<i32>, value: i32) -> i32 {
    value.clamp(*range.start(), *range.end())
}

/// Single movement intent derived from the held direction keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    ForwardLeft,
    ForwardRight,
    BackwardLeft,
    BackwardRight,
    Stop,
}

impl Direction {
    pub const ALL: [Direction; 9] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::ForwardLeft,
        Direction::ForwardRight,
        Direction::BackwardLeft,
        Direction::BackwardRight,
        Direction::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::ForwardLeft => "forward_left",
            Direction::ForwardRight => "forward_right",
            Direction::BackwardLeft => "backward_left",
            Direction::BackwardRight => "backward_right",
            Direction::Stop => "stop",
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Direction::Stop)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Direction::ALL
            .into_iter()
            .find(|direction| direction.as_str() == wanted)
            .ok_or_else(|| UnknownDirection(s.to_owned()))
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown direction `{0}`")]
pub struct UnknownDirection(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagAction {
    Drop,
}

impl FlagAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagAction::Drop => "drop",
        }
    }
}

/// Speed multiplier presets the operator can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedPreset {
    #[default]
    Normal,
    /// Slowed down while the object-detection overlay is in use.
    Object,
    Fast,
}

impl SpeedPreset {
    pub fn factor(&self) -> f64 {
        match self {
            SpeedPreset::Normal => 1.0,
            SpeedPreset::Object => 0.5,
            SpeedPreset::Fast => 2.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedPreset::Normal => "normal",
            SpeedPreset::Object => "object",
            SpeedPreset::Fast => "fast",
        }
    }
}

impl fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SpeedPreset {
    type Err = ParseSpeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(SpeedPreset::Normal),
            "object" | "object-detection" | "slow" => Ok(SpeedPreset::Object),
            "fast" => Ok(SpeedPreset::Fast),
            _ => Err(ParseSpeedError(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown speed preset `{0}` (expected normal, object or fast)")]
pub struct ParseSpeedError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_saturates_without_wrapping() {
        let arm = Command::Arm {
            joint: DEFAULT_ARM_JOINT,
            angle: i32::MAX,
        };
        assert!(!arm.angles_in_range());
        assert_eq!(
            arm.clamp_angles(),
            Command::Arm {
                joint: DEFAULT_ARM_JOINT,
                angle: 180
            }
        );

        let camera = Command::Camera { angle: i32::MIN };
        assert_eq!(camera.clamp_angles(), Command::Camera { angle: -90 });
    }

    #[test]
    fn in_range_angles_are_untouched() {
        let camera = Command::Camera { angle: -45 };
        assert!(camera.angles_in_range());
        assert_eq!(camera.clone().clamp_angles(), camera);
    }

    #[test]
    fn direction_parses_wire_tokens() {
        for direction in Direction::ALL {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn speed_presets_match_multipliers() {
        assert_eq!("normal".parse::<SpeedPreset>().unwrap().factor(), 1.0);
        assert_eq!("Object".parse::<SpeedPreset>().unwrap().factor(), 0.5);
        assert_eq!("fast".parse::<SpeedPreset>().unwrap().factor(), 2.0);
        assert!("warp".parse::<SpeedPreset>().is_err());
    }
}
