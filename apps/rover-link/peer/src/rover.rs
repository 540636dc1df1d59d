use rand::{rngs::StdRng, Rng, SeedableRng};
use rover_link_core::{Command, Direction, FlagAction, Imu, TelemetryReport};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

const BATTERY_DRAIN_PER_REPORT: f64 = 0.05;
const IMU_SWING_DEGREES: f64 = 5.0;

/// Simulated rover. A peer drives exactly one, shared by every console
/// connected to it.
#[derive(Debug)]
pub struct RoverModel {
    drive: Direction,
    speed: f64,
    arm: i32,
    camera: i32,
    flag_dropped: bool,
    battery: f64,
    rng: StdRng,
}

/// Actuator state as reported on `/debug/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoverStatus {
    pub drive: Direction,
    pub speed: f64,
    pub arm: i32,
    pub camera: i32,
    pub flag_dropped: bool,
}

impl Default for RoverModel {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl RoverModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic sensors for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let battery = f64::from(rng.gen_range(50u8..=100));
        Self {
            drive: Direction::Stop,
            speed: 1.0,
            arm: 90,
            camera: 0,
            flag_dropped: false,
            battery,
            rng,
        }
    }

    /// Applies a command. Angles are clamped to the actuator ranges first.
    pub fn apply(&mut self, command: Command) {
        match command.clamp_angles() {
            Command::Move { direction, speed } => {
                if direction != self.drive {
                    debug!(direction = %direction, speed, "drive change");
                }
                self.drive = direction;
                self.speed = speed;
            }
            Command::Arm { joint, angle } => {
                // Only the main joint has a servo attached.
                if joint == rover_link_core::DEFAULT_ARM_JOINT {
                    self.arm = angle;
                } else {
                    debug!(joint, "ignoring command for unequipped joint");
                }
            }
            Command::Camera { angle } => self.camera = angle,
            Command::Flag {
                action: FlagAction::Drop,
            } => {
                if !self.flag_dropped {
                    info!("flag released");
                }
                self.flag_dropped = true;
            }
        }
    }

    pub fn status(&self) -> RoverStatus {
        RoverStatus {
            drive: self.drive,
            speed: self.speed,
            arm: self.arm,
            camera: self.camera,
            flag_dropped: self.flag_dropped,
        }
    }

    /// Halts the drive motors.
    pub fn stop(&mut self) {
        self.drive = Direction::Stop;
    }

    pub fn drive(&self) -> Direction {
        self.drive
    }

    pub fn arm(&self) -> i32 {
        self.arm
    }

    pub fn camera(&self) -> i32 {
        self.camera
    }

    pub fn flag_dropped(&self) -> bool {
        self.flag_dropped
    }

    /// Samples the sensors into a telemetry report.
    pub fn report(&mut self) -> TelemetryReport {
        self.battery = (self.battery - BATTERY_DRAIN_PER_REPORT).max(0.0);
        let imu = Imu {
            pitch: round_to(self.rng.gen_range(-IMU_SWING_DEGREES..=IMU_SWING_DEGREES), 2),
            roll: round_to(self.rng.gen_range(-IMU_SWING_DEGREES..=IMU_SWING_DEGREES), 2),
        };
        let temp = round_to(self.rng.gen_range(20.0..30.0), 1);
        let flag = if self.flag_dropped { "dropped" } else { "stowed" };

        TelemetryReport {
            battery: Some(self.battery.round() as u8),
            imu: Some(imu),
            arm: Some(self.arm),
            temp: Some(temp),
            ..TelemetryReport::default()
        }
        .with_extra("camera", self.camera)
        .with_extra("flag", flag)
        .with_extra(
            "drive",
            json!({ "dir": self.drive.as_str(), "speed": self.speed }),
        )
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_update_reported_state() {
        let mut rover = RoverModel::seeded(7);
        rover.apply(Command::Arm {
            joint: 1,
            angle: 120,
        });
        rover.apply(Command::Camera { angle: -15 });
        rover.apply(Command::Flag {
            action: FlagAction::Drop,
        });
        rover.apply(Command::Move {
            direction: Direction::ForwardLeft,
            speed: 2.0,
        });

        let report = rover.report();
        assert_eq!(report.arm, Some(120));
        assert_eq!(report.extra["camera"], json!(-15));
        assert_eq!(report.extra["flag"], json!("dropped"));
        assert_eq!(
            report.extra["drive"],
            json!({ "dir": "forward_left", "speed": 2.0 })
        );
    }

    #[test]
    fn out_of_range_angles_are_clamped() {
        let mut rover = RoverModel::seeded(1);
        rover.apply(Command::Arm {
            joint: 1,
            angle: 720,
        });
        rover.apply(Command::Camera { angle: -300 });
        assert_eq!(rover.arm(), 180);
        assert_eq!(rover.camera(), -90);
    }

    #[test]
    fn other_joints_are_ignored() {
        let mut rover = RoverModel::seeded(1);
        rover.apply(Command::Arm { joint: 2, angle: 10 });
        assert_eq!(rover.arm(), 90);
    }

    #[test]
    fn sensors_stay_plausible() {
        let mut rover = RoverModel::seeded(42);
        for _ in 0..200 {
            let report = rover.report();
            let battery = report.battery.unwrap();
            assert!(battery <= 100);
            let imu = report.imu.unwrap();
            assert!(imu.pitch.abs() <= IMU_SWING_DEGREES);
            assert!(imu.roll.abs() <= IMU_SWING_DEGREES);
            let temp = report.temp.unwrap();
            assert!((20.0..=30.0).contains(&temp));
        }
    }

    #[test]
    fn stop_halts_the_drive() {
        let mut rover = RoverModel::seeded(3);
        rover.apply(Command::Move {
            direction: Direction::Backward,
            speed: 1.0,
        });
        rover.stop();
        assert_eq!(rover.drive(), Direction::Stop);
    }
}
