use std::str::FromStr;

use rover_link_core::{Direction, SpeedPreset};
use thiserror::Error;

use crate::DirectionKey;

const DEFAULT_LOG_LINES: usize = 10;

/// One operator action typed at the console prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Press(DirectionKey),
    Release(DirectionKey),
    ReleaseAll,
    Move(Direction),
    Stop,
    Arm(i32),
    Camera(i32),
    CenterCamera,
    DropFlag,
    Speed(SpeedPreset),
    Connect,
    Close,
    Status,
    Telemetry,
    Log(usize),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("empty input")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownVerb(String),
    #[error("`{verb}` needs {what}")]
    Missing {
        verb: &'static str,
        what: &'static str,
    },
    #[error("`{verb}`: {reason}")]
    Invalid { verb: &'static str, reason: String },
}

impl FromStr for ConsoleInput {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(InputError::Empty)?.to_ascii_lowercase();
        let argument = words.next();

        let input = match verb.as_str() {
            "press" | "hold" => ConsoleInput::Press(key("press", argument)?),
            "release" => match argument {
                Some(token) => ConsoleInput::Release(key("release", Some(token))?),
                None => ConsoleInput::ReleaseAll,
            },
            "move" | "go" => {
                let token = argument.ok_or(InputError::Missing {
                    verb: "move",
                    what: "a direction",
                })?;
                let direction = token.parse::<Direction>().map_err(|err| InputError::Invalid {
                    verb: "move",
                    reason: err.to_string(),
                })?;
                ConsoleInput::Move(direction)
            }
            "stop" => ConsoleInput::Stop,
            "arm" => ConsoleInput::Arm(angle("arm", argument)?),
            "camera" | "cam" => match argument {
                Some(token) if token.eq_ignore_ascii_case("center") => ConsoleInput::CenterCamera,
                _ => ConsoleInput::Camera(angle("camera", argument)?),
            },
            "center" => ConsoleInput::CenterCamera,
            "flag" | "drop" => match argument {
                None => ConsoleInput::DropFlag,
                Some(token) if token.eq_ignore_ascii_case("drop") => ConsoleInput::DropFlag,
                Some(token) => {
                    return Err(InputError::Invalid {
                        verb: "flag",
                        reason: format!("unknown action `{token}`"),
                    })
                }
            },
            "speed" => {
                let token = argument.ok_or(InputError::Missing {
                    verb: "speed",
                    what: "a preset (normal, object or fast)",
                })?;
                let preset = token.parse::<SpeedPreset>().map_err(|err| InputError::Invalid {
                    verb: "speed",
                    reason: err.to_string(),
                })?;
                ConsoleInput::Speed(preset)
            }
            "connect" => ConsoleInput::Connect,
            "close" | "disconnect" => ConsoleInput::Close,
            "status" => ConsoleInput::Status,
            "telemetry" | "tm" => ConsoleInput::Telemetry,
            "log" => match argument {
                None => ConsoleInput::Log(DEFAULT_LOG_LINES),
                Some(token) => ConsoleInput::Log(token.parse().map_err(|_| InputError::Invalid {
                    verb: "log",
                    reason: format!("`{token}` is not a line count"),
                })?),
            },
            "help" | "?" => ConsoleInput::Help,
            "quit" | "exit" => ConsoleInput::Quit,
            _ => return Err(InputError::UnknownVerb(verb)),
        };
        Ok(input)
    }
}

fn key(verb: &'static str, token: Option<&str>) -> Result<DirectionKey, InputError> {
    let token = token.ok_or(InputError::Missing {
        verb,
        what: "a key (w/a/s/d or a direction)",
    })?;
    token.parse().map_err(|err: crate::keys::UnknownKey| InputError::Invalid {
        verb,
        reason: err.to_string(),
    })
}

// Saturates huge values instead of rejecting them; the builder clamps later.
fn angle(verb: &'static str, token: Option<&str>) -> Result<i32, InputError> {
    let token = token.ok_or(InputError::Missing {
        verb,
        what: "an angle in degrees",
    })?;
    let value: i64 = token.parse().map_err(|_| InputError::Invalid {
        verb,
        reason: format!("`{token}` is not a whole number of degrees"),
    })?;
    Ok(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

pub const HELP: &str = "\
commands:
  press <key> / release [key]   hold or let go of w/a/s/d (sampled every tick)
  move <direction>              one-shot move (forward, backward_left, stop, ...)
  stop                          release all keys and stop
  arm <0..180>                  set the arm angle
  camera <-90..90> | center     set the camera angle
  flag                          drop the flag
  speed <normal|object|fast>    switch the speed multiplier
  connect / close               open or close the rover link
  status | telemetry | log [n]  inspect the session
  quit";
