use rover_link_core::{Command, Direction};

use crate::{input::HELP, ConsoleInput, Intent, PressedKeys, Session};

/// What the console should print after handling an input.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Silent,
    Quit,
}

/// Applies operator input to the session and the held-key set.
pub struct Operator {
    session: Session,
    keys: PressedKeys,
}

impl Operator {
    pub fn new(session: Session, keys: PressedKeys) -> Self {
        Self { session, keys }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keys(&self) -> &PressedKeys {
        &self.keys
    }

    pub async fn handle(&self, input: ConsoleInput) -> Reply {
        let store = self.session.store();
        match input {
            ConsoleInput::Press(key) => {
                self.keys.press(key);
                Reply::Text(format!("driving {}", self.keys.resolve()))
            }
            ConsoleInput::Release(key) => {
                self.keys.release(key);
                Reply::Text(format!("driving {}", self.keys.resolve()))
            }
            ConsoleInput::ReleaseAll => {
                self.keys.release_all();
                Reply::Silent
            }
            ConsoleInput::Move(direction) => {
                self.session.issue(Intent::drive(direction));
                Reply::Silent
            }
            ConsoleInput::Stop => {
                self.keys.release_all();
                self.session.issue(Intent::drive(Direction::Stop));
                Reply::Silent
            }
            ConsoleInput::Arm(angle) => match self.session.issue(Intent::arm(angle)) {
                Command::Arm { angle, .. } => Reply::Text(format!("arm angle {angle}°")),
                _ => Reply::Silent,
            },
            ConsoleInput::Camera(angle) => match self.session.issue(Intent::camera(angle)) {
                Command::Camera { angle } => Reply::Text(format!("camera angle {angle}°")),
                _ => Reply::Silent,
            },
            ConsoleInput::CenterCamera => {
                self.session.issue(Intent::CenterCamera);
                store.append_log("Camera centered");
                Reply::Text("camera centered".into())
            }
            ConsoleInput::DropFlag => {
                self.session.issue(Intent::drop_flag());
                store.append_log("Flag dropped!");
                Reply::Text("flag dropped".into())
            }
            ConsoleInput::Speed(preset) => {
                self.session.context().set_speed(preset);
                store.append_log(format!("Speed set to {preset}"));
                Reply::Text(format!("current speed: {preset} (x{})", preset.factor()))
            }
            ConsoleInput::Connect => match self.session.connect().await {
                Ok(()) => {
                    self.session.start_driving(self.keys.clone());
                    Reply::Text(format!("connected to {}", self.session.config().url))
                }
                Err(err) => Reply::Text(err.to_string()),
            },
            ConsoleInput::Close => {
                self.session.close().await;
                self.keys.release_all();
                Reply::Text("link closed".into())
            }
            ConsoleInput::Status => Reply::Text(self.status_line()),
            ConsoleInput::Telemetry => match store.latest() {
                Some(snapshot) => match serde_json::to_string_pretty(snapshot.as_map()) {
                    Ok(text) => Reply::Text(text),
                    Err(err) => Reply::Text(format!("cannot render telemetry: {err}")),
                },
                None => Reply::Text("no telemetry yet".into()),
            },
            ConsoleInput::Log(lines) => {
                let entries = store.recent(lines);
                if entries.is_empty() {
                    Reply::Text("log is empty".into())
                } else {
                    let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
                    Reply::Text(lines.join("\n"))
                }
            }
            ConsoleInput::Help => Reply::Text(HELP.into()),
            ConsoleInput::Quit => {
                self.session.close().await;
                Reply::Quit
            }
        }
    }

    fn status_line(&self) -> String {
        let held: Vec<&str> = self
            .keys
            .snapshot()
            .into_iter()
            .map(|key| key.as_str())
            .collect();
        format!(
            "{} | speed {} | held [{}] -> {} | sent {} dropped {}",
            self.session.state(),
            self.session.context().speed(),
            held.join(", "),
            self.keys.resolve(),
            self.session.sent_commands(),
            self.session.dropped_commands(),
        )
    }
}
