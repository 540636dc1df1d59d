use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use parking_lot::Mutex;
use rover_link_core::Direction;
use thiserror::Error;

/// A directional input the operator can hold down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectionKey {
    Forward,
    Backward,
    Left,
    Right,
}

impl DirectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionKey::Forward => "forward",
            DirectionKey::Backward => "backward",
            DirectionKey::Left => "left",
            DirectionKey::Right => "right",
        }
    }
}

impl fmt::Display for DirectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectionKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w" | "up" | "arrowup" | "forward" => Ok(DirectionKey::Forward),
            "s" | "down" | "arrowdown" | "backward" | "back" => Ok(DirectionKey::Backward),
            "a" | "arrowleft" | "left" => Ok(DirectionKey::Left),
            "d" | "arrowright" | "right" => Ok(DirectionKey::Right),
            _ => Err(UnknownKey(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown direction key `{0}`")]
pub struct UnknownKey(pub String);

/// Resolves the held keys into exactly one direction.
///
/// A vertical and a horizontal key together produce the diagonal; a single
/// axis produces that axis; nothing held produces `stop`. Opposing keys on
/// the same axis cancel each other out.
pub fn resolve(keys: &BTreeSet<DirectionKey>) -> Direction {
    let vertical = axis(
        keys.contains(&DirectionKey::Forward),
        keys.contains(&DirectionKey::Backward),
    );
    let horizontal = axis(
        keys.contains(&DirectionKey::Left),
        keys.contains(&DirectionKey::Right),
    );

    match (vertical, horizontal) {
        (Some(true), Some(true)) => Direction::ForwardLeft,
        (Some(true), Some(false)) => Direction::ForwardRight,
        (Some(false), Some(true)) => Direction::BackwardLeft,
        (Some(false), Some(false)) => Direction::BackwardRight,
        (Some(true), None) => Direction::Forward,
        (Some(false), None) => Direction::Backward,
        (None, Some(true)) => Direction::Left,
        (None, Some(false)) => Direction::Right,
        (None, None) => Direction::Stop,
    }
}

// `Some(true)` for the first pole, `Some(false)` for the second.
fn axis(first: bool, second: bool) -> Option<bool> {
    match (first, second) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Set of currently held direction keys, shared between the input source
/// that records press/release edges and the periodic sampler.
#[derive(Debug, Clone, Default)]
pub struct PressedKeys {
    held: Arc<Mutex<BTreeSet<DirectionKey>>>,
}

impl PressedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not already held.
    pub fn press(&self, key: DirectionKey) -> bool {
        self.held.lock().insert(key)
    }

    /// Returns `true` if the key was held.
    pub fn release(&self, key: DirectionKey) -> bool {
        self.held.lock().remove(&key)
    }

    pub fn release_all(&self) {
        self.held.lock().clear();
    }

    pub fn snapshot(&self) -> BTreeSet<DirectionKey> {
        self.held.lock().clone()
    }

    pub fn resolve(&self) -> Direction {
        resolve(&self.held.lock())
    }
}
