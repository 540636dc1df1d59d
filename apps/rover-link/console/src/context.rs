use parking_lot::RwLock;
use rover_link_core::SpeedPreset;

/// Operator state shared by the command builder and the session.
///
/// Switching the preset never emits a command by itself; the new multiplier
/// applies to the next movement command that is built.
#[derive(Debug, Default)]
pub struct SessionContext {
    speed: RwLock<SpeedPreset>,
}

impl SessionContext {
    pub fn new(speed: SpeedPreset) -> Self {
        Self {
            speed: RwLock::new(speed),
        }
    }

    pub fn speed(&self) -> SpeedPreset {
        *self.speed.read()
    }

    /// Returns the preset that was active before the switch.
    pub fn set_speed(&self, preset: SpeedPreset) -> SpeedPreset {
        std::mem::replace(&mut *self.speed.write(), preset)
    }

    pub fn multiplier(&self) -> f64 {
        self.speed().factor()
    }
}
