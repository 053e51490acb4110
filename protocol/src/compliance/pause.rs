//! Global pause switch for the asset.

use serde::{Deserialize, Serialize};

/// Defaults to unpaused. While set, the transfer gate denies everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSwitch {
    paused: bool,
}

impl PauseSwitch {
    pub fn new(paused: bool) -> Self {
        Self { paused }
    }

    /// Sets the switch. Returns `false` if it was already set.
    pub fn pause(&mut self) -> bool {
        !std::mem::replace(&mut self.paused, true)
    }

    /// Clears the switch. Returns `false` if it was already clear.
    pub fn unpause(&mut self) -> bool {
        std::mem::replace(&mut self.paused, false)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
