//! Thermal emergency latch for the controller's own temperature sensor.

use crate::power::ChipsetState;

/// Fires once when the temperature climbs above `shutdown` with the chipset
/// powered, then stays quiet until it has fallen back below `release`.
#[derive(Debug)]
pub struct ThermalGuard {
    shutdown: f32,
    release: f32,
    tripped: bool,
}

impl ThermalGuard {
    pub const fn new(shutdown: f32, release: f32) -> Self {
        ThermalGuard {
            shutdown,
            release,
            tripped: false,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Returns true when the chipset has to be powered off.
    pub fn check(&mut self, temperature: f32, chipset: ChipsetState) -> bool {
        if self.tripped {
            if temperature < self.release {
                info!("temperature back below the release threshold");
                self.tripped = false;
            }
            false
        } else if temperature > self.shutdown && !chipset.is_any_off() {
            warn!("thermal emergency");
            self.tripped = true;
            true
        } else {
            false
        }
    }
}
