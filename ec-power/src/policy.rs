//! Persisted power-on policy and the boot-time decision derived from it.

use serde::{Deserialize, Serialize};

use crate::power::ChipsetState;

/// What to do when standby power returns after a total power loss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AcRecoveryPolicy {
    #[default]
    AlwaysOn = 1,
    AlwaysOff = 2,
    /// Restore the state the system was in when power was lost.
    Previous = 3,
}

impl TryFrom<u8> for AcRecoveryPolicy {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AcRecoveryPolicy::AlwaysOn),
            2 => Ok(AcRecoveryPolicy::AlwaysOff),
            3 => Ok(AcRecoveryPolicy::Previous),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LastPowerState {
    Off = 0x55,
    #[default]
    On = 0xaa,
}

/// Everything the power button machine needs to pick its initial state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInfo {
    /// The controller restarted underneath a host that may be running.
    pub jumped: bool,
    pub chipset: ChipsetState,
    /// Reset flag asking to leave the host off.
    pub ap_off: bool,
    /// Reset flag asking to wait for the power button.
    pub ap_idle: bool,
    /// Manufacturing mode powers the system on unconditionally.
    pub mfg_mode: bool,
    pub ac_policy: AcRecoveryPolicy,
    pub last_state: LastPowerState,
}

impl Default for BootInfo {
    fn default() -> Self {
        BootInfo {
            jumped: false,
            chipset: ChipsetState::HardOff,
            ap_off: false,
            ap_idle: false,
            mfg_mode: false,
            ac_policy: AcRecoveryPolicy::default(),
            last_state: LastPowerState::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootAction {
    /// Reflect the real button towards the chipset.
    Mirror,
    /// Make sure the chipset does not see a press.
    ForceRelease,
    Idle,
    /// Power the system on without a physical press.
    InitOn,
}

pub fn boot_action(info: &BootInfo) -> BootAction {
    if info.jumped && info.chipset == ChipsetState::On {
        BootAction::Mirror
    } else if info.ap_off {
        BootAction::ForceRelease
    } else if info.ap_idle {
        BootAction::Idle
    } else if auto_power_on(info.mfg_mode, info.ac_policy, info.last_state) {
        BootAction::InitOn
    } else {
        BootAction::Idle
    }
}

pub fn auto_power_on(mfg_mode: bool, policy: AcRecoveryPolicy, last: LastPowerState) -> bool {
    if mfg_mode {
        return true;
    }
    match policy {
        AcRecoveryPolicy::AlwaysOn => true,
        AcRecoveryPolicy::AlwaysOff => false,
        AcRecoveryPolicy::Previous => last == LastPowerState::On,
    }
}
