//! Shutdown and wakeup cause codes.
//!
//! Codes are 32-bit on the wire: the low byte identifies the event and bit 16
//! marks a shutdown the host did not ask for.

use serde::{Deserialize, Serialize};

/// Set on every abnormal shutdown code.
pub const ABNORMAL: u32 = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ShutdownCause {
    /// SLP_S4/S5 asserted by the chipset, S3 -> S5.
    Shutdown = 0x01,
    /// SLP_S3 asserted by the chipset, S0 -> S3.
    Suspend = 0x03,
    /// Power button held past the first threshold.
    LongPress = 0x06,
    /// Power button held past the second threshold; the controller resets.
    LongPressReset = 0x07,
    /// Standby power-good dropped while on.
    RailLossOn = 0x08,
    WakeWatchdog = 0x09,
    /// Standby power-good dropped while suspended.
    RailLossSuspend = 0x0a,
    /// Standby power-good dropped while in standby.
    RailLossStandby = 0x0c,
    SlpSusTimeout = 0x0d,
    StandbyPgoodTimeout = 0x0f,
    Thermal = 0x33,
    /// Host asked for a shutdown or power-off.
    HostRequest = 0x43,
    ShutdownWatchdog = 0x44,
    V12Timeout = 0x46,
    AllCoreTimeout = 0x47,
}

impl ShutdownCause {
    pub fn is_abnormal(self) -> bool {
        !matches!(
            self,
            ShutdownCause::Shutdown | ShutdownCause::Suspend | ShutdownCause::HostRequest
        )
    }

    pub fn code(self) -> u32 {
        let id = self as u8 as u32;
        if self.is_abnormal() { id | ABNORMAL } else { id }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WakeupCause {
    /// Power button pressed with the chipset off.
    ButtonPowerOn = 0x01,
    /// SLP_S3 released, S3 -> S0.
    Resume = 0x04,
    /// SLP_S4 released, S5 -> S3.
    PowerOn = 0x05,
    LidOpen = 0x45,
    LanWake = 0x46,
    /// AC recovery or manufacturing mode powered the system on at boot.
    AutoPowerOn = 0xfc,
    /// The wake-up watchdog power-cycled the system.
    Watchdog = 0xfe,
}

impl WakeupCause {
    pub fn code(self) -> u32 {
        self as u8 as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cause {
    Shutdown(ShutdownCause),
    Wakeup(WakeupCause),
}

impl Cause {
    pub fn code(self) -> u32 {
        match self {
            Cause::Shutdown(c) => c.code(),
            Cause::Wakeup(c) => c.code(),
        }
    }

    pub fn is_abnormal(self) -> bool {
        matches!(self, Cause::Shutdown(c) if c.is_abnormal())
    }
}

impl From<ShutdownCause> for Cause {
    fn from(c: ShutdownCause) -> Self {
        Cause::Shutdown(c)
    }
}

impl From<WakeupCause> for Cause {
    fn from(c: WakeupCause) -> Self {
        Cause::Wakeup(c)
    }
}

/// A cause with the uptime at which it was produced, as persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CauseRecord {
    pub uptime_ms: u64,
    pub cause: Cause,
}

/// Latest causes and the abnormal-shutdown flag, as reported to the host.
/// Rebuilt at boot by replaying the persisted records in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CauseSummary {
    pub last_shutdown: Option<ShutdownCause>,
    pub last_wakeup: Option<WakeupCause>,
    pub abnormal: bool,
}

impl CauseSummary {
    pub const fn new() -> Self {
        CauseSummary {
            last_shutdown: None,
            last_wakeup: None,
            abnormal: false,
        }
    }

    pub fn apply(&mut self, cause: Cause) {
        match cause {
            Cause::Shutdown(c) => {
                self.last_shutdown = Some(c);
                self.abnormal |= c.is_abnormal();
            }
            Cause::Wakeup(c) => {
                self.last_wakeup = Some(c);
                // reaching S0 is the only thing that clears the flag
                if c == WakeupCause::Resume {
                    self.abnormal = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abnormal_bit() {
        assert_eq!(ShutdownCause::LongPress.code(), 0x1_0006);
        assert_eq!(ShutdownCause::Shutdown.code(), 0x01);
        assert_eq!(ShutdownCause::HostRequest.code() & ABNORMAL, 0);
        assert_eq!(Cause::from(ShutdownCause::V12Timeout).code(), 0x1_0046);
        assert!(!Cause::from(WakeupCause::AutoPowerOn).is_abnormal());
    }

    #[test]
    fn rail_loss_codes_are_distinct() {
        assert!(Cause::from(ShutdownCause::RailLossSuspend).is_abnormal());
        assert_ne!(
            ShutdownCause::RailLossSuspend.code(),
            ShutdownCause::RailLossOn.code()
        );
    }

    #[test]
    fn summary_tracks_abnormal_until_resume() {
        let mut summary = CauseSummary::new();
        summary.apply(ShutdownCause::LongPress.into());
        assert!(summary.abnormal);
        summary.apply(WakeupCause::ButtonPowerOn.into());
        assert!(summary.abnormal);
        summary.apply(WakeupCause::Resume.into());
        assert!(!summary.abnormal);
        assert_eq!(summary.last_shutdown, Some(ShutdownCause::LongPress));
        assert_eq!(summary.last_wakeup, Some(WakeupCause::Resume));

        summary.apply(ShutdownCause::Shutdown.into());
        assert!(!summary.abnormal);
    }
}
