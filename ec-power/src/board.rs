//! Board seam. The state machines never touch pins directly: they go through
//! the traits here, which the firmware implements on top of its GPIO and
//! which the tests implement on a simulated board.

use crate::cause::Cause;
use crate::signals::PowerSignals;

/// Electrical level of an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// Rail enables and pass-through signals driven by the power sequencer.
/// Names follow the schematic nets; `L` suffixed nets are active low.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rail {
    /// 3.3 V / 5 V always-on switches (ALW_EN and 3VSBSW).
    AlwEn,
    DswPwrokEn,
    Aux1v8En,
    PchRsmrstL,
    PsonL,
    /// USB-A port power.
    UsbPwrEnL,
    /// Fingerprint keyboard port power.
    FingerprintUsbEnL,
    /// Fingerprint keyboard USB mux; high routes the port to the host.
    UsbSwitchToHost,
    /// SLP_S3/SLP_S5 pass-through to the companion MCU.
    CompanionSlp,
    EcSlpS5L,
    EcSlpS4L,
    EcSlpS3L,
    EcSlpS3PqL,
    VccstPwrgd,
    PchPwrgd,
    SysResetL,
    Pwrgd140ms,
    /// PROCHOT and NMI side-band lines, released when standby power is up.
    SidebandL,
}

impl Rail {
    pub const ALL: [Rail; 18] = [
        Rail::AlwEn,
        Rail::DswPwrokEn,
        Rail::Aux1v8En,
        Rail::PchRsmrstL,
        Rail::PsonL,
        Rail::UsbPwrEnL,
        Rail::FingerprintUsbEnL,
        Rail::UsbSwitchToHost,
        Rail::CompanionSlp,
        Rail::EcSlpS5L,
        Rail::EcSlpS4L,
        Rail::EcSlpS3L,
        Rail::EcSlpS3PqL,
        Rail::VccstPwrgd,
        Rail::PchPwrgd,
        Rail::SysResetL,
        Rail::Pwrgd140ms,
        Rail::SidebandL,
    ];

    /// Level the rail is parked at in G3.
    pub fn off_level(self) -> Level {
        match self {
            Rail::PsonL | Rail::UsbPwrEnL | Rail::FingerprintUsbEnL => Level::High,
            _ => Level::Low,
        }
    }

    /// Level that delivers power or passes the signal on.
    pub fn on_level(self) -> Level {
        match self.off_level() {
            Level::High => Level::Low,
            Level::Low => Level::High,
        }
    }
}

/// Lifecycle notifications for thermal, LED and other consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hook {
    /// Standby rails are up and RSMRST is released.
    PreInit,
    /// 12 V is being enabled; fans may spin up.
    RailsAvailable,
    Startup,
    Resume,
    Suspend,
    SuspendComplete,
    Shutdown,
    ShutdownComplete,
}

/// Signal reader and rail driver used by the power sequencer.
pub trait PowerBoard {
    fn read_signals(&mut self) -> PowerSignals;

    /// Idempotent.
    fn set_rail(&mut self, rail: Rail, level: Level);

    fn notify(&mut self, hook: Hook);

    /// Park board pins that would otherwise leak into an unpowered chipset
    /// and mask interrupts from parts that just lost power.
    fn park_low_leakage(&mut self) {}
}

/// Strategy for the virtual power button towards the PCH.
pub trait PowerButtonBoard {
    /// Drive PWRBTN# to the PCH. `high` is the released level.
    fn set_pwrbtn_to_pch(&mut self, high: bool);

    /// Whether the supply can sustain a power-on right now.
    fn power_source_ready(&self) -> bool {
        true
    }

    /// Last-resort reset of the whole system, used by the long-hold
    /// escalation. Never returns on real hardware.
    fn system_reset(&mut self);
}

/// Append-only shutdown/wakeup cause log. Recording
/// [`WakeupCause::Resume`](crate::WakeupCause::Resume) is what clears the
/// abnormal-shutdown flag, see [`CauseSummary`](crate::cause::CauseSummary).
pub trait CauseLog {
    fn record(&mut self, cause: Cause);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_low_rails_park_high() {
        assert_eq!(Rail::PsonL.off_level(), Level::High);
        assert_eq!(Rail::PsonL.on_level(), Level::Low);
        assert_eq!(Rail::PchRsmrstL.off_level(), Level::Low);
        assert_eq!(Rail::AlwEn.on_level(), Level::High);
    }

    #[test]
    fn rail_table_is_complete() {
        let mut rails = Rail::ALL;
        rails.sort();
        for pair in rails.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }
}
