//! Host register protocol spoken over the I2C secondary interface.
//!
//! Reads are a register write followed by a read (`WriteRead`), writes are
//! the register followed by its payload. Multi-byte values are big-endian.
//!
//! | Reg  | Read                              | Write                               |
//! |------|-----------------------------------|-------------------------------------|
//! | 0x03 | hardware version, 4 bytes         |                                     |
//! | 0x04 | firmware version, 4 bytes         |                                     |
//! | 0x10 | power state                       |                                     |
//! | 0x11 | button status bits                |                                     |
//! | 0x12 | wake watchdog: enabled, expiries  |                                     |
//! | 0x13 | AC recovery policy                | policy (1 on, 2 off, 3 previous)    |
//! | 0x14 |                                   | pulse enable (0/1)                  |
//! | 0x15 |                                   | button lock (0/1)                   |
//! | 0x16 |                                   | watchdog: type, op, seconds (u16)   |
//! | 0x17 | LED brightness                    | LED brightness                      |
//! | 0x18 | LAN wake enable                   | LAN wake enable (0/1)               |
//! | 0x20 | last shutdown cause, u32          |                                     |
//! | 0x21 | last wakeup cause, u32            |                                     |
//! | 0x22 | abnormal shutdown flag            |                                     |
//! | 0x23 | MCU temperature, centi-kelvin u16 |                                     |
//! | 0x24 | 12 V rail, millivolts u16         |                                     |
//! | 0x30 |                                   | force shutdown                      |
//! | 0x31 |                                   | force power off                     |
//! | 0x32 |                                   | power on                            |
//! | 0x33 |                                   | simulated press (1) / release (0)   |
//! | 0x34 |                                   | reset the controller                |
//! | 0x50 | echo of the payload, reversed     |                                     |

use crate::policy::AcRecoveryPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    TooShort,
    UnknownRegister(u8),
    InvalidValue(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Query {
    HwVersion,
    FwVersion,
    PowerState,
    ButtonStatus,
    WakeWatchdog,
    AcRecoveryPolicy,
    LedBrightness,
    LanWake,
    LastShutdownCause,
    LastWakeupCause,
    AbnormalShutdown,
    McuTemperature,
    Rail12V,
    Ping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogCommand {
    ArmWake(u16),
    DisarmWake,
    ArmShutdown(u16),
    DisarmShutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    ForceShutdown,
    ForcePowerOff,
    PowerOn,
    SimulatePress(bool),
    /// Restart the controller once the power button is released.
    ResetController,
    SetAcRecoveryPolicy(AcRecoveryPolicy),
    SetPulseEnabled(bool),
    SetButtonLock(bool),
    Watchdog(WatchdogCommand),
    SetLedBrightness(u8),
    SetLanWake(bool),
}

pub fn parse_query(reg: u8) -> Result<Query, CommandError> {
    Ok(match reg {
        0x03 => Query::HwVersion,
        0x04 => Query::FwVersion,
        0x10 => Query::PowerState,
        0x11 => Query::ButtonStatus,
        0x12 => Query::WakeWatchdog,
        0x13 => Query::AcRecoveryPolicy,
        0x17 => Query::LedBrightness,
        0x18 => Query::LanWake,
        0x20 => Query::LastShutdownCause,
        0x21 => Query::LastWakeupCause,
        0x22 => Query::AbnormalShutdown,
        0x23 => Query::McuTemperature,
        0x24 => Query::Rail12V,
        0x50 => Query::Ping,
        other => return Err(CommandError::UnknownRegister(other)),
    })
}

fn flag(value: u8) -> Result<bool, CommandError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CommandError::InvalidValue(other)),
    }
}

/// Decode a register write. `buf` starts with the register.
pub fn parse_write(buf: &[u8]) -> Result<Command, CommandError> {
    let (&reg, payload) = buf.split_first().ok_or(CommandError::TooShort)?;
    let first = || payload.first().copied().ok_or(CommandError::TooShort);

    Ok(match reg {
        0x13 => {
            let value = first()?;
            let policy =
                AcRecoveryPolicy::try_from(value).map_err(CommandError::InvalidValue)?;
            Command::SetAcRecoveryPolicy(policy)
        }
        0x14 => Command::SetPulseEnabled(flag(first()?)?),
        0x15 => Command::SetButtonLock(flag(first()?)?),
        0x16 => {
            let [kind, op, hi, lo] = payload
                .get(..4)
                .and_then(|p| <[u8; 4]>::try_from(p).ok())
                .ok_or(CommandError::TooShort)?;
            let secs = u16::from_be_bytes([hi, lo]);
            let cmd = match (kind, op) {
                (1, 1) => WatchdogCommand::ArmWake(secs),
                (1, 2) => WatchdogCommand::DisarmWake,
                (2, 1) => WatchdogCommand::ArmShutdown(secs),
                (2, 2) => WatchdogCommand::DisarmShutdown,
                (1 | 2, op) => return Err(CommandError::InvalidValue(op)),
                (kind, _) => return Err(CommandError::InvalidValue(kind)),
            };
            Command::Watchdog(cmd)
        }
        0x17 => Command::SetLedBrightness(first()?),
        0x18 => Command::SetLanWake(flag(first()?)?),
        0x30 => Command::ForceShutdown,
        0x31 => Command::ForcePowerOff,
        0x32 => Command::PowerOn,
        0x33 => Command::SimulatePress(flag(first()?)?),
        0x34 => Command::ResetController,
        other => return Err(CommandError::UnknownRegister(other)),
    })
}

/// Bits returned by [`Query::ButtonStatus`].
pub fn button_status(pressed: bool, pulse_enabled: bool, locked: bool, hold_latched: bool) -> u8 {
    (pressed as u8) | (pulse_enabled as u8) << 1 | (locked as u8) << 2 | (hold_latched as u8) << 3
}
