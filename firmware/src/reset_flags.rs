//! Flags that survive a controller reset in the watchdog scratch registers.
//!
//! They tell the power button machine what to do with the host after the
//! controller restarts on its own initiative.

use bitflags::bitflags;
use cortex_m::peripheral::SCB;
use defmt::{Format, info};
use embassy_rp::pac;

const RESET_FLAGS_SCRATCH: usize = 0;
const MAGIC: u32 = 0xec5a_0000;
const MAGIC_MASK: u32 = 0xffff_0000;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResetFlags: u16 {
        /// Keep the host off after the reset.
        const AP_OFF = 1 << 0;
        /// Wait for the power button instead of applying the AC policy.
        const AP_IDLE = 1 << 1;
    }
}

impl Format for ResetFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ResetFlags({=u16:#x})", self.bits())
    }
}

/// Read and clear the flags left by the previous run.
pub fn take() -> ResetFlags {
    let scratch = pac::WATCHDOG.scratch(RESET_FLAGS_SCRATCH);
    let raw = scratch.read();
    scratch.write_value(0);
    if raw & MAGIC_MASK == MAGIC {
        ResetFlags::from_bits_truncate(raw as u16)
    } else {
        ResetFlags::empty()
    }
}

pub fn reset_with(flags: ResetFlags) -> ! {
    info!("Resetting controller with {:?}", flags);
    pac::WATCHDOG
        .scratch(RESET_FLAGS_SCRATCH)
        .write_value(MAGIC | flags.bits() as u32);
    SCB::sys_reset()
}
