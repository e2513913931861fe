use core::ops::Range;

use crate::config::{CAUSE_LOG_FLASH_SIZE, CONFIG_FLASH_SIZE, FLASH_SIZE};

/// The size of a page in bytes
pub const PAGE_SIZE: u32 = 0x0000_1000;

// Offsets from the start of the flash. memory.x keeps the program below
// the cause log.
const FLASH_END: u32 = FLASH_SIZE as u32;

pub const fn config_range() -> Range<u32> {
    (FLASH_END - CONFIG_FLASH_SIZE)..FLASH_END
}

pub const fn cause_log_range() -> Range<u32> {
    let end = config_range().start;
    (end - CAUSE_LOG_FLASH_SIZE)..end
}

const _: () = assert!(CONFIG_FLASH_SIZE % PAGE_SIZE == 0 && CONFIG_FLASH_SIZE >= 2 * PAGE_SIZE);
const _: () = assert!(CAUSE_LOG_FLASH_SIZE % PAGE_SIZE == 0);
