pub const I2C_ADDR: u8 = 0x6d; // I2C address for the host interface
pub const EXPANDER_ADDR: u8 = 0x20; // PCA9555 carrying the slow side-band rails

pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

// Both ranges sit at the top of the flash, below nothing else.
pub const CONFIG_FLASH_SIZE: u32 = 16 * 1024;
pub const CAUSE_LOG_FLASH_SIZE: u32 = 32 * 1024;

// Task periods
pub const POWER_TICK_MS: u64 = 1;
pub const BUTTON_TICK_MS: u64 = 1;
pub const ANALOG_SAMPLE_MS: u64 = 20;
pub const SOFT_WATCHDOG_PERIOD_MS: u64 = 1_000;
pub const LED_UPDATE_MS: u64 = 10;

pub const HW_WATCHDOG_TIMEOUT_MS: u64 = 8_000;

// Analog inputs
pub const V12_MAX_VALUE: f32 = 19.8; // V at full ADC scale, 100k/20k divider
pub const VIN_MAX_VALUE: f32 = 40.0; // V at full ADC scale
pub const V12_PGOOD_MIN: f32 = 11.4; // V; -5 % of nominal
pub const V12_PGOOD_MAX: f32 = 12.6; // V; +5 % of nominal
pub const VIN_READY_THRESHOLD: f32 = 10.8; // V; below this a power-on is refused

// Thermal emergency, in kelvin
pub const THERMAL_SHUTDOWN_TEMPERATURE: f32 = 273.15 + 95.0;
pub const THERMAL_RELEASE_TEMPERATURE: f32 = 273.15 + 85.0;

// Controller reset requested by the host waits this long for the button
pub const RESET_RELEASE_TIMEOUT_MS: u64 = 1_000;

pub const MAX_CAUSE_LOG_QUEUE_DEPTH: usize = 8;

// Persisted settings
pub const AC_RECOVERY_POLICY_CONFIG_KEY: u16 = 0x2001;
pub const LAST_POWER_STATE_CONFIG_KEY: u16 = 0x2002;
pub const MFG_MODE_CONFIG_KEY: u16 = 0x2003;
pub const LAN_WAKE_CONFIG_KEY: u16 = 0x2004;

pub const LED_BRIGHTNESS_CONFIG_KEY: u16 = 0x1001;
pub const DEFAULT_LED_BRIGHTNESS: u8 = 0x30;

pub const HARDWARE_VERSION_CONFIG_KEY: u16 = 0x100c;
pub const DEFAULT_HARDWARE_VERSION: u32 = 0xffff_ffff; // Reported when the board was never provisioned

pub const FW_VERSION_STR: &str = "0.3.0";

/// Parse "x.y.z" or "x.y.z-aN" into [major, minor, patch, alpha]. Stable
/// releases report 0xff as the alpha number.
const fn parse_version(ver: &str) -> [u8; 4] {
    let bytes = ver.as_bytes();
    let mut out = [0u8, 0, 0, 0xff];
    let mut field = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'.' => field += 1,
            b'-' => {
                field = 3;
                out[3] = 0;
                if i + 1 < bytes.len() && bytes[i + 1] == b'a' {
                    i += 1;
                }
            }
            digit => out[field] = out[field] * 10 + (digit - b'0'),
        }
        i += 1;
    }
    out
}

pub const FW_VERSION: [u8; 4] = parse_version(FW_VERSION_STR);
