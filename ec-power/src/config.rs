use embassy_time::Duration;

// Power sequencer defaults

pub const DEFAULT_RAIL_SETTLE_MS: u64 = 10;
pub const DEFAULT_SLP_SUS_TIMEOUT_MS: u64 = 2_000; // PCH drives SLP_SUS# after >95 ms
pub const DEFAULT_PGOOD_S5_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_V12_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_ALL_CORE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_PWRGD_140_DELAY_MS: u64 = 140;
pub const DEFAULT_SLP_S5_DELAY_MS: u64 = 40;
pub const DEFAULT_USB_SWITCH_DELAY_MS: u64 = 600;
pub const DEFAULT_FINGERPRINT_RESTORE_MS: u64 = 200;

// Power button defaults

pub const DEFAULT_DEBOUNCE_MS: u64 = 30;
pub const DEFAULT_PULSE_T0_MS: u64 = 32; // PCH requires >16 ms
/// Press-to-reassert time. The PCH's own override is 4 s; this board cuts it
/// to 64 ms so that the long-hold stages below are the only escalation.
pub const DEFAULT_PHASE1_MS: u64 = 64;
pub const DEFAULT_HOLD_FIRST_MS: u64 = 3_700;
pub const DEFAULT_HOLD_SECOND_MS: u64 = 6_300;
pub const DEFAULT_INITIAL_PULSE_MS: u64 = 200;
pub const DEFAULT_INIT_ON_RETRY_MS: u64 = 100;
pub const DEFAULT_INIT_ON_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_LAN_WAKE_DEBOUNCE_MS: u64 = 5;

// Software watchdog defaults

pub const MIN_WAKE_WATCHDOG_SECS: u16 = 15;
pub const WAKE_WATCHDOG_MAX_EXPIRIES: u8 = 5;
pub const WAKE_WATCHDOG_REPOWER_DELAY_MS: u64 = 5_000;

/// Timing of the rail sequences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerTiming {
    pub rail_settle: Duration,
    pub slp_sus_timeout: Duration,
    pub pgood_s5_timeout: Duration,
    pub v12_timeout: Duration,
    pub all_core_timeout: Duration,
    pub pwrgd_140_delay: Duration,
    pub slp_s5_delay: Duration,
    pub usb_switch_delay: Duration,
    pub fingerprint_restore: Duration,
}

impl PowerTiming {
    pub const fn new() -> Self {
        Self {
            rail_settle: Duration::from_millis(DEFAULT_RAIL_SETTLE_MS),
            slp_sus_timeout: Duration::from_millis(DEFAULT_SLP_SUS_TIMEOUT_MS),
            pgood_s5_timeout: Duration::from_millis(DEFAULT_PGOOD_S5_TIMEOUT_MS),
            v12_timeout: Duration::from_millis(DEFAULT_V12_TIMEOUT_MS),
            all_core_timeout: Duration::from_millis(DEFAULT_ALL_CORE_TIMEOUT_MS),
            pwrgd_140_delay: Duration::from_millis(DEFAULT_PWRGD_140_DELAY_MS),
            slp_s5_delay: Duration::from_millis(DEFAULT_SLP_S5_DELAY_MS),
            usb_switch_delay: Duration::from_millis(DEFAULT_USB_SWITCH_DELAY_MS),
            fingerprint_restore: Duration::from_millis(DEFAULT_FINGERPRINT_RESTORE_MS),
        }
    }
}

impl Default for PowerTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of the power button machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonTiming {
    pub debounce: Duration,
    /// Length of the first assert when the chipset is on.
    pub pulse_t0: Duration,
    /// Press-to-reassert time. Must be at least `pulse_t0`.
    pub phase1: Duration,
    pub hold_first: Duration,
    pub hold_second: Duration,
    /// Forced pulse used to wake a chipset that is off.
    pub initial_pulse: Duration,
    pub init_on_retry: Duration,
    pub init_on_timeout: Duration,
    pub lan_wake_debounce: Duration,
}

impl ButtonTiming {
    pub const fn new() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            pulse_t0: Duration::from_millis(DEFAULT_PULSE_T0_MS),
            phase1: Duration::from_millis(DEFAULT_PHASE1_MS),
            hold_first: Duration::from_millis(DEFAULT_HOLD_FIRST_MS),
            hold_second: Duration::from_millis(DEFAULT_HOLD_SECOND_MS),
            initial_pulse: Duration::from_millis(DEFAULT_INITIAL_PULSE_MS),
            init_on_retry: Duration::from_millis(DEFAULT_INIT_ON_RETRY_MS),
            init_on_timeout: Duration::from_millis(DEFAULT_INIT_ON_TIMEOUT_MS),
            lan_wake_debounce: Duration::from_millis(DEFAULT_LAN_WAKE_DEBOUNCE_MS),
        }
    }

    /// Use a different press-to-reassert time, e.g. 4 s on a chipset with the
    /// stock override timer.
    pub const fn with_phase1(mut self, phase1: Duration) -> Self {
        self.phase1 = phase1;
        self
    }
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self::new()
    }
}
