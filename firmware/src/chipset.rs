//! Chipset power API for the rest of the firmware.
//!
//! The power sequencer and the power button tasks own their machines; other
//! tasks reach them through the request channels and read back what the
//! owners publish here after every tick.

use ec_power::{
    ChipsetState, PowerRequest, PowerState, ShutdownCause, Timeout, release_progress,
};
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::BUTTON_TICK_MS;
use crate::tasks::power_sequencer::POWER_REQUEST_CHANNEL;

static POWER_STATE: AtomicU8 = AtomicU8::new(PowerState::Off as u8);
static BUTTON_PRESSED: AtomicBool = AtomicBool::new(false);
static BUTTON_STABLE: AtomicBool = AtomicBool::new(true);
static BUTTON_STATUS: AtomicU8 = AtomicU8::new(0);

pub fn publish_power_state(state: PowerState) {
    POWER_STATE.store(state as u8, Ordering::Relaxed);
}

pub fn current_power_state() -> PowerState {
    let raw = POWER_STATE.load(Ordering::Relaxed);
    PowerState::try_from(raw).unwrap_or(PowerState::Off)
}

pub fn chipset_state() -> ChipsetState {
    current_power_state().chipset_state()
}

/// Ask the OS to shut down by pressing the power button for it.
pub async fn force_shutdown(cause: ShutdownCause) {
    POWER_REQUEST_CHANNEL
        .send(PowerRequest::ForceShutdown(cause))
        .await;
}

/// Cut every rail immediately.
pub async fn force_power_off(cause: ShutdownCause) {
    POWER_REQUEST_CHANNEL
        .send(PowerRequest::ForcePowerOff(cause))
        .await;
}

pub fn publish_button(pressed: bool, stable: bool, status: u8) {
    BUTTON_PRESSED.store(pressed, Ordering::Relaxed);
    BUTTON_STABLE.store(stable, Ordering::Relaxed);
    BUTTON_STATUS.store(status, Ordering::Relaxed);
}

/// Debounced button level.
pub fn is_pressed() -> bool {
    BUTTON_PRESSED.load(Ordering::Relaxed)
}

/// Status bits as reported to the host.
pub fn button_status() -> u8 {
    BUTTON_STATUS.load(Ordering::Relaxed)
}

/// Wait until the button is released and debounced.
pub async fn wait_for_release(timeout: Duration) -> Result<(), Timeout> {
    let deadline = Instant::now() + timeout;
    loop {
        let stable = BUTTON_STABLE.load(Ordering::Relaxed);
        if let Some(result) = release_progress(stable, is_pressed(), Instant::now(), deadline) {
            return result;
        }
        Timer::after(Duration::from_millis(BUTTON_TICK_MS)).await;
    }
}
