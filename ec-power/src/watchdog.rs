//! Host-armed software watchdogs, serviced once per second.
//!
//! The wake-up watchdog guards the boot: if the host does not disarm it
//! before it runs out, the system is shut down and powered back on. The
//! shutdown watchdog guards an OS shutdown that hangs.

use embassy_time::{Duration, Instant};

use crate::cause::ShutdownCause;
use crate::config::{
    MIN_WAKE_WATCHDOG_SECS, WAKE_WATCHDOG_MAX_EXPIRIES, WAKE_WATCHDOG_REPOWER_DELAY_MS,
};
use crate::power::ChipsetState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogAction {
    ForceShutdown(ShutdownCause),
    /// Pulse the power button to bring the system back up.
    PowerOnPulse,
}

#[derive(Debug, Default)]
pub struct WakeWatchdog {
    enabled: bool,
    remaining_secs: u16,
    expiries: u8,
    /// A watchdog shutdown is in progress; the host cannot re-arm or disarm.
    forcing: bool,
    repower_at: Option<Instant>,
}

impl WakeWatchdog {
    pub const fn new() -> Self {
        WakeWatchdog {
            enabled: false,
            remaining_secs: 0,
            expiries: 0,
            forcing: false,
            repower_at: None,
        }
    }

    pub fn arm(&mut self, secs: u16) {
        if self.forcing {
            return;
        }
        self.enabled = true;
        self.remaining_secs = secs.max(MIN_WAKE_WATCHDOG_SECS);
        info!("wake watchdog armed, {=u16} s", self.remaining_secs);
    }

    pub fn disarm(&mut self) {
        if self.forcing {
            return;
        }
        self.enabled = false;
        self.expiries = 0;
        info!("wake watchdog disarmed");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn expiries(&self) -> u8 {
        self.expiries
    }

    pub fn service(&mut self, now: Instant, chipset: ChipsetState) -> Option<WatchdogAction> {
        if chipset.is_any_off() {
            self.enabled = false;
        }

        let mut action = None;
        if self.enabled {
            if self.remaining_secs == 0 && chipset == ChipsetState::On {
                self.enabled = false;
                self.expiries += 1;
                self.forcing = true;
                warn!("wake watchdog expired, count {=u8}", self.expiries);
                action = Some(WatchdogAction::ForceShutdown(ShutdownCause::WakeWatchdog));
            } else {
                self.remaining_secs = self.remaining_secs.saturating_sub(1);
            }
            if self.expiries >= WAKE_WATCHDOG_MAX_EXPIRIES {
                warn!("wake watchdog gave up");
                self.enabled = false;
                self.expiries = 0;
                self.forcing = false;
            }
        }

        if self.forcing && chipset.is_any_off() {
            self.forcing = false;
            self.repower_at =
                Some(now + Duration::from_millis(WAKE_WATCHDOG_REPOWER_DELAY_MS));
        }

        if let Some(at) = self.repower_at {
            if now >= at {
                self.repower_at = None;
                return Some(WatchdogAction::PowerOnPulse);
            }
        }
        action
    }
}

#[derive(Debug, Default)]
pub struct ShutdownWatchdog {
    enabled: bool,
    timeout_secs: u16,
    elapsed_secs: u16,
}

impl ShutdownWatchdog {
    pub const fn new() -> Self {
        ShutdownWatchdog {
            enabled: false,
            timeout_secs: 0,
            elapsed_secs: 0,
        }
    }

    pub fn arm(&mut self, secs: u16) {
        self.enabled = true;
        self.timeout_secs = secs;
        self.elapsed_secs = 0;
        info!("shutdown watchdog armed, {=u16} s", secs);
    }

    pub fn disarm(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn service(&mut self, chipset: ChipsetState) -> Option<WatchdogAction> {
        if !self.enabled {
            return None;
        }
        if chipset == ChipsetState::Suspend || chipset.is_any_off() {
            self.disarm();
            return None;
        }
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        if self.elapsed_secs < self.timeout_secs {
            return None;
        }
        self.elapsed_secs = 0;
        if chipset == ChipsetState::On {
            warn!("shutdown watchdog expired after {=u16} s", self.timeout_secs);
            Some(WatchdogAction::ForceShutdown(ShutdownCause::ShutdownWatchdog))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Instant {
        Instant::from_secs(s)
    }

    #[test]
    fn wake_watchdog_minimum_and_expiry() {
        let mut wd = WakeWatchdog::new();
        wd.arm(3);
        let mut fired_at = None;
        for s in 0..30 {
            if let Some(action) = wd.service(secs(s), ChipsetState::On) {
                assert_eq!(
                    action,
                    WatchdogAction::ForceShutdown(ShutdownCause::WakeWatchdog)
                );
                fired_at = Some(s);
                break;
            }
        }
        assert_eq!(fired_at, Some(MIN_WAKE_WATCHDOG_SECS as u64));

        // host cannot interfere while the shutdown is in progress
        wd.disarm();
        assert_eq!(wd.expiries(), 1);

        assert_eq!(wd.service(secs(20), ChipsetState::SoftOff), None);
        assert_eq!(wd.service(secs(24), ChipsetState::SoftOff), None);
        assert_eq!(
            wd.service(secs(25), ChipsetState::SoftOff),
            Some(WatchdogAction::PowerOnPulse)
        );
        assert_eq!(wd.service(secs(26), ChipsetState::SoftOff), None);
    }

    #[test]
    fn wake_watchdog_disarmed_in_time() {
        let mut wd = WakeWatchdog::new();
        wd.arm(20);
        for s in 0..10 {
            assert_eq!(wd.service(secs(s), ChipsetState::On), None);
        }
        wd.disarm();
        for s in 10..60 {
            assert_eq!(wd.service(secs(s), ChipsetState::On), None);
        }
    }

    #[test]
    fn wake_watchdog_gives_up() {
        let mut wd = WakeWatchdog::new();
        let mut t = 0;
        for round in 1..=WAKE_WATCHDOG_MAX_EXPIRIES {
            wd.arm(15);
            loop {
                t += 1;
                if wd.service(secs(t), ChipsetState::On).is_some() {
                    break;
                }
            }
            if round < WAKE_WATCHDOG_MAX_EXPIRIES {
                assert_eq!(wd.expiries(), round);
                // system goes down and comes back
                wd.service(secs(t + 1), ChipsetState::SoftOff);
                assert_eq!(
                    wd.service(secs(t + 6), ChipsetState::SoftOff),
                    Some(WatchdogAction::PowerOnPulse)
                );
                t += 6;
            }
        }
        assert_eq!(wd.expiries(), 0);
        assert!(!wd.is_enabled());
        for s in t + 1..t + 20 {
            assert_eq!(wd.service(secs(s), ChipsetState::SoftOff), None);
        }
    }

    #[test]
    fn shutdown_watchdog() {
        let mut wd = ShutdownWatchdog::new();
        wd.arm(3);
        assert_eq!(wd.service(ChipsetState::On), None);
        assert_eq!(wd.service(ChipsetState::On), None);
        assert_eq!(
            wd.service(ChipsetState::On),
            Some(WatchdogAction::ForceShutdown(ShutdownCause::ShutdownWatchdog))
        );
        assert_eq!(wd.service(ChipsetState::Suspend), None);
        assert!(!wd.is_enabled());
    }
}
