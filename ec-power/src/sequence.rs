//! Rail sequences as data. Each transitional power state owns a
//! [`SequenceRun`] that is polled once per tick; waits and delays suspend the
//! run until a later tick instead of blocking the task.

use alloc::vec;
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

use crate::board::{Hook, Level, Rail};
use crate::cause::{Cause, ShutdownCause};
use crate::config::PowerTiming;
use crate::signals::PowerSignals;

/// Side-band work that runs a fixed time after a sequence step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Deferred {
    /// Hand the fingerprint keyboard over to the host once it is running.
    UsbSwitchToHost,
    /// Power the fingerprint keyboard port back up after a shutdown.
    FingerprintPowerRestore,
}

/// Requests from the power sequencer to the power button machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonRequest {
    /// Assert PWRBTN# without a physical press.
    PchPress,
    /// Deassert PWRBTN#, eating the next real release if the button is down.
    PchRelease,
    /// Forget the long-hold latch.
    ClearHoldLatch,
}

/// Output of the power state machine, applied to the board by its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Set(Rail, Level),
    Notify(Hook),
    Record(Cause),
    Defer(Deferred, Duration),
    CancelDeferred,
    ParkLowLeakage,
    Button(ButtonRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Set(Rail, Level),
    Delay(Duration),
    /// Wait for every bit in `signals`; give up with `failure` after `timeout`.
    WaitFor {
        signals: PowerSignals,
        timeout: Duration,
        failure: ShutdownCause,
    },
    Notify(Hook),
    Defer(Deferred, Duration),
}

fn on(rail: Rail) -> Step {
    Step::Set(rail, rail.on_level())
}

fn off(rail: Rail) -> Step {
    Step::Set(rail, rail.off_level())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Done,
    Failed(ShutdownCause),
}

#[derive(Debug)]
pub struct SequenceRun {
    steps: Vec<Step>,
    pc: usize,
    step_started: Option<Instant>,
}

impl SequenceRun {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            pc: 0,
            step_started: None,
        }
    }

    /// Nothing has been executed yet.
    pub fn is_fresh(&self) -> bool {
        self.pc == 0 && self.step_started.is_none()
    }

    /// Execute steps until one has to wait.
    pub fn poll(&mut self, now: Instant, signals: PowerSignals, out: &mut Vec<Action>) -> Progress {
        while let Some(step) = self.steps.get(self.pc).copied() {
            match step {
                Step::Set(rail, level) => out.push(Action::Set(rail, level)),
                Step::Notify(hook) => out.push(Action::Notify(hook)),
                Step::Defer(work, delay) => out.push(Action::Defer(work, delay)),
                Step::Delay(delay) => {
                    let started = *self.step_started.get_or_insert(now);
                    if now.saturating_duration_since(started) < delay {
                        return Progress::Pending;
                    }
                }
                Step::WaitFor {
                    signals: required,
                    timeout,
                    failure,
                } => {
                    if !signals.has(required) {
                        let started = *self.step_started.get_or_insert(now);
                        if now.saturating_duration_since(started) >= timeout {
                            warn!(
                                "timed out waiting for {=u16:#x}, have {=u16:#x}",
                                required.bits(),
                                signals.bits()
                            );
                            return Progress::Failed(failure);
                        }
                        return Progress::Pending;
                    }
                }
            }
            self.pc += 1;
            self.step_started = None;
        }
        Progress::Done
    }
}

/// G3 -> S5: standby rails, then RSMRST once the PCH reports standby power.
pub fn g3_to_s5(t: &PowerTiming) -> Vec<Step> {
    vec![
        on(Rail::AlwEn),
        Step::Delay(t.rail_settle),
        on(Rail::DswPwrokEn),
        Step::WaitFor {
            signals: PowerSignals::SLP_SUS_N,
            timeout: t.slp_sus_timeout,
            failure: ShutdownCause::SlpSusTimeout,
        },
        on(Rail::Aux1v8En),
        on(Rail::SidebandL),
        on(Rail::FingerprintUsbEnL),
        off(Rail::UsbSwitchToHost),
        off(Rail::CompanionSlp),
        Step::Delay(t.rail_settle),
        Step::WaitFor {
            signals: PowerSignals::PGOOD_S5,
            timeout: t.pgood_s5_timeout,
            failure: ShutdownCause::StandbyPgoodTimeout,
        },
        Step::Delay(t.rail_settle),
        on(Rail::PchRsmrstL),
        Step::Notify(Hook::PreInit),
    ]
}

/// S5 -> S3: 12 V and USB power.
pub fn s5_to_s3(_t: &PowerTiming) -> Vec<Step> {
    vec![
        Step::Notify(Hook::RailsAvailable),
        on(Rail::PsonL),
        on(Rail::UsbPwrEnL),
        on(Rail::CompanionSlp),
        Step::Notify(Hook::Startup),
    ]
}

/// Run from S3 once SLP_S3# is released: sleep pass-throughs and 12 V.
pub fn s3_exit(t: &PowerTiming) -> Vec<Step> {
    vec![
        Step::Notify(Hook::RailsAvailable),
        on(Rail::PsonL),
        on(Rail::EcSlpS5L),
        on(Rail::EcSlpS4L),
        Step::WaitFor {
            signals: PowerSignals::V12_PGOOD,
            timeout: t.v12_timeout,
            failure: ShutdownCause::V12Timeout,
        },
        on(Rail::EcSlpS3L),
        Step::Delay(t.rail_settle),
        on(Rail::EcSlpS3PqL),
        Step::Delay(t.rail_settle),
        on(Rail::VccstPwrgd),
    ]
}

/// S3 -> S0: core power-good, then the staged PCH power-good signals.
pub fn s3_to_s0(t: &PowerTiming) -> Vec<Step> {
    vec![
        Step::WaitFor {
            signals: PowerSignals::ALL_CORE,
            timeout: t.all_core_timeout,
            failure: ShutdownCause::AllCoreTimeout,
        },
        Step::Delay(t.rail_settle),
        on(Rail::PchPwrgd),
        on(Rail::SysResetL),
        Step::Delay(t.pwrgd_140_delay),
        on(Rail::Pwrgd140ms),
        Step::Notify(Hook::Resume),
        Step::Defer(Deferred::UsbSwitchToHost, t.usb_switch_delay),
    ]
}

/// S0 -> S3. The suspend hook has already run.
pub fn s0_to_s3(_t: &PowerTiming) -> Vec<Step> {
    vec![
        off(Rail::PsonL),
        off(Rail::Pwrgd140ms),
        off(Rail::PchPwrgd),
        off(Rail::VccstPwrgd),
        off(Rail::EcSlpS3L),
        off(Rail::EcSlpS3PqL),
        Step::Notify(Hook::SuspendComplete),
    ]
}

/// S3 -> S5.
pub fn s3_to_s5(t: &PowerTiming) -> Vec<Step> {
    vec![
        Step::Notify(Hook::Shutdown),
        off(Rail::PsonL),
        off(Rail::UsbPwrEnL),
        off(Rail::FingerprintUsbEnL),
        Step::Defer(Deferred::FingerprintPowerRestore, t.fingerprint_restore),
        off(Rail::CompanionSlp),
        off(Rail::UsbSwitchToHost),
        off(Rail::EcSlpS4L),
        Step::Delay(t.slp_s5_delay),
        off(Rail::EcSlpS5L),
        Step::Notify(Hook::ShutdownComplete),
    ]
}

/// Every rail to its G3 level. Safe to emit from any state, any number of
/// times.
pub fn force_off(out: &mut Vec<Action>) {
    out.push(Action::CancelDeferred);
    out.extend(Rail::ALL.iter().map(|r| Action::Set(*r, r.off_level())));
    out.push(Action::ParkLowLeakage);
    out.push(Action::Button(ButtonRequest::ClearHoldLatch));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn delay_spans_ticks() {
        let mut run = SequenceRun::new(vec![
            on(Rail::AlwEn),
            Step::Delay(Duration::from_millis(10)),
            on(Rail::DswPwrokEn),
        ]);
        let mut out = Vec::new();
        assert!(run.is_fresh());
        assert_eq!(run.poll(at(0), PowerSignals::empty(), &mut out), Progress::Pending);
        assert_eq!(out, vec![Action::Set(Rail::AlwEn, Level::High)]);
        assert_eq!(run.poll(at(5), PowerSignals::empty(), &mut out), Progress::Pending);
        assert_eq!(out.len(), 1);
        assert_eq!(run.poll(at(10), PowerSignals::empty(), &mut out), Progress::Done);
        assert_eq!(out[1], Action::Set(Rail::DswPwrokEn, Level::High));
    }

    #[test]
    fn wait_times_out_with_its_own_cause() {
        let t = PowerTiming::new();
        let mut run = SequenceRun::new(s3_to_s0(&t));
        let mut out = Vec::new();
        assert_eq!(run.poll(at(0), PowerSignals::ATX_PG, &mut out), Progress::Pending);
        assert_eq!(
            run.poll(at(999), PowerSignals::ATX_PG, &mut out),
            Progress::Pending
        );
        assert_eq!(
            run.poll(at(1000), PowerSignals::ATX_PG, &mut out),
            Progress::Failed(ShutdownCause::AllCoreTimeout)
        );
        assert!(out.is_empty());
    }

    #[test]
    fn wait_passes_as_soon_as_signals_are_up() {
        let t = PowerTiming::new();
        let mut run = SequenceRun::new(s3_exit(&t));
        let mut out = Vec::new();
        assert_eq!(
            run.poll(at(0), PowerSignals::V12_PGOOD, &mut out),
            Progress::Pending
        );
        assert!(out.contains(&Action::Set(Rail::EcSlpS3L, Level::High)));
        assert!(!out.contains(&Action::Set(Rail::VccstPwrgd, Level::High)));
        run.poll(at(10), PowerSignals::V12_PGOOD, &mut out);
        assert_eq!(
            run.poll(at(20), PowerSignals::V12_PGOOD, &mut out),
            Progress::Done
        );
        assert_eq!(out.last(), Some(&Action::Set(Rail::VccstPwrgd, Level::High)));
    }

    #[test]
    fn force_off_parks_every_rail() {
        let mut out = Vec::new();
        force_off(&mut out);
        for rail in Rail::ALL {
            assert!(out.contains(&Action::Set(rail, rail.off_level())));
        }
    }
}
