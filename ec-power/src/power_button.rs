//! Power button: debounce, pulse stretching towards the PCH and long-hold
//! escalation.
//!
//! The PCH starts its own hard-reset timer while PWRBTN# is low. To keep
//! control of the override here, a press seen while the chipset is on is
//! sent as a short pulse, then released until `phase1` after the press, and
//! only then asserted for the rest of the hold:
//!
//! ```text
//!   button   ---                      ----
//!              |______________________|
//!
//!   PWRBTN#  ---  ---------           ----
//!   to PCH     |__|       |___________|
//!               t0    t1    held down
//! ```

use alloc::vec::Vec;
use embassy_time::{Duration, Instant};
use statig::prelude::*;

use crate::board::{CauseLog, Hook, PowerButtonBoard};
use crate::cause::{Cause, ShutdownCause, WakeupCause};
use crate::config::ButtonTiming;
use crate::policy::{BootAction, BootInfo, boot_action};
use crate::power::{ChipsetState, PowerRequest};
use crate::sequence::ButtonRequest;

/// `wait_for_release` gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout;

/// One step of `wait_for_release`: `None` means keep waiting.
pub fn release_progress(
    stable: bool,
    pressed: bool,
    now: Instant,
    deadline: Instant,
) -> Option<Result<(), Timeout>> {
    if stable && !pressed {
        Some(Ok(()))
    } else if now >= deadline {
        warn!("power button not released in time");
        Some(Err(Timeout))
    } else {
        None
    }
}

/// Accepts a new level only once the raw input has been quiet for a full
/// window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    accepted: bool,
    stable: bool,
    recheck_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration, initial: bool) -> Self {
        Debouncer {
            window,
            accepted: initial,
            stable: true,
            recheck_at: None,
        }
    }

    /// Raw edge: restart the window.
    pub fn on_edge(&mut self, now: Instant) {
        self.stable = false;
        self.recheck_at = Some(now + self.window);
    }

    /// Re-check on the next poll without waiting for a window.
    pub fn recheck_now(&mut self, now: Instant) {
        self.stable = false;
        self.recheck_at = Some(now);
    }

    /// Returns the new level if the accepted level changed.
    pub fn poll(&mut self, now: Instant, raw: bool) -> Option<bool> {
        match self.recheck_at {
            Some(at) if now >= at => {
                self.recheck_at = None;
                self.stable = true;
                if raw == self.accepted {
                    None
                } else {
                    self.accepted = raw;
                    Some(raw)
                }
            }
            _ => None,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }
}

/// Conditions applied to the button before debouncing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawConditions {
    /// Host-simulated press.
    pub simulate: bool,
    /// Host has locked the button.
    pub locked: bool,
    pub lid_open: bool,
    /// Boards without a lid switch report the button through a closed lid.
    pub ignore_lid: bool,
}

impl Default for RawConditions {
    fn default() -> Self {
        RawConditions {
            simulate: false,
            locked: false,
            lid_open: true,
            ignore_lid: false,
        }
    }
}

impl RawConditions {
    pub fn pressed(&self, asserted: bool) -> bool {
        if self.simulate {
            true
        } else if self.locked {
            false
        } else if !self.ignore_lid && !self.lid_open {
            // a squashed lid must not wake the system
            false
        } else {
            asserted
        }
    }
}

/// Observable state of the button machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonState {
    Idle,
    Pressed,
    PulseT0,
    PulseT1,
    Held,
    HeldExtended,
    Released,
    EatRelease,
    InitOn,
    BootKbReset,
    WasOff,
    LidOpen,
    LanWake,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonAction {
    /// PWRBTN# level towards the PCH; `true` is released.
    SetPwrbtn(bool),
    Record(Cause),
    ExitHardOff,
    SystemReset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Tick,
    /// The debounced level changed; the new level is in the context.
    Changed,
    PchPress,
    PchRelease,
    LidOpened,
    LanWake,
    /// Power the chipset on without a press, e.g. for the host or a watchdog.
    WakePulse(WakeupCause),
    Boot(BootAction),
}

pub struct Context {
    pub now: Instant,
    pub chipset: ChipsetState,
    /// Debounced button level.
    pub pressed: bool,
    pub timing: ButtonTiming,
    pub pulse_enabled: bool,
    /// Set by the first long-hold threshold until the rails are dropped.
    pub hold_latched: bool,
    pub power_source_ready: bool,
    pub task_start: Instant,
    pub actions: Vec<ButtonAction>,
}

impl Context {
    pub fn new(timing: ButtonTiming) -> Self {
        Context {
            now: Instant::from_ticks(0),
            chipset: ChipsetState::HardOff,
            pressed: false,
            timing,
            pulse_enabled: true,
            hold_latched: false,
            power_source_ready: true,
            task_start: Instant::from_ticks(0),
            actions: Vec::new(),
        }
    }

    fn assert_pwrbtn(&mut self) {
        self.actions.push(ButtonAction::SetPwrbtn(false));
    }

    fn release_pwrbtn(&mut self) {
        self.actions.push(ButtonAction::SetPwrbtn(true));
    }

    fn record(&mut self, cause: impl Into<Cause>) {
        self.actions.push(ButtonAction::Record(cause.into()));
    }

    /// Wake a chipset that is off with a fixed-length pulse.
    fn forced_pulse(&mut self) -> Instant {
        self.actions.push(ButtonAction::ExitHardOff);
        self.assert_pwrbtn();
        self.now + self.timing.initial_pulse
    }
}

#[derive(Debug, Default)]
pub struct ButtonMachine {}

#[state_machine(
    initial = "State::idle()",
    before_transition = "Self::before_transition",
    state(derive(Debug)),
    superstate(derive(Debug))
)]
impl ButtonMachine {
    fn before_transition(&mut self, source: &State, target: &State) {
        debug!(
            "button {:?} -> {:?}",
            source.button_state(),
            target.button_state()
        );
    }

    #[state(superstate = "responsive")]
    fn idle(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Boot(BootAction::Mirror) => {
                if context.pressed && context.pulse_enabled {
                    context.assert_pwrbtn();
                }
                Handled
            }
            Event::Boot(BootAction::InitOn) => Transition(State::init_on(context.now)),
            Event::Boot(BootAction::ForceRelease) => {
                context.release_pwrbtn();
                if context.pressed {
                    Transition(State::eat_release())
                } else {
                    Handled
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn pressed(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                let now = context.now;
                if context.chipset.is_any_off() {
                    // stretch the first pulse so the chipset can wake up
                    // before the user lets go
                    context.record(WakeupCause::ButtonPowerOn);
                    let until = context.forced_pulse();
                    Transition(State::was_off(until))
                } else if context.pulse_enabled {
                    context.assert_pwrbtn();
                    Transition(State::pulse_t0(now))
                } else {
                    Transition(State::pulse_t1(now))
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn pulse_t0(pressed_at: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *pressed_at + context.timing.pulse_t0 => {
                context.release_pwrbtn();
                Transition(State::pulse_t1(*pressed_at))
            }
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn pulse_t1(pressed_at: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *pressed_at + context.timing.phase1 => {
                if context.chipset.is_any_off() {
                    info!("chipset already off");
                } else {
                    context.assert_pwrbtn();
                }
                Transition(State::held(context.now + context.timing.hold_first))
            }
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn held(deadline: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *deadline => {
                warn!("power button held, first threshold");
                context.record(ShutdownCause::LongPress);
                context.hold_latched = true;
                Transition(State::held_extended(Some(
                    context.now + context.timing.hold_second,
                )))
            }
            _ => Super,
        }
    }

    /// Terminal once the second threshold has fired.
    #[state(superstate = "responsive")]
    fn held_extended(
        deadline: &mut Option<Instant>,
        event: &Event,
        context: &mut Context,
    ) -> Outcome<State> {
        match (event, *deadline) {
            (Event::Tick, Some(at)) if context.now >= at => {
                error!("power button held, resetting the system");
                context.record(ShutdownCause::LongPressReset);
                context.actions.push(ButtonAction::SystemReset);
                *deadline = None;
                Handled
            }
            (_, None) => Handled,
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn released(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                context.release_pwrbtn();
                Transition(State::idle())
            }
            _ => Super,
        }
    }

    #[state(superstate = "responsive")]
    fn eat_release(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Changed if !context.pressed => {
                debug!("ignoring release");
                Transition(State::idle())
            }
            _ => Super,
        }
    }

    #[state(superstate = "forced_pulse")]
    fn init_on(next_check: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *next_check => {
                let now = context.now;
                if !context.power_source_ready {
                    if now.saturating_duration_since(context.task_start)
                        > context.timing.init_on_timeout
                    {
                        warn!("power source not ready, giving up on power-on");
                        return Transition(State::idle());
                    }
                    *next_check = now + context.timing.init_on_retry;
                    return Handled;
                }
                context.record(WakeupCause::AutoPowerOn);
                let until = context.forced_pulse();
                Transition(State::boot_kb_reset(until))
            }
            // wake pulses would cut the power-on short
            Event::LidOpened | Event::LanWake | Event::WakePulse(_) => Handled,
            _ => Super,
        }
    }

    #[state(superstate = "forced_pulse")]
    fn boot_kb_reset(deadline: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *deadline => {
                context.release_pwrbtn();
                if context.pressed {
                    Transition(State::eat_release())
                } else {
                    Transition(State::idle())
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "forced_pulse")]
    fn was_off(deadline: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *deadline => {
                if context.pressed {
                    Transition(State::held(context.now + context.timing.hold_first))
                } else {
                    Transition(State::released())
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "forced_pulse")]
    fn lid_open(deadline: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *deadline => {
                context.release_pwrbtn();
                Transition(State::idle())
            }
            _ => Super,
        }
    }

    #[state(superstate = "forced_pulse")]
    fn lan_wake(deadline: &mut Instant, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick if context.now >= *deadline => {
                context.release_pwrbtn();
                Transition(State::idle())
            }
            _ => Super,
        }
    }

    /// Follows the debounced button.
    #[superstate(superstate = "any")]
    fn responsive(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Changed if context.pressed => Transition(State::pressed()),
            Event::Changed => Transition(State::released()),
            _ => Super,
        }
    }

    /// A forced pulse is in progress; the real button is ignored.
    #[superstate(superstate = "any")]
    fn forced_pulse(event: &Event) -> Outcome<State> {
        match event {
            Event::Changed => {
                debug!("ignoring button change");
                Handled
            }
            _ => Super,
        }
    }

    #[superstate]
    fn any(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::PchPress => {
                if !context.pressed {
                    context.assert_pwrbtn();
                }
                Handled
            }
            Event::PchRelease => {
                context.release_pwrbtn();
                if context.pressed {
                    Transition(State::eat_release())
                } else {
                    Transition(State::idle())
                }
            }
            Event::LidOpened if context.chipset.is_any_off() => {
                context.record(WakeupCause::LidOpen);
                let until = context.forced_pulse();
                Transition(State::lid_open(until))
            }
            // Host and watchdog power-on pulses share the lid-open pulse
            // state, so `state()` reports `LidOpen` while they run.
            Event::WakePulse(cause) if context.chipset.is_any_off() => {
                context.record(*cause);
                let until = context.forced_pulse();
                Transition(State::lid_open(until))
            }
            Event::LanWake
                if matches!(context.chipset, ChipsetState::Suspend | ChipsetState::SoftOff)
                    && !context.hold_latched =>
            {
                context.record(WakeupCause::LanWake);
                let until = context.forced_pulse();
                Transition(State::lan_wake(until))
            }
            _ => Handled,
        }
    }
}

impl State {
    pub fn button_state(&self) -> ButtonState {
        match self {
            State::Idle { .. } => ButtonState::Idle,
            State::Pressed { .. } => ButtonState::Pressed,
            State::PulseT0 { .. } => ButtonState::PulseT0,
            State::PulseT1 { .. } => ButtonState::PulseT1,
            State::Held { .. } => ButtonState::Held,
            State::HeldExtended { .. } => ButtonState::HeldExtended,
            State::Released { .. } => ButtonState::Released,
            State::EatRelease { .. } => ButtonState::EatRelease,
            State::InitOn { .. } => ButtonState::InitOn,
            State::BootKbReset { .. } => ButtonState::BootKbReset,
            State::WasOff { .. } => ButtonState::WasOff,
            State::LidOpen { .. } => ButtonState::LidOpen,
            State::LanWake { .. } => ButtonState::LanWake,
        }
    }
}

/// Raw inputs sampled by the owning task on every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonInputs {
    /// Physical button is down.
    pub button: bool,
    /// LAN or WLAN wake line is asserted.
    pub lan_wake: bool,
}

/// Owns the button machine, its debouncer and the PWRBTN# output.
pub struct PowerButton<B, L> {
    board: B,
    log: L,
    machine: statig::blocking::StateMachine<ButtonMachine>,
    context: Context,
    debouncer: Debouncer,
    raw: RawConditions,
    lan_wake_check: Option<Instant>,
    lan_wake_enabled: bool,
    pwrbtn_high: bool,
    requests: Vec<PowerRequest>,
}

impl<B: PowerButtonBoard, L: CauseLog> PowerButton<B, L> {
    pub fn new(board: B, log: L, timing: ButtonTiming) -> Self {
        PowerButton {
            board,
            log,
            machine: ButtonMachine::default().state_machine(),
            context: Context::new(timing),
            debouncer: Debouncer::new(timing.debounce, false),
            raw: RawConditions::default(),
            lan_wake_check: None,
            lan_wake_enabled: false,
            pwrbtn_high: true,
            requests: Vec::new(),
        }
    }

    /// Seed the debouncer from the raw button and pick the initial state.
    pub fn init(&mut self, now: Instant, inputs: ButtonInputs, info: &BootInfo) {
        self.context.now = now;
        self.context.task_start = now;
        self.context.chipset = info.chipset;
        self.context.power_source_ready = self.board.power_source_ready();
        let pressed = self.raw.pressed(inputs.button);
        self.debouncer = Debouncer::new(self.context.timing.debounce, pressed);
        self.context.pressed = pressed;
        let action = boot_action(info);
        info!("button init {:?}, pressed {=bool}", action, pressed);
        self.dispatch(Event::Boot(action));
    }

    pub fn on_raw_edge(&mut self, now: Instant) {
        self.debouncer.on_edge(now);
    }

    pub fn on_lan_wake_edge(&mut self, now: Instant) {
        self.lan_wake_check = Some(now + self.context.timing.lan_wake_debounce);
    }

    pub fn tick(&mut self, now: Instant, inputs: ButtonInputs, chipset: ChipsetState) {
        self.context.now = now;
        self.context.chipset = chipset;
        self.context.power_source_ready = self.board.power_source_ready();

        if let Some(pressed) = self.debouncer.poll(now, self.raw.pressed(inputs.button)) {
            info!("power button {=bool}", pressed);
            self.context.pressed = pressed;
            self.dispatch(Event::Changed);
        }

        if let Some(at) = self.lan_wake_check {
            if now >= at {
                self.lan_wake_check = None;
                if inputs.lan_wake && self.lan_wake_enabled {
                    info!("lan wake");
                    self.dispatch(Event::LanWake);
                }
            }
        }

        self.dispatch(Event::Tick);
    }

    pub fn apply(&mut self, request: ButtonRequest) {
        match request {
            ButtonRequest::PchPress => self.dispatch(Event::PchPress),
            ButtonRequest::PchRelease => self.dispatch(Event::PchRelease),
            ButtonRequest::ClearHoldLatch => self.context.hold_latched = false,
        }
    }

    /// Forced power-on pulse; ignored unless the chipset is off.
    pub fn wake_pulse(&mut self, now: Instant, chipset: ChipsetState, cause: WakeupCause) {
        self.context.now = now;
        self.context.chipset = chipset;
        self.dispatch(Event::WakePulse(cause));
    }

    pub fn on_hook(&mut self, hook: Hook) {
        if matches!(
            hook,
            Hook::Startup | Hook::Shutdown | Hook::Suspend | Hook::Resume
        ) {
            self.context.pulse_enabled = true;
        }
    }

    pub fn set_pulse_enabled(&mut self, enabled: bool) {
        self.context.pulse_enabled = enabled;
    }

    pub fn set_lan_wake_enabled(&mut self, enabled: bool) {
        self.lan_wake_enabled = enabled;
    }

    /// Host-simulated press or release, checked on the next tick.
    pub fn simulate(&mut self, now: Instant, pressed: bool) {
        self.raw.simulate = pressed;
        self.debouncer.recheck_now(now);
    }

    pub fn set_locked(&mut self, now: Instant, locked: bool) {
        self.raw.locked = locked;
        self.debouncer.on_edge(now);
    }

    pub fn set_ignore_lid(&mut self, ignore: bool) {
        self.raw.ignore_lid = ignore;
    }

    pub fn set_lid_open(&mut self, now: Instant, open: bool) {
        let opened = open && !self.raw.lid_open;
        self.raw.lid_open = open;
        self.debouncer.on_edge(now);
        if opened {
            self.context.now = now;
            self.dispatch(Event::LidOpened);
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.context.pressed
    }

    pub fn is_stable(&self) -> bool {
        self.debouncer.is_stable()
    }

    pub fn poll_release(&self, now: Instant, deadline: Instant) -> Option<Result<(), Timeout>> {
        release_progress(self.is_stable(), self.is_pressed(), now, deadline)
    }

    pub fn state(&self) -> ButtonState {
        self.machine.state().button_state()
    }

    pub fn pulse_enabled(&self) -> bool {
        self.context.pulse_enabled
    }

    pub fn hold_latched(&self) -> bool {
        self.context.hold_latched
    }

    pub fn is_locked(&self) -> bool {
        self.raw.locked
    }

    /// Level last driven on PWRBTN#; `true` is released.
    pub fn pwrbtn_high(&self) -> bool {
        self.pwrbtn_high
    }

    pub fn take_requests(&mut self) -> Vec<PowerRequest> {
        core::mem::take(&mut self.requests)
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    fn dispatch(&mut self, event: Event) {
        let mut before = self.state();
        self.machine.handle_with_context(&event, &mut self.context);
        self.apply_actions();
        // transient states resolve in the same tick
        while self.state() != before {
            before = self.state();
            self.machine.handle_with_context(&Event::Tick, &mut self.context);
            self.apply_actions();
        }
    }

    fn apply_actions(&mut self) {
        let mut actions = core::mem::take(&mut self.context.actions);
        for action in actions.drain(..) {
            match action {
                ButtonAction::SetPwrbtn(high) => self.set_pwrbtn_to_pch(high),
                ButtonAction::Record(cause) => self.log.record(cause),
                ButtonAction::ExitHardOff => self.requests.push(PowerRequest::ExitHardOff),
                ButtonAction::SystemReset => self.board.system_reset(),
            }
        }
        self.context.actions = actions;
    }

    fn set_pwrbtn_to_pch(&mut self, mut high: bool) {
        if !high && self.context.chipset.is_any_off() && !self.context.power_source_ready {
            info!("pwrbtn ignored, power source not ready");
            high = true;
        }
        debug!("pch pwrbtn {=bool}", high);
        self.pwrbtn_high = high;
        self.board.set_pwrbtn_to_pch(high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn debounce_change_and_bounce() {
        let mut d = Debouncer::new(Duration::from_millis(30), false);
        d.on_edge(at(0));
        assert!(!d.is_stable());
        assert_eq!(d.poll(at(29), true), None);
        assert_eq!(d.poll(at(30), true), Some(true));
        assert!(d.is_stable());

        // bounce back to the accepted level
        d.on_edge(at(100));
        assert_eq!(d.poll(at(130), true), None);
        assert!(d.is_stable());
        assert!(d.accepted);
    }

    #[test]
    fn release_needs_a_settled_button() {
        let deadline = at(100);
        assert_eq!(release_progress(true, false, at(0), deadline), Some(Ok(())));
        // released but still bouncing
        assert_eq!(release_progress(false, false, at(0), deadline), None);
        assert_eq!(release_progress(true, true, at(99), deadline), None);
        assert_eq!(
            release_progress(true, true, at(100), deadline),
            Some(Err(Timeout))
        );
        // a release that lands on the deadline still counts
        assert_eq!(release_progress(true, false, at(100), deadline), Some(Ok(())));
    }

    #[test]
    fn raw_conditioning() {
        let mut raw = RawConditions::default();
        assert!(raw.pressed(true));
        raw.lid_open = false;
        assert!(!raw.pressed(true));
        raw.ignore_lid = true;
        assert!(raw.pressed(true));
        raw.locked = true;
        assert!(!raw.pressed(true));
        raw.simulate = true;
        assert!(raw.pressed(false));
    }

    proptest! {
        #[test]
        fn edges_within_one_window_change_once(
            offsets in proptest::collection::vec(0u64..30, 1..20),
            levels in proptest::collection::vec(any::<bool>(), 20),
        ) {
            let window = Duration::from_millis(30);
            let mut d = Debouncer::new(window, false);
            let mut sorted = offsets.clone();
            sorted.sort();
            let mut changes = 0;
            let mut raw = false;
            for (i, ms) in sorted.iter().enumerate() {
                d.on_edge(at(*ms));
                raw = levels[i];
                if d.poll(at(*ms), raw).is_some() {
                    changes += 1;
                }
            }
            let last = *sorted.last().unwrap_or(&0);
            for ms in last..last + 40 {
                if d.poll(at(ms), raw).is_some() {
                    changes += 1;
                }
            }
            prop_assert!(changes <= 1);
            prop_assert_eq!(d.accepted, raw);
            prop_assert!(d.is_stable());
        }
    }
}
