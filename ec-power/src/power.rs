//! Chassis power state machine, G3 <-> S5 <-> S3 <-> S0.
//!
//! The machine itself is pure: it reads a signal snapshot and the current
//! time out of [`Context`] and pushes [`Action`]s. [`PowerSequencer`] owns the
//! board, applies those actions and keeps ticking while states resolve
//! immediately, so that e.g. a rail loss reaches G3 within one tick.

use alloc::vec::Vec;
use embassy_time::Instant;
use statig::prelude::*;

use crate::board::{CauseLog, Hook, Level, PowerBoard, Rail};
use crate::cause::{Cause, ShutdownCause, WakeupCause};
use crate::config::PowerTiming;
use crate::sequence::{self, Action, ButtonRequest, Deferred, Progress, SequenceRun};
use crate::signals::PowerSignals;
use crate::timer::TimerQueue;

/// Upper bound on back-to-back transitions handled in one tick.
const MAX_CASCADE: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerState {
    /// G3
    Off = 0,
    /// G3 -> S5
    TransitioningToStandby = 1,
    /// S5
    Standby = 2,
    /// S5 -> S3
    TransitioningToSuspendEntry = 3,
    /// S3
    Suspended = 4,
    /// S3 -> S0
    TransitioningToOnEntry = 5,
    /// S0
    On = 6,
    /// S0 -> S3
    TransitioningToSuspendExit = 7,
    /// S3 -> S5
    TransitioningToStandbyExit = 8,
    /// S5 -> G3
    TransitioningToOff = 9,
}

impl PowerState {
    pub fn chipset_state(self) -> ChipsetState {
        match self {
            PowerState::Off | PowerState::TransitioningToStandby => ChipsetState::HardOff,
            PowerState::Standby
            | PowerState::TransitioningToSuspendEntry
            | PowerState::TransitioningToOff => ChipsetState::SoftOff,
            PowerState::Suspended
            | PowerState::TransitioningToOnEntry
            | PowerState::TransitioningToStandbyExit => ChipsetState::Suspend,
            PowerState::On | PowerState::TransitioningToSuspendExit => ChipsetState::On,
        }
    }
}

impl TryFrom<u8> for PowerState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => PowerState::Off,
            1 => PowerState::TransitioningToStandby,
            2 => PowerState::Standby,
            3 => PowerState::TransitioningToSuspendEntry,
            4 => PowerState::Suspended,
            5 => PowerState::TransitioningToOnEntry,
            6 => PowerState::On,
            7 => PowerState::TransitioningToSuspendExit,
            8 => PowerState::TransitioningToStandbyExit,
            9 => PowerState::TransitioningToOff,
            other => return Err(other),
        })
    }
}

/// Coarse view of the power state used by the button machine and the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipsetState {
    HardOff,
    SoftOff,
    Suspend,
    On,
}

impl ChipsetState {
    pub fn is_any_off(self) -> bool {
        matches!(self, ChipsetState::HardOff | ChipsetState::SoftOff)
    }
}

/// Where to start after a controller reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Seed {
    /// Cold boot, or rails in an unknown state: park everything.
    ForceOff,
    Standby,
    On,
}

/// Requests other tasks send to the power sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerRequest {
    ExitHardOff,
    ForceShutdown(ShutdownCause),
    ForcePowerOff(ShutdownCause),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Tick,
    ExitHardOff,
    ForceShutdown(ShutdownCause),
    ForcePowerOff(ShutdownCause),
    Seed(Seed),
}

pub struct Context {
    pub now: Instant,
    pub signals: PowerSignals,
    pub timing: PowerTiming,
    pub actions: Vec<Action>,
}

impl Context {
    pub fn new(timing: PowerTiming) -> Self {
        Context {
            now: Instant::from_ticks(0),
            signals: PowerSignals::empty(),
            timing,
            actions: Vec::new(),
        }
    }

    fn record(&mut self, cause: impl Into<Cause>) {
        self.actions.push(Action::Record(cause.into()));
    }

    fn poll(&mut self, run: &mut SequenceRun) -> Progress {
        run.poll(self.now, self.signals, &mut self.actions)
    }

    fn lost_pgood_s5(&self) -> bool {
        !self.signals.has(PowerSignals::PGOOD_S5)
    }
}

fn rail_lost(context: &mut Context, cause: ShutdownCause) -> Outcome<State> {
    warn!("standby power-good lost, signals {=u16:#x}", context.signals.bits());
    context.record(cause);
    Transition(State::s5_g3())
}

fn sequence_failed(context: &mut Context, cause: ShutdownCause) -> Outcome<State> {
    context.record(cause);
    Transition(State::s5_g3())
}

#[derive(Debug, Default)]
pub struct PowerMachine {
    forcing_shutdown: bool,
}

#[state_machine(
    initial = "State::g3()",
    before_transition = "Self::before_transition",
    state(derive(Debug)),
    superstate(derive(Debug))
)]
impl PowerMachine {
    fn before_transition(&mut self, source: &State, target: &State) {
        info!(
            "power {:?} -> {:?}",
            source.power_state(),
            target.power_state()
        );
    }

    #[state]
    fn g3(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::ExitHardOff => Transition(State::g3_s5(SequenceRun::new(
                sequence::g3_to_s5(&context.timing),
            ))),
            Event::Seed(Seed::On) => Transition(State::s0()),
            Event::Seed(Seed::Standby) => Transition(State::s5()),
            Event::Seed(Seed::ForceOff) => {
                sequence::force_off(&mut context.actions);
                Handled
            }
            _ => Super,
        }
    }

    #[state]
    fn g3_s5(run: &mut SequenceRun, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if !context.signals.has(PowerSignals::V3P3_SB_PGOOD) {
                    if run.is_fresh() {
                        warn!("no 3.3 V standby, staying in G3");
                        return Transition(State::g3());
                    }
                    return rail_lost(context, ShutdownCause::RailLossStandby);
                }
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => Transition(State::s5()),
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    #[state]
    fn s5(&mut self, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if self.forcing_shutdown {
                    self.forcing_shutdown = false;
                    context.actions.push(Action::Button(ButtonRequest::PchRelease));
                }
                if context.lost_pgood_s5() {
                    rail_lost(context, ShutdownCause::RailLossStandby)
                } else if context.signals.has(PowerSignals::SLP_S4_N) {
                    context.record(WakeupCause::PowerOn);
                    Transition(State::s5_s3(SequenceRun::new(sequence::s5_to_s3(
                        &context.timing,
                    ))))
                } else {
                    Handled
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn s5_s3(run: &mut SequenceRun, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    return rail_lost(context, ShutdownCause::RailLossStandby);
                }
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => Transition(State::s3(None)),
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    /// `exit` is the S3 exit sequence, started once SLP_S3# is released.
    #[state(superstate = "running")]
    fn s3(
        exit: &mut Option<SequenceRun>,
        event: &Event,
        context: &mut Context,
    ) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    return rail_lost(context, ShutdownCause::RailLossSuspend);
                }
                if exit.is_none() {
                    if context.signals.has(PowerSignals::SLP_S3_N) {
                        *exit = Some(SequenceRun::new(sequence::s3_exit(&context.timing)));
                    } else if !context.signals.has(PowerSignals::SLP_S4_N) {
                        return Transition(State::s3_s5(SequenceRun::new(sequence::s3_to_s5(
                            &context.timing,
                        ))));
                    } else {
                        return Handled;
                    }
                }
                let Some(run) = exit.as_mut() else {
                    return Handled;
                };
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => Transition(State::s3_s0(SequenceRun::new(
                        sequence::s3_to_s0(&context.timing),
                    ))),
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn s3_s0(run: &mut SequenceRun, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    return rail_lost(context, ShutdownCause::RailLossSuspend);
                }
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => {
                        context.record(WakeupCause::Resume);
                        Transition(State::s0())
                    }
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn s0(event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    rail_lost(context, ShutdownCause::RailLossOn)
                } else if !context.signals.has(PowerSignals::SLP_S3_N) {
                    context.actions.push(Action::Notify(Hook::Suspend));
                    context.record(ShutdownCause::Suspend);
                    Transition(State::s0_s3(SequenceRun::new(sequence::s0_to_s3(
                        &context.timing,
                    ))))
                } else {
                    Handled
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn s0_s3(run: &mut SequenceRun, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    return rail_lost(context, ShutdownCause::RailLossOn);
                }
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => Transition(State::s3(None)),
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn s3_s5(
        &mut self,
        run: &mut SequenceRun,
        event: &Event,
        context: &mut Context,
    ) -> Outcome<State> {
        match event {
            Event::Tick => {
                if context.lost_pgood_s5() {
                    return rail_lost(context, ShutdownCause::RailLossSuspend);
                }
                match context.poll(run) {
                    Progress::Pending => Handled,
                    Progress::Done => {
                        if !self.forcing_shutdown {
                            context.record(ShutdownCause::Shutdown);
                        }
                        Transition(State::s5())
                    }
                    Progress::Failed(cause) => sequence_failed(context, cause),
                }
            }
            _ => Super,
        }
    }

    #[state(entry_action = "enter_s5_g3")]
    fn s5_g3(event: &Event) -> Outcome<State> {
        match event {
            Event::Tick => Transition(State::g3()),
            _ => Super,
        }
    }

    #[action]
    fn enter_s5_g3(&mut self, context: &mut Context) {
        if self.forcing_shutdown {
            self.forcing_shutdown = false;
            context.actions.push(Action::Button(ButtonRequest::PchRelease));
        }
        sequence::force_off(&mut context.actions);
    }

    /// States in which the chipset has standby power and can be asked to
    /// shut down.
    #[superstate]
    fn running(&mut self, event: &Event, context: &mut Context) -> Outcome<State> {
        match event {
            Event::ForceShutdown(cause) => {
                self.forcing_shutdown = true;
                context.actions.push(Action::Button(ButtonRequest::PchPress));
                context.record(*cause);
                Handled
            }
            Event::ForcePowerOff(cause) => {
                context.record(*cause);
                Transition(State::s5_g3())
            }
            _ => Super,
        }
    }
}

impl State {
    pub fn power_state(&self) -> PowerState {
        match self {
            State::G3 { .. } => PowerState::Off,
            State::G3S5 { .. } => PowerState::TransitioningToStandby,
            State::S5 { .. } => PowerState::Standby,
            State::S5S3 { .. } => PowerState::TransitioningToSuspendEntry,
            State::S3 { .. } => PowerState::Suspended,
            State::S3S0 { .. } => PowerState::TransitioningToOnEntry,
            State::S0 { .. } => PowerState::On,
            State::S0S3 { .. } => PowerState::TransitioningToSuspendExit,
            State::S3S5 { .. } => PowerState::TransitioningToStandbyExit,
            State::S5G3 { .. } => PowerState::TransitioningToOff,
        }
    }
}

/// Owns the power state machine together with the board it drives.
pub struct PowerSequencer<B, L> {
    board: B,
    log: L,
    machine: statig::blocking::StateMachine<PowerMachine>,
    context: Context,
    deferred: TimerQueue<Deferred>,
    exit_requested: bool,
    button_requests: Vec<ButtonRequest>,
}

impl<B: PowerBoard, L: CauseLog> PowerSequencer<B, L> {
    pub fn new(board: B, log: L, timing: PowerTiming) -> Self {
        PowerSequencer {
            board,
            log,
            machine: PowerMachine::default().state_machine(),
            context: Context::new(timing),
            deferred: TimerQueue::new(),
            exit_requested: false,
            button_requests: Vec::new(),
        }
    }

    /// Pick the initial state. `jumped` is set when the controller restarted
    /// underneath a host that may still be powered.
    pub fn init(&mut self, now: Instant, jumped: bool) {
        self.sample(now);
        let signals = self.context.signals;
        let seed = if !jumped {
            None
        } else if signals.has(PowerSignals::ALL_S0) {
            Some(Seed::On)
        } else if signals.has(PowerSignals::PGOOD_S5) {
            Some(Seed::Standby)
        } else {
            Some(Seed::ForceOff)
        };
        info!("power init, jumped {=bool}, signals {=u16:#x}", jumped, signals.bits());
        if let Some(seed) = seed {
            self.dispatch(Event::Seed(seed));
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.sample(now);
        self.run_deferred(now);
        if core::mem::take(&mut self.exit_requested) {
            self.dispatch(Event::ExitHardOff);
        }
        self.dispatch(Event::Tick);
    }

    /// Leave G3 on the next tick. Ignored if the machine is already past G3.
    pub fn exit_hard_off(&mut self) {
        self.exit_requested = true;
    }

    /// Ask the chipset to shut down by holding its power button. Ignored
    /// while the chipset is off.
    pub fn force_shutdown(&mut self, now: Instant, cause: ShutdownCause) {
        self.sample(now);
        self.dispatch(Event::ForceShutdown(cause));
    }

    /// Drop every rail immediately. Ignored while the chipset is off.
    pub fn force_power_off(&mut self, now: Instant, cause: ShutdownCause) {
        self.sample(now);
        self.dispatch(Event::ForcePowerOff(cause));
    }

    pub fn handle_request(&mut self, now: Instant, request: PowerRequest) {
        match request {
            PowerRequest::ExitHardOff => self.exit_hard_off(),
            PowerRequest::ForceShutdown(cause) => self.force_shutdown(now, cause),
            PowerRequest::ForcePowerOff(cause) => self.force_power_off(now, cause),
        }
    }

    pub fn current_power_state(&self) -> PowerState {
        self.machine.state().power_state()
    }

    pub fn chipset_state(&self) -> ChipsetState {
        self.current_power_state().chipset_state()
    }

    pub fn take_button_requests(&mut self) -> Vec<ButtonRequest> {
        core::mem::take(&mut self.button_requests)
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    fn sample(&mut self, now: Instant) {
        self.context.now = now;
        self.context.signals = self.board.read_signals();
    }

    fn dispatch(&mut self, event: Event) {
        let mut before = self.current_power_state();
        self.machine.handle_with_context(&event, &mut self.context);
        self.apply();
        for _ in 0..MAX_CASCADE {
            let after = self.current_power_state();
            if after == before {
                break;
            }
            before = after;
            self.machine.handle_with_context(&Event::Tick, &mut self.context);
            self.apply();
        }
    }

    fn apply(&mut self) {
        let mut actions = core::mem::take(&mut self.context.actions);
        for action in actions.drain(..) {
            match action {
                Action::Set(rail, level) => self.board.set_rail(rail, level),
                Action::Notify(hook) => {
                    debug!("hook {:?}", hook);
                    self.board.notify(hook);
                }
                Action::Record(cause) => {
                    info!("cause {=u32:#x}", cause.code());
                    self.log.record(cause);
                }
                Action::Defer(work, delay) => {
                    self.deferred.schedule_after(work, self.context.now, delay)
                }
                Action::CancelDeferred => self.deferred.clear(),
                Action::ParkLowLeakage => self.board.park_low_leakage(),
                Action::Button(request) => self.button_requests.push(request),
            }
        }
        self.context.actions = actions;
    }

    fn run_deferred(&mut self, now: Instant) {
        while let Some(work) = self.deferred.pop_due(now) {
            match work {
                Deferred::UsbSwitchToHost => {
                    if self.current_power_state() == PowerState::On {
                        self.board.set_rail(Rail::UsbSwitchToHost, Level::High);
                    }
                }
                Deferred::FingerprintPowerRestore => {
                    if self.current_power_state() != PowerState::Off {
                        let rail = Rail::FingerprintUsbEnL;
                        self.board.set_rail(rail, rail.on_level());
                    }
                }
            }
        }
    }
}
