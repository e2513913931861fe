//! Simulated board shared by the scenario tests.
//!
//! One `Sim` models the rails, a minimal PCH and the cause log; the handles
//! below give each state machine its own view of it.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ec_power::cause::CauseSummary;
use ec_power::config::{ButtonTiming, PowerTiming};
use ec_power::policy::BootInfo;
use ec_power::power_button::ButtonInputs;
use ec_power::{
    Cause, CauseLog, Hook, Level, PowerBoard, PowerButton, PowerButtonBoard, PowerSequencer,
    PowerSignals, Rail, ShutdownCause,
};
use embassy_time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pch {
    /// RSMRST# held, or no standby power.
    Reset,
    S5,
    S3,
    S0,
}

#[derive(Debug)]
pub struct Sim {
    pub standby_present: bool,
    pub source_ready: bool,
    /// The ATX supply never reports 12 V.
    pub v12_fault: bool,
    pub rails: HashMap<Rail, Level>,
    pub pch: Pch,
    pub pwrbtn_high: bool,
    /// Falling PWRBTN# edge not yet seen by the PCH.
    pub press_pending: bool,
    pub pwrbtn_history: Vec<(Instant, bool)>,
    pub hooks: Vec<Hook>,
    pub causes: Vec<Cause>,
    pub summary: CauseSummary,
    pub resets: usize,
    pub parked: usize,
    pub now: Instant,
}

impl Default for Sim {
    fn default() -> Self {
        Sim {
            standby_present: true,
            source_ready: true,
            v12_fault: false,
            rails: Rail::ALL.iter().map(|r| (*r, r.off_level())).collect(),
            pch: Pch::Reset,
            pwrbtn_high: true,
            press_pending: false,
            pwrbtn_history: Vec::new(),
            hooks: Vec::new(),
            causes: Vec::new(),
            summary: CauseSummary::new(),
            resets: 0,
            parked: 0,
            now: Instant::from_ticks(0),
        }
    }
}

impl Sim {
    pub fn is_on(&self, rail: Rail) -> bool {
        self.rails.get(&rail) == Some(&rail.on_level())
    }

    pub fn all_rails_off(&self) -> bool {
        Rail::ALL.iter().all(|r| !self.is_on(*r))
    }

    pub fn shutdown_causes(&self) -> Vec<ShutdownCause> {
        self.causes
            .iter()
            .filter_map(|c| match c {
                Cause::Shutdown(s) => Some(*s),
                Cause::Wakeup(_) => None,
            })
            .collect()
    }

    fn signals(&mut self) -> PowerSignals {
        let mut s = PowerSignals::empty();
        if !self.standby_present {
            self.pch = Pch::Reset;
            return s;
        }
        s |= PowerSignals::V3P3_SB_PGOOD;
        if self.is_on(Rail::DswPwrokEn) {
            s |= PowerSignals::SLP_SUS_N;
        }
        if self.is_on(Rail::AlwEn) && self.is_on(Rail::Aux1v8En) {
            s |= PowerSignals::SYSTEM_ALW_PG;
        }

        if !self.is_on(Rail::PchRsmrstL) {
            self.pch = Pch::Reset;
        } else if self.pch == Pch::Reset {
            self.pch = Pch::S5;
        }
        if self.press_pending && self.pch != Pch::Reset {
            self.press_pending = false;
            if matches!(self.pch, Pch::S5 | Pch::S3) {
                self.pch = Pch::S0;
            }
        }
        match self.pch {
            Pch::S0 => s |= PowerSignals::SLP_S3_N | PowerSignals::SLP_S4_N,
            Pch::S3 => s |= PowerSignals::SLP_S4_N,
            Pch::S5 | Pch::Reset => {}
        }

        if self.is_on(Rail::PsonL) && !self.v12_fault {
            s |= PowerSignals::V12_PGOOD;
            if self.is_on(Rail::EcSlpS3L) {
                s |= PowerSignals::ATX_PG | PowerSignals::VCORE_EN | PowerSignals::VRMPWRGD;
            }
        }
        s
    }
}

pub type Shared = Rc<RefCell<Sim>>;

pub struct SimBoard(pub Shared);

impl PowerBoard for SimBoard {
    fn read_signals(&mut self) -> PowerSignals {
        self.0.borrow_mut().signals()
    }

    fn set_rail(&mut self, rail: Rail, level: Level) {
        self.0.borrow_mut().rails.insert(rail, level);
    }

    fn notify(&mut self, hook: Hook) {
        self.0.borrow_mut().hooks.push(hook);
    }

    fn park_low_leakage(&mut self) {
        self.0.borrow_mut().parked += 1;
    }
}

pub struct SimButton(pub Shared);

impl PowerButtonBoard for SimButton {
    fn set_pwrbtn_to_pch(&mut self, high: bool) {
        let mut sim = self.0.borrow_mut();
        let now = sim.now;
        if sim.pwrbtn_high && !high {
            sim.press_pending = true;
        }
        sim.pwrbtn_high = high;
        sim.pwrbtn_history.push((now, high));
    }

    fn power_source_ready(&self) -> bool {
        self.0.borrow().source_ready
    }

    fn system_reset(&mut self) {
        self.0.borrow_mut().resets += 1;
    }
}

pub struct SimLog(pub Shared);

impl CauseLog for SimLog {
    fn record(&mut self, cause: Cause) {
        let mut sim = self.0.borrow_mut();
        sim.summary.apply(cause);
        sim.causes.push(cause);
    }
}

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Both machines wired together the way the firmware tasks wire them.
pub struct System {
    pub sim: Shared,
    pub power: PowerSequencer<SimBoard, SimLog>,
    pub button: PowerButton<SimButton, SimLog>,
    pub inputs: ButtonInputs,
    pub now: u64,
}

impl System {
    pub fn new() -> Self {
        Self::with_sim(Sim::default())
    }

    pub fn with_sim(sim: Sim) -> Self {
        let sim = Rc::new(RefCell::new(sim));
        System {
            power: PowerSequencer::new(
                SimBoard(sim.clone()),
                SimLog(sim.clone()),
                PowerTiming::new(),
            ),
            button: PowerButton::new(
                SimButton(sim.clone()),
                SimLog(sim.clone()),
                ButtonTiming::new(),
            ),
            sim,
            inputs: ButtonInputs::default(),
            now: 0,
        }
    }

    /// Controller restarted underneath a running host.
    pub fn running() -> Self {
        let mut sim = Sim::default();
        for rail in Rail::ALL {
            sim.rails.insert(rail, rail.on_level());
        }
        sim.pch = Pch::S0;
        let mut system = Self::with_sim(sim);
        system.boot(&BootInfo {
            jumped: true,
            ..Default::default()
        });
        system
    }

    pub fn boot(&mut self, info: &BootInfo) {
        self.sim.borrow_mut().now = at(self.now);
        self.power.init(at(self.now), info.jumped);
        let info = BootInfo {
            chipset: self.power.chipset_state(),
            ..*info
        };
        self.button.init(at(self.now), self.inputs, &info);
        self.route();
    }

    /// Advance by `ms`, ticking both machines every millisecond.
    pub fn run(&mut self, ms: u64) {
        for _ in 0..ms {
            self.now += 1;
            self.step();
        }
    }

    pub fn step(&mut self) {
        let now = at(self.now);
        self.sim.borrow_mut().now = now;
        self.power.tick(now);
        self.route();
        self.button.tick(now, self.inputs, self.power.chipset_state());
        self.route();
    }

    /// Physical button edge.
    pub fn press(&mut self, down: bool) {
        self.inputs.button = down;
        self.button.on_raw_edge(at(self.now));
    }

    fn route(&mut self) {
        for request in self.power.take_button_requests() {
            self.button.apply(request);
        }
        for request in self.button.take_requests() {
            self.power.handle_request(at(self.now), request);
        }
    }

    pub fn run_until(&mut self, limit_ms: u64, mut done: impl FnMut(&System) -> bool) -> bool {
        for _ in 0..limit_ms {
            if done(self) {
                return true;
            }
            self.now += 1;
            self.step();
        }
        done(self)
    }
}
