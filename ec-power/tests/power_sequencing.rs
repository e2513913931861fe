mod common;

use common::{Pch, Sim, System, at};
use ec_power::policy::BootInfo;
use ec_power::sequence::{self, Action};
use ec_power::{
    ButtonState, Cause, ChipsetState, Hook, Level, PowerState, Rail, ShutdownCause, WakeupCause,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn boot_to_on() -> System {
    let mut system = System::new();
    system.boot(&BootInfo::default());
    let reached = system.run_until(5_000, |s| {
        s.power.current_power_state() == PowerState::On && s.button.state() == ButtonState::Idle
    });
    assert!(reached, "stuck in {:?}", system.power.current_power_state());
    system
}

#[test]
fn clean_boot_to_on() {
    let mut sim = Sim::default();
    sim.source_ready = false;
    let mut system = System::with_sim(sim);
    system.boot(&BootInfo::default());

    let mut seen = vec![system.button.state()];
    let mut track = |system: &System| {
        let state = system.button.state();
        if seen.last() != Some(&state) {
            seen.push(state);
        }
    };
    for _ in 0..50 {
        system.run(1);
        track(&system);
    }
    // nothing may reach the PCH while the supply is not ready
    assert!(system.sim.borrow().pwrbtn_history.is_empty());
    system.sim.borrow_mut().source_ready = true;
    for _ in 0..5_000 {
        system.run(1);
        track(&system);
        if system.power.current_power_state() == PowerState::On
            && system.button.state() == ButtonState::Idle
        {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![ButtonState::InitOn, ButtonState::BootKbReset, ButtonState::Idle]
    );
    assert_eq!(system.power.current_power_state(), PowerState::On);

    let sim = system.sim.borrow();
    assert_eq!(sim.pch, Pch::S0);
    assert!(sim.pwrbtn_high);
    assert!(!sim.summary.abnormal);
    assert!(sim.causes.contains(&Cause::Wakeup(WakeupCause::AutoPowerOn)));
    assert!(sim.causes.contains(&Cause::Wakeup(WakeupCause::Resume)));
    assert!(sim.shutdown_causes().is_empty());
    for hook in [Hook::PreInit, Hook::RailsAvailable, Hook::Startup, Hook::Resume] {
        assert!(sim.hooks.contains(&hook), "missing {:?}", hook);
    }
    for rail in [Rail::PchPwrgd, Rail::Pwrgd140ms, Rail::VccstPwrgd, Rail::PsonL] {
        assert!(sim.is_on(rail), "{:?} is off", rail);
    }
}

#[test]
fn usb_switch_follows_s0_entry() {
    let mut system = boot_to_on();
    assert!(!system.sim.borrow().is_on(Rail::UsbSwitchToHost));
    system.run(600);
    assert!(system.sim.borrow().is_on(Rail::UsbSwitchToHost));
}

#[test]
fn rail_loss_during_suspend() {
    let mut system = boot_to_on();
    system.sim.borrow_mut().pch = Pch::S3;
    system.run(1);
    assert_eq!(system.power.current_power_state(), PowerState::Suspended);

    system.sim.borrow_mut().causes.clear();
    system.sim.borrow_mut().standby_present = false;
    system.run(1);

    assert_eq!(system.power.current_power_state(), PowerState::Off);
    let sim = system.sim.borrow();
    assert!(sim.all_rails_off());
    assert_eq!(sim.shutdown_causes(), vec![ShutdownCause::RailLossSuspend]);
    assert!(sim.summary.abnormal);
}

#[test]
fn suspend_and_resume() {
    let mut system = boot_to_on();
    system.sim.borrow_mut().pch = Pch::S3;
    system.run(1);
    assert_eq!(system.power.chipset_state(), ChipsetState::Suspend);
    {
        let sim = system.sim.borrow();
        assert!(!sim.is_on(Rail::PsonL));
        assert!(!sim.is_on(Rail::PchPwrgd));
        assert!(sim.is_on(Rail::EcSlpS4L));
        assert!(sim.hooks.contains(&Hook::SuspendComplete));
    }

    system.sim.borrow_mut().pch = Pch::S0;
    let reached = system.run_until(1_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);
}

#[test]
fn s3_exit_times_out_on_12v() {
    let mut system = boot_to_on();
    system.sim.borrow_mut().pch = Pch::S3;
    system.run(1);

    system.sim.borrow_mut().v12_fault = true;
    system.sim.borrow_mut().pch = Pch::S0;
    system.run(1);
    assert_eq!(system.power.current_power_state(), PowerState::Suspended);
    assert!(system.sim.borrow().is_on(Rail::PsonL));

    system.run(999);
    assert_eq!(system.power.current_power_state(), PowerState::Suspended);
    system.run(1);
    assert_eq!(system.power.current_power_state(), PowerState::Off);
    assert!(system
        .sim
        .borrow()
        .shutdown_causes()
        .contains(&ShutdownCause::V12Timeout));
}

#[test]
fn normal_shutdown_is_not_abnormal() {
    let mut system = boot_to_on();
    system.sim.borrow_mut().pch = Pch::S5;
    let reached = system.run_until(200, |s| s.power.current_power_state() == PowerState::Standby);
    assert!(reached);
    system.run(300);
    let sim = system.sim.borrow();
    assert_eq!(
        sim.shutdown_causes(),
        vec![ShutdownCause::Suspend, ShutdownCause::Shutdown]
    );
    assert!(!sim.summary.abnormal);
    assert!(sim.is_on(Rail::FingerprintUsbEnL), "fingerprint power restored");
    assert!(sim.is_on(Rail::PchRsmrstL));
    assert!(!sim.is_on(Rail::EcSlpS5L));
}

#[test]
fn host_forced_shutdown() {
    let mut system = boot_to_on();
    system
        .power
        .force_shutdown(at(system.now), ShutdownCause::HostRequest);
    system.run(1);
    assert!(!system.sim.borrow().pwrbtn_high);

    // the OS reacts to the button
    system.sim.borrow_mut().pch = Pch::S5;
    let reached = system.run_until(200, |s| s.power.current_power_state() == PowerState::Standby);
    assert!(reached);
    system.run(1);

    let sim = system.sim.borrow();
    assert!(sim.pwrbtn_high);
    assert_eq!(sim.pch, Pch::S5);
    assert_eq!(
        sim.shutdown_causes(),
        vec![ShutdownCause::HostRequest, ShutdownCause::Suspend]
    );
    assert_eq!(system.button.state(), ButtonState::Idle);
}

#[test]
fn force_power_off_from_on() {
    let mut system = boot_to_on();
    system
        .power
        .force_power_off(at(system.now), ShutdownCause::Thermal);
    assert_eq!(system.power.current_power_state(), PowerState::Off);
    let sim = system.sim.borrow();
    assert!(sim.all_rails_off());
    assert!(sim.summary.abnormal);
    assert_eq!(sim.parked, 1);
}

#[test]
fn power_on_after_power_off_needs_a_request() {
    let mut system = boot_to_on();
    system
        .power
        .force_power_off(at(system.now), ShutdownCause::HostRequest);
    system.run(2_000);
    assert_eq!(system.power.current_power_state(), PowerState::Off);

    system.press(true);
    system.run(300);
    system.press(false);
    let reached = system.run_until(2_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);
    assert!(
        system
            .sim
            .borrow()
            .causes
            .contains(&Cause::Wakeup(WakeupCause::ButtonPowerOn))
    );
}

#[test]
fn reaching_s0_clears_the_abnormal_flag() {
    let mut system = boot_to_on();
    system
        .power
        .force_power_off(at(system.now), ShutdownCause::Thermal);
    system.run(2_000);
    assert!(system.sim.borrow().summary.abnormal);

    system.press(true);
    system.run(300);
    system.press(false);
    let reached = system.run_until(2_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);

    let sim = system.sim.borrow();
    assert!(!sim.summary.abnormal);
    assert_eq!(sim.summary.last_wakeup, Some(WakeupCause::Resume));
}

fn apply(rails: &mut HashMap<Rail, Level>, actions: &[Action]) {
    for action in actions {
        if let Action::Set(rail, level) = action {
            rails.insert(*rail, *level);
        }
    }
}

proptest! {
    #[test]
    fn rail_loss_reaches_off_in_one_tick(boot_ms in 0u64..400, suspend in any::<bool>()) {
        let mut system = System::new();
        system.boot(&BootInfo::default());
        system.run(boot_ms);
        if suspend && system.power.current_power_state() == PowerState::On {
            system.sim.borrow_mut().pch = Pch::S3;
            system.run(1);
        }
        prop_assume!(system.power.current_power_state() != PowerState::Off);

        system.sim.borrow_mut().standby_present = false;
        system.run(1);
        prop_assert_eq!(system.power.current_power_state(), PowerState::Off);
        prop_assert!(system.sim.borrow().all_rails_off());
    }

    #[test]
    fn force_off_is_idempotent(levels in proptest::collection::vec(any::<bool>(), 18)) {
        let initial: HashMap<Rail, Level> = Rail::ALL
            .iter()
            .zip(levels)
            .map(|(rail, high)| (*rail, Level::from_bool(high)))
            .collect();

        let mut actions = Vec::new();
        sequence::force_off(&mut actions);

        let mut once = initial.clone();
        apply(&mut once, &actions);
        let mut twice = initial;
        apply(&mut twice, &actions);
        apply(&mut twice, &actions);
        prop_assert_eq!(once, twice);
    }
}
