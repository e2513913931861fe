mod common;

use common::{Pch, System, at};
use ec_power::policy::{AcRecoveryPolicy, BootInfo};
use ec_power::sequence::ButtonRequest;
use ec_power::{ButtonState, Cause, PowerState, ShutdownCause, Timeout, WakeupCause};
use embassy_time::Instant;

/// PWRBTN# edges after `since`, relative to it.
fn pwrbtn_since(system: &System, since: u64) -> Vec<(u64, bool)> {
    system
        .sim
        .borrow()
        .pwrbtn_history
        .iter()
        .filter(|(t, _)| *t >= at(since))
        .map(|(t, high)| (t.as_millis() - since, *high))
        .collect()
}

fn off_system() -> System {
    let mut system = System::new();
    system.boot(&BootInfo {
        ac_policy: AcRecoveryPolicy::AlwaysOff,
        ..Default::default()
    });
    system
}

#[test]
fn pulse_is_stretched_while_on() {
    let mut system = System::running();
    system.run(10);
    let start = system.now;
    system.press(true);
    system.run(200);

    // debounced at +30, then 32 ms low, released until 64 ms after the press
    assert_eq!(
        pwrbtn_since(&system, start),
        vec![(30, false), (62, true), (94, false)]
    );
    assert_eq!(system.button.state(), ButtonState::Held);

    system.press(false);
    system.run(40);
    assert_eq!(pwrbtn_since(&system, start).last(), Some(&(230, true)));
    assert_eq!(system.button.state(), ButtonState::Idle);
    assert!(system.sim.borrow().shutdown_causes().is_empty());
}

#[test]
fn bounce_burst_debounces_from_the_last_edge() {
    let mut bouncing = System::running();
    let mut latest_only = System::running();
    let start = bouncing.now;

    // every contact bounce reported
    for i in 0..15 {
        bouncing.inputs.button = i % 2 == 0;
        bouncing.button.on_raw_edge(at(bouncing.now));
        bouncing.run(1);
    }
    // only the last edge of the burst reported
    latest_only.run(14);
    latest_only.press(true);
    latest_only.run(1);

    bouncing.run(40);
    latest_only.run(40);
    assert_eq!(pwrbtn_since(&bouncing, start), vec![(44, false)]);
    assert_eq!(
        pwrbtn_since(&latest_only, start),
        pwrbtn_since(&bouncing, start)
    );
    assert!(latest_only.button.is_pressed());
}

#[test]
fn pch_release_after_a_bounce_burst() {
    let mut system = System::running();
    for i in 0..16 {
        system.inputs.button = i % 2 == 0;
        system.button.on_raw_edge(at(system.now));
    }
    system.press(true);
    system.run(40);
    assert!(!system.sim.borrow().pwrbtn_high);

    system.button.apply(ButtonRequest::PchRelease);
    assert!(system.sim.borrow().pwrbtn_high);
    assert_eq!(system.button.state(), ButtonState::EatRelease);
}

#[test]
fn pulse_disabled_goes_straight_to_phase1() {
    let mut system = System::running();
    system.button.set_pulse_enabled(false);
    system.run(10);
    let start = system.now;
    system.press(true);
    system.run(200);
    assert_eq!(pwrbtn_since(&system, start), vec![(94, false)]);
}

#[test]
fn hooks_reenable_the_pulse() {
    let mut system = System::running();
    system.button.set_pulse_enabled(false);
    system.button.on_hook(ec_power::Hook::PreInit);
    assert!(!system.button.pulse_enabled());
    system.button.on_hook(ec_power::Hook::Resume);
    assert!(system.button.pulse_enabled());
}

#[test]
fn pch_release_eats_the_physical_release() {
    let mut system = System::running();
    system.press(true);
    system.run(40);
    assert!(!system.sim.borrow().pwrbtn_high);

    system.button.apply(ButtonRequest::PchRelease);
    assert_eq!(system.button.state(), ButtonState::EatRelease);
    assert!(system.sim.borrow().pwrbtn_high);
    let edges = system.sim.borrow().pwrbtn_history.len();

    system.run(10);
    system.press(false);
    system.run(100);
    assert_eq!(system.button.state(), ButtonState::Idle);
    assert_eq!(system.sim.borrow().pwrbtn_history.len(), edges);
}

#[test]
fn pch_press_is_not_doubled_by_the_button() {
    let mut system = System::running();
    system.press(true);
    system.run(31);
    let edges = system.sim.borrow().pwrbtn_history.len();
    system.button.apply(ButtonRequest::PchPress);
    assert_eq!(system.sim.borrow().pwrbtn_history.len(), edges);

    let mut idle = System::running();
    idle.button.apply(ButtonRequest::PchPress);
    assert!(!idle.sim.borrow().pwrbtn_high);
    idle.button.apply(ButtonRequest::PchRelease);
    assert!(idle.sim.borrow().pwrbtn_high);
    assert_eq!(idle.button.state(), ButtonState::Idle);
}

#[test]
fn long_hold_escalates_in_order() {
    let mut system = System::running();
    system.press(true);

    system.run(3_793);
    assert!(system.sim.borrow().shutdown_causes().is_empty());
    system.run(1);
    assert_eq!(
        system.sim.borrow().shutdown_causes(),
        vec![ShutdownCause::LongPress]
    );
    assert!(system.button.hold_latched());
    assert_eq!(system.button.state(), ButtonState::HeldExtended);

    system.run(6_299);
    assert_eq!(system.sim.borrow().resets, 0);
    system.run(1);
    assert_eq!(
        system.sim.borrow().shutdown_causes(),
        vec![ShutdownCause::LongPress, ShutdownCause::LongPressReset]
    );
    assert_eq!(system.sim.borrow().resets, 1);

    // nothing more happens, whatever the button does
    system.press(false);
    system.run(10_000);
    assert_eq!(system.button.state(), ButtonState::HeldExtended);
    assert_eq!(system.sim.borrow().resets, 1);
}

#[test]
fn short_hold_records_nothing() {
    let mut system = System::running();
    system.press(true);
    system.run(3_000);
    system.press(false);
    system.run(100);
    assert_eq!(system.button.state(), ButtonState::Idle);
    assert!(system.sim.borrow().causes.is_empty());
    assert!(!system.button.hold_latched());
}

#[test]
fn press_while_off_powers_on() {
    let mut system = off_system();
    system.run(100);
    assert_eq!(system.power.current_power_state(), PowerState::Off);

    system.press(true);
    system.run(31);
    assert_eq!(system.button.state(), ButtonState::WasOff);
    assert!(!system.sim.borrow().pwrbtn_high);

    // releasing during the forced pulse does not cut it short
    system.press(false);
    system.run(100);
    assert_eq!(system.button.state(), ButtonState::WasOff);
    assert!(!system.sim.borrow().pwrbtn_high);

    let reached = system.run_until(2_000, |s| {
        s.power.current_power_state() == PowerState::On && s.button.state() == ButtonState::Idle
    });
    assert!(reached);
    let sim = system.sim.borrow();
    assert!(sim.pwrbtn_high);
    assert_eq!(sim.causes.first(), Some(&Cause::Wakeup(WakeupCause::ButtonPowerOn)));
}

#[test]
fn holding_through_the_forced_pulse_keeps_counting() {
    let mut system = off_system();
    system.press(true);
    system.run(30 + 200);
    assert_eq!(system.button.state(), ButtonState::Held);
    system.run(3_700);
    assert!(system
        .sim
        .borrow()
        .shutdown_causes()
        .contains(&ShutdownCause::LongPress));
}

#[test]
fn supply_not_ready_blocks_the_press() {
    let mut system = off_system();
    system.sim.borrow_mut().source_ready = false;
    system.press(true);
    system.run(100);
    assert!(system.sim.borrow().pwrbtn_history.iter().all(|(_, high)| *high));
}

#[test]
fn lan_wake_from_suspend() {
    let mut system = System::running();
    system.button.set_lan_wake_enabled(true);
    system.sim.borrow_mut().pch = Pch::S3;
    system.run(1);
    assert_eq!(system.power.current_power_state(), PowerState::Suspended);

    system.inputs.lan_wake = true;
    system.button.on_lan_wake_edge(at(system.now));
    system.run(4);
    assert_eq!(system.button.state(), ButtonState::Idle);
    system.run(1);
    assert_eq!(system.button.state(), ButtonState::LanWake);

    let reached = system.run_until(1_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);
    assert!(
        system
            .sim
            .borrow()
            .causes
            .contains(&Cause::Wakeup(WakeupCause::LanWake))
    );
}

#[test]
fn lan_wake_ignored_when_disabled_or_latched() {
    let mut system = System::running();
    system.sim.borrow_mut().pch = Pch::S3;
    system.run(1);
    system.inputs.lan_wake = true;
    system.button.on_lan_wake_edge(at(system.now));
    system.run(10);
    assert_eq!(system.button.state(), ButtonState::Idle);

    // a glitch shorter than the debounce is ignored as well
    system.button.set_lan_wake_enabled(true);
    system.button.on_lan_wake_edge(at(system.now));
    system.inputs.lan_wake = false;
    system.run(10);
    assert_eq!(system.button.state(), ButtonState::Idle);
    assert_eq!(system.power.current_power_state(), PowerState::Suspended);
}

#[test]
fn lid_open_wakes_from_off() {
    let mut system = off_system();
    system.button.set_lid_open(at(system.now), false);
    system.run(10);
    system.button.set_lid_open(at(system.now), true);
    assert_eq!(system.button.state(), ButtonState::LidOpen);
    let reached = system.run_until(2_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);
    assert_eq!(
        system.sim.borrow().causes.first(),
        Some(&Cause::Wakeup(WakeupCause::LidOpen))
    );
}

#[test]
fn closed_lid_hides_the_button() {
    let mut system = off_system();
    system.button.set_lid_open(at(system.now), false);
    system.press(true);
    system.run(100);
    assert!(!system.button.is_pressed());
    assert_eq!(system.power.current_power_state(), PowerState::Off);

    // boards without a lid switch pass the button through
    system.button.set_ignore_lid(true);
    system.press(true);
    system.run(100);
    assert!(system.button.is_pressed());
}

#[test]
fn wake_pulse_only_when_off() {
    let mut system = System::running();
    system
        .button
        .wake_pulse(at(system.now), system.power.chipset_state(), WakeupCause::Watchdog);
    assert_eq!(system.button.state(), ButtonState::Idle);

    let mut system = off_system();
    system
        .button
        .wake_pulse(at(system.now), system.power.chipset_state(), WakeupCause::Watchdog);
    assert_eq!(system.button.state(), ButtonState::LidOpen);
    let reached = system.run_until(2_000, |s| s.power.current_power_state() == PowerState::On);
    assert!(reached);
}

#[test]
fn simulated_press_and_lock() {
    let mut system = System::running();
    system.button.simulate(at(system.now), true);
    system.run(1);
    assert!(system.button.is_pressed());
    system.button.simulate(at(system.now), false);
    system.run(1);
    assert!(!system.button.is_pressed());

    system.button.set_locked(at(system.now), true);
    system.press(true);
    system.run(100);
    assert!(!system.button.is_pressed());
    assert_eq!(system.button.state(), ButtonState::Idle);
}

#[test]
fn wait_for_release() {
    let mut system = System::running();
    let deadline = at(system.now + 1_000);
    assert_eq!(system.button.poll_release(at(system.now), deadline), Some(Ok(())));

    system.press(true);
    assert_eq!(system.button.poll_release(at(system.now), deadline), None);
    system.run(500);
    assert_eq!(system.button.poll_release(at(system.now), deadline), None);
    system.run(500);
    assert_eq!(
        system.button.poll_release(at(system.now), deadline),
        Some(Err(Timeout))
    );

    system.press(false);
    system.run(29);
    assert_eq!(
        system.button.poll_release(at(system.now), Instant::MAX),
        None
    );
    system.run(1);
    assert_eq!(
        system.button.poll_release(at(system.now), Instant::MAX),
        Some(Ok(()))
    );
}
