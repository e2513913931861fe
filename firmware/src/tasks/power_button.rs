use defmt::*;
use ec_power::config::ButtonTiming;
use ec_power::host_cmd::button_status;
use ec_power::policy::BootInfo;
use ec_power::sequence::ButtonRequest;
use ec_power::{ButtonInputs, Hook, PowerButton, PowerButtonBoard, WakeupCause};
use embassy_executor::task;
use embassy_rp::gpio::{Level, Output};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel, signal::Signal};
use embassy_time::{Duration, Instant, Ticker};

use crate::chipset;
use crate::config::{BUTTON_TICK_MS, VIN_READY_THRESHOLD};
use crate::config_resources::PowerButtonResources;
use crate::reset_flags::{self, ResetFlags};
use crate::tasks::cause_log::FlashCauseLog;
use crate::tasks::config_manager::get_power_policy;
use crate::tasks::gpio_input::INPUTS;
use crate::tasks::power_sequencer::{POWER_REQUEST_CHANNEL, POWER_SEQUENCER_READY};

#[derive(Clone, Copy, Format)]
pub enum PowerButtonEvents {
    LanWakeEdge(Instant),
    Lid(Instant, bool),
    /// Press or release requested by the power sequencer.
    Request(ButtonRequest),
    Hook(Hook),
    WakePulse(WakeupCause),
    Simulate(bool),
    Lock(bool),
    PulseEnable(bool),
    LanWakeEnable(bool),
}

pub type PowerButtonChannelType = channel::Channel<CriticalSectionRawMutex, PowerButtonEvents, 16>;
pub static POWER_BUTTON_EVENT_CHANNEL: PowerButtonChannelType = channel::Channel::new();
/// Requests and hooks from the power sequencer. Nothing else sends here, so
/// input bursts cannot crowd them out.
pub static SEQUENCER_EVENT_CHANNEL: PowerButtonChannelType = channel::Channel::new();

/// Time of the latest raw edge on the physical button. The debouncer only
/// restarts its window from the last edge, so a bounce burst collapses here.
pub static BUTTON_EDGE: Signal<CriticalSectionRawMutex, Instant> = Signal::new();

/// PWRBTN# towards the PCH plus the supply check.
struct RpButton {
    pwrbtn: Output<'static>,
    source_ready: bool,
}

impl PowerButtonBoard for RpButton {
    fn set_pwrbtn_to_pch(&mut self, high: bool) {
        debug!("PWRBTN# {}", if high { "released" } else { "asserted" });
        self.pwrbtn.set_level(if high { Level::High } else { Level::Low });
    }

    fn power_source_ready(&self) -> bool {
        self.source_ready
    }

    fn system_reset(&mut self) {
        reset_flags::reset_with(ResetFlags::AP_OFF);
    }
}

type Button = PowerButton<RpButton, FlashCauseLog>;

fn handle_event(button: &mut Button, now: Instant, event: PowerButtonEvents) {
    match event {
        PowerButtonEvents::LanWakeEdge(at) => button.on_lan_wake_edge(at),
        PowerButtonEvents::Lid(at, open) => button.set_lid_open(at, open),
        PowerButtonEvents::Request(request) => button.apply(request),
        PowerButtonEvents::Hook(hook) => button.on_hook(hook),
        PowerButtonEvents::WakePulse(cause) => {
            button.wake_pulse(now, chipset::chipset_state(), cause)
        }
        PowerButtonEvents::Simulate(pressed) => button.simulate(now, pressed),
        PowerButtonEvents::Lock(locked) => button.set_locked(now, locked),
        PowerButtonEvents::PulseEnable(enabled) => button.set_pulse_enabled(enabled),
        PowerButtonEvents::LanWakeEnable(enabled) => button.set_lan_wake_enabled(enabled),
    }
}

fn publish(button: &Button) {
    let status = button_status(
        button.is_pressed(),
        button.pulse_enabled(),
        button.is_locked(),
        button.hold_latched(),
    );
    chipset::publish_button(button.is_pressed(), button.is_stable(), status);
}

#[task]
pub async fn power_button_task(r: PowerButtonResources, reset_flags: ResetFlags) {
    info!("Starting power button task");

    // The boot decision needs the chipset state the sequencer found.
    POWER_SEQUENCER_READY.wait().await;

    let policy = get_power_policy().await;
    let info = BootInfo {
        jumped: false,
        chipset: chipset::chipset_state(),
        ap_off: reset_flags.contains(ResetFlags::AP_OFF),
        ap_idle: reset_flags.contains(ResetFlags::AP_IDLE),
        mfg_mode: policy.mfg_mode,
        ac_policy: policy.ac_policy,
        last_state: policy.last_power_state,
    };
    debug!("Boot info: {:?}", info);

    let (inputs, lid_open, source_ready) = {
        let inputs = INPUTS.lock().await;
        (
            ButtonInputs {
                button: inputs.pwr_btn,
                lan_wake: inputs.lan_wake,
            },
            inputs.lid_open,
            inputs.vin > VIN_READY_THRESHOLD,
        )
    };

    let board = RpButton {
        pwrbtn: Output::new(r.pin, Level::High),
        source_ready,
    };
    let mut button = PowerButton::new(board, FlashCauseLog, ButtonTiming::new());
    button.set_lan_wake_enabled(policy.lan_wake);

    let now = Instant::now();
    button.set_lid_open(now, lid_open);
    button.init(now, inputs, &info);
    publish(&button);

    let mut ticker = Ticker::every(Duration::from_millis(BUTTON_TICK_MS));
    let sequencer = SEQUENCER_EVENT_CHANNEL.receiver();
    let receiver = POWER_BUTTON_EVENT_CHANNEL.receiver();

    info!("Power button task initialized");

    loop {
        ticker.next().await;
        let now = Instant::now();

        if let Some(at) = BUTTON_EDGE.try_take() {
            button.on_raw_edge(at);
        }
        while let Ok(event) = sequencer.try_receive() {
            trace!("Sequencer event {:?}", event);
            handle_event(&mut button, now, event);
        }
        while let Ok(event) = receiver.try_receive() {
            trace!("Power button event {:?}", event);
            handle_event(&mut button, now, event);
        }

        let inputs = {
            let inputs = INPUTS.lock().await;
            button.board_mut().source_ready = inputs.vin > VIN_READY_THRESHOLD;
            ButtonInputs {
                button: inputs.pwr_btn,
                lan_wake: inputs.lan_wake,
            }
        };
        button.tick(now, inputs, chipset::chipset_state());
        publish(&button);

        for request in button.take_requests() {
            debug!("Button requests {:?}", request);
            if POWER_REQUEST_CHANNEL.try_send(request).is_err() {
                warn!("Power request channel full, dropping {:?}", request);
            }
        }
    }
}
