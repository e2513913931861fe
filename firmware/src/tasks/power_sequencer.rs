use alloc::vec::Vec;
use defmt::*;
use ec_power::config::PowerTiming;
use ec_power::policy::LastPowerState;
use ec_power::{Hook, Level, PowerBoard, PowerRequest, PowerSequencer, PowerSignals, Rail};
use embassy_executor::task;
use embassy_rp::gpio::{self, Input, Output, Pull};
use embassy_rp::i2c::{self, Blocking, I2c};
use embassy_rp::peripherals::I2C0;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker};
use embedded_hal::i2c::I2c as _;

use crate::chipset;
use crate::config::{EXPANDER_ADDR, POWER_TICK_MS};
use crate::config_resources::{ExpanderResources, RailOutputResources, SignalInputResources};
use crate::tasks::cause_log::FlashCauseLog;
use crate::tasks::config_manager::set_last_power_state;
use crate::tasks::gpio_input::INPUTS;
use crate::tasks::power_button::{PowerButtonEvents, SEQUENCER_EVENT_CHANNEL};

pub type PowerRequestChannelType = channel::Channel<CriticalSectionRawMutex, PowerRequest, 8>;
pub static POWER_REQUEST_CHANNEL: PowerRequestChannelType = channel::Channel::new();

/// Raised once the sequencer has seeded its state from the rails.
pub static POWER_SEQUENCER_READY: Signal<CriticalSectionRawMutex, ()> = Signal::new();

fn gpio_level(level: Level) -> gpio::Level {
    match level {
        Level::Low => gpio::Level::Low,
        Level::High => gpio::Level::High,
    }
}

const REG_OUTPUT_PORT0: u8 = 0x02;
const REG_CONFIG_PORT0: u8 = 0x06;
// Pin 7 is unused and stays an input.
const PORT0_OUTPUTS: u8 = 0b0111_1111;

/// PCA9555 port 0, driving the side-band rails that do not need GPIO speed.
struct Expander {
    i2c: I2c<'static, I2C0, Blocking>,
    output: u8,
    parked: bool,
}

impl Expander {
    fn new(r: ExpanderResources) -> Self {
        let i2c = I2c::new_blocking(r.i2c, r.scl, r.sda, i2c::Config::default());
        let output = EXPANDER_RAILS
            .iter()
            .enumerate()
            .filter(|(_, rail)| rail.off_level().is_high())
            .fold(0u8, |acc, (bit, _)| acc | 1 << bit);
        let mut expander = Expander {
            i2c,
            output,
            parked: true,
        };
        expander.unpark();
        expander
    }

    fn write(&mut self, reg: u8, value: u8) {
        if let Err(e) = self.i2c.write(EXPANDER_ADDR, &[reg, value]) {
            error!("Expander write {=u8:#x} failed: {:?}", reg, e);
        }
    }

    fn unpark(&mut self) {
        self.write(REG_OUTPUT_PORT0, self.output);
        self.write(REG_CONFIG_PORT0, !PORT0_OUTPUTS);
        self.parked = false;
    }

    fn set_pin(&mut self, bit: usize, level: Level) {
        let mask = 1u8 << bit;
        let output = if level.is_high() {
            self.output | mask
        } else {
            self.output & !mask
        };
        if output == self.output && !self.parked {
            return;
        }
        self.output = output;
        if self.parked {
            self.unpark();
        } else {
            self.write(REG_OUTPUT_PORT0, output);
        }
    }

    /// Float every expander pin so nothing back-powers the chipset.
    fn park(&mut self) {
        self.write(REG_CONFIG_PORT0, 0xff);
        self.parked = true;
    }
}

/// Rails on the expander, in pin order.
const EXPANDER_RAILS: [Rail; 7] = [
    Rail::UsbPwrEnL,
    Rail::FingerprintUsbEnL,
    Rail::UsbSwitchToHost,
    Rail::CompanionSlp,
    Rail::SidebandL,
    Rail::EcSlpS5L,
    Rail::EcSlpS4L,
];

/// GPIO outputs that are controlled by the power sequencer.
struct Rails {
    alw_en: Output<'static>,
    dsw_pwrok_en: Output<'static>,
    aux_1v8_en: Output<'static>,
    pch_rsmrst_l: Output<'static>,
    pson_l: Output<'static>,
    ec_slp_s3_l: Output<'static>,
    ec_slp_s3_pq_l: Output<'static>,
    vccst_pwrgd: Output<'static>,
    pch_pwrgd: Output<'static>,
    sys_reset_l: Output<'static>,
    pwrgd_140ms: Output<'static>,
    expander: Expander,
}

impl Rails {
    fn new(r: RailOutputResources, expander: ExpanderResources) -> Self {
        let off = |rail: Rail| gpio_level(rail.off_level());
        Rails {
            alw_en: Output::new(r.alw_en, off(Rail::AlwEn)),
            dsw_pwrok_en: Output::new(r.dsw_pwrok_en, off(Rail::DswPwrokEn)),
            aux_1v8_en: Output::new(r.aux_1v8_en, off(Rail::Aux1v8En)),
            pch_rsmrst_l: Output::new(r.pch_rsmrst_l, off(Rail::PchRsmrstL)),
            pson_l: Output::new(r.pson_l, off(Rail::PsonL)),
            ec_slp_s3_l: Output::new(r.ec_slp_s3_l, off(Rail::EcSlpS3L)),
            ec_slp_s3_pq_l: Output::new(r.ec_slp_s3_pq_l, off(Rail::EcSlpS3PqL)),
            vccst_pwrgd: Output::new(r.vccst_pwrgd, off(Rail::VccstPwrgd)),
            pch_pwrgd: Output::new(r.pch_pwrgd, off(Rail::PchPwrgd)),
            sys_reset_l: Output::new(r.sys_reset_l, off(Rail::SysResetL)),
            pwrgd_140ms: Output::new(r.pwrgd_140ms, off(Rail::Pwrgd140ms)),
            expander: Expander::new(expander),
        }
    }

    fn set(&mut self, rail: Rail, level: Level) {
        let pin = match rail {
            Rail::AlwEn => &mut self.alw_en,
            Rail::DswPwrokEn => &mut self.dsw_pwrok_en,
            Rail::Aux1v8En => &mut self.aux_1v8_en,
            Rail::PchRsmrstL => &mut self.pch_rsmrst_l,
            Rail::PsonL => &mut self.pson_l,
            Rail::EcSlpS3L => &mut self.ec_slp_s3_l,
            Rail::EcSlpS3PqL => &mut self.ec_slp_s3_pq_l,
            Rail::VccstPwrgd => &mut self.vccst_pwrgd,
            Rail::PchPwrgd => &mut self.pch_pwrgd,
            Rail::SysResetL => &mut self.sys_reset_l,
            Rail::Pwrgd140ms => &mut self.pwrgd_140ms,
            _ => {
                if let Some(bit) = EXPANDER_RAILS.iter().position(|r| *r == rail) {
                    self.expander.set_pin(bit, level);
                }
                return;
            }
        };
        pin.set_level(gpio_level(level));
    }
}

struct Signals {
    slp_sus_l: Input<'static>,
    system_alw_pg: Input<'static>,
    slp_s3_l: Input<'static>,
    slp_s4_l: Input<'static>,
    atx_pg: Input<'static>,
    vcore_en: Input<'static>,
    vrmpwrgd: Input<'static>,
    v3p3_sb_pgood: Input<'static>,
}

impl Signals {
    fn new(r: SignalInputResources) -> Self {
        Signals {
            slp_sus_l: Input::new(r.slp_sus_l, Pull::Down),
            system_alw_pg: Input::new(r.system_alw_pg, Pull::Down),
            slp_s3_l: Input::new(r.slp_s3_l, Pull::Down),
            slp_s4_l: Input::new(r.slp_s4_l, Pull::Down),
            atx_pg: Input::new(r.atx_pg, Pull::Down),
            vcore_en: Input::new(r.vcore_en, Pull::Down),
            vrmpwrgd: Input::new(r.vrmpwrgd, Pull::Down),
            v3p3_sb_pgood: Input::new(r.v3p3_sb_pgood, Pull::Down),
        }
    }
}

/// The board as seen by the power sequencer.
pub struct EcBoard {
    rails: Rails,
    signals: Signals,
    v12_good: bool,
    hooks: Vec<Hook>,
}

impl EcBoard {
    fn take_hooks(&mut self) -> Vec<Hook> {
        core::mem::take(&mut self.hooks)
    }
}

impl PowerBoard for EcBoard {
    fn read_signals(&mut self) -> PowerSignals {
        let s = &self.signals;
        let mut signals = PowerSignals::empty();
        signals.set(PowerSignals::SLP_SUS_N, s.slp_sus_l.is_high());
        signals.set(PowerSignals::SYSTEM_ALW_PG, s.system_alw_pg.is_high());
        signals.set(PowerSignals::SLP_S3_N, s.slp_s3_l.is_high());
        signals.set(PowerSignals::SLP_S4_N, s.slp_s4_l.is_high());
        signals.set(PowerSignals::ATX_PG, s.atx_pg.is_high());
        signals.set(PowerSignals::VCORE_EN, s.vcore_en.is_high());
        signals.set(PowerSignals::VRMPWRGD, s.vrmpwrgd.is_high());
        signals.set(PowerSignals::V3P3_SB_PGOOD, s.v3p3_sb_pgood.is_high());
        signals.set(PowerSignals::V12_PGOOD, self.v12_good);
        signals
    }

    fn set_rail(&mut self, rail: Rail, level: Level) {
        trace!("{:?} -> {:?}", rail, level);
        self.rails.set(rail, level);
    }

    fn notify(&mut self, hook: Hook) {
        debug!("Hook {:?}", hook);
        self.hooks.push(hook);
    }

    fn park_low_leakage(&mut self) {
        self.rails.expander.park();
    }
}

fn forward_to_button(event: PowerButtonEvents) {
    if SEQUENCER_EVENT_CHANNEL.try_send(event).is_err() {
        warn!("Sequencer event channel full, dropping {:?}", event);
    }
}

async fn dispatch_hook(hook: Hook) {
    forward_to_button(PowerButtonEvents::Hook(hook));
    match hook {
        Hook::Startup => set_last_power_state(LastPowerState::On).await,
        Hook::ShutdownComplete => set_last_power_state(LastPowerState::Off).await,
        _ => {}
    }
}

#[task]
pub async fn power_sequencer_task(
    rails: RailOutputResources,
    expander: ExpanderResources,
    signals: SignalInputResources,
) {
    info!("Starting power sequencer task");

    let board = EcBoard {
        rails: Rails::new(rails, expander),
        signals: Signals::new(signals),
        v12_good: INPUTS.lock().await.v12_good(),
        hooks: Vec::new(),
    };
    let mut sequencer = PowerSequencer::new(board, FlashCauseLog, PowerTiming::new());

    // Outputs do not survive a controller reset on this board, so the host
    // is never still running underneath us.
    sequencer.init(Instant::now(), false);
    chipset::publish_power_state(sequencer.current_power_state());
    POWER_SEQUENCER_READY.signal(());

    let mut ticker = Ticker::every(Duration::from_millis(POWER_TICK_MS));
    let receiver = POWER_REQUEST_CHANNEL.receiver();

    info!("Power sequencer task initialized");

    loop {
        ticker.next().await;
        let now = Instant::now();

        while let Ok(request) = receiver.try_receive() {
            debug!("Power request {:?}", request);
            sequencer.handle_request(now, request);
        }

        sequencer.board_mut().v12_good = INPUTS.lock().await.v12_good();
        sequencer.tick(now);
        chipset::publish_power_state(sequencer.current_power_state());

        for request in sequencer.take_button_requests() {
            forward_to_button(PowerButtonEvents::Request(request));
        }
        for hook in sequencer.board_mut().take_hooks() {
            dispatch_hook(hook).await;
        }
    }
}
