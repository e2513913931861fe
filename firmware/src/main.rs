#![no_std]
#![no_main]

extern crate alloc;

use config::FLASH_SIZE;
use embassy_rp::{flash::Async, watchdog::Watchdog};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embedded_alloc::LlffHeap as Heap;
use static_cell::StaticCell;

#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = 16384; // 16kB

use defmt::{error, info};
use embassy_executor::{SpawnError, Spawner};
use embassy_time::Duration;
use {defmt_rtt as _, panic_probe as _};

mod chipset;
mod config;
mod config_resources;
mod flash_layout;
mod led_patterns;
mod reset_flags;
mod tasks;

use crate::config_resources::{
    AnalogInputResources, AssignedResources, ExpanderResources, I2CSecondaryResources,
    LanWakeInputResources, LidInputResources, PowerButtonInputResources, PowerButtonResources,
    RGBLEDResources, RailOutputResources, SignalInputResources,
};
use crate::tasks::cause_log::init_cause_log;
use crate::tasks::config_manager::{MConfigManager, init_config_manager};

pub type FlashType<'a> =
    embassy_rp::flash::Flash<'a, embassy_rp::peripherals::FLASH, Async, FLASH_SIZE>;
pub type MFlashType<'a> = Mutex<CriticalSectionRawMutex, FlashType<'a>>;

static FLASH: StaticCell<MFlashType<'static>> = StaticCell::new();
static CONFIG_MANAGER: StaticCell<MConfigManager> = StaticCell::new();

fn check_spawn(name: &str, result: Result<(), SpawnError>) {
    if let Err(e) = result {
        error!("Failed to spawn {}: {:?}", name, e);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Initialize the allocator BEFORE you use it
    {
        use core::mem::MaybeUninit;
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(&raw mut HEAP_MEM as usize, HEAP_SIZE) }
    }

    let p = embassy_rp::init(Default::default());
    let r = split_resources!(p);

    info!("Starting up...");

    let reset_flags = reset_flags::take();
    info!("Reset flags: {:?}", reset_flags);

    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.start(Duration::from_millis(config::HW_WATCHDOG_TIMEOUT_MS));

    let flash = embassy_rp::flash::Flash::<embassy_rp::peripherals::FLASH, Async, FLASH_SIZE>::new(
        p.FLASH, p.DMA_CH1,
    );
    let flash: &'static MFlashType<'static> = FLASH.init(Mutex::new(flash));

    // Both power tasks read the persisted state during their init.
    info!("Initializing config manager...");
    let config_manager = CONFIG_MANAGER.init(init_config_manager(flash).await);
    init_cause_log(flash).await;
    info!("Config manager initialized.");

    check_spawn(
        "analog inputs",
        spawner.spawn(tasks::gpio_input::analog_input_task(r.analog_inputs)),
    );
    check_spawn(
        "power button input",
        spawner.spawn(tasks::gpio_input::power_button_input_task(
            r.power_button_input,
        )),
    );
    check_spawn(
        "lid input",
        spawner.spawn(tasks::gpio_input::lid_input_task(r.lid_input)),
    );
    check_spawn(
        "LAN wake input",
        spawner.spawn(tasks::gpio_input::lan_wake_input_task(r.lan_wake_input)),
    );
    check_spawn(
        "power sequencer",
        spawner.spawn(tasks::power_sequencer::power_sequencer_task(
            r.rail_outputs,
            r.expander,
            r.signal_inputs,
        )),
    );
    check_spawn(
        "power button",
        spawner.spawn(tasks::power_button::power_button_task(
            r.power_button,
            reset_flags,
        )),
    );
    check_spawn(
        "host watchdog",
        spawner.spawn(tasks::host_watchdog::host_watchdog_task()),
    );
    check_spawn(
        "I2C secondary",
        spawner.spawn(tasks::i2c_secondary::i2c_secondary_task(r.i2cs)),
    );
    check_spawn(
        "LED blinker",
        spawner.spawn(tasks::led_blinker::led_blinker_task(r.rgb_led)),
    );
    check_spawn(
        "config manager",
        spawner.spawn(tasks::config_manager::config_manager_task(config_manager)),
    );
    check_spawn(
        "cause log",
        spawner.spawn(tasks::cause_log::cause_log_task(flash)),
    );
    check_spawn(
        "watchdog feeder",
        spawner.spawn(tasks::watchdog_feeder::watchdog_feeder_task(watchdog)),
    );
}
