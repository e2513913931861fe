use defmt::debug;
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Timer};

use crate::{chipset, tasks};

#[embassy_executor::task]
pub async fn watchdog_feeder_task(mut watchdog: Watchdog) {
    // A stalled executor lets the hardware watchdog restart the controller.

    loop {
        Timer::after(Duration::from_secs(1)).await;
        watchdog.feed();

        let inputs = tasks::gpio_input::INPUTS.lock().await;
        debug!(
            "power: {:?} | v12: {:?} | vin: {:?} | mcu_temp: {:?} | btn: {:?} | lid: {:?} | lan_wake: {:?}",
            chipset::current_power_state(),
            inputs.v12,
            inputs.vin,
            inputs.mcu_temp,
            inputs.pwr_btn,
            inputs.lid_open,
            inputs.lan_wake
        );
    }
}
