use alloc::vec::Vec;
use defmt::{debug, error, info, warn};
use ec_power::host_cmd::{self, Command, Query};
use ec_power::{ShutdownCause, WakeupCause};
use embassy_executor::task;
use embassy_rp::peripherals::I2C1;
use embassy_rp::{bind_interrupts, i2c, i2c_slave};
use embassy_time::Duration;

use crate::chipset;
use crate::config::{FW_VERSION, I2C_ADDR, RESET_RELEASE_TIMEOUT_MS};
use crate::config_resources::I2CSecondaryResources;
use crate::reset_flags::{self, ResetFlags};
use crate::tasks::cause_log;
use crate::tasks::config_manager::{
    get_ac_recovery_policy, get_hardware_version, get_lan_wake, get_led_brightness,
    set_ac_recovery_policy, set_lan_wake,
};
use crate::tasks::gpio_input::INPUTS;
use crate::tasks::host_watchdog::{HOST_WATCHDOG_EVENT_CHANNEL, get_wake_watchdog_status};
use crate::tasks::led_blinker::set_led_brightness;
use crate::tasks::power_button::{POWER_BUTTON_EVENT_CHANNEL, PowerButtonEvents};

// The register map is documented in `ec_power::host_cmd`.

bind_interrupts!(struct Irqs {
    I2C1_IRQ => i2c::InterruptHandler<I2C1>;
});

async fn respond(device: &mut i2c_slave::I2cSlave<'_, I2C1>, data: &[u8]) {
    if let Err(e) = device.respond_and_fill(data, 0x00).await {
        error!("error while responding {}", e)
    }
}

async fn answer(device: &mut i2c_slave::I2cSlave<'_, I2C1>, query: Query, payload: &[u8]) {
    match query {
        Query::HwVersion => respond(device, &get_hardware_version().await.to_be_bytes()).await,
        Query::FwVersion => respond(device, &FW_VERSION).await,
        Query::PowerState => respond(device, &[chipset::current_power_state() as u8]).await,
        Query::ButtonStatus => respond(device, &[chipset::button_status()]).await,
        Query::WakeWatchdog => {
            let (enabled, expiries) = get_wake_watchdog_status().await;
            respond(device, &[enabled as u8, expiries]).await
        }
        Query::AcRecoveryPolicy => respond(device, &[get_ac_recovery_policy().await as u8]).await,
        Query::LedBrightness => respond(device, &[get_led_brightness().await]).await,
        Query::LanWake => respond(device, &[get_lan_wake().await as u8]).await,
        Query::LastShutdownCause => {
            let code = cause_log::summary().last_shutdown.map_or(0, |c| c.code());
            respond(device, &code.to_be_bytes()).await
        }
        Query::LastWakeupCause => {
            let code = cause_log::summary().last_wakeup.map_or(0, |c| c.code());
            respond(device, &code.to_be_bytes()).await
        }
        Query::AbnormalShutdown => {
            respond(device, &[cause_log::summary().abnormal as u8]).await
        }
        Query::McuTemperature => {
            let temp = INPUTS.lock().await.mcu_temp;
            respond(device, &((temp * 100.0) as u16).to_be_bytes()).await
        }
        Query::Rail12V => {
            let v12 = INPUTS.lock().await.v12;
            respond(device, &((v12 * 1000.0) as u16).to_be_bytes()).await
        }
        Query::Ping => {
            debug!("Received ping command: {:02x}", payload);
            let response: Vec<u8> = payload.iter().rev().cloned().collect();
            respond(device, &response).await
        }
    }
}

async fn button_event(event: PowerButtonEvents) {
    POWER_BUTTON_EVENT_CHANNEL.send(event).await;
}

async fn execute(command: Command) {
    info!("Host command: {:?}", command);
    match command {
        Command::ForceShutdown => chipset::force_shutdown(ShutdownCause::HostRequest).await,
        Command::ForcePowerOff => chipset::force_power_off(ShutdownCause::HostRequest).await,
        Command::PowerOn => {
            button_event(PowerButtonEvents::WakePulse(WakeupCause::ButtonPowerOn)).await
        }
        Command::SimulatePress(pressed) => {
            button_event(PowerButtonEvents::Simulate(pressed)).await
        }
        Command::ResetController => {
            // A reset while the button is down would be read as a fresh press.
            let timeout = Duration::from_millis(RESET_RELEASE_TIMEOUT_MS);
            if chipset::wait_for_release(timeout).await.is_ok() {
                reset_flags::reset_with(ResetFlags::empty());
            }
            warn!("Controller reset refused, button still down");
        }
        Command::SetAcRecoveryPolicy(policy) => set_ac_recovery_policy(policy).await,
        Command::SetPulseEnabled(enabled) => {
            button_event(PowerButtonEvents::PulseEnable(enabled)).await
        }
        Command::SetButtonLock(locked) => button_event(PowerButtonEvents::Lock(locked)).await,
        Command::Watchdog(cmd) => HOST_WATCHDOG_EVENT_CHANNEL.send(cmd).await,
        Command::SetLedBrightness(brightness) => set_led_brightness(brightness).await,
        Command::SetLanWake(enabled) => {
            set_lan_wake(enabled).await;
            button_event(PowerButtonEvents::LanWakeEnable(enabled)).await
        }
    }
}

#[task]
pub async fn i2c_secondary_task(r: I2CSecondaryResources) {
    info!("Starting I2C secondary task");
    let mut config = i2c_slave::Config::default();
    config.addr = I2C_ADDR as u16;
    let mut device = i2c_slave::I2cSlave::new(r.i2c, r.scl, r.sda, Irqs, config);

    info!("I2C secondary task initialized");

    loop {
        let mut buf = [0u8; 32];
        match device.listen(&mut buf).await {
            Ok(i2c_slave::Command::GeneralCall(len)) => {
                error!("General call write received: {}", buf[..len]);
            }
            // A bare read returns the power state.
            Ok(i2c_slave::Command::Read) => loop {
                let state = chipset::current_power_state() as u8;
                match device.respond_to_read(&[state]).await {
                    Ok(i2c_slave::ReadStatus::Done) => break,
                    Ok(i2c_slave::ReadStatus::NeedMoreBytes) => (),
                    Ok(i2c_slave::ReadStatus::LeftoverBytes(x)) => {
                        info!("Left over bytes: {:?}", x);
                        break;
                    }
                    Err(e) => {
                        error!("Error responding to read: {:?}", e);
                        break;
                    }
                }
            },
            Ok(i2c_slave::Command::Write(len)) => match host_cmd::parse_write(&buf[..len]) {
                Ok(command) => execute(command).await,
                Err(e) => error!("Invalid Write command {:02x}: {:?}", buf[..len], e),
            },
            Ok(i2c_slave::Command::WriteRead(len)) => {
                if len == 0 {
                    error!("Empty Write Read command");
                    continue;
                }
                match host_cmd::parse_query(buf[0]) {
                    Ok(query) => answer(&mut device, query, &buf[1..len]).await,
                    Err(e) => error!("Invalid Write Read command 0x{:02x}: {:?}", buf[0], e),
                }
            }
            Err(e) => error!("{}", e),
        }
    }
}
