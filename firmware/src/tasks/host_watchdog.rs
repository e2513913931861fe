use defmt::{debug, info, warn};
use ec_power::host_cmd::WatchdogCommand;
use ec_power::watchdog::{ShutdownWatchdog, WakeWatchdog, WatchdogAction};
use ec_power::WakeupCause;
use embassy_executor::task;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel, mutex::Mutex};
use embassy_time::{Duration, Instant, Ticker};

use crate::chipset;
use crate::config::SOFT_WATCHDOG_PERIOD_MS;
use crate::tasks::power_button::{POWER_BUTTON_EVENT_CHANNEL, PowerButtonEvents};

struct HostWatchdogs {
    wake: WakeWatchdog,
    shutdown: ShutdownWatchdog,
}

static HOST_WATCHDOGS: Mutex<CriticalSectionRawMutex, HostWatchdogs> = Mutex::new(HostWatchdogs {
    wake: WakeWatchdog::new(),
    shutdown: ShutdownWatchdog::new(),
});

/// Wake watchdog `(enabled, expiries)` as reported to the host.
pub async fn get_wake_watchdog_status() -> (bool, u8) {
    let watchdogs = HOST_WATCHDOGS.lock().await;
    (watchdogs.wake.is_enabled(), watchdogs.wake.expiries())
}

type HostWatchdogChannelType = channel::Channel<CriticalSectionRawMutex, WatchdogCommand, 8>;
pub static HOST_WATCHDOG_EVENT_CHANNEL: HostWatchdogChannelType = channel::Channel::new();

async fn perform(action: WatchdogAction) {
    match action {
        WatchdogAction::ForceShutdown(cause) => {
            warn!("Host watchdog forcing shutdown");
            chipset::force_shutdown(cause).await;
        }
        WatchdogAction::PowerOnPulse => {
            info!("Host watchdog powering the system back on");
            if POWER_BUTTON_EVENT_CHANNEL
                .try_send(PowerButtonEvents::WakePulse(WakeupCause::Watchdog))
                .is_err()
            {
                warn!("Power button channel full, watchdog power-on dropped");
            }
        }
    }
}

// Both host watchdogs count in whole seconds. Commands from the host are
// applied as they arrive, the countdown runs on the ticker.
#[task]
pub async fn host_watchdog_task() {
    info!("Starting host watchdog task");

    let mut ticker = Ticker::every(Duration::from_millis(SOFT_WATCHDOG_PERIOD_MS));
    let receiver = HOST_WATCHDOG_EVENT_CHANNEL.receiver();

    info!("Host watchdog task initialized");

    loop {
        ticker.next().await;

        let actions = {
            let mut watchdogs = HOST_WATCHDOGS.lock().await;
            while let Ok(command) = receiver.try_receive() {
                debug!("Host watchdog command: {:?}", command);
                match command {
                    WatchdogCommand::ArmWake(secs) => watchdogs.wake.arm(secs),
                    WatchdogCommand::DisarmWake => watchdogs.wake.disarm(),
                    WatchdogCommand::ArmShutdown(secs) => watchdogs.shutdown.arm(secs),
                    WatchdogCommand::DisarmShutdown => watchdogs.shutdown.disarm(),
                }
            }

            let state = chipset::chipset_state();
            [
                watchdogs.wake.service(Instant::now(), state),
                watchdogs.shutdown.service(state),
            ]
        };

        for action in actions.into_iter().flatten() {
            perform(action).await;
        }
    }
}
