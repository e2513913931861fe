use defmt::{debug, error, info, warn};
use ec_power::policy::{AcRecoveryPolicy, LastPowerState};
use embassy_executor::task;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel;
use embassy_sync::mutex::Mutex;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{SerializationError, fetch_item, store_item};
use serde::{Deserialize, Serialize};

use crate::flash_layout::config_range;
use crate::{MFlashType, config::*};

#[derive(Debug, defmt::Format)]
pub enum ConfigError {
    // Flash operation errors
    Flash,
    // Other storage errors
    Storage,
    // Stored or received value does not decode
    Encoding,
}

impl From<embassy_rp::flash::Error> for ConfigError {
    fn from(_: embassy_rp::flash::Error) -> Self {
        ConfigError::Flash
    }
}

impl From<sequential_storage::Error<embassy_rp::flash::Error>> for ConfigError {
    fn from(_: sequential_storage::Error<embassy_rp::flash::Error>) -> Self {
        ConfigError::Storage
    }
}

impl From<SerializationError> for ConfigError {
    fn from(_: SerializationError) -> Self {
        ConfigError::Encoding
    }
}

impl From<postcard::Error> for ConfigError {
    fn from(_: postcard::Error) -> Self {
        ConfigError::Encoding
    }
}

#[derive(defmt::Format)]
pub enum ConfigManagerEvents {
    AcRecoveryPolicy(AcRecoveryPolicy),
    LastPowerState(LastPowerState),
    LanWake(bool),
    LedBrightness(u8),
}

pub type ConfigManagerChannelType =
    channel::Channel<CriticalSectionRawMutex, ConfigManagerEvents, 8>;
pub static CONFIG_MANAGER_EVENT_CHANNEL: ConfigManagerChannelType = channel::Channel::new();

// Configuration manager using sequential-storage
pub struct ConfigManager {
    flash: &'static MFlashType<'static>,
    data_buffer: [u8; 128],
}

impl ConfigManager {
    fn new(flash: &'static MFlashType<'static>) -> Self {
        Self {
            flash,
            data_buffer: [0u8; 128],
        }
    }

    /// Store a serializable value
    pub async fn set<T>(&mut self, key: u16, value: &T) -> Result<(), ConfigError>
    where
        T: for<'de> Deserialize<'de> + Serialize + for<'b> sequential_storage::map::Value<'b>,
    {
        debug!("Storing item with key: {}", key);

        let mut flash = self.flash.lock().await;

        store_item(
            &mut *flash,
            config_range(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
            value,
        )
        .await
        .map_err(|e| {
            error!(
                "Failed to store item with key: {}: {}",
                key,
                defmt::Debug2Format(&e)
            );
            ConfigError::from(e)
        })
    }

    // Retrieve a value or None if not found
    pub async fn get<T>(&mut self, key: u16) -> Result<Option<T>, ConfigError>
    where
        T: for<'de> Deserialize<'de> + Serialize + for<'b> sequential_storage::map::Value<'b>,
    {
        debug!("Fetching item with key: {}", key);

        let mut flash = self.flash.lock().await;

        let result = fetch_item(
            &mut *flash,
            config_range(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
        )
        .await;

        match result {
            Ok(value) => {
                if value.is_none() {
                    debug!("No item found with key: {}", key);
                }
                Ok(value)
            }
            Err(e) => {
                error!(
                    "Failed to fetch item with key: {}: {}",
                    key,
                    defmt::Debug2Format(&e)
                );
                Err(ConfigError::from(e))
            }
        }
    }

    async fn get_or<T>(&mut self, key: u16, default: T) -> T
    where
        T: for<'de> Deserialize<'de> + Serialize + for<'b> sequential_storage::map::Value<'b>,
    {
        self.get(key).await.unwrap_or(None).unwrap_or(default)
    }
}

/// Runtime configuration values, read from the flash storage and stored here
/// to prevent multiple reads from the flash.
struct RuntimeConfig {
    ac_policy: AcRecoveryPolicy,
    last_power_state: LastPowerState,
    mfg_mode: bool,
    lan_wake: bool,
    led_brightness: u8,
    hardware_version: u32,
}

impl RuntimeConfig {
    const fn new() -> Self {
        RuntimeConfig {
            ac_policy: AcRecoveryPolicy::AlwaysOn,
            last_power_state: LastPowerState::On,
            mfg_mode: false,
            lan_wake: false,
            led_brightness: DEFAULT_LED_BRIGHTNESS,
            hardware_version: DEFAULT_HARDWARE_VERSION,
        }
    }
}

static RUNTIME_CONFIG: Mutex<CriticalSectionRawMutex, RuntimeConfig> =
    Mutex::new(RuntimeConfig::new());

/// Persisted settings the power button machine needs at boot.
#[derive(Clone, Copy, defmt::Format)]
pub struct PowerPolicy {
    pub ac_policy: AcRecoveryPolicy,
    pub last_power_state: LastPowerState,
    pub mfg_mode: bool,
    pub lan_wake: bool,
}

pub async fn get_power_policy() -> PowerPolicy {
    let config = RUNTIME_CONFIG.lock().await;
    PowerPolicy {
        ac_policy: config.ac_policy,
        last_power_state: config.last_power_state,
        mfg_mode: config.mfg_mode,
        lan_wake: config.lan_wake,
    }
}

pub async fn get_ac_recovery_policy() -> AcRecoveryPolicy {
    RUNTIME_CONFIG.lock().await.ac_policy
}

pub async fn get_lan_wake() -> bool {
    RUNTIME_CONFIG.lock().await.lan_wake
}

pub async fn get_led_brightness() -> u8 {
    RUNTIME_CONFIG.lock().await.led_brightness
}

pub async fn get_hardware_version() -> u32 {
    RUNTIME_CONFIG.lock().await.hardware_version
}

pub async fn set_ac_recovery_policy(value: AcRecoveryPolicy) {
    RUNTIME_CONFIG.lock().await.ac_policy = value;
    CONFIG_MANAGER_EVENT_CHANNEL
        .send(ConfigManagerEvents::AcRecoveryPolicy(value))
        .await;
}

pub async fn set_last_power_state(value: LastPowerState) {
    {
        let mut config = RUNTIME_CONFIG.lock().await;
        if config.last_power_state == value {
            return;
        }
        config.last_power_state = value;
    }
    CONFIG_MANAGER_EVENT_CHANNEL
        .send(ConfigManagerEvents::LastPowerState(value))
        .await;
}

pub async fn set_lan_wake(value: bool) {
    RUNTIME_CONFIG.lock().await.lan_wake = value;
    CONFIG_MANAGER_EVENT_CHANNEL
        .send(ConfigManagerEvents::LanWake(value))
        .await;
}

pub async fn set_led_brightness(value: u8) {
    RUNTIME_CONFIG.lock().await.led_brightness = value;
    CONFIG_MANAGER_EVENT_CHANNEL
        .send(ConfigManagerEvents::LedBrightness(value))
        .await;
}

pub async fn init_config_manager(flash: &'static MFlashType<'static>) -> MConfigManager {
    let config_manager_mutex = MConfigManager::new(ConfigManager::new(flash));

    {
        let mut config_manager = config_manager_mutex.lock().await;

        let raw_policy = config_manager
            .get_or::<u8>(AC_RECOVERY_POLICY_CONFIG_KEY, AcRecoveryPolicy::default() as u8)
            .await;
        let ac_policy = AcRecoveryPolicy::try_from(raw_policy).unwrap_or_else(|raw| {
            warn!("Ignoring stored AC recovery policy {}", raw);
            AcRecoveryPolicy::default()
        });
        debug!("Received AC recovery policy: {}", ac_policy);

        let last_power_state = match config_manager
            .get_or::<u8>(LAST_POWER_STATE_CONFIG_KEY, LastPowerState::On as u8)
            .await
        {
            raw if raw == LastPowerState::Off as u8 => LastPowerState::Off,
            _ => LastPowerState::On,
        };
        debug!("Received last power state: {}", last_power_state);

        let mfg_mode = config_manager.get_or::<bool>(MFG_MODE_CONFIG_KEY, false).await;
        let lan_wake = config_manager.get_or::<bool>(LAN_WAKE_CONFIG_KEY, false).await;
        let led_brightness = config_manager
            .get_or::<u8>(LED_BRIGHTNESS_CONFIG_KEY, DEFAULT_LED_BRIGHTNESS)
            .await;
        let hardware_version = config_manager
            .get_or::<u32>(HARDWARE_VERSION_CONFIG_KEY, DEFAULT_HARDWARE_VERSION)
            .await;
        debug!(
            "mfg mode: {}, LAN wake: {}, LED brightness: {}",
            mfg_mode, lan_wake, led_brightness
        );

        let mut runtime_config = RUNTIME_CONFIG.lock().await;
        runtime_config.ac_policy = ac_policy;
        runtime_config.last_power_state = last_power_state;
        runtime_config.mfg_mode = mfg_mode;
        runtime_config.lan_wake = lan_wake;
        runtime_config.led_brightness = led_brightness;
        runtime_config.hardware_version = hardware_version;
    }
    info!("Runtime configuration updated");
    config_manager_mutex
}

pub type MConfigManager = Mutex<CriticalSectionRawMutex, ConfigManager>;

// The config is loaded in main so that the power tasks start with it.
#[task]
pub async fn config_manager_task(config_manager_mutex: &'static MConfigManager) {
    info!("Starting config manager task");

    let receiver = CONFIG_MANAGER_EVENT_CHANNEL.receiver();

    info!("Config manager task initialized");

    loop {
        let event = receiver.receive().await;
        debug!("Received config manager event: {:?}", event);

        let mut config_manager = config_manager_mutex.lock().await;

        // A failed write leaves the runtime value in place until the next boot.
        let result = match event {
            ConfigManagerEvents::AcRecoveryPolicy(value) => {
                config_manager
                    .set(AC_RECOVERY_POLICY_CONFIG_KEY, &(value as u8))
                    .await
            }
            ConfigManagerEvents::LastPowerState(value) => {
                config_manager
                    .set(LAST_POWER_STATE_CONFIG_KEY, &(value as u8))
                    .await
            }
            ConfigManagerEvents::LanWake(value) => {
                config_manager.set(LAN_WAKE_CONFIG_KEY, &value).await
            }
            ConfigManagerEvents::LedBrightness(value) => {
                config_manager.set(LED_BRIGHTNESS_CONFIG_KEY, &value).await
            }
        };
        if let Err(e) = result {
            warn!("Config not persisted: {:?}", e);
        }
    }
}
