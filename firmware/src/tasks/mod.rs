pub(crate) mod cause_log;
pub(crate) mod config_manager;
pub(crate) mod gpio_input;
pub(crate) mod host_watchdog;
pub(crate) mod i2c_secondary;
pub(crate) mod led_blinker;
pub(crate) mod power_button;
pub(crate) mod power_sequencer;
pub(crate) mod watchdog_feeder;
