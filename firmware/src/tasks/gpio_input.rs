use defmt::*;
use ec_power::{ShutdownCause, ThermalGuard};
use embassy_executor::task;
use embassy_rp::{
    adc::{Adc, Channel, Config, InterruptHandler},
    bind_interrupts,
    gpio::{Input, Pull},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::{Duration, Instant, Ticker};

use crate::chipset;
use crate::config::{
    ANALOG_SAMPLE_MS, THERMAL_RELEASE_TEMPERATURE, THERMAL_SHUTDOWN_TEMPERATURE, V12_MAX_VALUE,
    V12_PGOOD_MAX, V12_PGOOD_MIN, VIN_MAX_VALUE,
};
use crate::config_resources::{
    AnalogInputResources, LanWakeInputResources, LidInputResources, PowerButtonInputResources,
};
use crate::tasks::power_button::{BUTTON_EDGE, POWER_BUTTON_EVENT_CHANNEL, PowerButtonEvents};

/// Input values that are read by the input tasks and consumed by other tasks.
#[derive(Clone, Format)]
pub struct Inputs {
    pub v12: f32,
    pub vin: f32,
    pub mcu_temp: f32,
    /// Physical power button is down.
    pub pwr_btn: bool,
    pub lid_open: bool,
    pub lan_wake: bool,
}

impl Inputs {
    const fn new() -> Self {
        Self {
            v12: 0.,
            vin: 0.,
            mcu_temp: 0.,
            pwr_btn: false,
            lid_open: true,
            lan_wake: false,
        }
    }

    pub fn v12_good(&self) -> bool {
        (V12_PGOOD_MIN..=V12_PGOOD_MAX).contains(&self.v12)
    }
}

/// Shared inputs protected by a mutex.
pub static INPUTS: Mutex<CriticalSectionRawMutex, Inputs> = Mutex::new(Inputs::new());

const AVERAGE_SAMPLES: usize = 10;

struct AveragedInput {
    samples: [f32; AVERAGE_SAMPLES],
    index: usize,
    sum: f32,
    count: usize,
}

impl AveragedInput {
    fn new() -> Self {
        Self {
            samples: [0.0; AVERAGE_SAMPLES],
            index: 0,
            sum: 0.0,
            count: 0,
        }
    }

    fn add_sample(&mut self, value: f32) {
        if self.count < AVERAGE_SAMPLES {
            self.count += 1;
        } else {
            self.sum -= self.samples[self.index];
        }
        self.samples[self.index] = value;
        self.sum += value;
        self.index = (self.index + 1) % AVERAGE_SAMPLES;
    }

    fn average(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f32
        }
    }
}

#[task]
pub async fn power_button_input_task(r: PowerButtonInputResources) {
    info!("Starting power button input task");

    let mut button = Input::new(r.pin, Pull::Up);
    INPUTS.lock().await.pwr_btn = button.is_low();

    info!("Power button input task initialized");

    loop {
        button.wait_for_any_edge().await;
        let now = Instant::now();
        let pressed = button.is_low();
        trace!("Power button edge, pressed: {}", pressed);
        INPUTS.lock().await.pwr_btn = pressed;
        // The button machine debounces from the edge time, not the level.
        BUTTON_EDGE.signal(now);
    }
}

#[task]
pub async fn lid_input_task(r: LidInputResources) {
    info!("Starting lid input task");

    let mut lid = Input::new(r.pin, Pull::Up);
    INPUTS.lock().await.lid_open = lid.is_high();

    info!("Lid input task initialized");

    loop {
        lid.wait_for_any_edge().await;
        let open = lid.is_high();
        debug!("Lid open: {}", open);
        INPUTS.lock().await.lid_open = open;
        POWER_BUTTON_EVENT_CHANNEL
            .send(PowerButtonEvents::Lid(Instant::now(), open))
            .await;
    }
}

#[task]
pub async fn lan_wake_input_task(r: LanWakeInputResources) {
    info!("Starting LAN wake input task");

    let mut wake = Input::new(r.pin, Pull::Up);

    info!("LAN wake input task initialized");

    loop {
        wake.wait_for_any_edge().await;
        let asserted = wake.is_low();
        INPUTS.lock().await.lan_wake = asserted;
        if asserted {
            POWER_BUTTON_EVENT_CHANNEL
                .send(PowerButtonEvents::LanWakeEdge(Instant::now()))
                .await;
        }
    }
}

const V12_ADC_SCALE: f32 = V12_MAX_VALUE / 4096.0; // Scale factor for 12 V readings
const VIN_ADC_SCALE: f32 = VIN_MAX_VALUE / 4096.0; // Scale factor for Vin readings

bind_interrupts!(struct Irqs {
    ADC_IRQ_FIFO => InterruptHandler;
});

#[task]
pub async fn analog_input_task(r: AnalogInputResources) {
    info!("Starting analog input task");
    let mut adc = Adc::new(r.adc, Irqs, Config::default());
    let mut v12s = Channel::new_pin(r.v12_s, Pull::None);
    let mut vins = Channel::new_pin(r.vin_s, Pull::None);
    let mut mcu_temp = Channel::new_temp_sensor(r.temp_sensor);

    let mut ticker = Ticker::every(Duration::from_millis(ANALOG_SAMPLE_MS));

    info!("Analog input task initialized");

    let mut v12_avg = AveragedInput::new();
    let mut vin_avg = AveragedInput::new();
    let mut mcu_temp_avg = AveragedInput::new();
    let mut thermal = ThermalGuard::new(THERMAL_SHUTDOWN_TEMPERATURE, THERMAL_RELEASE_TEMPERATURE);

    loop {
        ticker.next().await;

        let v12_value = adc.read(&mut v12s).await.unwrap_or(0);
        let vin_value = adc.read(&mut vins).await.unwrap_or(0);
        let mcu_temp_value = adc.read(&mut mcu_temp).await.unwrap_or(0);

        v12_avg.add_sample(v12_value as f32 * V12_ADC_SCALE);
        vin_avg.add_sample(vin_value as f32 * VIN_ADC_SCALE);
        mcu_temp_avg.add_sample(
            27.0 - (mcu_temp_value as f32 * 3.3 / 4096.0 - 0.706) / 0.001721 + 273.15,
        );

        let temperature = {
            let mut inputs = INPUTS.lock().await;
            inputs.v12 = v12_avg.average();
            inputs.vin = vin_avg.average();
            inputs.mcu_temp = mcu_temp_avg.average();
            trace!(
                "V12: {}, VIN: {}, MCU: {}",
                inputs.v12, inputs.vin, inputs.mcu_temp
            );
            inputs.mcu_temp
        };

        if thermal.check(temperature, chipset::chipset_state()) {
            error!("MCU at {} K, cutting power", temperature);
            chipset::force_power_off(ShutdownCause::Thermal).await;
        }
    }
}
