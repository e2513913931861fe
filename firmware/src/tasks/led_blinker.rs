use core::fmt;

use alloc::boxed::Box;
use alloc::vec::Vec;
use defmt::{debug, info};
use ec_power::ChipsetState;
use embassy_executor::task;
use embassy_rp::bind_interrupts;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel;
use embassy_time::{Duration, Instant, Ticker};

use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{Instance, InterruptHandler, Pio};
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use smart_leds::{RGB8, brightness, gamma};

use crate::chipset;
use crate::config::LED_UPDATE_MS;
use crate::config_resources::RGBLEDResources;
use crate::led_patterns::get_state_pattern;

pub const NUM_LEDS: usize = 1;

pub enum LEDBlinkerEvents {
    SetBrightness(u8),
}

pub type LEDBlinkerChannelType = channel::Channel<CriticalSectionRawMutex, LEDBlinkerEvents, 8>;
pub static LED_BLINKER_EVENT_CHANNEL: LEDBlinkerChannelType = channel::Channel::new();

/// One timed step of a pattern. `t` is the time in ms since the step started.
pub trait LEDPatternFragment: Send {
    fn duration_ms(&self) -> u32;
    fn run(&self, t: u32, leds: &mut [RGB8; NUM_LEDS]);
    fn type_name(&self) -> &'static str;
}

#[derive(Clone, Debug)]
pub struct OneColor {
    pub duration_ms: u32,
    pub color: RGB8,
}

impl OneColor {
    pub fn new(duration_ms: u32, color: RGB8) -> Self {
        Self { duration_ms, color }
    }
}

impl LEDPatternFragment for OneColor {
    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    fn run(&self, _t: u32, leds: &mut [RGB8; NUM_LEDS]) {
        leds.fill(self.color);
    }

    fn type_name(&self) -> &'static str {
        "OneColor"
    }
}

#[derive(Clone, Debug)]
pub struct Off {
    pub duration_ms: u32,
}

impl Off {
    pub fn new(duration: u32) -> Self {
        Self {
            duration_ms: duration,
        }
    }
}

impl LEDPatternFragment for Off {
    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    fn run(&self, _t: u32, leds: &mut [RGB8; NUM_LEDS]) {
        leds.fill(RGB8::default());
    }

    fn type_name(&self) -> &'static str {
        "Off"
    }
}

/// Triangle ramp from dark to `color` and back over the fragment duration.
#[derive(Clone, Debug)]
pub struct Breathe {
    pub duration_ms: u32,
    pub color: RGB8,
}

impl Breathe {
    pub fn new(duration_ms: u32, color: RGB8) -> Self {
        Self { duration_ms, color }
    }
}

impl LEDPatternFragment for Breathe {
    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    fn run(&self, t: u32, leds: &mut [RGB8; NUM_LEDS]) {
        let half = (self.duration_ms / 2).max(1);
        let t = t.min(self.duration_ms);
        let level = if t < half { t } else { self.duration_ms - t };
        let scale = |c: u8| (c as u32 * level.min(half) / half) as u8;
        leds.fill(RGB8 {
            r: scale(self.color.r),
            g: scale(self.color.g),
            b: scale(self.color.b),
        });
    }

    fn type_name(&self) -> &'static str {
        "Breathe"
    }
}

pub type FragmentVec = Vec<Box<dyn LEDPatternFragment>>;

pub struct LEDPattern {
    fragments: FragmentVec,
    current_fragment_idx: usize,
    current_fragment_start_ms: u64,
}

impl LEDPattern {
    pub fn new(fragments: FragmentVec) -> Self {
        Self {
            fragments,
            current_fragment_idx: 0,
            current_fragment_start_ms: Instant::now().as_millis(),
        }
    }

    fn update(&mut self, data: &mut [RGB8; NUM_LEDS]) {
        if self.fragments.is_empty() {
            return;
        }
        let now_ms = Instant::now().as_millis();
        let mut duration_ms = self.fragments[self.current_fragment_idx].duration_ms() as u64;

        while now_ms - self.current_fragment_start_ms > duration_ms {
            self.current_fragment_idx = (self.current_fragment_idx + 1) % self.fragments.len();
            self.current_fragment_start_ms += duration_ms;
            duration_ms = self.fragments[self.current_fragment_idx].duration_ms() as u64;
        }

        let t = (now_ms - self.current_fragment_start_ms) as u32;
        self.fragments[self.current_fragment_idx].run(t, data);
    }
}

impl fmt::Debug for LEDPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fragment_types: Vec<&str> = self.fragments.iter().map(|f| f.type_name()).collect();
        f.debug_struct("LEDPattern")
            .field("current_fragment_idx", &self.current_fragment_idx)
            .field("fragment_types", &fragment_types)
            .finish()
    }
}

struct LEDBlinker<'d, P: Instance, const S: usize> {
    ws2812: PioWs2812<'d, P, S, NUM_LEDS>,
    data: [RGB8; NUM_LEDS],
    pattern: LEDPattern,
    brightness: u8,
}

impl<'d, P: Instance, const S: usize> LEDBlinker<'d, P, S> {
    fn new(ws2812: PioWs2812<'d, P, S, NUM_LEDS>, pattern: LEDPattern, brightness: u8) -> Self {
        Self {
            ws2812,
            data: [RGB8::default(); NUM_LEDS],
            pattern,
            brightness,
        }
    }

    fn set_pattern(&mut self, pattern: LEDPattern) {
        debug!("LED pattern: {}", defmt::Debug2Format(&pattern));
        self.pattern = pattern;
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    async fn update(&mut self) {
        self.pattern.update(&mut self.data);

        let mut output_data = [RGB8::default(); NUM_LEDS];
        let corrected = brightness(gamma(self.data.iter().cloned()), self.brightness);
        for (out, color) in output_data.iter_mut().zip(corrected) {
            *out = color;
        }

        self.ws2812.write(&output_data).await;
    }
}

/// Persist the brightness and apply it right away.
pub async fn set_led_brightness(brightness: u8) {
    crate::tasks::config_manager::set_led_brightness(brightness).await;

    LED_BLINKER_EVENT_CHANNEL
        .send(LEDBlinkerEvents::SetBrightness(brightness))
        .await;
    info!("LED brightness set to {}", brightness);
}

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

#[task]
pub async fn led_blinker_task(r: RGBLEDResources) {
    info!("Initializing LED blinker task");
    let Pio {
        mut common, sm0, ..
    } = Pio::new(r.pio, Irqs);

    let program = PioWs2812Program::new(&mut common);
    let ws2812 = PioWs2812::new(&mut common, sm0, r.dma_ch, r.pin, &program);

    // The config is loaded before any task is spawned.
    let brightness = crate::tasks::config_manager::get_led_brightness().await;
    debug!("LED brightness from config: {}", brightness);

    let mut shown: ChipsetState = chipset::chipset_state();
    let mut led_blinker = LEDBlinker::new(ws2812, get_state_pattern(shown), brightness);

    let mut ticker = Ticker::every(Duration::from_millis(LED_UPDATE_MS));
    let receiver = LED_BLINKER_EVENT_CHANNEL.receiver();

    info!("LED blinker task initialized");

    loop {
        while let Ok(event) = receiver.try_receive() {
            match event {
                LEDBlinkerEvents::SetBrightness(brightness) => {
                    led_blinker.set_brightness(brightness)
                }
            }
        }

        let state = chipset::chipset_state();
        if state != shown {
            shown = state;
            led_blinker.set_pattern(get_state_pattern(state));
        }

        ticker.next().await;
        led_blinker.update().await;
    }
}
