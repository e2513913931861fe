use alloc::boxed::Box;
use alloc::vec;
use ec_power::ChipsetState;
use smart_leds::colors::*;

use crate::tasks::led_blinker::*;

// Power LED patterns for each chipset state

pub fn get_state_pattern(state: ChipsetState) -> LEDPattern {
    match state {
        ChipsetState::HardOff | ChipsetState::SoftOff => {
            LEDPattern::new(vec![Box::new(Off::new(1000))])
        }
        ChipsetState::Suspend => LEDPattern::new(vec![
            Box::new(Breathe::new(2000, WHITE)),
            Box::new(Off::new(1000)),
        ]),
        ChipsetState::On => LEDPattern::new(vec![Box::new(OneColor::new(1000, WHITE))]),
    }
}
