//! Single on-board LED standing in for the blue and red indicators.

use embassy_rp::gpio::Output;
use tinycon_core::{IndicatorState, LedEffect};

/// Render period expected by [`StatusLed::render`].
pub const FRAME_MS: u64 = 50;

const PULSE_PERIOD_MS: u64 = 3000;
const PULSE_ON_MS: u64 = 100;
const FADE_PERIOD_MS: u64 = 1000;

pub struct StatusLed {
    pin: Output<'static>,
}

impl StatusLed {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }

    /// Bluetooth takes precedence over the power/wired indicator. There is
    /// no PWM here, so a fade is shown as a slow blink.
    pub fn render(&mut self, state: &IndicatorState, now_ms: u64) {
        let effect = if state.suspended {
            LedEffect::Off
        } else if state.blue != LedEffect::Off {
            state.blue
        } else {
            state.red
        };

        let lit = match effect {
            LedEffect::Off => false,
            LedEffect::On => true,
            LedEffect::Pulse => now_ms % PULSE_PERIOD_MS < PULSE_ON_MS,
            LedEffect::Fade => now_ms % FADE_PERIOD_MS < FADE_PERIOD_MS / 2,
        };
        if lit {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}
