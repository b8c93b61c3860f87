//! RP2040 (Raspberry Pi Pico) board glue.
//!
//! Pin map:
//!
//! | Function            | Pins                 |
//! |---------------------|----------------------|
//! | I2C slave (I2C1)    | GP2 SDA, GP3 SCL     |
//! | DRV2605 (I2C0)      | GP4 SDA, GP5 SCL     |
//! | Left buttons        | GP6..GP10 (GP10 = select) |
//! | Right buttons       | GP11..GP15 (up, right, down, left, extra) |
//! | Left stick          | GP26, GP27 (ADC0, ADC1) |
//! | VBUS sense          | GP24                 |
//! | Status LED          | GP25                 |

use core::cell::RefCell;

use embassy_rp::adc::{self, Adc};
use embassy_rp::gpio::Input;
use embassy_rp::i2c::{Blocking, I2c};
use embassy_rp::peripherals::I2C0;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use tinycon_core::{Board, Drv2605, NoDevice, PinBank, PowerSampler, TinyController};

use crate::usb_output::HidLink;

/// Slave address the controller answers to on the expansion bus.
pub const I2C_ADDRESS: u16 = 0x54;

/// The one controller instance, shared by every task.
pub type SharedSystem = Mutex<CriticalSectionRawMutex, RefCell<TinyController<Rp2040Board>>>;

pub struct Rp2040Board;

impl Board for Rp2040Board {
    type Seesaw = NoDevice;
    type Pins = PicoPins;
    type Imu = NoDevice;
    type Haptic = Drv2605<I2c<'static, I2C0, Blocking>>;
    type Power = VbusSense;
    type Ble = NoDevice;
    type Usb = HidLink;
}

/// Two-axis stick on the ADC.
pub struct AnalogStick {
    adc: Adc<'static, adc::Blocking>,
    channels: [adc::Channel<'static>; 2],
}

impl AnalogStick {
    pub fn new(adc: Adc<'static, adc::Blocking>, channels: [adc::Channel<'static>; 2]) -> Self {
        Self { adc, channels }
    }
}

/// Five pulled-up buttons and an optional stick.
pub struct PicoPins {
    buttons: [Input<'static>; 5],
    stick: Option<AnalogStick>,
}

impl PicoPins {
    pub fn new(buttons: [Input<'static>; 5], stick: Option<AnalogStick>) -> Self {
        Self { buttons, stick }
    }
}

impl PinBank for PicoPins {
    const FULL_SCALE: u16 = 4096;

    fn axis_count(&self) -> usize {
        self.stick.as_ref().map_or(0, |stick| stick.channels.len())
    }

    fn button_count(&self) -> usize {
        self.buttons.len()
    }

    fn read_axis(&mut self, index: usize) -> u16 {
        let centre = Self::FULL_SCALE / 2;
        let Some(AnalogStick { adc, channels }) = self.stick.as_mut() else {
            return centre;
        };
        channels
            .get_mut(index)
            .and_then(|channel| adc.blocking_read(channel).ok())
            .unwrap_or(centre)
    }

    fn read_level(&mut self, index: usize) -> bool {
        self.buttons.get(index).is_some_and(Input::is_high)
    }
}

/// The Pico routes VBUS presence to GP24. There is no battery sense, so
/// without VBUS the board is assumed to run off the I2C master.
pub struct VbusSense {
    vbus: Input<'static>,
}

impl VbusSense {
    pub fn new(vbus: Input<'static>) -> Self {
        Self { vbus }
    }
}

impl PowerSampler for VbusSense {
    fn usb_voltage(&mut self) -> Option<f32> {
        Some(if self.vbus.is_high() { 5.0 } else { 0.0 })
    }

    fn battery_voltage(&mut self) -> Option<f32> {
        None
    }
}
