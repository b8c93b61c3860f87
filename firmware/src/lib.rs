//! TinyCon game controller firmware for RP2040.
//!
//! Board glue for [`tinycon_core`]: native pins, VBUS sensing, a DRV2605 on
//! I2C0, the USB HID interface and the status LED. The binary wires these
//! into embassy tasks.

#![no_std]

pub use tinycon_core::{
    IndicatorState, LedEffect, SystemConfig, TinyController, MPU_REPORT_SIZE,
};

pub mod board;
pub mod led;
pub mod usb_output;

pub use board::{AnalogStick, PicoPins, Rp2040Board, SharedSystem, VbusSense, I2C_ADDRESS};
pub use led::StatusLed;
pub use usb_output::{
    configure_usb_hid, write_reports, CommandHandler, DeviceHandler, HidLink, UsbState,
    REPORT_DESCRIPTOR,
};
