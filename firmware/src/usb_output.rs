//! USB HID interface: gamepad, MPU and command reports on one interface.

use embassy_futures::select::{select, Either};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_usb::class::hid::{
    self, HidReaderWriter, HidWriter, ReportId as HidReportId, RequestHandler, State,
};
use embassy_usb::control::OutResponse;
use embassy_usb::{Builder, Handler};
use portable_atomic::{AtomicBool, Ordering};
use tinycon_core::{GamepadReport, ReportId, TransportError, UsbLink, MPU_REPORT_SIZE};
use tinycon_proto::MAX_COMMAND_SIZE;

use crate::board::SharedSystem;

/// Largest report on the wire: report ID plus the MPU payload.
pub const MAX_REPORT_SIZE: usize = 64;

/// HID report descriptor.
///
/// - Report 1: gamepad, six signed 8-bit axes, hat switch, 32 buttons
/// - Report 2: vendor in/out, one 20-byte IMU block per slot
/// - Report 3: vendor in/out, raw command frames
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x01, //   Report ID (1)
    //
    // --- Axes: X, Y, Z, Rz, Rx, Ry ---
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x09, 0x33, //   Usage (Rx)
    0x09, 0x34, //   Usage (Ry)
    0x15, 0x81, //   Logical Minimum (-127)
    0x25, 0x7F, //   Logical Maximum (127)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Hat switch (0 = centered) ---
    0x09, 0x39, //   Usage (Hat switch)
    0x15, 0x01, //   Logical Minimum (1)
    0x25, 0x08, //   Logical Maximum (8)
    0x35, 0x00, //   Physical Minimum (0)
    0x46, 0x3B, 0x01, //   Physical Maximum (315)
    0x65, 0x14, //   Unit (Degrees)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x42, //   Input (Data, Variable, Absolute, Null State)
    0x65, 0x00, //   Unit (None)
    //
    // --- Buttons (32) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x20, //   Usage Maximum (Button 32)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x20, //   Report Count (32)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0xC0, // End Collection
    //
    0x06, 0x00, 0xFF, // Usage Page (Vendor 0xFF00)
    0x09, 0x01, // Usage (1)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x02, //   Report ID (2)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, MPU_REPORT_SIZE as u8, //   Report Count
    0x09, 0x02, //   Usage (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x03, //   Usage (3)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0xC0, // End Collection
    //
    0x06, 0x00, 0xFF, // Usage Page (Vendor 0xFF00)
    0x09, 0x01, // Usage (1)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x03, //   Report ID (3)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, MAX_COMMAND_SIZE as u8, //   Report Count
    0x09, 0x02, //   Usage (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x03, //   Usage (3)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0xC0, // End Collection
];

/// State shared between the tick (through [`HidLink`]) and the USB tasks.
pub struct UsbState {
    mounted: AtomicBool,
    ready: AtomicBool,
    gamepad: Signal<CriticalSectionRawMutex, [u8; GamepadReport::SIZE]>,
    mpu: Signal<CriticalSectionRawMutex, [u8; MPU_REPORT_SIZE]>,
}

impl UsbState {
    pub const fn new() -> Self {
        Self {
            mounted: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            gamepad: Signal::new(),
            mpu: Signal::new(),
        }
    }
}

impl Default for UsbState {
    fn default() -> Self {
        Self::new()
    }
}

/// [`UsbLink`] for the tick. Reports are handed to the writer task with
/// latest-value semantics, so a slow host only ever sees fresh data.
pub struct HidLink {
    state: &'static UsbState,
}

impl HidLink {
    pub fn new(state: &'static UsbState) -> Self {
        Self { state }
    }
}

impl UsbLink for HidLink {
    fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::Relaxed)
    }

    fn send_report(&mut self, id: ReportId, data: &[u8]) -> Result<(), TransportError> {
        match id {
            ReportId::Gamepad => {
                let report = data.try_into().map_err(|_| TransportError::Io)?;
                self.state.gamepad.signal(report);
            }
            ReportId::Mpu => {
                let report = data.try_into().map_err(|_| TransportError::Io)?;
                self.state.mpu.signal(report);
            }
            // Command reports are host-driven
            ReportId::Command => return Err(TransportError::NotReady),
        }
        Ok(())
    }
}

/// Tracks enumeration for [`UsbLink::is_mounted`].
pub struct DeviceHandler {
    state: &'static UsbState,
}

impl DeviceHandler {
    pub fn new(state: &'static UsbState) -> Self {
        Self { state }
    }
}

impl Handler for DeviceHandler {
    fn configured(&mut self, configured: bool) {
        defmt::info!("USB configured: {}", configured);
        self.state.mounted.store(configured, Ordering::Relaxed);
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            self.state.mounted.store(false, Ordering::Relaxed);
        }
    }

    fn reset(&mut self) {
        self.state.mounted.store(false, Ordering::Relaxed);
    }
}

/// Routes command report 3 into the controller, on both the control pipe
/// (SET_REPORT / GET_REPORT) and the interrupt OUT endpoint.
///
/// Report data arrives with the report ID as its first byte.
pub struct CommandHandler {
    system: &'static SharedSystem,
}

impl CommandHandler {
    pub fn new(system: &'static SharedSystem) -> Self {
        Self { system }
    }
}

impl RequestHandler for CommandHandler {
    fn get_report(&mut self, id: HidReportId, buf: &mut [u8]) -> Option<usize> {
        match id {
            HidReportId::In(3) | HidReportId::Feature(3) => {
                let (first, rest) = buf.split_first_mut()?;
                *first = ReportId::Command as u8;
                let len = self.system.lock(|system| system.borrow().usb_readback(rest));
                Some(len + 1)
            }
            _ => None,
        }
    }

    fn set_report(&mut self, id: HidReportId, data: &[u8]) -> OutResponse {
        match (id, data.split_first()) {
            (HidReportId::Out(3) | HidReportId::Feature(3), Some((&3, frame))) => {
                let status = self
                    .system
                    .lock(|system| system.borrow_mut().usb_command(frame));
                defmt::trace!("USB command: {:?}", status);
                OutResponse::Accepted
            }
            _ => OutResponse::Rejected,
        }
    }

    fn set_idle_ms(&mut self, _id: Option<HidReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<HidReportId>) -> Option<u32> {
        None
    }
}

pub type UsbDriver = Driver<'static, USB>;

/// Configure the USB HID class in the USB builder.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, Driver<'d, USB>>,
    state: &'d mut State<'d>,
    handler: &'d mut dyn RequestHandler,
) -> HidReaderWriter<'d, Driver<'d, USB>, MAX_REPORT_SIZE, MAX_REPORT_SIZE> {
    let config = hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: Some(handler),
        poll_ms: 10,
        max_packet_size: MAX_REPORT_SIZE as u16,
        hid_subclass: hid::HidSubclass::No,
        hid_boot_protocol: hid::HidBootProtocol::None,
    };

    HidReaderWriter::new(builder, state, config)
}

/// Forward reports published by [`HidLink`] to the IN endpoint.
pub async fn write_reports(
    writer: &mut HidWriter<'static, UsbDriver, MAX_REPORT_SIZE>,
    state: &'static UsbState,
) -> ! {
    let mut buf = [0u8; MAX_REPORT_SIZE];
    loop {
        state.ready.store(false, Ordering::Relaxed);
        writer.ready().await;
        state.ready.store(true, Ordering::Relaxed);
        defmt::info!("USB HID ready");

        loop {
            let len = match select(state.gamepad.wait(), state.mpu.wait()).await {
                Either::First(report) => frame(&mut buf, ReportId::Gamepad, &report),
                Either::Second(report) => frame(&mut buf, ReportId::Mpu, &report),
            };
            if let Err(e) = writer.write(&buf[..len]).await {
                defmt::warn!("USB write failed: {:?}", e);
                break;
            }
        }
    }
}

fn frame(buf: &mut [u8; MAX_REPORT_SIZE], id: ReportId, payload: &[u8]) -> usize {
    buf[0] = id as u8;
    buf[1..=payload.len()].copy_from_slice(payload);
    payload.len() + 1
}
