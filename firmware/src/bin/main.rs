#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::i2c_slave::{self, I2cSlave, ReadStatus};
use embassy_rp::peripherals::{I2C1, USB};
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Ticker};
use embassy_usb::class::hid::{HidReader, HidWriter, State};
use embassy_usb::{Builder, Config as UsbConfig};
use static_cell::StaticCell;
use tinycon_core::input::{ActiveState, InputSource, PinsInput};
use tinycon_core::transport::i2c::MAX_READ_BURST;
use tinycon_core::{Drv2605, NoDevice, Peripherals};
use tinycon_firmware::led::FRAME_MS;
use tinycon_firmware::usb_output::{UsbDriver, MAX_REPORT_SIZE};
use tinycon_firmware::{
    configure_usb_hid, write_reports, AnalogStick, CommandHandler, DeviceHandler, HidLink,
    PicoPins, SharedSystem, StatusLed, SystemConfig, TinyController, UsbState, VbusSense,
    I2C_ADDRESS,
};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    I2C1_IRQ => embassy_rp::i2c::InterruptHandler<I2C1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

const CONFIG: SystemConfig = SystemConfig::DEFAULT;

/// Mount state and latest-value report slots shared with the USB tasks.
static USB_STATE: UsbState = UsbState::new();

static SYSTEM: StaticCell<SharedSystem> = StaticCell::new();

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID state.
static HID_STATE: StaticCell<State> = StaticCell::new();
static DEVICE_HANDLER: StaticCell<DeviceHandler> = StaticCell::new();
static REQUEST_HANDLER: StaticCell<CommandHandler> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("TinyCon starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Inputs ---
    let stick = AnalogStick::new(
        Adc::new_blocking(p.ADC, adc::Config::default()),
        [
            adc::Channel::new_pin(p.PIN_26, Pull::None),
            adc::Channel::new_pin(p.PIN_27, Pull::None),
        ],
    );
    let left = PicoPins::new(
        [
            Input::new(p.PIN_6, Pull::Up),
            Input::new(p.PIN_7, Pull::Up),
            Input::new(p.PIN_8, Pull::Up),
            Input::new(p.PIN_9, Pull::Up),
            Input::new(p.PIN_10, Pull::Up),
        ],
        Some(stick),
    );
    let right = PicoPins::new(
        [
            Input::new(p.PIN_11, Pull::Up),
            Input::new(p.PIN_12, Pull::Up),
            Input::new(p.PIN_13, Pull::Up),
            Input::new(p.PIN_14, Pull::Up),
            Input::new(p.PIN_15, Pull::Up),
        ],
        None,
    );

    // --- Haptics ---
    let haptic_bus = I2c::new_blocking(p.I2C0, p.PIN_5, p.PIN_4, i2c::Config::default());

    let peripherals = Peripherals {
        inputs: [
            InputSource::Pins(PinsInput::new(left, ActiveState::Low)),
            InputSource::Pins(PinsInput::new(right, ActiveState::Low)),
        ],
        mpus: [None, None],
        haptics: [Some(Drv2605::new(haptic_bus)), None],
        power: VbusSense::new(Input::new(p.PIN_24, Pull::None)),
        ble: NoDevice,
        usb: HidLink::new(&USB_STATE),
    };

    let mut tiny = TinyController::new(peripherals, CONFIG);
    tiny.init();
    let system: &'static SharedSystem = SYSTEM.init(Mutex::new(RefCell::new(tiny)));

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("TinyCon");
    usb_config.product = Some("TinyCon Game Controller");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );
    builder.handler(DEVICE_HANDLER.init(DeviceHandler::new(&USB_STATE)));

    let hid_state = HID_STATE.init(State::new());
    let request_handler = REQUEST_HANDLER.init(CommandHandler::new(system));
    let hid = configure_usb_hid(&mut builder, hid_state, request_handler);
    let (reader, writer) = hid.split();

    let usb_device = builder.build();

    // --- I2C slave ---
    let mut slave_config = i2c_slave::Config::default();
    slave_config.addr = I2C_ADDRESS;
    let slave = I2cSlave::new(p.I2C1, p.PIN_3, p.PIN_2, Irqs, slave_config);

    let led = StatusLed::new(Output::new(p.PIN_25, Level::Low));

    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(hid_write_task(writer).unwrap());
    spawner.spawn(hid_read_task(reader, CommandHandler::new(system)).unwrap());
    spawner.spawn(i2c_task(slave, system).unwrap());
    spawner.spawn(tick_task(system).unwrap());
    spawner.spawn(led_task(led, system).unwrap());

    info!("TinyCon initialized");
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, UsbDriver>) {
    device.run().await;
}

#[embassy_executor::task]
async fn hid_write_task(mut writer: HidWriter<'static, UsbDriver, MAX_REPORT_SIZE>) {
    write_reports(&mut writer, &USB_STATE).await;
}

/// Command reports sent on the interrupt OUT endpoint.
#[embassy_executor::task]
async fn hid_read_task(
    reader: HidReader<'static, UsbDriver, MAX_REPORT_SIZE>,
    mut handler: CommandHandler,
) {
    reader.run(true, &mut handler).await;
}

/// Main update tick.
#[embassy_executor::task]
async fn tick_task(system: &'static SharedSystem) {
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(CONFIG.tick_ms)));
    let mut last = Instant::now();
    loop {
        ticker.next().await;
        let now = Instant::now();
        let delta_ms = u32::try_from((now - last).as_millis()).unwrap_or(u32::MAX);
        last = now;
        system.lock(|tiny| tiny.borrow_mut().update(delta_ms));
    }
}

/// I2C slave task. Writes are fed byte by byte with their arrival time;
/// reads are answered from the register file.
#[embassy_executor::task]
async fn i2c_task(mut slave: I2cSlave<'static, I2C1>, system: &'static SharedSystem) {
    let mut buf = [0u8; 32];
    loop {
        match slave.listen(&mut buf).await {
            Ok(i2c_slave::Command::Write(len)) => receive(system, &buf[..len]),
            Ok(i2c_slave::Command::WriteRead(len)) => {
                receive(system, &buf[..len]);
                respond(&mut slave, system).await;
            }
            Ok(i2c_slave::Command::Read) => respond(&mut slave, system).await,
            Ok(i2c_slave::Command::GeneralCall(_)) => {}
            Err(e) => warn!("I2C slave error: {:?}", e),
        }
    }
}

fn receive(system: &'static SharedSystem, bytes: &[u8]) {
    let now_us = Instant::now().as_micros();
    system.lock(|tiny| {
        let mut tiny = tiny.borrow_mut();
        for &byte in bytes {
            tiny.i2c_receive(byte, now_us);
        }
    });
}

async fn respond(slave: &mut I2cSlave<'static, I2C1>, system: &'static SharedSystem) {
    let mut out = [0u8; MAX_READ_BURST];
    let len = system.lock(|tiny| tiny.borrow_mut().i2c_request(&mut out));
    match slave.respond_to_read(&out[..len]).await {
        // Master clocked past the burst: pad until it stops
        Ok(ReadStatus::NeedMoreBytes) => {
            if let Err(e) = slave.respond_till_stop(0xFF).await {
                warn!("I2C slave error: {:?}", e);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("I2C slave error: {:?}", e),
    }
}

#[embassy_executor::task]
async fn led_task(mut led: StatusLed, system: &'static SharedSystem) {
    let mut ticker = Ticker::every(Duration::from_millis(FRAME_MS));
    loop {
        ticker.next().await;
        let state = system.lock(|tiny| tiny.borrow().indicator());
        led.render(&state, Instant::now().as_millis());
    }
}
