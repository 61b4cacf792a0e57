#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::{cell::RefCell, net::Ipv4Addr};

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embedded_hal_bus::{i2c::RefCellDevice, spi::ExclusiveDevice};
use envnode_core::{
    config::CycleConfig,
    controller::{Collaborators, WakeCycleController},
    wake::WakeTimer,
};
use envnode_hal_esp32s3::{
    network::{
        WifiConfig, WifiLink,
        mqtt::{MqttConfig, MqttTransport},
    },
    platform::{clock::EmbassyClock, display::EpdPanel, reset},
    storage::{BoardStore, flash_store::FlashStore, rtc_store::{self, RtcStore}},
};
use envnode_sensors::{Bme280, Max17048, bme280_sensor};
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    i2c::master::I2c,
    rtc_cntl::wakeup_cause,
    spi::master::Spi,
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::wifi::{ClientConfig, ModeConfig};
use log::{LevelFilter, info, warn};
use ssd1680::Ssd1680;
use static_cell::StaticCell;

use power::DeepSleepTimer;

#[path = "main/power.rs"]
mod power;

const PANEL_SPI_HZ: u32 = 4_000_000;
const SENSOR_I2C_KHZ: u32 = 100;
const TCP_BUFFER_BYTES: usize = 1_536;

const WIFI_SSID: &str = env!(
    "ENVNODE_WIFI_SSID",
    "Set ENVNODE_WIFI_SSID in your environment before building/flashing."
);
const WIFI_PASSWORD: &str = env!(
    "ENVNODE_WIFI_PASSWORD",
    "Set ENVNODE_WIFI_PASSWORD in your environment before building/flashing."
);
const MQTT_HOST: &str = env!(
    "ENVNODE_MQTT_HOST",
    "Set ENVNODE_MQTT_HOST (broker IPv4 address) before building/flashing."
);
const DEVICE_ID: &str = match option_env!("ENVNODE_DEVICE_ID") {
    Some(id) => id,
    None => "node",
};
const WIFI_CONFIG: WifiConfig = WifiConfig::new(WIFI_SSID, WIFI_PASSWORD);

static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();
static TCP_RX: StaticCell<[u8; TCP_BUFFER_BYTES]> = StaticCell::new();
static TCP_TX: StaticCell<[u8; TCP_BUFFER_BYTES]> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("panic: {}", info);
    rtc_store::mark_panic();
    esp_hal::system::software_reset()
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Sleeps until the next scheduled wake when the board cannot be brought up.
fn sleep_after_fault(what: &str) -> ! {
    warn!("boot: {} failed, sleeping", what);
    let mut timer = DeepSleepTimer::new();
    timer.schedule_wake(CycleConfig::default().sleep.normal_s);
    timer.enter_low_power_sleep()
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: envnode starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    info!("boot wakeup_cause={:?}", wakeup_cause());

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let boot_info = reset::boot_info();

    let Some(retained) = RtcStore::take() else {
        sleep_after_fault("retained store");
    };
    let durable = match FlashStore::new() {
        Ok(store) => Some(store),
        Err(err) => {
            warn!("boot: durable store unavailable: {:?}", err);
            None
        }
    };
    let store = BoardStore::new(retained, durable);

    // Panel wiring: SCK=GPIO12 MOSI=GPIO11 CS=GPIO10 DC=GPIO9 RST=GPIO8 BUSY=GPIO7
    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(PANEL_SPI_HZ))
        .with_mode(esp_hal::spi::Mode::_0);
    let spi = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO12)
            .with_mosi(peripherals.GPIO11),
        Err(err) => {
            info!("panel spi config failed: {:?}", err);
            sleep_after_fault("panel spi");
        }
    };
    let cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let Ok(panel_spi) = ExclusiveDevice::new(spi, cs, Delay::new());
    let dc = Output::new(peripherals.GPIO9, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());
    let busy = Input::new(peripherals.GPIO7, InputConfig::default().with_pull(Pull::None));
    let panel = EpdPanel::new(
        Ssd1680::new(panel_spi, dc, rst, busy, ssd1680::Config::default()),
        Delay::new(),
    );

    // Sensor bus: SDA=GPIO3 SCL=GPIO4, BME280 and MAX17048 share it.
    let i2c_config =
        esp_hal::i2c::master::Config::default().with_frequency(Rate::from_khz(SENSOR_I2C_KHZ));
    let i2c = match I2c::new(peripherals.I2C0, i2c_config) {
        Ok(i2c) => i2c.with_sda(peripherals.GPIO3).with_scl(peripherals.GPIO4),
        Err(err) => {
            info!("sensor i2c config failed: {:?}", err);
            sleep_after_fault("sensor i2c");
        }
    };
    let i2c_bus = RefCell::new(i2c);
    let sensor = Bme280::new(
        RefCellDevice::new(&i2c_bus),
        bme280_sensor::PRIMARY_ADDRESS,
        Delay::new(),
    );
    let gauge = Max17048::new(RefCellDevice::new(&i2c_bus));

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            info!("esp-radio init failed: {:?}", err);
            sleep_after_fault("radio");
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                info!("wifi peripheral init failed: {:?}", err);
                sleep_after_fault("wifi");
            }
        };

    let client_config = ClientConfig::default()
        .with_ssid(WIFI_CONFIG.ssid.into())
        .with_password(WIFI_CONFIG.password.into());
    if let Err(err) = wifi_controller.set_config(&ModeConfig::Client(client_config)) {
        info!("wifi mode config failed: {:?}", err);
        sleep_after_fault("wifi config");
    }

    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        0x3E4F_91C2_7A05_D6B8 ^ boot_info.uptime_ms as u64,
    );

    let broker = MQTT_HOST.parse::<Ipv4Addr>().unwrap_or_else(|_| {
        warn!("mqtt: ENVNODE_MQTT_HOST={} is not an IPv4 address", MQTT_HOST);
        Ipv4Addr::UNSPECIFIED
    });
    let network = MqttTransport::new(
        WifiLink::new(wifi_controller, stack),
        TCP_RX.init([0; TCP_BUFFER_BYTES]),
        TCP_TX.init([0; TCP_BUFFER_BYTES]),
        MqttConfig::new(broker, DEVICE_ID),
    );

    let cycle_config = CycleConfig {
        device_id: DEVICE_ID,
        ..CycleConfig::default()
    };
    info!(
        "envnode: device={} broker={} durable_store={}",
        DEVICE_ID,
        broker,
        store.has_durable()
    );

    let mut controller = WakeCycleController::boot(
        cycle_config,
        Collaborators {
            sensor,
            gauge,
            network,
            display: panel,
            clock: EmbassyClock,
            store,
        },
        boot_info,
    );

    let mut timer = DeepSleepTimer::new();
    let report = match select(net_runner.run(), controller.run(&mut timer)).await {
        Either::First(never) => match never {},
        Either::Second(report) => report,
    };
    info!(
        "cycle: done sensor={:?} network={:?} display={:?} sleep={}s elapsed={}ms",
        report.sensor, report.network, report.display, report.sleep_seconds, report.elapsed_ms
    );

    controller.finish(&report, &mut timer)
}
