#![no_std]
#![no_main]

use ble_transport_bridge::ble::advertising::DeviceIdentity;
use ble_transport_bridge::ble::events::{PlatformChannel, TransportChannel, TransportEvent};
use ble_transport_bridge::ble::gatt::ServiceDefinition;
use ble_transport_bridge::softdevice::{radio_task, LinkSlot, RadioChannel, SoftdeviceRadio, TransportServer};
use ble_transport_bridge::{BleTransportManager, TransportConfig};
use core::cell::RefCell;
use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::{config::Config, interrupt};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use nrf_softdevice::{Config as SdConfig, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

type Manager = BleTransportManager<'static, SoftdeviceRadio>;

static PLATFORM_EVENTS: PlatformChannel = PlatformChannel::new();
static TRANSPORT_EVENTS: TransportChannel = TransportChannel::new();
static RADIO_COMMANDS: RadioChannel = RadioChannel::new();
static LINK: LinkSlot = BlockingMutex::new(RefCell::new(None));

static SERVER: StaticCell<TransportServer> = StaticCell::new();
static MANAGER: StaticCell<Manager> = StaticCell::new();

/// Identification blob advertised until the upper layer provides its own
const DEFAULT_ID_INFO: [u8; 4] = [0x00, 0xF1, 0xFF, 0x01];

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting BLE transport bridge");

    // Configure interrupt priorities to avoid SoftDevice reserved levels (0, 1, 4)
    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    let sd_config = SdConfig {
        clock: Some(nrf_softdevice::raw::nrf_clock_lf_cfg_t {
            source: nrf_softdevice::raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: nrf_softdevice::raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(nrf_softdevice::raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(nrf_softdevice::raw::ble_gatt_conn_cfg_t { att_mtu: 247 }),
        gatts_attr_tab_size: Some(nrf_softdevice::raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: 1408,
        }),
        gap_role_count: Some(nrf_softdevice::raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: Default::default(),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&sd_config);
    info!("SoftDevice enabled");

    let config = TransportConfig::default();
    let service = ServiceDefinition::transport(config.service_uuid);
    let server: &'static TransportServer = match TransportServer::new(sd, service, PLATFORM_EVENTS.sender()) {
        Ok(server) => SERVER.init(server),
        Err(e) => defmt::panic!("Failed to register transport service: {:?}", e),
    };
    let sd: &'static Softdevice = sd;

    let radio = SoftdeviceRadio::new(server, RADIO_COMMANDS.sender(), &LINK);
    let discriminator = device_discriminator();
    let identity = unwrap!(DeviceIdentity::new(discriminator, &DEFAULT_ID_INFO));
    let manager: &'static Manager = MANAGER.init(BleTransportManager::new(
        radio,
        config,
        identity,
        &PLATFORM_EVENTS,
        &TRANSPORT_EVENTS,
    ));

    // The SoftDevice task must start before any radio command
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio_runner(sd, server)));
    unwrap!(spawner.spawn(transport_task(manager)));
    unwrap!(spawner.spawn(fast_advertising_task(manager)));

    unwrap!(manager.init().await);
    unwrap!(manager.set_advertising_enabled(true).await);
    info!("Transport running, discriminator {}", discriminator);

    loop {
        match TRANSPORT_EVENTS.receive().await {
            TransportEvent::ConnectionEstablished { conn } => info!("Session link {} ready", conn),
            TransportEvent::MessageReceived { conn, data } => {
                debug!("Received {} bytes on {}", data.len(), conn);
                // Echo until a session layer is attached
                if let Err(e) = manager.send_indication(&data).await {
                    warn!("Echo failed: {:?}", e);
                }
            }
            TransportEvent::IndicationConfirmed { conn } => trace!("Indication confirmed on {}", conn),
            TransportEvent::ConnectionClosed { conn } => info!("Session link {} closed", conn),
        }
    }
}

/// 12-bit discriminator from the factory device ID
fn device_discriminator() -> u16 {
    // FICR.DEVICEID[0]
    let device_id = unsafe { core::ptr::read_volatile(0x1000_0060 as *const u32) };
    (device_id & 0x0FFF) as u16
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn radio_runner(sd: &'static Softdevice, server: &'static TransportServer) -> ! {
    radio_task(sd, server, &RADIO_COMMANDS, &LINK).await
}

#[embassy_executor::task]
async fn transport_task(manager: &'static Manager) -> ! {
    manager.run().await
}

#[embassy_executor::task]
async fn fast_advertising_task(manager: &'static Manager) -> ! {
    manager.run_fast_advertising_timer().await
}
