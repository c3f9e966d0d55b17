//! SoftDevice Radio Driver
//!
//! `SoftdeviceRadio` is the non-blocking `RadioDriver` handle. Advertising is
//! forwarded as `RadioCommand`s to `radio_task`, which owns the
//! `advertise_connectable` / `gatt_server::run` loop. The live link is shared
//! through a `LinkSlot` so indications and disconnects go straight to the
//! SoftDevice.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::{Channel, Sender};
use nrf_softdevice::ble::gatt_server::{self, IndicateValueError};
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::ble::Connection;
use nrf_softdevice::{raw, Softdevice};

use crate::ble::advertising::{AdvData, AdvertisingParams, ScanData};
use crate::ble::driver::RadioDriver;
use crate::ble::error::{nrf_codes, NativeCode, NativeResult};
use crate::ble::events::ConnHandle;
use crate::ble::gatt::{GattHandles, ServiceDefinition};
use crate::softdevice::server::{conn_handle, TransportServer};

/// HCI "remote user terminated connection"; the SoftDevice wrapper does not
/// surface the real reason
const DISCONNECT_REASON_UNKNOWN: u8 = 0x13;

pub const RADIO_COMMAND_QUEUE_DEPTH: usize = 4;

/// Advertising request for the radio task
#[derive(Debug, Clone)]
pub struct AdvertiseRequest {
    pub adv_data: AdvData,
    pub scan_data: ScanData,
    /// 0.625ms units
    pub interval: u16,
}

#[derive(Debug, Clone)]
pub enum RadioCommand {
    Start(AdvertiseRequest),
    Stop,
}

pub type RadioChannel = Channel<CriticalSectionRawMutex, RadioCommand, RADIO_COMMAND_QUEUE_DEPTH>;
pub type RadioSender = Sender<'static, CriticalSectionRawMutex, RadioCommand, RADIO_COMMAND_QUEUE_DEPTH>;

/// The live SoftDevice connection, if any
pub type LinkSlot = BlockingMutex<CriticalSectionRawMutex, RefCell<Option<Connection>>>;

pub struct SoftdeviceRadio {
    service: ServiceDefinition,
    handles: GattHandles,
    commands: RadioSender,
    link: &'static LinkSlot,
    adv_data: AdvData,
    scan_data: ScanData,
    active: bool,
}

impl SoftdeviceRadio {
    pub fn new(server: &TransportServer, commands: RadioSender, link: &'static LinkSlot) -> Self {
        Self {
            service: *server.service(),
            handles: server.handles(),
            commands,
            link,
            adv_data: AdvData::new(),
            scan_data: ScanData::new(),
            active: false,
        }
    }

    fn with_link<R>(&self, conn: ConnHandle, f: impl FnOnce(&Connection) -> R) -> Option<R> {
        self.link.lock(|slot| {
            slot.borrow()
                .as_ref()
                .filter(|c| conn_handle(c) == conn)
                .map(f)
        })
    }

    fn command(&self, command: RadioCommand) -> NativeResult {
        self.commands.try_send(command).map_err(|_| nrf_codes::NRF_ERROR_BUSY)
    }
}

impl RadioDriver for SoftdeviceRadio {
    fn init_layer(&mut self, service: &ServiceDefinition) -> NativeResult<GattHandles> {
        // Only the service registered at boot can be activated
        if *service != self.service {
            return Err(nrf_codes::NRF_ERROR_INVALID_PARAM);
        }
        if self.active {
            return Err(nrf_codes::NRF_ERROR_INVALID_STATE);
        }
        self.active = true;
        Ok(self.handles)
    }

    fn teardown(&mut self) -> NativeResult {
        if !self.active {
            return Err(nrf_codes::NRF_ERROR_INVALID_STATE);
        }
        // The attribute table stays registered; the radio goes quiet
        self.command(RadioCommand::Stop)?;
        self.adv_data.clear();
        self.scan_data.clear();
        self.active = false;
        Ok(())
    }

    fn set_device_name(&mut self, name: &str) -> NativeResult {
        let sec_mode = raw::ble_gap_conn_sec_mode_t {
            // Security mode 1, level 1: open
            _bitfield_1: raw::ble_gap_conn_sec_mode_t::new_bitfield_1(1, 1),
        };
        let code = unsafe { raw::sd_ble_gap_device_name_set(&sec_mode, name.as_ptr(), name.len() as u16) };
        match code {
            nrf_codes::NRF_SUCCESS => Ok(()),
            code => Err(code),
        }
    }

    fn configure_advertising(&mut self, adv_data: &[u8], scan_data: &[u8]) -> NativeResult {
        let adv = AdvData::from_slice(adv_data).map_err(|_| nrf_codes::NRF_ERROR_INVALID_LENGTH)?;
        let scan = ScanData::from_slice(scan_data).map_err(|_| nrf_codes::NRF_ERROR_INVALID_LENGTH)?;
        self.adv_data = adv;
        self.scan_data = scan;
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> NativeResult {
        if !self.active || self.adv_data.is_empty() {
            return Err(nrf_codes::NRF_ERROR_INVALID_STATE);
        }
        self.command(RadioCommand::Start(AdvertiseRequest {
            adv_data: self.adv_data.clone(),
            scan_data: self.scan_data.clone(),
            interval: params.interval.min,
        }))
    }

    fn stop_advertising(&mut self) -> NativeResult {
        self.command(RadioCommand::Stop)
    }

    fn send_indication(&mut self, conn: ConnHandle, attr: u16, data: &[u8]) -> NativeResult {
        let result = self
            .with_link(conn, |c| gatt_server::indicate_value(c, attr, data))
            .ok_or(nrf_codes::NRF_ERROR_INVALID_STATE)?;
        result.map_err(|e| match e {
            IndicateValueError::Disconnected => nrf_codes::NRF_ERROR_INVALID_STATE,
            IndicateValueError::Raw(raw) => raw as u32,
        })
    }

    fn disconnect(&mut self, conn: ConnHandle) -> NativeResult {
        self.with_link(conn, |c| c.disconnect())
            .ok_or(nrf_codes::NRF_ERROR_INVALID_STATE)?
            .map_err(|_| nrf_codes::NRF_ERROR_INVALID_STATE)
    }
}

/// Owns advertising and the GATT server loop. Spawn once from the firmware.
pub async fn radio_task(
    sd: &'static Softdevice,
    server: &'static TransportServer,
    commands: &'static RadioChannel,
    link: &'static LinkSlot,
) -> ! {
    let mut next: Option<AdvertiseRequest> = None;

    loop {
        let request = match next.take() {
            Some(request) => request,
            None => match commands.receive().await {
                RadioCommand::Start(request) => request,
                RadioCommand::Stop => continue,
            },
        };

        let config = peripheral::Config {
            interval: u32::from(request.interval),
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: &request.adv_data,
            scan_data: &request.scan_data,
        };
        debug!("RADIO: advertising, interval {}", request.interval);

        let conn = match select(peripheral::advertise_connectable(sd, adv, &config), commands.receive()).await {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(e)) => {
                error!("RADIO: advertising failed: {:?}", defmt::Debug2Format(&e));
                server.bridge().on_advertising_stopped(advertise_error_code(e));
                continue;
            }
            Either::Second(RadioCommand::Start(request)) => {
                next = Some(request);
                continue;
            }
            Either::Second(RadioCommand::Stop) => {
                debug!("RADIO: advertising stopped");
                continue;
            }
        };

        let handle = conn_handle(&conn);
        link.lock(|slot| *slot.borrow_mut() = Some(conn.clone()));
        server.bridge().on_connected(handle);

        // Returns when the link drops
        let _ = gatt_server::run(&conn, server, |_| {}).await;

        link.lock(|slot| *slot.borrow_mut() = None);
        server.bridge().on_disconnected(handle, DISCONNECT_REASON_UNKNOWN);
    }
}

fn advertise_error_code(e: AdvertiseError) -> NativeCode {
    match e {
        AdvertiseError::Timeout => nrf_codes::NRF_ERROR_TIMEOUT,
        AdvertiseError::NoFreeConn => nrf_codes::NRF_ERROR_CONN_COUNT,
        AdvertiseError::Raw(raw) => raw as NativeCode,
    }
}
