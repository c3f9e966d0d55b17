//! Radio Driver Seam
//!
//! The native operations the transport needs from the vendor BLE stack.
//! Implementations return raw native codes; mapping happens above. None of
//! these may block: outcomes that take time come back as `PlatformEvent`s.

use crate::ble::advertising::AdvertisingParams;
use crate::ble::error::NativeResult;
use crate::ble::events::ConnHandle;
use crate::ble::gatt::{GattHandles, ServiceDefinition};

pub trait RadioDriver {
    /// Bring up the radio layer and register the transport service
    fn init_layer(&mut self, service: &ServiceDefinition) -> NativeResult<GattHandles>;

    /// Remove the service and shut the radio layer down
    fn teardown(&mut self) -> NativeResult;

    /// GAP device name
    fn set_device_name(&mut self, name: &str) -> NativeResult;

    /// Install advertising and scan-response data
    fn configure_advertising(&mut self, adv_data: &[u8], scan_data: &[u8]) -> NativeResult;

    fn start_advertising(&mut self, params: &AdvertisingParams) -> NativeResult;

    fn stop_advertising(&mut self) -> NativeResult;

    /// Queue an indication on `attr`; the peer's confirmation arrives as an event
    fn send_indication(&mut self, conn: ConnHandle, attr: u16, data: &[u8]) -> NativeResult;

    /// Request link termination; the disconnect arrives as an event
    fn disconnect(&mut self, conn: ConnHandle) -> NativeResult;
}

impl<D: RadioDriver + ?Sized> RadioDriver for &mut D {
    fn init_layer(&mut self, service: &ServiceDefinition) -> NativeResult<GattHandles> {
        (**self).init_layer(service)
    }

    fn teardown(&mut self) -> NativeResult {
        (**self).teardown()
    }

    fn set_device_name(&mut self, name: &str) -> NativeResult {
        (**self).set_device_name(name)
    }

    fn configure_advertising(&mut self, adv_data: &[u8], scan_data: &[u8]) -> NativeResult {
        (**self).configure_advertising(adv_data, scan_data)
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> NativeResult {
        (**self).start_advertising(params)
    }

    fn stop_advertising(&mut self) -> NativeResult {
        (**self).stop_advertising()
    }

    fn send_indication(&mut self, conn: ConnHandle, attr: u16, data: &[u8]) -> NativeResult {
        (**self).send_indication(conn, attr, data)
    }

    fn disconnect(&mut self, conn: ConnHandle) -> NativeResult {
        (**self).disconnect(conn)
    }
}
