//! Transport GATT Server
//!
//! Registers the transport service with the SoftDevice and forwards its
//! GATT callbacks through the `GattServiceBridge`.

use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, CharacteristicHandles, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, Uuid};
use nrf_softdevice::Softdevice;

use crate::ble::events::{ConnHandle, PlatformSender, BLE_CONN_HANDLE_INVALID};
use crate::ble::gatt::{char_properties, BleUuid, CharacteristicDefinition, GattHandles, GattServiceBridge, ServiceDefinition};

pub struct TransportServer {
    service: ServiceDefinition,
    bridge: GattServiceBridge<'static>,
}

impl TransportServer {
    /// Register `service`. Must run before the SoftDevice task starts.
    pub fn new(
        sd: &mut Softdevice,
        service: ServiceDefinition,
        events: PlatformSender<'static>,
    ) -> Result<Self, RegisterError> {
        let mut sb = ServiceBuilder::new(sd, to_uuid(service.uuid))?;
        let rx = add_characteristic(&mut sb, &service.rx)?;
        let tx = add_characteristic(&mut sb, &service.tx)?;
        let service_handle = sb.build();

        let handles = GattHandles {
            service: service_handle.handle(),
            rx_value: rx.value_handle,
            tx_value: tx.value_handle,
            tx_cccd: tx.cccd_handle,
        };
        info!(
            "GATT: transport service registered, rx={} tx={} cccd={}",
            handles.rx_value,
            handles.tx_value,
            handles.tx_cccd
        );

        Ok(Self {
            service,
            bridge: GattServiceBridge::new(events, handles),
        })
    }

    pub fn service(&self) -> &ServiceDefinition {
        &self.service
    }

    pub fn handles(&self) -> GattHandles {
        *self.bridge.handles()
    }

    pub fn bridge(&self) -> &GattServiceBridge<'static> {
        &self.bridge
    }
}

impl gatt_server::Server for TransportServer {
    type Event = ();

    fn on_write(&self, conn: &Connection, handle: u16, _op: WriteOp, _offset: usize, data: &[u8]) -> Option<()> {
        self.bridge.on_write(conn_handle(conn), handle, data);
        None
    }

    fn on_indicate_confirm(&self, conn: &Connection, handle: u16) -> Option<()> {
        if handle == self.bridge.handles().tx_value {
            self.bridge.on_indicate_confirmed(conn_handle(conn));
        }
        None
    }
}

pub(crate) fn conn_handle(conn: &Connection) -> ConnHandle {
    conn.handle().unwrap_or(BLE_CONN_HANDLE_INVALID)
}

fn to_uuid(uuid: BleUuid) -> Uuid {
    match uuid {
        BleUuid::Uuid16(u) => Uuid::new_16(u),
        BleUuid::Uuid128(bytes) => Uuid::new_128(&bytes),
    }
}

fn add_characteristic(
    sb: &mut ServiceBuilder,
    def: &CharacteristicDefinition,
) -> Result<CharacteristicHandles, RegisterError> {
    let mut props = Properties::new();
    if def.properties & char_properties::READ != 0 {
        props = props.read();
    }
    if def.properties & char_properties::WRITE != 0 {
        props = props.write();
    }
    if def.properties & char_properties::WRITE_WITHOUT_RESPONSE != 0 {
        props = props.write_without_response();
    }
    if def.properties & char_properties::NOTIFY != 0 {
        props = props.notify();
    }
    if def.properties & char_properties::INDICATE != 0 {
        props = props.indicate();
    }

    let attr = Attribute::new([0u8; 0]).variable_len(def.max_len);
    let handles = sb.add_characteristic(to_uuid(def.uuid), attr, Metadata::new(props))?.build();
    Ok(handles)
}
