//! GATT Service Bridge
//!
//! Wire-level description of the transport service and the bridge turning
//! native GATT/GAP callbacks into queued `PlatformEvent`s. Callbacks never
//! touch transport state directly; they only `try_send`.

use crate::ble::error::NativeCode;
use crate::ble::events::{copy_write, ConnHandle, PlatformEvent, PlatformSender};

/// Bluetooth UUID in native (little-endian) byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleUuid {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

/// Inbound characteristic `18EE2EF5-263D-4559-959F-4F9C429F9D11`
pub const RX_CHAR_UUID: BleUuid = BleUuid::Uuid128([
    0x11, 0x9D, 0x9F, 0x42, 0x9C, 0x4F, 0x9F, 0x95, 0x59, 0x45, 0x3D, 0x26, 0xF5, 0x2E, 0xEE, 0x18,
]);

/// Outbound characteristic `18EE2EF5-263D-4559-959F-4F9C429F9D12`
pub const TX_CHAR_UUID: BleUuid = BleUuid::Uuid128([
    0x12, 0x9D, 0x9F, 0x42, 0x9C, 0x4F, 0x9F, 0x95, 0x59, 0x45, 0x3D, 0x26, 0xF5, 0x2E, 0xEE, 0x18,
]);

/// Characteristic properties (matches BLE specification)
pub mod char_properties {
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
}

// CCCD value bits
pub const CCCD_NOTIFY: u8 = 0x01;
pub const CCCD_INDICATE: u8 = 0x02;

/// Largest characteristic value
pub const MAX_CHAR_VALUE_LEN: u16 = 244;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicDefinition {
    pub uuid: BleUuid,
    pub properties: u8,
    pub max_len: u16,
}

impl CharacteristicDefinition {
    /// Gets a CCCD when it can notify or indicate
    pub const fn has_cccd(&self) -> bool {
        self.properties & (char_properties::NOTIFY | char_properties::INDICATE) != 0
    }
}

/// Primary service registered by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceDefinition {
    pub uuid: BleUuid,
    pub rx: CharacteristicDefinition,
    pub tx: CharacteristicDefinition,
}

impl ServiceDefinition {
    /// Transport service: one write characteristic in, one indicate characteristic out
    pub const fn transport(service_uuid: u16) -> Self {
        Self {
            uuid: BleUuid::Uuid16(service_uuid),
            rx: CharacteristicDefinition {
                uuid: RX_CHAR_UUID,
                properties: char_properties::WRITE,
                max_len: MAX_CHAR_VALUE_LEN,
            },
            tx: CharacteristicDefinition {
                uuid: TX_CHAR_UUID,
                properties: char_properties::READ | char_properties::INDICATE,
                max_len: MAX_CHAR_VALUE_LEN,
            },
        }
    }
}

/// Attribute handles assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattHandles {
    pub service: u16,
    pub rx_value: u16,
    pub tx_value: u16,
    pub tx_cccd: u16,
}

/// Native callback to event translation
///
/// Every method returns `true` if an event was queued. A full queue is
/// logged and reported as `false`; the native context never blocks.
pub struct GattServiceBridge<'a> {
    events: PlatformSender<'a>,
    handles: GattHandles,
}

impl<'a> GattServiceBridge<'a> {
    pub fn new(events: PlatformSender<'a>, handles: GattHandles) -> Self {
        Self { events, handles }
    }

    pub fn handles(&self) -> &GattHandles {
        &self.handles
    }

    pub fn on_connected(&self, conn: ConnHandle) -> bool {
        debug!("GATT: connected conn={}", conn);
        self.post(PlatformEvent::Connected { conn })
    }

    pub fn on_disconnected(&self, conn: ConnHandle, reason: u8) -> bool {
        debug!("GATT: disconnected conn={} reason=0x{:x}", conn, reason);
        self.post(PlatformEvent::Disconnected { conn, reason })
    }

    /// Attribute write from the peer
    pub fn on_write(&self, conn: ConnHandle, handle: u16, data: &[u8]) -> bool {
        if handle == self.handles.rx_value {
            debug!("GATT: write conn={} len={}", conn, data.len());
            return self.post(PlatformEvent::WriteReceived {
                conn,
                data: copy_write(data),
            });
        }

        if handle == self.handles.tx_cccd {
            let Some(&value) = data.first() else {
                warn!("GATT: empty CCCD write conn={}", conn);
                return false;
            };
            let indications = value & CCCD_INDICATE != 0;
            debug!("GATT: CCCD conn={} indications={}", conn, indications);
            let event = if indications {
                PlatformEvent::Subscribed { conn }
            } else {
                PlatformEvent::Unsubscribed { conn }
            };
            return self.post(event);
        }

        debug!("GATT: write to unknown handle {} dropped", handle);
        false
    }

    pub fn on_indicate_confirmed(&self, conn: ConnHandle) -> bool {
        self.post(PlatformEvent::IndicateConfirmed { conn })
    }

    /// Advertising ended without a stop request or a connection
    pub fn on_advertising_stopped(&self, code: NativeCode) -> bool {
        warn!("GATT: advertising stopped, code {}", code);
        self.post(PlatformEvent::AdvertisingStopped { code })
    }

    pub fn on_mtu_exchanged(&self, conn: ConnHandle, mtu: u16) -> bool {
        debug!("GATT: MTU conn={} mtu={}", conn, mtu);
        self.post(PlatformEvent::MtuExchanged { conn, mtu })
    }

    fn post(&self, event: PlatformEvent) -> bool {
        if self.events.try_send(event).is_err() {
            warn!("GATT: event queue full, event dropped");
            return false;
        }
        true
    }
}
