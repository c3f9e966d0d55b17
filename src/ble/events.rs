//! Transport Events
//!
//! Closed event sets flowing through the transport:
//! - `PlatformEvent`: posted by native callbacks (and by the manager itself)
//!   into the single application queue
//! - `TransportEvent`: republished to the upper layer once processed

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

use crate::ble::error::NativeCode;

/// Native link handle
pub type ConnHandle = u16;

/// Handle value meaning "no link"
pub const BLE_CONN_HANDLE_INVALID: ConnHandle = 0xFFFF;

/// Largest inbound characteristic write (ATT MTU 247 - 3)
pub const MAX_WRITE_LEN: usize = 244;

/// Owned copy of an inbound write
pub type WriteBuffer = Vec<u8, MAX_WRITE_LEN>;

/// Platform event queue depth
pub const PLATFORM_QUEUE_DEPTH: usize = 8;

/// Upper-layer event queue depth
pub const TRANSPORT_QUEUE_DEPTH: usize = 8;

/// Events entering the transport from the native context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Re-run the state machine
    DriveRequested,
    Connected {
        conn: ConnHandle,
    },
    Disconnected {
        conn: ConnHandle,
        reason: u8,
    },
    /// Peer wrote the inbound characteristic
    WriteReceived {
        conn: ConnHandle,
        data: WriteBuffer,
    },
    /// Peer set the CCCD indicate bit
    Subscribed {
        conn: ConnHandle,
    },
    /// Peer cleared the CCCD indicate bit
    Unsubscribed {
        conn: ConnHandle,
    },
    /// Peer acknowledged an indication
    IndicateConfirmed {
        conn: ConnHandle,
    },
    MtuExchanged {
        conn: ConnHandle,
        mtu: u16,
    },
    /// Upper layer finished commissioning; radio may be reclaimed
    PairingComplete,
    /// Fast advertising window elapsed
    FastAdvertisingExpired {
        generation: u32,
    },
    /// Radio stopped advertising on its own with a native error
    AdvertisingStopped {
        code: NativeCode,
    },
}

/// Events delivered to the upper layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Peer connected and subscribed to indications
    ConnectionEstablished { conn: ConnHandle },
    MessageReceived { conn: ConnHandle, data: WriteBuffer },
    IndicationConfirmed { conn: ConnHandle },
    /// Peer unsubscribed or the link dropped
    ConnectionClosed { conn: ConnHandle },
}

pub type PlatformChannel = Channel<CriticalSectionRawMutex, PlatformEvent, PLATFORM_QUEUE_DEPTH>;
pub type PlatformSender<'a> = Sender<'a, CriticalSectionRawMutex, PlatformEvent, PLATFORM_QUEUE_DEPTH>;
pub type PlatformReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, PlatformEvent, PLATFORM_QUEUE_DEPTH>;

pub type TransportChannel = Channel<CriticalSectionRawMutex, TransportEvent, TRANSPORT_QUEUE_DEPTH>;
pub type TransportSender<'a> = Sender<'a, CriticalSectionRawMutex, TransportEvent, TRANSPORT_QUEUE_DEPTH>;
pub type TransportReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, TransportEvent, TRANSPORT_QUEUE_DEPTH>;

/// Copy an inbound write into an owned buffer, truncating anything past `MAX_WRITE_LEN`
pub fn copy_write(data: &[u8]) -> WriteBuffer {
    let len = data.len().min(MAX_WRITE_LEN);
    let mut buf = WriteBuffer::new();
    // Cannot fail after truncation
    let _ = buf.extend_from_slice(&data[..len]);
    buf
}
