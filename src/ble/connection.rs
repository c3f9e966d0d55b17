//! Connection Tracking
//!
//! Bookkeeping for the single live peer link: subscription state,
//! outstanding indications and negotiated MTU.

use crate::ble::error::TransportError;
use crate::ble::events::{ConnHandle, BLE_CONN_HANDLE_INVALID};

/// Single-connection policy
pub const MAX_CONNECTIONS: u8 = 1;

/// Default ATT MTU before exchange
pub const DEFAULT_ATT_MTU: u16 = 23;

/// One live peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connection {
    pub handle: ConnHandle,
    pub subscribed: bool,
    pub outstanding_indications: u8,
    pub mtu: u16,
}

impl Connection {
    const fn new(handle: ConnHandle) -> Self {
        Self {
            handle,
            subscribed: false,
            outstanding_indications: 0,
            mtu: DEFAULT_ATT_MTU,
        }
    }
}

/// Connection tracking errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    ConnectionNotFound,
    ConnectionLimitReached,
    InvalidHandle,
    NotSubscribed,
    IndicationLimitReached,
}

impl From<ConnectionError> for TransportError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::ConnectionNotFound
            | ConnectionError::InvalidHandle
            | ConnectionError::NotSubscribed => TransportError::Argument,
            ConnectionError::ConnectionLimitReached => TransportError::Resource,
            ConnectionError::IndicationLimitReached => TransportError::Busy,
        }
    }
}

/// Tracks at most one connection
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    current: Option<Connection>,
}

impl ConnectionTracker {
    pub const fn new() -> Self {
        Self { current: None }
    }

    pub fn on_connected(&mut self, handle: ConnHandle) -> Result<(), ConnectionError> {
        if handle == BLE_CONN_HANDLE_INVALID {
            return Err(ConnectionError::InvalidHandle);
        }
        if let Some(existing) = &self.current {
            warn!("CONNECTION: rejecting {}, already connected to {}", handle, existing.handle);
            return Err(ConnectionError::ConnectionLimitReached);
        }

        self.current = Some(Connection::new(handle));
        debug!("CONNECTION: added {}", handle);
        Ok(())
    }

    /// Returns the removed connection, `None` for unknown links
    pub fn on_disconnected(&mut self, handle: ConnHandle) -> Option<Connection> {
        match self.current {
            Some(conn) if conn.handle == handle => {
                self.current = None;
                debug!("CONNECTION: removed {}", handle);
                Some(conn)
            }
            _ => {
                debug!("CONNECTION: ignoring disconnect of unknown link {}", handle);
                None
            }
        }
    }

    pub fn count(&self) -> u8 {
        self.current.is_some() as u8
    }

    pub fn current(&self) -> Option<&Connection> {
        self.current.as_ref()
    }

    pub fn is_connected(&self, handle: ConnHandle) -> bool {
        self.find(handle).is_some()
    }

    /// Returns the previous subscription state. Indications already in flight
    /// stay counted until confirmed or the link drops.
    pub fn set_subscribed(&mut self, handle: ConnHandle, subscribed: bool) -> Result<bool, ConnectionError> {
        let conn = self.find_mut(handle)?;
        let previous = conn.subscribed;
        conn.subscribed = subscribed;
        Ok(previous)
    }

    /// Reserve an indication slot on a subscribed link
    pub fn begin_indication(&mut self, handle: ConnHandle, max_outstanding: u8) -> Result<(), ConnectionError> {
        let conn = self.find_mut(handle)?;
        if !conn.subscribed {
            return Err(ConnectionError::NotSubscribed);
        }
        if conn.outstanding_indications >= max_outstanding {
            return Err(ConnectionError::IndicationLimitReached);
        }
        conn.outstanding_indications += 1;
        Ok(())
    }

    /// Release a slot reserved by `begin_indication` that the driver refused
    pub fn abort_indication(&mut self, handle: ConnHandle) {
        if let Ok(conn) = self.find_mut(handle) {
            conn.outstanding_indications = conn.outstanding_indications.saturating_sub(1);
        }
    }

    pub fn indication_confirmed(&mut self, handle: ConnHandle) -> Result<(), ConnectionError> {
        let conn = self.find_mut(handle)?;
        if conn.outstanding_indications == 0 {
            warn!("CONNECTION: unexpected indication confirm on {}", handle);
        }
        conn.outstanding_indications = conn.outstanding_indications.saturating_sub(1);
        Ok(())
    }

    pub fn set_mtu(&mut self, handle: ConnHandle, mtu: u16) -> Result<(), ConnectionError> {
        let conn = self.find_mut(handle)?;
        conn.mtu = mtu;
        debug!("CONNECTION: MTU for {} is {}", handle, mtu);
        Ok(())
    }

    fn find(&self, handle: ConnHandle) -> Option<&Connection> {
        self.current.as_ref().filter(|c| c.handle == handle)
    }

    fn find_mut(&mut self, handle: ConnHandle) -> Result<&mut Connection, ConnectionError> {
        self.current
            .as_mut()
            .filter(|c| c.handle == handle)
            .ok_or(ConnectionError::ConnectionNotFound)
    }
}
