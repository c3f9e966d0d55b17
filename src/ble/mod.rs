//! BLE Transport
//!
//! Policy layer above the native BLE stack: advertising payloads, the GATT
//! callback bridge, connection tracking, the state machine reconciling
//! desired and actual radio state, and the manager façade.

pub mod advertising;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod gatt;
pub mod manager;
pub mod state;
pub mod state_machine;
pub mod timer;
