#![cfg_attr(not(test), no_std)]

//! BLE Transport Bridge Library
//!
//! Exposes a single-connection BLE peripheral link to an upper-layer secure
//! session protocol, driving a vendor BLE stack through a narrow driver seam.
//! The crate is organized into clear layers:
//!
//! - `ble`: transport policy (advertising payloads, GATT bridge, connection
//!   tracking, the reconciliation state machine and the public manager)
//! - `config`: transport configuration
//! - `softdevice`: nRF SoftDevice S140 radio driver (feature `softdevice`)

// This must go first so the logging macros are visible to every module.
mod fmt;

pub mod ble;
pub mod config;
#[cfg(feature = "softdevice")]
pub mod softdevice;

pub use ble::error::TransportError;
pub use ble::manager::BleTransportManager;
pub use config::TransportConfig;
