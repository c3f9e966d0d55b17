//! SoftDevice S140 Backend
//!
//! `RadioDriver` implementation on top of `nrf-softdevice`:
//! - `server`: attribute table registration and GATT callbacks
//! - `radio`: the driver handle plus the task owning advertising and links
//!
//! The S140 only accepts attribute registration before `Softdevice::run`
//! starts, so the service is registered at boot and `init_layer` activates it.

pub mod radio;
pub mod server;

pub use radio::{radio_task, LinkSlot, RadioChannel, RadioCommand, SoftdeviceRadio};
pub use server::TransportServer;
