//! Common test utilities
//!
//! - `MockRadio`: recording `RadioDriver` with failure injection
//! - Fixtures for identities, cores and managers

#![allow(dead_code)]

use ble_transport_bridge::ble::advertising::{AdvertisingParams, DeviceIdentity};
use ble_transport_bridge::ble::driver::RadioDriver;
use ble_transport_bridge::ble::error::{NativeCode, NativeResult};
use ble_transport_bridge::ble::events::ConnHandle;
use ble_transport_bridge::ble::gatt::{GattHandles, ServiceDefinition};
use ble_transport_bridge::ble::state_machine::{DriveOutcome, TransportCore};
use ble_transport_bridge::TransportConfig;
use embassy_time::Instant;

// Host implementation of the critical section used by embassy-sync
use critical_section as _;

pub const HANDLES: GattHandles = GattHandles {
    service: 0x000C,
    rx_value: 0x000E,
    tx_value: 0x0010,
    tx_cccd: 0x0011,
};

pub const DISCRIMINATOR: u16 = 0x0F00;
pub const DEFAULT_NAME: &str = "BLE-3840";
pub const ID_INFO: [u8; 4] = [0x00, 0xF1, 0xFF, 0x01];

/// Native operations, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    InitLayer,
    Teardown,
    SetDeviceName,
    ConfigureAdvertising,
    StartAdvertising,
    StopAdvertising,
    SendIndication,
    Disconnect,
}

/// A recorded native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitLayer(ServiceDefinition),
    Teardown,
    SetDeviceName(String),
    ConfigureAdvertising { adv: Vec<u8>, scan: Vec<u8> },
    StartAdvertising(AdvertisingParams),
    StopAdvertising,
    SendIndication { conn: ConnHandle, attr: u16, data: Vec<u8> },
    Disconnect(ConnHandle),
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::InitLayer(_) => Op::InitLayer,
            Call::Teardown => Op::Teardown,
            Call::SetDeviceName(_) => Op::SetDeviceName,
            Call::ConfigureAdvertising { .. } => Op::ConfigureAdvertising,
            Call::StartAdvertising(_) => Op::StartAdvertising,
            Call::StopAdvertising => Op::StopAdvertising,
            Call::SendIndication { .. } => Op::SendIndication,
            Call::Disconnect(_) => Op::Disconnect,
        }
    }
}

/// Recording radio driver. Tracks its own view of the radio so tests can
/// check the state machine never issues an out-of-order call.
#[derive(Debug, Default)]
pub struct MockRadio {
    pub calls: Vec<Call>,
    pub failures: Vec<(Op, NativeCode)>,
    pub initialized: bool,
    pub advertising: bool,
    pub out_of_order: usize,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `op` with `code`
    pub fn fail(&mut self, op: Op, code: NativeCode) {
        self.failures.push((op, code));
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls.iter().map(Call::op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn last_adv_data(&self) -> Option<Vec<u8>> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::ConfigureAdvertising { adv, .. } => Some(adv.clone()),
            _ => None,
        })
    }

    pub fn last_device_name(&self) -> Option<String> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::SetDeviceName(name) => Some(name.clone()),
            _ => None,
        })
    }

    fn record(&mut self, call: Call) -> NativeResult {
        let op = call.op();
        self.calls.push(call);
        match self.failures.iter().find(|(o, _)| *o == op) {
            Some((_, code)) => Err(*code),
            None => Ok(()),
        }
    }

    fn check(&mut self, ok: bool) {
        if !ok {
            self.out_of_order += 1;
        }
    }
}

impl RadioDriver for MockRadio {
    fn init_layer(&mut self, service: &ServiceDefinition) -> NativeResult<GattHandles> {
        self.check(!self.initialized);
        self.record(Call::InitLayer(*service))?;
        self.initialized = true;
        Ok(HANDLES)
    }

    fn teardown(&mut self) -> NativeResult {
        self.check(self.initialized && !self.advertising);
        self.record(Call::Teardown)?;
        self.initialized = false;
        Ok(())
    }

    fn set_device_name(&mut self, name: &str) -> NativeResult {
        self.check(self.initialized);
        self.record(Call::SetDeviceName(name.to_string()))
    }

    fn configure_advertising(&mut self, adv_data: &[u8], scan_data: &[u8]) -> NativeResult {
        self.check(self.initialized && !self.advertising);
        self.record(Call::ConfigureAdvertising {
            adv: adv_data.to_vec(),
            scan: scan_data.to_vec(),
        })
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> NativeResult {
        self.check(self.initialized && !self.advertising);
        self.record(Call::StartAdvertising(*params))?;
        self.advertising = true;
        Ok(())
    }

    fn stop_advertising(&mut self) -> NativeResult {
        self.check(self.advertising);
        // A failed stop still leaves the radio quiet
        self.advertising = false;
        self.record(Call::StopAdvertising)
    }

    fn send_indication(&mut self, conn: ConnHandle, attr: u16, data: &[u8]) -> NativeResult {
        self.record(Call::SendIndication {
            conn,
            attr,
            data: data.to_vec(),
        })
    }

    fn disconnect(&mut self, conn: ConnHandle) -> NativeResult {
        self.record(Call::Disconnect(conn))
    }
}

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::new(DISCRIMINATOR, &ID_INFO).unwrap()
}

pub fn new_core(config: TransportConfig) -> TransportCore<MockRadio> {
    TransportCore::new(MockRadio::new(), config, identity())
}

/// Initialized, advertising, with the call log cleared
pub fn advertising_core() -> TransportCore<MockRadio> {
    let mut core = new_core(TransportConfig::default());
    core.init();
    core.set_advertising_enabled(true, Instant::from_ticks(0)).unwrap();
    assert_eq!(core.converge(), DriveOutcome::Converged);
    assert!(core.status().advertising);
    core.driver_mut().calls.clear();
    core
}
