//! Transport State Machine
//!
//! `TransportCore` owns every piece of transport state and reconciles the
//! desired state (service mode, policy flags) with the actual radio state.
//! Each `drive_step` performs at most one native transition; `converge`
//! repeats it until nothing is left to do.

use embassy_time::Instant;

use crate::ble::advertising::{
    build_scan_response, AdvertisingMode, AdvertisingParams, AdvertisingPayloadBuilder, DeviceIdentity, DeviceName,
    MAX_DEVICE_NAME_LEN,
};
use crate::ble::connection::{Connection, ConnectionError, ConnectionTracker};
use crate::ble::driver::RadioDriver;
use crate::ble::error::{map_native_error, NativeCode, TransportError};
use crate::ble::events::{ConnHandle, PlatformEvent, TransportEvent};
use crate::ble::gatt::{GattHandles, ServiceDefinition};
use crate::ble::state::{RadioAction, RadioState, ServiceMode, StateFlags, TransportStatus};
use crate::ble::timer::{AdvertiseTimer, TimerCommand};
use crate::config::TransportConfig;

/// Upper bound on transitions per reconciliation pass
pub const MAX_DRIVE_STEPS: usize = 8;

/// Result of a single `drive_step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveOutcome {
    /// Actual state matches desired state; no native call was made
    Converged,
    /// One transition was performed; call again
    Progressed,
    /// A native call failed and the service was disabled
    Failed,
}

/// All transport state plus the radio driver
pub struct TransportCore<D> {
    driver: D,
    config: TransportConfig,
    mode: ServiceMode,
    flags: StateFlags,
    radio: RadioState,
    connections: ConnectionTracker,
    identity: DeviceIdentity,
    custom_name: DeviceName,
    handles: Option<GattHandles>,
    timer: AdvertiseTimer,
    pairing_complete: bool,
    initialized: bool,
    /// Link we asked the radio to drop so the layer can be reclaimed
    closing: Option<ConnHandle>,
}

impl<D: RadioDriver> TransportCore<D> {
    pub fn new(driver: D, config: TransportConfig, identity: DeviceIdentity) -> Self {
        let timer = AdvertiseTimer::new(config.fast_advertising_timeout);
        Self {
            driver,
            config,
            mode: ServiceMode::Disabled,
            flags: StateFlags::empty(),
            radio: RadioState::Uninitialized,
            connections: ConnectionTracker::new(),
            identity,
            custom_name: DeviceName::new(),
            handles: None,
            timer,
            pairing_complete: false,
            initialized: false,
            closing: None,
        }
    }

    /// Pick the initial service mode. Returns `true` the first time only.
    pub fn init(&mut self) -> bool {
        if self.initialized {
            return false;
        }

        self.mode = if !self.config.ble_supported {
            ServiceMode::NotSupported
        } else if self.config.alternate_transport_provisioned {
            ServiceMode::Disabled
        } else {
            ServiceMode::Enabled
        };
        self.initialized = true;
        info!("BLE: init, service mode {:?}", self.mode);
        true
    }

    // --- Reconciliation ---

    pub fn drive_step(&mut self) -> DriveOutcome {
        if !self.initialized {
            return DriveOutcome::Converged;
        }

        if !self.flags.contains(StateFlags::ASYNC_INIT_COMPLETED) {
            self.flags.insert(StateFlags::ASYNC_INIT_COMPLETED);
            debug!("BLE: async init completed");
        }

        let enabled = self.mode == ServiceMode::Enabled;

        // Bring the layer up
        if enabled && !self.radio.is_initialized() {
            let service = ServiceDefinition::transport(self.config.service_uuid);
            return match self.driver.init_layer(&service) {
                Ok(handles) => {
                    self.handles = Some(handles);
                    self.transition(RadioAction::InitLayer);
                    self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
                    info!("BLE: radio layer initialized");
                    DriveOutcome::Progressed
                }
                Err(code) => self.native_failure("init layer", code),
            };
        }

        let want_advertising = enabled
            && self.flags.contains(StateFlags::ADVERTISING_ENABLED)
            && self.connections.count() == 0;
        let refresh = self.flags.contains(StateFlags::ADVERTISING_REFRESH_NEEDED);

        if want_advertising {
            if !self.radio.is_advertising() && refresh {
                if !self.flags.contains(StateFlags::ADVERTISING_CONFIGURED) {
                    if let Err(outcome) = self.configure_advertising() {
                        return outcome;
                    }
                    self.flags.insert(StateFlags::ADVERTISING_CONFIGURED);
                }

                let params = self.advertising_params();
                if let Err(code) = self.driver.start_advertising(&params) {
                    return self.native_failure("start advertising", code);
                }
                self.transition(RadioAction::StartAdvertising);
                self.flags.remove(StateFlags::ADVERTISING_REFRESH_NEEDED);
                info!("BLE: advertising started ({:?})", params.mode);
                return DriveOutcome::Progressed;
            }

            if self.radio.is_advertising() && refresh {
                // Restart with fresh data and interval on the next step
                let result = self.driver.stop_advertising();
                self.transition(RadioAction::StopAdvertising);
                self.flags.remove(StateFlags::ADVERTISING_CONFIGURED);
                if let Err(code) = result {
                    return self.native_failure("stop advertising", code);
                }
                debug!("BLE: advertising stopped for refresh");
                return DriveOutcome::Progressed;
            }

            return DriveOutcome::Converged;
        }

        if self.radio.is_advertising() {
            let result = self.driver.stop_advertising();
            self.transition(RadioAction::StopAdvertising);
            self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
            if let Err(code) = result {
                return self.native_failure("stop advertising", code);
            }
            info!("BLE: advertising stopped");
            return DriveOutcome::Progressed;
        }

        // Reclaim the radio, dropping the live link first
        if !enabled && self.radio.is_initialized() {
            if let Some(conn) = self.connections.current().map(|c| c.handle) {
                if self.closing == Some(conn) {
                    return DriveOutcome::Converged;
                }
                self.closing = Some(conn);
                if let Err(code) = self.driver.disconnect(conn) {
                    return self.native_failure("disconnect", code);
                }
                info!("BLE: dropping link {} to release the radio", conn);
                return DriveOutcome::Progressed;
            }

            if let Err(code) = self.driver.teardown() {
                return self.native_failure("teardown", code);
            }
            self.transition(RadioAction::Teardown);
            self.handles = None;
            self.flags.remove(StateFlags::ADVERTISING_CONFIGURED);
            info!("BLE: radio layer torn down");
            return DriveOutcome::Progressed;
        }

        DriveOutcome::Converged
    }

    /// Step until converged or out of budget. After a failure the service is
    /// disabled, so stepping continues to release the radio; a second failure
    /// ends the pass.
    pub fn converge(&mut self) -> DriveOutcome {
        let mut failed = false;
        for _ in 0..MAX_DRIVE_STEPS {
            match self.drive_step() {
                DriveOutcome::Progressed => {}
                DriveOutcome::Failed if !failed => failed = true,
                DriveOutcome::Failed => return DriveOutcome::Failed,
                DriveOutcome::Converged if failed => return DriveOutcome::Failed,
                DriveOutcome::Converged => return DriveOutcome::Converged,
            }
        }
        warn!("BLE: state machine did not converge in {} steps", MAX_DRIVE_STEPS);
        DriveOutcome::Progressed
    }

    fn transition(&mut self, action: RadioAction) {
        match self.radio.next(action) {
            Some(next) => self.radio = next,
            None => error!("BLE: invalid radio transition {:?} from {:?}", action, self.radio),
        }
    }

    fn native_failure(&mut self, op: &str, code: NativeCode) -> DriveOutcome {
        error!("BLE: {} failed: {:?}", op, map_native_error(code));
        self.mode = ServiceMode::Disabled;
        DriveOutcome::Failed
    }

    fn configure_advertising(&mut self) -> Result<(), DriveOutcome> {
        let payloads = self.device_name_string().and_then(|name| {
            let adv = AdvertisingPayloadBuilder::from_identity(&self.identity, self.config.service_uuid).build()?;
            let scan = build_scan_response(&name)?;
            Ok((name, adv, scan))
        });

        let (name, adv, scan) = match payloads {
            Ok(p) => p,
            Err(e) => {
                error!("BLE: {:?}, advertising payload: {:?}", TransportError::Initialization, e);
                self.mode = ServiceMode::Disabled;
                return Err(DriveOutcome::Failed);
            }
        };

        if let Err(code) = self.driver.set_device_name(&name) {
            return Err(self.native_failure("set device name", code));
        }
        if let Err(code) = self.driver.configure_advertising(&adv, &scan) {
            return Err(self.native_failure("configure advertising", code));
        }
        debug!("BLE: advertising configured, {} bytes", adv.len());
        Ok(())
    }

    fn advertising_params(&self) -> AdvertisingParams {
        if self.flags.contains(StateFlags::FAST_ADVERTISING_ENABLED) {
            AdvertisingParams {
                mode: AdvertisingMode::Fast,
                interval: self.config.fast_interval,
            }
        } else {
            AdvertisingParams {
                mode: AdvertisingMode::Slow,
                interval: self.config.slow_interval,
            }
        }
    }

    // --- Policy mutations ---

    /// Returns the command for the fast advertising timer task
    pub fn set_advertising_enabled(&mut self, enabled: bool, now: Instant) -> Result<TimerCommand, TransportError> {
        if self.mode == ServiceMode::NotSupported {
            return Err(TransportError::Unsupported);
        }

        let command = if enabled {
            self.flags.insert(StateFlags::FAST_ADVERTISING_ENABLED);
            self.timer.restart(now)
        } else {
            self.timer.cancel()
        };
        self.flags.set(StateFlags::ADVERTISING_ENABLED, enabled);
        self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
        debug!("BLE: advertising enabled={}", enabled);
        Ok(command)
    }

    pub fn set_advertising_mode(&mut self, mode: AdvertisingMode) -> Result<(), TransportError> {
        if self.mode == ServiceMode::NotSupported {
            return Err(TransportError::Unsupported);
        }

        self.flags
            .set(StateFlags::FAST_ADVERTISING_ENABLED, mode == AdvertisingMode::Fast);
        self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
        Ok(())
    }

    pub fn set_service_mode(&mut self, mode: ServiceMode) -> Result<(), TransportError> {
        if self.mode == ServiceMode::NotSupported {
            return Err(TransportError::Unsupported);
        }
        if mode == ServiceMode::NotSupported {
            return Err(TransportError::Argument);
        }

        if self.mode != mode {
            info!("BLE: service mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
        Ok(())
    }

    /// Empty name restores the default
    pub fn set_device_name(&mut self, name: &str) -> Result<(), TransportError> {
        if self.mode == ServiceMode::NotSupported {
            return Err(TransportError::Unsupported);
        }
        if name.len() > MAX_DEVICE_NAME_LEN {
            return Err(TransportError::Argument);
        }

        self.custom_name.clear();
        if name.is_empty() {
            self.flags.remove(StateFlags::USE_CUSTOM_DEVICE_NAME);
        } else {
            self.custom_name.push_str(name).map_err(|_| TransportError::Argument)?;
            self.flags.insert(StateFlags::USE_CUSTOM_DEVICE_NAME);
        }

        // Payload carries the name; rebuild it on the next start
        self.flags.remove(StateFlags::ADVERTISING_CONFIGURED);
        self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
        Ok(())
    }

    /// Copy the current name into `buf`, returning its length
    pub fn device_name(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let name = self.device_name_string()?;
        let bytes = name.as_bytes();
        if buf.len() < bytes.len() {
            return Err(TransportError::Resource);
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn device_name_string(&self) -> Result<DeviceName, TransportError> {
        if self.flags.contains(StateFlags::USE_CUSTOM_DEVICE_NAME) {
            Ok(self.custom_name.clone())
        } else {
            self.identity.default_device_name(self.config.device_name_prefix)
        }
    }

    // --- Outbound link operations ---

    /// Indicate `data` to the live peer. Accepted means queued; delivery is
    /// reported by `IndicateConfirmed`.
    pub fn send_indication(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let handles = self.handles.ok_or(TransportError::Argument)?;
        let (conn, mtu) = self
            .connections
            .current()
            .map(|c| (c.handle, c.mtu))
            .ok_or(TransportError::Argument)?;
        if data.len() > usize::from(mtu.saturating_sub(3)) {
            return Err(TransportError::Argument);
        }

        self.connections
            .begin_indication(conn, self.config.max_outstanding_indications)?;
        if let Err(code) = self.driver.send_indication(conn, handles.tx_value, data) {
            self.connections.abort_indication(conn);
            warn!("BLE: indication on {} refused: {:?}", conn, map_native_error(code));
            return Err(map_native_error(code));
        }
        trace!("BLE: indication queued on {}, {} bytes", conn, data.len());
        Ok(())
    }

    /// Request termination of the live link; state changes when the
    /// disconnect event arrives
    pub fn close_connection(&mut self) -> Result<(), TransportError> {
        let conn = self
            .connections
            .current()
            .map(|c| c.handle)
            .ok_or(TransportError::Argument)?;
        self.driver.disconnect(conn).map_err(map_native_error)?;
        info!("BLE: closing connection {}", conn);
        Ok(())
    }

    // --- Platform events ---

    /// Apply one platform event. Returns the event to surface upward, if any.
    /// The caller re-drives afterwards.
    pub fn handle_event(&mut self, event: PlatformEvent) -> Option<TransportEvent> {
        match event {
            PlatformEvent::DriveRequested => None,
            PlatformEvent::Connected { conn } => {
                self.on_connected(conn);
                None
            }
            PlatformEvent::Disconnected { conn, reason } => self
                .on_disconnected(conn, reason)
                .map(|c| TransportEvent::ConnectionClosed { conn: c.handle }),
            PlatformEvent::WriteReceived { conn, data } => {
                if self.connections.is_connected(conn) {
                    Some(TransportEvent::MessageReceived { conn, data })
                } else {
                    debug!("BLE: write from unknown link {} dropped", conn);
                    None
                }
            }
            PlatformEvent::Subscribed { conn } => match self.connections.set_subscribed(conn, true) {
                Ok(false) => {
                    info!("BLE: {} subscribed", conn);
                    Some(TransportEvent::ConnectionEstablished { conn })
                }
                Ok(true) => None,
                Err(e) => {
                    debug!("BLE: subscribe on {}: {:?}", conn, e);
                    None
                }
            },
            PlatformEvent::Unsubscribed { conn } => match self.connections.set_subscribed(conn, false) {
                Ok(true) => {
                    info!("BLE: {} unsubscribed", conn);
                    Some(TransportEvent::ConnectionClosed { conn })
                }
                Ok(false) => None,
                Err(e) => {
                    debug!("BLE: unsubscribe on {}: {:?}", conn, e);
                    None
                }
            },
            PlatformEvent::IndicateConfirmed { conn } => match self.connections.indication_confirmed(conn) {
                Ok(()) => Some(TransportEvent::IndicationConfirmed { conn }),
                Err(e) => {
                    debug!("BLE: confirm on {}: {:?}", conn, e);
                    None
                }
            },
            PlatformEvent::MtuExchanged { conn, mtu } => {
                if let Err(e) = self.connections.set_mtu(conn, mtu) {
                    debug!("BLE: MTU on {}: {:?}", conn, e);
                }
                None
            }
            PlatformEvent::PairingComplete => {
                self.on_pairing_complete();
                None
            }
            PlatformEvent::FastAdvertisingExpired { generation } => {
                self.on_fast_advertising_expired(generation);
                None
            }
            PlatformEvent::AdvertisingStopped { code } => {
                self.on_advertising_stopped(code);
                None
            }
        }
    }

    fn on_connected(&mut self, conn: ConnHandle) {
        match self.connections.on_connected(conn) {
            Ok(()) => info!("BLE: connected {}", conn),
            Err(ConnectionError::ConnectionLimitReached) => {
                // Single-connection policy: drop the extra link
                if let Err(code) = self.driver.disconnect(conn) {
                    warn!("BLE: failed to drop extra link {}: {:?}", conn, map_native_error(code));
                }
            }
            Err(e) => warn!("BLE: connect {} rejected: {:?}", conn, e),
        }
    }

    fn on_disconnected(&mut self, conn: ConnHandle, reason: u8) -> Option<Connection> {
        let removed = self.connections.on_disconnected(conn)?;
        if self.closing == Some(conn) {
            self.closing = None;
        }
        info!("BLE: disconnected {} reason 0x{:x}", conn, reason);

        let advertising_enabled = self.flags.contains(StateFlags::ADVERTISING_ENABLED);
        if advertising_enabled {
            self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
        }
        if self.pairing_complete && !advertising_enabled {
            self.release_radio();
        }
        Some(removed)
    }

    fn on_pairing_complete(&mut self) {
        self.pairing_complete = true;
        info!("BLE: pairing complete");
        if self.connections.count() == 0 && !self.flags.contains(StateFlags::ADVERTISING_ENABLED) {
            self.release_radio();
        }
    }

    fn release_radio(&mut self) {
        if self.mode == ServiceMode::Enabled {
            info!("BLE: releasing radio resources");
            self.mode = ServiceMode::Disabled;
        }
    }

    fn on_advertising_stopped(&mut self, code: NativeCode) {
        if !self.radio.is_advertising() {
            debug!("BLE: advertising stop 0x{:x} while not advertising", code);
            return;
        }
        self.transition(RadioAction::StopAdvertising);
        self.native_failure("advertising", code);
    }

    fn on_fast_advertising_expired(&mut self, generation: u32) {
        if !self.timer.expire(generation) {
            debug!("BLE: stale fast advertising expiry {}", generation);
            return;
        }
        info!("BLE: fast advertising window elapsed");
        self.flags.remove(StateFlags::FAST_ADVERTISING_ENABLED);
        self.flags.insert(StateFlags::ADVERTISING_REFRESH_NEEDED);
    }

    // --- Queries ---

    pub fn status(&self) -> TransportStatus {
        TransportStatus::new(self.mode, self.flags, self.radio, self.connections.count())
    }

    pub fn service_mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio
    }

    pub fn num_connections(&self) -> u8 {
        self.connections.count()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connections.current()
    }

    pub fn handles(&self) -> Option<GattHandles> {
        self.handles
    }

    pub fn timer(&self) -> &AdvertiseTimer {
        &self.timer
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
