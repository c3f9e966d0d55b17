//! BLE Transport Manager
//!
//! Async façade over `TransportCore`. Every operation locks the core for one
//! reconciliation pass. Platform events arrive through the platform channel
//! and are processed by `run`; processed events are republished to the upper
//! layer on the transport channel.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

use crate::ble::advertising::{AdvertisingMode, DeviceIdentity};
use crate::ble::driver::RadioDriver;
use crate::ble::error::TransportError;
use crate::ble::events::{PlatformChannel, PlatformEvent, PlatformSender, TransportChannel, TransportEvent};
use crate::ble::state::{ServiceMode, TransportStatus};
use crate::ble::state_machine::TransportCore;
use crate::ble::timer::TimerCommand;
use crate::config::TransportConfig;

pub struct BleTransportManager<'ch, D> {
    core: Mutex<CriticalSectionRawMutex, TransportCore<D>>,
    platform: &'ch PlatformChannel,
    upper: &'ch TransportChannel,
    timer: Signal<CriticalSectionRawMutex, TimerCommand>,
}

impl<'ch, D: RadioDriver> BleTransportManager<'ch, D> {
    pub fn new(
        driver: D,
        config: TransportConfig,
        identity: DeviceIdentity,
        platform: &'ch PlatformChannel,
        upper: &'ch TransportChannel,
    ) -> Self {
        Self {
            core: Mutex::new(TransportCore::new(driver, config, identity)),
            platform,
            upper,
            timer: Signal::new(),
        }
    }

    /// Idempotent. Picks the service mode and schedules the first drive.
    pub async fn init(&self) -> Result<(), TransportError> {
        let mut core = self.core.lock().await;
        if !core.init() {
            return Ok(());
        }

        if self.platform.try_send(PlatformEvent::DriveRequested).is_err() {
            warn!("BLE: event queue full, driving inline");
            core.converge();
        }
        Ok(())
    }

    /// Enabling restarts the fast advertising window
    pub async fn set_advertising_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut core = self.core.lock().await;
        let command = core.set_advertising_enabled(enabled, Instant::now())?;
        self.timer.signal(command);
        core.converge();
        Ok(())
    }

    pub async fn set_advertising_mode(&self, mode: AdvertisingMode) -> Result<(), TransportError> {
        let mut core = self.core.lock().await;
        core.set_advertising_mode(mode)?;
        core.converge();
        Ok(())
    }

    pub async fn set_service_mode(&self, mode: ServiceMode) -> Result<(), TransportError> {
        let mut core = self.core.lock().await;
        core.set_service_mode(mode)?;
        core.converge();
        Ok(())
    }

    /// At most 16 bytes; an empty name restores `<prefix><discriminator>`
    pub async fn set_device_name(&self, name: &str) -> Result<(), TransportError> {
        let mut core = self.core.lock().await;
        core.set_device_name(name)?;
        core.converge();
        Ok(())
    }

    /// Copy the current device name into `buf`, returning its length
    pub async fn device_name(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.core.lock().await.device_name(buf)
    }

    pub async fn num_connections(&self) -> u8 {
        self.core.lock().await.num_connections()
    }

    /// ATT MTU of the live link
    pub async fn mtu(&self) -> Option<u16> {
        self.core.lock().await.connection().map(|c| c.mtu)
    }

    /// Queue an indication to the live peer. Fails with `Busy` once too many
    /// indications are unconfirmed.
    pub async fn send_indication(&self, data: &[u8]) -> Result<(), TransportError> {
        self.core.lock().await.send_indication(data)
    }

    /// Request link termination. Transport state changes when the disconnect
    /// event is processed.
    pub async fn close_connection(&self) -> Result<(), TransportError> {
        self.core.lock().await.close_connection()
    }

    /// Apply a platform event, re-drive and publish the upward event
    pub async fn on_platform_event(&self, event: PlatformEvent) {
        let upward = {
            let mut core = self.core.lock().await;
            let upward = core.handle_event(event);
            core.converge();
            upward
        };

        if let Some(event) = upward {
            self.publish(event);
        }
    }

    /// Drain the platform queue without waiting. Returns the number of events handled.
    pub async fn process_pending(&self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.platform.try_receive() {
            self.on_platform_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Event loop; run on the application executor
    pub async fn run(&self) -> ! {
        info!("BLE: transport event loop started");
        loop {
            let event = self.platform.receive().await;
            self.on_platform_event(event).await;
        }
    }

    /// Fast advertising timer; run as its own task
    pub async fn run_fast_advertising_timer(&self) -> ! {
        let mut armed: Option<(Instant, u32)> = None;
        loop {
            let command = match armed {
                None => self.timer.wait().await,
                Some((deadline, generation)) => match select(Timer::at(deadline), self.timer.wait()).await {
                    Either::First(()) => {
                        armed = None;
                        debug!("BLE: fast advertising timer {} fired", generation);
                        self.platform
                            .send(PlatformEvent::FastAdvertisingExpired { generation })
                            .await;
                        continue;
                    }
                    Either::Second(command) => command,
                },
            };

            armed = match command {
                TimerCommand::Arm { deadline, generation } => Some((deadline, generation)),
                TimerCommand::Cancel => None,
            };
        }
    }

    fn publish(&self, event: TransportEvent) {
        if self.upper.try_send(event).is_err() {
            warn!("BLE: upper layer queue full, event dropped");
        }
    }

    // --- Queries ---

    pub async fn status(&self) -> TransportStatus {
        self.core.lock().await.status()
    }

    pub async fn service_mode(&self) -> ServiceMode {
        self.core.lock().await.service_mode()
    }

    pub async fn is_advertising_enabled(&self) -> bool {
        self.status().await.advertising_enabled
    }

    pub async fn is_advertising(&self) -> bool {
        self.status().await.advertising
    }

    /// Sender for native callbacks and upstream signals (e.g. pairing complete)
    pub fn event_sender(&self) -> PlatformSender<'ch> {
        self.platform.sender()
    }

    /// Run `f` against the core while holding the lock. Test and diagnostics
    /// hook; production code goes through the operations above.
    #[doc(hidden)]
    pub async fn with_core<R>(&self, f: impl FnOnce(&mut TransportCore<D>) -> R) -> R {
        let mut core = self.core.lock().await;
        f(&mut *core)
    }
}
