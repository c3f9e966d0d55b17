//! Transport Configuration
//!
//! Static knobs for the BLE transport. Built once at boot and handed to the
//! manager; never mutated afterwards.

use embassy_time::Duration;

/// Default 16-bit service UUID advertised in the service-data AD structure
pub const DEFAULT_SERVICE_UUID: u16 = 0xFFF6;

/// Default device-name prefix, followed by the 4-digit discriminator
pub const DEFAULT_DEVICE_NAME_PREFIX: &str = "BLE-";

/// Fast advertising window after advertising is (re-)enabled
pub const DEFAULT_FAST_ADVERTISING_TIMEOUT: Duration = Duration::from_secs(30);

/// Outstanding indications accepted before `send_indication` reports busy
pub const DEFAULT_MAX_OUTSTANDING_INDICATIONS: u8 = 4;

/// Advertising interval range (0.625ms units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingInterval {
    pub min: u16,
    pub max: u16,
}

impl AdvertisingInterval {
    /// 20ms - 60ms
    pub const FAST: Self = Self { min: 32, max: 96 };
    /// 150ms - 156.25ms
    pub const SLOW: Self = Self { min: 240, max: 250 };

    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }
}

/// BLE transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Prefix of the default device name
    pub device_name_prefix: &'static str,
    /// 16-bit service UUID
    pub service_uuid: u16,
    /// Interval used while fast advertising is active
    pub fast_interval: AdvertisingInterval,
    /// Interval used once the fast window has expired
    pub slow_interval: AdvertisingInterval,
    /// Length of the fast advertising window
    pub fast_advertising_timeout: Duration,
    /// Cap on unconfirmed indications
    pub max_outstanding_indications: u8,
    /// Another transport (e.g. WiFi) is already provisioned, so start disabled
    pub alternate_transport_provisioned: bool,
    /// Radio hardware is present
    pub ble_supported: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    pub const fn new() -> Self {
        Self {
            device_name_prefix: DEFAULT_DEVICE_NAME_PREFIX,
            service_uuid: DEFAULT_SERVICE_UUID,
            fast_interval: AdvertisingInterval::FAST,
            slow_interval: AdvertisingInterval::SLOW,
            fast_advertising_timeout: DEFAULT_FAST_ADVERTISING_TIMEOUT,
            max_outstanding_indications: DEFAULT_MAX_OUTSTANDING_INDICATIONS,
            alternate_transport_provisioned: false,
            ble_supported: true,
        }
    }

    pub fn with_device_name_prefix(mut self, prefix: &'static str) -> Self {
        self.device_name_prefix = prefix;
        self
    }

    pub fn with_service_uuid(mut self, uuid: u16) -> Self {
        self.service_uuid = uuid;
        self
    }

    pub fn with_fast_interval(mut self, interval: AdvertisingInterval) -> Self {
        self.fast_interval = interval;
        self
    }

    pub fn with_slow_interval(mut self, interval: AdvertisingInterval) -> Self {
        self.slow_interval = interval;
        self
    }

    pub fn with_fast_advertising_timeout(mut self, timeout: Duration) -> Self {
        self.fast_advertising_timeout = timeout;
        self
    }

    /// A cap of zero is treated as one
    pub fn with_max_outstanding_indications(mut self, max: u8) -> Self {
        self.max_outstanding_indications = max.max(1);
        self
    }

    pub fn with_alternate_transport_provisioned(mut self, provisioned: bool) -> Self {
        self.alternate_transport_provisioned = provisioned;
        self
    }

    pub fn with_ble_supported(mut self, supported: bool) -> Self {
        self.ble_supported = supported;
        self
    }
}
