//! Advertising Payloads
//!
//! Builds the legacy advertising and scan-response data from the device
//! identity. Pure functions; the radio driver installs the result.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::ble::error::TransportError;
use crate::config::AdvertisingInterval;

/// Maximum advertising data length accepted by the native layer
pub const MAX_ADV_DATA_LEN: usize = 251;

/// Flags AD structure (3 bytes) plus the service-data AD header (4 bytes)
pub const ADV_HEADER_LEN: usize = 7;

/// Largest identification blob that still fits the advertising data
pub const MAX_ID_INFO_LEN: usize = MAX_ADV_DATA_LEN - ADV_HEADER_LEN;

/// Legacy scan response limit
pub const MAX_SCAN_RSP_LEN: usize = 31;

/// Maximum device name length in bytes
pub const MAX_DEVICE_NAME_LEN: usize = 16;

// AD types
const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TYPE_SERVICE_DATA_UUID16: u8 = 0x16;

/// LE General Discoverable | BR/EDR not supported
const AD_FLAGS_GENERAL_DISC_NO_BREDR: u8 = 0x06;

/// Discriminator is 12 bits wide
pub const DISCRIMINATOR_MASK: u16 = 0x0FFF;

pub type AdvData = Vec<u8, MAX_ADV_DATA_LEN>;
pub type ScanData = Vec<u8, MAX_SCAN_RSP_LEN>;
pub type DeviceName = String<MAX_DEVICE_NAME_LEN>;

/// Advertising speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    Fast,
    Slow,
}

/// Parameters handed to the driver when advertising starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingParams {
    pub mode: AdvertisingMode,
    pub interval: AdvertisingInterval,
}

/// Per-boot identity supplied by the upper layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    discriminator: u16,
    id_info: Vec<u8, MAX_ID_INFO_LEN>,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            discriminator: 0,
            id_info: Vec::new(),
        }
    }
}

impl DeviceIdentity {
    /// The discriminator is truncated to 12 bits
    pub fn new(discriminator: u16, id_info: &[u8]) -> Result<Self, TransportError> {
        let id_info = Vec::from_slice(id_info).map_err(|_| TransportError::Resource)?;
        Ok(Self {
            discriminator: discriminator & DISCRIMINATOR_MASK,
            id_info,
        })
    }

    pub fn discriminator(&self) -> u16 {
        self.discriminator
    }

    pub fn id_info(&self) -> &[u8] {
        &self.id_info
    }

    /// `<prefix><discriminator:04>`
    pub fn default_device_name(&self, prefix: &str) -> Result<DeviceName, TransportError> {
        let mut name = DeviceName::new();
        write!(name, "{}{:04}", prefix, self.discriminator).map_err(|_| TransportError::Resource)?;
        Ok(name)
    }
}

/// Advertising data builder
///
/// Layout: `[0x02, 0x01, 0x06]` then `[3 + k, 0x16, uuid_lo, uuid_hi, blob[0..k]]`.
#[derive(Debug, Clone, Copy)]
pub struct AdvertisingPayloadBuilder<'a> {
    service_uuid: u16,
    id_info: &'a [u8],
}

impl<'a> AdvertisingPayloadBuilder<'a> {
    pub const fn new(service_uuid: u16, id_info: &'a [u8]) -> Self {
        Self { service_uuid, id_info }
    }

    pub fn from_identity(identity: &'a DeviceIdentity, service_uuid: u16) -> Self {
        Self::new(service_uuid, identity.id_info())
    }

    /// Total encoded length, whether or not it fits
    pub fn encoded_len(&self) -> usize {
        ADV_HEADER_LEN + self.id_info.len()
    }

    /// Encode into `buf`, returning the length written. On error `buf` is untouched.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let len = self.encoded_len();
        if len > MAX_ADV_DATA_LEN || len > buf.len() {
            return Err(TransportError::Resource);
        }

        let uuid = self.service_uuid.to_le_bytes();
        buf[..ADV_HEADER_LEN].copy_from_slice(&[
            0x02,
            AD_TYPE_FLAGS,
            AD_FLAGS_GENERAL_DISC_NO_BREDR,
            // Bounded by MAX_ID_INFO_LEN + 3 above
            (3 + self.id_info.len()) as u8,
            AD_TYPE_SERVICE_DATA_UUID16,
            uuid[0],
            uuid[1],
        ]);
        buf[ADV_HEADER_LEN..len].copy_from_slice(self.id_info);

        Ok(len)
    }

    pub fn build(&self) -> Result<AdvData, TransportError> {
        let mut raw = [0u8; MAX_ADV_DATA_LEN];
        let len = self.write_to(&mut raw)?;
        Vec::from_slice(&raw[..len]).map_err(|_| TransportError::Resource)
    }
}

/// Scan response carrying the complete local name
pub fn build_scan_response(name: &str) -> Result<ScanData, TransportError> {
    let bytes = name.as_bytes();
    if bytes.len() + 2 > MAX_SCAN_RSP_LEN {
        return Err(TransportError::Resource);
    }

    let mut data = ScanData::new();
    data.push(bytes.len() as u8 + 1).map_err(|_| TransportError::Resource)?;
    data.push(AD_TYPE_COMPLETE_LOCAL_NAME).map_err(|_| TransportError::Resource)?;
    data.extend_from_slice(bytes).map_err(|_| TransportError::Resource)?;
    Ok(data)
}
