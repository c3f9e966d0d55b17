//! Transport Errors
//!
//! The error taxonomy surfaced by the transport plus the mapping from native
//! SoftDevice result codes onto it.

use core::fmt;

/// Raw result code returned by the native radio stack (`NRF_SUCCESS` is 0)
pub type NativeCode = u32;

/// Result of a native radio-stack call
pub type NativeResult<T = ()> = Result<T, NativeCode>;

/// SoftDevice result codes (`nrf_error.h`)
pub mod nrf_codes {
    use super::NativeCode;

    pub const NRF_SUCCESS: NativeCode = 0;
    pub const NRF_ERROR_SVC_HANDLER_MISSING: NativeCode = 1;
    pub const NRF_ERROR_SOFTDEVICE_NOT_ENABLED: NativeCode = 2;
    pub const NRF_ERROR_INTERNAL: NativeCode = 3;
    pub const NRF_ERROR_NO_MEM: NativeCode = 4;
    pub const NRF_ERROR_NOT_FOUND: NativeCode = 5;
    pub const NRF_ERROR_NOT_SUPPORTED: NativeCode = 6;
    pub const NRF_ERROR_INVALID_PARAM: NativeCode = 7;
    pub const NRF_ERROR_INVALID_STATE: NativeCode = 8;
    pub const NRF_ERROR_INVALID_LENGTH: NativeCode = 9;
    pub const NRF_ERROR_INVALID_FLAGS: NativeCode = 10;
    pub const NRF_ERROR_INVALID_DATA: NativeCode = 11;
    pub const NRF_ERROR_DATA_SIZE: NativeCode = 12;
    pub const NRF_ERROR_TIMEOUT: NativeCode = 13;
    pub const NRF_ERROR_NULL: NativeCode = 14;
    pub const NRF_ERROR_FORBIDDEN: NativeCode = 15;
    pub const NRF_ERROR_INVALID_ADDR: NativeCode = 16;
    pub const NRF_ERROR_BUSY: NativeCode = 17;
    pub const NRF_ERROR_CONN_COUNT: NativeCode = 18;
    pub const NRF_ERROR_RESOURCES: NativeCode = 19;
}

/// Transport errors returned across the manager boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Bad caller input
    Argument,
    /// Buffer or memory exhaustion
    Resource,
    /// Feature unavailable in the current service mode
    Unsupported,
    /// Native layer failed to start
    Initialization,
    /// Operation already in progress, or too many outstanding indications
    Busy,
    /// Opaque native failure
    Platform(NativeCode),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Argument => f.write_str("invalid argument"),
            TransportError::Resource => f.write_str("insufficient buffer or memory"),
            TransportError::Unsupported => f.write_str("unsupported in current service mode"),
            TransportError::Initialization => f.write_str("BLE layer initialization failed"),
            TransportError::Busy => f.write_str("busy"),
            TransportError::Platform(code) => write!(f, "platform error 0x{:04x}", code),
        }
    }
}

/// Generic classification of a native result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NativeStatus {
    Success,
    ArgumentError,
    BusyError,
    UnsupportedError,
    PlatformError(NativeCode),
}

impl NativeStatus {
    /// Convert to a `Result`, `Success` being the only `Ok` value
    pub fn into_result(self) -> Result<(), TransportError> {
        match self {
            NativeStatus::Success => Ok(()),
            NativeStatus::ArgumentError => Err(TransportError::Argument),
            NativeStatus::BusyError => Err(TransportError::Busy),
            NativeStatus::UnsupportedError => Err(TransportError::Unsupported),
            NativeStatus::PlatformError(code) => Err(TransportError::Platform(code)),
        }
    }
}

/// Map a native result code onto the generic taxonomy. Total: unknown codes
/// become `PlatformError`.
pub const fn map_native_code(code: NativeCode) -> NativeStatus {
    use nrf_codes::*;

    match code {
        NRF_SUCCESS => NativeStatus::Success,
        NRF_ERROR_INVALID_PARAM
        | NRF_ERROR_INVALID_LENGTH
        | NRF_ERROR_INVALID_FLAGS
        | NRF_ERROR_INVALID_DATA
        | NRF_ERROR_DATA_SIZE
        | NRF_ERROR_NULL
        | NRF_ERROR_INVALID_ADDR => NativeStatus::ArgumentError,
        NRF_ERROR_BUSY => NativeStatus::BusyError,
        NRF_ERROR_NOT_SUPPORTED => NativeStatus::UnsupportedError,
        other => NativeStatus::PlatformError(other),
    }
}

/// Map a failed native call straight to a `TransportError`
pub fn map_native_error(code: NativeCode) -> TransportError {
    match map_native_code(code).into_result() {
        Ok(()) => TransportError::Platform(code),
        Err(e) => e,
    }
}

/// Map a native call result, passing successful values through
pub fn check<T>(result: NativeResult<T>) -> Result<T, TransportError> {
    result.map_err(map_native_error)
}
