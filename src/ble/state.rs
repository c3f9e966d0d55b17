//! Transport State
//!
//! Policy flags, the explicit radio state and the status snapshot.

use core::ops::{BitOr, BitOrAssign};

/// Service mode of the BLE transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceMode {
    Enabled,
    Disabled,
    NotSupported,
}

/// Compact set of policy facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateFlags(u8);

impl StateFlags {
    pub const ASYNC_INIT_COMPLETED: Self = Self(0x01);
    pub const ADVERTISING_CONFIGURED: Self = Self(0x02);
    pub const ADVERTISING_ENABLED: Self = Self(0x04);
    pub const FAST_ADVERTISING_ENABLED: Self = Self(0x08);
    pub const USE_CUSTOM_DEVICE_NAME: Self = Self(0x10);
    pub const ADVERTISING_REFRESH_NEEDED: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Actual state of the native radio layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Service not registered, layer down
    Uninitialized,
    /// Layer up, not advertising
    Idle,
    /// Layer up and advertising
    Advertising,
}

/// Native action that moves the radio between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioAction {
    InitLayer,
    StartAdvertising,
    StopAdvertising,
    Teardown,
}

impl RadioState {
    /// Transition table. `None` marks an action that is not valid from this state.
    pub const fn next(self, action: RadioAction) -> Option<RadioState> {
        match (self, action) {
            (RadioState::Uninitialized, RadioAction::InitLayer) => Some(RadioState::Idle),
            (RadioState::Idle, RadioAction::StartAdvertising) => Some(RadioState::Advertising),
            (RadioState::Idle, RadioAction::Teardown) => Some(RadioState::Uninitialized),
            (RadioState::Advertising, RadioAction::StopAdvertising) => Some(RadioState::Idle),
            _ => None,
        }
    }

    pub const fn is_initialized(self) -> bool {
        !matches!(self, RadioState::Uninitialized)
    }

    pub const fn is_advertising(self) -> bool {
        matches!(self, RadioState::Advertising)
    }
}

/// Point-in-time view of every state fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportStatus {
    pub service_mode: ServiceMode,
    pub async_init_completed: bool,
    pub radio_layer_initialized: bool,
    pub advertising_configured: bool,
    pub advertising: bool,
    pub advertising_enabled: bool,
    pub fast_advertising_enabled: bool,
    pub use_custom_device_name: bool,
    pub advertising_refresh_needed: bool,
    pub connections: u8,
}

impl TransportStatus {
    pub(crate) fn new(mode: ServiceMode, flags: StateFlags, radio: RadioState, connections: u8) -> Self {
        Self {
            service_mode: mode,
            async_init_completed: flags.contains(StateFlags::ASYNC_INIT_COMPLETED),
            radio_layer_initialized: radio.is_initialized(),
            advertising_configured: flags.contains(StateFlags::ADVERTISING_CONFIGURED),
            advertising: radio.is_advertising(),
            advertising_enabled: flags.contains(StateFlags::ADVERTISING_ENABLED),
            fast_advertising_enabled: flags.contains(StateFlags::FAST_ADVERTISING_ENABLED),
            use_custom_device_name: flags.contains(StateFlags::USE_CUSTOM_DEVICE_NAME),
            advertising_refresh_needed: flags.contains(StateFlags::ADVERTISING_REFRESH_NEEDED),
            connections,
        }
    }
}
