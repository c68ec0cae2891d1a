use serde::{Deserialize, Serialize};

/// Connection status of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Not connected, no active connection attempt
    #[default]
    Disconnected,
    /// A connect request is in flight
    Connecting,
    /// Handle open and operational
    Connected,
    /// Connect failed; reported once, then reverts to Disconnected
    Error,
}

impl DeviceStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Connected or on its way there; the kind's slot is taken.
    pub fn holds_slot(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn to_connecting(&self) -> Result<Self, &'static str> {
        match self {
            Self::Disconnected | Self::Error => Ok(Self::Connecting),
            _ => Err("Can only connect from Disconnected or Error state"),
        }
    }

    pub fn to_connected(&self) -> Result<Self, &'static str> {
        match self {
            Self::Connecting => Ok(Self::Connected),
            _ => Err("Can only complete a connection from Connecting state"),
        }
    }

    pub fn to_error(&self) -> Result<Self, &'static str> {
        match self {
            Self::Connecting => Ok(Self::Error),
            _ => Err("Only a pending connection can fail"),
        }
    }

    pub fn to_disconnected(&self) -> Self {
        Self::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_disconnected() {
        let state = DeviceStatus::default();
        assert_eq!(state, DeviceStatus::Disconnected);
        assert!(!state.is_connected());
        assert!(!state.holds_slot());
    }

    #[test]
    fn test_connect_happy_path() {
        let next = DeviceStatus::Disconnected.to_connecting().unwrap();
        assert_eq!(next, DeviceStatus::Connecting);
        assert!(next.holds_slot());
        let next = next.to_connected().unwrap();
        assert!(next.is_connected());
    }

    #[test]
    fn test_failed_connect_goes_through_error() {
        let next = DeviceStatus::Connecting.to_error().unwrap();
        assert_eq!(next, DeviceStatus::Error);
        assert_eq!(next.to_disconnected(), DeviceStatus::Disconnected);
        assert!(next.to_connecting().is_ok());
    }

    #[test]
    fn test_cannot_connect_from_connected() {
        assert!(DeviceStatus::Connected.to_connecting().is_err());
        assert!(DeviceStatus::Connecting.to_connecting().is_err());
    }

    #[test]
    fn test_connected_device_cannot_enter_error() {
        assert!(DeviceStatus::Connected.to_error().is_err());
        assert!(DeviceStatus::Disconnected.to_connected().is_err());
    }
}
