use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceKind;

/// Machine-readable failure codes carried next to human-readable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CapabilityUnavailable,
    GestureRequired,
    Timeout,
    MalformedData,
    AlreadyConnected,
    UnknownDevice,
    NotConnected,
    WrongKind,
    Disconnected,
    Preempted,
    Transport,
    PrintFailed,
    InvalidConfig,
    Ipc,
}

/// Peripheral-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeripheralError {
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("A user gesture is required to select a device")]
    GestureRequired,

    #[error("No weight received within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Unrecognized scale data: {0}")]
    MalformedData(String),

    #[error("A {kind} is already connected ({device_id}); disconnect it first")]
    AlreadyConnected { kind: DeviceKind, device_id: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device is not connected: {0}")]
    NotConnected(String),

    #[error("Device {device_id} is not a {expected}")]
    WrongKind {
        device_id: String,
        expected: DeviceKind,
    },

    #[error("Device disconnected before the operation completed")]
    Disconnected,

    #[error("Read superseded by a newer weight request")]
    Preempted,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Print failed: {0}")]
    PrintFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    /// Failure reported by the privileged host process.
    #[error("{message}")]
    Host {
        reason: FailureReason,
        message: String,
    },
}

impl PeripheralError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::CapabilityUnavailable(_) => FailureReason::CapabilityUnavailable,
            Self::GestureRequired => FailureReason::GestureRequired,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::MalformedData(_) => FailureReason::MalformedData,
            Self::AlreadyConnected { .. } => FailureReason::AlreadyConnected,
            Self::UnknownDevice(_) => FailureReason::UnknownDevice,
            Self::NotConnected(_) => FailureReason::NotConnected,
            Self::WrongKind { .. } => FailureReason::WrongKind,
            Self::Disconnected => FailureReason::Disconnected,
            Self::Preempted => FailureReason::Preempted,
            Self::Transport(_) => FailureReason::Transport,
            Self::PrintFailed(_) => FailureReason::PrintFailed,
            Self::InvalidConfig(_) => FailureReason::InvalidConfig,
            Self::Ipc(_) => FailureReason::Ipc,
            Self::Host { reason, .. } => *reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeripheralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_connected_message_names_the_existing_device() {
        let err = PeripheralError::AlreadyConnected {
            kind: DeviceKind::Scale,
            device_id: "/dev/ttyUSB0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("already connected"));
        assert!(msg.contains("/dev/ttyUSB0"));
        assert_eq!(err.reason(), FailureReason::AlreadyConnected);
    }

    #[test]
    fn test_host_error_keeps_relayed_reason() {
        let err = PeripheralError::Host {
            reason: FailureReason::Timeout,
            message: "Nenhuma resposta da balança".to_string(),
        };
        assert_eq!(err.reason(), FailureReason::Timeout);
        assert_eq!(err.to_string(), "Nenhuma resposta da balança");
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FailureReason::GestureRequired).unwrap();
        assert_eq!(json, "\"gesture_required\"");
    }
}
