use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{FailureReason, PeripheralError};
use crate::weight::WeightReading;

/// `{success, message}` envelope returned by every peripheral operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            reason: None,
        }
    }

    pub fn failed(error: &PeripheralError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            reason: Some(error.reason()),
        }
    }
}

impl From<Result<String, PeripheralError>> for OperationResult {
    fn from(result: Result<String, PeripheralError>) -> Self {
        match result {
            Ok(message) => Self::ok(message),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Result of a weight read; `reading` is set on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<WeightReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl WeightResult {
    pub fn ok(reading: WeightReading) -> Self {
        Self {
            success: true,
            reading: Some(reading),
            message: None,
            reason: None,
        }
    }

    pub fn failed(error: &PeripheralError) -> Self {
        Self {
            success: false,
            reading: None,
            message: Some(error.to_string()),
            reason: Some(error.reason()),
        }
    }

    pub fn weight(&self) -> Option<f64> {
        self.reading.as_ref().map(|r| r.weight)
    }
}

impl From<Result<WeightReading, PeripheralError>> for WeightResult {
    fn from(result: Result<WeightReading, PeripheralError>) -> Self {
        match result {
            Ok(reading) => Self::ok(reading),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Devices found by a scan; on failure the list is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub success: bool,
    pub devices: Vec<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl From<Result<Vec<Device>, PeripheralError>> for ScanResult {
    fn from(result: Result<Vec<Device>, PeripheralError>) -> Self {
        match result {
            Ok(devices) => Self {
                success: true,
                devices,
                message: None,
                reason: None,
            },
            Err(e) => Self {
                success: false,
                devices: Vec::new(),
                message: Some(e.to_string()),
                reason: Some(e.reason()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::WeightUnit;

    #[test]
    fn test_failed_result_carries_reason() {
        let result = OperationResult::failed(&PeripheralError::GestureRequired);
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::GestureRequired));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "gesture_required");
    }

    #[test]
    fn test_weight_result_from_ok() {
        let result = WeightResult::from(Ok(WeightReading::new(1.5, WeightUnit::Kg, true)));
        assert!(result.success);
        assert_eq!(result.weight(), Some(1.5));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("message").is_none());
    }
}
