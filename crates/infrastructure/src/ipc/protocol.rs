use serde::{Deserialize, Serialize};
use serde_json::Value;

use domain::{FailureReason, PeripheralError, ScaleProtocol, WeightReading, WeightUnit};

/// Named channels between the UI process and the privileged host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpcChannel {
    ScanSerialPorts,
    ConnectPrinter,
    PrintReceipt,
    ConnectScale,
    ReadWeight,
    DisconnectPrinter,
    DisconnectScale,
    ShowNotification,
}

/// One request line. `id` correlates the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcRequest {
    pub id: String,
    pub channel: IpcChannel,
    #[serde(default)]
    pub payload: Value,
}

impl IpcRequest {
    pub fn new(channel: IpcChannel, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub id: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePathPayload {
    pub device_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ScaleProtocol>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWeightPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

/// Plain result object returned by the host. Never carries live handles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<WeightUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl HostReply {
    pub fn done() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn reading(reading: &WeightReading) -> Self {
        Self {
            success: true,
            weight: Some(reading.weight),
            unit: Some(reading.unit),
            stable: Some(reading.stable),
            ..Default::default()
        }
    }

    pub fn failed(error: &PeripheralError) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            reason: Some(error.reason()),
            ..Default::default()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Result<Self, PeripheralError> {
        serde_json::from_value(value)
            .map_err(|e| PeripheralError::Ipc(format!("Malformed host reply: {}", e)))
    }

    /// Failure replies become `PeripheralError::Host`, keeping the host's reason code.
    pub fn into_result(self) -> Result<Self, PeripheralError> {
        if self.success {
            return Ok(self);
        }
        Err(PeripheralError::Host {
            reason: self.reason.unwrap_or(FailureReason::Transport),
            message: self
                .message
                .unwrap_or_else(|| "Host reported a failure".to_string()),
        })
    }

    pub fn into_reading(self) -> Result<WeightReading, PeripheralError> {
        let reply = self.into_result()?;
        let weight = reply
            .weight
            .ok_or_else(|| PeripheralError::MalformedData("Host reply carries no weight".to_string()))?;
        Ok(WeightReading::new(
            weight,
            reply.unit.unwrap_or(WeightUnit::Kg),
            reply.stable.unwrap_or(true),
        ))
    }
}
