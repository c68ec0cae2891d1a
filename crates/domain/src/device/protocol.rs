use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Telemetry format spoken by a scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleProtocol {
    Toledo,
    Filizola,
    Urano,
    #[default]
    Generic,
}

impl ScaleProtocol {
    pub const ALL: [ScaleProtocol; 4] = [Self::Toledo, Self::Filizola, Self::Urano, Self::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toledo => "toledo",
            Self::Filizola => "filizola",
            Self::Urano => "urano",
            Self::Generic => "generic",
        }
    }

    /// Bytes that ask the scale for one sample.
    pub fn request_command(&self) -> &'static [u8] {
        match self {
            Self::Filizola => b"P\r\n",
            // ENQ
            Self::Toledo | Self::Urano | Self::Generic => &[0x05],
        }
    }
}

impl fmt::Display for ScaleProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toledo" => Ok(Self::Toledo),
            "filizola" => Ok(Self::Filizola),
            "urano" => Ok(Self::Urano),
            "generic" => Ok(Self::Generic),
            other => Err(format!("Unknown scale protocol: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    Hardware,
}

/// Serial framing preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl ScaleConfig {
    pub const fn new(baud_rate: u32, data_bits: u8, stop_bits: u8, parity: Parity) -> Self {
        Self {
            baud_rate,
            data_bits,
            stop_bits,
            parity,
            flow_control: FlowControl::None,
        }
    }

    pub fn for_protocol(protocol: ScaleProtocol) -> Self {
        match protocol {
            ScaleProtocol::Toledo => Self::new(9600, 8, 1, Parity::None),
            ScaleProtocol::Filizola => Self::new(9600, 7, 1, Parity::Even),
            ScaleProtocol::Urano => Self::new(9600, 8, 1, Parity::None),
            ScaleProtocol::Generic => Self::new(9600, 8, 1, Parity::None),
        }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::for_protocol(ScaleProtocol::Generic)
    }
}
