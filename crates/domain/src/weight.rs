use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    Kg,
    G,
    Lb,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::G => "g",
            Self::Lb => "lb",
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kg" => Ok(Self::Kg),
            "g" => Ok(Self::G),
            "lb" => Ok(Self::Lb),
            other => Err(format!("Unknown weight unit: {}", other)),
        }
    }
}

/// One scale sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightReading {
    /// Non-negative magnitude
    pub weight: f64,
    pub unit: WeightUnit,
    /// True when the scale flagged the sample as settled
    pub stable: bool,
    pub timestamp: DateTime<Utc>,
}

impl WeightReading {
    pub fn new(weight: f64, unit: WeightUnit, stable: bool) -> Self {
        Self {
            weight,
            unit,
            stable,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for WeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} ({})",
            self.weight,
            self.unit,
            if self.stable { "stable" } else { "in motion" }
        )
    }
}
