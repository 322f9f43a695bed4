//! Coarse network quality estimate used to pick the default upload concurrency.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkQuality {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl NetworkQuality {
    /// Parse an effective connection type ("slow-2g", "2g", "3g", "4g").
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "slow-2g" => Ok(NetworkQuality::Slow2g),
            "2g" => Ok(NetworkQuality::TwoG),
            "3g" => Ok(NetworkQuality::ThreeG),
            "4g" | "wifi" | "ethernet" => Ok(NetworkQuality::FourG),
            "unknown" | "" => Ok(NetworkQuality::Unknown),
            _ => Err(format!("Invalid network quality: {}", s)),
        }
    }

    /// Classify a measured downlink in megabits per second.
    pub fn from_downlink_mbps(mbps: f64) -> Self {
        if !mbps.is_finite() || mbps <= 0.0 {
            NetworkQuality::Unknown
        } else if mbps < 0.05 {
            NetworkQuality::Slow2g
        } else if mbps < 0.07 {
            NetworkQuality::TwoG
        } else if mbps < 0.7 {
            NetworkQuality::ThreeG
        } else {
            NetworkQuality::FourG
        }
    }

    /// Default number of concurrent uploads for this network.
    pub fn upload_slots(self) -> usize {
        match self {
            NetworkQuality::Slow2g | NetworkQuality::TwoG => 1,
            NetworkQuality::ThreeG => 2,
            NetworkQuality::FourG => 4,
            NetworkQuality::Unknown => 3,
        }
    }
}
