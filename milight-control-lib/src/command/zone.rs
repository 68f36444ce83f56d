use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Bulb group addressed by a zone-scoped command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    #[default]
    All,
    #[value(name = "1", alias = "zone1")]
    #[serde(rename = "1", alias = "zone1")]
    Zone1,
    #[value(name = "2", alias = "zone2")]
    #[serde(rename = "2", alias = "zone2")]
    Zone2,
    #[value(name = "3", alias = "zone3")]
    #[serde(rename = "3", alias = "zone3")]
    Zone3,
    #[value(name = "4", alias = "zone4")]
    #[serde(rename = "4", alias = "zone4")]
    Zone4,
}

impl Zone {
    /// Byte carried in the packet right after the command.
    pub fn code(self) -> u8 {
        match self {
            Zone::All => 0x00,
            Zone::Zone1 => 0x01,
            Zone::Zone2 => 0x02,
            Zone::Zone3 => 0x03,
            Zone::Zone4 => 0x04,
        }
    }

    /// Zone for a 1-based group number, `0` meaning all groups.
    pub fn from_number(number: u8) -> Option<Zone> {
        match number {
            0 => Some(Zone::All),
            1 => Some(Zone::Zone1),
            2 => Some(Zone::Zone2),
            3 => Some(Zone::Zone3),
            4 => Some(Zone::Zone4),
            _ => None,
        }
    }
}

impl FromStr for Zone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "0" => Ok(Zone::All),
            "1" | "zone1" => Ok(Zone::Zone1),
            "2" | "zone2" => Ok(Zone::Zone2),
            "3" | "zone3" => Ok(Zone::Zone3),
            "4" | "zone4" => Ok(Zone::Zone4),
            _ => Err(anyhow!("Invalid zone")),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::All => write!(f, "all"),
            other => write!(f, "zone {}", other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_codes() {
        assert_eq!(Zone::All.code(), 0x00);
        assert_eq!(Zone::Zone1.code(), 0x01);
        assert_eq!(Zone::Zone4.code(), 0x04);
        assert_eq!(Zone::default(), Zone::All);
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("all".parse::<Zone>().unwrap(), Zone::All);
        assert_eq!("3".parse::<Zone>().unwrap(), Zone::Zone3);
        assert_eq!("Zone2".parse::<Zone>().unwrap(), Zone::Zone2);
        assert!("5".parse::<Zone>().is_err());
        assert_eq!(Zone::from_number(4), Some(Zone::Zone4));
        assert_eq!(Zone::from_number(7), None);
    }
}
