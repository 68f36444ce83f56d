use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Port the bridges listen on for discovery probes.
pub const DISCOVERY_PORT: u16 = 48899;

/// Which bridge generations to probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryType {
    #[default]
    All,
    Legacy,
    V6,
}

impl DiscoveryType {
    pub fn includes_legacy(self) -> bool {
        matches!(self, DiscoveryType::All | DiscoveryType::Legacy)
    }

    pub fn includes_v6(self) -> bool {
        matches!(self, DiscoveryType::All | DiscoveryType::V6)
    }
}

/// Settings for a [`ControlInterface`](super::ControlInterface).
///
/// Durations are in milliseconds so the struct reads naturally from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ControllerOptions {
    /// Discovery port.
    pub port: u16,
    /// Where discovery probes are sent.
    pub address: Ipv4Addr,
    /// Settle time after the last probe, also the reply deadline for handshakes and commands.
    pub timeout: u64,
    #[serde(rename = "type")]
    pub discovery_type: DiscoveryType,
    /// Number of probe rounds.
    pub attempts: u32,
    pub attempt_interval: u64,
    /// Stop probing once any device answered.
    pub stop_on_first_reply: bool,
    /// Reuse a device's session id until it fails.
    pub cache_sessions: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            port: DISCOVERY_PORT,
            address: Ipv4Addr::BROADCAST,
            timeout: 3000,
            discovery_type: DiscoveryType::All,
            attempts: 10,
            attempt_interval: 200,
            stop_on_first_reply: false,
            cache_sessions: false,
        }
    }
}

impl ControllerOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn attempt_interval(&self) -> Duration {
        Duration::from_millis(self.attempt_interval)
    }

    /// Reads options from a `.yaml`/`.yml` or `.json` file. Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            _ => bail!(
                "Unsupported options file {}, expected .yaml, .yml or .json",
                path.display()
            ),
        }
    }
}
