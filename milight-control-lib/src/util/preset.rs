use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::command::{Action, Command, Scope, Zone};
use crate::control_interface::ControlInterface;
use crate::util::discovery::Device;
use crate::util::encoding::{hue_from_color, KELVIN_MAX, KELVIN_MIN};

/// One step of a preset: what to send, where, and how long to wait afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetStep {
    #[serde(default = "PresetStep::default_target")]
    pub target: Scope,
    /// 0 addresses every zone, 1 to 4 a single one. Ignored for the bridge lamp.
    #[serde(default)]
    pub zone: u8,
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub delay_ms: u64,
}

impl PresetStep {
    fn default_target() -> Scope {
        Scope::Bulb
    }

    pub fn zone(&self) -> Result<Zone> {
        Zone::from_number(self.zone).ok_or_else(|| anyhow!("Invalid zone {}", self.zone))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Rejects values the encoders would otherwise clamp, the same way the CLI does.
    pub fn validate(&self) -> Result<()> {
        self.zone()?;
        match &self.action {
            Action::Brightness { percent } | Action::Saturation { percent } => {
                if !(0..=100).contains(percent) {
                    bail!("Value must be between 0 and 100, got {}", percent);
                }
            }
            Action::Kelvin { kelvin } => {
                if !(KELVIN_MIN..=KELVIN_MAX).contains(kelvin) {
                    bail!(
                        "Value must be between {} and {}, got {}",
                        KELVIN_MIN,
                        KELVIN_MAX,
                        kelvin
                    );
                }
            }
            Action::Mode { mode } => {
                if !(1..=5).contains(mode) {
                    bail!("Mode must be between 1 and 5, got {}", mode);
                }
            }
            Action::Color { color } => {
                hue_from_color(color)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// A scripted sequence of commands, loaded from YAML or JSON.
///
/// ```yaml
/// steps:
///   - action: on
///     zone: 1
///     delay_ms: 1000
///   - action: color
///     color: "#af00ff"
///   - target: bridge
///     action: brightness
///     percent: 40
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub steps: Vec<PresetStep>,
}

impl Preset {
    pub fn load_preset<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preset {}", path.display()))?;
        let preset = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        };
        preset.with_context(|| format!("Invalid preset {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let preset: Preset = serde_yaml::from_str(content)?;
        preset.validate()?;
        Ok(preset)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let preset: Preset = serde_json::from_str(content)?;
        preset.validate()?;
        Ok(preset)
    }

    fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate()
                .with_context(|| format!("Step {} ({})", index + 1, step.action.name()))?;
        }
        Ok(())
    }

    /// Encodes every step up front so an unsupported step aborts before anything is sent.
    pub fn commands(&self) -> Result<Vec<(Command, Zone, Duration)>> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| -> Result<(Command, Zone, Duration)> {
                let command = step
                    .action
                    .encode(step.target)
                    .with_context(|| format!("Step {}", index + 1))?;
                Ok((command, step.zone()?, step.delay()))
            })
            .collect()
    }

    /**
    Sends every step to `device` in order.

    # Return
    The acknowledgement of each step. The first failure stops the preset.
     */
    pub async fn play(
        &self,
        controller: &ControlInterface,
        device: &Device,
    ) -> Result<Vec<Vec<u8>>> {
        let commands = self.commands()?;
        let mut replies = Vec::with_capacity(commands.len());
        for (index, (command, zone, delay)) in commands.iter().enumerate() {
            info!("Preset step {}/{}: [{}]", index + 1, commands.len(), command);
            let reply = controller
                .send_command(device, command, *zone)
                .await
                .with_context(|| format!("Preset step {} failed", index + 1))?;
            replies.push(reply);
            if !delay.is_zero() {
                sleep(*delay).await;
            }
        }
        Ok(replies)
    }
}
