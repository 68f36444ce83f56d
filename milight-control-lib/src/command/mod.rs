//! The command catalog.
//!
//! Every command is a fixed 9 byte template
//! `OPCODE 00 00 SCOPE SUBOP P1 P2 P3 P4`, where the scope byte is `00` for the
//! wifi bridge's own lamp and `08` for the bulbs linked to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MilightError, Result};
use crate::util::encoding::{
    hue_from_color, kelvin_to_byte, mode_to_byte, percentage_to_byte, saturation_to_byte,
};
use crate::util::packet::spaced_hex;

pub mod zone;

pub use zone::Zone;

pub const COMMAND_LEN: usize = 9;

const OPCODE_LIGHT: u8 = 0x31;
const OPCODE_LINK: u8 = 0x3D;
const OPCODE_UNLINK: u8 = 0x3E;

/// Which lamp a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// The lamp built into the wifi bridge.
    Bridge,
    /// Zoned bulbs linked to the bridge.
    Bulb,
}

impl Scope {
    fn byte(self) -> u8 {
        match self {
            Scope::Bridge => 0x00,
            Scope::Bulb => 0x08,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Scope::Bridge => "the bridge lamp",
            Scope::Bulb => "bulbs",
        }
    }
}

/// An encoded command, ready to be framed into a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    bytes: [u8; COMMAND_LEN],
    scope: Scope,
}

impl Command {
    fn new(opcode: u8, scope: Scope, sub_opcode: u8, params: [u8; 4]) -> Self {
        let [p1, p2, p3, p4] = params;
        Command {
            bytes: [opcode, 0x00, 0x00, scope.byte(), sub_opcode, p1, p2, p3, p4],
            scope,
        }
    }

    fn light(scope: Scope, sub_opcode: u8, param: u8) -> Self {
        Self::new(OPCODE_LIGHT, scope, sub_opcode, [param, 0x00, 0x00, 0x00])
    }

    pub fn bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.bytes
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Zone byte for the packet. Bridge commands always carry `00`.
    pub fn zone_byte(&self, zone: Zone) -> u8 {
        match self.scope {
            Scope::Bridge => Zone::All.code(),
            Scope::Bulb => zone.code(),
        }
    }

    pub fn light_on() -> Self {
        Self::light(Scope::Bulb, 0x04, 0x01)
    }

    pub fn light_off() -> Self {
        Self::light(Scope::Bulb, 0x04, 0x02)
    }

    pub fn night_light_on() -> Self {
        Self::light(Scope::Bulb, 0x04, 0x05)
    }

    /// Turns the RGB channel off and shows white.
    pub fn white_light_on() -> Self {
        Self::light(Scope::Bulb, 0x05, 0x64)
    }

    /// `color` may be hex (`#af00ff`, `AF 00 FF`) or a colour name.
    pub fn set_color(color: &str) -> Result<Self> {
        let hue = hue_from_color(color)?;
        Ok(Self::new(OPCODE_LIGHT, Scope::Bulb, 0x01, [hue; 4]))
    }

    pub fn saturation(percent: i32) -> Self {
        Self::light(Scope::Bulb, 0x02, saturation_to_byte(percent))
    }

    pub fn brightness(percent: i32) -> Self {
        Self::light(Scope::Bulb, 0x03, percentage_to_byte(percent))
    }

    /// Switches to white at the given colour temperature.
    pub fn kelvin(kelvin: u32) -> Self {
        Self::light(Scope::Bulb, 0x05, kelvin_to_byte(kelvin))
    }

    pub fn mode_number(mode: u8) -> Self {
        Self::light(Scope::Bulb, 0x06, mode_to_byte(mode))
    }

    pub fn mode_speed_decrease() -> Self {
        Self::light(Scope::Bulb, 0x04, 0x04)
    }

    pub fn mode_speed_increase() -> Self {
        Self::light(Scope::Bulb, 0x04, 0x03)
    }

    /// Pairs the bulb that was just powered on with the zone the packet names.
    pub fn link() -> Self {
        Self::new(OPCODE_LINK, Scope::Bulb, 0x00, [0x00; 4])
    }

    pub fn unlink() -> Self {
        Self::new(OPCODE_UNLINK, Scope::Bulb, 0x00, [0x00; 4])
    }

    pub fn bridge_lamp_on() -> Self {
        Self::light(Scope::Bridge, 0x03, 0x03)
    }

    pub fn bridge_lamp_off() -> Self {
        Self::light(Scope::Bridge, 0x03, 0x04)
    }

    pub fn bridge_set_color(color: &str) -> Result<Self> {
        let hue = hue_from_color(color)?;
        Ok(Self::new(OPCODE_LIGHT, Scope::Bridge, 0x01, [hue; 4]))
    }

    /// Only takes effect while the lamp is on.
    pub fn bridge_white() -> Self {
        Self::light(Scope::Bridge, 0x03, 0x05)
    }

    pub fn bridge_brightness(percent: i32) -> Self {
        Self::light(Scope::Bridge, 0x02, percentage_to_byte(percent))
    }

    pub fn bridge_mode_number(mode: u8) -> Self {
        Self::light(Scope::Bridge, 0x04, mode_to_byte(mode))
    }

    pub fn bridge_mode_speed_decrease() -> Self {
        Self::light(Scope::Bridge, 0x03, 0x01)
    }

    pub fn bridge_mode_speed_increase() -> Self {
        Self::light(Scope::Bridge, 0x03, 0x02)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", spaced_hex(&self.bytes))
    }
}

/// A user-level intent, independent of the lamp it is sent to.
///
/// [`Action::encode`] maps it onto the catalog for a scope and rejects the
/// combinations the protocol cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    On,
    Off,
    NightLight,
    White,
    Color { color: String },
    Saturation { percent: i32 },
    Brightness { percent: i32 },
    Kelvin { kelvin: u32 },
    Mode { mode: u8 },
    ModeSpeedUp,
    ModeSpeedDown,
    Link,
    Unlink,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::NightLight => "night-light",
            Action::White => "white",
            Action::Color { .. } => "color",
            Action::Saturation { .. } => "saturation",
            Action::Brightness { .. } => "brightness",
            Action::Kelvin { .. } => "kelvin",
            Action::Mode { .. } => "mode",
            Action::ModeSpeedUp => "mode-speed-up",
            Action::ModeSpeedDown => "mode-speed-down",
            Action::Link => "link",
            Action::Unlink => "unlink",
        }
    }

    pub fn encode(&self, scope: Scope) -> Result<Command> {
        let command = match (scope, self) {
            (Scope::Bulb, Action::On) => Command::light_on(),
            (Scope::Bulb, Action::Off) => Command::light_off(),
            (Scope::Bulb, Action::NightLight) => Command::night_light_on(),
            (Scope::Bulb, Action::White) => Command::white_light_on(),
            (Scope::Bulb, Action::Color { color }) => Command::set_color(color)?,
            (Scope::Bulb, Action::Saturation { percent }) => Command::saturation(*percent),
            (Scope::Bulb, Action::Brightness { percent }) => Command::brightness(*percent),
            (Scope::Bulb, Action::Kelvin { kelvin }) => Command::kelvin(*kelvin),
            (Scope::Bulb, Action::Mode { mode }) => Command::mode_number(*mode),
            (Scope::Bulb, Action::ModeSpeedUp) => Command::mode_speed_increase(),
            (Scope::Bulb, Action::ModeSpeedDown) => Command::mode_speed_decrease(),
            (Scope::Bulb, Action::Link) => Command::link(),
            (Scope::Bulb, Action::Unlink) => Command::unlink(),

            (Scope::Bridge, Action::On) => Command::bridge_lamp_on(),
            (Scope::Bridge, Action::Off) => Command::bridge_lamp_off(),
            (Scope::Bridge, Action::White) => Command::bridge_white(),
            (Scope::Bridge, Action::Color { color }) => Command::bridge_set_color(color)?,
            (Scope::Bridge, Action::Brightness { percent }) => {
                Command::bridge_brightness(*percent)
            }
            (Scope::Bridge, Action::Mode { mode }) => Command::bridge_mode_number(*mode),
            (Scope::Bridge, Action::ModeSpeedUp) => Command::bridge_mode_speed_increase(),
            (Scope::Bridge, Action::ModeSpeedDown) => Command::bridge_mode_speed_decrease(),
            (
                Scope::Bridge,
                Action::NightLight
                | Action::Saturation { .. }
                | Action::Kelvin { .. }
                | Action::Link
                | Action::Unlink,
            ) => {
                return Err(MilightError::UnsupportedOperation {
                    action: self.name(),
                    scope: scope.name(),
                })
            }
        };
        Ok(command)
    }
}
