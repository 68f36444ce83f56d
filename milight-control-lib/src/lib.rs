//! # Milight Control Library
//!
//! `milight-control-lib` is a Rust library for controlling Milight (LimitlessLED)
//! wifi bridges and the zoned bulbs linked to them over their UDP protocol.
//!
//! This library is designed to be used by command-line tools or other client applications
//! that already know what they want to do ("set zone 2 to 50% brightness") and need
//! it turned into packets on the wire.
//!
//! ## Features
//!
//! - Bridge discovery on local networks, for both legacy and v6 bridges
//! - Session handshake with a bridge
//! - The complete command catalog for the bridge lamp and for zoned bulbs
//! - Packet framing with the protocol's sequence number and checksum
//! - Presets: scripted command sequences loaded from YAML or JSON
//!
//! ## Example
//!
//! Discover bridges and switch zone 1 on:
//!
//! ```no_run
//! use milight_control_lib::command::{Command, Zone};
//! use milight_control_lib::control_interface::{ControlInterface, ControllerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = ControlInterface::new(ControllerOptions::default());
//!     let devices = controller.discover().await?;
//!
//!     for device in devices {
//!         println!("Found device: {}", device);
//!         controller
//!             .send_command(&device, &Command::light_on(), Zone::Zone1)
//!             .await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, endorsed by, or in any way officially connected
//! with Milight, LimitlessLED or their affiliates.
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache License, Version 2.0.
//! You may choose to use either license, depending on your project needs.

// The `command` module holds the command catalog: the 9 byte templates for the
// bridge lamp and for zoned bulbs, the `Zone` selector, and the `Action` sum
// type that maps a user intent onto a template.
//
// Example usage:
//
// ```
// use milight_control_lib::command::{Action, Command, Scope};
//
// let command = Command::brightness(50);
// assert_eq!(Action::Brightness { percent: 50 }.encode(Scope::Bulb).unwrap(), command);
// ```
pub mod command;

// The `control_interface` module provides the controller that ties discovery,
// the session handshake and packet transport together, plus its options.
pub mod control_interface;

pub mod error;

// The `util` module contains the protocol building blocks: value encoders,
// checksum and packet framing, the session negotiator, the packet transport,
// discovery and presets.
pub mod util;

pub use error::MilightError;
