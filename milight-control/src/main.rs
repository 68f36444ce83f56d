use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use milight_control_lib::command::{Action, Scope, Zone};
use milight_control_lib::control_interface::{ControlInterface, ControllerOptions, DiscoveryType};
use milight_control_lib::util::discovery::{Device, Discovery, ProtocolVariant};
use milight_control_lib::util::encoding::{hue_from_color, KELVIN_MAX, KELVIN_MIN};
use milight_control_lib::util::packet::spaced_hex;
use milight_control_lib::util::preset::Preset;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "milight_control",
    about = "Controls Milight wifi bridges and zoned bulbs",
    version
)]
pub struct Cli {
    #[clap(flatten)]
    pub options: OptionArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Controller settings. Flags override values read from `--config`.
#[derive(Args)]
pub struct OptionArgs {
    /// Reads controller options from a YAML or JSON file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Discovery port
    #[clap(long, global = true)]
    pub port: Option<u16>,

    /// Address discovery probes are sent to
    #[clap(long, global = true)]
    pub address: Option<Ipv4Addr>,

    /// Timeout in milliseconds
    #[clap(short = 't', long = "timeout", global = true)]
    pub timeout: Option<u64>,

    /// Which bridge generations to discover
    #[clap(long = "type", value_enum, global = true)]
    pub discovery_type: Option<DiscoveryType>,

    /// Reuse session ids between commands to the same bridge
    #[clap(long, global = true)]
    pub cache_sessions: bool,
}

impl OptionArgs {
    fn to_options(&self) -> Result<ControllerOptions> {
        let mut options = match &self.config {
            Some(path) => ControllerOptions::load(path)?,
            None => ControllerOptions::default(),
        };
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(address) = self.address {
            options.address = address;
        }
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        if let Some(discovery_type) = self.discovery_type {
            options.discovery_type = discovery_type;
        }
        if self.cache_sessions {
            options.cache_sessions = true;
        }
        Ok(options)
    }
}

/// Supported output formats for the `discover` command.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Addresses a bridge without discovering it first.
#[derive(Args)]
pub struct DeviceArgs {
    /// Sets the IP address of the bridge
    #[clap(long)]
    pub ip: Ipv4Addr,

    /// Bridge generation, selects the command port
    #[clap(long, value_enum, default_value_t = ProtocolVariant::V6)]
    pub variant: ProtocolVariant,

    /// Overrides the command port
    #[clap(long = "device-port")]
    pub device_port: Option<u16>,
}

impl DeviceArgs {
    fn device(&self) -> Device {
        let mut device = Device::with_variant(self.ip, self.variant);
        if let Some(port) = self.device_port {
            device.port = port;
        }
        device
    }
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Searches the local network for bridges
    #[clap(name = "discover")]
    Discover {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Sends a single command to a bridge
    #[clap(name = "device-call")]
    DeviceCall {
        #[clap(flatten)]
        device: DeviceArgs,

        #[clap(subcommand)]
        target: Target,
    },
    /// Plays a preset file against a bridge
    #[clap(name = "preset")]
    Preset {
        #[clap(flatten)]
        device: DeviceArgs,

        /// The preset file (YAML or JSON)
        file: PathBuf,
    },
}

/// What a `device-call` is addressed to.
#[derive(Subcommand)]
pub enum Target {
    /// The lamp built into the bridge
    Bridge {
        #[clap(subcommand)]
        action: LightAction,
    },
    /// Bulbs in one zone, or all zones
    Zone {
        #[clap(value_enum)]
        zone: Zone,

        #[clap(subcommand)]
        action: LightAction,
    },
    /// Links the bulb that was just powered on to a zone
    Link {
        #[clap(value_enum)]
        zone: Zone,
    },
    /// Unlinks the bulb that was just powered on from a zone
    Unlink {
        #[clap(value_enum)]
        zone: Zone,
    },
}

#[derive(Subcommand)]
pub enum LightAction {
    /// Turns the target on
    On,
    /// Turns the target off
    Off,
    /// Sets the colour, as hex (`af00ff`, `"#AF 00 FF"`) or a colour name
    Color {
        #[clap(value_parser = parse_color)]
        color: String,
    },
    /// Switches to night light
    #[clap(name = "night-light")]
    NightLight,
    /// Switches to white
    White,
    /// Sets brightness in percent
    Brightness {
        #[clap(value_parser = clap::value_parser!(i32).range(0..=100))]
        percent: i32,
    },
    /// Sets saturation in percent
    Saturation {
        #[clap(value_parser = clap::value_parser!(i32).range(0..=100))]
        percent: i32,
    },
    /// Switches to white with a colour temperature in kelvin
    #[clap(alias = "kelvin")]
    Temperature {
        #[clap(value_parser = clap::value_parser!(u32).range(KELVIN_MIN as i64..=KELVIN_MAX as i64))]
        kelvin: u32,
    },
    /// Starts an animation mode
    Mode {
        #[clap(value_parser = clap::value_parser!(u8).range(1..=5))]
        mode: u8,
    },
    /// Speeds the animation up
    #[clap(name = "mode-up")]
    ModeUp,
    /// Slows the animation down
    #[clap(name = "mode-down")]
    ModeDown,
}

impl From<LightAction> for Action {
    fn from(action: LightAction) -> Self {
        match action {
            LightAction::On => Action::On,
            LightAction::Off => Action::Off,
            LightAction::Color { color } => Action::Color { color },
            LightAction::NightLight => Action::NightLight,
            LightAction::White => Action::White,
            LightAction::Brightness { percent } => Action::Brightness { percent },
            LightAction::Saturation { percent } => Action::Saturation { percent },
            LightAction::Temperature { kelvin } => Action::Kelvin { kelvin },
            LightAction::Mode { mode } => Action::Mode { mode },
            LightAction::ModeUp => Action::ModeSpeedUp,
            LightAction::ModeDown => Action::ModeSpeedDown,
        }
    }
}

fn parse_color(s: &str) -> Result<String, String> {
    hue_from_color(s)
        .map(|_| s.to_string())
        .map_err(|e| e.to_string())
}

async fn handle_cli(cli: Cli) -> Result<()> {
    let controller = ControlInterface::new(cli.options.to_options()?);

    match cli.command {
        Commands::Discover { output } => {
            let devices = controller.discover().await?;
            match output {
                OutputFormat::Plaintext => {
                    Discovery::pretty_print_devices(&devices);
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&devices)?;
                    println!("{}", json);
                }
                OutputFormat::Yaml => {
                    let yaml = serde_yaml::to_string(&devices)?;
                    println!("{}", yaml);
                }
            }
        }
        Commands::DeviceCall { device, target } => {
            let device = device.device();
            let (scope, zone, action) = match target {
                Target::Bridge { action } => (Scope::Bridge, Zone::All, action.into()),
                Target::Zone { zone, action } => (Scope::Bulb, zone, action.into()),
                Target::Link { zone } => (Scope::Bulb, zone, Action::Link),
                Target::Unlink { zone } => (Scope::Bulb, zone, Action::Unlink),
            };

            let response = controller
                .send_action(&device, scope, &action, zone)
                .await
                .with_context(|| format!("Failed to send {} to {}", action.name(), device))?;
            println!("Received response: {}", spaced_hex(&response));
        }
        Commands::Preset { device, file } => {
            let preset = Preset::load_preset(&file)?;
            let device = device.device();
            let responses = preset.play(&controller, &device).await?;
            println!(
                "Preset {} played, {} commands acknowledged.",
                file.display(),
                responses.len()
            );
        }
    }

    Ok(())
}
