use std::cmp::max;
use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use clap::ValueEnum;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};

use crate::control_interface::options::ControllerOptions;
use crate::error::Result;

/// Probe answered by first generation bridges ("Link_Wi-Fi").
pub const DISCOVERY_MESSAGE_LEGACY: &[u8] = b"Link_Wi-Fi";
/// Probe answered by v6 bridges ("HF-A11ASSISTHREAD").
pub const DISCOVERY_MESSAGE_V6: &[u8] = b"HF-A11ASSISTHREAD";

/// Command port of legacy bridges.
pub const PORT_LEGACY: u16 = 8899;
/// Command port of v6 bridges.
pub const PORT_V6: u16 = 5987;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    Legacy,
    V6,
}

impl ProtocolVariant {
    pub fn port(self) -> u16 {
        match self {
            ProtocolVariant::Legacy => PORT_LEGACY,
            ProtocolVariant::V6 => PORT_V6,
        }
    }
}

impl Display for ProtocolVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVariant::Legacy => write!(f, "legacy"),
            ProtocolVariant::V6 => write!(f, "v6"),
        }
    }
}

/// A bridge that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub ip_address: Ipv4Addr,
    pub port: u16,
    /// Colon separated hex of the characters the bridge reported, e.g.
    /// `41:43:43:46:...` for `ACCF...`.
    pub mac_address: String,
    /// Empty for legacy bridges.
    pub name: String,
    pub variant: ProtocolVariant,
}

impl Device {
    pub fn new(ip_address: Ipv4Addr, mac_address: String, name: String) -> Self {
        let variant = if name.is_empty() {
            ProtocolVariant::Legacy
        } else {
            ProtocolVariant::V6
        };
        Device {
            ip_address,
            port: variant.port(),
            mac_address,
            name,
            variant,
        }
    }

    /// A device addressed by hand, without discovery.
    pub fn with_variant(ip_address: Ipv4Addr, variant: ProtocolVariant) -> Self {
        Device {
            ip_address,
            port: variant.port(),
            mac_address: String::new(),
            name: String::new(),
            variant,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip_address, self.port))
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) at {}:{}",
            self.mac_address, self.variant, self.ip_address, self.port
        )
    }
}

pub struct Discovery;

impl Discovery {
    /**
    Parses an `ip,mac[,name]` discovery reply.

    Returns `None` for anything that is not such a reply, which includes
    the probes themselves when they are looped back.
     */
    pub fn decode_discovery_response(data: &[u8]) -> Option<Device> {
        let text = std::str::from_utf8(data).ok()?;
        if !text.is_ascii() {
            return None;
        }
        let text = text.trim_end_matches(['\0', '\r', '\n']);

        let mut fields = text.split(',');
        let ip_address: Ipv4Addr = fields.next()?.trim().parse().ok()?;
        let mac_field = fields.next()?.trim();
        if mac_field.is_empty() {
            return None;
        }
        let name = fields.next().unwrap_or("").trim().to_string();

        Some(Device::new(ip_address, Self::format_mac(mac_field), name))
    }

    /// Every character of the mac field as a hex byte, colon separated:
    /// `ACCF` becomes `41:43:43:46`.
    fn format_mac(field: &str) -> String {
        field
            .bytes()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /**
    Broadcasts discovery probes and collects the bridges that answer.

    A listener task reads replies for the whole window and hands them over a
    channel. It is shut down before this returns, so the result never changes
    afterwards. No answer is not an error: the result is simply empty.
     */
    pub async fn find_devices(options: &ControllerOptions) -> Result<Vec<Device>> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        socket.set_broadcast(true)?;
        let target = SocketAddrV4::new(options.address, options.port);

        let (device_tx, mut device_rx) = mpsc::channel::<Device>(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(Self::listen(socket.clone(), device_tx, shutdown_rx));

        let mut discovered_devices = Vec::<Device>::new();
        let result = Self::probe(
            &socket,
            target,
            options,
            &mut device_rx,
            &mut discovered_devices,
        )
        .await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = listener.await {
            error!("Discovery listener ended abnormally: {}", e);
        }
        while let Ok(device) = device_rx.try_recv() {
            Self::record(&mut discovered_devices, device);
        }
        result?;

        info!("Discovered {} devices", discovered_devices.len());
        Ok(discovered_devices)
    }

    async fn probe(
        socket: &UdpSocket,
        target: SocketAddrV4,
        options: &ControllerOptions,
        device_rx: &mut mpsc::Receiver<Device>,
        discovered_devices: &mut Vec<Device>,
    ) -> Result<()> {
        info!(
            "Sending discover request {} times to {}",
            options.attempts, target
        );
        for attempt in 0..options.attempts {
            if options.discovery_type.includes_legacy() {
                socket.send_to(DISCOVERY_MESSAGE_LEGACY, target).await?;
            }
            if options.discovery_type.includes_v6() {
                socket.send_to(DISCOVERY_MESSAGE_V6, target).await?;
            }
            debug!("Discovery attempt {} sent", attempt + 1);

            Self::collect_until(
                Instant::now() + options.attempt_interval(),
                device_rx,
                discovered_devices,
            )
            .await;
            if options.stop_on_first_reply && !discovered_devices.is_empty() {
                debug!("Device answered, no more probes");
                break;
            }
        }

        Self::collect_until(
            Instant::now() + options.timeout(),
            device_rx,
            discovered_devices,
        )
        .await;
        if discovered_devices.is_empty() {
            info!("Discovery time complete. If devices are missing, try increasing the timeout.");
        }
        Ok(())
    }

    /// Drains the listener channel until `deadline`.
    async fn collect_until(
        deadline: Instant,
        device_rx: &mut mpsc::Receiver<Device>,
        discovered_devices: &mut Vec<Device>,
    ) {
        loop {
            if Instant::now() >= deadline {
                break;
            }
            let remaining_time = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining_time, device_rx.recv()).await {
                Ok(Some(device)) => Self::record(discovered_devices, device),
                Ok(None) => {
                    // Listener is gone; still honour the deadline.
                    sleep(remaining_time).await;
                    break;
                }
                Err(_) => break,
            }
        }
    }

    fn record(discovered_devices: &mut Vec<Device>, device: Device) {
        if discovered_devices.contains(&device) {
            debug!("Found device {} again, skipping", device);
        } else {
            info!("Found device: {}", device);
            discovered_devices.push(device);
        }
    }

    async fn listen(
        socket: Arc<UdpSocket>,
        device_tx: mpsc::Sender<Device>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut buffer = [0u8; 1024];
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = socket.recv_from(&mut buffer) => match received {
                    Ok((number_of_bytes, src_addr)) => {
                        let data = &buffer[..number_of_bytes];
                        match Self::decode_discovery_response(data) {
                            Some(device) => {
                                if device_tx.send(device).await.is_err() {
                                    break;
                                }
                            }
                            None => debug!(
                                "Ignoring {} byte datagram from {}",
                                number_of_bytes, src_addr
                            ),
                        }
                    }
                    Err(e) => {
                        error!("Failed to receive discovery response: {}", e);
                        break;
                    }
                },
            }
        }
        debug!("Discovery listener stopped");
    }

    pub fn pretty_print_devices(devices: &[Device]) {
        let max_ip_width = devices
            .iter()
            .map(|d| d.ip_address.to_string().len())
            .max()
            .unwrap_or(0);
        let max_port_width = devices
            .iter()
            .map(|d| max(d.port.to_string().len(), 4))
            .max()
            .unwrap_or(4);
        let max_mac_width = devices
            .iter()
            .map(|d| d.mac_address.len())
            .max()
            .unwrap_or(0);
        let max_name_width = devices
            .iter()
            .map(|d| max(d.name.len(), 20))
            .max()
            .unwrap_or(0);

        println!(
            "{:<ip_width$} {:<port_width$} {:<mac_width$} {:<name_width$} {}",
            "IP Address",
            "Port",
            "MAC Address",
            "Name",
            "Type",
            ip_width = max_ip_width + 2,
            port_width = max_port_width + 2,
            mac_width = max_mac_width + 2,
            name_width = max_name_width + 2,
        );

        println!(
            "{:<ip_width$} {:<port_width$} {:<mac_width$} {:<name_width$} {}",
            "-".repeat(max_ip_width),
            "-".repeat(max_port_width),
            "-".repeat(max_mac_width),
            "-".repeat(max_name_width),
            "-".repeat(6),
            ip_width = max_ip_width + 2,
            port_width = max_port_width + 2,
            mac_width = max_mac_width + 2,
            name_width = max_name_width + 2,
        );

        for device in devices {
            println!(
                "{:<ip_width$} {:<port_width$} {:<mac_width$} {:<name_width$} {}",
                device.ip_address,
                device.port,
                device.mac_address,
                device.name,
                device.variant,
                ip_width = max_ip_width + 2,
                port_width = max_port_width + 2,
                mac_width = max_mac_width + 2,
                name_width = max_name_width + 2,
            );
        }
    }
}
