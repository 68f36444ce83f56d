use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::command::{Action, Command, Scope, Zone};
use crate::error::Result;
use crate::util::discovery::{Device, Discovery};
use crate::util::packet::SequenceCounter;
use crate::util::session::{Session, SessionNegotiator};
use crate::util::transport::PacketTransport;

pub mod options;

pub use options::{ControllerOptions, DiscoveryType};

/// Cache key: a device is identified by its address and hardware id.
type DeviceKey = (Ipv4Addr, String);

/**
Client for a set of bridges on the local network.

Holds the options, the sequence counter shared by every packet it sends and,
when [`ControllerOptions::cache_sessions`] is set, the last session id of each
device. Without the cache every command is preceded by its own handshake.
 */
#[derive(Debug)]
pub struct ControlInterface {
    options: ControllerOptions,
    sequence: SequenceCounter,
    sessions: Mutex<HashMap<DeviceKey, Session>>,
}

impl Default for ControlInterface {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl ControlInterface {
    pub fn new(options: ControllerOptions) -> Self {
        ControlInterface {
            options,
            sequence: SequenceCounter::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Sequence number used by the most recent send, 0 before the first.
    pub fn last_sequence(&self) -> u8 {
        self.sequence.current()
    }

    /// Finds the bridges that answer on the configured broadcast address.
    pub async fn discover(&self) -> Result<Vec<Device>> {
        Discovery::find_devices(&self.options).await
    }

    /**
    Sends one command to a device.

    # Return
    The device's raw acknowledgement. Any failure aborts this command only
    and, when sessions are cached, forgets the device's session.
     */
    pub async fn send_command(
        &self,
        device: &Device,
        command: &Command,
        zone: Zone,
    ) -> Result<Vec<u8>> {
        let socket = PacketTransport::open(device.socket_addr()).await?;
        let result = self.send_on(&socket, device, command, zone).await;

        if let Err(e) = &result {
            if self.options.cache_sessions && e.invalidates_session() {
                warn!("Dropping cached session for {}: {}", device, e);
                self.forget_session(device).await;
            }
        }
        result
    }

    /// Encodes `action` for `scope` and sends it.
    pub async fn send_action(
        &self,
        device: &Device,
        scope: Scope,
        action: &Action,
        zone: Zone,
    ) -> Result<Vec<u8>> {
        let command = action.encode(scope)?;
        self.send_command(device, &command, zone).await
    }

    async fn send_on(
        &self,
        socket: &UdpSocket,
        device: &Device,
        command: &Command,
        zone: Zone,
    ) -> Result<Vec<u8>> {
        let session = self.session_for(socket, device).await?;
        let sequence = self.sequence.advance();
        info!(
            "Sending [{}] to {} zone {} (sequence {})",
            command, device, zone, sequence
        );
        PacketTransport::send(
            socket,
            command,
            zone,
            session,
            sequence,
            self.options.timeout(),
        )
        .await
    }

    async fn session_for(&self, socket: &UdpSocket, device: &Device) -> Result<Session> {
        if self.options.cache_sessions {
            if let Some(session) = self.sessions.lock().await.get(&Self::key(device)) {
                debug!("Reusing session {} for {}", session, device);
                return Ok(*session);
            }
        }

        let session = SessionNegotiator::negotiate(socket, self.options.timeout()).await?;
        if self.options.cache_sessions {
            self.sessions
                .lock()
                .await
                .insert(Self::key(device), session);
        }
        Ok(session)
    }

    /// Forgets the cached session of `device`, if any.
    pub async fn forget_session(&self, device: &Device) {
        self.sessions.lock().await.remove(&Self::key(device));
    }

    pub async fn cached_session(&self, device: &Device) -> Option<Session> {
        self.sessions.lock().await.get(&Self::key(device)).copied()
    }

    fn key(device: &Device) -> DeviceKey {
        (device.ip_address, device.mac_address.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::MilightError;
    use crate::util::discovery::ProtocolVariant;
    use crate::util::packet::PACKET_LEN;
    use crate::util::session::HANDSHAKE_REQUEST;

    /// A fake bridge on localhost. Answers handshakes with session AA BB and
    /// acknowledges commands unless `ack` is false.
    async fn fake_bridge(ack: bool) -> (SocketAddr, Arc<AtomicUsize>, Arc<std::sync::Mutex<Vec<Vec<u8>>>>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handshakes = Arc::new(AtomicUsize::new(0));
        let packets = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handshakes_seen = handshakes.clone();
        let packets_seen = packets.clone();
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            while let Ok((n, from)) = socket.recv_from(&mut buffer).await {
                let data = buffer[..n].to_vec();
                if data == HANDSHAKE_REQUEST {
                    handshakes_seen.fetch_add(1, Ordering::SeqCst);
                    let mut reply = vec![0u8; 22];
                    reply[0] = 0x28;
                    reply[19] = 0xAA;
                    reply[20] = 0xBB;
                    let _ = socket.send_to(&reply, from).await;
                } else {
                    packets_seen.lock().unwrap().push(data.clone());
                    if ack {
                        let _ = socket.send_to(&[0x88, 0x00, 0x00, 0x00, 0x03, 0x00, data[8], 0x00], from).await;
                    }
                }
            }
        });
        (addr, handshakes, packets)
    }

    fn device_at(addr: SocketAddr) -> Device {
        let SocketAddr::V4(v4) = addr else {
            panic!("expected an IPv4 address");
        };
        let mut device = Device::with_variant(*v4.ip(), ProtocolVariant::V6);
        device.port = v4.port();
        device.mac_address = "41:43:43:46:32:33".to_string();
        device
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn options(cache_sessions: bool) -> ControllerOptions {
        init_logging();
        ControllerOptions {
            timeout: 200,
            cache_sessions,
            ..ControllerOptions::default()
        }
    }

    #[tokio::test]
    async fn test_send_command_handshakes_every_time() {
        let (addr, handshakes, packets) = fake_bridge(true).await;
        let device = device_at(addr);
        let controller = ControlInterface::new(options(false));

        let reply = controller
            .send_command(&device, &Command::light_on(), Zone::Zone2)
            .await
            .unwrap();
        assert_eq!(reply[6], 0x01);
        controller
            .send_command(&device, &Command::light_off(), Zone::Zone2)
            .await
            .unwrap();

        assert_eq!(handshakes.load(Ordering::SeqCst), 2);
        let packets = packets.lock().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].len(), PACKET_LEN);
        assert_eq!(&packets[0][5..7], &[0xAA, 0xBB]);
        assert_eq!(packets[0][8], 1);
        assert_eq!(packets[1][8], 2);
        assert_eq!(controller.last_sequence(), 2);
    }

    #[tokio::test]
    async fn test_sequence_is_shared_across_devices() {
        let (first_addr, _, first_packets) = fake_bridge(true).await;
        let (second_addr, _, second_packets) = fake_bridge(true).await;
        let controller = ControlInterface::new(options(false));

        controller
            .send_command(&device_at(first_addr), &Command::light_on(), Zone::All)
            .await
            .unwrap();
        controller
            .send_command(&device_at(second_addr), &Command::light_on(), Zone::All)
            .await
            .unwrap();

        assert_eq!(first_packets.lock().unwrap()[0][8], 1);
        assert_eq!(second_packets.lock().unwrap()[0][8], 2);
    }

    #[tokio::test]
    async fn test_cached_session_skips_handshake() {
        let (addr, handshakes, _) = fake_bridge(true).await;
        let device = device_at(addr);
        let controller = ControlInterface::new(options(true));

        for _ in 0..3 {
            controller
                .send_command(&device, &Command::brightness(50), Zone::Zone1)
                .await
                .unwrap();
        }
        assert_eq!(handshakes.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.cached_session(&device).await,
            Some(Session::new(0xAA, 0xBB))
        );
    }

    #[tokio::test]
    async fn test_timeout_invalidates_cached_session() {
        let (addr, _, _) = fake_bridge(false).await;
        let device = device_at(addr);
        let controller = ControlInterface::new(options(true));

        let result = controller
            .send_command(&device, &Command::light_on(), Zone::All)
            .await;
        assert!(matches!(result, Err(MilightError::Timeout { .. })));
        assert_eq!(controller.cached_session(&device).await, None);
        // The attempt still consumed a sequence number.
        assert_eq!(controller.last_sequence(), 1);
    }

    #[tokio::test]
    async fn test_handshake_timeout_is_reported() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = device_at(silent.local_addr().unwrap());
        let controller = ControlInterface::new(options(false));

        let result = controller
            .send_command(&device, &Command::light_on(), Zone::All)
            .await;
        assert!(matches!(result, Err(MilightError::Timeout { .. })));
        assert_eq!(controller.last_sequence(), 0);
    }

    #[tokio::test]
    async fn test_send_action_rejects_before_touching_network() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = device_at(silent.local_addr().unwrap());
        let controller = ControlInterface::new(ControllerOptions {
            timeout: 5000,
            ..ControllerOptions::default()
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            controller.send_action(&device, Scope::Bridge, &Action::NightLight, Zone::All),
        )
        .await
        .unwrap();
        assert!(matches!(
            result,
            Err(MilightError::UnsupportedOperation { .. })
        ));
    }
}
