use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::command::{Command, Zone};
use crate::error::{MilightError, Result};
use crate::util::packet::{build_packet, spaced_hex};
use crate::util::session::Session;

pub struct PacketTransport;

impl PacketTransport {
    /// A fresh socket on an ephemeral port, connected to `peer` so only its datagrams are read.
    pub async fn open(peer: SocketAddr) -> Result<UdpSocket> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(peer).await?;
        Ok(socket)
    }

    /**
    Frames `command` for `zone`, sends it and waits for exactly one reply.

    # Return
    The raw reply. It is not checked against the request.
     */
    pub async fn send(
        socket: &UdpSocket,
        command: &Command,
        zone: Zone,
        session: Session,
        sequence: u8,
        given_timeout: Duration,
    ) -> Result<Vec<u8>> {
        let packet = build_packet(command, zone, session, sequence)?;
        let peer = socket
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unconnected>".to_string());

        socket.send(&packet).await?;
        debug!("Sent request to {}: {}", peer, spaced_hex(&packet));

        let mut buffer = [0u8; 1024];
        match timeout(given_timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(number_of_bytes)) => {
                let reply = buffer[..number_of_bytes].to_vec();
                debug!("Received response from {}: {}", peer, spaced_hex(&reply));
                Ok(reply)
            }
            Ok(Err(e)) => Err(MilightError::TransportError(e)),
            Err(_) => Err(MilightError::Timeout {
                peer,
                timeout: given_timeout,
            }),
        }
    }
}
