use std::fmt::{Display, Formatter};
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use crate::error::{MilightError, Result};
use crate::util::packet::spaced_hex;

/// Request that asks a bridge for a session id.
pub const HANDSHAKE_REQUEST: [u8; 27] = [
    0x20, 0x00, 0x00, 0x00, 0x16, 0x02, 0x62, 0x3A, 0xD5, 0xED, 0xA3, 0x01, 0xAE, 0x08, 0x2D,
    0x46, 0x61, 0x41, 0xA7, 0xF6, 0xDC, 0xAF, 0xD3, 0xE6, 0x00, 0x00, 0x1E,
];

/// Offsets of the two session bytes in the handshake reply.
const SESSION_OFFSET: usize = 19;
const MIN_REPLY_LEN: usize = SESSION_OFFSET + 2;
/// Replies shorter than this end the handshake; longer ones are interim frames.
const TERMINAL_REPLY_LEN: usize = 28;

/// Two byte session id handed out by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    pub first: u8,
    pub second: u8,
}

impl Session {
    pub fn new(first: u8, second: u8) -> Self {
        Session { first, second }
    }

    /// Reads the session id out of a handshake reply.
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        if reply.len() < MIN_REPLY_LEN {
            return Err(MilightError::HandshakeError(format!(
                "reply of {} bytes is too short to carry a session id ({})",
                reply.len(),
                spaced_hex(reply)
            )));
        }
        Ok(Session::new(
            reply[SESSION_OFFSET],
            reply[SESSION_OFFSET + 1],
        ))
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X} {:02X}", self.first, self.second)
    }
}

pub struct SessionNegotiator;

impl SessionNegotiator {
    /**
    Runs the handshake over `socket`, which must already be connected to the device.

    The whole exchange, interim frames included, is bounded by `given_timeout`.
    If an interim frame was read and the device then goes quiet, the session
    from that frame is used.
    */
    pub async fn negotiate(socket: &UdpSocket, given_timeout: Duration) -> Result<Session> {
        let peer = socket
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unconnected>".to_string());

        socket.send(&HANDSHAKE_REQUEST).await?;
        debug!(
            "Sent session request to {}: {}",
            peer,
            spaced_hex(&HANDSHAKE_REQUEST)
        );

        let timeout_end = Instant::now() + given_timeout;
        let mut buffer = [0u8; 1024];
        let mut session: Option<Session> = None;

        loop {
            if Instant::now() >= timeout_end {
                return Self::expired(peer, session, given_timeout);
            }
            let remaining_time = timeout_end.saturating_duration_since(Instant::now());
            match timeout(remaining_time, socket.recv(&mut buffer)).await {
                Ok(Ok(number_of_bytes)) => {
                    let reply = &buffer[..number_of_bytes];
                    debug!("Session reply from {}: {}", peer, spaced_hex(reply));

                    let current = Session::from_reply(reply)?;
                    debug!("Session id from {}: {}", peer, current);
                    session = Some(current);

                    if number_of_bytes < TERMINAL_REPLY_LEN {
                        return Ok(current);
                    }
                }
                Ok(Err(e)) => return Err(MilightError::TransportError(e)),
                Err(_) => return Self::expired(peer, session, given_timeout),
            }
        }
    }

    /// Outcome once the deadline has passed: the last interim session, if any.
    fn expired(peer: String, session: Option<Session>, given_timeout: Duration) -> Result<Session> {
        match session {
            Some(last) => {
                warn!(
                    "{} sent no final session frame, using the last one seen",
                    peer
                );
                Ok(last)
            }
            None => Err(MilightError::Timeout {
                peer,
                timeout: given_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    async fn connected_pair() -> (UdpSocket, UdpSocket) {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(device.local_addr().unwrap()).await.unwrap();
        (client, device)
    }

    fn reply_with_session(len: usize, first: u8, second: u8) -> Vec<u8> {
        let mut reply = vec![0u8; len];
        reply[0] = 0x28;
        reply[19] = first;
        reply[20] = second;
        reply
    }

    #[test]
    fn test_session_from_reply() {
        let reply = reply_with_session(22, 0xAA, 0xBB);
        assert_eq!(Session::from_reply(&reply).unwrap(), Session::new(0xAA, 0xBB));
        assert!(matches!(
            Session::from_reply(&reply[..20]),
            Err(MilightError::HandshakeError(_))
        ));
    }

    #[test]
    fn test_handshake_request_is_fixed() {
        assert_eq!(HANDSHAKE_REQUEST.len(), 27);
        assert_eq!(
            spaced_hex(&HANDSHAKE_REQUEST),
            "20 00 00 00 16 02 62 3A D5 ED A3 01 AE 08 2D 46 61 41 A7 F6 DC AF D3 E6 00 00 1E"
        );
    }

    #[tokio::test]
    async fn test_negotiate_single_reply() {
        let (client, device) = connected_pair().await;
        let responder = tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (n, from) = device.recv_from(&mut buffer).await.unwrap();
            assert_eq!(&buffer[..n], &HANDSHAKE_REQUEST[..]);
            device
                .send_to(&reply_with_session(22, 0x12, 0x34), from)
                .await
                .unwrap();
        });

        let session = SessionNegotiator::negotiate(&client, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(session, Session::new(0x12, 0x34));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_keeps_last_frame() {
        let (client, device) = connected_pair().await;
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (_, from) = device.recv_from(&mut buffer).await.unwrap();
            device
                .send_to(&reply_with_session(30, 0x01, 0x02), from)
                .await
                .unwrap();
            device
                .send_to(&reply_with_session(22, 0x03, 0x04), from)
                .await
                .unwrap();
        });

        let session = SessionNegotiator::negotiate(&client, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(session, Session::new(0x03, 0x04));
    }

    #[tokio::test]
    async fn test_negotiate_times_out() {
        let (client, _device) = connected_pair().await;
        let result = SessionNegotiator::negotiate(&client, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(MilightError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_negotiate_rejects_short_reply() {
        let (client, device) = connected_pair().await;
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (_, from) = device.recv_from(&mut buffer).await.unwrap();
            device.send_to(&[0x28, 0x00, 0x00], from).await.unwrap();
        });

        let result = SessionNegotiator::negotiate(&client, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(MilightError::HandshakeError(_))));
    }

    #[tokio::test]
    async fn test_negotiate_uses_interim_frame_when_device_goes_quiet() {
        let (client, device) = connected_pair().await;
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (_, from) = device.recv_from(&mut buffer).await.unwrap();
            device
                .send_to(&reply_with_session(30, 0x05, 0x06), from)
                .await
                .unwrap();
            // Keep the socket open without answering again.
            sleep(Duration::from_secs(2)).await;
        });

        let session = SessionNegotiator::negotiate(&client, Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(session, Session::new(0x05, 0x06));
    }

    #[tokio::test]
    async fn test_negotiate_short_frame_after_interim_is_an_error() {
        let (client, device) = connected_pair().await;
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (_, from) = device.recv_from(&mut buffer).await.unwrap();
            device
                .send_to(&reply_with_session(30, 0x05, 0x06), from)
                .await
                .unwrap();
            device.send_to(&[0x28, 0x00], from).await.unwrap();
        });

        let result = SessionNegotiator::negotiate(&client, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(MilightError::HandshakeError(_))));
    }

    #[tokio::test]
    async fn test_negotiate_deadline_holds_under_a_stream_of_interim_frames() {
        let (client, device) = connected_pair().await;
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            let (_, from) = device.recv_from(&mut buffer).await.unwrap();
            let frame = reply_with_session(30, 0x07, 0x08);
            let stop_at = Instant::now() + Duration::from_secs(3);
            while Instant::now() < stop_at {
                if device.send_to(&frame, from).await.is_err() {
                    break;
                }
            }
        });

        let started = Instant::now();
        let session = SessionNegotiator::negotiate(&client, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(session, Session::new(0x07, 0x08));
        assert!(started.elapsed() < Duration::from_millis(1500));
    }
}
