use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{BufMut, BytesMut};

use crate::command::{Command, Zone};
use crate::error::{MilightError, Result};
use crate::util::session::Session;

/// Fixed prefix of every command packet.
pub const PACKET_HEADER: [u8; 5] = [0x80, 0x00, 0x00, 0x00, 0x11];
const SEPARATOR: u8 = 0x00;
/// Number of trailing bytes covered by the checksum.
pub const CHECKSUM_SPAN: usize = 11;
/// Header, session, two separators, sequence, command, zone, separator, checksum.
pub const PACKET_LEN: usize = 22;

/// Sequence numbers run through `0..SEQUENCE_MODULUS`.
const SEQUENCE_MODULUS: u8 = 255;

/// Low byte of the sum of the last 11 bytes.
pub fn checksum(bytes: &[u8]) -> Result<u8> {
    if bytes.len() < CHECKSUM_SPAN {
        return Err(MilightError::MalformedPacket(bytes.len()));
    }
    Ok(bytes[bytes.len() - CHECKSUM_SPAN..]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b)))
}

/// Builds the 22 byte command frame:
/// `80 00 00 00 11 SID1 SID2 00 SEQ 00 CMD[9] ZONE 00 CHK`.
///
/// The checksum covers the command, the zone and the separator that follows it.
pub fn build_packet(
    command: &Command,
    zone: Zone,
    session: Session,
    sequence: u8,
) -> Result<BytesMut> {
    let mut packet = BytesMut::with_capacity(PACKET_LEN);
    packet.put_slice(&PACKET_HEADER);
    packet.put_u8(session.first);
    packet.put_u8(session.second);
    packet.put_u8(SEPARATOR);
    packet.put_u8(sequence);
    packet.put_u8(SEPARATOR);
    packet.put_slice(command.bytes());
    packet.put_u8(command.zone_byte(zone));
    packet.put_u8(SEPARATOR);

    let check = checksum(&packet)?;
    packet.put_u8(check);
    Ok(packet)
}

/// Rolling sequence number shared by every packet a controller sends.
///
/// Numbers wrap modulo 255, the first one handed out is 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// A counter whose next number follows `last`.
    pub fn starting_after(last: u8) -> Self {
        SequenceCounter {
            last: AtomicU8::new(last % SEQUENCE_MODULUS),
        }
    }

    /// Advances the counter and returns the new number.
    pub fn advance(&self) -> u8 {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(Self::successor(last))
            })
            .unwrap_or_else(|last| last);
        Self::successor(previous)
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    fn successor(value: u8) -> u8 {
        ((value as u16 + 1) % SEQUENCE_MODULUS as u16) as u8
    }
}

/// Space separated uppercase hex, the form frames are logged in.
pub fn spaced_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn test_checksum_sums_last_eleven() {
        let bytes = [0xFF, 0xFF, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
        assert_eq!(checksum(&bytes).unwrap(), 66);
        // Idempotent
        assert_eq!(checksum(&bytes).unwrap(), checksum(&bytes).unwrap());
    }

    #[test]
    fn test_checksum_wraps() {
        let bytes = [0xFF; 11];
        // 11 * 255 = 2805 = 0x0AF5
        assert_eq!(checksum(&bytes).unwrap(), 0xF5);
    }

    #[test]
    fn test_checksum_bit_flip_changes_result() {
        let mut bytes = [0x31, 0x00, 0x00, 0x08, 0x04, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00];
        let before = checksum(&bytes).unwrap();
        bytes[5] ^= 0x01;
        assert_ne!(checksum(&bytes).unwrap(), before);
    }

    #[test]
    fn test_checksum_requires_eleven_bytes() {
        assert!(matches!(
            checksum(&[0x01; 10]),
            Err(MilightError::MalformedPacket(10))
        ));
        assert!(matches!(checksum(&[]), Err(MilightError::MalformedPacket(0))));
    }

    #[test]
    fn test_build_packet_bulb_on_zone_two() {
        let session = Session::new(0xAA, 0xBB);
        let packet = build_packet(&Command::light_on(), Zone::Zone2, session, 5).unwrap();
        let expected: [u8; PACKET_LEN] = [
            0x80, 0x00, 0x00, 0x00, 0x11, 0xAA, 0xBB, 0x00, 0x05, 0x00, 0x31, 0x00, 0x00, 0x08,
            0x04, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x40,
        ];
        assert_eq!(&packet[..], &expected[..]);
        // 31 + 08 + 04 + 01 + 02 = 0x40
        assert_eq!(packet[PACKET_LEN - 1], 0x40);
    }

    #[test]
    fn test_build_packet_bridge_ignores_zone() {
        let session = Session::new(0x01, 0x02);
        let packet = build_packet(&Command::bridge_lamp_on(), Zone::Zone3, session, 1).unwrap();
        assert_eq!(packet.len(), PACKET_LEN);
        assert_eq!(packet[19], 0x00);
        // 31 + 03 + 03
        assert_eq!(packet[21], 0x37);
    }

    #[test]
    fn test_sequence_starts_at_one_and_wraps() {
        let counter = SequenceCounter::new();
        let first = counter.advance();
        assert_eq!(first, 1);

        let mut last = first;
        for _ in 1..255 {
            last = counter.advance();
            assert!(last <= 254);
        }
        assert_eq!(last, 0);
        // 256th send reuses the first number.
        assert_eq!(counter.advance(), first);
    }

    #[test]
    fn test_sequence_starting_after() {
        let counter = SequenceCounter::starting_after(254);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn test_spaced_hex() {
        assert_eq!(spaced_hex(&[0x80, 0x0a, 0xff]), "80 0A FF");
        assert_eq!(spaced_hex(&[]), "");
    }
}
