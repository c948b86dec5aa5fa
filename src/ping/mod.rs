//! ICMP echo probe engine: checksum, request emission, reply correlation
//! material, round-trip measurement.
//!
//! The engine keeps no in-flight state: sends carry a caller-supplied id
//! and sequence, receives hand the reply's identifiers back, and matching
//! them up is the caller's business. Raw sockets require elevated
//! privilege; that condition is reported distinctly as `Permission`.

pub mod v4;
pub mod v6;

pub use v4::Ping4Socket;
pub use v6::Ping6Socket;

use crate::config;
use crate::ipc::addr::Address;
use crate::time::Ticks;

/// Whole echo frame: header plus payload.
pub const ECHO_FRAME_BYTES: usize = config::ECHO_HEADER_BYTES + config::ECHO_PAYLOAD_BYTES;

pub(crate) const ICMP4_ECHO_REQUEST: u8 = 8;
pub(crate) const ICMP4_ECHO_REPLY: u8 = 0;
pub(crate) const ICMP6_ECHO_REQUEST: u8 = 128;
pub(crate) const ICMP6_ECHO_REPLY: u8 = 129;

/// A successfully correlatable echo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    /// Who replied.
    pub address: Address,
    /// The id the request was sent with.
    pub id: u16,
    /// The sequence number the request was sent with.
    pub sequence: u16,
    /// IP time-to-live of the reply (IPv4 only).
    pub ttl: Option<u8>,
    /// Round trip: receive wall clock minus the timestamp embedded at send.
    pub rtt: Ticks,
}

/// Why a received datagram was not an echo reply of ours. Discards are
/// expected traffic (our own loopback reflection, neighbor chatter), not
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Too short to carry an ICMP header.
    TooShort,
    /// The ICMP checksum did not verify (IPv4 only).
    BadChecksum,
    /// Our own outbound echo request reflected back (loopback).
    OurRequest,
    /// Some other ICMP message type.
    Foreign { icmp_type: u8, code: u8 },
    /// An echo reply, but shorter than the frame we sent: not ours.
    Truncated,
}

/// The outcome of one receive: a reply to correlate, or classified noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Reply(EchoReply),
    Discarded { address: Address, reason: Discard },
}

/// RFC 1071 sixteen-bit internet checksum. The checksum of a buffer with
/// its own checksum appended is zero.
pub fn checksum(buffer: &[u8]) -> u16 {
    let mut accumulator: u32 = 0;
    let mut pairs = buffer.chunks_exact(2);
    for pair in &mut pairs {
        accumulator += u16::from_ne_bytes([pair[0], pair[1]]) as u32;
    }
    if let [last] = pairs.remainder() {
        accumulator += u16::from_ne_bytes([*last, 0]) as u32;
    }
    while accumulator >> 16 != 0 {
        accumulator = (accumulator & 0xffff) + (accumulator >> 16);
    }
    !(accumulator as u16)
}

/// Lays out an echo frame: type, code 0, zero checksum, id, sequence, and
/// the host-order send timestamp leading the payload.
pub(crate) fn build_echo_frame(
    icmp_type: u8,
    id: u16,
    sequence: u16,
    now: Ticks,
) -> [u8; ECHO_FRAME_BYTES] {
    let mut frame = [0u8; ECHO_FRAME_BYTES];
    frame[0] = icmp_type;
    frame[4..6].copy_from_slice(&id.to_ne_bytes());
    frame[6..8].copy_from_slice(&sequence.to_ne_bytes());
    let header = config::ECHO_HEADER_BYTES;
    frame[header..header + config::ECHO_TIMESTAMP_BYTES]
        .copy_from_slice(&(now as i128).to_ne_bytes());
    frame
}

/// Reads the send timestamp back out of an echo payload.
pub(crate) fn frame_timestamp(payload: &[u8]) -> Ticks {
    let mut bytes = [0u8; config::ECHO_TIMESTAMP_BYTES];
    bytes.copy_from_slice(&payload[..config::ECHO_TIMESTAMP_BYTES]);
    i128::from_ne_bytes(bytes) as Ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_vectors() {
        assert_eq!(
            checksum(&[0x11, 0x11, 0x22, 0x22, 0x44, 0x44, 0x88, 0x88]),
            0x0000
        );
        assert_eq!(
            checksum(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]),
            0xda61
        );
    }

    #[test]
    fn test_checksum_of_checksummed_buffer_is_zero() {
        let buffers: [&[u8]; 4] = [
            b"internet checksums fold carries",
            &[0xff; 17],
            &[0x00, 0x01],
            &[0xab],
        ];
        for buffer in buffers {
            let sum = checksum(buffer);
            let mut extended = buffer.to_vec();
            extended.extend_from_slice(&sum.to_ne_bytes());
            assert_eq!(
                checksum(&extended),
                0,
                "appending the checksum should zero the sum for {buffer:?}"
            );
        }
    }

    #[test]
    fn test_checksum_handles_odd_length() {
        // The trailing byte is padded with zero, so these differ.
        assert_ne!(checksum(&[0x12, 0x34, 0x56]), checksum(&[0x12, 0x34]));
    }

    #[test]
    fn test_echo_frame_layout() {
        let frame = build_echo_frame(ICMP4_ECHO_REQUEST, 0xBEEF, 3, 123_456_789);
        assert_eq!(frame.len(), 64);
        assert_eq!(frame[0], ICMP4_ECHO_REQUEST);
        assert_eq!(frame[1], 0, "code must be zero");
        assert_eq!(&frame[2..4], &[0, 0], "checksum field starts zeroed");
        assert_eq!(u16::from_ne_bytes([frame[4], frame[5]]), 0xBEEF);
        assert_eq!(u16::from_ne_bytes([frame[6], frame[7]]), 3);
        assert_eq!(frame_timestamp(&frame[8..]), 123_456_789);
    }

    #[test]
    fn test_checksummed_frame_verifies() {
        let mut frame = build_echo_frame(ICMP4_ECHO_REQUEST, 7, 1, 42);
        let sum = checksum(&frame);
        frame[2..4].copy_from_slice(&sum.to_ne_bytes());
        assert_eq!(checksum(&frame), 0, "a filled-in frame must verify to zero");
    }
}
