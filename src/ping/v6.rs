//! ICMPv6 echo probes over a raw socket.
//!
//! Unlike v4, the kernel owns the checksum: the offset of the checksum
//! field is registered once at creation and filled in on transmit, and
//! inbound frames arrive already verified and without an IP header.
//! Expected non-reply traffic on a healthy probe includes neighbor
//! solicit/advertise chatter; it all comes back as discards.

use socket2::{Domain, Protocol, Socket, Type};

use crate::config;
use crate::error::Result;
use crate::ipc::addr::{Address, Ipv6, Port};
use crate::ipc::options::{set_int_option, SocketControl};
use crate::ipc::stream::close_fd;
use crate::ipc::{fail, recv_buffer};
use crate::time;

use super::{
    build_echo_frame, frame_timestamp, Discard, EchoReply, Verdict, ECHO_FRAME_BYTES,
    ICMP6_ECHO_REPLY, ICMP6_ECHO_REQUEST,
};

/// Linux `<linux/in6.h>`: tells a SOCK_RAW ICMPv6 socket where in the
/// outbound frame to write the checksum. Not exposed by the wrapper crates.
const IPV6_CHECKSUM: libc::c_int = 7;

/// Offset of the checksum field within the ICMPv6 header.
const CHECKSUM_OFFSET: libc::c_int = 2;

/// A raw ICMPv6 socket for sending echo requests and receiving replies.
pub struct Ping6Socket {
    socket: Socket,
}

impl Ping6Socket {
    /// Creates the raw socket and registers the checksum offset with the
    /// kernel. Without privilege this fails with `Permission`.
    pub fn new() -> Result<Ping6Socket> {
        let socket = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
            .or_else(|e| fail("ping6: socket (requires privilege)", e))?;
        set_int_option(
            &socket,
            libc::SOL_RAW,
            IPV6_CHECKSUM,
            CHECKSUM_OFFSET,
            "ping6: checksum offset",
        )?;
        Ok(Ping6Socket { socket })
    }

    /// Optionally binds the socket to a source address.
    pub fn bind(&self, address: Ipv6, port: Port) -> Result<()> {
        self.socket
            .bind(&Address::Ipv6(address).to_sockaddr(port)?)
            .or_else(|e| fail("ping6: bind", e))
    }

    /// Sends one echo request with the caller's id and sequence, embedding
    /// the current wall clock in the payload. The checksum is left to the
    /// kernel.
    pub fn send(&self, address: Ipv6, id: u16, sequence: u16) -> Result<usize> {
        let now = time::clock()?;
        let frame = build_echo_frame(ICMP6_ECHO_REQUEST, id, sequence, now);
        self.socket
            .send_to(&frame, &Address::Ipv6(address).to_sockaddr(0)?)
            .or_else(|e| fail("ping6: send", e))
    }

    /// Reads one datagram and classifies it; see `Ping4Socket::receive`.
    pub fn receive(&self) -> Result<Verdict> {
        let mut buffer = [0u8; ECHO_FRAME_BYTES];
        let (total, sa) = self
            .socket
            .recv_from(recv_buffer(&mut buffer))
            .or_else(|e| fail("ping6: receive", e))?;
        let (address, _) = Address::from_sockaddr(&sa);

        let discard = |reason| {
            Ok(Verdict::Discarded {
                address: address.clone(),
                reason,
            })
        };

        if total < config::ECHO_HEADER_BYTES {
            return discard(Discard::TooShort);
        }
        if buffer[0] == ICMP6_ECHO_REQUEST {
            return discard(Discard::OurRequest);
        }
        if buffer[0] != ICMP6_ECHO_REPLY {
            return discard(Discard::Foreign {
                icmp_type: buffer[0],
                code: buffer[1],
            });
        }
        if total < ECHO_FRAME_BYTES {
            return discard(Discard::Truncated);
        }

        let then = frame_timestamp(&buffer[config::ECHO_HEADER_BYTES..]);
        let rtt = time::clock()? - then;
        Ok(Verdict::Reply(EchoReply {
            address,
            id: u16::from_ne_bytes([buffer[4], buffer[5]]),
            sequence: u16::from_ne_bytes([buffer[6], buffer[7]]),
            ttl: None,
            rtt,
        }))
    }

    /// Releases the raw socket.
    pub fn close(self) -> Result<()> {
        close_fd(self.socket, "ping6: close")
    }
}

impl SocketControl for Ping6Socket {
    fn control(&self) -> &Socket {
        &self.socket
    }
}
