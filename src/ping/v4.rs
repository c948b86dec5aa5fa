//! ICMPv4 echo probes over a raw socket.

use socket2::{Domain, Protocol, Socket, Type};

use crate::config;
use crate::error::Result;
use crate::ipc::addr::{Address, Ipv4, Port};
use crate::ipc::options::SocketControl;
use crate::ipc::stream::close_fd;
use crate::ipc::{fail, recv_buffer};
use crate::time;

use super::{
    build_echo_frame, checksum, frame_timestamp, Discard, EchoReply, Verdict, ECHO_FRAME_BYTES,
    ICMP4_ECHO_REPLY, ICMP4_ECHO_REQUEST,
};

/// Received frames carry the IP header in front of the ICMP message.
const REPLY_BUFFER_BYTES: usize = config::IPV4_HEADER_BYTES + ECHO_FRAME_BYTES;

/// A raw ICMPv4 socket for sending echo requests and receiving replies.
pub struct Ping4Socket {
    socket: Socket,
}

impl Ping4Socket {
    /// Creates the raw socket. Without privilege this fails with
    /// `Permission`.
    pub fn new() -> Result<Ping4Socket> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .or_else(|e| fail("ping4: socket (requires privilege)", e))?;
        Ok(Ping4Socket { socket })
    }

    /// Optionally binds the socket to a source address.
    pub fn bind(&self, address: Ipv4, port: Port) -> Result<()> {
        self.socket
            .bind(&Address::Ipv4(address).to_sockaddr(port)?)
            .or_else(|e| fail("ping4: bind", e))
    }

    /// Sends one echo request with the caller's id and sequence, embedding
    /// the current wall clock in the payload and computing the frame
    /// checksum. Returns bytes sent; transient send conditions surface as
    /// `Interrupted`/`WouldBlock`.
    pub fn send(&self, address: Ipv4, id: u16, sequence: u16) -> Result<usize> {
        let now = time::clock()?;
        let mut frame = build_echo_frame(ICMP4_ECHO_REQUEST, id, sequence, now);
        let sum = checksum(&frame);
        frame[2..4].copy_from_slice(&sum.to_ne_bytes());
        self.socket
            .send_to(&frame, &Address::Ipv4(address).to_sockaddr(0)?)
            .or_else(|e| fail("ping4: send", e))
    }

    /// Reads one datagram. Anything that is not an intact echo reply at
    /// least as long as our request is classified and returned as a
    /// discard, never an error: correlation of id and sequence stays with
    /// the caller.
    pub fn receive(&self) -> Result<Verdict> {
        let mut buffer = [0u8; REPLY_BUFFER_BYTES];
        let (total, sa) = self
            .socket
            .recv_from(recv_buffer(&mut buffer))
            .or_else(|e| fail("ping4: receive", e))?;
        let (address, _) = Address::from_sockaddr(&sa);

        let discard = |reason| {
            Ok(Verdict::Discarded {
                address: address.clone(),
                reason,
            })
        };

        if total < config::IPV4_HEADER_BYTES + config::ECHO_HEADER_BYTES {
            return discard(Discard::TooShort);
        }
        let header_len = ((buffer[0] & 0x0f) as usize) * 4;
        if header_len < config::IPV4_HEADER_BYTES
            || total < header_len + config::ECHO_HEADER_BYTES
        {
            return discard(Discard::TooShort);
        }
        let icmp = &buffer[header_len..total];
        if checksum(icmp) != 0 {
            return discard(Discard::BadChecksum);
        }
        if icmp[0] == ICMP4_ECHO_REQUEST {
            return discard(Discard::OurRequest);
        }
        if icmp[0] != ICMP4_ECHO_REPLY {
            return discard(Discard::Foreign {
                icmp_type: icmp[0],
                code: icmp[1],
            });
        }
        if total < REPLY_BUFFER_BYTES {
            return discard(Discard::Truncated);
        }

        let then = frame_timestamp(&icmp[config::ECHO_HEADER_BYTES..]);
        let rtt = time::clock()? - then;
        Ok(Verdict::Reply(EchoReply {
            address,
            id: u16::from_ne_bytes([icmp[4], icmp[5]]),
            sequence: u16::from_ne_bytes([icmp[6], icmp[7]]),
            ttl: Some(buffer[8]),
            rtt,
        }))
    }

    /// Releases the raw socket.
    pub fn close(self) -> Result<()> {
        close_fd(self.socket, "ping4: close")
    }
}

impl SocketControl for Ping4Socket {
    fn control(&self) -> &Socket {
        &self.socket
    }
}
