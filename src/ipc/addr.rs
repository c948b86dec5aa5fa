//! Typed IP and UNIX-domain addresses.
//!
//! IPv4 addresses are a host-order 32-bit integer; IPv6 addresses are eight
//! host-order 16-bit words. Keeping host order internally makes comparison,
//! classification, and logging trivial; the swap happens exactly once, at
//! the socket boundary (`to_sockaddr` / `from_sockaddr`).

use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Transport port number. Zero denotes *ephemeral*: the kernel assigns one
/// at bind time.
pub type Port = u16;

/// An IPv4 address held as a host-order 32-bit integer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4(pub u32);

impl Ipv4 {
    /// The unspecified address `0.0.0.0` (any local interface).
    pub const UNSPECIFIED: Ipv4 = Ipv4(0);

    /// The loopback address `127.0.0.1`.
    pub const LOOPBACK: Ipv4 = Ipv4(0x7f00_0001);

    pub fn from_octets(o: [u8; 4]) -> Ipv4 {
        Ipv4(u32::from_be_bytes(o))
    }

    pub fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_std(a: std::net::Ipv4Addr) -> Ipv4 {
        Ipv4(u32::from(a))
    }

    pub fn to_std(self) -> std::net::Ipv4Addr {
        std::net::Ipv4Addr::from(self.0)
    }

    pub fn is_unspecified(self) -> bool {
        self.0 == 0
    }

    /// `127/8`.
    pub fn is_loopback(self) -> bool {
        (self.0 >> 24) == 127
    }

    /// `255.255.255.255`.
    pub fn is_limited_broadcast(self) -> bool {
        self.0 == u32::MAX
    }

    /// RFC 1918: `10/8`, `172.16/12`, `192.168/16`.
    pub fn is_private(self) -> bool {
        (self.0 >> 24) == 10
            || (self.0 >> 20) == 0xac1
            || (self.0 >> 16) == 0xc0a8
    }

    /// `224/4`.
    pub fn is_multicast(self) -> bool {
        (self.0 >> 28) == 0xe
    }

    /// A coarse human-readable classification of the address.
    pub fn classify(self) -> &'static str {
        if self.is_limited_broadcast() {
            "limited-broadcast"
        } else if self.is_loopback() {
            "loopback"
        } else if self.is_private() {
            "private"
        } else if self.is_multicast() {
            "multicast"
        } else {
            "public"
        }
    }
}

impl fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_std().fmt(f)
    }
}

impl FromStr for Ipv4 {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Ipv4> {
        s.parse::<std::net::Ipv4Addr>()
            .map(Ipv4::from_std)
            .map_err(|_| NetError::Invalid(format!("not an IPv4 address: {s:?}")))
    }
}

/// An IPv6 address held as eight host-order 16-bit words.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv6 {
    pub words: [u16; 8],
}

impl Ipv6 {
    /// The unspecified address `::`.
    pub const UNSPECIFIED: Ipv6 = Ipv6 { words: [0; 8] };

    /// The loopback address `::1`.
    pub const LOOPBACK: Ipv6 = Ipv6 {
        words: [0, 0, 0, 0, 0, 0, 0, 1],
    };

    pub fn new(words: [u16; 8]) -> Ipv6 {
        Ipv6 { words }
    }

    pub fn from_std(a: std::net::Ipv6Addr) -> Ipv6 {
        Ipv6 {
            words: a.segments(),
        }
    }

    pub fn to_std(self) -> std::net::Ipv6Addr {
        std::net::Ipv6Addr::from(self.words)
    }

    /// Swaps each word to network byte order. On big-endian hosts this is
    /// the identity; `hton(ntoh(x)) == x` everywhere.
    pub fn hton(self) -> Ipv6 {
        let mut words = self.words;
        for w in &mut words {
            *w = w.to_be();
        }
        Ipv6 { words }
    }

    /// Swaps each word from network byte order.
    pub fn ntoh(self) -> Ipv6 {
        let mut words = self.words;
        for w in &mut words {
            *w = u16::from_be(*w);
        }
        Ipv6 { words }
    }

    pub fn is_unspecified(self) -> bool {
        self.words == [0; 8]
    }

    /// `::1`.
    pub fn is_loopback(self) -> bool {
        self.words == Ipv6::LOOPBACK.words
    }

    /// `::ffff:a.b.c.d`.
    pub fn is_v4mapped(self) -> bool {
        self.words[..5] == [0; 5] && self.words[5] == 0xffff
    }

    /// Deprecated `::a.b.c.d` embedding, excluding `::` and `::1`.
    pub fn is_v4compatible(self) -> bool {
        self.words[..6] == [0; 6] && (self.words[6] != 0 || self.words[7] > 1)
    }

    /// NAT64 well-known prefix `64:ff9b::/96`.
    pub fn is_nat64wkp(self) -> bool {
        self.words[0] == 0x0064 && self.words[1] == 0xff9b && self.words[2..6] == [0; 4]
    }

    /// ISATAP interface identifier `::[02]00:5efe:a.b.c.d`.
    pub fn is_isatap(self) -> bool {
        (self.words[4] & 0xfdff) == 0 && self.words[5] == 0x5efe
    }

    /// 6to4 prefix `2002::/16`.
    pub fn is_6to4(self) -> bool {
        self.words[0] == 0x2002
    }

    /// Unique-local `fc00::/7`.
    pub fn is_uniquelocal(self) -> bool {
        (self.words[0] & 0xfe00) == 0xfc00
    }

    /// Link-local `fe80::/10`.
    pub fn is_linklocal(self) -> bool {
        (self.words[0] & 0xffc0) == 0xfe80
    }

    /// Multicast `ff00::/8`.
    pub fn is_multicast(self) -> bool {
        (self.words[0] & 0xff00) == 0xff00
    }

    /// Global unicast `2000::/3`.
    pub fn is_unicastglobal(self) -> bool {
        (self.words[0] & 0xe000) == 0x2000
    }

    /// Embeds an IPv4 address as `::ffff:a.b.c.d`.
    pub fn from_ipv4(a: Ipv4) -> Ipv6 {
        Ipv6 {
            words: [
                0,
                0,
                0,
                0,
                0,
                0xffff,
                (a.0 >> 16) as u16,
                (a.0 & 0xffff) as u16,
            ],
        }
    }

    /// Recovers the IPv4 address from a v4-mapped address, or `None` if the
    /// conversion is not meaningful.
    pub fn to_ipv4(self) -> Option<Ipv4> {
        if self.is_v4mapped() {
            Some(Ipv4(((self.words[6] as u32) << 16) | self.words[7] as u32))
        } else {
            None
        }
    }

    /// A coarse human-readable classification of the address.
    pub fn classify(self) -> &'static str {
        if self.is_loopback() {
            "loopback"
        } else if self.is_unicastglobal() {
            "global-unicast"
        } else if self.is_uniquelocal() {
            "unique-local"
        } else if self.is_linklocal() {
            "link-local"
        } else if self.is_multicast() {
            "multicast"
        } else if self.is_nat64wkp() {
            "nat64-wkp"
        } else if self.is_isatap() {
            "isatap"
        } else if self.is_6to4() {
            "6to4"
        } else if self.is_v4mapped() {
            "v4-mapped"
        } else if self.is_v4compatible() {
            "v4-compatible"
        } else {
            "public"
        }
    }
}

impl fmt::Display for Ipv6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_std().fmt(f)
    }
}

impl FromStr for Ipv6 {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Ipv6> {
        s.parse::<std::net::Ipv6Addr>()
            .map(Ipv6::from_std)
            .map_err(|_| NetError::Invalid(format!("not an IPv6 address: {s:?}")))
    }
}

/// One end of a connection or bind target: an IP address, a UNIX-domain
/// filesystem path, or the unspecified sentinel (any local interface).
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    #[default]
    Unspecified,
    Ipv4(Ipv4),
    Ipv6(Ipv6),
    Local(PathBuf),
}

impl Address {
    /// The socket domain this address binds or connects in. The unspecified
    /// sentinel selects IPv6 (dual-stack: v4 peers appear v4-mapped).
    pub fn domain(&self) -> socket2::Domain {
        match self {
            Address::Unspecified => socket2::Domain::IPV6,
            Address::Ipv4(_) => socket2::Domain::IPV4,
            Address::Ipv6(_) => socket2::Domain::IPV6,
            Address::Local(_) => socket2::Domain::UNIX,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Address::Local(_))
    }

    pub fn is_v4mapped(&self) -> bool {
        matches!(self, Address::Ipv6(a) if a.is_v4mapped())
    }

    /// Builds the kernel-facing socket address. This is the single place
    /// IPv6 words leave host order.
    pub fn to_sockaddr(&self, port: Port) -> Result<socket2::SockAddr> {
        match self {
            Address::Unspecified => Ok(SocketAddr::V6(SocketAddrV6::new(
                std::net::Ipv6Addr::UNSPECIFIED,
                port,
                0,
                0,
            ))
            .into()),
            Address::Ipv4(a) => Ok(SocketAddr::V4(SocketAddrV4::new(a.to_std(), port)).into()),
            Address::Ipv6(a) => {
                Ok(SocketAddr::V6(SocketAddrV6::new(a.to_std(), port, 0, 0)).into())
            }
            Address::Local(path) => socket2::SockAddr::unix(path)
                .map_err(|e| NetError::Invalid(format!("bad local path {path:?}: {e}"))),
        }
    }

    /// Extracts the address and port from a kernel socket address. An
    /// unnamed (e.g. autobound UNIX) address comes back `Unspecified`.
    pub fn from_sockaddr(sa: &socket2::SockAddr) -> (Address, Port) {
        if let Some(inet) = sa.as_socket() {
            match inet {
                SocketAddr::V4(v4) => (Address::Ipv4(Ipv4::from_std(*v4.ip())), v4.port()),
                SocketAddr::V6(v6) => (Address::Ipv6(Ipv6::from_std(*v6.ip())), v6.port()),
            }
        } else if let Some(path) = sa.as_pathname() {
            (Address::Local(path.to_path_buf()), 0)
        } else {
            (Address::Unspecified, 0)
        }
    }

    pub fn from_std(ip: IpAddr) -> Address {
        match ip {
            IpAddr::V4(a) => Address::Ipv4(Ipv4::from_std(a)),
            IpAddr::V6(a) => Address::Ipv6(Ipv6::from_std(a)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unspecified => write!(f, "unspecified"),
            Address::Ipv4(a) => a.fmt(f),
            Address::Ipv6(a) => a.fmt(f),
            Address::Local(p) => write!(f, "{}", p.display()),
        }
    }
}

impl From<Ipv4> for Address {
    fn from(a: Ipv4) -> Address {
        Address::Ipv4(a)
    }
}

impl From<Ipv6> for Address {
    fn from(a: Ipv6) -> Address {
        Address::Ipv6(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_octet_round_trip() {
        let a = Ipv4::from_octets([192, 168, 1, 1]);
        assert_eq!(a.0, 0xc0a8_0101);
        assert_eq!(a.octets(), [192, 168, 1, 1]);
        assert_eq!(a.to_string(), "192.168.1.1");
    }

    #[test]
    fn test_ipv4_predicates() {
        assert!(Ipv4::UNSPECIFIED.is_unspecified());
        assert!(Ipv4::LOOPBACK.is_loopback());
        assert!("127.255.0.1".parse::<Ipv4>().unwrap().is_loopback());
        assert!(Ipv4(u32::MAX).is_limited_broadcast());
        assert!("10.0.0.1".parse::<Ipv4>().unwrap().is_private());
        assert!("172.16.0.1".parse::<Ipv4>().unwrap().is_private());
        assert!("172.31.255.255".parse::<Ipv4>().unwrap().is_private());
        assert!(!"172.32.0.1".parse::<Ipv4>().unwrap().is_private());
        assert!("192.168.0.1".parse::<Ipv4>().unwrap().is_private());
        assert!("224.0.0.1".parse::<Ipv4>().unwrap().is_multicast());
        assert_eq!("8.8.8.8".parse::<Ipv4>().unwrap().classify(), "public");
        assert_eq!(Ipv4::LOOPBACK.classify(), "loopback");
    }

    #[test]
    fn test_ipv6_byte_order_involution() {
        let samples = [
            Ipv6::UNSPECIFIED,
            Ipv6::LOOPBACK,
            "2607:f8b0:400f:805::200e".parse::<Ipv6>().unwrap(),
            "fe80::1ff:fe23:4567:890a".parse::<Ipv6>().unwrap(),
        ];
        for a in samples {
            assert_eq!(a.hton().ntoh(), a, "hton/ntoh not an involution for {a}");
            assert_eq!(a.ntoh().hton(), a, "ntoh/hton not an involution for {a}");
        }
    }

    #[test]
    fn test_ipv6_predicates() {
        assert!(Ipv6::LOOPBACK.is_loopback());
        assert!("::ffff:10.0.0.1".parse::<Ipv6>().unwrap().is_v4mapped());
        assert!("64:ff9b::1.2.3.4".parse::<Ipv6>().unwrap().is_nat64wkp());
        assert!("2002:c000:0204::".parse::<Ipv6>().unwrap().is_6to4());
        assert!("fc00::1".parse::<Ipv6>().unwrap().is_uniquelocal());
        assert!("fd12:3456::1".parse::<Ipv6>().unwrap().is_uniquelocal());
        assert!("fe80::1".parse::<Ipv6>().unwrap().is_linklocal());
        assert!("ff02::1".parse::<Ipv6>().unwrap().is_multicast());
        assert!("2607:f8b0::1".parse::<Ipv6>().unwrap().is_unicastglobal());
        assert!("fe80::200:5efe:192.0.2.1".parse::<Ipv6>().unwrap().is_isatap());
        assert_eq!("2607:f8b0::1".parse::<Ipv6>().unwrap().classify(), "global-unicast");
    }

    #[test]
    fn test_v4_mapping_law() {
        // Mapping then unmapping recovers any IPv4 address.
        for s in ["0.0.0.1", "127.0.0.1", "192.168.1.1", "255.255.255.255"] {
            let v4: Ipv4 = s.parse().unwrap();
            let mapped = Ipv6::from_ipv4(v4);
            assert!(mapped.is_v4mapped());
            assert_eq!(mapped.to_ipv4(), Some(v4), "round trip failed for {s}");
        }
        // Bit-exact construction: ::ffff:192.168.1.1.
        let mapped = Ipv6::from_ipv4("192.168.1.1".parse().unwrap());
        assert_eq!(mapped, "::ffff:192.168.1.1".parse::<Ipv6>().unwrap());
        // A non-mapped address does not convert.
        assert_eq!("2607:f8b0::1".parse::<Ipv6>().unwrap().to_ipv4(), None);
        assert_eq!(Ipv6::LOOPBACK.to_ipv4(), None);
    }

    #[test]
    fn test_sockaddr_round_trip_v4() {
        let addr = Address::Ipv4("10.1.2.3".parse().unwrap());
        let sa = addr.to_sockaddr(8888).unwrap();
        let (back, port) = Address::from_sockaddr(&sa);
        assert_eq!(back, addr);
        assert_eq!(port, 8888);
    }

    #[test]
    fn test_sockaddr_round_trip_v6() {
        let addr = Address::Ipv6("2001:db8::42".parse().unwrap());
        let sa = addr.to_sockaddr(443).unwrap();
        let (back, port) = Address::from_sockaddr(&sa);
        assert_eq!(back, addr);
        assert_eq!(port, 443);
    }

    #[test]
    fn test_sockaddr_round_trip_local() {
        let addr = Address::Local(PathBuf::from("/var/tmp/netbase.sock"));
        let sa = addr.to_sockaddr(0).unwrap();
        let (back, port) = Address::from_sockaddr(&sa);
        assert_eq!(back, addr);
        assert_eq!(port, 0);
    }

    #[test]
    fn test_unspecified_binds_dual_stack() {
        assert_eq!(Address::Unspecified.domain(), socket2::Domain::IPV6);
        let sa = Address::Unspecified.to_sockaddr(0).unwrap();
        let (back, _) = Address::from_sockaddr(&sa);
        assert_eq!(back, Address::Ipv6(Ipv6::UNSPECIFIED));
    }

    #[test]
    fn test_address_serializes() {
        let addr = Address::Ipv4(Ipv4::LOOPBACK);
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
