//! Network interface enumeration.

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::ipc::addr::{Ipv4, Ipv6};

/// The IP addresses bound to one interface.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddresses {
    pub ipv4: Vec<Ipv4>,
    pub ipv6: Vec<Ipv6>,
}

/// Returns the names of all network interfaces, deduplicated and in
/// kernel order.
pub fn interfaces() -> Result<Vec<String>> {
    let entries = nix::ifaddrs::getifaddrs().map_err(NetError::from)?;
    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        if !names.contains(&entry.interface_name) {
            names.push(entry.interface_name);
        }
    }
    Ok(names)
}

/// Returns the IPv4 and IPv6 addresses bound to the named interface. An
/// unknown interface yields empty sets, not an error.
pub fn interface_addresses(name: &str) -> Result<InterfaceAddresses> {
    let entries = nix::ifaddrs::getifaddrs().map_err(NetError::from)?;
    let mut out = InterfaceAddresses::default();
    for entry in entries {
        if entry.interface_name != name {
            continue;
        }
        let Some(storage) = entry.address else {
            continue;
        };
        if let Some(sin) = storage.as_sockaddr_in() {
            out.ipv4.push(Ipv4::from_std(sin.ip()));
        } else if let Some(sin6) = storage.as_sockaddr_in6() {
            out.ipv6.push(Ipv6::from_std(sin6.ip()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interfaces_are_deduplicated() {
        let names = interfaces().expect("getifaddrs should succeed");
        assert!(!names.is_empty(), "at least one interface expected");
        for (i, name) in names.iter().enumerate() {
            assert!(
                !names[i + 1..].contains(name),
                "duplicate interface name {name}"
            );
        }
    }

    #[test]
    fn test_loopback_interface_addresses() {
        let names = interfaces().unwrap();
        if !names.iter().any(|n| n == "lo") {
            eprintln!("skipping: no loopback interface named lo");
            return;
        }
        let addrs = interface_addresses("lo").unwrap();
        assert!(
            addrs.ipv4.iter().any(|a| a.is_loopback()),
            "lo should carry an IPv4 loopback address, got {:?}",
            addrs.ipv4
        );
        for a in &addrs.ipv6 {
            assert!(
                a.is_loopback() || a.is_linklocal(),
                "unexpected lo IPv6 address {a}"
            );
        }
    }

    #[test]
    fn test_unknown_interface_is_empty() {
        let addrs = interface_addresses("no-such-interface0").unwrap();
        assert!(addrs.ipv4.is_empty());
        assert!(addrs.ipv6.is_empty());
    }
}
