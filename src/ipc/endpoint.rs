//! Endpoint parsing: host:port / `[v6]:port` / UNIX-path strings into a
//! typed descriptor.
//!
//! Recognized forms, tried in order (first match wins):
//!
//! 1. `""`, `/path`, `./path`, `../path`: a UNIX-domain path.
//! 2. `[v6]` or `[v6]:port-or-service`.
//! 3. `v4` or `v4:port-or-service`.
//! 4. `hostname` or `hostname:port-or-service` (platform resolver; both A
//!    and AAAA records populate the descriptor).
//! 5. Bare `port-or-service` or `:port-or-service`: address unspecified.
//!
//! A service name is looked up for both `tcp` and `udp`; each transport's
//! port is populated independently. A bare token that is none of the above
//! is an error, never a silent fallback.

use std::ffi::CString;
use std::fmt;
use std::net::ToSocketAddrs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{NetError, Result};
use crate::ipc::addr::{Address, Ipv4, Ipv6, Port};

/// Which address form an endpoint carries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointType {
    #[default]
    Unspecified,
    Ipv4,
    Ipv6,
    Local,
}

/// A fully parsed endpoint: at most one address form is populated, and the
/// port fields hold whatever each transport's service lookup produced (the
/// same number for numeric ports).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: EndpointType,
    pub ipv4: Ipv4,
    pub ipv6: Ipv6,
    pub tcp: Port,
    pub udp: Port,
    pub local: PathBuf,
}

/// When set, endpoints that could be reported as either family (bare ports,
/// dual-homed hostnames) prefer IPv6. Plain boolean, benign if raced.
static PREFER_IPV6: AtomicBool = AtomicBool::new(false);

/// Flips the process-wide family preference for ambiguous endpoints and
/// returns the prior value.
pub fn set_prefer_ipv6(on: bool) -> bool {
    PREFER_IPV6.swap(on, Ordering::Relaxed)
}

impl Endpoint {
    /// Parses an endpoint string. Equivalent to `str::parse`.
    pub fn parse(text: &str) -> Result<Endpoint> {
        text.parse()
    }

    /// The address to bind or connect with, honoring the endpoint's type.
    pub fn address(&self) -> Address {
        match self.kind {
            EndpointType::Unspecified => Address::Unspecified,
            EndpointType::Ipv4 => Address::Ipv4(self.ipv4),
            EndpointType::Ipv6 => Address::Ipv6(self.ipv6),
            EndpointType::Local => Address::Local(self.local.clone()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = NetError;

    fn from_str(text: &str) -> Result<Endpoint> {
        if text.is_empty()
            || text.starts_with('/')
            || text.starts_with("./")
            || text.starts_with("../")
        {
            return parse_local(text);
        }

        if let Some(rest) = text.strip_prefix('[') {
            let (literal, tail) = rest
                .split_once(']')
                .ok_or_else(|| NetError::Invalid(format!("unterminated bracket: {text:?}")))?;
            let ipv6: Ipv6 = literal.parse()?;
            let (tcp, udp) = match tail {
                "" => (0, 0),
                tail => {
                    let spec = tail.strip_prefix(':').ok_or_else(|| {
                        NetError::Invalid(format!("trailing garbage after bracket: {text:?}"))
                    })?;
                    resolve_portspec(spec)?
                }
            };
            return Ok(Endpoint {
                kind: EndpointType::Ipv6,
                ipv6,
                tcp,
                udp,
                ..Default::default()
            });
        }

        match text.split_once(':') {
            Some((host, spec)) => {
                if spec.contains(':') {
                    return Err(NetError::Invalid(format!(
                        "IPv6 literals require brackets: {text:?}"
                    )));
                }
                let (tcp, udp) = resolve_portspec(spec)?;
                if host.is_empty() {
                    return Ok(unspecified_endpoint(tcp, udp));
                }
                if let Ok(v4) = host.parse::<Ipv4>() {
                    return Ok(Endpoint {
                        kind: EndpointType::Ipv4,
                        ipv4: v4,
                        tcp,
                        udp,
                        ..Default::default()
                    });
                }
                host_endpoint(host, tcp, udp)
            }
            None => {
                if let Ok(v4) = text.parse::<Ipv4>() {
                    return Ok(Endpoint {
                        kind: EndpointType::Ipv4,
                        ipv4: v4,
                        ..Default::default()
                    });
                }
                if text.bytes().all(|b| b.is_ascii_digit()) {
                    let (tcp, udp) = resolve_portspec(text)?;
                    return Ok(unspecified_endpoint(tcp, udp));
                }
                if let Ok(endpoint) = host_endpoint(text, 0, 0) {
                    return Ok(endpoint);
                }
                let tcp = service_to_port(text, config::SERVICE_PROTOCOL_TCP);
                let udp = service_to_port(text, config::SERVICE_PROTOCOL_UDP);
                if tcp.is_none() && udp.is_none() {
                    return Err(NetError::Invalid(format!(
                        "not an address, hostname, port, or service: {text:?}"
                    )));
                }
                Ok(unspecified_endpoint(
                    tcp.unwrap_or(0),
                    udp.unwrap_or(0),
                ))
            }
        }
    }
}

/// Canonical rendering: dotted-quad IPv4, bracketed RFC 5952 IPv6, absolute
/// UNIX paths, and the numeric port (TCP's if both are set). Feeding the
/// rendering back to the parser yields an equivalent descriptor.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EndpointType::Local => write!(f, "{}", self.local.display()),
            EndpointType::Ipv4 => {
                if !self.ipv4.is_unspecified() {
                    write!(f, "{}", self.ipv4)?;
                }
                write_port(f, self.tcp, self.udp)
            }
            EndpointType::Ipv6 => {
                write!(f, "[{}]", self.ipv6)?;
                write_port(f, self.tcp, self.udp)
            }
            EndpointType::Unspecified => write_port(f, self.tcp, self.udp),
        }
    }
}

fn write_port(f: &mut fmt::Formatter<'_>, tcp: Port, udp: Port) -> fmt::Result {
    if tcp != 0 {
        write!(f, ":{tcp}")
    } else if udp != 0 {
        write!(f, ":{udp}")
    } else {
        Ok(())
    }
}

fn unspecified_endpoint(tcp: Port, udp: Port) -> Endpoint {
    Endpoint {
        kind: if PREFER_IPV6.load(Ordering::Relaxed) {
            EndpointType::Ipv6
        } else {
            EndpointType::Ipv4
        },
        tcp,
        udp,
        ..Default::default()
    }
}

fn host_endpoint(host: &str, tcp: Port, udp: Port) -> Result<Endpoint> {
    let (v4, v6) = resolve_host(host)
        .ok_or_else(|| NetError::Invalid(format!("unresolvable hostname: {host:?}")))?;
    let kind = match (v4, v6) {
        (Some(_), Some(_)) if PREFER_IPV6.load(Ordering::Relaxed) => EndpointType::Ipv6,
        (Some(_), _) => EndpointType::Ipv4,
        _ => EndpointType::Ipv6,
    };
    Ok(Endpoint {
        kind,
        ipv4: v4.unwrap_or_default(),
        ipv6: v6.unwrap_or_default(),
        tcp,
        udp,
        ..Default::default()
    })
}

fn parse_local(text: &str) -> Result<Endpoint> {
    let local = canonicalize_local(text)?;
    Ok(Endpoint {
        kind: EndpointType::Local,
        local,
        ..Default::default()
    })
}

/// Collapses `.` and `..` segments (against the current working directory if
/// the path is relative). The path itself need not exist yet, but its parent
/// must already be a directory.
fn canonicalize_local(text: &str) -> Result<PathBuf> {
    if text.is_empty() {
        return Ok(PathBuf::new());
    }
    let path = Path::new(text);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(NetError::from)?;
        cwd.join(path)
    };
    let mut collapsed = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                collapsed.pop();
            }
            other => collapsed.push(other),
        }
    }
    let parent = collapsed
        .parent()
        .ok_or_else(|| NetError::Invalid(format!("local endpoint has no parent: {text:?}")))?;
    if !parent.is_dir() {
        return Err(NetError::Invalid(format!(
            "local endpoint parent is not a directory: {}",
            parent.display()
        )));
    }
    Ok(collapsed)
}

/// Resolves a port-or-service token: a decimal number 0-65535 applies to
/// both transports; a service name is queried for each transport
/// independently. Unresolvable for both transports is an error.
fn resolve_portspec(spec: &str) -> Result<(Port, Port)> {
    if spec.is_empty() {
        return Err(NetError::Invalid("empty port specification".into()));
    }
    if spec.bytes().all(|b| b.is_ascii_digit()) {
        let number: u32 = spec
            .parse()
            .map_err(|_| NetError::Invalid(format!("port out of range: {spec:?}")))?;
        let port = Port::try_from(number)
            .map_err(|_| NetError::Invalid(format!("port out of range: {spec:?}")))?;
        return Ok((port, port));
    }
    let tcp = service_to_port(spec, config::SERVICE_PROTOCOL_TCP);
    let udp = service_to_port(spec, config::SERVICE_PROTOCOL_UDP);
    if tcp.is_none() && udp.is_none() {
        return Err(NetError::Invalid(format!("unknown service: {spec:?}")));
    }
    Ok((tcp.unwrap_or(0), udp.unwrap_or(0)))
}

// Reentrant `getservbyname`; not currently exposed by the `libc` crate.
extern "C" {
    fn getservbyname_r(
        name: *const libc::c_char,
        proto: *const libc::c_char,
        result_buf: *mut libc::servent,
        buf: *mut libc::c_char,
        buflen: libc::size_t,
        result: *mut *mut libc::servent,
    ) -> libc::c_int;
}

/// Looks a service name up in the system services database for one
/// protocol (`"tcp"` or `"udp"`). A leading colon is tolerated for
/// compatibility with endpoint syntax. Uses the reentrant resolver only.
pub fn service_to_port(service: &str, protocol: &str) -> Option<Port> {
    let service = service.strip_prefix(':').unwrap_or(service);
    let name = CString::new(service).ok()?;
    let proto = CString::new(protocol).ok()?;
    let mut entry: libc::servent = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::servent = std::ptr::null_mut();
    let mut buffer = vec![0 as libc::c_char; 1024];
    loop {
        let rc = unsafe {
            getservbyname_r(
                name.as_ptr(),
                proto.as_ptr(),
                &mut entry,
                buffer.as_mut_ptr(),
                buffer.len(),
                &mut found,
            )
        };
        if rc == libc::ERANGE {
            if buffer.len() >= config::SERVICE_BUFFER_LIMIT {
                return None;
            }
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if rc != 0 || found.is_null() {
            return None;
        }
        // s_port is in network byte order.
        return Some(u16::from_be(unsafe { (*found).s_port } as u16));
    }
}

/// Resolves a hostname to at most one address of each family.
fn resolve_host(host: &str) -> Option<(Option<Ipv4>, Option<Ipv6>)> {
    let addrs = (host, 0u16).to_socket_addrs().ok()?;
    let mut v4 = None;
    let mut v6 = None;
    for sa in addrs {
        match sa.ip() {
            std::net::IpAddr::V4(a) if v4.is_none() => v4 = Some(Ipv4::from_std(a)),
            std::net::IpAddr::V6(a) if v6.is_none() => v6 = Some(Ipv6::from_std(a)),
            _ => {}
        }
    }
    if v4.is_none() && v6.is_none() {
        None
    } else {
        Some((v4, v6))
    }
}

/// Resolves a hostname to every address the platform resolver reports,
/// filtering consecutive duplicates (the resolver returns one entry per
/// socket type for the same address).
pub fn resolve_addresses(host: &str) -> Result<Vec<Address>> {
    let addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| NetError::Invalid(format!("unresolvable hostname {host:?}: {e}")))?;
    let mut out: Vec<Address> = Vec::new();
    for sa in addrs {
        let address = Address::from_std(sa.ip());
        if out.last() != Some(&address) {
            out.push(address);
        }
    }
    Ok(out)
}
