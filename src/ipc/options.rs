//! Socket-option control shared by every socket wrapper in the crate.
//!
//! Options socket2 wraps are used through it; the remainder (`SO_DEBUG`,
//! `TCP_QUICKACK`, `IPV6_ADDRFORM`, the `SIOCGSTAMP` timestamp ioctl, and
//! `SO_TIMESTAMP` via nix) go through one raw-option helper each. All
//! setters and getters are idempotent.

use std::io;
use std::os::fd::AsRawFd;
use std::time::Duration;

use nix::sys::socket::sockopt::ReceiveTimestamp;

use crate::error::{NetError, Result};
use crate::ipc::fail;
use crate::time::{self, Ticks};

/// Linux `<linux/in6.h>`: convert a connected v4-mapped IPv6 socket into an
/// AF_INET socket. Not exposed by socket2 or nix.
const IPV6_ADDRFORM: libc::c_int = 1;

pub(crate) fn set_int_option(
    socket: &socket2::Socket,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
    what: &str,
) -> Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        fail(what, io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn get_int_option(
    socket: &socket2::Socket,
    level: libc::c_int,
    name: libc::c_int,
    what: &str,
) -> Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut length = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut length,
        )
    };
    if rc < 0 {
        fail(what, io::Error::last_os_error())
    } else {
        Ok(value)
    }
}

/// Option control for anything that wraps a socket.
pub trait SocketControl {
    /// The underlying socket the options apply to.
    fn control(&self) -> &socket2::Socket;

    fn set_nonblocking(&self, enable: bool) -> Result<()> {
        self.control()
            .set_nonblocking(enable)
            .or_else(|e| fail("set_nonblocking", e))
    }

    fn set_reuse_address(&self, enable: bool) -> Result<()> {
        self.control()
            .set_reuse_address(enable)
            .or_else(|e| fail("set_reuse_address", e))
    }

    fn reuse_address(&self) -> Result<bool> {
        self.control()
            .reuse_address()
            .or_else(|e| fail("reuse_address", e))
    }

    fn set_reuse_port(&self, enable: bool) -> Result<()> {
        self.control()
            .set_reuse_port(enable)
            .or_else(|e| fail("set_reuse_port", e))
    }

    fn reuse_port(&self) -> Result<bool> {
        self.control().reuse_port().or_else(|e| fail("reuse_port", e))
    }

    fn set_keepalive(&self, enable: bool) -> Result<()> {
        self.control()
            .set_keepalive(enable)
            .or_else(|e| fail("set_keepalive", e))
    }

    fn keepalive(&self) -> Result<bool> {
        self.control().keepalive().or_else(|e| fail("keepalive", e))
    }

    /// Enables kernel receive timestamping (`SO_TIMESTAMP`); the stamp is
    /// retrieved per datagram by `DatagramSocket::recv_from_timestamped`
    /// or after the fact by `last_timestamp`.
    fn set_receive_timestamp(&self, enable: bool) -> Result<()> {
        nix::sys::socket::setsockopt(self.control(), ReceiveTimestamp, &enable)
            .map_err(NetError::from)
    }

    fn receive_timestamp(&self) -> Result<bool> {
        nix::sys::socket::getsockopt(self.control(), ReceiveTimestamp).map_err(NetError::from)
    }

    /// `SO_DEBUG`. Requires privilege; failure surfaces as `Permission`.
    fn set_socket_debug(&self, enable: bool) -> Result<()> {
        set_int_option(
            self.control(),
            libc::SOL_SOCKET,
            libc::SO_DEBUG,
            enable as libc::c_int,
            "set_socket_debug",
        )
    }

    /// Sets `SO_LINGER` from a tick duration: zero disables lingering,
    /// anything else lingers for `min(ceil(ticks / frequency), INT_MAX)`
    /// whole seconds.
    fn set_linger_ticks(&self, ticks: Ticks) -> Result<()> {
        if ticks < 0 {
            return Err(NetError::Invalid(format!("negative linger: {ticks}")));
        }
        let linger = if ticks == 0 {
            None
        } else {
            let seconds = match ticks.checked_add(time::FREQUENCY - 1) {
                Some(sum) => sum / time::FREQUENCY,
                None => Ticks::MAX / time::FREQUENCY + 1,
            }
            .min(libc::c_int::MAX as Ticks);
            Some(Duration::from_secs(seconds as u64))
        };
        self.control()
            .set_linger(linger)
            .or_else(|e| fail("set_linger_ticks", e))
    }

    /// Reads `SO_LINGER` back as ticks; zero means lingering is disabled.
    fn linger_ticks(&self) -> Result<Ticks> {
        let linger = self.control().linger().or_else(|e| fail("linger_ticks", e))?;
        Ok(linger.map_or(0, time::duration_to_ticks))
    }

    fn set_nodelay(&self, enable: bool) -> Result<()> {
        self.control()
            .set_nodelay(enable)
            .or_else(|e| fail("set_nodelay", e))
    }

    fn nodelay(&self) -> Result<bool> {
        self.control().nodelay().or_else(|e| fail("nodelay", e))
    }

    /// `TCP_QUICKACK`: disable delayed acknowledgment until the next
    /// kernel-internal reset of the flag.
    fn set_quickack(&self, enable: bool) -> Result<()> {
        set_int_option(
            self.control(),
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            enable as libc::c_int,
            "set_quickack",
        )
    }

    fn quickack(&self) -> Result<bool> {
        get_int_option(
            self.control(),
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            "quickack",
        )
        .map(|v| v != 0)
    }

    /// `SO_SNDBUF`, clamped to `INT_MAX`.
    fn set_send_buffer(&self, size: usize) -> Result<()> {
        self.control()
            .set_send_buffer_size(size.min(libc::c_int::MAX as usize))
            .or_else(|e| fail("set_send_buffer", e))
    }

    fn send_buffer(&self) -> Result<usize> {
        self.control()
            .send_buffer_size()
            .or_else(|e| fail("send_buffer", e))
    }

    /// `SO_RCVBUF`, clamped to `INT_MAX`.
    fn set_receive_buffer(&self, size: usize) -> Result<()> {
        self.control()
            .set_recv_buffer_size(size.min(libc::c_int::MAX as usize))
            .or_else(|e| fail("set_receive_buffer", e))
    }

    fn receive_buffer(&self) -> Result<usize> {
        self.control()
            .recv_buffer_size()
            .or_else(|e| fail("receive_buffer", e))
    }

    /// `IPV6_V6ONLY`: when disabled (the kernel default here), a v6 socket
    /// carries IPv4 peers as v4-mapped addresses.
    fn set_ipv6_only(&self, enable: bool) -> Result<()> {
        self.control()
            .set_only_v6(enable)
            .or_else(|e| fail("set_ipv6_only", e))
    }

    fn ipv6_only(&self) -> Result<bool> {
        self.control().only_v6().or_else(|e| fail("ipv6_only", e))
    }

    /// `IPV6_ADDRFORM`: downgrade a connected, v4-mapped IPv6 socket to a
    /// plain AF_INET socket.
    fn set_address_form_ipv4(&self) -> Result<()> {
        set_int_option(
            self.control(),
            libc::IPPROTO_IPV6,
            IPV6_ADDRFORM,
            libc::AF_INET,
            "set_address_form_ipv4",
        )
    }

    /// `SO_BINDTODEVICE`: restrict the socket to one interface; `None`
    /// removes the restriction. Requires privilege.
    fn bind_interface(&self, interface: Option<&str>) -> Result<()> {
        self.control()
            .bind_device(interface.map(str::as_bytes))
            .or_else(|e| fail("bind_interface", e))
    }

    /// The kernel receive timestamp of the most recently delivered
    /// datagram (`SIOCGSTAMP`), as wall-clock ticks.
    fn last_timestamp(&self) -> Result<Ticks> {
        // `SIOCGSTAMP` is not currently exposed by the `libc` crate; this is
        // its fixed value on Linux (asm-generic/sockios.h).
        const SIOCGSTAMP: libc::c_ulong = 0x8906;
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        let rc = unsafe {
            libc::ioctl(
                self.control().as_raw_fd(),
                SIOCGSTAMP as _,
                &mut tv as *mut libc::timeval,
            )
        };
        if rc < 0 {
            fail("last_timestamp", io::Error::last_os_error())
        } else {
            Ok(tv.tv_sec as Ticks * time::FREQUENCY + tv.tv_usec as Ticks * 1_000)
        }
    }
}

impl SocketControl for socket2::Socket {
    fn control(&self) -> &socket2::Socket {
        self
    }
}
