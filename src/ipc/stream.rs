//! Stream sockets over IPv4, IPv6, and UNIX-domain paths.
//!
//! A *provider* listens for inbound connections; a *consumer* connects
//! outward. Construction follows one fixed sequence: create the socket,
//! run the injector (options that must precede binding), bind, restrict
//! to an interface if asked, then listen or connect. Any failure closes
//! the socket before the error is returned.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::IntoRawFd;

use socket2::{Socket, Type};

use crate::config;
use crate::error::Result;
use crate::ipc::addr::{Address, Port};
use crate::ipc::{fail, inject_defaults, Injector};

use super::options::SocketControl;

/// A listening stream socket.
pub struct StreamListener {
    socket: Socket,
}

impl StreamListener {
    /// Opens a stream provider with the default injector (address reuse),
    /// no interface restriction, and the platform-maximum backlog. A zero
    /// port requests an ephemeral port, readable afterward via `near_end`.
    pub fn provider(address: &Address, port: Port) -> Result<StreamListener> {
        Self::provider_base(address, port, None, None, None)
    }

    /// Opens a stream provider. A missing or negative backlog selects the
    /// platform maximum; larger requests are clamped to it.
    pub fn provider_base(
        address: &Address,
        port: Port,
        interface: Option<&str>,
        backlog: Option<i32>,
        injector: Option<Injector<'_>>,
    ) -> Result<StreamListener> {
        let socket = Socket::new(address.domain(), Type::STREAM, None)
            .or_else(|e| fail("stream_provider: socket", e))?;
        match injector {
            Some(inject) => inject(&socket),
            None => inject_defaults(&socket),
        }
        .or_else(|e| fail("stream_provider: injector", e))?;
        socket
            .bind(&address.to_sockaddr(port)?)
            .or_else(|e| fail("stream_provider: bind", e))?;
        if interface.is_some() {
            socket.bind_interface(interface)?;
        }
        let backlog = backlog
            .filter(|b| *b >= 0)
            .unwrap_or(config::MAXIMUM_BACKLOG)
            .min(config::MAXIMUM_BACKLOG);
        socket
            .listen(backlog)
            .or_else(|e| fail("stream_provider: listen", e))?;
        Ok(StreamListener { socket })
    }

    /// Waits for the next inbound connection. Returns the connected stream
    /// and the peer's address and port. An IPv4 peer of a dual-stack
    /// provider is reported as a v4-mapped IPv6 address. `Interrupted` is
    /// reported distinctly and is retryable.
    pub fn accept(&self) -> Result<(StreamSocket, Address, Port)> {
        match self.socket.accept() {
            Ok((socket, sa)) => {
                let (address, port) = Address::from_sockaddr(&sa);
                Ok((StreamSocket { socket }, address, port))
            }
            Err(e) => fail("stream_accept", e),
        }
    }

    /// The local address and port of the listener. Reads the kernel-chosen
    /// port back after an ephemeral bind.
    pub fn near_end(&self) -> Result<(Address, Port)> {
        match self.socket.local_addr() {
            Ok(sa) => Ok(Address::from_sockaddr(&sa)),
            Err(e) => fail("stream_nearend", e),
        }
    }

    /// Releases the descriptor, surfacing any close-time error. Ownership
    /// makes a second close unrepresentable.
    pub fn close(self) -> Result<()> {
        close_fd(self.socket, "stream_listener: close")
    }
}

impl SocketControl for StreamListener {
    fn control(&self) -> &Socket {
        &self.socket
    }
}

/// A connected stream socket (accepted or consumer-side).
#[derive(Debug)]
pub struct StreamSocket {
    socket: Socket,
}

impl StreamSocket {
    /// Connects to (address, port) with the default injector and no local
    /// bind.
    pub fn consumer(address: &Address, port: Port) -> Result<StreamSocket> {
        Self::consumer_base(address, port, None, None, None)
    }

    /// Connects to (address, port), optionally binding a local
    /// (address, port) and interface first. `Interrupted` during connect
    /// is reported distinctly.
    pub fn consumer_base(
        address: &Address,
        port: Port,
        local: Option<(&Address, Port)>,
        interface: Option<&str>,
        injector: Option<Injector<'_>>,
    ) -> Result<StreamSocket> {
        let socket = Socket::new(address.domain(), Type::STREAM, None)
            .or_else(|e| fail("stream_consumer: socket", e))?;
        match injector {
            Some(inject) => inject(&socket),
            None => inject_defaults(&socket),
        }
        .or_else(|e| fail("stream_consumer: injector", e))?;
        if let Some((local_address, local_port)) = local {
            socket
                .bind(&local_address.to_sockaddr(local_port)?)
                .or_else(|e| fail("stream_consumer: bind", e))?;
        }
        if interface.is_some() {
            socket.bind_interface(interface)?;
        }
        socket
            .connect(&address.to_sockaddr(port)?)
            .or_else(|e| fail("stream_consumer: connect", e))?;
        Ok(StreamSocket { socket })
    }

    /// Reads into `buf`, surfacing `Interrupted`/`WouldBlock` distinctly.
    /// Zero means orderly shutdown by the peer.
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        (&self.socket).read(buf).or_else(|e| fail("stream_receive", e))
    }

    /// Writes from `buf`, surfacing `Interrupted`/`WouldBlock` distinctly.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        (&self.socket).write(buf).or_else(|e| fail("stream_send", e))
    }

    /// The local address and port.
    pub fn near_end(&self) -> Result<(Address, Port)> {
        match self.socket.local_addr() {
            Ok(sa) => Ok(Address::from_sockaddr(&sa)),
            Err(e) => fail("stream_nearend", e),
        }
    }

    /// The peer's address and port.
    pub fn far_end(&self) -> Result<(Address, Port)> {
        match self.socket.peer_addr() {
            Ok(sa) => Ok(Address::from_sockaddr(&sa)),
            Err(e) => fail("stream_farend", e),
        }
    }

    /// Half-closes for graceful drain; the descriptor stays open.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        self.socket
            .shutdown(how)
            .or_else(|e| fail("stream_shutdown", e))
    }

    /// Releases the descriptor, surfacing any close-time error.
    pub fn close(self) -> Result<()> {
        close_fd(self.socket, "stream_socket: close")
    }
}

impl SocketControl for StreamSocket {
    fn control(&self) -> &Socket {
        &self.socket
    }
}

impl Read for StreamSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.socket).read(buf)
    }
}

impl Write for StreamSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.socket).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.socket).flush()
    }
}

pub(crate) fn close_fd(socket: Socket, what: &str) -> Result<()> {
    let fd = socket.into_raw_fd();
    if unsafe { libc::close(fd) } < 0 {
        fail(what, io::Error::last_os_error())
    } else {
        Ok(())
    }
}
