//! Socket plumbing: typed addresses, endpoint parsing, stream and datagram
//! sockets, option control, and interface enumeration.
//!
//! All primitives are blocking-fd based and reentrant; the only process-wide
//! mutable state is the endpoint parser's IPv6 preference flag.

pub mod addr;
pub mod datagram;
pub mod endpoint;
pub mod interfaces;
pub mod options;
pub mod stream;

pub use addr::{Address, Ipv4, Ipv6, Port};
pub use datagram::DatagramSocket;
pub use endpoint::{Endpoint, EndpointType};
pub use stream::{StreamListener, StreamSocket};

use std::mem::MaybeUninit;

use crate::error::{NetError, Result};

/// Hook invoked on a freshly created socket before it is bound, for options
/// that must precede binding (`SO_REUSEADDR`, `IPV6_V6ONLY`, ...).
pub type Injector<'a> = &'a dyn Fn(&socket2::Socket) -> std::io::Result<()>;

/// The default injector: enable address reuse.
pub fn inject_defaults(socket: &socket2::Socket) -> std::io::Result<()> {
    socket.set_reuse_address(true)
}

/// Maps an OS error into the taxonomy, logging it first unless it is a
/// transient condition the caller is expected to retry.
pub(crate) fn fail<T>(what: &str, err: std::io::Error) -> Result<T> {
    let err = NetError::from(err);
    if !err.is_transient() {
        tracing::warn!("{what}: {err}");
    }
    Err(err)
}

/// Views a byte buffer as the `MaybeUninit` slice socket2's receive calls
/// want.
// SAFETY: u8 and MaybeUninit<u8> have identical layout, and the kernel only
// writes initialized bytes through this view.
pub(crate) fn recv_buffer(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}
