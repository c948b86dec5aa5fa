//! POSIX network I/O and synchronization primitives.
//!
//! The crate is organized as four layers, leaves first:
//!
//! - [`ipc`]: typed IP/UNIX addresses, endpoint parsing, stream and
//!   datagram sockets with a full socket-option surface, and interface
//!   enumeration.
//! - [`ping`]: an ICMPv4/ICMPv6 echo probe engine layered on the raw
//!   socket plumbing (checksum, request emission, reply classification,
//!   round-trip measurement).
//! - [`sync`]: a fair, FIFO-ordered reader-writer lock with timed and
//!   priority acquisition.
//! - [`meter`]: peak/sustained/burst statistics for event streams.
//!
//! Everything is blocking-fd based; there is no runtime, no persisted
//! state, and no process-global mutable state beyond two benign flags.
//! All fallible operations return [`error::NetError`], which keeps
//! transient conditions (`Interrupted`, `WouldBlock`, `TimedOut`)
//! distinct so callers can retry without inspecting strings.
//!
//! ```
//! use netbase::{Endpoint, Meter};
//!
//! let endpoint: Endpoint = ":8888".parse()?;
//! assert_eq!(endpoint.tcp, 8888);
//!
//! let mut meter = Meter::new(0)?;
//! meter.events(1_000_000_000, 64)?;
//! # Ok::<(), netbase::NetError>(())
//! ```

pub mod config;
pub mod error;
pub mod ipc;
pub mod meter;
pub mod ping;
pub mod sync;
pub mod time;

pub use error::{NetError, Result};
pub use ipc::options::SocketControl;
pub use ipc::{
    Address, DatagramSocket, Endpoint, EndpointType, Ipv4, Ipv6, Port, StreamListener,
    StreamSocket,
};
pub use meter::{Meter, MeterSnapshot};
pub use ping::{Ping4Socket, Ping6Socket};
pub use sync::{ReaderWriter, FOREVER, POLL};
pub use time::Ticks;
