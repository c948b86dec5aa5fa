//! Centralized runtime constants.
//!
//! All tunable sizes, limits, and protocol names are collected here so they
//! can be found and adjusted in a single place rather than scattered across
//! modules.

/// Largest listen backlog ever passed to the kernel. Caller-supplied backlogs
/// are clamped to this; a missing or negative backlog selects it outright.
pub const MAXIMUM_BACKLOG: i32 = libc::SOMAXCONN as i32;

/// ICMP / ICMPv6 echo message header size (type, code, checksum, id, seq).
pub const ECHO_HEADER_BYTES: usize = 8;

/// Echo payload carried after the header, matching the classic ping(1) frame.
pub const ECHO_PAYLOAD_BYTES: usize = 56;

/// Leading bytes of the echo payload holding the host-order send timestamp.
pub const ECHO_TIMESTAMP_BYTES: usize = 16;

/// Smallest IPv4 header (no options); received v4 echo replies are carried
/// behind at least this much.
pub const IPV4_HEADER_BYTES: usize = 20;

/// Protocol names used when querying the service database for a port.
pub const SERVICE_PROTOCOL_TCP: &str = "tcp";
pub const SERVICE_PROTOCOL_UDP: &str = "udp";

/// Upper bound on the scratch buffer grown for `getservbyname_r` retries.
pub const SERVICE_BUFFER_LIMIT: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_frame_geometry() {
        // Timestamp must fit inside the payload, and the whole frame must be
        // the 64 bytes ping(1) has always sent.
        assert!(ECHO_TIMESTAMP_BYTES <= ECHO_PAYLOAD_BYTES);
        assert_eq!(ECHO_HEADER_BYTES + ECHO_PAYLOAD_BYTES, 64);
    }

    #[test]
    fn test_backlog_positive() {
        assert!(MAXIMUM_BACKLOG > 0);
    }

    #[test]
    fn test_service_buffer_limit_reasonable() {
        assert!(SERVICE_BUFFER_LIMIT >= 1024);
    }
}
