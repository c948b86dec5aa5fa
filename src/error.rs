//! Unified error type for the whole crate.
//!
//! `NetError` is the single error type returned by every fallible operation.
//! It serializes as `{ "kind": "...", "message": "..." }` so embedding
//! applications can programmatically distinguish error categories.
//!
//! Transient conditions (`Interrupted`, `WouldBlock`, `TimedOut`) are
//! distinct variants so callers can retry without string matching or
//! logging; everything else is logged at the boundary where it occurs
//! and propagated upward.

use serde::ser::SerializeStruct;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NetError>;

/// Error returned by all fallible operations in this crate.
///
/// Each variant maps to a distinct failure domain. The serialized form is a
/// JSON object with `kind` (variant name) and `message` (human-readable
/// description).
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Bad argument (e.g. a negative clock value, an out-of-range port).
    #[error("invalid: {0}")]
    Invalid(String),

    /// A monotonic precondition was violated (e.g. the clock went backward).
    #[error("range violation: {0}")]
    RangeViolation(String),

    /// Counter or buffer arithmetic would overflow.
    #[error("overflow: {0}")]
    Overflow(String),

    /// A wait exceeded its deadline. Retryable.
    #[error("timed out")]
    TimedOut,

    /// A blocking call was interrupted by a signal. Retryable.
    #[error("interrupted")]
    Interrupted,

    /// A non-blocking call had nothing to do. Retryable.
    #[error("would block")]
    WouldBlock,

    /// The operation requires elevated privilege (e.g. raw sockets).
    #[error("permission denied: {0}")]
    Permission(String),

    /// The resource cannot be finalized while still in use.
    #[error("busy: {0}")]
    Busy(String),

    /// An internal invariant was violated. Treat as a bug.
    #[error("unexpected: {0}")]
    Unexpected(String),

    /// Generic underlying OS failure. The original errno is preserved.
    #[error("{0}")]
    Io(#[source] std::io::Error),
}

impl NetError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            NetError::Invalid(_) => "Invalid",
            NetError::RangeViolation(_) => "RangeViolation",
            NetError::Overflow(_) => "Overflow",
            NetError::TimedOut => "TimedOut",
            NetError::Interrupted => "Interrupted",
            NetError::WouldBlock => "WouldBlock",
            NetError::Permission(_) => "Permission",
            NetError::Busy(_) => "Busy",
            NetError::Unexpected(_) => "Unexpected",
            NetError::Io(_) => "Io",
        }
    }

    /// True for conditions a caller may simply retry: `Interrupted`,
    /// `WouldBlock`, and `TimedOut`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetError::TimedOut | NetError::Interrupted | NetError::WouldBlock
        )
    }

    /// The underlying OS errno, when this error wraps one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            NetError::Io(e) => e.raw_os_error(),
            NetError::Interrupted => Some(libc::EINTR),
            NetError::WouldBlock => Some(libc::EWOULDBLOCK),
            NetError::TimedOut => Some(libc::ETIMEDOUT),
            _ => None,
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for NetError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("NetError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

/// Maps OS errors onto the taxonomy: `EINTR` becomes `Interrupted`,
/// `EAGAIN`/`EWOULDBLOCK` become `WouldBlock`, `EPERM`/`EACCES` become
/// `Permission`, `ETIMEDOUT` becomes `TimedOut`, everything else stays `Io`
/// with the errno intact.
impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted => NetError::Interrupted,
            ErrorKind::WouldBlock => NetError::WouldBlock,
            ErrorKind::PermissionDenied => NetError::Permission(err.to_string()),
            ErrorKind::TimedOut => NetError::TimedOut,
            _ => NetError::Io(err),
        }
    }
}

impl From<nix::errno::Errno> for NetError {
    fn from(err: nix::errno::Errno) -> Self {
        NetError::from(std::io::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_returns_correct_variant_name() {
        assert_eq!(NetError::Invalid("x".into()).kind(), "Invalid");
        assert_eq!(NetError::RangeViolation("x".into()).kind(), "RangeViolation");
        assert_eq!(NetError::Overflow("x".into()).kind(), "Overflow");
        assert_eq!(NetError::TimedOut.kind(), "TimedOut");
        assert_eq!(NetError::Interrupted.kind(), "Interrupted");
        assert_eq!(NetError::WouldBlock.kind(), "WouldBlock");
        assert_eq!(NetError::Permission("x".into()).kind(), "Permission");
        assert_eq!(NetError::Busy("x".into()).kind(), "Busy");
        assert_eq!(NetError::Unexpected("x".into()).kind(), "Unexpected");
    }

    #[test]
    fn test_transient_errors_are_flagged() {
        assert!(NetError::TimedOut.is_transient());
        assert!(NetError::Interrupted.is_transient());
        assert!(NetError::WouldBlock.is_transient());
        assert!(!NetError::Invalid("x".into()).is_transient());
        assert!(!NetError::Io(std::io::Error::from_raw_os_error(libc::EIO)).is_transient());
    }

    #[test]
    fn test_error_serializes_as_kind_and_message() {
        let err = NetError::Permission("raw sockets need root".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "Permission");
        assert_eq!(json["message"], "permission denied: raw sockets need root");
    }

    #[test]
    fn test_from_io_error_maps_retryable_kinds() {
        let eintr = std::io::Error::from_raw_os_error(libc::EINTR);
        assert_eq!(NetError::from(eintr).kind(), "Interrupted");

        let eagain = std::io::Error::from_raw_os_error(libc::EAGAIN);
        assert_eq!(NetError::from(eagain).kind(), "WouldBlock");

        let eperm = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(NetError::from(eperm).kind(), "Permission");
    }

    #[test]
    fn test_from_io_error_preserves_errno() {
        let econnrefused = std::io::Error::from_raw_os_error(libc::ECONNREFUSED);
        let err = NetError::from(econnrefused);
        assert_eq!(err.kind(), "Io");
        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    }

    #[test]
    fn test_all_variants_serialize_with_two_fields() {
        let variants: Vec<NetError> = vec![
            NetError::Invalid("a".into()),
            NetError::RangeViolation("b".into()),
            NetError::Overflow("c".into()),
            NetError::TimedOut,
            NetError::Interrupted,
            NetError::WouldBlock,
            NetError::Permission("d".into()),
            NetError::Busy("e".into()),
            NetError::Unexpected("f".into()),
            NetError::Io(std::io::Error::from_raw_os_error(libc::EIO)),
        ];
        for err in variants {
            let json = serde_json::to_value(&err).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 2, "Expected exactly 2 fields for {err:?}");
            assert!(obj.contains_key("kind"));
            assert!(obj.contains_key("message"));
        }
    }
}
