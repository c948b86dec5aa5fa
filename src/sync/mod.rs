//! In-process synchronization primitives.

pub mod readerwriter;

pub use readerwriter::{ReadGuard, ReaderWriter, WriteGuard, FOREVER, POLL};
