//! Filesystem utilities for drover.
//!
//! Atomic writes keep feature records and transcripts from ever being observed
//! half-written.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;
