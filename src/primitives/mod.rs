//! Low-level primitives shared by the counts store.
//!
//! Includes byte utilities for the snapshot codec and the out-of-order sequence
//! that drives transaction visibility.

/// Byte-level utilities and encoding/decoding.
///
/// Big-endian writers and a checked read cursor used by the wire codecs.
pub mod bytes;

/// Concurrency primitives and synchronization.
///
/// Contiguous-watermark tracking for work that completes out of order.
pub mod concurrency;
