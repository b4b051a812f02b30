//! Low-level primitives for building the resolution engine.

/// Byte-level utilities and encoding/decoding.
///
/// The wire codec every record decoder in the storage layer is built on.
pub mod bytes;
