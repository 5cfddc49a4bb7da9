//! Stroke-blob encoding and storage packing.
//!
//! The stroke blob is produced by an external capture surface and is opaque
//! to every other component: the codec turns it into bytes and back, and
//! wraps those bytes in a tagged, opportunistically compressed storage form.

/// Tagged storage packing (compression) of encoded payloads.
pub mod pack;
/// Stroke-blob model and byte encoding.
pub mod stroke;
