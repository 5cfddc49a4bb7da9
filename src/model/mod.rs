//! Persisted document model: templates, instances, per-page annotations.
//!
//! Relationships are arena-style: entities refer to each other through
//! stable ids plus lookups, never through lifetime-extending pointers.
//! Cascade deletes are explicit store operations.

/// Deep-link resolution for host navigation layers.
pub mod deeplink;
/// Entity definitions.
pub mod entities;
/// The storage seam and its built-in implementations.
pub mod store;
