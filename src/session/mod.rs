//! The editing session: page position, dirty tracking, debounced autosave,
//! and per-page undo delegation.

/// Session state machine and autosave scheduling.
pub mod editor;
/// Seams to the external annotation capture surface.
pub mod surface;
