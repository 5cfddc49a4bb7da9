use crate::codec::stroke::StrokeBlob;

/// The external annotation capture surface, as consumed by the session.
///
/// The session never inspects stroke contents; it only pulls the current
/// blob when committing a save and asks whether anything changed.
pub trait CaptureSurface: Send {
    /// The surface's current ink for the active page, `None` when blank.
    fn current_blob(&self) -> Option<StrokeBlob>;

    /// Whether the surface holds changes not yet committed to storage.
    fn has_changes(&self) -> bool;
}

/// An external per-page undo/redo capability, opaque to the session.
///
/// `can_undo`/`can_redo` are re-queried after every delegation, so
/// implementations may change their answers as history is consumed.
pub trait UndoScope: Send {
    /// Undo one step.
    fn undo(&mut self);
    /// Redo one step.
    fn redo(&mut self);
    /// Whether an undo step is available.
    fn can_undo(&self) -> bool;
    /// Whether a redo step is available.
    fn can_redo(&self) -> bool;
}

/// Scripted capture surface for tests and demos.
///
/// Holds a blob behind a mutex so tests can mutate it mid-session.
#[derive(Default)]
pub struct ScriptedSurface {
    state: std::sync::Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    blob: Option<StrokeBlob>,
    changed: bool,
}

impl ScriptedSurface {
    /// Create a blank surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the surface's ink and mark it changed.
    pub fn set_blob(&self, blob: StrokeBlob) {
        let mut state = self.lock();
        state.blob = Some(blob);
        state.changed = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CaptureSurface for ScriptedSurface {
    fn current_blob(&self) -> Option<StrokeBlob> {
        self.lock().blob.clone()
    }

    fn has_changes(&self) -> bool {
        self.lock().changed
    }
}
