use crate::codec::stroke;
use crate::foundation::core::PageIndex;
use crate::foundation::error::{InklayError, InklayResult};
use crate::foundation::ids::InstanceId;
use crate::model::store::DocumentStore;
use crate::session::surface::{CaptureSurface, UndoScope};
use std::collections::HashMap;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

/// Options controlling [`EditorSession`] behavior.
#[derive(Clone, Debug)]
pub struct SessionOpts {
    /// Quiet period after the last [`EditorSession::mark_dirty`] before an
    /// autosave becomes due. Each call re-arms the timer, so a burst of
    /// edits produces exactly one save shortly after the burst ends.
    pub debounce: Duration,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
        }
    }
}

/// Observable session lifecycle state.
///
/// `Ready` and `Dirty` are the steady states; `Loading` and `Saving` are
/// transient. Closing a session always forces an outstanding `Dirty` through
/// `Saving` back to `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Backing document bytes are not available yet.
    Loading,
    /// No uncommitted changes.
    Ready,
    /// The capture surface holds changes not yet persisted.
    Dirty,
    /// A save is in flight.
    Saving,
}

/// Save counters, exposed for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Saves that committed to the store.
    pub saves_completed: u64,
    /// Saves that failed and left the session dirty.
    pub saves_failed: u64,
}

/// The editing session around one open [`crate::model::entities::Instance`].
///
/// Owns the current page, the dirty flag, the per-page undo scopes, and the
/// debounced autosave schedule. Interactive calls (`navigate_to`,
/// `mark_dirty`, `flush_now`, undo) are expected from one thread; the
/// debounce timer runs on a session-owned worker that only signals; the
/// owning thread drains the signal through [`EditorSession::poll_autosave`],
/// so session state is never touched off-thread.
pub struct EditorSession {
    store: Arc<dyn DocumentStore>,
    surface: Box<dyn CaptureSurface>,
    instance: InstanceId,
    page_count: u32,
    current_page: PageIndex,
    state: SessionState,
    opts: SessionOpts,
    timer: DebounceTimer,
    undo_scopes: HashMap<u32, Box<dyn UndoScope>>,
    can_undo: bool,
    can_redo: bool,
    stats: SessionStats,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("instance", &self.instance)
            .field("page_count", &self.page_count)
            .field("current_page", &self.current_page)
            .field("state", &self.state)
            .field("opts", &self.opts)
            .field("can_undo", &self.can_undo)
            .field("can_redo", &self.can_redo)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EditorSession {
    /// Open a session on an existing instance.
    ///
    /// The session is `Loading` until the instance and its template resolve;
    /// on success it starts `Ready` on the instance's last-viewed page.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        surface: Box<dyn CaptureSurface>,
        instance: InstanceId,
        opts: SessionOpts,
    ) -> InklayResult<Self> {
        let inst = store
            .instance(instance)?
            .ok_or_else(|| InklayError::validation(format!("unknown instance {instance}")))?;
        let template = store.template(inst.template_id)?.ok_or_else(|| {
            InklayError::storage(format!("instance {instance} references a missing template"))
        })?;

        let mut current_page = inst.last_viewed_page;
        if !current_page.in_range(template.page_count) {
            current_page = PageIndex(0);
        }

        Ok(Self {
            store,
            surface,
            instance,
            page_count: template.page_count,
            current_page,
            state: SessionState::Ready,
            timer: DebounceTimer::spawn(),
            opts,
            undo_scopes: HashMap::new(),
            can_undo: false,
            can_redo: false,
            stats: SessionStats::default(),
        })
    }

    /// The open instance's id.
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Page count of the backing template.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// The page currently being edited.
    pub fn current_page(&self) -> PageIndex {
        self.current_page
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether uncommitted changes exist.
    pub fn is_dirty(&self) -> bool {
        self.state == SessionState::Dirty
    }

    /// Save counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Switch to `page`.
    ///
    /// Rejects an out-of-range index (returns `false`, no state change).
    /// Otherwise flushes the outgoing page's pending edits, updates the
    /// current page, persists the new last-viewed index, swaps the active
    /// undo scope, and returns `true`. Never blocks on the debounce timer
    /// and never surfaces errors; failures are logged.
    pub fn navigate_to(&mut self, page: PageIndex) -> bool {
        if !page.in_range(self.page_count) {
            return false;
        }
        if self.state == SessionState::Dirty
            && let Err(e) = self.flush_now()
        {
            tracing::warn!(page = %self.current_page, error = %e, "flush on navigation failed");
        }
        self.current_page = page;
        if let Err(e) = self.store.set_last_viewed_page(self.instance, page) {
            tracing::warn!(%page, error = %e, "failed to persist last-viewed page");
        }
        self.refresh_undo_flags();
        true
    }

    /// Record that the capture surface changed; arms or re-arms the
    /// debounce timer.
    pub fn mark_dirty(&mut self) {
        self.state = SessionState::Dirty;
        self.timer.arm(self.opts.debounce);
    }

    /// Drain the debounce signal and run a due autosave.
    ///
    /// Must be called from the session's owning thread. Returns `true` when
    /// a save ran. A save failure leaves the session `Dirty` so the next
    /// debounce or explicit flush retries; it is never silently dropped.
    pub fn poll_autosave(&mut self) -> InklayResult<bool> {
        if !self.timer.take_due() || self.state != SessionState::Dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Cancel any pending debounce and save immediately.
    pub fn flush_now(&mut self) -> InklayResult<()> {
        self.timer.cancel();
        if self.state != SessionState::Dirty {
            return Ok(());
        }
        self.save()
    }

    /// Associate an external undo/redo scope with the current page.
    pub fn register_undo_scope(&mut self, scope: Box<dyn UndoScope>) {
        self.undo_scopes.insert(self.current_page.0, scope);
        self.refresh_undo_flags();
    }

    /// Undo one step on the current page's scope, if any.
    pub fn undo(&mut self) {
        if let Some(scope) = self.undo_scopes.get_mut(&self.current_page.0) {
            scope.undo();
        }
        self.refresh_undo_flags();
    }

    /// Redo one step on the current page's scope, if any.
    pub fn redo(&mut self) {
        if let Some(scope) = self.undo_scopes.get_mut(&self.current_page.0) {
            scope.redo();
        }
        self.refresh_undo_flags();
    }

    /// Whether the current page's scope can undo.
    pub fn can_undo(&self) -> bool {
        self.can_undo
    }

    /// Whether the current page's scope can redo.
    pub fn can_redo(&self) -> bool {
        self.can_redo
    }

    /// Close the session, forcing a final flush of outstanding changes.
    pub fn close(mut self) -> InklayResult<()> {
        if self.state == SessionState::Dirty || self.surface.has_changes() {
            self.state = SessionState::Dirty;
            self.flush_now()?;
        }
        Ok(())
    }

    fn save(&mut self) -> InklayResult<()> {
        self.state = SessionState::Saving;
        let blob = self.surface.current_blob().unwrap_or_default();
        let result = stroke::store_blob(&blob).and_then(|payload| {
            self.store
                .write_annotation(self.instance, self.current_page, payload)
        });
        match result {
            Ok(_) => {
                self.state = SessionState::Ready;
                self.stats.saves_completed += 1;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Dirty;
                self.stats.saves_failed += 1;
                Err(e)
            }
        }
    }

    fn refresh_undo_flags(&mut self) {
        let scope = self.undo_scopes.get(&self.current_page.0);
        self.can_undo = scope.is_some_and(|s| s.can_undo());
        self.can_redo = scope.is_some_and(|s| s.can_redo());
    }
}

enum TimerCmd {
    Arm { generation: u64, deadline: Instant },
    Cancel,
    Shutdown,
}

/// Session-scoped debounce timer.
///
/// The worker thread never touches session state: it answers `Arm`/`Cancel`
/// commands and reports expiry through a signal channel that the owning
/// thread drains. Each `arm` supersedes the previous one (generation
/// counter), so re-arming resets the deadline instead of stacking saves.
struct DebounceTimer {
    cmds: mpsc::Sender<TimerCmd>,
    fires: mpsc::Receiver<u64>,
    worker: Option<std::thread::JoinHandle<()>>,
    generation: u64,
}

impl DebounceTimer {
    fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<TimerCmd>();
        let (fire_tx, fire_rx) = mpsc::channel::<u64>();
        let worker = std::thread::spawn(move || run_timer(cmd_rx, fire_tx));
        Self {
            cmds: cmd_tx,
            fires: fire_rx,
            worker: Some(worker),
            generation: 0,
        }
    }

    fn arm(&mut self, interval: Duration) {
        self.generation += 1;
        let _ = self.cmds.send(TimerCmd::Arm {
            generation: self.generation,
            deadline: Instant::now() + interval,
        });
    }

    fn cancel(&mut self) {
        self.generation += 1;
        let _ = self.cmds.send(TimerCmd::Cancel);
    }

    /// Drain queued expiry signals; `true` when the current arm has fired.
    fn take_due(&mut self) -> bool {
        let mut due = false;
        while let Ok(generation) = self.fires.try_recv() {
            if generation == self.generation {
                due = true;
            }
        }
        due
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        let _ = self.cmds.send(TimerCmd::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_timer(cmds: mpsc::Receiver<TimerCmd>, fires: mpsc::Sender<u64>) {
    let mut armed: Option<(u64, Instant)> = None;
    loop {
        let cmd = match armed {
            Some((generation, deadline)) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match cmds.recv_timeout(wait) {
                    Ok(cmd) => cmd,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        armed = None;
                        if fires.send(generation).is_err() {
                            return;
                        }
                        continue;
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match cmds.recv() {
                Ok(cmd) => cmd,
                Err(_) => return,
            },
        };

        match cmd {
            TimerCmd::Arm {
                generation,
                deadline,
            } => armed = Some((generation, deadline)),
            TimerCmd::Cancel => armed = None,
            TimerCmd::Shutdown => return,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/editor.rs"]
mod tests;
