use crate::codec::stroke::{self, StrokeBlob};
use crate::export::sink::{ExportMetadata, PageSink};
use crate::foundation::core::{PageIndex, PixelSize};
use crate::foundation::error::{InklayError, InklayResult};
use crate::foundation::ids::InstanceId;
use crate::model::store::DocumentStore;
use crate::render::composite::{Profile, composite_page};
use crate::render::raster::PageRasterizer;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cooperative cancellation handle, checked between pages.
///
/// Cancellation latency is bounded by one page's render time.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-canceled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options controlling a whole-instance export.
#[derive(Clone, Debug)]
pub struct ExportOpts {
    /// Skip pages with no annotation or an empty decoded stroke blob.
    pub only_annotated_pages: bool,
    /// Stamp document metadata from the instance onto the output.
    pub include_metadata: bool,
    /// Export resolution in dots per inch of page-native points.
    pub dpi: f64,
    /// Optional cooperative cancellation handle.
    pub cancel: Option<CancelToken>,
    /// Optional deadline; expiry behaves identically to cancellation.
    pub deadline: Option<Instant>,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            only_annotated_pages: false,
            include_metadata: true,
            dpi: 300.0,
            cancel: None,
            deadline: None,
        }
    }
}

/// Page counters for a completed export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Pages composited and pushed to the sink.
    pub pages_exported: u64,
    /// Pages skipped by the annotated-pages filter.
    pub pages_skipped: u64,
}

/// Whole-instance export orchestration.
///
/// At most one export runs per instance at a time; a second concurrent
/// request for the same instance is rejected, never interleaved. Different
/// instances may export concurrently.
pub struct Exporter {
    store: Arc<dyn DocumentStore>,
    active: Mutex<HashSet<InstanceId>>,
}

impl Exporter {
    /// Create an exporter over a store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Flatten every included page of `instance` into `sink`, in index order.
    ///
    /// Any single page failure aborts the whole export, so partial documents
    /// with silently blank pages are never produced; the error names the
    /// failing page.
    pub fn export_instance(
        &self,
        rasterizer: &dyn PageRasterizer,
        instance: InstanceId,
        opts: &ExportOpts,
        sink: &mut dyn PageSink,
    ) -> InklayResult<ExportStats> {
        let _guard = self.acquire(instance)?;

        let inst = self
            .store
            .instance(instance)?
            .ok_or_else(|| InklayError::validation(format!("unknown instance {instance}")))?;
        let template = self.store.template(inst.template_id)?.ok_or_else(|| {
            InklayError::storage(format!("instance {instance} references a missing template"))
        })?;
        if rasterizer.page_count() < template.page_count {
            return Err(InklayError::validation(format!(
                "rasterizer covers {} pages but the template has {}",
                rasterizer.page_count(),
                template.page_count
            )));
        }
        if !(opts.dpi.is_finite() && opts.dpi > 0.0) {
            return Err(InklayError::validation("export dpi must be finite and > 0"));
        }

        let meta = opts.include_metadata.then(|| ExportMetadata {
            title: inst.name.clone(),
            author: None,
            subject: (!inst.notes.is_empty()).then(|| inst.notes.clone()),
            modified_at: inst.modified_at,
        });
        sink.begin(meta)?;

        let mut stats = ExportStats::default();
        for index in 0..template.page_count {
            check_interrupt(opts)?;
            let page = PageIndex(index);

            let blob = self
                .decoded_annotation(instance, page)
                .map_err(|e| abort_at(page, e))?;
            if opts.only_annotated_pages && blob.as_ref().is_none_or(StrokeBlob::is_empty) {
                stats.pages_skipped += 1;
                continue;
            }

            let bounds = rasterizer.page_bounds(page).map_err(|e| abort_at(page, e))?;
            let target = PixelSize::new(
                (bounds.width() * opts.dpi / 72.0).round().max(1.0) as u32,
                (bounds.height() * opts.dpi / 72.0).round().max(1.0) as u32,
            )
            .map_err(|e| abort_at(page, e))?;

            let frame = composite_page(rasterizer, page, blob.as_ref(), target, Profile::Export)
                .map_err(|e| abort_at(page, e))?;
            sink.push_page(page, &frame, bounds)
                .map_err(|e| abort_at(page, e))?;
            stats.pages_exported += 1;
        }

        sink.end()?;
        tracing::debug!(
            %instance,
            exported = stats.pages_exported,
            skipped = stats.pages_skipped,
            "export finished"
        );
        Ok(stats)
    }

    /// Decode a page's stored annotation, if one exists with a payload.
    ///
    /// Decode failures abort the export: substituting blank ink into a
    /// shareable document would silently lose data.
    fn decoded_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<Option<StrokeBlob>> {
        match self.store.page_annotation(instance, page)? {
            Some(ann) if !ann.is_blank() => Ok(Some(stroke::load_blob(&ann.payload)?)),
            _ => Ok(None),
        }
    }

    fn acquire(&self, instance: InstanceId) -> InklayResult<ExportGuard<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| InklayError::storage("export registry lock poisoned"))?;
        if !active.insert(instance) {
            return Err(InklayError::validation(format!(
                "an export is already running for instance {instance}"
            )));
        }
        Ok(ExportGuard {
            exporter: self,
            instance,
        })
    }
}

/// Releases the per-instance exclusivity slot, panic-safe.
struct ExportGuard<'a> {
    exporter: &'a Exporter,
    instance: InstanceId,
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.exporter.active.lock() {
            active.remove(&self.instance);
        }
    }
}

fn check_interrupt(opts: &ExportOpts) -> InklayResult<()> {
    if opts.cancel.as_ref().is_some_and(CancelToken::is_canceled) {
        return Err(InklayError::Canceled);
    }
    if opts.deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(InklayError::Canceled);
    }
    Ok(())
}

fn abort_at(page: PageIndex, e: InklayError) -> InklayError {
    match e {
        InklayError::Canceled => InklayError::Canceled,
        other => InklayError::export_aborted(page.0, other.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/document.rs"]
mod tests;
