//! Inklay overlays freehand vector ink on paged documents.
//!
//! A reusable [`Template`](model::entities::Template) (a character sheet, a
//! form) is instantiated per user; ink is captured per page by an external
//! surface, persisted as opaque stroke blobs, and flattened back over the
//! page background on the way out. The public API is session-oriented:
//!
//! - Open a [`DocumentStore`] and create or look up an `Instance`
//! - Run an [`EditorSession`] around it (navigation, dirty tracking,
//!   debounced autosave, per-page undo delegation)
//! - Flatten with [`Exporter`] into a [`PageSink`], or pull budgeted
//!   previews through [`export::snapshot`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Stroke-blob codec and storage packing.
pub mod codec;
/// Export, archive, and preview services.
pub mod export;
mod foundation;
/// Persisted document model and storage seam.
pub mod model;
/// Compositing engine and rasterization seam.
pub mod render;
/// Editing session state machine.
pub mod session;

pub use crate::foundation::core::{Affine, BezPath, FrameRgba, PageIndex, PixelSize, Point, Rect};
pub use crate::foundation::error::{InklayError, InklayResult};
pub use crate::foundation::ids::{AnnotationId, InstanceId, TemplateId};

pub use crate::codec::stroke::{Stroke, StrokeBlob};
pub use crate::export::document::{CancelToken, ExportOpts, ExportStats, Exporter};
pub use crate::export::sink::{ExportMetadata, InMemorySink, PageSink, PdfSink, PdfSinkOpts};
pub use crate::export::snapshot::SnapshotOpts;
pub use crate::model::store::{DocumentStore, FileStore, MemoryStore};
pub use crate::render::composite::Profile;
pub use crate::render::raster::PageRasterizer;
pub use crate::session::editor::{EditorSession, SessionOpts, SessionState, SessionStats};
pub use crate::session::surface::{CaptureSurface, UndoScope};
