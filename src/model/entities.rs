use crate::foundation::core::PageIndex;
use crate::foundation::ids::{AnnotationId, InstanceId, TemplateId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A reusable paged base document shared by many [`Instance`]s.
///
/// Immutable after creation except for the display name and thumbnail.
/// Deleting a template cascades to its instances and their annotations.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Template {
    /// Stable identifier.
    pub id: TemplateId,
    /// Display name, mutable after creation.
    pub name: String,
    /// Number of pages in the backing document.
    pub page_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Raw paged document bytes. Persisted out-of-band by file-backed stores.
    #[serde(skip)]
    pub bytes: Arc<Vec<u8>>,
    /// Optional thumbnail image bytes. Persisted out-of-band.
    #[serde(skip)]
    pub thumbnail: Option<Arc<Vec<u8>>>,
}

/// One user's filled-in copy of a [`Template`].
///
/// Holds a weak back-reference to its template: a stored id plus a lookup,
/// which never extends the template's lifetime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Instance {
    /// Stable identifier.
    pub id: InstanceId,
    /// Owning template's id.
    pub template_id: TemplateId,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time, bumped on every edit.
    pub modified_at: DateTime<Utc>,
    /// Page to resume on when the instance is reopened.
    pub last_viewed_page: PageIndex,
    /// Favorite flag for library surfaces.
    pub favorite: bool,
    /// Free-text user notes.
    pub notes: String,
}

/// The ink for exactly one page of exactly one [`Instance`].
///
/// Created lazily the first time a page receives ink; at most one exists per
/// `(instance, page)` pair. The payload is the packed stroke blob produced by
/// [`crate::codec::stroke::store_blob`], leading tag byte included.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageAnnotation {
    /// Stable identifier.
    pub id: AnnotationId,
    /// Owning instance's id.
    pub instance_id: InstanceId,
    /// Zero-based page index, unique within the instance.
    pub page: PageIndex,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Packed stroke-blob bytes. Persisted out-of-band by file-backed stores.
    #[serde(skip)]
    pub payload: Arc<Vec<u8>>,
}

impl PageAnnotation {
    /// Return `true` when no stroke payload has been committed yet.
    pub fn is_blank(&self) -> bool {
        self.payload.is_empty()
    }
}
