use crate::foundation::core::PageIndex;
use crate::foundation::error::{InklayError, InklayResult};
use crate::foundation::ids::{AnnotationId, InstanceId, TemplateId};
use crate::model::entities::{Instance, PageAnnotation, Template};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// The storage seam of the document model.
///
/// One interface, interchangeable implementations selected at session start:
/// [`MemoryStore`] (ephemeral) and [`FileStore`] (write-through, local disk).
/// A remote-synced store is a host concern implementing the same trait.
///
/// All mutations are synchronous and transactional with respect to the
/// in-memory state: a cascade either fully completes or does not happen.
/// The store's internal locking is also the per-instance write serialization
/// point shared by session flushes and export metadata stamping.
pub trait DocumentStore: Send + Sync {
    /// Import a new template from raw paged-document bytes.
    fn create_template(&self, name: &str, bytes: Vec<u8>, page_count: u32)
    -> InklayResult<Template>;

    /// Look up a template by id.
    fn template(&self, id: TemplateId) -> InklayResult<Option<Template>>;

    /// All templates, in id order.
    fn templates(&self) -> InklayResult<Vec<Template>>;

    /// Change a template's display name.
    fn rename_template(&self, id: TemplateId, name: &str) -> InklayResult<()>;

    /// Attach or replace a template's thumbnail bytes.
    fn set_template_thumbnail(&self, id: TemplateId, thumbnail: Vec<u8>) -> InklayResult<()>;

    /// Delete a template, cascading to its instances and their annotations.
    fn delete_template(&self, id: TemplateId) -> InklayResult<()>;

    /// Create a fresh instance of a template.
    fn create_instance(&self, template: TemplateId, name: &str) -> InklayResult<Instance>;

    /// Look up an instance by id.
    fn instance(&self, id: InstanceId) -> InklayResult<Option<Instance>>;

    /// All instances, in id order.
    fn instances(&self) -> InklayResult<Vec<Instance>>;

    /// Change an instance's display name. Bumps the modification time.
    fn rename_instance(&self, id: InstanceId, name: &str) -> InklayResult<()>;

    /// Set the favorite flag. Bumps the modification time.
    fn set_favorite(&self, id: InstanceId, favorite: bool) -> InklayResult<()>;

    /// Replace the free-text notes. Bumps the modification time.
    fn set_notes(&self, id: InstanceId, notes: &str) -> InklayResult<()>;

    /// Record the page to resume on. Does not count as an edit.
    fn set_last_viewed_page(&self, id: InstanceId, page: PageIndex) -> InklayResult<()>;

    /// Delete an instance, cascading to its annotations.
    fn delete_instance(&self, id: InstanceId) -> InklayResult<()>;

    /// Look up the annotation for one page, if any exists.
    fn page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<Option<PageAnnotation>>;

    /// Look up or lazily create the annotation record for one page.
    ///
    /// Idempotent: repeated calls return the same record. Safe under
    /// concurrent first-use; the critical section covers only the
    /// `(instance, page)` lookup-or-create.
    fn ensure_page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<PageAnnotation>;

    /// Commit a packed stroke payload for one page.
    ///
    /// Creates the annotation on first commit, bumps both the annotation and
    /// the owning instance's modification time.
    fn write_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
        payload: Vec<u8>,
    ) -> InklayResult<PageAnnotation>;

    /// Pages of an instance that have an annotation record, in index order.
    fn annotated_pages(&self, instance: InstanceId) -> InklayResult<Vec<PageIndex>>;
}

#[derive(Default)]
struct Entities {
    templates: BTreeMap<TemplateId, Template>,
    instances: BTreeMap<InstanceId, Instance>,
}

type AnnotationMap = BTreeMap<(InstanceId, u32), PageAnnotation>;

/// In-memory arena store.
///
/// Entity tables and the annotation table sit behind separate locks so that
/// `ensure_page_annotation` racing a background export serializes on the
/// annotation table alone. Lock order is always entities, then annotations.
#[derive(Default)]
pub struct MemoryStore {
    entities: Mutex<Entities>,
    annotations: Mutex<AnnotationMap>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entities(&self) -> InklayResult<MutexGuard<'_, Entities>> {
        self.entities
            .lock()
            .map_err(|_| InklayError::storage("entity table lock poisoned"))
    }

    fn lock_annotations(&self) -> InklayResult<MutexGuard<'_, AnnotationMap>> {
        self.annotations
            .lock()
            .map_err(|_| InklayError::storage("annotation table lock poisoned"))
    }

    /// Resolve an instance and the page count of its template, failing fast
    /// on unknown ids or an out-of-range page.
    fn require_page(
        entities: &Entities,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<()> {
        let inst = entities
            .instances
            .get(&instance)
            .ok_or_else(|| InklayError::validation(format!("unknown instance {instance}")))?;
        let template = entities.templates.get(&inst.template_id).ok_or_else(|| {
            InklayError::storage(format!("instance {instance} references a missing template"))
        })?;
        if !page.in_range(template.page_count) {
            return Err(InklayError::validation(format!(
                "page {page} out of range for a {}-page template",
                template.page_count
            )));
        }
        Ok(())
    }

    fn remove_instance_annotations(annotations: &mut AnnotationMap, instance: InstanceId) {
        let pages: Vec<(InstanceId, u32)> = annotations
            .range((instance, 0)..=(instance, u32::MAX))
            .map(|(k, _)| *k)
            .collect();
        for key in pages {
            annotations.remove(&key);
        }
    }
}

impl DocumentStore for MemoryStore {
    fn create_template(
        &self,
        name: &str,
        bytes: Vec<u8>,
        page_count: u32,
    ) -> InklayResult<Template> {
        if page_count == 0 {
            return Err(InklayError::validation("template must have at least 1 page"));
        }
        let template = Template {
            id: TemplateId::new(),
            name: name.to_owned(),
            page_count,
            created_at: Utc::now(),
            bytes: Arc::new(bytes),
            thumbnail: None,
        };
        self.lock_entities()?
            .templates
            .insert(template.id, template.clone());
        Ok(template)
    }

    fn template(&self, id: TemplateId) -> InklayResult<Option<Template>> {
        Ok(self.lock_entities()?.templates.get(&id).cloned())
    }

    fn templates(&self) -> InklayResult<Vec<Template>> {
        Ok(self.lock_entities()?.templates.values().cloned().collect())
    }

    fn rename_template(&self, id: TemplateId, name: &str) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        let t = entities
            .templates
            .get_mut(&id)
            .ok_or_else(|| InklayError::validation(format!("unknown template {id}")))?;
        t.name = name.to_owned();
        Ok(())
    }

    fn set_template_thumbnail(&self, id: TemplateId, thumbnail: Vec<u8>) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        let t = entities
            .templates
            .get_mut(&id)
            .ok_or_else(|| InklayError::validation(format!("unknown template {id}")))?;
        t.thumbnail = Some(Arc::new(thumbnail));
        Ok(())
    }

    fn delete_template(&self, id: TemplateId) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        if entities.templates.remove(&id).is_none() {
            return Err(InklayError::validation(format!("unknown template {id}")));
        }
        let dependents: Vec<InstanceId> = entities
            .instances
            .values()
            .filter(|i| i.template_id == id)
            .map(|i| i.id)
            .collect();
        let mut annotations = self.lock_annotations()?;
        for instance in dependents {
            entities.instances.remove(&instance);
            Self::remove_instance_annotations(&mut annotations, instance);
        }
        Ok(())
    }

    fn create_instance(&self, template: TemplateId, name: &str) -> InklayResult<Instance> {
        let mut entities = self.lock_entities()?;
        if !entities.templates.contains_key(&template) {
            return Err(InklayError::validation(format!(
                "unknown template {template}"
            )));
        }
        let now = Utc::now();
        let instance = Instance {
            id: InstanceId::new(),
            template_id: template,
            name: name.to_owned(),
            created_at: now,
            modified_at: now,
            last_viewed_page: PageIndex(0),
            favorite: false,
            notes: String::new(),
        };
        entities.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    fn instance(&self, id: InstanceId) -> InklayResult<Option<Instance>> {
        Ok(self.lock_entities()?.instances.get(&id).cloned())
    }

    fn instances(&self) -> InklayResult<Vec<Instance>> {
        Ok(self.lock_entities()?.instances.values().cloned().collect())
    }

    fn rename_instance(&self, id: InstanceId, name: &str) -> InklayResult<()> {
        self.mutate_instance(id, |i| i.name = name.to_owned())
    }

    fn set_favorite(&self, id: InstanceId, favorite: bool) -> InklayResult<()> {
        self.mutate_instance(id, |i| i.favorite = favorite)
    }

    fn set_notes(&self, id: InstanceId, notes: &str) -> InklayResult<()> {
        self.mutate_instance(id, |i| i.notes = notes.to_owned())
    }

    fn set_last_viewed_page(&self, id: InstanceId, page: PageIndex) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        Self::require_page(&entities, id, page)?;
        let inst = entities
            .instances
            .get_mut(&id)
            .ok_or_else(|| InklayError::validation(format!("unknown instance {id}")))?;
        inst.last_viewed_page = page;
        Ok(())
    }

    fn delete_instance(&self, id: InstanceId) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        if entities.instances.remove(&id).is_none() {
            return Err(InklayError::validation(format!("unknown instance {id}")));
        }
        let mut annotations = self.lock_annotations()?;
        Self::remove_instance_annotations(&mut annotations, id);
        Ok(())
    }

    fn page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<Option<PageAnnotation>> {
        {
            let entities = self.lock_entities()?;
            Self::require_page(&entities, instance, page)?;
        }
        Ok(self.lock_annotations()?.get(&(instance, page.0)).cloned())
    }

    fn ensure_page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<PageAnnotation> {
        let entities = self.lock_entities()?;
        Self::require_page(&entities, instance, page)?;
        // Lookup-or-create is the whole critical section on the annotation
        // table; the entity lock is still held so the instance cannot be
        // deleted out from under the insert.
        let mut annotations = self.lock_annotations()?;
        let record = annotations
            .entry((instance, page.0))
            .or_insert_with(|| PageAnnotation {
                id: AnnotationId::new(),
                instance_id: instance,
                page,
                modified_at: Utc::now(),
                payload: Arc::new(Vec::new()),
            });
        Ok(record.clone())
    }

    fn write_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
        payload: Vec<u8>,
    ) -> InklayResult<PageAnnotation> {
        let mut entities = self.lock_entities()?;
        Self::require_page(&entities, instance, page)?;
        let now = Utc::now();
        let mut annotations = self.lock_annotations()?;
        let record = annotations
            .entry((instance, page.0))
            .or_insert_with(|| PageAnnotation {
                id: AnnotationId::new(),
                instance_id: instance,
                page,
                modified_at: now,
                payload: Arc::new(Vec::new()),
            });
        record.payload = Arc::new(payload);
        record.modified_at = now;
        let record = record.clone();
        if let Some(inst) = entities.instances.get_mut(&instance) {
            inst.modified_at = now;
        }
        Ok(record)
    }

    fn annotated_pages(&self, instance: InstanceId) -> InklayResult<Vec<PageIndex>> {
        Ok(self
            .lock_annotations()?
            .range((instance, 0)..=(instance, u32::MAX))
            .map(|((_, page), _)| PageIndex(*page))
            .collect())
    }
}

impl MemoryStore {
    fn mutate_instance(&self, id: InstanceId, f: impl FnOnce(&mut Instance)) -> InklayResult<()> {
        let mut entities = self.lock_entities()?;
        let inst = entities
            .instances
            .get_mut(&id)
            .ok_or_else(|| InklayError::validation(format!("unknown instance {id}")))?;
        f(inst);
        inst.modified_at = Utc::now();
        Ok(())
    }
}

/// File-backed write-through store.
///
/// State lives in an inner [`MemoryStore`]; every mutation is mirrored to
/// disk under the root directory with atomic tempfile-then-rename writes.
/// Layout: `templates/<id>.json|.doc|.thumb`, `instances/<id>.json`,
/// `annotations/<instance>/<page>.json|.ink`.
pub struct FileStore {
    root: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open (or initialize) a store rooted at `root`, loading existing state.
    pub fn open(root: impl Into<PathBuf>) -> InklayResult<Self> {
        let root = root.into();
        for sub in ["templates", "instances", "annotations"] {
            std::fs::create_dir_all(root.join(sub))
                .map_err(|e| InklayError::storage(format!("create store directory: {e}")))?;
        }
        let store = Self {
            root,
            inner: MemoryStore::new(),
        };
        store.load()?;
        Ok(store)
    }

    fn load(&self) -> InklayResult<()> {
        let mut entities = self.inner.lock_entities()?;
        for entry in read_dir(&self.root.join("templates"))? {
            let Some(path) = json_path(&entry) else {
                continue;
            };
            let mut template: Template = read_json(&path)?;
            template.bytes = Arc::new(read_bytes(&path.with_extension("doc"))?);
            let thumb = path.with_extension("thumb");
            if thumb.exists() {
                template.thumbnail = Some(Arc::new(read_bytes(&thumb)?));
            }
            entities.templates.insert(template.id, template);
        }
        for entry in read_dir(&self.root.join("instances"))? {
            let Some(path) = json_path(&entry) else {
                continue;
            };
            let instance: Instance = read_json(&path)?;
            entities.instances.insert(instance.id, instance);
        }
        let mut annotations = self.inner.lock_annotations()?;
        for dir in read_dir(&self.root.join("annotations"))? {
            if !dir.is_dir() {
                continue;
            }
            for entry in read_dir(&dir)? {
                let Some(path) = json_path(&entry) else {
                    continue;
                };
                let mut ann: PageAnnotation = read_json(&path)?;
                ann.payload = Arc::new(read_bytes(&path.with_extension("ink"))?);
                annotations.insert((ann.instance_id, ann.page.0), ann);
            }
        }
        Ok(())
    }

    fn template_path(&self, id: TemplateId) -> PathBuf {
        self.root.join("templates").join(format!("{id}.json"))
    }

    fn instance_path(&self, id: InstanceId) -> PathBuf {
        self.root.join("instances").join(format!("{id}.json"))
    }

    fn annotation_path(&self, instance: InstanceId, page: PageIndex) -> PathBuf {
        self.root
            .join("annotations")
            .join(instance.to_string())
            .join(format!("{page}.json"))
    }

    fn persist_template(&self, template: &Template) -> InklayResult<()> {
        let path = self.template_path(template.id);
        let json = serde_json::to_vec_pretty(template)
            .map_err(|e| InklayError::storage(format!("serialize template: {e}")))?;
        write_atomic(&path, &json)?;
        write_atomic(&path.with_extension("doc"), &template.bytes)?;
        if let Some(thumb) = &template.thumbnail {
            write_atomic(&path.with_extension("thumb"), thumb)?;
        }
        Ok(())
    }

    fn persist_instance(&self, instance: &Instance) -> InklayResult<()> {
        let json = serde_json::to_vec_pretty(instance)
            .map_err(|e| InklayError::storage(format!("serialize instance: {e}")))?;
        write_atomic(&self.instance_path(instance.id), &json)
    }

    fn persist_annotation(&self, ann: &PageAnnotation) -> InklayResult<()> {
        let path = self.annotation_path(ann.instance_id, ann.page);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| InklayError::storage(format!("create annotation dir: {e}")))?;
        }
        let json = serde_json::to_vec_pretty(ann)
            .map_err(|e| InklayError::storage(format!("serialize annotation: {e}")))?;
        write_atomic(&path, &json)?;
        write_atomic(&path.with_extension("ink"), &ann.payload)
    }

    fn refreshed_instance(&self, id: InstanceId) -> InklayResult<Instance> {
        self.inner
            .instance(id)?
            .ok_or_else(|| InklayError::storage(format!("instance {id} vanished during write")))
    }
}

impl DocumentStore for FileStore {
    fn create_template(
        &self,
        name: &str,
        bytes: Vec<u8>,
        page_count: u32,
    ) -> InklayResult<Template> {
        let template = self.inner.create_template(name, bytes, page_count)?;
        self.persist_template(&template)?;
        Ok(template)
    }

    fn template(&self, id: TemplateId) -> InklayResult<Option<Template>> {
        self.inner.template(id)
    }

    fn templates(&self) -> InklayResult<Vec<Template>> {
        self.inner.templates()
    }

    fn rename_template(&self, id: TemplateId, name: &str) -> InklayResult<()> {
        self.inner.rename_template(id, name)?;
        if let Some(t) = self.inner.template(id)? {
            self.persist_template(&t)?;
        }
        Ok(())
    }

    fn set_template_thumbnail(&self, id: TemplateId, thumbnail: Vec<u8>) -> InklayResult<()> {
        self.inner.set_template_thumbnail(id, thumbnail)?;
        if let Some(t) = self.inner.template(id)? {
            self.persist_template(&t)?;
        }
        Ok(())
    }

    fn delete_template(&self, id: TemplateId) -> InklayResult<()> {
        let dependents: Vec<InstanceId> = self
            .inner
            .instances()?
            .into_iter()
            .filter(|i| i.template_id == id)
            .map(|i| i.id)
            .collect();
        self.inner.delete_template(id)?;
        let path = self.template_path(id);
        for p in [
            path.clone(),
            path.with_extension("doc"),
            path.with_extension("thumb"),
        ] {
            remove_if_present(&p)?;
        }
        for instance in dependents {
            remove_if_present(&self.instance_path(instance))?;
            remove_tree_if_present(&self.root.join("annotations").join(instance.to_string()))?;
        }
        Ok(())
    }

    fn create_instance(&self, template: TemplateId, name: &str) -> InklayResult<Instance> {
        let instance = self.inner.create_instance(template, name)?;
        self.persist_instance(&instance)?;
        Ok(instance)
    }

    fn instance(&self, id: InstanceId) -> InklayResult<Option<Instance>> {
        self.inner.instance(id)
    }

    fn instances(&self) -> InklayResult<Vec<Instance>> {
        self.inner.instances()
    }

    fn rename_instance(&self, id: InstanceId, name: &str) -> InklayResult<()> {
        self.inner.rename_instance(id, name)?;
        self.persist_instance(&self.refreshed_instance(id)?)
    }

    fn set_favorite(&self, id: InstanceId, favorite: bool) -> InklayResult<()> {
        self.inner.set_favorite(id, favorite)?;
        self.persist_instance(&self.refreshed_instance(id)?)
    }

    fn set_notes(&self, id: InstanceId, notes: &str) -> InklayResult<()> {
        self.inner.set_notes(id, notes)?;
        self.persist_instance(&self.refreshed_instance(id)?)
    }

    fn set_last_viewed_page(&self, id: InstanceId, page: PageIndex) -> InklayResult<()> {
        self.inner.set_last_viewed_page(id, page)?;
        self.persist_instance(&self.refreshed_instance(id)?)
    }

    fn delete_instance(&self, id: InstanceId) -> InklayResult<()> {
        self.inner.delete_instance(id)?;
        remove_if_present(&self.instance_path(id))?;
        remove_tree_if_present(&self.root.join("annotations").join(id.to_string()))
    }

    fn page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<Option<PageAnnotation>> {
        self.inner.page_annotation(instance, page)
    }

    fn ensure_page_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
    ) -> InklayResult<PageAnnotation> {
        let ann = self.inner.ensure_page_annotation(instance, page)?;
        self.persist_annotation(&ann)?;
        Ok(ann)
    }

    fn write_annotation(
        &self,
        instance: InstanceId,
        page: PageIndex,
        payload: Vec<u8>,
    ) -> InklayResult<PageAnnotation> {
        let ann = self.inner.write_annotation(instance, page, payload)?;
        self.persist_annotation(&ann)?;
        self.persist_instance(&self.refreshed_instance(instance)?)?;
        Ok(ann)
    }

    fn annotated_pages(&self, instance: InstanceId) -> InklayResult<Vec<PageIndex>> {
        self.inner.annotated_pages(instance)
    }
}

fn read_dir(path: &Path) -> InklayResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(path)
        .map_err(|e| InklayError::storage(format!("read '{}': {e}", path.display())))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| InklayError::storage(format!("read '{}': {e}", path.display())))?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

fn json_path(path: &Path) -> Option<PathBuf> {
    (path.extension().is_some_and(|e| e == "json")).then(|| path.to_path_buf())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> InklayResult<T> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| InklayError::storage(format!("parse '{}': {e}", path.display())))
}

fn read_bytes(path: &Path) -> InklayResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| InklayError::storage(format!("read '{}': {e}", path.display())))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> InklayResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| InklayError::storage(format!("'{}' has no parent dir", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| InklayError::storage(format!("create temp file: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| InklayError::storage(format!("write '{}': {e}", path.display())))?;
    tmp.persist(path)
        .map_err(|e| InklayError::storage(format!("persist '{}': {e}", path.display())))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> InklayResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InklayError::storage(format!(
            "remove '{}': {e}",
            path.display()
        ))),
    }
}

fn remove_tree_if_present(path: &Path) -> InklayResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InklayError::storage(format!(
            "remove '{}': {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/store.rs"]
mod tests;
