use super::*;

fn seeded(store: &dyn DocumentStore) -> (Template, Instance) {
    let template = store
        .create_template("Character Sheet", b"%doc".to_vec(), 4)
        .unwrap();
    let instance = store.create_instance(template.id, "Mordai").unwrap();
    (template, instance)
}

#[test]
fn create_template_rejects_zero_pages() {
    let store = MemoryStore::new();
    assert!(store.create_template("empty", Vec::new(), 0).is_err());
}

#[test]
fn instance_creation_requires_a_known_template() {
    let store = MemoryStore::new();
    let err = store
        .create_instance(TemplateId::new(), "orphan")
        .unwrap_err();
    assert!(matches!(err, InklayError::Validation(_)));
}

#[test]
fn page_index_outside_template_fails_fast() {
    let store = MemoryStore::new();
    let (_, instance) = seeded(&store);
    let err = store
        .ensure_page_annotation(instance.id, PageIndex(4))
        .unwrap_err();
    assert!(matches!(err, InklayError::Validation(_)), "{err}");
    assert!(
        store
            .page_annotation(instance.id, PageIndex(9))
            .is_err()
    );
}

#[test]
fn ensure_page_annotation_is_idempotent() {
    let store = MemoryStore::new();
    let (_, instance) = seeded(&store);
    let a = store.ensure_page_annotation(instance.id, PageIndex(2)).unwrap();
    let b = store.ensure_page_annotation(instance.id, PageIndex(2)).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(store.annotated_pages(instance.id).unwrap(), vec![PageIndex(2)]);
}

#[test]
fn concurrent_first_use_converges_to_one_record() {
    let store = Arc::new(MemoryStore::new());
    let (_, instance) = seeded(store.as_ref());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = instance.id;
        handles.push(std::thread::spawn(move || {
            store.ensure_page_annotation(id, PageIndex(1)).unwrap().id
        }));
    }
    let ids: Vec<AnnotationId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers see one record");
    assert_eq!(store.annotated_pages(instance.id).unwrap().len(), 1);
}

#[test]
fn write_annotation_touches_instance_modified_time() {
    let store = MemoryStore::new();
    let (_, instance) = seeded(&store);
    let before = store.instance(instance.id).unwrap().unwrap().modified_at;
    std::thread::sleep(std::time::Duration::from_millis(5));
    store
        .write_annotation(instance.id, PageIndex(0), vec![0x00, 1, 2])
        .unwrap();
    let after = store.instance(instance.id).unwrap().unwrap().modified_at;
    assert!(after > before);
}

#[test]
fn last_viewed_page_is_not_an_edit() {
    let store = MemoryStore::new();
    let (_, instance) = seeded(&store);
    let before = store.instance(instance.id).unwrap().unwrap().modified_at;
    store.set_last_viewed_page(instance.id, PageIndex(3)).unwrap();
    let inst = store.instance(instance.id).unwrap().unwrap();
    assert_eq!(inst.last_viewed_page, PageIndex(3));
    assert_eq!(inst.modified_at, before);
}

#[test]
fn deleting_a_template_cascades() {
    let store = MemoryStore::new();
    let (template, instance) = seeded(&store);
    let other = store.create_instance(template.id, "Second").unwrap();
    store
        .write_annotation(instance.id, PageIndex(1), vec![0x00, 9])
        .unwrap();

    store.delete_template(template.id).unwrap();

    assert!(store.template(template.id).unwrap().is_none());
    assert!(store.instance(instance.id).unwrap().is_none());
    assert!(store.instance(other.id).unwrap().is_none());
    // Annotation lookups now fail validation since the instance is gone.
    assert!(store.page_annotation(instance.id, PageIndex(1)).is_err());
}

#[test]
fn deleting_an_instance_cascades_to_its_annotations_only() {
    let store = MemoryStore::new();
    let (template, instance) = seeded(&store);
    let keeper = store.create_instance(template.id, "Keeper").unwrap();
    store
        .write_annotation(instance.id, PageIndex(0), vec![0x00, 1])
        .unwrap();
    store
        .write_annotation(keeper.id, PageIndex(0), vec![0x00, 2])
        .unwrap();

    store.delete_instance(instance.id).unwrap();

    assert!(store.instance(instance.id).unwrap().is_none());
    assert_eq!(store.annotated_pages(keeper.id).unwrap(), vec![PageIndex(0)]);
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let template_id;
    let instance_id;
    {
        let store = FileStore::open(dir.path()).unwrap();
        let (template, instance) = seeded(&store);
        template_id = template.id;
        instance_id = instance.id;
        store.set_favorite(instance.id, true).unwrap();
        store.set_notes(instance.id, "wizard, level 5").unwrap();
        store
            .write_annotation(instance.id, PageIndex(2), vec![0x00, 7, 7, 7])
            .unwrap();
        store
            .set_template_thumbnail(template.id, vec![1, 2, 3])
            .unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    let template = store.template(template_id).unwrap().unwrap();
    assert_eq!(template.name, "Character Sheet");
    assert_eq!(template.page_count, 4);
    assert_eq!(template.bytes.as_slice(), b"%doc");
    assert_eq!(template.thumbnail.as_deref().map(Vec::as_slice), Some(&[1u8, 2, 3][..]));

    let instance = store.instance(instance_id).unwrap().unwrap();
    assert!(instance.favorite);
    assert_eq!(instance.notes, "wizard, level 5");

    let ann = store
        .page_annotation(instance_id, PageIndex(2))
        .unwrap()
        .unwrap();
    assert_eq!(ann.payload.as_slice(), &[0x00, 7, 7, 7]);
}

#[test]
fn file_store_delete_removes_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let (template, instance) = seeded(&store);
    store
        .write_annotation(instance.id, PageIndex(0), vec![0x00, 1])
        .unwrap();
    store.delete_template(template.id).unwrap();
    drop(store);

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.templates().unwrap().is_empty());
    assert!(store.instances().unwrap().is_empty());
}
