use super::*;
use crate::codec::stroke::Stroke;
use crate::export::sink::InMemorySink;
use crate::foundation::core::{BezPath, FrameRgba, Rect};
use crate::model::store::MemoryStore;
use crate::render::raster::CheckerRasterizer;
use std::time::Duration;

fn ink() -> StrokeBlob {
    let mut path = BezPath::new();
    path.move_to((100.0, 100.0));
    path.line_to((200.0, 180.0));
    StrokeBlob {
        strokes: vec![Stroke {
            path,
            width: 3.0,
            color: [0, 0, 160, 255],
        }],
    }
}

fn seeded(store: &dyn DocumentStore, pages: u32) -> InstanceId {
    let template = store
        .create_template("Sheet", b"%doc".to_vec(), pages)
        .unwrap();
    let instance = store.create_instance(template.id, "Mordai").unwrap();
    instance.id
}

fn write_ink(store: &dyn DocumentStore, instance: InstanceId, page: u32) {
    let payload = stroke::store_blob(&ink()).unwrap();
    store
        .write_annotation(instance, PageIndex(page), payload)
        .unwrap();
}

fn small_opts() -> ExportOpts {
    ExportOpts {
        // Keep test renders small; 18 dpi maps US letter to 153x198 px.
        dpi: 18.0,
        ..ExportOpts::default()
    }
}

#[test]
fn filters_to_annotated_pages_in_order() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 4);
    write_ink(store.as_ref(), instance, 2);
    write_ink(store.as_ref(), instance, 0);

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let stats = exporter
        .export_instance(
            &CheckerRasterizer::new(4),
            instance,
            &ExportOpts {
                only_annotated_pages: true,
                ..small_opts()
            },
            &mut sink,
        )
        .unwrap();

    assert_eq!(stats.pages_exported, 2);
    assert_eq!(stats.pages_skipped, 2);
    let pages: Vec<u32> = sink.pages().iter().map(|(p, _)| p.0).collect();
    assert_eq!(pages, vec![0, 2]);
}

#[test]
fn empty_instance_exports_zero_pages() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 4);

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let stats = exporter
        .export_instance(
            &CheckerRasterizer::new(4),
            instance,
            &ExportOpts {
                only_annotated_pages: true,
                ..small_opts()
            },
            &mut sink,
        )
        .unwrap();

    assert_eq!(stats.pages_exported, 0);
    assert!(sink.pages().is_empty(), "empty but valid output");
}

#[test]
fn without_filtering_every_page_is_exported() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 3);
    write_ink(store.as_ref(), instance, 1);

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let stats = exporter
        .export_instance(&CheckerRasterizer::new(3), instance, &small_opts(), &mut sink)
        .unwrap();
    assert_eq!(stats.pages_exported, 3);
}

#[test]
fn metadata_is_stamped_from_the_instance() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 1);
    store.set_notes(instance, "half-elf warlock").unwrap();

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    exporter
        .export_instance(&CheckerRasterizer::new(1), instance, &small_opts(), &mut sink)
        .unwrap();

    let meta = sink.metadata().expect("metadata stamped");
    assert_eq!(meta.title, "Mordai");
    assert_eq!(meta.subject.as_deref(), Some("half-elf warlock"));
}

#[test]
fn a_corrupt_annotation_aborts_and_names_the_page() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 3);
    write_ink(store.as_ref(), instance, 0);
    store
        .write_annotation(instance, PageIndex(1), vec![0x7f, 1, 2, 3])
        .unwrap();

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let err = exporter
        .export_instance(&CheckerRasterizer::new(3), instance, &small_opts(), &mut sink)
        .unwrap_err();
    match err {
        InklayError::ExportAborted { page, .. } => assert_eq!(page, 1),
        other => panic!("expected ExportAborted, got {other}"),
    }
}

#[test]
fn a_failing_page_render_aborts_the_export() {
    struct FailsOnPage {
        inner: CheckerRasterizer,
        fail_page: u32,
    }

    impl PageRasterizer for FailsOnPage {
        fn page_count(&self) -> u32 {
            self.inner.page_count()
        }

        fn page_bounds(&self, page: PageIndex) -> InklayResult<Rect> {
            self.inner.page_bounds(page)
        }

        fn rasterize(&self, page: PageIndex, scale: f64) -> InklayResult<FrameRgba> {
            if page.0 == self.fail_page {
                return Err(InklayError::storage("renderer crashed"));
            }
            self.inner.rasterize(page, scale)
        }
    }

    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 3);

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let err = exporter
        .export_instance(
            &FailsOnPage {
                inner: CheckerRasterizer::new(3),
                fail_page: 1,
            },
            instance,
            &small_opts(),
            &mut sink,
        )
        .unwrap_err();
    match err {
        InklayError::ExportAborted { page, .. } => assert_eq!(page, 1),
        other => panic!("expected ExportAborted, got {other}"),
    }
}

#[test]
fn a_canceled_token_stops_the_export_between_pages() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 4);

    let cancel = CancelToken::new();
    cancel.cancel();
    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let err = exporter
        .export_instance(
            &CheckerRasterizer::new(4),
            instance,
            &ExportOpts {
                cancel: Some(cancel),
                ..small_opts()
            },
            &mut sink,
        )
        .unwrap_err();
    assert!(matches!(err, InklayError::Canceled));
}

#[test]
fn an_expired_deadline_behaves_like_cancellation() {
    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 2);

    let exporter = Exporter::new(store);
    let mut sink = InMemorySink::new();
    let err = exporter
        .export_instance(
            &CheckerRasterizer::new(2),
            instance,
            &ExportOpts {
                deadline: Some(Instant::now() - Duration::from_secs(1)),
                ..small_opts()
            },
            &mut sink,
        )
        .unwrap_err();
    assert!(matches!(err, InklayError::Canceled));
}

#[test]
fn concurrent_exports_of_one_instance_are_rejected() {
    struct SlowRasterizer(CheckerRasterizer);

    impl PageRasterizer for SlowRasterizer {
        fn page_count(&self) -> u32 {
            self.0.page_count()
        }

        fn page_bounds(&self, page: PageIndex) -> InklayResult<Rect> {
            self.0.page_bounds(page)
        }

        fn rasterize(&self, page: PageIndex, scale: f64) -> InklayResult<FrameRgba> {
            std::thread::sleep(Duration::from_millis(150));
            self.0.rasterize(page, scale)
        }
    }

    let store = Arc::new(MemoryStore::new());
    let instance = seeded(store.as_ref(), 2);
    let exporter = Arc::new(Exporter::new(store));

    let background = {
        let exporter = exporter.clone();
        std::thread::spawn(move || {
            let mut sink = InMemorySink::new();
            exporter.export_instance(
                &SlowRasterizer(CheckerRasterizer::new(2)),
                instance,
                &small_opts(),
                &mut sink,
            )
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    let mut sink = InMemorySink::new();
    let err = exporter
        .export_instance(
            &CheckerRasterizer::new(2),
            instance,
            &small_opts(),
            &mut sink,
        )
        .unwrap_err();
    assert!(matches!(err, InklayError::Validation(_)), "{err}");

    background.join().unwrap().unwrap();
}
