use super::*;
use crate::foundation::core::PixelSize;

fn frame() -> FrameRgba {
    FrameRgba::solid(PixelSize::new(4, 4).unwrap(), [10, 20, 30, 255])
}

#[test]
fn in_memory_sink_captures_pages_in_order() {
    let mut sink = InMemorySink::new();
    let meta = ExportMetadata {
        title: "Mordai".to_owned(),
        author: None,
        subject: Some("wizard".to_owned()),
        modified_at: Utc::now(),
    };
    sink.begin(Some(meta.clone())).unwrap();
    let bounds = Rect::new(0.0, 0.0, 612.0, 792.0);
    sink.push_page(PageIndex(0), &frame(), bounds).unwrap();
    sink.push_page(PageIndex(2), &frame(), bounds).unwrap();
    sink.end().unwrap();

    assert_eq!(sink.metadata(), Some(&meta));
    let pages: Vec<u32> = sink.pages().iter().map(|(p, _)| p.0).collect();
    assert_eq!(pages, vec![0, 2]);
}

#[test]
fn in_memory_sink_resets_on_begin() {
    let mut sink = InMemorySink::new();
    sink.begin(None).unwrap();
    sink.push_page(PageIndex(0), &frame(), Rect::new(0.0, 0.0, 1.0, 1.0))
        .unwrap();
    sink.begin(None).unwrap();
    assert!(sink.pages().is_empty());
    assert!(sink.metadata().is_none());
}

#[test]
fn pdf_sink_reports_missing_fonts() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = PdfSink::new(
        Vec::new(),
        PdfSinkOpts {
            fonts_dir: dir.path().join("no-such-fonts"),
            font_family: "LiberationSans".to_owned(),
        },
    );
    let err = sink.begin(None).unwrap_err();
    assert!(matches!(err, InklayError::Storage(_)), "{err}");
}

#[test]
fn pushing_before_begin_is_a_contract_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = PdfSink::new(
        Vec::new(),
        PdfSinkOpts {
            fonts_dir: dir.path().to_path_buf(),
            font_family: "LiberationSans".to_owned(),
        },
    );
    let err = sink
        .push_page(PageIndex(0), &frame(), Rect::new(0.0, 0.0, 10.0, 10.0))
        .unwrap_err();
    assert!(matches!(err, InklayError::Validation(_)));
}
