use crate::foundation::core::{FrameRgba, PageIndex, Rect};
use crate::foundation::error::{InklayError, InklayResult};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;

/// Document metadata stamped onto an export.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportMetadata {
    /// Document title, taken from the instance's display name.
    pub title: String,
    /// Optional author string supplied by the host.
    pub author: Option<String>,
    /// Optional subject, taken from the instance's notes when non-empty.
    pub subject: Option<String>,
    /// The instance's last modification time.
    pub modified_at: DateTime<Utc>,
}

/// Sink contract for consuming flattened pages in index order.
///
/// Ordering contract: `push_page` is called in strictly increasing
/// [`PageIndex`] order within one export. A sink lives on the thread that
/// runs the export.
pub trait PageSink {
    /// Called once before any pages are pushed.
    fn begin(&mut self, meta: Option<ExportMetadata>) -> InklayResult<()>;
    /// Push one flattened page; `bounds` is the page's native bounds.
    fn push_page(&mut self, page: PageIndex, frame: &FrameRgba, bounds: Rect) -> InklayResult<()>;
    /// Called once after the last page.
    fn end(&mut self) -> InklayResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    meta: Option<ExportMetadata>,
    pages: Vec<(PageIndex, FrameRgba)>,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata captured in `begin`, if any was stamped.
    pub fn metadata(&self) -> Option<&ExportMetadata> {
        self.meta.as_ref()
    }

    /// Borrow the captured pages, in push order.
    pub fn pages(&self) -> &[(PageIndex, FrameRgba)] {
        &self.pages
    }
}

impl PageSink for InMemorySink {
    fn begin(&mut self, meta: Option<ExportMetadata>) -> InklayResult<()> {
        self.meta = meta;
        self.pages.clear();
        Ok(())
    }

    fn push_page(&mut self, page: PageIndex, frame: &FrameRgba, _bounds: Rect) -> InklayResult<()> {
        self.pages.push((page, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> InklayResult<()> {
        Ok(())
    }
}

/// Options for [`PdfSink`].
#[derive(Clone, Debug)]
pub struct PdfSinkOpts {
    /// Directory holding the font files genpdf requires for a document.
    pub fonts_dir: PathBuf,
    /// Font family name within `fonts_dir`.
    pub font_family: String,
}

/// PDF document sink backed by `genpdf`.
///
/// Pages are flattened RGB images composed over white (PDF viewers expect
/// opaque pages) and handed to genpdf as PNG files. Each image's dpi is set
/// from its pixel size against the page's native bounds, so every page
/// fills its sheet exactly regardless of export resolution.
pub struct PdfSink<W: Write> {
    opts: PdfSinkOpts,
    writer: Option<W>,
    doc: Option<genpdf::Document>,
    // Page images live on disk until render; genpdf reads them lazily.
    page_files: Vec<tempfile::TempPath>,
    first_page: bool,
}

impl<W: Write> PdfSink<W> {
    /// Create a sink that renders the finished document into `writer`.
    pub fn new(writer: W, opts: PdfSinkOpts) -> Self {
        Self {
            opts,
            writer: Some(writer),
            doc: None,
            page_files: Vec::new(),
            first_page: true,
        }
    }
}

impl<W: Write> PageSink for PdfSink<W> {
    fn begin(&mut self, meta: Option<ExportMetadata>) -> InklayResult<()> {
        let family =
            genpdf::fonts::from_files(&self.opts.fonts_dir, &self.opts.font_family, None)
                .map_err(|e| {
                    InklayError::storage(format!(
                        "load font family '{}': {e}",
                        self.opts.font_family
                    ))
                })?;
        let mut doc = genpdf::Document::new(family);
        if let Some(meta) = meta {
            doc.set_title(meta.title);
        }
        self.doc = Some(doc);
        self.first_page = true;
        Ok(())
    }

    fn push_page(&mut self, page: PageIndex, frame: &FrameRgba, bounds: Rect) -> InklayResult<()> {
        let doc = self
            .doc
            .as_mut()
            .ok_or_else(|| InklayError::validation("push_page before begin"))?;

        if self.first_page {
            doc.set_paper_size(genpdf::Size::new(
                pt_to_mm(bounds.width()),
                pt_to_mm(bounds.height()),
            ));
            self.first_page = false;
        } else {
            doc.push(genpdf::elements::PageBreak::new());
        }

        let rgb = image::RgbImage::from_raw(frame.width, frame.height, premul_over_white(frame))
            .ok_or_else(|| {
                InklayError::validation(format!("page {page} frame buffer size mismatch"))
            })?;
        let file = tempfile::Builder::new()
            .prefix("inklay-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| InklayError::storage(format!("create page temp file: {e}")))?;
        rgb.save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| InklayError::Other(anyhow::Error::new(e)))?;

        let mut element = genpdf::elements::Image::from_path(file.path())
            .map_err(|e| InklayError::Other(anyhow::Error::new(e)))?;
        // Pixels per inch of page-native points, so the image spans the sheet.
        element.set_dpi(f64::from(frame.width) * 72.0 / bounds.width());
        doc.push(element);
        self.page_files.push(file.into_temp_path());
        Ok(())
    }

    fn end(&mut self) -> InklayResult<()> {
        let doc = self
            .doc
            .take()
            .ok_or_else(|| InklayError::validation("end before begin"))?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| InklayError::validation("sink already finished"))?;
        doc.render(writer)
            .map_err(|e| InklayError::Other(anyhow::Error::new(e)))?;
        self.page_files.clear();
        Ok(())
    }
}

fn pt_to_mm(pt: f64) -> f64 {
    pt * 25.4 / 72.0
}

/// Flatten a premultiplied RGBA frame onto a white background as RGB8.
fn premul_over_white(frame: &FrameRgba) -> Vec<u8> {
    let mut out = Vec::with_capacity((frame.width as usize) * (frame.height as usize) * 3);
    for px in frame.data.chunks_exact(4) {
        let inv_a = 255 - px[3];
        out.push(px[0].saturating_add(inv_a));
        out.push(px[1].saturating_add(inv_a));
        out.push(px[2].saturating_add(inv_a));
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/export/sink.rs"]
mod tests;
