use crate::foundation::core::{FrameRgba, PageIndex, Rect};
use crate::foundation::error::{InklayError, InklayResult};

/// External page-rasterization capability.
///
/// Given a template's backing document, implementations report each page's
/// drawable bounds in native units and rasterize a page at an arbitrary
/// scale. The compositing engine consumes this; it is not reimplemented
/// here. Hosts typically wrap a platform document renderer.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the backing document.
    fn page_count(&self) -> u32;

    /// A page's drawable bounds in native units.
    fn page_bounds(&self, page: PageIndex) -> InklayResult<Rect>;

    /// Rasterize a page at `scale` native-units-per-pixel⁻¹ into
    /// premultiplied RGBA8.
    fn rasterize(&self, page: PageIndex, scale: f64) -> InklayResult<FrameRgba>;
}

/// Deterministic checkerboard rasterizer for tests and demos.
///
/// Cells are anchored in native coordinates, so the same visual feature
/// lands at the same native position regardless of raster scale, which is
/// what compositing alignment tests need to sample against.
pub struct CheckerRasterizer {
    pages: u32,
    bounds: Rect,
    cell: f64,
}

impl CheckerRasterizer {
    /// A `pages`-page document with US-letter-like native bounds.
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            bounds: Rect::new(0.0, 0.0, 612.0, 792.0),
            cell: 36.0,
        }
    }

    /// Override the native page bounds.
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    fn check_page(&self, page: PageIndex) -> InklayResult<()> {
        if !page.in_range(self.pages) {
            return Err(InklayError::validation(format!(
                "page {page} out of range for a {}-page document",
                self.pages
            )));
        }
        Ok(())
    }
}

impl PageRasterizer for CheckerRasterizer {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_bounds(&self, page: PageIndex) -> InklayResult<Rect> {
        self.check_page(page)?;
        Ok(self.bounds)
    }

    fn rasterize(&self, page: PageIndex, scale: f64) -> InklayResult<FrameRgba> {
        self.check_page(page)?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(InklayError::validation("raster scale must be finite and > 0"));
        }
        let width = (self.bounds.width() * scale).round().max(1.0) as u32;
        let height = (self.bounds.height() * scale).round().max(1.0) as u32;
        let mut data = vec![0u8; (width as usize) * (height as usize) * 4];
        for y in 0..height {
            for x in 0..width {
                // Cell parity in native coordinates; pages alternate phase so
                // adjacent pages are visually distinct.
                let nx = (x as f64 + 0.5) / scale;
                let ny = (y as f64 + 0.5) / scale;
                let parity = ((nx / self.cell) as u64 + (ny / self.cell) as u64 + page.0 as u64) % 2;
                let v = if parity == 0 { 255 } else { 224 };
                let idx = ((y as usize) * (width as usize) + (x as usize)) * 4;
                data[idx] = v;
                data[idx + 1] = v;
                data[idx + 2] = v;
                data[idx + 3] = 255;
            }
        }
        Ok(FrameRgba {
            width,
            height,
            data,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;
