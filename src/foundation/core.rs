use crate::foundation::error::{InklayError, InklayResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Zero-based page index within a template's page range.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PageIndex(pub u32);

impl PageIndex {
    /// Return `true` when this index addresses a page of a `page_count`-page
    /// document.
    pub fn in_range(self, page_count: u32) -> bool {
        self.0 < page_count
    }
}

impl std::fmt::Display for PageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output raster dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Create a validated size with non-zero dimensions.
    pub fn new(width: u32, height: u32) -> InklayResult<Self> {
        if width == 0 || height == 0 {
            return Err(InklayError::validation(
                "PixelSize dimensions must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    /// Bytes required for one RGBA8 surface of this size.
    pub fn rgba8_byte_len(self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

/// A composed page as RGBA8 pixels.
///
/// Pixel data is **premultiplied alpha**, tightly packed, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl FrameRgba {
    /// Create a frame filled with a single straight-alpha RGBA8 color.
    pub fn solid(size: PixelSize, rgba: [u8; 4]) -> Self {
        let premul = premul_rgba8(rgba);
        let px = (size.width as usize) * (size.height as usize);
        let mut data = Vec::with_capacity(px * 4);
        for _ in 0..px {
            data.extend_from_slice(&premul);
        }
        Self {
            width: size.width,
            height: size.height,
            data,
        }
    }

    /// Dimensions as a [`PixelSize`].
    pub fn size(&self) -> PixelSize {
        PixelSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Convert straight-alpha RGBA8 into premultiplied RGBA8.
pub(crate) fn premul_rgba8(rgba: [u8; 4]) -> [u8; 4] {
    let [r, g, b, a] = rgba;
    let a16 = u16::from(a);
    let premul = |c: u8| -> u8 { (((u16::from(c) * a16) + 127) / 255) as u8 };
    [premul(r), premul(g), premul(b), a]
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
