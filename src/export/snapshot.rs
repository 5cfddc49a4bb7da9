use crate::codec::stroke::{self, StrokeBlob};
use crate::foundation::core::{FrameRgba, PageIndex, PixelSize};
use crate::foundation::error::{InklayError, InklayResult};
use crate::foundation::ids::InstanceId;
use crate::model::store::DocumentStore;
use crate::render::composite::{Profile, composite_page};
use crate::render::raster::PageRasterizer;

/// Options controlling snapshot previews.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotOpts {
    /// Target preview size in pixels.
    pub size: PixelSize,
    /// Memory ceiling in bytes; host- and device-dependent, so configurable
    /// rather than fixed.
    pub max_bytes: u64,
}

impl Default for SnapshotOpts {
    fn default() -> Self {
        Self {
            size: PixelSize {
                width: 256,
                height: 256,
            },
            max_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Render a single-page preview at snapshot profile.
///
/// A missing instance, template, or page yields the placeholder image (not
/// an error): preview consumers always receive a displayable result. A
/// corrupt stored annotation is substituted with empty ink for display and
/// logged. [`InklayError::BudgetExceeded`] does surface, since the render
/// was never attempted.
pub fn render_snapshot(
    store: &dyn DocumentStore,
    rasterizer: &dyn PageRasterizer,
    instance: InstanceId,
    page: PageIndex,
    opts: &SnapshotOpts,
) -> InklayResult<FrameRgba> {
    let Some(inst) = store.instance(instance)? else {
        tracing::debug!(%instance, "snapshot of unknown instance, serving placeholder");
        return Ok(placeholder(opts.size));
    };
    let Some(template) = store.template(inst.template_id)? else {
        tracing::debug!(%instance, "snapshot with missing template, serving placeholder");
        return Ok(placeholder(opts.size));
    };
    if !page.in_range(template.page_count) || !page.in_range(rasterizer.page_count()) {
        tracing::debug!(%instance, %page, "snapshot of missing page, serving placeholder");
        return Ok(placeholder(opts.size));
    }

    let blob = match store.page_annotation(instance, page)? {
        Some(ann) if !ann.is_blank() => match stroke::load_blob(&ann.payload) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(%instance, %page, error = %e, "corrupt annotation, previewing without ink");
                Some(StrokeBlob::default())
            }
        },
        _ => None,
    };

    composite_page(
        rasterizer,
        page,
        blob.as_ref(),
        opts.size,
        Profile::Snapshot {
            max_bytes: opts.max_bytes,
        },
    )
}

/// Answer the widget/preview host contract: always a displayable image.
///
/// Any failure, including a budget rejection, degrades to the placeholder
/// and is logged.
pub fn snapshot_or_placeholder(
    store: &dyn DocumentStore,
    rasterizer: &dyn PageRasterizer,
    instance: InstanceId,
    page: PageIndex,
    opts: &SnapshotOpts,
) -> FrameRgba {
    match render_snapshot(store, rasterizer, instance, page, opts) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(%instance, %page, error = %e, "snapshot failed, serving placeholder");
            placeholder(opts.size)
        }
    }
}

/// The neutral placeholder served when no preview can be rendered.
pub fn placeholder(size: PixelSize) -> FrameRgba {
    FrameRgba::solid(size, [236, 236, 236, 255])
}

/// Encode a composed frame as PNG bytes for host surfaces.
pub fn encode_png(frame: &FrameRgba) -> InklayResult<Vec<u8>> {
    let straight = unpremultiply(&frame.data);
    let img = image::RgbaImage::from_raw(frame.width, frame.height, straight)
        .ok_or_else(|| InklayError::validation("frame buffer size mismatch"))?;
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| InklayError::Other(anyhow::Error::new(e)))?;
    Ok(out.into_inner())
}

fn unpremultiply(premul: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(premul.len());
    for px in premul.chunks_exact(4) {
        let a = px[3];
        if a == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        let un = |c: u8| -> u8 { ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8 };
        out.push(un(px[0]));
        out.push(un(px[1]));
        out.push(un(px[2]));
        out.push(a);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/export/snapshot.rs"]
mod tests;
