use crate::codec::stroke::StrokeBlob;
use crate::foundation::core::{Affine, FrameRgba, PageIndex, PixelSize, Rect};
use crate::foundation::error::{InklayError, InklayResult};
use crate::render::raster::PageRasterizer;
use std::sync::Arc;

/// Compositing call profile.
///
/// Both profiles run the same algorithm; they differ in the resource
/// contract. `Export` targets near-native fidelity with no ceiling beyond
/// device limits. `Snapshot` targets small previews and pre-checks the
/// estimated memory cost against a configurable ceiling, failing fast with
/// [`InklayError::BudgetExceeded`] instead of attempting the render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// High-fidelity export rendering.
    Export,
    /// Budgeted preview rendering.
    Snapshot {
        /// Memory ceiling in bytes for the render's live surfaces.
        max_bytes: u64,
    },
}

/// Estimated peak surface memory for a composite at `target`.
///
/// Two RGBA8 surfaces are live at peak: the compose target and the scaled
/// background raster (which the fit transform keeps at or under target
/// size).
pub fn estimated_cost_bytes(target: PixelSize) -> u64 {
    target.rgba8_byte_len().saturating_mul(2)
}

/// The transform mapping page-native coordinates onto a `target` raster,
/// preserving aspect ratio and centering the letterbox.
///
/// `scaled` is the pixel size the background occupies inside the target.
pub(crate) struct FitTransform {
    pub(crate) to_target: Affine,
    pub(crate) offset: (f64, f64),
}

pub(crate) fn fit_transform(bounds: Rect, target: PixelSize, scaled: (u32, u32)) -> FitTransform {
    let scale = (f64::from(target.width) / bounds.width())
        .min(f64::from(target.height) / bounds.height());
    let ox = (f64::from(target.width) - f64::from(scaled.0)) / 2.0;
    let oy = (f64::from(target.height) - f64::from(scaled.1)) / 2.0;
    let to_target = Affine::translate((ox, oy))
        * Affine::scale(scale)
        * Affine::translate((-bounds.x0, -bounds.y0));
    FitTransform {
        to_target,
        offset: (ox, oy),
    }
}

/// Compose one page's background and optional ink into a flattened raster.
///
/// The background is rasterized at the fit scale and the strokes are drawn
/// through the same page-native-to-target transform, so ink always lands on
/// the same visual feature of the background regardless of the requested
/// resolution. Letterbox margins are left transparent.
pub fn composite_page(
    rasterizer: &dyn PageRasterizer,
    page: PageIndex,
    strokes: Option<&StrokeBlob>,
    target: PixelSize,
    profile: Profile,
) -> InklayResult<FrameRgba> {
    let (width, height) = target_u16(target)?;
    if let Profile::Snapshot { max_bytes } = profile {
        let estimated_bytes = estimated_cost_bytes(target);
        if estimated_bytes > max_bytes {
            return Err(InklayError::BudgetExceeded {
                estimated_bytes,
                max_bytes,
            });
        }
    }

    let bounds = rasterizer.page_bounds(page)?;
    if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
        return Err(InklayError::validation("page bounds must be non-empty"));
    }

    let scale = (f64::from(target.width) / bounds.width())
        .min(f64::from(target.height) / bounds.height());
    let background = rasterizer.rasterize(page, scale)?;
    let fit = fit_transform(bounds, target, (background.width, background.height));

    let mut ctx = vello_cpu::RenderContext::new(width, height);
    draw_background(&mut ctx, &background, fit.offset)?;
    if let Some(blob) = strokes {
        draw_strokes(&mut ctx, blob, fit.to_target);
    }

    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.flush();
    ctx.render_to_pixmap(&mut pixmap);

    Ok(FrameRgba {
        width: u32::from(width),
        height: u32::from(height),
        data: pixmap.data_as_u8_slice().to_vec(),
    })
}

fn target_u16(target: PixelSize) -> InklayResult<(u16, u16)> {
    let w: u16 = target
        .width
        .try_into()
        .map_err(|_| InklayError::validation("target width exceeds u16"))?;
    let h: u16 = target
        .height
        .try_into()
        .map_err(|_| InklayError::validation("target height exceeds u16"))?;
    if w == 0 || h == 0 {
        return Err(InklayError::validation("target size must be non-zero"));
    }
    Ok((w, h))
}

fn draw_background(
    ctx: &mut vello_cpu::RenderContext,
    background: &FrameRgba,
    offset: (f64, f64),
) -> InklayResult<()> {
    let paint = rgba_premul_to_image(&background.data, background.width, background.height)?;
    ctx.set_transform(vello_cpu::kurbo::Affine::translate(offset));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(background.width),
        f64::from(background.height),
    ));
    Ok(())
}

fn draw_strokes(ctx: &mut vello_cpu::RenderContext, blob: &StrokeBlob, to_target: Affine) {
    ctx.set_transform(affine_to_cpu(to_target));
    for stroke in &blob.strokes {
        if stroke.path.elements().is_empty() || stroke.width <= 0.0 {
            continue;
        }
        let style = kurbo::Stroke::new(stroke.width)
            .with_caps(kurbo::Cap::Round)
            .with_join(kurbo::Join::Round);
        let outline = kurbo::stroke(
            stroke.path.elements().iter().copied(),
            &style,
            &kurbo::StrokeOpts::default(),
            0.1,
        );
        let [r, g, b, a] = stroke.color;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
        ctx.fill_path(&bezpath_to_cpu(&outline));
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &crate::foundation::core::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn rgba_premul_to_image(
    bytes_premul: &[u8],
    width: u32,
    height: u32,
) -> InklayResult<vello_cpu::Image> {
    let w: u16 = width
        .try_into()
        .map_err(|_| InklayError::validation("background width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| InklayError::validation("background height exceeds u16"))?;
    if bytes_premul.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(InklayError::validation("background byte len mismatch"));
    }
    // Pixmap stores PremulRgba8; rasterizer output is already premultiplied.
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes_premul.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    let pixmap = vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true);
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
