use super::*;
use crate::codec::stroke::Stroke;
use crate::foundation::core::BezPath;
use crate::render::raster::CheckerRasterizer;

fn dot_at(nx: f64, ny: f64) -> StrokeBlob {
    let mut path = BezPath::new();
    path.move_to((nx, ny));
    path.line_to((nx + 0.1, ny));
    StrokeBlob {
        strokes: vec![Stroke {
            path,
            width: 8.0,
            color: [255, 0, 0, 255],
        }],
    }
}

fn red_centroid(frame: &FrameRgba) -> Option<(f64, f64)> {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut count = 0u64;
    for y in 0..frame.height {
        for x in 0..frame.width {
            let idx = ((y * frame.width + x) * 4) as usize;
            let (r, b, a) = (frame.data[idx], frame.data[idx + 2], frame.data[idx + 3]);
            if a > 0 && r > 150 && b < 100 {
                sum_x += f64::from(x);
                sum_y += f64::from(y);
                count += 1;
            }
        }
    }
    (count > 0).then(|| {
        (
            sum_x / count as f64 / f64::from(frame.width),
            sum_y / count as f64 / f64::from(frame.height),
        )
    })
}

#[test]
fn fit_transform_maps_native_origin_to_the_letterbox_offset() {
    let bounds = Rect::new(0.0, 0.0, 612.0, 792.0);
    let target = PixelSize::new(200, 200).unwrap();
    let scale = (200.0 / 612.0f64).min(200.0 / 792.0);
    let scaled = (
        (612.0 * scale).round() as u32,
        (792.0 * scale).round() as u32,
    );
    let fit = fit_transform(bounds, target, scaled);
    let mapped = fit.to_target * kurbo::Point::new(0.0, 0.0);
    assert!((mapped.x - fit.offset.0).abs() < 1e-9);
    assert!((mapped.y - fit.offset.1).abs() < 1e-9);

    let corner = fit.to_target * kurbo::Point::new(612.0, 792.0);
    assert!(corner.x <= 200.0 + 1.0);
    assert!(corner.y <= 200.0 + 1.0);
}

#[test]
fn ink_lands_on_the_same_feature_at_different_resolutions() {
    let raster = CheckerRasterizer::new(1);
    let ink = dot_at(306.0, 396.0);

    let small = composite_page(
        &raster,
        PageIndex(0),
        Some(&ink),
        PixelSize::new(200, 200).unwrap(),
        Profile::Export,
    )
    .unwrap();
    let large = composite_page(
        &raster,
        PageIndex(0),
        Some(&ink),
        PixelSize::new(400, 300).unwrap(),
        Profile::Export,
    )
    .unwrap();

    let a = red_centroid(&small).expect("ink visible at 200x200");
    let b = red_centroid(&large).expect("ink visible at 400x300");
    // The dot sits at the native page center, so its relative position must
    // agree across target sizes within a small pixel tolerance.
    assert!((a.0 - 0.5).abs() < 0.03, "small x centroid {a:?}");
    assert!((a.1 - 0.5).abs() < 0.03, "small y centroid {a:?}");
    assert!((a.0 - b.0).abs() < 0.02, "{a:?} vs {b:?}");
    assert!((a.1 - b.1).abs() < 0.02, "{a:?} vs {b:?}");
}

#[test]
fn off_center_ink_tracks_the_background_feature() {
    let raster = CheckerRasterizer::new(1);
    let ink = dot_at(153.0, 198.0); // native quarter point

    let a = red_centroid(
        &composite_page(
            &raster,
            PageIndex(0),
            Some(&ink),
            PixelSize::new(150, 220).unwrap(),
            Profile::Export,
        )
        .unwrap(),
    )
    .expect("ink visible");
    let b = red_centroid(
        &composite_page(
            &raster,
            PageIndex(0),
            Some(&ink),
            PixelSize::new(330, 440).unwrap(),
            Profile::Export,
        )
        .unwrap(),
    )
    .expect("ink visible");
    assert!((a.0 - b.0).abs() < 0.02, "{a:?} vs {b:?}");
    assert!((a.1 - b.1).abs() < 0.02, "{a:?} vs {b:?}");
}

#[test]
fn composite_without_ink_fills_the_page_area() {
    let raster = CheckerRasterizer::new(1);
    let frame = composite_page(
        &raster,
        PageIndex(0),
        None,
        PixelSize::new(200, 200).unwrap(),
        Profile::Export,
    )
    .unwrap();
    assert_eq!((frame.width, frame.height), (200, 200));

    let px = |x: u32, y: u32| -> (u8, u8) {
        let idx = ((y * frame.width + x) * 4) as usize;
        (frame.data[idx], frame.data[idx + 3])
    };
    // Letterbox margins stay transparent; the page area is opaque.
    assert_eq!(px(2, 100).1, 0, "letterbox must be transparent");
    assert_eq!(px(100, 100).1, 255, "page area must be opaque");
}

#[test]
fn snapshot_profile_pre_checks_the_budget() {
    let raster = CheckerRasterizer::new(1);
    let target = PixelSize::new(256, 256).unwrap();
    let err = composite_page(
        &raster,
        PageIndex(0),
        None,
        target,
        Profile::Snapshot { max_bytes: 1000 },
    )
    .unwrap_err();
    match err {
        InklayError::BudgetExceeded {
            estimated_bytes,
            max_bytes,
        } => {
            assert_eq!(estimated_bytes, estimated_cost_bytes(target));
            assert_eq!(max_bytes, 1000);
        }
        other => panic!("expected BudgetExceeded, got {other}"),
    }
}

#[test]
fn snapshot_profile_within_budget_renders() {
    let raster = CheckerRasterizer::new(1);
    let target = PixelSize::new(64, 64).unwrap();
    let frame = composite_page(
        &raster,
        PageIndex(0),
        None,
        target,
        Profile::Snapshot {
            max_bytes: estimated_cost_bytes(target),
        },
    )
    .unwrap();
    assert_eq!(frame.size(), target);
}
