use super::*;

#[test]
fn page_range_is_validated() {
    let raster = CheckerRasterizer::new(2);
    assert!(raster.page_bounds(PageIndex(1)).is_ok());
    assert!(raster.page_bounds(PageIndex(2)).is_err());
    assert!(raster.rasterize(PageIndex(2), 1.0).is_err());
}

#[test]
fn scale_is_validated() {
    let raster = CheckerRasterizer::new(1);
    assert!(raster.rasterize(PageIndex(0), 0.0).is_err());
    assert!(raster.rasterize(PageIndex(0), f64::NAN).is_err());
}

#[test]
fn raster_dimensions_follow_scale() {
    let raster = CheckerRasterizer::new(1);
    let one = raster.rasterize(PageIndex(0), 1.0).unwrap();
    let two = raster.rasterize(PageIndex(0), 2.0).unwrap();
    assert_eq!((one.width, one.height), (612, 792));
    assert_eq!((two.width, two.height), (1224, 1584));
}

#[test]
fn cells_are_anchored_in_native_coordinates() {
    let raster = CheckerRasterizer::new(1);
    let one = raster.rasterize(PageIndex(0), 1.0).unwrap();
    let two = raster.rasterize(PageIndex(0), 2.0).unwrap();

    // The same native point must land in the same cell at both scales.
    let sample = |frame: &FrameRgba, scale: f64, nx: f64, ny: f64| -> u8 {
        let x = (nx * scale) as usize;
        let y = (ny * scale) as usize;
        frame.data[(y * frame.width as usize + x) * 4]
    };
    for &(nx, ny) in &[(10.0, 10.0), (50.0, 50.0), (300.0, 400.0), (600.0, 700.0)] {
        assert_eq!(sample(&one, 1.0, nx, ny), sample(&two, 2.0, nx, ny));
    }
}
