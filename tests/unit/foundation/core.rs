use super::*;

#[test]
fn page_index_range_check() {
    assert!(PageIndex(0).in_range(1));
    assert!(PageIndex(3).in_range(4));
    assert!(!PageIndex(4).in_range(4));
    assert!(!PageIndex(0).in_range(0));
}

#[test]
fn pixel_size_rejects_zero_dimensions() {
    assert!(PixelSize::new(0, 10).is_err());
    assert!(PixelSize::new(10, 0).is_err());
    let size = PixelSize::new(4, 3).unwrap();
    assert_eq!(size.rgba8_byte_len(), 4 * 3 * 4);
}

#[test]
fn solid_frame_is_premultiplied() {
    let size = PixelSize::new(2, 2).unwrap();
    let frame = FrameRgba::solid(size, [255, 0, 0, 128]);
    assert_eq!(frame.data.len(), 16);
    // 255 * 128/255 rounds to 128.
    assert_eq!(&frame.data[0..4], &[128, 0, 0, 128]);
    assert_eq!(frame.size(), size);
}
