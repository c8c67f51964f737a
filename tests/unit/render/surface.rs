use super::*;

#[test]
fn transparent_bitmap_has_expected_len() {
    let b = Bitmap::transparent(CanvasSize::new(3, 2));
    assert_eq!(b.data.len(), 24);
    assert_eq!(b.pixel(2, 1), Some([0, 0, 0, 0]));
    assert_eq!(b.pixel(3, 0), None);
}

#[test]
fn premultiply_then_unpremultiply_is_close() {
    let mut px = vec![200u8, 100, 50, 128];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(px, vec![100, 50, 25, 128]);
    unpremultiply_rgba8_in_place(&mut px);
    for (got, want) in px.iter().zip([200u8, 100, 50, 128]) {
        assert!(got.abs_diff(want) <= 1);
    }
}

#[test]
fn snapshot_rejects_wrong_length() {
    let err = RasterSnapshot::from_straight_rgba8(&[0; 7], 1, 2).unwrap_err();
    assert!(err.to_string().contains("byte len mismatch"));
}

#[test]
fn snapshot_rejects_oversized_width() {
    assert!(RasterSnapshot::from_premul_rgba8(&[], 70_000, 0).is_err());
}

#[test]
fn snapshot_premultiplies_straight_input() {
    let snap = RasterSnapshot::from_straight_rgba8(&[255, 0, 0, 128], 1, 1).unwrap();
    assert_eq!(snap.width(), 1);
    assert_eq!(snap.height(), 1);
    assert_eq!(snap.pixmap().data_as_u8_slice(), &[128, 0, 0, 128]);
}

#[test]
fn rgba_image_is_unpremultiplied() {
    let b = Bitmap {
        width: 1,
        height: 1,
        data: vec![64, 0, 0, 128],
        premultiplied: true,
    };
    let img = b.to_rgba_image().unwrap();
    let px = img.get_pixel(0, 0).0;
    assert_eq!(px[3], 128);
    assert!(px[0].abs_diff(128) <= 1);
}
