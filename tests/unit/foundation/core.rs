use super::*;

#[test]
fn full_rect_covers_canvas() {
    let r = CanvasSize::new(100, 40).full_rect();
    assert_eq!(r, Rect::new(0.0, 0.0, 100.0, 40.0));
}

#[test]
fn zero_dimension_is_empty() {
    assert!(CanvasSize::default().is_empty());
    assert!(CanvasSize::new(10, 0).is_empty());
    assert!(!CanvasSize::new(1, 1).is_empty());
}

#[test]
fn ids_order_by_value() {
    assert!(ImageId(1) < ImageId(2));
    assert!(ClientId(7) > ClientId(3));
}
