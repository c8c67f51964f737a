use super::*;

fn roundtrip(c: &ColorValue) -> ColorValue {
    let mut buf = Vec::new();
    c.write(&mut buf);
    assert_eq!(buf.len(), c.encoded_len());
    let mut r = SegmentReader::new(&buf);
    let back = ColorValue::read(&mut r).unwrap();
    assert!(r.is_at_end());
    back
}

#[test]
fn gradient_stops_keep_their_order() {
    let c = ColorValue::radial_gradient(1.0, 2.0, 3.0, 4.0, 5.0, 6.0)
        .with_stop(0.0, "red")
        .with_stop(0.5, "#00ff0080")
        .with_stop(1.0, "rgba(0, 0, 255, 0.5)");
    let back = roundtrip(&c);
    assert_eq!(back, c);
    let offsets: Vec<f32> = back.stops().iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![0.0, 0.5, 1.0]);
}

#[test]
fn tag_bytes_match_layout() {
    let mut buf = Vec::new();
    ColorValue::solid("red").write(&mut buf);
    assert_eq!(buf[0], 0);
    buf.clear();
    ColorValue::linear_gradient(0.0, 0.0, 1.0, 1.0).write(&mut buf);
    assert_eq!(buf[0], 1);
    assert_eq!(buf.len(), 1 + 16 + 2);
    buf.clear();
    ColorValue::conic_gradient(0.5, 10.0, 10.0).write(&mut buf);
    assert_eq!(buf[0], 3);
}

#[test]
fn pattern_with_and_without_transform() {
    let mut spec = PatternSpec {
        image: ImageId(7),
        repeat: PatternRepeat::RepeatY,
        transform: None,
    };
    let plain = ColorValue::Pattern(spec.clone());
    assert_eq!(plain.encoded_len(), 1 + 4 + 1 + 1);
    assert_eq!(roundtrip(&plain), plain);

    spec.set_transform(Affine::translate((3.0, 4.0)));
    let moved = ColorValue::Pattern(spec);
    assert_eq!(moved.encoded_len(), 1 + 4 + 1 + 1 + 24);
    let back = roundtrip(&moved);
    assert_eq!(back, moved);
    assert_eq!(back.image(), Some(ImageId(7)));
}

#[test]
fn stops_are_ignored_on_solid_colors() {
    let mut c = ColorValue::solid("blue");
    c.add_color_stop(0.5, "red");
    assert!(c.stops().is_empty());
}

#[test]
fn unknown_tag_is_reported() {
    let buf = [9u8, 0, 0];
    let err = ColorValue::read(&mut SegmentReader::new(&buf)).unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnknownTag {
            what: "color",
            tag: 9,
            offset: 0
        }
    );
}

#[test]
fn fit_within_drops_trailing_stops() {
    let mut c = ColorValue::linear_gradient(0.0, 0.0, 1.0, 1.0);
    for i in 0..100 {
        c.add_color_stop(i as f32 / 100.0, "#123456");
    }
    assert!(c.fit_within(200));
    assert!(c.encoded_len() <= 200);
    assert!(!c.stops().is_empty());
    assert_eq!(c.stops()[0].offset, 0.0);
    assert!(!c.fit_within(200));
}

#[test]
fn fit_within_cuts_solid_text() {
    let mut c = ColorValue::solid("x".repeat(500));
    assert!(c.fit_within(64));
    assert!(c.encoded_len() <= 64);
}
