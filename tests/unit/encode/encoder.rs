use super::*;
use crate::encode::registry::ImageRegistry;
use crate::protocol::call::decode_segment;

fn encoder_with(opts: EncoderOpts) -> (Encoder, SharedRegistry) {
    let registry = ImageRegistry::shared();
    (Encoder::new(ClientId(1), opts, registry.clone()), registry)
}

fn decode_all(frame: &Frame) -> Vec<DrawCall> {
    let mut out = Vec::new();
    for seg in &frame.segments {
        let (calls, err) = decode_segment(seg);
        assert_eq!(err, None);
        out.extend(calls);
    }
    out
}

fn red_pixel() -> SourceImage {
    SourceImage::from_rgba8(1, 1, vec![255, 0, 0, 255]).unwrap()
}

#[test]
fn resize_then_fill_rect_is_one_segment() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    enc.start(100, 100);
    enc.fill_rect(0.0, 0.0, 50.0, 50.0);
    assert!(enc.commit());

    let frames = enc.take_committed();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.segments.len(), 1);
    assert_eq!(frame.size, CanvasSize::new(100, 100));
    assert_eq!(
        decode_all(frame),
        vec![
            DrawCall::Resize {
                width: 100,
                height: 100
            },
            DrawCall::FillRect {
                x: 0.0,
                y: 0.0,
                w: 50.0,
                h: 50.0
            },
        ]
    );
}

#[test]
fn segments_rotate_before_the_margin() {
    let opts = EncoderOpts {
        segment_capacity: 256,
        segment_margin: 64,
    };
    let (mut enc, _) = encoder_with(opts);
    enc.start(10, 10);
    for i in 0..30 {
        enc.fill_rect(i as f32, 0.0, 1.0, 1.0);
    }
    enc.commit();
    let frame = enc.take_committed().remove(0);

    // 9-byte resize plus 17-byte rects against 192 usable bytes: 10 + 11 + 9.
    assert_eq!(frame.segments.len(), 3);
    for seg in &frame.segments {
        assert!(seg.len() <= opts.usable());
        assert!(seg.len() <= opts.segment_capacity);
    }
    let calls = decode_all(&frame);
    assert_eq!(calls.len(), 31);
    assert!(matches!(calls[0], DrawCall::Resize { .. }));
    for (i, call) in calls[1..].iter().enumerate() {
        assert_eq!(
            *call,
            DrawCall::FillRect {
                x: i as f32,
                y: 0.0,
                w: 1.0,
                h: 1.0
            }
        );
    }
}

#[test]
fn drawing_before_start_uses_last_size() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    enc.fill_rect(0.0, 0.0, 1.0, 1.0);
    enc.commit();
    enc.start(30, 20);
    enc.commit();
    enc.stroke();
    enc.commit();

    let frames = enc.take_committed();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].size, CanvasSize::new(0, 0));
    assert_eq!(frames[2].size, CanvasSize::new(30, 20));
    assert_eq!(
        decode_all(&frames[2]),
        vec![
            DrawCall::Resize {
                width: 30,
                height: 20
            },
            DrawCall::Stroke
        ]
    );
}

#[test]
fn commit_without_start_produces_nothing() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    assert!(!enc.commit());
    assert!(!enc.has_committed());
}

#[test]
fn dirty_regions_default_to_full_canvas() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    enc.start(40, 30);
    enc.commit();
    enc.start(40, 30);
    enc.add_dirty_rect(Rect::new(1.0, 2.0, 3.0, 4.0));
    enc.commit();
    let frames = enc.take_committed();
    assert_eq!(frames[0].dirty, vec![Rect::new(0.0, 0.0, 40.0, 30.0)]);
    assert_eq!(frames[1].dirty, vec![Rect::new(1.0, 2.0, 3.0, 4.0)]);
}

#[test]
fn same_image_twice_is_one_entry() {
    let (mut enc, registry) = encoder_with(EncoderOpts::default());
    let img = red_pixel();
    enc.start(8, 8);
    enc.draw_image(&img, 0.0, 0.0);
    enc.draw_image_scaled(&img, 1.0, 1.0, 4.0, 4.0);
    enc.commit();
    let frame = enc.take_committed().remove(0);
    assert_eq!(registry.borrow().len(), 1);
    assert_eq!(frame.images.len(), 1);
    let ids: Vec<ImageId> = decode_all(&frame).iter().filter_map(DrawCall::image).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert!(frame.images.contains_key(&ids[0]));
}

#[test]
fn pattern_reused_in_a_later_frame_carries_its_image() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    let img = red_pixel();
    enc.start(8, 8);
    let pattern = enc.create_pattern(&img, PatternRepeat::Repeat);
    enc.commit();
    enc.start(8, 8);
    enc.set_fill_style(pattern.clone());
    enc.fill_rect(0.0, 0.0, 8.0, 8.0);
    enc.commit();

    let frames = enc.take_committed();
    let id = pattern.image().unwrap();
    assert!(frames[0].images.contains_key(&id));
    assert!(frames[1].images.contains_key(&id));
}

#[test]
fn oversized_text_is_truncated_to_fit() {
    let opts = EncoderOpts {
        segment_capacity: 128,
        segment_margin: 32,
    };
    let (mut enc, _) = encoder_with(opts);
    enc.start(1, 1);
    let long = "\u{1F600}".repeat(200);
    enc.fill_text(&long, 1.0, 2.0, None);
    enc.commit();
    let frame = enc.take_committed().remove(0);
    for seg in &frame.segments {
        assert!(seg.len() <= opts.usable());
    }
    let calls = decode_all(&frame);
    let DrawCall::FillText { text, x, y, .. } = &calls[1] else {
        panic!("expected fill_text, got {:?}", calls[1]);
    };
    assert!(!text.is_empty());
    assert!(long.starts_with(text.as_str()));
    assert!(text.chars().all(|c| c == '\u{1F600}'));
    assert_eq!((*x, *y), (1.0, 2.0));
}

#[test]
fn oversized_dash_list_is_truncated() {
    let opts = EncoderOpts {
        segment_capacity: 128,
        segment_margin: 32,
    };
    let (mut enc, _) = encoder_with(opts);
    enc.start(1, 1);
    enc.set_line_dash(&[1.0; 100]);
    enc.commit();
    let calls = decode_all(&enc.take_committed()[0]);
    let DrawCall::LineDash(segments) = &calls[1] else {
        panic!("expected line dash");
    };
    assert_eq!(segments.len(), (96 - 3) / 4);
}

#[test]
fn commits_advance_the_registry_clock() {
    let (mut enc, registry) = encoder_with(EncoderOpts::default());
    enc.start(1, 1);
    enc.commit();
    enc.start(1, 1);
    enc.commit();
    assert_eq!(registry.borrow_mut().note_commit(), 3);
}

#[test]
fn restart_discards_uncommitted_work() {
    let (mut enc, _) = encoder_with(EncoderOpts::default());
    enc.start(5, 5);
    enc.fill_rect(0.0, 0.0, 1.0, 1.0);
    enc.start(6, 6);
    enc.commit();
    let calls = decode_all(&enc.take_committed()[0]);
    assert_eq!(
        calls,
        vec![DrawCall::Resize {
            width: 6,
            height: 6
        }]
    );
}

#[test]
fn canvas_rotate_is_an_action_across_segment_rotation() {
    let opts = EncoderOpts {
        segment_capacity: 128,
        segment_margin: 32,
    };
    let (mut enc, _) = encoder_with(opts);
    enc.start(10, 10);
    for i in 0..40 {
        enc.rotate(i as f32 * 0.1);
    }
    enc.commit();
    let frame = enc.take_committed().remove(0);

    assert!(frame.segments.len() > 1);
    assert!(frame.segments.iter().all(|s| s.len() <= opts.usable()));
    let calls = decode_all(&frame);
    assert_eq!(calls.len(), 41);
    for (i, call) in calls[1..].iter().enumerate() {
        assert_eq!(*call, DrawCall::Rotate(i as f32 * 0.1));
    }
}
