use super::*;
use crate::foundation::core::CanvasSize;
use crate::render::recording::RecordingSurface;

fn segment(calls: &[DrawCall]) -> Vec<u8> {
    let mut buf = Vec::new();
    for c in calls {
        c.write(&mut buf);
    }
    buf
}

fn pixel() -> RasterSnapshot {
    RasterSnapshot::from_straight_rgba8(&[0, 0, 255, 255], 1, 1).unwrap()
}

#[test]
fn segments_share_one_surface_in_order() {
    let mut exec = Executor::new(RecordingSurface::new());
    let a = segment(&[
        DrawCall::Resize {
            width: 4,
            height: 3,
        },
        DrawCall::LineWidth(3.0),
    ]);
    let b = segment(&[DrawCall::Stroke]);
    let bitmap = exec.run_frame(&[a, b]);
    assert_eq!(bitmap.size(), CanvasSize::new(4, 3));
    assert_eq!(
        exec.surface().calls(),
        &[
            DrawCall::Resize {
                width: 4,
                height: 3
            },
            DrawCall::LineWidth(3.0),
            DrawCall::Stroke
        ]
    );
    assert_eq!(exec.surface().snapshots(), 1);
}

#[test]
fn bad_opcode_halts_only_its_segment() {
    let mut exec = Executor::new(RecordingSurface::new());
    let mut bad = segment(&[DrawCall::Save]);
    bad.push(0xEE);
    DrawCall::Restore.write(&mut bad);
    let good = segment(&[DrawCall::BeginPath]);

    exec.run_frame(&[bad, good]);
    assert_eq!(
        exec.surface().calls(),
        &[DrawCall::Save, DrawCall::BeginPath]
    );
    assert_eq!(exec.stats().faulted_segments, 1);
    assert_eq!(exec.stats().segments, 2);
}

#[test]
fn execute_segment_reports_the_error() {
    let mut exec = Executor::new(RecordingSurface::new());
    let err = exec.execute_segment(&[0xEE]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnknownOpcode {
            opcode: 0xEE,
            offset: 0
        }
    );
}

#[test]
fn draws_of_unloaded_images_are_skipped() {
    let mut exec = Executor::new(RecordingSurface::new());
    let draw = DrawCall::DrawImage {
        image: ImageId(5),
        dx: 0.0,
        dy: 0.0,
    };
    let seg = segment(&[draw.clone(), DrawCall::Stroke]);
    exec.run_frame(std::slice::from_ref(&seg));
    assert_eq!(exec.surface().calls(), &[DrawCall::Stroke]);
    assert_eq!(exec.stats().skipped_draws, 1);

    exec.load_image(ImageId(5), pixel());
    assert!(exec.has_image(ImageId(5)));
    exec.run_frame(std::slice::from_ref(&seg));
    assert_eq!(exec.surface().calls()[1..], [draw, DrawCall::Stroke]);

    exec.forget_images(&[ImageId(5)]);
    assert!(!exec.has_image(ImageId(5)));
}
