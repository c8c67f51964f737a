use super::*;
use crate::protocol::call::DrawCall;
use std::sync::mpsc::channel;
use std::time::Duration;

fn segment(calls: &[DrawCall]) -> Vec<u8> {
    let mut buf = Vec::new();
    for c in calls {
        c.write(&mut buf);
    }
    buf
}

#[test]
fn worker_paints_and_replies_once_per_render() {
    let (reply_tx, reply_rx) = channel();
    let link = WorkerSpawner::default().spawn(0, 3, reply_tx).unwrap();

    let id = ImageId(1);
    let blue = RasterSnapshot::from_straight_rgba8(&[0, 0, 255, 255], 1, 1).unwrap();
    link.send(ContextRequest::Render(RenderRequest {
        ticket: DispatchTicket(9),
        buffers: vec![
            segment(&[DrawCall::Resize {
                width: 4,
                height: 4,
            }]),
            segment(&[
                DrawCall::FillStyle("#f00".into()),
                DrawCall::FillRect {
                    x: 0.0,
                    y: 0.0,
                    w: 2.0,
                    h: 4.0,
                },
                DrawCall::DrawImage {
                    image: id,
                    dx: 3.0,
                    dy: 0.0,
                },
            ]),
        ],
        images: vec![blue],
        image_ids: vec![id],
    }))
    .unwrap();

    let reply = reply_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!((reply.slot, reply.generation), (0, 3));
    assert_eq!(reply.ticket, DispatchTicket(9));
    let bitmap = reply.outcome.unwrap();
    assert_eq!(bitmap.pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(bitmap.pixel(3, 0), Some([0, 0, 255, 255]));
    assert_eq!(bitmap.pixel(2, 2), Some([0, 0, 0, 0]));

    link.send(ContextRequest::Shutdown).unwrap();
    assert!(reply_rx.recv_timeout(Duration::from_secs(10)).is_err());
}

#[test]
fn images_persist_across_frames_until_forgotten() {
    let (reply_tx, reply_rx) = channel();
    let link = WorkerSpawner::default().spawn(1, 0, reply_tx).unwrap();
    let id = ImageId(4);
    let draw = segment(&[
        DrawCall::Resize {
            width: 1,
            height: 1,
        },
        DrawCall::DrawImage {
            image: id,
            dx: 0.0,
            dy: 0.0,
        },
    ]);
    let render = |ticket: u64, images: Vec<RasterSnapshot>, image_ids: Vec<ImageId>| {
        link.send(ContextRequest::Render(RenderRequest {
            ticket: DispatchTicket(ticket),
            buffers: vec![draw.clone()],
            images,
            image_ids,
        }))
        .unwrap();
        reply_rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
            .outcome
            .unwrap()
    };

    let green = RasterSnapshot::from_straight_rgba8(&[0, 255, 0, 255], 1, 1).unwrap();
    assert_eq!(render(1, vec![green], vec![id]).pixel(0, 0), Some([0, 255, 0, 255]));
    assert_eq!(render(2, vec![], vec![]).pixel(0, 0), Some([0, 255, 0, 255]));

    link.send(ContextRequest::Forget {
        image_ids: vec![id],
    })
    .unwrap();
    assert_eq!(render(3, vec![], vec![]).pixel(0, 0), Some([0, 0, 0, 0]));
}
