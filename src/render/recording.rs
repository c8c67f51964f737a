use crate::foundation::core::CanvasSize;
use crate::protocol::call::DrawCall;
use crate::render::surface::{Bitmap, ImageTable, RasterSurface};

/// Surface that only records what it was asked to do.
///
/// Intended for tests and debugging. Snapshots are transparent bitmaps of the last resize.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Vec<DrawCall>,
    size: CanvasSize,
    snapshots: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl RasterSurface for RecordingSurface {
    fn apply(&mut self, call: &DrawCall, _images: &ImageTable) {
        if let DrawCall::Resize { width, height } = call {
            self.size = CanvasSize::new(*width, *height);
        }
        self.calls.push(call.clone());
    }

    fn snapshot(&mut self) -> Bitmap {
        self.snapshots += 1;
        Bitmap::transparent(self.size)
    }
}
