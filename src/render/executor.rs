use crate::foundation::core::ImageId;
use crate::protocol::call::DrawCall;
use crate::protocol::wire::{DecodeError, SegmentReader};
use crate::render::surface::{Bitmap, ImageTable, RasterSnapshot, RasterSurface};

/// Counters for one executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub frames: u64,
    pub segments: u64,
    pub actions: u64,
    pub faulted_segments: u64,
    pub skipped_draws: u64,
}

/// Replays segments against one persistent surface.
pub struct Executor<S: RasterSurface> {
    surface: S,
    images: ImageTable,
    stats: ExecStats,
}

impl<S: RasterSurface> Executor<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            images: ImageTable::new(),
            stats: ExecStats::default(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    /// Make `id` drawable. Must happen before any segment referencing it executes.
    pub fn load_image(&mut self, id: ImageId, snapshot: RasterSnapshot) {
        self.images.insert(id, snapshot);
    }

    pub fn has_image(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }

    pub fn forget_images(&mut self, ids: &[ImageId]) {
        for id in ids {
            self.images.remove(id);
            self.surface.forget_image(*id);
        }
    }

    /// Replay one segment. Returns the number of actions applied.
    ///
    /// On error the actions before the failure have been applied; the rest of the segment is
    /// skipped.
    pub fn execute_segment(&mut self, bytes: &[u8]) -> Result<usize, DecodeError> {
        let mut r = SegmentReader::new(bytes);
        let mut applied = 0usize;
        self.stats.segments += 1;
        while let Some(call) = DrawCall::read(&mut r)? {
            if let Some(id) = call.image()
                && !self.images.contains_key(&id)
            {
                tracing::debug!(image = id.0, op = ?call.op(), "image not loaded; draw skipped");
                self.stats.skipped_draws += 1;
                continue;
            }
            self.surface.apply(&call, &self.images);
            applied += 1;
            self.stats.actions += 1;
        }
        Ok(applied)
    }

    /// Replay every segment of a frame in order and capture the result.
    ///
    /// A failing segment is logged and abandoned; later segments still run.
    #[tracing::instrument(skip_all, fields(segments = segments.len()))]
    pub fn run_frame(&mut self, segments: &[Vec<u8>]) -> Bitmap {
        for (index, seg) in segments.iter().enumerate() {
            if let Err(e) = self.execute_segment(seg) {
                self.stats.faulted_segments += 1;
                tracing::warn!(segment = index, error = %e, "segment replay halted");
            }
        }
        self.stats.frames += 1;
        self.surface.snapshot()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/executor.rs"]
mod tests;
