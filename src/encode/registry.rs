use crate::foundation::core::ImageId;
use crate::foundation::error::{PaintError, PaintResult};
use crate::render::surface::RasterSnapshot;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOURCE_KEY: AtomicU64 = AtomicU64::new(1);

/// A client-side image, identified by object identity.
///
/// Clones share one identity, so drawing a clone reuses the registry entry of the original.
/// Two images built from identical pixels are distinct.
#[derive(Clone, Debug)]
pub struct SourceImage {
    key: u64,
    width: u32,
    height: u32,
    rgba: Arc<Vec<u8>>,
}

impl SourceImage {
    /// Wrap straight-alpha RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, rgba: Vec<u8>) -> PaintResult<Self> {
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(PaintError::validation(format!(
                "image {width}x{height} exceeds the {}px raster limit",
                u16::MAX
            )));
        }
        let want = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4);
        if rgba.len() != want {
            return Err(PaintError::validation(format!(
                "image {width}x{height} needs {want} bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            key: NEXT_SOURCE_KEY.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            rgba: Arc::new(rgba),
        })
    }

    pub fn from_dynamic(img: &image::DynamicImage) -> PaintResult<Self> {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        Self::from_rgba8(w, h, rgba.into_raw())
    }

    /// Decode an image file.
    pub fn open(path: impl AsRef<Path>) -> PaintResult<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| {
            PaintError::validation(format!("decode image '{}': {e}", path.display()))
        })?;
        Self::from_dynamic(&img)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn snapshot(&self) -> PaintResult<RasterSnapshot> {
        RasterSnapshot::from_straight_rgba8(&self.rgba, self.width, self.height)
    }
}

struct Entry {
    id: ImageId,
    snapshot: RasterSnapshot,
    last_commit: u64,
}

/// Maps source image identity to a stable id and a snapshot taken on first sight.
///
/// Ids increase monotonically and are never reused, even after an entry is evicted.
#[derive(Default)]
pub struct ImageRegistry {
    by_key: HashMap<u64, Entry>,
    key_by_id: HashMap<ImageId, u64>,
    next_id: u32,
    commits: u64,
}

/// Registry handle shared by every encoder of one scheduler.
pub type SharedRegistry = Rc<RefCell<ImageRegistry>>;

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Id and snapshot for `src`, registering it on first sight.
    pub fn resolve(&mut self, src: &SourceImage) -> PaintResult<(ImageId, RasterSnapshot)> {
        let commits = self.commits;
        if let Some(entry) = self.by_key.get_mut(&src.key) {
            entry.last_commit = commits;
            return Ok((entry.id, entry.snapshot.clone()));
        }
        let snapshot = src.snapshot()?;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| PaintError::validation("image id space exhausted"))?;
        let id = ImageId(self.next_id);
        self.by_key.insert(
            src.key,
            Entry {
                id,
                snapshot: snapshot.clone(),
                last_commit: commits,
            },
        );
        self.key_by_id.insert(id, src.key);
        tracing::debug!(image = id.0, w = src.width, h = src.height, "registered image");
        Ok((id, snapshot))
    }

    /// Snapshot of a live entry, marking it as used by the commit in progress.
    pub fn touch(&mut self, id: ImageId) -> Option<RasterSnapshot> {
        let commits = self.commits;
        let key = self.key_by_id.get(&id)?;
        let entry = self.by_key.get_mut(key)?;
        entry.last_commit = commits;
        Some(entry.snapshot.clone())
    }

    pub fn get(&self, id: ImageId) -> Option<&RasterSnapshot> {
        let key = self.key_by_id.get(&id)?;
        self.by_key.get(key).map(|e| &e.snapshot)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Count one committed frame. Returns the new commit counter.
    pub fn note_commit(&mut self) -> u64 {
        self.commits = self.commits.saturating_add(1);
        self.commits
    }

    /// Drop entries that no commit has referenced during the last `idle_commits` commits.
    ///
    /// An entry's `last_commit` is the counter value while the referencing frame was open, so
    /// that frame's own commit does not count as idle.
    pub fn evict_idle(&mut self, idle_commits: u64) -> Vec<ImageId> {
        let commits = self.commits;
        let mut evicted: Vec<ImageId> = self
            .by_key
            .values()
            .filter(|e| commits.saturating_sub(e.last_commit) > idle_commits)
            .map(|e| e.id)
            .collect();
        evicted.sort();
        for id in &evicted {
            if let Some(key) = self.key_by_id.remove(id) {
                self.by_key.remove(&key);
            }
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted idle images");
        }
        evicted
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/registry.rs"]
mod tests;
