use crate::foundation::core::{CanvasSize, ImageId};
use crate::foundation::error::{PaintError, PaintResult};
use crate::protocol::call::DrawCall;
use std::collections::HashMap;
use std::sync::Arc;

/// Finished raster returned by a render context.
///
/// Pixels are RGBA8, row-major, premultiplied when `premultiplied` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn transparent(size: CanvasSize) -> Self {
        let len = (size.width as usize)
            .saturating_mul(size.height as usize)
            .saturating_mul(4);
        Self {
            width: size.width,
            height: size.height,
            data: vec![0; len],
            premultiplied: true,
        }
    }

    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }

    /// RGBA8 at `(x, y)`, or `None` outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Straight-alpha copy for encoders such as PNG.
    pub fn to_rgba_image(&self) -> PaintResult<image::RgbaImage> {
        let mut data = self.data.clone();
        if self.premultiplied {
            unpremultiply_rgba8_in_place(&mut data);
        }
        image::RgbaImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| PaintError::validation("bitmap byte length does not match its size"))
    }
}

/// Immutable premultiplied raster shared between the registry, frames and contexts.
#[derive(Clone, Debug)]
pub struct RasterSnapshot {
    pixmap: Arc<vello_cpu::Pixmap>,
}

impl RasterSnapshot {
    /// Snapshot straight-alpha RGBA8 pixels.
    pub fn from_straight_rgba8(rgba: &[u8], width: u32, height: u32) -> PaintResult<Self> {
        let mut bytes = rgba.to_vec();
        premultiply_rgba8_in_place(&mut bytes);
        Self::from_premul_rgba8(&bytes, width, height)
    }

    /// Snapshot already premultiplied RGBA8 pixels.
    pub fn from_premul_rgba8(bytes: &[u8], width: u32, height: u32) -> PaintResult<Self> {
        let pixmap = pixmap_from_premul_bytes(bytes, width, height)?;
        Ok(Self {
            pixmap: Arc::new(pixmap),
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    pub fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    pub fn pixmap(&self) -> &Arc<vello_cpu::Pixmap> {
        &self.pixmap
    }
}

/// Images loaded into one render context, keyed by registry id.
pub type ImageTable = HashMap<ImageId, RasterSnapshot>;

/// A raster target actions are replayed against.
pub trait RasterSurface {
    /// Apply one decoded action. Image ids referenced by `call` are present in `images`.
    fn apply(&mut self, call: &DrawCall, images: &ImageTable);

    /// Capture the current pixels. Ends the frame: open clips are released.
    fn snapshot(&mut self) -> Bitmap;

    /// Drop any per-image caches kept for `id`.
    fn forget_image(&mut self, _id: ImageId) {}
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> PaintResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| PaintError::validation("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| PaintError::validation("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(PaintError::validation("pixmap byte len mismatch"));
    }
    let pixels: Vec<vello_cpu::peniko::color::PremulRgba8> = bytes
        .chunks_exact(4)
        .map(|px| {
            vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]])
        })
        .collect();
    let may_have_opacities = bytes.chunks_exact(4).any(|px| px[3] != 255);
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

pub(crate) fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
