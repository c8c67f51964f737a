use crate::foundation::core::{CanvasSize, ClientId, ImageId, Rect};
use crate::protocol::call::DrawCall;
use crate::protocol::color::{ColorValue, PatternSpec};
use crate::protocol::op::{
    CompositeOp, FillRule, LineCap, LineJoin, PatternRepeat, TextAlign, TextBaseline,
};
use crate::protocol::wire::{text_len, truncate_utf16};
use crate::encode::registry::{SharedRegistry, SourceImage};
use crate::render::surface::RasterSnapshot;
use std::collections::BTreeMap;

/// Segment sizing for one encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderOpts {
    /// Fixed byte capacity of a segment.
    pub segment_capacity: usize,
    /// Bytes left free at the end of a segment. A write that would enter them rotates first.
    pub segment_margin: usize,
}

impl Default for EncoderOpts {
    fn default() -> Self {
        Self {
            segment_capacity: 32 * 1024,
            segment_margin: 1024,
        }
    }
}

impl EncoderOpts {
    /// Bytes of actions one segment may hold.
    pub fn usable(&self) -> usize {
        self.segment_capacity.saturating_sub(self.segment_margin)
    }
}

/// One committed unit of drawing work.
#[derive(Clone, Debug)]
pub struct Frame {
    pub client: ClientId,
    /// Commit sequence number, assigned when the scheduler queues the frame.
    pub seq: u64,
    pub size: CanvasSize,
    /// Segments in commit order.
    pub segments: Vec<Vec<u8>>,
    /// Every image referenced by this frame.
    pub images: BTreeMap<ImageId, RasterSnapshot>,
    /// Regions declared changed; the full canvas when the client declared none.
    pub dirty: Vec<Rect>,
}

impl Frame {
    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }
}

/// Canvas-like drawing API that records calls into binary segments.
///
/// Calls are not validated: NaN coordinates and empty strings pass through unchanged. The only
/// shaping is truncation of variable-length operands that could not fit an empty segment.
pub struct Encoder {
    client: ClientId,
    opts: EncoderOpts,
    registry: SharedRegistry,
    size: CanvasSize,
    started: bool,
    segment: Vec<u8>,
    segments: Vec<Vec<u8>>,
    images: BTreeMap<ImageId, RasterSnapshot>,
    dirty: Vec<Rect>,
    committed: Vec<Frame>,
}

impl Encoder {
    pub fn new(client: ClientId, opts: EncoderOpts, registry: SharedRegistry) -> Self {
        Self {
            client,
            opts,
            registry,
            size: CanvasSize::default(),
            started: false,
            segment: Vec::new(),
            segments: Vec::new(),
            images: BTreeMap::new(),
            dirty: Vec::new(),
            committed: Vec::new(),
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Size of the current (or last) frame.
    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Segments of the frame under construction, including the open one.
    pub fn segment_count(&self) -> usize {
        self.segments.len() + usize::from(!self.segment.is_empty())
    }

    /// Begin a frame. Uncommitted work of a previous frame is discarded.
    pub fn start(&mut self, width: u32, height: u32) {
        if self.started && (self.segment_count() > 0) {
            tracing::debug!(client = self.client.0, "discarding uncommitted frame");
        }
        self.size = CanvasSize::new(width, height);
        self.started = true;
        self.segment = self.fresh_segment();
        self.segments.clear();
        self.images.clear();
        self.dirty.clear();
        self.write(DrawCall::Resize { width, height });
    }

    /// Close the frame under construction and queue it for the scheduler.
    ///
    /// Returns `false` when no frame was started.
    pub fn commit(&mut self) -> bool {
        if !self.started {
            return false;
        }
        self.started = false;
        if !self.segment.is_empty() {
            let full = std::mem::take(&mut self.segment);
            self.segments.push(full);
        }
        let dirty = if self.dirty.is_empty() {
            vec![self.size.full_rect()]
        } else {
            std::mem::take(&mut self.dirty)
        };
        let frame = Frame {
            client: self.client,
            seq: 0,
            size: self.size,
            segments: std::mem::take(&mut self.segments),
            images: std::mem::take(&mut self.images),
            dirty,
        };
        self.registry.borrow_mut().note_commit();
        tracing::debug!(
            client = self.client.0,
            segments = frame.segments.len(),
            bytes = frame.byte_len(),
            images = frame.images.len(),
            "committed frame"
        );
        self.committed.push(frame);
        true
    }

    /// Frames committed since the last call, oldest first.
    pub fn take_committed(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.committed)
    }

    pub fn has_committed(&self) -> bool {
        !self.committed.is_empty()
    }

    /// Declare a changed region of the frame under construction.
    pub fn add_dirty_rect(&mut self, rect: Rect) {
        self.ensure_started();
        self.dirty.push(rect);
    }

    fn fresh_segment(&self) -> Vec<u8> {
        Vec::with_capacity(self.opts.segment_capacity)
    }

    fn ensure_started(&mut self) {
        if !self.started {
            tracing::debug!(
                client = self.client.0,
                w = self.size.width,
                h = self.size.height,
                "implicit frame start"
            );
            self.start(self.size.width, self.size.height);
        }
    }

    fn rotate_segment(&mut self) {
        let fresh = self.fresh_segment();
        let full = std::mem::replace(&mut self.segment, fresh);
        self.segments.push(full);
    }

    fn write(&mut self, call: DrawCall) {
        let len = call.encoded_len();
        if !self.segment.is_empty() && self.segment.len() + len > self.opts.usable() {
            self.rotate_segment();
        }
        call.write(&mut self.segment);
    }

    fn push(&mut self, call: DrawCall) {
        self.ensure_started();
        let call = self.fit(call);
        self.write(call);
    }

    /// Truncate variable-length operands so the action fits an empty segment.
    fn fit(&self, call: DrawCall) -> DrawCall {
        let room = self.opts.usable();
        if call.encoded_len() <= room {
            return call;
        }
        let op = call.op();
        let fitted = match call {
            DrawCall::Font(s) => DrawCall::Font(clamp_text(&s, room, 1)),
            DrawCall::ShadowColor(s) => DrawCall::ShadowColor(clamp_text(&s, room, 1)),
            DrawCall::FillText {
                text,
                x,
                y,
                max_width,
            } => DrawCall::FillText {
                text: clamp_text(&text, room, 1 + 13),
                x,
                y,
                max_width,
            },
            DrawCall::StrokeText {
                text,
                x,
                y,
                max_width,
            } => DrawCall::StrokeText {
                text: clamp_text(&text, room, 1 + 13),
                x,
                y,
                max_width,
            },
            DrawCall::LineDash(mut segments) => {
                let max = (room.saturating_sub(3) / 4).min(usize::from(u16::MAX));
                segments.truncate(max);
                DrawCall::LineDash(segments)
            }
            DrawCall::FillStyle(mut c) => {
                c.fit_within(room.saturating_sub(1));
                DrawCall::FillStyle(c)
            }
            DrawCall::StrokeStyle(mut c) => {
                c.fit_within(room.saturating_sub(1));
                DrawCall::StrokeStyle(c)
            }
            other => other,
        };
        tracing::warn!(
            client = self.client.0,
            ?op,
            room,
            "operand exceeds segment room; truncated"
        );
        fitted
    }

    fn reference(&mut self, image: &SourceImage) -> Option<ImageId> {
        let resolved = self.registry.borrow_mut().resolve(image);
        match resolved {
            Ok((id, snapshot)) => {
                self.images.entry(id).or_insert(snapshot);
                Some(id)
            }
            Err(e) => {
                tracing::warn!(
                    client = self.client.0,
                    error = %e,
                    "image not registered; draw skipped"
                );
                None
            }
        }
    }

    fn reference_paint(&mut self, paint: &ColorValue) {
        let Some(id) = paint.image() else {
            return;
        };
        if self.images.contains_key(&id) {
            return;
        }
        let snapshot = self.registry.borrow_mut().touch(id);
        match snapshot {
            Some(s) => {
                self.images.insert(id, s);
            }
            None => tracing::debug!(image = id.0, "pattern image no longer registered"),
        }
    }

    // State stack.

    pub fn save(&mut self) {
        self.push(DrawCall::Save);
    }

    pub fn restore(&mut self) {
        self.push(DrawCall::Restore);
    }

    // Line style.

    pub fn set_line_width(&mut self, width: f32) {
        self.push(DrawCall::LineWidth(width));
    }

    pub fn set_line_cap(&mut self, cap: LineCap) {
        self.push(DrawCall::LineCap(cap));
    }

    pub fn set_line_join(&mut self, join: LineJoin) {
        self.push(DrawCall::LineJoin(join));
    }

    pub fn set_miter_limit(&mut self, limit: f32) {
        self.push(DrawCall::MiterLimit(limit));
    }

    pub fn set_line_dash(&mut self, segments: &[f32]) {
        self.push(DrawCall::LineDash(segments.to_vec()));
    }

    pub fn set_line_dash_offset(&mut self, offset: f32) {
        self.push(DrawCall::LineDashOffset(offset));
    }

    // Compositing.

    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.push(DrawCall::GlobalAlpha(alpha));
    }

    pub fn set_global_composite_operation(&mut self, op: CompositeOp) {
        self.push(DrawCall::GlobalCompositeOperation(op));
    }

    pub fn set_image_smoothing_enabled(&mut self, enabled: bool) {
        self.push(DrawCall::ImageSmoothingEnabled(enabled));
    }

    // Text style.

    /// CSS font shorthand, e.g. `"bold 16px sans-serif"`.
    pub fn set_font(&mut self, font: &str) {
        self.push(DrawCall::Font(font.to_string()));
    }

    pub fn set_text_align(&mut self, align: TextAlign) {
        self.push(DrawCall::TextAlign(align));
    }

    pub fn set_text_baseline(&mut self, baseline: TextBaseline) {
        self.push(DrawCall::TextBaseline(baseline));
    }

    // Shadows.

    pub fn set_shadow_blur(&mut self, blur: f32) {
        self.push(DrawCall::ShadowBlur(blur));
    }

    pub fn set_shadow_color(&mut self, css: &str) {
        self.push(DrawCall::ShadowColor(css.to_string()));
    }

    pub fn set_shadow_offset_x(&mut self, dx: f32) {
        self.push(DrawCall::ShadowOffsetX(dx));
    }

    pub fn set_shadow_offset_y(&mut self, dy: f32) {
        self.push(DrawCall::ShadowOffsetY(dy));
    }

    // Paints.

    pub fn set_fill_style(&mut self, paint: impl Into<ColorValue>) {
        let paint = paint.into();
        self.ensure_started();
        self.reference_paint(&paint);
        self.push(DrawCall::FillStyle(paint));
    }

    pub fn set_stroke_style(&mut self, paint: impl Into<ColorValue>) {
        let paint = paint.into();
        self.ensure_started();
        self.reference_paint(&paint);
        self.push(DrawCall::StrokeStyle(paint));
    }

    /// Pattern paint over `image`. The image is registered immediately.
    ///
    /// Returns a transparent solid paint when the image cannot be registered.
    pub fn create_pattern(&mut self, image: &SourceImage, repeat: PatternRepeat) -> ColorValue {
        self.ensure_started();
        match self.reference(image) {
            Some(id) => ColorValue::Pattern(PatternSpec {
                image: id,
                repeat,
                transform: None,
            }),
            None => ColorValue::solid("transparent"),
        }
    }

    // Transforms.

    pub fn set_transform(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        self.push(DrawCall::SetTransform([a, b, c, d, e, f]));
    }

    pub fn transform(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        self.push(DrawCall::Transform([a, b, c, d, e, f]));
    }

    pub fn reset_transform(&mut self) {
        self.push(DrawCall::ResetTransform);
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.push(DrawCall::Translate { x, y });
    }

    /// Rotate by `angle` radians, clockwise in canvas space.
    pub fn rotate(&mut self, angle: f32) {
        self.push(DrawCall::Rotate(angle));
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.push(DrawCall::Scale { x, y });
    }

    // Paths.

    pub fn begin_path(&mut self) {
        self.push(DrawCall::BeginPath);
    }

    pub fn close_path(&mut self) {
        self.push(DrawCall::ClosePath);
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.push(DrawCall::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.push(DrawCall::LineTo { x, y });
    }

    pub fn bezier_curve_to(&mut self, cp1x: f32, cp1y: f32, cp2x: f32, cp2y: f32, x: f32, y: f32) {
        self.push(DrawCall::BezierCurveTo {
            cp1x,
            cp1y,
            cp2x,
            cp2y,
            x,
            y,
        });
    }

    pub fn quadratic_curve_to(&mut self, cpx: f32, cpy: f32, x: f32, y: f32) {
        self.push(DrawCall::QuadraticCurveTo { cpx, cpy, x, y });
    }

    pub fn arc(
        &mut self,
        x: f32,
        y: f32,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
        counterclockwise: bool,
    ) {
        self.push(DrawCall::Arc {
            x,
            y,
            radius,
            start_angle,
            end_angle,
            counterclockwise,
        });
    }

    pub fn arc_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, radius: f32) {
        self.push(DrawCall::ArcTo {
            x1,
            y1,
            x2,
            y2,
            radius,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(
        &mut self,
        x: f32,
        y: f32,
        radius_x: f32,
        radius_y: f32,
        rotation: f32,
        start_angle: f32,
        end_angle: f32,
        counterclockwise: bool,
    ) {
        self.push(DrawCall::Ellipse {
            x,
            y,
            radius_x,
            radius_y,
            rotation,
            start_angle,
            end_angle,
            counterclockwise,
        });
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.push(DrawCall::Rect { x, y, w, h });
    }

    /// Rounded rectangle with one radius for every corner.
    pub fn round_rect(&mut self, x: f32, y: f32, w: f32, h: f32, radius: f32) {
        self.round_rect_corners(x, y, w, h, [radius; 4]);
    }

    /// Rounded rectangle with top-left, top-right, bottom-right, bottom-left radii.
    pub fn round_rect_corners(&mut self, x: f32, y: f32, w: f32, h: f32, radii: [f32; 4]) {
        self.push(DrawCall::RoundRect { x, y, w, h, radii });
    }

    // Drawing.

    pub fn fill(&mut self, rule: FillRule) {
        self.push(DrawCall::Fill(rule));
    }

    pub fn stroke(&mut self) {
        self.push(DrawCall::Stroke);
    }

    pub fn clip(&mut self, rule: FillRule) {
        self.push(DrawCall::Clip(rule));
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.push(DrawCall::FillRect { x, y, w, h });
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.push(DrawCall::StrokeRect { x, y, w, h });
    }

    pub fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.push(DrawCall::ClearRect { x, y, w, h });
    }

    pub fn fill_text(&mut self, text: &str, x: f32, y: f32, max_width: Option<f32>) {
        self.push(DrawCall::FillText {
            text: text.to_string(),
            x,
            y,
            max_width,
        });
    }

    pub fn stroke_text(&mut self, text: &str, x: f32, y: f32, max_width: Option<f32>) {
        self.push(DrawCall::StrokeText {
            text: text.to_string(),
            x,
            y,
            max_width,
        });
    }

    /// Draw `image` at its natural size.
    pub fn draw_image(&mut self, image: &SourceImage, dx: f32, dy: f32) {
        self.ensure_started();
        if let Some(id) = self.reference(image) {
            self.push(DrawCall::DrawImage { image: id, dx, dy });
        }
    }

    pub fn draw_image_scaled(&mut self, image: &SourceImage, dx: f32, dy: f32, dw: f32, dh: f32) {
        self.ensure_started();
        if let Some(id) = self.reference(image) {
            self.push(DrawCall::DrawImageScaled {
                image: id,
                dx,
                dy,
                dw,
                dh,
            });
        }
    }

    /// Draw the source rectangle `(sx, sy, sw, sh)` of `image` into `(dx, dy, dw, dh)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image_sub(
        &mut self,
        image: &SourceImage,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
    ) {
        self.ensure_started();
        if let Some(id) = self.reference(image) {
            self.push(DrawCall::DrawImageSub {
                image: id,
                sx,
                sy,
                sw,
                sh,
                dx,
                dy,
                dw,
                dh,
            });
        }
    }
}

/// Longest prefix of `s` that fits in `room` bytes next to `fixed` other bytes.
fn clamp_text(s: &str, room: usize, fixed: usize) -> String {
    let max_units = room.saturating_sub(fixed + text_len(0)) / 2;
    truncate_utf16(s, max_units).to_string()
}

#[cfg(test)]
#[path = "../../tests/unit/encode/encoder.rs"]
mod tests;
