use crate::foundation::core::{Affine, BezPath, CanvasSize, ImageId, Point, Rect, Vec2};
use crate::pool::context::ContextOpts;
use crate::protocol::call::DrawCall;
use crate::protocol::color::{ColorStop, ColorValue};
use crate::protocol::op::{
    CompositeOp, FillRule, LineCap, LineJoin, PatternRepeat, TextAlign, TextBaseline,
};
use crate::render::surface::{Bitmap, ImageTable, RasterSnapshot, RasterSurface};
use crate::render::text::{TextEngine, font_size_px};
use kurbo::Shape;
use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use vello_cpu::peniko::color::{AlphaColor, DynamicColor, Srgb, parse_color};
use vello_cpu::peniko::{BlendMode, Compose, Extend, Gradient, ImageQuality, ImageSampler, Mix};

const PATH_TOLERANCE: f64 = 0.1;

#[derive(Clone, Debug)]
enum Paint {
    Solid(AlphaColor<Srgb>),
    Gradient(Gradient),
    Pattern {
        image: ImageId,
        repeat: PatternRepeat,
        transform: Affine,
    },
}

#[derive(Clone, Copy)]
enum Slot {
    Fill,
    Stroke,
}

/// Coordinate space the geometry of a draw is expressed in.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Space {
    /// Already multiplied by the current transform.
    Device,
    /// Drawn under the current transform.
    User,
}

#[derive(Clone, Debug)]
struct CanvasState {
    transform: Affine,
    fill: Paint,
    stroke: Paint,
    line_width: f64,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f64,
    dash: Vec<f64>,
    dash_offset: f64,
    global_alpha: f32,
    composite: CompositeOp,
    smoothing: bool,
    font_size: f32,
    text_align: TextAlign,
    text_baseline: TextBaseline,
    shadow_blur: f32,
    shadow_color: AlphaColor<Srgb>,
    shadow_offset: Vec2,
    /// Clip paths pushed while this state was current.
    clips: usize,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            fill: Paint::Solid(AlphaColor::BLACK),
            stroke: Paint::Solid(AlphaColor::BLACK),
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: Vec::new(),
            dash_offset: 0.0,
            global_alpha: 1.0,
            composite: CompositeOp::SourceOver,
            smoothing: true,
            font_size: 10.0,
            text_align: TextAlign::Start,
            text_baseline: TextBaseline::Alphabetic,
            shadow_blur: 0.0,
            shadow_color: AlphaColor::TRANSPARENT,
            shadow_offset: Vec2::ZERO,
            clips: 0,
        }
    }
}

/// Layer pushed for one draw, popped by [`VelloSurface::end_paint`].
#[must_use]
struct PaintGuard {
    layer: bool,
}

/// Canvas 2D semantics on a `vello_cpu` render context.
///
/// The current path is kept in device space: points are transformed when they are added, as a
/// canvas does. Strokes map it back through the transform active at stroke time so line widths
/// follow that transform.
pub struct VelloSurface {
    ctx: Option<vello_cpu::RenderContext>,
    size: CanvasSize,
    state: CanvasState,
    stack: Vec<CanvasState>,
    path: BezPath,
    current: Option<Point>,
    subpath_start: Point,
    open_clips: usize,
    text: Option<TextEngine>,
    clear_rgba: Option<[u8; 4]>,
    padded: HashMap<ImageId, Arc<vello_cpu::Pixmap>>,
}

impl VelloSurface {
    pub fn new(opts: &ContextOpts) -> Self {
        let text = opts.font.as_ref().and_then(|bytes| match TextEngine::new(bytes) {
            Ok(engine) => Some(engine),
            Err(e) => {
                tracing::warn!(error = %e, "font rejected; text draws disabled");
                None
            }
        });
        Self {
            ctx: None,
            size: CanvasSize::default(),
            state: CanvasState::default(),
            stack: Vec::new(),
            path: BezPath::new(),
            current: None,
            subpath_start: Point::ZERO,
            open_clips: 0,
            text,
            clear_rgba: opts.clear_rgba,
            padded: HashMap::new(),
        }
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    /// Depth of the save/restore stack.
    pub fn save_depth(&self) -> usize {
        self.stack.len()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(ctx) = self.ctx.as_mut() {
            for _ in 0..self.open_clips {
                ctx.pop_clip_path();
            }
        }
        self.open_clips = 0;
        self.state = CanvasState::default();
        self.stack.clear();
        self.begin_path();

        let dims = (u16::try_from(width), u16::try_from(height));
        let (Ok(w), Ok(h)) = dims else {
            tracing::warn!(width, height, "canvas exceeds raster limit; frame left blank");
            self.ctx = None;
            self.size = CanvasSize::default();
            return;
        };
        self.size = CanvasSize::new(width, height);
        if self.size.is_empty() {
            self.ctx = None;
            return;
        }
        match self.ctx.as_mut() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx.reset(),
            _ => self.ctx = Some(vello_cpu::RenderContext::new(w, h)),
        }
        if let (Some(ctx), Some([r, g, b, a])) = (self.ctx.as_mut(), self.clear_rgba) {
            ctx.set_transform(Affine::IDENTITY);
            ctx.set_paint(AlphaColor::<Srgb>::from_rgba8(r, g, b, a));
            ctx.fill_rect(&self.size.full_rect());
        }
    }

    fn save(&mut self) {
        let mut next = self.state.clone();
        next.clips = 0;
        self.stack.push(std::mem::replace(&mut self.state, next));
    }

    fn restore(&mut self) {
        let Some(prev) = self.stack.pop() else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            for _ in 0..self.state.clips {
                ctx.pop_clip_path();
            }
        }
        self.open_clips = self.open_clips.saturating_sub(self.state.clips);
        self.state = prev;
    }

    // Path construction.

    fn begin_path(&mut self) {
        self.path = BezPath::new();
        self.current = None;
    }

    fn device(&self, p: Point) -> Point {
        self.state.transform * p
    }

    fn move_to(&mut self, p: Point) {
        let d = self.device(p);
        self.path.move_to(d);
        self.current = Some(d);
        self.subpath_start = d;
    }

    fn line_to(&mut self, p: Point) {
        if self.current.is_none() {
            self.move_to(p);
            return;
        }
        let d = self.device(p);
        self.path.line_to(d);
        self.current = Some(d);
    }

    fn ensure_subpath(&mut self, p: Point) {
        if self.current.is_none() {
            self.move_to(p);
        }
    }

    fn curve_to(&mut self, c1: Point, c2: Point, p: Point) {
        self.ensure_subpath(c1);
        let (c1, c2, d) = (self.device(c1), self.device(c2), self.device(p));
        self.path.curve_to(c1, c2, d);
        self.current = Some(d);
    }

    fn quad_to(&mut self, c: Point, p: Point) {
        self.ensure_subpath(c);
        let (c, d) = (self.device(c), self.device(p));
        self.path.quad_to(c, d);
        self.current = Some(d);
    }

    fn close_path(&mut self) {
        if self.current.is_some() {
            self.path.close_path();
            self.current = Some(self.subpath_start);
        }
    }

    fn append_arc(&mut self, arc: kurbo::Arc) {
        let start = ellipse_point(&arc, arc.start_angle);
        if self.current.is_some() {
            self.line_to(start);
        } else {
            self.move_to(start);
        }
        let ctm = self.state.transform;
        for el in arc.append_iter(PATH_TOLERANCE) {
            self.path.push(ctm * el);
        }
        self.current = Some(self.device(ellipse_point(&arc, arc.start_angle + arc.sweep_angle)));
    }

    fn ellipse(
        &mut self,
        center: Point,
        radii: Vec2,
        rotation: f64,
        start: f64,
        end: f64,
        counterclockwise: bool,
    ) {
        if radii.x < 0.0 || radii.y < 0.0 {
            return;
        }
        let sweep = arc_sweep(start, end, counterclockwise);
        self.append_arc(kurbo::Arc::new(center, radii, start, sweep, rotation));
    }

    fn arc_to(&mut self, p1: Point, p2: Point, radius: f64) {
        if radius < 0.0 {
            return;
        }
        self.ensure_subpath(p1);
        let ctm = self.state.transform;
        if ctm.determinant() == 0.0 {
            return;
        }
        let Some(current) = self.current else {
            return;
        };
        let p0 = ctm.inverse() * current;
        let v1 = p0 - p1;
        let v2 = p2 - p1;
        if p0 == p1 || p1 == p2 || radius == 0.0 || v1.cross(v2).abs() < 1e-9 {
            self.line_to(p1);
            return;
        }
        let (a1, a2) = (v1.normalize(), v2.normalize());
        let theta = a1.dot(a2).clamp(-1.0, 1.0).acos();
        let dist = radius / (theta / 2.0).tan();
        let t1 = p1 + a1 * dist;
        let t2 = p1 + a2 * dist;
        let center = p1 + (a1 + a2).normalize() * (radius / (theta / 2.0).sin());
        let start = (t1 - center).atan2();
        let mut sweep = (t2 - center).atan2() - start;
        while sweep > PI {
            sweep -= TAU;
        }
        while sweep < -PI {
            sweep += TAU;
        }
        self.line_to(t1);
        self.append_arc(kurbo::Arc::new(center, (radius, radius), start, sweep, 0.0));
    }

    fn rect(&mut self, r: Rect) {
        self.move_to(Point::new(r.x0, r.y0));
        self.line_to(Point::new(r.x1, r.y0));
        self.line_to(Point::new(r.x1, r.y1));
        self.line_to(Point::new(r.x0, r.y1));
        self.close_path();
    }

    fn round_rect(&mut self, r: Rect, radii: [f32; 4]) {
        if radii.iter().any(|v| *v < 0.0) {
            return;
        }
        let [tl, tr, br, bl] = radii.map(f64::from);
        let shape = kurbo::RoundedRect::from_rect(r.abs(), (tl, tr, br, bl));
        let ctm = self.state.transform;
        for el in shape.path_elements(PATH_TOLERANCE) {
            self.path.push(ctm * el);
        }
        let start = self.device(Point::new(r.x0, r.y0));
        self.path.move_to(start);
        self.current = Some(start);
        self.subpath_start = start;
    }

    // Paints.

    fn resolve(&self, value: &ColorValue) -> Option<Paint> {
        let gradient = |g: Gradient, stops: &[ColorStop]| {
            let mut parsed: Vec<vello_cpu::peniko::ColorStop> = stops
                .iter()
                .filter(|s| s.offset.is_finite())
                .filter_map(|s| {
                    parse_color(&s.color).ok().map(|color| vello_cpu::peniko::ColorStop {
                        offset: s.offset.clamp(0.0, 1.0),
                        color,
                    })
                })
                .collect();
            parsed.sort_by(|a, b| a.offset.total_cmp(&b.offset));
            if parsed.is_empty() {
                return Paint::Solid(AlphaColor::TRANSPARENT);
            }
            Paint::Gradient(g.with_stops(parsed.as_slice()))
        };
        match value {
            ColorValue::Solid(css) => parse_css(css).map(Paint::Solid),
            ColorValue::Linear {
                x0,
                y0,
                x1,
                y1,
                stops,
            } => all_finite(&[*x0, *y0, *x1, *y1]).then(|| {
                gradient(Gradient::new_linear(pt(*x0, *y0), pt(*x1, *y1)), stops)
            }),
            ColorValue::Radial {
                x0,
                y0,
                r0,
                x1,
                y1,
                r1,
                stops,
            } => (all_finite(&[*x0, *y0, *r0, *x1, *y1, *r1]) && *r0 >= 0.0 && *r1 >= 0.0).then(
                || {
                    gradient(
                        Gradient::new_two_point_radial(pt(*x0, *y0), *r0, pt(*x1, *y1), *r1),
                        stops,
                    )
                },
            ),
            ColorValue::Conic {
                start_angle,
                x,
                y,
                stops,
            } => all_finite(&[*start_angle, *x, *y]).then(|| {
                gradient(
                    Gradient::new_sweep(pt(*x, *y), *start_angle, *start_angle + TAU as f32),
                    stops,
                )
            }),
            ColorValue::Pattern(p) => Some(Paint::Pattern {
                image: p.image,
                repeat: p.repeat,
                transform: p.transform.map(affine).unwrap_or(Affine::IDENTITY),
            }),
        }
    }

    /// Paint for `slot` and its transform in user space.
    fn paint_for(
        &mut self,
        slot: Slot,
        images: &ImageTable,
    ) -> Option<(vello_cpu::PaintType, Affine)> {
        let paint = match slot {
            Slot::Fill => self.state.fill.clone(),
            Slot::Stroke => self.state.stroke.clone(),
        };
        match paint {
            Paint::Solid(c) => Some((c.into(), Affine::IDENTITY)),
            Paint::Gradient(g) => Some((g.into(), Affine::IDENTITY)),
            Paint::Pattern {
                image,
                repeat,
                transform,
            } => {
                let snapshot = images.get(&image)?;
                let (x_extend, y_extend) = match repeat {
                    PatternRepeat::Repeat => (Extend::Repeat, Extend::Repeat),
                    PatternRepeat::RepeatX => (Extend::Repeat, Extend::Pad),
                    PatternRepeat::RepeatY => (Extend::Pad, Extend::Repeat),
                    PatternRepeat::NoRepeat => (Extend::Pad, Extend::Pad),
                };
                let (pixmap, transform) = if repeat == PatternRepeat::NoRepeat {
                    // A transparent border makes padding outside the tile transparent.
                    let padded = self
                        .padded
                        .entry(image)
                        .or_insert_with(|| Arc::new(pad_pixmap(snapshot.pixmap())))
                        .clone();
                    (padded, transform * Affine::translate((-1.0, -1.0)))
                } else {
                    (snapshot.pixmap().clone(), transform)
                };
                let sampler = ImageSampler {
                    x_extend,
                    y_extend,
                    quality: self.quality(),
                    ..ImageSampler::default()
                };
                let brush = vello_cpu::Image {
                    image: vello_cpu::ImageSource::Pixmap(pixmap),
                    sampler,
                };
                Some((brush.into(), transform))
            }
        }
    }

    fn quality(&self) -> ImageQuality {
        if self.state.smoothing {
            ImageQuality::Medium
        } else {
            ImageQuality::Low
        }
    }

    fn stroke_style(&self) -> kurbo::Stroke {
        let cap = match self.state.line_cap {
            LineCap::Butt => kurbo::Cap::Butt,
            LineCap::Round => kurbo::Cap::Round,
            LineCap::Square => kurbo::Cap::Square,
        };
        let join = match self.state.line_join {
            LineJoin::Miter => kurbo::Join::Miter,
            LineJoin::Round => kurbo::Join::Round,
            LineJoin::Bevel => kurbo::Join::Bevel,
        };
        let stroke = kurbo::Stroke::new(self.state.line_width)
            .with_caps(cap)
            .with_join(join)
            .with_miter_limit(self.state.miter_limit);
        if self.state.dash.is_empty() {
            stroke
        } else {
            stroke.with_dashes(self.state.dash_offset, self.state.dash.iter().copied())
        }
    }

    /// Configure the context for one draw. Geometry in `space`, paint transform in user space.
    fn begin_paint(
        &mut self,
        paint: vello_cpu::PaintType,
        paint_transform: Affine,
        space: Space,
    ) -> Option<PaintGuard> {
        let ctm = self.state.transform;
        let alpha = self.state.global_alpha;
        let composite = self.state.composite;
        let ctx = self.ctx.as_mut()?;
        let (geometry, paint_space) = match space {
            Space::Device => (Affine::IDENTITY, ctm * paint_transform),
            Space::User => (ctm, paint_transform),
        };
        ctx.set_transform(geometry);
        ctx.set_paint_transform(paint_space);
        ctx.set_paint(paint);
        ctx.set_blend_mode(BlendMode::default());
        let layer = alpha < 1.0 || composite != CompositeOp::SourceOver;
        if layer {
            ctx.push_layer(None, Some(blend_mode(composite)), Some(alpha), None, None);
        }
        Some(PaintGuard { layer })
    }

    fn end_paint(&mut self, guard: PaintGuard) {
        if let Some(ctx) = self.ctx.as_mut() {
            if guard.layer {
                ctx.pop_layer();
            }
            ctx.reset_paint_transform();
        }
    }

    // Drawing.

    fn fill_path(&mut self, rule: FillRule, images: &ImageTable) {
        let Some((paint, tf)) = self.paint_for(Slot::Fill, images) else {
            return;
        };
        let Some(guard) = self.begin_paint(paint, tf, Space::Device) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_fill_rule(fill_rule(rule));
            ctx.fill_path(&self.path);
        }
        self.end_paint(guard);
    }

    fn stroke_path(&mut self, images: &ImageTable) {
        let ctm = self.state.transform;
        if ctm.determinant() == 0.0 {
            return;
        }
        let mut user_path = self.path.clone();
        user_path.apply_affine(ctm.inverse());
        let stroke = self.stroke_style();
        let Some((paint, tf)) = self.paint_for(Slot::Stroke, images) else {
            return;
        };
        let Some(guard) = self.begin_paint(paint, tf, Space::User) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_stroke(stroke);
            ctx.stroke_path(&user_path);
        }
        self.end_paint(guard);
    }

    fn clip(&mut self, rule: FillRule) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        ctx.set_transform(Affine::IDENTITY);
        ctx.set_fill_rule(fill_rule(rule));
        ctx.push_clip_path(&self.path);
        self.state.clips += 1;
        self.open_clips += 1;
    }

    fn shadow(&self) -> Option<(AlphaColor<Srgb>, f32, Vec2)> {
        let s = &self.state;
        let visible = s.shadow_color.components[3] > 0.0
            && (s.shadow_blur > 0.0 || s.shadow_offset != Vec2::ZERO);
        visible.then(|| {
            (
                s.shadow_color.multiply_alpha(s.global_alpha),
                s.shadow_blur / 2.0,
                s.shadow_offset,
            )
        })
    }

    fn fill_rect(&mut self, rect: Rect, images: &ImageTable) {
        let shadow = self.shadow();
        let ctm = self.state.transform;
        let Some((paint, tf)) = self.paint_for(Slot::Fill, images) else {
            return;
        };
        let Some(guard) = self.begin_paint(paint, tf, Space::User) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            if let Some((color, std_dev, offset)) = shadow {
                let main = ctx.paint().clone();
                ctx.set_transform(Affine::translate(offset) * ctm);
                ctx.set_paint(color);
                if std_dev > 0.0 {
                    ctx.fill_blurred_rounded_rect(&rect, 0.0, std_dev);
                } else {
                    ctx.fill_rect(&rect);
                }
                ctx.set_transform(ctm);
                ctx.set_paint(main);
            }
            ctx.fill_rect(&rect);
        }
        self.end_paint(guard);
    }

    fn stroke_rect(&mut self, rect: Rect, images: &ImageTable) {
        let stroke = self.stroke_style();
        let Some((paint, tf)) = self.paint_for(Slot::Stroke, images) else {
            return;
        };
        let Some(guard) = self.begin_paint(paint, tf, Space::User) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_stroke(stroke);
            ctx.stroke_rect(&rect);
        }
        self.end_paint(guard);
    }

    fn clear_rect(&mut self, rect: Rect) {
        let ctm = self.state.transform;
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        ctx.set_transform(ctm);
        ctx.set_paint(AlphaColor::<Srgb>::BLACK);
        ctx.set_blend_mode(BlendMode::new(Mix::Normal, Compose::Clear));
        ctx.fill_rect(&rect);
        ctx.set_blend_mode(BlendMode::default());
    }

    fn draw_image(&mut self, snapshot: &RasterSnapshot, src: Rect, dst: Rect) {
        if src.width() == 0.0 || src.height() == 0.0 || dst.width() == 0.0 || dst.height() == 0.0 {
            return;
        }
        let sampler = ImageSampler {
            quality: self.quality(),
            ..ImageSampler::default()
        };
        let brush = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(snapshot.pixmap().clone()),
            sampler,
        };
        let tf = Affine::translate((dst.x0, dst.y0))
            * Affine::scale_non_uniform(dst.width() / src.width(), dst.height() / src.height())
            * Affine::translate((-src.x0, -src.y0));
        let Some(guard) = self.begin_paint(brush.into(), tf, Space::User) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.fill_rect(&dst.abs());
        }
        self.end_paint(guard);
    }

    fn draw_text(
        &mut self,
        text: &str,
        origin: Point,
        max_width: Option<f32>,
        slot: Slot,
        images: &ImageTable,
    ) {
        let Some(engine) = self.text.as_mut() else {
            tracing::debug!("no font configured; text draw skipped");
            return;
        };
        let shaped = match engine.shape(text, self.state.font_size) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(error = %e, "text shaping failed; draw skipped");
                return;
            }
        };
        let font = engine.font().clone();

        let width = f64::from(shaped.width);
        let dx = match self.state.text_align {
            TextAlign::Start | TextAlign::Left => 0.0,
            TextAlign::End | TextAlign::Right => -width,
            TextAlign::Center => -width / 2.0,
        };
        let (baseline, ascent, descent) = (
            f64::from(shaped.baseline),
            f64::from(shaped.ascent),
            f64::from(shaped.descent),
        );
        let dy = match self.state.text_baseline {
            TextBaseline::Alphabetic => -baseline,
            TextBaseline::Top | TextBaseline::Hanging => -(baseline - ascent),
            TextBaseline::Middle => -(baseline - (ascent - descent) / 2.0),
            TextBaseline::Bottom | TextBaseline::Ideographic => -(baseline + descent),
        };
        let squeeze = max_width
            .map(f64::from)
            .filter(|m| *m > 0.0 && width > *m)
            .map(|m| m / width)
            .unwrap_or(1.0);
        let text_tf = Affine::translate(origin.to_vec2())
            * Affine::scale_non_uniform(squeeze, 1.0)
            * Affine::translate((dx, dy));

        let ctm = self.state.transform;
        let stroke = matches!(slot, Slot::Stroke).then(|| self.stroke_style());
        let Some((paint, tf)) = self.paint_for(slot, images) else {
            return;
        };
        let Some(guard) = self.begin_paint(paint, tf, Space::User) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_transform(ctm * text_tf);
            ctx.set_paint_transform(text_tf.inverse() * tf);
            if let Some(s) = &stroke {
                ctx.set_stroke(s.clone());
            }
            for line in shaped.layout.lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    let builder = ctx.glyph_run(&font).font_size(run.run().font_size());
                    if stroke.is_some() {
                        builder.stroke_glyphs(glyphs);
                    } else {
                        builder.fill_glyphs(glyphs);
                    }
                }
            }
        }
        self.end_paint(guard);
    }
}

impl RasterSurface for VelloSurface {
    fn apply(&mut self, call: &DrawCall, images: &ImageTable) {
        let s = &mut self.state;
        match call {
            DrawCall::Resize { width, height } => self.resize(*width, *height),
            DrawCall::Save => self.save(),
            DrawCall::Restore => self.restore(),
            DrawCall::LineWidth(w) => {
                if w.is_finite() && *w > 0.0 {
                    s.line_width = f64::from(*w);
                }
            }
            DrawCall::LineCap(c) => s.line_cap = *c,
            DrawCall::LineJoin(j) => s.line_join = *j,
            DrawCall::MiterLimit(m) => {
                if m.is_finite() && *m > 0.0 {
                    s.miter_limit = f64::from(*m);
                }
            }
            DrawCall::LineDash(segments) => {
                if segments.iter().all(|v| v.is_finite() && *v >= 0.0) {
                    let mut dash: Vec<f64> = segments.iter().map(|v| f64::from(*v)).collect();
                    if dash.len() % 2 == 1 {
                        dash.extend_from_within(..);
                    }
                    // An all-zero pattern draws nothing useful and cannot be walked.
                    if dash.iter().sum::<f64>() <= 0.0 {
                        dash.clear();
                    }
                    s.dash = dash;
                }
            }
            DrawCall::LineDashOffset(o) => {
                if o.is_finite() {
                    s.dash_offset = f64::from(*o);
                }
            }
            DrawCall::GlobalAlpha(a) => {
                if (0.0..=1.0).contains(a) {
                    s.global_alpha = *a;
                }
            }
            DrawCall::GlobalCompositeOperation(op) => s.composite = *op,
            DrawCall::ImageSmoothingEnabled(on) => s.smoothing = *on,
            DrawCall::Font(css) => s.font_size = font_size_px(css),
            DrawCall::TextAlign(a) => s.text_align = *a,
            DrawCall::TextBaseline(b) => s.text_baseline = *b,
            DrawCall::ShadowBlur(b) => {
                if b.is_finite() && *b >= 0.0 {
                    s.shadow_blur = *b;
                }
            }
            DrawCall::ShadowColor(css) => {
                if let Some(c) = parse_css(css) {
                    s.shadow_color = c;
                }
            }
            DrawCall::ShadowOffsetX(v) => {
                if v.is_finite() {
                    s.shadow_offset.x = f64::from(*v);
                }
            }
            DrawCall::ShadowOffsetY(v) => {
                if v.is_finite() {
                    s.shadow_offset.y = f64::from(*v);
                }
            }
            DrawCall::FillStyle(value) => {
                if let Some(p) = self.resolve(value) {
                    self.state.fill = p;
                }
            }
            DrawCall::StrokeStyle(value) => {
                if let Some(p) = self.resolve(value) {
                    self.state.stroke = p;
                }
            }
            DrawCall::SetTransform(m) => {
                if all_finite(m) {
                    s.transform = affine(*m);
                }
            }
            DrawCall::Transform(m) => {
                if all_finite(m) {
                    s.transform *= affine(*m);
                }
            }
            DrawCall::ResetTransform => s.transform = Affine::IDENTITY,
            DrawCall::Translate { x, y } => {
                if all_finite(&[*x, *y]) {
                    s.transform *= Affine::translate((f64::from(*x), f64::from(*y)));
                }
            }
            DrawCall::Rotate(angle) => {
                if angle.is_finite() {
                    s.transform *= Affine::rotate(f64::from(*angle));
                }
            }
            DrawCall::Scale { x, y } => {
                if all_finite(&[*x, *y]) {
                    s.transform *= Affine::scale_non_uniform(f64::from(*x), f64::from(*y));
                }
            }
            DrawCall::BeginPath => self.begin_path(),
            DrawCall::ClosePath => self.close_path(),
            DrawCall::MoveTo { x, y } => {
                if all_finite(&[*x, *y]) {
                    self.move_to(pt(*x, *y));
                }
            }
            DrawCall::LineTo { x, y } => {
                if all_finite(&[*x, *y]) {
                    self.line_to(pt(*x, *y));
                }
            }
            DrawCall::BezierCurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            } => {
                if all_finite(&[*cp1x, *cp1y, *cp2x, *cp2y, *x, *y]) {
                    self.curve_to(pt(*cp1x, *cp1y), pt(*cp2x, *cp2y), pt(*x, *y));
                }
            }
            DrawCall::QuadraticCurveTo { cpx, cpy, x, y } => {
                if all_finite(&[*cpx, *cpy, *x, *y]) {
                    self.quad_to(pt(*cpx, *cpy), pt(*x, *y));
                }
            }
            DrawCall::Arc {
                x,
                y,
                radius,
                start_angle,
                end_angle,
                counterclockwise,
            } => {
                if all_finite(&[*x, *y, *radius, *start_angle, *end_angle]) {
                    let r = f64::from(*radius);
                    self.ellipse(
                        pt(*x, *y),
                        Vec2::new(r, r),
                        0.0,
                        f64::from(*start_angle),
                        f64::from(*end_angle),
                        *counterclockwise,
                    );
                }
            }
            DrawCall::ArcTo {
                x1,
                y1,
                x2,
                y2,
                radius,
            } => {
                if all_finite(&[*x1, *y1, *x2, *y2, *radius]) {
                    self.arc_to(pt(*x1, *y1), pt(*x2, *y2), f64::from(*radius));
                }
            }
            DrawCall::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                rotation,
                start_angle,
                end_angle,
                counterclockwise,
            } => {
                if all_finite(&[
                    *x,
                    *y,
                    *radius_x,
                    *radius_y,
                    *rotation,
                    *start_angle,
                    *end_angle,
                ]) {
                    self.ellipse(
                        pt(*x, *y),
                        Vec2::new(f64::from(*radius_x), f64::from(*radius_y)),
                        f64::from(*rotation),
                        f64::from(*start_angle),
                        f64::from(*end_angle),
                        *counterclockwise,
                    );
                }
            }
            DrawCall::Rect { x, y, w, h } => {
                if all_finite(&[*x, *y, *w, *h]) {
                    self.rect(rect(*x, *y, *w, *h));
                }
            }
            DrawCall::RoundRect { x, y, w, h, radii } => {
                if all_finite(&[*x, *y, *w, *h]) && all_finite(radii) {
                    self.round_rect(rect(*x, *y, *w, *h), *radii);
                }
            }
            DrawCall::Fill(rule) => self.fill_path(*rule, images),
            DrawCall::Stroke => self.stroke_path(images),
            DrawCall::Clip(rule) => self.clip(*rule),
            DrawCall::FillRect { x, y, w, h } => {
                if all_finite(&[*x, *y, *w, *h]) {
                    self.fill_rect(rect(*x, *y, *w, *h).abs(), images);
                }
            }
            DrawCall::StrokeRect { x, y, w, h } => {
                if all_finite(&[*x, *y, *w, *h]) {
                    self.stroke_rect(rect(*x, *y, *w, *h).abs(), images);
                }
            }
            DrawCall::ClearRect { x, y, w, h } => {
                if all_finite(&[*x, *y, *w, *h]) {
                    self.clear_rect(rect(*x, *y, *w, *h).abs());
                }
            }
            DrawCall::FillText {
                text,
                x,
                y,
                max_width,
            } => {
                if all_finite(&[*x, *y]) {
                    self.draw_text(text, pt(*x, *y), *max_width, Slot::Fill, images);
                }
            }
            DrawCall::StrokeText {
                text,
                x,
                y,
                max_width,
            } => {
                if all_finite(&[*x, *y]) {
                    self.draw_text(text, pt(*x, *y), *max_width, Slot::Stroke, images);
                }
            }
            DrawCall::DrawImage { image, dx, dy } => {
                if let Some(snap) = images.get(image) {
                    let (w, h) = (snap.width() as f32, snap.height() as f32);
                    self.draw_image(snap, rect(0.0, 0.0, w, h), rect(*dx, *dy, w, h));
                }
            }
            DrawCall::DrawImageScaled {
                image,
                dx,
                dy,
                dw,
                dh,
            } => {
                if let Some(snap) = images.get(image) {
                    let (w, h) = (snap.width() as f32, snap.height() as f32);
                    self.draw_image(snap, rect(0.0, 0.0, w, h), rect(*dx, *dy, *dw, *dh));
                }
            }
            DrawCall::DrawImageSub {
                image,
                sx,
                sy,
                sw,
                sh,
                dx,
                dy,
                dw,
                dh,
            } => {
                if let Some(snap) = images.get(image) {
                    self.draw_image(snap, rect(*sx, *sy, *sw, *sh), rect(*dx, *dy, *dw, *dh));
                }
            }
        }
    }

    fn snapshot(&mut self) -> Bitmap {
        let Some(ctx) = self.ctx.as_mut() else {
            return Bitmap::transparent(self.size);
        };
        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(ctx.width(), ctx.height());
        ctx.render_to_pixmap(&mut pixmap);
        Bitmap {
            width: u32::from(pixmap.width()),
            height: u32::from(pixmap.height()),
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        }
    }

    fn forget_image(&mut self, id: ImageId) {
        self.padded.remove(&id);
    }
}

fn pt(x: f32, y: f32) -> Point {
    Point::new(f64::from(x), f64::from(y))
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    let (x, y) = (f64::from(x), f64::from(y));
    Rect::new(x, y, x + f64::from(w), y + f64::from(h))
}

fn affine(m: [f32; 6]) -> Affine {
    Affine::new(m.map(f64::from))
}

fn all_finite(vs: &[f32]) -> bool {
    vs.iter().all(|v| v.is_finite())
}

fn parse_css(css: &str) -> Option<AlphaColor<Srgb>> {
    parse_color(css)
        .ok()
        .map(|c: DynamicColor| c.to_alpha_color::<Srgb>())
}

fn fill_rule(rule: FillRule) -> vello_cpu::peniko::Fill {
    match rule {
        FillRule::NonZero => vello_cpu::peniko::Fill::NonZero,
        FillRule::EvenOdd => vello_cpu::peniko::Fill::EvenOdd,
    }
}

fn blend_mode(op: CompositeOp) -> BlendMode {
    let (mix, compose) = match op {
        CompositeOp::SourceOver => (Mix::Normal, Compose::SrcOver),
        CompositeOp::SourceIn => (Mix::Normal, Compose::SrcIn),
        CompositeOp::SourceOut => (Mix::Normal, Compose::SrcOut),
        CompositeOp::SourceAtop => (Mix::Normal, Compose::SrcAtop),
        CompositeOp::DestinationOver => (Mix::Normal, Compose::DestOver),
        CompositeOp::DestinationIn => (Mix::Normal, Compose::DestIn),
        CompositeOp::DestinationOut => (Mix::Normal, Compose::DestOut),
        CompositeOp::DestinationAtop => (Mix::Normal, Compose::DestAtop),
        CompositeOp::Lighter => (Mix::Normal, Compose::Plus),
        CompositeOp::Copy => (Mix::Normal, Compose::Copy),
        CompositeOp::Xor => (Mix::Normal, Compose::Xor),
        CompositeOp::Multiply => (Mix::Multiply, Compose::SrcOver),
        CompositeOp::Screen => (Mix::Screen, Compose::SrcOver),
        CompositeOp::Overlay => (Mix::Overlay, Compose::SrcOver),
        CompositeOp::Darken => (Mix::Darken, Compose::SrcOver),
        CompositeOp::Lighten => (Mix::Lighten, Compose::SrcOver),
        CompositeOp::ColorDodge => (Mix::ColorDodge, Compose::SrcOver),
        CompositeOp::ColorBurn => (Mix::ColorBurn, Compose::SrcOver),
        CompositeOp::HardLight => (Mix::HardLight, Compose::SrcOver),
        CompositeOp::SoftLight => (Mix::SoftLight, Compose::SrcOver),
        CompositeOp::Difference => (Mix::Difference, Compose::SrcOver),
        CompositeOp::Exclusion => (Mix::Exclusion, Compose::SrcOver),
        CompositeOp::Hue => (Mix::Hue, Compose::SrcOver),
        CompositeOp::Saturation => (Mix::Saturation, Compose::SrcOver),
        CompositeOp::Color => (Mix::Color, Compose::SrcOver),
        CompositeOp::Luminosity => (Mix::Luminosity, Compose::SrcOver),
    };
    BlendMode::new(mix, compose)
}

/// Signed sweep for a canvas arc from `start` to `end`.
fn arc_sweep(start: f64, end: f64, counterclockwise: bool) -> f64 {
    if !counterclockwise {
        if end - start >= TAU {
            TAU
        } else {
            (end - start).rem_euclid(TAU)
        }
    } else if start - end >= TAU {
        -TAU
    } else {
        -(start - end).rem_euclid(TAU)
    }
}

fn ellipse_point(arc: &kurbo::Arc, angle: f64) -> Point {
    let local = Point::new(arc.radii.x * angle.cos(), arc.radii.y * angle.sin());
    arc.center + (Affine::rotate(arc.x_rotation) * local).to_vec2()
}

/// Copy of `src` with a one pixel transparent border.
fn pad_pixmap(src: &vello_cpu::Pixmap) -> vello_cpu::Pixmap {
    let (w, h) = (usize::from(src.width()), usize::from(src.height()));
    let mut out = vello_cpu::Pixmap::new(
        src.width().saturating_add(2),
        src.height().saturating_add(2),
    );
    let out_w = usize::from(out.width());
    let src_bytes = src.data_as_u8_slice();
    let dst = out.data_as_u8_slice_mut();
    for row in 0..h {
        let from = row * w * 4;
        let to = ((row + 1) * out_w + 1) * 4;
        if let (Some(s), Some(d)) = (
            src_bytes.get(from..from + w * 4),
            dst.get_mut(to..to + w * 4),
        ) {
            d.copy_from_slice(s);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/vello.rs"]
mod tests;
