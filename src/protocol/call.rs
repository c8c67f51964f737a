use crate::foundation::core::ImageId;
use crate::protocol::color::ColorValue;
use crate::protocol::op::{
    CompositeOp, FillRule, LineCap, LineJoin, Op, TextAlign, TextBaseline, WireEnum,
};
use crate::protocol::wire::{DecodeError, SegmentReader, WireWrite, text_len};

/// One action, as written by the encoder and replayed by a surface.
///
/// Values only exist transiently on either side of the wire: the encoder writes one and drops
/// it, the executor reads one and applies it.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCall {
    Resize { width: u32, height: u32 },
    Save,
    Restore,
    LineWidth(f32),
    LineCap(LineCap),
    LineJoin(LineJoin),
    MiterLimit(f32),
    LineDash(Vec<f32>),
    LineDashOffset(f32),
    GlobalAlpha(f32),
    GlobalCompositeOperation(CompositeOp),
    ImageSmoothingEnabled(bool),
    Font(String),
    TextAlign(TextAlign),
    TextBaseline(TextBaseline),
    ShadowBlur(f32),
    ShadowColor(String),
    ShadowOffsetX(f32),
    ShadowOffsetY(f32),
    FillStyle(ColorValue),
    StrokeStyle(ColorValue),
    SetTransform([f32; 6]),
    Transform([f32; 6]),
    ResetTransform,
    Translate { x: f32, y: f32 },
    Rotate(f32),
    Scale { x: f32, y: f32 },
    BeginPath,
    ClosePath,
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    BezierCurveTo {
        cp1x: f32,
        cp1y: f32,
        cp2x: f32,
        cp2y: f32,
        x: f32,
        y: f32,
    },
    QuadraticCurveTo { cpx: f32, cpy: f32, x: f32, y: f32 },
    Arc {
        x: f32,
        y: f32,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
        counterclockwise: bool,
    },
    ArcTo {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        radius: f32,
    },
    Ellipse {
        x: f32,
        y: f32,
        radius_x: f32,
        radius_y: f32,
        rotation: f32,
        start_angle: f32,
        end_angle: f32,
        counterclockwise: bool,
    },
    Rect { x: f32, y: f32, w: f32, h: f32 },
    /// Corner radii in top-left, top-right, bottom-right, bottom-left order.
    RoundRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radii: [f32; 4],
    },
    Fill(FillRule),
    Stroke,
    Clip(FillRule),
    FillRect { x: f32, y: f32, w: f32, h: f32 },
    StrokeRect { x: f32, y: f32, w: f32, h: f32 },
    ClearRect { x: f32, y: f32, w: f32, h: f32 },
    FillText {
        text: String,
        x: f32,
        y: f32,
        max_width: Option<f32>,
    },
    StrokeText {
        text: String,
        x: f32,
        y: f32,
        max_width: Option<f32>,
    },
    DrawImage { image: ImageId, dx: f32, dy: f32 },
    DrawImageScaled {
        image: ImageId,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
    },
    DrawImageSub {
        image: ImageId,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
    },
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

impl DrawCall {
    pub fn op(&self) -> Op {
        match self {
            Self::Resize { .. } => Op::Resize,
            Self::Save => Op::Save,
            Self::Restore => Op::Restore,
            Self::LineWidth(_) => Op::LineWidth,
            Self::LineCap(_) => Op::LineCap,
            Self::LineJoin(_) => Op::LineJoin,
            Self::MiterLimit(_) => Op::MiterLimit,
            Self::LineDash(_) => Op::LineDash,
            Self::LineDashOffset(_) => Op::LineDashOffset,
            Self::GlobalAlpha(_) => Op::GlobalAlpha,
            Self::GlobalCompositeOperation(_) => Op::GlobalCompositeOperation,
            Self::ImageSmoothingEnabled(_) => Op::ImageSmoothingEnabled,
            Self::Font(_) => Op::Font,
            Self::TextAlign(_) => Op::TextAlign,
            Self::TextBaseline(_) => Op::TextBaseline,
            Self::ShadowBlur(_) => Op::ShadowBlur,
            Self::ShadowColor(_) => Op::ShadowColor,
            Self::ShadowOffsetX(_) => Op::ShadowOffsetX,
            Self::ShadowOffsetY(_) => Op::ShadowOffsetY,
            Self::FillStyle(_) => Op::FillStyle,
            Self::StrokeStyle(_) => Op::StrokeStyle,
            Self::SetTransform(_) => Op::SetTransform,
            Self::Transform(_) => Op::Transform,
            Self::ResetTransform => Op::ResetTransform,
            Self::Translate { .. } => Op::Translate,
            Self::Rotate(_) => Op::Rotate,
            Self::Scale { .. } => Op::Scale,
            Self::BeginPath => Op::BeginPath,
            Self::ClosePath => Op::ClosePath,
            Self::MoveTo { .. } => Op::MoveTo,
            Self::LineTo { .. } => Op::LineTo,
            Self::BezierCurveTo { .. } => Op::BezierCurveTo,
            Self::QuadraticCurveTo { .. } => Op::QuadraticCurveTo,
            Self::Arc { .. } => Op::Arc,
            Self::ArcTo { .. } => Op::ArcTo,
            Self::Ellipse { .. } => Op::Ellipse,
            Self::Rect { .. } => Op::Rect,
            Self::RoundRect { .. } => Op::RoundRect,
            Self::Fill(_) => Op::Fill,
            Self::Stroke => Op::Stroke,
            Self::Clip(_) => Op::Clip,
            Self::FillRect { .. } => Op::FillRect,
            Self::StrokeRect { .. } => Op::StrokeRect,
            Self::ClearRect { .. } => Op::ClearRect,
            Self::FillText { .. } => Op::FillText,
            Self::StrokeText { .. } => Op::StrokeText,
            Self::DrawImage { .. } => Op::DrawImage,
            Self::DrawImageScaled { .. } => Op::DrawImageScaled,
            Self::DrawImageSub { .. } => Op::DrawImageSub,
        }
    }

    /// Image this action samples from, if any.
    pub fn image(&self) -> Option<ImageId> {
        match self {
            Self::DrawImage { image, .. }
            | Self::DrawImageScaled { image, .. }
            | Self::DrawImageSub { image, .. } => Some(*image),
            Self::FillStyle(c) | Self::StrokeStyle(c) => c.image(),
            _ => None,
        }
    }

    /// Bytes written by [`DrawCall::write`], opcode included.
    pub fn encoded_len(&self) -> usize {
        let operands = match self {
            Self::Resize { .. } => 8,
            Self::Save
            | Self::Restore
            | Self::ResetTransform
            | Self::BeginPath
            | Self::ClosePath
            | Self::Stroke => 0,
            Self::LineWidth(_)
            | Self::MiterLimit(_)
            | Self::LineDashOffset(_)
            | Self::GlobalAlpha(_)
            | Self::ShadowBlur(_)
            | Self::ShadowOffsetX(_)
            | Self::ShadowOffsetY(_)
            | Self::Rotate(_) => 4,
            Self::LineCap(_)
            | Self::LineJoin(_)
            | Self::GlobalCompositeOperation(_)
            | Self::ImageSmoothingEnabled(_)
            | Self::TextAlign(_)
            | Self::TextBaseline(_)
            | Self::Fill(_)
            | Self::Clip(_) => 1,
            Self::LineDash(segments) => 2 + 4 * segments.len(),
            Self::Font(s) | Self::ShadowColor(s) => text_len(utf16_len(s)),
            Self::FillStyle(c) | Self::StrokeStyle(c) => c.encoded_len(),
            Self::SetTransform(_) | Self::Transform(_) => 24,
            Self::Translate { .. }
            | Self::Scale { .. }
            | Self::MoveTo { .. }
            | Self::LineTo { .. } => 8,
            Self::BezierCurveTo { .. } => 24,
            Self::QuadraticCurveTo { .. } => 16,
            Self::Arc { .. } => 5 * 4 + 1,
            Self::ArcTo { .. } => 5 * 4,
            Self::Ellipse { .. } => 7 * 4 + 1,
            Self::Rect { .. }
            | Self::FillRect { .. }
            | Self::StrokeRect { .. }
            | Self::ClearRect { .. } => 16,
            Self::RoundRect { .. } => 32,
            Self::FillText { text, .. } | Self::StrokeText { text, .. } => {
                text_len(utf16_len(text)) + 4 + 4 + 1 + 4
            }
            Self::DrawImage { .. } => 4 + 8,
            Self::DrawImageScaled { .. } => 4 + 16,
            Self::DrawImageSub { .. } => 4 + 32,
        };
        1 + operands
    }

    /// Append opcode and operands to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u8(self.op().wire());
        match self {
            Self::Resize { width, height } => {
                out.put_u32(*width);
                out.put_u32(*height);
            }
            Self::Save
            | Self::Restore
            | Self::ResetTransform
            | Self::BeginPath
            | Self::ClosePath
            | Self::Stroke => {}
            Self::LineWidth(v)
            | Self::MiterLimit(v)
            | Self::LineDashOffset(v)
            | Self::GlobalAlpha(v)
            | Self::ShadowBlur(v)
            | Self::ShadowOffsetX(v)
            | Self::ShadowOffsetY(v)
            | Self::Rotate(v) => out.put_f32(*v),
            Self::LineCap(v) => out.put_enum(*v),
            Self::LineJoin(v) => out.put_enum(*v),
            Self::GlobalCompositeOperation(v) => out.put_enum(*v),
            Self::ImageSmoothingEnabled(v) => out.put_bool(*v),
            Self::TextAlign(v) => out.put_enum(*v),
            Self::TextBaseline(v) => out.put_enum(*v),
            Self::Fill(rule) | Self::Clip(rule) => out.put_enum(*rule),
            Self::LineDash(segments) => {
                out.put_u16(segments.len() as u16);
                put_f32s(out, segments);
            }
            Self::Font(s) | Self::ShadowColor(s) => out.put_text(s),
            Self::FillStyle(c) | Self::StrokeStyle(c) => c.write(out),
            Self::SetTransform(m) | Self::Transform(m) => put_f32s(out, m),
            Self::Translate { x, y }
            | Self::Scale { x, y }
            | Self::MoveTo { x, y }
            | Self::LineTo { x, y } => put_f32s(out, &[*x, *y]),
            Self::BezierCurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            } => put_f32s(out, &[*cp1x, *cp1y, *cp2x, *cp2y, *x, *y]),
            Self::QuadraticCurveTo { cpx, cpy, x, y } => put_f32s(out, &[*cpx, *cpy, *x, *y]),
            Self::Arc {
                x,
                y,
                radius,
                start_angle,
                end_angle,
                counterclockwise,
            } => {
                put_f32s(out, &[*x, *y, *radius, *start_angle, *end_angle]);
                out.put_bool(*counterclockwise);
            }
            Self::ArcTo {
                x1,
                y1,
                x2,
                y2,
                radius,
            } => put_f32s(out, &[*x1, *y1, *x2, *y2, *radius]),
            Self::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                rotation,
                start_angle,
                end_angle,
                counterclockwise,
            } => {
                put_f32s(
                    out,
                    &[*x, *y, *radius_x, *radius_y, *rotation, *start_angle, *end_angle],
                );
                out.put_bool(*counterclockwise);
            }
            Self::Rect { x, y, w, h }
            | Self::FillRect { x, y, w, h }
            | Self::StrokeRect { x, y, w, h }
            | Self::ClearRect { x, y, w, h } => put_f32s(out, &[*x, *y, *w, *h]),
            Self::RoundRect { x, y, w, h, radii } => {
                put_f32s(out, &[*x, *y, *w, *h]);
                put_f32s(out, radii);
            }
            Self::FillText {
                text,
                x,
                y,
                max_width,
            }
            | Self::StrokeText {
                text,
                x,
                y,
                max_width,
            } => {
                out.put_text(text);
                put_f32s(out, &[*x, *y]);
                out.put_bool(max_width.is_some());
                out.put_f32(max_width.unwrap_or(0.0));
            }
            Self::DrawImage { image, dx, dy } => {
                out.put_u32(image.0);
                put_f32s(out, &[*dx, *dy]);
            }
            Self::DrawImageScaled {
                image,
                dx,
                dy,
                dw,
                dh,
            } => {
                out.put_u32(image.0);
                put_f32s(out, &[*dx, *dy, *dw, *dh]);
            }
            Self::DrawImageSub {
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
                out.put_u32(image.0);
                put_f32s(out, &[*sx, *sy, *sw, *sh, *dx, *dy, *dw, *dh]);
            }
        }
    }

    /// Read the next action. Returns `None` at the `End` sentinel or the end of the buffer.
    pub fn read(r: &mut SegmentReader<'_>) -> Result<Option<Self>, DecodeError> {
        if r.is_at_end() {
            return Ok(None);
        }
        let offset = r.offset();
        let byte = r.u8()?;
        let op =
            Op::try_from(byte).map_err(|opcode| DecodeError::UnknownOpcode { opcode, offset })?;
        let call = match op {
            Op::End => return Ok(None),
            Op::Resize => Self::Resize {
                width: r.u32()?,
                height: r.u32()?,
            },
            Op::Save => Self::Save,
            Op::Restore => Self::Restore,
            Op::LineWidth => Self::LineWidth(r.f32()?),
            Op::LineCap => Self::LineCap(r.enum_tag()?),
            Op::LineJoin => Self::LineJoin(r.enum_tag()?),
            Op::MiterLimit => Self::MiterLimit(r.f32()?),
            Op::LineDash => {
                let count = r.u16()?;
                let mut segments = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    segments.push(r.f32()?);
                }
                Self::LineDash(segments)
            }
            Op::LineDashOffset => Self::LineDashOffset(r.f32()?),
            Op::GlobalAlpha => Self::GlobalAlpha(r.f32()?),
            Op::GlobalCompositeOperation => Self::GlobalCompositeOperation(r.enum_tag()?),
            Op::ImageSmoothingEnabled => Self::ImageSmoothingEnabled(r.bool()?),
            Op::Font => Self::Font(r.text()?),
            Op::TextAlign => Self::TextAlign(r.enum_tag()?),
            Op::TextBaseline => Self::TextBaseline(r.enum_tag()?),
            Op::ShadowBlur => Self::ShadowBlur(r.f32()?),
            Op::ShadowColor => Self::ShadowColor(r.text()?),
            Op::ShadowOffsetX => Self::ShadowOffsetX(r.f32()?),
            Op::ShadowOffsetY => Self::ShadowOffsetY(r.f32()?),
            Op::FillStyle => Self::FillStyle(ColorValue::read(r)?),
            Op::StrokeStyle => Self::StrokeStyle(ColorValue::read(r)?),
            Op::SetTransform => Self::SetTransform(read_f32s(r)?),
            Op::Transform => Self::Transform(read_f32s(r)?),
            Op::ResetTransform => Self::ResetTransform,
            Op::Translate => Self::Translate {
                x: r.f32()?,
                y: r.f32()?,
            },
            Op::Rotate => Self::Rotate(r.f32()?),
            Op::Scale => Self::Scale {
                x: r.f32()?,
                y: r.f32()?,
            },
            Op::BeginPath => Self::BeginPath,
            Op::ClosePath => Self::ClosePath,
            Op::MoveTo => Self::MoveTo {
                x: r.f32()?,
                y: r.f32()?,
            },
            Op::LineTo => Self::LineTo {
                x: r.f32()?,
                y: r.f32()?,
            },
            Op::BezierCurveTo => {
                let [cp1x, cp1y, cp2x, cp2y, x, y] = read_f32s(r)?;
                Self::BezierCurveTo {
                    cp1x,
                    cp1y,
                    cp2x,
                    cp2y,
                    x,
                    y,
                }
            }
            Op::QuadraticCurveTo => {
                let [cpx, cpy, x, y] = read_f32s(r)?;
                Self::QuadraticCurveTo { cpx, cpy, x, y }
            }
            Op::Arc => {
                let [x, y, radius, start_angle, end_angle] = read_f32s(r)?;
                Self::Arc {
                    x,
                    y,
                    radius,
                    start_angle,
                    end_angle,
                    counterclockwise: r.bool()?,
                }
            }
            Op::ArcTo => {
                let [x1, y1, x2, y2, radius] = read_f32s(r)?;
                Self::ArcTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    radius,
                }
            }
            Op::Ellipse => {
                let [x, y, radius_x, radius_y, rotation, start_angle, end_angle] = read_f32s(r)?;
                Self::Ellipse {
                    x,
                    y,
                    radius_x,
                    radius_y,
                    rotation,
                    start_angle,
                    end_angle,
                    counterclockwise: r.bool()?,
                }
            }
            Op::Rect => {
                let [x, y, w, h] = read_f32s(r)?;
                Self::Rect { x, y, w, h }
            }
            Op::RoundRect => {
                let [x, y, w, h] = read_f32s(r)?;
                Self::RoundRect {
                    x,
                    y,
                    w,
                    h,
                    radii: read_f32s(r)?,
                }
            }
            Op::Fill => Self::Fill(r.enum_tag()?),
            Op::Stroke => Self::Stroke,
            Op::Clip => Self::Clip(r.enum_tag()?),
            Op::FillRect => {
                let [x, y, w, h] = read_f32s(r)?;
                Self::FillRect { x, y, w, h }
            }
            Op::StrokeRect => {
                let [x, y, w, h] = read_f32s(r)?;
                Self::StrokeRect { x, y, w, h }
            }
            Op::ClearRect => {
                let [x, y, w, h] = read_f32s(r)?;
                Self::ClearRect { x, y, w, h }
            }
            Op::FillText => {
                let (text, x, y, max_width) = read_text_args(r)?;
                Self::FillText {
                    text,
                    x,
                    y,
                    max_width,
                }
            }
            Op::StrokeText => {
                let (text, x, y, max_width) = read_text_args(r)?;
                Self::StrokeText {
                    text,
                    x,
                    y,
                    max_width,
                }
            }
            Op::DrawImage => {
                let image = ImageId(r.u32()?);
                let [dx, dy] = read_f32s(r)?;
                Self::DrawImage { image, dx, dy }
            }
            Op::DrawImageScaled => {
                let image = ImageId(r.u32()?);
                let [dx, dy, dw, dh] = read_f32s(r)?;
                Self::DrawImageScaled {
                    image,
                    dx,
                    dy,
                    dw,
                    dh,
                }
            }
            Op::DrawImageSub => {
                let image = ImageId(r.u32()?);
                let [sx, sy, sw, sh, dx, dy, dw, dh] = read_f32s(r)?;
                Self::DrawImageSub {
                    image,
                    sx,
                    sy,
                    sw,
                    sh,
                    dx,
                    dy,
                    dw,
                    dh,
                }
            }
        };
        Ok(Some(call))
    }
}

fn put_f32s(out: &mut Vec<u8>, vs: &[f32]) {
    for v in vs {
        out.put_f32(*v);
    }
}

fn read_f32s<const N: usize>(r: &mut SegmentReader<'_>) -> Result<[f32; N], DecodeError> {
    let mut out = [0f32; N];
    for v in &mut out {
        *v = r.f32()?;
    }
    Ok(out)
}

fn read_text_args(
    r: &mut SegmentReader<'_>,
) -> Result<(String, f32, f32, Option<f32>), DecodeError> {
    let text = r.text()?;
    let [x, y] = read_f32s(r)?;
    let has_max = r.bool()?;
    let max = r.f32()?;
    Ok((text, x, y, has_max.then_some(max)))
}

/// Decode every action of one segment.
///
/// Decoding stops at the first error; the actions read before it are still returned.
pub fn decode_segment(bytes: &[u8]) -> (Vec<DrawCall>, Option<DecodeError>) {
    let mut r = SegmentReader::new(bytes);
    let mut calls = Vec::new();
    loop {
        match DrawCall::read(&mut r) {
            Ok(Some(call)) => calls.push(call),
            Ok(None) => return (calls, None),
            Err(e) => return (calls, Some(e)),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/call.rs"]
mod tests;
