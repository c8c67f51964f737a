use crate::foundation::core::{Affine, ImageId};
use crate::protocol::op::PatternRepeat;
use crate::protocol::wire::{DecodeError, SegmentReader, WireWrite, text_len, truncate_utf16};

/// Branch tag of an encoded [`ColorValue`].
const TAG_SOLID: u8 = 0;
const TAG_LINEAR: u8 = 1;
const TAG_RADIAL: u8 = 2;
const TAG_CONIC: u8 = 3;
const TAG_PATTERN: u8 = 4;

/// One gradient stop. The color stays as text until a surface parses it.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: String,
}

impl ColorStop {
    fn encoded_len(&self) -> usize {
        4 + text_len(self.color.encode_utf16().count())
    }
}

/// Image pattern paint.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternSpec {
    pub image: ImageId,
    pub repeat: PatternRepeat,
    /// Pattern space to user space, `[a, b, c, d, e, f]`.
    pub transform: Option<[f32; 6]>,
}

impl PatternSpec {
    /// Set the pattern matrix, as `CanvasPattern.setTransform` does.
    pub fn set_transform(&mut self, t: Affine) {
        let c = t.as_coeffs();
        self.transform = Some(c.map(|v| v as f32));
    }
}

/// A fill or stroke paint.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorValue {
    /// CSS color text, parsed at replay time.
    Solid(String),
    Linear {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        stops: Vec<ColorStop>,
    },
    Radial {
        x0: f32,
        y0: f32,
        r0: f32,
        x1: f32,
        y1: f32,
        r1: f32,
        stops: Vec<ColorStop>,
    },
    Conic {
        start_angle: f32,
        x: f32,
        y: f32,
        stops: Vec<ColorStop>,
    },
    Pattern(PatternSpec),
}

impl Default for ColorValue {
    fn default() -> Self {
        Self::Solid("#000".to_string())
    }
}

impl From<&str> for ColorValue {
    fn from(css: &str) -> Self {
        Self::Solid(css.to_string())
    }
}

impl ColorValue {
    pub fn solid(css: impl Into<String>) -> Self {
        Self::Solid(css.into())
    }

    pub fn linear_gradient(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::Linear {
            x0,
            y0,
            x1,
            y1,
            stops: Vec::new(),
        }
    }

    pub fn radial_gradient(x0: f32, y0: f32, r0: f32, x1: f32, y1: f32, r1: f32) -> Self {
        Self::Radial {
            x0,
            y0,
            r0,
            x1,
            y1,
            r1,
            stops: Vec::new(),
        }
    }

    pub fn conic_gradient(start_angle: f32, x: f32, y: f32) -> Self {
        Self::Conic {
            start_angle,
            x,
            y,
            stops: Vec::new(),
        }
    }

    /// Append a stop. Has no effect on solid colors and patterns.
    pub fn add_color_stop(&mut self, offset: f32, color: impl Into<String>) {
        if let Some(stops) = self.stops_mut() {
            stops.push(ColorStop {
                offset,
                color: color.into(),
            });
        }
    }

    /// Builder form of [`ColorValue::add_color_stop`].
    pub fn with_stop(mut self, offset: f32, color: impl Into<String>) -> Self {
        self.add_color_stop(offset, color);
        self
    }

    pub fn stops(&self) -> &[ColorStop] {
        match self {
            Self::Linear { stops, .. } | Self::Radial { stops, .. } | Self::Conic { stops, .. } => {
                stops
            }
            Self::Solid(_) | Self::Pattern(_) => &[],
        }
    }

    fn stops_mut(&mut self) -> Option<&mut Vec<ColorStop>> {
        match self {
            Self::Linear { stops, .. } | Self::Radial { stops, .. } | Self::Conic { stops, .. } => {
                Some(stops)
            }
            Self::Solid(_) | Self::Pattern(_) => None,
        }
    }

    /// Image referenced by a pattern paint.
    pub fn image(&self) -> Option<ImageId> {
        match self {
            Self::Pattern(p) => Some(p.image),
            _ => None,
        }
    }

    /// Bytes written by [`ColorValue::write`].
    pub fn encoded_len(&self) -> usize {
        let stop_table =
            |stops: &[ColorStop]| 2 + stops.iter().map(ColorStop::encoded_len).sum::<usize>();
        1 + match self {
            Self::Solid(css) => text_len(css.encode_utf16().count()),
            Self::Linear { stops, .. } => 4 * 4 + stop_table(stops),
            Self::Radial { stops, .. } => 6 * 4 + stop_table(stops),
            Self::Conic { stops, .. } => 3 * 4 + stop_table(stops),
            Self::Pattern(p) => 4 + 1 + 1 + if p.transform.is_some() { 6 * 4 } else { 0 },
        }
    }

    /// Shrink variable-length parts until the encoding fits in `max_bytes`.
    ///
    /// Stops are dropped from the end; solid color text is cut at a character boundary.
    /// Returns `true` when anything was removed.
    pub fn fit_within(&mut self, max_bytes: usize) -> bool {
        if self.encoded_len() <= max_bytes {
            return false;
        }
        if let Self::Solid(css) = self {
            let max_units = max_bytes.saturating_sub(1 + text_len(0)) / 2;
            let cut = truncate_utf16(css, max_units).len();
            css.truncate(cut);
            return true;
        }
        while self.encoded_len() > max_bytes {
            match self.stops_mut() {
                Some(stops) if !stops.is_empty() => {
                    stops.pop();
                }
                _ => break,
            }
        }
        true
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Solid(css) => {
                out.put_u8(TAG_SOLID);
                out.put_text(css);
            }
            Self::Linear {
                x0,
                y0,
                x1,
                y1,
                stops,
            } => {
                out.put_u8(TAG_LINEAR);
                for v in [x0, y0, x1, y1] {
                    out.put_f32(*v);
                }
                write_stops(out, stops);
            }
            Self::Radial {
                x0,
                y0,
                r0,
                x1,
                y1,
                r1,
                stops,
            } => {
                out.put_u8(TAG_RADIAL);
                for v in [x0, y0, r0, x1, y1, r1] {
                    out.put_f32(*v);
                }
                write_stops(out, stops);
            }
            Self::Conic {
                start_angle,
                x,
                y,
                stops,
            } => {
                out.put_u8(TAG_CONIC);
                for v in [start_angle, x, y] {
                    out.put_f32(*v);
                }
                write_stops(out, stops);
            }
            Self::Pattern(p) => {
                out.put_u8(TAG_PATTERN);
                out.put_u32(p.image.0);
                out.put_enum(p.repeat);
                out.put_bool(p.transform.is_some());
                if let Some(t) = p.transform {
                    for v in t {
                        out.put_f32(v);
                    }
                }
            }
        }
    }

    pub fn read(r: &mut SegmentReader<'_>) -> Result<Self, DecodeError> {
        let offset = r.offset();
        let tag = r.u8()?;
        Ok(match tag {
            TAG_SOLID => Self::Solid(r.text()?),
            TAG_LINEAR => {
                let (x0, y0, x1, y1) = (r.f32()?, r.f32()?, r.f32()?, r.f32()?);
                Self::Linear {
                    x0,
                    y0,
                    x1,
                    y1,
                    stops: read_stops(r)?,
                }
            }
            TAG_RADIAL => {
                let (x0, y0, r0) = (r.f32()?, r.f32()?, r.f32()?);
                let (x1, y1, r1) = (r.f32()?, r.f32()?, r.f32()?);
                Self::Radial {
                    x0,
                    y0,
                    r0,
                    x1,
                    y1,
                    r1,
                    stops: read_stops(r)?,
                }
            }
            TAG_CONIC => {
                let (start_angle, x, y) = (r.f32()?, r.f32()?, r.f32()?);
                Self::Conic {
                    start_angle,
                    x,
                    y,
                    stops: read_stops(r)?,
                }
            }
            TAG_PATTERN => {
                let image = ImageId(r.u32()?);
                let repeat = r.enum_tag::<PatternRepeat>()?;
                let transform = if r.bool()? {
                    let mut t = [0f32; 6];
                    for v in &mut t {
                        *v = r.f32()?;
                    }
                    Some(t)
                } else {
                    None
                };
                Self::Pattern(PatternSpec {
                    image,
                    repeat,
                    transform,
                })
            }
            other => {
                return Err(DecodeError::UnknownTag {
                    what: "color",
                    tag: other,
                    offset,
                });
            }
        })
    }
}

fn write_stops(out: &mut Vec<u8>, stops: &[ColorStop]) {
    out.put_u16(stops.len().min(usize::from(u16::MAX)) as u16);
    for stop in stops.iter().take(usize::from(u16::MAX)) {
        out.put_f32(stop.offset);
        out.put_text(&stop.color);
    }
}

fn read_stops(r: &mut SegmentReader<'_>) -> Result<Vec<ColorStop>, DecodeError> {
    let count = r.u16()?;
    let mut stops = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let offset = r.f32()?;
        let color = r.text()?;
        stops.push(ColorStop { offset, color });
    }
    Ok(stops)
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/color.rs"]
mod tests;
