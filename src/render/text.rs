use crate::foundation::error::{PaintError, PaintResult};
use std::sync::Arc;

/// Parley brush placeholder. Glyph paint comes from the canvas fill or stroke style.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct TextBrush;

/// Shaped single-line text and the metrics needed to anchor it.
pub(crate) struct ShapedText {
    pub(crate) layout: parley::Layout<TextBrush>,
    pub(crate) width: f32,
    pub(crate) baseline: f32,
    pub(crate) ascent: f32,
    pub(crate) descent: f32,
}

/// Stateful Parley layout helper bound to one font.
pub(crate) struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    family: String,
    font: vello_cpu::peniko::FontData,
}

impl TextEngine {
    /// Register `font_bytes` and keep its first family for every layout.
    pub(crate) fn new(font_bytes: &Arc<Vec<u8>>) -> PaintResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| PaintError::validation("no font families registered from font bytes"))?;
        let family = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| PaintError::validation("registered font family has no name"))?
            .to_string();
        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes.to_vec()), 0);
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family,
            font,
        })
    }

    pub(crate) fn font(&self) -> &vello_cpu::peniko::FontData {
        &self.font
    }

    /// Shape `text` on one unbroken line.
    pub(crate) fn shape(&mut self, text: &str, size_px: f32) -> PaintResult<ShapedText> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(PaintError::validation("font size must be finite and > 0"));
        }
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrush));
        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);

        let (baseline, ascent, descent) = layout
            .lines()
            .next()
            .map(|line| {
                let m = line.metrics();
                (m.baseline, m.ascent, m.descent)
            })
            .unwrap_or((size_px, size_px, 0.0));
        Ok(ShapedText {
            width: layout.width(),
            layout,
            baseline,
            ascent,
            descent,
        })
    }
}

/// Pixel size from a CSS font shorthand such as `"italic bold 12px serif"`.
///
/// Falls back to the canvas default of 10px.
pub(crate) fn font_size_px(css: &str) -> f32 {
    for token in css.split_whitespace() {
        let size = token.split('/').next().unwrap_or(token);
        let parsed = if let Some(v) = size.strip_suffix("px") {
            v.parse::<f32>().ok()
        } else if let Some(v) = size.strip_suffix("pt") {
            v.parse::<f32>().ok().map(|pt| pt * 4.0 / 3.0)
        } else {
            None
        };
        if let Some(px) = parsed.filter(|px| px.is_finite() && *px > 0.0) {
            return px;
        }
    }
    10.0
}
