/// Enumerations that travel as a single byte.
pub trait WireEnum: Copy + TryFrom<u8, Error = u8> {
    /// Human-readable name used in decode errors.
    const WHAT: &'static str;

    /// Byte written for this value.
    fn wire(self) -> u8;
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $what:literal {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Every value, in wire order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(v: u8) -> Result<Self, u8> {
                match v {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl WireEnum for $name {
            const WHAT: &'static str = $what;

            fn wire(self) -> u8 {
                self as u8
            }
        }
    };
}

wire_enum! {
    /// Action opcodes. `End` is the sentinel and terminates a segment.
    pub enum Op as "opcode" {
        End = 0,
        Resize = 1,
        Save = 2,
        Restore = 3,
        LineWidth = 4,
        LineCap = 5,
        LineJoin = 6,
        MiterLimit = 7,
        LineDash = 8,
        LineDashOffset = 9,
        GlobalAlpha = 10,
        GlobalCompositeOperation = 11,
        ImageSmoothingEnabled = 12,
        Font = 13,
        TextAlign = 14,
        TextBaseline = 15,
        ShadowBlur = 16,
        ShadowColor = 17,
        ShadowOffsetX = 18,
        ShadowOffsetY = 19,
        FillStyle = 20,
        StrokeStyle = 21,
        SetTransform = 22,
        Transform = 23,
        ResetTransform = 24,
        Translate = 25,
        Rotate = 26,
        Scale = 27,
        BeginPath = 28,
        ClosePath = 29,
        MoveTo = 30,
        LineTo = 31,
        BezierCurveTo = 32,
        QuadraticCurveTo = 33,
        Arc = 34,
        ArcTo = 35,
        Ellipse = 36,
        Rect = 37,
        RoundRect = 38,
        Fill = 39,
        Stroke = 40,
        Clip = 41,
        FillRect = 42,
        StrokeRect = 43,
        ClearRect = 44,
        FillText = 45,
        StrokeText = 46,
        DrawImage = 47,
        DrawImageScaled = 48,
        DrawImageSub = 49,
    }
}

wire_enum! {
    /// Stroke end caps.
    pub enum LineCap as "line cap" {
        Butt = 0,
        Round = 1,
        Square = 2,
    }
}

wire_enum! {
    /// Stroke corner joins.
    pub enum LineJoin as "line join" {
        Miter = 0,
        Round = 1,
        Bevel = 2,
    }
}

wire_enum! {
    /// Horizontal text anchor relative to the draw position.
    pub enum TextAlign as "text align" {
        Start = 0,
        End = 1,
        Left = 2,
        Right = 3,
        Center = 4,
    }
}

wire_enum! {
    /// Vertical text anchor relative to the draw position.
    pub enum TextBaseline as "text baseline" {
        Alphabetic = 0,
        Top = 1,
        Hanging = 2,
        Middle = 3,
        Ideographic = 4,
        Bottom = 5,
    }
}

wire_enum! {
    /// Winding rule for `fill` and `clip`.
    pub enum FillRule as "fill rule" {
        NonZero = 0,
        EvenOdd = 1,
    }
}

wire_enum! {
    /// Pattern tiling mode.
    pub enum PatternRepeat as "pattern repeat" {
        Repeat = 0,
        RepeatX = 1,
        RepeatY = 2,
        NoRepeat = 3,
    }
}

wire_enum! {
    /// `globalCompositeOperation` values.
    pub enum CompositeOp as "composite operation" {
        SourceOver = 0,
        SourceIn = 1,
        SourceOut = 2,
        SourceAtop = 3,
        DestinationOver = 4,
        DestinationIn = 5,
        DestinationOut = 6,
        DestinationAtop = 7,
        Lighter = 8,
        Copy = 9,
        Xor = 10,
        Multiply = 11,
        Screen = 12,
        Overlay = 13,
        Darken = 14,
        Lighten = 15,
        ColorDodge = 16,
        ColorBurn = 17,
        HardLight = 18,
        SoftLight = 19,
        Difference = 20,
        Exclusion = 21,
        Hue = 22,
        Saturation = 23,
        Color = 24,
        Luminosity = 25,
    }
}

impl Default for LineCap {
    fn default() -> Self {
        Self::Butt
    }
}

impl Default for LineJoin {
    fn default() -> Self {
        Self::Miter
    }
}

impl Default for TextAlign {
    fn default() -> Self {
        Self::Start
    }
}

impl Default for TextBaseline {
    fn default() -> Self {
        Self::Alphabetic
    }
}

impl Default for FillRule {
    fn default() -> Self {
        Self::NonZero
    }
}

impl Default for CompositeOp {
    fn default() -> Self {
        Self::SourceOver
    }
}

impl CompositeOp {
    /// Parse a canvas composite operation name such as `"destination-out"`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Canvas name of this operation.
    pub fn name(self) -> &'static str {
        match self {
            Self::SourceOver => "source-over",
            Self::SourceIn => "source-in",
            Self::SourceOut => "source-out",
            Self::SourceAtop => "source-atop",
            Self::DestinationOver => "destination-over",
            Self::DestinationIn => "destination-in",
            Self::DestinationOut => "destination-out",
            Self::DestinationAtop => "destination-atop",
            Self::Lighter => "lighter",
            Self::Copy => "copy",
            Self::Xor => "xor",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Luminosity => "luminosity",
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/op.rs"]
mod tests;
