//! Pixel sizes and orientation transforms.
//!
//! Transforms follow the CoreGraphics convention used by camera containers:
//! y grows downwards and a point maps as
//! `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.

use serde::{Deserialize, Serialize};

/// A size in pixels that may be fractional or negative mid-computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Component-wise absolute value.
    pub fn abs(self) -> Size {
        Size::new(self.width.abs(), self.height.abs())
    }

    /// Round to whole pixels. Negative components clamp to zero.
    pub fn to_pixels(self) -> PixelSize {
        PixelSize::new(
            self.width.round().max(0.0) as u32,
            self.height.round().max(0.0) as u32,
        )
    }
}

/// Whole-pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 4:2:0 chroma subsampling needs both dimensions even.
    pub fn has_odd_dimension(self) -> bool {
        self.width % 2 == 1 || self.height % 2 == 1
    }

    pub fn as_size(self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

impl std::fmt::Display for PixelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 2D affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Clockwise display rotation for a track with the given natural size.
    ///
    /// `degrees` is snapped to the nearest quarter turn. The translation
    /// keeps the rotated frame in the positive quadrant, the way recorders
    /// write it.
    pub fn rotation_clockwise(degrees: i32, natural: PixelSize) -> Self {
        let w = natural.width as f64;
        let h = natural.height as f64;
        let quarter_turns = ((degrees as f64 / 90.0).round() as i32).rem_euclid(4);
        match quarter_turns {
            1 => Self::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
            2 => Self::new(-1.0, 0.0, 0.0, -1.0, w, h),
            3 => Self::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
            _ => Self::IDENTITY,
        }
    }

    /// Map a point through the full transform.
    pub fn apply_to_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Map a size through the linear part only. Components may come out
    /// negative for rotations and flips.
    pub fn apply_to_size(&self, size: Size) -> Size {
        Size::new(
            self.a * size.width + self.c * size.height,
            self.b * size.width + self.d * size.height,
        )
    }

    /// `self` followed by `other`.
    pub fn concatenating(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    /// `self` followed by a translation.
    pub fn translated_by(&self, tx: f64, ty: f64) -> AffineTransform {
        self.concatenating(&AffineTransform::translation(tx, ty))
    }

    /// Snap the linear part to the nearest of the eight axis-aligned
    /// orientations.
    pub fn orientation(&self) -> Orientation {
        let swaps = self.b.abs() + self.c.abs() > self.a.abs() + self.d.abs();
        let sign = |v: f64| if v < 0.0 { -1 } else { 1 };
        if swaps {
            match (sign(self.b), sign(self.c)) {
                (1, -1) => Orientation::Rotate90,
                (-1, 1) => Orientation::Rotate270,
                (1, 1) => Orientation::Transpose,
                _ => Orientation::Transverse,
            }
        } else {
            match (sign(self.a), sign(self.d)) {
                (1, 1) => Orientation::Rotate0,
                (-1, -1) => Orientation::Rotate180,
                (-1, 1) => Orientation::FlipHorizontal,
                _ => Orientation::FlipVertical,
            }
        }
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned orientation of a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
    /// Mirror across the main diagonal.
    Transpose,
    /// Mirror across the anti-diagonal.
    Transverse,
}

impl Orientation {
    /// Whether width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::Rotate90
                | Orientation::Rotate270
                | Orientation::Transpose
                | Orientation::Transverse
        )
    }

    /// ffmpeg video filters that put a decoded frame upright, or `None` when
    /// the frame is already upright.
    pub fn ffmpeg_filter(self) -> Option<&'static str> {
        match self {
            Orientation::Rotate0 => None,
            Orientation::Rotate90 => Some("transpose=clock"),
            Orientation::Rotate180 => Some("hflip,vflip"),
            Orientation::Rotate270 => Some("transpose=cclock"),
            Orientation::FlipHorizontal => Some("hflip"),
            Orientation::FlipVertical => Some("vflip"),
            Orientation::Transpose => Some("transpose=cclock_flip"),
            Orientation::Transverse => Some("transpose=clock_flip"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Rotate0 => "rotate_0",
            Orientation::Rotate90 => "rotate_90",
            Orientation::Rotate180 => "rotate_180",
            Orientation::Rotate270 => "rotate_270",
            Orientation::FlipHorizontal => "flip_horizontal",
            Orientation::FlipVertical => "flip_vertical",
            Orientation::Transpose => "transpose",
            Orientation::Transverse => "transverse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LANDSCAPE: PixelSize = PixelSize::new(1920, 1080);

    #[test]
    fn test_identity_keeps_size() {
        let size = AffineTransform::IDENTITY.apply_to_size(LANDSCAPE.as_size());
        assert_eq!(size.to_pixels(), LANDSCAPE);
    }

    #[test]
    fn test_portrait_rotation_swaps_axes() {
        let t = AffineTransform::rotation_clockwise(90, LANDSCAPE);
        let raw = t.apply_to_size(LANDSCAPE.as_size());
        assert!(raw.width < 0.0);
        assert_eq!(raw.abs().to_pixels(), PixelSize::new(1080, 1920));
        assert_eq!(t.orientation(), Orientation::Rotate90);
    }

    #[test]
    fn test_rotation_keeps_frame_in_positive_quadrant() {
        for degrees in [0, 90, 180, 270] {
            let t = AffineTransform::rotation_clockwise(degrees, LANDSCAPE);
            let oriented = t.apply_to_size(LANDSCAPE.as_size()).abs();
            for (x, y) in [(0.0, 0.0), (1920.0, 0.0), (0.0, 1080.0), (1920.0, 1080.0)] {
                let (px, py) = t.apply_to_point(x, y);
                assert!(px >= -1e-9 && px <= oriented.width + 1e-9, "{degrees}: x={px}");
                assert!(py >= -1e-9 && py <= oriented.height + 1e-9, "{degrees}: y={py}");
            }
        }
    }

    #[test]
    fn test_negative_and_overflowing_degrees_wrap() {
        assert_eq!(
            AffineTransform::rotation_clockwise(-90, LANDSCAPE).orientation(),
            Orientation::Rotate270
        );
        assert_eq!(
            AffineTransform::rotation_clockwise(450, LANDSCAPE).orientation(),
            Orientation::Rotate90
        );
        assert_eq!(
            AffineTransform::rotation_clockwise(180, LANDSCAPE).orientation(),
            Orientation::Rotate180
        );
    }

    #[test]
    fn test_translated_by_moves_layer_down() {
        let rotate = AffineTransform::rotation_clockwise(90, LANDSCAPE);
        let moved = rotate.translated_by(0.0, 1920.0);
        let (x, y) = moved.apply_to_point(0.0, 0.0);
        assert!((x - 1080.0).abs() < 1e-9);
        assert!((y - 1920.0).abs() < 1e-9);
        // The linear part is untouched.
        assert_eq!(moved.orientation(), Orientation::Rotate90);
    }

    #[test]
    fn test_mirrored_orientations() {
        let mirror = AffineTransform::new(-1.0, 0.0, 0.0, 1.0, 1920.0, 0.0);
        assert_eq!(mirror.orientation(), Orientation::FlipHorizontal);
        assert_eq!(mirror.orientation().ffmpeg_filter(), Some("hflip"));

        let transpose = AffineTransform::new(0.0, 1.0, 1.0, 0.0, 0.0, 0.0);
        assert_eq!(transpose.orientation(), Orientation::Transpose);
        assert!(transpose.orientation().swaps_axes());
    }

    #[test]
    fn test_near_quarter_turn_snaps() {
        let angle = 89.5f64.to_radians();
        let t = AffineTransform::new(angle.cos(), angle.sin(), -angle.sin(), angle.cos(), 0.0, 0.0);
        assert_eq!(t.orientation(), Orientation::Rotate90);
    }

    #[test]
    fn test_odd_dimension_detection() {
        assert!(!PixelSize::new(1080, 3840).has_odd_dimension());
        assert!(PixelSize::new(1081, 3840).has_odd_dimension());
        assert!(PixelSize::new(0, 10).is_empty());
    }

    #[test]
    fn test_transform_serializes_flat() {
        let json = serde_json::to_value(AffineTransform::IDENTITY).unwrap();
        assert_eq!(json["a"], 1.0);
        assert_eq!(json["ty"], 0.0);
    }

    proptest! {
        #[test]
        fn prop_quarter_turns_preserve_area(
            w in 2u32..8000, h in 2u32..8000, turns in 0i32..8,
        ) {
            let natural = PixelSize::new(w, h);
            let t = AffineTransform::rotation_clockwise(turns * 90, natural);
            let oriented = t.apply_to_size(natural.as_size()).abs().to_pixels();
            prop_assert_eq!(oriented.width as u64 * oriented.height as u64, w as u64 * h as u64);
            if t.orientation().swaps_axes() {
                prop_assert_eq!(oriented, PixelSize::new(h, w));
            } else {
                prop_assert_eq!(oriented, natural);
            }
        }
    }
}
