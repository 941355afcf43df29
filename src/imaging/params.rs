//! Parameter types for geometry and compositing operations.
//!
//! These types describe *what* to do, not *how* to do it. They are recorded
//! inside [`Operation`](crate::spec::Operation)s, hashed into the content
//! address, and handed to the [engine](super::engine) as part of
//! [`Primitive`](super::engine::Primitive) calls.
//!
//! ## Types
//!
//! - [`Gravity`]: Compass anchor used for padding and overlay placement.
//! - [`Extend`]: How new pixels are generated when an image is embedded in a larger canvas.
//! - [`BlendMode`]: Compositing mode for overlays (default `over`).
//! - [`Crop`]: Crop anchor/strategy for cover-style resizes.
//! - [`Size`]: Whether a thumbnail may upscale, downscale, or both.
//! - [`Kernel`]: Integer convolution mask; [`Kernel::mild_sharpen`] is the thumbnail default.
//! - [`Color`]: Band values for background fills.
//! - [`ResizeOptions`], [`PadOptions`], [`CompositeOptions`]: per-operation option bundles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parameter string that does not name a known value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseParamError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseParamError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Compass-direction anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gravity {
    #[default]
    #[serde(alias = "center")]
    Centre,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Placement along a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Gravity {
    pub const ALL: [Gravity; 9] = [
        Gravity::Centre,
        Gravity::North,
        Gravity::NorthEast,
        Gravity::East,
        Gravity::SouthEast,
        Gravity::South,
        Gravity::SouthWest,
        Gravity::West,
        Gravity::NorthWest,
    ];

    /// The direction pointing the other way on both axes.
    ///
    /// North and south swap, east and west swap, and compound directions
    /// flip each axis independently. Centre is its own opposite.
    pub fn opposite(self) -> Self {
        match self {
            Gravity::Centre => Gravity::Centre,
            Gravity::North => Gravity::South,
            Gravity::NorthEast => Gravity::SouthWest,
            Gravity::East => Gravity::West,
            Gravity::SouthEast => Gravity::NorthWest,
            Gravity::South => Gravity::North,
            Gravity::SouthWest => Gravity::NorthEast,
            Gravity::West => Gravity::East,
            Gravity::NorthWest => Gravity::SouthEast,
        }
    }

    /// Horizontal and vertical anchors, in that order.
    pub fn anchors(self) -> (Anchor, Anchor) {
        match self {
            Gravity::Centre => (Anchor::Middle, Anchor::Middle),
            Gravity::North => (Anchor::Middle, Anchor::Start),
            Gravity::NorthEast => (Anchor::End, Anchor::Start),
            Gravity::East => (Anchor::End, Anchor::Middle),
            Gravity::SouthEast => (Anchor::End, Anchor::End),
            Gravity::South => (Anchor::Middle, Anchor::End),
            Gravity::SouthWest => (Anchor::Start, Anchor::End),
            Gravity::West => (Anchor::Start, Anchor::Middle),
            Gravity::NorthWest => (Anchor::Start, Anchor::Start),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gravity::Centre => "centre",
            Gravity::North => "north",
            Gravity::NorthEast => "north-east",
            Gravity::East => "east",
            Gravity::SouthEast => "south-east",
            Gravity::South => "south",
            Gravity::SouthWest => "south-west",
            Gravity::West => "west",
            Gravity::NorthWest => "north-west",
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gravity {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        if normalized == "center" {
            return Ok(Gravity::Centre);
        }
        Gravity::ALL
            .into_iter()
            .find(|g| g.as_str() == normalized)
            .ok_or_else(|| ParseParamError::new("gravity", s))
    }
}

/// How pixels outside the source image are generated when embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extend {
    /// Solid fill with the supplied background color.
    #[default]
    Background,
    /// All bands zero (transparent when the image has alpha).
    Black,
    White,
    /// Replicate the nearest edge pixel.
    Copy,
    /// Tile the image.
    Repeat,
    /// Tile the image, mirroring every other copy.
    Mirror,
}

impl FromStr for Extend {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(Extend::Background),
            "black" => Ok(Extend::Black),
            "white" => Ok(Extend::White),
            "copy" => Ok(Extend::Copy),
            "repeat" => Ok(Extend::Repeat),
            "mirror" => Ok(Extend::Mirror),
            _ => Err(ParseParamError::new("extend mode", s)),
        }
    }
}

/// Blend mode used when compositing overlays onto a base image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    Clear,
    Source,
    #[default]
    Over,
    Dest,
    DestOver,
    Add,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Difference,
}

impl FromStr for BlendMode {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "clear" => Ok(BlendMode::Clear),
            "source" => Ok(BlendMode::Source),
            "over" => Ok(BlendMode::Over),
            "dest" => Ok(BlendMode::Dest),
            "dest-over" => Ok(BlendMode::DestOver),
            "add" => Ok(BlendMode::Add),
            "multiply" => Ok(BlendMode::Multiply),
            "screen" => Ok(BlendMode::Screen),
            "darken" => Ok(BlendMode::Darken),
            "lighten" => Ok(BlendMode::Lighten),
            "difference" => Ok(BlendMode::Difference),
            _ => Err(ParseParamError::new("blend mode", s)),
        }
    }
}

/// Where to cut when a cover-style resize overflows the target box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crop {
    #[default]
    #[serde(alias = "center")]
    Centre,
    /// Keep the top/left edge.
    Low,
    /// Keep the bottom/right edge.
    High,
    /// Content-aware; the engine picks the most interesting window.
    Attention,
    /// Content-aware; the engine picks the window with the highest entropy.
    Entropy,
}

impl Crop {
    /// Whether the crop window depends on pixel content.
    pub fn is_content_aware(self) -> bool {
        matches!(self, Crop::Attention | Crop::Entropy)
    }
}

impl FromStr for Crop {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "centre" | "center" => Ok(Crop::Centre),
            "low" => Ok(Crop::Low),
            "high" => Ok(Crop::High),
            "attention" => Ok(Crop::Attention),
            "entropy" => Ok(Crop::Entropy),
            _ => Err(ParseParamError::new("crop", s)),
        }
    }
}

/// Direction constraint for thumbnail scaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    #[default]
    Both,
    /// Only enlarge.
    Up,
    /// Only shrink.
    Down,
    /// Ignore the aspect ratio and hit the box exactly.
    Force,
}

/// Integer convolution mask.
///
/// Each output band is `(Σ mask·pixel + scale/2) / scale + offset`, clamped
/// to the band range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Kernel {
    pub matrix: Vec<Vec<i32>>,
    pub scale: i32,
    pub offset: i32,
}

impl Kernel {
    pub fn new(matrix: Vec<Vec<i32>>, scale: i32) -> Self {
        Self {
            matrix,
            scale,
            offset: 0,
        }
    }

    /// Fast, mild sharpening applied after thumbnail resampling.
    pub fn mild_sharpen() -> Self {
        Self::new(
            vec![vec![-1, -1, -1], vec![-1, 32, -1], vec![-1, -1, -1]],
            24,
        )
    }

    /// Side length of a square mask, or `None` if the mask is empty,
    /// ragged, or has an even side.
    pub fn size(&self) -> Option<usize> {
        let n = self.matrix.len();
        if n == 0 || n % 2 == 0 || self.matrix.iter().any(|row| row.len() != n) {
            return None;
        }
        Some(n)
    }
}

/// Band values for a background fill (gray, gray+alpha, RGB, or RGBA).
///
/// When the color has no alpha band and the target image does, the fill is
/// transparent; otherwise it is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color(pub Vec<f64>);

impl Color {
    pub fn black() -> Self {
        Self(vec![0.0, 0.0, 0.0])
    }

    pub fn transparent() -> Self {
        Self(vec![0.0, 0.0, 0.0, 0.0])
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(vec![r.into(), g.into(), b.into()])
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(vec![r.into(), g.into(), b.into(), a.into()])
    }

    /// Expand to 8-bit RGBA for an image with or without an alpha band.
    pub fn to_rgba8(&self, target_has_alpha: bool) -> [u8; 4] {
        let band = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        let implicit_alpha = if target_has_alpha { 0 } else { 255 };
        match self.0.as_slice() {
            [] => [0, 0, 0, implicit_alpha],
            [g] => [band(*g), band(*g), band(*g), implicit_alpha],
            [g, a] => [band(*g), band(*g), band(*g), band(*a)],
            [r, g, b] => [band(*r), band(*g), band(*b), implicit_alpha],
            [r, g, b, a, ..] => [band(*r), band(*g), band(*b), band(*a)],
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// Options shared by the thumbnail-style resizes (limit, fit, fill, pad).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeOptions {
    /// Cover the box and cut the overflow instead of fitting inside it.
    pub crop: Option<Crop>,
    pub size: Size,
    /// Convolution applied after resampling; `None` disables sharpening.
    pub sharpen: Option<Kernel>,
}

impl ResizeOptions {
    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_sharpen(mut self, sharpen: Option<Kernel>) -> Self {
        self.sharpen = sharpen;
        self
    }

    pub fn without_sharpening(self) -> Self {
        self.with_sharpen(None)
    }
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            crop: None,
            size: Size::Both,
            sharpen: Some(Kernel::mild_sharpen()),
        }
    }
}

/// Options for `resize_and_pad`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PadOptions {
    pub gravity: Gravity,
    pub extend: Extend,
    pub background: Color,
    /// Add an alpha band (if missing) before padding.
    pub alpha: bool,
}

/// Options for `composite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeOptions {
    pub blend: BlendMode,
    /// `None` composites each overlay at its native position.
    pub gravity: Option<Gravity>,
    /// Shift in pixels, `[x, y]`, applied in the direction of `gravity`.
    pub offset: Option<[i32; 2]>,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            blend: BlendMode::Over,
            gravity: Some(Gravity::NorthWest),
            offset: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_gravity_flips_both_axes() {
        assert_eq!(Gravity::North.opposite(), Gravity::South);
        assert_eq!(Gravity::East.opposite(), Gravity::West);
        assert_eq!(Gravity::SouthEast.opposite(), Gravity::NorthWest);
        assert_eq!(Gravity::NorthEast.opposite(), Gravity::SouthWest);
        assert_eq!(Gravity::Centre.opposite(), Gravity::Centre);
    }

    #[test]
    fn opposite_gravity_is_an_involution() {
        for g in Gravity::ALL {
            assert_eq!(g.opposite().opposite(), g);
        }
    }

    #[test]
    fn gravity_parses_both_spellings() {
        assert_eq!("centre".parse::<Gravity>().unwrap(), Gravity::Centre);
        assert_eq!("center".parse::<Gravity>().unwrap(), Gravity::Centre);
        assert_eq!("south-east".parse::<Gravity>().unwrap(), Gravity::SouthEast);
        assert_eq!("north_west".parse::<Gravity>().unwrap(), Gravity::NorthWest);
    }

    #[test]
    fn gravity_rejects_unknown_direction() {
        let err = "foo".parse::<Gravity>().unwrap_err();
        assert_eq!(err.kind, "gravity");
        assert_eq!(err.to_string(), "unknown gravity 'foo'");
    }

    #[test]
    fn gravity_serializes_kebab_case() {
        let json = serde_json::to_string(&Gravity::SouthWest).unwrap();
        assert_eq!(json, "\"south-west\"");
    }

    #[test]
    fn blend_mode_defaults_to_over() {
        assert_eq!(BlendMode::default(), BlendMode::Over);
        assert_eq!("dest_over".parse::<BlendMode>().unwrap(), BlendMode::DestOver);
    }

    #[test]
    fn extend_parses_every_mode() {
        assert_eq!("background".parse::<Extend>().unwrap(), Extend::Background);
        assert_eq!(" Mirror ".parse::<Extend>().unwrap(), Extend::Mirror);
        assert_eq!("copy".parse::<Extend>().unwrap(), Extend::Copy);
        assert_eq!("repeat".parse::<Extend>().unwrap(), Extend::Repeat);
        let err = "smear".parse::<Extend>().unwrap_err();
        assert_eq!(err.to_string(), "unknown extend mode 'smear'");
    }

    #[test]
    fn crop_parses_both_spellings() {
        assert_eq!("center".parse::<Crop>().unwrap(), Crop::Centre);
        assert_eq!("CENTRE".parse::<Crop>().unwrap(), Crop::Centre);
        assert_eq!("entropy".parse::<Crop>().unwrap(), Crop::Entropy);
        assert!("middle".parse::<Crop>().is_err());
    }

    #[test]
    fn only_attention_and_entropy_are_content_aware() {
        assert!(Crop::Attention.is_content_aware());
        assert!(Crop::Entropy.is_content_aware());
        assert!(!Crop::Centre.is_content_aware());
        assert!(!Crop::Low.is_content_aware());
    }

    #[test]
    fn mild_sharpen_mask_sums_to_scale() {
        let k = Kernel::mild_sharpen();
        let sum: i32 = k.matrix.iter().flatten().sum();
        assert_eq!(sum, k.scale);
        assert_eq!(k.size(), Some(3));
    }

    #[test]
    fn ragged_kernel_has_no_size() {
        let k = Kernel::new(vec![vec![1, 2], vec![3]], 1);
        assert_eq!(k.size(), None);
    }

    #[test]
    fn color_alpha_depends_on_target() {
        assert_eq!(Color::black().to_rgba8(false), [0, 0, 0, 255]);
        assert_eq!(Color::black().to_rgba8(true), [0, 0, 0, 0]);
        assert_eq!(Color::rgba(1, 2, 3, 4).to_rgba8(false), [1, 2, 3, 4]);
        assert_eq!(Color(vec![300.0]).to_rgba8(false), [255, 255, 255, 255]);
    }

    #[test]
    fn resize_options_sharpen_by_default() {
        let opts = ResizeOptions::default();
        assert_eq!(opts.sharpen, Some(Kernel::mild_sharpen()));
        assert_eq!(opts.without_sharpening().sharpen, None);
    }

    #[test]
    fn composite_defaults_to_north_west_over() {
        let opts = CompositeOptions::default();
        assert_eq!(opts.gravity, Some(Gravity::NorthWest));
        assert_eq!(opts.blend, BlendMode::Over);
        assert_eq!(opts.offset, None);
    }
}
