//! Image engine trait and shared types.
//!
//! The [`ImageEngine`] trait is the only place pixels are touched. The rest
//! of the crate records operations, computes geometry, and expands each
//! operation into [`Primitive`] calls; the engine decodes, applies those
//! primitives, and encodes.
//!
//! The production implementation is [`RasterEngine`](super::raster::RasterEngine),
//! built on the `image` crate. Tests use a recording mock that tracks
//! dimensions without allocating pixels.

use super::params::{BlendMode, Color, Crop, Extend, Kernel};
use crate::spec::{Options, Value};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },
}

/// The `shrink` loader option as an integer factor, `None` when it is
/// absent or at most 1.
pub fn shrink_factor(options: &Options) -> Result<Option<u32>, EngineError> {
    let Some(shrink) = options.get("shrink").and_then(Value::as_u64).filter(|&s| s > 1) else {
        return Ok(None);
    };
    u32::try_from(shrink)
        .map(Some)
        .map_err(|_| EngineError::InvalidArguments {
            operation: "load".into(),
            message: format!("shrink factor {shrink} is out of range"),
        })
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// A single engine-level step. Geometry operations expand into sequences of
/// these; [`Primitive::Named`] forwards anything else verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Rotate/flip upright according to the orientation recorded at load time.
    AutoRotate,
    /// Resample to exactly `width`×`height`.
    Resize { width: u32, height: u32 },
    Crop {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },
    /// Content-aware crop to `width`×`height`.
    SmartCrop { width: u32, height: u32, strategy: Crop },
    /// Integer-precision convolution.
    Convolve { kernel: Kernel },
    /// Add a fully opaque alpha band.
    AddAlpha,
    /// Place the image at `(left, top)` on a `width`×`height` canvas.
    Embed {
        left: i64,
        top: i64,
        width: u32,
        height: u32,
        extend: Extend,
        background: Color,
    },
    /// Rotate clockwise about the centre onto a `width`×`height` canvas.
    Rotate {
        degrees: f64,
        width: u32,
        height: u32,
        background: Color,
    },
    SetMetadata { field: String, value: Value },
    RemoveMetadata { field: String },
    Named {
        name: String,
        args: Vec<Value>,
        kwargs: Options,
    },
}

impl Primitive {
    pub fn name(&self) -> &str {
        match self {
            Primitive::AutoRotate => "autorotate",
            Primitive::Resize { .. } => "resize",
            Primitive::Crop { .. } => "crop",
            Primitive::SmartCrop { .. } => "smartcrop",
            Primitive::Convolve { .. } => "conv",
            Primitive::AddAlpha => "addalpha",
            Primitive::Embed { .. } => "embed",
            Primitive::Rotate { .. } => "rotate",
            Primitive::SetMetadata { .. } => "set",
            Primitive::RemoveMetadata { .. } => "remove",
            Primitive::Named { name, .. } => name,
        }
    }
}

/// Trait for image engines.
///
/// Implementations must be safe to share between threads: one engine is
/// shared by every pipeline derived from the same base.
pub trait ImageEngine: Send + Sync {
    /// In-memory image handle. Primitives never mutate a handle; they return
    /// a new one.
    type Image;

    /// Decode `source` with engine-specific loader options.
    fn load(&self, source: &Path, options: &Options) -> Result<Self::Image, EngineError>;

    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    fn has_alpha(&self, image: &Self::Image) -> bool;

    /// Apply one primitive, returning a new handle.
    fn apply(&self, image: &Self::Image, primitive: &Primitive) -> Result<Self::Image, EngineError>;

    /// Blend `overlays`, in order, onto `base` at the origin.
    fn composite(
        &self,
        base: &Self::Image,
        overlays: &[Self::Image],
        blend: BlendMode,
    ) -> Result<Self::Image, EngineError>;

    /// Encode to `destination`; the format follows the file extension.
    fn encode(
        &self,
        image: &Self::Image,
        destination: &Path,
        options: &Options,
    ) -> Result<(), EngineError>;
}
