//! Image processing: geometry, parameters, and the engine boundary.
//!
//! | Concern | Where |
//! |---|---|
//! | **Dimension math** | [`calculations`]: thumbnail factors, crop windows, gravity |
//! | **Parameters** | [`params`]: gravity, crop, extend, blend, kernels, colours |
//! | **Engine contract** | [`ImageEngine`] + [`Primitive`] |
//! | **Expansion** | [`operations`]: recorded operation → primitive sequence |
//! | **Pixels** | [`RasterEngine`]: the `image` crate |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Engine**: [`ImageEngine`] trait + [`RasterEngine`]
//! - **Operations**: Planning functions combining calculations + engine

pub mod calculations;
pub mod engine;
pub mod operations;
pub mod params;
pub mod raster;

pub use engine::{Dimensions, EngineError, ImageEngine, Primitive};
pub use operations::apply_operation;
pub use params::{
    Anchor, BlendMode, Color, CompositeOptions, Crop, Extend, Gravity, Kernel, PadOptions,
    ParseParamError, ResizeOptions, Size,
};
pub use raster::{ICC_PROFILE_FIELD, RasterEngine, RasterImage};
