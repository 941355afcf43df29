//! Expansion of recorded operations into engine primitives.
//!
//! The `plan_*` functions are pure: they take the current image geometry and
//! the operation's arguments and return the primitive calls to make.
//! [`apply_operation`] reads the geometry from the engine, plans, and
//! executes; composite is the only operation that loads extra images.

use super::calculations::{
    crop_window, default_dimensions, gravity_offset, normalize_degrees, offset_canvas,
    rotated_dimensions, thumbnail_dimensions,
};
use super::engine::{Dimensions, ImageEngine, Primitive};
use super::params::{Color, Crop, Extend, Gravity, PadOptions, ResizeOptions, Size};
use crate::error::{ProcessingError, Result};
use crate::spec::{Operation, Options};
use std::path::Path;
use tracing::trace;

/// Plan a thumbnail resize: resample, optionally crop, optionally sharpen.
///
/// Returns the primitives and the resulting dimensions.
pub fn plan_thumbnail(
    source: Dimensions,
    width: u32,
    height: u32,
    options: &ResizeOptions,
) -> (Vec<Primitive>, Dimensions) {
    let mut primitives = Vec::new();
    let (rw, rh) = thumbnail_dimensions(
        source.as_tuple(),
        (width, height),
        options.size,
        options.crop.is_some(),
    );
    if (rw, rh) != source.as_tuple() {
        primitives.push(Primitive::Resize {
            width: rw,
            height: rh,
        });
    }

    let mut result = Dimensions::new(rw, rh);
    if let Some(crop) = options.crop {
        match crop_window((rw, rh), (width, height), crop) {
            Some((left, top, cw, ch)) => {
                if (cw, ch) != (rw, rh) {
                    primitives.push(Primitive::Crop {
                        left,
                        top,
                        width: cw,
                        height: ch,
                    });
                }
                result = Dimensions::new(cw, ch);
            }
            None => {
                let (cw, ch) = (width.min(rw), height.min(rh));
                if (cw, ch) != (rw, rh) {
                    primitives.push(Primitive::SmartCrop {
                        width: cw,
                        height: ch,
                        strategy: crop,
                    });
                }
                result = Dimensions::new(cw, ch);
            }
        }
    }

    if let Some(kernel) = &options.sharpen {
        primitives.push(Primitive::Convolve {
            kernel: kernel.clone(),
        });
    }
    (primitives, result)
}

fn missing_dimensions(operation: &str) -> ProcessingError {
    ProcessingError::Configuration(format!(
        "{operation}: either width or height must be specified"
    ))
}

/// Plan `resize_to_limit`: fit inside the box, never enlarging.
pub fn plan_resize_to_limit(
    source: Dimensions,
    width: Option<u32>,
    height: Option<u32>,
    options: &ResizeOptions,
) -> Result<Vec<Primitive>> {
    let (w, h) =
        default_dimensions(width, height).ok_or_else(|| missing_dimensions("resize_to_limit"))?;
    let options = ResizeOptions {
        size: Size::Down,
        ..options.clone()
    };
    Ok(plan_thumbnail(source, w, h, &options).0)
}

/// Plan `resize_to_fit`: fit inside the box, enlarging if needed.
pub fn plan_resize_to_fit(
    source: Dimensions,
    width: Option<u32>,
    height: Option<u32>,
    options: &ResizeOptions,
) -> Result<Vec<Primitive>> {
    let (w, h) =
        default_dimensions(width, height).ok_or_else(|| missing_dimensions("resize_to_fit"))?;
    Ok(plan_thumbnail(source, w, h, options).0)
}

/// Plan `resize_to_fill`: cover the box, then crop. Crops from the centre
/// unless the options say otherwise.
pub fn plan_resize_to_fill(
    source: Dimensions,
    width: u32,
    height: u32,
    options: &ResizeOptions,
) -> Result<Vec<Primitive>> {
    if width == 0 || height == 0 {
        return Err(ProcessingError::Configuration(
            "resize_to_fill: width and height are both required".into(),
        ));
    }
    let options = ResizeOptions {
        crop: Some(options.crop.unwrap_or(Crop::Centre)),
        ..options.clone()
    };
    Ok(plan_thumbnail(source, width, height, &options).0)
}

/// Plan `resize_and_pad`: fit inside the box, then embed in a canvas of
/// exactly the box size.
pub fn plan_resize_and_pad(
    source: Dimensions,
    source_has_alpha: bool,
    width: u32,
    height: u32,
    pad: &PadOptions,
    options: &ResizeOptions,
) -> Result<Vec<Primitive>> {
    if width == 0 || height == 0 {
        return Err(ProcessingError::Configuration(
            "resize_and_pad: width and height are both required".into(),
        ));
    }
    let (mut primitives, resized) = plan_thumbnail(source, width, height, options);
    if pad.alpha && !source_has_alpha {
        primitives.push(Primitive::AddAlpha);
    }
    let (left, top) = gravity_offset(pad.gravity, resized.as_tuple(), (width, height));
    primitives.push(Primitive::Embed {
        left,
        top,
        width,
        height,
        extend: pad.extend,
        background: pad.background.clone(),
    });
    Ok(primitives)
}

/// Plan a clockwise rotation. A full turn is a no-op.
pub fn plan_rotate(
    source: Dimensions,
    degrees: f64,
    background: &Color,
) -> Result<Vec<Primitive>> {
    if !degrees.is_finite() {
        return Err(ProcessingError::Configuration(format!(
            "rotate: angle must be finite, got {degrees}"
        )));
    }
    let degrees = normalize_degrees(degrees);
    if degrees == 0.0 {
        return Ok(Vec::new());
    }
    let (width, height) = rotated_dimensions(source.as_tuple(), degrees);
    Ok(vec![Primitive::Rotate {
        degrees,
        width,
        height,
        background: background.clone(),
    }])
}

/// Plan the placement of one overlay onto a base of size `base`.
///
/// The overlay always gains an alpha band. With a gravity, an offset is
/// first turned into padding by anchoring the overlay at the *opposite*
/// gravity on a canvas grown by the offset; the result is then anchored at
/// `gravity` on a base-sized canvas. All padding is transparent.
pub fn plan_overlay(
    base: Dimensions,
    overlay: Dimensions,
    overlay_has_alpha: bool,
    gravity: Option<Gravity>,
    offset: Option<[i32; 2]>,
) -> Result<Vec<Primitive>> {
    let mut primitives = Vec::new();
    if !overlay_has_alpha {
        primitives.push(Primitive::AddAlpha);
    }
    let Some(gravity) = gravity else {
        return Ok(primitives);
    };

    let mut current = overlay.as_tuple();
    if let Some(offset) = offset {
        let canvas = offset_canvas(base.as_tuple(), offset).ok_or_else(|| {
            ProcessingError::Configuration(format!(
                "composite: offset {offset:?} leaves no room on a {}x{} image",
                base.width, base.height
            ))
        })?;
        let (left, top) = gravity_offset(gravity.opposite(), current, canvas);
        primitives.push(transparent_embed(left, top, canvas));
        current = canvas;
    }

    let (left, top) = gravity_offset(gravity, current, base.as_tuple());
    primitives.push(transparent_embed(left, top, base.as_tuple()));
    Ok(primitives)
}

fn transparent_embed(left: i64, top: i64, (width, height): (u32, u32)) -> Primitive {
    Primitive::Embed {
        left,
        top,
        width,
        height,
        extend: Extend::Background,
        background: Color::transparent(),
    }
}

fn run_primitives<E: ImageEngine>(
    engine: &E,
    mut image: E::Image,
    primitives: &[Primitive],
) -> Result<E::Image> {
    for primitive in primitives {
        trace!(primitive = primitive.name(), "applying primitive");
        image = engine.apply(&image, primitive)?;
    }
    Ok(image)
}

/// Apply a recorded operation, returning the new image handle.
pub fn apply_operation<E: ImageEngine>(
    engine: &E,
    image: E::Image,
    operation: &Operation,
) -> Result<E::Image> {
    let dims = engine.dimensions(&image);
    let primitives = match operation {
        Operation::ResizeToLimit {
            width,
            height,
            options,
        } => plan_resize_to_limit(dims, *width, *height, options)?,
        Operation::ResizeToFit {
            width,
            height,
            options,
        } => plan_resize_to_fit(dims, *width, *height, options)?,
        Operation::ResizeToFill {
            width,
            height,
            options,
        } => plan_resize_to_fill(dims, *width, *height, options)?,
        Operation::ResizeAndPad {
            width,
            height,
            pad,
            options,
        } => {
            let alpha = engine.has_alpha(&image);
            plan_resize_and_pad(dims, alpha, *width, *height, pad, options)?
        }
        Operation::Rotate {
            degrees,
            background,
        } => plan_rotate(dims, *degrees, background)?,
        Operation::Composite { overlays, options } => {
            let mut layers = Vec::with_capacity(overlays.len());
            for path in overlays {
                let layer = engine.load(Path::new(path), &Options::new())?;
                let plan = plan_overlay(
                    dims,
                    engine.dimensions(&layer),
                    engine.has_alpha(&layer),
                    options.gravity,
                    options.offset,
                )?;
                layers.push(run_primitives(engine, layer, &plan)?);
            }
            return Ok(engine.composite(&image, &layers, options.blend)?);
        }
        Operation::SetMetadata { field, value } => vec![Primitive::SetMetadata {
            field: field.clone(),
            value: value.clone(),
        }],
        Operation::RemoveMetadata { field } => vec![Primitive::RemoveMetadata {
            field: field.clone(),
        }],
        Operation::Raw { name, args, kwargs } => vec![Primitive::Named {
            name: name.clone(),
            args: args.clone(),
            kwargs: kwargs.clone(),
        }],
    };
    run_primitives(engine, image, &primitives)
}
