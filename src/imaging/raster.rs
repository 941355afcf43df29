//! Pure Rust image engine built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Primitive | Implementation |
//! |---|---|
//! | Decode | `image::ImageReader`, format sniffed or forced by `loader` |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Smart crop | luma-entropy window search |
//! | Convolution | integer mask over RGB bands, alpha untouched |
//! | Embed | RGBA8 canvas with extend modes |
//! | Rotate | `imageproc::geometric_transformations::rotate_about_center` |
//! | Composite | `image::imageops::overlay`; other blend modes per pixel |
//! | Encode | by extension; JPEG and AVIF honour `Q` |
//!
//! Content-aware crops use the same entropy search for both `attention`
//! and `entropy`.
//!
//! ## Metadata
//!
//! The only header field this engine can carry through to the output is the
//! ICC profile, exposed as [`ICC_PROFILE_FIELD`] (an array of bytes). It is
//! read at load time and written by the JPEG, PNG and WebP encoders. Setting
//! any other field is rejected. Removing a field always succeeds, since
//! nothing else from the source header reaches the encoded file.

use super::engine::{Dimensions, EngineError, ImageEngine, Primitive, shrink_factor};
use super::params::{BlendMode, Color, Extend, Kernel};
use crate::spec::{Options, Value, truthy};
use image::codecs::{avif::AvifEncoder, jpeg::JpegEncoder, png::PngEncoder, webp::WebPEncoder};
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{
    DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader, ImageResult, Rgba,
    RgbaImage,
};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Quality used for lossy formats when no `Q` saver option is given.
pub const DEFAULT_QUALITY: u8 = 75;

/// Metadata field holding the ICC profile bytes.
pub const ICC_PROFILE_FIELD: &str = "icc-profile-data";

/// Decoded image plus what the decoder told us about it.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixels: DynamicImage,
    /// Orientation from EXIF, consumed by [`Primitive::AutoRotate`].
    pub orientation: Orientation,
    pub metadata: BTreeMap<String, Value>,
}

impl RasterImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels,
            orientation: Orientation::NoTransforms,
            metadata: BTreeMap::new(),
        }
    }

    fn with_pixels(&self, pixels: DynamicImage) -> Self {
        Self {
            pixels,
            orientation: self.orientation,
            metadata: self.metadata.clone(),
        }
    }
}

/// Engine backed by the `image` crate.
///
/// Stateless, so one instance can be shared by any number of pipelines and
/// threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(source: &Path, err: impl std::fmt::Display) -> EngineError {
    EngineError::Decode(format!("{}: {err}", source.display()))
}

fn invalid(operation: &str, message: impl Into<String>) -> EngineError {
    EngineError::InvalidArguments {
        operation: operation.to_string(),
        message: message.into(),
    }
}

fn has_alpha(pixels: &DynamicImage) -> bool {
    pixels.color().has_alpha()
}

/// Rebuild a [`DynamicImage`] from an RGBA canvas, dropping alpha again if
/// the original had none.
fn from_rgba(canvas: RgbaImage, keep_alpha: bool) -> DynamicImage {
    let image = DynamicImage::ImageRgba8(canvas);
    if keep_alpha {
        image
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

fn add_alpha(pixels: &DynamicImage) -> DynamicImage {
    match pixels {
        _ if has_alpha(pixels) => pixels.clone(),
        DynamicImage::ImageLuma8(_) => DynamicImage::ImageLumaA8(pixels.to_luma_alpha8()),
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLumaA16(pixels.to_luma_alpha16()),
        DynamicImage::ImageRgb16(_) => DynamicImage::ImageRgba16(pixels.to_rgba16()),
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgba32F(pixels.to_rgba32f()),
        _ => DynamicImage::ImageRgba8(pixels.to_rgba8()),
    }
}

/// Convolve the colour bands with an integer mask, replicating edges.
fn convolve(pixels: &DynamicImage, kernel: &Kernel) -> Result<DynamicImage, EngineError> {
    let size = kernel
        .size()
        .ok_or_else(|| invalid("conv", "mask must be square with an odd side"))?;
    let scale = if kernel.scale == 0 { 1 } else { kernel.scale };
    let half = (size / 2) as i64;
    let src = pixels.to_rgba8();
    let (w, h) = src.dimensions();
    let clamp = |v: i64, max: u32| v.clamp(0, max as i64 - 1) as u32;

    let out = RgbaImage::from_fn(w, h, |x, y| {
        let mut acc = [0i64; 3];
        for (ky, row) in kernel.matrix.iter().enumerate() {
            for (kx, &weight) in row.iter().enumerate() {
                if weight == 0 {
                    continue;
                }
                let sx = clamp(x as i64 + kx as i64 - half, w);
                let sy = clamp(y as i64 + ky as i64 - half, h);
                let p = src.get_pixel(sx, sy);
                for (band, sum) in acc.iter_mut().enumerate() {
                    *sum += weight as i64 * p[band] as i64;
                }
            }
        }
        let scale = scale as i64;
        let band = |sum: i64| {
            ((sum + scale / 2).div_euclid(scale) + kernel.offset as i64).clamp(0, 255) as u8
        };
        Rgba([band(acc[0]), band(acc[1]), band(acc[2]), src.get_pixel(x, y)[3]])
    });
    Ok(from_rgba(out, has_alpha(pixels)))
}

/// Map a canvas coordinate outside `0..len` back into the source.
fn extend_index(i: i64, len: u32, extend: Extend) -> Option<u32> {
    let len = len as i64;
    if (0..len).contains(&i) {
        return Some(i as u32);
    }
    match extend {
        Extend::Copy => Some(i.clamp(0, len - 1) as u32),
        Extend::Repeat => Some(i.rem_euclid(len) as u32),
        Extend::Mirror => {
            let m = i.rem_euclid(2 * len);
            Some(if m < len { m } else { 2 * len - 1 - m } as u32)
        }
        Extend::Background | Extend::Black | Extend::White => None,
    }
}

fn embed(
    pixels: &DynamicImage,
    left: i64,
    top: i64,
    width: u32,
    height: u32,
    extend: Extend,
    background: &Color,
) -> DynamicImage {
    let alpha = has_alpha(pixels);
    let src = pixels.to_rgba8();
    let (sw, sh) = src.dimensions();
    let fill = match extend {
        Extend::Black => Rgba([0, 0, 0, if alpha { 0 } else { 255 }]),
        Extend::White => Rgba([255, 255, 255, 255]),
        _ => Rgba(background.to_rgba8(alpha)),
    };

    let canvas = RgbaImage::from_fn(width, height, |x, y| {
        let sx = extend_index(x as i64 - left, sw, extend);
        let sy = extend_index(y as i64 - top, sh, extend);
        match (sx, sy) {
            (Some(sx), Some(sy)) => *src.get_pixel(sx, sy),
            _ => fill,
        }
    });
    from_rgba(canvas, alpha)
}

fn rotate(
    pixels: &DynamicImage,
    degrees: f64,
    width: u32,
    height: u32,
    background: &Color,
) -> DynamicImage {
    match degrees {
        d if d == 0.0 => return pixels.clone(),
        d if d == 90.0 => return pixels.rotate90(),
        d if d == 180.0 => return pixels.rotate180(),
        d if d == 270.0 => return pixels.rotate270(),
        _ => {}
    }

    let alpha = has_alpha(pixels);
    // centre on the final canvas, then turn in place
    let left = (width as i64 - pixels.width() as i64) / 2;
    let top = (height as i64 - pixels.height() as i64) / 2;
    let canvas = embed(pixels, left, top, width, height, Extend::Background, background);
    let rotated = rotate_about_center(
        &canvas.to_rgba8(),
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        Rgba(background.to_rgba8(alpha)),
    );
    from_rgba(rotated, alpha)
}

fn entropy(luma: &image::GrayImage, left: u32, top: u32, width: u32, height: u32) -> f64 {
    let mut histogram = [0u32; 256];
    for y in top..top + height {
        for x in left..left + width {
            histogram[luma.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let total = (width * height) as f64;
    histogram
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Crop to the `width`×`height` window with the most luma entropy.
fn smart_crop(pixels: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = (pixels.width(), pixels.height());
    let (cw, ch) = (width.min(w), height.min(h));
    let luma = pixels.to_luma8();

    let candidates = |excess: u32| {
        let step = (excess / 16).max(1);
        let mut positions: Vec<u32> = (0..=excess).step_by(step as usize).collect();
        if positions.last() != Some(&excess) {
            positions.push(excess);
        }
        positions
    };

    let mut best = (0, 0, f64::MIN);
    for top in candidates(h - ch) {
        for left in candidates(w - cw) {
            let score = entropy(&luma, left, top, cw, ch);
            if score > best.2 {
                best = (left, top, score);
            }
        }
    }
    pixels.crop_imm(best.0, best.1, cw, ch)
}

/// Porter-Duff `over` of straight (non-premultiplied) RGBA.
fn over(src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let (sa, da) = (src[3], dst[3]);
    let alpha = sa + da * (1.0 - sa);
    if alpha <= 0.0 {
        return [0.0; 4];
    }
    let mut out = [0.0, 0.0, 0.0, alpha];
    for band in 0..3 {
        out[band] = (src[band] * sa + dst[band] * da * (1.0 - sa)) / alpha;
    }
    out
}

/// Per-pixel blend for the modes `imageops` has no counterpart for.
fn blend_pixel(mode: BlendMode, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let separable: fn(f32, f32) -> f32 = match mode {
        BlendMode::Clear => return [0.0; 4],
        BlendMode::Source => return src,
        BlendMode::Dest => return dst,
        BlendMode::Over => return over(src, dst),
        BlendMode::DestOver => return over(dst, src),
        BlendMode::Add => {
            let alpha = (src[3] + dst[3]).min(1.0);
            if alpha <= 0.0 {
                return [0.0; 4];
            }
            let mut out = [0.0, 0.0, 0.0, alpha];
            for band in 0..3 {
                out[band] = ((src[band] * src[3] + dst[band] * dst[3]) / alpha).min(1.0);
            }
            return out;
        }
        BlendMode::Multiply => |b, s| b * s,
        BlendMode::Screen => |b, s| b + s - b * s,
        BlendMode::Darken => |b, s| b.min(s),
        BlendMode::Lighten => |b, s| b.max(s),
        BlendMode::Difference => |b, s| (b - s).abs(),
    };
    // mix the blended colour in proportion to the backdrop's coverage
    let mut mixed = src;
    for band in 0..3 {
        mixed[band] = (1.0 - dst[3]) * src[band] + dst[3] * separable(dst[band], src[band]);
    }
    over(mixed, dst)
}

fn to_unit(p: &Rgba<u8>) -> [f32; 4] {
    p.0.map(|v| v as f32 / 255.0)
}

fn from_unit(p: [f32; 4]) -> Rgba<u8> {
    Rgba(p.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
}

fn blend_layer(canvas: &mut RgbaImage, layer: &RgbaImage, mode: BlendMode) {
    for (x, y, dst) in canvas.enumerate_pixels_mut() {
        let src = if x < layer.width() && y < layer.height() {
            to_unit(layer.get_pixel(x, y))
        } else {
            // outside the overlay: transparent source
            [0.0; 4]
        };
        *dst = from_unit(blend_pixel(mode, src, to_unit(dst)));
    }
}

/// Whether the `width`×`height` area at `left`,`top` lies inside `pixels`.
fn area_fits(pixels: &DynamicImage, left: u32, top: u32, width: u32, height: u32) -> bool {
    left.checked_add(width).is_some_and(|right| right <= pixels.width())
        && top.checked_add(height).is_some_and(|bottom| bottom <= pixels.height())
}

fn icc_bytes(value: &Value) -> Result<Vec<u8>, EngineError> {
    value
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
        })
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| {
            invalid(
                "set_metadata",
                format!("{ICC_PROFILE_FIELD} must be a non-empty array of bytes"),
            )
        })
}

/// Write through `encoder`, attaching the ICC profile when the format
/// supports one.
fn write_encoded(
    pixels: &DynamicImage,
    mut encoder: impl ImageEncoder,
    icc: Option<Vec<u8>>,
) -> ImageResult<()> {
    if let Some(icc) = icc {
        if let Err(e) = encoder.set_icc_profile(icc) {
            debug!(error = %e, "dropping ICC profile");
        }
    }
    pixels.write_with_encoder(encoder)
}

fn apply_named(
    image: &RasterImage,
    name: &str,
    args: &[Value],
    kwargs: &Options,
) -> Result<DynamicImage, EngineError> {
    let number = |i: usize, key: &str| {
        args.get(i)
            .or_else(|| kwargs.get(key))
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid(name, format!("missing numeric argument '{key}'")))
    };
    let pixels = &image.pixels;
    match name {
        "invert" => {
            let mut out = pixels.clone();
            out.invert();
            Ok(out)
        }
        "grayscale" => Ok(pixels.grayscale()),
        "flip" => match args.first().or_else(|| kwargs.get("direction")).and_then(Value::as_str) {
            Some("horizontal") | None => Ok(pixels.fliph()),
            Some("vertical") => Ok(pixels.flipv()),
            Some(other) => Err(invalid(name, format!("unknown direction '{other}'"))),
        },
        "blur" | "gaussblur" => Ok(pixels.blur(number(0, "sigma")? as f32)),
        "brighten" => Ok(pixels.brighten(number(0, "value")? as i32)),
        "crop" | "extract_area" => {
            let [left, top, width, height] = [
                number(0, "left")?,
                number(1, "top")?,
                number(2, "width")?,
                number(3, "height")?,
            ]
            .map(|v| v.max(0.0) as u32);
            if width == 0 || height == 0 || !area_fits(pixels, left, top, width, height) {
                return Err(invalid(name, "area is outside the image"));
            }
            Ok(pixels.crop_imm(left, top, width, height))
        }
        other => Err(EngineError::UnknownOperation(other.to_string())),
    }
}

impl ImageEngine for RasterEngine {
    type Image = RasterImage;

    fn load(&self, source: &Path, options: &Options) -> Result<RasterImage, EngineError> {
        let strict = options.get("fail").is_some_and(truthy);
        let reader = ImageReader::open(source).map_err(|e| decode_error(source, e))?;
        let reader = match options.get("loader").and_then(Value::as_str) {
            Some(loader) => {
                let format = ImageFormat::from_extension(loader)
                    .ok_or_else(|| decode_error(source, format!("unknown loader '{loader}'")))?;
                let mut reader = reader;
                reader.set_format(format);
                reader
            }
            None => reader
                .with_guessed_format()
                .map_err(|e| decode_error(source, e))?,
        };

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| decode_error(source, e))?;
        let shrink = shrink_factor(options)?;
        let orientation = match decoder.orientation() {
            Ok(orientation) => orientation,
            Err(e) if strict => return Err(decode_error(source, e)),
            Err(e) => {
                debug!(source = %source.display(), error = %e, "ignoring unreadable orientation");
                Orientation::NoTransforms
            }
        };
        let icc = match decoder.icc_profile() {
            Ok(icc) => icc,
            Err(e) if strict => return Err(decode_error(source, e)),
            Err(e) => {
                debug!(source = %source.display(), error = %e, "ignoring unreadable ICC profile");
                None
            }
        };
        let mut pixels =
            DynamicImage::from_decoder(decoder).map_err(|e| decode_error(source, e))?;

        if let Some(shrink) = shrink {
            pixels = pixels.resize_exact(
                (pixels.width() / shrink).max(1),
                (pixels.height() / shrink).max(1),
                FilterType::Triangle,
            );
        }

        let mut metadata = BTreeMap::new();
        if let Some(icc) = icc.filter(|icc| !icc.is_empty()) {
            metadata.insert(ICC_PROFILE_FIELD.to_string(), Value::from(icc));
        }
        Ok(RasterImage {
            pixels,
            orientation,
            metadata,
        })
    }

    fn dimensions(&self, image: &RasterImage) -> Dimensions {
        Dimensions::new(image.pixels.width(), image.pixels.height())
    }

    fn has_alpha(&self, image: &RasterImage) -> bool {
        has_alpha(&image.pixels)
    }

    fn apply(
        &self,
        image: &RasterImage,
        primitive: &Primitive,
    ) -> Result<RasterImage, EngineError> {
        let pixels = &image.pixels;
        let out = match primitive {
            Primitive::AutoRotate => {
                let mut pixels = pixels.clone();
                pixels.apply_orientation(image.orientation);
                return Ok(RasterImage {
                    pixels,
                    orientation: Orientation::NoTransforms,
                    metadata: image.metadata.clone(),
                });
            }
            Primitive::Resize { width, height } => {
                pixels.resize_exact(*width, *height, FilterType::Lanczos3)
            }
            Primitive::Crop {
                left,
                top,
                width,
                height,
            } => {
                if !area_fits(pixels, *left, *top, *width, *height) {
                    return Err(invalid("crop", "area is outside the image"));
                }
                pixels.crop_imm(*left, *top, *width, *height)
            }
            Primitive::SmartCrop { width, height, .. } => smart_crop(pixels, *width, *height),
            Primitive::Convolve { kernel } => convolve(pixels, kernel)?,
            Primitive::AddAlpha => add_alpha(pixels),
            Primitive::Embed {
                left,
                top,
                width,
                height,
                extend,
                background,
            } => embed(pixels, *left, *top, *width, *height, *extend, background),
            Primitive::Rotate {
                degrees,
                width,
                height,
                background,
            } => rotate(pixels, *degrees, *width, *height, background),
            Primitive::SetMetadata { field, value } => {
                if field != ICC_PROFILE_FIELD {
                    return Err(invalid(
                        "set_metadata",
                        format!("field '{field}' cannot be written to the output"),
                    ));
                }
                icc_bytes(value)?;
                let mut out = image.clone();
                out.metadata.insert(field.clone(), value.clone());
                return Ok(out);
            }
            Primitive::RemoveMetadata { field } => {
                let mut out = image.clone();
                out.metadata.remove(field);
                return Ok(out);
            }
            Primitive::Named { name, args, kwargs } => apply_named(image, name, args, kwargs)?,
        };
        Ok(image.with_pixels(out))
    }

    fn composite(
        &self,
        base: &RasterImage,
        overlays: &[RasterImage],
        blend: BlendMode,
    ) -> Result<RasterImage, EngineError> {
        let mut canvas = base.pixels.to_rgba8();
        let (w, h) = canvas.dimensions();
        for overlay in overlays {
            let layer = overlay.pixels.to_rgba8();
            match blend {
                BlendMode::Over => imageops::overlay(&mut canvas, &layer, 0, 0),
                BlendMode::DestOver => {
                    let mut under = RgbaImage::new(w, h);
                    imageops::replace(&mut under, &layer, 0, 0);
                    imageops::overlay(&mut under, &canvas, 0, 0);
                    canvas = under;
                }
                other => blend_layer(&mut canvas, &layer, other),
            }
        }
        debug!(width = w, height = h, layers = overlays.len(), ?blend, "composited");
        Ok(base.with_pixels(DynamicImage::ImageRgba8(canvas)))
    }

    fn encode(
        &self,
        image: &RasterImage,
        destination: &Path,
        options: &Options,
    ) -> Result<(), EngineError> {
        let ext = destination
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let format = ImageFormat::from_extension(&ext)
            .filter(|f| f.writing_enabled())
            .ok_or_else(|| EngineError::Encode(format!("unsupported output format '{ext}'")))?;
        let quality = options
            .get("Q")
            .and_then(Value::as_u64)
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(DEFAULT_QUALITY);

        let icc = match image.metadata.get(ICC_PROFILE_FIELD) {
            Some(value) => Some(icc_bytes(value)?),
            None => None,
        };

        let file = std::fs::File::create(destination)
            .map_err(|e| EngineError::Encode(format!("{}: {e}", destination.display())))?;
        let mut writer = BufWriter::new(file);
        let pixels = &image.pixels;
        if icc.is_some()
            && !matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)
        {
            debug!(?format, "format carries no ICC profile");
        }
        let result = match format {
            ImageFormat::Jpeg => write_encoded(
                &DynamicImage::ImageRgb8(pixels.to_rgb8()),
                JpegEncoder::new_with_quality(&mut writer, quality),
                icc,
            ),
            ImageFormat::Png => write_encoded(pixels, PngEncoder::new(&mut writer), icc),
            ImageFormat::WebP => {
                // lossless WebP takes 8-bit RGB(A) only
                let eight_bit = if has_alpha(pixels) {
                    DynamicImage::ImageRgba8(pixels.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(pixels.to_rgb8())
                };
                write_encoded(&eight_bit, WebPEncoder::new_lossless(&mut writer), icc)
            }
            ImageFormat::Avif => pixels.write_with_encoder(AvifEncoder::new_with_speed_quality(
                &mut writer,
                6,
                quality,
            )),
            ImageFormat::Gif => {
                DynamicImage::ImageRgba8(pixels.to_rgba8()).write_to(&mut writer, format)
            }
            other => pixels.write_to(&mut writer, other),
        }
        .map_err(|e| e.to_string())
        .and_then(|()| writer.flush().map_err(|e| e.to_string()));

        if let Err(e) = result {
            drop(writer);
            // never leave a half-written file behind
            let _ = std::fs::remove_file(destination);
            return Err(EngineError::Encode(format!("{}: {e}", destination.display())));
        }
        Ok(())
    }
}
