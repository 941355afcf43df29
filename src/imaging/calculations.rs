//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Anchor, Crop, Gravity, Size};

/// Stand-in for an omitted dimension: large enough that it never constrains.
pub const MAX_COORD: u32 = 10_000_000;

/// Substitute [`MAX_COORD`] for an omitted dimension.
///
/// Zero counts as omitted. Returns `None` when both are omitted.
///
/// # Examples
/// ```
/// # use image_processing::imaging::calculations::{default_dimensions, MAX_COORD};
/// assert_eq!(default_dimensions(Some(400), None), Some((400, MAX_COORD)));
/// assert_eq!(default_dimensions(None, None), None);
/// ```
pub fn default_dimensions(width: Option<u32>, height: Option<u32>) -> Option<(u32, u32)> {
    let width = width.filter(|&w| w > 0);
    let height = height.filter(|&h| h > 0);
    if width.is_none() && height.is_none() {
        return None;
    }
    Some((width.unwrap_or(MAX_COORD), height.unwrap_or(MAX_COORD)))
}

/// Calculate the resampled size of a thumbnail, before any crop.
///
/// The shrink factor is chosen per axis; a fitting resize takes the larger
/// one (so the whole image lands inside the box) and a cropping resize takes
/// the smaller one (so the image covers the box). `size` then clamps the
/// factor so the image only grows, only shrinks, or either.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `target` - Bounding box (width, height)
/// * `size` - Scaling direction constraint
/// * `crop` - Whether the result will be cropped to the box afterwards
///
/// # Examples
/// ```
/// # use image_processing::imaging::calculations::thumbnail_dimensions;
/// # use image_processing::imaging::Size;
/// // 600x800 portrait limited to 400x400 → 300x400
/// assert_eq!(thumbnail_dimensions((600, 800), (400, 400), Size::Down, false), (300, 400));
/// ```
pub fn thumbnail_dimensions(
    source: (u32, u32),
    target: (u32, u32),
    size: Size,
    crop: bool,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if size == Size::Force {
        return (tgt_w.max(1), tgt_h.max(1));
    }

    let hshrink = src_w as f64 / tgt_w.max(1) as f64;
    let vshrink = src_h as f64 / tgt_h.max(1) as f64;

    let shrink = if crop {
        hshrink.min(vshrink)
    } else {
        hshrink.max(vshrink)
    };
    let shrink = match size {
        Size::Down => shrink.max(1.0),
        Size::Up => shrink.min(1.0),
        Size::Both | Size::Force => shrink,
    };

    let w = (src_w as f64 / shrink).round().max(1.0) as u32;
    let h = (src_h as f64 / shrink).round().max(1.0) as u32;
    (w, h)
}

/// Calculate a fixed crop window `(left, top, width, height)`.
///
/// The window is the target box clipped to the image. Returns `None` for
/// content-aware strategies, whose window depends on the pixels.
pub fn crop_window(
    image: (u32, u32),
    target: (u32, u32),
    crop: Crop,
) -> Option<(u32, u32, u32, u32)> {
    if crop.is_content_aware() {
        return None;
    }
    let (img_w, img_h) = image;
    let width = target.0.min(img_w);
    let height = target.1.min(img_h);
    let (excess_x, excess_y) = (img_w - width, img_h - height);

    let (left, top) = match crop {
        Crop::Low => (0, 0),
        Crop::High => (excess_x, excess_y),
        _ => (excess_x / 2, excess_y / 2),
    };
    Some((left, top, width, height))
}

/// Calculate where an image of size `inner` lands inside a canvas of size
/// `outer` when anchored by `gravity`.
///
/// Returns the `(left, top)` of the image relative to the canvas. Either
/// coordinate is negative when the image is larger than the canvas on that
/// axis, meaning the image is cut.
///
/// # Examples
/// ```
/// # use image_processing::imaging::calculations::gravity_offset;
/// # use image_processing::imaging::Gravity;
/// assert_eq!(gravity_offset(Gravity::Centre, (300, 400), (400, 400)), (50, 0));
/// assert_eq!(gravity_offset(Gravity::SouthEast, (300, 400), (400, 500)), (100, 100));
/// ```
pub fn gravity_offset(gravity: Gravity, inner: (u32, u32), outer: (u32, u32)) -> (i64, i64) {
    let (horizontal, vertical) = gravity.anchors();
    let place = |anchor: Anchor, inner: u32, outer: u32| {
        let excess = outer as i64 - inner as i64;
        match anchor {
            Anchor::Start => 0,
            Anchor::Middle => excess / 2,
            Anchor::End => excess,
        }
    };
    (
        place(horizontal, inner.0, outer.0),
        place(vertical, inner.1, outer.1),
    )
}

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Calculate the canvas size after rotating by `degrees` clockwise.
///
/// Quarter turns swap or keep the dimensions exactly; any other angle yields
/// the bounding box of the rotated rectangle, rounded up.
///
/// # Examples
/// ```
/// # use image_processing::imaging::calculations::rotated_dimensions;
/// assert_eq!(rotated_dimensions((600, 800), 90.0), (800, 600));
/// assert_eq!(rotated_dimensions((600, 800), -90.0), (800, 600));
/// assert_eq!(rotated_dimensions((600, 800), 45.0), (990, 990));
/// ```
pub fn rotated_dimensions(source: (u32, u32), degrees: f64) -> (u32, u32) {
    let (w, h) = source;
    let degrees = normalize_degrees(degrees);

    if degrees == 0.0 || degrees == 180.0 {
        return (w, h);
    }
    if degrees == 90.0 || degrees == 270.0 {
        return (h, w);
    }

    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let bound = |a: f64, b: f64| ((a + b) - 1e-6).ceil().max(1.0) as u32;
    (
        bound(w as f64 * cos, h as f64 * sin),
        bound(w as f64 * sin, h as f64 * cos),
    )
}

/// Calculate the intermediate canvas used to turn an overlay offset into a
/// placement: the base size grown (or shrunk) by the offset.
///
/// Returns `None` when the offset would collapse the canvas to nothing.
pub fn offset_canvas(base: (u32, u32), offset: [i32; 2]) -> Option<(u32, u32)> {
    let width = base.0 as i64 + offset[0] as i64;
    let height = base.1 as i64 + offset[1] as i64;
    if width <= 0 || height <= 0 || width > MAX_COORD as i64 || height > MAX_COORD as i64 {
        return None;
    }
    Some((width as u32, height as u32))
}
