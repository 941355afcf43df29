//! End-to-end pipelines through the `image`-crate engine.
//!
//! Every test synthesizes its inputs in a temp directory, runs a real
//! pipeline, and reads the result back with `image::image_dimensions`.

use image::{ImageDecoder, Rgb, RgbImage, Rgba, RgbaImage};
use image_processing::imaging::raster::ICC_PROFILE_FIELD;
use image_processing::imaging::{
    BlendMode, Color, CompositeOptions, Extend, Gravity, PadOptions, ResizeOptions,
};
use image_processing::{
    EngineError, Options, Pipeline, ProcessingError, ProcessorConfig, Value,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_test_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    })
    .save(&path)
    .unwrap();
    path
}

fn create_test_overlay(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("overlay.png");
    RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 200]))
        .save(&path)
        .unwrap();
    path
}

fn portrait(tmp: &TempDir) -> Pipeline {
    let source = create_test_jpeg(tmp.path(), "portrait.jpg", 600, 800);
    Pipeline::new(source.to_str().unwrap())
}

fn saved_dimensions(pipeline: &Pipeline, dest: &Path) -> (u32, u32) {
    let path = pipeline.save(Some(dest)).unwrap();
    image::image_dimensions(path).unwrap()
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn resize_to_limit_never_enlarges() {
    let tmp = TempDir::new().unwrap();
    let p = portrait(&tmp);
    let out = tmp.path().join("out.png");
    assert_eq!(saved_dimensions(&p.resize_to_limit(Some(400), Some(400)), &out), (300, 400));
    assert_eq!(saved_dimensions(&p.resize_to_limit(Some(1000), Some(1000)), &out), (600, 800));
    assert_eq!(saved_dimensions(&p.resize_to_limit(None, Some(200)), &out), (150, 200));
}

#[test]
fn resize_to_fit_enlarges() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp).resize_to_fit(Some(1000), Some(1000));
    assert_eq!(saved_dimensions(&p, &out), (750, 1000));
}

#[test]
fn resize_to_fill_is_exact() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp);
    assert_eq!(saved_dimensions(&p.resize_to_fill(400, 400), &out), (400, 400));
    assert_eq!(saved_dimensions(&p.resize_to_fill(1200, 300), &out), (1200, 300));
}

#[test]
fn resize_and_pad_fills_the_box() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp).resize_and_pad_with(
        500,
        500,
        PadOptions {
            gravity: Gravity::West,
            extend: Extend::Background,
            background: Color::rgb(255, 255, 255),
            alpha: false,
        },
        ResizeOptions::default().without_sharpening(),
    );
    let path = p.save(Some(&out)).unwrap();
    let img = image::open(path).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (500, 500));
    // image sits on the west edge, padding on the east
    assert_eq!(img.get_pixel(499, 250), &Rgb([255, 255, 255]));
}

#[test]
fn resize_and_pad_with_alpha_is_transparent() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp).resize_and_pad_with(
        500,
        500,
        PadOptions {
            alpha: true,
            ..PadOptions::default()
        },
        ResizeOptions::default(),
    );
    let path = p.save(Some(&out)).unwrap();
    let img = image::open(path).unwrap();
    assert!(img.color().has_alpha());
    assert_eq!(img.to_rgba8().get_pixel(0, 250)[3], 0);
}

#[test]
fn rotate_quarter_full_and_arbitrary() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp);
    assert_eq!(saved_dimensions(&p.rotate(90.0).unwrap(), &out), (800, 600));
    assert_eq!(saved_dimensions(&p.rotate(360.0).unwrap(), &out), (600, 800));
    assert_eq!(saved_dimensions(&p.rotate(-90.0).unwrap(), &out), (800, 600));
    assert_eq!(saved_dimensions(&p.rotate(45.0).unwrap(), &out), (990, 990));
}

#[test]
fn composite_with_offset_keeps_base_size() {
    let tmp = TempDir::new().unwrap();
    let overlay = create_test_overlay(tmp.path(), 100, 50);
    let overlay = overlay.to_str().unwrap();
    let base = portrait(&tmp);

    let options = |offset| CompositeOptions {
        blend: BlendMode::Over,
        gravity: Some(Gravity::SouthEast),
        offset,
    };
    let with = base.composite_with([overlay], options(Some([50, -50])));
    let without = base.composite_with([overlay], options(None));

    let a = with.save(Some(&tmp.path().join("with.png"))).unwrap();
    let b = without.save(Some(&tmp.path().join("without.png"))).unwrap();
    let a = image::open(a).unwrap().to_rgba8();
    let b = image::open(b).unwrap().to_rgba8();

    assert_eq!(a.dimensions(), (600, 800));
    assert_eq!(b.dimensions(), (600, 800));
    assert_ne!(a.as_raw(), b.as_raw());
}

#[test]
fn composite_at_native_position() {
    let tmp = TempDir::new().unwrap();
    let overlay = create_test_overlay(tmp.path(), 10, 10);
    let p = portrait(&tmp).composite(overlay.to_str().unwrap());
    let path = p.save(Some(&tmp.path().join("out.png"))).unwrap();
    let img = image::open(path).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (600, 800));
    // red overlay blended into the top-left corner
    assert!(img.get_pixel(0, 0)[0] > 180);
}

// =============================================================================
// Destination and format
// =============================================================================

#[test]
fn run_names_output_by_content_address() {
    let tmp = TempDir::new().unwrap();
    let source = create_test_jpeg(tmp.path(), "portrait.jpg", 60, 80);
    let config = ProcessorConfig {
        temp_dir: Some(tmp.path().join("cache")),
        ..ProcessorConfig::default()
    };
    let p = Pipeline::with_config(source.to_str().unwrap(), config)
        .resize_to_fill(20, 20)
        .convert("png");

    let first = p.run().unwrap();
    assert_eq!(first.parent().unwrap(), tmp.path().join("cache"));
    assert_eq!(first.extension().unwrap(), "png");
    assert_eq!(image::image_dimensions(&first).unwrap(), (20, 20));

    // an equivalent pipeline built separately lands on the same file
    let again = Pipeline::with_config(
        source.to_str().unwrap(),
        ProcessorConfig {
            temp_dir: Some(tmp.path().join("cache")),
            ..ProcessorConfig::default()
        },
    )
    .convert("png")
    .resize_to_fill(20, 20);
    assert_eq!(again.run().unwrap(), first);
}

#[test]
fn destination_extension_overrides_format() {
    let tmp = TempDir::new().unwrap();
    let p = portrait(&tmp).convert("png").resize_to_limit(Some(60), None);
    let path = p.save(Some(&tmp.path().join("thumb.webp"))).unwrap();
    assert_eq!(path.extension().unwrap(), "webp");
    assert_eq!(
        image::ImageFormat::from_path(&path).unwrap(),
        image::ImageFormat::WebP
    );
    assert_eq!(image::image_dimensions(path).unwrap(), (60, 80));
}

#[test]
fn missing_extension_is_filled_from_source() {
    let tmp = TempDir::new().unwrap();
    let path = portrait(&tmp)
        .resize_to_limit(Some(30), None)
        .save(Some(&tmp.path().join("thumb")))
        .unwrap();
    assert_eq!(path, tmp.path().join("thumb.jpg"));
    assert!(path.exists());
}

#[test]
fn quality_option_reaches_encoder() {
    let tmp = TempDir::new().unwrap();
    let p = portrait(&tmp);
    let low = p.saver("quality", 10).save(Some(&tmp.path().join("low.jpg"))).unwrap();
    let high = p.saver("Q", 95).save(Some(&tmp.path().join("high.jpg"))).unwrap();
    let size = |path: &Path| std::fs::metadata(path).unwrap().len();
    assert!(size(&low) < size(&high));
}

#[test]
fn avif_output() {
    let tmp = TempDir::new().unwrap();
    let path = portrait(&tmp)
        .resize_to_limit(Some(64), Some(64))
        .save(Some(&tmp.path().join("small.avif")))
        .unwrap();
    assert!(std::fs::metadata(path).unwrap().len() > 0);
}

// =============================================================================
// Raw operations, metadata
// =============================================================================

#[test]
fn raw_operations_reach_engine() {
    let tmp = TempDir::new().unwrap();
    let p = portrait(&tmp)
        .operation("invert", vec![], Options::new())
        .unwrap()
        .operation(
            "crop",
            vec![Value::from(10), Value::from(15), Value::from(120), Value::from(300)],
            Options::new(),
        )
        .unwrap();
    assert_eq!(saved_dimensions(&p, &tmp.path().join("out.png")), (120, 300));
}

fn icc_profile_of(path: &Path) -> Option<Vec<u8>> {
    image::ImageReader::open(path)
        .unwrap()
        .with_guessed_format()
        .unwrap()
        .into_decoder()
        .unwrap()
        .icc_profile()
        .unwrap()
}

#[test]
fn metadata_operations_change_the_saved_header() {
    let tmp = TempDir::new().unwrap();
    let profile = b"profile bytes".to_vec();
    let tagged = portrait(&tmp).set_metadata(ICC_PROFILE_FIELD, profile.clone());

    let path = tagged.save(Some(&tmp.path().join("tagged.png"))).unwrap();
    assert_eq!(icc_profile_of(&path), Some(profile));

    let path = tagged
        .remove_metadata(ICC_PROFILE_FIELD)
        .save(Some(&tmp.path().join("plain.png")))
        .unwrap();
    assert_eq!(icc_profile_of(&path), None);
}

#[test]
fn unwritable_metadata_field_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let result = portrait(&tmp).set_metadata("artist", "someone").save(Some(&out));
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::InvalidArguments { .. }))
    ));
    assert!(!out.exists());
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn empty_source_is_configuration_error() {
    let result = Pipeline::new("").save(None);
    assert!(matches!(result, Err(ProcessingError::Configuration(_))));
}

#[test]
fn missing_file_is_decode_error() {
    let tmp = TempDir::new().unwrap();
    let result = Pipeline::new(tmp.path().join("nope.jpg").to_str().unwrap())
        .save(Some(&tmp.path().join("out.png")));
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::Decode(_)))
    ));
}

#[test]
fn unknown_operation_aborts_before_writing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let result = portrait(&tmp)
        .operation("frobnicate", vec![], Options::new())
        .unwrap()
        .save(Some(&out));
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::UnknownOperation(_)))
    ));
    assert!(!out.exists());
}

#[test]
fn unsupported_format_is_encode_error() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.xyz");
    let result = portrait(&tmp).save(Some(&out));
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::Encode(_)))
    ));
    assert!(!out.exists());
}

#[test]
fn oversized_crop_is_invalid_arguments() {
    let tmp = TempDir::new().unwrap();
    let result = portrait(&tmp)
        .operation(
            "crop",
            vec![Value::from(4e9), Value::from(0), Value::from(4e9), Value::from(1)],
            Options::new(),
        )
        .unwrap()
        .process();
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::InvalidArguments { .. }))
    ));
}

#[test]
fn oversized_shrink_is_invalid_arguments() {
    let tmp = TempDir::new().unwrap();
    let result = portrait(&tmp).loader("shrink", 1u64 << 32).process();
    assert!(matches!(
        result,
        Err(ProcessingError::Engine(EngineError::InvalidArguments { .. }))
    ));
}

#[test]
fn missing_dimensions_are_configuration_errors() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.png");
    let p = portrait(&tmp);
    for pipeline in [p.resize_to_limit(None, None), p.resize_to_fit(None, None)] {
        assert!(matches!(
            pipeline.save(Some(&out)),
            Err(ProcessingError::Configuration(_))
        ));
    }
}
