//! Immutable pipeline builder and materialization.
//!
//! A [`Pipeline`] records what should happen to an image without doing any
//! of it. Every builder method takes `&self` and returns a new pipeline with
//! one field changed, so a partially built pipeline can be shared and
//! branched freely:
//!
//! ```no_run
//! use image_processing::Pipeline;
//!
//! let base = Pipeline::new("photos/portrait.jpg").saver("quality", 85);
//! let thumb = base.resize_to_fill(200, 200).convert("webp");
//! let large = base.resize_to_limit(Some(1600), Some(1600));
//!
//! let thumb_path = thumb.save(None)?;  // <temp>/<address>.webp
//! let large_path = large.save(Some("out/large.jpg".as_ref()))?;
//! # Ok::<(), image_processing::ProcessingError>(())
//! ```
//!
//! ## Materialization
//!
//! [`Pipeline::save`] checks the source, resolves format and destination,
//! then drives the engine: load → auto-rotate (unless disabled) → each
//! recorded operation in order → encode. The first failure aborts the run.
//! [`Pipeline::process`] stops before encoding and returns the image handle.
//!
//! All derivations of one pipeline share the same engine through an `Arc`.

use crate::cache::content_address;
use crate::config::ProcessorConfig;
use crate::destination::{resolve_destination, resolve_format};
use crate::error::{ProcessingError, Result};
use crate::imaging::engine::{ImageEngine, Primitive};
use crate::imaging::operations::apply_operation;
use crate::imaging::params::{Color, CompositeOptions, PadOptions, ResizeOptions};
use crate::imaging::raster::RasterEngine;
use crate::spec::{Operation, Options, PipelineSpec, Value, truthy};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loader option keys controlling auto-rotation; `autorot` wins.
const AUTOROTATE_KEYS: [&str; 2] = ["autorot", "autorotate"];

/// Immutable, lazily executed image pipeline.
pub struct Pipeline<E: ImageEngine = RasterEngine> {
    engine: Arc<E>,
    config: Arc<ProcessorConfig>,
    spec: PipelineSpec,
}

impl<E: ImageEngine> Clone for Pipeline<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
            spec: self.spec.clone(),
        }
    }
}

impl<E: ImageEngine> fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("spec", &self.spec)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline<RasterEngine> {
    /// Pipeline over `source` with the `image`-crate engine and stock config.
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_config(source, ProcessorConfig::default())
    }

    pub fn with_config(source: impl Into<String>, config: ProcessorConfig) -> Self {
        Self::with_engine(Arc::new(RasterEngine::new()), config).source(source)
    }
}

impl<E: ImageEngine> Pipeline<E> {
    /// Pipeline with no source yet, driving `engine`.
    ///
    /// A config that disables auto-rotation is recorded as an `autorotate`
    /// loader option, so the spec alone decides what a run does.
    pub fn with_engine(engine: Arc<E>, config: ProcessorConfig) -> Self {
        let mut spec = PipelineSpec::default();
        if !config.autorotate {
            spec.loader.insert("autorotate".into(), Value::Bool(false));
        }
        Self {
            engine,
            config: Arc::new(config),
            spec,
        }
    }

    /// The recorded description.
    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn derive(&self, change: impl FnOnce(&mut PipelineSpec)) -> Self {
        let mut spec = self.spec.clone();
        change(&mut spec);
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
            spec,
        }
    }

    // =========================================================================
    // Source, format, options
    // =========================================================================

    pub fn source(&self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.derive(|spec| spec.source = source)
    }

    /// Declare the output format, e.g. `"png"`. An extension on the
    /// destination passed to [`save`](Self::save) still wins.
    pub fn convert(&self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.derive(|spec| spec.format = format)
    }

    pub fn loader(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.derive(|spec| {
            spec.loader.insert(key, value);
        })
    }

    /// Overlay `options` onto the loader options, key by key.
    pub fn loader_options(&self, options: Options) -> Self {
        self.derive(|spec| spec.loader.extend(options))
    }

    pub fn saver(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.derive(|spec| {
            spec.saver.insert(key, value);
        })
    }

    /// Overlay `options` onto the saver options, key by key.
    pub fn saver_options(&self, options: Options) -> Self {
        self.derive(|spec| spec.saver.extend(options))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Record an already built operation.
    pub fn append(&self, operation: Operation) -> Self {
        self.derive(|spec| spec.operations.push(operation))
    }

    /// Record an engine primitive by name, e.g. `"invert"`.
    ///
    /// Fails for reserved (`_`-prefixed) and builtin names.
    pub fn operation(&self, name: &str, args: Vec<Value>, kwargs: Options) -> Result<Self> {
        Ok(self.append(Operation::raw(name, args, kwargs)?))
    }

    /// Resize options with the configured sharpening default.
    pub fn resize_defaults(&self) -> ResizeOptions {
        if self.config.sharpen {
            ResizeOptions::default()
        } else {
            ResizeOptions::default().without_sharpening()
        }
    }

    /// Downsize to fit within `width`×`height`; never enlarges. One side may
    /// be `None`.
    pub fn resize_to_limit(&self, width: Option<u32>, height: Option<u32>) -> Self {
        self.resize_to_limit_with(width, height, self.resize_defaults())
    }

    pub fn resize_to_limit_with(
        &self,
        width: Option<u32>,
        height: Option<u32>,
        options: ResizeOptions,
    ) -> Self {
        self.append(Operation::ResizeToLimit {
            width,
            height,
            options,
        })
    }

    /// Resize to fit within `width`×`height`, enlarging if needed. One side
    /// may be `None`.
    pub fn resize_to_fit(&self, width: Option<u32>, height: Option<u32>) -> Self {
        self.resize_to_fit_with(width, height, self.resize_defaults())
    }

    pub fn resize_to_fit_with(
        &self,
        width: Option<u32>,
        height: Option<u32>,
        options: ResizeOptions,
    ) -> Self {
        self.append(Operation::ResizeToFit {
            width,
            height,
            options,
        })
    }

    /// Resize to cover `width`×`height`, cropping the overflow from the
    /// centre.
    pub fn resize_to_fill(&self, width: u32, height: u32) -> Self {
        self.resize_to_fill_with(width, height, self.resize_defaults())
    }

    pub fn resize_to_fill_with(&self, width: u32, height: u32, options: ResizeOptions) -> Self {
        self.append(Operation::ResizeToFill {
            width,
            height,
            options,
        })
    }

    /// Resize to fit, then pad with opaque black to exactly `width`×`height`.
    pub fn resize_and_pad(&self, width: u32, height: u32) -> Self {
        self.resize_and_pad_with(width, height, PadOptions::default(), self.resize_defaults())
    }

    pub fn resize_and_pad_with(
        &self,
        width: u32,
        height: u32,
        pad: PadOptions,
        options: ResizeOptions,
    ) -> Self {
        self.append(Operation::ResizeAndPad {
            width,
            height,
            pad,
            options,
        })
    }

    /// Rotate clockwise, filling exposed corners with opaque black.
    ///
    /// Fails for NaN and infinite angles.
    pub fn rotate(&self, degrees: f64) -> Result<Self> {
        self.rotate_with_background(degrees, Color::black())
    }

    pub fn rotate_with_background(&self, degrees: f64, background: Color) -> Result<Self> {
        if !degrees.is_finite() {
            return Err(ProcessingError::Configuration(format!(
                "rotation angle must be finite, got {degrees}"
            )));
        }
        // -0.0 would serialize differently from 0.0
        let degrees = degrees + 0.0;
        Ok(self.append(Operation::Rotate {
            degrees,
            background,
        }))
    }

    /// Blend one overlay at the top-left corner.
    pub fn composite(&self, overlay: impl Into<String>) -> Self {
        self.composite_with([overlay], CompositeOptions::default())
    }

    pub fn composite_with<I, S>(&self, overlays: I, options: CompositeOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append(Operation::Composite {
            overlays: overlays.into_iter().map(Into::into).collect(),
            options,
        })
    }

    pub fn set_metadata(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.append(Operation::SetMetadata {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn remove_metadata(&self, field: impl Into<String>) -> Self {
        self.append(Operation::RemoveMetadata {
            field: field.into(),
        })
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Deterministic digest of the recorded description.
    pub fn content_address(&self) -> Result<String> {
        Ok(content_address(&self.spec)?)
    }

    /// Output format [`save`](Self::save) would use for `destination`.
    pub fn output_format(&self, destination: Option<&Path>) -> String {
        resolve_format(
            destination,
            &self.spec.format,
            &self.spec.source,
            &self.config.default_format,
        )
    }

    /// Path [`save`](Self::save) would write to. Touches nothing on disk.
    pub fn destination(&self, destination: Option<&Path>) -> Result<PathBuf> {
        let destination = destination.filter(|d| !d.as_os_str().is_empty());
        let format = self.output_format(destination);
        let address = match destination {
            Some(_) => String::new(),
            None => self.content_address()?,
        };
        Ok(resolve_destination(
            destination,
            &format,
            &self.config.temp_root(),
            &address,
        ))
    }

    fn check_source(&self) -> Result<()> {
        if self.spec.source.is_empty() {
            return Err(ProcessingError::Configuration(
                "no source image set".into(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    /// Run the pipeline and write the result.
    ///
    /// Without an explicit destination the output goes to
    /// `<temp_root>/<content-address>.<format>`, creating the directory if
    /// needed. Returns the path written.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(source = %self.spec.source, operations = self.spec.operations.len())
    )]
    pub fn save(&self, destination: Option<&Path>) -> Result<PathBuf> {
        self.check_source()?;
        let destination = destination.filter(|d| !d.as_os_str().is_empty());
        let path = self.destination(destination)?;
        if destination.is_none() {
            std::fs::create_dir_all(self.config.temp_root())?;
        }
        debug!(destination = %path.display(), "resolved destination");

        let image = self.process()?;
        self.engine
            .encode(&image, &path, &saver_options(&self.spec.saver))?;
        Ok(path)
    }

    /// [`save`](Self::save) to a synthesized destination.
    pub fn run(&self) -> Result<PathBuf> {
        self.save(None)
    }

    /// Load and apply every operation, returning the image without
    /// encoding it.
    #[tracing::instrument(level = "debug", skip_all, fields(source = %self.spec.source))]
    pub fn process(&self) -> Result<E::Image> {
        self.check_source()?;
        let (autorotate, loader) = split_loader_options(&self.spec.loader);
        let mut image = self.engine.load(Path::new(&self.spec.source), &loader)?;
        if autorotate {
            image = self.engine.apply(&image, &Primitive::AutoRotate)?;
        }

        for operation in &self.spec.operations {
            debug!(operation = operation.name(), "applying operation");
            image = apply_operation(self.engine.as_ref(), image, operation)?;
        }
        Ok(image)
    }
}

/// Pull the auto-rotate toggle out of the loader options.
///
/// `autorot` takes precedence over `autorotate`; neither reaches the engine.
/// Auto-rotation is on unless one of them says otherwise.
fn split_loader_options(loader: &Options) -> (bool, Options) {
    let mut options = loader.clone();
    let enabled = AUTOROTATE_KEYS
        .map(|key| options.remove(key))
        .into_iter()
        .flatten()
        .next()
        .is_none_or(|value| truthy(&value));
    (enabled, options)
}

/// Saver options as the engine expects them: `quality` becomes `Q`.
fn saver_options(saver: &Options) -> Options {
    let mut options = saver.clone();
    if let Some(quality) = options.remove("quality") {
        options.insert("Q".into(), quality);
    }
    options
}
