//! # Image Processing
//!
//! Immutable image pipelines that record what to do and only do it when
//! asked. A pipeline is a source, loader and saver options, an output
//! format, and an ordered list of operations. Building one never touches a
//! pixel; [`Pipeline::save`] loads, transforms, and encodes in one go.
//!
//! ```text
//! Pipeline::new("in.jpg")          record
//!   .resize_to_fill(200, 200)      record
//!   .convert("webp")               record
//!   .save(None)                    load → operations → encode
//!                                  → <temp>/<content-address>.webp
//! ```
//!
//! # Architecture
//!
//! Data flows one way. The builder records; at save time the recorded
//! operations are expanded by pure geometry functions into engine
//! primitives; only the engine reads and writes image files.
//!
//! - **Builder**: every method returns a new pipeline. Partially built
//!   pipelines can be shared and branched across threads without locks.
//! - **Content addressing**: a SHA-256 of the canonical pipeline
//!   description names the output when no destination is given, so equal
//!   pipelines land on the same file.
//! - **Geometry**: fit/fill/limit/pad resizing, gravity placement, overlay
//!   offsets, and rotation bounds are plain functions over dimensions,
//!   testable without images.
//! - **Engine**: [`ImageEngine`] is the only seam that touches pixels. The
//!   default [`RasterEngine`] uses the `image` crate.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Immutable builder, materialization (`save`, `run`, `process`) |
//! | [`spec`] | Recorded description: `PipelineSpec`, `Operation`, option maps |
//! | [`destination`] | Output format precedence and destination paths |
//! | [`cache`] | Content address of a pipeline description |
//! | [`imaging`] | Geometry, parameters, engine trait, `image`-crate engine |
//! | [`config`] | `image-processing.toml` loading, validation, and merging |
//! | [`error`] | Crate-level error type |
//!
//! # Logging
//!
//! The crate logs through `tracing`: a span per materialization, `debug`
//! events per operation and resolved destination, `trace` events per engine
//! primitive. Installing a subscriber is up to the application.

pub mod cache;
pub mod config;
pub mod destination;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod spec;

pub use config::{ConfigError, ProcessorConfig, load_config};
pub use error::{ProcessingError, Result};
pub use imaging::{EngineError, ImageEngine, RasterEngine};
pub use pipeline::Pipeline;
pub use spec::{Operation, Options, PipelineSpec, Value};
