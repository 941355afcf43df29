//! The recorded pipeline: source, options, and operations.
//!
//! A [`PipelineSpec`] is plain data. It never executes anything and never
//! holds an engine handle, so two specs compare (and hash) equal exactly
//! when their fields are equal.

use crate::error::{ProcessingError, Result};
use crate::imaging::params::{Color, CompositeOptions, PadOptions, ResizeOptions};
use serde::Serialize;
use std::collections::BTreeMap;

/// Option and argument values are arbitrary JSON-like data.
pub use serde_json::Value;

/// Loader/saver options and named operation arguments, ordered by key.
pub type Options = BTreeMap<String, Value>;

/// Prefix reserved for internal helpers; never a public operation name.
pub const RESERVED_PREFIX: char = '_';

/// A single recorded transformation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Shrink to fit inside the box; never enlarges.
    ResizeToLimit {
        width: Option<u32>,
        height: Option<u32>,
        options: ResizeOptions,
    },
    /// Scale up or down to fit inside the box.
    ResizeToFit {
        width: Option<u32>,
        height: Option<u32>,
        options: ResizeOptions,
    },
    /// Scale to cover the box, then crop the overflow.
    ResizeToFill {
        width: u32,
        height: u32,
        options: ResizeOptions,
    },
    /// Scale to fit, then pad out to the full box.
    ResizeAndPad {
        width: u32,
        height: u32,
        pad: PadOptions,
        options: ResizeOptions,
    },
    /// Rotate clockwise by an arbitrary angle.
    Rotate { degrees: f64, background: Color },
    /// Blend overlay images (by path) onto the current image.
    Composite {
        overlays: Vec<String>,
        options: CompositeOptions,
    },
    SetMetadata { field: String, value: Value },
    RemoveMetadata { field: String },
    /// Forwarded verbatim to the engine.
    Raw {
        name: String,
        args: Vec<Value>,
        kwargs: Options,
    },
}

impl Operation {
    /// Names of the builtin variants, as recorded in `name()`.
    pub const BUILTIN_NAMES: [&'static str; 8] = [
        "resize_to_limit",
        "resize_to_fit",
        "resize_to_fill",
        "resize_and_pad",
        "rotate",
        "composite",
        "set_metadata",
        "remove_metadata",
    ];

    /// Build a pass-through operation.
    ///
    /// Names starting with [`RESERVED_PREFIX`] are not public operations, and
    /// builtin names must go through their typed builder methods.
    pub fn raw(name: &str, args: Vec<Value>, kwargs: Options) -> Result<Self> {
        if name.is_empty() {
            return Err(ProcessingError::Configuration(
                "operation name must not be empty".into(),
            ));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(ProcessingError::Configuration(format!(
                "'{name}' is not a public operation"
            )));
        }
        if Self::BUILTIN_NAMES.contains(&name) {
            return Err(ProcessingError::Configuration(format!(
                "'{name}' is a builtin operation; use the typed builder method"
            )));
        }
        Ok(Operation::Raw {
            name: name.to_string(),
            args,
            kwargs,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Operation::ResizeToLimit { .. } => "resize_to_limit",
            Operation::ResizeToFit { .. } => "resize_to_fit",
            Operation::ResizeToFill { .. } => "resize_to_fill",
            Operation::ResizeAndPad { .. } => "resize_and_pad",
            Operation::Rotate { .. } => "rotate",
            Operation::Composite { .. } => "composite",
            Operation::SetMetadata { .. } => "set_metadata",
            Operation::RemoveMetadata { .. } => "remove_metadata",
            Operation::Raw { name, .. } => name,
        }
    }
}

/// Immutable description of a pipeline prior to execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSpec {
    /// Input image path; empty until set.
    pub source: String,
    /// Declared output format; empty means unspecified.
    pub format: String,
    pub loader: Options,
    pub saver: Options,
    /// Recorded steps, in application order.
    pub operations: Vec<Operation>,
}

impl PipelineSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// Loosely interpret an option value as a flag.
///
/// `null`, `false`, `0`, `""` and empty collections are false; everything
/// else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_accepts_engine_primitive_names() {
        let op = Operation::raw("invert", vec![], Options::new()).unwrap();
        assert_eq!(op.name(), "invert");
    }

    #[test]
    fn raw_rejects_reserved_prefix() {
        let err = Operation::raw("_thumbnail", vec![json!(120), json!(340)], Options::new())
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Configuration(m) if m.contains("_thumbnail")));
    }

    #[test]
    fn raw_rejects_builtin_names() {
        let err = Operation::raw("resize_to_fill", vec![], Options::new()).unwrap_err();
        assert!(matches!(err, ProcessingError::Configuration(_)));
    }

    #[test]
    fn raw_rejects_empty_name() {
        assert!(Operation::raw("", vec![], Options::new()).is_err());
    }

    #[test]
    fn builtin_names_match_variants() {
        let op = Operation::ResizeToFit {
            width: Some(1),
            height: None,
            options: ResizeOptions::default(),
        };
        assert!(Operation::BUILTIN_NAMES.contains(&op.name()));
    }

    #[test]
    fn operation_serializes_with_tag() {
        let op = Operation::RemoveMetadata {
            field: "exif-data".into(),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value, json!({"op": "remove_metadata", "field": "exif-data"}));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(85)));
        assert!(truthy(&json!("yes")));
    }
}
