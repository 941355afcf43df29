//! Output format and destination resolution.
//!
//! The output format is decided by the first of these that says anything:
//!
//! 1. the extension of the explicit destination
//! 2. the pipeline's declared format
//! 3. the extension of the source
//! 4. the configured default ([`DEFAULT_FORMAT`] unless overridden)
//!
//! An explicit destination keeps its path; only a missing extension is
//! filled in. Without one, the destination is
//! `<temp_root>/<content-address>.<format>`. Resolution is a pure function of
//! its inputs, so resolving twice gives the same path.

use std::path::{Path, PathBuf};

/// Format used when nothing else decides.
pub const DEFAULT_FORMAT: &str = "jpeg";

/// Non-empty extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<&str> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}

/// Pick the output format by precedence.
pub fn resolve_format(
    destination: Option<&Path>,
    format: &str,
    source: &str,
    default_format: &str,
) -> String {
    destination
        .and_then(extension_of)
        .or_else(|| Some(format).filter(|f| !f.is_empty()))
        .or_else(|| extension_of(Path::new(source)))
        .unwrap_or(default_format)
        .to_string()
}

/// Destination under `temp_root` named after the content address.
pub fn temp_destination(temp_root: &Path, address: &str, format: &str) -> PathBuf {
    temp_root.join(format!("{address}.{format}"))
}

/// Final destination path for an already resolved `format`.
pub fn resolve_destination(
    destination: Option<&Path>,
    format: &str,
    temp_root: &Path,
    address: &str,
) -> PathBuf {
    match destination {
        Some(dest) if extension_of(dest) == Some(format) => dest.to_path_buf(),
        Some(dest) => dest.with_extension(format),
        None => temp_destination(temp_root, address, format),
    }
}
