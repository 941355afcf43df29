//! Content addressing for pipelines.
//!
//! A pipeline's output name is derived from *what* it does, not from where
//! it was built or in which order its options were set. Two pipelines with
//! the same source, format, loader/saver options and operation sequence get
//! the same address, in this process or any other. Callers can use that
//! address as a cache key: if `<temp_root>/<address>.<format>` already
//! exists, the work has been done.
//!
//! # Canonical form
//!
//! The [`PipelineSpec`] is serialized with `serde_json`. Options are
//! `BTreeMap`s, so keys always come out sorted regardless of insertion
//! history; operations are a tagged enum serialized in recorded order.
//! Floats (rotation angles, colours) use serde_json's shortest round-trip
//! formatting, which is stable across runs.
//!
//! # Digest
//!
//! SHA-256 over a domain prefix plus the canonical bytes, rendered as
//! lowercase hex. The prefix keeps pipeline addresses apart from any other
//! SHA-256 the caller might store next to them.
//!
//! Nothing here evicts or even looks at files. Eviction is the caller's
//! business.

use crate::spec::PipelineSpec;
use sha2::{Digest, Sha256};

/// Domain prefix mixed into every pipeline digest.
const DOMAIN: &[u8] = b"pipeline\0";

/// Canonical byte form of a spec.
pub fn canonical_bytes(spec: &PipelineSpec) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(spec)
}

/// SHA-256 content address of a spec, as 64 hex characters.
pub fn content_address(spec: &PipelineSpec) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    hasher.update(canonical_bytes(spec)?);
    Ok(format!("{:x}", hasher.finalize()))
}
