//! `file://` URI handling.
//!
//! URIs are the identity of every document in the store. References between
//! documents are URIs, never pointers; the helpers here convert between URIs
//! and filesystem paths and resolve relative imports with URI-path semantics.

use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};
use url::Url;

/// Converts a filesystem path into a `file://` URI.
pub fn from_file_path(path: impl AsRef<Path>) -> Result<Url> {
    let path = path.as_ref();
    Url::from_file_path(path).map_err(|_| StoreError::InvalidUri(path.display().to_string()))
}

/// Converts a `file://` URI back into a filesystem path.
pub fn to_file_path(uri: &Url) -> Result<PathBuf> {
    uri.to_file_path().map_err(|_| StoreError::InvalidUri(uri.to_string()))
}

/// Resolves `import` relative to the document at `base`.
///
/// The base URI is trimmed back to its last `/` and the import joined with
/// URI-path semantics, so `./` and `../` segments behave as in RFC 3986:
/// `file:///a/b.zig` + `c.zig` -> `file:///a/c.zig`.
pub fn resolve_relative(base: &Url, import: &str) -> Option<Url> {
    base.join(import).ok()
}

/// Whether the URI points below a `/std/` path segment.
///
/// Documents inside the standard library never take part in build file
/// discovery.
pub fn in_std(uri: &Url) -> bool {
    uri.path().split('/').any(|segment| segment == "std")
}
