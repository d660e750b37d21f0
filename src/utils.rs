//! Utility functions

use crate::error::{Result, StoreError, StoreIoError};
use once_cell::sync::Lazy;
use regex::{Match, Regex};
use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// A regex that matches the target of an `@import` builtin call
/// with the named group "target".
pub static RE_ZIG_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s*\(\s*"(?P<target>[^"\\]*)"\s*\)"#).unwrap());

/// Returns all import targets from any `@import` call in a string,
/// `const std = @import("std");` -> `"std"`.
pub fn find_import_targets(source: &str) -> impl Iterator<Item = Match<'_>> {
    RE_ZIG_IMPORT.captures_iter(source).filter_map(|cap| cap.name("target"))
}

/// Hex-encoded 128-bit content hash, used as the cimport cache key.
pub fn content_hash(content: &str) -> String {
    use md5::Digest;
    let mut hasher = md5::Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Canonicalize the path, platform-agnostic.
///
/// On windows this will ensure the path only consists of `/` separators.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf, StoreIoError> {
    let path = path.as_ref();
    let res = dunce::canonicalize(path);
    #[cfg(windows)]
    let res = res.map(|p| {
        use path_slash::PathBufExt;
        PathBuf::from(p.to_slash_lossy().as_ref())
    });
    res.map_err(|err| StoreIoError::new(err, path))
}

/// Returns the path with all separators normalized to `/`.
///
/// This is a noop on non-windows platforms.
pub fn slash_path(path: impl AsRef<Path>) -> PathBuf {
    use path_slash::PathExt;
    PathBuf::from(path.as_ref().to_slash_lossy().as_ref())
}

/// Reads the source file at `path` into a string.
pub fn read_source_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| StoreError::io(err, path))
}

/// Reads the json file and deserializes it into the provided type.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| StoreError::io(err, path))?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_find_import_targets() {
        let source = r#"
const std = @import("std");
const builtin = @import("builtin");
const other = @import("../lib/other.zig");
"#;
        let targets = find_import_targets(source).map(|m| m.as_str()).collect::<Vec<_>>();
        assert_eq!(targets, vec!["std", "builtin", "../lib/other.zig"]);
    }

    #[test]
    fn import_regex_ignores_other_builtins() {
        let source = "const x = @intCast(u8, y); const T = @TypeOf(x);";
        assert_eq!(find_import_targets(source).count(), 0);
    }

    #[test]
    fn content_hash_is_stable() {
        let a = content_hash("#include <stdio.h>\n");
        let b = content_hash("#include <stdio.h>\n");
        let c = content_hash("#include <stdlib.h>\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // md5, hex-encoded
        assert_eq!(a.len(), 32);
    }
}
