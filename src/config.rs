use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration consumed by the [`DocumentStore`](crate::DocumentStore).
///
/// The store reads the configuration at construction and treats it as immutable
/// for its lifetime; a driver that wants to change paths should build a fresh
/// store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the `zig` executable.
    ///
    /// When unset, no build file discovery is attempted and `@cImport` blocks
    /// are never translated.
    pub zig_exe_path: Option<PathBuf>,
    /// Path to the build runner program executed to extract a `build.zig`'s
    /// package list and include directories.
    pub build_runner_path: Option<PathBuf>,
    /// Cache directory handed to the build runner and used for translated
    /// `@cImport` output.
    pub global_cache_path: Option<PathBuf>,
    /// Root of the Zig standard library; `@import("std")` is unresolved
    /// without it.
    pub zig_lib_path: Option<PathBuf>,
    /// Fallback path for `@import("builtin")` when the associated build file
    /// does not override it.
    pub builtin_path: Option<PathBuf>,
}
