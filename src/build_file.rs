//! Build file handling.
//!
//! A `build.zig` cannot be understood statically: the store executes it
//! through an external build runner in a sub-process and parses the runner's
//! stdout, which describes the package layout and include directories. An
//! optional `zls.build.json` next to the build file can override the builtin
//! path and pass extra options to the runner.

use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use url::Url;

use crate::{
    config::Config,
    error::{Result, StoreError},
    uri, utils,
};

/// The file name of the build script at a package root.
pub const BUILD_FILE_NAME: &str = "build.zig";

/// The file name of the optional side-config next to a build file.
pub const ASSOCIATED_CONFIG_NAME: &str = "zls.build.json";

/// A package exported by a build file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    /// Root source file of the package, absolute after loading.
    pub path: PathBuf,
}

/// The configuration extracted from executing a build file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
}

/// Optional adjunct configuration loaded from `zls.build.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAssociatedConfig {
    /// Override for the builtin path, relative to the build file's directory.
    #[serde(default)]
    pub relative_builtin_path: Option<String>,
    /// Extra arguments appended to the build runner invocation.
    #[serde(default)]
    pub build_options: Option<Vec<String>>,
}

/// Store-owned record for one `build.zig`.
#[derive(Clone, Debug)]
pub struct BuildFile {
    pub uri: Url,
    pub config: BuildConfig,
    /// Builtin override from the side-config, already resolved to an absolute
    /// URI.
    pub builtin_uri: Option<Url>,
    /// The side-config, kept so saves can replay its build options.
    pub associated_config: Option<BuildAssociatedConfig>,
}

impl BuildFile {
    /// Constructs the record for the build file at `uri`.
    ///
    /// This is best-effort on every level: a missing side-config is silent, a
    /// malformed one is dropped, and a failing build runner leaves the record
    /// with an empty configuration. The document itself always exists
    /// afterwards, it just may carry no build context.
    pub fn create(config: &Config, uri: Url) -> Self {
        debug!(%uri, "loading build file");

        let path = match uri::to_file_path(&uri) {
            Ok(path) => path,
            Err(err) => {
                debug!("cannot locate build file {uri}: {err}");
                return Self { uri, config: BuildConfig::default(), builtin_uri: None, associated_config: None };
            }
        };
        let build_dir = path.parent().unwrap_or_else(|| Path::new("/")).to_path_buf();

        let associated_config = load_associated_config(&build_dir);
        let builtin_uri = associated_config
            .as_ref()
            .and_then(|cfg| cfg.relative_builtin_path.as_deref())
            .and_then(|relative| {
                let joined = build_dir.join(relative);
                let resolved = utils::canonicalize(&joined).unwrap_or(joined);
                uri::from_file_path(resolved).ok()
            });

        let build_options =
            associated_config.as_ref().and_then(|cfg| cfg.build_options.clone()).unwrap_or_default();
        let build_config = match load_build_config(config, &path, &build_options) {
            Ok(build_config) => build_config,
            Err(err) => {
                error!("failed to extract build configuration for {uri}: {err}");
                BuildConfig::default()
            }
        };

        Self { uri, config: build_config, builtin_uri, associated_config }
    }

    /// The build options recorded in the side-config, if any.
    pub fn build_options(&self) -> &[String] {
        self.associated_config
            .as_ref()
            .and_then(|cfg| cfg.build_options.as_deref())
            .unwrap_or_default()
    }
}

/// Best-effort load of the `zls.build.json` next to a build file.
///
/// A missing file is silent; anything else is logged and ignored.
fn load_associated_config(build_dir: &Path) -> Option<BuildAssociatedConfig> {
    let path = build_dir.join(ASSOCIATED_CONFIG_NAME);
    match utils::read_json_file(&path) {
        Ok(config) => Some(config),
        Err(StoreError::Io(err)) if err.io_error().kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            debug!("ignoring {}: {err}", path.display());
            None
        }
    }
}

/// Executes the build runner for the given build file and parses its stdout.
///
/// Package paths in the result are rewritten to absolute paths rooted at the
/// build file's directory.
pub(crate) fn load_build_config(
    config: &Config,
    build_file_path: &Path,
    build_options: &[String],
) -> Result<BuildConfig> {
    let Some(zig_exe) = config.zig_exe_path.as_deref() else {
        return Err(StoreError::msg("no zig executable configured"));
    };
    let Some(build_runner) = config.build_runner_path.as_deref() else {
        return Err(StoreError::msg("no build runner configured"));
    };
    let Some(cache_dir) = config.global_cache_path.as_deref() else {
        return Err(StoreError::msg("no global cache path configured"));
    };
    let build_dir = build_file_path.parent().unwrap_or_else(|| Path::new("/"));

    let mut cmd = Command::new(zig_exe);
    cmd.arg("run")
        .arg(build_runner)
        .arg("--cache-dir")
        .arg(cache_dir)
        .arg("--pkg-begin")
        .arg("@build@")
        .arg(build_file_path)
        .arg("--pkg-end")
        .arg("--")
        .arg(zig_exe)
        .arg(build_dir)
        .arg("zig-cache")
        .arg("ZLS_DONT_CARE")
        .args(build_options);
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    debug!(?cmd, "executing build runner");

    let output = cmd.output().map_err(|err| StoreError::io(err, zig_exe))?;
    if !output.status.success() {
        return Err(StoreError::BuildRunnerFailed(
            output.status,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    let mut build_config: BuildConfig = serde_json::from_slice(&output.stdout)?;
    for package in &mut build_config.packages {
        let absolute = if package.path.is_absolute() {
            package.path.clone()
        } else {
            build_dir.join(&package.path)
        };
        package.path = utils::slash_path(absolute);
    }
    trace!(
        "build runner yielded {} packages, {} include dirs",
        build_config.packages.len(),
        build_config.include_dirs.len()
    );
    Ok(build_config)
}

/// Returns the path of every `build.zig` in an ancestor directory of `path`,
/// nearest directory first.
pub fn build_file_ancestors(path: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in path.ancestors().skip(1) {
        let candidate = dir.join(BUILD_FILE_NAME);
        if candidate.is_file() {
            found.push(candidate);
        }
    }
    found
}
