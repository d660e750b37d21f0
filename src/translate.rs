//! Translation of rendered `@cImport` blocks into Zig source.
//!
//! The rendered C translation unit is written into the global cache directory
//! and handed to `zig translate-c` in a sub-process. Results are memoized in
//! the store's cimport cache keyed by the content hash of the C source, so a
//! block only pays for translation again when its content changes.

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use url::Url;

use crate::{config::Config, uri};

/// Outcome of translating one `@cImport` block.
///
/// `Failure` deliberately carries no payload yet; attaching diagnostics later
/// is a non-breaking change for callers matching on the variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CimportResult {
    /// Translation produced a Zig file at this URI.
    Success(Url),
    /// The compiler rejected the C source. Cached so retries stay cheap until
    /// the source changes.
    Failure,
}

impl CimportResult {
    /// Returns the translated URI if the translation succeeded.
    pub fn success_uri(&self) -> Option<&Url> {
        match self {
            CimportResult::Success(uri) => Some(uri),
            CimportResult::Failure => None,
        }
    }
}

/// Runs `zig translate-c` over the given C source.
///
/// Returns `None` when translation could not be attempted at all (no compiler
/// configured, no cache directory, or a transient I/O failure); such blocks
/// are retried on the next refresh without poisoning the cache. A compiler
/// rejection is a real [`CimportResult::Failure`].
pub(crate) fn translate(
    config: &Config,
    include_dirs: &[PathBuf],
    c_source: &str,
    hash: &str,
) -> Option<CimportResult> {
    let Some(zig_exe) = config.zig_exe_path.as_deref() else {
        trace!("skipping cimport translation, no zig executable configured");
        return None;
    };
    let Some(cache_dir) = config.global_cache_path.as_deref() else {
        trace!("skipping cimport translation, no global cache path configured");
        return None;
    };

    let c_path = cache_dir.join(format!("cimport-{hash}.c"));
    if let Err(err) = fs::create_dir_all(cache_dir).and_then(|()| fs::write(&c_path, c_source)) {
        debug!("failed to stage cimport source at {}: {err}", c_path.display());
        return None;
    }

    let mut cmd = Command::new(zig_exe);
    cmd.arg("translate-c").arg(&c_path);
    for dir in include_dirs {
        cmd.arg("-I").arg(dir);
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    debug!(?cmd, "translating cimport");

    let output = match cmd.output() {
        Ok(output) => output,
        Err(err) => {
            debug!("failed to spawn {}: {err}", zig_exe.display());
            return None;
        }
    };
    if !output.status.success() {
        debug!(
            "translate-c exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        return Some(CimportResult::Failure);
    }

    let zig_path = cache_dir.join(format!("cimport-{hash}.zig"));
    if let Err(err) = fs::write(&zig_path, &output.stdout) {
        debug!("failed to write translated source at {}: {err}", zig_path.display());
        return None;
    }
    translated_uri(&zig_path).map(CimportResult::Success)
}

fn translated_uri(path: &Path) -> Option<Url> {
    uri::from_file_path(path).ok()
}
