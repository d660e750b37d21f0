//! Error types for the document store.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::ExitStatus,
};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// An I/O error together with the path it occurred on.
#[derive(Debug, thiserror::Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct StoreIoError {
    io: io::Error,
    path: PathBuf,
}

impl StoreIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying `io::Error`
    pub fn io_error(&self) -> &io::Error {
        &self.io
    }
}

impl From<StoreIoError> for io::Error {
    fn from(err: StoreIoError) -> Self {
        err.io
    }
}

/// Various errors raised while maintaining the document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] StoreIoError),
    /// Produced when the build runner's stdout is not the expected JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("build runner exited with {0}\n{1}")]
    BuildRunnerFailed(ExitStatus, String),
    #[error("not a file uri: {0}")]
    InvalidUri(String),
    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        StoreIoError::new(err, path).into()
    }

    pub fn msg(msg: impl fmt::Display) -> Self {
        StoreError::Message(msg.to_string())
    }
}
