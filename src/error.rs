//! Crate-wide error type.
//!
//! Every failure mode surfaces as its own variant so callers can tell a policy
//! conflict ([`Error::FileExists`]) from a missing object ([`Error::NotFound`])
//! or a bad configuration ([`Error::InvalidPath`], [`Error::InvalidChunkSize`], ...)
//! without string matching. Nothing in the crate converts these into return codes.

use crate::io::cloud::CloudIOError;
use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The storage scheme name is not one of `file`, `s3`, `gcs`, `memory`.
    #[error("unknown storage scheme \"{0}\"")]
    UnknownScheme(String),

    /// The chunk size does not resolve to at least one 256 KiB granule, or
    /// exceeds the largest buffer the platform can allocate.
    #[error("chunk size must resolve to at least 256 KiB and fit one buffer, got {mib} MiB")]
    InvalidChunkSize { mib: f64 },

    /// Any other constructor-time misconfiguration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The resolved path points at (or too close to) the storage root.
    #[error("invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    /// A path template has more placeholders than fragments were supplied.
    #[error("path template \"{template}\" needs {expected} fragment(s), got {given}")]
    Format {
        template: String,
        expected: usize,
        given: usize,
    },

    /// The write target (or download destination) exists and policy forbids touching it.
    #[error("\"{path}\" already exists")]
    FileExists { path: String },

    /// The object to read does not exist.
    #[error("\"{path}\" not found")]
    NotFound { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Local filesystem error with the offending path attached.
    #[error("{op} {}: {source}", .path.display())]
    LocalIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cloud(#[from] CloudIOError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "io-toml")]
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[cfg(feature = "io-toml")]
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[cfg(feature = "io-yaml")]
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "io-parquet")]
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[cfg(feature = "io-parquet")]
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "io-parquet")]
    #[error(transparent)]
    SerdeArrow(#[from] serde_arrow::Error),

    /// The transfer worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn file_exists(path: impl Into<String>) -> Self {
        Self::FileExists { path: path.into() }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn local(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            op,
            path: path.into(),
            source,
        }
    }

    /// `true` for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
