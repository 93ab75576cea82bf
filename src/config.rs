//! Constructor-time configuration shared by every component.
//!
//! All config structs are serde-deserializable with defaults, so a whole
//! reader/writer/transfer setup can live in a TOML or JSON document:
//!
//! ```
//! use stowage::config::{LoadConfig, TransferConfig};
//!
//! let cfg = TransferConfig::from_json(r#"{
//!     "storage": "memory",
//!     "bucket": "reports",
//!     "prefix": "2024",
//!     "n_threads": 4
//! }"#).unwrap();
//! assert_eq!(cfg.n_threads, 4);
//! assert_eq!(cfg.chunk_size.bytes(), 10 * 1024 * 1024);
//! ```

use crate::error::{Error, Result};
use crate::io::compression::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Backend-specific keyword options, passed verbatim to backend constructors.
pub type StorageOptions = BTreeMap<String, String>;

// ============================================================================
// Storage scheme
// ============================================================================

/// Which storage system a component talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String", into = "String")]
pub enum StorageScheme {
    /// Local filesystem.
    #[default]
    File,
    /// Amazon S3 and S3-compatible object stores.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Process-wide in-memory store.
    Memory,
}

/// Schemes whose backends reject paths with a leading slash.
const STRIP_LEADING_SLASH: &[StorageScheme] = &[StorageScheme::Gcs];

impl StorageScheme {
    pub const ALL: [Self; 4] = [Self::File, Self::S3, Self::Gcs, Self::Memory];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Memory => "memory",
        }
    }

    /// Whether paths handed to this scheme's backend must not start with `/`.
    #[must_use]
    pub fn strips_leading_slash(self) -> bool {
        STRIP_LEADING_SLASH.contains(&self)
    }

    /// Whether the first path segment names a bucket rather than a directory.
    #[must_use]
    pub const fn is_object_store(self) -> bool {
        matches!(self, Self::S3 | Self::Gcs)
    }
}

impl fmt::Display for StorageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "local" => Ok(Self::File),
            "s3" => Ok(Self::S3),
            "gcs" | "gs" => Ok(Self::Gcs),
            "memory" => Ok(Self::Memory),
            _ => Err(Error::UnknownScheme(s.to_string())),
        }
    }
}

impl TryFrom<String> for StorageScheme {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StorageScheme> for String {
    fn from(value: StorageScheme) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// Chunk size
// ============================================================================

/// Streaming chunk size, configured in MiB and used in whole 256 KiB granules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ChunkSize {
    mib: f64,
    bytes: usize,
}

impl ChunkSize {
    /// Granule every chunk size is rounded down to.
    pub const GRANULE: usize = 256 * 1024;

    const MIB: f64 = 1024.0 * 1024.0;

    /// Resolve a MiB figure into a byte count, rounded down to [`Self::GRANULE`].
    ///
    /// # Errors
    /// [`Error::InvalidChunkSize`] if the result is less than one granule
    /// (including NaN, negative and infinite inputs) or larger than a single
    /// buffer can be.
    pub fn from_mib(mib: f64) -> Result<Self> {
        if !mib.is_finite() || mib <= 0.0 {
            return Err(Error::InvalidChunkSize { mib });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let granules = ((mib * Self::MIB) / Self::GRANULE as f64).floor() as usize;
        let bytes = granules
            .checked_mul(Self::GRANULE)
            .filter(|&b| b > 0 && isize::try_from(b).is_ok())
            .ok_or(Error::InvalidChunkSize { mib })?;
        Ok(Self { mib, bytes })
    }

    /// Chunk size in bytes; always a positive multiple of 256 KiB.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }

    /// The figure this chunk size was configured with.
    #[must_use]
    pub const fn mib(&self) -> f64 {
        self.mib
    }

    pub(crate) const fn reader_default() -> Self {
        Self {
            mib: 32.0,
            bytes: 32 * 1024 * 1024,
        }
    }

    pub(crate) const fn transfer_default() -> Self {
        Self {
            mib: 10.0,
            bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self::reader_default()
    }
}

impl TryFrom<f64> for ChunkSize {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::from_mib(value)
    }
}

impl From<ChunkSize> for f64 {
    fn from(value: ChunkSize) -> Self {
        value.mib
    }
}

// ============================================================================
// Not-found policy
// ============================================================================

/// What a reader does when the object it was asked for is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFound {
    /// Return an empty result silently.
    Ignore,
    /// Emit a warning and return an empty result.
    Warn,
    /// Fail with [`Error::NotFound`].
    #[default]
    Raise,
}

impl FromStr for NotFound {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "raise" => Ok(Self::Raise),
            other => Err(Error::InvalidConfig(format!(
                "not_found must be one of ignore/warn/raise, got \"{other}\""
            ))),
        }
    }
}

// ============================================================================
// Component configs
// ============================================================================

/// Configuration for [`Reader`](crate::io::reader::Reader) and the typed readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Directory or full path; may be completed at call time.
    pub path: String,
    pub storage: StorageScheme,
    pub chunk_size: ChunkSize,
    /// Explicit codec; inferred from the file extension when `None`.
    pub compression: Option<Compression>,
    pub not_found: NotFound,
    pub storage_options: StorageOptions,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            storage: StorageScheme::File,
            chunk_size: ChunkSize::reader_default(),
            compression: None,
            not_found: NotFound::Raise,
            storage_options: StorageOptions::new(),
        }
    }
}

impl ReaderConfig {
    #[must_use]
    pub fn new(storage: StorageScheme, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            storage,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_not_found(mut self, not_found: NotFound) -> Self {
        self.not_found = not_found;
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }
}

/// Configuration for [`Writer`](crate::io::writer::Writer) and the typed writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Full target path; may contain `{}` placeholders.
    pub path: String,
    pub storage: StorageScheme,
    /// Replace an existing target.
    pub overwrite: bool,
    /// Leave an existing target alone and report success.
    pub skip: bool,
    pub chunk_size: ChunkSize,
    /// Explicit codec; inferred from the file extension when `None`.
    pub compression: Option<Compression>,
    pub storage_options: StorageOptions,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            storage: StorageScheme::File,
            overwrite: false,
            skip: false,
            chunk_size: ChunkSize::reader_default(),
            compression: None,
            storage_options: StorageOptions::new(),
        }
    }
}

impl WriterConfig {
    #[must_use]
    pub fn new(storage: StorageScheme, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            storage,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }
}

/// Configuration for the bulk transfer components in [`crate::transfer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub storage: StorageScheme,
    /// Bucket on object stores, root directory on `file`, store root on `memory`.
    pub bucket: String,
    /// Prefix fixed at construction; the call-time prefix is appended to it.
    pub prefix: String,
    /// Local directory downloads land in (and uploads are read from).
    pub base_dir: String,
    pub overwrite: bool,
    pub skip: bool,
    /// Worker pool size.
    pub n_threads: usize,
    pub chunk_size: ChunkSize,
    pub storage_options: StorageOptions,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            storage: StorageScheme::File,
            bucket: String::new(),
            prefix: String::new(),
            base_dir: "/tmp".to_string(),
            overwrite: false,
            skip: false,
            n_threads: 16,
            chunk_size: ChunkSize::transfer_default(),
            storage_options: StorageOptions::new(),
        }
    }
}

impl TransferConfig {
    #[must_use]
    pub fn new(storage: StorageScheme, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub const fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }
}

/// Configuration for [`Find`](crate::io::find::Find).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindConfig {
    pub path: String,
    pub storage: StorageScheme,
    /// Only file names ending in this suffix are returned (leading dot optional).
    pub suffix: String,
    /// How many directory levels to descend; `None` walks everything.
    pub max_depth: Option<usize>,
    pub storage_options: StorageOptions,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            storage: StorageScheme::File,
            suffix: String::new(),
            max_depth: Some(1),
            storage_options: StorageOptions::new(),
        }
    }
}

impl FindConfig {
    #[must_use]
    pub fn new(storage: StorageScheme, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            storage,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Parse any config struct from a JSON or TOML document.
pub trait LoadConfig: DeserializeOwned {
    /// # Errors
    /// [`Error::Json`] on malformed input, or the validation error of a field
    /// (e.g. [`Error::InvalidChunkSize`]) wrapped by serde.
    fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// # Errors
    /// [`Error::TomlDe`] on malformed input or invalid field values.
    #[cfg(feature = "io-toml")]
    fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

impl<T: DeserializeOwned> LoadConfig for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_rounds_down_to_granule() {
        let c = ChunkSize::from_mib(1.3).unwrap();
        assert_eq!(c.bytes() % ChunkSize::GRANULE, 0);
        assert_eq!(c.bytes(), 5 * ChunkSize::GRANULE);

        let c = ChunkSize::from_mib(0.25).unwrap();
        assert_eq!(c.bytes(), ChunkSize::GRANULE);
    }

    #[test]
    fn test_chunk_size_rejects_sub_granule() {
        assert!(matches!(
            ChunkSize::from_mib(0.1),
            Err(Error::InvalidChunkSize { .. })
        ));
        assert!(ChunkSize::from_mib(0.0).is_err());
        assert!(ChunkSize::from_mib(-4.0).is_err());
        assert!(ChunkSize::from_mib(f64::NAN).is_err());
    }

    #[test]
    fn test_chunk_size_rejects_oversized() {
        for mib in [1e20, f64::MAX] {
            assert!(
                matches!(ChunkSize::from_mib(mib), Err(Error::InvalidChunkSize { .. })),
                "{mib} should be rejected"
            );
        }
        assert!(ChunkSize::from_mib(1024.0).is_ok());
    }

    #[test]
    fn test_defaults_match_constructors() {
        assert_eq!(ChunkSize::reader_default(), ChunkSize::from_mib(32.0).unwrap());
        assert_eq!(ChunkSize::transfer_default(), ChunkSize::from_mib(10.0).unwrap());
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("file".parse::<StorageScheme>().unwrap(), StorageScheme::File);
        assert_eq!(" GCS ".parse::<StorageScheme>().unwrap(), StorageScheme::Gcs);
        assert!(matches!(
            "ftp".parse::<StorageScheme>(),
            Err(Error::UnknownScheme(_))
        ));
        for scheme in StorageScheme::ALL {
            assert_eq!(scheme.as_str().parse::<StorageScheme>().unwrap(), scheme);
        }
    }

    #[test]
    fn test_only_gcs_strips_leading_slash() {
        assert!(StorageScheme::Gcs.strips_leading_slash());
        assert!(!StorageScheme::S3.strips_leading_slash());
        assert!(!StorageScheme::File.strips_leading_slash());
        assert!(!StorageScheme::Memory.strips_leading_slash());
    }

    #[test]
    fn test_writer_config_from_json() {
        let cfg = WriterConfig::from_json(
            r#"{"path": "/data/{}/out.json", "storage": "memory", "skip": true, "chunk_size": 1}"#,
        )
        .unwrap();
        assert_eq!(cfg.storage, StorageScheme::Memory);
        assert!(cfg.skip);
        assert!(!cfg.overwrite);
        assert_eq!(cfg.chunk_size.bytes(), 1024 * 1024);
    }

    #[test]
    fn test_bad_scheme_in_json_is_rejected() {
        assert!(ReaderConfig::from_json(r#"{"storage": "ftp"}"#).is_err());
    }

    #[cfg(feature = "io-toml")]
    #[test]
    fn test_reader_config_from_toml() {
        let cfg = ReaderConfig::from_toml(
            r#"
            path = "/bucket/configs"
            storage = "gcs"
            not_found = "warn"

            [storage_options]
            project = "acme"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage, StorageScheme::Gcs);
        assert_eq!(cfg.not_found, NotFound::Warn);
        assert_eq!(cfg.storage_options.get("project").map(String::as_str), Some("acme"));
        assert_eq!(cfg.chunk_size, ChunkSize::reader_default());
    }
}
