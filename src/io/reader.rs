//! Streaming reads from any backend.
//!
//! A [`Reader`] is configured with a directory or full path and completes it
//! with a call-time suffix (see [`PathResolver::resolve_suffix`]). Each call
//! builds a fresh backend handle; nothing is cached between calls.
//!
//! ```
//! use stowage::config::{NotFound, ReaderConfig, StorageScheme};
//! use stowage::io::reader::Reader;
//!
//! # fn main() -> stowage::Result<()> {
//! let reader = Reader::new(
//!     ReaderConfig::new(StorageScheme::Memory, "/docs/reader-example")
//!         .with_not_found(NotFound::Ignore),
//! );
//! // Missing objects read as empty under the `ignore` policy.
//! assert!(reader.read_bytes("absent.txt")?.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::config::{NotFound, ReaderConfig};
use crate::error::{Error, Result};
use crate::io::backend::BackendFactory;
use crate::io::compression::{resolve_codec, Compression};
use crate::path::{CanonicalPath, PathResolver};
use std::io::{self, Read};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Reader {
    config: ReaderConfig,
    resolver: PathResolver,
    factory: BackendFactory,
}

impl Reader {
    #[must_use]
    pub fn new(config: ReaderConfig) -> Self {
        let factory = BackendFactory::new(config.storage, config.storage_options.clone());
        Self::with_factory(config, factory)
    }

    /// Read through a caller-supplied backend factory.
    #[must_use]
    pub fn with_factory(config: ReaderConfig, factory: BackendFactory) -> Self {
        Self {
            resolver: PathResolver::for_reader(config.storage),
            config,
            factory,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Replace the configured codec choice.
    #[must_use]
    pub const fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.config.compression = compression;
        self
    }

    /// The canonical path a call with `suffix` would read.
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if the result is too close to the root.
    pub fn resolve(&self, suffix: &str) -> Result<CanonicalPath> {
        self.resolver.resolve_suffix(&self.config.path, suffix)
    }

    /// Open the object as a decoded stream.
    ///
    /// A missing object downgraded by the not-found policy yields an empty stream.
    ///
    /// # Errors
    /// [`Error::NotFound`] under [`NotFound::Raise`], path errors, or backend errors.
    pub fn open(&self, suffix: &str) -> Result<Box<dyn Read + Send>> {
        Ok(self
            .stream(suffix)?
            .map_or_else(|| Box::new(io::empty()) as Box<dyn Read + Send>, |(_, s)| s))
    }

    /// Read the whole decoded object.
    ///
    /// # Errors
    /// As for [`open`](Self::open).
    pub fn read_bytes(&self, suffix: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some((path, mut stream)) = self.stream(suffix)? {
            stream
                .read_to_end(&mut buf)
                .map_err(|e| Error::local("read", path.as_str(), e))?;
        }
        Ok(buf)
    }

    /// Decode the object with `decode`; `Ok(None)` if the object is missing
    /// and the policy allows it.
    ///
    /// # Errors
    /// As for [`open`](Self::open), plus any error from `decode`.
    pub fn read_with<T, F>(&self, suffix: &str, decode: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut (dyn Read + Send)) -> Result<T>,
    {
        match self.stream(suffix)? {
            Some((_, mut stream)) => decode(&mut stream).map(Some),
            None => Ok(None),
        }
    }

    fn stream(&self, suffix: &str) -> Result<Option<(CanonicalPath, Box<dyn Read + Send>)>> {
        let path = self.resolve(suffix)?;
        let backend = self.factory.create()?;
        let target = self.resolver.backend_path(&path);

        let Some(raw) = backend.open(&target, self.config.chunk_size)? else {
            return match self.config.not_found {
                NotFound::Raise => Err(Error::not_found(path.as_str())),
                NotFound::Warn => {
                    warn!(path = %path, "file not found, returning empty content");
                    Ok(None)
                }
                NotFound::Ignore => Ok(None),
            };
        };

        debug!(path = %path, scheme = %self.config.storage, "opened for reading");
        let stream = match resolve_codec(self.config.compression, path.as_str())? {
            Some(codec) => codec.decoder(raw)?,
            None => raw,
        };
        Ok(Some((path, stream)))
    }
}
