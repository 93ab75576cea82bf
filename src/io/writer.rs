//! Atomic writes to any backend.
//!
//! Every write goes to a uniquely named temporary sibling of the target and is
//! renamed onto the target only after the content (and any compression
//! trailer) was written and committed. A failure at any step, including a
//! panic inside the content callback, removes the temporary object and leaves
//! the target exactly as it was.
//!
//! There is no locking across processes: two writers racing on the same target
//! both succeed and the last rename wins.

use crate::config::{ChunkSize, WriterConfig};
use crate::error::{Error, Result};
use crate::io::backend::{Backend, BackendFactory};
use crate::io::compression::{resolve_codec, Compression, CompressionCodec};
use crate::path::{backend_path, CanonicalPath, PathResolver};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a write call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The object was written to this path.
    Written(CanonicalPath),
    /// The path already existed and `skip` was set.
    Skipped(CanonicalPath),
}

impl WriteOutcome {
    #[must_use]
    pub const fn path(&self) -> &CanonicalPath {
        match self {
            Self::Written(p) | Self::Skipped(p) => p,
        }
    }

    #[must_use]
    pub const fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

#[derive(Debug, Clone)]
pub struct Writer {
    config: WriterConfig,
    resolver: PathResolver,
    factory: BackendFactory,
}

impl Writer {
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        let factory = BackendFactory::new(config.storage, config.storage_options.clone());
        Self::with_factory(config, factory)
    }

    /// Write through a caller-supplied backend factory.
    #[must_use]
    pub fn with_factory(config: WriterConfig, factory: BackendFactory) -> Self {
        Self {
            resolver: PathResolver::for_writer(config.storage),
            config,
            factory,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Replace the configured codec choice.
    #[must_use]
    pub const fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.config.compression = compression;
        self
    }

    /// The canonical target for `parts`.
    ///
    /// # Errors
    /// [`Error::Format`] or [`Error::InvalidPath`].
    pub fn resolve<S: AsRef<str>>(&self, parts: &[S]) -> Result<CanonicalPath> {
        self.resolver.resolve(&self.config.path, parts)
    }

    /// Write `content` to the target named by `parts`.
    ///
    /// # Errors
    /// As for [`write_with`](Self::write_with).
    pub fn write<S: AsRef<str>>(&self, content: &[u8], parts: &[S]) -> Result<WriteOutcome> {
        self.write_with(parts, |w| Ok(w.write_all(content)?))
    }

    /// Stream content produced by `fill` to the target named by `parts`.
    ///
    /// # Errors
    /// [`Error::FileExists`] if the target exists and neither `skip` nor
    /// `overwrite` is set, path errors, backend errors, or the error returned
    /// by `fill`, unchanged.
    pub fn write_with<S, F>(&self, parts: &[S], fill: F) -> Result<WriteOutcome>
    where
        S: AsRef<str>,
        F: FnOnce(&mut (dyn Write + Send)) -> Result<()>,
    {
        let path = self.resolve(parts)?;
        let backend = self.factory.create()?;
        let target = self.resolver.backend_path(&path);

        if !admit(&*backend, &target, self.config.overwrite, self.config.skip)? {
            debug!(path = %path, "target exists, skipping");
            return Ok(WriteOutcome::Skipped(path));
        }

        if let Some(parent) = path.parent() {
            backend.make_dirs(&self.resolver.backend_path(&parent))?;
        }
        let codec = resolve_codec(self.config.compression, path.as_str())?;
        atomic_write(&*backend, &path, self.config.chunk_size, codec.as_ref(), fill)?;
        Ok(WriteOutcome::Written(path))
    }
}

/// Apply the skip/overwrite policy: `Ok(true)` to proceed, `Ok(false)` to skip.
///
/// `skip` wins when both flags are set.
pub(crate) fn admit(backend: &dyn Backend, target: &str, overwrite: bool, skip: bool) -> Result<bool> {
    if backend.exists(target)? {
        if skip {
            return Ok(false);
        }
        if !overwrite {
            return Err(Error::file_exists(target));
        }
    }
    Ok(true)
}

/// Temporary object removed on drop unless promoted.
struct TempObject<'a> {
    backend: &'a dyn Backend,
    path: String,
    armed: bool,
}

impl<'a> TempObject<'a> {
    const fn new(backend: &'a dyn Backend, path: String) -> Self {
        Self {
            backend,
            path,
            armed: true,
        }
    }

    fn promote(mut self, target: &str) -> Result<()> {
        self.backend.rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempObject<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.backend.remove(&self.path) {
                warn!(path = %self.path, error = %e, "failed to remove temporary object");
            }
        }
    }
}

/// Write to a temporary sibling of `path`, then rename it onto `path`.
pub(crate) fn atomic_write<F>(
    backend: &dyn Backend,
    path: &CanonicalPath,
    chunk: ChunkSize,
    codec: Option<&Arc<dyn CompressionCodec>>,
    fill: F,
) -> Result<()>
where
    F: FnOnce(&mut (dyn Write + Send)) -> Result<()>,
{
    let scheme = backend.scheme();
    let target = backend_path(scheme, path);
    let temp = TempObject::new(backend, backend_path(scheme, &path.temp_sibling()));

    let mut sink = backend.create(&temp.path, chunk)?;
    match codec {
        Some(codec) => {
            let mut encoder = codec.encoder(&mut sink)?;
            fill(&mut encoder)?;
            encoder.finish_stream()?;
        }
        None => fill(&mut sink)?,
    }
    sink.commit()?;
    temp.promote(&target)?;

    debug!(path = %path, scheme = %scheme, "wrote atomically");
    Ok(())
}
