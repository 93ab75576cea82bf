use super::aggregate::PathList;
use super::{regular_files, Engine, TransferUnit};
use crate::config::{ChunkSize, TransferConfig};
use crate::error::{Error, Result};
use crate::io::backend::{Backend, BackendFactory};
use crate::io::writer::{admit, atomic_write};
use crate::path::{backend_path, CanonicalPath};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Uploads the regular files directly inside `base_dir/prefix` to
/// `root/prefix/<file name>`.
///
/// Every object is written atomically and checked against `skip` and
/// `overwrite` on its own: with `skip` set, objects already present are left
/// alone; with neither flag set, the first one present fails the call.
#[derive(Debug)]
pub struct Uploader {
    engine: Engine,
    base_dir: PathBuf,
}

impl Uploader {
    /// # Errors
    /// As for [`Engine::new`].
    pub fn new(config: TransferConfig) -> Result<Self> {
        Ok(Self::from_engine(Engine::new(config)?))
    }

    /// # Errors
    /// As for [`Engine::with_factory`].
    pub fn with_factory(config: TransferConfig, factory: BackendFactory) -> Result<Self> {
        Ok(Self::from_engine(Engine::with_factory(config, factory)?))
    }

    fn from_engine(engine: Engine) -> Self {
        Self {
            base_dir: engine.local_base(),
            engine,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Upload and return the canonical path of every object now at the
    /// destination (written or skipped), sorted.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the local directory is missing,
    /// [`Error::FileExists`] for an occupied target without `skip` or
    /// `overwrite`, or the first unit failure.
    #[instrument(level = "debug", skip(self), fields(root = %self.engine.root()))]
    pub fn upload(&self, prefix: &str) -> Result<Vec<CanonicalPath>> {
        let effective = self.engine.effective_prefix(prefix);
        let source = self.base_dir.join(&effective);
        if !source.is_dir() {
            return Err(Error::not_found(source.display().to_string()));
        }

        let mut units = Vec::new();
        for local in regular_files(&source)? {
            let name = local.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let key = format!("{effective}{name}");
            let target = self.engine.root().join_key(&key)?;
            debug!(local = %local.display(), target = %target, "queued for upload");
            units.push(TransferUnit {
                key,
                path: local.to_string_lossy().into_owned(),
            });
        }

        let config = self.engine.config();
        let root = self.engine.root().clone();
        let (overwrite, skip, chunk) = (config.overwrite, config.skip, config.chunk_size);
        let placed = self.engine.run(
            &units,
            |backend, unit| put(backend, unit, &root, overwrite, skip, chunk),
            &PathList,
        )?;
        info!(count = placed.len(), "upload complete");
        Ok(placed)
    }
}

/// Write one local file (`unit.path`) to `root/unit.key`.
fn put(
    backend: &dyn Backend,
    unit: &TransferUnit,
    root: &CanonicalPath,
    overwrite: bool,
    skip: bool,
    chunk: ChunkSize,
) -> Result<CanonicalPath> {
    let target = root.join_key(&unit.key)?;
    let scheme = backend.scheme();
    if !admit(backend, &backend_path(scheme, &target), overwrite, skip)? {
        debug!(target = %target, "target exists, skipping");
        return Ok(target);
    }
    if let Some(parent) = target.parent() {
        backend.make_dirs(&backend_path(scheme, &parent))?;
    }
    let file = File::open(&unit.path).map_err(|e| Error::local("open", &unit.path, e))?;
    let mut reader = BufReader::with_capacity(chunk.bytes(), file);
    atomic_write(backend, &target, chunk, None, |out| {
        io::copy(&mut reader, out)?;
        Ok(())
    })?;
    Ok(target)
}
