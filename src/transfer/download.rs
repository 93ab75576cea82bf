use super::aggregate::FileList;
use super::{regular_files, Engine, TransferUnit};
use crate::config::{ChunkSize, TransferConfig};
use crate::error::{Error, Result};
use crate::io::backend::{Backend, BackendFactory, LocalBackend};
use crate::io::writer::atomic_write;
use crate::path::CanonicalPath;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Downloads the direct children of `root/prefix` into `base_dir/prefix`.
///
/// ```no_run
/// use stowage::config::{StorageScheme, TransferConfig};
/// use stowage::transfer::Downloader;
///
/// # fn main() -> stowage::Result<()> {
/// let downloader = Downloader::new(
///     TransferConfig::new(StorageScheme::S3, "my-bucket")
///         .with_prefix("exports")
///         .with_base_dir("/data/cache")
///         .with_skip(true),
/// )?;
/// // Fetches s3://my-bucket/exports/2024/* into /data/cache/exports/2024/.
/// let files = downloader.download("2024")?;
/// println!("{} files", files.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Downloader {
    engine: Engine,
    base_dir: PathBuf,
}

/// What the local destination allows before anything remote is touched.
enum Preflight {
    Fetch,
    Existing(Vec<PathBuf>),
}

impl Downloader {
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

    /// The local directory a call with `prefix` downloads into.
    #[must_use]
    pub fn destination(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(self.engine.effective_prefix(prefix))
    }

    /// Download and return the local paths, sorted.
    ///
    /// With `skip` set and regular files already present at the
    /// destination, those files are returned without contacting the backend.
    ///
    /// # Errors
    /// [`Error::FileExists`] if the destination is occupied and neither
    /// `skip` nor `overwrite` allows it, or the first unit failure.
    #[instrument(level = "debug", skip(self), fields(root = %self.engine.root()))]
    pub fn download(&self, prefix: &str) -> Result<Vec<PathBuf>> {
        let effective = self.engine.effective_prefix(prefix);
        let dest = self.base_dir.join(&effective);

        if let Preflight::Existing(files) = self.preflight(&dest)? {
            info!(dest = %dest.display(), count = files.len(), "destination populated, skipping download");
            return Ok(files);
        }

        let units = self.engine.list_units(&effective)?;
        let chunk = self.engine.config().chunk_size;
        let files = self.engine.run(
            &units,
            |backend, unit| fetch(backend, unit, &dest, chunk),
            &FileList,
        )?;
        info!(dest = %dest.display(), count = files.len(), "download complete");
        Ok(files)
    }

    fn preflight(&self, dest: &Path) -> Result<Preflight> {
        let config = self.engine.config();
        let exists = dest
            .try_exists()
            .map_err(|e| Error::local("stat", dest, e))?;

        if exists && config.overwrite {
            debug!(dest = %dest.display(), "removing existing destination");
            let removed = if dest.is_dir() {
                fs::remove_dir_all(dest)
            } else {
                fs::remove_file(dest)
            };
            removed.map_err(|e| Error::local("remove", dest, e))?;
        } else if exists && dest.is_dir() {
            if config.skip {
                let files = regular_files(dest)?;
                if !files.is_empty() {
                    return Ok(Preflight::Existing(files));
                }
                return Ok(Preflight::Fetch);
            }
            if is_empty_dir(dest)? {
                return Ok(Preflight::Fetch);
            }
            return Err(Error::file_exists(dest.display().to_string()));
        } else if exists {
            return Err(Error::file_exists(dest.display().to_string()));
        }

        fs::create_dir_all(dest).map_err(|e| Error::local("mkdir", dest, e))?;
        Ok(Preflight::Fetch)
    }
}

/// Stream one object into `dest` under its last key segment.
fn fetch(backend: &dyn Backend, unit: &TransferUnit, dest: &Path, chunk: ChunkSize) -> Result<PathBuf> {
    let Some(mut stream) = backend.open(&unit.path, chunk)? else {
        return Err(Error::not_found(unit.path.as_str()));
    };
    let local = dest.join(unit.file_name());
    let target = CanonicalPath::from_key(&local.to_string_lossy())?;
    atomic_write(&LocalBackend::default(), &target, chunk, None, |out| {
        io::copy(&mut stream, out)?;
        Ok(())
    })?;
    debug!(key = %unit.key, local = %local.display(), "downloaded");
    Ok(local)
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    Ok(fs::read_dir(dir)
        .map_err(|e| Error::local("read_dir", dir, e))?
        .next()
        .is_none())
}
