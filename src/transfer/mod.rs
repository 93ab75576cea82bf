//! Concurrent bulk transfers between a storage root and the local disk.
//!
//! An [`Engine`] lists the objects under a logical directory, keeps only its
//! direct children, and hands one [`TransferUnit`] per object to a bounded
//! worker pool. Each worker thread builds its own backend handle on the first
//! unit it runs and reuses it for every later unit; handles never move
//! between threads.
//!
//! The first failing unit fails the whole call: no new units are scheduled,
//! units already running finish, their results are discarded, and the error
//! is returned unchanged.

pub mod aggregate;
mod download;
#[cfg(feature = "io-parquet")]
mod table;
mod upload;

pub use download::Downloader;
#[cfg(feature = "io-parquet")]
pub use table::TableLoader;
pub use upload::Uploader;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::io::backend::{Backend, BackendFactory};
use crate::path::{CanonicalPath, PathResolver};
use aggregate::Aggregate;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument, warn};

/// One object to move.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransferUnit {
    /// Path relative to the engine root, e.g. `prefix/file.ext`.
    pub key: String,
    /// Backend path of the object.
    pub path: String,
}

impl TransferUnit {
    /// Last segment of the key.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Number of `/` in the key.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.key.matches('/').count()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Listing,
    Dispatching,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listing => "listing",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// One backend handle slot per pool thread.
struct WorkerHandles<'a> {
    factory: &'a BackendFactory,
    slots: Vec<Mutex<Option<Box<dyn Backend>>>>,
    created: AtomicUsize,
}

impl<'a> WorkerHandles<'a> {
    fn new(factory: &'a BackendFactory, threads: usize) -> Self {
        Self {
            factory,
            slots: (0..threads).map(|_| Mutex::new(None)).collect(),
            created: AtomicUsize::new(0),
        }
    }

    /// Run `f` with the calling worker's handle, building it on first use.
    fn with<R>(&self, f: impl FnOnce(&dyn Backend) -> Result<R>) -> Result<R> {
        let Some(slot) = rayon::current_thread_index().and_then(|i| self.slots.get(i)) else {
            warn!("transfer unit ran outside the worker pool, using a one-off handle");
            return f(&*self.factory.create()?);
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let backend = match guard.take() {
            Some(backend) => backend,
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                self.factory.create()?
            }
        };
        let out = f(&*backend);
        *guard = Some(backend);
        out
    }
}

/// Bounded worker pool plus the storage root it transfers from or to.
///
/// Calls run to completion: there is no cancellation and no per-unit timeout.
pub struct Engine {
    config: TransferConfig,
    root: CanonicalPath,
    resolver: PathResolver,
    factory: BackendFactory,
    pool: ThreadPool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("prefix", &self.config.prefix)
            .field("n_threads", &self.config.n_threads)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// # Errors
    /// As for [`with_factory`](Self::with_factory).
    pub fn new(config: TransferConfig) -> Result<Self> {
        let factory = BackendFactory::new(config.storage, config.storage_options.clone());
        Self::with_factory(config, factory)
    }

    /// Build the pool. No backend handle is created until a call needs one.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for zero threads, [`Error::InvalidPath`] if
    /// the bucket resolves to the storage root, [`Error::WorkerPool`] if the
    /// threads cannot be spawned.
    pub fn with_factory(config: TransferConfig, factory: BackendFactory) -> Result<Self> {
        if config.n_threads == 0 {
            return Err(Error::InvalidConfig("n_threads must be at least 1".into()));
        }
        let resolver = PathResolver::for_directory(config.storage);
        let root = resolver.resolve_suffix(&config.bucket, "")?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.n_threads)
            .thread_name(|i| format!("stowage-transfer-{i}"))
            .build()?;
        Ok(Self {
            config,
            root,
            resolver,
            factory,
            pool,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    #[must_use]
    pub const fn root(&self) -> &CanonicalPath {
        &self.root
    }

    /// Construction prefix plus call prefix, each stripped of spaces, dots
    /// and slashes and terminated by `/` when non-empty.
    #[must_use]
    pub fn effective_prefix(&self, prefix: &str) -> String {
        format!("{}{}", normalize_prefix(&self.config.prefix), normalize_prefix(prefix))
    }

    /// The direct children of `root/prefix` (a prefix already run through
    /// [`effective_prefix`](Self::effective_prefix)), listed on the calling thread.
    ///
    /// # Errors
    /// Backend construction or listing errors.
    #[instrument(level = "debug", skip(self), fields(root = %self.root))]
    pub fn list_units(&self, prefix: &str) -> Result<Vec<TransferUnit>> {
        debug!(phase = %Phase::Listing, "transfer phase");
        let backend = self.factory.create()?;
        let base = format!("{}/", self.root);
        let listing = format!("{}/{prefix}", self.resolver.backend_path(&self.root));
        let depth = prefix.matches('/').count();

        let mut units = Vec::new();
        for listed in backend.list(&listing)? {
            let Some(key) = listed.strip_prefix(&base) else {
                continue;
            };
            if key.matches('/').count() != depth {
                continue;
            }
            let path = self.resolver.backend_path(&CanonicalPath::from_key(&listed)?);
            units.push(TransferUnit {
                key: key.to_string(),
                path,
            });
        }
        debug!(found = units.len(), "listed transfer units");
        Ok(units)
    }

    /// Run `work` for every unit on the pool and fold the results with `agg`.
    ///
    /// # Errors
    /// The first error returned by `work` or by handle construction.
    pub fn run<T, F, A>(&self, units: &[TransferUnit], work: F, agg: &A) -> Result<A::Output>
    where
        T: Send,
        F: Fn(&dyn Backend, &TransferUnit) -> Result<T> + Sync,
        A: Aggregate<T>,
    {
        debug!(
            phase = %Phase::Dispatching,
            units = units.len(),
            threads = self.pool.current_num_threads(),
            "transfer phase"
        );
        let handles = WorkerHandles::new(&self.factory, self.pool.current_num_threads());
        let results = self.pool.install(|| {
            units
                .par_iter()
                .map(|unit| handles.with(|backend| work(backend, unit)))
                .collect::<Result<Vec<T>>>()
        });
        let handles_created = handles.created.load(Ordering::Relaxed);

        match results {
            Ok(parts) => {
                debug!(phase = %Phase::Draining, handles_created, "transfer phase");
                let manifest = agg.aggregate(parts)?;
                debug!(phase = %Phase::Done, "transfer phase");
                Ok(manifest)
            }
            Err(e) => {
                debug!(phase = %Phase::Failed, handles_created, error = %e, "transfer phase");
                Err(e)
            }
        }
    }

    /// `base_dir` as an absolute local directory.
    pub(crate) fn local_base(&self) -> PathBuf {
        let base = self.config.base_dir.trim().trim_matches([' ', '/']);
        PathBuf::from(format!("/{base}"))
    }
}

/// Regular files directly inside `dir`, sorted.
pub(crate) fn regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::local("read_dir", dir, e))? {
        let path = entry.map_err(|e| Error::local("read_dir", dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Strip spaces, dots and slashes from both ends; append `/` if anything is left.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    match prefix.trim_matches([' ', '.', '/']) {
        "" => String::new(),
        p => format!("{p}/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageScheme;
    use crate::io::backend::MemoryBackend;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix(" ./ "), "");
        assert_eq!(normalize_prefix("./data/"), "data/");
        assert_eq!(normalize_prefix("a/b"), "a/b/");
    }

    #[test]
    fn test_unit_depth_and_name() {
        let unit = TransferUnit {
            key: "p/q/file.bin".into(),
            path: "/b/p/q/file.bin".into(),
        };
        assert_eq!(unit.depth(), 2);
        assert_eq!(unit.file_name(), "file.bin");
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = TransferConfig::new(StorageScheme::Memory, "bucket").with_threads(0);
        assert!(matches!(Engine::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_root_bucket_rejected() {
        let config = TransferConfig::new(StorageScheme::Memory, " / ");
        assert!(matches!(Engine::new(config), Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_effective_prefix_concatenates() {
        let engine =
            Engine::new(TransferConfig::new(StorageScheme::Memory, "b").with_prefix("/runs/")).unwrap();
        assert_eq!(engine.effective_prefix(" 2024 "), "runs/2024/");
        assert_eq!(engine.effective_prefix(""), "runs/");
    }

    #[test]
    fn test_list_units_keeps_direct_children() {
        let store = MemoryBackend::new("engine-list-units");
        for path in ["/b/top.txt", "/b/d/one.txt", "/b/d/two.txt", "/b/d/sub/deep.txt", "/b/dx/other.txt"] {
            let mut w = store.create(path, crate::config::ChunkSize::default()).unwrap();
            std::io::Write::write_all(&mut w, b"x").unwrap();
            w.commit().unwrap();
        }
        let engine = Engine::new(
            TransferConfig::new(StorageScheme::Memory, "b").with_option("store", "engine-list-units"),
        )
        .unwrap();
        let keys: Vec<_> = engine
            .list_units(&engine.effective_prefix("d"))
            .unwrap()
            .into_iter()
            .map(|u| u.key)
            .collect();
        assert_eq!(keys, vec!["d/one.txt", "d/two.txt"]);
        let top: Vec<_> = engine.list_units("").unwrap().into_iter().map(|u| u.key).collect();
        assert_eq!(top, vec!["top.txt"]);
    }
}
