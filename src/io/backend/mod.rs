//! The backend capability: one storage system behind a uniform interface.
//!
//! A [`Backend`] is a handle to one storage system. Readers and writers build
//! one per call; the transfer engine builds one per worker thread through a
//! [`BackendFactory`] and never shares it. The object-store client behind
//! those handles is resolved once per factory and shared by all of them.
//!
//! Paths are backend paths as produced by
//! [`PathResolver::backend_path`](crate::path::PathResolver::backend_path):
//! `/bucket/key` everywhere except on schemes that strip the leading slash.
//! Implementations accept both forms. [`Backend::list`] always returns the
//! canonical, slash-prefixed form.

mod local;
mod memory;
mod object;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object::ObjectStoreBackend;

use crate::config::{ChunkSize, StorageOptions, StorageScheme};
use crate::error::Result;
use crate::io::cloud::{client_for, ObjectIO};
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

/// Sink for a new object. Bytes become visible only after [`commit`](Self::commit).
pub trait ObjectWriter: Write + Send {
    /// Flush and make the object durable at the path it was created for.
    ///
    /// # Errors
    /// Any I/O or client error. Dropping without committing discards the bytes
    /// on buffering backends and leaves a partial file on local disk.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Object-level operations against one storage system.
pub trait Backend: Send {
    fn scheme(&self) -> StorageScheme;

    /// Whether an object or a non-empty directory lives at `path`.
    ///
    /// # Errors
    /// Transport or permission failures.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Open `path` for streaming reads; `Ok(None)` if nothing is there.
    ///
    /// # Errors
    /// Any failure other than absence.
    fn open(&self, path: &str, chunk: ChunkSize) -> Result<Option<Box<dyn Read + Send>>>;

    /// Create (or truncate) `path` for streaming writes.
    ///
    /// # Errors
    /// If the sink cannot be opened.
    fn create(&self, path: &str, chunk: ChunkSize) -> Result<Box<dyn ObjectWriter>>;

    /// Move `from` onto `to`, replacing `to` if present.
    ///
    /// # Errors
    /// If `from` is missing or the move fails.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Delete `path` (recursively for directories). Removing nothing is not an error.
    ///
    /// # Errors
    /// Transport or permission failures.
    fn remove(&self, path: &str) -> Result<()>;

    /// Every object under `prefix`, recursively, sorted.
    ///
    /// `prefix` is a plain string prefix: `/b/data/` lists a directory while
    /// `/b/data/run-` lists the objects whose names start with `run-`. A
    /// missing location lists as empty.
    ///
    /// # Errors
    /// Transport or permission failures.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Ensure `path` can hold objects. A no-op where directories are implicit.
    ///
    /// # Errors
    /// If the directory cannot be created.
    fn make_dirs(&self, path: &str) -> Result<()>;
}

type Constructor = Arc<dyn Fn() -> Result<Box<dyn Backend>> + Send + Sync>;

/// Object-store client shared by every clone of one factory.
type ClientCell = Arc<OnceLock<Arc<dyn ObjectIO>>>;

/// Builds backend handles on demand, one per caller.
#[derive(Clone)]
pub enum BackendFactory {
    /// Built-in backend for a scheme, configured by keyword options.
    Scheme {
        scheme: StorageScheme,
        options: StorageOptions,
        client: ClientCell,
    },
    /// Caller-supplied constructor; used for fakes and instrumented backends.
    Custom {
        scheme: StorageScheme,
        build: Constructor,
    },
}

impl BackendFactory {
    #[must_use]
    pub fn new(scheme: StorageScheme, options: StorageOptions) -> Self {
        Self::Scheme {
            scheme,
            options,
            client: ClientCell::default(),
        }
    }

    pub fn custom<F>(scheme: StorageScheme, build: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Backend>> + Send + Sync + 'static,
    {
        Self::Custom {
            scheme,
            build: Arc::new(build),
        }
    }

    #[must_use]
    pub const fn scheme(&self) -> StorageScheme {
        match self {
            Self::Scheme { scheme, .. } | Self::Custom { scheme, .. } => *scheme,
        }
    }

    /// Construct a fresh handle.
    ///
    /// Object-store schemes look their client up on the first call only;
    /// later handles (on any clone of this factory) reuse it, so a client
    /// registered afterwards does not reach them.
    ///
    /// # Errors
    /// If the backend (or its object-store client) cannot be constructed.
    pub fn create(&self) -> Result<Box<dyn Backend>> {
        match self {
            Self::Scheme {
                scheme,
                options,
                client,
            } => match scheme {
                StorageScheme::File => Ok(Box::new(LocalBackend::from_options(options))),
                StorageScheme::Memory => Ok(Box::new(MemoryBackend::from_options(options))),
                StorageScheme::S3 | StorageScheme::Gcs => {
                    let shared = match client.get() {
                        Some(shared) => Arc::clone(shared),
                        None => {
                            let built = client_for(*scheme, options)?;
                            Arc::clone(client.get_or_init(|| built))
                        }
                    };
                    Ok(Box::new(ObjectStoreBackend::new(*scheme, shared)))
                }
            },
            Self::Custom { build, .. } => build(),
        }
    }
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheme {
                scheme,
                options,
                client,
            } => f
                .debug_struct("Scheme")
                .field("scheme", scheme)
                .field("options", options)
                .field("client_ready", &client.get().is_some())
                .finish(),
            Self::Custom { scheme, .. } => f
                .debug_struct("Custom")
                .field("scheme", scheme)
                .finish_non_exhaustive(),
        }
    }
}

/// Read an object fully into memory; `Ok(None)` if missing.
pub(crate) fn read_all(
    backend: &dyn Backend,
    path: &str,
    chunk: ChunkSize,
) -> Result<Option<Vec<u8>>> {
    let Some(mut stream) = backend.open(path, chunk)? else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(Some(buf))
}
