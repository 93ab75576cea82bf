//! Test doubles for code built on this crate.
//!
//! - [`CountingFactory`] wraps a [`BackendFactory`] and records every handle
//!   it builds, and on which thread.
//! - [`FailingBackend`] wraps any backend and injects one [`Fault`].
//!
//! Pair them with [`FakeObjectIO`](crate::io::cloud::FakeObjectIO) to assert
//! that a call made no remote requests at all.
//!
//! ```
//! use stowage::config::{StorageOptions, StorageScheme, WriterConfig};
//! use stowage::io::backend::BackendFactory;
//! use stowage::io::writer::Writer;
//! use stowage::testing::{CountingFactory, FailingBackend, Fault};
//!
//! let counting = CountingFactory::new(BackendFactory::new(StorageScheme::Memory, StorageOptions::new()));
//! let faulty = FailingBackend::factory(counting.factory(), Fault::Commit);
//! let writer = Writer::with_factory(WriterConfig::new(StorageScheme::Memory, "/docs/testing/x.txt"), faulty);
//! assert!(writer.write(b"data", &[] as &[&str]).is_err());
//! assert_eq!(counting.count(), 1);
//! ```

use crate::config::{ChunkSize, StorageScheme};
use crate::error::Result;
use crate::io::backend::{Backend, BackendFactory, ObjectWriter};
use crate::io::cloud::{CloudIOError, ErrorKind};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// Counts the backend handles built through it.
#[derive(Debug, Clone)]
pub struct CountingFactory {
    inner: BackendFactory,
    count: Arc<AtomicUsize>,
    threads: Arc<Mutex<Vec<ThreadId>>>,
}

impl CountingFactory {
    #[must_use]
    pub fn new(inner: BackendFactory) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicUsize::new(0)),
            threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A factory that builds through the wrapped one and counts.
    #[must_use]
    pub fn factory(&self) -> BackendFactory {
        let inner = self.inner.clone();
        let count = Arc::clone(&self.count);
        let threads = Arc::clone(&self.threads);
        BackendFactory::custom(self.inner.scheme(), move || {
            count.fetch_add(1, Ordering::SeqCst);
            threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(thread::current().id());
            inner.create()
        })
    }

    /// Handles built so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// The thread each handle was built on, in build order.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Where a [`FailingBackend`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Writes fail once this many bytes went into one object.
    Write { after_bytes: usize },
    /// Committing a written object fails.
    Commit,
    /// Every rename fails.
    Rename,
    /// Opening any path containing this text fails with a network error.
    Open(String),
}

/// Delegates to an inner backend, except at its [`Fault`].
pub struct FailingBackend {
    inner: Box<dyn Backend>,
    fault: Fault,
}

impl FailingBackend {
    #[must_use]
    pub fn new(inner: Box<dyn Backend>, fault: Fault) -> Self {
        Self { inner, fault }
    }

    /// Wrap every handle `inner` builds.
    #[must_use]
    pub fn factory(inner: BackendFactory, fault: Fault) -> BackendFactory {
        BackendFactory::custom(inner.scheme(), move || {
            Ok(Box::new(Self::new(inner.create()?, fault.clone())) as Box<dyn Backend>)
        })
    }
}

fn injected(what: &str) -> CloudIOError {
    CloudIOError::new(ErrorKind::Network, format!("injected {what} failure"))
}

struct FailingWriter {
    inner: Box<dyn ObjectWriter>,
    budget: Option<usize>,
    fail_commit: bool,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(budget) = self.budget.as_mut() {
            if buf.len() > *budget {
                return Err(io::Error::other("injected write failure"));
            }
            *budget -= buf.len();
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ObjectWriter for FailingWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            return Err(injected("commit").into());
        }
        self.inner.commit()
    }
}

impl Backend for FailingBackend {
    fn scheme(&self) -> StorageScheme {
        self.inner.scheme()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path)
    }

    fn open(&self, path: &str, chunk: ChunkSize) -> Result<Option<Box<dyn Read + Send>>> {
        if let Fault::Open(needle) = &self.fault {
            if path.contains(needle.as_str()) {
                return Err(injected("open").into());
            }
        }
        self.inner.open(path, chunk)
    }

    fn create(&self, path: &str, chunk: ChunkSize) -> Result<Box<dyn ObjectWriter>> {
        let inner = self.inner.create(path, chunk)?;
        Ok(Box::new(FailingWriter {
            inner,
            budget: match self.fault {
                Fault::Write { after_bytes } => Some(after_bytes),
                _ => None,
            },
            fail_commit: self.fault == Fault::Commit,
        }))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        if self.fault == Fault::Rename {
            return Err(injected("rename").into());
        }
        self.inner.rename(from, to)
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.inner.remove(path)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn make_dirs(&self, path: &str) -> Result<()> {
        self.inner.make_dirs(path)
    }
}
