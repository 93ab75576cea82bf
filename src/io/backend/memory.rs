use super::{Backend, ObjectWriter};
use crate::config::{ChunkSize, StorageOptions, StorageScheme};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

type Store = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

static STORES: LazyLock<Mutex<HashMap<String, Store>>> = LazyLock::new(Mutex::default);

fn store(name: &str) -> Store {
    STORES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(name.to_string())
        .or_default()
        .clone()
}

fn key(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Process-wide in-memory storage, partitioned into named stores.
///
/// Every handle on the same store name sees the same objects, so handles built
/// on different worker threads cooperate like clients of one bucket.
/// Directories are implicit.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    store: Store,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("default")
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store: store(name),
        }
    }

    /// Recognised option: `store` (default `"default"`).
    #[must_use]
    pub fn from_options(options: &StorageOptions) -> Self {
        options
            .get("store")
            .map_or_else(Self::default, |name| Self::new(name))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop every object in this store.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Every stored path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

struct MemoryWriter {
    buf: Vec<u8>,
    key: String,
    store: Store,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let Self { buf, key, store } = *self;
        store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, buf);
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn scheme(&self) -> StorageScheme {
        StorageScheme::Memory
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let key = key(path);
        let dir = format!("{}/", key.trim_end_matches('/'));
        let store = self.read();
        Ok(store.contains_key(&key)
            || store
                .range(dir.clone()..)
                .next()
                .is_some_and(|(k, _)| k.starts_with(&dir)))
    }

    fn open(&self, path: &str, _chunk: ChunkSize) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .read()
            .get(&key(path))
            .map(|data| Box::new(Cursor::new(data.clone())) as Box<dyn Read + Send>))
    }

    fn create(&self, path: &str, chunk: ChunkSize) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            buf: Vec::with_capacity(chunk.bytes().min(64 * 1024)),
            key: key(path),
            store: Arc::clone(&self.store),
        }))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut store = self.write();
        let data = store.remove(&key(from)).ok_or_else(|| Error::not_found(from))?;
        store.insert(key(to), data);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let key = key(path);
        let dir = format!("{}/", key.trim_end_matches('/'));
        self.write().retain(|k, _| k != &key && !k.starts_with(&dir));
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = key(prefix);
        Ok(self
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn make_dirs(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}
