//! In-memory [`ObjectIO`] for tests.
//!
//! Every trait call bumps a counter so tests can assert that an operation
//! short-circuited before touching the store.

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type BucketStorage = Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>;

#[derive(Clone, Default)]
pub struct FakeObjectIO {
    storage: BucketStorage,
    calls: Arc<AtomicUsize>,
    injected: Arc<Mutex<VecDeque<ErrorKind>>>,
}

impl FakeObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`ObjectIO`] calls made so far, across all clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Make the next call fail with `kind`. Queued failures are consumed in order.
    pub fn fail_next(&self, kind: ErrorKind) {
        self.injected
            .lock()
            .expect("injected mutex poisoned")
            .push_back(kind);
    }

    /// Create an empty bucket so listings on it succeed.
    pub fn create_bucket(&self, bucket: &str) {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default();
    }

    /// Every key currently stored in `bucket`, sorted.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn enter(&self, op: &str) -> CloudResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .injected
            .lock()
            .expect("injected mutex poisoned")
            .pop_front();
        match injected {
            Some(kind) => Err(CloudIOError::new(kind, format!("injected failure in {op}"))),
            None => Ok(()),
        }
    }
}

impl ObjectIO for FakeObjectIO {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        self.enter("put_object")?;
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        self.enter("get_object")?;
        let storage = self.storage.lock().expect("storage mutex poisoned");
        storage
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| CloudIOError::not_found(bucket, key))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        self.enter("delete_object")?;
        if let Some(bucket_map) = self
            .storage
            .lock()
            .expect("storage mutex poisoned")
            .get_mut(bucket)
        {
            bucket_map.remove(key);
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        self.enter("list_objects")?;
        let storage = self.storage.lock().expect("storage mutex poisoned");
        let bucket_map = storage.get(bucket).ok_or_else(|| {
            CloudIOError::new(ErrorKind::NotFound, format!("bucket {bucket} not found"))
        })?;

        Ok(bucket_map
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, data)| ObjectMetadata {
                key: key.clone(),
                size: data.len() as u64,
                etag: Some(format!("etag-{key}")),
            })
            .collect())
    }

    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        self.enter("object_exists")?;
        let storage = self.storage.lock().expect("storage mutex poisoned");
        Ok(storage.get(bucket).is_some_and(|b| b.contains_key(key)))
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> CloudResult<()> {
        self.enter("copy_object")?;
        let mut storage = self.storage.lock().expect("storage mutex poisoned");
        let data = storage
            .get(src_bucket)
            .and_then(|b| b.get(src_key))
            .cloned()
            .ok_or_else(|| CloudIOError::not_found(src_bucket, src_key))?;
        storage
            .entry(dst_bucket.to_string())
            .or_default()
            .insert(dst_key.to_string(), data);
        Ok(())
    }
}
