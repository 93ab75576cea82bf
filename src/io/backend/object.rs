use super::{Backend, ObjectWriter};
use crate::config::{ChunkSize, StorageScheme};
use crate::error::{Error, Result};
use crate::io::cloud::helpers::{retry_with_backoff, split_bucket_key, RetryConfig};
use crate::io::cloud::{CloudResult, ObjectIO};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use tracing::{debug, instrument};

/// S3 / GCS style storage through an [`ObjectIO`] client.
///
/// The first path segment is the bucket. Directories are implicit, rename is
/// copy-then-delete, and whole objects move through memory: clients expose
/// no ranged reads or multipart uploads, so the chunk size is unused here.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    scheme: StorageScheme,
    client: Arc<dyn ObjectIO>,
    retry: RetryConfig,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("scheme", &self.scheme)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreBackend {
    pub fn new(scheme: StorageScheme, client: Arc<dyn ObjectIO>) -> Self {
        Self {
            scheme,
            client,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn retrying<T>(&self, op: &str, f: impl FnMut() -> CloudResult<T>) -> Result<T> {
        Ok(retry_with_backoff(&self.retry, op, f)?)
    }

    fn canonical(bucket: &str, key: &str) -> String {
        format!("/{bucket}/{key}")
    }
}

struct ObjectBuffer {
    buf: Vec<u8>,
    bucket: String,
    key: String,
    client: Arc<dyn ObjectIO>,
    retry: RetryConfig,
}

impl Write for ObjectBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for ObjectBuffer {
    fn commit(self: Box<Self>) -> Result<()> {
        debug!(bucket = %self.bucket, key = %self.key, size = self.buf.len(), "uploading object");
        Ok(retry_with_backoff(&self.retry, "put_object", || {
            self.client.put_object(&self.bucket, &self.key, &self.buf)
        })?)
    }
}

impl Backend for ObjectStoreBackend {
    fn scheme(&self) -> StorageScheme {
        self.scheme
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let (bucket, key) = split_bucket_key(path)?;
        if !key.is_empty()
            && self.retrying("object_exists", || self.client.object_exists(bucket, key))?
        {
            return Ok(true);
        }
        let dir = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key.trim_end_matches('/'))
        };
        match self.retrying("list_objects", || self.client.list_objects(bucket, Some(&dir))) {
            Ok(objects) => Ok(!objects.is_empty()),
            Err(Error::Cloud(e)) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(level = "debug", skip(self, _chunk), fields(backend = %self.scheme))]
    fn open(&self, path: &str, _chunk: ChunkSize) -> Result<Option<Box<dyn Read + Send>>> {
        let (bucket, key) = split_bucket_key(path)?;
        match self.retrying("get_object", || self.client.get_object(bucket, key)) {
            Ok(data) => Ok(Some(Box::new(Cursor::new(data)))),
            Err(Error::Cloud(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&self, path: &str, _chunk: ChunkSize) -> Result<Box<dyn ObjectWriter>> {
        let (bucket, key) = split_bucket_key(path)?;
        if key.is_empty() {
            return Err(Error::invalid_path(path, "object key is empty"));
        }
        Ok(Box::new(ObjectBuffer {
            buf: Vec::new(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            client: Arc::clone(&self.client),
            retry: self.retry,
        }))
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.scheme))]
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (src_bucket, src_key) = split_bucket_key(from)?;
        let (dst_bucket, dst_key) = split_bucket_key(to)?;
        self.retrying("copy_object", || {
            self.client.copy_object(src_bucket, src_key, dst_bucket, dst_key)
        })
        .map_err(|e| match e {
            Error::Cloud(c) if c.is_not_found() => Error::not_found(from),
            other => other,
        })?;
        self.retrying("delete_object", || self.client.delete_object(src_bucket, src_key))
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.scheme))]
    fn remove(&self, path: &str) -> Result<()> {
        let (bucket, key) = split_bucket_key(path)?;
        if !key.is_empty() {
            self.retrying("delete_object", || self.client.delete_object(bucket, key))?;
        }
        for object in self.list(&format!("{}/", path.trim_end_matches('/')))? {
            let (_, child) = split_bucket_key(&object)?;
            if child != key {
                self.retrying("delete_object", || self.client.delete_object(bucket, child))?;
            }
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let (bucket, key) = split_bucket_key(prefix)?;
        let listed = self.retrying("list_objects", || self.client.list_objects(bucket, Some(key)));
        let objects = match listed {
            Ok(objects) => objects,
            Err(Error::Cloud(e)) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut out: Vec<String> = objects
            .into_iter()
            .map(|m| Self::canonical(bucket, &m.key))
            .collect();
        out.sort();
        Ok(out)
    }

    fn make_dirs(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}
