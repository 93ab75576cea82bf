//! [`ObjectIO`] for Google Cloud Storage over `object_store` (feature `gcs`).
//!
//! `object_store` binds one store to one bucket, so stores are built lazily
//! per bucket and cached. Like the S3 client, calls block on a private
//! current-thread runtime and the client is shared across threads.

use crate::config::StorageOptions;
use crate::error::Result;
use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use futures::TryStreamExt;
use object_store::gcp::{GoogleCloudStorageBuilder, GoogleConfigKey};
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

pub struct GcsObjectIO {
    options: StorageOptions,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    runtime: Runtime,
}

impl std::fmt::Debug for GcsObjectIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsObjectIO").finish_non_exhaustive()
    }
}

impl GcsObjectIO {
    /// Build a client from storage options.
    ///
    /// Credentials come from the environment (`GOOGLE_*` variables or
    /// application default credentials). Options named like
    /// `object_store`'s Google config keys (`service_account`,
    /// `service_account_key`, `application_credentials`, ...) override them;
    /// other options are ignored.
    ///
    /// # Errors
    /// [`Error::Io`](crate::Error::Io) if the runtime cannot be started.
    pub fn from_options(options: &StorageOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            options: options.clone(),
            stores: Mutex::new(HashMap::new()),
            runtime,
        })
    }

    fn store(&self, bucket: &str) -> CloudResult<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let mut builder = GoogleCloudStorageBuilder::from_env();
        for (key, value) in &self.options {
            if let Ok(config) = key.parse::<GoogleConfigKey>() {
                builder = builder.with_config(config, value);
            }
        }
        let store: Arc<dyn ObjectStore> = Arc::new(
            builder
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| store_error("build", &e))?,
        );
        debug!(bucket, "built gcs store");
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

fn store_error(op: &str, err: &object_store::Error) -> CloudIOError {
    use object_store::Error as StoreError;

    let kind = match err {
        StoreError::NotFound { .. } => ErrorKind::NotFound,
        StoreError::AlreadyExists { .. } | StoreError::Precondition { .. } => ErrorKind::AlreadyExists,
        StoreError::PermissionDenied { .. } => ErrorKind::Authorization,
        StoreError::Unauthenticated { .. } => ErrorKind::Authentication,
        StoreError::InvalidPath { .. }
        | StoreError::NotSupported { .. }
        | StoreError::UnknownConfigurationKey { .. } => ErrorKind::InvalidInput,
        StoreError::Generic { .. } => ErrorKind::Network,
        _ => ErrorKind::Other,
    };
    CloudIOError::new(kind, format!("gcs {op} failed")).with_detail(err.to_string())
}

/// `object_store` lists whole directories; list the one holding `prefix`
/// and filter by the string prefix afterwards.
fn listing_dir(prefix: &str) -> Option<Path> {
    match prefix.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => Some(Path::from(dir)),
        _ => None,
    }
}

fn metadata(meta: ObjectMeta) -> ObjectMetadata {
    ObjectMetadata {
        key: meta.location.to_string(),
        size: u64::try_from(meta.size).unwrap_or(u64::MAX),
        etag: meta.e_tag,
    }
}

impl ObjectIO for GcsObjectIO {
    #[instrument(skip(self, data), fields(backend = "gcs", size = data.len()))]
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        let store = self.store(bucket)?;
        self.block_on(store.put(&Path::from(key), PutPayload::from(data.to_vec())))
            .map_err(|e| store_error("put_object", &e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "gcs"))]
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let store = self.store(bucket)?;
        let location = Path::from(key);
        match self.block_on(async { store.get(&location).await?.bytes().await }) {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(object_store::Error::NotFound { .. }) => Err(CloudIOError::not_found(bucket, key)),
            Err(e) => Err(store_error("get_object", &e)),
        }
    }

    #[instrument(skip(self), fields(backend = "gcs"))]
    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        let store = self.store(bucket)?;
        match self.block_on(store.delete(&Path::from(key))) {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(store_error("delete_object", &e)),
        }
    }

    #[instrument(skip(self), fields(backend = "gcs"))]
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        let store = self.store(bucket)?;
        let prefix = prefix.unwrap_or_default();
        let dir = listing_dir(prefix);
        let listed: Vec<ObjectMeta> = self
            .block_on(store.list(dir.as_ref()).try_collect())
            .map_err(|e| store_error("list_objects", &e))?;

        let mut results: Vec<ObjectMetadata> = listed
            .into_iter()
            .filter(|meta| meta.location.as_ref().starts_with(prefix))
            .map(metadata)
            .collect();
        debug!(count = results.len(), "listed gcs objects");
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "gcs"))]
    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        let store = self.store(bucket)?;
        match self.block_on(store.head(&Path::from(key))) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(store_error("head_object", &e)),
        }
    }

    #[instrument(skip(self), fields(backend = "gcs"))]
    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> CloudResult<()> {
        if src_bucket != dst_bucket {
            let data = self.get_object(src_bucket, src_key)?;
            return self.put_object(dst_bucket, dst_key, &data);
        }
        let store = self.store(src_bucket)?;
        match self.block_on(store.copy(&Path::from(src_key), &Path::from(dst_key))) {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Err(CloudIOError::not_found(src_bucket, src_key)),
            Err(e) => Err(store_error("copy_object", &e)),
        }
    }
}
