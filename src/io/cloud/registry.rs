//! Process-wide registry of object-store clients, keyed by scheme.
//!
//! Backends for `s3` and `gcs` look their client up here. A registered client
//! always wins; otherwise the `s3` and `gcs` features build a provider client
//! from the storage options.
//!
//! Clients are [`Sync`] and shared, never cloned per worker: every backend
//! handle a [`BackendFactory`](crate::io::backend::BackendFactory) creates,
//! one per transfer worker included, holds the same `Arc`. Backend handles
//! themselves stay private to the thread that built them.

use crate::config::{StorageOptions, StorageScheme};
use crate::error::{Error, Result};
use crate::io::cloud::traits::ObjectIO;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

static CLIENTS: RwLock<Option<HashMap<StorageScheme, Arc<dyn ObjectIO>>>> = RwLock::new(None);

/// Register `client` for `scheme`, returning the client it replaced.
pub fn register_client(
    scheme: StorageScheme,
    client: Arc<dyn ObjectIO>,
) -> Option<Arc<dyn ObjectIO>> {
    let mut lock = CLIENTS.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(HashMap::new).insert(scheme, client)
}

/// Remove the client registered for `scheme`.
pub fn unregister_client(scheme: StorageScheme) -> Option<Arc<dyn ObjectIO>> {
    let mut lock = CLIENTS.write().unwrap_or_else(PoisonError::into_inner);
    lock.as_mut().and_then(|clients| clients.remove(&scheme))
}

fn registered(scheme: StorageScheme) -> Option<Arc<dyn ObjectIO>> {
    let lock = CLIENTS.read().unwrap_or_else(PoisonError::into_inner);
    lock.as_ref().and_then(|clients| clients.get(&scheme).cloned())
}

/// Client for `scheme`.
///
/// # Errors
/// [`Error::InvalidConfig`] if `scheme` is not an object store or no client is
/// available for it, or the client's own construction error.
pub fn client_for(scheme: StorageScheme, options: &StorageOptions) -> Result<Arc<dyn ObjectIO>> {
    if !scheme.is_object_store() {
        return Err(Error::InvalidConfig(format!(
            "\"{scheme}\" is not an object-store scheme"
        )));
    }
    if let Some(client) = registered(scheme) {
        return Ok(client);
    }
    default_client(scheme, options)
}

#[allow(unused_variables)]
fn default_client(scheme: StorageScheme, options: &StorageOptions) -> Result<Arc<dyn ObjectIO>> {
    match scheme {
        #[cfg(feature = "s3")]
        StorageScheme::S3 => Ok(Arc::new(crate::io::cloud::s3::S3ObjectIO::from_options(
            options,
        )?)),
        #[cfg(feature = "gcs")]
        StorageScheme::Gcs => Ok(Arc::new(crate::io::cloud::gcs::GcsObjectIO::from_options(
            options,
        )?)),
        _ => Err(missing(scheme)),
    }
}

fn missing(scheme: StorageScheme) -> Error {
    Error::InvalidConfig(format!(
        "no object-store client registered for \"{scheme}\""
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cloud::FakeObjectIO;

    #[test]
    fn test_local_schemes_have_no_client() {
        let options = StorageOptions::new();
        assert!(matches!(
            client_for(StorageScheme::File, &options),
            Err(Error::InvalidConfig(_))
        ));
        assert!(client_for(StorageScheme::Memory, &options).is_err());
    }

    #[test]
    fn test_register_and_unregister() {
        let fake = Arc::new(FakeObjectIO::new());
        register_client(StorageScheme::Gcs, fake);
        assert!(client_for(StorageScheme::Gcs, &StorageOptions::new()).is_ok());
        assert!(unregister_client(StorageScheme::Gcs).is_some());
        assert_eq!(
            client_for(StorageScheme::Gcs, &StorageOptions::new()).is_ok(),
            cfg!(feature = "gcs")
        );
    }
}
