//! The object-store client seam.
//!
//! [`ObjectIO`] is the whole surface an object-store backend needs from a
//! provider SDK. Implementations are synchronous; clients built on async SDKs
//! block on an internal runtime.

use std::fmt;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error reported by an [`ObjectIO`] client.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CloudIOError {
    pub message: String,
    pub kind: ErrorKind,
    /// Provider-specific detail (SDK error text, HTTP status, ...).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    AlreadyExists,
    InvalidInput,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    InternalError,
    Other,
}

impl ErrorKind {
    /// Transient kinds worth another attempt.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServiceUnavailable | Self::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl CloudIOError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            detail: None,
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("object {bucket}/{key} not found"))
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

pub type CloudResult<T> = Result<T, CloudIOError>;

// ============================================================================
// ObjectIO - Object Storage
// ============================================================================

/// Metadata for an object in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Trait for object storage operations.
pub trait ObjectIO: Send + Sync {
    /// Upload data to object storage, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()>;

    /// Download data from object storage.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::NotFound`] if the object doesn't exist,
    /// or another kind if permissions are not enough or the download fails
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>>;

    /// Delete an object. Deleting a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if permissions are not enough or the deletion fails
    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()>;

    /// List objects whose key starts with `prefix`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the listing fails
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>>;

    /// Check if an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if permissions are not enough or the check fails
    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool>;

    /// Copy an object within or between buckets.
    ///
    /// # Errors
    ///
    /// Returns an error if the source doesn't exist, permissions are not enough, or the copy fails
    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> CloudResult<()>;
}
