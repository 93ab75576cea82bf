//! Object-store client abstraction.
//!
//! Object-store backends never talk to a provider SDK directly. They hold an
//! [`ObjectIO`] client, which is:
//!
//! - **Synchronous** - async SDKs block on an internal runtime
//! - **Narrow** - put/get/delete/list/exists/copy, nothing else
//! - **Replaceable** - [`register_client`] swaps the client behind a scheme
//!
//! ## Testing with the Fake
//! ```
//! use stowage::io::cloud::*;
//!
//! # fn main() -> CloudResult<()> {
//! let storage = FakeObjectIO::new();
//! storage.put_object("bucket", "key", b"data")?;
//! assert!(storage.object_exists("bucket", "key")?);
//! assert_eq!(storage.call_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Clients report [`CloudIOError`], categorized by [`ErrorKind`]. The
//! object-store backend retries transient kinds (`Network`, `Timeout`,
//! `ServiceUnavailable`, `RateLimited`) through [`helpers::retry_with_backoff`]
//! and maps `NotFound` onto the crate's own not-found handling.

pub mod fake;
#[cfg(feature = "gcs")]
pub mod gcs;
pub mod helpers;
pub mod registry;
#[cfg(feature = "s3")]
pub mod s3;
pub mod traits;

pub use fake::FakeObjectIO;
#[cfg(feature = "gcs")]
pub use gcs::GcsObjectIO;
pub use registry::{client_for, register_client, unregister_client};
#[cfg(feature = "s3")]
pub use s3::S3ObjectIO;
pub use traits::*;
