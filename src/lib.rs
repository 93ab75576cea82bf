//! # Stowage
//!
//! Uniform, **atomic** file I/O over interchangeable storage backends, plus a
//! bounded-concurrency engine for moving whole directories of objects.
//!
//! ## Key Features
//!
//! - **One interface, many backends** - local disk, S3, GCS and an in-memory
//!   store, selected by a [`StorageScheme`](config::StorageScheme) value
//! - **Atomic writes** - content lands in a temporary sibling and is renamed
//!   into place only after it was fully written; failures leave no trace
//! - **Idempotency policies** - `skip` / `overwrite` on writes, `not_found` on reads
//! - **Path templates** - `{}` / `{N}` placeholders, canonicalized, root-safe
//! - **Bulk transfers** - parallel downloads, uploads and Parquet table loads
//!   restricted to the direct children of a directory
//! - **Typed serializers** - JSON, TOML, YAML and Parquet (all optional via feature flags)
//! - **Pluggable compression** - gzip, zstd, bzip2 and xz, inferred from the extension
//!
//! ## Quick Start
//!
//! ```
//! use stowage::config::{ReaderConfig, StorageScheme, WriterConfig};
//! use stowage::io::reader::Reader;
//! use stowage::io::writer::Writer;
//!
//! # fn main() -> stowage::Result<()> {
//! let writer = Writer::new(WriterConfig::new(StorageScheme::Memory, "/quickstart/{}/{}.txt.gz"));
//! writer.write(b"hello", &["2024", "greeting"])?;
//!
//! let reader = Reader::new(ReaderConfig::new(StorageScheme::Memory, "/quickstart/2024"));
//! assert_eq!(reader.read_bytes("greeting.txt.gz")?, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Model
//!
//! Everything is synchronous. [`Reader`](io::reader::Reader) and
//! [`Writer`](io::writer::Writer) build a fresh backend handle per call and
//! keep no state between calls. The transfer [`Engine`](transfer::Engine)
//! owns a `rayon` thread pool and one backend handle per worker thread.
//!
//! There is no locking across processes. Two writers racing on the same
//! target both succeed and the last rename wins.
//!
//! ## Module Overview
//!
//! - [`config`] - Schemes, chunk sizes, policies and component configuration
//! - [`path`] - Path templating and canonicalization
//! - [`io`] - Backends, codecs, readers, writers, serializers and `Find`
//! - [`transfer`] - The bulk transfer engine and its aggregators
//! - [`testing`] - Counting factories and fault-injecting backends
//! - [`error`] - The crate error type

pub mod config;
pub mod error;
pub mod io;
pub mod path;
pub mod testing;
pub mod transfer;

pub use error::{Error, Result};
