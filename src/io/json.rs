//! JSON documents on any backend.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stowage::config::{ReaderConfig, StorageScheme, WriterConfig};
//! use stowage::io::json::{JsonReader, JsonWriter};
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Run { id: u32, tags: Vec<String> }
//!
//! # fn main() -> stowage::Result<()> {
//! let writer = JsonWriter::new(WriterConfig::new(StorageScheme::Memory, "/docs/json/{}.json.gz"));
//! writer.write(&Run { id: 7, tags: vec!["a".into()] }, &["run-7"])?;
//!
//! let reader = JsonReader::new(ReaderConfig::new(StorageScheme::Memory, "/docs/json"));
//! let run: Run = reader.read("run-7.json.gz")?;
//! assert_eq!(run.id, 7);
//! # Ok(())
//! # }
//! ```

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::io::compression::Compression;
use crate::io::reader::Reader;
use crate::io::writer::{WriteOutcome, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize values to JSON files.
///
/// Gzip is inferred from a `.gz` extension unless forced on or off with
/// [`with_gzip`](Self::with_gzip).
#[derive(Debug, Clone)]
pub struct JsonWriter {
    writer: Writer,
    pretty: bool,
}

impl JsonWriter {
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self::from_writer(Writer::new(config))
    }

    #[must_use]
    pub const fn from_writer(writer: Writer) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    /// `Some(true)` always compresses, `Some(false)` never does, `None` infers.
    #[must_use]
    pub fn with_gzip(mut self, gzip: Option<bool>) -> Self {
        let compression = gzip.map(|on| if on { Compression::Gzip } else { Compression::Plain });
        self.writer = self.writer.with_compression(compression);
        self
    }

    #[must_use]
    pub const fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// # Errors
    /// Serialization errors and everything [`Writer::write_with`] returns.
    pub fn write<T, S>(&self, value: &T, parts: &[S]) -> Result<WriteOutcome>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        self.writer.write_with(parts, |out| {
            if self.pretty {
                serde_json::to_writer_pretty(out, value)?;
            } else {
                serde_json::to_writer(out, value)?;
            }
            Ok(())
        })
    }
}

/// Deserialize JSON files.
#[derive(Debug, Clone)]
pub struct JsonReader {
    reader: Reader,
}

impl JsonReader {
    #[must_use]
    pub fn new(config: ReaderConfig) -> Self {
        Self::from_reader(Reader::new(config))
    }

    #[must_use]
    pub const fn from_reader(reader: Reader) -> Self {
        Self { reader }
    }

    /// Read and parse; a missing file downgraded by the not-found policy
    /// yields `T::default()`.
    ///
    /// # Errors
    /// Parse errors and everything [`Reader::read_with`] returns.
    pub fn read<T: DeserializeOwned + Default>(&self, suffix: &str) -> Result<T> {
        Ok(self
            .reader
            .read_with(suffix, |r| Ok(serde_json::from_reader(r)?))?
            .unwrap_or_default())
    }
}
