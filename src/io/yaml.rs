//! YAML documents on any backend.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stowage::config::{ReaderConfig, StorageScheme, WriterConfig};
//! use stowage::io::yaml::{YamlReader, YamlWriter};
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Job { name: String, steps: Vec<String> }
//!
//! # fn main() -> stowage::Result<()> {
//! let job = Job { name: "nightly".into(), steps: vec!["fetch".into(), "load".into()] };
//! YamlWriter::new(WriterConfig::new(StorageScheme::Memory, "/docs/yaml/{}.yml")).write(&job, &["nightly"])?;
//!
//! let back: Job = YamlReader::new(ReaderConfig::new(StorageScheme::Memory, "/docs/yaml")).read("nightly.yml")?;
//! assert_eq!(back, job);
//! # Ok(())
//! # }
//! ```

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::io::reader::Reader;
use crate::io::writer::{WriteOutcome, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize values to YAML files.
#[derive(Debug, Clone)]
pub struct YamlWriter {
    writer: Writer,
}

impl YamlWriter {
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self::from_writer(Writer::new(config))
    }

    #[must_use]
    pub const fn from_writer(writer: Writer) -> Self {
        Self { writer }
    }

    /// # Errors
    /// Serialization errors and everything [`Writer::write_with`] returns.
    pub fn write<T, S>(&self, value: &T, parts: &[S]) -> Result<WriteOutcome>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        self.writer.write_with(parts, |out| {
            serde_yaml::to_writer(out, value)?;
            Ok(())
        })
    }
}

/// Deserialize YAML files.
#[derive(Debug, Clone)]
pub struct YamlReader {
    reader: Reader,
}

impl YamlReader {
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
            .read_with(suffix, |r| Ok(serde_yaml::from_reader(r)?))?
            .unwrap_or_default())
    }
}
