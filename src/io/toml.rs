//! TOML documents on any backend.

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::io::reader::Reader;
use crate::io::writer::{WriteOutcome, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Write};

/// Serialize values to TOML files.
///
/// TOML has no null. With [`with_prune`](Self::with_prune) set, null values
/// are dropped recursively before encoding instead of failing the write.
#[derive(Debug, Clone)]
pub struct TomlWriter {
    writer: Writer,
    prune: bool,
}

impl TomlWriter {
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self::from_writer(Writer::new(config))
    }

    #[must_use]
    pub const fn from_writer(writer: Writer) -> Self {
        Self {
            writer,
            prune: false,
        }
    }

    #[must_use]
    pub const fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// # Errors
    /// Serialization errors and everything [`Writer::write_with`] returns.
    pub fn write<T, S>(&self, value: &T, parts: &[S]) -> Result<WriteOutcome>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let text = if self.prune {
            let mut tree = serde_json::to_value(value)?;
            prune_nulls(&mut tree);
            toml::to_string(&tree)?
        } else {
            toml::to_string(value)?
        };
        self.writer
            .write_with(parts, |out| Ok(out.write_all(text.as_bytes())?))
    }
}

fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(prune_nulls);
        }
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(prune_nulls);
        }
        _ => {}
    }
}

/// Deserialize TOML files.
#[derive(Debug, Clone)]
pub struct TomlReader {
    reader: Reader,
}

impl TomlReader {
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
    /// Parse errors (including invalid UTF-8) and everything
    /// [`Reader::read_with`] returns.
    pub fn read<T: DeserializeOwned + Default>(&self, suffix: &str) -> Result<T> {
        Ok(self
            .reader
            .read_with(suffix, |r| {
                let mut text = String::new();
                r.read_to_string(&mut text)?;
                Ok(toml::from_str(&text)?)
            })?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prune_drops_nested_nulls() {
        let mut v = json!({"a": 1, "b": null, "c": {"d": null, "e": [1, null, {"f": null}]}});
        prune_nulls(&mut v);
        assert_eq!(v, json!({"a": 1, "c": {"e": [1, {}]}}));
    }
}
