use super::aggregate::Concat;
use super::Engine;
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::io::backend::{read_all, BackendFactory};
use crate::io::parquet::decode_parquet;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info, instrument};

/// Loads the direct children of `root/prefix` as Parquet and concatenates
/// them into one Arrow batch.
///
/// Files are decoded in parallel and concatenated in whatever order they
/// finish; no files yields an empty batch.
#[derive(Debug)]
pub struct TableLoader {
    engine: Engine,
    schema: Option<SchemaRef>,
}

impl TableLoader {
    /// # Errors
    /// As for [`Engine::new`].
    pub fn new(config: TransferConfig) -> Result<Self> {
        Ok(Self {
            engine: Engine::new(config)?,
            schema: None,
        })
    }

    /// # Errors
    /// As for [`Engine::with_factory`].
    pub fn with_factory(config: TransferConfig, factory: BackendFactory) -> Result<Self> {
        Ok(Self {
            engine: Engine::with_factory(config, factory)?,
            schema: None,
        })
    }

    /// Schema of the result when no file is found.
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// # Errors
    /// Listing, read, or decode failures of any unit, or schema mismatches
    /// between files.
    #[instrument(level = "debug", skip(self), fields(root = %self.engine.root()))]
    pub fn load(&self, prefix: &str) -> Result<RecordBatch> {
        let effective = self.engine.effective_prefix(prefix);
        let units = self.engine.list_units(&effective)?;
        let chunk = self.engine.config().chunk_size;

        let table = self.engine.run(
            &units,
            |backend, unit| {
                let data = read_all(backend, &unit.path, chunk)?
                    .ok_or_else(|| Error::not_found(unit.path.as_str()))?;
                let decoded = decode_parquet(data)?;
                debug!(key = %unit.key, batches = decoded.1.len(), "decoded");
                Ok(decoded)
            },
            &Concat::new(self.schema.clone()),
        )?;
        info!(files = units.len(), rows = table.num_rows(), "table loaded");
        Ok(table)
    }
}
