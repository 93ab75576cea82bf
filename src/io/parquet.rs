//! Parquet tables on any backend.
//!
//! Tables move as Arrow [`RecordBatch`]es. Typed rows go through
//! `serde_arrow`: the schema is traced from `T` (so empty inputs still get
//! one) and rows convert with `to_record_batch` / `from_record_batch`.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stowage::config::{ReaderConfig, StorageScheme, WriterConfig};
//! use stowage::io::parquet::{ParquetReader, ParquetWriter};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Row { id: u64, name: String }
//!
//! # fn main() -> stowage::Result<()> {
//! let rows = vec![Row { id: 1, name: "a".into() }, Row { id: 2, name: "b".into() }];
//! ParquetWriter::new(WriterConfig::new(StorageScheme::Memory, "/docs/pq/{}.parquet"))
//!     .write_rows(&rows, &["part-0"])?;
//!
//! let reader = ParquetReader::new(ReaderConfig::new(StorageScheme::Memory, "/docs/pq"));
//! let back: Vec<Row> = reader.read_rows("part-0.parquet")?;
//! assert_eq!(back, rows);
//! # Ok(())
//! # }
//! ```

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::io::reader::Reader;
use crate::io::writer::{WriteOutcome, Writer};
use arrow::compute::concat_batches;
use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_arrow::schema::{SchemaLike, TracingOptions};
use serde_arrow::{from_record_batch, to_record_batch};
use std::io::Read;
use std::sync::Arc;

const READ_BATCH_ROWS: usize = 64 * 1024;

/// Write Arrow batches or serde rows as one Parquet file per call.
#[derive(Debug, Clone)]
pub struct ParquetWriter {
    writer: Writer,
}

impl ParquetWriter {
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self::from_writer(Writer::new(config))
    }

    #[must_use]
    pub const fn from_writer(writer: Writer) -> Self {
        Self { writer }
    }

    /// # Errors
    /// As for [`write_batches`](Self::write_batches).
    pub fn write_batch<S: AsRef<str>>(&self, batch: &RecordBatch, parts: &[S]) -> Result<WriteOutcome> {
        self.write_batches(&batch.schema(), std::slice::from_ref(batch), parts)
    }

    /// Write `batches` (all of `schema`) as consecutive row groups.
    ///
    /// # Errors
    /// Schema mismatches, Parquet encoding errors, and everything
    /// [`Writer::write_with`] returns.
    pub fn write_batches<S: AsRef<str>>(
        &self,
        schema: &SchemaRef,
        batches: &[RecordBatch],
        parts: &[S],
    ) -> Result<WriteOutcome> {
        self.writer.write_with(parts, |out| {
            let props = WriterProperties::builder().build();
            let mut writer = ArrowWriter::try_new(out, Arc::clone(schema), Some(props))?;
            for batch in batches {
                writer.write(batch)?;
            }
            writer.close()?;
            Ok(())
        })
    }

    /// Serialize `rows` through a schema traced from `T`.
    ///
    /// # Errors
    /// If `T` cannot be mapped to Arrow, plus everything
    /// [`write_batches`](Self::write_batches) returns.
    pub fn write_rows<T, S>(&self, rows: &[T], parts: &[S]) -> Result<WriteOutcome>
    where
        T: Serialize + DeserializeOwned,
        S: AsRef<str>,
    {
        let batch = rows_to_batch(rows)?;
        self.write_batch(&batch, parts)
    }
}

/// Read Parquet files as Arrow batches or serde rows.
#[derive(Debug, Clone)]
pub struct ParquetReader {
    reader: Reader,
}

impl ParquetReader {
    #[must_use]
    pub fn new(config: ReaderConfig) -> Self {
        Self::from_reader(Reader::new(config))
    }

    #[must_use]
    pub const fn from_reader(reader: Reader) -> Self {
        Self { reader }
    }

    /// Every batch in the file; empty if a missing file was downgraded.
    ///
    /// # Errors
    /// Parquet decoding errors and everything [`Reader::read_with`] returns.
    pub fn read_batches(&self, suffix: &str) -> Result<Vec<RecordBatch>> {
        Ok(self
            .read_decoded(suffix)?
            .map(|(_, batches)| batches)
            .unwrap_or_default())
    }

    /// The whole file as one batch. A missing file downgraded by the
    /// not-found policy reads as an empty batch with an empty schema.
    ///
    /// # Errors
    /// As for [`read_batches`](Self::read_batches).
    pub fn read_table(&self, suffix: &str) -> Result<RecordBatch> {
        match self.read_decoded(suffix)? {
            Some((schema, batches)) => concat_tables(Some(schema), &batches),
            None => concat_tables(None, &[]),
        }
    }

    /// Deserialize every row into `T`.
    ///
    /// # Errors
    /// If the columns do not match `T`, plus everything
    /// [`read_batches`](Self::read_batches) returns.
    pub fn read_rows<T: DeserializeOwned>(&self, suffix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for batch in self.read_batches(suffix)? {
            let mut rows: Vec<T> = from_record_batch(&batch)?;
            out.append(&mut rows);
        }
        Ok(out)
    }

    fn read_decoded(&self, suffix: &str) -> Result<Option<(SchemaRef, Vec<RecordBatch>)>> {
        self.reader.read_with(suffix, |r| {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf)?;
            decode_parquet(buf)
        })
    }
}

/// Decode an in-memory Parquet file.
pub(crate) fn decode_parquet(data: Vec<u8>) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?;
    let schema = Arc::clone(builder.schema());
    let batches = builder
        .with_batch_size(READ_BATCH_ROWS)
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Concatenate `batches` into one. With no batches the result is empty and
/// carries `schema`, or an empty schema when none is known.
pub(crate) fn concat_tables(schema: Option<SchemaRef>, batches: &[RecordBatch]) -> Result<RecordBatch> {
    let schema = schema
        .or_else(|| batches.first().map(RecordBatch::schema))
        .unwrap_or_else(|| Arc::new(Schema::empty()));
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(concat_batches(&schema, batches)?)
}

/// Convert serde rows into one batch with a schema traced from `T`.
pub(crate) fn rows_to_batch<T: Serialize + DeserializeOwned>(rows: &[T]) -> Result<RecordBatch> {
    let fields = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())?;
    Ok(to_record_batch(&fields, &rows)?)
}
