//! Folding per-unit results into one manifest.
//!
//! Workers finish in any order, so every aggregator is order-independent:
//! lists are sorted, and batches are concatenated as they come.

use crate::error::Result;
use crate::path::CanonicalPath;
use std::path::PathBuf;

/// Combines the results of all transfer units of one call.
///
/// Empty input always yields an empty manifest, never an error.
pub trait Aggregate<T> {
    type Output;

    /// # Errors
    /// If the parts cannot be combined (e.g. mismatched table schemas).
    fn aggregate(&self, parts: Vec<T>) -> Result<Self::Output>;
}

/// Local files written by a download, sorted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileList;

impl Aggregate<PathBuf> for FileList {
    type Output = Vec<PathBuf>;

    fn aggregate(&self, mut parts: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        parts.sort();
        Ok(parts)
    }
}

/// Objects placed by an upload, sorted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathList;

impl Aggregate<CanonicalPath> for PathList {
    type Output = Vec<CanonicalPath>;

    fn aggregate(&self, mut parts: Vec<CanonicalPath>) -> Result<Vec<CanonicalPath>> {
        parts.sort();
        Ok(parts)
    }
}

#[cfg(feature = "io-parquet")]
pub use table::Concat;

#[cfg(feature = "io-parquet")]
mod table {
    use super::Aggregate;
    use crate::error::Result;
    use crate::io::parquet::concat_tables;
    use arrow::datatypes::SchemaRef;
    use arrow::record_batch::RecordBatch;

    /// Concatenates decoded files into one batch.
    ///
    /// The result takes the schema of the first file to arrive. No files
    /// gives an empty batch of the configured schema (or of an empty schema).
    /// Arrow batches carry no index, so rows are numbered densely `0..n` in
    /// the result.
    #[derive(Debug, Clone, Default)]
    pub struct Concat {
        schema: Option<SchemaRef>,
    }

    impl Concat {
        #[must_use]
        pub const fn new(schema: Option<SchemaRef>) -> Self {
            Self { schema }
        }
    }

    impl Aggregate<(SchemaRef, Vec<RecordBatch>)> for Concat {
        type Output = RecordBatch;

        fn aggregate(&self, parts: Vec<(SchemaRef, Vec<RecordBatch>)>) -> Result<RecordBatch> {
            let schema = parts
                .first()
                .map(|(s, _)| s.clone())
                .or_else(|| self.schema.clone());
            let batches: Vec<RecordBatch> = parts.into_iter().flat_map(|(_, b)| b).collect();
            concat_tables(schema, &batches)
        }
    }
}
