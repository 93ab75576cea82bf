#![cfg(feature = "io-parquet")]

use anyhow::Result;
use arrow::array::{Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stowage::config::{StorageOptions, StorageScheme, TransferConfig, WriterConfig};
use stowage::io::backend::{BackendFactory, MemoryBackend};
use stowage::io::parquet::ParquetWriter;
use stowage::transfer::TableLoader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    id: i64,
    kind: String,
}

fn memory_factory(store: &str) -> BackendFactory {
    let mut options = StorageOptions::new();
    options.insert("store".into(), store.into());
    BackendFactory::new(StorageScheme::Memory, options)
}

fn write_part(store: &str, name: &str, rows: &[Event]) -> Result<()> {
    let writer = stowage::io::writer::Writer::with_factory(
        WriterConfig::new(StorageScheme::Memory, "/lake/events/{}"),
        memory_factory(store),
    );
    ParquetWriter::from_writer(writer).write_rows(rows, &[name])?;
    Ok(())
}

fn loader(store: &str) -> Result<TableLoader> {
    Ok(TableLoader::with_factory(
        TransferConfig::new(StorageScheme::Memory, "lake").with_threads(2),
        memory_factory(store),
    )?)
}

#[test]
fn test_concatenates_direct_children() -> Result<()> {
    let store = "table-concat";
    MemoryBackend::new(store).clear();
    for part in 0..5i64 {
        let rows: Vec<Event> = (0..10)
            .map(|i| Event {
                id: part * 10 + i,
                kind: format!("k{part}"),
            })
            .collect();
        write_part(store, &format!("part-{part}.parquet"), &rows)?;
    }
    write_part(store, "nested/ignored.parquet", &[Event { id: -1, kind: "x".into() }])?;

    let table = loader(store)?.load("events")?;
    assert_eq!(table.num_rows(), 50);

    let ids = table.column_by_name("id").unwrap().as_any().downcast_ref::<Int64Array>().unwrap();
    let mut seen: Vec<i64> = ids.values().to_vec();
    seen.sort_unstable();
    assert_eq!(seen, (0..50).collect::<Vec<_>>());

    assert_eq!(table.column_by_name("kind").unwrap().len(), 50);
    Ok(())
}

#[test]
fn test_no_files_gives_empty_table() -> Result<()> {
    let store = "table-empty";
    MemoryBackend::new(store).clear();

    let table = loader(store)?.load("nothing-here")?;
    assert_eq!(table.num_rows(), 0);
    assert_eq!(table.num_columns(), 0);

    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let table = loader(store)?.with_schema(schema.clone()).load("nothing-here")?;
    assert_eq!(table.num_rows(), 0);
    assert_eq!(table.schema(), schema);
    Ok(())
}

#[test]
fn test_corrupt_file_fails_the_load() -> Result<()> {
    let store = "table-corrupt";
    MemoryBackend::new(store).clear();
    write_part(store, "good.parquet", &[Event { id: 1, kind: "a".into() }])?;
    stowage::io::writer::Writer::with_factory(
        WriterConfig::new(StorageScheme::Memory, "/lake/events/bad.parquet"),
        memory_factory(store),
    )
    .write(b"not parquet", &[] as &[&str])?;

    assert!(loader(store)?.load("events").is_err());
    Ok(())
}
