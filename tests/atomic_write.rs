//! A failing write never leaves a partial target or a temporary object behind.

use anyhow::Result;
use std::io::Write;
use stowage::config::{StorageOptions, StorageScheme, WriterConfig};
use stowage::io::backend::{BackendFactory, MemoryBackend};
use stowage::io::writer::Writer;
use stowage::testing::{CountingFactory, FailingBackend, Fault};
use stowage::Error;

const NONE: &[&str] = &[];

fn memory_factory(store: &str) -> BackendFactory {
    let mut options = StorageOptions::new();
    options.insert("store".into(), store.into());
    BackendFactory::new(StorageScheme::Memory, options)
}

fn writer(factory: BackendFactory, overwrite: bool) -> Writer {
    Writer::with_factory(
        WriterConfig::new(StorageScheme::Memory, "/bucket/dir/target.bin").with_overwrite(overwrite),
        factory,
    )
}

#[test]
fn test_failures_leave_absent_target_absent() -> Result<()> {
    let faults = [
        Fault::Write { after_bytes: 10 },
        Fault::Commit,
        Fault::Rename,
    ];
    for (i, fault) in faults.into_iter().enumerate() {
        let store = format!("atomic-absent-{i}");
        let factory = FailingBackend::factory(memory_factory(&store), fault.clone());

        let payload = vec![7u8; 1024];
        let err = writer(factory, false).write(&payload, NONE).unwrap_err();
        assert!(!matches!(err, Error::FileExists { .. }), "{fault:?}: {err}");

        let paths = MemoryBackend::new(&store).paths();
        assert!(paths.is_empty(), "{fault:?} left {paths:?}");
    }
    Ok(())
}

#[test]
fn test_failures_keep_prior_content() -> Result<()> {
    let faults = [
        Fault::Write { after_bytes: 3 },
        Fault::Commit,
        Fault::Rename,
    ];
    for (i, fault) in faults.into_iter().enumerate() {
        let store = format!("atomic-prior-{i}");
        writer(memory_factory(&store), false).write(b"prior", NONE)?;

        let factory = FailingBackend::factory(memory_factory(&store), fault.clone());
        assert!(writer(factory, true).write(b"new content", NONE).is_err());

        let backend = MemoryBackend::new(&store);
        assert_eq!(backend.paths(), vec!["/bucket/dir/target.bin"], "{fault:?}");
        let reader = stowage::io::reader::Reader::with_factory(
            stowage::config::ReaderConfig::new(StorageScheme::Memory, "/bucket/dir"),
            memory_factory(&store),
        );
        assert_eq!(reader.read_bytes("target.bin")?, b"prior", "{fault:?}");
    }
    Ok(())
}

#[test]
fn test_callback_error_is_returned_unchanged() -> Result<()> {
    let store = "atomic-callback";
    let err = writer(memory_factory(store), false)
        .write_with(NONE, |out| {
            out.write_all(b"partial")?;
            Err(Error::InvalidConfig("producer gave up".into()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(ref m) if m == "producer gave up"));
    assert!(MemoryBackend::new(store).paths().is_empty());
    Ok(())
}

#[test]
fn test_local_failure_leaves_no_temp_file() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let target = tmp.path().join("out").join("file.txt");
    let factory = FailingBackend::factory(
        BackendFactory::new(StorageScheme::File, StorageOptions::new()),
        Fault::Rename,
    );
    let w = Writer::with_factory(
        WriterConfig::new(StorageScheme::File, target.to_string_lossy()),
        factory,
    );
    assert!(w.write(b"never visible", NONE).is_err());
    assert!(!target.exists());
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("out"))?.collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_failure_after_compression_trailer() -> Result<()> {
    let store = "atomic-gzip";
    let factory = FailingBackend::factory(memory_factory(store), Fault::Commit);
    let w = Writer::with_factory(
        WriterConfig::new(StorageScheme::Memory, "/bucket/z/{}.json.gz"),
        factory,
    );
    assert!(w.write(br#"{"a":1}"#, &["doc"]).is_err());
    assert!(MemoryBackend::new(store).paths().is_empty());
    Ok(())
}

#[test]
fn test_one_handle_per_write_call() -> Result<()> {
    let counting = CountingFactory::new(memory_factory("atomic-counting"));
    let w = Writer::with_factory(
        WriterConfig::new(StorageScheme::Memory, "/bucket/{}.txt").with_skip(true),
        counting.factory(),
    );
    w.write(b"a", &["one"])?;
    w.write(b"b", &["one"])?;
    w.write(b"c", &["two"])?;
    assert_eq!(counting.count(), 3);
    Ok(())
}
