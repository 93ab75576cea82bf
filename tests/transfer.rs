//! Bulk downloads and uploads through the transfer engine.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage::config::{ChunkSize, StorageOptions, StorageScheme, TransferConfig};
use stowage::io::backend::{Backend, BackendFactory, MemoryBackend, ObjectStoreBackend};
use stowage::io::cloud::helpers::RetryConfig;
use stowage::io::cloud::{FakeObjectIO, ObjectIO};
use stowage::testing::{CountingFactory, FailingBackend, Fault};
use stowage::transfer::{Downloader, Engine, Uploader};
use stowage::Error;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gcs_factory(fake: &FakeObjectIO) -> BackendFactory {
    let fake = fake.clone();
    BackendFactory::custom(StorageScheme::Gcs, move || {
        Ok(Box::new(
            ObjectStoreBackend::new(StorageScheme::Gcs, Arc::new(fake.clone())).with_retry(RetryConfig::none()),
        ) as Box<dyn Backend>)
    })
}

fn memory_factory(store: &str) -> BackendFactory {
    let mut options = StorageOptions::new();
    options.insert("store".into(), store.into());
    BackendFactory::new(StorageScheme::Memory, options)
}

fn seed(fake: &FakeObjectIO, keys: &[&str]) -> Result<()> {
    for key in keys {
        fake.put_object("bucket", key, format!("content of {key}").as_bytes())?;
    }
    fake.reset_calls();
    Ok(())
}

fn config(scheme: StorageScheme, base: &Path) -> TransferConfig {
    TransferConfig::new(scheme, "bucket")
        .with_base_dir(base.to_string_lossy())
        .with_threads(4)
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_fresh_download() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(
        &fake,
        &[
            "reports/2024/a.csv",
            "reports/2024/b.csv",
            "reports/2024/c.csv",
            "reports/2024/archive/old.csv",
            "reports/2025/d.csv",
        ],
    )?;
    let tmp = tempfile::tempdir()?;
    let downloader = Downloader::with_factory(
        config(StorageScheme::Gcs, tmp.path()).with_prefix("reports"),
        gcs_factory(&fake),
    )?;

    let dest = tmp.path().join("reports").join("2024");
    assert!(!dest.exists());

    let files = downloader.download("2024")?;
    assert!(dest.is_dir());
    assert_eq!(names(&files), vec!["a.csv", "b.csv", "c.csv"]);
    for file in &files {
        assert!(file.is_absolute());
        assert!(file.starts_with(&dest));
        let key = format!("reports/2024/{}", file.file_name().unwrap().to_string_lossy());
        assert_eq!(fs::read_to_string(file)?, format!("content of {key}"));
    }
    assert_eq!(fs::read_dir(&dest)?.count(), 3, "no temporary files left");
    Ok(())
}

#[test]
fn test_skip_existing_makes_no_remote_calls() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["reports/2024/a.csv"])?;
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("reports/2024");
    fs::create_dir_all(&dest)?;
    fs::write(dest.join("one.txt"), "1")?;
    fs::write(dest.join("two.txt"), "2")?;

    let counting = CountingFactory::new(gcs_factory(&fake));
    let downloader = Downloader::with_factory(
        config(StorageScheme::Gcs, tmp.path()).with_skip(true),
        counting.factory(),
    )?;
    let files = downloader.download("reports/2024")?;

    assert_eq!(files, vec![dest.join("one.txt"), dest.join("two.txt")]);
    assert_eq!(counting.count(), 0);
    assert_eq!(fake.call_count(), 0);
    Ok(())
}

#[test]
fn test_conflicting_destination_fails_before_remote_calls() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["reports/2024/a.csv"])?;
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("reports/2024");
    fs::create_dir_all(&dest)?;
    fs::write(dest.join("stale.txt"), "stale")?;

    let counting = CountingFactory::new(gcs_factory(&fake));
    let downloader = Downloader::with_factory(config(StorageScheme::Gcs, tmp.path()), counting.factory())?;
    let err = downloader.download("reports/2024").unwrap_err();

    assert!(matches!(err, Error::FileExists { .. }), "{err}");
    assert_eq!(counting.count(), 0);
    assert_eq!(fake.call_count(), 0);
    assert_eq!(fs::read_to_string(dest.join("stale.txt"))?, "stale");
    Ok(())
}

#[test]
fn test_overwrite_replaces_destination() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["d/fresh.txt"])?;
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("d");
    fs::create_dir_all(dest.join("nested"))?;
    fs::write(dest.join("stale.txt"), "stale")?;

    let downloader = Downloader::with_factory(
        config(StorageScheme::Gcs, tmp.path()).with_overwrite(true),
        gcs_factory(&fake),
    )?;
    let files = downloader.download("d")?;

    assert_eq!(names(&files), vec!["fresh.txt"]);
    assert!(!dest.join("stale.txt").exists());
    assert!(!dest.join("nested").exists());
    Ok(())
}

#[test]
fn test_empty_destination_is_filled() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["e/x.bin"])?;
    let tmp = tempfile::tempdir()?;
    fs::create_dir_all(tmp.path().join("e"))?;

    let downloader = Downloader::with_factory(config(StorageScheme::Gcs, tmp.path()), gcs_factory(&fake))?;
    assert_eq!(names(&downloader.download("e")?), vec!["x.bin"]);
    Ok(())
}

#[test]
fn test_skip_with_nothing_local_still_fetches() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["s/one.txt"])?;
    let tmp = tempfile::tempdir()?;
    fs::create_dir_all(tmp.path().join("s/only-a-subdir"))?;

    let downloader = Downloader::with_factory(
        config(StorageScheme::Gcs, tmp.path()).with_skip(true),
        gcs_factory(&fake),
    )?;
    assert_eq!(names(&downloader.download("s")?), vec!["one.txt"]);
    Ok(())
}

#[test]
fn test_depth_filter() -> Result<()> {
    let fake = FakeObjectIO::new();
    seed(&fake, &["p/a.txt", "p/x/b.txt", "p/x/y/c.txt", "pq/other.txt"])?;
    let tmp = tempfile::tempdir()?;

    let downloader = Downloader::with_factory(config(StorageScheme::Gcs, tmp.path()), gcs_factory(&fake))?;
    let files = downloader.download(" ./p/ ")?;
    assert_eq!(files, vec![tmp.path().join("p").join("a.txt")]);
    Ok(())
}

#[test]
fn test_manifest_complete_with_fewer_workers_than_units() -> Result<()> {
    init_tracing();
    let store = "transfer-many-units";
    let backend = MemoryBackend::new(store);
    backend.clear();
    for i in 0..40 {
        let mut w = backend.create(&format!("/bucket/many/file-{i:02}.dat"), Default::default())?;
        std::io::Write::write_all(&mut w, &[i as u8; 64])?;
        w.commit()?;
    }

    let tmp = tempfile::tempdir()?;
    let counting = CountingFactory::new(memory_factory(store));
    let downloader = Downloader::with_factory(
        config(StorageScheme::Memory, tmp.path()).with_threads(3),
        counting.factory(),
    )?;
    let files = downloader.download("many")?;

    assert_eq!(files.len(), 40);
    let unique: HashSet<_> = files.iter().collect();
    assert_eq!(unique.len(), 40);

    // One listing handle plus at most one per worker, each built on its own thread.
    let threads = counting.threads();
    assert!(threads.len() <= 4, "{} handles", threads.len());
    let workers: HashSet<_> = threads[1..].iter().collect();
    assert_eq!(workers.len(), threads.len() - 1);
    Ok(())
}

#[test]
fn test_first_unit_failure_fails_the_call() -> Result<()> {
    init_tracing();
    let fake = FakeObjectIO::new();
    seed(&fake, &["f/good-1.txt", "f/bad.txt", "f/good-2.txt"])?;
    let tmp = tempfile::tempdir()?;

    let downloader = Downloader::with_factory(
        config(StorageScheme::Gcs, tmp.path()),
        FailingBackend::factory(gcs_factory(&fake), Fault::Open("bad".into())),
    )?;
    let err = downloader.download("f").unwrap_err();
    assert!(matches!(err, Error::Cloud(_)), "{err}");
    Ok(())
}

#[test]
fn test_engine_rejects_root_and_zero_threads() {
    for scheme in StorageScheme::ALL {
        for bucket in ["", "/", " /. "] {
            let err = Engine::new(TransferConfig::new(scheme, bucket)).unwrap_err();
            assert!(matches!(err, Error::InvalidPath { .. }), "{scheme} {bucket:?}: {err}");
        }
        let err = Engine::new(TransferConfig::new(scheme, "bucket").with_threads(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}

#[test]
fn test_upload_places_direct_children() -> Result<()> {
    let store = "transfer-upload";
    MemoryBackend::new(store).clear();
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("out");
    fs::create_dir_all(src.join("ignored"))?;
    fs::write(src.join("a.txt"), "A")?;
    fs::write(src.join("b.txt"), "B")?;
    fs::write(src.join("ignored/c.txt"), "C")?;

    let uploader = Uploader::with_factory(config(StorageScheme::Memory, tmp.path()), memory_factory(store))?;
    let placed = uploader.upload("out")?;
    let placed: Vec<&str> = placed.iter().map(|p| p.as_str()).collect();
    assert_eq!(placed, vec!["/bucket/out/a.txt", "/bucket/out/b.txt"]);
    assert_eq!(
        MemoryBackend::new(store).paths(),
        vec!["/bucket/out/a.txt", "/bucket/out/b.txt"]
    );

    let err = uploader.upload("out").unwrap_err();
    assert!(matches!(err, Error::FileExists { .. }), "{err}");

    let skipping = Uploader::with_factory(
        config(StorageScheme::Memory, tmp.path()).with_skip(true),
        memory_factory(store),
    )?;
    assert_eq!(skipping.upload("out")?.len(), 2);

    let err = uploader.upload("missing").unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[test]
fn test_download_keeps_padded_keys() -> Result<()> {
    let store = "transfer-padded";
    MemoryBackend::new(store).clear();
    let backend = memory_factory(store).create()?;
    for key in ["/bucket/p/ padded.txt", "/bucket/p/ok.txt"] {
        let mut out = backend.create(key, ChunkSize::default())?;
        out.write_all(key.as_bytes())?;
        out.commit()?;
    }

    let tmp = tempfile::tempdir()?;
    let downloader = Downloader::with_factory(config(StorageScheme::Memory, tmp.path()), memory_factory(store))?;
    let mut got = names(&downloader.download("p")?);
    got.sort();
    assert_eq!(got, vec![" padded.txt", "ok.txt"]);
    assert_eq!(
        fs::read_to_string(tmp.path().join("p").join(" padded.txt"))?,
        "/bucket/p/ padded.txt"
    );
    Ok(())
}

#[test]
fn test_upload_keeps_padded_file_names() -> Result<()> {
    let store = "transfer-upload-padded";
    MemoryBackend::new(store).clear();
    let tmp = tempfile::tempdir()?;
    fs::create_dir_all(tmp.path().join("up"))?;
    fs::write(tmp.path().join("up").join(" lead.txt"), "L")?;

    let uploader = Uploader::with_factory(config(StorageScheme::Memory, tmp.path()), memory_factory(store))?;
    let placed = uploader.upload("up")?;
    assert_eq!(placed[0].as_str(), "/bucket/up/ lead.txt");
    assert_eq!(MemoryBackend::new(store).paths(), vec!["/bucket/up/ lead.txt"]);
    Ok(())
}

#[test]
fn test_upload_to_object_store() -> Result<()> {
    let fake = FakeObjectIO::new();
    let tmp = tempfile::tempdir()?;
    fs::create_dir_all(tmp.path().join("batch"))?;
    fs::write(tmp.path().join("batch/r.json"), "{}")?;

    let uploader = Uploader::with_factory(config(StorageScheme::Gcs, tmp.path()), gcs_factory(&fake))?;
    uploader.upload("batch")?;
    assert_eq!(fake.keys("bucket"), vec!["batch/r.json"]);
    Ok(())
}
