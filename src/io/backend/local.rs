use super::{Backend, ObjectWriter};
use crate::config::{ChunkSize, StorageOptions, StorageScheme};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Local filesystem, with backend paths resolved below `root` (default `/`).
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new("/")
    }
}

impl LocalBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Recognised option: `root`.
    #[must_use]
    pub fn from_options(options: &StorageOptions) -> Self {
        options
            .get("root")
            .map_or_else(Self::default, |root| Self::new(root))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn canonical(&self, file: &Path) -> Option<String> {
        let rel = file.strip_prefix(&self.root).ok()?;
        let mut out = String::new();
        for component in rel.components() {
            out.push('/');
            out.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(out)
    }
}

/// Collect regular files below `dir`. Symlinks are not followed.
fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

struct LocalWriter {
    inner: BufWriter<File>,
    path: PathBuf,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ObjectWriter for LocalWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let Self { inner, path } = *self;
        let file = inner
            .into_inner()
            .map_err(|e| Error::local("flush", &path, e.into_error()))?;
        file.sync_all().map_err(|e| Error::local("sync", &path, e))
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> StorageScheme {
        StorageScheme::File
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let local = self.local(path);
        local.try_exists().map_err(|e| Error::local("stat", local, e))
    }

    fn open(&self, path: &str, chunk: ChunkSize) -> Result<Option<Box<dyn Read + Send>>> {
        let local = self.local(path);
        if local.is_dir() {
            return Ok(None);
        }
        match File::open(&local) {
            Ok(file) => Ok(Some(Box::new(BufReader::with_capacity(chunk.bytes(), file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::local("open", local, e)),
        }
    }

    fn create(&self, path: &str, chunk: ChunkSize) -> Result<Box<dyn ObjectWriter>> {
        let local = self.local(path);
        let file = File::create(&local).map_err(|e| Error::local("create", &local, e))?;
        Ok(Box::new(LocalWriter {
            inner: BufWriter::with_capacity(chunk.bytes(), file),
            path: local,
        }))
    }

    #[instrument(level = "debug", skip(self), fields(backend = "file"))]
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let src = self.local(from);
        fs::rename(&src, self.local(to)).map_err(|e| Error::local("rename", src, e))
    }

    #[instrument(level = "debug", skip(self), fields(backend = "file"))]
    fn remove(&self, path: &str) -> Result<()> {
        let local = self.local(path);
        let result = match fs::symlink_metadata(&local) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&local),
            Ok(_) => fs::remove_file(&local),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::local("remove", local, e)),
            _ => Ok(()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = format!("/{}", prefix.trim_start_matches('/'));
        let dir = &prefix[..=prefix.rfind('/').unwrap_or(0)];
        let local = self.local(dir);

        let mut files = Vec::new();
        match walk(&local, &mut files) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::local("list", local, e)),
        }

        let mut out: Vec<String> = files
            .iter()
            .filter_map(|f| self.canonical(f))
            .filter(|p| p.starts_with(&prefix))
            .collect();
        out.sort();
        debug!(prefix = %prefix, count = out.len(), "listed local files");
        Ok(out)
    }

    fn make_dirs(&self, path: &str) -> Result<()> {
        let local = self.local(path);
        fs::create_dir_all(&local).map_err(|e| Error::local("mkdir", local, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> ChunkSize {
        ChunkSize::from_mib(1.0).unwrap()
    }

    #[test]
    fn test_create_commit_open() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.make_dirs("/a/b").unwrap();

        let mut w = backend.create("/a/b/f.txt", chunk()).unwrap();
        w.write_all(b"local bytes").unwrap();
        w.commit().unwrap();

        let mut s = String::new();
        backend
            .open("/a/b/f.txt", chunk())
            .unwrap()
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        assert_eq!(s, "local bytes");
        assert!(backend.open("/a/b/missing", chunk()).unwrap().is_none());
        assert!(backend.open("/a/b", chunk()).unwrap().is_none());
    }

    #[test]
    fn test_list_is_recursive_and_prefix_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        for p in ["/d/run-1.txt", "/d/run-2.txt", "/d/other.txt", "/d/sub/run-3.txt"] {
            let local = backend.local(p);
            fs::create_dir_all(local.parent().unwrap()).unwrap();
            fs::write(local, b"x").unwrap();
        }

        assert_eq!(backend.list("/d/").unwrap().len(), 4);
        assert_eq!(
            backend.list("/d/run-").unwrap(),
            vec!["/d/run-1.txt", "/d/run-2.txt"]
        );
        assert!(backend.list("/missing/").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_list_skips_symlink_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.make_dirs("/loop/inner").unwrap();
        fs::write(backend.local("/loop/inner/f.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(backend.local("/loop"), backend.local("/loop/inner/back")).unwrap();

        assert_eq!(backend.list("/loop/").unwrap(), vec!["/loop/inner/f.txt"]);
    }

    #[test]
    fn test_remove_is_idempotent_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.make_dirs("/x/y").unwrap();
        fs::write(backend.local("/x/y/z"), b"1").unwrap();

        backend.remove("/x").unwrap();
        assert!(!backend.exists("/x").unwrap());
        backend.remove("/x").unwrap();
    }
}
