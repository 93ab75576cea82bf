//! Pluggable stream compression for readers and writers.
//!
//! Codecs are looked up in a global registry, either by name (an explicit
//! [`Compression`] in the component config) or by file extension.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! ## Finishing
//!
//! Encoders are finished explicitly through [`Encoder::finish_stream`] so the
//! atomic writer sees trailer errors before it promotes the object.
//!
//! ### Custom Codec Implementation
//! ```
//! use stowage::io::compression::{register_codec, CompressionCodec, Encoder};
//! use std::io::{self, Read, Write};
//! use std::sync::Arc;
//!
//! struct Identity;
//! struct Passthrough<'a>(&'a mut (dyn Write + Send));
//!
//! impl Write for Passthrough<'_> {
//!     fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.0.write(buf) }
//!     fn flush(&mut self) -> io::Result<()> { self.0.flush() }
//! }
//!
//! impl Encoder for Passthrough<'_> {
//!     fn finish_stream(mut self: Box<Self>) -> io::Result<()> { self.0.flush() }
//! }
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn decoder<'a>(&self, r: Box<dyn Read + Send + 'a>) -> io::Result<Box<dyn Read + Send + 'a>> {
//!         Ok(r)
//!     }
//!     fn encoder<'a>(&self, w: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>> {
//!         Ok(Box::new(Passthrough(w)))
//!     }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry for pluggable compression support.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

/// Initialize the codec registry with built-in codecs.
fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

/// Get or initialize the global codec registry.
fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom compression codec globally.
///
/// Custom codecs are matched by extension after the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A compressing sink that must be finished before the bytes are complete.
pub trait Encoder: Write + Send {
    /// Flush remaining compressed data and write the stream trailer.
    ///
    /// # Errors
    /// Any I/O error from the underlying sink.
    fn finish_stream(self: Box<Self>) -> io::Result<()>;
}

/// Pluggable compression codec trait.
///
/// Implementations must be `Send + Sync` as they're stored in a global registry
/// and may be used from the transfer engine's worker threads.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// File extensions associated with this codec, with the leading dot, lowercase.
    fn extensions(&self) -> &[&str];

    /// Wrap a reader with decompression.
    ///
    /// # Errors
    /// If the decoder cannot be initialized.
    fn decoder<'a>(&self, reader: Box<dyn Read + Send + 'a>)
    -> io::Result<Box<dyn Read + Send + 'a>>;

    /// Wrap a borrowed sink with compression.
    ///
    /// # Errors
    /// If the encoder cannot be initialized.
    fn encoder<'a>(&self, writer: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>>;
}

/// Named codecs selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Stored as-is, whatever the extension suggests.
    Plain,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Compression {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    /// The registered codec for this name; `None` for [`Compression::Plain`].
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if the codec's feature is not enabled.
    pub fn codec(self) -> Result<Option<Arc<dyn CompressionCodec>>> {
        if self == Self::Plain {
            return Ok(None);
        }
        get_registry()
            .into_iter()
            .find(|c| c.name() == self.name())
            .map(Some)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("compression codec \"{self}\" is not enabled"))
            })
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect compression codec from a path's extension, case-insensitively.
#[must_use]
pub fn detect_from_extension(path: &str) -> Option<Arc<dyn CompressionCodec>> {
    let path = path.to_lowercase();
    get_registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path.ends_with(ext)))
}

/// An explicit codec wins; otherwise the extension decides.
///
/// # Errors
/// If the explicit codec is not enabled.
pub fn resolve_codec(
    explicit: Option<Compression>,
    path: &str,
) -> Result<Option<Arc<dyn CompressionCodec>>> {
    match explicit {
        Some(c) => c.codec(),
        None => Ok(detect_from_extension(path)),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl Encoder for flate2::write::GzEncoder<&mut (dyn Write + Send)> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn decoder<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn encoder<'a>(&self, writer: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl Encoder for zstd::stream::write::Encoder<'static, &mut (dyn Write + Send)> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn decoder<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send + 'a>)
    }

    fn encoder<'a>(&self, writer: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn Encoder + 'a>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl Encoder for bzip2::write::BzEncoder<&mut (dyn Write + Send)> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn decoder<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn encoder<'a>(&self, writer: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(bzip2::write::BzEncoder::new(
            writer,
            bzip2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl Encoder for xz2::write::XzEncoder<&mut (dyn Write + Send)> {
    fn finish_stream(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn decoder<'a>(
        &self,
        reader: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn encoder<'a>(&self, writer: &'a mut (dyn Write + Send)) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(codec: &Arc<dyn CompressionCodec>, payload: &[u8]) -> Vec<u8> {
        let mut sink: Vec<u8> = Vec::new();
        {
            let target: &mut (dyn Write + Send) = &mut sink;
            let mut enc = codec.encoder(target).unwrap();
            enc.write_all(payload).unwrap();
            enc.finish_stream().unwrap();
        }
        let mut out = Vec::new();
        codec
            .decoder(Box::new(io::Cursor::new(sink)))
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_detected_and_round_trips() {
        let codec = detect_from_extension("/data/Report.JSON.GZ").unwrap();
        assert_eq!(codec.name(), "gzip");
        assert_eq!(round_trip(&codec, b"hello gzip"), b"hello gzip");
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_explicit() {
        let codec = resolve_codec(Some(Compression::Zstd), "/no/extension").unwrap().unwrap();
        assert_eq!(codec.name(), "zstd");
        assert_eq!(round_trip(&codec, b"zstd payload"), b"zstd payload");
    }

    #[test]
    fn test_plain_path_has_no_codec() {
        assert!(detect_from_extension("/data/report.json").is_none());
        assert!(resolve_codec(None, "/data/report.parquet").unwrap().is_none());
    }

    #[test]
    fn test_plain_overrides_extension() {
        assert!(resolve_codec(Some(Compression::Plain), "/data/report.json.gz")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_compression_names_parse() {
        let c: Compression = serde_json::from_str("\"bzip2\"").unwrap();
        assert_eq!(c, Compression::Bzip2);
        assert_eq!(c.to_string(), "bzip2");
    }
}
