//! Path templating and canonicalization.
//!
//! Every component resolves its configured path through a [`PathResolver`]
//! before touching a backend. Resolution trims whitespace and slashes from the
//! template and each fragment, interpolates `{}` / `{N}` placeholders,
//! collapses empty and `.` segments and anchors the result at `/`.
//!
//! ```
//! use stowage::config::StorageScheme;
//! use stowage::path::PathResolver;
//!
//! let resolver = PathResolver::for_writer(StorageScheme::S3);
//! let path = resolver.resolve(" /reports/{}/{}.json ", &["2024/", "summary"]).unwrap();
//! assert_eq!(path.as_str(), "/reports/2024/summary.json");
//!
//! // A file directly under the root would name a bucket on object storage.
//! assert!(resolver.resolve::<&str>("/summary.json", &[]).is_err());
//! ```

use crate::config::StorageScheme;
use crate::error::{Error, Result};
use std::fmt;

/// Absolute, normalized path that is never the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// Normalize `raw` into `/seg/seg/...`.
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if `raw` contains a `..` segment or collapses to `/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut out = String::with_capacity(raw.len() + 1);
        for segment in raw.split('/').map(str::trim) {
            match segment {
                "" | "." => {}
                ".." => return Err(Error::invalid_path(raw, "parent segments are not allowed")),
                seg => {
                    out.push('/');
                    out.push_str(seg);
                }
            }
        }
        if out.is_empty() {
            return Err(Error::invalid_path(raw, "path resolves to the storage root"));
        }
        Ok(Self(out))
    }

    /// Wrap a key as a backend listed it. Only a leading `/` is added; the
    /// segments keep their whitespace, empty and `.` segments.
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if `key` names the root or has a `..` segment.
    pub fn from_key(key: &str) -> Result<Self> {
        let body = key.strip_prefix('/').unwrap_or(key);
        if body.is_empty() {
            return Err(Error::invalid_path(key, "path resolves to the storage root"));
        }
        if body.split('/').any(|seg| seg == "..") {
            return Err(Error::invalid_path(key, "parent segments are not allowed"));
        }
        Ok(Self(format!("/{body}")))
    }

    /// Append a key verbatim, see [`CanonicalPath::from_key`].
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if `key` has a `..` segment.
    pub fn join_key(&self, key: &str) -> Result<Self> {
        Self::from_key(&format!("{}/{}", self.0, key.strip_prefix('/').unwrap_or(key)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Number of segments; `/a/b.json` has two.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments().count()
    }

    /// Always false; the root is not a canonical path.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Last segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The containing directory, or `None` for a single-segment path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.0.rfind('/') {
            Some(0) | None => None,
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Append a relative path.
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if `rel` contains a `..` segment.
    pub fn join(&self, rel: &str) -> Result<Self> {
        Self::parse(&format!("{}/{rel}", self.0))
    }

    /// A uniquely named sibling for staging an atomic write.
    #[must_use]
    pub fn temp_sibling(&self) -> Self {
        Self(format!("{}.tmp.{}", self.0, uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves path templates for one scheme with a minimum segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResolver {
    scheme: StorageScheme,
    min_segments: usize,
}

impl PathResolver {
    #[must_use]
    pub const fn new(scheme: StorageScheme, min_segments: usize) -> Self {
        Self {
            scheme,
            min_segments,
        }
    }

    /// Files need a directory above them.
    #[must_use]
    pub const fn for_reader(scheme: StorageScheme) -> Self {
        Self::new(scheme, 2)
    }

    #[must_use]
    pub const fn for_writer(scheme: StorageScheme) -> Self {
        Self::new(scheme, 2)
    }

    /// Directories (find roots, transfer roots) only need to be below `/`.
    #[must_use]
    pub const fn for_directory(scheme: StorageScheme) -> Self {
        Self::new(scheme, 1)
    }

    #[must_use]
    pub const fn scheme(&self) -> StorageScheme {
        self.scheme
    }

    /// Interpolate `parts` into `template` and canonicalize.
    ///
    /// # Errors
    /// [`Error::Format`] if the template needs more fragments than given,
    /// [`Error::InvalidPath`] on malformed braces, `..` segments, or fewer
    /// segments than this resolver requires.
    pub fn resolve<S: AsRef<str>>(&self, template: &str, parts: &[S]) -> Result<CanonicalPath> {
        let filled = interpolate(strip(template), parts)?;
        self.check(CanonicalPath::parse(&filled)?, template)
    }

    /// Complete `base` with a call-time `suffix`.
    ///
    /// An absolute suffix replaces the base, a relative one is appended, an
    /// empty one keeps the base.
    ///
    /// # Errors
    /// As for [`resolve`](Self::resolve).
    pub fn resolve_suffix(&self, base: &str, suffix: &str) -> Result<CanonicalPath> {
        let suffix = suffix.trim();
        let raw = if suffix.starts_with('/') {
            suffix.to_string()
        } else if suffix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{suffix}", base.trim_end())
        };
        self.check(CanonicalPath::parse(&raw)?, &raw)
    }

    /// The string handed to this scheme's backend.
    #[must_use]
    pub fn backend_path(&self, path: &CanonicalPath) -> String {
        backend_path(self.scheme, path)
    }

    fn check(&self, path: CanonicalPath, original: &str) -> Result<CanonicalPath> {
        if path.len() < self.min_segments {
            return Err(Error::invalid_path(
                original,
                format!(
                    "needs at least {} segment(s) below the root",
                    self.min_segments
                ),
            ));
        }
        Ok(path)
    }
}

/// Backend form of `path` for `scheme`: leading slash dropped on schemes
/// that reject it.
#[must_use]
pub fn backend_path(scheme: StorageScheme, path: &CanonicalPath) -> String {
    if scheme.strips_leading_slash() {
        path.as_str()[1..].to_string()
    } else {
        path.as_str().to_string()
    }
}

fn strip(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '/')
}

/// Replace `{}` and `{N}` placeholders with the stripped fragments.
///
/// `{{` and `}}` produce literal braces. Surplus fragments are ignored.
///
/// # Errors
/// [`Error::Format`] when a placeholder has no fragment, [`Error::InvalidPath`]
/// on an unbalanced brace.
pub fn interpolate<S: AsRef<str>>(template: &str, parts: &[S]) -> Result<String> {
    enum Piece<'a> {
        Text(&'a str),
        Brace(char),
        Slot(usize),
    }

    let mut pieces = Vec::new();
    let mut next_auto = 0;
    let mut needed = 0;
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        pieces.push(Piece::Text(&rest[..idx]));
        let tail = &rest[idx..];
        if tail.starts_with("{{") {
            pieces.push(Piece::Brace('{'));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            pieces.push(Piece::Brace('}'));
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            let close = tail
                .find('}')
                .ok_or_else(|| Error::invalid_path(template, "unclosed '{'"))?;
            let inner = tail[1..close].trim();
            let slot = if inner.is_empty() {
                next_auto += 1;
                next_auto - 1
            } else {
                inner.parse::<usize>().map_err(|_| {
                    Error::invalid_path(template, format!("bad placeholder {{{inner}}}"))
                })?
            };
            needed = needed.max(slot + 1);
            pieces.push(Piece::Slot(slot));
            rest = &tail[close + 1..];
        } else {
            return Err(Error::invalid_path(template, "unmatched '}'"));
        }
    }
    pieces.push(Piece::Text(rest));

    if needed > parts.len() {
        return Err(Error::Format {
            template: template.to_string(),
            expected: needed,
            given: parts.len(),
        });
    }

    let mut out = String::with_capacity(template.len());
    for piece in pieces {
        match piece {
            Piece::Text(t) => out.push_str(t),
            Piece::Brace(c) => out.push(c),
            Piece::Slot(i) => out.push_str(strip(parts[i].as_ref())),
        }
    }
    Ok(out)
}
