//! Recursive file search on any backend.

use crate::config::FindConfig;
use crate::error::{Error, Result};
use crate::io::backend::BackendFactory;
use crate::path::{backend_path, CanonicalPath, PathResolver};
use tracing::debug;

/// Lists files below a directory, filtered by name suffix and depth.
///
/// Results are backend paths (see
/// [`PathResolver::backend_path`](crate::path::PathResolver::backend_path)),
/// sorted.
#[derive(Debug, Clone)]
pub struct Find {
    config: FindConfig,
    suffix: String,
    resolver: PathResolver,
    factory: BackendFactory,
}

impl Find {
    /// # Errors
    /// [`Error::InvalidConfig`] if `max_depth` is `Some(0)`.
    pub fn new(config: FindConfig) -> Result<Self> {
        let factory = BackendFactory::new(config.storage, config.storage_options.clone());
        Self::with_factory(config, factory)
    }

    /// # Errors
    /// As for [`new`](Self::new).
    pub fn with_factory(config: FindConfig, factory: BackendFactory) -> Result<Self> {
        if config.max_depth == Some(0) {
            return Err(Error::InvalidConfig(
                "max_depth must be at least 1, or unset for no limit".into(),
            ));
        }
        let suffix = match config.suffix.trim().trim_start_matches('.') {
            "" => String::new(),
            s => format!(".{s}"),
        };
        Ok(Self {
            resolver: PathResolver::for_directory(config.storage),
            suffix,
            config,
            factory,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &FindConfig {
        &self.config
    }

    /// Files under the configured path completed by `path` (absolute
    /// replaces, relative appends, empty keeps).
    ///
    /// # Errors
    /// [`Error::InvalidPath`] for the root, or backend errors.
    pub fn find(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolver.resolve_suffix(&self.config.path, path)?;
        let backend = self.factory.create()?;
        let prefix = format!("{}/", self.resolver.backend_path(&dir));
        let base = format!("{dir}/");

        let found: Vec<String> = backend
            .list(&prefix)?
            .into_iter()
            .filter_map(|listed| {
                let relative = listed.strip_prefix(&base)?;
                let depth = relative.matches('/').count() + 1;
                let deep_enough = self.config.max_depth.is_none_or(|max| depth <= max);
                (deep_enough && relative.ends_with(&self.suffix)).then_some(listed)
            })
            .map(|listed| {
                CanonicalPath::from_key(&listed)
                    .map(|p| backend_path(self.config.storage, &p))
            })
            .collect::<Result<_>>()?;

        debug!(dir = %dir, count = found.len(), "find complete");
        Ok(found)
    }
}
