//! Storage backends, codecs, and the readers and writers built on them.

pub mod backend;
pub mod cloud;
pub mod compression;
pub mod find;
pub mod reader;
pub mod writer;

#[cfg_attr(docsrs, doc(cfg(feature = "io-json")))]
#[cfg(feature = "io-json")]
pub mod json;

#[cfg_attr(docsrs, doc(cfg(feature = "io-toml")))]
#[cfg(feature = "io-toml")]
pub mod toml;

#[cfg_attr(docsrs, doc(cfg(feature = "io-yaml")))]
#[cfg(feature = "io-yaml")]
pub mod yaml;

#[cfg_attr(docsrs, doc(cfg(feature = "io-parquet")))]
#[cfg(feature = "io-parquet")]
pub mod parquet;
