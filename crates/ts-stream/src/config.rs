//! Configuration for schema parsing, record streams and the file store.
//!
//! Every struct has a `Default` matching the historical treestream behaviour
//! and deserializes with missing keys falling back to those defaults, so a
//! JSON config only needs the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Capacity used for rows declaring a max count below 1.
pub const DEFAULT_MAX_COUNT: usize = 100;

/// Schema parsing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Capacity assigned to rows whose declared count is below 1.
    pub default_max_count: usize,
    /// When deriving variables from a listing, prefix field names with the tree name.
    pub use_tree_prefix: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { default_max_count: DEFAULT_MAX_COUNT, use_tree_prefix: false }
    }
}

/// Read/write stream options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Fail with `UnknownField` when an activation prefix matches nothing.
    pub strict_activation: bool,
}

/// Block codec used for file-store baskets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store payloads raw.
    None,
    /// zlib (`ZL` blocks).
    #[default]
    Zlib,
    /// LZ4 (`L4` blocks).
    Lz4,
}

/// File store options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Uncompressed basket payload size that triggers a flush, in bytes.
    pub basket_size: usize,
    /// Basket codec.
    pub compression: Compression,
    /// Codec level (zlib 0-9; ignored by LZ4).
    pub compression_level: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { basket_size: 32_000, compression: Compression::Zlib, compression_level: 2 }
    }
}

impl StoreConfig {
    /// Uncompressed baskets.
    pub fn uncompressed() -> Self {
        Self { compression: Compression::None, compression_level: 0, ..Self::default() }
    }
}

/// Top-level configuration bundle (the CLI `--config` file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema parsing.
    pub schema: SchemaConfig,
    /// Stream behaviour.
    pub stream: StreamConfig,
    /// File store.
    pub store: StoreConfig,
}

impl Config {
    /// Load a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
