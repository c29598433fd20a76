//! Vitrine core types shared by the pipeline, the sources and the engines.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

mod config;
mod error;

pub use config::PipelineConfig;
pub use error::{VitrineError, VitrineResult};

/// Identifier of one loadable item (unique within a batch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ItemId {
    fn from(v: &str) -> Self { Self(v.to_string()) }
}

impl From<String> for ItemId {
    fn from(v: String) -> Self { Self(v) }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str { &self.0 }
}

/// Metadata derived from an item's raw bytes by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub name: String,
    pub description: String,
}

/// Reference to a rendered (or placeholder) image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Resource addressed by URL or path (e.g. the static placeholder).
    Url(String),
    /// Image produced in memory by the engine.
    Inline { mime: String, data: Bytes },
}

impl ImageRef {
    /// Image shown before an item has been rendered.
    pub fn placeholder() -> Self { ImageRef::Url("fail.png".to_string()) }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImageRef::Url(u) if u == "fail.png")
    }

    /// File extension matching the image type, used when saving previews.
    pub fn extension(&self) -> &str {
        match self {
            ImageRef::Url(u) => u.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin"),
            ImageRef::Inline { mime, .. } => match mime.as_str() {
                "image/svg+xml" => "svg",
                "image/png" => "png",
                "image/jpeg" => "jpg",
                _ => "bin",
            },
        }
    }
}

/// File-save request produced by the download action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Remote resource endpoints (listing, payload fetch, attribution lookup).
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    /// List identifiers of every available item.
    async fn list(&self) -> VitrineResult<Vec<ItemId>>;

    /// Fetch the raw payload of one item.
    async fn fetch(&self, id: &ItemId) -> VitrineResult<Bytes>;

    /// Fetch the attribution text of one item. The configured sentinel means "none".
    async fn attribution(&self, id: &ItemId) -> VitrineResult<String>;
}

/// Tag extraction and rendering, available only after initialization.
pub trait Engine: Send + Sync {
    fn extract_tags(&self, raw: &[u8]) -> VitrineResult<ItemMeta>;

    /// May be expensive (milliseconds per item).
    fn render(&self, raw: &[u8]) -> VitrineResult<ImageRef>;
}

/// One-shot, possibly slow engine initialization.
#[async_trait::async_trait]
pub trait Initializer: Send + Sync {
    async fn initialize(&self) -> VitrineResult<Arc<dyn Engine>>;
}

pub mod prelude {
    pub use super::{
        Download, Engine, ImageRef, Initializer, ItemId, ItemMeta, ItemSource, PipelineConfig,
        VitrineError, VitrineResult,
    };
}
