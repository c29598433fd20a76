use serde::{Deserialize, Serialize};

use crate::ItemId;

/// Errors surfaced by the pipeline and its collaborators. All of them are item-scoped.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum VitrineError {
    #[error("fetch {id}: {message}")]
    Fetch { id: ItemId, message: String },
    #[error("fetch {id}: status {status}")]
    Status { id: ItemId, status: u16 },
    #[error("list: {0}")]
    List(String),
    #[error("tags: {0}")]
    Tags(String),
    #[error("render: {0}")]
    Render(String),
    #[error("attribution {id}: {message}")]
    Attribution { id: ItemId, message: String },
    #[error("init: {0}")]
    Init(String),
    #[error("not loaded: {0}")]
    NotLoaded(ItemId),
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    /// The load task panicked or was cancelled before reporting.
    #[error("load {id} aborted: {message}")]
    Aborted { id: ItemId, message: String },
}

impl VitrineError {
    /// True for the fetch failures the loader reports per item.
    pub fn is_fetch(&self) -> bool {
        matches!(self, VitrineError::Fetch { .. } | VitrineError::Status { .. })
    }
}

pub type VitrineResult<T> = Result<T, VitrineError>;
