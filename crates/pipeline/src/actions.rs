//! Interaction handlers wired per item. They depend only on the raw payload
//! and the identifier, never on metadata or rendering.

use std::sync::{Arc, Weak};

use base64::Engine as _;
use bytes::Bytes;
use tokio::task::JoinHandle;
use vitrine_core::{Download, ItemId, VitrineError, VitrineResult};

use crate::gallery::ItemRecord;
use crate::overlay::DetailOverlay;

/// Raw payload of one item plus the pure actions derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    id: ItemId,
    raw: Bytes,
}

impl Payload {
    pub fn new(id: ItemId, raw: Bytes) -> Self { Self { id, raw } }

    pub fn id(&self) -> &ItemId { &self.id }
    pub fn raw(&self) -> &Bytes { &self.raw }

    /// File-save of the raw payload under the identifier's name.
    pub fn download(&self) -> Download {
        Download { file_name: self.id.to_string(), bytes: self.raw.clone() }
    }

    /// Clipboard text: standard base64 of the raw payload.
    pub fn copy_text(&self) -> String { encode_base64(&self.raw) }
}

pub fn encode_base64(raw: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

/// The three affordances of an item tile: info, copy, download.
pub struct ItemActions {
    payload: Payload,
    record: Weak<ItemRecord>,
    overlay: Arc<DetailOverlay>,
}

impl ItemActions {
    pub(crate) fn new(payload: Payload, record: &Arc<ItemRecord>, overlay: Arc<DetailOverlay>) -> Self {
        Self { payload, record: Arc::downgrade(record), overlay }
    }

    pub fn download(&self) -> Download { self.payload.download() }

    pub fn copy_text(&self) -> String { self.payload.copy_text() }

    /// Open the detail overlay for this item. The returned handle resolves once
    /// the attribution lookup has been applied or discarded.
    pub fn info(&self) -> VitrineResult<JoinHandle<()>> {
        let record = self
            .record
            .upgrade()
            .ok_or_else(|| VitrineError::UnknownItem(self.payload.id.clone()))?;
        Ok(self.overlay.open(&record))
    }
}
