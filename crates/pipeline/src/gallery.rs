//! Item records and the ordered gallery of placeholders they live in.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::warn;
use vitrine_core::{ImageRef, ItemId, ItemMeta};

use crate::actions::{ItemActions, Payload};
use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    NotRendered,
    Rendered(ImageRef),
}

/// Per-item state. Every field is write-once; render state only moves forward.
pub struct ItemRecord {
    id: ItemId,
    slot: usize,
    raw: OnceCell<Bytes>,
    meta: OnceCell<ItemMeta>,
    render: Mutex<RenderState>,
    actions: OnceCell<ItemActions>,
}

impl ItemRecord {
    pub(crate) fn new(id: ItemId, slot: usize) -> Self {
        Self {
            id,
            slot,
            raw: OnceCell::new(),
            meta: OnceCell::new(),
            render: Mutex::new(RenderState::NotRendered),
            actions: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &ItemId { &self.id }

    /// Position of the placeholder in the gallery (input order).
    pub fn slot(&self) -> usize { self.slot }

    pub fn raw(&self) -> Option<&Bytes> { self.raw.get() }

    /// Store the fetched payload. Returns false if it was already set.
    pub(crate) fn set_raw(&self, raw: Bytes) -> bool { self.raw.set(raw).is_ok() }

    pub fn payload(&self) -> Option<Payload> {
        self.raw().map(|raw| Payload::new(self.id.clone(), raw.clone()))
    }

    /// Metadata, absent until the engine is ready and tags were extracted.
    pub fn meta(&self) -> Option<&ItemMeta> { self.meta.get() }

    pub fn title(&self) -> Option<&str> { self.meta().map(|m| m.name.as_str()) }

    pub(crate) fn set_meta(&self, meta: ItemMeta) -> bool { self.meta.set(meta).is_ok() }

    pub fn render_state(&self) -> RenderState { lock(&self.render).clone() }

    pub fn is_rendered(&self) -> bool {
        matches!(*lock(&self.render), RenderState::Rendered(_))
    }

    /// Rendered image, or the placeholder image while not rendered.
    pub fn image(&self) -> ImageRef {
        match &*lock(&self.render) {
            RenderState::Rendered(img) => img.clone(),
            RenderState::NotRendered => ImageRef::placeholder(),
        }
    }

    /// NotRendered -> Rendered. A second call leaves the first output in place.
    pub(crate) fn set_rendered(&self, img: ImageRef) -> bool {
        let mut st = lock(&self.render);
        match *st {
            RenderState::NotRendered => {
                *st = RenderState::Rendered(img);
                true
            }
            RenderState::Rendered(_) => false,
        }
    }

    /// Action handlers, wired once the payload has been fetched.
    pub fn actions(&self) -> Option<&ItemActions> { self.actions.get() }

    pub(crate) fn wire_actions(&self, actions: ItemActions) {
        if self.actions.set(actions).is_err() {
            warn!(id = %self.id, "actions already wired");
        }
    }
}

impl std::fmt::Debug for ItemRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemRecord")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("loaded", &self.raw.get().is_some())
            .field("title", &self.title())
            .field("rendered", &self.is_rendered())
            .finish()
    }
}

#[derive(Default)]
struct GalleryInner {
    slots: Vec<Arc<ItemRecord>>,
    index: FxHashMap<ItemId, usize>,
}

/// Placeholders in insertion order, addressable by identifier.
#[derive(Default)]
pub struct Gallery {
    inner: Mutex<GalleryInner>,
}

impl Gallery {
    pub fn new() -> Self { Self::default() }

    /// Append a placeholder for `id`. Returns None (and keeps the existing one)
    /// if the identifier is already present.
    pub fn insert_placeholder(&self, id: ItemId) -> Option<Arc<ItemRecord>> {
        let mut g = lock(&self.inner);
        if g.index.contains_key(&id) {
            warn!(id = %id, "duplicate identifier; placeholder skipped");
            return None;
        }
        let slot = g.slots.len();
        let record = Arc::new(ItemRecord::new(id.clone(), slot));
        g.slots.push(Arc::clone(&record));
        g.index.insert(id, slot);
        Some(record)
    }

    pub fn get(&self, id: &ItemId) -> Option<Arc<ItemRecord>> {
        let g = lock(&self.inner);
        g.index.get(id).and_then(|&i| g.slots.get(i)).cloned()
    }

    pub fn len(&self) -> usize { lock(&self.inner).slots.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn ids(&self) -> Vec<ItemId> {
        lock(&self.inner).slots.iter().map(|r| r.id().clone()).collect()
    }

    pub fn records(&self) -> Vec<Arc<ItemRecord>> { lock(&self.inner).slots.clone() }
}
