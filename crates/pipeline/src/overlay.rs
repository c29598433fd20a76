//! Detail overlay: composes a loaded item with its on-demand attribution.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::debug;
use vitrine_core::{ImageRef, ItemId, ItemSource};

use crate::actions::Payload;
use crate::gallery::ItemRecord;
use crate::lock;

/// What the overlay currently shows. Rebuilt on every open.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySurface {
    pub id: ItemId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: ImageRef,
    /// None until a real attribution arrives.
    pub attribution: Option<String>,
    pub payload: Option<Payload>,
}

#[derive(Default)]
struct OverlayInner {
    /// Bumped on every open/close; late attribution results carry the value
    /// they were issued under and are dropped on mismatch.
    generation: u64,
    surface: Option<DisplaySurface>,
}

pub struct DetailOverlay {
    source: Arc<dyn ItemSource>,
    no_attribution: String,
    inner: Arc<Mutex<OverlayInner>>,
}

impl DetailOverlay {
    pub fn new(source: Arc<dyn ItemSource>, no_attribution: impl Into<String>) -> Self {
        Self {
            source,
            no_attribution: no_attribution.into(),
            inner: Arc::new(Mutex::new(OverlayInner::default())),
        }
    }

    /// Show `record` with whatever metadata and image it has right now and
    /// start the attribution lookup.
    pub fn open(&self, record: &ItemRecord) -> JoinHandle<()> {
        let id = record.id().clone();
        let surface = DisplaySurface {
            id: id.clone(),
            name: record.meta().map(|m| m.name.clone()),
            description: record.meta().map(|m| m.description.clone()),
            image: record.image(),
            attribution: None,
            payload: record.payload(),
        };
        let generation = {
            let mut o = lock(&self.inner);
            o.generation += 1;
            o.surface = Some(surface);
            o.generation
        };
        debug!(id = %id, generation, "overlay opened");

        let source = Arc::clone(&self.source);
        let inner = Arc::clone(&self.inner);
        let sentinel = self.no_attribution.clone();
        tokio::spawn(async move {
            let text = match source.attribution(&id).await {
                Ok(text) => text,
                Err(e) => {
                    debug!(id = %id, error = %e, "attribution lookup failed; ignored");
                    return;
                }
            };
            if text == sentinel {
                return;
            }
            let mut o = lock(&inner);
            if o.generation != generation {
                debug!(id = %id, "stale attribution discarded");
                return;
            }
            if let Some(surface) = o.surface.as_mut().filter(|s| s.id == id) {
                surface.attribution = Some(text);
            }
        })
    }

    pub fn close(&self) {
        let mut o = lock(&self.inner);
        o.generation += 1;
        o.surface = None;
    }

    pub fn is_open(&self) -> bool { lock(&self.inner).surface.is_some() }

    /// Snapshot of the current surface.
    pub fn surface(&self) -> Option<DisplaySurface> { lock(&self.inner).surface.clone() }
}
