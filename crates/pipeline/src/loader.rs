//! Per-item loading: fetch once, derive metadata through the gate, arm the
//! render trigger and wire the item's actions.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, warn};
use vitrine_core::{Engine, ItemSource, VitrineResult};

use crate::actions::{ItemActions, Payload};
use crate::gallery::ItemRecord;
use crate::overlay::DetailOverlay;
use crate::visibility::{spawn_render_trigger, TriggerContext};

pub struct ItemLoader {
    source: Arc<dyn ItemSource>,
    overlay: Arc<DetailOverlay>,
    trigger: TriggerContext,
}

impl ItemLoader {
    pub(crate) fn new(
        source: Arc<dyn ItemSource>,
        overlay: Arc<DetailOverlay>,
        trigger: TriggerContext,
    ) -> Self {
        Self { source, overlay, trigger }
    }

    /// Fetch the payload and set the item up. Fails only on fetch errors;
    /// metadata and rendering complete later and report their own failures.
    pub async fn load(&self, record: Arc<ItemRecord>) -> VitrineResult<()> {
        if record.raw().is_some() {
            debug!(id = %record.id(), "payload already fetched; skipping");
            return Ok(());
        }
        let started = Instant::now();
        let fetched = self.source.fetch(record.id()).await?;
        histogram!("item_fetch_ms", started.elapsed().as_secs_f64() * 1000.0);
        record.set_raw(fetched);
        let Some(raw) = record.raw().cloned() else { return Ok(()) };
        debug!(id = %record.id(), bytes = raw.len(), "payload fetched");

        {
            let record = Arc::clone(&record);
            let raw = raw.clone();
            self.trigger.gate.defer_or_run(move |engine| derive_meta(&record, engine, &raw));
        }

        spawn_render_trigger(Arc::clone(&record), raw.clone(), self.trigger.clone());

        let payload = Payload::new(record.id().clone(), raw);
        record.wire_actions(ItemActions::new(payload, &record, Arc::clone(&self.overlay)));
        Ok(())
    }
}

fn derive_meta(record: &ItemRecord, engine: &dyn Engine, raw: &[u8]) {
    match engine.extract_tags(raw) {
        Ok(meta) => {
            debug!(id = %record.id(), name = %meta.name, "tags extracted");
            record.set_meta(meta);
        }
        Err(e) => warn!(id = %record.id(), error = %e, "tag extraction failed"),
    }
}
