//! Vitrine pipeline: loads a list of remote items with bounded concurrency,
//! defers engine work until initialization completes and renders each item
//! once, when it comes near the viewport.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::info;
use vitrine_core::{Download, Initializer, ItemId, ItemSource, PipelineConfig, VitrineError, VitrineResult};

pub mod actions;
pub mod gallery;
pub mod gate;
pub mod layout;
pub mod limiter;
pub mod loader;
pub mod overlay;
pub mod visibility;

pub use actions::{encode_base64, ItemActions, Payload};
pub use gallery::{Gallery, ItemRecord, RenderState};
pub use gate::{spawn_initializer, ReadinessGate};
pub use layout::{Anchor, GridLayout, Layout, Viewport, ViewportBus};
pub use limiter::{BatchHandle, BatchReport, ConcurrencyLimiter, JobCounter};
pub use loader::ItemLoader;
pub use overlay::{DetailOverlay, DisplaySurface};
pub use visibility::{Tolerance, TriggerState, VisibilityTrigger};

use visibility::TriggerContext;

/// Lock ignoring poisoning: every guarded value stays consistent between statements.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wires gate, gallery, limiter, loader, triggers and overlay together.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ItemSource>,
    gate: Arc<ReadinessGate>,
    gallery: Arc<Gallery>,
    overlay: Arc<DetailOverlay>,
    viewport: ViewportBus,
    limiter: ConcurrencyLimiter,
    loader: Arc<ItemLoader>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ItemSource>,
        layout: Arc<dyn Layout>,
        viewport: Viewport,
    ) -> Self {
        let gate = Arc::new(ReadinessGate::new());
        let overlay = Arc::new(DetailOverlay::new(Arc::clone(&source), config.no_attribution.clone()));
        let viewport = ViewportBus::new(viewport);
        let trigger = TriggerContext {
            gate: Arc::clone(&gate),
            layout,
            viewport: viewport.subscribe(),
            tolerance: Tolerance::from_config(&config),
            debounce: config.debounce(),
        };
        let loader = Arc::new(ItemLoader::new(Arc::clone(&source), Arc::clone(&overlay), trigger));
        info!(max_in_flight = config.max_in_flight, debounce_ms = config.debounce_ms, "pipeline created");
        Self {
            limiter: ConcurrencyLimiter::new(config.max_in_flight),
            config,
            source,
            gate,
            gallery: Arc::new(Gallery::new()),
            overlay,
            viewport,
            loader,
        }
    }

    pub fn config(&self) -> &PipelineConfig { &self.config }
    pub fn gate(&self) -> &Arc<ReadinessGate> { &self.gate }
    pub fn gallery(&self) -> &Arc<Gallery> { &self.gallery }
    pub fn limiter(&self) -> &ConcurrencyLimiter { &self.limiter }
    pub fn overlay(&self) -> &Arc<DetailOverlay> { &self.overlay }

    /// Start the one-shot engine initialization.
    pub fn start(&self, init: Arc<dyn Initializer>) -> JoinHandle<()> {
        spawn_initializer(Arc::clone(&self.gate), init)
    }

    /// List every item and dispatch the batch. Only a listing failure is an error.
    pub async fn load_all(&self) -> VitrineResult<BatchHandle> {
        let ids = self.source.list().await?;
        info!(items = ids.len(), "item list fetched");
        Ok(self.run_batch(ids).await)
    }

    pub async fn run_batch(&self, ids: Vec<ItemId>) -> BatchHandle {
        self.limiter.run_batch(&self.gallery, Arc::clone(&self.loader), ids).await
    }

    pub fn viewport(&self) -> Viewport { self.viewport.current() }
    pub fn scroll_to(&self, scroll_top: f64) { self.viewport.scroll_to(scroll_top) }
    pub fn resize(&self, height: f64) { self.viewport.resize(height) }

    /// Render triggers still waiting for their item to become visible.
    pub fn armed_triggers(&self) -> usize {
        // The bus keeps no receiver itself; the loader's template receiver is one.
        self.viewport.listeners().saturating_sub(1)
    }

    pub fn record(&self, id: &ItemId) -> Option<Arc<ItemRecord>> { self.gallery.get(id) }
    pub fn records(&self) -> Vec<Arc<ItemRecord>> { self.gallery.records() }

    fn actions_for<T>(&self, id: &ItemId, f: impl FnOnce(&ItemActions) -> T) -> VitrineResult<T> {
        let record = self.gallery.get(id).ok_or_else(|| VitrineError::UnknownItem(id.clone()))?;
        let actions = record.actions().ok_or_else(|| VitrineError::NotLoaded(id.clone()))?;
        Ok(f(actions))
    }

    /// Info affordance: open the detail overlay for a loaded item.
    pub fn open_info(&self, id: &ItemId) -> VitrineResult<JoinHandle<()>> {
        self.actions_for(id, |a| a.info())?
    }

    pub fn close_info(&self) { self.overlay.close() }

    pub fn surface(&self) -> Option<DisplaySurface> { self.overlay.surface() }

    pub fn download(&self, id: &ItemId) -> VitrineResult<Download> {
        self.actions_for(id, |a| a.download())
    }

    pub fn copy(&self, id: &ItemId) -> VitrineResult<String> {
        self.actions_for(id, |a| a.copy_text())
    }
}
