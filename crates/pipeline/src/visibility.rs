//! Visibility-gated, render-once trigger per item.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vitrine_core::{Engine, PipelineConfig};

use crate::gallery::ItemRecord;
use crate::gate::ReadinessGate;
use crate::layout::{Anchor, Layout, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Armed,
    Fired,
}

/// Expanded viewport bounds that count as visible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub above: f64,
    pub below: f64,
}

impl Tolerance {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self { above: cfg.slack_above, below: cfg.slack_below }
    }

    /// `anchor` is relative to the viewport top.
    pub fn contains(&self, anchor: Anchor, viewport_height: f64) -> bool {
        anchor.top >= -self.above && anchor.bottom <= viewport_height + self.below
    }
}

impl Default for Tolerance {
    fn default() -> Self { Self::from_config(&PipelineConfig::default()) }
}

/// Armed until the first visible check, Fired forever after.
#[derive(Debug)]
pub struct VisibilityTrigger {
    state: TriggerState,
    checks: u64,
}

impl Default for VisibilityTrigger {
    fn default() -> Self { Self { state: TriggerState::Armed, checks: 0 } }
}

impl VisibilityTrigger {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> TriggerState { self.state }

    /// Checks performed while armed.
    pub fn checks(&self) -> u64 { self.checks }

    /// Record a check result. Returns true exactly once: on the transition to Fired.
    pub fn check(&mut self, visible: bool) -> bool {
        if self.state == TriggerState::Fired {
            return false;
        }
        self.checks += 1;
        if visible {
            self.state = TriggerState::Fired;
            return true;
        }
        false
    }
}

/// Everything a trigger task needs besides the item itself.
#[derive(Clone)]
pub(crate) struct TriggerContext {
    pub gate: Arc<ReadinessGate>,
    pub layout: Arc<dyn Layout>,
    pub viewport: watch::Receiver<Viewport>,
    pub tolerance: Tolerance,
    pub debounce: Duration,
}

/// Watch viewport changes for one item and render it once it is visible.
/// One check runs immediately on registration; afterwards each change
/// schedules a check after the debounce delay, and changes during the delay
/// fold into it. The task ends (dropping its listener) once the item fired or
/// the viewport bus is gone.
pub(crate) fn spawn_render_trigger(
    record: Arc<ItemRecord>,
    raw: Bytes,
    ctx: TriggerContext,
) -> JoinHandle<()> {
    let TriggerContext { gate, layout, mut viewport, tolerance, debounce } = ctx;
    tokio::spawn(async move {
        let mut trigger = VisibilityTrigger::new();
        let mut vp = *viewport.borrow_and_update();
        loop {
            let anchor = layout.anchor(record.slot()).relative_to(&vp);
            if trigger.check(tolerance.contains(anchor, vp.height)) {
                debug!(id = %record.id(), checks = trigger.checks(), "item visible; render scheduled");
                let record = Arc::clone(&record);
                gate.defer_or_run(move |engine| render_record(&record, engine, &raw));
                break;
            }
            if viewport.changed().await.is_err() {
                debug!(id = %record.id(), "viewport bus closed; trigger dropped");
                break;
            }
            tokio::time::sleep(debounce).await;
            vp = *viewport.borrow_and_update();
        }
    })
}

fn render_record(record: &ItemRecord, engine: &dyn Engine, raw: &[u8]) {
    let started = std::time::Instant::now();
    match engine.render(raw) {
        Ok(img) => {
            histogram!("item_render_ms", started.elapsed().as_secs_f64() * 1000.0);
            if record.set_rendered(img) {
                counter!("items_rendered_total", 1u64);
            }
        }
        Err(e) => warn!(id = %record.id(), error = %e, "render failed"),
    }
}
