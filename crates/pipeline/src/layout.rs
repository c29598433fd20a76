//! Viewport and item geometry used by the visibility checks.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Page offset of the viewport's top edge.
    pub scroll_top: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(height: f64) -> Self { Self { scroll_top: 0.0, height } }
}

/// Vertical extent of an item's visual anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub top: f64,
    pub bottom: f64,
}

impl Anchor {
    /// Same extent expressed relative to the viewport's top edge.
    pub fn relative_to(self, vp: &Viewport) -> Anchor {
        Anchor { top: self.top - vp.scroll_top, bottom: self.bottom - vp.scroll_top }
    }
}

/// Maps a gallery slot to the page position of its anchor.
pub trait Layout: Send + Sync {
    fn anchor(&self, slot: usize) -> Anchor;
}

/// Fixed-size tiles laid out row by row.
#[derive(Debug, Clone, Copy)]
pub struct GridLayout {
    columns: usize,
    cell_height: f64,
    gap: f64,
    origin: f64,
}

impl GridLayout {
    pub fn new(columns: usize, cell_height: f64) -> Self {
        Self { columns: columns.max(1), cell_height, gap: 0.0, origin: 0.0 }
    }

    pub fn with_gap(mut self, gap: f64) -> Self { self.gap = gap; self }

    /// Offset of the first row from the page top (e.g. a header).
    pub fn with_origin(mut self, origin: f64) -> Self { self.origin = origin; self }
}

impl Layout for GridLayout {
    fn anchor(&self, slot: usize) -> Anchor {
        let row = (slot / self.columns) as f64;
        let top = self.origin + row * (self.cell_height + self.gap);
        Anchor { top, bottom: top + self.cell_height }
    }
}

/// Publishes viewport changes. Every publish is a change signal for the
/// render triggers, even when the geometry is unchanged.
pub struct ViewportBus {
    tx: watch::Sender<Viewport>,
}

impl ViewportBus {
    pub fn new(initial: Viewport) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Viewport> { self.tx.subscribe() }

    pub fn current(&self) -> Viewport { *self.tx.borrow() }

    pub fn scroll_to(&self, scroll_top: f64) {
        self.tx.send_modify(|vp| vp.scroll_top = scroll_top);
    }

    pub fn resize(&self, height: f64) {
        self.tx.send_modify(|vp| vp.height = height);
    }

    /// Number of triggers still listening.
    pub fn listeners(&self) -> usize { self.tx.receiver_count() }
}
