#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use vitrine_core::{Engine, ImageRef, Initializer, ItemId, ItemMeta, ItemSource, PipelineConfig, VitrineError, VitrineResult};
use vitrine_pipeline::{GridLayout, Pipeline, Viewport};

pub fn ids(n: usize) -> Vec<ItemId> {
    (0..n).map(|i| ItemId::new(format!("item{i:02}"))).collect()
}

#[derive(Default)]
struct Track {
    starts: Vec<(ItemId, Instant)>,
    in_flight: usize,
    peak: usize,
    completed: usize,
}

/// In-memory item source with fixed fetch latency. The payload of an item is its id.
pub struct FakeSource {
    list: Vec<ItemId>,
    latency: Duration,
    failing: HashSet<ItemId>,
    attributions: HashMap<ItemId, (Duration, VitrineResult<String>)>,
    track: Mutex<Track>,
}

impl FakeSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            list: Vec::new(),
            latency,
            failing: HashSet::new(),
            attributions: HashMap::new(),
            track: Mutex::new(Track::default()),
        }
    }

    pub fn with_list(mut self, list: Vec<ItemId>) -> Self { self.list = list; self }

    pub fn failing(mut self, id: &str) -> Self { self.failing.insert(ItemId::from(id)); self }

    pub fn attribution(mut self, id: &str, delay: Duration, res: VitrineResult<String>) -> Self {
        self.attributions.insert(ItemId::from(id), (delay, res));
        self
    }

    pub fn starts(&self) -> Vec<(ItemId, Instant)> { self.track.lock().unwrap().starts.clone() }
    pub fn peak(&self) -> usize { self.track.lock().unwrap().peak }
    pub fn completed(&self) -> usize { self.track.lock().unwrap().completed }
}

#[async_trait::async_trait]
impl ItemSource for FakeSource {
    async fn list(&self) -> VitrineResult<Vec<ItemId>> { Ok(self.list.clone()) }

    async fn fetch(&self, id: &ItemId) -> VitrineResult<Bytes> {
        {
            let mut t = self.track.lock().unwrap();
            t.starts.push((id.clone(), Instant::now()));
            t.in_flight += 1;
            t.peak = t.peak.max(t.in_flight);
        }
        tokio::time::sleep(self.latency).await;
        {
            let mut t = self.track.lock().unwrap();
            t.in_flight -= 1;
            t.completed += 1;
        }
        if self.failing.contains(id) {
            return Err(VitrineError::Status { id: id.clone(), status: 404 });
        }
        Ok(Bytes::from(id.to_string()))
    }

    async fn attribution(&self, id: &ItemId) -> VitrineResult<String> {
        match self.attributions.get(id) {
            Some((delay, res)) => {
                tokio::time::sleep(*delay).await;
                res.clone()
            }
            None => Ok("plent".to_string()),
        }
    }
}

/// Engine that names items after their payload and counts calls.
#[derive(Default)]
pub struct FakeEngine {
    renders: Mutex<HashMap<String, usize>>,
    tags: Mutex<HashMap<String, usize>>,
}

impl FakeEngine {
    pub fn renders_of(&self, id: &str) -> usize { self.renders.lock().unwrap().get(id).copied().unwrap_or(0) }
    pub fn total_renders(&self) -> usize { self.renders.lock().unwrap().values().sum() }
    pub fn tags_of(&self, id: &str) -> usize { self.tags.lock().unwrap().get(id).copied().unwrap_or(0) }
}

impl Engine for FakeEngine {
    fn extract_tags(&self, raw: &[u8]) -> VitrineResult<ItemMeta> {
        let id = String::from_utf8_lossy(raw).into_owned();
        *self.tags.lock().unwrap().entry(id.clone()).or_default() += 1;
        Ok(ItemMeta { name: format!("name of {id}"), description: format!("about {id}") })
    }

    fn render(&self, raw: &[u8]) -> VitrineResult<ImageRef> {
        let id = String::from_utf8_lossy(raw).into_owned();
        *self.renders.lock().unwrap().entry(id.clone()).or_default() += 1;
        Ok(ImageRef::Url(format!("{id}.png")))
    }
}

/// Hands out a shared FakeEngine after a delay.
pub struct FakeInit {
    pub delay: Duration,
    pub engine: Arc<FakeEngine>,
}

#[async_trait::async_trait]
impl Initializer for FakeInit {
    async fn initialize(&self) -> VitrineResult<Arc<dyn Engine>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.engine.clone() as Arc<dyn Engine>)
    }
}

/// One column of 100px tiles in a 300px viewport: slots 0..=4 are inside the
/// tolerance window at scroll 0.
pub fn pipeline(source: Arc<FakeSource>) -> Pipeline {
    let layout = Arc::new(GridLayout::new(1, 100.0));
    Pipeline::new(PipelineConfig::default(), source, layout, Viewport::new(300.0))
}

/// Pipeline with an engine that becomes ready after `init_delay`.
pub fn started(source: Arc<FakeSource>, init_delay: Duration) -> (Pipeline, Arc<FakeEngine>) {
    let p = pipeline(source);
    let engine = Arc::new(FakeEngine::default());
    p.start(Arc::new(FakeInit { delay: init_delay, engine: engine.clone() }));
    (p, engine)
}
