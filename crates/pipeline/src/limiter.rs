//! Sliding-window dispatch of loader jobs over a batch of identifiers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitrine_core::{ItemId, VitrineError, VitrineResult};

use crate::gallery::Gallery;
use crate::loader::ItemLoader;

/// Jobs currently running, plus the high-water mark.
#[derive(Debug, Default)]
pub struct JobCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl JobCounter {
    pub fn current(&self) -> usize { self.current.load(Ordering::SeqCst) }
    pub fn peak(&self) -> usize { self.peak.load(Ordering::SeqCst) }

    fn start(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        gauge!("jobs_in_flight", now as f64);
    }

    fn finish(&self) {
        let now = self.current.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("jobs_in_flight", now as f64);
    }
}

/// Holds a slot for the whole life of one job; released on drop (also on panic).
struct JobGuard {
    counter: Arc<JobCounter>,
    _permit: OwnedSemaphorePermit,
}

impl JobGuard {
    fn start(counter: Arc<JobCounter>, permit: OwnedSemaphorePermit) -> Self {
        counter.start();
        Self { counter, _permit: permit }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) { self.counter.finish(); }
}

pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
    counter: Arc<JobCounter>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            counter: Arc::new(JobCounter::default()),
        }
    }

    pub fn limit(&self) -> usize { self.limit }
    pub fn counter(&self) -> &JobCounter { &self.counter }

    /// Insert every placeholder in input order, then dispatch one load per new
    /// item. Below the limit loads are fired without waiting; at the limit
    /// dispatch waits for any running job to finish before starting the next.
    /// Returns once everything has been dispatched; jobs may still be running.
    pub async fn run_batch(
        &self,
        gallery: &Gallery,
        loader: Arc<ItemLoader>,
        ids: Vec<ItemId>,
    ) -> BatchHandle {
        let requested = ids.len();
        let records: Vec<_> = ids.into_iter().filter_map(|id| gallery.insert_placeholder(id)).collect();
        let skipped = requested - records.len();
        info!(items = records.len(), skipped, limit = self.limit, "batch dispatch started");

        let started = Instant::now();
        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("job semaphore closed; stopping dispatch");
                    break;
                }
            };
            let guard = JobGuard::start(Arc::clone(&self.counter), permit);
            let loader = Arc::clone(&loader);
            let id = record.id().clone();
            debug!(id = %id, in_flight = self.counter.current(), "load dispatched");
            let job_id = id.clone();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                let res = loader.load(record).await;
                match &res {
                    Ok(()) => { counter!("items_loaded_total", 1u64); }
                    Err(e) => {
                        counter!("items_failed_total", 1u64);
                        warn!(id = %job_id, error = %e, "item load failed");
                    }
                }
                res
            });
            jobs.push((id, handle));
        }
        info!(dispatched = jobs.len(), took_ms = %started.elapsed().as_millis(), "batch dispatched");
        BatchHandle { jobs, skipped }
    }
}

/// Outcome of a fully loaded batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<ItemId>,
    pub failed: Vec<(ItemId, VitrineError)>,
}

/// "All dispatched" handle returned by [`ConcurrencyLimiter::run_batch`].
/// Dropping it detaches the jobs; [`BatchHandle::wait_loaded`] is the
/// "all loaded" signal.
pub struct BatchHandle {
    jobs: Vec<(ItemId, JoinHandle<VitrineResult<()>>)>,
    skipped: usize,
}

impl BatchHandle {
    pub fn dispatched(&self) -> usize { self.jobs.len() }

    /// Duplicate identifiers that got no placeholder.
    pub fn skipped(&self) -> usize { self.skipped }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> { self.jobs.iter().map(|(id, _)| id) }

    pub async fn wait_loaded(self) -> BatchReport {
        let (ids, handles): (Vec<_>, Vec<_>) = self.jobs.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        let mut report = BatchReport::default();
        for (id, res) in ids.into_iter().zip(results) {
            match res {
                Ok(Ok(())) => report.loaded.push(id),
                Ok(Err(e)) => report.failed.push((id, e)),
                Err(join) => {
                    let e = VitrineError::Aborted { id: id.clone(), message: join.to_string() };
                    report.failed.push((id, e));
                }
            }
        }
        info!(loaded = report.loaded.len(), failed = report.failed.len(), "batch loaded");
        report
    }
}
