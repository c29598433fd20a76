//! One-shot readiness gate: work that needs the engine is buffered until
//! initialization completes, then drained in submission order.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vitrine_core::{Engine, Initializer};

use crate::lock;

/// Work waiting for the engine.
struct Deferred<E: ?Sized>(Box<dyn FnOnce(&E) + Send + 'static>);

enum GateState<E: ?Sized> {
    Pending(Vec<Deferred<E>>),
    /// Ready has been signalled but the buffer is still being executed.
    /// New submissions keep queueing behind the buffered ones.
    Draining { engine: Arc<E>, queue: Vec<Deferred<E>> },
    Ready(Arc<E>),
}

pub struct ReadinessGate<E: ?Sized = dyn Engine> {
    state: Mutex<GateState<E>>,
}

impl<E: ?Sized> Default for ReadinessGate<E> {
    fn default() -> Self { Self { state: Mutex::new(GateState::Pending(Vec::new())) } }
}

impl<E: ?Sized + Send + Sync + 'static> ReadinessGate<E> {
    pub fn new() -> Self { Self::default() }

    pub fn is_ready(&self) -> bool {
        matches!(&*lock(&self.state), GateState::Ready(_))
    }

    /// Number of actions waiting for readiness.
    pub fn pending(&self) -> usize {
        match &*lock(&self.state) {
            GateState::Pending(q) => q.len(),
            GateState::Draining { queue, .. } => queue.len(),
            GateState::Ready(_) => 0,
        }
    }

    /// Run `action` now if the engine is ready, otherwise buffer it.
    /// The action never runs with the gate lock held, so it may submit more work.
    pub fn defer_or_run<F>(&self, action: F)
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let engine = {
            let mut st = lock(&self.state);
            match &mut *st {
                GateState::Pending(queue) | GateState::Draining { queue, .. } => {
                    queue.push(Deferred(Box::new(action)));
                    return;
                }
                GateState::Ready(engine) => Arc::clone(engine),
            }
        };
        action(&*engine);
    }

    /// Transition to Ready and drain buffered actions in order.
    /// Returns false if the gate was already opened; the call is then a no-op.
    pub fn mark_ready(&self, engine: Arc<E>) -> bool {
        let mut batch = {
            let mut st = lock(&self.state);
            match std::mem::replace(
                &mut *st,
                GateState::Draining { engine: Arc::clone(&engine), queue: Vec::new() },
            ) {
                GateState::Pending(queue) => queue,
                previous => {
                    *st = previous;
                    warn!("readiness gate already opened; ignoring second mark_ready");
                    return false;
                }
            }
        };
        info!(deferred = batch.len(), "readiness gate opened");
        let mut drained = 0usize;
        loop {
            for Deferred(action) in batch.drain(..) {
                // A panicking action must not leave the gate Draining.
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| action(&*engine))) {
                    error!(reason = %panic_reason(&*panic), "deferred action panicked; continuing drain");
                }
                drained += 1;
            }
            let mut st = lock(&self.state);
            match &mut *st {
                GateState::Draining { queue, .. } if !queue.is_empty() => {
                    batch = std::mem::take(queue);
                }
                _ => {
                    *st = GateState::Ready(Arc::clone(&engine));
                    break;
                }
            }
        }
        debug!(drained, "deferred actions drained");
        true
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return s;
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s;
    }
    "unknown panic"
}

/// Run the one-shot initialization and open the gate when it resolves.
/// On failure the gate stays pending and buffered work never runs.
pub fn spawn_initializer(
    gate: Arc<ReadinessGate>,
    init: Arc<dyn Initializer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let t0 = Instant::now();
        match init.initialize().await {
            Ok(engine) => {
                info!(took_ms = %t0.elapsed().as_millis(), "engine initialized");
                gate.mark_ready(engine);
            }
            Err(e) => {
                error!(error = %e, pending = gate.pending(), "engine initialization failed");
            }
        }
    })
}
