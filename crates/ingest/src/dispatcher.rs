//! Sequential dispatcher: drains the queue one document at a time.

use crate::config::EmptyExtractionPolicy;
use crate::error::ExtractionError;
use crate::events::QueueObserver;
use crate::extraction::InvoiceExtractor;
use crate::fields::{extraction_columns, Fields};
use crate::state::{Applied, Claim, SharedState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a call to [`Dispatcher::drain`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call ran the loop until nothing was pending
    Finished { processed: usize },
    /// Another drain was already running; this call did nothing
    AlreadyRunning,
}

/// Drives extraction for queued documents.
///
/// Cheap to clone; clones share the same state and the same running flag,
/// so at most one extraction is ever in flight no matter how many callers
/// trigger a drain.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    state: SharedState,
    extractor: Arc<dyn InvoiceExtractor>,
    observer: Arc<dyn QueueObserver>,
    columns: Arc<[String]>,
    policy: EmptyExtractionPolicy,
    running: AtomicBool,
}

/// Holds the running flag; releases it on drop, including unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(
        state: SharedState,
        extractor: Arc<dyn InvoiceExtractor>,
        observer: Arc<dyn QueueObserver>,
        policy: EmptyExtractionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                extractor,
                observer,
                columns: extraction_columns().into(),
                policy,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Whether a drain loop is active.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    /// Process pending documents in arrival order until none are left.
    ///
    /// Returns immediately with [`DrainOutcome::AlreadyRunning`] if another
    /// drain holds the queue. Extraction failures are recorded on the unit
    /// and never stop the loop; a panicking extractor fails its unit the
    /// same way. There is no timeout: a hung extraction call stalls the
    /// queue.
    pub async fn drain(&self) -> DrainOutcome {
        let mut processed = 0;
        let mut ran = false;

        loop {
            let Some(guard) = RunningGuard::acquire(&self.inner.running) else {
                break;
            };
            ran = true;
            processed += self.drain_pending().await;
            drop(guard);

            // A trigger that arrived while the flag was held was turned away;
            // pick up anything it queued. A unit left in flight blocks every
            // claim, so looping on it would never make progress.
            let more = {
                let state = self.inner.state.lock();
                state.queue.has_pending() && state.queue.in_flight().is_none()
            };
            if !more {
                break;
            }
        }

        if !ran {
            debug!("drain already running");
            return DrainOutcome::AlreadyRunning;
        }

        info!(processed, "queue drained");
        self.inner.observer.on_drain_finished(processed);
        DrainOutcome::Finished { processed }
    }

    /// Run [`drain`](Self::drain) on the runtime without waiting for it.
    pub fn spawn_drain(&self) -> JoinHandle<DrainOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.drain().await })
    }

    async fn drain_pending(&self) -> usize {
        let inner = &self.inner;
        let mut processed = 0;

        loop {
            let claim = { inner.state.lock().claim_next() };
            let Some(claim) = claim else {
                break;
            };

            info!(unit = %claim.name, "extracting");
            inner.observer.on_unit_started(&claim.id, &claim.name);

            let outcome = self.extract(&claim).await;
            let applied = { inner.state.lock().apply_outcome(&claim, outcome, inner.policy) };

            match applied {
                Applied::Done { record_ids } => {
                    processed += 1;
                    info!(unit = %claim.name, records = record_ids.len(), "extraction complete");
                    inner
                        .observer
                        .on_unit_completed(&claim.id, &claim.name, record_ids.len());
                }
                Applied::Failed { error } => {
                    processed += 1;
                    warn!(unit = %claim.name, error = %error, "extraction failed");
                    inner.observer.on_unit_failed(&claim.id, &claim.name, &error);
                }
                Applied::Stale => {}
            }
        }

        processed
    }

    /// Run one extraction on its own task so a panic becomes a failure
    /// instead of leaving the unit in flight.
    async fn extract(&self, claim: &Claim) -> Result<Vec<Fields>, ExtractionError> {
        let extractor = self.inner.extractor.clone();
        let columns = self.inner.columns.clone();
        let content = claim.content.clone();

        let task = tokio::spawn(async move { extractor.extract(&content, &columns).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(unit = %claim.name, error = %e, "extraction task aborted");
                Err(ExtractionError::Aborted(e.to_string()))
            }
        }
    }
}
