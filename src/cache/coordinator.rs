//! Background analysis coordinator
//!
//! Every lookup goes through [`JobCoordinator::resolve`], which either
//! serves the cached entry or schedules a new analysis and returns at once.
//!
//! # Locking
//!
//! One mutex guards both the result store and the in-flight job table.
//! It is never held across an `.await`.
//!
//! # Job rules
//!
//! - At most one analysis runs per image. A lookup that finds the entry
//!   missing or expired while a job is still running observes that job
//!   instead of starting another one.
//! - A finished job writes its outcome by key, but only into the entry it
//!   owns (same job id) or into an empty slot. Results of superseded jobs
//!   are dropped.
//! - A panicking analysis is recorded as a failure. An in-progress entry
//!   whose job is gone is treated as missing.

use crate::analysis::{Analyzer, ImageAnalysis};
use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::{Entry, EntryStatus, Resolution};
use crate::cache::store::ResultCache;
use crate::config::schema::CacheConfig;
use crate::error::{StrataError, StrataResult};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Record of a running analysis
struct Job {
    id: Uuid,
    started_at: DateTime<Utc>,
    done: watch::Receiver<bool>,
    abort: AbortHandle,
}

struct Ledger {
    entries: ResultCache<Entry>,
    jobs: HashMap<String, Job>,
}

struct Inner {
    analyzer: Arc<dyn Analyzer>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    ledger: Mutex<Ledger>,
}

/// Serves cached analyses and schedules new ones
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

impl JobCoordinator {
    /// Create a coordinator using the wall clock
    pub fn new(analyzer: Arc<dyn Analyzer>, config: &CacheConfig) -> Self {
        Self::with_clock(analyzer, config, Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit time source
    pub fn with_clock(
        analyzer: Arc<dyn Analyzer>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                analyzer,
                clock,
                ttl: config.ttl(),
                ledger: Mutex::new(Ledger {
                    entries: ResultCache::new(config.capacity),
                    jobs: HashMap::new(),
                }),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Resolve an image, scheduling its analysis when needed
    ///
    /// Never waits for the analysis. Must be called within a Tokio runtime.
    pub fn resolve(&self, image: &str) -> Resolution {
        let now = self.inner.clock.now();
        let mut guard = self.inner.ledger.lock();
        let ledger = &mut *guard;

        if let Some(entry) = ledger.entries.get(image) {
            if !entry.is_fresh(now, self.inner.ttl) {
                debug!(image, created_at = %entry.created_at(), "Cache entry expired");
            } else if is_orphaned(entry, ledger.jobs.get(image)) {
                warn!(image, job = %entry.job_id(), "Analysis ended without a result, rescheduling");
            } else {
                debug!(image, status = ?entry.status(), "Cache hit");
                return entry.resolution();
            }
        }

        // A task that ended while still registered died before completing
        if ledger.jobs.get(image).is_some_and(|job| job.abort.is_finished()) {
            warn!(image, "Analysis task ended without a result");
            ledger.jobs.remove(image);
        }

        if let Some(job) = ledger.jobs.get(image) {
            let owned = ledger
                .entries
                .peek(image)
                .is_some_and(|entry| entry.job_id() == job.id);
            if !owned {
                let placeholder = Entry::in_progress(job.id, job.started_at);
                if let Some((evicted, _)) = ledger.entries.put(image, placeholder) {
                    debug!(image, evicted = %evicted, "Evicted cache entry");
                }
            }
            debug!(image, job = %job.id, "Analysis already running");
            return Resolution::Pending;
        }

        let job_id = Uuid::new_v4();
        if let Some((evicted, _)) = ledger.entries.put(image, Entry::in_progress(job_id, now)) {
            debug!(image, evicted = %evicted, "Evicted cache entry");
        }

        let (done_tx, done_rx) = watch::channel(false);
        let handle = tokio::spawn(run_job(
            Arc::clone(&self.inner),
            image.to_string(),
            job_id,
            now,
            done_tx,
        ));
        ledger.jobs.insert(
            image.to_string(),
            Job {
                id: job_id,
                started_at: now,
                done: done_rx,
                abort: handle.abort_handle(),
            },
        );
        info!(image, job = %job_id, "Scheduled analysis");

        Resolution::Pending
    }

    /// Current resolution of a fresh entry, without scheduling anything
    pub fn lookup(&self, image: &str) -> Option<Resolution> {
        let now = self.inner.clock.now();
        let mut ledger = self.inner.ledger.lock();
        ledger
            .entries
            .get(image)
            .filter(|entry| entry.is_fresh(now, self.inner.ttl))
            .map(Entry::resolution)
    }

    /// Wait for the running analysis of an image, if any, then look it up
    pub async fn wait(&self, image: &str) -> Option<Resolution> {
        let done = self
            .inner
            .ledger
            .lock()
            .jobs
            .get(image)
            .map(|job| job.done.clone());

        if let Some(mut done) = done {
            // A dropped sender means the job was aborted
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.lookup(image)
    }

    /// Snapshot of all fresh entries, keyed by image
    pub fn snapshot(&self) -> BTreeMap<String, Entry> {
        let now = self.inner.clock.now();
        let ledger = self.inner.ledger.lock();
        ledger
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_fresh(now, self.inner.ttl))
            .map(|(image, entry)| (image.clone(), entry.clone()))
            .collect()
    }

    /// Number of analyses currently running
    pub fn in_flight(&self) -> usize {
        self.inner.ledger.lock().jobs.len()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.inner.ledger.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every running analysis
    pub fn shutdown(&self) {
        let mut ledger = self.inner.ledger.lock();
        for (image, job) in ledger.jobs.drain() {
            debug!(image = %image, job = %job.id, "Aborting analysis");
            job.abort.abort();
        }
    }
}

/// An in-progress entry whose job is gone can never complete
fn is_orphaned(entry: &Entry, job: Option<&Job>) -> bool {
    entry.status() == EntryStatus::InProgress
        && !job.is_some_and(|job| job.id == entry.job_id() && !job.abort.is_finished())
}

async fn run_job(
    inner: Arc<Inner>,
    image: String,
    job_id: Uuid,
    created_at: DateTime<Utc>,
    done: watch::Sender<bool>,
) {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(inner.analyzer.analyze(&image))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(StrataError::Internal(format!("analysis of {} panicked", image))));
    let duration = started.elapsed();

    match &outcome {
        Ok(analysis) => info!(
            image = %image,
            job = %job_id,
            layers = analysis.layer_count,
            duration_ms = duration.as_millis() as u64,
            "Analysis finished"
        ),
        Err(e) => error!(
            image = %image,
            job = %job_id,
            duration_ms = duration.as_millis() as u64,
            error = %e,
            "Analysis failed"
        ),
    }

    inner.complete(&image, job_id, created_at, outcome, duration);
    let _ = done.send(true);
}

impl Inner {
    fn complete(
        &self,
        image: &str,
        job_id: Uuid,
        created_at: DateTime<Utc>,
        outcome: StrataResult<ImageAnalysis>,
        duration: Duration,
    ) {
        let mut guard = self.ledger.lock();
        let ledger = &mut *guard;

        if ledger.jobs.get(image).is_some_and(|job| job.id == job_id) {
            ledger.jobs.remove(image);
        }

        match ledger.entries.get_mut(image) {
            Some(entry) if entry.job_id() == job_id => {
                entry.complete(outcome, duration);
            }
            Some(entry) => {
                debug!(
                    image,
                    job = %job_id,
                    current = %entry.job_id(),
                    "Discarding result of superseded analysis"
                );
            }
            None => {
                let mut entry = Entry::in_progress(job_id, created_at);
                entry.complete(outcome, duration);
                if let Some((evicted, _)) = ledger.entries.put(image, entry) {
                    debug!(image, evicted = %evicted, "Evicted cache entry");
                }
            }
        }
    }
}
