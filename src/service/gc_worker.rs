//! Background GC worker
//!
//! A single task drains the trigger channel and runs one reconciliation pass
//! per signal. The pass itself runs on the blocking pool and is awaited before
//! the next signal is taken, so two passes never overlap. Failures end only
//! the current pass; the next signal starts a fresh one.

use crate::logging;
use crate::service::trigger::GcSignals;
use crate::storage::{PassSummary, Reconciler};
use crate::telemetry;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum GcOutcome {
    Finished(PassSummary),
    Aborted(String),
}

/// Record of one GC pass
#[derive(Debug, Clone)]
pub struct GcReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: GcOutcome,
}

/// Pass counters and the most recent report, shared with the rest of the process
#[derive(Debug)]
pub struct GcStats {
    finished: AtomicU64,
    aborted: AtomicU64,
    last: watch::Sender<Option<GcReport>>,
}

impl Default for GcStats {
    fn default() -> Self {
        let (last, _) = watch::channel(None);
        Self {
            finished: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            last,
        }
    }
}

impl GcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn passes(&self) -> u64 {
        self.finished() + self.aborted()
    }

    pub fn last_report(&self) -> Option<GcReport> {
        self.last.borrow().clone()
    }

    /// Subscribes to reports; the receiver sees every later pass
    pub fn subscribe(&self) -> watch::Receiver<Option<GcReport>> {
        self.last.subscribe()
    }

    fn publish(&self, report: GcReport) {
        match report.outcome {
            GcOutcome::Finished(_) => self.finished.fetch_add(1, Ordering::SeqCst),
            GcOutcome::Aborted(_) => self.aborted.fetch_add(1, Ordering::SeqCst),
        };
        self.last.send_replace(Some(report));
    }
}

/// The single consumer of GC trigger signals
pub struct GcWorker {
    reconciler: Reconciler,
    stats: Arc<GcStats>,
    signals: GcSignals,
}

impl GcWorker {
    pub fn new(reconciler: Reconciler, stats: Arc<GcStats>, signals: GcSignals) -> Self {
        Self {
            reconciler,
            stats,
            signals,
        }
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(mut self) -> JoinHandle<()> {
        info!("Starting GC worker for {}", self.reconciler.root().display());
        tokio::spawn(async move {
            while self.signals.recv().await.is_some() {
                let report = run_pass(self.reconciler.clone()).await;
                telemetry::record_gc(&report);
                self.stats.publish(report);
            }
            info!("GC worker stopped");
        })
    }
}

async fn run_pass(reconciler: Reconciler) -> GcReport {
    info!("GC started");
    let started_at = Utc::now();
    let start = Instant::now();

    let result = tokio::task::spawn_blocking(move || {
        logging::with_request_context("gc", || reconciler.run_pass())
    })
    .await;
    let elapsed = start.elapsed();

    let outcome = match result {
        Ok(Ok(summary)) => {
            info!(
                "GC has finished in {:?}: {} confirmed, {} resurrected, {} orphaned",
                elapsed, summary.confirmed, summary.resurrected, summary.orphaned
            );
            GcOutcome::Finished(summary)
        }
        Ok(Err(e)) => {
            error!("GC has aborted in {:?} with error: {}", elapsed, e);
            GcOutcome::Aborted(e.to_string())
        }
        Err(e) => {
            error!("GC has aborted in {:?}; pass task failed: {}", elapsed, e);
            GcOutcome::Aborted(e.to_string())
        }
    };

    GcReport {
        started_at,
        elapsed,
        outcome,
    }
}
