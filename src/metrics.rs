// src/metrics.rs
//
// Pipeline counters. Cheap atomics, cloned freely across the loop and the
// submission task; a summary is logged at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_processed: Arc<AtomicU64>,
    pub vehicles_seen: Arc<AtomicU64>,
    pub reads_accepted: Arc<AtomicU64>,
    pub plates_finalized: Arc<AtomicU64>,
    pub exits_without_plate: Arc<AtomicU64>,
    pub api_successes: Arc<AtomicU64>,
    pub api_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: Arc::new(AtomicU64::new(0)),
            vehicles_seen: Arc::new(AtomicU64::new(0)),
            reads_accepted: Arc::new(AtomicU64::new(0)),
            plates_finalized: Arc::new(AtomicU64::new(0)),
            exits_without_plate: Arc::new(AtomicU64::new(0)),
            api_successes: Arc::new(AtomicU64::new(0)),
            api_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn incr(counter: &Arc<AtomicU64>) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        info!(
            frames = self.frames_processed.load(Ordering::Relaxed),
            vehicles = self.vehicles_seen.load(Ordering::Relaxed),
            reads = self.reads_accepted.load(Ordering::Relaxed),
            finalized = self.plates_finalized.load(Ordering::Relaxed),
            no_plate_exits = self.exits_without_plate.load(Ordering::Relaxed),
            api_ok = self.api_successes.load(Ordering::Relaxed),
            api_err = self.api_failures.load(Ordering::Relaxed),
            elapsed_s = %format!("{elapsed:.1}"),
            "pipeline summary"
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
