//! Metrics collection for the priority executor.

use crate::util::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use hdrhistogram::Histogram;
#[cfg(feature = "telemetry")]
use parking_lot::RwLock;

#[derive(Debug)]
pub struct Metrics {
    // Submission counters
    submitted: AtomicU64,
    rejected: AtomicU64,
    targeted: AtomicU64,
    retired_on: AtomicU64,
    peak_queue_depth: AtomicU64,

    // Execution counters
    executed: AtomicU64,
    inline_runs: AtomicU64,
    per_worker: Vec<CachePadded<AtomicU64>>,

    #[cfg(feature = "telemetry")]
    latency_histogram: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new(num_workers: usize) -> Self {
        Self {
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            targeted: AtomicU64::new(0),
            retired_on: AtomicU64::new(0),
            peak_queue_depth: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            inline_runs: AtomicU64::new(0),
            per_worker: (0..num_workers)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            // 3 significant figures, max one hour in nanoseconds
            #[cfg(feature = "telemetry")]
            latency_histogram: RwLock::new(
                Histogram::new_with_max(3_600_000_000_000, 3).expect("valid histogram bounds"),
            ),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self, count: u64, queue_depth: usize) {
        self.submitted.fetch_add(count, Ordering::Relaxed);
        self.peak_queue_depth
            .fetch_max(queue_depth as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, count: u64) {
        self.rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_targeted(&self) {
        self.targeted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a `retire_on` delivery. Also counted as targeted.
    pub fn record_retired_on(&self) {
        self.retired_on.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one finished `run`. `worker` is `None` off the pool threads.
    pub fn record_execution(&self, worker: Option<usize>, inline: bool, duration: Duration) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if inline {
            self.inline_runs.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(counter) = worker.and_then(|id| self.per_worker.get(id)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "telemetry")]
        if let Some(mut hist) = self.latency_histogram.try_write() {
            let _ = hist.record(duration.as_nanos() as u64);
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = duration;
    }

    /// `panicked` comes from the executor's panic handler, which owns that
    /// count.
    pub fn snapshot(&self, panicked: u64) -> MetricsSnapshot {
        #[cfg(feature = "telemetry")]
        let (p50, p99, max) = {
            let hist = self.latency_histogram.read();
            (
                hist.value_at_quantile(0.50),
                hist.value_at_quantile(0.99),
                hist.max(),
            )
        };
        #[cfg(not(feature = "telemetry"))]
        let (p50, p99, max) = (0, 0, 0);

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            items_submitted: self.submitted.load(Ordering::Relaxed),
            items_rejected: self.rejected.load(Ordering::Relaxed),
            targeted_jobs: self.targeted.load(Ordering::Relaxed),
            retired_on: self.retired_on.load(Ordering::Relaxed),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
            items_executed: self.executed.load(Ordering::Relaxed),
            inline_runs: self.inline_runs.load(Ordering::Relaxed),
            tasks_panicked: panicked,
            per_worker_executed: self
                .per_worker
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            p50_run_ns: p50,
            p99_run_ns: p99,
            max_run_ns: max,
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub items_submitted: u64,
    pub items_rejected: u64,
    pub targeted_jobs: u64,
    pub retired_on: u64,
    pub peak_queue_depth: u64,
    /// `run` calls, on workers and inline.
    pub items_executed: u64,
    /// The subset of `items_executed` that ran on the submitter's thread.
    pub inline_runs: u64,
    pub tasks_panicked: u64,
    pub per_worker_executed: Vec<u64>,
    pub p50_run_ns: u64,
    pub p99_run_ns: u64,
    pub max_run_ns: u64,
}

impl MetricsSnapshot {
    pub fn items_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.items_executed as f64 / seconds
    }
}
