//! Session observability: ids, latency windows (p50/p95/p99) and counters
//! for the ingest, dispatch and relief paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

/// Identifiers attached to everything a session logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIds {
    pub session_id: String,
    /// Incremented on every start_session within one `Session`.
    pub epoch: u64,
}

impl SessionIds {
    pub fn new(epoch: u64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            epoch,
        }
    }
}

/// Measures one pass through a hot path; recorded on `finish`.
/// Dropping without finishing records nothing (early-exit paths).
pub struct LatencySpan {
    metric: &'static str,
    started: Instant,
    registry: Arc<MetricsRegistry>,
}

impl LatencySpan {
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.registry.record(self.metric, elapsed);
        elapsed
    }
}

/// The most recent latencies of one metric, oldest first.
struct LatencyWindow {
    samples_us: VecDeque<u64>,
    limit: usize,
}

impl LatencyWindow {
    fn new(limit: usize) -> Self {
        Self {
            samples_us: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn push(&mut self, value_us: u64) {
        if self.samples_us.len() == self.limit {
            self.samples_us.pop_front();
        }
        self.samples_us.push_back(value_us);
    }

    /// Nearest-rank percentile over a sorted copy; 0 when empty.
    fn percentile(&self, p: f64) -> u64 {
        let n = self.samples_us.len();
        if n == 0 {
            return 0;
        }
        let mut sorted: Vec<u64> = self.samples_us.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
        sorted[rank.clamp(1, n) - 1]
    }

    fn summary(&self) -> LatencySummary {
        LatencySummary {
            p50_us: self.percentile(50.0),
            p95_us: self.percentile(95.0),
            p99_us: self.percentile(99.0),
            samples: self.samples_us.len(),
        }
    }
}

#[derive(Default)]
struct Inner {
    latencies: HashMap<&'static str, LatencyWindow>,
    counters: HashMap<&'static str, u64>,
}

pub struct MetricsRegistry {
    inner: Mutex<Inner>,
    window_limit: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(512)
    }

    /// Keep at most `window_limit` latencies per metric.
    pub fn with_window(window_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            window_limit: window_limit.max(1),
        }
    }

    pub fn record(&self, metric: &'static str, elapsed: Duration) {
        let value_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let limit = self.window_limit;
        self.inner
            .lock()
            .latencies
            .entry(metric)
            .or_insert_with(|| LatencyWindow::new(limit))
            .push(value_us);
        trace!(metric, value_us, "latency_recorded");
    }

    pub fn incr(&self, counter: &'static str) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: &'static str, n: u64) {
        *self.inner.lock().counters.entry(counter).or_insert(0) += n;
    }

    pub fn count(&self, counter: &str) -> u64 {
        self.inner.lock().counters.get(counter).copied().unwrap_or(0)
    }

    pub fn span(self: &Arc<Self>, metric: &'static str) -> LatencySpan {
        LatencySpan {
            metric,
            started: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Percentile (0-100) of a latency metric in microseconds.
    pub fn percentile(&self, metric: &str, p: f64) -> u64 {
        self.inner
            .lock()
            .latencies
            .get(metric)
            .map_or(0, |window| window.percentile(p))
    }

    pub fn summary(&self) -> HashMap<String, LatencySummary> {
        self.inner
            .lock()
            .latencies
            .iter()
            .map(|(metric, window)| (metric.to_string(), window.summary()))
            .collect()
    }

    pub fn counters(&self) -> HashMap<String, u64> {
        self.inner
            .lock()
            .counters
            .iter()
            .map(|(name, n)| (name.to_string(), *n))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub samples: usize,
}

pub mod metric_names {
    pub const EXPRESSION_INGEST: &str = "t_expression_ingest";
    pub const TRANSCRIPT_INGEST: &str = "t_transcript_ingest";
    pub const ACTIVATION_DISPATCH: &str = "t_activation_dispatch";
    pub const RELIEF_TICK: &str = "t_relief_tick";

    pub const SAMPLES_DROPPED: &str = "samples_dropped";
    pub const FRAGMENTS_DROPPED: &str = "fragments_dropped";
    pub const EFFECTS_SUPPRESSED: &str = "effects_suppressed";
}
