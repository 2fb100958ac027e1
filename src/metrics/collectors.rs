use serde::Serialize;
use std::time::{Duration, Instant};

/// Collects raw latency samples and aggregates them into percentiles.
///
/// Not shared between threads: each worker keeps its own collector and the
/// results are merged once the workers are done.
#[derive(Debug, Default, Clone)]
pub struct LatencyCollector {
    samples: Vec<Duration>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Add a latency sample
    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    /// Run `f` and record how long it took
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(start.elapsed());
        result
    }

    /// Absorb the samples of another collector
    pub fn merge(&mut self, other: LatencyCollector) {
        self.samples.extend(other.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn summary(&self) -> LatencyStatistics {
        if self.samples.is_empty() {
            return LatencyStatistics::default();
        }

        let mut sorted_samples = self.samples.clone();
        sorted_samples.sort_unstable();

        let len = sorted_samples.len();
        let percentile = |p: f64| sorted_samples[((len as f64 * p) as usize).min(len - 1)];

        let total_nanos: u128 = sorted_samples.iter().map(Duration::as_nanos).sum();
        let mean_nanos = total_nanos / len as u128;

        LatencyStatistics {
            count: len as u64,
            min: sorted_samples[0],
            max: sorted_samples[len - 1],
            mean: Duration::from_nanos(mean_nanos as u64),
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
            p999: percentile(0.999),
        }
    }
}

/// Aggregated latency statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStatistics {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub p999: Duration,
}

impl LatencyStatistics {
    /// Convert to microseconds for easier reading
    pub fn to_micros(&self) -> LatencyMicros {
        let micros = |d: Duration| d.as_nanos() as f64 / 1_000.0;
        LatencyMicros {
            count: self.count,
            min: micros(self.min),
            max: micros(self.max),
            mean: micros(self.mean),
            p50: micros(self.p50),
            p95: micros(self.p95),
            p99: micros(self.p99),
            p999: micros(self.p999),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyMicros {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Throughput over a measured interval
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThroughputStatistics {
    pub operations: u64,
    pub rate: f64,
    pub interval: Duration,
}

impl ThroughputStatistics {
    pub fn new(operations: u64, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        let rate = if secs > 0.0 {
            operations as f64 / secs
        } else {
            0.0
        };
        Self {
            operations,
            rate,
            interval,
        }
    }
}
