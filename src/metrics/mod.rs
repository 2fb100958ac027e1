use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::info;

pub mod collectors;

/// Metrics collector for matching engine operations
#[derive(Debug)]
pub struct EngineMetrics {
    // Latency tracking
    submit_latency: LatencyTracker,
    match_latency: LatencyTracker,

    // Throughput counters
    orders_submitted: AtomicU64,
    orders_rejected: AtomicU64,
    orders_requeued: AtomicU64,
    match_calls: AtomicU64,
    trades_executed: AtomicU64,
    lost_races: AtomicU64,

    // Volume tracking
    total_volume: AtomicU64,
    total_notional: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        // Register metric descriptions
        describe_counter!("engine_orders_total", "Total number of orders processed");
        describe_counter!("engine_trades_total", "Total number of trades executed");
        describe_counter!(
            "engine_lost_races_total",
            "Removals lost to a concurrent matcher"
        );
        describe_counter!(
            "engine_cas_retries_total",
            "Compare-and-swap retries inside the order lists"
        );
        describe_histogram!(
            "engine_operation_duration_seconds",
            "Duration of engine operations"
        );
        describe_gauge!("engine_resting_orders", "Resting orders across all books");

        Self {
            submit_latency: LatencyTracker::new("submit_order"),
            match_latency: LatencyTracker::new("match_incoming"),
            orders_submitted: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
            orders_requeued: AtomicU64::new(0),
            match_calls: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            lost_races: AtomicU64::new(0),
            total_volume: AtomicU64::new(0),
            total_notional: AtomicU64::new(0),
        }
    }

    // Latency measurement methods
    pub fn time_submit<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.submit_latency.time(f)
    }

    pub fn time_match<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.match_latency.time(f)
    }

    // Counter methods
    pub fn increment_orders_submitted(&self) {
        self.orders_submitted.fetch_add(1, Ordering::Relaxed);
        counter!("engine_orders_total", "operation" => "submit").increment(1);
    }

    pub fn increment_orders_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("engine_orders_total", "operation" => "reject").increment(1);
    }

    pub fn increment_orders_requeued(&self) {
        self.orders_requeued.fetch_add(1, Ordering::Relaxed);
        counter!("engine_orders_total", "operation" => "requeue").increment(1);
    }

    pub fn increment_match_calls(&self) {
        self.match_calls.fetch_add(1, Ordering::Relaxed);
        counter!("engine_orders_total", "operation" => "match").increment(1);
    }

    pub fn increment_trades_executed(&self, quantity: u64, notional: u64) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
        self.total_volume.fetch_add(quantity, Ordering::Relaxed);
        self.total_notional.fetch_add(notional, Ordering::Relaxed);

        counter!("engine_trades_total").increment(1);
        counter!("engine_volume_total").increment(quantity);
        counter!("engine_notional_total").increment(notional);
    }

    pub fn increment_lost_races(&self) {
        self.lost_races.fetch_add(1, Ordering::Relaxed);
        counter!("engine_lost_races_total").increment(1);
    }

    pub fn set_resting_orders(&self, count: u64) {
        gauge!("engine_resting_orders").set(count as f64);
    }

    // Getters for current values
    pub fn get_orders_submitted(&self) -> u64 {
        self.orders_submitted.load(Ordering::Relaxed)
    }

    pub fn get_orders_rejected(&self) -> u64 {
        self.orders_rejected.load(Ordering::Relaxed)
    }

    pub fn get_orders_requeued(&self) -> u64 {
        self.orders_requeued.load(Ordering::Relaxed)
    }

    pub fn get_match_calls(&self) -> u64 {
        self.match_calls.load(Ordering::Relaxed)
    }

    pub fn get_trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    pub fn get_lost_races(&self) -> u64 {
        self.lost_races.load(Ordering::Relaxed)
    }

    pub fn get_total_volume(&self) -> u64 {
        self.total_volume.load(Ordering::Relaxed)
    }

    pub fn get_total_notional(&self) -> u64 {
        self.total_notional.load(Ordering::Relaxed)
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        LatencyStats {
            submit_order: self.submit_latency.get_stats(),
            match_incoming: self.match_latency.get_stats(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency tracker for individual operations
#[derive(Debug)]
struct LatencyTracker {
    operation: &'static str,
    samples: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyTracker {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        self.record_latency(duration);
        result
    }

    fn record_latency(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);

        histogram!("engine_operation_duration_seconds", "operation" => self.operation)
            .record(duration.as_secs_f64());
    }

    fn get_stats(&self) -> OperationLatencyStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let total = self.total_nanos.load(Ordering::Relaxed);
        let min = self.min_nanos.load(Ordering::Relaxed);
        let max = self.max_nanos.load(Ordering::Relaxed);

        let avg = if samples > 0 { total / samples } else { 0 };

        OperationLatencyStats {
            operation: self.operation.to_string(),
            samples,
            avg_nanos: avg,
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub submit_order: OperationLatencyStats,
    pub match_incoming: OperationLatencyStats,
}

#[derive(Debug, Clone)]
pub struct OperationLatencyStats {
    pub operation: String,
    pub samples: u64,
    pub avg_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl OperationLatencyStats {
    pub fn avg_micros(&self) -> f64 {
        self.avg_nanos as f64 / 1_000.0
    }

    pub fn min_micros(&self) -> f64 {
        self.min_nanos as f64 / 1_000.0
    }

    pub fn max_micros(&self) -> f64 {
        self.max_nanos as f64 / 1_000.0
    }
}

/// Background metrics reporter
pub struct MetricsReporter {
    metrics: Arc<EngineMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<EngineMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    pub async fn run(&self) {
        let mut interval = interval(self.interval);

        loop {
            interval.tick().await;
            self.report();
        }
    }

    /// Log one summary line
    pub fn report(&self) -> String {
        let stats = self.metrics.get_latency_stats();

        let line = format!(
            "Engine Metrics - Orders: +{} !{} ~{} | Matches: {} | Trades: {} | Lost races: {} | Latency (μs): submit={:.2} match={:.2}",
            self.metrics.get_orders_submitted(),
            self.metrics.get_orders_rejected(),
            self.metrics.get_orders_requeued(),
            self.metrics.get_match_calls(),
            self.metrics.get_trades_executed(),
            self.metrics.get_lost_races(),
            stats.submit_order.avg_micros(),
            stats.match_incoming.avg_micros(),
        );
        info!("{}", line);
        line
    }
}
