//! Random order flow for exercising the engine.
//!
//! Each worker draws orders uniformly over the configured instruments,
//! quantities and prices, rests them, and then matches incoming buys (and
//! optionally sells) against the opposite side.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::metrics::collectors::{LatencyCollector, LatencyMicros, ThroughputStatistics};
use crate::orderbook::config::EngineConfig;
use crate::orderbook::error::{OrderBookError, OrderBookResult};
use crate::orderbook::types::{InstrumentId, Price, Quantity, Side};
use crate::orderbook::MatchingEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub orders_per_thread: usize,
    pub threads: usize,
    /// Also match incoming sells, not only buys
    pub match_sells: bool,
    /// Fixed seed for reproducible order flow; worker `n` uses `seed + n`
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            orders_per_thread: 500,
            threads: 4,
            match_sells: false,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> OrderBookResult<()> {
        if self.threads == 0 {
            return Err(OrderBookError::InvalidConfig(
                "threads must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> OrderBookResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            OrderBookError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| OrderBookError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// One randomly drawn order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomOrder {
    pub side: Side,
    pub instrument_id: InstrumentId,
    pub quantity: Quantity,
    pub price: Price,
}

impl RandomOrder {
    pub fn generate<R: Rng>(rng: &mut R, config: &EngineConfig) -> Self {
        Self {
            side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
            instrument_id: rng.gen_range(0..config.instruments),
            quantity: rng.gen_range(1..=config.max_quantity),
            price: rng.gen_range(1..=config.max_price),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub threads: usize,
    pub orders_submitted: u64,
    pub orders_rejected: u64,
    pub match_calls: u64,
    pub trades: u64,
    pub volume: u64,
    pub resting_orders: usize,
    pub elapsed: Duration,
    pub throughput: ThroughputStatistics,
    pub submit_latency: LatencyMicros,
    pub match_latency: LatencyMicros,
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    submitted: u64,
    rejected: u64,
    match_calls: u64,
    trades: u64,
    volume: u64,
    submit_latency: LatencyCollector,
    match_latency: LatencyCollector,
}

pub struct Simulator {
    engine: Arc<MatchingEngine>,
    config: SimulationConfig,
}

impl Simulator {
    pub fn new(engine: Arc<MatchingEngine>, config: SimulationConfig) -> OrderBookResult<Self> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    pub fn run(&self) -> OrderBookResult<SimulationReport> {
        info!(
            "Simulating {} orders on each of {} threads",
            self.config.orders_per_thread, self.config.threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("sim-worker-{}", i))
            .build()
            .map_err(|e| OrderBookError::SystemError(e.to_string()))?;

        let start = Instant::now();
        let outcomes: Vec<WorkerOutcome> = pool.install(|| {
            (0..self.config.threads)
                .into_par_iter()
                .map(|worker| self.run_worker(worker))
                .collect()
        });
        let elapsed = start.elapsed();

        let mut total = WorkerOutcome::default();
        for outcome in outcomes {
            total.submitted += outcome.submitted;
            total.rejected += outcome.rejected;
            total.match_calls += outcome.match_calls;
            total.trades += outcome.trades;
            total.volume += outcome.volume;
            total.submit_latency.merge(outcome.submit_latency);
            total.match_latency.merge(outcome.match_latency);
        }

        let report = SimulationReport {
            threads: self.config.threads,
            orders_submitted: total.submitted,
            orders_rejected: total.rejected,
            match_calls: total.match_calls,
            trades: total.trades,
            volume: total.volume,
            resting_orders: self.engine.registry().resting_orders(),
            elapsed,
            throughput: ThroughputStatistics::new(total.submitted + total.match_calls, elapsed),
            submit_latency: total.submit_latency.summary().to_micros(),
            match_latency: total.match_latency.summary().to_micros(),
        };

        info!(
            "Simulation done in {:?}: {} orders, {} trades, {} resting, {:.0} ops/s",
            report.elapsed,
            report.orders_submitted,
            report.trades,
            report.resting_orders,
            report.throughput.rate
        );
        Ok(report)
    }

    fn run_worker(&self, worker: usize) -> WorkerOutcome {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
            None => StdRng::from_entropy(),
        };
        let mut outcome = WorkerOutcome {
            submit_latency: LatencyCollector::with_capacity(self.config.orders_per_thread),
            ..Default::default()
        };

        for _ in 0..self.config.orders_per_thread {
            let order = RandomOrder::generate(&mut rng, self.engine.config());

            let submitted = outcome.submit_latency.time(|| {
                self.engine
                    .submit_order(order.side, order.instrument_id, order.quantity, order.price)
            });

            if let Err(e) = submitted {
                warn!("Worker {} order rejected: {}", worker, e);
                outcome.rejected += 1;
                continue;
            }
            outcome.submitted += 1;

            if order.side == Side::Sell && !self.config.match_sells {
                continue;
            }

            let matched = outcome.match_latency.time(|| {
                self.engine.match_incoming(
                    order.instrument_id,
                    order.side,
                    order.quantity,
                    order.price,
                )
            });
            outcome.match_calls += 1;

            match matched {
                Ok(result) => {
                    outcome.trades += result.trades.len() as u64;
                    outcome.volume += result.filled;
                }
                Err(e) => warn!("Worker {} match failed: {}", worker, e),
            }
        }

        outcome
    }
}
