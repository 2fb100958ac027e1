//! Order Flow Simulator
//!
//! Drives the matching engine with random orders from several threads while a
//! background reporter logs engine metrics.
//!
//! Usage: `simulator [orders_per_thread] [threads] [engine_config.json]`
//!
//! `SIMULATION_CONFIG` may point at a JSON file with the simulation defaults
//! (seed, `match_sells`, ...); positional arguments override its counts.
//! Set `PROMETHEUS=1` to install the Prometheus exporter, and `RUST_LOG` to
//! change verbosity (`RUST_LOG=warn` silences the per-trade lines).

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lockfree_matching_engine::{
    metrics::MetricsReporter,
    orderbook::LoggingSink,
    simulation::{SimulationConfig, Simulator},
    EngineConfig, EngineMetrics, MatchingEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting order flow simulator...");

    let mut args = std::env::args().skip(1);
    let defaults = match std::env::var("SIMULATION_CONFIG") {
        Ok(path) => SimulationConfig::from_file(path)?,
        Err(_) => SimulationConfig::default(),
    };
    let sim_config = SimulationConfig {
        orders_per_thread: parse_arg(args.next(), defaults.orders_per_thread)?,
        threads: parse_arg(args.next(), defaults.threads)?,
        ..defaults
    };
    let engine_config = match args.next() {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if std::env::var("PROMETHEUS").is_ok_and(|v| v == "1") {
        if let Err(e) = start_metrics_exporter() {
            error!("Failed to start metrics exporter: {}", e);
        }
    }

    let metrics = Arc::new(EngineMetrics::new());
    let engine = Arc::new(
        MatchingEngine::new(engine_config, Arc::new(LoggingSink))?.with_metrics(Arc::clone(&metrics)),
    );

    // Start metrics reporting
    let reporter = MetricsReporter::new(Arc::clone(&metrics), Duration::from_secs(1));
    let reporter_task = tokio::spawn(async move {
        reporter.run().await;
    });

    let simulator = Simulator::new(Arc::clone(&engine), sim_config)?;
    let report = tokio::task::spawn_blocking(move || simulator.run()).await??;

    reporter_task.abort();
    MetricsReporter::new(metrics, Duration::from_secs(1)).report();

    let stats = engine.stats();
    info!(
        "Final stats: {} orders, {} trades, {} volume, {} resting, {} lost races",
        stats.orders_submitted,
        stats.trades_executed,
        stats.total_volume,
        stats.resting_orders,
        stats.lost_races
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn parse_arg(arg: Option<String>, default: usize) -> Result<usize, std::num::ParseIntError> {
    arg.map_or(Ok(default), |a| a.parse())
}

/// Install the Prometheus recorder and its scrape endpoint
fn start_metrics_exporter() -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr: SocketAddr = "0.0.0.0:9090".parse()?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!(
        "Prometheus metrics available at http://{}/metrics",
        addr
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg(None, 500).unwrap(), 500);
        assert_eq!(parse_arg(Some("42".to_string()), 500).unwrap(), 42);
        assert!(parse_arg(Some("many".to_string()), 500).is_err());
    }
}
