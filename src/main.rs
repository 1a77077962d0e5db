mod aggregate;
mod config;
mod flush;
mod ingest;
mod mqtt;
mod telemetry;
mod writer;

use crate::aggregate::SecondBucketAggregator;
use crate::config::Config;
use crate::flush::DayMarker;
use crate::ingest::MeterIngestor;
use crate::writer::{RecordWriter, AGGREGATE_COLUMNS, SUMMARY_COLUMNS};
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "meter-ingest", about = "MQTT power-meter telemetry -> daily CSV")]
struct Cli {
    /// Raise the default log level to debug (RUST_LOG still wins).
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "debug,meter_ingest=debug"
    } else {
        "info,meter_ingest=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(cli.verbose)?;

    let day = DayMarker::today();
    let stamp = day.stamp();
    let summary_writer = RecordWriter::open(config.summary_path(&stamp), SUMMARY_COLUMNS)?;
    let aggregate_writer = RecordWriter::open(config.aggregate_path(&stamp), AGGREGATE_COLUMNS)?;
    tracing::info!(
        summary = %summary_writer.path().display(),
        aggregate = %aggregate_writer.path().display(),
        "recording meter telemetry"
    );

    let aggregator = Arc::new(SecondBucketAggregator::new());
    let ingestor = MeterIngestor::new(aggregator.clone(), summary_writer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut flusher = flush::spawn_flusher(
        aggregator,
        aggregate_writer,
        day,
        config.flush_interval(),
        shutdown_rx.clone(),
    );
    let mqtt_handle = tokio::spawn(mqtt::run_listener(config, ingestor, shutdown_rx));

    let flusher_done;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            flusher_done = false;
        }
        res = &mut flusher => {
            // Day rollover: the flush task already performed the final drain.
            res?;
            flusher_done = true;
        }
    }
    let _ = shutdown_tx.send(true);
    if !flusher_done {
        // The final drain-and-write happens inside the flush task; wait for
        // it before exiting so no buckets are lost.
        flusher.await?;
    }

    match mqtt_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "mqtt listener exited with error"),
        Err(err) => tracing::warn!(error = %err, "mqtt listener task failed"),
    }
    tracing::info!("meter-ingest stopped");
    Ok(())
}
