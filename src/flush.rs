use crate::aggregate::SecondBucketAggregator;
use crate::writer::RecordWriter;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The calendar date captured at process start. Output file names are pinned
/// to it for the process's lifetime; a date change is terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMarker {
    date: NaiveDate,
}

impl DayMarker {
    pub fn today() -> Self {
        Self {
            date: Local::now().date_naive(),
        }
    }

    pub fn stamp(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn has_rolled(&self, today: NaiveDate) -> bool {
        today != self.date
    }
}

/// Timer-driven flush task. On every tick it drains the aggregation table
/// into the aggregate writer, then checks for a day rollover; on rollover it
/// performs one more drain and exits, which is the terminating signal the
/// caller observes. A shutdown notification (or the sender going away) takes
/// the same final drain-and-write path from any state, so operator stops
/// never lose buckets.
pub fn spawn_flusher(
    aggregator: Arc<SecondBucketAggregator>,
    mut writer: RecordWriter,
    day: DayMarker,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_buckets(&aggregator, &mut writer);
                    if day.has_rolled(Local::now().date_naive()) {
                        tracing::info!(day = %day.stamp(), "calendar day ended; final flush");
                        flush_buckets(&aggregator, &mut writer);
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("stop requested; final flush");
                        flush_buckets(&aggregator, &mut writer);
                        break;
                    }
                }
            }
        }
    })
}

/// Drains every bucket and appends one row per second. The drained batch is
/// consumed either way: a failed row is logged and dropped, never requeued.
pub fn flush_buckets(aggregator: &SecondBucketAggregator, writer: &mut RecordWriter) {
    let drained = aggregator.drain_all();
    if drained.is_empty() {
        return;
    }

    let total = drained.len();
    let mut written = 0usize;
    for (time_key, bucket) in drained {
        let record = bucket.into_record(&time_key);
        match writer.append(&record) {
            Ok(()) => written += 1,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    time_key = %time_key,
                    "failed to write aggregate row; dropping"
                );
            }
        }
    }
    tracing::debug!(written, total, path = %writer.path().display(), "flushed aggregate rows");
}
