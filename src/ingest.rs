use crate::aggregate::SecondBucketAggregator;
use crate::telemetry::{classify, decode_payload, MeterPayload, PayloadKind};
use crate::writer::RecordWriter;
use anyhow::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Routes decoded meter messages: summaries go straight to the summary
/// writer, raw samples are merged into the per-second table for the flush
/// task to persist.
#[derive(Clone)]
pub struct MeterIngestor {
    aggregator: Arc<SecondBucketAggregator>,
    summary_writer: Arc<Mutex<RecordWriter>>,
}

impl MeterIngestor {
    pub fn new(aggregator: Arc<SecondBucketAggregator>, summary_writer: RecordWriter) -> Self {
        Self {
            aggregator,
            summary_writer: Arc::new(Mutex::new(summary_writer)),
        }
    }

    /// Handles one raw message payload. Returns an error only when the
    /// payload does not decode; the transport logs it and drops the message.
    /// Storage faults on the summary path are handled here: the record is
    /// dropped and the error logged, ingestion continues.
    pub fn handle_payload(&self, payload: &mut [u8]) -> Result<()> {
        let parsed = decode_payload(payload)?;
        match classify(&parsed.fields) {
            PayloadKind::Summary => self.write_summary(parsed),
            PayloadKind::RawSample => self.aggregator.merge(&parsed.time, parsed.fields),
        }
        Ok(())
    }

    fn write_summary(&self, payload: MeterPayload) {
        let time = payload.time;
        let mut record = payload.fields;
        record.insert("Time".to_string(), Value::String(time.clone()));

        let mut writer = match self.summary_writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writer.append(&record) {
            tracing::warn!(error = %err, time = %time, "failed to write summary row; dropping");
        }
    }
}
