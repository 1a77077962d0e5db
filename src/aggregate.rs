use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Accumulated state for one second of raw samples: the merged field set and
/// the number of messages that contributed to it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SecondBucket {
    pub fields: Map<String, Value>,
    pub samples: u64,
}

impl SecondBucket {
    /// Builds the aggregate CSV record: all merged fields, `Time` with the
    /// ISO `T` separator replaced by a space, and the trailing message count.
    pub fn into_record(self, time_key: &str) -> Map<String, Value> {
        let mut record = self.fields;
        record.insert(
            "Time".to_string(),
            Value::String(time_key.replacen('T', " ", 1)),
        );
        record.insert("count".to_string(), Value::from(self.samples));
        record
    }
}

/// Per-second accumulation table shared between the ingest path and the
/// flush task. Coarse interior lock; neither operation touches I/O while
/// holding it. Keys are the meter's second-resolution timestamp strings, so
/// the ordered map drains in chronological order within a day.
#[derive(Debug, Default)]
pub struct SecondBucketAggregator {
    buckets: Mutex<BTreeMap<String, SecondBucket>>,
}

impl SecondBucketAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays `fields` onto the bucket for `time_key`, creating it if
    /// absent. New values replace old ones per field name; fields absent
    /// from `fields` keep their earlier value.
    pub fn merge(&self, time_key: &str, fields: Map<String, Value>) {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets.entry(time_key.to_string()).or_default();
        for (name, value) in fields {
            bucket.fields.insert(name, value);
        }
        bucket.samples += 1;
    }

    /// Atomically removes and returns every bucket, leaving the table empty.
    /// A merge racing this call lands either in the returned batch or in a
    /// fresh bucket seen by the next drain, never both.
    pub fn drain_all(&self) -> Vec<(String, SecondBucket)> {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *buckets).into_iter().collect()
    }
}
