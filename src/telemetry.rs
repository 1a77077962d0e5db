use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Field the meter only includes in its periodic summary reports (the
/// summary sequence counter). Raw samples and summaries otherwise share
/// overlapping field names, so presence of this single key is the
/// discriminator.
pub const SUMMARY_MARKER_FIELD: &str = "TS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Summary,
    RawSample,
}

/// One decoded meter message: the second-resolution timestamp plus the
/// nested `z` field set.
#[derive(Debug, Deserialize)]
pub struct MeterPayload {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "z", default)]
    pub fields: Map<String, Value>,
}

pub fn decode_payload(payload: &mut [u8]) -> Result<MeterPayload> {
    let parsed: MeterPayload = simd_json::from_slice(payload)?;
    if parsed.time.trim().is_empty() {
        bail!("payload missing Time field");
    }
    Ok(parsed)
}

/// Presence test on the summary marker key only, never on the full field
/// shape. Unrecognized shapes fall through to the raw-sample path.
pub fn classify(fields: &Map<String, Value>) -> PayloadKind {
    if fields.contains_key(SUMMARY_MARKER_FIELD) {
        PayloadKind::Summary
    } else {
        PayloadKind::RawSample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_extracts_time_and_fields() {
        let mut payload =
            br#"{"Time":"2024-06-01T10:00:00","z":{"Pi":1.0,"U1":236.9}}"#.to_vec();
        let parsed = decode_payload(&mut payload).expect("parsed");
        assert_eq!(parsed.time, "2024-06-01T10:00:00");
        assert_eq!(parsed.fields.get("Pi"), Some(&Value::from(1.0)));
        assert_eq!(parsed.fields.len(), 2);
    }

    #[test]
    fn decode_payload_rejects_missing_time() {
        let mut payload = br#"{"z":{"Pi":1.0}}"#.to_vec();
        assert!(decode_payload(&mut payload).is_err());

        let mut payload = br#"{"Time":"  ","z":{"Pi":1.0}}"#.to_vec();
        assert!(decode_payload(&mut payload).is_err());
    }

    #[test]
    fn decode_payload_rejects_malformed_json() {
        let mut payload = b"not json".to_vec();
        assert!(decode_payload(&mut payload).is_err());
    }

    #[test]
    fn decode_payload_tolerates_missing_field_set() {
        let mut payload = br#"{"Time":"2024-06-01T10:00:00"}"#.to_vec();
        let parsed = decode_payload(&mut payload).expect("parsed");
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn classify_summary_on_marker_field() {
        let mut payload =
            br#"{"Time":"2024-06-01T10:00:00","z":{"TS":42,"NS":7,"Pi":1.0}}"#.to_vec();
        let parsed = decode_payload(&mut payload).expect("parsed");
        assert_eq!(classify(&parsed.fields), PayloadKind::Summary);
    }

    #[test]
    fn classify_raw_sample_without_marker() {
        // Shares Pi/Po/U1 with summaries; only the marker key decides.
        let mut payload =
            br#"{"Time":"2024-06-01T10:00:00","z":{"Pi":1.0,"Po":0.5,"U1":236.9}}"#.to_vec();
        let parsed = decode_payload(&mut payload).expect("parsed");
        assert_eq!(classify(&parsed.fields), PayloadKind::RawSample);
    }

    #[test]
    fn classify_empty_field_set_as_raw_sample() {
        assert_eq!(classify(&Map::new()), PayloadKind::RawSample);
    }
}
