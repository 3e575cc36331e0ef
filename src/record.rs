use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};
use tracing::warn;

/// How raw payloads handed over by the host become JSON documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// The payload already is a JSON document and is stored verbatim.
    #[default]
    Json,
    /// The payload is a plain log line, wrapped as
    /// `{"log": <line>, "date": <fractional unix seconds>}`.
    LogLine,
}

/// One decoded log line.
///
/// The payload is kept as validated JSON text and never re-encoded, so
/// numbers beyond `f64` precision reach the table unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub payload: Box<RawValue>,
}

impl Record {
    pub fn new(payload: Box<RawValue>, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, payload }
    }

    /// Decode a raw payload according to `format`.
    pub fn decode(raw: &[u8], format: PayloadFormat, timestamp: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let payload = match format {
            PayloadFormat::Json => serde_json::from_slice::<Box<RawValue>>(raw)?,
            PayloadFormat::LogLine => log_line_envelope(raw, timestamp)?,
        };
        Ok(Self::new(payload, timestamp))
    }

    /// Payload as JSON text.
    pub fn payload_text(&self) -> &str {
        self.payload.get()
    }
}

fn log_line_envelope(raw: &[u8], timestamp: DateTime<Utc>) -> Result<Box<RawValue>, serde_json::Error> {
    let date = timestamp.timestamp() as f64 + f64::from(timestamp.timestamp_subsec_nanos()) / 1e9;
    to_raw_value(&serde_json::json!({
        "log": String::from_utf8_lossy(raw),
        "date": date,
    }))
}

/// Records from one delivery attempt, all sharing one routing tag.
#[derive(Debug, Clone)]
pub struct Batch {
    tag: String,
    records: Vec<Record>,
}

impl Batch {
    pub fn new(tag: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            tag: tag.into(),
            records,
        }
    }

    /// Decode the host's raw payloads into a batch.
    ///
    /// Payloads that fail to decode are logged and skipped, so the result may
    /// be shorter than the input or empty.
    pub fn decode<P>(tag: impl Into<String>, payloads: &[P], format: PayloadFormat) -> Self
    where
        P: AsRef<[u8]>,
    {
        let tag = tag.into();
        let mut records = Vec::with_capacity(payloads.len());

        for (idx, raw) in payloads.iter().enumerate() {
            match Record::decode(raw.as_ref(), format, Utc::now()) {
                Ok(record) => records.push(record),
                Err(e) => warn!(tag = %tag, index = idx, error = %e, "skipping undecodable record"),
            }
        }

        Self { tag, records }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn payload(record: &Record) -> Value {
        serde_json::from_str(record.payload_text()).unwrap()
    }

    #[test]
    fn json_payload_is_kept_verbatim() {
        let batch = Batch::decode("app.log", &[br#"{"msg":"hello"}"#], PayloadFormat::Json);
        assert_eq!(batch.tag(), "app.log");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records()[0].payload_text(), r#"{"msg":"hello"}"#);
    }

    #[test]
    fn undecodable_payloads_are_skipped() {
        let payloads: Vec<&[u8]> = vec![b"{\"a\":1}", b"not json", b"[1,2]"];
        let batch = Batch::decode("app.log", &payloads, PayloadFormat::Json);
        assert_eq!(batch.len(), 2);
        assert_eq!(payload(&batch.records()[0]), json!({"a": 1}));
        assert_eq!(payload(&batch.records()[1]), json!([1, 2]));

        let nothing = Batch::decode("app.log", &[b"garbage".as_slice()], PayloadFormat::Json);
        assert!(nothing.is_empty());
    }

    #[test]
    fn json_payload_text_is_not_reencoded() {
        let raw = br#"{"id":123456789012345678901234567890,"amount":0.10000000000000000555}"#;
        let record = Record::decode(raw, PayloadFormat::Json, Utc::now()).unwrap();
        assert_eq!(record.payload_text().as_bytes(), raw.as_slice());
    }

    #[test]
    fn log_line_envelope() {
        let ts = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        let record = Record::decode(b"GET /health 200", PayloadFormat::LogLine, ts).unwrap();
        assert_eq!(
            payload(&record),
            json!({"log": "GET /health 200", "date": 1_700_000_000.5})
        );
        assert_eq!(record.timestamp, ts);
    }

    #[test]
    fn log_lines_never_fail_to_decode() {
        let batch = Batch::decode("syslog", &[b"not json".to_vec(), vec![0xff, 0xfe]], PayloadFormat::LogLine);
        assert_eq!(batch.len(), 2);
        assert_eq!(payload(&batch.records()[0])["log"], "not json");
    }

    #[test]
    fn empty_input_gives_empty_batch() {
        let batch = Batch::decode::<&[u8]>("app.log", &[], PayloadFormat::Json);
        assert!(batch.is_empty());
        assert_eq!(batch.tag(), "app.log");
    }
}
