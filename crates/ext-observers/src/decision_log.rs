//! Decision-log sink contract — spec.md §6 "Decision-log sink interface",
//! expanded per SPEC_FULL.md §11 from an interface-only mention into a real
//! trait plus the buffer/output configuration shapes, grounded in the
//! teacher's `fraiseql_core::audit` module (a backend trait plus a plain
//! `FileAuditBackend` as the simplest concrete implementation, alongside
//! Postgres and syslog ones this crate has no use for).

use ext_core::Value;
use serde::{Deserialize, Serialize};

/// `buffer.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferType {
    Unbuffered,
    Memory,
    Disk,
}

/// `output.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Console,
    Http,
    Service,
    Kafka,
    S3,
    GcpCloudStorage,
    Splunk,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: Option<String>,
    pub private_key: Option<String>,
    pub ca_cert: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchingConfig {
    pub at_count: Option<u32>,
    pub at_period: Option<String>,
    pub format: Option<String>,
    pub compress: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaOutputConfig {
    pub urls: Vec<String>,
    pub topic: String,
    pub tls: Option<TlsConfig>,
    pub sasl: Option<Vec<String>>,
    pub batching: Option<BatchingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3OutputConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub access_secret: Option<String>,
    pub force_path: Option<bool>,
    pub batching: Option<BatchingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpOutputConfig {
    pub bucket: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplunkOutputConfig {
    pub url: String,
    pub token: String,
    pub batching: Option<BatchingConfig>,
}

/// The `plugins.<name>` YAML fragment, minus the output-specific payload
/// (kept separate since only one variant applies per configured sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogConfig {
    pub buffer_type: BufferType,
    pub output_type: OutputType,
    pub kafka: Option<KafkaOutputConfig>,
    pub s3: Option<S3OutputConfig>,
    pub gcp: Option<GcpOutputConfig>,
    pub splunk: Option<SplunkOutputConfig>,
    /// Policy paths evaluated per decision to decide drop/mask.
    pub drop_decision: Option<String>,
    pub mask_decision: Option<String>,
}

/// One decision event, matching spec.md §6's payload schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub result: Value,
    pub metrics: Value,
    pub req_id: String,
    pub decision_id: String,
    pub labels: DecisionLabels,
    pub nd_builtin_cache: Value,
    pub input: Value,
    pub erased: Vec<String>,
    pub masked: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLabels {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// Implemented once per `output.type`. The out-of-scope decision-log
/// component (spec.md framing: decision logging lives outside this crate's
/// builtin framework) calls into whichever sink its configuration selects.
#[async_trait::async_trait]
pub trait DecisionLogSink: Send + Sync {
    async fn emit(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionLogError {
    #[error("serializing decision log entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("writing decision log entry: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference `output.type = console` sink: newline-delimited JSON on
/// stdout, with no buffering (matches `BufferType::Unbuffered`'s name; this
/// implementation doesn't batch regardless of the configured buffer type,
/// since stdout has no batching benefit).
#[derive(Default)]
pub struct ConsoleSink;

#[async_trait::async_trait]
impl DecisionLogSink for ConsoleSink {
    async fn emit(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        let line = serde_json::to_string(entry)?;
        use std::io::Write;
        writeln!(std::io::stdout(), "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ext_core::ValueMap;

    fn sample_entry() -> DecisionLogEntry {
        DecisionLogEntry {
            result: Value::Bool(true),
            metrics: Value::Object(ValueMap::new()),
            req_id: "r1".to_string(),
            decision_id: "d1".to_string(),
            labels: DecisionLabels { id: "policy1".to_string(), kind: "rego".to_string(), version: "1".to_string() },
            nd_builtin_cache: Value::Object(ValueMap::new()),
            input: Value::Null,
            erased: Vec::new(),
            masked: Vec::new(),
            timestamp: "2026-07-29T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn console_sink_emits_without_error() {
        let sink = ConsoleSink;
        sink.emit(&sample_entry()).await.unwrap();
    }

    #[test]
    fn buffer_and_output_types_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&BufferType::Disk).unwrap(), "\"disk\"");
        assert_eq!(serde_json::to_string(&OutputType::GcpCloudStorage).unwrap(), "\"gcp_cloud_storage\"");
    }
}
