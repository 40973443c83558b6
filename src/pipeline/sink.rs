//! Record sinks: where emitted patient records go.
//!
//! The pipeline treats persistence as fire-and-forget: it never reads
//! records back, and a sink failure is logged by the orchestrator rather
//! than failing the extraction. Real storage engines live behind this seam.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::domain::PatientRecord;
use crate::grounding::ExtractionSpan;

/// Destination for emitted records, keyed by `(document_id, segment_id)`.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, record: &PatientRecord, spans: &[ExtractionSpan]) -> Result<()>;
}

/// One JSON object per record, appended to a file.
pub struct JsonlSink {
    path: PathBuf,
}

#[derive(Serialize)]
struct SinkLine<'a> {
    record: &'a PatientRecord,
    spans: &'a [ExtractionSpan],
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn emit(&self, record: &PatientRecord, spans: &[ExtractionSpan]) -> Result<()> {
        let mut line = serde_json::to_string(&SinkLine { record, spans })
            .context("failed to serialize patient record")?;
        line.push('\n');

        // Open per emit: no handle to hold a lock on across awaits.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open record sink: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("failed to append record")?;
        file.flush()
            .await
            .context("failed to flush record sink")?;
        Ok(())
    }
}
