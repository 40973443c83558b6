//! Extraction orchestrator.
//!
//! Drives the document → segments → agents → grounding → merge flow. Each
//! segment moves through a small state machine
//! (`Pending → Dispatching → Collecting → Merged | Failed`); agents for one
//! segment run concurrently, segments run concurrently up to a bounded pool,
//! and results are emitted in the segmenter's original order no matter which
//! segment finishes first.

pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{self, Agent, AgentContext, AgentOutcome};
use crate::domain::{AgentKind, Document, FieldExtraction, PatientRecord, PatientSegment};
use crate::error::PipelineError;
use crate::grounding;
use crate::merge;
use crate::ontology::{Normalizer, Ontology};
use crate::providers::{GenerateOptions, ProviderPool, ProviderStatus};
use crate::segmenter::Segmenter;

pub use sink::{JsonlSink, RecordSink};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Segments processed concurrently (default: 4)
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// Deadline per agent call, seconds (default: 60)
    #[serde(default = "default_agent_timeout_seconds")]
    pub agent_timeout_seconds: u64,

    /// Slack added to the per-segment deadline on top of the sum of agent
    /// timeouts, seconds (default: 15)
    #[serde(default = "default_segment_timeout_margin_seconds")]
    pub segment_timeout_margin_seconds: u64,

    /// Run a second, recall-focused pass over fields missing after pass one
    #[serde(default)]
    pub two_pass: bool,
}

fn default_max_concurrent_segments() -> usize {
    4
}
fn default_agent_timeout_seconds() -> u64 {
    60
}
fn default_segment_timeout_margin_seconds() -> u64 {
    15
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_segments: default_max_concurrent_segments(),
            agent_timeout_seconds: default_agent_timeout_seconds(),
            segment_timeout_margin_seconds: default_segment_timeout_margin_seconds(),
            two_pass: false,
        }
    }
}

/// Health/quota snapshot for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub providers: Vec<ProviderStatus>,
}

/// Per-segment processing state, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Pending,
    Dispatching,
    Collecting,
    Merged,
    Failed,
}

struct Inner {
    pool: Arc<ProviderPool>,
    agents: Vec<Arc<dyn Agent>>,
    segmenter: Segmenter,
    normalizer: Normalizer,
    phenotype_ontology: Arc<Ontology>,
    gene_ontology: Arc<Ontology>,
    config: OrchestratorConfig,
    sink: Option<Arc<dyn RecordSink>>,
}

/// The patient-record extraction pipeline.
///
/// Cheap to clone; all components are shared behind `Arc`.
#[derive(Clone)]
pub struct ExtractionPipeline {
    inner: Arc<Inner>,
}

impl ExtractionPipeline {
    /// Pipeline with the default agent set, default segmenter/normalizer,
    /// and empty ontologies.
    pub fn new(pool: Arc<ProviderPool>, config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                agents: agents::default_agents(),
                segmenter: Segmenter::default(),
                normalizer: Normalizer::default(),
                phenotype_ontology: Arc::new(Ontology::empty("hpo")),
                gene_ontology: Arc::new(Ontology::empty("genes")),
                config,
                sink: None,
            }),
        }
    }

    /// Replace the agent set (e.g. a subset, or test doubles).
    pub fn with_agents(mut self, agents: Vec<Arc<dyn Agent>>) -> Self {
        self.inner_mut().agents = agents;
        self
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.inner_mut().segmenter = segmenter;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.inner_mut().normalizer = normalizer;
        self
    }

    /// Attach the vocabularies used for phenotype and gene normalization.
    pub fn with_ontologies(mut self, phenotype: Arc<Ontology>, gene: Arc<Ontology>) -> Self {
        let inner = self.inner_mut();
        inner.phenotype_ontology = phenotype;
        inner.gene_ontology = gene;
        self
    }

    /// Attach a fire-and-forget record sink.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.inner_mut().sink = Some(sink);
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("pipeline builders run before sharing")
    }

    /// Health/quota snapshot of every configured provider.
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            providers: self.inner.pool.status(),
        }
    }

    /// Extract one `PatientRecord` per patient segment of the document.
    ///
    /// Best-effort by design: provider exhaustion, malformed responses, and
    /// per-agent timeouts all degrade to missing fields. The only hard
    /// failure is a document with no readable text.
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn extract_document(
        &self,
        document: &Document,
    ) -> Result<Vec<PatientRecord>, PipelineError> {
        if !document.is_readable() {
            return Err(PipelineError::EmptyDocument(document.id));
        }

        let segments = self.inner.segmenter.segment(document);
        info!(segments = segments.len(), "document segmented");

        // Keep segment identity around so a crashed worker still yields an
        // auditable empty record at the right position.
        let segment_meta: Vec<PatientSegment> = segments.clone();

        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_concurrent_segments));
        let mut tasks: JoinSet<(usize, PatientRecord)> = JoinSet::new();

        for (index, segment) in segments.into_iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("segment semaphore is never closed");
                let record = process_segment(inner, &segment).await;
                (index, record)
            });
        }

        let mut ordered: Vec<Option<PatientRecord>> = vec![None; segment_meta.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, record)) => ordered[index] = Some(record),
                Err(join_err) => {
                    // Infrastructure failure before/while the segment ran.
                    error!(error = %join_err, "segment worker failed");
                }
            }
        }

        // Buffered emission in the segmenter's original order.
        let mut records = Vec::with_capacity(segment_meta.len());
        for (index, slot) in ordered.into_iter().enumerate() {
            let record = match slot {
                Some(record) => record,
                None => {
                    let segment = &segment_meta[index];
                    debug!(segment_id = %segment.id, state = ?SegmentState::Failed, "emitting empty record for failed segment");
                    merge::merge(
                        segment,
                        Vec::new(),
                        vec!["segment worker failed before any agent completed".to_string()],
                    )
                }
            };
            if let Some(sink) = &self.inner.sink {
                let spans: Vec<_> = record.spans().into_iter().cloned().collect();
                if let Err(err) = sink.emit(&record, &spans).await {
                    warn!(record_id = %record.id, error = %err, "record sink emit failed");
                }
            }
            records.push(record);
        }

        Ok(records)
    }
}

/// Run one segment through dispatch, collect, normalize, ground, merge.
async fn process_segment(inner: Arc<Inner>, segment: &PatientSegment) -> PatientRecord {
    let mut state = SegmentState::Pending;
    debug!(segment_id = %segment.id, state = ?state, "segment queued");

    state = SegmentState::Dispatching;
    debug!(segment_id = %segment.id, state = ?state, "dispatching agents");

    let (mut outputs, mut notes) = run_agents(&inner, segment, None).await;

    state = SegmentState::Collecting;
    debug!(segment_id = %segment.id, state = ?state, "agent outcomes collected");

    if inner.config.two_pass {
        let missing = missing_fields(&inner.agents, &outputs);
        if missing.iter().any(|m| !m.is_empty()) {
            debug!(segment_id = %segment.id, "running focused second pass");
            let (second, second_notes) = run_agents(&inner, segment, Some(&missing)).await;
            for (first, extra) in outputs.iter_mut().zip(second) {
                first.extend(extra);
            }
            notes.extend(second_notes);
        }
    }

    for fields in &mut outputs {
        normalize_fields(&inner, fields);
    }

    // Ground every candidate extraction before merging so the winning field
    // carries its span.
    let flat: Vec<FieldExtraction> = outputs.iter().flatten().cloned().collect();
    let spans = grounding::resolve_spans(&segment.text, &flat);
    for fields in &mut outputs {
        grounding::attach_spans(fields, &spans);
    }

    state = SegmentState::Merged;
    let record = merge::merge(segment, outputs, notes);
    debug!(
        segment_id = %segment.id,
        state = ?state,
        fields = record.fields.len(),
        overall_confidence = record.overall_confidence,
        "segment merged"
    );
    record
}

/// Fan out all agents for a segment and collect until done or deadline.
///
/// The segment deadline is the sum of the agents' timeouts plus a margin,
/// not their max: fallback chains can serialize badly-behaved calls. When
/// the deadline expires, in-flight agents are cancelled and the segment is
/// merged from whatever already completed.
async fn run_agents(
    inner: &Arc<Inner>,
    segment: &PatientSegment,
    focus: Option<&[Vec<String>]>,
) -> (Vec<Vec<FieldExtraction>>, Vec<String>) {
    let agent_timeout = Duration::from_secs(inner.config.agent_timeout_seconds);
    let deadline = Instant::now()
        + agent_timeout * inner.agents.len().max(1) as u32
        + Duration::from_secs(inner.config.segment_timeout_margin_seconds);

    let mut tasks: JoinSet<(usize, AgentOutcome)> = JoinSet::new();
    for (index, agent) in inner.agents.iter().enumerate() {
        let focus_fields = match focus {
            Some(all) => {
                if all[index].is_empty() {
                    continue; // nothing missing for this agent
                }
                Some(all[index].clone())
            }
            None => None,
        };
        let agent = Arc::clone(agent);
        let ctx = AgentContext {
            pool: Arc::clone(&inner.pool),
            options: GenerateOptions {
                timeout: agent_timeout,
                ..GenerateOptions::default()
            },
            focus_fields,
        };
        let text = segment.text.clone();
        tasks.spawn(async move {
            let kind = agent.kind();
            match tokio::time::timeout(agent_timeout, agent.extract(&text, &ctx)).await {
                Ok(outcome) => (index, outcome),
                Err(_) => (
                    index,
                    AgentOutcome {
                        agent: kind,
                        fields: Vec::new(),
                        note: Some(format!("{kind} agent timed out")),
                    },
                ),
            }
        });
    }

    // Collecting: wait for all agents or the segment deadline.
    let mut slots: Vec<Option<AgentOutcome>> = (0..inner.agents.len()).map(|_| None).collect();
    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                    Some(Err(join_err)) => {
                        warn!(segment_id = %segment.id, error = %join_err, "agent task failed");
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(segment_id = %segment.id, "segment deadline expired, cancelling in-flight agents");
                tasks.abort_all();
                break;
            }
        }
    }

    // Deterministic agent order regardless of completion order.
    let mut outputs: Vec<Vec<FieldExtraction>> = Vec::with_capacity(inner.agents.len());
    let mut notes = Vec::new();
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(outcome) => {
                if let Some(note) = outcome.note {
                    notes.push(note);
                }
                outputs.push(outcome.fields);
            }
            None => {
                // Never dispatched (focused pass) or cancelled at deadline.
                if focus.map_or(true, |all| !all[index].is_empty()) {
                    notes.push(format!(
                        "{} agent cancelled at segment deadline",
                        inner.agents[index].kind()
                    ));
                }
                outputs.push(Vec::new());
            }
        }
    }
    (outputs, notes)
}

/// Per-agent base fields that no extraction covered yet.
///
/// List-valued fields count as covered when any expanded index
/// (`phenotype_1`, ...) exists. Only a numeric suffix counts: a sibling
/// field like `treatment_response` does not cover the `treatment` list.
fn missing_fields(agents: &[Arc<dyn Agent>], outputs: &[Vec<FieldExtraction>]) -> Vec<Vec<String>> {
    agents
        .iter()
        .enumerate()
        .map(|(index, agent)| {
            let produced = &outputs[index];
            agents::roles::base_field_names(agent.as_ref())
                .into_iter()
                .filter(|name| {
                    !produced
                        .iter()
                        .any(|f| f.field_name == *name || is_list_index_of(&f.field_name, name))
                })
                .map(str::to_string)
                .collect()
        })
        .collect()
}

/// Whether `field_name` is an expanded index of the list field `base`
/// (`phenotype_1` for `phenotype`).
fn is_list_index_of(field_name: &str, base: &str) -> bool {
    field_name
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Attach ontology normalizations to phenotype and gene fields.
fn normalize_fields(inner: &Arc<Inner>, fields: &mut [FieldExtraction]) {
    for field in fields.iter_mut() {
        let ontology = match field.agent {
            AgentKind::Phenotypes if field.field_name.starts_with("phenotype") => {
                &inner.phenotype_ontology
            }
            AgentKind::Genetics if field.field_name == "gene_symbol" => &inner.gene_ontology,
            _ => continue,
        };
        field.normalized_value = Some(inner.normalizer.normalize(&field.raw_value, ontology));
    }
}
