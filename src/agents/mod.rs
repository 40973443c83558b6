//! Extraction agents: specialized roles that turn a patient segment into
//! structured fields.
//!
//! Every agent is a pure function from `(segment_text, context)` to a list
//! of `FieldExtraction`s. Agents never raise on partial failure: a field
//! they cannot extract is simply absent, and an agent that cannot get any
//! valid structured response after the pool's retries returns an empty list
//! plus a diagnostic note.

pub mod prompts;
pub mod roles;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{AgentKind, FieldExtraction};
use crate::providers::{GenerateOptions, ProviderPool};

pub use roles::default_agents;

/// Cap on expanded list-valued fields (phenotype_1..N etc.).
const MAX_LIST_ITEMS: usize = 12;

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Declared type of a field, used to validate model output.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// Free text
    Text,
    /// Must parse as a number
    Numeric,
    /// Must be one of the listed values; anything else is dropped, not coerced
    Enum(&'static [&'static str]),
    /// Array-valued; expands to `name_1`, `name_2`, ...
    List,
}

/// Schema entry for one field an agent may extract.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    /// One-line description shown to the model
    pub description: &'static str,
}

/// Shared context handed to every agent invocation.
pub struct AgentContext {
    /// Provider pool; the only route to a backend
    pub pool: Arc<ProviderPool>,

    /// Request options (timeout, temperature)
    pub options: GenerateOptions,

    /// Second-pass mode: restrict extraction to these base field names
    pub focus_fields: Option<Vec<String>>,
}

/// What one agent invocation produced.
pub struct AgentOutcome {
    pub agent: AgentKind,
    pub fields: Vec<FieldExtraction>,
    /// Diagnostic when the agent got nothing usable from any provider
    pub note: Option<String>,
}

impl AgentOutcome {
    fn empty_with_note(agent: AgentKind, note: String) -> Self {
        Self {
            agent,
            fields: Vec::new(),
            note: Some(note),
        }
    }
}

/// A specialized extraction role.
///
/// Implementations supply a field schema and prompt guidance; the default
/// `extract` drives the provider call and response validation, so role
/// structs stay declarative.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// The fields this role is allowed to produce.
    fn specs(&self) -> &'static [FieldSpec];

    /// Role-specific instructions injected into the prompt.
    fn guidance(&self) -> &'static str;

    async fn extract(&self, segment_text: &str, ctx: &AgentContext) -> AgentOutcome {
        let kind = self.kind();
        let specs = active_specs(self.specs(), ctx.focus_fields.as_deref());
        if specs.is_empty() {
            return AgentOutcome {
                agent: kind,
                fields: Vec::new(),
                note: None,
            };
        }

        let prompt = prompts::build_extraction_prompt(
            kind,
            &specs,
            self.guidance(),
            segment_text,
            ctx.focus_fields.is_some(),
        );

        match ctx.pool.generate(&prompt, &ctx.options).await {
            Ok(raw) => {
                let fields = parse_response(kind, &specs, &raw);
                debug!(agent = %kind, fields = fields.len(), "agent extraction complete");
                AgentOutcome {
                    agent: kind,
                    fields,
                    note: None,
                }
            }
            Err(err) => {
                warn!(agent = %kind, error = %err, "agent got no structured response");
                AgentOutcome::empty_with_note(
                    kind,
                    format!("{kind} agent got no structured response: {err}"),
                )
            }
        }
    }
}

/// Restrict a spec table to the focused base fields, when focusing.
fn active_specs(specs: &'static [FieldSpec], focus: Option<&[String]>) -> Vec<FieldSpec> {
    match focus {
        None => specs.to_vec(),
        Some(fields) => specs
            .iter()
            .filter(|s| fields.iter().any(|f| f == s.name))
            .copied()
            .collect(),
    }
}

/// Parse and validate a model's JSON response against the field schema.
///
/// Anything that does not conform (wrong type, value outside a declared
/// enumeration, unparsable number) is dropped for that field only.
pub fn parse_response(kind: AgentKind, specs: &[FieldSpec], raw: &str) -> Vec<FieldExtraction> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let Some(object) = value.as_object() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for spec in specs {
        let Some(entry) = object.get(spec.name) else {
            continue;
        };
        match spec.kind {
            FieldType::List => {
                let Some(items) = entry.as_array() else {
                    continue;
                };
                for (i, item) in items.iter().take(MAX_LIST_ITEMS).enumerate() {
                    if let Some((value, confidence)) = scalar_with_confidence(item) {
                        if value.trim().is_empty() {
                            continue;
                        }
                        fields.push(FieldExtraction::new(
                            format!("{}_{}", spec.name, i + 1),
                            value.trim(),
                            confidence,
                            kind,
                        ));
                    }
                }
            }
            _ => {
                let Some((value, confidence)) = scalar_with_confidence(entry) else {
                    continue;
                };
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if let Some(valid) = validate_scalar(spec.kind, value) {
                    fields.push(FieldExtraction::new(spec.name, valid, confidence, kind));
                }
            }
        }
    }
    fields
}

/// Accept `{"value": v, "confidence": c}` or a bare scalar `v`.
fn scalar_with_confidence(entry: &Value) -> Option<(String, f64)> {
    match entry {
        Value::Object(map) => {
            let value = scalar_to_string(map.get("value")?)?;
            let confidence = map
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE);
            Some((value, confidence))
        }
        other => scalar_to_string(other).map(|v| (v, DEFAULT_CONFIDENCE)),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Type-check a scalar value; returns the canonical raw value or `None`.
fn validate_scalar(kind: FieldType, value: &str) -> Option<String> {
    match kind {
        FieldType::Text => Some(value.to_string()),
        FieldType::Numeric => value.parse::<f64>().ok().map(|_| value.to_string()),
        FieldType::Enum(allowed) => {
            let folded = value.to_lowercase();
            allowed
                .iter()
                .find(|a| **a == folded)
                .map(|a| a.to_string())
        }
        FieldType::List => Some(value.to_string()),
    }
}
