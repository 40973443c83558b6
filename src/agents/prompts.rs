//! Prompt templates for the extraction agents.
//!
//! Every prompt carries the same scaffolding: role, field schema with types,
//! output rules, then the segment text. The focused variant is used by the
//! orchestrator's second pass to re-query only missing fields.

use std::fmt::Write;

use crate::domain::AgentKind;

use super::{FieldSpec, FieldType};

/// Build the extraction prompt for one agent role.
pub fn build_extraction_prompt(
    kind: AgentKind,
    specs: &[FieldSpec],
    guidance: &str,
    segment_text: &str,
    focused: bool,
) -> String {
    let mut schema = String::new();
    for spec in specs {
        let shape = match spec.kind {
            FieldType::Text => r#"{"value": "text", "confidence": 0.0-1.0}"#.to_string(),
            FieldType::Numeric => r#"{"value": "number", "confidence": 0.0-1.0}"#.to_string(),
            FieldType::Enum(allowed) => format!(
                r#"{{"value": "{}", "confidence": 0.0-1.0}}"#,
                allowed.join("|")
            ),
            FieldType::List => {
                r#"[{"value": "text", "confidence": 0.0-1.0}, ...]"#.to_string()
            }
        };
        let _ = writeln!(schema, r#"  "{}": {}   // {}"#, spec.name, shape, spec.description);
    }

    let focus_note = if focused {
        "This is a focused re-query: extract ONLY the fields listed in the schema. \
         Read the text carefully for indirect statements of these attributes.\n"
    } else {
        ""
    };

    format!(
        r#"You are a clinical data extraction specialist for {role} information.

{guidance}

{focus_note}Extract the fields below from the patient description. Output ONLY a JSON object, nothing else.

SCHEMA (omit a field entirely if the text does not state it):
{{
{schema}}}

RULES:
- Values must be copied or minimally normalized from the text, never invented.
- confidence reflects how explicitly the text states the value.
- Omit uncertain fields instead of guessing; do NOT output null or empty strings.
- For enumerated fields, use exactly one of the listed values.
- Output raw JSON with no markdown fences and no commentary.

PATIENT DESCRIPTION:
{segment}

JSON OUTPUT:"#,
        role = kind,
        guidance = guidance,
        focus_note = focus_note,
        schema = schema,
        segment = segment_text,
    )
}
