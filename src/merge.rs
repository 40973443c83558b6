//! Record merging and confidence aggregation.
//!
//! Combines every agent's field extractions for one segment into a single
//! `PatientRecord`. Conflict resolution is deterministic regardless of agent
//! completion order: higher confidence wins, exact ties go to the
//! higher-priority role, and any remaining tie is settled by raw value so
//! shuffled inputs always merge identically.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{FieldExtraction, PatientRecord, PatientSegment, ValidationStatus};

/// Merge all agent outputs for a segment into one record.
///
/// A record is emitted even when no fields were extracted, so segments with
/// no findable data remain auditable; such records carry
/// `overall_confidence = 0.0`.
pub fn merge(
    segment: &PatientSegment,
    agent_outputs: Vec<Vec<FieldExtraction>>,
    notes: Vec<String>,
) -> PatientRecord {
    let mut winners: BTreeMap<String, FieldExtraction> = BTreeMap::new();

    for field in agent_outputs.into_iter().flatten() {
        match winners.get(&field.field_name) {
            Some(current) if !beats(&field, current) => {}
            _ => {
                winners.insert(field.field_name.clone(), field);
            }
        }
    }

    let confidence_scores: BTreeMap<String, f64> = winners
        .iter()
        .map(|(name, field)| (name.clone(), field.confidence))
        .collect();

    let overall_confidence = if confidence_scores.is_empty() {
        0.0
    } else {
        confidence_scores.values().sum::<f64>() / confidence_scores.len() as f64
    };

    debug!(
        segment_id = %segment.id,
        fields = winners.len(),
        overall_confidence,
        "merged segment record"
    );

    PatientRecord {
        id: Uuid::new_v4(),
        segment_id: segment.id,
        document_id: segment.document_id,
        fields: winners,
        confidence_scores,
        overall_confidence,
        validation_status: ValidationStatus::Pending,
        notes,
        created_at: Utc::now(),
    }
}

/// Whether `challenger` replaces `current` for the same field name.
fn beats(challenger: &FieldExtraction, current: &FieldExtraction) -> bool {
    if challenger.confidence != current.confidence {
        return challenger.confidence > current.confidence;
    }
    if challenger.agent.priority() != current.agent.priority() {
        return challenger.agent.priority() < current.agent.priority();
    }
    // Same confidence and role (e.g. both passes); pick the lexicographically
    // smaller value so arrival order cannot change the result.
    challenger.raw_value < current.raw_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentKind, Document};
    use crate::segmenter::Segmenter;

    fn segment() -> PatientSegment {
        let doc = Document::new("Patient 1 was a 6-year-old male with seizures.");
        Segmenter::default().segment(&doc).remove(0)
    }

    fn field(name: &str, value: &str, confidence: f64, agent: AgentKind) -> FieldExtraction {
        FieldExtraction::new(name, value, confidence, agent)
    }

    #[test]
    fn higher_confidence_wins_conflicts() {
        let record = merge(
            &segment(),
            vec![
                vec![field("sex", "female", 0.4, AgentKind::Outcomes)],
                vec![field("sex", "male", 0.9, AgentKind::Demographics)],
            ],
            Vec::new(),
        );
        assert_eq!(record.fields["sex"].raw_value, "male");
    }

    #[test]
    fn exact_tie_goes_to_priority_order() {
        let record = merge(
            &segment(),
            vec![
                vec![field("gene_symbol", "SCN2A", 0.8, AgentKind::Outcomes)],
                vec![field("gene_symbol", "SCN1A", 0.8, AgentKind::Genetics)],
            ],
            Vec::new(),
        );
        assert_eq!(record.fields["gene_symbol"].raw_value, "SCN1A");
    }

    #[test]
    fn merging_is_commutative_over_arrival_order() {
        let seg = segment();
        let a = vec![
            field("sex", "male", 0.9, AgentKind::Demographics),
            field("age_of_onset", "6", 0.8, AgentKind::Demographics),
        ];
        let b = vec![field("sex", "female", 0.7, AgentKind::Outcomes)];
        let c = vec![field("phenotype_1", "seizures", 0.85, AgentKind::Phenotypes)];

        let forward = merge(&seg, vec![a.clone(), b.clone(), c.clone()], Vec::new());
        let shuffled = merge(&seg, vec![c, b, a], Vec::new());

        let values = |r: &PatientRecord| -> Vec<(String, String, f64)> {
            r.fields
                .values()
                .map(|f| (f.field_name.clone(), f.raw_value.clone(), f.confidence))
                .collect()
        };
        assert_eq!(values(&forward), values(&shuffled));
        assert_eq!(forward.overall_confidence, shuffled.overall_confidence);
    }

    #[test]
    fn overall_confidence_is_mean_of_field_scores() {
        let record = merge(
            &segment(),
            vec![vec![
                field("sex", "male", 0.9, AgentKind::Demographics),
                field("age_of_onset", "6", 0.7, AgentKind::Demographics),
            ]],
            Vec::new(),
        );
        assert!((record.overall_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_merge_still_emits_a_record() {
        let record = merge(&segment(), vec![Vec::new(), Vec::new()], Vec::new());
        assert!(record.is_empty());
        assert_eq!(record.overall_confidence, 0.0);
        assert_eq!(record.validation_status, ValidationStatus::Pending);
    }

    #[test]
    fn notes_are_carried_onto_the_record() {
        let record = merge(
            &segment(),
            Vec::new(),
            vec!["genetics agent got no structured response".to_string()],
        );
        assert_eq!(record.notes.len(), 1);
    }
}
