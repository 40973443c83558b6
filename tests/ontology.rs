//! Ontology loading and normalization tests against the public API.

use std::io::Write;

use caseminer::ontology::{MatchMethod, Normalizer, NormalizerConfig, Ontology};

const HPO_JSON: &str = r#"[
    {"id": "HP:0001250", "canonical_label": "Seizure", "synonyms": ["Epileptic seizure", "Seizures"]},
    {"id": "HP:0001252", "canonical_label": "Hypotonia", "synonyms": ["Muscular hypotonia"]},
    {"id": "HP:0001263", "canonical_label": "Global developmental delay", "synonyms": []}
]"#;

fn load_hpo() -> Ontology {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(HPO_JSON.as_bytes()).unwrap();
    Ontology::from_json_file("hpo", file.path()).unwrap()
}

#[test]
fn vocabulary_loads_from_json_file() {
    let ontology = load_hpo();
    assert_eq!(ontology.name(), "hpo");
    assert_eq!(ontology.len(), 3);
}

#[test]
fn missing_vocabulary_file_is_a_load_error() {
    let err = Ontology::from_json_file("hpo", std::path::Path::new("/nonexistent.json"));
    assert!(err.is_err());
}

#[test]
fn plural_without_declared_synonym_falls_back_to_fuzzy() {
    // A vocabulary whose only surface form is the canonical "Seizure":
    // the plural cannot match exactly and must fall through to fuzzy.
    let ontology = Ontology::new(
        "hpo",
        serde_json::from_str(
            r#"[{"id": "HP:0001250", "canonical_label": "Seizure", "synonyms": []}]"#,
        )
        .unwrap(),
    );
    let normalizer = Normalizer::default();
    let result = normalizer.normalize("seizures", &ontology);

    assert_eq!(result.match_method, MatchMethod::Fuzzy);
    assert_eq!(result.ontology_id.as_deref(), Some("HP:0001250"));
    assert!(result.match_confidence >= 0.6);
    assert!(result.match_confidence < 1.0);
}

#[test]
fn synonym_listed_in_file_matches_exactly() {
    let ontology = load_hpo();
    let normalizer = Normalizer::default();
    let result = normalizer.normalize("seizures", &ontology);
    // Here "Seizures" is a declared synonym, so the match is exact.
    assert_eq!(result.match_method, MatchMethod::Exact);
    assert_eq!(result.match_confidence, 1.0);
}

#[test]
fn batch_output_is_one_result_per_input_in_order() {
    let ontology = load_hpo();
    let normalizer = Normalizer::new(NormalizerConfig {
        fuzzy_threshold: 0.6,
    });
    let inputs: Vec<String> = vec![
        "global developmental delay".into(),
        "completely unrelated finding".into(),
        "muscular hypotonia".into(),
    ];
    let results = normalizer.normalize_batch(&inputs, &ontology);

    assert_eq!(results.len(), inputs.len());
    assert_eq!(results[0].ontology_id.as_deref(), Some("HP:0001263"));
    assert_eq!(results[1].match_method, MatchMethod::None);
    assert!(results[1].ontology_id.is_none());
    assert_eq!(results[2].ontology_id.as_deref(), Some("HP:0001252"));
    for (input, result) in inputs.iter().zip(&results) {
        assert_eq!(&result.original_text, input);
    }
}

#[test]
fn normalizing_a_canonical_label_is_idempotent() {
    let ontology = load_hpo();
    let normalizer = Normalizer::default();
    let first = normalizer.normalize("hypotonia", &ontology);
    let label = first.ontology_label.unwrap();
    let second = normalizer.normalize(&label, &ontology);
    assert_eq!(second.match_method, MatchMethod::Exact);
    assert_eq!(second.match_confidence, 1.0);
    assert_eq!(second.ontology_label, Some(label));
}
