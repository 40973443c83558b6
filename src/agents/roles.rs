//! The five extraction roles and their field schemas.
//!
//! Roles are declarative: a spec table plus prompt guidance. The `Agent`
//! trait's default `extract` does the provider call and validation.

use std::sync::Arc;

use crate::domain::AgentKind;

use super::{Agent, FieldSpec, FieldType};

const SEX_VALUES: &[&str] = &["male", "female", "other", "unknown"];
const ZYGOSITY_VALUES: &[&str] = &[
    "heterozygous",
    "homozygous",
    "compound heterozygous",
    "hemizygous",
    "mosaic",
    "unknown",
];
const INHERITANCE_VALUES: &[&str] = &[
    "de novo",
    "autosomal dominant",
    "autosomal recessive",
    "x-linked",
    "maternal",
    "paternal",
    "unknown",
];
const SURVIVAL_VALUES: &[&str] = &["alive", "deceased", "unknown"];

/// Demographics: age, sex, ancestry.
pub struct DemographicsAgent;

impl Agent for DemographicsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Demographics
    }

    fn specs(&self) -> &'static [FieldSpec] {
        &[
            FieldSpec {
                name: "age_of_onset",
                kind: FieldType::Numeric,
                description: "age at symptom onset, in years (0.5 for 6 months)",
            },
            FieldSpec {
                name: "sex",
                kind: FieldType::Enum(SEX_VALUES),
                description: "patient sex",
            },
            FieldSpec {
                name: "ethnicity",
                kind: FieldType::Text,
                description: "reported ancestry or ethnicity",
            },
        ]
    }

    fn guidance(&self) -> &'static str {
        "Ages like '6-year-old' mean age_of_onset 6 unless onset is stated separately. \
         Convert months to fractional years."
    }
}

/// Genetics: causal gene and variant details.
pub struct GeneticsAgent;

impl Agent for GeneticsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Genetics
    }

    fn specs(&self) -> &'static [FieldSpec] {
        &[
            FieldSpec {
                name: "gene_symbol",
                kind: FieldType::Text,
                description: "HGNC gene symbol, e.g. SCN1A",
            },
            FieldSpec {
                name: "variant",
                kind: FieldType::Text,
                description: "variant in HGVS notation if given, e.g. c.2447G>A or p.Arg816Gln",
            },
            FieldSpec {
                name: "zygosity",
                kind: FieldType::Enum(ZYGOSITY_VALUES),
                description: "zygosity of the variant",
            },
            FieldSpec {
                name: "inheritance_pattern",
                kind: FieldType::Enum(INHERITANCE_VALUES),
                description: "inheritance of the variant",
            },
        ]
    }

    fn guidance(&self) -> &'static str {
        "Report the gene symbol exactly as written. Keep HGVS notation verbatim; \
         do not convert between cDNA and protein notation."
    }
}

/// Phenotypes: clinical findings, one list entry per distinct finding.
pub struct PhenotypesAgent;

impl Agent for PhenotypesAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Phenotypes
    }

    fn specs(&self) -> &'static [FieldSpec] {
        &[FieldSpec {
            name: "phenotype",
            kind: FieldType::List,
            description: "distinct clinical findings, as short noun phrases",
        }]
    }

    fn guidance(&self) -> &'static str {
        "List each abnormal clinical finding separately using the wording from the \
         text (e.g. 'seizures', 'hypotonia', 'global developmental delay'). \
         Do not list normal findings or negated findings."
    }
}

/// Treatments: interventions and response.
pub struct TreatmentsAgent;

impl Agent for TreatmentsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Treatments
    }

    fn specs(&self) -> &'static [FieldSpec] {
        &[
            FieldSpec {
                name: "treatment",
                kind: FieldType::List,
                description: "drugs, diets, or procedures tried, one per entry",
            },
            FieldSpec {
                name: "treatment_response",
                kind: FieldType::Text,
                description: "overall response to treatment as stated",
            },
        ]
    }

    fn guidance(&self) -> &'static str {
        "Include drug names, doses only if part of the name usage, and procedural \
         interventions. Summarize response only from explicit statements."
    }
}

/// Outcomes: survival and clinical course.
pub struct OutcomesAgent;

impl Agent for OutcomesAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Outcomes
    }

    fn specs(&self) -> &'static [FieldSpec] {
        &[
            FieldSpec {
                name: "survival_status",
                kind: FieldType::Enum(SURVIVAL_VALUES),
                description: "patient status at last report",
            },
            FieldSpec {
                name: "age_at_last_followup",
                kind: FieldType::Numeric,
                description: "age at last follow-up, in years",
            },
            FieldSpec {
                name: "clinical_outcome",
                kind: FieldType::Text,
                description: "short summary of the clinical course/outcome",
            },
        ]
    }

    fn guidance(&self) -> &'static str {
        "survival_status is 'deceased' only if death is stated. Do not infer \
         outcome severity beyond the text."
    }
}

/// All five roles in priority order.
pub fn default_agents() -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(DemographicsAgent),
        Arc::new(GeneticsAgent),
        Arc::new(PhenotypesAgent),
        Arc::new(TreatmentsAgent),
        Arc::new(OutcomesAgent),
    ]
}

/// Base field names a role is expected to fill, for missing-field detection
/// in two-pass mode. List fields count as present when any expanded index
/// exists.
pub fn base_field_names(agent: &dyn Agent) -> Vec<&'static str> {
    agent.specs().iter().map(|s| s.name).collect()
}
