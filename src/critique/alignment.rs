// src/critique/alignment.rs — Does the simulation implement what the design claims? (the `missing` set)

use std::collections::BTreeSet;

use super::{Finding, FindingCategory, Severity};
use crate::design::ExperimentDesign;
use crate::simulation::{EffectiveOp, SimulationResult};

/// Structural comparison of a design with its compiled simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub total: usize,
    pub implemented: usize,
    pub collapsed: Vec<String>,
    pub unmodeled: Vec<String>,
    /// Components the simulation never reached or never recorded.
    pub absent: Vec<String>,
    pub missing_expected: Vec<String>,
    pub missing: BTreeSet<Finding>,
}

impl Alignment {
    pub fn implemented_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.implemented as f64 / self.total as f64
    }
}

pub fn assess(design: &ExperimentDesign, result: &SimulationResult) -> Alignment {
    let ops = &result.metadata.effective_operations;
    let mut a = Alignment {
        total: design.components.len(),
        ..Alignment::default()
    };
    let cancelled: BTreeSet<&str> = result
        .metadata
        .cancelled_stages
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    for c in &design.components {
        match ops.get(&c.id) {
            // Reported once per run below.
            Some(EffectiveOp::Transform) if cancelled.contains(c.id.as_str()) => {
                a.collapsed.push(c.id.clone());
            }
            Some(op) if op.is_implemented() => a.implemented += 1,
            Some(EffectiveOp::Identity) => {
                a.collapsed.push(c.id.clone());
                a.missing.insert(Finding::new(
                    Severity::Major,
                    FindingCategory::CollapsedComponent,
                    Some(&c.id),
                    format!("{} compiles to the identity and has no effect", c.type_tag()),
                ));
            }
            Some(_) => {
                a.unmodeled.push(c.id.clone());
                a.missing.insert(Finding::new(
                    Severity::Minor,
                    FindingCategory::UnmodeledComponent,
                    Some(&c.id),
                    format!("type '{}' has no simulation counterpart", c.type_tag()),
                ));
            }
            None => {
                a.absent.push(c.id.clone());
                // A failed run stops early; the execution finding covers it.
                if result.success {
                    a.missing.insert(Finding::new(
                        Severity::Major,
                        FindingCategory::MissingComponent,
                        Some(&c.id),
                        "component does not appear in the simulation".to_string(),
                    ));
                }
            }
        }
    }

    for run in &result.metadata.cancelled_stages {
        a.missing.insert(Finding::new(
            Severity::Major,
            FindingCategory::CollapsedComponent,
            run.first().map(String::as_str),
            format!(
                "stages {} multiply to the identity; {} claimed transformations collapse to none",
                run.join(", "),
                run.len()
            ),
        ));
    }

    if result.success {
        for name in design.expected.keys() {
            if result.value(name).is_none() {
                a.missing_expected.push(name.clone());
                a.missing.insert(Finding::new(
                    Severity::Minor,
                    FindingCategory::ExpectedQuantity,
                    None,
                    format!("expected quantity '{}' was not produced", name),
                ));
            }
        }
    }

    if design.detectors().next().is_none() {
        a.missing.insert(Finding::new(
            Severity::Major,
            FindingCategory::MissingComponent,
            None,
            "design has no detector, so nothing is measured".to_string(),
        ));
    }

    a
}
