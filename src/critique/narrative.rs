// src/critique/narrative.rs — Deterministic physics-analysis prose for reports

use serde::Serialize;

use super::alignment::Alignment;
use super::{AnalysisReport, FindingCategory};
use crate::design::ExperimentDesign;
use crate::simulation::SimulationResult;

/// The six analysis sections of the simulation report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Narrative {
    pub correctness: String,
    pub implementation_quality: String,
    pub results_validity: String,
    pub key_findings: Vec<String>,
    pub limitations: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Narrative {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("### Correctness\n\n");
        out.push_str(&self.correctness);
        out.push_str("\n\n### Implementation Quality\n\n");
        out.push_str(&self.implementation_quality);
        out.push_str("\n\n### Results Validity\n\n");
        out.push_str(&self.results_validity);
        out.push_str("\n\n");
        push_list(&mut out, "Key Findings", &self.key_findings);
        push_list(&mut out, "Limitations", &self.limitations);
        push_list(&mut out, "Recommendations", &self.recommendations);
        out
    }
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    out.push_str(&format!("### {}\n\n", heading));
    if items.is_empty() {
        out.push_str("- None.\n");
    }
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out.push('\n');
}

/// How many simulated quantities to quote under Key Findings.
const KEY_QUANTITIES: usize = 8;

pub fn write(
    design: &ExperimentDesign,
    result: &SimulationResult,
    alignment: &Alignment,
    report: &AnalysisReport,
) -> Narrative {
    Narrative {
        correctness: correctness(result, report),
        implementation_quality: implementation_quality(alignment),
        results_validity: results_validity(design, result, report),
        key_findings: key_findings(design, result),
        limitations: limitations(result),
        recommendations: recommendations(report),
    }
}

fn correctness(result: &SimulationResult, report: &AnalysisReport) -> String {
    if let Some(err) = &result.error {
        return format!(
            "The simulation did not complete: {}. No physical quantities were produced.",
            err
        );
    }
    let total = result.raw_total_probability.unwrap_or(0.0);
    let mut text = if result.is_normalized() {
        format!(
            "The output distribution is normalized (total probability {:.6}).",
            total
        )
    } else {
        format!(
            "The output distribution is not a probability distribution: total mass {:.6}. \
             The value is reported as computed, without renormalization.",
            total
        )
    };
    let physics: Vec<&str> = [
        (FindingCategory::Energy, "energy conservation"),
        (FindingCategory::Uncertainty, "the uncertainty relation"),
        (FindingCategory::Rate, "detector-limited count rates"),
    ]
    .iter()
    .filter(|(cat, _)| report.incorrect.iter().any(|f| f.category == *cat))
    .map(|(_, label)| *label)
    .collect();
    if physics.is_empty() {
        text.push_str(" No conservation-law or rate violations were found.");
    } else {
        text.push_str(&format!(" Violations involve {}.", physics.join(" and ")));
    }
    text
}

fn implementation_quality(a: &Alignment) -> String {
    let mut text = format!(
        "{} of {} components are implemented as effective operations.",
        a.implemented, a.total
    );
    if !a.collapsed.is_empty() {
        text.push_str(&format!(
            " Collapsed to the identity: {}.",
            a.collapsed.join(", ")
        ));
    }
    if !a.unmodeled.is_empty() {
        text.push_str(&format!(
            " Without simulation counterpart: {}.",
            a.unmodeled.join(", ")
        ));
    }
    if !a.absent.is_empty() {
        text.push_str(&format!(" Not reached: {}.", a.absent.join(", ")));
    }
    text
}

fn results_validity(
    design: &ExperimentDesign,
    result: &SimulationResult,
    report: &AnalysisReport,
) -> String {
    if !result.success {
        return "Results cannot be assessed because the simulation failed.".to_string();
    }
    let mut parts = Vec::new();
    if report.has_category(FindingCategory::Statistics) {
        parts.push("Sampled statistics disagree with the exact distribution.".to_string());
    } else if result.value("total_probability").is_some() && result.is_normalized() {
        parts.push(format!(
            "Sampled statistics ({} shots, seed {}) agree with the exact distribution.",
            result.metadata.shots, result.metadata.seed
        ));
    } else {
        parts.push("Sampling was skipped.".to_string());
    }
    let declared = design.expected.len();
    if declared > 0 {
        let off = report
            .incorrect
            .iter()
            .chain(&report.missing)
            .filter(|f| f.category == FindingCategory::ExpectedQuantity)
            .count();
        parts.push(format!(
            "{} of {} expected quantities are reproduced.",
            declared.saturating_sub(off),
            declared
        ));
    } else {
        parts.push("The design declares no quantitative expectations.".to_string());
    }
    parts.join(" ")
}

fn key_findings(design: &ExperimentDesign, result: &SimulationResult) -> Vec<String> {
    let mut items = Vec::new();
    for (name, expected) in &design.expected {
        match result.quantities.get(name) {
            Some(q) => items.push(format!(
                "{} = {:.6} {} (expected {:.6})",
                name, q.value, q.unit, expected
            )),
            None => items.push(format!("{} not produced (expected {:.6})", name, expected)),
        }
    }
    for (name, q) in result
        .quantities
        .iter()
        .filter(|(name, _)| !design.expected.contains_key(*name) && !name.starts_with("sampled."))
        .take(KEY_QUANTITIES.saturating_sub(items.len()))
    {
        items.push(format!("{} = {:.6} {}", name, q.value, q.unit));
    }
    items
}

fn limitations(result: &SimulationResult) -> Vec<String> {
    let mut items = vec![
        "Photons are treated as perfectly indistinguishable in every degree of freedom other than mode."
            .to_string(),
        "Sources emit exactly their nominal photon number; multi-pair emission is not modeled.".to_string(),
        "Timing jitter and spectral filtering shape are not simulated.".to_string(),
    ];
    if result.metadata.loss_modes > 0 {
        items.push(format!(
            "Losses are modeled as {} independent beam-splitter couplings.",
            result.metadata.loss_modes
        ));
    }
    if result.trace.iter().any(|l| l.starts_with("sampling skipped")) {
        items.push("Monte-Carlo sampling was skipped for this run.".to_string());
    }
    items
}

fn recommendations(report: &AnalysisReport) -> Vec<String> {
    let mut items: Vec<String> = report
        .incorrect
        .iter()
        .chain(&report.missing)
        .map(|f| match &f.component {
            Some(c) => format!("Revise '{}': {}", c, f.message),
            None => format!("Address {}: {}", f.category.as_str(), f.message),
        })
        .collect();
    if items.is_empty() {
        items.push("No changes required.".to_string());
    }
    items
}
