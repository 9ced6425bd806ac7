// src/critique/physics.rs — Physics-correctness checks (the `incorrect` set)

use std::collections::BTreeSet;

use super::{Finding, FindingCategory, Severity};
use crate::design::{ComponentKind, ExperimentDesign};
use crate::simulation::sampler::standard_error;
use crate::simulation::{ExecutionError, SanityViolation, SimulationResult};

/// Counting electronics saturate well before this.
pub const MAX_RATE_HZ: f64 = 1e9;
pub const MAX_SQUEEZING_DB: f64 = 20.0;
/// Sampled fractions further than this many standard errors from the exact
/// value are inconsistent.
pub const SAMPLING_SIGMAS: f64 = 5.0;
pub const EXPECTED_ABS_TOLERANCE: f64 = 0.02;
pub const EXPECTED_REL_TOLERANCE: f64 = 0.05;

/// Tolerance for comparing a declared expectation with a simulated value.
pub fn expected_tolerance(expected: f64) -> f64 {
    EXPECTED_ABS_TOLERANCE.max(EXPECTED_REL_TOLERANCE * expected.abs())
}

pub fn incorrect_findings(design: &ExperimentDesign, result: &SimulationResult) -> BTreeSet<Finding> {
    let mut out = BTreeSet::new();
    if let Some(error) = &result.error {
        out.insert(execution_finding(error));
    }
    for v in &result.violations {
        out.insert(violation_finding(v));
    }
    parameter_findings(design, &mut out);
    non_finite_findings(result, &mut out);
    if result.success {
        rate_findings(design, result, &mut out);
        sampling_findings(design, result, &mut out);
        expected_findings(design, result, &mut out);
    }
    out
}

fn execution_finding(error: &ExecutionError) -> Finding {
    let category = match error {
        ExecutionError::DimensionMismatch { .. } | ExecutionError::ModeOutOfRange { .. } => {
            FindingCategory::Dimension
        }
        _ => FindingCategory::Execution,
    };
    Finding::new(
        Severity::Critical,
        category,
        error.component(),
        format!("simulation failed: {}", error),
    )
}

fn violation_finding(v: &SanityViolation) -> Finding {
    let (severity, category) = match v {
        SanityViolation::Normalization { .. } | SanityViolation::OutcomeOutOfRange { .. } => {
            (Severity::Critical, FindingCategory::Normalization)
        }
        SanityViolation::Uncertainty { .. } => (Severity::Critical, FindingCategory::Uncertainty),
        SanityViolation::EnergyMismatch { .. } => (Severity::Major, FindingCategory::Energy),
    };
    Finding::new(severity, category, v.component(), v.to_string())
}

fn non_finite_findings(result: &SimulationResult, out: &mut BTreeSet<Finding>) {
    for (name, q) in &result.quantities {
        if !q.value.is_finite() {
            out.insert(Finding::new(
                Severity::Critical,
                FindingCategory::Parameter,
                None,
                format!("{} is not a finite number ({})", name, q.value),
            ));
        }
    }
}

fn out_of_unit_range(
    out: &mut BTreeSet<Finding>,
    component: &str,
    name: &str,
    value: f64,
) {
    if !(0.0..=1.0).contains(&value) {
        out.insert(Finding::new(
            Severity::Major,
            FindingCategory::Parameter,
            Some(component),
            format!("{} {:.3} outside [0, 1]", name, value),
        ));
    }
}

fn rate_too_high(out: &mut BTreeSet<Finding>, component: &str, name: &str, rate: f64) {
    if rate.is_nan() || rate > MAX_RATE_HZ {
        out.insert(Finding::new(
            Severity::Critical,
            FindingCategory::Rate,
            Some(component),
            format!("{} {:.3e} Hz exceeds {:.0e} Hz", name, rate, MAX_RATE_HZ),
        ));
    }
}

fn parameter_findings(design: &ExperimentDesign, out: &mut BTreeSet<Finding>) {
    for c in &design.components {
        let id = c.id.as_str();
        match &c.kind {
            ComponentKind::BeamSplitter(p) => out_of_unit_range(out, id, "reflectivity", p.reflectivity),
            ComponentKind::Mirror(p) => out_of_unit_range(out, id, "reflectivity", p.reflectivity),
            ComponentKind::Filter(p) => out_of_unit_range(out, id, "transmission", p.transmission),
            ComponentKind::Detector(p) => {
                out_of_unit_range(out, id, "efficiency", p.efficiency);
                if p.dark_count_hz < 0.0 {
                    out.insert(Finding::new(
                        Severity::Major,
                        FindingCategory::Parameter,
                        Some(id),
                        format!("dark count rate {:.3} Hz is negative", p.dark_count_hz),
                    ));
                }
            }
            ComponentKind::Source(p) => {
                if let Some(rate) = p.rate_hz {
                    rate_too_high(out, id, "source rate", rate);
                }
            }
            ComponentKind::Crystal(p) => {
                if let Some(rate) = p.pair_rate_hz {
                    rate_too_high(out, id, "pair rate", rate);
                }
                if let Some(db) = p.squeezing_db {
                    if db > MAX_SQUEEZING_DB {
                        out.insert(Finding::new(
                            Severity::Major,
                            FindingCategory::Parameter,
                            Some(id),
                            format!(
                                "squeezing {:.1} dB beyond the {:.0} dB achievable",
                                db, MAX_SQUEEZING_DB
                            ),
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

fn rate_findings(design: &ExperimentDesign, result: &SimulationResult, out: &mut BTreeSet<Finding>) {
    for (c, p) in design.detectors() {
        let Some(rate) = result.value(&format!("count_rate_hz.{}", c.id)) else {
            continue;
        };
        rate_too_high(out, &c.id, "count rate", rate);
        if let Some(dead_ns) = p.dead_time_ns.filter(|t| *t > 0.0) {
            let limit = 1.0 / (dead_ns * 1e-9);
            if rate > limit && rate <= MAX_RATE_HZ {
                out.insert(Finding::new(
                    Severity::Major,
                    FindingCategory::Rate,
                    Some(&c.id),
                    format!(
                        "count rate {:.3e} Hz exceeds the dead-time limit {:.3e} Hz",
                        rate, limit
                    ),
                ));
            }
        }
    }
}

fn sampling_findings(
    design: &ExperimentDesign,
    result: &SimulationResult,
    out: &mut BTreeSet<Finding>,
) {
    let shots = result.metadata.shots;
    let mut pairs: Vec<(String, String, Option<String>)> = design
        .detectors()
        .map(|(c, _)| {
            (
                format!("click_probability.{}", c.id),
                format!("sampled.click_fraction.{}", c.id),
                Some(c.id.clone()),
            )
        })
        .collect();
    pairs.push((
        "coincidence_probability".into(),
        "sampled.coincidence_fraction".into(),
        None,
    ));

    for (exact_name, sampled_name, component) in pairs {
        let (Some(exact), Some(sampled)) = (result.value(&exact_name), result.value(&sampled_name))
        else {
            continue;
        };
        let sigma = standard_error(exact.clamp(0.0, 1.0), shots);
        let deviation = (sampled - exact).abs();
        if deviation > SAMPLING_SIGMAS * sigma + 1e-12 {
            out.insert(Finding::new(
                Severity::Major,
                FindingCategory::Statistics,
                component.as_deref(),
                format!(
                    "{} = {:.4} deviates from exact {:.4} by more than {:.0} sigma",
                    sampled_name, sampled, exact, SAMPLING_SIGMAS
                ),
            ));
        }
    }
}

fn expected_findings(
    design: &ExperimentDesign,
    result: &SimulationResult,
    out: &mut BTreeSet<Finding>,
) {
    for (name, &expected) in &design.expected {
        let Some(actual) = result.value(name) else {
            continue;
        };
        let tolerance = expected_tolerance(expected);
        let deviation = (actual - expected).abs();
        if deviation > tolerance {
            let severity = if deviation > 3.0 * tolerance {
                Severity::Major
            } else {
                Severity::Minor
            };
            out.insert(Finding::new(
                severity,
                FindingCategory::ExpectedQuantity,
                None,
                format!(
                    "{}: design expects {:.4}, simulation gives {:.4}",
                    name, expected, actual
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fixtures;
    use crate::design::parse::parse_design;
    use crate::simulation::{LinearOpticsExecutor, SimulationExecutor};

    fn run(design: &ExperimentDesign) -> SimulationResult {
        LinearOpticsExecutor::default()
            .with_seed(7)
            .with_shots(10_000)
            .execute(design)
    }

    #[test]
    fn test_clean_bb84_has_no_findings() {
        let d = fixtures::bb84();
        assert!(incorrect_findings(&d, &run(&d)).is_empty());
    }

    #[test]
    fn test_expected_tolerance() {
        assert_eq!(expected_tolerance(0.0), 0.02);
        assert!((expected_tolerance(10.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_expected_quantity_mismatch() {
        let mut d = fixtures::hom();
        d.expected.insert("coincidence_probability".into(), 0.5);
        let findings = incorrect_findings(&d, &run(&d));
        let f = findings.iter().next().unwrap();
        assert_eq!(f.category, FindingCategory::ExpectedQuantity);
        assert_eq!(f.severity, Severity::Major);
        assert_eq!(
            f.message,
            "coincidence_probability: design expects 0.5000, simulation gives 0.0000"
        );
    }

    #[test]
    fn test_parameter_and_rate_findings() {
        let d = parse_design(
            r#"{"title":"t","modes":2,"components":[
                {"id":"src","type":"source","parameters":{"mode":0,"rate_hz":1e11}},
                {"id":"bs","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1,"reflectivity":1.3}},
                {"id":"opo","type":"crystal","parameters":{"signal_mode":0,"idler_mode":1,"squeezing_db":68,"anti_squeezing_db":3}},
                {"id":"d","type":"detector","parameters":{"mode":0,"dead_time_ns":50}}]}"#,
            1,
        )
        .unwrap();
        let findings = incorrect_findings(&d, &run(&d));
        let has = |cat: FindingCategory, comp: &str| {
            findings
                .iter()
                .any(|f| f.category == cat && f.component.as_deref() == Some(comp))
        };
        assert!(has(FindingCategory::Rate, "src"));
        assert!(has(FindingCategory::Parameter, "bs"));
        assert!(has(FindingCategory::Parameter, "opo"));
        assert!(has(FindingCategory::Uncertainty, "opo"));
        assert!(has(FindingCategory::Rate, "d"));
    }

    #[test]
    fn test_dead_time_limit_is_major() {
        let d = parse_design(
            r#"{"title":"t","modes":1,"components":[
                {"id":"src","type":"source","parameters":{"mode":0,"rate_hz":5e7}},
                {"id":"d","type":"detector","parameters":{"mode":0,"dead_time_ns":50}}]}"#,
            1,
        )
        .unwrap();
        let findings = incorrect_findings(&d, &run(&d));
        assert_eq!(findings.len(), 1);
        let f = findings.iter().next().unwrap();
        assert_eq!(f.severity, Severity::Major);
        assert_eq!(f.category, FindingCategory::Rate);
    }

    #[test]
    fn test_execution_failure_is_dimension_finding() {
        let d = parse_design(
            r#"{"title":"t","modes":2,"components":[
                {"id":"s","type":"source","parameters":{"mode":0}},
                {"id":"mzi","type":"interferometer","parameters":{"dimension":4}}]}"#,
            1,
        )
        .unwrap();
        let findings = incorrect_findings(&d, &run(&d));
        let f = findings.iter().next().unwrap();
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.category, FindingCategory::Dimension);
        assert_eq!(f.component.as_deref(), Some("mzi"));
    }

    #[test]
    fn test_non_finite_quantity_is_critical() {
        let d = fixtures::bb84();
        let mut r = run(&d);
        r.quantities.get_mut("count_rate_hz.det_h").unwrap().value = f64::NAN;
        let findings = incorrect_findings(&d, &r);
        assert!(findings.iter().any(|f| f.severity == Severity::Critical
            && f.category == FindingCategory::Parameter
            && f.message.starts_with("count_rate_hz.det_h is not a finite number")));
        assert!(findings.iter().any(|f| f.category == FindingCategory::Rate
            && f.component.as_deref() == Some("det_h")));
    }

    #[test]
    fn test_sampling_inconsistency_detected() {
        let d = fixtures::bb84();
        let mut r = run(&d);
        r.quantities.get_mut("sampled.click_fraction.det_h").unwrap().value = 0.5;
        let findings = incorrect_findings(&d, &r);
        assert!(findings
            .iter()
            .any(|f| f.category == FindingCategory::Statistics
                && f.component.as_deref() == Some("det_h")));
    }
}
