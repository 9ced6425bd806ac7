// tests/critique_test.rs — Integration test: critique engine over executed designs

use labloop::critique::{
    AnalysisReport, Critic, FindingCategory, PhysicsCritic, PhysicsMatch, Verdict,
};
use labloop::design::parse::parse_design;
use labloop::design::{DesignError, ExperimentDesign};
use labloop::simulation::{LinearOpticsExecutor, SimulationExecutor, SimulationResult};

fn design(modes: usize, components: &str, expected: &str) -> ExperimentDesign {
    let text = format!(
        r#"{{"title":"sample","physics_goal":"exercise the critic","modes":{},"components":[{}],"expected":{{{}}}}}"#,
        modes, components, expected
    );
    parse_design(&text, 1).unwrap()
}

fn run(d: &ExperimentDesign) -> SimulationResult {
    LinearOpticsExecutor::default()
        .with_seed(21)
        .with_shots(4000)
        .execute(d)
}

fn critique(d: &ExperimentDesign) -> AnalysisReport {
    PhysicsCritic::new().evaluate(d, &run(d))
}

fn hom() -> ExperimentDesign {
    design(
        2,
        r#"{"id":"s0","type":"source","parameters":{"mode":0}},
           {"id":"s1","type":"source","parameters":{"mode":1}},
           {"id":"bs","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1,"reflectivity":0.5}},
           {"id":"d0","type":"detector","parameters":{"mode":0}},
           {"id":"d1","type":"detector","parameters":{"mode":1}}"#,
        r#""coincidence_probability":0.0"#,
    )
}

/// `models_design_accurately` holds exactly when both finding sets are empty.
fn assert_accuracy_consistent(r: &AnalysisReport) {
    assert_eq!(
        r.models_design_accurately,
        r.missing.is_empty() && r.incorrect.is_empty(),
        "missing={:?} incorrect={:?}",
        r.missing,
        r.incorrect
    );
}

// ─── Idempotence ────────────────────────────────────────────

#[test]
fn test_critique_is_idempotent() {
    let d = hom();
    let r = run(&d);
    let critic = PhysicsCritic::new();
    let first = critic.evaluate(&d, &r);
    let second = critic.evaluate(&d, &r);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first.to_json()).unwrap(),
        serde_json::to_string(&second.to_json()).unwrap()
    );
}

#[test]
fn test_async_critique_matches_evaluate() {
    let d = hom();
    let r = run(&d);
    let critic = PhysicsCritic::new();
    let direct = critic.evaluate(&d, &r);
    let via_trait = tokio_test::block_on(critic.critique(&d, &r));
    assert_eq!(direct, via_trait);
}

// ─── Accuracy ───────────────────────────────────────────────

#[test]
fn test_faithful_design_is_accurate() {
    let r = critique(&hom());
    assert!(r.models_design_accurately);
    assert_eq!(r.alignment_score, 10);
    assert_eq!(r.quality_rating, 10);
    assert_eq!(r.verdict, Verdict::Excellent);
    assert_eq!(r.physics_match_quality, PhysicsMatch::Exact);
    assert_accuracy_consistent(&r);
}

#[test]
fn test_identity_component_is_missing() {
    // A full-transmission splitter does nothing
    let d = design(
        2,
        r#"{"id":"s","type":"source","parameters":{"mode":0}},
           {"id":"bs","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1,"reflectivity":0.0}},
           {"id":"d","type":"detector","parameters":{"mode":0}}"#,
        "",
    );
    let r = critique(&d);
    assert!(r.has_category(FindingCategory::CollapsedComponent));
    assert!(!r.models_design_accurately);
    assert!(r.alignment_score < 10);
    assert_accuracy_consistent(&r);
}

#[test]
fn test_cancelling_phase_shifters_collapse() {
    let d = design(
        2,
        r#"{"id":"s0","type":"source","parameters":{"mode":0}},
           {"id":"bs1","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1}},
           {"id":"ps1","type":"phase_shifter","parameters":{"mode":0,"phase_rad":1.5707963267948966}},
           {"id":"ps2","type":"phase_shifter","parameters":{"mode":0,"phase_rad":-1.5707963267948966}},
           {"id":"d0","type":"detector","parameters":{"mode":0}}"#,
        "",
    );
    let r = critique(&d);
    assert!(r.has_category(FindingCategory::CollapsedComponent));
    assert!(!r.models_design_accurately);
    assert!(r.alignment_score < 10);
    assert_accuracy_consistent(&r);
}

#[test]
fn test_non_finite_parameters_never_reach_the_critic() {
    let text = r#"{"title":"t","modes":1,"components":[
        {"id":"s","type":"source","parameters":{"mode":0,"rate_hz":"NaN"}},
        {"id":"d","type":"detector","parameters":{"mode":0}}]}"#;
    assert!(matches!(
        parse_design(text, 1).unwrap_err(),
        DesignError::WrongType { .. }
    ));
}

#[test]
fn test_wrong_expectation_is_incorrect() {
    let d = design(
        2,
        r#"{"id":"s0","type":"source","parameters":{"mode":0}},
           {"id":"s1","type":"source","parameters":{"mode":1}},
           {"id":"bs","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1,"reflectivity":0.5}},
           {"id":"d0","type":"detector","parameters":{"mode":0}},
           {"id":"d1","type":"detector","parameters":{"mode":1}}"#,
        r#""coincidence_probability":0.5"#,
    );
    let r = critique(&d);
    assert!(r.has_category(FindingCategory::ExpectedQuantity));
    assert!(r.missing.is_empty());
    assert!(!r.models_design_accurately);
    assert_eq!(r.physics_match_quality, PhysicsMatch::Approximate);
    assert_accuracy_consistent(&r);
}

#[test]
fn test_unnormalized_output_caps_alignment() {
    let d = design(
        1,
        r#"{"id":"s","type":"source","parameters":{"mode":0}},
           {"id":"amp","type":"filter","parameters":{"mode":0,"transmission":2.0}},
           {"id":"d","type":"detector","parameters":{"mode":0}}"#,
        "",
    );
    let r = critique(&d);
    assert!(r.alignment_score <= 3);
    assert!(r.has_category(FindingCategory::Normalization));
    assert_eq!(r.verdict, Verdict::Poor);
    assert_eq!(r.physics_match_quality, PhysicsMatch::Wrong);
    assert!(r.analysis.correctness.contains("without renormalization"));
    assert_accuracy_consistent(&r);
}

#[test]
fn test_failed_execution_still_reports() {
    let d = design(
        2,
        r#"{"id":"s","type":"source","parameters":{"mode":0}},
           {"id":"mzi","type":"interferometer","parameters":{"dimension":5}},
           {"id":"d","type":"detector","parameters":{"mode":1}}"#,
        r#""click_probability.d":0.5"#,
    );
    let r = critique(&d);
    assert_eq!(r.quality_rating, 2);
    assert!(r.has_category(FindingCategory::Dimension));
    // Components after the fault are not blamed as missing
    assert!(!r.has_category(FindingCategory::MissingComponent));
    assert_eq!(r.physics_match_quality, PhysicsMatch::Wrong);
    assert!(!r.analysis.limitations.is_empty() || !r.analysis.recommendations.is_empty());
    assert_accuracy_consistent(&r);
}
