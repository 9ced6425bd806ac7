// src/critique/scoring.rs — Alignment score, quality rating, verdict, physics-match grade

use std::collections::BTreeSet;

use super::alignment::Alignment;
use super::{Finding, PhysicsMatch, Severity, Verdict};
use crate::design::ExperimentDesign;
use crate::simulation::SimulationResult;

/// Quality given to any run whose simulation failed.
pub const FAILED_EXECUTION_QUALITY: u8 = 2;
/// Alignment ceiling when the output is not a probability distribution.
pub const UNNORMALIZED_ALIGNMENT_CAP: u8 = 3;
/// At most this many points are lost to missing expected quantities.
pub const MAX_EXPECTED_PENALTY: usize = 3;
/// Expected values this close to the simulation count as exact.
pub const EXACT_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scores {
    pub alignment: u8,
    pub quality: u8,
    pub verdict: Verdict,
    pub physics_match: PhysicsMatch,
}

pub fn score(
    design: &ExperimentDesign,
    result: &SimulationResult,
    alignment: &Alignment,
    incorrect: &BTreeSet<Finding>,
) -> Scores {
    let alignment_score = alignment_score(result, alignment);
    let quality = quality_rating(result, incorrect);
    Scores {
        alignment: alignment_score,
        quality,
        // Shown next to the quality rating, so banded on quality alone.
        verdict: verdict(quality),
        physics_match: physics_match(design, result, incorrect),
    }
}

pub fn alignment_score(result: &SimulationResult, alignment: &Alignment) -> u8 {
    let base = (10.0 * alignment.implemented_fraction()).round() as i64;
    let penalty = alignment.missing_expected.len().min(MAX_EXPECTED_PENALTY) as i64;
    let mut score = (base - penalty).clamp(0, 10) as u8;
    if !result.is_normalized() {
        score = score.min(UNNORMALIZED_ALIGNMENT_CAP);
    }
    score
}

pub fn quality_rating(result: &SimulationResult, incorrect: &BTreeSet<Finding>) -> u8 {
    if !result.success {
        return FAILED_EXECUTION_QUALITY;
    }
    let penalty: u32 = incorrect.iter().map(|f| f.severity.penalty()).sum();
    10u32.saturating_sub(penalty) as u8
}

pub fn verdict(score: u8) -> Verdict {
    match score {
        9..=10 => Verdict::Excellent,
        7..=8 => Verdict::Good,
        4..=6 => Verdict::Fair,
        _ => Verdict::Poor,
    }
}

pub fn physics_match(
    design: &ExperimentDesign,
    result: &SimulationResult,
    incorrect: &BTreeSet<Finding>,
) -> PhysicsMatch {
    if !result.success || incorrect.iter().any(|f| f.severity == Severity::Critical) {
        return PhysicsMatch::Wrong;
    }
    if incorrect.iter().any(|f| f.severity == Severity::Major) {
        return PhysicsMatch::Approximate;
    }
    if !incorrect.is_empty() || design.expected.is_empty() {
        return PhysicsMatch::Close;
    }
    let exact = design.expected.iter().all(|(name, expected)| {
        result
            .value(name)
            .map(|v| (v - expected).abs() <= EXACT_TOLERANCE)
            .unwrap_or(false)
    });
    if exact {
        PhysicsMatch::Exact
    } else {
        PhysicsMatch::Close
    }
}
