// src/critique/mod.rs — Critique engine: physics correctness + design alignment → AnalysisReport

pub mod alignment;
pub mod narrative;
pub mod physics;
pub mod scoring;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::design::ExperimentDesign;
use crate::simulation::SimulationResult;

pub use narrative::Narrative;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    /// Quality points deducted per finding.
    pub fn penalty(self) -> u32 {
        match self {
            Severity::Critical => 6,
            Severity::Major => 3,
            Severity::Minor => 1,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Major => write!(f, "MAJOR"),
            Severity::Minor => write!(f, "MINOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Normalization,
    Dimension,
    Energy,
    Uncertainty,
    Rate,
    Parameter,
    Statistics,
    Execution,
    MissingComponent,
    CollapsedComponent,
    UnmodeledComponent,
    ExpectedQuantity,
}

impl FindingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingCategory::Normalization => "normalization",
            FindingCategory::Dimension => "dimension",
            FindingCategory::Energy => "energy",
            FindingCategory::Uncertainty => "uncertainty",
            FindingCategory::Rate => "rate",
            FindingCategory::Parameter => "parameter",
            FindingCategory::Statistics => "statistics",
            FindingCategory::Execution => "execution",
            FindingCategory::MissingComponent => "missing-component",
            FindingCategory::CollapsedComponent => "collapsed-component",
            FindingCategory::UnmodeledComponent => "unmodeled-component",
            FindingCategory::ExpectedQuantity => "expected-quantity",
        }
    }
}

/// One discrepancy. Ordered by severity first so reports list the worst
/// problems at the top.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: FindingCategory,
    pub component: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: FindingCategory,
        component: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            component: component.map(String::from),
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.category.as_str())?;
        if let Some(c) = &self.component {
            write!(f, " ({})", c)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Excellent => write!(f, "EXCELLENT"),
            Verdict::Good => write!(f, "GOOD"),
            Verdict::Fair => write!(f, "FAIR"),
            Verdict::Poor => write!(f, "POOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicsMatch {
    Exact,
    Close,
    Approximate,
    Wrong,
}

impl fmt::Display for PhysicsMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsMatch::Exact => write!(f, "exact"),
            PhysicsMatch::Close => write!(f, "close"),
            PhysicsMatch::Approximate => write!(f, "approximate"),
            PhysicsMatch::Wrong => write!(f, "wrong"),
        }
    }
}

/// Judgement of one (design, result) pair. Recomputed every iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub alignment_score: u8,
    pub quality_rating: u8,
    pub verdict: Verdict,
    pub models_design_accurately: bool,
    pub physics_match_quality: PhysicsMatch,
    pub missing: BTreeSet<Finding>,
    pub incorrect: BTreeSet<Finding>,
    pub analysis: Narrative,
}

impl AnalysisReport {
    /// A blank report with no findings. Useful as a starting point in tests
    /// and for hand-written critics.
    pub fn empty() -> Self {
        Self {
            alignment_score: 0,
            quality_rating: 0,
            verdict: Verdict::Poor,
            models_design_accurately: true,
            physics_match_quality: PhysicsMatch::Close,
            missing: BTreeSet::new(),
            incorrect: BTreeSet::new(),
            analysis: Narrative::default(),
        }
    }

    pub fn has_category(&self, category: FindingCategory) -> bool {
        self.incorrect
            .iter()
            .chain(&self.missing)
            .any(|f| f.category == category)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Judges a simulation against the design it came from.
#[async_trait]
pub trait Critic: Send + Sync {
    async fn critique(&self, design: &ExperimentDesign, result: &SimulationResult)
        -> AnalysisReport;
}

/// The built-in deterministic critic. Same inputs, same report.
#[derive(Debug, Clone, Default)]
pub struct PhysicsCritic;

impl PhysicsCritic {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, design: &ExperimentDesign, result: &SimulationResult) -> AnalysisReport {
        let incorrect = physics::incorrect_findings(design, result);
        let alignment = alignment::assess(design, result);
        let scores = scoring::score(design, result, &alignment, &incorrect);

        let mut report = AnalysisReport {
            alignment_score: scores.alignment,
            quality_rating: scores.quality,
            verdict: scores.verdict,
            models_design_accurately: alignment.missing.is_empty() && incorrect.is_empty(),
            physics_match_quality: scores.physics_match,
            missing: alignment.missing.clone(),
            incorrect,
            analysis: Narrative::default(),
        };
        report.analysis = narrative::write(design, result, &alignment, &report);
        report
    }
}

#[async_trait]
impl Critic for PhysicsCritic {
    async fn critique(
        &self,
        design: &ExperimentDesign,
        result: &SimulationResult,
    ) -> AnalysisReport {
        let report = self.evaluate(design, result);
        tracing::info!(
            design = %design.title,
            alignment = report.alignment_score,
            quality = report.quality_rating,
            verdict = %report.verdict,
            incorrect = report.incorrect.len(),
            missing = report.missing.len(),
            "Critique complete"
        );
        report
    }
}
