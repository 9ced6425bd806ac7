// src/core/types.rs — Refinement state, iteration records, run outcome, progress events

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cost::CostTracker;
use crate::critique::{AnalysisReport, Verdict};
use crate::design::ExperimentDesign;
use crate::simulation::SimulationResult;

/// Pipeline stage of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Design,
    Simulate,
    Critique,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Design => write!(f, "design"),
            Stage::Simulate => write!(f, "simulate"),
            Stage::Critique => write!(f, "critique"),
        }
    }
}

/// What the controller does after a critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Converged,
    Revise,
    Exhausted,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Converged => write!(f, "converged"),
            Decision::Revise => write!(f, "revise"),
            Decision::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Termination {
    Converged,
    Exhausted,
    Cancelled,
    GenerationFailed,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "CONVERGED"),
            Termination::Exhausted => write!(f, "EXHAUSTED"),
            Termination::Cancelled => write!(f, "CANCELLED"),
            Termination::GenerationFailed => write!(f, "GENERATION_FAILED"),
        }
    }
}

/// One completed design → simulate → critique pass. The result was produced
/// from exactly this design.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: u8,
    pub design: Arc<ExperimentDesign>,
    pub result: SimulationResult,
    pub report: AnalysisReport,
    /// Generation attempts spent on this design, including the successful one.
    pub generation_attempts: u32,
    pub decision: Decision,
    pub duration: Duration,
}

/// State of one refinement run. Owned by the controller; frozen at
/// termination.
#[derive(Debug, Clone)]
pub struct RefinementState {
    max_iterations: u8,
    converged: bool,
    history: Vec<IterationRecord>,
    termination: Option<Termination>,
}

impl RefinementState {
    pub fn new(max_iterations: u8) -> Self {
        Self {
            max_iterations,
            converged: false,
            history: Vec::new(),
            termination: None,
        }
    }

    /// Completed iterations. Never exceeds `max_iterations`.
    pub fn iterations(&self) -> u8 {
        self.history.len() as u8
    }

    pub fn max_iterations(&self) -> u8 {
        self.max_iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn is_frozen(&self) -> bool {
        self.termination.is_some()
    }

    pub fn can_iterate(&self) -> bool {
        !self.is_frozen() && self.iterations() < self.max_iterations
    }

    pub(crate) fn push(&mut self, record: IterationRecord) {
        debug_assert!(self.can_iterate());
        if self.can_iterate() {
            self.history.push(record);
        }
    }

    pub(crate) fn freeze(&mut self, termination: Termination) {
        if self.is_frozen() {
            return;
        }
        self.converged = termination == Termination::Converged;
        self.termination = Some(termination);
    }

    /// Index of the record to report: fewest incorrect findings, then the
    /// highest alignment + quality, then the earliest.
    pub fn best_index(&self) -> Option<usize> {
        if self.converged {
            return self.history.len().checked_sub(1);
        }
        self.history
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| {
                (
                    r.report.incorrect.len(),
                    std::cmp::Reverse(r.report.alignment_score as u16 + r.report.quality_rating as u16),
                )
            })
            .map(|(i, _)| i)
    }

    pub fn best(&self) -> Option<&IterationRecord> {
        self.best_index().and_then(|i| self.history.get(i))
    }
}

/// Everything a finished run hands to the report sink.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub id: String,
    pub goal: String,
    pub state: RefinementState,
    pub termination: Termination,
    pub cost: CostTracker,
    pub started_at: DateTime<Utc>,
    pub total_time: Duration,
    /// Last generation failure, when the run ended without a design.
    pub generation_error: Option<String>,
}

impl RunOutcome {
    pub fn best(&self) -> Option<&IterationRecord> {
        self.state.best()
    }

    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// Real-time progress notifications for the CLI.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    IterationStart {
        iteration: u8,
        max_iterations: u8,
    },
    StageStart {
        iteration: u8,
        stage: Stage,
    },
    GenerationRetry {
        attempt: u32,
        kind: &'static str,
        message: String,
    },
    ExecutionRetry {
        attempt: u32,
        message: String,
    },
    IterationEnd {
        iteration: u8,
        alignment: u8,
        quality: u8,
        verdict: Verdict,
        decision: Decision,
    },
    Complete {
        termination: Termination,
        iterations: u8,
        cost: f64,
    },
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    // ─── RefinementState ────────────────────────────────────────

    #[test]
    fn test_state_new() {
        let s = RefinementState::new(3);
        assert_eq!(s.iterations(), 0);
        assert_eq!(s.max_iterations(), 3);
        assert!(!s.converged());
        assert!(s.history().is_empty());
        assert!(s.can_iterate());
        assert!(s.best().is_none());
    }

    #[test]
    fn test_state_never_exceeds_max() {
        let mut s = RefinementState::new(2);
        s.push(record(1, 5, 5, 1));
        s.push(record(2, 5, 5, 1));
        assert!(!s.can_iterate());
        assert_eq!(s.iterations(), 2);
    }

    #[test]
    fn test_freeze_is_final() {
        let mut s = RefinementState::new(3);
        s.push(record(1, 9, 9, 0));
        s.freeze(Termination::Converged);
        s.freeze(Termination::Cancelled);
        assert_eq!(s.termination(), Some(Termination::Converged));
        assert!(s.converged());
        assert!(!s.can_iterate());
    }

    // ─── Best record ────────────────────────────────────────────

    #[test]
    fn test_best_prefers_fewest_incorrect() {
        let mut s = RefinementState::new(3);
        s.push(record(1, 10, 10, 2));
        s.push(record(2, 3, 3, 1));
        s.push(record(3, 9, 9, 3));
        s.freeze(Termination::Exhausted);
        assert_eq!(s.best_index(), Some(1));
    }

    #[test]
    fn test_best_breaks_ties_on_score_then_earliest() {
        let mut s = RefinementState::new(3);
        s.push(record(1, 4, 4, 1));
        s.push(record(2, 6, 5, 1));
        s.push(record(3, 5, 6, 1));
        s.freeze(Termination::Exhausted);
        assert_eq!(s.best_index(), Some(1));
    }

    #[test]
    fn test_best_is_last_when_converged() {
        let mut s = RefinementState::new(3);
        s.push(record(1, 3, 3, 0));
        s.push(record(2, 8, 8, 0));
        s.freeze(Termination::Converged);
        assert_eq!(s.best_index(), Some(1));
    }

    // ─── Display ────────────────────────────────────────────────

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Converged.to_string(), "CONVERGED");
        assert_eq!(Termination::GenerationFailed.to_string(), "GENERATION_FAILED");
        assert_eq!(Stage::Simulate.to_string(), "simulate");
        assert_eq!(Decision::Revise.to_string(), "revise");
    }
}
