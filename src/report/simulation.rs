// src/report/simulation.rs — simulation_report.md: rating, trace, analysis, design alignment

use std::fmt;

use crate::core::types::{IterationRecord, RunOutcome};

/// One-line judgement of how well the simulation follows the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentVerdict {
    Success,
    Partial,
    Failure,
}

impl fmt::Display for AlignmentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentVerdict::Success => write!(f, "SUCCESS"),
            AlignmentVerdict::Partial => write!(f, "PARTIAL"),
            AlignmentVerdict::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Below this alignment the simulation is not a rendition of the design.
const PARTIAL_ALIGNMENT: u8 = 4;

pub fn alignment_verdict(record: &IterationRecord) -> AlignmentVerdict {
    let report = &record.report;
    if !record.result.success || report.alignment_score < PARTIAL_ALIGNMENT {
        AlignmentVerdict::Failure
    } else if report.models_design_accurately {
        AlignmentVerdict::Success
    } else {
        AlignmentVerdict::Partial
    }
}

pub fn render(outcome: &RunOutcome) -> String {
    let Some(record) = outcome.best() else {
        return render_without_design(outcome);
    };
    let design = &record.design;
    let report = &record.report;

    let mut out = format!("# Simulation Report: {}\n\n", design.title);
    out.push_str(&format!(
        "**Quality rating:** {}/10  \n**Verdict:** {}  \n**Iteration:** {} of {} ({}, design v{})\n\n",
        report.quality_rating,
        report.verdict,
        record.iteration,
        outcome.state.iterations(),
        outcome.termination,
        design.version,
    ));

    out.push_str("## Execution Trace\n\n```text\n");
    out.push_str(&record.result.trace_text());
    out.push_str("\n```\n\n");

    out.push_str("## Physics Analysis\n\n");
    out.push_str(&report.analysis.to_markdown());

    out.push_str("## Design Alignment\n\n");
    for line in design.physics_goal.trim().lines() {
        out.push_str(&format!("> {}\n", line));
    }
    let verdict = alignment_verdict(record);
    out.push_str(&format!(
        "\n**{}**: alignment {}/10, physics match {}.\n",
        verdict, report.alignment_score, report.physics_match_quality
    ));
    out
}

fn render_without_design(outcome: &RunOutcome) -> String {
    let mut out = "# Simulation Report: (no design produced)\n\n".to_string();
    out.push_str(&format!("**Termination:** {}\n\n", outcome.termination));
    if let Some(err) = &outcome.generation_error {
        out.push_str(&format!("Last generation error: {}\n\n", err));
    }
    out.push_str("## Design Alignment\n\n");
    out.push_str(&format!("> {}\n\n**{}**: no simulation was run.\n", outcome.goal.trim(), AlignmentVerdict::Failure));
    out
}
