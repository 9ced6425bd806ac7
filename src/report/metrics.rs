// src/report/metrics.rs — Metrics summary (metrics.json + metrics.md)

use serde::Serialize;

use crate::core::cost::{CostTracker, PhaseUsage};
use crate::core::types::RunOutcome;

/// Token usage of one phase, cost rendered with 6 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTokens {
    pub phase: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: String,
}

impl PhaseTokens {
    fn from_usage(phase: &str, usage: &PhaseUsage) -> Self {
        Self {
            phase: phase.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens(),
            cost_usd: format!("{:.6}", usage.cost_usd),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub title: String,
    pub description: String,
    pub figures_generated: u32,
    pub execution_success: bool,
    pub alignment_score: String,
    pub models_design_accurately: bool,
    pub physics_match_quality: String,
    pub converged: bool,
    pub termination: String,
    pub iteration_count: String,
    pub total_time: f64,
    pub missing: Vec<String>,
    pub incorrect: Vec<String>,
    pub token_usage: Vec<PhaseTokens>,
    pub total_usage: PhaseTokens,
}

/// Summarize the best record of a finished run.
pub fn summarize(outcome: &RunOutcome) -> MetricsSummary {
    let best = outcome.best();
    let (title, description) = match best {
        Some(r) => (r.design.title.clone(), r.design.physics_goal.clone()),
        None => ("(no design produced)".to_string(), outcome.goal.clone()),
    };
    let description = if description.trim().is_empty() {
        outcome.goal.clone()
    } else {
        description
    };

    MetricsSummary {
        title,
        description,
        // Diagram rendering is out of scope; nothing is ever drawn.
        figures_generated: 0,
        execution_success: best.map(|r| r.result.success).unwrap_or(false),
        alignment_score: format!(
            "{}/10",
            best.map(|r| r.report.alignment_score).unwrap_or(0)
        ),
        models_design_accurately: best
            .map(|r| r.report.models_design_accurately)
            .unwrap_or(false),
        physics_match_quality: best
            .map(|r| r.report.physics_match_quality.to_string())
            .unwrap_or_else(|| "n/a".to_string()),
        converged: outcome.converged(),
        termination: outcome.termination.to_string(),
        iteration_count: format!(
            "{}/{}",
            outcome.state.iterations(),
            outcome.state.max_iterations()
        ),
        total_time: (outcome.total_time.as_secs_f64() * 100.0).round() / 100.0,
        missing: best
            .map(|r| r.report.missing.iter().map(|f| f.to_string()).collect())
            .unwrap_or_default(),
        incorrect: best
            .map(|r| r.report.incorrect.iter().map(|f| f.to_string()).collect())
            .unwrap_or_default(),
        token_usage: phase_rows(&outcome.cost),
        total_usage: PhaseTokens::from_usage("total", &outcome.cost.combined()),
    }
}

fn phase_rows(cost: &CostTracker) -> Vec<PhaseTokens> {
    cost.by_phase
        .iter()
        .map(|(phase, usage)| PhaseTokens::from_usage(phase, usage))
        .collect()
}

pub fn to_json(summary: &MetricsSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

pub fn render_markdown(m: &MetricsSummary) -> String {
    let mut out = format!("# Metrics: {}\n\n{}\n\n", m.title, m.description.trim());

    out.push_str("| Metric | Value |\n|---|---|\n");
    let rows = [
        ("Figures generated", m.figures_generated.to_string()),
        ("Execution success", yes_no(m.execution_success)),
        ("Alignment score", m.alignment_score.clone()),
        ("Models design accurately", yes_no(m.models_design_accurately)),
        ("Physics match quality", m.physics_match_quality.clone()),
        ("Converged", yes_no(m.converged)),
        ("Termination", m.termination.clone()),
        ("Iterations", m.iteration_count.clone()),
        ("Total time", format!("{:.2}s", m.total_time)),
    ];
    for (k, v) in rows {
        out.push_str(&format!("| {} | {} |\n", k, v));
    }

    push_bullets(&mut out, "Missing", &m.missing);
    push_bullets(&mut out, "Incorrect", &m.incorrect);

    out.push_str("\n## Token Usage\n\n");
    out.push_str("| Phase | Prompt | Completion | Total | Cost (USD) |\n|---|---|---|---|---|\n");
    for p in m.token_usage.iter().chain(std::iter::once(&m.total_usage)) {
        out.push_str(&format!(
            "| {} | {} | {} | {} | ${} |\n",
            p.phase, p.prompt_tokens, p.completion_tokens, p.total_tokens, p.cost_usd
        ));
    }
    out
}

fn push_bullets(out: &mut String, heading: &str, items: &[String]) {
    out.push_str(&format!("\n## {}\n\n", heading));
    if items.is_empty() {
        out.push_str("- None\n");
    }
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

fn yes_no(b: bool) -> String {
    if b { "yes" } else { "no" }.to_string()
}
