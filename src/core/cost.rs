// src/core/cost.rs — Token and cost accounting per run phase

use std::collections::BTreeMap;

use serde::Serialize;

use crate::provider::TokenUsage;

/// USD per million (prompt, completion) tokens, matched by model-name
/// fragment. First match wins, so more specific fragments come first.
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.0, 75.0),
    ("claude-sonnet", 3.0, 15.0),
    ("haiku", 0.8, 4.0),
    ("gpt-4.1-mini", 0.4, 1.6),
    ("gpt-4.1", 2.0, 8.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("o3-mini", 1.1, 4.4),
    ("o4-mini", 1.1, 4.4),
    ("o3", 10.0, 40.0),
];

/// Locally served model families. Never billed.
const LOCAL_FAMILIES: &[&str] = &["llama", "mistral", "gemma", "qwen", "deepseek"];

/// Offline designers used in tests and demos. Never billed.
const OFFLINE_PREFIXES: &[&str] = &["mock", "scripted"];

const FALLBACK_PRICE: (f64, f64) = (1.0, 3.0);

/// Usage attributed to one phase (`design`, `critique`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub calls: u64,
}

impl PhaseUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    fn merge(&mut self, other: &PhaseUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cost_usd += other.cost_usd;
        self.calls += other.calls;
    }
}

/// Model spend for one refinement run, split by phase.
#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    pub total_usd: f64,
    pub by_phase: BTreeMap<String, PhaseUsage>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bill one accepted model call to `phase`.
    pub fn record_with_phase(&mut self, model: &str, usage: &TokenUsage, phase: &str) {
        let call = PhaseUsage {
            prompt_tokens: usage.input_tokens as u64,
            completion_tokens: usage.output_tokens as u64,
            cost_usd: calculate_cost(model, usage),
            calls: 1,
        };
        self.total_usd += call.cost_usd;
        self.by_phase.entry(phase.into()).or_default().merge(&call);
    }

    /// Make sure a phase shows up in reports even if it used no tokens.
    pub fn touch_phase(&mut self, phase: &str) {
        self.by_phase.entry(phase.into()).or_default();
    }

    pub fn combined(&self) -> PhaseUsage {
        let mut all = PhaseUsage::default();
        for phase in self.by_phase.values() {
            all.merge(phase);
        }
        all
    }

    pub fn total_tokens(&self) -> u64 {
        self.combined().total_tokens()
    }

    pub fn total_calls(&self) -> u64 {
        self.combined().calls
    }

    pub fn summary(&self) -> String {
        format!(
            "${:.6} total ({} tokens, {} calls)",
            self.total_usd,
            self.total_tokens(),
            self.total_calls()
        )
    }
}

pub fn calculate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let (prompt_price, completion_price) = model_pricing(model);
    (usage.input_tokens as f64 * prompt_price + usage.output_tokens as f64 * completion_price)
        / 1_000_000.0
}

/// (prompt, completion) USD per million tokens.
pub fn model_pricing(model: &str) -> (f64, f64) {
    if OFFLINE_PREFIXES.iter().any(|p| model.starts_with(p))
        || LOCAL_FAMILIES.iter().any(|f| model.contains(f))
    {
        return (0.0, 0.0);
    }
    PRICE_TABLE
        .iter()
        .find(|(fragment, _, _)| model.contains(*fragment))
        .map(|&(_, prompt, completion)| (prompt, completion))
        .unwrap_or(FALLBACK_PRICE)
}
