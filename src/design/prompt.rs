// src/design/prompt.rs — Assembles designer prompts from goal, context and revision feedback

use super::revision::Revision;
use super::KNOWN_TYPES;

/// System prompt for the designer model: role, output schema, component catalogue.
pub fn build_system_prompt() -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str("# Role\n\n");
    prompt.push_str(
        "You are an experimental quantum-optics physicist. You design table-top \
         experiments that can be simulated as linear-optical networks acting on \
         photon-number states.\n\n",
    );

    append_schema_section(&mut prompt);
    append_catalogue_section(&mut prompt);

    prompt.push_str("# Rules\n\n");
    prompt.push_str("- Reply with a single JSON object and nothing else.\n");
    prompt.push_str("- Mode indices start at 0 and must be below `modes`.\n");
    prompt.push_str("- Component ids are unique and stable across revisions.\n");
    prompt.push_str(
        "- Put quantitative predictions in `expected`, keyed by simulated quantity \
         name (e.g. `coincidence_probability`, `click_probability.<detector id>`).\n",
    );
    prompt.push_str("- Use physically realizable parameter values.\n");

    prompt
}

fn append_schema_section(prompt: &mut String) {
    prompt.push_str("# Output Schema\n\n");
    prompt.push_str(
        "```json\n\
         {\n  \
           \"title\": \"short name\",\n  \
           \"physics_goal\": \"what the experiment demonstrates\",\n  \
           \"modes\": 2,\n  \
           \"components\": [\n    \
             {\"id\": \"bs1\", \"type\": \"beam_splitter\", \"justification\": \"why it is needed\",\n     \
              \"parameters\": {\"mode_a\": 0, \"mode_b\": 1, \"reflectivity\": 0.5}}\n  \
           ],\n  \
           \"expected_outcome\": \"what should be observed\",\n  \
           \"expected\": {\"coincidence_probability\": 0.0}\n\
         }\n\
         ```\n\n",
    );
}

fn append_catalogue_section(prompt: &mut String) {
    prompt.push_str("# Component Types\n\n");
    for tag in KNOWN_TYPES {
        let params = match *tag {
            "source" => "mode, photons=1, wavelength_nm=810, rate_hz",
            "crystal" => {
                "signal_mode, idler_mode, pump_wavelength_nm, signal_wavelength_nm, \
                 idler_wavelength_nm, pair_rate_hz, squeezing_db, anti_squeezing_db"
            }
            "beam_splitter" => "mode_a, mode_b, reflectivity=0.5, phase_rad=0",
            "phase_shifter" => "mode, phase_rad",
            "waveplate" => "mode_h, mode_v, angle_deg, retardance=half|quarter",
            "mirror" => "mode, reflectivity=1",
            "filter" => "mode, transmission=1, center_wavelength_nm, bandwidth_nm",
            "interferometer" => "dimension (= modes), kind=fourier|haar|identity, seed",
            "detector" => "mode, efficiency=1, dark_count_hz=0, dead_time_ns",
            "electronics" => "coincidence_window_ns",
            _ => "",
        };
        prompt.push_str(&format!("- `{}`: {}\n", tag, params));
    }
    prompt.push('\n');
}

/// User turn: the goal, optional context, and the findings a revision must answer.
pub fn build_user_prompt(goal: &str, context: Option<&str>, feedback: Option<&Revision>) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str("# Goal\n\n");
    prompt.push_str(goal.trim());
    prompt.push_str("\n\n");

    if let Some(ctx) = context {
        prompt.push_str("## Additional Context\n\n");
        prompt.push_str(ctx);
        prompt.push_str("\n\n");
    }

    if let Some(rev) = feedback {
        append_revision_section(&mut prompt, rev);
    }

    prompt
}

fn append_revision_section(prompt: &mut String, rev: &Revision) {
    let report = &rev.report;
    prompt.push_str("# Revise Previous Design\n\n");
    prompt.push_str(&format!(
        "Version {} scored alignment {}/10, quality {}/10 ({}).\n\n",
        rev.previous.version, report.alignment_score, report.quality_rating, report.verdict
    ));

    prompt.push_str("## Previous Design\n\n```json\n");
    prompt.push_str(
        &serde_json::to_string_pretty(rev.previous.as_ref()).unwrap_or_default(),
    );
    prompt.push_str("\n```\n\n");

    prompt.push_str("## Findings To Address\n\n");
    for finding in rev.findings() {
        prompt.push_str(&format!("- {}\n", finding));
    }
    prompt.push('\n');
    prompt.push_str(
        "Every finding naming a component requires that component to be changed \
         or removed. Findings without a component still require a change to the \
         design. Keep ids of untouched components.\n\n",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critique::{AnalysisReport, Finding, FindingCategory, Severity};
    use crate::design::fixtures;
    use std::sync::Arc;

    #[test]
    fn test_system_prompt_lists_every_type() {
        let p = build_system_prompt();
        for tag in KNOWN_TYPES {
            assert!(p.contains(&format!("`{}`", tag)), "missing {}", tag);
        }
        assert!(p.contains("single JSON object"));
    }

    #[test]
    fn test_user_prompt_without_extras() {
        let p = build_user_prompt("  Demonstrate HOM interference ", None, None);
        assert_eq!(p, "# Goal\n\nDemonstrate HOM interference\n\n");
    }

    #[test]
    fn test_user_prompt_with_context_and_revision() {
        let mut report = AnalysisReport::empty();
        report.incorrect.insert(Finding::new(
            Severity::Critical,
            FindingCategory::Normalization,
            None,
            "total probability 4.000000 differs from 1",
        ));
        let rev = Revision::new(Arc::new(fixtures::hom()), report);
        let p = build_user_prompt("HOM", Some("[1] paper\n"), Some(&rev));
        assert!(p.contains("## Additional Context\n\n[1] paper"));
        assert!(p.contains("# Revise Previous Design"));
        assert!(p.contains("\"beam_splitter\""));
        assert!(p.contains("total probability 4.000000 differs from 1"));
    }
}
