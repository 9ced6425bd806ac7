// src/design/revision.rs — Revision feedback and the contract a revised design must meet

use std::sync::Arc;

use super::{Component, ExperimentDesign};
use crate::critique::{AnalysisReport, Finding};

/// Feedback for the next generation: the design that was critiqued and its report.
#[derive(Debug, Clone)]
pub struct Revision {
    pub previous: Arc<ExperimentDesign>,
    pub report: AnalysisReport,
}

impl Revision {
    pub fn new(previous: Arc<ExperimentDesign>, report: AnalysisReport) -> Self {
        Self { previous, report }
    }

    /// Every finding the next design has to answer, incorrect first.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.report.incorrect.iter().chain(self.report.missing.iter())
    }
}

/// Findings from `revision` that `next` leaves unanswered.
///
/// A finding tied to a component is answered when that component is removed
/// or its type or parameters changed. A finding without a component is
/// answered by any change at all.
pub fn unaddressed_findings<'a>(revision: &'a Revision, next: &ExperimentDesign) -> Vec<&'a Finding> {
    let previous = revision.previous.as_ref();
    let any_change = design_changed(previous, next);

    revision
        .findings()
        .filter(|finding| match &finding.component {
            Some(id) => match (previous.component(id), next.component(id)) {
                (Some(before), Some(after)) => !component_changed(before, after),
                // Component gone, or the finding names something the old
                // design never had: fall back to "anything changed".
                (Some(_), None) => false,
                (None, _) => !any_change,
            },
            None => !any_change,
        })
        .collect()
}

fn component_changed(before: &Component, after: &Component) -> bool {
    before.type_tag() != after.type_tag() || before.parameters != after.parameters
}

fn design_changed(before: &ExperimentDesign, after: &ExperimentDesign) -> bool {
    if before.modes != after.modes || before.expected != after.expected {
        return true;
    }
    if before.components.len() != after.components.len() {
        return true;
    }
    before
        .components
        .iter()
        .zip(&after.components)
        .any(|(a, b)| a.id != b.id || component_changed(a, b))
}
