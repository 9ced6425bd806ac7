// src/report/mod.rs — Report sink: persists metrics and the simulation report of a run
//
// Layout per run: <output_dir>/<slug>-<short id>/
//   metrics.json, metrics.md, simulation_report.md, design.json (when a design exists)

pub mod metrics;
pub mod simulation;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::types::RunOutcome;
use crate::infra::errors::LabError;

const MAX_SLUG_LEN: usize = 48;

/// Where finished runs go.
pub trait ReportSink: Send + Sync {
    /// Persist `outcome`. Returns the location written, if any.
    fn write(&self, outcome: &RunOutcome) -> Result<Option<PathBuf>, LabError>;
}

/// Discards everything.
pub struct NullSink;

impl ReportSink for NullSink {
    fn write(&self, _outcome: &RunOutcome) -> Result<Option<PathBuf>, LabError> {
        Ok(None)
    }
}

/// Writes one directory per run under `root`.
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, outcome: &RunOutcome) -> PathBuf {
        let name = outcome
            .best()
            .map(|r| r.design.title.clone())
            .unwrap_or_else(|| outcome.goal.clone());
        let mut slug = slug::slugify(&name);
        slug.truncate(MAX_SLUG_LEN);
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "run" } else { slug };
        self.root.join(format!("{}-{}", slug, outcome.short_id()))
    }
}

impl ReportSink for FileSink {
    fn write(&self, outcome: &RunOutcome) -> Result<Option<PathBuf>, LabError> {
        let dir = self.run_dir(outcome);
        std::fs::create_dir_all(&dir)?;

        let summary = metrics::summarize(outcome);
        write_atomic(&dir, "metrics.json", &metrics::to_json(&summary)?)?;
        write_atomic(&dir, "metrics.md", &metrics::render_markdown(&summary))?;
        write_atomic(&dir, "simulation_report.md", &simulation::render(outcome))?;
        if let Some(best) = outcome.best() {
            let design = serde_json::to_string_pretty(&best.design.to_json())?;
            write_atomic(&dir, "design.json", &design)?;
        }

        tracing::info!(dir = %dir.display(), "Report written");
        Ok(Some(dir))
    }
}

/// Write via a temp file and rename so readers never see a partial file.
fn write_atomic(dir: &Path, name: &str, contents: &str) -> Result<(), LabError> {
    let tmp = dir.join(format!(".{}.tmp", name));
    let dst = dir.join(name);
    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(contents.as_bytes())?;
    f.flush()?;
    f.sync_all()?;
    std::fs::rename(&tmp, &dst)?;
    Ok(())
}
