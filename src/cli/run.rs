// src/cli/run.rs — run / batch / simulate commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::types::RunOutcome;
use crate::core::{CancelToken, ControllerConfig, RefinementController};
use crate::critique::{Critic, PhysicsCritic};
use crate::design::context::{ContextProvider, NoContext, StaticContext};
use crate::design::parse::parse_design;
use crate::design::DesignGenerator;
use crate::infra::config::Config;
use crate::infra::errors::LabError;
use crate::report::ReportSink;
use crate::simulation::{LinearOpticsExecutor, SimulationExecutor};

/// Context source for the generator: a static hit file, or nothing.
pub fn load_context(path: Option<&Path>) -> anyhow::Result<Arc<dyn ContextProvider>> {
    match path {
        Some(p) => {
            let ctx = StaticContext::load(p)
                .map_err(|e| anyhow::anyhow!("cannot load context file {}: {}", p.display(), e))?;
            Ok(Arc::new(ctx))
        }
        None => Ok(Arc::new(NoContext)),
    }
}

/// Wire a controller from config. `label` tags progress lines; `None` with
/// `quiet` disables them.
pub fn build_controller(
    config: &Config,
    generator: Arc<dyn DesignGenerator>,
    context: Arc<dyn ContextProvider>,
    quiet: bool,
    label: Option<String>,
) -> RefinementController {
    let executor: Arc<dyn SimulationExecutor> =
        Arc::new(LinearOpticsExecutor::new(&config.simulation));
    let critic: Arc<dyn Critic> = Arc::new(PhysicsCritic::new());
    let controller = RefinementController::new(
        generator,
        executor,
        critic,
        ControllerConfig::from(&config.refinement),
    )
    .with_context(context);
    if quiet {
        controller
    } else {
        controller.with_progress(super::progress::terminal_progress(label))
    }
}

/// A finished run, and the reason its report could not be written, if any.
#[derive(Debug)]
pub struct CompletedRun {
    pub outcome: RunOutcome,
    pub report_error: Option<LabError>,
}

/// Run one goal to completion and persist its report.
pub async fn run_goal(
    goal: &str,
    config: &Config,
    generator: Arc<dyn DesignGenerator>,
    context: Arc<dyn ContextProvider>,
    sink: &dyn ReportSink,
    quiet: bool,
    cancel: &CancelToken,
) -> CompletedRun {
    run_labelled(goal, config, generator, context, sink, quiet, None, cancel).await
}

#[allow(clippy::too_many_arguments)]
async fn run_labelled(
    goal: &str,
    config: &Config,
    generator: Arc<dyn DesignGenerator>,
    context: Arc<dyn ContextProvider>,
    sink: &dyn ReportSink,
    quiet: bool,
    label: Option<String>,
    cancel: &CancelToken,
) -> CompletedRun {
    if !quiet {
        eprintln!("[goal] {}", crate::util::truncate_str(goal.trim(), 80));
    }
    let controller = build_controller(config, generator, context, quiet, label);
    let outcome = controller.run(goal, cancel).await;
    println!("{}", summary_line(&outcome));
    let report_error = match sink.write(&outcome) {
        Ok(Some(dir)) => {
            println!("  report: {}", dir.display());
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::error!(run = %outcome.id, error = %e, "Failed to write run report");
            Some(e)
        }
    };
    CompletedRun {
        outcome,
        report_error,
    }
}

/// Run every goal concurrently. Runs share the provider (and its inference
/// budget) but nothing else.
pub async fn run_batch(
    goals: &[String],
    config: &Config,
    generator: Arc<dyn DesignGenerator>,
    context: Arc<dyn ContextProvider>,
    sink: &dyn ReportSink,
    quiet: bool,
    cancel: &CancelToken,
) -> Vec<CompletedRun> {
    let runs = goals.iter().enumerate().map(|(i, goal)| {
        run_labelled(
            goal,
            config,
            generator.clone(),
            context.clone(),
            sink,
            quiet,
            Some(format!("#{}", i + 1)),
            cancel,
        )
    });
    futures::future::join_all(runs).await
}

/// Goals from a batch file: one per line, blank lines and `#` comments skipped.
pub fn read_goals(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_goals(&content))
}

pub fn parse_goals(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Simulate and critique a design file without any model calls. Returns the
/// text to print.
pub fn simulate_file(path: &PathBuf, config: &Config) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(path)?;
    let design = parse_design(&text, 1)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    let result = LinearOpticsExecutor::new(&config.simulation).execute(&design);
    let report = PhysicsCritic::new().evaluate(&design, &result);

    let mut out = result.trace_text();
    out.push_str(&format!(
        "\n\nalignment={}/10 quality={}/10 verdict={} physics_match={}\n",
        report.alignment_score,
        report.quality_rating,
        report.verdict,
        report.physics_match_quality
    ));
    for f in report.incorrect.iter().chain(&report.missing) {
        out.push_str(&format!("  {}\n", f));
    }
    Ok(out)
}

pub fn summary_line(outcome: &RunOutcome) -> String {
    let iterations = format!(
        "{}/{} iterations",
        outcome.state.iterations(),
        outcome.state.max_iterations()
    );
    match outcome.best() {
        Some(r) => format!(
            "{} {}: alignment {}/10, quality {}/10, {} ({})",
            outcome.termination,
            r.design.title,
            r.report.alignment_score,
            r.report.quality_rating,
            r.report.verdict,
            iterations
        ),
        None => format!(
            "{} {}: no design ({})",
            outcome.termination,
            crate::util::truncate_str(outcome.goal.trim(), 60),
            iterations
        ),
    }
}
