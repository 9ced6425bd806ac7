// src/core/controller.rs — Refinement controller: DESIGN → SIMULATE → CRITIQUE → (REVISE | stop)

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::cancel::CancelToken;
use super::cost::CostTracker;
use super::retry::RetryPolicy;
use super::types::*;
use crate::critique::{AnalysisReport, Critic};
use crate::design::context::{format_context, ContextProvider, NoContext};
use crate::design::generator::check_revision;
use crate::design::{DesignGenerator, ExperimentDesign, GeneratedDesign, GenerationError, Revision};
use crate::infra::config::RefinementConfig;
use crate::simulation::{ExecutionError, RunMetadata, SimulationExecutor, SimulationResult};

pub const DESIGN_PHASE: &str = "design";
pub const CRITIQUE_PHASE: &str = "critique";

/// Loop bounds, thresholds and per-stage limits.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_iterations: u8,
    pub convergence_threshold: u8,
    pub generation_retries: u32,
    pub execution_retries: u32,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&RefinementConfig::default())
    }
}

impl From<&RefinementConfig> for ControllerConfig {
    fn from(cfg: &RefinementConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations.max(1),
            convergence_threshold: cfg.convergence_threshold,
            generation_retries: cfg.generation_retries,
            execution_retries: cfg.execution_retries,
            generation_timeout: Duration::from_secs(cfg.generation_timeout_seconds),
            execution_timeout: Duration::from_secs(cfg.execution_timeout_seconds),
            retry: RetryPolicy::from(cfg),
        }
    }
}

/// Convergence predicate: both scores at or above the threshold and no findings.
pub fn converges(report: &AnalysisReport, threshold: u8) -> bool {
    report.alignment_score >= threshold
        && report.quality_rating >= threshold
        && report.models_design_accurately
}

/// Next step after the critique of iteration number `completed` (1-based).
pub fn decide(report: &AnalysisReport, completed: u8, config: &ControllerConfig) -> Decision {
    if converges(report, config.convergence_threshold) {
        Decision::Converged
    } else if completed >= config.max_iterations {
        Decision::Exhausted
    } else {
        Decision::Revise
    }
}

/// Why a stage produced nothing.
enum StageAbort {
    Cancelled,
    Failed(GenerationError),
}

/// Drives one refinement run. Owns the run's state; the only writer of its
/// history.
pub struct RefinementController {
    generator: Arc<dyn DesignGenerator>,
    executor: Arc<dyn SimulationExecutor>,
    critic: Arc<dyn Critic>,
    context: Arc<dyn ContextProvider>,
    config: ControllerConfig,
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl RefinementController {
    pub fn new(
        generator: Arc<dyn DesignGenerator>,
        executor: Arc<dyn SimulationExecutor>,
        critic: Arc<dyn Critic>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            critic,
            context: Arc::new(NoContext),
            config,
            on_progress: None,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Run the loop for `goal` until it converges, exhausts its iterations,
    /// fails to produce a design, or `cancel` fires. Always returns the
    /// (possibly partial) history.
    pub async fn run(&self, goal: &str, cancel: &CancelToken) -> RunOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = RefinementState::new(self.config.max_iterations);
        let mut cost = CostTracker::new();
        cost.touch_phase(DESIGN_PHASE);
        cost.touch_phase(CRITIQUE_PHASE);
        let mut generation_error = None;

        let context = match self.fetch_context(goal, cancel).await {
            Some(c) => c,
            None => {
                return self.finish(
                    goal,
                    state,
                    Termination::Cancelled,
                    cost,
                    started_at,
                    start,
                    None,
                )
            }
        };

        let mut feedback: Option<Revision> = None;
        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            let iteration = state.iterations() + 1;
            let iteration_start = Instant::now();
            self.emit(ProgressEvent::IterationStart {
                iteration,
                max_iterations: state.max_iterations(),
            });
            tracing::info!(iteration, max = state.max_iterations(), "Iteration start");

            // DESIGN
            self.emit(ProgressEvent::StageStart {
                iteration,
                stage: Stage::Design,
            });
            let (generated, attempts) = match self
                .generate_with_retry(
                    goal,
                    context.as_deref(),
                    feedback.as_ref(),
                    &mut cost,
                    cancel,
                )
                .await
            {
                Ok(g) => g,
                Err(StageAbort::Cancelled) => break Termination::Cancelled,
                Err(StageAbort::Failed(e)) => {
                    tracing::warn!(iteration, error = %e, "Generation retries exhausted");
                    generation_error = Some(e.to_string());
                    break Termination::GenerationFailed;
                }
            };
            cost.record_with_phase(&generated.model, &generated.usage, DESIGN_PHASE);
            let design = Arc::new(generated.design);

            // SIMULATE
            self.emit(ProgressEvent::StageStart {
                iteration,
                stage: Stage::Simulate,
            });
            let Some(result) = self.simulate(design.clone(), cancel).await else {
                break Termination::Cancelled;
            };

            // CRITIQUE
            self.emit(ProgressEvent::StageStart {
                iteration,
                stage: Stage::Critique,
            });
            let report = tokio::select! {
                _ = cancel.cancelled() => None,
                r = self.critic.critique(&design, &result) => Some(r),
            };
            let Some(report) = report else {
                break Termination::Cancelled;
            };

            let decision = decide(&report, iteration, &self.config);
            tracing::info!(
                iteration,
                alignment = report.alignment_score,
                quality = report.quality_rating,
                accurate = report.models_design_accurately,
                decision = %decision,
                "Iteration complete"
            );
            self.emit(ProgressEvent::IterationEnd {
                iteration,
                alignment: report.alignment_score,
                quality: report.quality_rating,
                verdict: report.verdict,
                decision,
            });

            let next_feedback = match decision {
                Decision::Revise => Some(Revision::new(design.clone(), report.clone())),
                _ => None,
            };
            state.push(IterationRecord {
                iteration,
                design,
                result,
                report,
                generation_attempts: attempts,
                decision,
                duration: iteration_start.elapsed(),
            });

            match decision {
                Decision::Converged => break Termination::Converged,
                Decision::Exhausted => break Termination::Exhausted,
                Decision::Revise => feedback = next_feedback,
            }
        };

        if termination == Termination::Exhausted {
            tracing::warn!(
                iterations = state.iterations(),
                "Iteration limit reached without convergence"
            );
        }
        self.finish(goal, state, termination, cost, started_at, start, generation_error)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        goal: &str,
        mut state: RefinementState,
        termination: Termination,
        cost: CostTracker,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
        generation_error: Option<String>,
    ) -> RunOutcome {
        state.freeze(termination);
        self.emit(ProgressEvent::Complete {
            termination,
            iterations: state.iterations(),
            cost: cost.total_usd,
        });
        tracing::info!(
            termination = %termination,
            iterations = state.iterations(),
            cost = %cost.summary(),
            "Run finished"
        );
        RunOutcome {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.to_string(),
            state,
            termination,
            cost,
            started_at,
            total_time: start.elapsed(),
            generation_error,
        }
    }

    /// `None` when cancelled. An empty hit list means no context.
    async fn fetch_context(&self, goal: &str, cancel: &CancelToken) -> Option<Option<String>> {
        let hits = tokio::select! {
            _ = cancel.cancelled() => return None,
            hits = self.context.search(goal) => hits,
        };
        tracing::debug!(hits = hits.len(), "Context search complete");
        Some(format_context(&hits))
    }

    /// Generate a design under the stage timeout, retrying on any
    /// generation error except a provider error marked permanent. A revision
    /// must answer every finding of the report it was given, whichever
    /// generator produced it. Rejected replies are billed to the design phase.
    async fn generate_with_retry(
        &self,
        goal: &str,
        context: Option<&str>,
        feedback: Option<&Revision>,
        cost: &mut CostTracker,
        cancel: &CancelToken,
    ) -> Result<(GeneratedDesign, u32), StageAbort> {
        let timeout = self.config.generation_timeout;
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(StageAbort::Cancelled),
                r = tokio::time::timeout(timeout, self.generator.generate(goal, context, feedback)) => r,
            };
            let err = match outcome {
                Ok(Ok(generated)) => {
                    let revised =
                        feedback.map_or(Ok(()), |rev| check_revision(rev, &generated.design));
                    match revised {
                        Ok(()) => {
                            tracing::debug!(
                                version = generated.design.version,
                                components = generated.design.components.len(),
                                "Design generated"
                            );
                            return Ok((generated, attempt + 1));
                        }
                        Err(e) => e.billed(&generated.model, generated.usage),
                    }
                }
                Ok(Err(e)) => e,
                Err(_) => GenerationError::Timeout {
                    seconds: timeout.as_secs(),
                },
            };
            if let Some(spent) = err.spent() {
                cost.record_with_phase(&spent.model, &spent.usage, DESIGN_PHASE);
            }

            let permanent = matches!(&err, GenerationError::Provider(p) if !p.is_retriable());
            if permanent || attempt >= self.config.generation_retries {
                return Err(StageAbort::Failed(err));
            }
            tracing::warn!(attempt, kind = err.kind(), error = %err, "Generation failed, retrying");
            self.emit(ProgressEvent::GenerationRetry {
                attempt: attempt + 1,
                kind: err.kind(),
                message: err.to_string(),
            });
            let delay = self.config.retry.delay_for_attempt(attempt);
            tokio::select! {
                _ = cancel.cancelled() => return Err(StageAbort::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Run the executor on the blocking pool under the stage timeout.
    /// Panics and final timeouts become failed results. `None` when cancelled.
    async fn simulate(
        &self,
        design: Arc<ExperimentDesign>,
        cancel: &CancelToken,
    ) -> Option<SimulationResult> {
        let timeout = self.config.execution_timeout;
        let mut attempt = 0u32;
        loop {
            let executor = self.executor.clone();
            let d = design.clone();
            // A timed-out worker keeps its blocking thread until it returns.
            let handle = tokio::task::spawn_blocking(move || executor.execute(&d));
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return None,
                r = tokio::time::timeout(timeout, handle) => r,
            };
            match outcome {
                Ok(Ok(result)) => return Some(result),
                Ok(Err(join_err)) => {
                    let message = panic_message(join_err);
                    tracing::warn!(error = %message, "Simulation worker panicked");
                    return Some(failed_result(
                        &design,
                        ExecutionError::WorkerPanicked { message },
                    ));
                }
                Err(_) => {
                    let err = ExecutionError::Timeout {
                        seconds: timeout.as_secs(),
                    };
                    if attempt >= self.config.execution_retries {
                        tracing::warn!(attempt, "Simulation timed out, giving up");
                        return Some(failed_result(&design, err));
                    }
                    tracing::warn!(attempt, "Simulation timed out, retrying");
                    self.emit(ProgressEvent::ExecutionRetry {
                        attempt: attempt + 1,
                        message: err.to_string(),
                    });
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn failed_result(design: &ExperimentDesign, error: ExecutionError) -> SimulationResult {
    let trace = vec![
        format!(
            "$ labloop-sim '{}' v{} ({} modes, {} components)",
            design.title,
            design.version,
            design.modes,
            design.components.len()
        ),
        format!("ERROR {}", error),
    ];
    let metadata = RunMetadata {
        modes: design.modes,
        ..RunMetadata::default()
    };
    SimulationResult::failed(error, trace, metadata)
}
