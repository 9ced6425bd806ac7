// src/cli/progress.rs — Terminal progress renderer for refinement runs

use crate::core::types::ProgressEvent;

/// Render one event as a single line.
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::IterationStart {
            iteration,
            max_iterations,
        } => format!("[iter {}/{}] designing...", iteration, max_iterations),
        ProgressEvent::StageStart { iteration, stage } => {
            format!("[iter {}]   {}", iteration, stage)
        }
        ProgressEvent::GenerationRetry {
            attempt,
            kind,
            message,
        } => format!("[retry {}] generation {}: {}", attempt, kind, message),
        ProgressEvent::ExecutionRetry { attempt, message } => {
            format!("[retry {}] simulation: {}", attempt, message)
        }
        ProgressEvent::IterationEnd {
            iteration,
            alignment,
            quality,
            verdict,
            decision,
        } => format!(
            "[iter {}] alignment={}/10 quality={}/10 {} -> {}",
            iteration, alignment, quality, verdict, decision
        ),
        ProgressEvent::Complete {
            termination,
            iterations,
            cost,
        } => format!(
            "[done] {} after {} iteration(s), cost=${:.4}",
            termination, iterations, cost
        ),
    }
}

/// Build a progress callback that writes to stderr, so stdout stays clean
/// for the summary. `label` prefixes every line (batch runs).
pub fn terminal_progress(label: Option<String>) -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| {
        let line = format_event(&event);
        match label {
            Some(ref l) => eprintln!("[{}] {}", l, line),
            None => eprintln!("{}", line),
        }
    }
}
