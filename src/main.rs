// src/main.rs — labloop entry point

use std::sync::Arc;

use clap::Parser;

use labloop::cli::{run, Cli, Commands};
use labloop::core::CancelToken;
use labloop::design::{DesignGenerator, LlmDesignGenerator};
use labloop::infra::config::Config;
use labloop::infra::errors::LabError;
use labloop::infra::logger;
use labloop::provider::budget::{BudgetedProvider, InferenceBudget};
use labloop::provider::{resolver, ModelProvider};
use labloop::report::FileSink;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run_cli(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.overrides.apply(&mut config);
    config.validate()?;

    // Offline command: no provider needed
    if let Some(Commands::Simulate { ref design }) = cli.command {
        print!("{}", run::simulate_file(design, &config)?);
        return Ok(());
    }

    let goals = match cli.command {
        Some(Commands::Batch { ref file }) => run::read_goals(file)?,
        Some(Commands::Run { ref goal }) => vec![goal.join(" ")],
        _ => vec![build_goal(&cli)?],
    };
    if goals.is_empty() {
        anyhow::bail!("No goals found");
    }

    let generator = build_generator(&config, cli.overrides.model.as_deref())?;
    let context = run::load_context(cli.overrides.context_file.as_deref())?;
    let sink = FileSink::new(config.report.resolved_output_dir());

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("[cancel] stopping after the current stage...");
                cancel.cancel();
            }
        });
    }

    if let Some(Commands::Batch { .. }) = cli.command {
        let runs =
            run::run_batch(&goals, &config, generator, context, &sink, cli.quiet, &cancel).await;
        let unsaved = runs.iter().filter(|r| r.report_error.is_some()).count();
        for err in runs.iter().filter_map(|r| r.report_error.as_ref()) {
            eprintln!("error: {err}");
        }
        if unsaved > 0 {
            anyhow::bail!("{} of {} report(s) could not be written", unsaved, goals.len());
        }
        return Ok(());
    }

    let done =
        run::run_goal(&goals[0], &config, generator, context, &sink, cli.quiet, &cancel).await;
    match done.report_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Designer backed by the resolved provider, behind the shared inference budget.
fn build_generator(
    config: &Config,
    cli_model: Option<&str>,
) -> anyhow::Result<Arc<dyn DesignGenerator>> {
    let model_ref =
        resolver::default_model_ref(cli_model, &config.models).ok_or(LabError::NoProvider)?;
    let provider = resolver::build_provider(&model_ref, &config.models)?;
    let budget = InferenceBudget::new(config.inference.max_concurrent_calls);
    let provider: Arc<dyn ModelProvider> = Arc::new(BudgetedProvider::new(provider, budget));
    tracing::info!(model = %model_ref, "Designer model resolved");
    Ok(Arc::new(
        LlmDesignGenerator::new(provider, model_ref.model.clone())
            .with_sampling(config.inference.max_tokens, config.inference.temperature),
    ))
}

/// The goal from positional args and/or stdin (`--stdin`).
fn build_goal(cli: &Cli) -> anyhow::Result<String> {
    let args = cli.goal.join(" ");
    if cli.stdin {
        let content = read_stdin()?;
        if args.trim().is_empty() {
            return Ok(content);
        }
        return Ok(format!("{}\n\n{}", args, content));
    }
    if args.trim().is_empty() {
        eprintln!("Usage: labloop <goal> | labloop batch <file> | labloop simulate <design.json>");
        eprintln!("Run labloop --help for all options.");
        std::process::exit(1);
    }
    Ok(args)
}

fn read_stdin() -> anyhow::Result<String> {
    use std::io::Read;
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        anyhow::bail!("No input received on stdin");
    }
    Ok(buf)
}
