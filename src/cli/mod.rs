// src/cli/mod.rs — CLI definition (clap derive)

pub mod progress;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::infra::config::Config;

#[derive(Parser)]
#[command(
    name = "labloop",
    about = "Design, simulate and critique quantum optics experiments",
    version
)]
pub struct Cli {
    /// Experiment goal (default command when no subcommand given)
    #[arg(trailing_var_arg = true)]
    pub goal: Vec<String>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Suppress progress output (only print the final summary)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Read the goal from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags that override values from config.toml.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Designer model (provider/model format)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Max refinement iterations
    #[arg(short, long, global = true)]
    pub iterate: Option<u8>,

    /// Convergence threshold for alignment and quality (0-10)
    #[arg(short = 't', long, global = true)]
    pub threshold: Option<u8>,

    /// Fixed Monte-Carlo seed
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Monte-Carlo shots per simulation
    #[arg(long, global = true)]
    pub shots: Option<u32>,

    /// Directory for run reports
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// JSON file of search hits ([{title, url, snippet}]) used as design context
    #[arg(long, global = true)]
    pub context_file: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref m) = self.model {
            config.models.designer = Some(m.clone());
        }
        if let Some(n) = self.iterate {
            config.refinement.max_iterations = n;
        }
        if let Some(t) = self.threshold {
            config.refinement.convergence_threshold = t;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
        }
        if let Some(shots) = self.shots {
            config.simulation.shots = shots;
        }
        if let Some(ref dir) = self.output {
            config.report.output_dir = Some(dir.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the design-simulate-critique loop for one goal
    Run {
        #[arg(trailing_var_arg = true, required = true)]
        goal: Vec<String>,
    },
    /// Run every goal in a file (one per line, '#' comments) concurrently
    Batch {
        file: PathBuf,
    },
    /// Simulate and critique an existing design JSON file (no model calls)
    Simulate {
        design: PathBuf,
    },
}
