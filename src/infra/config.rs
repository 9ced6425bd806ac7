// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub refinement: RefinementConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model used by the design generator, in "provider/model" form.
    pub designer: Option<String>,
    /// Base URL for the OpenAI-compatible provider (ollama, vLLM, ...).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    pub max_iterations: u8,
    /// Alignment and quality must both reach this score (0-10) to converge.
    pub convergence_threshold: u8,
    /// Extra generation attempts per iteration. Not counted against max_iterations.
    pub generation_retries: u32,
    /// Extra executor attempts after a stage timeout.
    pub execution_retries: u32,
    pub generation_timeout_seconds: u64,
    pub execution_timeout_seconds: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            convergence_threshold: 7,
            generation_retries: 2,
            execution_retries: 1,
            generation_timeout_seconds: 180,
            execution_timeout_seconds: 120,
            retry_initial_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed Monte-Carlo seed. A fresh seed is drawn (and traced) when unset.
    pub seed: Option<u64>,
    pub shots: u32,
    /// Allowed deviation of the total probability mass from 1.
    pub normalization_tolerance: f64,
    /// Upper bound on enumerated output patterns before the run is refused.
    pub max_patterns: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            shots: 10_000,
            normalization_tolerance: 1e-6,
            max_patterns: 250_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model calls allowed in flight across all concurrent runs.
    pub max_concurrent_calls: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 4,
            max_tokens: 4096,
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where run reports are written. Defaults to the data directory.
    pub output_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(paths::reports_dir)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refinement.max_iterations == 0 {
            anyhow::bail!("refinement.max_iterations must be at least 1");
        }
        if self.refinement.convergence_threshold > 10 {
            anyhow::bail!("refinement.convergence_threshold must be within 0-10");
        }
        if self.inference.max_concurrent_calls == 0 {
            anyhow::bail!("inference.max_concurrent_calls must be at least 1");
        }
        if !(self.simulation.normalization_tolerance > 0.0) {
            anyhow::bail!("simulation.normalization_tolerance must be positive");
        }
        Ok(())
    }
}
