// src/simulation/executor.rs — Linear-optics executor: compile, propagate, derive, sample

use std::collections::BTreeMap;

use super::optics::{compile, output_distribution, Distribution, Network};
use super::sampler::{draw_seed, sample_counts};
use super::{
    Quantity, RunMetadata, SanityViolation, SimulationExecutor, SimulationResult,
    ENERGY_TOLERANCE, UNCERTAINTY_BOUND,
};
use crate::design::{ComponentKind, CrystalParams, ExperimentDesign};
use crate::infra::config::SimulationConfig;

/// Executes designs as photon-number states through a linear-optical network.
#[derive(Debug, Clone)]
pub struct LinearOpticsExecutor {
    seed: Option<u64>,
    shots: u64,
    tolerance: f64,
    max_patterns: u64,
}

impl Default for LinearOpticsExecutor {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl LinearOpticsExecutor {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            seed: config.seed,
            shots: config.shots as u64,
            tolerance: config.normalization_tolerance,
            max_patterns: config.max_patterns,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shots(mut self, shots: u64) -> Self {
        self.shots = shots;
        self
    }
}

impl SimulationExecutor for LinearOpticsExecutor {
    fn execute(&self, design: &ExperimentDesign) -> SimulationResult {
        let seed = self.seed.unwrap_or_else(draw_seed);
        let mut trace = vec![
            format!(
                "$ labloop-sim '{}' v{} ({} modes, {} components)",
                design.title,
                design.version,
                design.modes,
                design.components.len()
            ),
            format!("seed={} shots={}", seed, self.shots),
        ];
        let mut metadata = RunMetadata {
            seed,
            shots: self.shots,
            modes: design.modes,
            ..RunMetadata::default()
        };

        let network = match compile(design, self.max_patterns) {
            Ok(n) => n,
            Err(e) => {
                trace.push(format!("ERROR {}", e));
                tracing::warn!(design = %design.title, error = %e, "Compilation failed");
                return SimulationResult::failed(e, trace, metadata);
            }
        };
        trace.extend(network.log.iter().cloned());
        metadata.loss_modes = network.loss_modes;
        metadata.photons = network.photons();
        metadata.effective_operations = network.operations.clone();
        metadata.cancelled_stages = network.cancelled.clone();
        trace.push(format!(
            "network: {} modes + {} loss modes, {} photon(s)",
            network.modes, network.loss_modes, metadata.photons
        ));

        let dist = match output_distribution(&network, self.max_patterns) {
            Ok(d) => d,
            Err(e) => {
                trace.push(format!("ERROR {}", e));
                tracing::warn!(design = %design.title, error = %e, "Propagation failed");
                return SimulationResult::failed(e, trace, metadata);
            }
        };
        trace.push(format!("output patterns: {}", dist.patterns.len()));

        let mut run = Run {
            design,
            network: &network,
            dist: &dist,
            quantities: BTreeMap::new(),
            violations: Vec::new(),
            trace,
            tolerance: self.tolerance,
        };

        let total = dist.total();
        run.check_distribution(total);
        run.derive_probabilities(total);
        run.derive_rates();
        run.derive_crystal_quantities();

        if run.violations.iter().any(|v| matches!(v, SanityViolation::Normalization { .. })) {
            run.trace
                .push("sampling skipped: distribution is not normalized".to_string());
        } else {
            run.sample(seed, self.shots);
        }

        for v in &run.violations {
            run.trace.push(format!("WARNING {}", v));
        }
        if !run.violations.is_empty() {
            tracing::warn!(
                design = %design.title,
                violations = run.violations.len(),
                "Sanity violations recorded"
            );
        }
        tracing::debug!(trace_lines = run.trace.len(), "Simulation finished");

        SimulationResult {
            success: true,
            quantities: run.quantities,
            raw_total_probability: Some(total),
            trace: run.trace,
            error: None,
            violations: run.violations,
            metadata,
        }
    }
}

struct Run<'a> {
    design: &'a ExperimentDesign,
    network: &'a Network,
    dist: &'a Distribution,
    quantities: BTreeMap<String, Quantity>,
    violations: Vec<SanityViolation>,
    trace: Vec<String>,
    tolerance: f64,
}

impl Run<'_> {
    fn put(&mut self, name: String, quantity: Quantity) {
        self.trace
            .push(format!("{} = {:.6} {}", name, quantity.value, quantity.unit));
        self.quantities.insert(name, quantity);
    }

    fn detectors(&self) -> Vec<(String, usize)> {
        self.design
            .detectors()
            .map(|(c, p)| (c.id.clone(), p.mode))
            .collect()
    }

    fn check_distribution(&mut self, total: f64) {
        if (total - 1.0).abs() > self.tolerance {
            self.violations.push(SanityViolation::Normalization {
                total,
                tolerance: self.tolerance,
            });
        }
        let worst = self
            .dist
            .patterns
            .iter()
            .zip(&self.dist.probabilities)
            .filter(|(_, &p)| p < -self.tolerance || p > 1.0 + self.tolerance)
            .max_by(|a, b| (a.1 - 0.5).abs().total_cmp(&(b.1 - 0.5).abs()));
        if let Some((pattern, &probability)) = worst {
            self.violations.push(SanityViolation::OutcomeOutOfRange {
                outcome: format_pattern(pattern),
                probability,
            });
        }
    }

    fn derive_probabilities(&mut self, total: f64) {
        let modes = self.network.modes;
        let detectors = self.detectors();
        let dist = self.dist;

        self.put("total_probability".into(), Quantity::probability(total));

        let detector_modes: Vec<usize> = detectors.iter().map(|(_, m)| *m).collect();
        if !detectors.is_empty() {
            let detected = dist.mass_where(|p| detector_modes.iter().any(|&m| p[m] > 0));
            self.put("detected_probability".into(), Quantity::probability(detected));
        }
        if self.network.loss_modes > 0 {
            let lost = dist.mass_where(|p| p[modes..].iter().any(|&k| k > 0));
            self.put("loss_probability".into(), Quantity::probability(lost));
        }

        for (id, mode) in &detectors {
            let click = dist.mass_where(|p| p[*mode] > 0);
            self.put(format!("click_probability.{}", id), Quantity::probability(click));
        }
        if detectors.len() >= 2 {
            let coincidence = dist.mass_where(|p| clicks(p, &detector_modes) >= 2);
            self.put("coincidence_probability".into(), Quantity::probability(coincidence));
        }

        if self.network.photons() >= 2 {
            let collision_free = dist.mass_where(|p| p[..modes].iter().all(|&k| k <= 1));
            let bunched = dist.mass_where(|p| p[..modes].iter().any(|&k| k >= 2));
            self.put(
                "collision_free_probability".into(),
                Quantity::probability(collision_free),
            );
            self.put("bunching_probability".into(), Quantity::probability(bunched));
        }
    }

    /// Event rate into the network, if the design states one.
    fn event_rate(&self) -> Option<f64> {
        let rates: Vec<f64> = self
            .design
            .components
            .iter()
            .filter_map(|c| match &c.kind {
                ComponentKind::Source(p) => p.rate_hz,
                ComponentKind::Crystal(p) => p.pair_rate_hz,
                _ => None,
            })
            .collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum())
        }
    }

    fn derive_rates(&mut self) {
        let Some(rate) = self.event_rate() else {
            return;
        };
        let hz = |v: f64| Quantity::new(v, "Hz");

        if let Some(p) = self.quantities.get("detected_probability").map(|q| q.value) {
            self.put("detected_rate_hz".into(), hz(rate * p));
        }
        if let Some(p) = self.quantities.get("coincidence_probability").map(|q| q.value) {
            self.put("coincidence_rate_hz".into(), hz(rate * p));
        }

        let mut count_rates = Vec::new();
        let detectors: Vec<(String, f64)> = self
            .design
            .detectors()
            .map(|(c, p)| (c.id.clone(), p.dark_count_hz))
            .collect();
        for (id, dark) in detectors {
            let click = self
                .quantities
                .get(&format!("click_probability.{}", id))
                .map(|q| q.value)
                .unwrap_or(0.0);
            let count = rate * click + dark;
            count_rates.push(count);
            self.put(format!("count_rate_hz.{}", id), hz(count));
        }

        let window_ns = self.design.components.iter().find_map(|c| match &c.kind {
            ComponentKind::Electronics(p) => Some(p.coincidence_window_ns),
            _ => None,
        });
        if let (Some(window_ns), [c1, c2, ..]) = (window_ns, count_rates.as_slice()) {
            let accidental = 2.0 * window_ns * 1e-9 * c1 * c2;
            self.put("accidental_rate_hz".into(), hz(accidental));
        }
    }

    fn derive_crystal_quantities(&mut self) {
        let crystals: Vec<(String, CrystalParams)> = self
            .design
            .components
            .iter()
            .filter_map(|c| match &c.kind {
                ComponentKind::Crystal(p) => Some((c.id.clone(), p.clone())),
                _ => None,
            })
            .collect();

        for (id, p) in crystals {
            match energy_mismatch(&p) {
                Some(relative) => {
                    self.put(format!("energy_mismatch.{}", id), Quantity::new(relative, "relative"));
                    if relative > ENERGY_TOLERANCE {
                        self.violations.push(SanityViolation::EnergyMismatch {
                            component: id.clone(),
                            relative,
                        });
                    }
                }
                None => self
                    .trace
                    .push(format!("{}: energy check skipped, non-positive wavelength", id)),
            }

            if let Some(squeezing) = p.squeezing_db {
                let anti = p.anti_squeezing_db.unwrap_or(squeezing);
                let var_x = 0.25 * 10f64.powf(-squeezing / 10.0);
                let var_p = 0.25 * 10f64.powf(anti / 10.0);
                let product = var_x * var_p;
                self.put(format!("variance_x.{}", id), Quantity::new(var_x, "vacuum units"));
                self.put(format!("variance_p.{}", id), Quantity::new(var_p, "vacuum units"));
                self.put(
                    format!("uncertainty_product.{}", id),
                    Quantity::new(product, "vacuum units"),
                );
                if product < UNCERTAINTY_BOUND * (1.0 - 1e-9) {
                    self.violations.push(SanityViolation::Uncertainty {
                        component: id.clone(),
                        product,
                        bound: UNCERTAINTY_BOUND,
                    });
                }
            }
        }
    }

    fn sample(&mut self, seed: u64, shots: u64) {
        let Some(counts) = sample_counts(&self.dist.probabilities, shots, seed) else {
            self.trace
                .push("sampling skipped: weights do not form a distribution".to_string());
            return;
        };
        let detectors = self.detectors();
        let detector_modes: Vec<usize> = detectors.iter().map(|(_, m)| *m).collect();
        let fraction = |pred: &dyn Fn(&[u32]) -> bool| -> f64 {
            let hits: u64 = self
                .dist
                .patterns
                .iter()
                .zip(&counts)
                .filter(|(p, _)| pred(p))
                .map(|(_, &n)| n)
                .sum();
            hits as f64 / shots.max(1) as f64
        };

        let mut sampled = Vec::new();
        for (id, mode) in &detectors {
            sampled.push((
                format!("sampled.click_fraction.{}", id),
                fraction(&|p: &[u32]| p[*mode] > 0),
            ));
        }
        if detectors.len() >= 2 {
            sampled.push((
                "sampled.coincidence_fraction".to_string(),
                fraction(&|p: &[u32]| clicks(p, &detector_modes) >= 2),
            ));
        }
        self.trace.push(format!("sampled {} shots", shots));
        for (name, value) in sampled {
            self.put(name, Quantity::new(value, "fraction"));
        }
    }
}

fn clicks(pattern: &[u32], detector_modes: &[usize]) -> usize {
    detector_modes.iter().filter(|&&m| pattern[m] > 0).count()
}

fn format_pattern(pattern: &[u32]) -> String {
    let parts: Vec<String> = pattern.iter().map(|k| k.to_string()).collect();
    format!("({})", parts.join(","))
}

/// |1/λp − 1/λs − 1/λi| relative to 1/λp.
fn energy_mismatch(p: &CrystalParams) -> Option<f64> {
    let (lp, ls, li) = (
        p.pump_wavelength_nm,
        p.signal_wavelength_nm,
        p.idler_wavelength_nm,
    );
    if lp <= 0.0 || ls <= 0.0 || li <= 0.0 {
        return None;
    }
    let pump = 1.0 / lp;
    Some(((pump - 1.0 / ls - 1.0 / li) / pump).abs())
}
