// src/simulation/optics.rs — Compile a design into a linear-optical transfer network
//
// Declared modes come first; every lossy element gets its own loss mode
// appended after them. The transfer matrix acts on creation operators:
// a†_in → Σ_out U[out, in] b†_out, and elements are left-multiplied in
// design order with detector losses applied last.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::permanent::{permanent, C64};
use super::{EffectiveOp, ExecutionError};
use crate::design::{Component, ComponentKind, ExperimentDesign, InterferometerKind, Retardance};

/// Photon numbers beyond this make the permanent impractical.
pub const MAX_PHOTONS: u32 = 16;

/// Hard cap on declared plus loss modes; the transfer matrix is dense.
pub const MAX_MODES: usize = 1024;

const IDENTITY_EPS: f64 = 1e-12;
/// Round-off allowed when a chain of stages is multiplied back out.
const CHAIN_EPS: f64 = 1e-9;
/// Stage chains are only tracked on networks up to this many declared modes.
const CHAIN_MAX_MODES: usize = 64;

/// A compiled network, ready for the output distribution.
#[derive(Debug, Clone)]
pub struct Network {
    pub modes: usize,
    pub loss_modes: usize,
    pub transfer: DMatrix<C64>,
    /// Input occupation of each declared mode.
    pub input: Vec<u32>,
    pub operations: BTreeMap<String, EffectiveOp>,
    /// Runs of consecutive transform stages whose product is the identity.
    pub cancelled: Vec<Vec<String>>,
    /// One console line per compiled component.
    pub log: Vec<String>,
}

impl Network {
    pub fn total_modes(&self) -> usize {
        self.modes + self.loss_modes
    }

    pub fn photons(&self) -> u32 {
        self.input.iter().fold(0u32, |acc, &k| acc.saturating_add(k))
    }
}

/// Output distribution over every occupation pattern of the extended modes.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub patterns: Vec<Vec<u32>>,
    pub probabilities: Vec<f64>,
}

impl Distribution {
    pub fn total(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Sum of probabilities of the patterns matching `pred`.
    pub fn mass_where(&self, pred: impl Fn(&[u32]) -> bool) -> f64 {
        self.patterns
            .iter()
            .zip(&self.probabilities)
            .filter(|(p, _)| pred(p))
            .map(|(_, prob)| prob)
            .sum()
    }
}

fn c(re: f64, im: f64) -> C64 {
    C64::new(re, im)
}

/// Complex square root of a real, so values past the physical range stay
/// finite and show up as a non-unitary element instead of NaN.
fn csqrt(x: f64) -> C64 {
    c(x, 0.0).sqrt()
}

fn is_identity_2x2(m: &[[C64; 2]; 2]) -> bool {
    (m[0][0] - c(1.0, 0.0)).norm() < IDENTITY_EPS
        && m[0][1].norm() < IDENTITY_EPS
        && m[1][0].norm() < IDENTITY_EPS
        && (m[1][1] - c(1.0, 0.0)).norm() < IDENTITY_EPS
}

fn is_identity(m: &DMatrix<C64>) -> bool {
    m.iter().enumerate().all(|(idx, z)| {
        // column-major: idx = col * nrows + row
        let diagonal = idx % m.nrows() == idx / m.nrows();
        let target = if diagonal { c(1.0, 0.0) } else { c(0.0, 0.0) };
        (z - target).norm() < CHAIN_EPS
    })
}

fn finite_2x2(m: &[[C64; 2]; 2]) -> bool {
    m.iter().flatten().all(|z| z.re.is_finite() && z.im.is_finite())
}

fn apply_two_mode(u: &mut DMatrix<C64>, a: usize, b: usize, m: &[[C64; 2]; 2]) {
    for col in 0..u.ncols() {
        let ua = u[(a, col)];
        let ub = u[(b, col)];
        u[(a, col)] = m[0][0] * ua + m[0][1] * ub;
        u[(b, col)] = m[1][0] * ua + m[1][1] * ub;
    }
}

fn apply_phase(u: &mut DMatrix<C64>, mode: usize, factor: C64) {
    for col in 0..u.ncols() {
        u[(mode, col)] *= factor;
    }
}

pub fn beam_splitter(reflectivity: f64, phase_rad: f64) -> [[C64; 2]; 2] {
    let t = csqrt(1.0 - reflectivity);
    let r = csqrt(reflectivity);
    let i = c(0.0, 1.0);
    [
        [t, i * r * C64::from_polar(1.0, phase_rad)],
        [i * r * C64::from_polar(1.0, -phase_rad), t],
    ]
}

/// Jones matrix of a retarder with its fast axis at `angle_deg` from H.
pub fn waveplate(angle_deg: f64, retardance: Retardance) -> [[C64; 2]; 2] {
    let theta = angle_deg.to_radians();
    match retardance {
        Retardance::Half => {
            let (s2, c2) = (2.0 * theta).sin_cos();
            [[c(c2, 0.0), c(s2, 0.0)], [c(s2, 0.0), c(-c2, 0.0)]]
        }
        Retardance::Quarter => {
            let (s, co) = theta.sin_cos();
            let off = c(1.0, -1.0) * (s * co);
            [
                [c(co * co, s * s), off],
                [off, c(s * s, co * co)],
            ]
        }
    }
}

/// Coupling of a mode to its loss mode with amplitude transmission `tau`.
pub fn loss_coupling(tau: C64) -> [[C64; 2]; 2] {
    let kappa = (c(1.0, 0.0) - tau * tau.conj()).sqrt();
    [[tau, -kappa.conj()], [kappa, tau.conj()]]
}

pub fn fourier(d: usize) -> DMatrix<C64> {
    let norm = 1.0 / (d as f64).sqrt();
    DMatrix::from_fn(d, d, |j, k| {
        C64::from_polar(norm, 2.0 * PI * (j * k) as f64 / d as f64)
    })
}

/// Haar-random unitary via QR of a complex Gaussian matrix.
pub fn haar(d: usize, seed: u64) -> DMatrix<C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut gaussian = || {
        // Box-Muller
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    };
    let z = DMatrix::from_fn(d, d, |_, _| {
        c(gaussian(), gaussian()) * std::f64::consts::FRAC_1_SQRT_2
    });
    let qr = z.qr();
    let mut q = qr.q();
    let r = qr.r();
    for j in 0..d {
        let rjj = r[(j, j)];
        let phase = if rjj.norm() > 0.0 {
            rjj / rjj.norm()
        } else {
            c(1.0, 0.0)
        };
        for i in 0..d {
            q[(i, j)] *= phase;
        }
    }
    q
}

struct Compiler<'a> {
    design: &'a ExperimentDesign,
    transfer: DMatrix<C64>,
    input: Vec<u32>,
    next_loss: usize,
    operations: BTreeMap<String, EffectiveOp>,
    /// Product of every open run of transform stages on the declared modes,
    /// keyed by the index of the run's first stage in `chain`.
    open_runs: Vec<(usize, DMatrix<C64>)>,
    chain: Vec<String>,
    cancelled: Vec<Vec<String>>,
    log: Vec<String>,
}

impl Compiler<'_> {
    /// Extend the current chain by one transform stage and record any run
    /// ending here that multiplies to the identity.
    fn push_stage(&mut self, id: &str, apply: impl Fn(&mut DMatrix<C64>)) {
        let d = self.design.modes;
        if d > CHAIN_MAX_MODES {
            return;
        }
        self.open_runs.push((self.chain.len(), DMatrix::identity(d, d)));
        self.chain.push(id.to_string());

        let mut collapsed_from = None;
        for (start, product) in self.open_runs.iter_mut() {
            apply(product);
            if collapsed_from.is_none() && self.chain.len() - *start > 1 && is_identity(product) {
                collapsed_from = Some(*start);
            }
        }
        if let Some(start) = collapsed_from {
            let run = self.chain[start..].to_vec();
            self.log
                .push(format!("stages {} multiply to the identity", run.join(" -> ")));
            self.cancelled.push(run);
            self.break_chain();
        }
    }

    /// A lossy or passive element sits between stages.
    fn break_chain(&mut self) {
        self.open_runs.clear();
        self.chain.clear();
    }

    fn check_mode(&self, component: &Component, mode: usize) -> Result<(), ExecutionError> {
        if mode >= self.design.modes {
            return Err(ExecutionError::ModeOutOfRange {
                component: component.id.clone(),
                mode,
                modes: self.design.modes,
            });
        }
        Ok(())
    }

    fn check_pair(&self, component: &Component, a: usize, b: usize) -> Result<(), ExecutionError> {
        self.check_mode(component, a)?;
        self.check_mode(component, b)?;
        if a == b {
            return Err(ExecutionError::InvalidCoupling {
                component: component.id.clone(),
                mode: a,
            });
        }
        Ok(())
    }

    fn record(&mut self, component: &Component, op: EffectiveOp, detail: String) {
        self.log.push(format!(
            "compile {} ({}): {} -> {:?}",
            component.id,
            component.type_tag(),
            detail,
            op
        ));
        self.operations.insert(component.id.clone(), op);
    }

    fn two_mode(
        &mut self,
        component: &Component,
        a: usize,
        b: usize,
        m: [[C64; 2]; 2],
        detail: String,
    ) -> Result<(), ExecutionError> {
        self.check_pair(component, a, b)?;
        if !finite_2x2(&m) {
            return Err(ExecutionError::NonFinite {
                component: component.id.clone(),
            });
        }
        let op = if is_identity_2x2(&m) {
            EffectiveOp::Identity
        } else {
            apply_two_mode(&mut self.transfer, a, b, &m);
            self.push_stage(&component.id, |p| apply_two_mode(p, a, b, &m));
            EffectiveOp::Transform
        };
        self.record(component, op, detail);
        Ok(())
    }

    /// Amplitude transmission `tau` on `mode`; anything other than a pure
    /// phase goes through a fresh loss mode.
    fn attenuate(
        &mut self,
        component: &Component,
        mode: usize,
        tau: C64,
        lossless_op: EffectiveOp,
        detail: String,
    ) -> Result<(), ExecutionError> {
        self.check_mode(component, mode)?;
        if !(tau.re.is_finite() && tau.im.is_finite()) {
            return Err(ExecutionError::NonFinite {
                component: component.id.clone(),
            });
        }
        self.break_chain();
        if (tau.norm() - 1.0).abs() < IDENTITY_EPS {
            apply_phase(&mut self.transfer, mode, tau);
            self.record(component, lossless_op, detail);
            return Ok(());
        }
        let loss = self.next_loss;
        self.next_loss += 1;
        apply_two_mode(&mut self.transfer, mode, loss, &loss_coupling(tau));
        self.record(component, EffectiveOp::Lossy, format!("{}, loss mode {}", detail, loss));
        Ok(())
    }

    fn compile_component(&mut self, component: &Component) -> Result<(), ExecutionError> {
        match &component.kind {
            ComponentKind::Source(p) => {
                self.check_mode(component, p.mode)?;
                self.input[p.mode] = self.input[p.mode].saturating_add(p.photons);
                self.record(
                    component,
                    EffectiveOp::Source,
                    format!("{} photon(s) into mode {}", p.photons, p.mode),
                );
            }
            ComponentKind::Crystal(p) => {
                self.check_mode(component, p.signal_mode)?;
                self.check_mode(component, p.idler_mode)?;
                self.input[p.signal_mode] = self.input[p.signal_mode].saturating_add(1);
                self.input[p.idler_mode] = self.input[p.idler_mode].saturating_add(1);
                self.record(
                    component,
                    EffectiveOp::Source,
                    format!("pair into modes ({}, {})", p.signal_mode, p.idler_mode),
                );
            }
            ComponentKind::BeamSplitter(p) => {
                let m = beam_splitter(p.reflectivity, p.phase_rad);
                let detail = format!(
                    "modes ({}, {}) R={:.3} phi={:.3}",
                    p.mode_a, p.mode_b, p.reflectivity, p.phase_rad
                );
                self.two_mode(component, p.mode_a, p.mode_b, m, detail)?;
            }
            ComponentKind::Waveplate(p) => {
                let m = waveplate(p.angle_deg, p.retardance);
                let detail = format!(
                    "modes ({}, {}) {:?} at {:.2} deg",
                    p.mode_h, p.mode_v, p.retardance, p.angle_deg
                );
                self.two_mode(component, p.mode_h, p.mode_v, m, detail)?;
            }
            ComponentKind::PhaseShifter(p) => {
                self.check_mode(component, p.mode)?;
                let factor = C64::from_polar(1.0, p.phase_rad);
                if !(factor.re.is_finite() && factor.im.is_finite()) {
                    return Err(ExecutionError::NonFinite {
                        component: component.id.clone(),
                    });
                }
                let op = if (factor - c(1.0, 0.0)).norm() < IDENTITY_EPS {
                    EffectiveOp::Identity
                } else {
                    apply_phase(&mut self.transfer, p.mode, factor);
                    let mode = p.mode;
                    self.push_stage(&component.id, |m| apply_phase(m, mode, factor));
                    EffectiveOp::Transform
                };
                self.record(component, op, format!("mode {} phi={:.3}", p.mode, p.phase_rad));
            }
            ComponentKind::Mirror(p) => {
                let tau = -csqrt(p.reflectivity);
                let detail = format!("mode {} R={:.3}", p.mode, p.reflectivity);
                self.attenuate(component, p.mode, tau, EffectiveOp::Passive, detail)?;
            }
            ComponentKind::Filter(p) => {
                let tau = csqrt(p.transmission);
                let detail = format!("mode {} T={:.3}", p.mode, p.transmission);
                self.attenuate(component, p.mode, tau, EffectiveOp::Passive, detail)?;
            }
            ComponentKind::Interferometer(p) => {
                if p.dimension != self.design.modes {
                    return Err(ExecutionError::DimensionMismatch {
                        component: component.id.clone(),
                        operator_dim: p.dimension,
                        state_dim: self.design.modes,
                    });
                }
                let d = p.dimension;
                let (u, op) = match p.kind {
                    InterferometerKind::Identity => (DMatrix::identity(d, d), EffectiveOp::Identity),
                    InterferometerKind::Fourier => (fourier(d), EffectiveOp::Transform),
                    InterferometerKind::Haar => (haar(d, p.seed), EffectiveOp::Transform),
                };
                if u.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
                    return Err(ExecutionError::NonFinite {
                        component: component.id.clone(),
                    });
                }
                if op == EffectiveOp::Transform {
                    let rows = self.transfer.rows(0, d).clone_owned();
                    let mixed = &u * rows;
                    self.transfer.rows_mut(0, d).copy_from(&mixed);
                    self.push_stage(&component.id, |m| *m = &u * &*m);
                }
                self.record(component, op, format!("{:?} on {} modes", p.kind, d));
            }
            // Read out after every other element.
            ComponentKind::Detector(_) => {}
            ComponentKind::Electronics(p) => {
                self.record(
                    component,
                    EffectiveOp::Timing,
                    format!("window {:.3} ns", p.coincidence_window_ns),
                );
            }
            ComponentKind::Other { tag } => {
                self.record(component, EffectiveOp::Unmodeled, format!("no model for '{}'", tag));
            }
        }
        Ok(())
    }

    fn compile_detector(&mut self, component: &Component) -> Result<(), ExecutionError> {
        if let ComponentKind::Detector(p) = &component.kind {
            let detail = format!("mode {} eta={:.3}", p.mode, p.efficiency);
            self.attenuate(component, p.mode, csqrt(p.efficiency), EffectiveOp::Detection, detail)?;
            // A lossy detector is still a detector.
            self.operations.insert(component.id.clone(), EffectiveOp::Detection);
        }
        Ok(())
    }
}

fn needs_loss_mode(component: &Component) -> bool {
    let lossy = |x: f64| (x - 1.0).abs() >= IDENTITY_EPS;
    match &component.kind {
        ComponentKind::Mirror(p) => lossy(p.reflectivity),
        ComponentKind::Filter(p) => lossy(p.transmission),
        ComponentKind::Detector(p) => lossy(p.efficiency),
        _ => false,
    }
}

/// Compile `design` into a transfer network on declared + loss modes.
///
/// One photon already has one output pattern per mode, so a mode count
/// above `max_patterns` (or [`MAX_MODES`]) is refused before anything is
/// allocated.
pub fn compile(design: &ExperimentDesign, max_patterns: u64) -> Result<Network, ExecutionError> {
    let loss_modes = design.components.iter().filter(|c| needs_loss_mode(c)).count();
    let total = design.modes.saturating_add(loss_modes);
    let limit = max_patterns.min(MAX_MODES as u64);
    if total as u64 > limit {
        return Err(ExecutionError::StateSpaceTooLarge {
            patterns: total as u64,
            limit,
        });
    }

    let mut compiler = Compiler {
        design,
        transfer: DMatrix::identity(total, total),
        input: vec![0; design.modes],
        next_loss: design.modes,
        operations: BTreeMap::new(),
        open_runs: Vec::new(),
        chain: Vec::new(),
        cancelled: Vec::new(),
        log: Vec::new(),
    };

    for component in &design.components {
        compiler.compile_component(component)?;
    }
    for component in &design.components {
        compiler.compile_detector(component)?;
    }

    Ok(Network {
        modes: design.modes,
        loss_modes,
        transfer: compiler.transfer,
        input: compiler.input,
        operations: compiler.operations,
        cancelled: compiler.cancelled,
        log: compiler.log,
    })
}

/// C(n + m - 1, n), saturating.
pub fn pattern_count(photons: u32, modes: usize) -> u64 {
    if modes == 0 {
        return if photons == 0 { 1 } else { 0 };
    }
    let n = photons as u128;
    let k = (modes - 1) as u128;
    let mut result: u128 = 1;
    for i in 1..=n.min(k) {
        result = result * (n + k + 1 - i) / i;
        if result > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    result as u64
}

/// Every way of placing `photons` photons in `modes` modes.
fn enumerate_patterns(photons: u32, modes: usize) -> Vec<Vec<u32>> {
    let mut out = Vec::new();
    let mut current = vec![0u32; modes];
    fill(&mut out, &mut current, 0, photons);
    out
}

fn fill(out: &mut Vec<Vec<u32>>, current: &mut Vec<u32>, idx: usize, remaining: u32) {
    if idx + 1 == current.len() {
        current[idx] = remaining;
        out.push(current.clone());
        return;
    }
    for k in (0..=remaining).rev() {
        current[idx] = k;
        fill(out, current, idx + 1, remaining - k);
    }
    current[idx] = 0;
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

/// Exact output distribution. Refuses state spaces above `max_patterns`.
pub fn output_distribution(
    network: &Network,
    max_patterns: u64,
) -> Result<Distribution, ExecutionError> {
    let photons = network.photons();
    if photons == 0 {
        return Err(ExecutionError::NoPhotons);
    }
    let total_modes = network.total_modes();
    let count = pattern_count(photons, total_modes);
    if count > max_patterns || photons > MAX_PHOTONS {
        return Err(ExecutionError::StateSpaceTooLarge {
            patterns: count,
            limit: max_patterns,
        });
    }

    let input_cols: Vec<usize> = network
        .input
        .iter()
        .enumerate()
        .flat_map(|(mode, &k)| std::iter::repeat(mode).take(k as usize))
        .collect();
    let input_norm: f64 = network.input.iter().map(|&k| factorial(k)).product();

    let patterns = enumerate_patterns(photons, total_modes);
    let n = input_cols.len();
    let probabilities = patterns
        .iter()
        .map(|pattern| {
            let output_rows: Vec<usize> = pattern
                .iter()
                .enumerate()
                .flat_map(|(mode, &k)| std::iter::repeat(mode).take(k as usize))
                .collect();
            let sub = DMatrix::from_fn(n, n, |i, j| network.transfer[(output_rows[i], input_cols[j])]);
            let output_norm: f64 = pattern.iter().map(|&k| factorial(k)).product();
            permanent(&sub).norm_sqr() / (input_norm * output_norm)
        })
        .collect();

    Ok(Distribution {
        patterns,
        probabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fixtures;
    use crate::design::parse::parse_design;

    fn unitary_error(u: &DMatrix<C64>) -> f64 {
        let prod = u * u.adjoint();
        (prod - DMatrix::<C64>::identity(u.nrows(), u.ncols())).norm()
    }

    #[test]
    fn test_element_matrices_unitary() {
        for m in [
            beam_splitter(0.3, 0.7),
            waveplate(22.5, Retardance::Half),
            waveplate(13.0, Retardance::Quarter),
            loss_coupling(c(0.8_f64.sqrt(), 0.0)),
            loss_coupling(c(-(0.6_f64.sqrt()), 0.0)),
        ] {
            let u = DMatrix::from_row_slice(2, 2, &[m[0][0], m[0][1], m[1][0], m[1][1]]);
            assert!(unitary_error(&u) < 1e-12);
        }
    }

    #[test]
    fn test_gain_is_not_unitary() {
        let m = loss_coupling(csqrt(2.0));
        let u = DMatrix::from_row_slice(2, 2, &[m[0][0], m[0][1], m[1][0], m[1][1]]);
        assert!(unitary_error(&u) > 0.5);
    }

    #[test]
    fn test_fourier_and_haar_unitary() {
        assert!(unitary_error(&fourier(4)) < 1e-12);
        let h = haar(5, 7);
        assert!(unitary_error(&h) < 1e-9);
        assert_eq!(h, haar(5, 7));
    }

    #[test]
    fn test_pattern_count() {
        assert_eq!(pattern_count(2, 2), 3);
        assert_eq!(pattern_count(3, 4), 20);
        assert_eq!(pattern_count(0, 5), 1);
        assert_eq!(pattern_count(1, 7), 7);
        assert_eq!(enumerate_patterns(3, 4).len(), 20);
    }

    #[test]
    fn test_hom_distribution() {
        let net = compile(&fixtures::hom(), 1000).unwrap();
        assert_eq!(net.loss_modes, 0);
        assert_eq!(net.input, vec![1, 1]);
        let dist = output_distribution(&net, 1000).unwrap();
        assert!((dist.total() - 1.0).abs() < 1e-12);
        let coincidence = dist.mass_where(|p| p[0] == 1 && p[1] == 1);
        assert!(coincidence.abs() < 1e-12);
        assert!((dist.mass_where(|p| p[0] == 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_bb84_detector_loss_modes() {
        let net = compile(&fixtures::bb84(), 1000).unwrap();
        assert_eq!(net.loss_modes, 2);
        assert_eq!(net.operations["det_h"], EffectiveOp::Detection);
        assert_eq!(net.operations["alice_hwp"], EffectiveOp::Transform);
        assert_eq!(net.operations["tagger"], EffectiveOp::Timing);
        let dist = output_distribution(&net, 1000).unwrap();
        assert!((dist.total() - 1.0).abs() < 1e-12);
        assert!((dist.mass_where(|p| p[0] == 1) - 0.9).abs() < 1e-9);
        assert!(dist.mass_where(|p| p[1] == 1) < 1e-12);
    }

    fn design(components: &str, modes: usize) -> ExperimentDesign {
        let text = format!(
            r#"{{"title":"t","modes":{},"components":[{}]}}"#,
            modes, components
        );
        parse_design(&text, 1).unwrap()
    }

    #[test]
    fn test_gain_filter_breaks_normalization() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"amp","type":"filter","parameters":{"mode":0,"transmission":4.0}}"#,
            1,
        );
        let net = compile(&d, 1000).unwrap();
        assert_eq!(net.operations["amp"], EffectiveOp::Lossy);
        let dist = output_distribution(&net, 100).unwrap();
        assert!((dist.total() - 1.0).abs() > 1.0);
    }

    #[test]
    fn test_collapsed_elements() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"bs","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1,"reflectivity":0.0}},
               {"id":"ps","type":"phase_shifter","parameters":{"mode":1,"phase_rad":0.0}},
               {"id":"m","type":"mirror","parameters":{"mode":1}},
               {"id":"tbl","type":"optical_table","parameters":{}}"#,
            2,
        );
        let net = compile(&d, 1000).unwrap();
        assert_eq!(net.operations["bs"], EffectiveOp::Identity);
        assert_eq!(net.operations["ps"], EffectiveOp::Identity);
        assert_eq!(net.operations["m"], EffectiveOp::Passive);
        assert_eq!(net.operations["tbl"], EffectiveOp::Unmodeled);
    }

    #[test]
    fn test_opposite_phases_cancel() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"bs1","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1}},
               {"id":"ps1","type":"phase_shifter","parameters":{"mode":0,"phase_rad":1.5707963267948966}},
               {"id":"ps2","type":"phase_shifter","parameters":{"mode":0,"phase_rad":-1.5707963267948966}}"#,
            2,
        );
        let net = compile(&d, 1000).unwrap();
        assert_eq!(net.operations["ps1"], EffectiveOp::Transform);
        assert_eq!(net.cancelled, vec![vec!["ps1".to_string(), "ps2".to_string()]]);
        assert!(net.log.iter().any(|l| l == "stages ps1 -> ps2 multiply to the identity"));
    }

    #[test]
    fn test_stage_pairs() {
        // Two 50:50 splitters in a row make a swap, not the identity
        let same = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"a","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1}},
               {"id":"b","type":"beam_splitter","parameters":{"mode_a":0,"mode_b":1}}"#,
            2,
        );
        assert!(compile(&same, 1000).unwrap().cancelled.is_empty());

        // The 2-mode DFT is a Hadamard, its own inverse
        let fourier = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"f1","type":"interferometer","parameters":{"dimension":2}},
               {"id":"f2","type":"interferometer","parameters":{"dimension":2}},
               {"id":"f3","type":"interferometer","parameters":{"dimension":2}}"#,
            2,
        );
        let net = compile(&fourier, 1000).unwrap();
        assert_eq!(net.cancelled, vec![vec!["f1".to_string(), "f2".to_string()]]);
    }

    #[test]
    fn test_lossy_element_breaks_chain() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"ps1","type":"phase_shifter","parameters":{"mode":0,"phase_rad":1.0}},
               {"id":"f","type":"filter","parameters":{"mode":1,"transmission":0.5}},
               {"id":"ps2","type":"phase_shifter","parameters":{"mode":0,"phase_rad":-1.0}}"#,
            2,
        );
        assert!(compile(&d, 1000).unwrap().cancelled.is_empty());
    }

    #[test]
    fn test_interferometer_dimension_mismatch() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"mzi","type":"interferometer","parameters":{"dimension":4}}"#,
            2,
        );
        assert_eq!(
            compile(&d, 1000).unwrap_err(),
            ExecutionError::DimensionMismatch {
                component: "mzi".into(),
                operator_dim: 4,
                state_dim: 2
            }
        );
    }

    #[test]
    fn test_mode_out_of_range_and_self_coupling() {
        let d = design(r#"{"id":"s","type":"source","parameters":{"mode":3}}"#, 2);
        assert!(matches!(
            compile(&d, 1000).unwrap_err(),
            ExecutionError::ModeOutOfRange { mode: 3, .. }
        ));
        let d = design(
            r#"{"id":"bs","type":"beam_splitter","parameters":{"mode_a":1,"mode_b":1}}"#,
            2,
        );
        assert!(matches!(
            compile(&d, 1000).unwrap_err(),
            ExecutionError::InvalidCoupling { mode: 1, .. }
        ));
    }

    #[test]
    fn test_state_space_limits() {
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0,"photons":6}},
               {"id":"f","type":"interferometer","parameters":{"dimension":8}}"#,
            8,
        );
        let net = compile(&d, 1000).unwrap();
        assert!(matches!(
            output_distribution(&net, 100).unwrap_err(),
            ExecutionError::StateSpaceTooLarge { patterns: 1716, limit: 100 }
        ));
        let empty = design(r#"{"id":"m","type":"mirror","parameters":{"mode":0}}"#, 1);
        let net = compile(&empty, 1000).unwrap();
        assert_eq!(output_distribution(&net, 100).unwrap_err(), ExecutionError::NoPhotons);
    }

    #[test]
    fn test_huge_mode_count_refused_before_allocation() {
        let d = design(r#"{"id":"s","type":"source","parameters":{"mode":0}}"#, 200_000);
        assert_eq!(
            compile(&d, 250_000).unwrap_err(),
            ExecutionError::StateSpaceTooLarge {
                patterns: 200_000,
                limit: MAX_MODES as u64
            }
        );
        let d = design(r#"{"id":"s","type":"source","parameters":{"mode":0}}"#, 3_000_000_000);
        assert!(matches!(
            compile(&d, u64::MAX).unwrap_err(),
            ExecutionError::StateSpaceTooLarge { .. }
        ));
    }

    #[test]
    fn test_mode_count_counts_loss_modes() {
        // 3 declared modes + 1 loss mode for the lossy detector
        let d = design(
            r#"{"id":"s","type":"source","parameters":{"mode":0}},
               {"id":"d","type":"detector","parameters":{"mode":0,"efficiency":0.5}}"#,
            3,
        );
        assert!(matches!(
            compile(&d, 3).unwrap_err(),
            ExecutionError::StateSpaceTooLarge { patterns: 4, limit: 3 }
        ));
        assert_eq!(compile(&d, 4).unwrap().total_modes(), 4);
    }

    #[test]
    fn test_photon_counts_saturate() {
        let d = design(
            r#"{"id":"a","type":"source","parameters":{"mode":0,"photons":4000000000}},
               {"id":"b","type":"source","parameters":{"mode":0,"photons":4000000000}}"#,
            1,
        );
        let net = compile(&d, 1000).unwrap();
        assert_eq!(net.photons(), u32::MAX);
        assert!(matches!(
            output_distribution(&net, 1000).unwrap_err(),
            ExecutionError::StateSpaceTooLarge { .. }
        ));
    }
}
