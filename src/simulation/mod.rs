// src/simulation/mod.rs — Simulation results, sanity checks and the executor interface

pub mod executor;
pub mod optics;
pub mod permanent;
pub mod sampler;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::design::ExperimentDesign;

pub use executor::LinearOpticsExecutor;

/// Tolerance on energy conservation in down-conversion (relative).
pub const ENERGY_TOLERANCE: f64 = 1e-3;

/// Heisenberg bound on Var(X)·Var(P) with vacuum variance 1/4.
pub const UNCERTAINTY_BOUND: f64 = 1.0 / 16.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn probability(value: f64) -> Self {
        Self::new(value, "probability")
    }
}

/// A numerical fault that stopped the simulation.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("component '{component}' acts on {operator_dim} modes but the state has {state_dim}")]
    DimensionMismatch {
        component: String,
        operator_dim: usize,
        state_dim: usize,
    },

    #[error("component '{component}' addresses mode {mode} but only {modes} modes are declared")]
    ModeOutOfRange {
        component: String,
        mode: usize,
        modes: usize,
    },

    #[error("component '{component}' couples mode {mode} to itself")]
    InvalidCoupling { component: String, mode: usize },

    #[error("component '{component}' produced a non-finite matrix entry")]
    NonFinite { component: String },

    #[error("state space of {patterns} output patterns exceeds the limit of {limit}")]
    StateSpaceTooLarge { patterns: u64, limit: u64 },

    #[error("no photons enter the network")]
    NoPhotons,

    #[error("simulation exceeded {seconds}s")]
    Timeout { seconds: u64 },

    #[error("simulation worker panicked: {message}")]
    WorkerPanicked { message: String },
}

impl ExecutionError {
    /// The component the fault is attributed to, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            ExecutionError::DimensionMismatch { component, .. }
            | ExecutionError::ModeOutOfRange { component, .. }
            | ExecutionError::InvalidCoupling { component, .. }
            | ExecutionError::NonFinite { component } => Some(component),
            _ => None,
        }
    }
}

/// A result that ran but is physically suspect. Recorded, never corrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanityViolation {
    Normalization { total: f64, tolerance: f64 },
    OutcomeOutOfRange { outcome: String, probability: f64 },
    Uncertainty { component: String, product: f64, bound: f64 },
    EnergyMismatch { component: String, relative: f64 },
}

impl SanityViolation {
    pub fn component(&self) -> Option<&str> {
        match self {
            SanityViolation::Uncertainty { component, .. }
            | SanityViolation::EnergyMismatch { component, .. } => Some(component),
            _ => None,
        }
    }
}

impl fmt::Display for SanityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanityViolation::Normalization { total, tolerance } => write!(
                f,
                "total probability {:.6} differs from 1 by more than {:e}",
                total, tolerance
            ),
            SanityViolation::OutcomeOutOfRange {
                outcome,
                probability,
            } => write!(
                f,
                "outcome {} has probability {:.6} outside [0, 1]",
                outcome, probability
            ),
            SanityViolation::Uncertainty {
                component,
                product,
                bound,
            } => write!(
                f,
                "{}: quadrature variance product {:.6} below the Heisenberg bound {:.6}",
                component, product, bound
            ),
            SanityViolation::EnergyMismatch {
                component,
                relative,
            } => write!(
                f,
                "{}: photon energies violate conservation by {:.3e} (relative)",
                component, relative
            ),
        }
    }
}

/// How a component ended up in the compiled network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveOp {
    /// Non-trivial mode transformation.
    Transform,
    /// Interferometric element that compiled to the identity.
    Identity,
    /// Passive, lossless element acting as intended (e.g. a perfect mirror).
    Passive,
    /// Couples its mode to a loss mode.
    Lossy,
    /// Injects photons.
    Source,
    /// Reads out a mode.
    Detection,
    /// Coincidence timing; affects derived rates only.
    Timing,
    /// No simulation counterpart.
    Unmodeled,
}

impl EffectiveOp {
    /// Whether the component is really present in the simulation.
    pub fn is_implemented(self) -> bool {
        !matches!(self, EffectiveOp::Identity | EffectiveOp::Unmodeled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetadata {
    pub seed: u64,
    pub shots: u64,
    pub modes: usize,
    pub loss_modes: usize,
    pub photons: u32,
    pub effective_operations: BTreeMap<String, EffectiveOp>,
    /// Runs of consecutive transform stages that multiply to the identity.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cancelled_stages: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub success: bool,
    pub quantities: BTreeMap<String, Quantity>,
    /// Total probability mass exactly as computed.
    pub raw_total_probability: Option<f64>,
    pub trace: Vec<String>,
    pub error: Option<ExecutionError>,
    pub violations: Vec<SanityViolation>,
    pub metadata: RunMetadata,
}

impl SimulationResult {
    pub fn failed(error: ExecutionError, trace: Vec<String>, metadata: RunMetadata) -> Self {
        Self {
            success: false,
            quantities: BTreeMap::new(),
            raw_total_probability: None,
            trace,
            error: Some(error),
            violations: Vec::new(),
            metadata,
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.quantities.get(name).map(|q| q.value)
    }

    pub fn is_normalized(&self) -> bool {
        !self
            .violations
            .iter()
            .any(|v| matches!(v, SanityViolation::Normalization { .. }))
    }

    pub fn trace_text(&self) -> String {
        self.trace.join("\n")
    }
}

/// Runs a design. Synchronous and CPU-bound; never panics out and never
/// returns an error: faults are data on the result.
pub trait SimulationExecutor: Send + Sync {
    fn execute(&self, design: &ExperimentDesign) -> SimulationResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_op_implemented() {
        assert!(EffectiveOp::Transform.is_implemented());
        assert!(EffectiveOp::Lossy.is_implemented());
        assert!(!EffectiveOp::Identity.is_implemented());
        assert!(!EffectiveOp::Unmodeled.is_implemented());
    }

    #[test]
    fn test_violation_display_fixed_precision() {
        let v = SanityViolation::Normalization {
            total: 4.0,
            tolerance: 1e-6,
        };
        assert_eq!(
            v.to_string(),
            "total probability 4.000000 differs from 1 by more than 1e-6"
        );
    }

    #[test]
    fn test_execution_error_component() {
        let e = ExecutionError::DimensionMismatch {
            component: "mzi".into(),
            operator_dim: 4,
            state_dim: 2,
        };
        assert_eq!(e.component(), Some("mzi"));
        assert_eq!(
            e.to_string(),
            "component 'mzi' acts on 4 modes but the state has 2"
        );
        assert_eq!(ExecutionError::NoPhotons.component(), None);
    }

    #[test]
    fn test_failed_result_shape() {
        let r = SimulationResult::failed(
            ExecutionError::NoPhotons,
            vec!["line".into()],
            RunMetadata::default(),
        );
        assert!(!r.success);
        assert!(r.is_normalized());
        assert_eq!(r.trace_text(), "line");
        assert_eq!(r.value("total_probability"), None);
    }
}
