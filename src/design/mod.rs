// src/design/mod.rs — Experiment designs: typed components validated at construction

pub mod context;
pub mod generator;
pub mod parse;
pub mod prompt;
pub mod revision;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generator::{
    DesignGenerator, GeneratedDesign, GenerationError, LlmDesignGenerator, SpentTokens,
};
pub use revision::Revision;

/// A raw parameter value as the generator wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

pub type Parameters = BTreeMap<String, ParamValue>;

/// Structural problems that make a generated design unusable.
///
/// Physically implausible values are not rejected here; those are for the
/// executor and the critique to catch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DesignError {
    #[error("design has no components")]
    NoComponents,

    #[error("design declares zero optical modes")]
    ZeroModes,

    #[error("duplicate component id '{0}'")]
    DuplicateId(String),

    #[error("component has an empty id")]
    EmptyId,

    #[error("component '{component}' is missing required parameter '{name}'")]
    MissingParameter { component: String, name: String },

    #[error("component '{component}' parameter '{name}' must be {expected}")]
    WrongType {
        component: String,
        name: String,
        expected: &'static str,
    },

    #[error("malformed design: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retardance {
    Half,
    Quarter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterferometerKind {
    Fourier,
    Haar,
    Identity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceParams {
    pub mode: usize,
    pub photons: u32,
    pub wavelength_nm: f64,
    pub rate_hz: Option<f64>,
}

/// Spontaneous parametric down-conversion: one heralded pair per event.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalParams {
    pub signal_mode: usize,
    pub idler_mode: usize,
    pub pump_wavelength_nm: f64,
    pub signal_wavelength_nm: f64,
    pub idler_wavelength_nm: f64,
    pub pair_rate_hz: Option<f64>,
    pub squeezing_db: Option<f64>,
    pub anti_squeezing_db: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeamSplitterParams {
    pub mode_a: usize,
    pub mode_b: usize,
    pub reflectivity: f64,
    pub phase_rad: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseShifterParams {
    pub mode: usize,
    pub phase_rad: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveplateParams {
    pub mode_h: usize,
    pub mode_v: usize,
    pub angle_deg: f64,
    pub retardance: Retardance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorParams {
    pub mode: usize,
    pub reflectivity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub mode: usize,
    pub transmission: f64,
    pub center_wavelength_nm: Option<f64>,
    pub bandwidth_nm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterferometerParams {
    pub dimension: usize,
    pub kind: InterferometerKind,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    pub mode: usize,
    pub efficiency: f64,
    pub dark_count_hz: f64,
    pub dead_time_ns: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectronicsParams {
    pub coincidence_window_ns: f64,
}

/// Closed set of component kinds the executor understands, plus `Other`
/// for anything it does not.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    Source(SourceParams),
    Crystal(CrystalParams),
    BeamSplitter(BeamSplitterParams),
    PhaseShifter(PhaseShifterParams),
    Waveplate(WaveplateParams),
    Mirror(MirrorParams),
    Filter(FilterParams),
    Interferometer(InterferometerParams),
    Detector(DetectorParams),
    Electronics(ElectronicsParams),
    Other { tag: String },
}

impl ComponentKind {
    pub fn type_tag(&self) -> &str {
        match self {
            ComponentKind::Source(_) => "source",
            ComponentKind::Crystal(_) => "crystal",
            ComponentKind::BeamSplitter(_) => "beam_splitter",
            ComponentKind::PhaseShifter(_) => "phase_shifter",
            ComponentKind::Waveplate(_) => "waveplate",
            ComponentKind::Mirror(_) => "mirror",
            ComponentKind::Filter(_) => "filter",
            ComponentKind::Interferometer(_) => "interferometer",
            ComponentKind::Detector(_) => "detector",
            ComponentKind::Electronics(_) => "electronics",
            ComponentKind::Other { tag } => tag,
        }
    }

    /// Kinds whose whole purpose is a mode transformation. These are the ones
    /// that must not compile to the identity.
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            ComponentKind::BeamSplitter(_)
                | ComponentKind::PhaseShifter(_)
                | ComponentKind::Waveplate(_)
                | ComponentKind::Interferometer(_)
        )
    }
}

/// Every type tag the executor models, in prompt order.
pub const KNOWN_TYPES: &[&str] = &[
    "source",
    "crystal",
    "beam_splitter",
    "phase_shifter",
    "waveplate",
    "mirror",
    "filter",
    "interferometer",
    "detector",
    "electronics",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub justification: String,
    /// The raw parameter record, kept for revision diffs and reports.
    pub parameters: Parameters,
}

impl Component {
    pub fn type_tag(&self) -> &str {
        self.kind.type_tag()
    }

    /// Optical modes this component reads or writes.
    pub fn modes(&self) -> Vec<usize> {
        match &self.kind {
            ComponentKind::Source(p) => vec![p.mode],
            ComponentKind::Crystal(p) => vec![p.signal_mode, p.idler_mode],
            ComponentKind::BeamSplitter(p) => vec![p.mode_a, p.mode_b],
            ComponentKind::PhaseShifter(p) => vec![p.mode],
            ComponentKind::Waveplate(p) => vec![p.mode_h, p.mode_v],
            ComponentKind::Mirror(p) => vec![p.mode],
            ComponentKind::Filter(p) => vec![p.mode],
            ComponentKind::Interferometer(p) => (0..p.dimension).collect(),
            ComponentKind::Detector(p) => vec![p.mode],
            ComponentKind::Electronics(_) | ComponentKind::Other { .. } => vec![],
        }
    }
}

/// A complete, validated experiment design. Never mutated after
/// construction; a revision is a new value with a higher `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDesign {
    pub title: String,
    pub physics_goal: String,
    pub modes: usize,
    pub components: Vec<Component>,
    pub expected_outcome: String,
    /// Quantities the design predicts, by simulation quantity name.
    pub expected: BTreeMap<String, f64>,
    pub version: u32,
}

impl ExperimentDesign {
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn detectors(&self) -> impl Iterator<Item = (&Component, &DetectorParams)> {
        self.components.iter().filter_map(|c| match &c.kind {
            ComponentKind::Detector(p) => Some((c, p)),
            _ => None,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(parse::RawDesign::from(self)).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ExperimentDesign {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        parse::RawDesign::from(self).serialize(serializer)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built designs shared by unit tests across modules.

    use super::parse::parse_design;
    use super::ExperimentDesign;

    pub fn bb84() -> ExperimentDesign {
        parse_design(BB84_JSON, 1).expect("bb84 fixture parses")
    }

    pub fn hom() -> ExperimentDesign {
        parse_design(HOM_JSON, 1).expect("hom fixture parses")
    }

    pub const BB84_JSON: &str = r#"{
        "title": "BB84 polarization key distribution",
        "physics_goal": "Encode bits in conjugate polarization bases and decode them with matched analysis",
        "modes": 2,
        "components": [
            {"id": "src", "type": "source", "justification": "heralded single photon, H polarized",
             "parameters": {"mode": 0, "wavelength_nm": 810, "rate_hz": 1000000}},
            {"id": "alice_hwp", "type": "waveplate", "justification": "encode diagonal basis",
             "parameters": {"mode_h": 0, "mode_v": 1, "angle_deg": 22.5, "retardance": "half"}},
            {"id": "bob_hwp", "type": "waveplate", "justification": "analyse in the matched basis",
             "parameters": {"mode_h": 0, "mode_v": 1, "angle_deg": 22.5, "retardance": "half"}},
            {"id": "det_h", "type": "detector", "justification": "SPAD on H output",
             "parameters": {"mode": 0, "efficiency": 0.9, "dark_count_hz": 100, "dead_time_ns": 50}},
            {"id": "det_v", "type": "detector", "justification": "SPAD on V output",
             "parameters": {"mode": 1, "efficiency": 0.9, "dark_count_hz": 100, "dead_time_ns": 50}},
            {"id": "tagger", "type": "electronics", "justification": "time tagging",
             "parameters": {"coincidence_window_ns": 1}}
        ],
        "expected_outcome": "The matched basis returns every photon to the H detector",
        "expected": {"click_probability.det_h": 0.9, "click_probability.det_v": 0.0}
    }"#;

    pub const HOM_JSON: &str = r#"{
        "title": "Hong-Ou-Mandel dip",
        "physics_goal": "Two indistinguishable photons bunch on a balanced beam splitter",
        "modes": 2,
        "components": [
            {"id": "spdc", "type": "crystal", "justification": "degenerate type-II pair source",
             "parameters": {"signal_mode": 0, "idler_mode": 1, "pump_wavelength_nm": 405,
                            "signal_wavelength_nm": 810, "idler_wavelength_nm": 810,
                            "pair_rate_hz": 50000}},
            {"id": "bs", "type": "beam_splitter", "justification": "50:50 interference",
             "parameters": {"mode_a": 0, "mode_b": 1, "reflectivity": 0.5}},
            {"id": "d0", "type": "detector", "justification": "output 0",
             "parameters": {"mode": 0, "efficiency": 1.0}},
            {"id": "d1", "type": "detector", "justification": "output 1",
             "parameters": {"mode": 1, "efficiency": 1.0}}
        ],
        "expected_outcome": "Coincidences vanish at zero delay",
        "expected": {"coincidence_probability": 0.0}
    }"#;
}
