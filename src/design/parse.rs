// src/design/parse.rs — Raw design JSON → validated ExperimentDesign

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::*;

/// Wire shape of a design, as the generator writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDesign {
    pub title: String,
    #[serde(default)]
    pub physics_goal: String,
    pub modes: u32,
    pub components: Vec<RawComponent>,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub expected: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl From<&ExperimentDesign> for RawDesign {
    fn from(d: &ExperimentDesign) -> Self {
        RawDesign {
            title: d.title.clone(),
            physics_goal: d.physics_goal.clone(),
            modes: d.modes as u32,
            components: d
                .components
                .iter()
                .map(|c| RawComponent {
                    id: c.id.clone(),
                    kind: c.type_tag().to_string(),
                    justification: c.justification.clone(),
                    parameters: c.parameters.clone(),
                })
                .collect(),
            expected_outcome: d.expected_outcome.clone(),
            expected: d.expected.clone(),
            version: Some(d.version),
        }
    }
}

/// Find the JSON object in an LLM response: strips Markdown fences and any
/// prose before the first `{` or after the matching `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

const RAW_KEEP_CHARS: usize = 2000;

/// Keep enough of a bad reply for the trace without holding the whole thing.
pub fn truncate_raw(text: &str) -> String {
    match text.char_indices().nth(RAW_KEEP_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Parse and validate a design from raw LLM output.
pub fn parse_design(text: &str, version: u32) -> Result<ExperimentDesign, DesignError> {
    let json = extract_json(text)
        .ok_or_else(|| DesignError::Malformed("no JSON object found".into()))?;
    let raw: RawDesign =
        serde_json::from_str(json).map_err(|e| DesignError::Malformed(e.to_string()))?;
    validate(raw, version)
}

/// Validate a raw design into typed components.
pub fn validate(raw: RawDesign, version: u32) -> Result<ExperimentDesign, DesignError> {
    if raw.modes == 0 {
        return Err(DesignError::ZeroModes);
    }
    if raw.components.is_empty() {
        return Err(DesignError::NoComponents);
    }

    let mut seen = HashSet::new();
    let mut components = Vec::with_capacity(raw.components.len());
    for rc in raw.components {
        let id = rc.id.trim().to_string();
        if id.is_empty() {
            return Err(DesignError::EmptyId);
        }
        if !seen.insert(id.clone()) {
            return Err(DesignError::DuplicateId(id));
        }
        let kind = typed_kind(&id, &rc.kind, &rc.parameters)?;
        components.push(Component {
            id,
            kind,
            justification: rc.justification,
            parameters: rc.parameters,
        });
    }

    Ok(ExperimentDesign {
        title: raw.title,
        physics_goal: raw.physics_goal,
        modes: raw.modes as usize,
        components,
        expected_outcome: raw.expected_outcome,
        expected: raw.expected,
        version,
    })
}

fn typed_kind(id: &str, tag: &str, params: &Parameters) -> Result<ComponentKind, DesignError> {
    let p = ParamReader { id, params };
    let normalized = tag.trim().to_lowercase().replace([' ', '-'], "_");

    let kind = match normalized.as_str() {
        "source" | "single_photon_source" | "laser" => ComponentKind::Source(SourceParams {
            mode: p.mode("mode")?,
            photons: p.opt_count("photons")?.unwrap_or(1),
            wavelength_nm: p.opt_number("wavelength_nm")?.unwrap_or(810.0),
            rate_hz: p.opt_number("rate_hz")?,
        }),
        "crystal" | "spdc" | "nonlinear_crystal" => {
            let pump = p.opt_number("pump_wavelength_nm")?.unwrap_or(405.0);
            let squeezing_db = p.opt_number("squeezing_db")?;
            ComponentKind::Crystal(CrystalParams {
                signal_mode: p.mode("signal_mode")?,
                idler_mode: p.mode("idler_mode")?,
                pump_wavelength_nm: pump,
                signal_wavelength_nm: p.opt_number("signal_wavelength_nm")?.unwrap_or(2.0 * pump),
                idler_wavelength_nm: p.opt_number("idler_wavelength_nm")?.unwrap_or(2.0 * pump),
                pair_rate_hz: p.opt_number("pair_rate_hz")?,
                squeezing_db,
                anti_squeezing_db: p.opt_number("anti_squeezing_db")?.or(squeezing_db),
            })
        }
        "beam_splitter" | "beamsplitter" | "bs" => ComponentKind::BeamSplitter(BeamSplitterParams {
            mode_a: p.mode("mode_a")?,
            mode_b: p.mode("mode_b")?,
            reflectivity: p.opt_number("reflectivity")?.unwrap_or(0.5),
            phase_rad: p.opt_number("phase_rad")?.unwrap_or(0.0),
        }),
        "phase_shifter" => ComponentKind::PhaseShifter(PhaseShifterParams {
            mode: p.mode("mode")?,
            phase_rad: p.number("phase_rad")?,
        }),
        "waveplate" | "wave_plate" => ComponentKind::Waveplate(WaveplateParams {
            mode_h: p.mode("mode_h")?,
            mode_v: p.mode("mode_v")?,
            angle_deg: p.number("angle_deg")?,
            retardance: p.retardance("retardance")?,
        }),
        "mirror" => ComponentKind::Mirror(MirrorParams {
            mode: p.mode("mode")?,
            reflectivity: p.opt_number("reflectivity")?.unwrap_or(1.0),
        }),
        "filter" => ComponentKind::Filter(FilterParams {
            mode: p.mode("mode")?,
            transmission: p.opt_number("transmission")?.unwrap_or(1.0),
            center_wavelength_nm: p.opt_number("center_wavelength_nm")?,
            bandwidth_nm: p.opt_number("bandwidth_nm")?,
        }),
        "interferometer" => ComponentKind::Interferometer(InterferometerParams {
            dimension: p.count("dimension")? as usize,
            kind: p.interferometer_kind("kind")?,
            seed: p.opt_count("seed")?.map(u64::from).unwrap_or(0),
        }),
        "detector" => ComponentKind::Detector(DetectorParams {
            mode: p.mode("mode")?,
            efficiency: p.opt_number("efficiency")?.unwrap_or(1.0),
            dark_count_hz: p.opt_number("dark_count_hz")?.unwrap_or(0.0),
            dead_time_ns: p.opt_number("dead_time_ns")?,
        }),
        "electronics" => ComponentKind::Electronics(ElectronicsParams {
            coincidence_window_ns: p.number("coincidence_window_ns")?,
        }),
        _ => ComponentKind::Other {
            tag: tag.trim().to_string(),
        },
    };
    Ok(kind)
}

struct ParamReader<'a> {
    id: &'a str,
    params: &'a Parameters,
}

impl ParamReader<'_> {
    fn missing(&self, name: &str) -> DesignError {
        DesignError::MissingParameter {
            component: self.id.to_string(),
            name: name.to_string(),
        }
    }

    fn wrong(&self, name: &str, expected: &'static str) -> DesignError {
        DesignError::WrongType {
            component: self.id.to_string(),
            name: name.to_string(),
            expected,
        }
    }

    fn opt_number(&self, name: &str) -> Result<Option<f64>, DesignError> {
        let value = match self.params.get(name) {
            None => return Ok(None),
            Some(ParamValue::Number(n)) => *n,
            // Numbers quoted as strings are common in model output.
            Some(ParamValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.wrong(name, "a number"))?,
        };
        // "NaN" and "inf" parse as f64 but compare false against every range check.
        if !value.is_finite() {
            return Err(self.wrong(name, "a finite number"));
        }
        Ok(Some(value))
    }

    fn number(&self, name: &str) -> Result<f64, DesignError> {
        self.opt_number(name)?.ok_or_else(|| self.missing(name))
    }

    fn opt_count(&self, name: &str) -> Result<Option<u32>, DesignError> {
        match self.opt_number(name) {
            Ok(None) => Ok(None),
            Ok(Some(n)) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
                Ok(Some(n as u32))
            }
            _ => Err(self.wrong(name, "a non-negative integer")),
        }
    }

    fn count(&self, name: &str) -> Result<u32, DesignError> {
        self.opt_count(name)?.ok_or_else(|| self.missing(name))
    }

    fn mode(&self, name: &str) -> Result<usize, DesignError> {
        self.count(name).map(|n| n as usize)
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.params.get(name) {
            Some(ParamValue::Text(s)) => Some(s.trim().to_lowercase()),
            _ => None,
        }
    }

    fn retardance(&self, name: &str) -> Result<Retardance, DesignError> {
        if !self.params.contains_key(name) {
            return Ok(Retardance::Half);
        }
        match self.text(name).as_deref() {
            Some("half") | Some("hwp") | Some("lambda/2") => Ok(Retardance::Half),
            Some("quarter") | Some("qwp") | Some("lambda/4") => Ok(Retardance::Quarter),
            _ => Err(self.wrong(name, "\"half\" or \"quarter\"")),
        }
    }

    fn interferometer_kind(&self, name: &str) -> Result<InterferometerKind, DesignError> {
        if !self.params.contains_key(name) {
            return Ok(InterferometerKind::Fourier);
        }
        match self.text(name).as_deref() {
            Some("fourier") | Some("dft") => Ok(InterferometerKind::Fourier),
            Some("haar") | Some("random") => Ok(InterferometerKind::Haar),
            Some("identity") => Ok(InterferometerKind::Identity),
            _ => Err(self.wrong(name, "\"fourier\", \"haar\" or \"identity\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fixtures;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_extract_json_fenced_with_prose() {
        let text = "Here is the design:\n```json\n{\"a\": {\"b\": \"}\"}}\n```\nLet me know.";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": \"}\"}}"));
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert_eq!(extract_json("{\"a\": 1"), None);
        assert_eq!(extract_json("no braces"), None);
    }

    #[test]
    fn test_truncate_raw() {
        assert_eq!(truncate_raw("short"), "short");
        let long = "x".repeat(RAW_KEEP_CHARS + 10);
        assert_eq!(truncate_raw(&long).chars().count(), RAW_KEEP_CHARS + 1);
    }

    #[test]
    fn test_parse_fixture_types() {
        let d = fixtures::bb84();
        assert_eq!(d.modes, 2);
        assert_eq!(d.version, 1);
        match &d.components[1].kind {
            ComponentKind::Waveplate(w) => {
                assert_eq!(w.angle_deg, 22.5);
                assert_eq!(w.retardance, Retardance::Half);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        match &d.components[0].kind {
            ComponentKind::Source(s) => {
                assert_eq!(s.photons, 1);
                assert_eq!(s.rate_hz, Some(1e6));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_crystal_defaults_are_degenerate() {
        let d = fixtures::hom();
        match &d.components[0].kind {
            ComponentKind::Crystal(c) => {
                assert_eq!(c.signal_wavelength_nm, 810.0);
                assert!(c.squeezing_db.is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    fn one_component(kind: &str, params: &str) -> String {
        format!(
            r#"{{"title":"t","modes":2,"components":[{{"id":"c","type":"{}","parameters":{}}}]}}"#,
            kind, params
        )
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = parse_design(&one_component("phase_shifter", r#"{"mode":0}"#), 1).unwrap_err();
        assert_eq!(
            err,
            DesignError::MissingParameter {
                component: "c".into(),
                name: "phase_rad".into()
            }
        );
    }

    #[test]
    fn test_wrong_type_parameter() {
        let err = parse_design(&one_component("detector", r#"{"mode":"left"}"#), 1).unwrap_err();
        assert!(matches!(err, DesignError::WrongType { .. }));
        let err = parse_design(&one_component("detector", r#"{"mode":1.5}"#), 1).unwrap_err();
        assert!(matches!(err, DesignError::WrongType { .. }));
    }

    #[test]
    fn test_quoted_number_accepted() {
        let d = parse_design(&one_component("mirror", r#"{"mode":"1","reflectivity":"0.9"}"#), 1)
            .unwrap();
        match &d.components[0].kind {
            ComponentKind::Mirror(m) => {
                assert_eq!(m.mode, 1);
                assert_eq!(m.reflectivity, 0.9);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        for text in ["NaN", "inf", "-Infinity"] {
            let params = format!(r#"{{"mode":0,"rate_hz":"{}"}}"#, text);
            let err = parse_design(&one_component("source", &params), 1).unwrap_err();
            assert_eq!(
                err,
                DesignError::WrongType {
                    component: "c".into(),
                    name: "rate_hz".into(),
                    expected: "a finite number"
                }
            );
        }
    }

    #[test]
    fn test_out_of_range_physics_is_not_a_schema_error() {
        let d = parse_design(
            &one_component("filter", r#"{"mode":7,"transmission":2.0}"#),
            1,
        )
        .unwrap();
        assert_eq!(d.components[0].modes(), vec![7]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let text = r#"{"title":"t","modes":1,"components":[
            {"id":"m","type":"mirror","parameters":{"mode":0}},
            {"id":"m","type":"mirror","parameters":{"mode":0}}]}"#;
        assert_eq!(
            parse_design(text, 1).unwrap_err(),
            DesignError::DuplicateId("m".into())
        );
    }

    #[test]
    fn test_zero_modes_and_empty_components() {
        let text = r#"{"title":"t","modes":0,"components":[]}"#;
        assert_eq!(parse_design(text, 1).unwrap_err(), DesignError::ZeroModes);
        let text = r#"{"title":"t","modes":2,"components":[]}"#;
        assert_eq!(parse_design(text, 1).unwrap_err(), DesignError::NoComponents);
    }

    #[test]
    fn test_unknown_type_becomes_other() {
        let d = parse_design(&one_component("Optical Table", "{}"), 1).unwrap();
        assert_eq!(d.components[0].type_tag(), "Optical Table");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_design("{\"title\": 3}", 1).unwrap_err(),
            DesignError::Malformed(_)
        ));
    }

    #[test]
    fn test_raw_roundtrip_preserves_version() {
        let d = fixtures::hom();
        let text = serde_json::to_string(&d).unwrap();
        let again = parse_design(&text, 2).unwrap();
        assert_eq!(again.components, d.components);
        assert_eq!(again.version, 2);
    }
}
