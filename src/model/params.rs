//! The canonical visual-parameter record for the glass namecard.
//!
//! Field names and nesting match the JSON payload the assistant is asked to
//! produce, so a [`VisualParameters`] serialises to exactly that shape.

use std::ops::RangeInclusive;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::color::{Color, HexColor};

// ── Limits ───────────────────────────────────────────────────────

/// Closed intervals every numeric field must fall within.
pub mod limits {
    use std::ops::RangeInclusive;

    pub const TRANSPARENCY: RangeInclusive<f64> = 0.0..=1.0;
    pub const ROUGHNESS: RangeInclusive<f64> = 0.0..=1.0;
    pub const METALNESS: RangeInclusive<f64> = 0.0..=1.0;
    pub const REFRACTIVE_INDEX: RangeInclusive<f64> = 1.0..=2.0;
    pub const ROTATION_SPEED: RangeInclusive<f64> = 0.001..=0.05;
    pub const FLOAT_AMPLITUDE: RangeInclusive<f64> = 0.1..=2.0;
    pub const FLOAT_SPEED: RangeInclusive<f64> = 0.001..=0.01;
    pub const DENSITY: RangeInclusive<f64> = 0.0..=1.0;
    pub const AMBIENT: RangeInclusive<f64> = 0.0..=1.0;
    pub const DIRECTIONAL: RangeInclusive<f64> = 0.0..=2.0;

    /// Advisory only; longer strings are accepted.
    pub const TEXT_MAX_CHARS: usize = 20;
    pub const SUBTITLE_MAX_CHARS: usize = 15;
}

// ── Enums ────────────────────────────────────────────────────────

/// Procedural overlay drawn on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PatternKind {
    Grid,
    Waves,
    Particles,
    Circuit,
    None,
}

impl PatternKind {
    pub fn all() -> &'static [PatternKind] {
        &[
            PatternKind::Grid,
            PatternKind::Waves,
            PatternKind::Particles,
            PatternKind::Circuit,
            PatternKind::None,
        ]
    }
}

/// How the pattern elements move over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PatternMovement {
    Static,
    Flowing,
    Pulsing,
}

impl PatternMovement {
    pub fn all() -> &'static [PatternMovement] {
        &[
            PatternMovement::Static,
            PatternMovement::Flowing,
            PatternMovement::Pulsing,
        ]
    }
}

// ── Record ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ColorScheme {
    pub primary: HexColor,
    pub accent: HexColor,
    pub glow: HexColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MaterialParams {
    #[schemars(range(min = 0.0, max = 1.0))]
    pub transparency: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub roughness: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub metalness: f64,
    #[schemars(range(min = 1.0, max = 2.0))]
    pub refractive_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnimationParams {
    /// Oscillation frequency of the card's sway. Never its amplitude.
    #[schemars(range(min = 0.001, max = 0.05))]
    pub rotation_speed: f64,
    #[schemars(range(min = 0.1, max = 2.0))]
    pub float_amplitude: f64,
    #[schemars(range(min = 0.001, max = 0.01))]
    pub float_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct PatternParams {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub density: f64,
    pub movement: PatternMovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LightingParams {
    #[schemars(range(min = 0.0, max = 1.0))]
    pub ambient: f64,
    #[schemars(range(min = 0.0, max = 2.0))]
    pub directional: f64,
    pub spotlight_color: HexColor,
}

/// Everything the renderer needs to know about the card's target appearance.
///
/// Values of this type held by the scene store have always passed
/// [`crate::validate::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct VisualParameters {
    pub text: String,
    pub subtitle: String,
    pub color: ColorScheme,
    pub material: MaterialParams,
    pub animation: AnimationParams,
    pub pattern: PatternParams,
    pub lighting: LightingParams,
}

impl Default for VisualParameters {
    /// The "HELLO" card shown before the first successful turn.
    fn default() -> Self {
        Self {
            text: "HELLO".to_string(),
            subtitle: "AI Powered".to_string(),
            color: ColorScheme {
                primary: Color::rgb(0x00, 0xd9, 0xff).into(),
                accent: Color::rgb(0x00, 0x66, 0xff).into(),
                glow: Color::rgb(0x00, 0xff, 0xff).into(),
            },
            material: MaterialParams {
                transparency: 0.9,
                roughness: 0.05,
                metalness: 0.1,
                refractive_index: 1.5,
            },
            animation: AnimationParams {
                rotation_speed: 0.005,
                float_amplitude: 0.3,
                float_speed: 0.002,
            },
            pattern: PatternParams {
                kind: PatternKind::Grid,
                density: 0.3,
                movement: PatternMovement::Static,
            },
            lighting: LightingParams {
                ambient: 0.4,
                directional: 1.0,
                spotlight_color: Color::rgb(0x00, 0xd9, 0xff).into(),
            },
        }
    }
}

impl VisualParameters {
    /// Every numeric field paired with its dotted JSON path and allowed range.
    /// The validator walks this table; keep it in sync with the struct.
    pub fn numeric_fields(&self) -> [(&'static str, f64, RangeInclusive<f64>); 10] {
        [
            ("material.transparency", self.material.transparency, limits::TRANSPARENCY),
            ("material.roughness", self.material.roughness, limits::ROUGHNESS),
            ("material.metalness", self.material.metalness, limits::METALNESS),
            ("material.refractiveIndex", self.material.refractive_index, limits::REFRACTIVE_INDEX),
            ("animation.rotationSpeed", self.animation.rotation_speed, limits::ROTATION_SPEED),
            ("animation.floatAmplitude", self.animation.float_amplitude, limits::FLOAT_AMPLITUDE),
            ("animation.floatSpeed", self.animation.float_speed, limits::FLOAT_SPEED),
            ("pattern.density", self.pattern.density, limits::DENSITY),
            ("lighting.ambient", self.lighting.ambient, limits::AMBIENT),
            ("lighting.directional", self.lighting.directional, limits::DIRECTIONAL),
        ]
    }

    /// Whether the display strings fit the advisory lengths given to the assistant.
    pub fn text_within_advice(&self) -> bool {
        self.text.chars().count() <= limits::TEXT_MAX_CHARS
            && self.subtitle.chars().count() <= limits::SUBTITLE_MAX_CHARS
    }
}

/// JSON Schema for the payload, for tooling and prompt authors.
pub fn json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(VisualParameters)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_serializes_to_wire_shape() {
        let json = serde_json::to_value(VisualParameters::default()).unwrap();
        assert_eq!(json["text"], "HELLO");
        assert_eq!(json["color"]["primary"], "#00d9ff");
        assert_eq!(json["material"]["refractiveIndex"], 1.5);
        assert_eq!(json["animation"]["rotationSpeed"], 0.005);
        assert_eq!(json["pattern"]["type"], "grid");
        assert_eq!(json["pattern"]["movement"], "static");
        assert_eq!(json["lighting"]["spotlightColor"], "#00d9ff");
    }

    #[test]
    fn default_is_within_limits() {
        let params = VisualParameters::default();
        for (field, value, range) in params.numeric_fields() {
            assert!(range.contains(&value), "{field} = {value} outside {range:?}");
        }
        assert!(params.text_within_advice());
    }

    #[test]
    fn enums_use_lowercase_names() {
        let names: Vec<String> = PatternKind::all()
            .iter()
            .map(|k| serde_json::to_value(k).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["grid", "waves", "particles", "circuit", "none"]);

        let names: Vec<String> = PatternMovement::all()
            .iter()
            .map(|m| serde_json::to_value(m).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["static", "flowing", "pulsing"]);
    }

    #[test]
    fn schema_ranges_match_limits() {
        let schema = serde_json::to_value(json_schema()).unwrap();
        let animation = &schema["definitions"]["AnimationParams"]["properties"];
        assert_eq!(
            animation["rotationSpeed"]["minimum"].as_f64().unwrap(),
            *limits::ROTATION_SPEED.start()
        );
        assert_eq!(
            animation["rotationSpeed"]["maximum"].as_f64().unwrap(),
            *limits::ROTATION_SPEED.end()
        );
        let lighting = &schema["definitions"]["LightingParams"]["properties"];
        assert_eq!(
            lighting["directional"]["maximum"].as_f64().unwrap(),
            *limits::DIRECTIONAL.end()
        );
        assert_eq!(
            schema["definitions"]["HexColor"]["pattern"],
            crate::model::color::HEX_COLOR_PATTERN
        );
    }

    #[test]
    fn long_text_is_only_advisory() {
        let params = VisualParameters {
            text: "A VERY LONG CARD TITLE INDEED".into(),
            ..VisualParameters::default()
        };
        assert!(!params.text_within_advice());
    }
}
