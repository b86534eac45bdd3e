//! Render-ready material and lighting values derived from the parameters.
//!
//! The renderer owns geometry and shaders; this only resolves colors to
//! linear floats and applies the fixed light rig scaling.

use serde::Serialize;

use crate::model::{Color, HexColor, VisualParameters};

/// The key light is the `directional` parameter scaled down by this.
pub const KEY_LIGHT_SCALE: f64 = 0.8;
/// Fixed intensity of the accent spotlight; only its color is driven.
pub const SPOTLIGHT_INTENSITY: f64 = 2.0;
/// Base opacity of the glass body.
pub const GLASS_OPACITY: f64 = 0.3;

/// sRGB transfer function inverse, per channel.
fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// `[r, g, b]` in linear light, each in [0, 1].
pub fn linear_rgb(color: Color) -> [f32; 3] {
    color.to_unit_rgb().map(srgb_to_linear)
}

fn linear(hex: &HexColor) -> [f32; 3] {
    linear_rgb(hex.color())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLook {
    /// Glass body tint.
    pub tint: [f32; 3],
    pub transmission: f64,
    pub roughness: f64,
    pub metalness: f64,
    pub ior: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightRig {
    pub ambient_intensity: f64,
    pub key_intensity: f64,
    pub spotlight_color: [f32; 3],
    pub spotlight_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLook {
    pub text: String,
    pub subtitle: String,
    /// Main text fill.
    pub text_color: [f32; 3],
    /// Main text outline and subtitle fill.
    pub accent_color: [f32; 3],
    /// Pattern overlay color.
    pub pattern_color: [f32; 3],
    pub material: MaterialLook,
    pub lights: LightRig,
}

impl CardLook {
    pub fn from_params(params: &VisualParameters) -> Self {
        let m = &params.material;
        let l = &params.lighting;
        Self {
            text: params.text.clone(),
            subtitle: params.subtitle.clone(),
            text_color: linear(&params.color.glow),
            accent_color: linear(&params.color.accent),
            pattern_color: linear(&params.color.glow),
            material: MaterialLook {
                tint: linear(&params.color.primary),
                transmission: m.transparency,
                roughness: m.roughness,
                metalness: m.metalness,
                ior: m.refractive_index,
                opacity: GLASS_OPACITY,
            },
            lights: LightRig {
                ambient_intensity: l.ambient,
                key_intensity: l.directional * KEY_LIGHT_SCALE,
                spotlight_color: linear(&l.spotlight_color),
                spotlight_intensity: SPOTLIGHT_INTENSITY,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn key_light_is_scaled_directional() {
        let mut params = VisualParameters::default();
        params.lighting.directional = 2.0;
        params.lighting.ambient = 0.25;
        let look = CardLook::from_params(&params);
        assert!((look.lights.key_intensity - 1.6).abs() < 1e-12);
        assert_eq!(look.lights.ambient_intensity, 0.25);
        assert_eq!(look.lights.spotlight_intensity, SPOTLIGHT_INTENSITY);
    }

    #[test]
    fn material_scalars_pass_through() {
        let params = VisualParameters::default();
        let look = CardLook::from_params(&params);
        assert_eq!(look.material.transmission, params.material.transparency);
        assert_eq!(look.material.roughness, params.material.roughness);
        assert_eq!(look.material.metalness, params.material.metalness);
        assert_eq!(look.material.ior, params.material.refractive_index);
        assert_eq!(look.text, params.text);
    }

    #[test]
    fn colors_are_linearised() {
        assert_eq!(linear_rgb(Color::BLACK), [0.0, 0.0, 0.0]);
        assert_eq!(linear_rgb(Color::rgb(255, 255, 255)), [1.0, 1.0, 1.0]);
        // sRGB mid-grey is roughly 21.6% in linear light.
        let [r, g, b] = linear_rgb(Color::rgb(128, 128, 128));
        assert!((r - 0.2158).abs() < 1e-3);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn text_and_pattern_follow_glow() {
        let mut params = VisualParameters::default();
        params.color.glow = HexColor::parse("#ff0000").unwrap();
        params.color.accent = HexColor::parse("#0000ff").unwrap();
        let look = CardLook::from_params(&params);
        assert_eq!(look.text_color, [1.0, 0.0, 0.0]);
        assert_eq!(look.pattern_color, look.text_color);
        assert_eq!(look.accent_color, [0.0, 0.0, 1.0]);
    }
}
