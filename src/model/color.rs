use std::fmt;

use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, StringValidation};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Pattern every color field must match, expressed for JSON Schema consumers.
pub const HEX_COLOR_PATTERN: &str = "^#[0-9a-fA-F]{6}$";

/// RGB color with 8-bit channels, decoded from a `#RRGGBB` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (either case). Anything else, including the 3-digit
    /// shorthand, is rejected.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#')?;
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        };
        Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Channels as floats in [0, 1] (sRGB, no gamma conversion).
    pub fn to_unit_rgb(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A `#RRGGBB` color string as it appears on the wire.
///
/// The input spelling is preserved so that parameters round-trip through
/// serialisation unchanged; construction is only possible through
/// [`HexColor::parse`] (or deserialisation, which uses it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(export)]
pub struct HexColor(String);

impl HexColor {
    pub fn parse(s: &str) -> Option<Self> {
        Color::parse_hex(s).map(|_| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn color(&self) -> Color {
        // The constructor already checked the shape.
        Color::parse_hex(&self.0).unwrap_or_default()
    }
}

impl From<Color> for HexColor {
    fn from(c: Color) -> Self {
        Self(c.to_string())
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if Color::parse_hex(&s).is_some() {
            Ok(Self(s))
        } else {
            Err(format!("invalid hex color {s:?}, expected #RRGGBB"))
        }
    }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> String {
        c.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl JsonSchema for HexColor {
    fn schema_name() -> String {
        "HexColor".to_string()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            string: Some(Box::new(StringValidation {
                pattern: Some(HEX_COLOR_PATTERN.to_string()),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}
