use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKind {
    Highlight,
    Border,
}

impl FromStr for StyleKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "highlight" | "fill" => Ok(StyleKind::Highlight),
            "border" | "box" | "outline" => Ok(StyleKind::Border),
            other => Err(anyhow!("unknown annotation style '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Components scaled to `0.0..=1.0` for PDF color operators.
    pub fn unit(&self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl FromStr for Rgb {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!("invalid color '{}'", value));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
            6 => hex.to_string(),
            _ => return Err(anyhow!("invalid color '{}'", value)),
        };
        let channel = |idx: usize| {
            u8::from_str_radix(&expanded[idx..idx + 2], 16)
                .map_err(|_| anyhow!("invalid color '{}'", value))
        };
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationStyle {
    pub kind: StyleKind,
    pub color: Rgb,
    /// Fill opacity, highlight only.
    pub opacity: f32,
    /// Stroke width in points, border only.
    pub border_width: f32,
    pub show_label: bool,
    pub label_color: Rgb,
    pub label_font_size: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            kind: StyleKind::Highlight,
            color: Rgb::new(0xff, 0xeb, 0x3b),
            opacity: 0.35,
            border_width: 1.5,
            show_label: true,
            label_color: Rgb::new(0xc4, 0x00, 0x00),
            label_font_size: 7.0,
        }
    }
}

impl AnnotationStyle {
    pub fn border(color: Rgb, border_width: f32) -> Self {
        Self {
            kind: StyleKind::Border,
            color,
            border_width,
            ..Self::default()
        }
    }
}
