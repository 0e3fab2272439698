use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::locator::LocatorConfig;
use crate::merge::MergeConfig;
use crate::pipeline::PipelineConfig;
use crate::render::snapshot::SnapshotConfig;
use crate::render::{AnnotationStyle, Rgb, StyleKind};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub threshold: f32,
    pub page_window: u32,
    pub trim_edges: bool,
    pub line_tolerance: f32,
    pub gap_tolerance: f32,
    pub style_kind: StyleKind,
    pub style_color: Rgb,
    pub style_opacity: f32,
    pub border_width: f32,
    pub show_label: bool,
    pub label_font_size: f32,
    pub snapshot_dpi: f32,
    pub snapshot_padding: f32,
    pub snapshot_context_factor: f32,
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let locator = LocatorConfig::default();
        let merge = MergeConfig::default();
        let style = AnnotationStyle::default();
        let snapshot = SnapshotConfig::default();
        Self {
            threshold: locator.threshold,
            page_window: locator.page_window,
            trim_edges: locator.trim_edges,
            line_tolerance: merge.line_tolerance,
            gap_tolerance: merge.gap_tolerance,
            style_kind: style.kind,
            style_color: style.color,
            style_opacity: style.opacity,
            border_width: style.border_width,
            show_label: style.show_label,
            label_font_size: style.label_font_size,
            snapshot_dpi: snapshot.dpi,
            snapshot_padding: snapshot.padding,
            snapshot_context_factor: snapshot.context_factor,
            parallel: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    locator: Option<LocatorSettings>,
    merge: Option<MergeSettings>,
    style: Option<StyleSettings>,
    snapshot: Option<SnapshotSettings>,
    pipeline: Option<PipelineSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct LocatorSettings {
    threshold: Option<f32>,
    page_window: Option<u32>,
    trim_edges: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MergeSettings {
    line_tolerance: Option<f32>,
    gap_tolerance: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct StyleSettings {
    kind: Option<String>,
    color: Option<String>,
    opacity: Option<f32>,
    border_width: Option<f32>,
    show_label: Option<bool>,
    label_font_size: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotSettings {
    dpi: Option<f32>,
    padding: Option<f32>,
    context_factor: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    parallel: Option<bool>,
}

/// Loads the embedded defaults, then the working-directory files, the
/// per-user file and finally `extra_path`, which must exist when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_settings_from(&ordered_paths)
}

/// Embedded defaults overlaid with each existing file of `paths`, in order.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults =
        parse(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed = parse(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        debug!("applying settings from {}", path.display());
        settings.merge(parsed);
    }
    Ok(settings)
}

fn parse(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

impl Settings {
    /// [`load_settings`] for callers that only deal in [`PipelineError`].
    pub fn load(extra_path: Option<&Path>) -> Result<Settings, PipelineError> {
        load_settings(extra_path).map_err(PipelineError::settings)
    }

    pub fn locator(&self) -> LocatorConfig {
        LocatorConfig {
            threshold: self.threshold,
            page_window: self.page_window,
            trim_edges: self.trim_edges,
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            line_tolerance: self.line_tolerance,
            gap_tolerance: self.gap_tolerance,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            locator: self.locator(),
            merge: self.merge_config(),
            parallel: self.parallel,
        }
    }

    pub fn style(&self) -> AnnotationStyle {
        AnnotationStyle {
            kind: self.style_kind,
            color: self.style_color,
            opacity: self.style_opacity,
            border_width: self.border_width,
            show_label: self.show_label,
            label_font_size: self.label_font_size,
            ..AnnotationStyle::default()
        }
    }

    pub fn snapshot(&self) -> SnapshotConfig {
        SnapshotConfig {
            dpi: self.snapshot_dpi,
            padding: self.snapshot_padding,
            context_factor: self.snapshot_context_factor,
            ..SnapshotConfig::default()
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(locator) = incoming.locator {
            if let Some(threshold) = locator.threshold {
                if threshold > 0.0 && threshold <= 1.0 {
                    self.threshold = threshold;
                } else {
                    warn!("ignoring locator.threshold {}: must be in (0, 1]", threshold);
                }
            }
            if let Some(window) = locator.page_window {
                self.page_window = window;
            }
            if let Some(trim) = locator.trim_edges {
                self.trim_edges = trim;
            }
        }
        if let Some(merge) = incoming.merge {
            if let Some(tolerance) = merge.line_tolerance {
                set_positive(&mut self.line_tolerance, tolerance, "merge.line_tolerance");
            }
            if let Some(tolerance) = merge.gap_tolerance {
                set_positive(&mut self.gap_tolerance, tolerance, "merge.gap_tolerance");
            }
        }
        if let Some(style) = incoming.style {
            if let Some(kind) = style.kind {
                match kind.parse::<StyleKind>() {
                    Ok(kind) => self.style_kind = kind,
                    Err(err) => warn!("ignoring style.kind: {}", err),
                }
            }
            if let Some(color) = style.color {
                match color.parse::<Rgb>() {
                    Ok(color) => self.style_color = color,
                    Err(err) => warn!("ignoring style.color: {}", err),
                }
            }
            if let Some(opacity) = style.opacity {
                if (0.0..=1.0).contains(&opacity) {
                    self.style_opacity = opacity;
                } else {
                    warn!("ignoring style.opacity {}: must be in [0, 1]", opacity);
                }
            }
            if let Some(width) = style.border_width {
                set_positive(&mut self.border_width, width, "style.border_width");
            }
            if let Some(show) = style.show_label {
                self.show_label = show;
            }
            if let Some(size) = style.label_font_size {
                set_positive(&mut self.label_font_size, size, "style.label_font_size");
            }
        }
        if let Some(snapshot) = incoming.snapshot {
            if let Some(dpi) = snapshot.dpi {
                set_positive(&mut self.snapshot_dpi, dpi, "snapshot.dpi");
            }
            if let Some(padding) = snapshot.padding {
                if padding >= 0.0 {
                    self.snapshot_padding = padding;
                } else {
                    warn!("ignoring snapshot.padding {}: must not be negative", padding);
                }
            }
            if let Some(factor) = snapshot.context_factor {
                if factor >= 0.0 {
                    self.snapshot_context_factor = factor;
                } else {
                    warn!("ignoring snapshot.context_factor {}: must not be negative", factor);
                }
            }
        }
        if let Some(pipeline) = incoming.pipeline
            && let Some(parallel) = pipeline.parallel
        {
            self.parallel = parallel;
        }
    }
}

fn set_positive(slot: &mut f32, value: f32, key: &str) {
    if value > 0.0 {
        *slot = value;
    } else {
        warn!("ignoring {} {}: must be positive", key, value);
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".pdf-citation-locator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn embedded_defaults_match_runtime_defaults() {
        let settings = load_settings_from(&[]).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.pipeline(), PipelineConfig::default());
        assert_eq!(settings.style(), AnnotationStyle::default());
        assert_eq!(settings.snapshot(), SnapshotConfig::default());
    }

    #[test]
    fn later_layers_override_field_by_field() {
        let base = file("[locator]\nthreshold = 0.8\npage_window = 1\n[style]\nkind = \"border\"\n");
        let local = file("[locator]\nthreshold = 0.9\n[style]\ncolor = \"#00ff00\"\n");
        let settings =
            load_settings_from(&[base.path().to_path_buf(), local.path().to_path_buf()]).unwrap();
        assert_eq!(settings.threshold, 0.9);
        assert_eq!(settings.page_window, 1);
        assert_eq!(settings.style_kind, StyleKind::Border);
        assert_eq!(settings.style_color, Rgb::new(0, 255, 0));
        assert!(!settings.trim_edges);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let bad = file(
            "[locator]\nthreshold = 1.5\n[merge]\nline_tolerance = -1.0\ngap_tolerance = 12.0\n\
             [style]\ncolor = \"yellowish\"\nopacity = 3.0\n",
        );
        let settings = load_settings_from(&[bad.path().to_path_buf()]).unwrap();
        assert_eq!(settings.threshold, 0.70);
        assert_eq!(settings.line_tolerance, 5.0);
        assert_eq!(settings.gap_tolerance, 12.0);
        assert_eq!(settings.style_color, AnnotationStyle::default().color);
        assert_eq!(settings.style_opacity, 0.35);
    }

    #[test]
    fn missing_layers_are_skipped_but_explicit_file_must_exist() {
        let missing = PathBuf::from("/nonexistent/pdf-citation-locator/settings.toml");
        assert!(load_settings_from(&[missing.clone()]).is_ok());
        let err = load_settings(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, PipelineError::Settings(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let broken = file("[locator\nthreshold = ");
        let err = load_settings_from(&[broken.path().to_path_buf()]).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse settings"));
    }
}
