//! TOML configuration
//!
//! Every section is optional; missing fields fall back to the tool defaults.
//! Command-line flags override what is loaded here.

use anyhow::Context;
use doctools_core::{CardLayout, CompressOptions, ConvertOptions, RenderOptions, WatermarkPosition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "doctools.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub cards: CardLayout,
    #[serde(default)]
    pub convert: ConvertOptions,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub compress: CompressOptions,
    #[serde(default)]
    pub watermark: WatermarkConfig,
}

impl Config {
    /// Load `path`, or `doctools.toml` if present, or the defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where artifacts are written
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Upload ceiling for card images, in MiB
    #[serde(default = "default_card_image_max_mb")]
    pub card_image_max_mb: usize,
}

fn default_card_image_max_mb() -> usize {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            card_image_max_mb: default_card_image_max_mb(),
        }
    }
}

impl LimitsConfig {
    pub fn card_image_max_bytes(&self) -> usize {
        self.card_image_max_mb * 1024 * 1024
    }
}

/// Which engine rasterises pages for `to-images`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderEngine {
    /// PDFium when this build has it and the library loads, else embedded
    #[default]
    Auto,
    /// Largest embedded raster per page; scanned documents only
    Embedded,
    Pdfium,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub engine: RenderEngine,
    /// Directory holding the PDFium shared library
    #[serde(default)]
    pub pdfium_library_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub position: WatermarkPosition,
}

fn default_font_size() -> f64 {
    48.0
}

fn default_color() -> String {
    "#808080".to_string()
}

fn default_opacity() -> f64 {
    0.3
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            color: default_color(),
            opacity: default_opacity(),
            position: WatermarkPosition::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctools_core::{PageSizing, RasterFormat};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.output.dir, PathBuf::from("."));
        assert_eq!(config.limits.card_image_max_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.cards.copies, 8);
        assert_eq!(config.convert.sizing, PageSizing::FitA4);
        assert_eq!(config.render.jpeg_quality, 92);
        assert_eq!(config.compress.jpeg_quality, 75);
        assert_eq!(config.compress.max_image_dimension, 1600);
        assert_eq!(config.watermark.color, "#808080");
        assert_eq!(config.renderer.engine, RenderEngine::Auto);
        assert!(config.renderer.pdfium_library_dir.is_none());
    }

    #[test]
    fn test_renderer_section() {
        let config = Config::from_str(
            r#"
            [renderer]
            engine = "pdfium"
            pdfium_library_dir = "/opt/pdfium/lib"
            "#,
        )
        .unwrap();
        assert_eq!(config.renderer.engine, RenderEngine::Pdfium);
        assert_eq!(
            config.renderer.pdfium_library_dir,
            Some(PathBuf::from("/opt/pdfium/lib"))
        );
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_str(
            r##"
            [output]
            dir = "out"

            [cards]
            copies = 4

            [render]
            format = "png"

            [convert]
            sizing = "match_image"

            [watermark]
            position = "bottom-right"
            color = "#FF0000"
            "##,
        )
        .unwrap();

        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.cards.copies, 4);
        assert_eq!(config.cards.columns, 2);
        assert_eq!(config.render.format, RasterFormat::Png);
        assert_eq!(config.convert.sizing, PageSizing::MatchImage);
        assert_eq!(config.watermark.position, WatermarkPosition::BottomRight);
        assert_eq!(config.watermark.opacity, 0.3);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let err = Config::from_str("[cards\ncopies = ").unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(&path, "[limits]\ncard_image_max_mb = 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.limits.card_image_max_bytes(), 2 * 1024 * 1024);

        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }
}
