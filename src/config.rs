//! Configuration file support for textlayer-pdf
//!
//! Supports TOML configuration files with the following search order:
//! 1. `--config <path>` - explicitly specified path
//! 2. `./textlayer.toml` - current directory
//! 3. `~/.config/textlayer-pdf/config.toml` - user config
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [general]
//! threads = 4
//!
//! [skew]
//! enabled = true
//! algorithm = "combined"
//! max_angle = 10.0
//!
//! [layer]
//! render_invisible = true
//! font = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
//!
//! [recognition]
//! format = "azure-read"
//! attempts = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::deskew::DeskewAlgorithm;
use crate::recognition::RecognitionFormat;
use crate::PipelineConfig;

/// File name looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = "textlayer.toml";

/// Directory under the user config dir
pub const APP_CONFIG_DIR: &str = "textlayer-pdf";

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// General configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Worker threads for batch processing
    #[serde(default)]
    pub threads: Option<usize>,

    /// Verbosity level (0-3)
    #[serde(default)]
    pub verbose: Option<u8>,
}

/// Skew estimation options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkewConfig {
    /// Estimate page skew before placing words
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub algorithm: Option<DeskewAlgorithm>,

    /// Projection sweep range in degrees
    #[serde(default)]
    pub max_angle: Option<f64>,

    /// Projection sweep step in degrees
    #[serde(default)]
    pub angle_step: Option<f64>,

    /// Longest side of the analysis image
    #[serde(default)]
    pub max_working_side: Option<u32>,

    #[serde(default)]
    pub noise_radius: Option<u8>,
}

/// Text layer options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayerConfig {
    /// Draw text with render mode 3 (invisible)
    #[serde(default)]
    pub render_invisible: Option<bool>,

    /// Draw word outlines instead of text
    #[serde(default)]
    pub show_boxes: Option<bool>,

    /// TrueType font used for glyph widths
    #[serde(default)]
    pub font: Option<PathBuf>,
}

/// Recognition input options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognitionConfig {
    #[serde(default)]
    pub format: Option<RecognitionFormat>,

    /// Total attempts per page
    #[serde(default)]
    pub attempts: Option<u32>,

    /// First retry delay in milliseconds
    #[serde(default)]
    pub base_delay_ms: Option<u64>,

    /// Delay multiplier per failed attempt
    #[serde(default)]
    pub multiplier: Option<f64>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Skew settings
    #[serde(default)]
    pub skew: SkewConfig,

    /// Text layer settings
    #[serde(default)]
    pub layer: LayerConfig,

    /// Recognition settings
    #[serde(default)]
    pub recognition: RecognitionConfig,
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default search path
    ///
    /// Search order:
    /// 1. `./textlayer.toml`
    /// 2. `~/.config/textlayer-pdf/config.toml`
    /// 3. Default values (if no file found)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::search_paths().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path` when given, otherwise from the search path
    pub fn load_or_search(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Convert to PipelineConfig
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();

        if let Some(threads) = self.general.threads {
            config = config.with_threads(threads);
        }

        let skew = &self.skew;
        if let Some(enabled) = skew.enabled {
            config = config.with_skew(enabled);
        }
        if let Some(algorithm) = skew.algorithm {
            config = config.with_skew_algorithm(algorithm);
        }
        if let Some(max_angle) = skew.max_angle {
            config.max_angle = max_angle;
        }
        if let Some(step) = skew.angle_step {
            config.angle_step = step;
        }
        if let Some(side) = skew.max_working_side {
            config.max_working_side = side;
        }
        if let Some(radius) = skew.noise_radius {
            config.noise_radius = radius;
        }

        if let Some(invisible) = self.layer.render_invisible {
            config.render_invisible = invisible;
        }
        if let Some(show_boxes) = self.layer.show_boxes {
            config = config.with_show_boxes(show_boxes);
        }
        if let Some(font) = &self.layer.font {
            config = config.with_font(font.clone());
        }

        let recognition = &self.recognition;
        if let Some(format) = recognition.format {
            config = config.with_recognition_format(format);
        }
        if let Some(attempts) = recognition.attempts {
            config = config.with_retry_attempts(attempts);
        }
        if let Some(delay) = recognition.base_delay_ms {
            config.retry_base_delay_ms = delay;
        }
        if let Some(multiplier) = recognition.multiplier {
            config.retry_multiplier = multiplier;
        }

        config
    }

    /// Merge with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> PipelineConfig {
        let mut config = self.to_pipeline_config();

        if let Some(threads) = cli.threads {
            config = config.with_threads(threads);
        }
        if let Some(skew) = cli.skew {
            config = config.with_skew(skew);
        }
        if let Some(algorithm) = cli.skew_algorithm {
            config = config.with_skew_algorithm(algorithm);
        }
        if let Some(max_angle) = cli.max_angle {
            config.max_angle = max_angle;
        }
        if let Some(invisible) = cli.render_invisible {
            config.render_invisible = invisible;
        }
        if let Some(show_boxes) = cli.show_boxes {
            config = config.with_show_boxes(show_boxes);
        }
        if let Some(font) = &cli.font {
            config = config.with_font(font.clone());
        }
        if let Some(format) = cli.recognition_format {
            config = config.with_recognition_format(format);
        }
        if let Some(attempts) = cli.retry_attempts {
            config = config.with_retry_attempts(attempts);
        }

        config
    }

    /// Get config file search paths
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_CONFIG_DIR).join("config.toml"));
        }

        paths
    }
}

/// CLI override values for merging with config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threads: Option<usize>,
    pub skew: Option<bool>,
    pub skew_algorithm: Option<DeskewAlgorithm>,
    pub max_angle: Option<f64>,
    pub render_invisible: Option<bool>,
    pub show_boxes: Option<bool>,
    pub font: Option<PathBuf>,
    pub recognition_format: Option<RecognitionFormat>,
    pub retry_attempts: Option<u32>,
}

impl CliOverrides {
    /// Create new empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set skew estimation override
    pub fn with_skew(mut self, enabled: bool) -> Self {
        self.skew = Some(enabled);
        self
    }

    pub fn with_skew_algorithm(mut self, algorithm: DeskewAlgorithm) -> Self {
        self.skew_algorithm = Some(algorithm);
        self
    }

    /// Set debug outline override
    pub fn with_show_boxes(mut self, show_boxes: bool) -> Self {
        self.show_boxes = Some(show_boxes);
        self
    }

    pub fn with_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn with_recognition_format(mut self, format: RecognitionFormat) -> Self {
        self.recognition_format = Some(format);
        self
    }

    /// Set retry attempts override
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}
