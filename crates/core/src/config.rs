use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Top-level settings, one section per concern. Every section is optional in
/// the file and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub fusion: FusionSettings,
    pub extraction: ExtractionSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionSettings {
    /// Leading digits a recognizer tends to invent when it misreads the glyph
    /// printed in front of an amount (`*` on Turkish receipts reads as 1 or 4).
    pub spurious_prefix_digits: Vec<char>,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { spurious_prefix_digits: vec!['1', '4'] }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Also extract trade registry, MERSIS, ETTN and tax id numbers.
    pub extended_fields: bool,
    /// Tax ids that belong to the ingesting company and must never be
    /// reported as the issuer's.
    pub excluded_tax_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Page segmentation modes, in pass order.
    pub modes: Vec<u8>,
    /// Modes whose transcripts are not used for line items.
    pub item_modes_exclude: Vec<u8>,
    /// Run the cropped scenarios.
    pub crop: bool,
    /// Run the preprocessed scenarios.
    pub preprocess: bool,
    /// Where per-pass transcripts are written for debugging. Disabled when unset.
    pub artifacts_dir: Option<PathBuf>,
    pub upscale_min_side: u32,
    pub language: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            modes: vec![11, 4, 6, 3],
            item_modes_exclude: vec![11],
            crop: true,
            preprocess: true,
            artifacts_dir: None,
            upscale_min_side: 800,
            language: "tur".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(toml_content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(c) = self.fusion.spurious_prefix_digits.iter().find(|c| !c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "fusion.spurious_prefix_digits must be digits, got '{c}'"
            )));
        }
        if self.pipeline.modes.is_empty() {
            return Err(ConfigError::Invalid("pipeline.modes must not be empty".into()));
        }
        Ok(())
    }
}
