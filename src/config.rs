//! Application configuration.
//!
//! Loaded once at startup from `config.toml` in the XDG config directory
//! (`~/.config/fluidcanvas/config.toml` on Linux) or from the file named by
//! `FLUIDCANVAS_CONFIG`. Every field has a default, so a missing file or a
//! partial file is fine.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::SeedRange;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "FLUIDCANVAS_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub generation: GenerationSettings,
    pub grid: GridSettings,
    pub pipeline: PipelineSettings,
    pub window: WindowSettings,
}

/// Fixed parameters handed to the engine on every call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    pub image_count: u32,
    pub step_count: u32,
    pub seed_min: u64,
    pub seed_max: u64,
    pub safety_enabled: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            image_count: 4,
            step_count: 25,
            seed_min: 0,
            seed_max: 10_000_000,
            safety_enabled: true,
        }
    }
}

impl GenerationSettings {
    pub fn seed_range(&self) -> SeedRange {
        SeedRange {
            min: self.seed_min,
            max: self.seed_max,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GridSettings {
    pub rows: usize,
    pub columns: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            rows: 2,
            columns: 2,
        }
    }
}

/// How the external engine is launched.
///
/// `args` is a template list; the placeholders `{prompt}`, `{count}`,
/// `{steps}`, `{seed}`, `{safety}`, `{models}` and `{output}` are substituted
/// per request. The engine must write `image-<index>.png` into `{output}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub program: String,
    pub args: Vec<String>,
    pub models_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            program: "fluidcanvas-engine".to_string(),
            args: [
                "--models",
                "{models}",
                "--prompt",
                "{prompt}",
                "--count",
                "{count}",
                "--steps",
                "{steps}",
                "--seed",
                "{seed}",
                "--safety",
                "{safety}",
                "--output",
                "{output}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            models_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSettings {
    pub width: i32,
    pub height: i32,
    pub prefer_dark: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 720,
            height: 900,
            prefer_dark: true,
        }
    }
}

impl AppConfig {
    /// Load from `FLUIDCANVAS_CONFIG` if set, else from the default location.
    /// A missing default file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            Some(path) => {
                tracing::debug!(?path, "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::info!(?path, "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.image_count == 0 {
            return Err(ConfigError::Invalid("generation.image_count must be > 0".into()));
        }
        if generation.step_count == 0 {
            return Err(ConfigError::Invalid("generation.step_count must be > 0".into()));
        }
        if generation.seed_min > generation.seed_max {
            return Err(ConfigError::Invalid(format!(
                "generation.seed_min ({}) exceeds seed_max ({})",
                generation.seed_min, generation.seed_max
            )));
        }
        if self.grid.rows == 0 || self.grid.columns == 0 {
            return Err(ConfigError::Invalid("grid.rows and grid.columns must be > 0".into()));
        }
        if self.pipeline.program.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline.program must not be empty".into()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fluidcanvas")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
