// Configuration loading: optional config/etl.toml plus command-line overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::Profile;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Assembled config
// ---------------------------------------------------------------------------

pub const DEFAULT_INPUT: &str = "data/CPBL-2024-OpenData.json";
pub const DEFAULT_DB_PATH: &str = "data/baseball.db";

/// Location of the optional config file, relative to the base directory.
pub const CONFIG_FILE: &str = "config/etl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlConfig {
    /// JSON document to load.
    pub input: PathBuf,
    /// SQLite store to create or update.
    pub db_path: PathBuf,
    pub profile: Profile,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            profile: Profile::Structured,
        }
    }
}

/// Values supplied on the command line. `Some` wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub profile: Option<Profile>,
}

// ---------------------------------------------------------------------------
// etl.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[etl]` table.
#[derive(Debug, Default, Deserialize)]
struct EtlFile {
    #[serde(default)]
    etl: EtlSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EtlSection {
    input: Option<PathBuf>,
    db_path: Option<PathBuf>,
    profile: Option<Profile>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Read `config/etl.toml` under `base_dir`, falling back to the built-in
/// defaults for anything the file leaves out (or when it does not exist).
pub fn load_config_from(base_dir: &Path) -> Result<EtlConfig, ConfigError> {
    let path = base_dir.join(CONFIG_FILE);
    let mut config = EtlConfig::default();

    if path.exists() {
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let file: EtlFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        let section = file.etl;
        if let Some(input) = section.input {
            config.input = input;
        }
        if let Some(db_path) = section.db_path {
            config.db_path = db_path;
        }
        if let Some(profile) = section.profile {
            config.profile = profile;
        }
    }

    validate(&config)?;
    Ok(config)
}

/// Load the config file under `base_dir` and apply command-line overrides.
pub fn load_config(base_dir: &Path, overrides: &Overrides) -> Result<EtlConfig, ConfigError> {
    let mut config = load_config_from(base_dir)?;
    if let Some(input) = &overrides.input {
        config.input = input.clone();
    }
    if let Some(db_path) = &overrides.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(profile) = overrides.profile {
        config.profile = profile;
    }
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &EtlConfig) -> Result<(), ConfigError> {
    let path_fields: &[(&str, &Path)] = &[
        ("etl.input", config.input.as_path()),
        ("etl.db_path", config.db_path.as_path()),
    ];
    for (name, path) in path_fields {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
