use super::SynchronousArg;
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Defaults read from the optional TOML config file.
#[derive(Debug, Default)]
pub struct CliConfig {
    pub path: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub synchronous: Option<SynchronousArg>,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let required = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if required => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        let synchronous = match raw.synchronous.as_deref() {
            Some(value) => Some(SynchronousArg::from_str(value, true).map_err(|_| {
                ConfigError::InvalidSynchronous {
                    value: value.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self {
            path,
            root: raw.root,
            synchronous,
        })
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    synchronous: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("synchronous value '{value}' is invalid")]
    InvalidSynchronous { value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("symmap").join("config.toml"))
}
