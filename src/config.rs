#![forbid(unsafe_code)]

//! Mapper configuration, optionally loaded from a TOML file:
//!
//! ```toml
//! [mapper]
//! identity_field = "_id"
//! prepare_indexes = true
//! surface_rollback_failures = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tx::RollbackFailurePolicy;

/// Tunables for [`crate::Mapper`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Relationship `indexField` value that means "look the node up by id".
    pub identity_field: String,
    /// Run schema index preparation before creates.
    pub prepare_indexes: bool,
    /// Return [`crate::OgmError::RollbackFailed`] when a rollback fails instead
    /// of logging it and returning the original error.
    pub surface_rollback_failures: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            identity_field: "_id".to_owned(),
            prepare_indexes: true,
            surface_rollback_failures: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    mapper: MapperConfig,
}

impl MapperConfig {
    /// Parses a TOML document with an optional `[mapper]` table.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        raw.mapper.checked()
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        raw.mapper.checked()
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if self.identity_field.trim().is_empty() {
            return Err(ConfigError::EmptyIdentityField);
        }
        Ok(self)
    }

    pub(crate) fn rollback_policy(&self) -> RollbackFailurePolicy {
        if self.surface_rollback_failures {
            RollbackFailurePolicy::Surface
        } else {
            RollbackFailurePolicy::Discard
        }
    }
}

/// Errors raised while loading a [`MapperConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read mapper config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid TOML or has unknown keys.
    #[error("failed to parse mapper config{}: {source}", display_path(.path))]
    Parse {
        /// File that failed, when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// `identity_field` was blank.
    #[error("identity_field must not be empty")]
    EmptyIdentityField,
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}
