// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default bound on symlink substitutions during one resolution.
pub const DEFAULT_MAX_SYMLINK_EXPANSIONS: usize = 40;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration shared by the adapters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FsConfig {
    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default)]
    pub resolution: ResolutionPolicy,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

/// Effective identity of the caller.
///
/// Used as the owner of nodes created without explicit ownership and by the
/// ownership-change check, which only lets uid 0 or gid 0 through. It is not
/// an access-control model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityPolicy {
    #[serde(default)]
    pub euid: u32,
    #[serde(default)]
    pub egid: u32,
}

impl SecurityPolicy {
    pub fn may_chown(&self) -> bool {
        self.euid == 0 || self.egid == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolutionPolicy {
    /// Symlink substitutions allowed per top-level path resolution
    #[serde(default = "default_max_symlink_expansions")]
    pub max_symlink_expansions: usize,
}

fn default_max_symlink_expansions() -> usize {
    DEFAULT_MAX_SYMLINK_EXPANSIONS
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            max_symlink_expansions: DEFAULT_MAX_SYMLINK_EXPANSIONS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OverlayConfig {
    /// Host directory exposed read-only beneath the in-memory tree
    pub lower_root: Option<PathBuf>,
}

impl FsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = FsConfig::from_toml_str("").unwrap();
        assert_eq!(config, FsConfig::default());
        assert_eq!(config.resolution.max_symlink_expansions, 40);
        assert!(config.security.may_chown());
    }

    #[test]
    fn partial_sections_fill_in() {
        let config = FsConfig::from_toml_str(
            r#"
            [security]
            euid = 1000
            egid = 1000

            [overlay]
            lower-root = "/srv/data"
            "#,
        )
        .unwrap();
        assert_eq!(config.security.euid, 1000);
        assert!(!config.security.may_chown());
        assert_eq!(config.resolution.max_symlink_expansions, 40);
        assert_eq!(config.overlay.lower_root, Some(PathBuf::from("/srv/data")));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FsConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[resolution]\nmax-symlink-expansions = \"many\"\n").unwrap();
        assert!(matches!(FsConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
