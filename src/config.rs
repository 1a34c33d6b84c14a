//! Runtime configuration: where each source's CSV lives, guardrails and
//! log level.
//!
//! ```toml
//! data_dir = "/srv/atlas/data"
//!
//! [sources]
//! PO = "v_po_status_enriched.csv"
//! ONHAND = "/abs/path/onhand.csv"
//!
//! [guardrails]
//! max_steps = 16
//! max_rows_per_step = 50000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! A `.json` file is read as a flat `{"PO": "po.csv", ...}` source map.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::storage::Source;

/// Default cap on executed steps.
pub const DEFAULT_MAX_STEPS: usize = 16;
/// Default cap on rows retained after any step.
pub const DEFAULT_MAX_ROWS_PER_STEP: usize = 50_000;

/// File names used when no configuration file exists, relative to the data
/// directory.
pub const DEFAULT_SOURCE_FILES: &[(&str, &str)] = &[
    ("PO", "v_po_status_enriched.csv"),
    ("IR", "v_ir_status_enriched.csv"),
    ("SO", "v_so_delivery_status_enriched.csv"),
    ("ONHAND", "v_onhand_status_enriched.csv"),
    ("LPN", "v_lpn_status_se_enriched.csv"),
    ("LPN_SERIALS", "v_lpn_serials_se_enriched.csv"),
    ("LPN_SERIALS_AGG", "v_lpn_serials_agg_se_enriched.csv"),
];

/// Hard limits applied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    /// Steps beyond this are dropped and the output is flagged clipped.
    pub max_steps: usize,
    /// Rows beyond this are truncated after each step.
    pub max_rows_per_step: usize,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_rows_per_step: DEFAULT_MAX_ROWS_PER_STEP,
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasConfig {
    /// File the configuration was read from, if any.
    pub path: Option<PathBuf>,
    /// Base directory for relative source paths.
    pub data_dir: PathBuf,
    /// Logical source name to CSV path, as written.
    pub sources: BTreeMap<String, PathBuf>,
    /// Executor limits.
    pub guardrails: Guardrails,
    /// Default `EnvFilter` directive.
    pub log_level: String,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            path: None,
            data_dir: PathBuf::from("data"),
            sources: DEFAULT_SOURCE_FILES
                .iter()
                .map(|(name, file)| (name.to_string(), PathBuf::from(file)))
                .collect(),
            guardrails: Guardrails::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AtlasConfig {
    /// Loads configuration from `explicit`, `ATLAS_CONFIG`, `ATLAS_CSV_CFG`
    /// or the per-user default path, then applies `ATLAS_DATA_DIR`.
    ///
    /// A missing default file yields the default configuration, whose source
    /// map is [`DEFAULT_SOURCE_FILES`]; a missing explicit file is an error.
    pub fn load(explicit: Option<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match env_config_path().or_else(default_config_path) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        if let Some(dir) = std::env::var_os("ATLAS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Reads one configuration file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let raw = read_file(path)?;
        let mut config = Self::from_raw(raw);
        config.path = Some(path.to_path_buf());
        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }
        Ok(config)
    }

    /// Parses TOML text. Relative data directories stay relative to the
    /// working directory.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|source| ConfigError::ParseToml {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            path: None,
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            sources: raw.sources,
            guardrails: raw.guardrails,
            log_level: raw.logging.level.unwrap_or(defaults.log_level),
        }
    }

    /// Sets the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Drops every source mapping, including the built-in defaults.
    pub fn without_sources(mut self) -> Self {
        self.sources.clear();
        self
    }

    /// Adds or replaces a source mapping.
    pub fn with_source(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(name.into(), path.into());
        self
    }

    /// Sets the guardrails.
    pub fn with_guardrails(mut self, guardrails: Guardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Resolves the source map to absolute-or-data-dir paths keyed by
    /// [`Source`].
    ///
    /// `LPN_SERIAL` and `LPN_SERIALS` address the same source; when both are
    /// present the plural entry wins. Names that are not loadable sources are
    /// skipped with a warning.
    pub fn source_paths(&self) -> BTreeMap<Source, PathBuf> {
        let mut entries: Vec<(&String, &PathBuf)> = self.sources.iter().collect();
        entries.sort_by_key(|(name, _)| name.trim().eq_ignore_ascii_case("LPN_SERIALS"));
        let mut out = BTreeMap::new();
        for (name, path) in entries {
            let source = match name.parse::<Source>() {
                Ok(source) if source.is_loadable() => source,
                _ => {
                    warn!(name = %name, path = %path.display(), "atlas.config.unknown_source");
                    continue;
                }
            };
            let resolved = if path.is_absolute() {
                path.clone()
            } else {
                self.data_dir.join(path)
            };
            out.insert(source, resolved);
        }
        out
    }
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// TOML syntax or schema error.
    #[error("failed to parse config {path}: {source}")]
    ParseToml {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// JSON syntax or schema error.
    #[error("failed to parse source map {path}: {source}")]
    ParseJson {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// `$XDG_CONFIG_HOME/atlas/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("atlas").join("config.toml"))
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var_os("ATLAS_CONFIG")
        .or_else(|| std::env::var_os("ATLAS_CSV_CFG"))
        .map(PathBuf::from)
}

fn read_file(path: &Path) -> std::result::Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let sources: BTreeMap<String, PathBuf> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source,
            })?;
        return Ok(RawConfig {
            sources,
            ..RawConfig::default()
        });
    }
    toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    sources: BTreeMap<String, PathBuf>,
    #[serde(default)]
    guardrails: Guardrails,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
}
