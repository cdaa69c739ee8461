//! TOML page configuration: which blocks a page declares, how they are
//! configured, and where templates live on disk.
//!
//! This crate only loads and validates the file format. Turning a
//! [`PageConfig`] into live layout blocks is the caller's job.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read page config at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse page config at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// One page definition: metadata, per-layout defaults, and a table of
/// block declarations keyed by block id.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    pub id: Option<String>,
    pub description: Option<String>,
    pub root: String,
    pub templates_path: PathBuf,
    pub debug: bool,
    pub defaults: Defaults,
    pub blocks: BTreeMap<String, BlockEntry>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            id: None,
            description: None,
            root: "root".to_string(),
            templates_path: PathBuf::from("templates"),
            debug: false,
            defaults: Defaults::default(),
            blocks: BTreeMap::new(),
        }
    }
}

/// Facet values filled in for every block that omits them.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub options: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
}

/// One block declaration.
///
/// The facet names mirror what the layout's `set` operation accepts, plus
/// `children` for the displayed sub-block list. Unknown keys are a parse
/// error, so typos surface at load time instead of silently configuring
/// nothing.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockEntry {
    pub body: Option<String>,
    pub template: Option<String>,
    pub options: BTreeMap<String, Value>,
    pub data: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
    pub assets: BTreeMap<String, Vec<String>>,
    pub requires: Vec<String>,
    pub first_assets: Vec<String>,
    pub inline: BTreeMap<String, Vec<InlineEntry>>,
    pub children: Vec<ChildEntry>,
}

/// An inline content snippet attached to an asset target.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineEntry {
    pub kind: String,
    pub content: String,
}

/// A displayed sub-block reference, either a bare id or a table with an
/// explicit `shown` flag.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChildEntry {
    Id(String),
    Full {
        id: String,
        #[serde(default = "default_shown")]
        shown: bool,
    },
}

fn default_shown() -> bool {
    true
}

impl ChildEntry {
    pub fn id(&self) -> &str {
        match self {
            ChildEntry::Id(id) => id,
            ChildEntry::Full { id, .. } => id,
        }
    }

    pub fn shown(&self) -> bool {
        match self {
            ChildEntry::Id(_) => true,
            ChildEntry::Full { shown, .. } => *shown,
        }
    }
}

impl PageConfig {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: PageConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in the templates path
        config.templates_path =
            Self::expand_path(&config.templates_path).unwrap_or(config.templates_path);

        Ok(Some(config))
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
