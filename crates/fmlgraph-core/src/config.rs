//! Configuration parsing and validation
//!
//! This module handles loading the `fmlgraph.yaml` project file.
//!
//! # Configuration Files
//!
//! - `fmlgraph.yaml` - Project root configuration
//! - `schemas/*.json` - StructureDefinitions backing the schema catalog
//! - `maps/*.json` - StructureMap documents

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::SchemaCatalog;
use crate::error::{Error, Result};

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "fmlgraph.yaml";

/// Root project configuration from `fmlgraph.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Where schema definitions are loaded from
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Directory holding StructureMap documents
    #[serde(default = "default_maps_dir")]
    pub maps_dir: String,

    /// Graph → StructureMap settings
    #[serde(default)]
    pub compose: ComposeConfig,

    /// StructureMap → graph settings
    #[serde(default)]
    pub parse: ParseConfig,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_maps_dir() -> String {
    "maps".to_string()
}

/// Schema catalog sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Files or directories of StructureDefinition JSON, relative to the project
    #[serde(default = "default_catalog_paths")]
    pub paths: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            paths: default_catalog_paths(),
        }
    }
}

fn default_catalog_paths() -> Vec<String> {
    vec!["schemas".to_string()]
}

/// Composition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Embed the graph in the `fml-export` extension
    #[serde(default = "default_true")]
    pub embed_snapshot: bool,

    /// Prefix for generated StructureMap URLs
    #[serde(default)]
    pub url_base: Option<String>,

    /// Publication status of generated maps
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            embed_snapshot: true,
            url_base: None,
            status: default_status(),
        }
    }
}

fn default_status() -> String {
    "draft".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Restore the embedded graph instead of rebuilding it when it is current
    #[serde(default = "default_true")]
    pub trust_snapshot: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            trust_snapshot: true,
        }
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory or an `fmlgraph.yaml` path
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-maps")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;

        Ok(Self { project, base_path })
    }

    /// Absolute directory of StructureMap documents
    pub fn maps_dir(&self) -> PathBuf {
        self.base_path.join(&self.project.maps_dir)
    }

    /// Build the schema catalog from every configured path that exists
    pub fn load_catalog(&self) -> Result<SchemaCatalog> {
        let mut catalog = SchemaCatalog::new();
        for entry in &self.project.catalog.paths {
            let path = self.base_path.join(entry);
            if !path.exists() {
                tracing::warn!("Catalog path does not exist: {}", path.display());
                continue;
            }
            let count = catalog.load_path(&path)?;
            tracing::info!("Loaded {} schema definitions from {}", count, path.display());
        }
        Ok(catalog)
    }
}
