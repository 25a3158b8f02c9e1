//! CLI command implementations

pub mod check;
pub mod compose;
pub mod init;
pub mod inspect;
pub mod parse;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use fmlgraph_core::{Config, SchemaCatalog, StructureMap};
use fmlgraph_translate::Diagnostic;

/// Load the project configuration, or `None` when there is no project
pub fn load_project(config_path: &str) -> Result<Option<Config>> {
    match Config::load(config_path) {
        Ok(config) => Ok(Some(config)),
        Err(fmlgraph_core::Error::ConfigNotFound { path }) => {
            tracing::debug!("No project configuration at {}, using defaults", path);
            Ok(None)
        }
        Err(err) => Err(err).context("Failed to load configuration"),
    }
}

/// Schema catalog of the project (empty without one)
pub fn load_catalog(project: Option<&Config>) -> Result<SchemaCatalog> {
    match project {
        Some(config) => config
            .load_catalog()
            .context("Failed to load schema catalog"),
        None => Ok(SchemaCatalog::new()),
    }
}

/// Read a StructureMap JSON file
pub fn read_document(path: &Path) -> Result<StructureMap> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a StructureMap", path.display()))
}

/// Write to `output`, or stdout when absent
pub fn write_output(output: Option<&str>, contents: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, contents).with_context(|| format!("Failed to write {path}"))?;
            tracing::info!("Wrote {}", path);
        }
        None => println!("{contents}"),
    }
    Ok(())
}

/// Log every diagnostic of a parse
pub fn report(source: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        tracing::warn!("{}: {}", source.display(), diagnostic);
    }
}
