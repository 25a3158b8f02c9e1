//! Graph → StructureMap command

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use fmlgraph_core::GraphSnapshot;
use fmlgraph_translate::{ComposeOptions, compose_string};

use super::{load_project, write_output};

/// Run the compose command
pub async fn run(
    config_path: &str,
    input: &str,
    output: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let project = load_project(config_path)?;

    let contents = fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?;
    let snapshot = GraphSnapshot::from_json_str(&contents)
        .with_context(|| format!("{input} is not a graph payload"))?;

    let name = match name {
        Some(n) => n.to_string(),
        None => Path::new(input)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not derive a map name from {input}"))?,
    };
    let options = match &project {
        Some(config) => ComposeOptions::from_config(&config.project.compose, name),
        None => ComposeOptions {
            name,
            ..Default::default()
        },
    };

    let json = compose_string(&snapshot.graph, &options)
        .with_context(|| format!("Failed to compose {input}"))?;
    write_output(output, &json)?;

    tracing::info!("Composed map '{}' from {}", options.name, input);
    Ok(())
}
