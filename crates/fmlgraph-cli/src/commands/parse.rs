//! StructureMap → graph command

use anyhow::{Context, Result};
use std::path::Path;

use fmlgraph_core::GraphSnapshot;
use fmlgraph_translate::ParseOptions;

use super::{load_catalog, load_project, read_document, report, write_output};

/// Run the parse command
pub async fn run(
    config_path: &str,
    input: &str,
    output: Option<&str>,
    ignore_snapshot: bool,
) -> Result<()> {
    let project = load_project(config_path)?;
    let catalog = load_catalog(project.as_ref())?;

    let mut options = project
        .as_ref()
        .map(|c| ParseOptions::from(&c.project.parse))
        .unwrap_or_default();
    if ignore_snapshot {
        options.trust_snapshot = false;
    }

    let path = Path::new(input);
    let document = read_document(path)?;
    let outcome = fmlgraph_translate::parse(&document, &catalog, &options)
        .with_context(|| format!("Failed to parse {input}"))?;
    report(path, &outcome.diagnostics);

    let groups = outcome.graph.groups.len();
    let payload = GraphSnapshot::new(outcome.graph, None).to_json_string()?;
    write_output(output, &payload)?;

    tracing::info!(
        "Parsed {} into {} groups ({} diagnostics{})",
        input,
        groups,
        outcome.diagnostics.len(),
        if outcome.restored { ", restored" } else { "" }
    );
    Ok(())
}
