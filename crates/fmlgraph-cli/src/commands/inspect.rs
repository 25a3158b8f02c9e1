//! Show the graph structure of a StructureMap

use anyhow::{Context, Result};
use std::path::Path;

use fmlgraph_core::sequence::evaluation_order;
use fmlgraph_translate::ParseOptions;

use super::{load_catalog, load_project, read_document, report};

/// Run the inspect command
pub async fn run(config_path: &str, input: &str) -> Result<()> {
    let project = load_project(config_path)?;
    let catalog = load_catalog(project.as_ref())?;
    let options = project
        .as_ref()
        .map(|c| ParseOptions::from(&c.project.parse))
        .unwrap_or_default();

    let path = Path::new(input);
    let document = read_document(path)?;
    let outcome = fmlgraph_translate::parse(&document, &catalog, &options)
        .with_context(|| format!("Failed to parse {input}"))?;
    report(path, &outcome.diagnostics);

    println!(
        "{} ({})",
        document.name.as_deref().unwrap_or(input),
        if outcome.restored {
            "embedded graph"
        } else {
            "rebuilt from rules"
        }
    );
    for group in &outcome.graph.groups {
        println!(
            "  {}: {} objects, {} rules, {} connections",
            group.name,
            group.objects.len(),
            group.rules.len(),
            group.connections.len()
        );
        match evaluation_order(group) {
            Ok(order) => println!("    order: {}", order.join(" -> ")),
            Err(err) => println!("    order: {err}"),
        }
    }
    if !outcome.graph.concept_maps.is_empty() {
        println!("  {} contained concept maps", outcome.graph.concept_maps.len());
    }
    if !outcome.diagnostics.is_empty() {
        println!("  {} diagnostics", outcome.diagnostics.len());
    }
    Ok(())
}
