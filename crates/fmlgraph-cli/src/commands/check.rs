//! Parse and recompose every map of a project

use anyhow::Result;
use std::path::{Path, PathBuf};

use fmlgraph_core::{Config, SchemaCatalog};
use fmlgraph_translate::{ComposeOptions, ParseOptions};

use super::{load_catalog, load_project, read_document, report};

/// Outcome of checking one map
enum MapStatus {
    Clean,
    Diagnostics(usize),
    Failed,
}

/// Run the check command
pub async fn run(config_path: &str, dir: Option<&str>, strict: bool) -> Result<()> {
    let project = load_project(config_path)?;
    let maps_dir = match (dir, &project) {
        (Some(d), _) => PathBuf::from(d),
        (None, Some(config)) => config.maps_dir(),
        (None, None) => anyhow::bail!("No project found at '{config_path}'; pass --dir"),
    };
    let catalog = load_catalog(project.as_ref())?;

    tracing::info!("Checking maps in {}", maps_dir.display());

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(&maps_dir) {
        let entry = entry?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let (mut failed, mut flagged) = (0usize, 0usize);
    for file in &files {
        match check_map(file, &catalog, project.as_ref()) {
            MapStatus::Clean => tracing::info!("✓ {}", file.display()),
            MapStatus::Diagnostics(count) => {
                tracing::warn!("! {} ({} diagnostics)", file.display(), count);
                flagged += 1;
            }
            MapStatus::Failed => failed += 1,
        }
    }

    tracing::info!(
        "Checked {} maps: {} failed, {} with diagnostics",
        files.len(),
        failed,
        flagged
    );
    let unclean = unclean_count(failed, flagged, strict);
    if unclean > 0 {
        anyhow::bail!("{} of {} maps did not check cleanly", unclean, files.len());
    }
    Ok(())
}

/// Maps that fail the check; diagnostics only count under `--strict`
fn unclean_count(failed: usize, flagged: usize, strict: bool) -> usize {
    if strict { failed + flagged } else { failed }
}

fn check_map(path: &Path, catalog: &SchemaCatalog, project: Option<&Config>) -> MapStatus {
    // Rebuild from the rule tree even when an embedded graph is current
    let parse_options = ParseOptions {
        trust_snapshot: false,
    };
    let name = map_name(path);
    let compose_options = match project {
        Some(config) => ComposeOptions::from_config(&config.project.compose, name),
        None => ComposeOptions {
            name,
            ..Default::default()
        },
    };

    let document = match read_document(path) {
        Ok(document) => document,
        Err(err) => {
            tracing::error!("✗ {:#}", err);
            return MapStatus::Failed;
        }
    };
    let outcome = match fmlgraph_translate::parse(&document, catalog, &parse_options) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("✗ {}: {}", path.display(), err);
            return MapStatus::Failed;
        }
    };
    report(path, &outcome.diagnostics);

    if let Err(err) = fmlgraph_translate::compose(&outcome.graph, &compose_options) {
        tracing::error!("✗ {}: {}", path.display(), err);
        return MapStatus::Failed;
    }

    match outcome.diagnostics.len() {
        0 => MapStatus::Clean,
        n => MapStatus::Diagnostics(n),
    }
}

fn map_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "GeneratedMap".to_string())
}
