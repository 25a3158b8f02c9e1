//! Initialize a new mapping project

use anyhow::Result;
use std::fs;
use std::path::Path;

use fmlgraph_core::config::CONFIG_FILE;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            CONFIG_FILE
        );
    }

    tracing::info!("Creating new mapping project: {}", project_name);

    fs::create_dir_all(project_dir.join("schemas"))?;
    fs::create_dir_all(project_dir.join("maps"))?;

    let config = format!(
        r#"# fmlgraph project configuration
name: {project_name}
version: "0.1.0"

# StructureDefinition JSON files (or Bundles of them)
catalog:
  paths:
    - schemas

maps_dir: maps

compose:
  embed_snapshot: true
  status: draft

parse:
  trust_snapshot: true
"#
    );
    fs::write(project_dir.join(CONFIG_FILE), config)?;

    let source = r#"{
  "resourceType": "StructureDefinition",
  "url": "http://example.org/fhir/StructureDefinition/Person",
  "name": "Person",
  "type": "Person",
  "snapshot": {
    "element": [
      { "path": "Person" },
      { "path": "Person.name", "min": 0, "max": "1", "type": [{ "code": "string" }] },
      { "path": "Person.email", "min": 0, "max": "1", "type": [{ "code": "string" }] }
    ]
  }
}
"#;
    fs::write(project_dir.join("schemas/person.json"), source)?;

    let target = r#"{
  "resourceType": "StructureDefinition",
  "url": "http://example.org/fhir/StructureDefinition/Contact",
  "name": "Contact",
  "type": "Contact",
  "snapshot": {
    "element": [
      { "path": "Contact" },
      { "path": "Contact.fullName", "min": 0, "max": "1", "type": [{ "code": "string" }] },
      { "path": "Contact.email", "min": 0, "max": "1", "type": [{ "code": "string" }] },
      { "path": "Contact.id", "min": 0, "max": "1", "type": [{ "code": "string" }] }
    ]
  }
}
"#;
    fs::write(project_dir.join("schemas/contact.json"), target)?;

    let example_map = r#"{
  "resourceType": "StructureMap",
  "id": "PersonToContact",
  "name": "PersonToContact",
  "status": "draft",
  "structure": [
    { "url": "http://example.org/fhir/StructureDefinition/Person", "mode": "source", "alias": "Person" },
    { "url": "http://example.org/fhir/StructureDefinition/Contact", "mode": "target", "alias": "Contact" }
  ],
  "group": [
    {
      "name": "PersonToContact",
      "input": [
        { "name": "src", "type": "Person", "mode": "source" },
        { "name": "tgt", "type": "Contact", "mode": "target" }
      ],
      "rule": [
        {
          "name": "name",
          "source": [{ "context": "src", "element": "name", "variable": "n" }],
          "target": [{ "context": "tgt", "element": "fullName", "transform": "copy", "parameter": [{ "valueId": "n" }] }]
        },
        {
          "name": "email",
          "source": [{ "context": "src", "element": "email", "variable": "e" }],
          "target": [{ "context": "tgt", "element": "email", "transform": "truncate", "parameter": [{ "valueId": "e" }, { "valueInteger": 64 }] }]
        },
        {
          "name": "id",
          "source": [{ "context": "src" }],
          "target": [{ "context": "tgt", "element": "id", "transform": "uuid" }]
        }
      ]
    }
  ]
}
"#;
    fs::write(project_dir.join("maps/person_to_contact.json"), example_map)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  fmlgraph check                                  # Parse and recompose every map");
    tracing::info!("  fmlgraph inspect maps/person_to_contact.json    # Show the graph");

    Ok(())
}
