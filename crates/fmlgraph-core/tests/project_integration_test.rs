//! Integration tests for loading a mapping project from disk
//!
//! Tests use temporary directories with real file fixtures to verify:
//! - Project config and schema catalog loading
//! - Identifier resolution against loaded definitions
//! - Element drilling through backbone elements and complex datatypes
//! - Reading graph payloads written by older versions

use fmlgraph_core::graph::ListOption;
use fmlgraph_core::sequence::evaluation_order;
use fmlgraph_core::{Config, Connection, GraphSnapshot, Group, MatchType, ObjectMode, SchemaObject};
use tempfile::TempDir;

const ENCOUNTER_URL: &str = "http://hl7.org/fhir/StructureDefinition/Encounter";
const HUMAN_NAME_URL: &str = "http://hl7.org/fhir/StructureDefinition/HumanName";

/// Helper to create a temporary project with a Bundle of definitions.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();

    std::fs::write(
        dir.path().join("fmlgraph.yaml"),
        r#"
name: integration-test
catalog:
  paths: [schemas, missing]
compose:
  url_base: "http://example.org/StructureMap/"
"#,
    )
    .unwrap();

    std::fs::write(
        dir.path().join("schemas/bundle.json"),
        r#"{
  "resourceType": "Bundle",
  "entry": [
    {"resource": {
      "resourceType": "StructureDefinition",
      "url": "http://hl7.org/fhir/StructureDefinition/Encounter",
      "name": "Encounter",
      "type": "Encounter",
      "snapshot": {"element": [
        {"path": "Encounter"},
        {"path": "Encounter.status", "min": 1, "max": "1", "type": [{"code": "code"}]},
        {"path": "Encounter.participant", "min": 0, "max": "*", "type": [{"code": "BackboneElement"}]},
        {"path": "Encounter.participant.type", "min": 0, "max": "*", "type": [{"code": "CodeableConcept"}]},
        {"path": "Encounter.participant.name", "min": 0, "max": "1", "type": [{"code": "HumanName"}]}
      ]}
    }},
    {"resource": {
      "resourceType": "StructureDefinition",
      "url": "http://hl7.org/fhir/StructureDefinition/HumanName",
      "name": "HumanName",
      "type": "HumanName",
      "differential": {"element": [
        {"path": "HumanName"},
        {"path": "HumanName.family", "type": [{"code": "string"}]},
        {"path": "HumanName.given", "max": "*", "type": [{"code": "string"}]}
      ]}
    }},
    {"resource": {"resourceType": "ValueSet", "url": "http://example.org/vs"}}
  ]
}"#,
    )
    .unwrap();
    dir
}

// =============================================================================
// Project loading
// =============================================================================

#[test]
fn test_load_project_and_catalog() {
    let dir = setup_project();

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.project.name, "integration-test");
    assert_eq!(
        config.project.compose.url_base.as_deref(),
        Some("http://example.org/StructureMap/")
    );

    // The missing catalog path is skipped, the ValueSet is ignored
    let catalog = config.load_catalog().unwrap();
    assert_eq!(catalog.definitions().len(), 2);

    let by_url = catalog.resolve(ENCOUNTER_URL).unwrap();
    assert_eq!(by_url.match_type, MatchType::Url);
    let by_type = catalog.resolve("HumanName").unwrap();
    assert_eq!(by_type.id, HUMAN_NAME_URL);
    assert_eq!(by_type.match_type, MatchType::TypeName);
    assert!(catalog.resolve("Observation").is_err());
}

#[test]
fn test_load_config_file_path() {
    let dir = setup_project();
    let config = Config::load(dir.path().join("fmlgraph.yaml")).unwrap();
    assert_eq!(config.maps_dir(), dir.path().join("maps"));
}

// =============================================================================
// Drilling into elements
// =============================================================================

#[test]
fn test_drill_through_backbone_into_datatype() {
    let dir = setup_project();
    let catalog = Config::load(dir.path()).unwrap().load_catalog().unwrap();

    let mut group = Group::new("main");
    let encounter = SchemaObject::new(&catalog, ENCOUNTER_URL, "enc", ObjectMode::Source).unwrap();
    let names: Vec<&str> = encounter.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["status", "participant"]);
    assert!(encounter.fields[0].required);
    assert!(encounter.fields[1].backbone_part);
    group.put_object(encounter).unwrap();

    // Backbone element: same resource, anchored at the element path
    let participant = group.drill_down("enc", "participant", &catalog).unwrap();
    let object = group.object(&participant).unwrap();
    assert_eq!(object.resource, ENCOUNTER_URL);
    assert_eq!(object.element, "Encounter.participant");
    assert_eq!(object.list_option, Some(ListOption::Every));

    // Complex datatype: jumps to the datatype's own definition
    let name = group.drill_down(&participant, "name", &catalog).unwrap();
    let object = group.object(&name).unwrap();
    assert_eq!(object.resource, HUMAN_NAME_URL);
    assert_eq!(object.fields.len(), 2);

    // Leaf datatype without a definition collapses to the whole value
    let concept = group.drill_down(&participant, "type", &catalog).unwrap();
    assert!(group.object(&concept).unwrap().is_open());

    // Drilling again reuses the element object
    assert_eq!(group.drill_down("enc", "participant", &catalog).unwrap(), participant);

    let order = evaluation_order(&group).unwrap();
    let position = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert!(position("enc") < position(&participant));
    assert!(position(&participant) < position(&name));
}

// =============================================================================
// Graph payloads
// =============================================================================

#[test]
fn test_read_unversioned_payload_file() {
    let dir = setup_project();
    let path = dir.path().join("maps/legacy_graph.json");
    std::fs::write(
        &path,
        r#"{
  "objects": [
    {"name": "src", "resource": "urn:a", "element": "A", "mode": "source",
     "fields": [{"name": "x", "part": false}]},
    {"name": "tgt", "resource": "urn:b", "element": "B", "mode": "target",
     "fields": [{"name": "y"}]}
  ],
  "rules": [],
  "connections": [{"source": "src", "sourceField": 0, "target": "tgt", "targetField": 0}],
  "maps": [{"resourceType": "ConceptMap", "id": "cm"}]
}"#,
    )
    .unwrap();

    let snapshot = GraphSnapshot::from_json_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(snapshot.version, 4);
    let graph = snapshot.graph;
    assert_eq!(graph.groups.len(), 1);
    assert_eq!(graph.groups[0].name, "main");
    assert!(!graph.groups[0].share_context);
    assert!(graph.has_concept_map("cm"));
    assert_eq!(
        graph.groups[0].connections,
        vec![Connection::new("src", Some(0), "tgt", Some(0))]
    );

    // Written back at the current version, then read again unchanged
    let rewritten = GraphSnapshot::new(graph.clone(), None).to_json_string().unwrap();
    assert_eq!(GraphSnapshot::from_json_str(&rewritten).unwrap().graph, graph);
}
