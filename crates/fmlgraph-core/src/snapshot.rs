//! Round-trip payload
//!
//! The composer embeds the whole [`MapGraph`] in the StructureMap so a later
//! parse can restore it verbatim. Older payloads are upgraded through an
//! ordered list of pure steps, one per format version:
//!
//! | from | to | change                                   |
//! |------|----|------------------------------------------|
//! | 0    | 1  | flat objects/rules/connections → groups  |
//! | 1    | 2  | `shareContext` flag on every group       |
//! | 2    | 3  | field `part` → `backbonePart`            |
//! | 3    | 4  | `maps` → `conceptMaps`                   |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::document::MapGroup;
use crate::error::{Error, Result};
use crate::graph::MapGraph;

/// Current payload version
pub const SNAPSHOT_VERSION: u64 = 4;

/// One upgrade step: takes a payload at version `n`, returns version `n + 1`
pub type Upgrade = fn(Value) -> Value;

/// Upgrade steps indexed by the version they start from
pub const UPGRADES: [Upgrade; SNAPSHOT_VERSION as usize] =
    [nest_groups, add_share_context, rename_backbone_part, rename_concept_maps];

/// Versioned graph payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    /// Payload format version
    pub version: u64,
    /// Hash of the rule tree the payload was composed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_hash: Option<String>,
    /// The graph
    #[serde(flatten)]
    pub graph: MapGraph,
}

impl GraphSnapshot {
    /// Wrap a graph at the current version
    pub fn new(graph: MapGraph, tree_hash: Option<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tree_hash,
            graph,
        }
    }

    /// Read a payload of any known version
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json)?;
        let upgraded = migrate(raw)?;
        Ok(serde_json::from_value(upgraded)?)
    }

    /// Serialize at the current version
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Version of a raw payload; unversioned payloads are told apart by shape
pub fn detect_version(value: &Value) -> u64 {
    match value.get("version").and_then(Value::as_u64) {
        Some(v) => v,
        None if value.get("groups").is_some() => 1,
        None => 0,
    }
}

/// Apply every upgrade step between the payload's version and the current one
pub fn migrate(mut value: Value) -> Result<Value> {
    if !value.is_object() {
        return Err(Error::Snapshot {
            message: "payload is not a JSON object".to_string(),
        });
    }

    let mut version = detect_version(&value);
    if version > SNAPSHOT_VERSION {
        return Err(Error::Snapshot {
            message: format!("version {version} is newer than supported {SNAPSHOT_VERSION}"),
        });
    }

    while version < SNAPSHOT_VERSION {
        tracing::debug!("Upgrading graph snapshot from version {}", version);
        value = UPGRADES[version as usize](value);
        version += 1;
        set_version(&mut value, version);
    }
    Ok(value)
}

fn set_version(value: &mut Value, version: u64) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("version".to_string(), Value::from(version));
    }
}

/// v0 → v1: move the flat single-group layout under `groups`
pub fn nest_groups(value: Value) -> Value {
    let Value::Object(mut obj) = value else {
        return value;
    };
    if obj.contains_key("groups") {
        return Value::Object(obj);
    }

    let mut group = Map::new();
    group.insert("name".to_string(), Value::from("main"));
    for key in ["objects", "rules", "connections"] {
        group.insert(
            key.to_string(),
            obj.remove(key).unwrap_or_else(|| Value::Array(Vec::new())),
        );
    }
    obj.insert("groups".to_string(), Value::Array(vec![Value::Object(group)]));
    Value::Object(obj)
}

/// v1 → v2: every group gets an explicit `shareContext: false`
pub fn add_share_context(mut value: Value) -> Value {
    for group in groups_mut(&mut value) {
        if let Some(g) = group.as_object_mut() {
            g.entry("shareContext").or_insert(Value::Bool(false));
        }
    }
    value
}

/// v2 → v3: object field flag `part` becomes `backbonePart`
pub fn rename_backbone_part(mut value: Value) -> Value {
    for group in groups_mut(&mut value) {
        let objects = group
            .get_mut("objects")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten();
        for object in objects {
            let fields = object
                .get_mut("fields")
                .and_then(Value::as_array_mut)
                .into_iter()
                .flatten();
            for field in fields {
                if let Some(f) = field.as_object_mut() {
                    if let Some(part) = f.remove("part") {
                        f.entry("backbonePart").or_insert(part);
                    }
                }
            }
        }
    }
    value
}

/// v3 → v4: top-level `maps` becomes `conceptMaps`
pub fn rename_concept_maps(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        if let Some(maps) = obj.remove("maps") {
            obj.entry("conceptMaps").or_insert(maps);
        }
    }
    value
}

fn groups_mut(value: &mut Value) -> impl Iterator<Item = &mut Value> {
    value
        .get_mut("groups")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
}

/// SHA-256 (hex) of the serialized rule groups
pub fn tree_hash(groups: &[MapGroup]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(groups)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v0() -> Value {
        json!({
            "objects": [{"name": "src", "resource": "urn:a", "element": "a", "mode": "source",
                         "fields": [{"name": "x", "part": true}]}],
            "rules": [],
            "connections": [],
            "maps": [{"resourceType": "ConceptMap", "id": "cm"}]
        })
    }

    #[test]
    fn test_detect_version() {
        assert_eq!(detect_version(&v0()), 0);
        assert_eq!(detect_version(&json!({"groups": []})), 1);
        assert_eq!(detect_version(&json!({"version": 3, "groups": []})), 3);
    }

    #[test]
    fn test_nest_groups() {
        let out = nest_groups(v0());
        assert!(out.get("objects").is_none());
        assert_eq!(out["groups"][0]["name"], "main");
        assert_eq!(out["groups"][0]["objects"][0]["name"], "src");
        assert_eq!(out["groups"][0]["connections"], json!([]));
    }

    #[test]
    fn test_add_share_context_keeps_existing_flag() {
        let out = add_share_context(json!({"groups": [{"name": "a"}, {"name": "b", "shareContext": true}]}));
        assert_eq!(out["groups"][0]["shareContext"], false);
        assert_eq!(out["groups"][1]["shareContext"], true);
    }

    #[test]
    fn test_rename_backbone_part() {
        let input = json!({"groups": [{"objects": [{"fields": [{"name": "x", "part": true}, {"name": "y"}]}]}]});
        let out = rename_backbone_part(input);
        assert_eq!(
            out,
            json!({"groups": [{"objects": [{"fields": [{"name": "x", "backbonePart": true}, {"name": "y"}]}]}]})
        );
    }

    #[test]
    fn test_rename_concept_maps() {
        let out = rename_concept_maps(json!({"maps": [1], "groups": []}));
        assert_eq!(out, json!({"conceptMaps": [1], "groups": []}));
    }

    #[test]
    fn test_steps_are_idempotent() {
        let once: Vec<Value> = UPGRADES.iter().scan(v0(), |acc, step| {
            *acc = step(acc.clone());
            Some(acc.clone())
        }).collect();

        for (step, after) in UPGRADES.iter().zip(&once) {
            assert_eq!(&step(after.clone()), after);
        }
    }

    #[test]
    fn test_migrate_v0_to_current() {
        let snapshot: GraphSnapshot = serde_json::from_value(migrate(v0()).unwrap()).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.graph.groups.len(), 1);
        assert!(snapshot.graph.groups[0].objects[0].fields[0].backbone_part);
        assert!(snapshot.graph.has_concept_map("cm"));
    }

    #[test]
    fn test_migrate_rejects_future_version() {
        let err = migrate(json!({"version": 99})).unwrap_err();
        assert!(matches!(err, Error::Snapshot { .. }));
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let snapshot = GraphSnapshot::new(MapGraph::new(), Some("abc".to_string()));
        let json = snapshot.to_json_string().unwrap();
        assert!(json.contains("\"treeHash\":\"abc\""));
        assert_eq!(GraphSnapshot::from_json_str(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_tree_hash_tracks_content() {
        let a = tree_hash(&[]).unwrap();
        let b = tree_hash(&[MapGroup {
            name: "main".to_string(),
            extends: None,
            type_mode: None,
            documentation: None,
            input: vec![],
            rule: vec![],
        }])
        .unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
