//! Schema catalog
//!
//! Thin lookup over FHIR StructureDefinition resources. The catalog resolves
//! a schema identifier (canonical URL, alias, or bare type name) to a
//! canonical id and exposes the element tree used to derive object fields.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut catalog = SchemaCatalog::new();
//! catalog.load_path("./schemas")?;
//! let resolved = catalog.resolve("Patient")?;
//! println!("{} matched by {:?}", resolved.id, resolved.match_type);
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// One element of a schema's element tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDefinition {
    /// Dotted path, rooted at the type name (e.g. `Patient.name.given`)
    pub path: String,
    /// Declared type codes
    pub types: Vec<String>,
    /// Minimum cardinality
    pub min: u32,
    /// Maximum cardinality (`"1"`, `"*"`, ...)
    pub max: String,
}

impl ElementDefinition {
    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Whether the element must be present
    pub fn is_required(&self) -> bool {
        self.min > 0
    }

    /// Whether the element can repeat
    pub fn is_repeated(&self) -> bool {
        self.max == "*" || self.max.parse::<u32>().is_ok_and(|m| m > 1)
    }
}

/// A schema (resource or datatype) known to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    /// Canonical URL, used as the schema id
    pub url: String,
    /// Computer-friendly name
    pub name: String,
    /// Type name; the root element path
    pub type_name: String,
    /// Flattened element tree
    pub elements: Vec<ElementDefinition>,
}

impl SchemaDefinition {
    /// Create a definition with only its root element
    pub fn new(url: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            url: url.into(),
            name: type_name.clone(),
            elements: vec![ElementDefinition {
                path: type_name.clone(),
                types: Vec::new(),
                min: 0,
                max: "*".to_string(),
            }],
            type_name,
        }
    }

    /// Builder-style element addition
    pub fn with_element(mut self, path: &str, types: &[&str], min: u32, max: &str) -> Self {
        self.elements.push(ElementDefinition {
            path: path.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            min,
            max: max.to_string(),
        });
        self
    }

    /// Build from a StructureDefinition JSON resource
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let raw: RawStructureDefinition = serde_json::from_value(value.clone())?;
        let type_name = raw
            .type_
            .clone()
            .or_else(|| raw.name.clone())
            .ok_or_else(|| Error::unresolved("type", raw.url.clone()))?;

        let raw_elements = raw
            .snapshot
            .or(raw.differential)
            .map(|s| s.element)
            .unwrap_or_default();

        let mut elements: Vec<ElementDefinition> = Vec::with_capacity(raw_elements.len());
        for el in raw_elements {
            if el.slice_name.is_some() || elements.iter().any(|e| e.path == el.path) {
                continue;
            }
            elements.push(ElementDefinition {
                path: el.path,
                types: el.type_.into_iter().map(|t| t.code).collect(),
                min: el.min.unwrap_or(0),
                max: el.max.unwrap_or_else(|| "1".to_string()),
            });
        }
        if !elements.iter().any(|e| e.path == type_name) {
            elements.insert(
                0,
                ElementDefinition {
                    path: type_name.clone(),
                    types: Vec::new(),
                    min: 0,
                    max: "*".to_string(),
                },
            );
        }

        Ok(Self {
            name: raw.name.unwrap_or_else(|| type_name.clone()),
            url: raw.url,
            type_name,
            elements,
        })
    }

    /// Look up one element by path
    pub fn element(&self, path: &str) -> Option<&ElementDefinition> {
        self.elements.iter().find(|e| e.path == path)
    }

    /// Direct children of an element, in declaration order
    pub fn children(&self, path: &str) -> Vec<&ElementDefinition> {
        self.elements
            .iter()
            .filter(|e| {
                e.path
                    .strip_prefix(path)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'))
            })
            .collect()
    }
}

/// How an identifier was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Exact canonical URL
    Url,
    /// Declared alias
    Alias,
    /// Bare type name
    TypeName,
}

/// Result of [`SchemaCatalog::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical schema id (URL)
    pub id: String,
    /// Which lookup step matched
    pub match_type: MatchType,
}

/// A schema anchored at one element: where a graph object's fields come from
#[derive(Debug, Clone)]
pub struct ElementScope<'a> {
    /// Resource id the element belongs to
    pub resource: String,
    /// Element path inside that resource
    pub element: String,
    /// Direct children of the element
    pub children: Vec<&'a ElementDefinition>,
    /// The owning definition
    pub definition: &'a SchemaDefinition,
}

/// Collection of schema definitions plus aliases
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    definitions: Vec<SchemaDefinition>,
    aliases: HashMap<String, String>,
}

impl SchemaCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any with the same URL
    pub fn insert(&mut self, definition: SchemaDefinition) {
        self.definitions.retain(|d| d.url != definition.url);
        self.definitions.push(definition);
    }

    /// Register a catalog-wide alias for a canonical URL
    pub fn register_alias(&mut self, alias: impl Into<String>, url: impl Into<String>) {
        self.aliases.insert(alias.into(), url.into());
    }

    /// All definitions, in insertion order
    pub fn definitions(&self) -> &[SchemaDefinition] {
        &self.definitions
    }

    /// Definition by canonical id
    pub fn definition(&self, id: &str) -> Option<&SchemaDefinition> {
        self.definitions.iter().find(|d| d.url == id)
    }

    /// Resolve using the catalog's own aliases
    pub fn resolve(&self, identifier: &str) -> Result<Resolved> {
        self.resolve_with(identifier, &HashMap::new())
    }

    /// Resolve: exact URL, then alias (document aliases shadow catalog
    /// aliases), then bare type name.
    pub fn resolve_with(
        &self,
        identifier: &str,
        aliases: &HashMap<String, String>,
    ) -> Result<Resolved> {
        if self.definition(identifier).is_some() {
            return Ok(Resolved {
                id: identifier.to_string(),
                match_type: MatchType::Url,
            });
        }

        let aliased = aliases
            .get(identifier)
            .or_else(|| self.aliases.get(identifier));
        if let Some(url) = aliased {
            if self.definition(url).is_some() {
                return Ok(Resolved {
                    id: url.clone(),
                    match_type: MatchType::Alias,
                });
            }
        }

        if let Some(def) = self.definitions.iter().find(|d| d.type_name == identifier) {
            return Ok(Resolved {
                id: def.url.clone(),
                match_type: MatchType::TypeName,
            });
        }

        Err(Error::SchemaNotFound {
            identifier: identifier.to_string(),
        })
    }

    /// Root element scope of a resource
    pub fn root(&self, resource: &str) -> Result<ElementScope<'_>> {
        let definition = self
            .definition(resource)
            .ok_or_else(|| Error::SchemaNotFound {
                identifier: resource.to_string(),
            })?;
        Ok(ElementScope {
            resource: definition.url.clone(),
            element: definition.type_name.clone(),
            children: definition.children(&definition.type_name),
            definition,
        })
    }

    /// Scope reached by descending from `element` into `field`.
    ///
    /// Backbone elements stay on the same resource; complex datatypes jump to
    /// the datatype's own definition. Returns `None` for leaves.
    pub fn expand(&self, resource: &str, element: &str, field: &str) -> Option<ElementScope<'_>> {
        let definition = self.definition(resource)?;
        let path = format!("{element}.{field}");
        let children = definition.children(&path);
        if !children.is_empty() {
            return Some(ElementScope {
                resource: definition.url.clone(),
                element: path,
                children,
                definition,
            });
        }

        let el = definition.element(&path)?;
        el.types.iter().find_map(|code| {
            let resolved = self.resolve(code).ok()?;
            let scope = self.root(&resolved.id).ok()?;
            (!scope.children.is_empty()).then_some(scope)
        })
    }

    /// Load a StructureDefinition or a Bundle of them
    pub fn load_json(&mut self, value: &serde_json::Value) -> Result<usize> {
        match value.get("resourceType").and_then(|v| v.as_str()) {
            Some("Bundle") => {
                let mut count = 0;
                for entry in value
                    .get("entry")
                    .and_then(|e| e.as_array())
                    .into_iter()
                    .flatten()
                {
                    if let Some(resource) = entry.get("resource") {
                        count += self.load_json(resource)?;
                    }
                }
                Ok(count)
            }
            Some("StructureDefinition") => {
                self.insert(SchemaDefinition::from_json(value)?);
                Ok(1)
            }
            other => {
                tracing::debug!("Skipping non-StructureDefinition resource: {:?}", other);
                Ok(0)
            }
        }
    }

    /// Load a JSON file, or every `*.json` file in a directory
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if path.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();

            let mut count = 0;
            for entry in entries {
                count += self.load_path(&entry)?;
            }
            return Ok(count);
        }

        let contents = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        let count = self.load_json(&value)?;
        tracing::debug!("Loaded {} definitions from {}", count, path.display());
        Ok(count)
    }
}

// ============================================================================
// Raw StructureDefinition JSON (for serde deserialization)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawStructureDefinition {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    type_: Option<String>,
    #[serde(default)]
    snapshot: Option<RawElementList>,
    #[serde(default)]
    differential: Option<RawElementList>,
}

#[derive(Debug, Deserialize)]
struct RawElementList {
    #[serde(default)]
    element: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    path: String,
    #[serde(default)]
    slice_name: Option<String>,
    #[serde(default)]
    min: Option<u32>,
    #[serde(default)]
    max: Option<String>,
    #[serde(default, rename = "type")]
    type_: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
struct RawType {
    code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        catalog.insert(
            SchemaDefinition::new("http://hl7.org/fhir/StructureDefinition/Patient", "Patient")
                .with_element("Patient.id", &["id"], 0, "1")
                .with_element("Patient.name", &["HumanName"], 0, "*")
                .with_element("Patient.contact", &["BackboneElement"], 0, "*")
                .with_element("Patient.contact.gender", &["code"], 0, "1"),
        );
        catalog.insert(
            SchemaDefinition::new(
                "http://hl7.org/fhir/StructureDefinition/HumanName",
                "HumanName",
            )
            .with_element("HumanName.family", &["string"], 0, "1")
            .with_element("HumanName.given", &["string"], 0, "*"),
        );
        catalog.register_alias("Pat", "http://hl7.org/fhir/StructureDefinition/Patient");
        catalog
    }

    #[test]
    fn test_resolve_by_url() {
        let resolved = catalog()
            .resolve("http://hl7.org/fhir/StructureDefinition/Patient")
            .unwrap();
        assert_eq!(resolved.match_type, MatchType::Url);
    }

    #[test]
    fn test_resolve_by_alias() {
        let resolved = catalog().resolve("Pat").unwrap();
        assert_eq!(resolved.match_type, MatchType::Alias);
        assert_eq!(resolved.id, "http://hl7.org/fhir/StructureDefinition/Patient");
    }

    #[test]
    fn test_document_alias_shadows_catalog_alias() {
        let aliases = HashMap::from([(
            "Pat".to_string(),
            "http://hl7.org/fhir/StructureDefinition/HumanName".to_string(),
        )]);
        let resolved = catalog().resolve_with("Pat", &aliases).unwrap();
        assert_eq!(resolved.id, "http://hl7.org/fhir/StructureDefinition/HumanName");
    }

    #[test]
    fn test_resolve_by_type_name() {
        let resolved = catalog().resolve("HumanName").unwrap();
        assert_eq!(resolved.match_type, MatchType::TypeName);
    }

    #[test]
    fn test_resolve_not_found() {
        let err = catalog().resolve("Observation").unwrap_err();
        assert!(matches!(err, Error::SchemaNotFound { .. }));
    }

    #[test]
    fn test_children_are_direct_only() {
        let catalog = catalog();
        let def = catalog
            .definition("http://hl7.org/fhir/StructureDefinition/Patient")
            .unwrap();
        let names: Vec<_> = def.children("Patient").iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["id", "name", "contact"]);
    }

    #[test]
    fn test_expand_backbone_stays_on_resource() {
        let catalog = catalog();
        let scope = catalog
            .expand(
                "http://hl7.org/fhir/StructureDefinition/Patient",
                "Patient",
                "contact",
            )
            .unwrap();
        assert_eq!(scope.element, "Patient.contact");
        assert_eq!(scope.children.len(), 1);
    }

    #[test]
    fn test_expand_datatype_jumps_definition() {
        let catalog = catalog();
        let scope = catalog
            .expand(
                "http://hl7.org/fhir/StructureDefinition/Patient",
                "Patient",
                "name",
            )
            .unwrap();
        assert_eq!(scope.resource, "http://hl7.org/fhir/StructureDefinition/HumanName");
        assert_eq!(scope.element, "HumanName");
    }

    #[test]
    fn test_expand_leaf_is_none() {
        let catalog = catalog();
        assert!(
            catalog
                .expand(
                    "http://hl7.org/fhir/StructureDefinition/Patient",
                    "Patient",
                    "id"
                )
                .is_none()
        );
    }

    #[test]
    fn test_cardinality_flags() {
        let el = ElementDefinition {
            path: "X.y".to_string(),
            types: vec![],
            min: 1,
            max: "*".to_string(),
        };
        assert!(el.is_required());
        assert!(el.is_repeated());
        assert_eq!(el.name(), "y");
    }

    #[test]
    fn test_load_bundle_json() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {
                    "resourceType": "StructureDefinition",
                    "url": "http://example.org/StructureDefinition/model_a",
                    "name": "model_a",
                    "type": "model_a",
                    "snapshot": {"element": [
                        {"path": "model_a"},
                        {"path": "model_a.a", "min": 0, "max": "1", "type": [{"code": "string"}]},
                        {"path": "model_a.b", "min": 1, "max": "*", "type": [{"code": "string"}]}
                    ]}
                }},
                {"resource": {"resourceType": "Patient", "id": "x"}}
            ]
        });

        let mut catalog = SchemaCatalog::new();
        assert_eq!(catalog.load_json(&bundle).unwrap(), 1);
        let def = catalog.definition("http://example.org/StructureDefinition/model_a").unwrap();
        assert_eq!(def.children("model_a").len(), 2);
        assert!(def.element("model_a.b").unwrap().is_required());
    }

    #[test]
    fn test_load_path_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"resourceType":"StructureDefinition","url":"urn:a","type":"A",
                "differential":{"element":[{"path":"A.x","type":[{"code":"string"}]}]}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = SchemaCatalog::new();
        assert_eq!(catalog.load_path(dir.path()).unwrap(), 1);
        assert_eq!(catalog.resolve("A").unwrap().id, "urn:a");
    }
}
