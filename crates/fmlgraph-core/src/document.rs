//! FHIR StructureMap document model
//!
//! Serde mirror of the parts of the StructureMap resource the translator
//! reads and writes. Unknown properties are ignored on input.

use serde::{Deserialize, Serialize};

/// URL of the extension carrying the serialized graph
pub const EXPORT_EXTENSION_URL: &str = "fml-export";

/// A StructureMap resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureMap {
    /// Always `StructureMap`
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    /// Logical id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Canonical URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Computer-friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Publication status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Document-level extensions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    /// Contained resources (internal ConceptMaps)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<serde_json::Value>,
    /// Schemas used by the map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structure: Vec<StructureRef>,
    /// Rule groups; the first is the entry point
    #[serde(default)]
    pub group: Vec<MapGroup>,
}

fn default_resource_type() -> String {
    "StructureMap".to_string()
}

impl StructureMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            resource_type: default_resource_type(),
            id: None,
            url: None,
            name: None,
            status: None,
            extension: Vec::new(),
            contained: Vec::new(),
            structure: Vec::new(),
            group: Vec::new(),
        }
    }

    /// Value of the extension with `url`
    pub fn extension_value(&self, url: &str) -> Option<&str> {
        self.extension
            .iter()
            .find(|e| e.url == url)
            .and_then(|e| e.value_string.as_deref())
    }

    /// Group by name
    pub fn find_group(&self, name: &str) -> Option<&MapGroup> {
        self.group.iter().find(|g| g.name == name)
    }
}

impl Default for StructureMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple string-valued extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Extension URL
    pub url: String,
    /// String payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
}

/// How a structure is used by the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureMode {
    /// Read
    Source,
    /// Read through a query
    Queried,
    /// Written
    Target,
    /// Written as a side product
    Produced,
}

/// A schema used by the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRef {
    /// Canonical URL of the StructureDefinition
    pub url: String,
    /// Usage
    pub mode: StructureMode,
    /// Short name used in group inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Direction of a group input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Read
    Source,
    /// Written
    Target,
}

/// Named group of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapGroup {
    /// Group name
    pub name: String,
    /// Base group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Default-mapping mode (R4)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_mode: Option<String>,
    /// Free-text documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Inputs, positionally matched by dependent invocations
    #[serde(default)]
    pub input: Vec<GroupInput>,
    /// Rules
    #[serde(default)]
    pub rule: Vec<MapRule>,
}

/// One group input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInput {
    /// Variable name
    pub name: String,
    /// Type (alias, URL, or type name)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Direction
    pub mode: InputMode,
}

/// A (possibly nested) transformation rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRule {
    /// Rule name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source bindings
    #[serde(default)]
    pub source: Vec<RuleSource>,
    /// Target bindings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<RuleTarget>,
    /// Nested rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule: Vec<MapRule>,
    /// Group invocations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependent: Vec<Dependent>,
    /// Free-text documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Where a rule reads from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSource {
    /// Variable or input being read
    pub context: String,
    /// Field of the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Item selection (first, last, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_mode: Option<String>,
    /// Variable bound to the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// FHIRPath guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// FHIRPath assertion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// Where a rule writes to, and how the value is produced
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTarget {
    /// Variable being written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Field of the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Variable bound to the produced value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Transform action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Ordered transform parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter: Vec<TargetParameter>,
}

/// Transform parameter: a variable reference or one typed literal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetParameter {
    /// Variable reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_id: Option<String>,
    /// String literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    /// Boolean literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    /// Integer literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i64>,
    /// Decimal literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_decimal: Option<f64>,
}

impl TargetParameter {
    /// Variable reference parameter
    pub fn id(value: impl Into<String>) -> Self {
        Self {
            value_id: Some(value.into()),
            ..Default::default()
        }
    }

    /// String literal parameter
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value_string: Some(value.into()),
            ..Default::default()
        }
    }

    /// Literal parameter from a JSON scalar
    pub fn literal(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => Self {
                value_boolean: Some(*b),
                ..Default::default()
            },
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self {
                    value_integer: Some(i),
                    ..Default::default()
                },
                None => Self {
                    value_decimal: n.as_f64(),
                    ..Default::default()
                },
            },
            serde_json::Value::String(s) => Self::string(s.clone()),
            other => Self::string(other.to_string()),
        }
    }

    /// Literal content as a JSON scalar, `None` for variable references
    pub fn literal_value(&self) -> Option<serde_json::Value> {
        if let Some(s) = &self.value_string {
            return Some(serde_json::Value::String(s.clone()));
        }
        if let Some(b) = self.value_boolean {
            return Some(serde_json::Value::Bool(b));
        }
        if let Some(i) = self.value_integer {
            return Some(serde_json::Value::from(i));
        }
        self.value_decimal.map(serde_json::Value::from)
    }
}

/// Invocation of another group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependent {
    /// Invoked group
    pub name: String,
    /// Positional arguments
    #[serde(default)]
    pub parameter: Vec<TargetParameter>,
}
