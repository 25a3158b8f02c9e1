//! Mapping graph model
//!
//! A [`MapGraph`] is the flat, editable form of a StructureMap: each
//! [`Group`] holds schema objects, transform rules, and field-level
//! connections between them.
//!
//! ```text
//! ┌──────────────┐  a   ┌──────────┐      ┌──────────────┐
//! │ src (source) │─────▶│ rule r_1 │─────▶│ tgt (target) │ x
//! └──────────────┘      └──────────┘      └──────────────┘
//! ```
//!
//! Mutators keep two invariants: every connection endpoint names a live node
//! of the same group, and no two connections are identical.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::catalog::{ElementScope, SchemaCatalog};
use crate::error::{Error, Result};

/// Name of the synthetic field standing for an object's whole value
pub const SELF_FIELD: &str = "$this";

/// Role of a schema object in its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectMode {
    /// Group input read by the rules
    Source,
    /// Group input written by the rules
    Target,
    /// Sub-structure reached through a field of another object
    Element,
    /// Value instantiated by a `create` transform
    Object,
}

/// Which items of a repeated field an element object iterates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOption {
    /// Every item
    Every,
    /// Only the first item
    First,
    /// Only the last item
    Last,
}

/// Field descriptor of a schema object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field name
    pub name: String,
    /// Declared type codes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Minimum cardinality above zero
    #[serde(default)]
    pub required: bool,
    /// Maximum cardinality above one
    #[serde(default)]
    pub repeated: bool,
    /// Field is a backbone element with inline children
    #[serde(default)]
    pub backbone_part: bool,
}

impl Field {
    /// The synthetic whole-value field
    pub fn self_field() -> Self {
        Self {
            name: SELF_FIELD.to_string(),
            types: Vec::new(),
            required: false,
            repeated: false,
            backbone_part: false,
        }
    }
}

/// A schema-typed node of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaObject {
    /// Unique key within the group
    pub name: String,
    /// Schema id (canonical URL)
    pub resource: String,
    /// Element path the fields were derived from
    pub element: String,
    /// Role in the group
    pub mode: ObjectMode,
    /// Ordered field descriptors
    pub fields: Vec<Field>,
    /// Item selection when fed by a repeated field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_option: Option<ListOption>,
    /// Guard expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl SchemaObject {
    /// Create an object whose fields come from the catalog entry of `resource`
    pub fn new(
        catalog: &SchemaCatalog,
        resource: &str,
        name: impl Into<String>,
        mode: ObjectMode,
    ) -> Result<Self> {
        let scope = catalog.root(resource)?;
        Ok(Self::from_scope(&scope, name, mode))
    }

    /// Create an object for a schema the catalog does not know
    pub fn detached(resource: impl Into<String>, name: impl Into<String>, mode: ObjectMode) -> Self {
        let resource = resource.into();
        Self {
            name: name.into(),
            element: type_name_of(&resource).to_string(),
            resource,
            mode,
            fields: vec![Field::self_field()],
            list_option: None,
            condition: None,
        }
    }

    /// Create an object anchored at an element scope
    pub fn from_scope(scope: &ElementScope<'_>, name: impl Into<String>, mode: ObjectMode) -> Self {
        let mut fields: Vec<Field> = scope
            .children
            .iter()
            .map(|el| Field {
                name: el.name().to_string(),
                types: el.types.clone(),
                required: el.is_required(),
                repeated: el.is_repeated(),
                backbone_part: !scope.definition.children(&el.path).is_empty(),
            })
            .collect();
        if fields.is_empty() {
            fields.push(Field::self_field());
        }

        Self {
            name: name.into(),
            resource: scope.resource.clone(),
            element: scope.element.clone(),
            mode,
            fields,
            list_option: None,
            condition: None,
        }
    }

    /// Position of a field, `None` when absent
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }

    /// Field name at a position
    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.name.as_str())
    }

    /// Whether fields are added on demand (schema unknown to the catalog)
    pub fn is_open(&self) -> bool {
        self.fields.first().is_some_and(|f| f.name == SELF_FIELD)
    }

    /// Bare type name of the resource (last URL segment)
    pub fn type_name(&self) -> &str {
        type_name_of(&self.resource)
    }

    /// Whether the object is a group input
    pub fn is_input(&self) -> bool {
        matches!(self.mode, ObjectMode::Source | ObjectMode::Target)
    }
}

/// Last path segment of a canonical URL, or the identifier itself
pub fn type_name_of(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}

/// Reference from a rule parameter to another node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    /// Object or rule name
    pub node: String,
    /// Field of the object, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl VarRef {
    /// Reference to a whole node
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            field: None,
        }
    }

    /// Reference to one field of an object
    pub fn field(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            field: Some(field.into()),
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.node, field),
            None => write!(f, "{}", self.node),
        }
    }
}

/// One transform parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleParameter {
    /// Reference to another node's value
    Var(VarRef),
    /// Literal value
    Const(serde_json::Value),
}

impl RuleParameter {
    /// The variable reference, if this is a `var` parameter
    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Self::Var(v) => Some(v),
            Self::Const(_) => None,
        }
    }

    /// String content of a `const` parameter
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Const(v) => v.as_str(),
            Self::Var(_) => None,
        }
    }
}

/// Actions accepting one extra parameter slot per incoming connection
pub const MULTI_INPUT_ACTIONS: &[&str] = &["append", "translate"];

/// A transform invocation node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique key within the group
    pub name: String,
    /// Transform kind (copy, create, append, ...)
    pub action: String,
    /// Ordered parameters
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    /// Guard expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Rule {
    /// Create a rule without parameters
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            parameters: Vec::new(),
            condition: None,
        }
    }

    /// Whether each incoming connection adds a parameter slot
    pub fn is_multi_input(&self) -> bool {
        MULTI_INPUT_ACTIONS.contains(&self.action.as_str())
    }
}

/// Directed edge between two node fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Producing node
    pub source: String,
    /// Field of the producing object; `None` for the whole value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<usize>,
    /// Consuming node
    pub target: String,
    /// Field of the consuming object; `None` for the whole value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<usize>,
}

impl Connection {
    /// Create a connection
    pub fn new(
        source: impl Into<String>,
        source_field: Option<usize>,
        target: impl Into<String>,
        target_field: Option<usize>,
    ) -> Self {
        Self {
            source: source.into(),
            source_field,
            target: target.into(),
            target_field,
        }
    }
}

/// Borrowed view of any graph node
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Schema object
    Object(&'a SchemaObject),
    /// Transform rule
    Rule(&'a Rule),
}

/// Self-contained graph of objects, rules, and connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group name
    pub name: String,
    /// Objects keyed by their unique name, in insertion order
    #[serde(default)]
    pub objects: Vec<SchemaObject>,
    /// Rules in insertion order
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Connections in insertion order
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Compose the whole group as one rule instead of one per target field
    #[serde(default)]
    pub share_context: bool,
}

impl Group {
    /// Create an empty group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            rules: Vec::new(),
            connections: Vec::new(),
            share_context: false,
        }
    }

    /// Object by name
    pub fn object(&self, name: &str) -> Option<&SchemaObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Mutable object by name
    pub fn object_mut(&mut self, name: &str) -> Option<&mut SchemaObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    /// Rule by name
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Mutable rule by name
    pub fn rule_mut(&mut self, name: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.name == name)
    }

    /// Any node by name
    pub fn node(&self, name: &str) -> Option<Node<'_>> {
        self.object(name)
            .map(Node::Object)
            .or_else(|| self.rule(name).map(Node::Rule))
    }

    /// Whether a node with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// Position of `field` in `object`, `None` when either is absent
    pub fn field_index(&self, object: &str, field: &str) -> Option<usize> {
        self.object(object)?.field_index(field)
    }

    /// Position of `field`, appending an untyped field to open objects
    pub fn resolve_field(&mut self, object: &str, field: &str) -> Result<usize> {
        let target = self
            .object_mut(object)
            .ok_or_else(|| Error::unresolved("object", object))?;
        if let Some(idx) = target.field_index(field) {
            return Ok(idx);
        }
        if !target.is_open() {
            return Err(Error::InvalidField {
                object: object.to_string(),
                field: field.to_string(),
            });
        }
        target.fields.push(Field {
            name: field.to_string(),
            ..Field::self_field()
        });
        Ok(target.fields.len() - 1)
    }

    /// First free name of the form `base`, `base_2`, `base_3`, ...
    pub fn unique_node_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add an object; names are unique across objects and rules
    pub fn put_object(&mut self, object: SchemaObject) -> Result<()> {
        if self.contains(&object.name) {
            return Err(Error::DuplicateNode {
                group: self.name.clone(),
                name: object.name,
            });
        }
        self.objects.push(object);
        Ok(())
    }

    /// Add a rule; names are unique across objects and rules
    pub fn put_rule(&mut self, rule: Rule) -> Result<()> {
        if self.contains(&rule.name) {
            return Err(Error::DuplicateNode {
                group: self.name.clone(),
                name: rule.name,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Add a connection after validating both endpoints.
    ///
    /// Field indices on rule endpoints are dropped. Returns `false` when an
    /// identical connection already exists.
    pub fn put_connection(&mut self, mut connection: Connection) -> Result<bool> {
        connection.source_field = self.check_endpoint(&connection.source, connection.source_field)?;
        connection.target_field = self.check_endpoint(&connection.target, connection.target_field)?;

        if self.connections.contains(&connection) {
            return Ok(false);
        }
        self.connections.push(connection);
        Ok(true)
    }

    fn check_endpoint(&self, name: &str, field: Option<usize>) -> Result<Option<usize>> {
        match self.node(name) {
            None => Err(Error::unresolved("node", name)),
            Some(Node::Rule(_)) => Ok(None),
            Some(Node::Object(object)) => match field {
                Some(idx) if idx >= object.fields.len() => Err(Error::InvalidField {
                    object: name.to_string(),
                    field: idx.to_string(),
                }),
                _ => Ok(field),
            },
        }
    }

    /// Add a connection as an editor would: a new input of a multi-input
    /// rule also becomes one more `var` parameter.
    pub fn connect(&mut self, connection: Connection) -> Result<bool> {
        let var = self.var_ref(&connection.source, connection.source_field);
        let target = connection.target.clone();
        let inserted = self.put_connection(connection)?;

        if let Some(rule) = self.rule_mut(&target) {
            if rule.is_multi_input()
                && !rule.parameters.iter().any(|p| p.as_var() == Some(&var))
            {
                rule.parameters.push(RuleParameter::Var(var));
            }
        }
        Ok(inserted)
    }

    /// Variable reference naming a connection endpoint
    pub fn var_ref(&self, node: &str, field: Option<usize>) -> VarRef {
        let field_name = field
            .and_then(|idx| self.object(node)?.field_name(idx))
            .map(str::to_string);
        VarRef {
            node: node.to_string(),
            field: field_name,
        }
    }

    /// Remove one connection; returns whether it existed
    pub fn remove_connection(&mut self, connection: &Connection) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        self.connections.len() != before
    }

    /// Remove a rule and every connection touching it
    pub fn remove_rule(&mut self, name: &str) -> Option<Rule> {
        let idx = self.rules.iter().position(|r| r.name == name)?;
        self.connections
            .retain(|c| c.source != name && c.target != name);
        Some(self.rules.remove(idx))
    }

    /// Remove an object and every connection touching it
    pub fn remove_object(&mut self, name: &str) -> Option<SchemaObject> {
        let idx = self.objects.iter().position(|o| o.name == name)?;
        self.connections
            .retain(|c| c.source != name && c.target != name);
        Some(self.objects.remove(idx))
    }

    /// Connections whose target is `name` (optionally one field of it)
    pub fn sources(&self, name: &str, field: Option<&str>) -> Vec<&Connection> {
        let field_idx = field.map(|f| self.field_index(name, f));
        self.connections
            .iter()
            .filter(|c| c.target == name)
            .filter(|c| field_idx.is_none_or(|idx| idx.is_some() && c.target_field == idx))
            .collect()
    }

    /// Connections whose source is `name` (optionally one field of it)
    pub fn targets(&self, name: &str, field: Option<&str>) -> Vec<&Connection> {
        let field_idx = field.map(|f| self.field_index(name, f));
        self.connections
            .iter()
            .filter(|c| c.source == name)
            .filter(|c| field_idx.is_none_or(|idx| idx.is_some() && c.source_field == idx))
            .collect()
    }

    /// Fields of `object` that are written by some connection
    pub fn input_fields(&self, object: &str) -> Vec<&Field> {
        let used: HashSet<usize> = self
            .connections
            .iter()
            .filter(|c| c.target == object)
            .filter_map(|c| c.target_field)
            .collect();
        self.fields_at(object, &used)
    }

    /// Fields of `object` that are read by some connection
    pub fn output_fields(&self, object: &str) -> Vec<&Field> {
        let used: HashSet<usize> = self
            .connections
            .iter()
            .filter(|c| c.source == object)
            .filter_map(|c| c.source_field)
            .collect();
        self.fields_at(object, &used)
    }

    fn fields_at(&self, object: &str, indices: &HashSet<usize>) -> Vec<&Field> {
        self.object(object)
            .map(|o| {
                o.fields
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| indices.contains(idx))
                    .map(|(_, f)| f)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether an object lives on the written side of the mapping.
    ///
    /// Element objects are read-side when some object field feeds their
    /// whole value (`parent.field → element`).
    pub fn is_target_side(&self, name: &str) -> bool {
        match self.object(name).map(|o| o.mode) {
            Some(ObjectMode::Target | ObjectMode::Object) => true,
            Some(ObjectMode::Source) | None => false,
            Some(ObjectMode::Element) => !self.connections.iter().any(|c| {
                c.target == name
                    && c.target_field.is_none()
                    && c.source_field.is_some()
                    && self.object(&c.source).is_some()
            }),
        }
    }

    /// Element object reached through `object.field`, created on first use.
    ///
    /// Read-side objects get `object.field → element`, written-side objects
    /// get `element → object.field`.
    pub fn drill_down(
        &mut self,
        object: &str,
        field: &str,
        catalog: &SchemaCatalog,
    ) -> Result<String> {
        let idx = self.resolve_field(object, field)?;
        let parent = self
            .object(object)
            .ok_or_else(|| Error::unresolved("object", object))?;
        let target_side = self.is_target_side(object);

        let existing = self.connections.iter().find_map(|c| {
            let (own, other, own_field, other_field) = if target_side {
                (&c.target, &c.source, c.target_field, c.source_field)
            } else {
                (&c.source, &c.target, c.source_field, c.target_field)
            };
            let is_element = self
                .object(other)
                .is_some_and(|o| o.mode == ObjectMode::Element);
            (own == object && own_field == Some(idx) && other_field.is_none() && is_element)
                .then(|| other.clone())
        });
        if let Some(name) = existing {
            return Ok(name);
        }

        let name = self.unique_node_name(&sanitize_name(&format!("{object}_{field}")));
        let descriptor = parent.fields[idx].clone();
        let mut child = match catalog.expand(&parent.resource, &parent.element, field) {
            Some(scope) => SchemaObject::from_scope(&scope, &name, ObjectMode::Element),
            None => {
                let mut detached = SchemaObject::detached(
                    descriptor
                        .types
                        .first()
                        .cloned()
                        .unwrap_or_else(|| parent.resource.clone()),
                    &name,
                    ObjectMode::Element,
                );
                detached.element = format!("{}.{}", parent.element, field);
                detached
            }
        };
        child.list_option = descriptor.repeated.then_some(ListOption::Every);

        tracing::debug!("Drilling into {}.{} as '{}'", object, field, name);
        self.put_object(child)?;
        let connection = if target_side {
            Connection::new(&name, None, object, Some(idx))
        } else {
            Connection::new(object, Some(idx), &name, None)
        };
        self.put_connection(connection)?;
        Ok(name)
    }

    /// Minimal induced sub-group feeding one target field.
    ///
    /// Contains the target object, every node reachable backward from
    /// `object.field`, and the connections traversed to reach them.
    pub fn sub_graph(&self, object: &str, field: &str) -> Result<Group> {
        let idx = self
            .object(object)
            .ok_or_else(|| Error::unresolved("object", object))?
            .field_index(field)
            .ok_or_else(|| Error::InvalidField {
                object: object.to_string(),
                field: field.to_string(),
            })?;

        let seeds: Vec<usize> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.target == object && c.target_field == Some(idx))
            .map(|(pos, _)| pos)
            .collect();
        let upstream = seeds
            .iter()
            .map(|&pos| self.connections[pos].source.as_str())
            .collect();
        Ok(self.induced(vec![object], &seeds, upstream))
    }

    /// Minimal induced sub-group around one node: everything upstream of
    /// it, plus its own connections into objects.
    pub fn sub_graph_from(&self, node: &str) -> Result<Group> {
        if !self.contains(node) {
            return Err(Error::unresolved("node", node));
        }
        let outputs: Vec<usize> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.source == node && self.object(&c.target).is_some())
            .map(|(pos, _)| pos)
            .collect();
        let mut roots = vec![node];
        roots.extend(outputs.iter().map(|&pos| self.connections[pos].target.as_str()));
        Ok(self.induced(roots, &outputs, vec![node]))
    }

    /// Sub-group made of `roots`, the `seeds` connections, and every node
    /// and connection upstream of `upstream`
    fn induced<'a>(&'a self, roots: Vec<&'a str>, seeds: &[usize], upstream: Vec<&'a str>) -> Group {
        let mut nodes: HashSet<&str> = roots.into_iter().collect();
        let mut kept: HashSet<usize> = seeds.iter().copied().collect();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = upstream;

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            nodes.insert(node);
            for (pos, c) in self.connections.iter().enumerate() {
                if c.target == node {
                    kept.insert(pos);
                    stack.push(&c.source);
                }
            }
        }

        Group {
            name: self.name.clone(),
            objects: self
                .objects
                .iter()
                .filter(|o| nodes.contains(o.name.as_str()))
                .cloned()
                .collect(),
            rules: self
                .rules
                .iter()
                .filter(|r| nodes.contains(r.name.as_str()))
                .cloned()
                .collect(),
            connections: self
                .connections
                .iter()
                .enumerate()
                .filter(|(pos, _)| kept.contains(pos))
                .map(|(_, c)| c.clone())
                .collect(),
            share_context: self.share_context,
        }
    }
}

/// Replace characters that cannot appear in a node or variable name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// A whole mapping: its groups and the concept maps they reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapGraph {
    /// Groups; the first one is the main group
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Internal ConceptMap resources, keyed by their `id`
    #[serde(default)]
    pub concept_maps: Vec<serde_json::Value>,
}

impl MapGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry group
    pub fn main_group(&self) -> Option<&Group> {
        self.groups.first()
    }

    /// Group by name
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Mutable group by name
    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Whether `id` names a contained ConceptMap
    pub fn has_concept_map(&self, id: &str) -> bool {
        self.concept_maps
            .iter()
            .any(|m| m.get("id").and_then(|v| v.as_str()) == Some(id))
    }
}
