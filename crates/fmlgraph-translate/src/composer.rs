//! Graph → StructureMap
//!
//! The main group is split into one rule per written target field: the
//! sub-graph feeding that field is walked in evaluation order and every node
//! becomes source clauses, target clauses, or a dependent. Other groups (and
//! a main group with `shareContext`) become a single rule each.
//!
//! Values get short generated variable names (`a`, `b`, ...). Objects that
//! are written to are declared first; a source clause reading a variable
//! declared by a source of the same rule opens a nested rule.

use std::collections::{HashMap, HashSet};

use fmlgraph_core::config::ComposeConfig;
use fmlgraph_core::document::{
    EXPORT_EXTENSION_URL, Extension, GroupInput, InputMode, MapGroup, MapRule, RuleSource, RuleTarget,
    StructureMode, StructureRef, TargetParameter,
};
use fmlgraph_core::graph::{ListOption, Node, sanitize_name};
use fmlgraph_core::sequence::evaluation_order;
use fmlgraph_core::snapshot::tree_hash;
use fmlgraph_core::{
    Connection, GraphSnapshot, Group, MapGraph, ObjectMode, Rule, SchemaObject, StructureMap, VarRef,
};

use crate::context::{NameAllocator, ValueRef, VariableMap};
use crate::error::{Error, Result};
use crate::transforms::{ComposeInput, TransformKind, create};

/// Compose settings
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Map name (also used as id)
    pub name: String,
    /// Canonical URL
    pub url: Option<String>,
    /// Publication status
    pub status: String,
    /// Embed the graph in the `fml-export` extension
    pub embed_snapshot: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            name: "GeneratedMap".to_string(),
            url: None,
            status: "draft".to_string(),
            embed_snapshot: true,
        }
    }
}

impl ComposeOptions {
    /// Options for a map called `name` under the project settings
    pub fn from_config(config: &ComposeConfig, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            url: config.url_base.as_ref().map(|base| format!("{base}{name}")),
            status: config.status.clone(),
            embed_snapshot: config.embed_snapshot,
            name,
        }
    }
}

/// Compose a StructureMap document from a graph
///
/// # Example
///
/// ```rust,ignore
/// let map = compose(&graph, &ComposeOptions::default())?;
/// println!("{}", serde_json::to_string_pretty(&map)?);
/// ```
pub fn compose(graph: &MapGraph, options: &ComposeOptions) -> Result<StructureMap> {
    let mut document = StructureMap::new();
    document.id = Some(sanitize_name(&options.name));
    document.name = Some(options.name.clone());
    document.url = options.url.clone();
    document.status = Some(options.status.clone());
    document.structure = structures(graph);

    let aliases: HashMap<String, String> = document
        .structure
        .iter()
        .filter_map(|s| Some((s.url.clone(), s.alias.clone()?)))
        .collect();

    for (position, group) in graph.groups.iter().enumerate() {
        let mut composer = GroupComposer::new(graph, group, &aliases);
        let map_group = if position == 0 && !group.share_context {
            composer.per_target()?
        } else {
            composer.whole()?
        };
        tracing::debug!("Composed group '{}' into {} rules", group.name, map_group.rule.len());
        document.group.push(map_group);
    }
    document.contained = graph.concept_maps.clone();

    if options.embed_snapshot {
        let hash = tree_hash(&document.group)?;
        let payload = GraphSnapshot::new(graph.clone(), Some(hash)).to_json_string()?;
        document.extension.push(Extension {
            url: EXPORT_EXTENSION_URL.to_string(),
            value_string: Some(payload),
        });
    }
    Ok(document)
}

/// Compose a graph straight to pretty-printed JSON
pub fn compose_string(graph: &MapGraph, options: &ComposeOptions) -> Result<String> {
    Ok(serde_json::to_string_pretty(&compose(graph, options)?)?)
}

/// One structure entry per input resource and direction
fn structures(graph: &MapGraph) -> Vec<StructureRef> {
    let mut entries: Vec<StructureRef> = Vec::new();
    let inputs = graph
        .groups
        .iter()
        .flat_map(|g| &g.objects)
        .filter(|o| o.is_input() && !o.resource.is_empty());

    for object in inputs {
        let mode = match object.mode {
            ObjectMode::Target => StructureMode::Target,
            _ => StructureMode::Source,
        };
        if entries.iter().any(|e| e.url == object.resource && e.mode == mode) {
            continue;
        }
        let alias = object.type_name().to_string();
        let taken = entries
            .iter()
            .any(|e| e.url != object.resource && e.alias.as_deref() == Some(alias.as_str()));
        entries.push(StructureRef {
            url: object.resource.clone(),
            mode,
            alias: (!taken).then_some(alias),
        });
    }
    entries
}

struct GroupComposer<'a> {
    graph: &'a MapGraph,
    group: &'a Group,
    aliases: &'a HashMap<String, String>,
    names: NameAllocator,
    rule_names: HashSet<String>,
}

impl<'a> GroupComposer<'a> {
    fn new(graph: &'a MapGraph, group: &'a Group, aliases: &'a HashMap<String, String>) -> Self {
        Self {
            graph,
            group,
            aliases,
            names: NameAllocator::new(group.objects.iter().map(|o| o.name.clone())),
            rule_names: HashSet::new(),
        }
    }

    fn map_group(&self, rules: Vec<MapRule>) -> MapGroup {
        let input = self
            .group
            .objects
            .iter()
            .filter(|o| o.is_input())
            .map(|o| GroupInput {
                name: o.name.clone(),
                type_: (!o.resource.is_empty()).then(|| {
                    self.aliases
                        .get(&o.resource)
                        .cloned()
                        .unwrap_or_else(|| o.resource.clone())
                }),
                mode: match o.mode {
                    ObjectMode::Target => InputMode::Target,
                    _ => InputMode::Source,
                },
            })
            .collect();

        MapGroup {
            name: self.group.name.clone(),
            extends: None,
            type_mode: None,
            documentation: None,
            input,
            rule: rules,
        }
    }

    /// One rule per written target field, plus one per rule chain that
    /// writes no target field (group invocations, whole-object writes)
    fn per_target(&mut self) -> Result<MapGroup> {
        let group = self.group;
        let mut rules = Vec::new();
        let mut covered: HashSet<&str> = HashSet::new();

        for (object, field) in self.terminal_fields() {
            let sub = group.sub_graph(&object, &field)?;
            covered.extend(sub.rules.iter().filter_map(|r| group.rule(&r.name)).map(|r| r.name.as_str()));
            let name = self.rule_name(&format!("{object}_{field}"));
            rules.push(self.compose_rule(&sub, name)?);
        }

        for rule in group.rules.iter().filter(|r| !covered.contains(r.name.as_str())) {
            let feeds_rule = group
                .targets(&rule.name, None)
                .iter()
                .any(|c| group.rule(&c.target).is_some());
            if feeds_rule {
                continue;
            }
            let sub = group.sub_graph_from(&rule.name)?;
            let name = self.rule_name(&rule.name);
            rules.push(self.compose_rule(&sub, name)?);
        }
        Ok(self.map_group(rules))
    }

    /// The whole group as one rule
    fn whole(&mut self) -> Result<MapGroup> {
        let group = self.group;
        if group.rules.is_empty() && group.connections.is_empty() {
            return Ok(self.map_group(Vec::new()));
        }
        let name = self.rule_name(&group.name);
        let rule = self.compose_rule(group, name)?;
        Ok(self.map_group(vec![rule]))
    }

    fn rule_name(&mut self, base: &str) -> String {
        let base = sanitize_name(base);
        let mut name = base.clone();
        let mut n = 2;
        while !self.rule_names.insert(name.clone()) {
            name = format!("{base}_{n}");
            n += 1;
        }
        name
    }

    /// `(object, field)` pairs written by the group and read by nothing else
    fn terminal_fields(&self) -> Vec<(String, String)> {
        let group = self.group;
        let mut pairs: Vec<(String, String)> = Vec::new();
        for connection in &group.connections {
            let Some(idx) = connection.target_field else {
                continue;
            };
            let Some(object) = group.object(&connection.target) else {
                continue;
            };
            let terminal = match object.mode {
                ObjectMode::Target => true,
                ObjectMode::Source => false,
                _ => group.is_target_side(&object.name) && parent_edge(group, &object.name).is_none(),
            };
            let Some(field) = object.field_name(idx) else {
                continue;
            };
            let pair = (object.name.clone(), field.to_string());
            if terminal && !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    fn first_source_input(&self) -> Option<&'a str> {
        self.group
            .objects
            .iter()
            .find(|o| o.mode == ObjectMode::Source)
            .map(|o| o.name.as_str())
    }

    fn compose_rule(&mut self, sub: &Group, name: String) -> Result<MapRule> {
        let order = evaluation_order(sub)?;
        let mut vars = VariableMap::new();
        for object in sub.objects.iter().filter(|o| o.is_input()) {
            vars.bind(VarRef::node(&object.name), &object.name);
        }
        let mut builder = RuleBuilder::new(name, self.first_source_input());

        let hoisted: Vec<&SchemaObject> = order
            .iter()
            .rev()
            .filter_map(|n| sub.object(n))
            .filter(|o| !o.is_input() && sub.is_target_side(&o.name))
            .collect();
        for object in hoisted {
            self.declare(sub, object, &mut vars, &mut builder)?;
        }

        let mut last_object: Option<&SchemaObject> = None;
        for name in &order {
            match sub.node(name) {
                Some(Node::Object(object)) => {
                    if sub.is_target_side(&object.name) {
                        self.write_object(sub, object, &vars, &mut builder)?;
                    } else {
                        self.read_object(sub, object, &mut vars, &mut builder)?;
                    }
                    last_object = Some(object);
                }
                Some(Node::Rule(rule)) => {
                    self.compose_node(sub, rule, last_object, &mut vars, &mut builder)?;
                }
                None => {}
            }
        }
        Ok(builder.finish())
    }

    /// Declare a written non-input object as a target variable
    fn declare(
        &mut self,
        sub: &Group,
        object: &SchemaObject,
        vars: &mut VariableMap,
        builder: &mut RuleBuilder,
    ) -> Result<()> {
        let mut target = match object.mode {
            ObjectMode::Object => create::compose_object(object),
            _ => RuleTarget::default(),
        };
        if let Some(edge) = parent_edge(sub, &object.name) {
            let (context, element) = field_of(sub, vars, &edge.target, edge.target_field)?;
            target.context = Some(context);
            target.element = element;
        }

        let variable = self.names.next_name();
        target.variable = Some(variable.clone());
        vars.bind(VarRef::node(&object.name), variable);
        builder.target(target);
        Ok(())
    }

    /// Source clauses for a read-side object and the fields read from it
    fn read_object(
        &mut self,
        sub: &Group,
        object: &SchemaObject,
        vars: &mut VariableMap,
        builder: &mut RuleBuilder,
    ) -> Result<()> {
        let whole = VarRef::node(&object.name);
        if vars.get(&whole).is_none() {
            let edge = sub.connections.iter().find(|c| {
                c.target == object.name
                    && c.target_field.is_none()
                    && c.source_field.is_some()
                    && sub.object(&c.source).is_some()
            });
            if let Some(edge) = edge {
                let (context, element) = field_of(sub, vars, &edge.source, edge.source_field)?;
                let variable = self.names.next_name();
                builder.source(RuleSource {
                    context,
                    element,
                    list_mode: match object.list_option {
                        Some(ListOption::First) => Some("first".to_string()),
                        Some(ListOption::Last) => Some("last".to_string()),
                        _ => None,
                    },
                    variable: Some(variable.clone()),
                    condition: object.condition.clone(),
                    check: None,
                });
                vars.bind(whole, variable);
            }
        }

        for connection in sub.targets(&object.name, None) {
            let Some(idx) = connection.source_field else {
                continue;
            };
            let feeds_element = connection.target_field.is_none()
                && sub
                    .object(&connection.target)
                    .is_some_and(|o| o.mode == ObjectMode::Element);
            if feeds_element {
                continue;
            }
            let var = sub.var_ref(&object.name, Some(idx));
            if vars.get(&var).is_some() {
                continue;
            }
            let (context, element) = field_of(sub, vars, &object.name, Some(idx))?;
            let variable = self.names.next_name();
            builder.source(RuleSource {
                context,
                element,
                variable: Some(variable.clone()),
                ..Default::default()
            });
            vars.bind(var, variable);
        }
        Ok(())
    }

    /// Direct copies into a written object
    fn write_object(
        &mut self,
        sub: &Group,
        object: &SchemaObject,
        vars: &VariableMap,
        builder: &mut RuleBuilder,
    ) -> Result<()> {
        for connection in sub.sources(&object.name, None) {
            let Some(from) = sub.object(&connection.source) else {
                continue;
            };
            if connection.target_field.is_none() {
                continue;
            }
            let declared_by_parent = connection.source_field.is_none() && sub.is_target_side(&from.name);
            if declared_by_parent {
                continue;
            }

            let var = sub.var_ref(&from.name, connection.source_field);
            let parameter = match vars.value_of(&var) {
                Some(ValueRef::Var(name)) => vec![TargetParameter::id(&name), TargetParameter::id(name)],
                Some(ValueRef::Path { var, expression }) => {
                    vec![TargetParameter::id(var), TargetParameter::string(expression)]
                }
                None => return Err(Error::unresolved(var.to_string())),
            };
            let (context, element) = field_of(sub, vars, &object.name, connection.target_field)?;
            builder.target(RuleTarget {
                context: Some(context),
                element,
                variable: None,
                transform: Some("evaluate".to_string()),
                parameter,
            });
        }
        Ok(())
    }

    fn compose_node(
        &mut self,
        sub: &Group,
        rule: &Rule,
        last_object: Option<&SchemaObject>,
        vars: &mut VariableMap,
        builder: &mut RuleBuilder,
    ) -> Result<()> {
        let kind = TransformKind::from_action(&rule.action);
        let incoming = sub.sources(&rule.name, None);
        let outgoing = sub.targets(&rule.name, None);

        let mut needed: Vec<VarRef> = incoming
            .iter()
            .map(|c| sub.var_ref(&c.source, c.source_field))
            .collect();
        needed.extend(rule.parameters.iter().filter_map(|p| p.as_var().cloned()));
        for var in needed {
            if vars.get(&var).is_some() {
                continue;
            }
            if let Some(ValueRef::Path { var: holder, expression }) = vars.value_of(&var) {
                let variable = self.names.next_name();
                builder.target(RuleTarget {
                    variable: Some(variable.clone()),
                    transform: Some("evaluate".to_string()),
                    parameter: vec![TargetParameter::id(holder), TargetParameter::string(expression)],
                    ..Default::default()
                });
                vars.bind(var, variable);
            }
        }

        let object_outs: Vec<&Connection> = outgoing
            .iter()
            .copied()
            .filter(|c| c.target_field.is_some() && sub.object(&c.target).is_some())
            .collect();

        if kind == TransformKind::RuleGroup {
            for connection in &object_outs {
                let var = sub.var_ref(&connection.target, connection.target_field);
                if vars.get(&var).is_some() {
                    continue;
                }
                let (context, element) = field_of(sub, vars, &connection.target, connection.target_field)?;
                let variable = self.names.next_name();
                builder.target(RuleTarget {
                    context: Some(context),
                    element,
                    variable: Some(variable.clone()),
                    ..Default::default()
                });
                vars.bind(var, variable);
            }
        }

        let composed = (kind.handlers().compose)(&ComposeInput {
            rule,
            group: sub,
            graph: self.graph,
            variables: vars,
            context_object: last_object,
        })?;

        if let Some(condition) = &rule.condition {
            builder.condition(condition);
        }
        if let Some(dependent) = composed.dependent {
            builder.dependent(dependent);
            return Ok(());
        }
        let Some(mut target) = composed.target else {
            return Ok(());
        };

        let feeds_rules = outgoing.iter().any(|c| sub.rule(&c.target).is_some());
        match object_outs.as_slice() {
            [only] if !feeds_rules => {
                let (context, element) = field_of(sub, vars, &only.target, only.target_field)?;
                target.context = Some(context);
                target.element = element;
                builder.target(target);
            }
            outs => {
                let variable = self.names.next_name();
                target.variable = Some(variable.clone());
                builder.target(target);
                vars.bind(VarRef::node(&rule.name), variable.clone());
                for connection in outs {
                    let (context, element) =
                        field_of(sub, vars, &connection.target, connection.target_field)?;
                    builder.target(RuleTarget {
                        context: Some(context),
                        element,
                        variable: None,
                        transform: Some("copy".to_string()),
                        parameter: vec![TargetParameter::id(&variable)],
                    });
                }
            }
        }
        Ok(())
    }
}

/// Connection attaching a written object to a field of its parent
fn parent_edge<'g>(group: &'g Group, object: &str) -> Option<&'g Connection> {
    group.connections.iter().find(|c| {
        c.source == object
            && c.source_field.is_none()
            && c.target_field.is_some()
            && group.object(&c.target).is_some()
    })
}

/// Context variable and element name addressing `object.field`
fn field_of(
    group: &Group,
    vars: &VariableMap,
    object: &str,
    field: Option<usize>,
) -> Result<(String, Option<String>)> {
    let context = vars
        .get(&VarRef::node(object))
        .ok_or_else(|| Error::unresolved(object))?
        .to_string();
    let element = field
        .and_then(|idx| group.object(object)?.field_name(idx))
        .map(str::to_string);
    Ok((context, element))
}

/// One level of nested rules under construction
struct Level {
    rule: MapRule,
    declared: HashSet<String>,
}

impl Level {
    fn new(name: String) -> Self {
        Self {
            rule: MapRule {
                name: Some(name),
                ..Default::default()
            },
            declared: HashSet::new(),
        }
    }
}

/// Accumulates clauses, opening a nested rule whenever a source reads a
/// variable declared by a source of the current level
struct RuleBuilder {
    top: Level,
    nested: Vec<Level>,
    default_context: Option<String>,
}

impl RuleBuilder {
    fn new(name: String, default_context: Option<&str>) -> Self {
        Self {
            top: Level::new(name),
            nested: Vec::new(),
            default_context: default_context.map(str::to_string),
        }
    }

    fn current(&mut self) -> &mut Level {
        match self.nested.last_mut() {
            Some(level) => level,
            None => &mut self.top,
        }
    }

    fn source(&mut self, source: RuleSource) {
        if self.current().declared.contains(&source.context) {
            let name = format!(
                "{}_{}",
                self.top.rule.name.as_deref().unwrap_or("rule"),
                self.nested.len() + 1
            );
            self.nested.push(Level::new(name));
        }
        let level = self.current();
        if let Some(variable) = &source.variable {
            level.declared.insert(variable.clone());
        }
        level.rule.source.push(source);
    }

    fn target(&mut self, target: RuleTarget) {
        self.current().rule.target.push(target);
    }

    fn dependent(&mut self, dependent: fmlgraph_core::document::Dependent) {
        self.current().rule.dependent.push(dependent);
    }

    /// Guard the current level with a condition on the default input
    fn condition(&mut self, condition: &str) {
        let default_context = self.default_context.clone();
        let level = self.current();
        let existing = level.rule.source.iter().position(|s| {
            s.element.is_none() && s.variable.is_none() && Some(&s.context) == default_context.as_ref()
        });
        match (existing, default_context) {
            (Some(idx), _) => {
                let source = &mut level.rule.source[idx];
                source.condition = Some(match source.condition.take() {
                    Some(previous) => format!("({previous}) and ({condition})"),
                    None => condition.to_string(),
                });
            }
            (None, Some(context)) => level.rule.source.push(RuleSource {
                context,
                condition: Some(condition.to_string()),
                ..Default::default()
            }),
            (None, None) => {
                tracing::warn!("Dropping condition '{}' of a group without source inputs", condition)
            }
        }
    }

    fn finish(mut self) -> MapRule {
        let mut child: Option<MapRule> = None;
        for level in self.nested.into_iter().rev() {
            let mut rule = level.rule;
            rule.rule.extend(child.take());
            child = Some(rule);
        }
        self.top.rule.rule.extend(child);

        if self.top.rule.source.is_empty() {
            if let Some(context) = self.default_context {
                self.top.rule.source.push(RuleSource {
                    context,
                    ..Default::default()
                });
            }
        }
        self.top.rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmlgraph_core::{RuleParameter, SchemaCatalog, SchemaDefinition};

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        catalog.insert(
            SchemaDefinition::new("urn:model_a", "model_a")
                .with_element("model_a.a", &["string"], 0, "1")
                .with_element("model_a.b", &["string"], 0, "1")
                .with_element("model_a.items", &["BackboneElement"], 0, "*")
                .with_element("model_a.items.code", &["code"], 0, "1"),
        );
        catalog.insert(
            SchemaDefinition::new("urn:model_a2", "model_a2")
                .with_element("model_a2.a", &["string"], 0, "1")
                .with_element("model_a2.c", &["string"], 0, "1"),
        );
        catalog.insert(
            SchemaDefinition::new("http://hl7.org/fhir/StructureDefinition/Patient", "Patient")
                .with_element("Patient.id", &["id"], 0, "1"),
        );
        catalog
    }

    fn group(catalog: &SchemaCatalog) -> Group {
        let mut group = Group::new("main");
        group
            .put_object(SchemaObject::new(catalog, "urn:model_a", "model_a1", ObjectMode::Source).unwrap())
            .unwrap();
        group
            .put_object(SchemaObject::new(catalog, "urn:model_a2", "model_a2", ObjectMode::Target).unwrap())
            .unwrap();
        group
    }

    fn options() -> ComposeOptions {
        ComposeOptions {
            embed_snapshot: false,
            ..Default::default()
        }
    }

    fn compose_group(group: Group) -> StructureMap {
        let mut graph = MapGraph::new();
        graph.groups.push(group);
        compose(&graph, &options()).unwrap()
    }

    #[test]
    fn test_direct_copy_becomes_evaluate() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group
            .put_connection(Connection::new("model_a1", Some(0), "model_a2", Some(0)))
            .unwrap();

        let map = compose_group(group);
        assert_eq!(map.group.len(), 1);
        let rules = &map.group[0].rule;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name.as_deref(), Some("model_a2_a"));
        assert_eq!(
            rules[0].source,
            vec![RuleSource {
                context: "model_a1".to_string(),
                element: Some("a".to_string()),
                variable: Some("a".to_string()),
                ..Default::default()
            }]
        );
        let target = &rules[0].target[0];
        assert_eq!(target.context.as_deref(), Some("model_a2"));
        assert_eq!(target.element.as_deref(), Some("a"));
        assert_eq!(target.transform.as_deref(), Some("evaluate"));
        assert_eq!(target.parameter, vec![TargetParameter::id("a"), TargetParameter::id("a")]);
    }

    #[test]
    fn test_created_object_is_declared_first() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group
            .put_object(
                SchemaObject::new(
                    &catalog,
                    "http://hl7.org/fhir/StructureDefinition/Patient",
                    "p",
                    ObjectMode::Object,
                )
                .unwrap(),
            )
            .unwrap();
        group
            .put_connection(Connection::new("p", Some(0), "model_a2", Some(0)))
            .unwrap();

        let map = compose_group(group);
        let rule = &map.group[0].rule[0];
        assert_eq!(rule.source[0].context, "model_a1");
        assert_eq!(
            rule.target[0],
            RuleTarget {
                variable: Some("a".to_string()),
                transform: Some("create".to_string()),
                parameter: vec![TargetParameter::string("Patient")],
                ..Default::default()
            }
        );
        assert_eq!(
            rule.target[1].parameter,
            vec![TargetParameter::id("a"), TargetParameter::string("a.id")]
        );
    }

    #[test]
    fn test_rule_with_single_output_writes_directly() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let mut rule = Rule::new("r", "cc");
        rule.parameters = vec![
            RuleParameter::Var(VarRef::field("model_a1", "a")),
            RuleParameter::Var(VarRef::field("model_a1", "b")),
        ];
        group.put_rule(rule).unwrap();
        for c in [
            Connection::new("model_a1", Some(0), "r", None),
            Connection::new("model_a1", Some(1), "r", None),
            Connection::new("r", None, "model_a2", Some(1)),
        ] {
            group.put_connection(c).unwrap();
        }

        let map = compose_group(group);
        let rule = &map.group[0].rule[0];
        assert_eq!(rule.source.len(), 2);
        assert_eq!(rule.target.len(), 1);
        assert_eq!(rule.target[0].element.as_deref(), Some("c"));
        assert_eq!(rule.target[0].transform.as_deref(), Some("cc"));
        assert_eq!(
            rule.target[0].parameter,
            vec![TargetParameter::id("a"), TargetParameter::id("b")]
        );
    }

    #[test]
    fn test_rule_with_two_outputs_gets_a_variable() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group.share_context = true;
        group.put_rule(Rule::new("u", "uuid")).unwrap();
        group
            .put_connection(Connection::new("u", None, "model_a2", Some(0)))
            .unwrap();
        group
            .put_connection(Connection::new("u", None, "model_a2", Some(1)))
            .unwrap();

        let map = compose_group(group);
        let rules = &map.group[0].rule;
        assert_eq!(rules.len(), 1);
        let targets = &rules[0].target;
        assert_eq!(targets[0].variable.as_deref(), Some("a"));
        assert_eq!(targets[0].transform.as_deref(), Some("uuid"));
        assert_eq!(targets[1].transform.as_deref(), Some("copy"));
        assert_eq!(targets[2].parameter, vec![TargetParameter::id("a")]);
    }

    #[test]
    fn test_list_element_opens_nested_rule() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let name = group.drill_down("model_a1", "items", &catalog).unwrap();
        group.object_mut(&name).unwrap().list_option = Some(ListOption::First);
        group
            .put_connection(Connection::new(&name, Some(0), "model_a2", Some(0)))
            .unwrap();

        let map = compose_group(group);
        let rule = &map.group[0].rule[0];
        assert_eq!(rule.source[0].element.as_deref(), Some("items"));
        assert_eq!(rule.source[0].list_mode.as_deref(), Some("first"));
        let nested = &rule.rule[0];
        assert_eq!(nested.source[0].context, "a");
        assert_eq!(nested.source[0].element.as_deref(), Some("code"));
        assert_eq!(nested.target[0].parameter, vec![TargetParameter::id("b"), TargetParameter::id("b")]);
    }

    #[test]
    fn test_condition_guards_rule() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let mut rule = Rule::new("u", "uuid");
        rule.condition = Some("model_a1.a.exists()".to_string());
        group.put_rule(rule).unwrap();
        group
            .put_connection(Connection::new("u", None, "model_a2", Some(0)))
            .unwrap();

        let map = compose_group(group);
        let rule = &map.group[0].rule[0];
        assert_eq!(rule.source.len(), 1);
        assert_eq!(rule.source[0].condition.as_deref(), Some("model_a1.a.exists()"));
    }

    #[test]
    fn test_share_context_composes_one_rule() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group.share_context = true;
        group
            .put_connection(Connection::new("model_a1", Some(0), "model_a2", Some(0)))
            .unwrap();
        group
            .put_connection(Connection::new("model_a1", Some(1), "model_a2", Some(1)))
            .unwrap();

        let map = compose_group(group);
        assert_eq!(map.group[0].rule.len(), 1);
        assert_eq!(map.group[0].rule[0].target.len(), 2);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group.put_rule(Rule::new("r1", "cc")).unwrap();
        group.put_rule(Rule::new("r2", "cc")).unwrap();
        for c in [
            Connection::new("r1", None, "r2", None),
            Connection::new("r2", None, "r1", None),
            Connection::new("r2", None, "model_a2", Some(0)),
        ] {
            group.put_connection(c).unwrap();
        }

        let mut graph = MapGraph::new();
        graph.groups.push(group);
        let err = compose(&graph, &options()).unwrap_err();
        assert!(matches!(err, Error::Graph(fmlgraph_core::Error::CyclicGraph { .. })));
    }

    #[test]
    fn test_document_header_and_snapshot() {
        let catalog = catalog();
        let mut graph = MapGraph::new();
        graph.groups.push(group(&catalog));
        let options = ComposeOptions::from_config(
            &ComposeConfig {
                embed_snapshot: true,
                url_base: Some("http://example.org/StructureMap/".to_string()),
                status: "active".to_string(),
            },
            "demo",
        );

        let map = compose(&graph, &options).unwrap();
        assert_eq!(map.url.as_deref(), Some("http://example.org/StructureMap/demo"));
        assert_eq!(map.status.as_deref(), Some("active"));
        assert_eq!(map.structure.len(), 2);
        assert_eq!(map.structure[0].alias.as_deref(), Some("model_a"));
        assert_eq!(map.group[0].input[1].type_.as_deref(), Some("model_a2"));

        let payload = map.extension_value(EXPORT_EXTENSION_URL).unwrap();
        let snapshot = GraphSnapshot::from_json_str(payload).unwrap();
        assert_eq!(snapshot.graph, graph);
        assert_eq!(snapshot.tree_hash, Some(tree_hash(&map.group).unwrap()));
    }
}
