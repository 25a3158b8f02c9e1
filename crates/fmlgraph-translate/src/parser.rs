//! StructureMap → graph
//!
//! A document carrying a current `fml-export` payload is restored from it
//! directly. Otherwise the rule tree is walked group by group: inputs become
//! objects, sources and targets resolve through a [`VariableContext`] that
//! every nested rule inherits a copy of, and each target is handed to the
//! handler of its transform kind.
//!
//! A rule that fails is rolled back and reported as a [`Diagnostic`]; its
//! nested rules are skipped and parsing carries on with its siblings.

use std::collections::{HashMap, HashSet};

use fmlgraph_core::config::ParseConfig;
use fmlgraph_core::document::{EXPORT_EXTENSION_URL, GroupInput, InputMode, MapGroup, MapRule, RuleTarget};
use fmlgraph_core::graph::ListOption;
use fmlgraph_core::snapshot::tree_hash;
use fmlgraph_core::{Group, GraphSnapshot, MapGraph, ObjectMode, SchemaCatalog, SchemaObject, StructureMap};

use crate::context::{Binding, Sequence, VariableContext};
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::transforms::{Invocation, ParseScope, SourceBinding, TargetInput, TargetOutcome, TransformKind, copy};

/// Parse settings
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Restore the embedded graph when its hash matches the rule tree
    pub trust_snapshot: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            trust_snapshot: true,
        }
    }
}

impl From<&ParseConfig> for ParseOptions {
    fn from(config: &ParseConfig) -> Self {
        Self {
            trust_snapshot: config.trust_snapshot,
        }
    }
}

/// Result of parsing one document
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The graph
    pub graph: MapGraph,
    /// Problems recovered from while rebuilding the graph
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the graph came from the embedded payload
    pub restored: bool,
}

/// Parse a StructureMap document
///
/// # Example
///
/// ```rust,ignore
/// let outcome = parse(&map, &catalog, &ParseOptions::default())?;
/// for diagnostic in &outcome.diagnostics {
///     eprintln!("{diagnostic}");
/// }
/// ```
pub fn parse(
    document: &StructureMap,
    catalog: &SchemaCatalog,
    options: &ParseOptions,
) -> Result<ParseOutcome> {
    if options.trust_snapshot {
        match restore(document) {
            Ok(Some(graph)) => {
                tracing::info!("Restored graph from embedded payload");
                return Ok(ParseOutcome {
                    graph,
                    diagnostics: Vec::new(),
                    restored: true,
                });
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Ignoring unreadable graph payload: {}", err),
        }
    }

    let mut parser = TreeParser::new(document, catalog);
    let groups = document
        .group
        .iter()
        .map(|g| parser.parse_group(g))
        .collect();

    let graph = MapGraph {
        groups,
        concept_maps: concept_maps(document).cloned().collect(),
    };
    tracing::info!(
        "Parsed {} groups with {} diagnostics",
        graph.groups.len(),
        parser.diagnostics.len()
    );
    Ok(ParseOutcome {
        graph,
        diagnostics: parser.diagnostics,
        restored: false,
    })
}

/// Parse a StructureMap from JSON text
pub fn parse_str(json: &str, catalog: &SchemaCatalog, options: &ParseOptions) -> Result<ParseOutcome> {
    let document: StructureMap = serde_json::from_str(json)?;
    parse(&document, catalog, options)
}

/// Graph from the embedded payload, `None` when absent or stale
pub fn restore(document: &StructureMap) -> Result<Option<MapGraph>> {
    let Some(payload) = document.extension_value(EXPORT_EXTENSION_URL) else {
        return Ok(None);
    };
    let snapshot = GraphSnapshot::from_json_str(payload)?;

    match &snapshot.tree_hash {
        None => Ok(Some(snapshot.graph)),
        Some(expected) => {
            let actual = tree_hash(&document.group)?;
            if *expected == actual {
                Ok(Some(snapshot.graph))
            } else {
                tracing::warn!("Rule tree changed since the graph was embedded, rebuilding");
                Ok(None)
            }
        }
    }
}

fn concept_maps(document: &StructureMap) -> impl Iterator<Item = &serde_json::Value> {
    document
        .contained
        .iter()
        .filter(|r| r.get("resourceType").and_then(|v| v.as_str()) == Some("ConceptMap"))
}

fn list_option(mode: &str) -> Option<ListOption> {
    match mode {
        "first" => Some(ListOption::First),
        "last" => Some(ListOption::Last),
        _ => None,
    }
}

struct TreeParser<'a> {
    catalog: &'a SchemaCatalog,
    aliases: HashMap<String, String>,
    group_inputs: HashMap<String, Vec<InputMode>>,
    concept_maps: HashSet<String>,
    sequence: Sequence,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TreeParser<'a> {
    fn new(document: &StructureMap, catalog: &'a SchemaCatalog) -> Self {
        let aliases = document
            .structure
            .iter()
            .filter_map(|s| Some((s.alias.clone()?, s.url.clone())))
            .collect();
        let group_inputs = document
            .group
            .iter()
            .map(|g| (g.name.clone(), g.input.iter().map(|i| i.mode).collect()))
            .collect();
        let concept_maps = concept_maps(document)
            .filter_map(|m| m.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .collect();

        Self {
            catalog,
            aliases,
            group_inputs,
            concept_maps,
            sequence: Sequence::new(),
            diagnostics: Vec::new(),
        }
    }

    fn scope<'s>(&'s mut self, group: &'s mut Group, context: &'s VariableContext) -> ParseScope<'s> {
        ParseScope {
            group,
            catalog: self.catalog,
            aliases: &self.aliases,
            context,
            sequence: &mut self.sequence,
            group_inputs: &self.group_inputs,
            concept_maps: &self.concept_maps,
        }
    }

    fn parse_group(&mut self, map_group: &MapGroup) -> Group {
        tracing::debug!("Parsing group '{}'", map_group.name);
        let mut group = Group::new(&map_group.name);
        let mut context = VariableContext::new();

        for input in &map_group.input {
            let object = self.input_object(&map_group.name, input);
            match group.put_object(object) {
                Ok(()) => context.bind(&input.name, Binding::Object(input.name.clone())),
                Err(err) => {
                    tracing::warn!("Skipping input '{}': {}", input.name, err);
                    self.diagnostics
                        .push(Diagnostic::from_error(&map_group.name, None, &err.into()));
                }
            }
        }

        for rule in &map_group.rule {
            self.parse_rule_guarded(&mut group, rule, &context);
        }
        group
    }

    fn input_object(&mut self, group: &str, input: &GroupInput) -> SchemaObject {
        let mode = match input.mode {
            InputMode::Source => ObjectMode::Source,
            InputMode::Target => ObjectMode::Target,
        };
        let Some(type_) = &input.type_ else {
            return SchemaObject::detached("", &input.name, mode);
        };

        self.catalog
            .resolve_with(type_, &self.aliases)
            .and_then(|resolved| SchemaObject::new(self.catalog, &resolved.id, &input.name, mode))
            .unwrap_or_else(|err| {
                tracing::warn!("Input '{}' has an unknown type: {}", input.name, err);
                self.diagnostics
                    .push(Diagnostic::from_error(group, None, &Error::Graph(err)));
                SchemaObject::detached(type_, &input.name, mode)
            })
    }

    fn report(&mut self, group: &str, rule: Option<&str>, err: &Error) {
        tracing::warn!(
            "Skipping rule '{}' in group '{}': {}",
            rule.unwrap_or("<unnamed>"),
            group,
            err
        );
        self.diagnostics.push(Diagnostic::from_error(group, rule, err));
    }

    fn parse_rule_guarded(&mut self, group: &mut Group, rule: &MapRule, context: &VariableContext) {
        let checkpoint = group.clone();
        if let Err(err) = self.parse_rule(group, rule, context) {
            *group = checkpoint;
            self.report(&group.name.clone(), rule.name.as_deref(), &err);
        }
    }

    fn parse_rule(&mut self, group: &mut Group, rule: &MapRule, outer: &VariableContext) -> Result<()> {
        let rule_name = rule.name.clone().unwrap_or_else(|| "rule".to_string());
        let mut context = outer.clone();
        let mut source: Option<SourceBinding> = None;
        let mut conditions = Vec::new();

        for clause in &rule.source {
            let base = context.resolve(&clause.context)?;
            let mut binding = match &clause.element {
                Some(element) => base.child(element)?,
                None => base.clone(),
            };

            let selection = clause.list_mode.as_deref().and_then(list_option);
            let is_path = matches!(binding, Binding::Path { .. });
            if is_path && (selection.is_some() || clause.condition.is_some()) {
                let object = self.scope(group, &context).materialize(&binding)?;
                if let Some(element) = group.object_mut(&object) {
                    if selection.is_some() {
                        element.list_option = selection;
                    }
                    if clause.condition.is_some() {
                        element.condition = clause.condition.clone();
                    }
                }
                binding = Binding::Object(object);
            } else if let Some(condition) = &clause.condition {
                conditions.push(condition.clone());
            }

            if let Some(variable) = &clause.variable {
                context.bind(variable, binding.clone());
            }
            if source.is_none() {
                source = Some(SourceBinding {
                    variable: clause.variable.clone(),
                    binding,
                });
            }
        }
        let condition = (!conditions.is_empty()).then(|| conditions.join(" and "));

        let mut declared = HashSet::new();
        for variable in rule.target.iter().filter_map(|t| t.variable.as_deref()) {
            if !declared.insert(variable) {
                return Err(Error::MultiTargetRule {
                    rule: rule_name,
                    variable: variable.to_string(),
                });
            }
        }

        for target in &rule.target {
            self.parse_target(
                group,
                &rule_name,
                source.as_ref(),
                target,
                condition.as_deref(),
                &mut context,
            )?;
        }

        for dependent in &rule.dependent {
            let input = TargetInput {
                rule_name: &rule_name,
                source: source.as_ref(),
                invocation: Invocation::Dependent(dependent),
                condition: condition.as_deref(),
            };
            let handlers = TransformKind::RuleGroup.handlers();
            let outcome = (handlers.parse)(&mut self.scope(group, &context), &input)?;
            merge(group, outcome, &mut context)?;
        }

        for child in &rule.rule {
            self.parse_rule_guarded(group, child, &context);
        }
        Ok(())
    }

    fn parse_target(
        &mut self,
        group: &mut Group,
        rule_name: &str,
        source: Option<&SourceBinding>,
        target: &RuleTarget,
        condition: Option<&str>,
        context: &mut VariableContext,
    ) -> Result<()> {
        let Some(action) = target.transform.as_deref() else {
            if let Some(variable) = &target.variable {
                match self.scope(group, context).target_binding(target)? {
                    Some(binding) => context.bind(variable, binding),
                    None => tracing::debug!("Target variable '{}' has no context", variable),
                }
            }
            return Ok(());
        };

        let alias = copy::alias_of(target).filter(|a| context.get(&a.variable).is_some());
        let rewritten;
        let (kind, target) = match alias {
            Some(alias) => {
                if !alias.path.is_empty() {
                    let binding = context.resolve(&alias.variable)?.descend(&alias.path)?;
                    context.bind(alias.key(), binding);
                }
                rewritten = copy::as_copy(target, &alias);
                (TransformKind::Copy, &rewritten)
            }
            None => (TransformKind::from_action(action), target),
        };

        if !TransformKind::is_known(action) {
            let err = Error::UnknownTransform {
                action: action.to_string(),
            };
            tracing::warn!("{}", err);
            self.diagnostics
                .push(Diagnostic::from_error(&group.name, Some(rule_name), &err));
        }

        let input = TargetInput {
            rule_name,
            source,
            invocation: Invocation::Target(target),
            condition,
        };
        let outcome = (kind.handlers().parse)(&mut self.scope(group, context), &input)?;
        merge(group, outcome, context)
    }
}

fn merge(group: &mut Group, outcome: TargetOutcome, context: &mut VariableContext) -> Result<()> {
    if let Some(object) = outcome.object {
        group.put_object(object)?;
    }
    if let Some(rule) = outcome.rule {
        group.put_rule(rule)?;
    }
    for connection in outcome.connections {
        group.put_connection(connection)?;
    }
    for (name, binding) in outcome.bindings {
        context.bind(name, binding);
    }
    Ok(())
}
