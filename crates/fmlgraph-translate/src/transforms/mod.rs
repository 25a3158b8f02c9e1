//! Per-transform translation handlers
//!
//! Every transform kind has a parse handler (one rule-tree target → graph
//! fragment) and a compose handler (one graph rule → rule-tree target). The
//! drivers in [`crate::parser`] and [`crate::composer`] look both up through
//! [`TransformKind::handlers`].

pub mod append;
pub mod copy;
pub mod create;
pub mod default;
pub mod rule_group;
pub mod translate;
pub mod uuid;

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use fmlgraph_core::document::{Dependent, InputMode, RuleTarget, TargetParameter};
use fmlgraph_core::{Connection, Group, MapGraph, Rule, RuleParameter, SchemaCatalog, SchemaObject, VarRef};

use crate::context::{Binding, Sequence, ValueRef, VariableContext, VariableMap};
use crate::error::{Error, Result};

/// Action name of rules standing for a group invocation
pub const RULE_GROUP_ACTION: &str = "rule-group";

/// Actions handled by the default handler without a diagnostic
pub const DEFAULT_ACTIONS: &[&str] = &[
    "evaluate", "truncate", "cc", "c", "qty", "id", "cp", "escape", "dateOp", "reference",
    "pointer", "cast",
];

/// Transform families with their own handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Value copy; collapses to a direct connection when possible
    Copy,
    /// Copy with no consumer
    Constant,
    /// New object instance
    Create,
    /// Concatenation of several inputs
    Append,
    /// Fresh identifier
    Uuid,
    /// ConceptMap lookup
    Translate,
    /// Invocation of another group
    RuleGroup,
    /// Everything else
    Default,
}

/// Parse handler: one target or dependent → graph fragment
pub type ParseFn = fn(&mut ParseScope<'_>, &TargetInput<'_>) -> Result<TargetOutcome>;

/// Compose handler: one rule → target clause or dependent
pub type ComposeFn = fn(&ComposeInput<'_>) -> Result<Composed>;

/// Both handlers of a transform kind
#[derive(Debug, Clone, Copy)]
pub struct Handlers {
    /// Tree → graph
    pub parse: ParseFn,
    /// Graph → tree
    pub compose: ComposeFn,
}

const HANDLERS: &[(TransformKind, Handlers)] = &[
    (
        TransformKind::Copy,
        Handlers {
            parse: copy::parse,
            compose: copy::compose,
        },
    ),
    (
        TransformKind::Constant,
        Handlers {
            parse: default::parse,
            compose: copy::compose,
        },
    ),
    (
        TransformKind::Create,
        Handlers {
            parse: create::parse,
            compose: default::compose,
        },
    ),
    (
        TransformKind::Append,
        Handlers {
            parse: append::parse,
            compose: default::compose,
        },
    ),
    (
        TransformKind::Uuid,
        Handlers {
            parse: uuid::parse,
            compose: default::compose,
        },
    ),
    (
        TransformKind::Translate,
        Handlers {
            parse: translate::parse,
            compose: translate::compose,
        },
    ),
    (
        TransformKind::RuleGroup,
        Handlers {
            parse: rule_group::parse,
            compose: rule_group::compose,
        },
    ),
];

const DEFAULT_HANDLERS: Handlers = Handlers {
    parse: default::parse,
    compose: default::compose,
};

impl TransformKind {
    /// Kind handling `action`; unknown actions map to [`TransformKind::Default`]
    pub fn from_action(action: &str) -> Self {
        match action {
            "copy" => Self::Copy,
            "constant" => Self::Constant,
            "create" => Self::Create,
            "append" => Self::Append,
            "uuid" => Self::Uuid,
            "translate" => Self::Translate,
            RULE_GROUP_ACTION => Self::RuleGroup,
            _ => Self::Default,
        }
    }

    /// Whether `action` is handled without falling back
    pub fn is_known(action: &str) -> bool {
        Self::from_action(action) != Self::Default || DEFAULT_ACTIONS.contains(&action)
    }

    /// Handlers registered for this kind
    pub fn handlers(self) -> Handlers {
        HANDLERS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, handlers)| *handlers)
            .unwrap_or(DEFAULT_HANDLERS)
    }
}

/// Mutable state shared by the parse handlers of one group
pub struct ParseScope<'a> {
    /// Group under construction
    pub group: &'a mut Group,
    /// Schema lookups
    pub catalog: &'a SchemaCatalog,
    /// Document structure aliases
    pub aliases: &'a HashMap<String, String>,
    /// Variables visible to the current rule
    pub context: &'a VariableContext,
    /// Rule name counter
    pub sequence: &'a mut Sequence,
    /// Input modes of every group in the document, by group name
    pub group_inputs: &'a HashMap<String, Vec<InputMode>>,
    /// Ids of contained ConceptMaps
    pub concept_maps: &'a HashSet<String>,
}

/// Graph endpoint: a node and optionally one of its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Node name
    pub node: String,
    /// Field index on objects
    pub field: Option<usize>,
}

/// A tree parameter after variable resolution
#[derive(Debug, Clone)]
pub struct ResolvedParam {
    /// Graph parameter
    pub param: RuleParameter,
    /// Endpoint the value comes from, for bound variables
    pub endpoint: Option<Endpoint>,
    /// Variable name, for `valueId` parameters
    pub variable: Option<String>,
}

impl ParseScope<'_> {
    /// Graph endpoint of a binding, drilling into intermediate fields
    pub fn endpoint(&mut self, binding: &Binding) -> Result<Endpoint> {
        match binding {
            Binding::Object(object) => {
                if self.group.object(object).is_none() {
                    return Err(Error::unresolved(object.as_str()));
                }
                Ok(Endpoint {
                    node: object.clone(),
                    field: None,
                })
            }
            Binding::Rule(rule) => Ok(Endpoint {
                node: rule.clone(),
                field: None,
            }),
            Binding::Path { object, path } => {
                let Some((last, parents)) = path.split_last() else {
                    return self.endpoint(&Binding::Object(object.clone()));
                };
                let mut current = object.clone();
                for segment in parents {
                    current = self.group.drill_down(&current, segment, self.catalog)?;
                }
                let field = self.group.resolve_field(&current, last)?;
                Ok(Endpoint {
                    node: current,
                    field: Some(field),
                })
            }
        }
    }

    /// Element object standing for a whole binding
    pub fn materialize(&mut self, binding: &Binding) -> Result<String> {
        match binding {
            Binding::Object(object) | Binding::Rule(object) => Ok(object.clone()),
            Binding::Path { object, path } => {
                let mut current = object.clone();
                for segment in path {
                    current = self.group.drill_down(&current, segment, self.catalog)?;
                }
                Ok(current)
            }
        }
    }

    /// Endpoint of a named variable
    pub fn variable_endpoint(&mut self, name: &str) -> Result<Endpoint> {
        let binding = self.context.resolve(name)?.clone();
        self.endpoint(&binding)
    }

    /// Endpoint written by a target clause, `None` when it has no context
    pub fn target_endpoint(&mut self, target: &RuleTarget) -> Result<Option<Endpoint>> {
        match self.target_binding(target)? {
            Some(binding) => self.endpoint(&binding).map(Some),
            None => Ok(None),
        }
    }

    /// Binding written by a target clause, `None` when it has no context
    pub fn target_binding(&self, target: &RuleTarget) -> Result<Option<Binding>> {
        let Some(context) = &target.context else {
            return Ok(None);
        };
        let base = self.context.resolve(context)?;
        match &target.element {
            Some(element) => base.child(element).map(Some),
            None => Ok(Some(base.clone())),
        }
    }

    /// Resolve one tree parameter
    pub fn parameter(&mut self, param: &TargetParameter) -> Result<ResolvedParam> {
        let Some(id) = &param.value_id else {
            return Ok(ResolvedParam {
                param: RuleParameter::Const(param.literal_value().unwrap_or(Value::Null)),
                endpoint: None,
                variable: None,
            });
        };

        match self.context.get(id).cloned() {
            Some(binding) => {
                let endpoint = self.endpoint(&binding)?;
                let var = self.group.var_ref(&endpoint.node, endpoint.field);
                Ok(ResolvedParam {
                    param: RuleParameter::Var(var),
                    endpoint: Some(endpoint),
                    variable: Some(id.clone()),
                })
            }
            None => {
                tracing::debug!("Passing unbound variable '{}' through", id);
                Ok(ResolvedParam {
                    param: RuleParameter::Var(VarRef::node(id)),
                    endpoint: None,
                    variable: Some(id.clone()),
                })
            }
        }
    }

    /// Fresh rule name derived from the tree rule's name
    pub fn rule_name(&mut self, base: &str) -> String {
        let base = fmlgraph_core::graph::sanitize_name(base);
        loop {
            let candidate = format!("{base}_{}", self.sequence.next_value());
            if !self.group.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Create a fresh object from a schema identifier, detached when unknown
    pub fn schema_object(&self, identifier: &str, name: &str, mode: fmlgraph_core::ObjectMode) -> SchemaObject {
        self.catalog
            .resolve_with(identifier, self.aliases)
            .and_then(|resolved| SchemaObject::new(self.catalog, &resolved.id, name, mode))
            .unwrap_or_else(|err| {
                tracing::debug!("Using detached object for '{}': {}", identifier, err);
                SchemaObject::detached(identifier, name, mode)
            })
    }
}

/// First source binding of the rule a target belongs to
#[derive(Debug, Clone)]
pub struct SourceBinding {
    /// Source variable, if declared
    pub variable: Option<String>,
    /// What the source denotes
    pub binding: Binding,
}

/// What a parse handler is asked to translate
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'a> {
    /// A target clause
    Target(&'a RuleTarget),
    /// A group invocation
    Dependent(&'a Dependent),
}

/// Input of a parse handler
#[derive(Debug, Clone, Copy)]
pub struct TargetInput<'a> {
    /// Name of the tree rule
    pub rule_name: &'a str,
    /// First source of the tree rule
    pub source: Option<&'a SourceBinding>,
    /// Clause being translated
    pub invocation: Invocation<'a>,
    /// Rule-level guard
    pub condition: Option<&'a str>,
}

impl<'a> TargetInput<'a> {
    /// The target clause; dependents are only valid for rule-group handlers
    pub fn target(&self) -> Result<&'a RuleTarget> {
        match self.invocation {
            Invocation::Target(target) => Ok(target),
            Invocation::Dependent(dependent) => Err(Error::unsupported(
                self.rule_name,
                format!("dependent '{}' is not a target", dependent.name),
            )),
        }
    }
}

/// Graph fragment produced by a parse handler
#[derive(Debug, Clone, Default)]
pub struct TargetOutcome {
    /// New object
    pub object: Option<SchemaObject>,
    /// New rule
    pub rule: Option<Rule>,
    /// New connections, added after the object and the rule
    pub connections: Vec<Connection>,
    /// Variables to bind in the rule's scope
    pub bindings: Vec<(String, Binding)>,
}

/// Build a rule the common way: parameters in order, an incoming connection
/// per bound variable, the rule source as implicit input, and one outgoing
/// connection to the target.
pub(crate) fn build_rule(
    scope: &mut ParseScope<'_>,
    input: &TargetInput<'_>,
    action: &str,
    implicit_source: Option<&SourceBinding>,
) -> Result<TargetOutcome> {
    let target = input.target()?;
    let name = scope.rule_name(input.rule_name);
    let mut rule = Rule::new(&name, action);
    rule.condition = input.condition.map(str::to_string);

    let mut outcome = TargetOutcome::default();
    let mut variables = Vec::new();
    for param in &target.parameter {
        let resolved = scope.parameter(param)?;
        if let Some(ep) = &resolved.endpoint {
            outcome
                .connections
                .push(Connection::new(&ep.node, ep.field, &name, None));
        }
        variables.extend(resolved.variable);
        rule.parameters.push(resolved.param);
    }

    if let Some(source) = implicit_source {
        let in_params = source
            .variable
            .as_ref()
            .is_some_and(|v| variables.contains(v));
        if !in_params {
            let ep = scope.endpoint(&source.binding)?;
            outcome
                .connections
                .push(Connection::new(&ep.node, ep.field, &name, None));
        }
    }

    bind_output(scope, target, &name, &mut outcome)?;
    outcome.rule = Some(rule);
    Ok(outcome)
}

/// Connect a rule to its target endpoint and bind the target variable
pub(crate) fn bind_output(
    scope: &mut ParseScope<'_>,
    target: &RuleTarget,
    rule: &str,
    outcome: &mut TargetOutcome,
) -> Result<()> {
    let binding = scope.target_binding(target)?;
    if let Some(binding) = &binding {
        let ep = scope.endpoint(binding)?;
        outcome
            .connections
            .push(Connection::new(rule, None, &ep.node, ep.field));
    }
    if let Some(variable) = &target.variable {
        let bound = binding.unwrap_or_else(|| Binding::Rule(rule.to_string()));
        outcome.bindings.push((variable.clone(), bound));
    }
    Ok(())
}

/// Input of a compose handler
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    /// Rule being composed
    pub rule: &'a Rule,
    /// Sub-group the rule is composed from
    pub group: &'a Group,
    /// Whole graph (for concept maps)
    pub graph: &'a MapGraph,
    /// Variables declared so far
    pub variables: &'a VariableMap,
    /// Last object visited before the rule
    pub context_object: Option<&'a SchemaObject>,
}

impl ComposeInput<'_> {
    /// Connections feeding the rule
    pub fn incoming(&self) -> Vec<&Connection> {
        self.group.sources(&self.rule.name, None)
    }

    /// Tree parameter for a graph parameter
    pub fn parameter(&self, param: &RuleParameter) -> TargetParameter {
        match param {
            RuleParameter::Const(value) => TargetParameter::literal(value),
            RuleParameter::Var(var) => match self.variables.value_of(var) {
                Some(ValueRef::Var(name)) => TargetParameter::id(name),
                Some(ValueRef::Path { expression, .. }) => TargetParameter::string(expression),
                None => TargetParameter::id(var.to_string()),
            },
        }
    }
}

/// Output of a compose handler
#[derive(Debug, Clone, Default)]
pub struct Composed {
    /// Target clause without context, element, or variable
    pub target: Option<RuleTarget>,
    /// Group invocation
    pub dependent: Option<Dependent>,
}
