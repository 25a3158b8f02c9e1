//! `copy` and `constant`
//!
//! A copy with one input, one output, no literal and no guard carries no
//! information beyond the edge itself, so it collapses to a direct
//! connection. `evaluate(v, v)` and `evaluate(v, 'v.path')` are the same copy
//! spelled as an expression.

use fmlgraph_core::RuleParameter;
use fmlgraph_core::document::{RuleTarget, TargetParameter};

use super::{ComposeInput, Composed, TargetInput, TargetOutcome, build_rule, default};
use super::{ParseScope, SourceBinding};
use crate::context::ValueRef;
use crate::error::{Error, Result};

/// Variable and field path copied by an `evaluate` alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Variable being read
    pub variable: String,
    /// Dotted path below it, empty for the variable itself
    pub path: String,
}

impl Alias {
    /// Key the aliased value is bound under while parsing
    pub fn key(&self) -> String {
        if self.path.is_empty() {
            self.variable.clone()
        } else {
            format!("{}.{}", self.variable, self.path)
        }
    }
}

/// Recognize `evaluate(v, v)` and `evaluate(v, 'v.path')`
pub fn alias_of(target: &RuleTarget) -> Option<Alias> {
    if target.transform.as_deref() != Some("evaluate") {
        return None;
    }
    let [first, second] = target.parameter.as_slice() else {
        return None;
    };
    let variable = first.value_id.as_deref()?;

    if second.value_id.as_deref() == Some(variable) {
        return Some(Alias {
            variable: variable.to_string(),
            path: String::new(),
        });
    }

    let expression = second.value_string.as_deref()?;
    if expression == variable {
        return Some(Alias {
            variable: variable.to_string(),
            path: String::new(),
        });
    }
    let path = expression.strip_prefix(variable)?.strip_prefix('.')?;
    let simple = path
        .split('.')
        .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    simple.then(|| Alias {
        variable: variable.to_string(),
        path: path.to_string(),
    })
}

/// The `copy` target an alias stands for
pub fn as_copy(target: &RuleTarget, alias: &Alias) -> RuleTarget {
    RuleTarget {
        transform: Some("copy".to_string()),
        parameter: vec![TargetParameter::id(alias.key())],
        ..target.clone()
    }
}

/// Parse a copy, collapsing it to a direct connection when it has exactly
/// one input and one output
///
/// The rule source only feeds a copy written without parameters.
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let target = input.target()?;
    let implicit: Option<&SourceBinding> = if target.parameter.is_empty() {
        input.source
    } else {
        None
    };

    let mut outcome = build_rule(scope, input, "copy", implicit)?;
    let Some(mut rule) = outcome.rule.take() else {
        return Ok(outcome);
    };
    outcome.connections.dedup();

    let incoming: Vec<_> = outcome
        .connections
        .iter()
        .filter(|c| c.target == rule.name)
        .cloned()
        .collect();
    let outgoing: Vec<_> = outcome
        .connections
        .iter()
        .filter(|c| c.source == rule.name)
        .cloned()
        .collect();

    if incoming.len() + outgoing.len() > 2 {
        return Err(Error::unsupported(
            input.rule_name,
            format!(
                "copy with {} inputs and {} outputs",
                incoming.len(),
                outgoing.len()
            ),
        ));
    }

    let literal = has_literal(&rule.parameters);
    if !literal {
        let fed: Vec<_> = incoming
            .iter()
            .map(|c| scope.group.var_ref(&c.source, c.source_field))
            .collect();
        rule.parameters
            .retain(|p| p.as_var().is_none_or(|v| !fed.contains(v)));
    }
    let plain = rule.condition.is_none() && !literal;

    match (incoming.as_slice(), outgoing.as_slice()) {
        ([from], [to]) if plain => {
            tracing::debug!("Collapsing copy '{}' into a direct connection", rule.name);
            outcome.connections = vec![fmlgraph_core::Connection::new(
                &from.source,
                from.source_field,
                &to.target,
                to.target_field,
            )];
        }
        ([_], []) if plain => {
            rule.action = "constant".to_string();
            outcome.rule = Some(rule);
        }
        _ => outcome.rule = Some(rule),
    }
    Ok(outcome)
}

fn has_literal(parameters: &[RuleParameter]) -> bool {
    parameters.iter().any(|p| matches!(p, RuleParameter::Const(_)))
}

/// Compose a copy (or constant) as `evaluate` over its single input, or as
/// `copy` of its parameters when it has a literal or no input
pub fn compose(input: &ComposeInput<'_>) -> Result<Composed> {
    let from = input.incoming().into_iter().next();
    let Some(from) = from.filter(|_| !has_literal(&input.rule.parameters)) else {
        let mut composed = default::compose(input)?;
        if let Some(target) = &mut composed.target {
            target.transform = Some("copy".to_string());
        }
        return Ok(composed);
    };

    let var = input.group.var_ref(&from.source, from.source_field);
    let parameter = match input.variables.value_of(&var) {
        Some(ValueRef::Var(name)) => vec![TargetParameter::id(&name), TargetParameter::id(name)],
        Some(ValueRef::Path { var, expression }) => {
            vec![TargetParameter::id(var), TargetParameter::string(expression)]
        }
        None => vec![input.parameter(&RuleParameter::Var(var))],
    };

    Ok(Composed {
        target: Some(RuleTarget {
            transform: Some("evaluate".to_string()),
            parameter,
            ..Default::default()
        }),
        dependent: None,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Invocation, TargetInput};
    use super::*;
    use crate::context::{Binding, VariableMap};
    use fmlgraph_core::{Connection, MapGraph, Rule, VarRef};
    use rstest::rstest;

    fn evaluate(params: Vec<TargetParameter>) -> RuleTarget {
        target("evaluate", params)
    }

    #[rstest]
    #[case(vec![TargetParameter::id("v"), TargetParameter::id("v")], Some(("v", "")))]
    #[case(vec![TargetParameter::id("v"), TargetParameter::string("v")], Some(("v", "")))]
    #[case(vec![TargetParameter::id("v"), TargetParameter::string("v.id")], Some(("v", "id")))]
    #[case(vec![TargetParameter::id("v"), TargetParameter::string("v.a.b")], Some(("v", "a.b")))]
    #[case(vec![TargetParameter::id("v"), TargetParameter::string("v.a + 1")], None)]
    #[case(vec![TargetParameter::id("v"), TargetParameter::string("w.a")], None)]
    #[case(vec![TargetParameter::id("v")], None)]
    fn test_alias_of(#[case] params: Vec<TargetParameter>, #[case] expected: Option<(&str, &str)>) {
        let alias = alias_of(&evaluate(params));
        assert_eq!(
            alias.map(|a| (a.variable, a.path)),
            expected.map(|(v, p)| (v.to_string(), p.to_string()))
        );
    }

    #[test]
    fn test_copy_collapses_to_connection() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let target = target("copy", vec![TargetParameter::id("a")]);
        let source = source();

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: Some(&source),
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap();

        assert!(outcome.rule.is_none());
        assert_eq!(
            outcome.connections,
            vec![Connection::new("src", Some(0), "tgt", Some(0))]
        );
    }

    #[test]
    fn test_copy_without_output_becomes_constant() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let mut target = target("copy", vec![TargetParameter::id("a")]);
        target.context = None;
        target.element = None;
        target.variable = Some("v".to_string());

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: None,
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap();

        let rule = outcome.rule.unwrap();
        assert_eq!(rule.action, "constant");
        assert!(rule.parameters.is_empty());
        assert_eq!(outcome.bindings, vec![("v".to_string(), Binding::Rule(rule.name))]);
    }

    #[test]
    fn test_copy_of_literal_keeps_rule() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let target = target("copy", vec![TargetParameter::string("fixed")]);

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: None,
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap();

        let rule = outcome.rule.unwrap();
        assert_eq!(rule.action, "copy");
        assert_eq!(rule.parameters, vec![RuleParameter::Const(serde_json::json!("fixed"))]);
        assert_eq!(outcome.connections.len(), 1);
    }

    #[test]
    fn test_copy_of_literal_ignores_rule_source() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let target = target("copy", vec![TargetParameter::string("final")]);
        let source = source();

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: Some(&source),
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap();

        let rule = outcome.rule.unwrap();
        assert_eq!(rule.action, "copy");
        assert_eq!(rule.parameters, vec![RuleParameter::Const(serde_json::json!("final"))]);
        assert_eq!(
            outcome.connections,
            vec![Connection::new("r_1", None, "tgt", Some(0))]
        );
    }

    #[test]
    fn test_guarded_copy_keeps_rule() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let target = target("copy", vec![TargetParameter::id("a")]);

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: None,
                    invocation: Invocation::Target(&target),
                    condition: Some("src.b = 'x'"),
                },
            )
        })
        .unwrap();

        let rule = outcome.rule.unwrap();
        assert_eq!(rule.action, "copy");
        assert_eq!(rule.condition.as_deref(), Some("src.b = 'x'"));
        assert!(rule.parameters.is_empty());
        assert_eq!(
            outcome.connections,
            vec![
                Connection::new("src", Some(0), "r_1", None),
                Connection::new("r_1", None, "tgt", Some(0)),
            ]
        );
    }

    #[test]
    fn test_copy_with_literal_and_variable_keeps_both() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let ctx = context();
        let mut target = target("copy", vec![TargetParameter::id("a"), TargetParameter::string("x")]);
        target.context = None;
        target.element = None;

        let outcome = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: None,
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap();

        let rule = outcome.rule.unwrap();
        assert_eq!(rule.action, "copy");
        assert_eq!(rule.parameters.len(), 2);
    }

    #[test]
    fn test_copy_with_two_inputs_is_unsupported() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let mut ctx = context();
        ctx.bind(
            "b",
            Binding::Path {
                object: "src".to_string(),
                path: vec!["b".to_string()],
            },
        );
        let target = target("copy", vec![TargetParameter::id("a"), TargetParameter::id("b")]);

        let err = with_scope(&catalog, &mut group, &ctx, |scope| {
            parse(
                scope,
                &TargetInput {
                    rule_name: "r",
                    source: None,
                    invocation: Invocation::Target(&target),
                    condition: None,
                },
            )
        })
        .unwrap_err();

        assert!(matches!(err, Error::UnsupportedShape { .. }));
    }

    #[test]
    fn test_compose_uses_bound_variable_twice() {
        let catalog = catalog();
        let mut group = group(&catalog);
        group.put_rule(Rule::new("r", "copy")).unwrap();
        group
            .put_connection(Connection::new("src", Some(0), "r", None))
            .unwrap();
        let graph = MapGraph::new();
        let mut vars = VariableMap::new();
        vars.bind(VarRef::field("src", "a"), "x");

        let composed = compose(&ComposeInput {
            rule: group.rule("r").unwrap(),
            group: &group,
            graph: &graph,
            variables: &vars,
            context_object: None,
        })
        .unwrap();

        let target = composed.target.unwrap();
        assert_eq!(target.transform.as_deref(), Some("evaluate"));
        assert_eq!(target.parameter, vec![TargetParameter::id("x"), TargetParameter::id("x")]);
    }

    #[test]
    fn test_compose_literal_as_copy() {
        let catalog = catalog();
        let mut group = group(&catalog);
        let mut rule = Rule::new("r", "copy");
        rule.parameters = vec![RuleParameter::Const(serde_json::json!("final"))];
        group.put_rule(rule).unwrap();
        group
            .put_connection(Connection::new("src", Some(0), "r", None))
            .unwrap();
        let graph = MapGraph::new();
        let vars = VariableMap::new();

        let composed = compose(&ComposeInput {
            rule: group.rule("r").unwrap(),
            group: &group,
            graph: &graph,
            variables: &vars,
            context_object: None,
        })
        .unwrap();

        let target = composed.target.unwrap();
        assert_eq!(target.transform.as_deref(), Some("copy"));
        assert_eq!(target.parameter, vec![TargetParameter::string("final")]);
    }
}
