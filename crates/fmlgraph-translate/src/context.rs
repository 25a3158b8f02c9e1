//! Variable scopes for both translation directions
//!
//! Parsing tracks what each rule-tree variable denotes in the graph
//! ([`VariableContext`]). Composing goes the other way: graph endpoints get
//! short generated names ([`NameAllocator`]) recorded in a [`VariableMap`].

use std::collections::{HashMap, HashSet};

use fmlgraph_core::VarRef;

use crate::error::{Error, Result};

/// What a rule-tree variable stands for in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A whole object
    Object(String),
    /// A field path below an object
    Path {
        /// Object the path starts at
        object: String,
        /// Field names, outermost first
        path: Vec<String>,
    },
    /// The output of a rule
    Rule(String),
}

impl Binding {
    /// Binding one field further down
    pub fn child(&self, element: &str) -> Result<Binding> {
        match self {
            Self::Object(object) => Ok(Self::Path {
                object: object.clone(),
                path: vec![element.to_string()],
            }),
            Self::Path { object, path } => {
                let mut path = path.clone();
                path.push(element.to_string());
                Ok(Self::Path {
                    object: object.clone(),
                    path,
                })
            }
            Self::Rule(rule) => Err(Error::unresolved(format!("{rule}.{element}"))),
        }
    }

    /// Binding reached by a dotted field path (`a.b.c`)
    pub fn descend(&self, dotted: &str) -> Result<Binding> {
        dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .try_fold(self.clone(), |binding, element| binding.child(element))
    }
}

/// Variables visible to one rule, inherited by its nested rules
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    vars: HashMap<String, Binding>,
}

impl VariableContext {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) a variable
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.vars.insert(name.into(), binding);
    }

    /// Binding of a variable, if any
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.vars.get(name)
    }

    /// Binding of a variable, failing when unbound
    pub fn resolve(&self, name: &str) -> Result<&Binding> {
        self.get(name).ok_or_else(|| Error::unresolved(name))
    }
}

/// Monotonic counter behind generated rule names
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    last: u32,
}

impl Sequence {
    /// Create a counter starting at 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value
    pub fn next_value(&mut self) -> u32 {
        self.last += 1;
        self.last
    }
}

/// Generator of `a`, `b`, ..., `z`, `aa`, `ab`, ... variable names
#[derive(Debug, Clone, Default)]
pub struct NameAllocator {
    index: usize,
    reserved: HashSet<String>,
}

impl NameAllocator {
    /// Create an allocator that never yields a reserved name
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: 0,
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Next free name
    pub fn next_name(&mut self) -> String {
        loop {
            let name = letters(self.index);
            self.index += 1;
            if !self.reserved.contains(&name) {
                return name;
            }
        }
    }
}

/// Bijective base-26 spelling of `index` (0 → `a`, 25 → `z`, 26 → `aa`)
fn letters(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// How a composed rule can refer to a graph value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueRef {
    /// A variable holding the value
    Var(String),
    /// A field of a variable, written as a FHIRPath expression
    Path {
        /// Variable holding the object
        var: String,
        /// `var.field` expression
        expression: String,
    },
}

/// Variables declared so far while composing one group
#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    names: HashMap<VarRef, String>,
}

impl VariableMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the variable holding `var`
    pub fn bind(&mut self, var: VarRef, name: impl Into<String>) {
        self.names.insert(var, name.into());
    }

    /// Variable holding exactly `var`
    pub fn get(&self, var: &VarRef) -> Option<&str> {
        self.names.get(var).map(String::as_str)
    }

    /// Variable for `var`, falling back to a path below its whole object
    pub fn value_of(&self, var: &VarRef) -> Option<ValueRef> {
        if let Some(name) = self.get(var) {
            return Some(ValueRef::Var(name.to_string()));
        }
        let field = var.field.as_deref()?;
        let object = self.get(&VarRef::node(&var.node))?;
        Some(ValueRef::Path {
            var: object.to_string(),
            expression: format!("{object}.{field}"),
        })
    }
}
