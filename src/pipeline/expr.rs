//! Expression tree for compiled query pipelines
//!
//! Expressions are evaluated against one record at a time. `Root` is the
//! record; `Var` names an element bound by an enclosing `Filter` or `Map`.
//! Templates are built with `Placeholder` leaves and completed by
//! substituting other expressions into them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value test applied to every candidate at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Test {
    /// Some candidate equals one of the values
    In(Vec<Value>),
    /// No candidate equals any of the values
    NotIn(Vec<Value>),
    /// Some string candidate matches the case-insensitive pattern
    Pattern(String),
    /// No string candidate matches the case-insensitive pattern
    NotPattern(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// The record being evaluated
    Root,
    /// An element bound by an enclosing `Filter` or `Map`
    Var(String),
    /// Dotted access below another expression
    Path(Box<Expr>, String),
    /// A literal value
    Literal(Value),
    /// Applies a value test
    Test(Box<Expr>, Test),
    /// True when every operand is truthy. Empty is true.
    And(Vec<Expr>),
    /// Negation
    Not(Box<Expr>),
    /// True when the operand is a non-empty array
    NonEmpty(Box<Expr>),
    /// Magnitude of a number, null otherwise
    Abs(Box<Expr>),
    /// Keeps the elements of `input` for which `cond` holds
    Filter {
        input: Box<Expr>,
        bind: String,
        cond: Box<Expr>,
    },
    /// Replaces each element of `input` with `body`
    Map {
        input: Box<Expr>,
        bind: String,
        body: Box<Expr>,
    },
    /// Copy of `base` with `field` replaced by `value`
    With {
        base: Box<Expr>,
        field: String,
        value: Box<Expr>,
    },
    /// A hole to be filled by [`Expr::substitute`]
    Placeholder(String),
}

impl Expr {
    /// Field of the record
    pub fn field(path: impl Into<String>) -> Self {
        Self::at(Expr::Root, path)
    }

    /// Field of a bound element. An empty path is the element itself.
    pub fn var_field(var: &str, path: &str) -> Self {
        Self::at(Expr::Var(var.to_string()), path)
    }

    /// Dotted access below `base`. An empty path is `base` itself.
    pub fn at(base: Expr, path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            base
        } else {
            Expr::Path(Box::new(base), path)
        }
    }

    pub fn test(subject: Expr, test: Test) -> Self {
        Expr::Test(Box::new(subject), test)
    }

    /// Conjunction, collapsing single operands
    pub fn and(mut operands: Vec<Expr>) -> Self {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        }
    }

    pub fn non_empty(expr: Expr) -> Self {
        Expr::NonEmpty(Box::new(expr))
    }

    pub fn placeholder(name: &str) -> Self {
        Expr::Placeholder(name.to_string())
    }

    /// Rebuilds the tree bottom-up, passing every node through `f`
    /// after its children have been rewritten.
    pub fn rewrite<F>(self, f: &mut F) -> Expr
    where
        F: FnMut(Expr) -> Expr,
    {
        let rebuilt = match self {
            Expr::Path(base, path) => Expr::Path(Box::new(base.rewrite(f)), path),
            Expr::Test(subject, test) => Expr::Test(Box::new(subject.rewrite(f)), test),
            Expr::And(operands) => {
                Expr::And(operands.into_iter().map(|e| e.rewrite(f)).collect())
            }
            Expr::Not(inner) => Expr::Not(Box::new(inner.rewrite(f))),
            Expr::NonEmpty(inner) => Expr::NonEmpty(Box::new(inner.rewrite(f))),
            Expr::Abs(inner) => Expr::Abs(Box::new(inner.rewrite(f))),
            Expr::Filter { input, bind, cond } => Expr::Filter {
                input: Box::new(input.rewrite(f)),
                bind,
                cond: Box::new(cond.rewrite(f)),
            },
            Expr::Map { input, bind, body } => Expr::Map {
                input: Box::new(input.rewrite(f)),
                bind,
                body: Box::new(body.rewrite(f)),
            },
            Expr::With { base, field, value } => Expr::With {
                base: Box::new(base.rewrite(f)),
                field,
                value: Box::new(value.rewrite(f)),
            },
            leaf @ (Expr::Root
            | Expr::Var(_)
            | Expr::Literal(_)
            | Expr::Placeholder(_)) => leaf,
        };
        f(rebuilt)
    }

    /// Replaces every `Placeholder(name)` with `replacement`.
    pub fn substitute(self, name: &str, replacement: &Expr) -> Expr {
        self.rewrite(&mut |node| match node {
            Expr::Placeholder(ref hole) if hole == name => replacement.clone(),
            other => other,
        })
    }

    /// Names of placeholders still present in the tree
    pub fn placeholders(&self) -> Vec<String> {
        let mut found = Vec::new();
        self.clone().rewrite(&mut |node| {
            if let Expr::Placeholder(ref name) = node {
                found.push(name.clone());
            }
            node
        });
        found
    }
}
