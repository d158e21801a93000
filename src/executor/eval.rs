//! Expression evaluation
//!
//! Evaluates compiled expressions against one record. Missing fields
//! evaluate to `null`; tests look at every candidate on a path, fanning
//! out through arrays.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Number, Value};

use super::errors::{ExecutorError, ExecutorResult};
use crate::document::{self, values_equal};
use crate::pipeline::{Expr, Test};
use crate::query::compile_pattern;

/// Evaluates expressions, caching compiled text patterns.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    patterns: HashMap<String, Regex>,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `expr` with `root` as the record.
    pub fn eval(&mut self, expr: &Expr, root: &Value) -> ExecutorResult<Value> {
        let mut vars = Vec::new();
        self.eval_in(expr, root, &mut vars)
    }

    /// Evaluates `expr` and reports whether the result is truthy.
    pub fn matches(&mut self, expr: &Expr, root: &Value) -> ExecutorResult<bool> {
        Ok(is_truthy(&self.eval(expr, root)?))
    }

    fn eval_in(
        &mut self,
        expr: &Expr,
        root: &Value,
        vars: &mut Vec<(String, Value)>,
    ) -> ExecutorResult<Value> {
        match expr {
            Expr::Root => Ok(root.clone()),
            Expr::Var(name) => vars
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ExecutorError::UnboundVariable(name.clone())),
            Expr::Path(base, path) => {
                let base = self.eval_in(base, root, vars)?;
                Ok(document::project(&base, path))
            }
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Test(subject, test) => {
                let subject = self.eval_in(subject, root, vars)?;
                Ok(Value::Bool(self.apply_test(&subject, test)?))
            }
            Expr::And(operands) => {
                for operand in operands {
                    if !is_truthy(&self.eval_in(operand, root, vars)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&self.eval_in(inner, root, vars)?))),
            Expr::NonEmpty(inner) => {
                let value = self.eval_in(inner, root, vars)?;
                Ok(Value::Bool(matches!(value, Value::Array(ref items) if !items.is_empty())))
            }
            Expr::Abs(inner) => Ok(magnitude(&self.eval_in(inner, root, vars)?)),
            Expr::Filter { input, bind, cond } => {
                let Value::Array(items) = self.eval_in(input, root, vars)? else {
                    return Ok(Value::Null);
                };
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    vars.push((bind.clone(), item));
                    let keep = self.eval_in(cond, root, vars).map(|v| is_truthy(&v));
                    let (_, item) = vars.pop().unwrap_or_default();
                    if keep? {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            Expr::Map { input, bind, body } => {
                let Value::Array(items) = self.eval_in(input, root, vars)? else {
                    return Ok(Value::Null);
                };
                let mut mapped = Vec::with_capacity(items.len());
                for item in items {
                    vars.push((bind.clone(), item));
                    let result = self.eval_in(body, root, vars);
                    vars.pop();
                    mapped.push(result?);
                }
                Ok(Value::Array(mapped))
            }
            Expr::With { base, field, value } => {
                let mut copy = self.eval_in(base, root, vars)?;
                let value = self.eval_in(value, root, vars)?;
                document::set_path(&mut copy, field, value);
                Ok(copy)
            }
            Expr::Placeholder(name) => Err(ExecutorError::UnfilledPlaceholder(name.clone())),
        }
    }

    fn apply_test(&mut self, subject: &Value, test: &Test) -> ExecutorResult<bool> {
        let candidates = document::candidates(subject);
        match test {
            Test::In(values) => Ok(contains_any(&candidates, values)),
            Test::NotIn(values) => Ok(!contains_any(&candidates, values)),
            Test::Pattern(pattern) => self.any_text_matches(&candidates, pattern),
            Test::NotPattern(pattern) => Ok(!self.any_text_matches(&candidates, pattern)?),
        }
    }

    fn any_text_matches(&mut self, candidates: &[&Value], pattern: &str) -> ExecutorResult<bool> {
        let regex = self.pattern(pattern)?;
        Ok(candidates
            .iter()
            .filter_map(|c| c.as_str())
            .any(|text| regex.is_match(text)))
    }

    fn pattern(&mut self, pattern: &str) -> ExecutorResult<&Regex> {
        if !self.patterns.contains_key(pattern) {
            let regex = compile_pattern(pattern).map_err(|e| ExecutorError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            self.patterns.insert(pattern.to_string(), regex);
        }
        self.patterns
            .get(pattern)
            .ok_or_else(|| ExecutorError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern cache miss".to_string(),
            })
    }
}

fn contains_any(candidates: &[&Value], values: &[Value]) -> bool {
    candidates
        .iter()
        .any(|c| values.iter().any(|v| values_equal(c, v)))
}

/// `null`, `false` and zero are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Magnitude of a number; `null` for anything else.
pub fn magnitude(value: &Value) -> Value {
    let Value::Number(n) = value else {
        return Value::Null;
    };
    if let Some(i) = n.as_i64() {
        if let Some(abs) = i.checked_abs() {
            return Value::Number(abs.into());
        }
    }
    if n.is_u64() {
        return value.clone();
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(f.abs()))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &Expr, doc: &Value) -> Value {
        ExprEvaluator::new().eval(expr, doc).unwrap()
    }

    #[test]
    fn test_in_and_not_in() {
        let doc = json!({"status": "OPEN", "qty": 2});
        let open = Expr::test(Expr::field("status"), Test::In(vec![json!("OPEN")]));
        let not_open = Expr::test(Expr::field("status"), Test::NotIn(vec![json!("OPEN")]));
        let qty = Expr::test(Expr::field("qty"), Test::In(vec![json!(2.0)]));

        assert_eq!(eval(&open, &doc), json!(true));
        assert_eq!(eval(&not_open, &doc), json!(false));
        assert_eq!(eval(&qty, &doc), json!(true));
    }

    #[test]
    fn test_missing_field_is_null() {
        let doc = json!({});
        let in_null = Expr::test(Expr::field("x"), Test::In(vec![Value::Null]));
        let not_in = Expr::test(Expr::field("x"), Test::NotIn(vec![json!(1)]));
        assert_eq!(eval(&in_null, &doc), json!(true));
        assert_eq!(eval(&not_in, &doc), json!(true));
    }

    #[test]
    fn test_membership_fans_out_through_arrays() {
        let doc = json!({"legs": [{"side": "SELL"}, {"side": "BUY"}]});
        let buy = Expr::test(Expr::field("legs.side"), Test::In(vec![json!("BUY")]));
        assert_eq!(eval(&buy, &doc), json!(true));
    }

    #[test]
    fn test_patterns_only_match_strings() {
        let doc = json!({"name": "Alpha", "n": 12});
        let name = Expr::test(Expr::field("name"), Test::Pattern("^al".into()));
        let number = Expr::test(Expr::field("n"), Test::Pattern("12".into()));
        let negated = Expr::test(Expr::field("n"), Test::NotPattern("12".into()));

        assert_eq!(eval(&name, &doc), json!(true));
        assert_eq!(eval(&number, &doc), json!(false));
        assert_eq!(eval(&negated, &doc), json!(true));
    }

    #[test]
    fn test_filter_map_with() {
        let doc = json!({"legs": [
            {"side": "BUY", "fills": [{"v": "X"}, {"v": "Y"}]},
            {"side": "SELL", "fills": [{"v": "Y"}]}
        ]});

        let inner = Expr::Filter {
            input: Box::new(Expr::var_field("e0", "fills")),
            bind: "e1".into(),
            cond: Box::new(Expr::test(Expr::var_field("e1", "v"), Test::In(vec![json!("X")]))),
        };
        let expr = Expr::Filter {
            input: Box::new(Expr::Map {
                input: Box::new(Expr::field("legs")),
                bind: "e0".into(),
                body: Box::new(Expr::With {
                    base: Box::new(Expr::Var("e0".into())),
                    field: "fills".into(),
                    value: Box::new(inner),
                }),
            }),
            bind: "e0".into(),
            cond: Box::new(Expr::non_empty(Expr::var_field("e0", "fills"))),
        };

        assert_eq!(
            eval(&expr, &doc),
            json!([{"side": "BUY", "fills": [{"v": "X"}]}])
        );
    }

    #[test]
    fn test_filter_over_non_array_is_null() {
        let expr = Expr::Filter {
            input: Box::new(Expr::field("missing")),
            bind: "e0".into(),
            cond: Box::new(Expr::And(vec![])),
        };
        assert_eq!(eval(&expr, &json!({})), Value::Null);
    }

    #[test]
    fn test_unbound_and_placeholder_errors() {
        let mut evaluator = ExprEvaluator::new();
        assert_eq!(
            evaluator.eval(&Expr::Var("e9".into()), &json!({})),
            Err(ExecutorError::UnboundVariable("e9".into()))
        );
        assert_eq!(
            evaluator.eval(&Expr::placeholder("input"), &json!({})),
            Err(ExecutorError::UnfilledPlaceholder("input".into()))
        );
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&json!(-5)), json!(5));
        assert_eq!(magnitude(&json!(-2.5)), json!(2.5));
        assert_eq!(magnitude(&json!("x")), Value::Null);
        assert_eq!(magnitude(&json!(u64::MAX)), json!(u64::MAX));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("")));
    }
}
