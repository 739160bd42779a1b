//! Expression evaluator.
//!
//! A pure function from (expression, binding environment, parameters) to a
//! value. AND/OR short-circuit with Kleene three-valued semantics; NULL
//! propagates through arithmetic and comparisons.

pub mod functions;

use hashbrown::HashMap;

use crate::cypher::ast::{BinaryOp, Expr, ExprKind, Literal, StringOp, UnaryOp};
use crate::error::{Error, Result};
use crate::model::{PropertyMap, Value};

/// The binding environment of one row: variable name → value.
pub type Env = HashMap<String, Value>;

/// Evaluate an expression against a row.
pub fn eval_expr(expr: &Expr, env: &Env, params: &PropertyMap) -> Result<Value> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),

        ExprKind::Variable(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedVariable(name.clone())),

        ExprKind::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingParameter(name.clone())),

        ExprKind::Property { base, key } => {
            let value = eval_expr(base, env, params)?;
            match value {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                // The weight column reads like a property when none shadows it.
                Value::Edge(e) => Ok(e.properties.get(key).cloned().unwrap_or_else(|| {
                    if key == "weight" {
                        Value::Float(e.weight)
                    } else {
                        Value::Null
                    }
                })),
                Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(Error::Type {
                    expected: "NODE, RELATIONSHIP, or MAP".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        ExprKind::Index { base, index } => {
            let container = eval_expr(base, env, params)?;
            let key = eval_expr(index, env, params)?;
            match (container, key) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::List(items), Value::Int(i)) => {
                    let idx = if i < 0 { items.len() as i64 + i } else { i };
                    if idx < 0 {
                        return Ok(Value::Null);
                    }
                    Ok(items.get(idx as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Map(m), Value::String(k)) => {
                    Ok(m.get(&k).cloned().unwrap_or(Value::Null))
                }
                (container, key) => Err(Error::Type {
                    expected: "LIST[INTEGER] or MAP[STRING]".into(),
                    got: format!("{}[{}]", container.type_name(), key.type_name()),
                }),
            }
        }

        ExprKind::FunctionCall { name, args, .. } => {
            if functions::is_aggregate(name) {
                return Err(Error::Semantic(format!(
                    "aggregate function {name}() is not allowed in this context"
                )));
            }
            let values: Vec<Value> = args
                .iter()
                .map(|a| eval_expr(a, env, params))
                .collect::<Result<_>>()?;
            functions::call(name, &values)
        }

        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let l = truth(left, env, params)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                let r = truth(right, env, params)?;
                Ok(kleene_and(l, r))
            }
            BinaryOp::Or => {
                let l = truth(left, env, params)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                let r = truth(right, env, params)?;
                Ok(kleene_or(l, r))
            }
            BinaryOp::Xor => {
                let l = truth(left, env, params)?;
                let r = truth(right, env, params)?;
                Ok(match (l, r) {
                    (Some(a), Some(b)) => Value::Bool(a ^ b),
                    _ => Value::Null,
                })
            }
            _ => {
                let lv = eval_expr(left, env, params)?;
                let rv = eval_expr(right, env, params)?;
                eval_binary(*op, &lv, &rv)
            }
        },

        ExprKind::Unary { op, operand } => {
            let value = eval_expr(operand, env, params)?;
            match op {
                UnaryOp::Not => match value.as_bool()? {
                    Some(b) => Ok(Value::Bool(!b)),
                    None => Ok(Value::Null),
                },
                UnaryOp::Neg => value.neg(),
            }
        }

        ExprKind::List(items) => {
            let values: Vec<Value> = items
                .iter()
                .map(|i| eval_expr(i, env, params))
                .collect::<Result<_>>()?;
            Ok(Value::List(values))
        }

        ExprKind::Map(entries) => {
            let mut map = HashMap::new();
            for (key, value_expr) in entries {
                map.insert(key.clone(), eval_expr(value_expr, env, params)?);
            }
            Ok(Value::Map(map))
        }

        ExprKind::Case { operand, whens, else_expr } => {
            match operand {
                Some(op) => {
                    let subject = eval_expr(op, env, params)?;
                    for (when, then) in whens {
                        let candidate = eval_expr(when, env, params)?;
                        if subject.cypher_eq(&candidate) == Some(true) {
                            return eval_expr(then, env, params);
                        }
                    }
                }
                None => {
                    for (when, then) in whens {
                        let condition = eval_expr(when, env, params)?;
                        if condition.as_bool()? == Some(true) {
                            return eval_expr(then, env, params);
                        }
                    }
                }
            }
            match else_expr {
                Some(e) => eval_expr(e, env, params),
                None => Ok(Value::Null),
            }
        }

        ExprKind::In { item, list } => {
            let needle = eval_expr(item, env, params)?;
            let haystack = eval_expr(list, env, params)?;
            match haystack {
                Value::Null => Ok(Value::Null),
                Value::List(items) => {
                    let mut unknown = false;
                    for candidate in &items {
                        match needle.cypher_eq(candidate) {
                            Some(true) => return Ok(Value::Bool(true)),
                            Some(false) => {}
                            None => unknown = true,
                        }
                    }
                    if unknown {
                        Ok(Value::Null)
                    } else {
                        Ok(Value::Bool(false))
                    }
                }
                other => Err(Error::Type {
                    expected: "LIST".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        ExprKind::IsNull { operand, negated } => {
            let value = eval_expr(operand, env, params)?;
            let is_null = value.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        ExprKind::StringOp { op, left, right } => {
            let lv = eval_expr(left, env, params)?;
            let rv = eval_expr(right, env, params)?;
            match (&lv, &rv) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::String(a), Value::String(b)) => Ok(Value::Bool(match op {
                    StringOp::StartsWith => a.starts_with(b.as_str()),
                    StringOp::EndsWith => a.ends_with(b.as_str()),
                    StringOp::Contains => a.contains(b.as_str()),
                })),
                _ => Err(Error::Type {
                    expected: "STRING".into(),
                    got: format!("{}, {}", lv.type_name(), rv.type_name()),
                }),
            }
        }

        ExprKind::HasLabel { base, label } => {
            let value = eval_expr(base, env, params)?;
            match value {
                Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
                Value::Null => Ok(Value::Null),
                other => Err(Error::Type {
                    expected: "NODE".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        ExprKind::Star => Err(Error::Semantic(
            "'*' is only valid as a projection item".into(),
        )),
    }
}

/// Evaluate a predicate to its three-valued truth.
pub fn eval_predicate(expr: &Expr, env: &Env, params: &PropertyMap) -> Result<Option<bool>> {
    match eval_expr(expr, env, params)? {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        other => Err(Error::Type {
            expected: "BOOLEAN predicate".into(),
            got: other.type_name().into(),
        }),
    }
}

fn truth(expr: &Expr, env: &Env, params: &PropertyMap) -> Result<Option<bool>> {
    eval_expr(expr, env, params)?.as_bool()
}

fn kleene_and(l: Option<bool>, r: Option<bool>) -> Value {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (Some(true), Some(true)) => Value::Bool(true),
        _ => Value::Null,
    }
}

fn kleene_or(l: Option<bool>, r: Option<bool>) -> Value {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (Some(false), Some(false)) => Value::Bool(false),
        _ => Value::Null,
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => left.add(right),
        BinaryOp::Sub => left.sub(right),
        BinaryOp::Mul => left.mul(right),
        BinaryOp::Div => left.div(right),
        BinaryOp::Mod => left.rem(right),
        BinaryOp::Pow => left.pow(right),

        BinaryOp::Eq => Ok(bool3(left.cypher_eq(right))),
        BinaryOp::Ne => Ok(bool3(left.cypher_eq(right).map(|b| !b))),
        BinaryOp::Lt => cmp3(left, right, |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => cmp3(left, right, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => cmp3(left, right, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => cmp3(left, right, |o| o != std::cmp::Ordering::Less),

        BinaryOp::RegexMatch => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::String(_), Value::String(_)) => {
                Err(Error::Runtime("regex matching is not supported".into()))
            }
            _ => Err(Error::Type {
                expected: "STRING".into(),
                got: format!("{}, {}", left.type_name(), right.type_name()),
            }),
        },

        // Short-circuit forms are handled by the caller.
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            Err(Error::Runtime("logical operator outside eval_expr".into()))
        }
    }
}

fn bool3(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}

fn cmp3(
    left: &Value,
    right: &Value,
    test: fn(std::cmp::Ordering) -> bool,
) -> Result<Value> {
    Ok(bool3(left.cypher_cmp(right)?.map(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::ast::Pos;

    fn lit(v: Value) -> Expr {
        let kind = match v {
            Value::Null => ExprKind::Literal(Literal::Null),
            Value::Bool(b) => ExprKind::Literal(Literal::Bool(b)),
            Value::Int(i) => ExprKind::Literal(Literal::Int(i)),
            Value::Float(f) => ExprKind::Literal(Literal::Float(f)),
            Value::String(s) => ExprKind::Literal(Literal::String(s)),
            _ => panic!("only scalar literals in tests"),
        };
        Expr::new(kind, Pos::default())
    }

    fn binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary { op, left: Box::new(l), right: Box::new(r) },
            Pos::default(),
        )
    }

    fn eval(expr: &Expr) -> Value {
        eval_expr(expr, &Env::new(), &PropertyMap::new()).unwrap()
    }

    #[test]
    fn test_kleene_truth_tables() {
        let t = || lit(Value::Bool(true));
        let f = || lit(Value::Bool(false));
        let n = || lit(Value::Null);

        // AND
        assert_eq!(eval(&binary(BinaryOp::And, t(), t())), Value::Bool(true));
        assert_eq!(eval(&binary(BinaryOp::And, t(), n())), Value::Null);
        assert_eq!(eval(&binary(BinaryOp::And, n(), t())), Value::Null);
        assert_eq!(eval(&binary(BinaryOp::And, f(), n())), Value::Bool(false));
        assert_eq!(eval(&binary(BinaryOp::And, n(), f())), Value::Bool(false));
        assert_eq!(eval(&binary(BinaryOp::And, n(), n())), Value::Null);

        // OR
        assert_eq!(eval(&binary(BinaryOp::Or, t(), n())), Value::Bool(true));
        assert_eq!(eval(&binary(BinaryOp::Or, n(), t())), Value::Bool(true));
        assert_eq!(eval(&binary(BinaryOp::Or, f(), n())), Value::Null);
        assert_eq!(eval(&binary(BinaryOp::Or, n(), f())), Value::Null);
        assert_eq!(eval(&binary(BinaryOp::Or, f(), f())), Value::Bool(false));
        assert_eq!(eval(&binary(BinaryOp::Or, n(), n())), Value::Null);

        // XOR
        assert_eq!(eval(&binary(BinaryOp::Xor, t(), f())), Value::Bool(true));
        assert_eq!(eval(&binary(BinaryOp::Xor, t(), n())), Value::Null);

        // NOT
        let not = |e: Expr| {
            Expr::new(
                ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(e) },
                Pos::default(),
            )
        };
        assert_eq!(eval(&not(t())), Value::Bool(false));
        assert_eq!(eval(&not(n())), Value::Null);
    }

    #[test]
    fn test_short_circuit_skips_rhs_error() {
        // FALSE AND <undefined variable> short-circuits before the error.
        let rhs = Expr::new(ExprKind::Variable("missing".into()), Pos::default());
        let expr = binary(BinaryOp::And, lit(Value::Bool(false)), rhs);
        assert_eq!(eval(&expr), Value::Bool(false));
    }

    #[test]
    fn test_null_comparison_yields_null() {
        assert_eq!(
            eval(&binary(BinaryOp::Eq, lit(Value::Null), lit(Value::Int(1)))),
            Value::Null
        );
        assert_eq!(
            eval(&binary(BinaryOp::Lt, lit(Value::Null), lit(Value::Int(1)))),
            Value::Null
        );
    }

    #[test]
    fn test_mixed_numeric_comparison() {
        assert_eq!(
            eval(&binary(BinaryOp::Eq, lit(Value::Int(1)), lit(Value::Float(1.0)))),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_property_access_on_null_is_null() {
        let base = lit(Value::Null);
        let expr = Expr::new(
            ExprKind::Property { base: Box::new(base), key: "x".into() },
            Pos::default(),
        );
        assert_eq!(eval(&expr), Value::Null);
    }

    #[test]
    fn test_list_index_negative_and_out_of_bounds() {
        let list = Expr::new(
            ExprKind::List(vec![lit(Value::Int(10)), lit(Value::Int(20))]),
            Pos::default(),
        );
        let index = |i: i64| {
            Expr::new(
                ExprKind::Index {
                    base: Box::new(list.clone()),
                    index: Box::new(lit(Value::Int(i))),
                },
                Pos::default(),
            )
        };
        assert_eq!(eval(&index(0)), Value::Int(10));
        assert_eq!(eval(&index(-1)), Value::Int(20));
        assert_eq!(eval(&index(9)), Value::Null);
    }

    #[test]
    fn test_in_with_null_elements() {
        let list = Expr::new(
            ExprKind::List(vec![lit(Value::Int(1)), lit(Value::Null)]),
            Pos::default(),
        );
        let make = |needle: Value| {
            Expr::new(
                ExprKind::In {
                    item: Box::new(lit(needle)),
                    list: Box::new(list.clone()),
                },
                Pos::default(),
            )
        };
        assert_eq!(eval(&make(Value::Int(1))), Value::Bool(true));
        // Not found, but a NULL element makes the answer unknown.
        assert_eq!(eval(&make(Value::Int(9))), Value::Null);
    }

    #[test]
    fn test_undefined_variable_is_semantic() {
        let expr = Expr::new(ExprKind::Variable("ghost".into()), Pos::default());
        let err = eval_expr(&expr, &Env::new(), &PropertyMap::new()).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Semantic);
    }

    #[test]
    fn test_parameter_lookup() {
        let mut params = PropertyMap::new();
        params.insert("who".into(), Value::from("Ada"));
        let expr = Expr::new(ExprKind::Parameter("who".into()), Pos::default());
        assert_eq!(eval_expr(&expr, &Env::new(), &params).unwrap(), Value::from("Ada"));

        let missing = Expr::new(ExprKind::Parameter("nope".into()), Pos::default());
        let err = eval_expr(&missing, &Env::new(), &params).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(_)));
    }
}
