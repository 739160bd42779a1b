//! Built-in scalar functions.
//!
//! Each function declares an arity range; arguments are type-checked per
//! call. A NULL argument makes the result NULL (except `coalesce`), matching
//! how aggregates skip NULL inputs.

use crate::error::{Error, Result};
use crate::model::Value;

/// Aggregate function names, handled by the aggregation operator rather
/// than per-row evaluation.
pub fn is_aggregate(name: &str) -> bool {
    matches!(
        name.to_uppercase().as_str(),
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT"
    )
}

/// (min, max) argument counts. None means the function is unknown.
fn arity(upper: &str) -> Option<(usize, Option<usize>)> {
    Some(match upper {
        "TOUPPER" | "TOLOWER" | "LENGTH" | "SIZE" | "TOSTRING" | "ABS" | "CEIL" | "FLOOR"
        | "ROUND" | "SQRT" | "KEYS" | "HEAD" | "TAIL" | "LAST" | "ID" | "LABELS" | "TYPE"
        | "PROPERTIES" | "NODES" | "RELATIONSHIPS" | "TOINTEGER" | "TOFLOAT" | "TOBOOLEAN" => {
            (1, Some(1))
        }
        "STARTSWITH" | "ENDSWITH" | "CONTAINS" => (2, Some(2)),
        "SUBSTRING" => (2, Some(3)),
        "RANGE" => (2, Some(3)),
        "COALESCE" => (1, None),
        _ => return None,
    })
}

/// Call a scalar function by (case-insensitive) name.
pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    let upper = name.to_uppercase();
    let Some((min, max)) = arity(&upper) else {
        return Err(Error::UnknownFunction(name.to_string()));
    };

    let in_range = args.len() >= min && max.map_or(true, |m| args.len() <= m);
    if !in_range {
        let expected = match max {
            Some(m) if m == min => format!("{min}"),
            Some(m) => format!("{min}..{m}"),
            None => format!("at least {min}"),
        };
        return Err(Error::Arity { name: name.to_string(), expected, got: args.len() });
    }

    // NULL in, NULL out — except coalesce, which exists to skip NULLs.
    if upper != "COALESCE" && args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    match upper.as_str() {
        "TOUPPER" => Ok(Value::String(str_arg(name, &args[0])?.to_uppercase())),
        "TOLOWER" => Ok(Value::String(str_arg(name, &args[0])?.to_lowercase())),

        "LENGTH" | "SIZE" => match &args[0] {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            Value::Map(m) => Ok(Value::Int(m.len() as i64)),
            Value::Path(p) => Ok(Value::Int(p.len() as i64)),
            other => Err(type_error("STRING, LIST, MAP, or PATH", other)),
        },

        "SUBSTRING" => {
            let s = str_arg(name, &args[0])?;
            let start = int_arg(name, &args[1])?.max(0) as usize;
            let chars: Vec<char> = s.chars().collect();
            let taken: String = match args.get(2) {
                Some(len) => {
                    let len = int_arg(name, len)?.max(0) as usize;
                    chars.iter().skip(start).take(len).collect()
                }
                None => chars.iter().skip(start).collect(),
            };
            Ok(Value::String(taken))
        }

        "TOSTRING" => Ok(match &args[0] {
            Value::String(s) => Value::String(s.clone()),
            Value::Int(i) => Value::String(i.to_string()),
            Value::Float(f) => Value::String(f.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        }),

        "STARTSWITH" => Ok(Value::Bool(
            str_arg(name, &args[0])?.starts_with(str_arg(name, &args[1])?),
        )),
        "ENDSWITH" => Ok(Value::Bool(
            str_arg(name, &args[0])?.ends_with(str_arg(name, &args[1])?),
        )),
        "CONTAINS" => Ok(Value::Bool(
            str_arg(name, &args[0])?.contains(str_arg(name, &args[1])?),
        )),

        "ABS" => match &args[0] {
            Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(type_error("numeric", other)),
        },
        "CEIL" => Ok(Value::Float(float_arg(name, &args[0])?.ceil())),
        "FLOOR" => Ok(Value::Float(float_arg(name, &args[0])?.floor())),
        "ROUND" => Ok(Value::Float(float_arg(name, &args[0])?.round())),
        "SQRT" => {
            let f = float_arg(name, &args[0])?;
            if f < 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(f.sqrt()))
            }
        }

        "KEYS" => match &args[0] {
            Value::Map(m) => {
                let mut keys: Vec<String> = m.keys().cloned().collect();
                keys.sort();
                Ok(Value::List(keys.into_iter().map(Value::String).collect()))
            }
            Value::Node(n) => {
                let mut keys: Vec<String> = n.properties.keys().cloned().collect();
                keys.sort();
                Ok(Value::List(keys.into_iter().map(Value::String).collect()))
            }
            Value::Edge(e) => {
                let mut keys: Vec<String> = e.properties.keys().cloned().collect();
                keys.sort();
                Ok(Value::List(keys.into_iter().map(Value::String).collect()))
            }
            other => Err(type_error("MAP, NODE, or RELATIONSHIP", other)),
        },

        "HEAD" => match &args[0] {
            Value::List(l) => Ok(l.first().cloned().unwrap_or(Value::Null)),
            other => Err(type_error("LIST", other)),
        },
        "TAIL" => match &args[0] {
            Value::List(l) => Ok(Value::List(l.iter().skip(1).cloned().collect())),
            other => Err(type_error("LIST", other)),
        },
        "LAST" => match &args[0] {
            Value::List(l) => Ok(l.last().cloned().unwrap_or(Value::Null)),
            other => Err(type_error("LIST", other)),
        },

        "RANGE" => {
            let start = int_arg(name, &args[0])?;
            let end = int_arg(name, &args[1])?;
            let step = match args.get(2) {
                Some(v) => int_arg(name, v)?,
                None => 1,
            };
            if step == 0 {
                return Err(Error::Runtime("range() step must not be zero".into()));
            }
            let mut list = Vec::new();
            let mut i = start;
            while (step > 0 && i <= end) || (step < 0 && i >= end) {
                list.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(list))
        }

        "COALESCE" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),

        "ID" => match &args[0] {
            Value::Node(n) => Ok(Value::Int(n.id.0 as i64)),
            Value::Edge(e) => Ok(Value::Int(e.id.0 as i64)),
            other => Err(type_error("NODE or RELATIONSHIP", other)),
        },
        "LABELS" => match &args[0] {
            Value::Node(n) => Ok(Value::List(
                n.labels.iter().cloned().map(Value::String).collect(),
            )),
            other => Err(type_error("NODE", other)),
        },
        "TYPE" => match &args[0] {
            Value::Edge(e) => Ok(Value::String(e.edge_type.clone())),
            other => Err(type_error("RELATIONSHIP", other)),
        },
        "PROPERTIES" => match &args[0] {
            Value::Node(n) => Ok(Value::Map(n.properties.clone())),
            Value::Edge(e) => Ok(Value::Map(e.properties.clone())),
            other => Err(type_error("NODE or RELATIONSHIP", other)),
        },
        "NODES" => match &args[0] {
            Value::Path(p) => Ok(Value::List(
                p.nodes.iter().cloned().map(Value::from).collect(),
            )),
            other => Err(type_error("PATH", other)),
        },
        "RELATIONSHIPS" => match &args[0] {
            Value::Path(p) => Ok(Value::List(
                p.edges.iter().cloned().map(Value::from).collect(),
            )),
            other => Err(type_error("PATH", other)),
        },

        "TOINTEGER" => match &args[0] {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::String(s) => Ok(s.trim().parse::<i64>().map(Value::Int).unwrap_or(Value::Null)),
            other => Err(type_error("INTEGER, FLOAT, or STRING", other)),
        },
        "TOFLOAT" => match &args[0] {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::String(s) => Ok(s.trim().parse::<f64>().map(Value::Float).unwrap_or(Value::Null)),
            other => Err(type_error("INTEGER, FLOAT, or STRING", other)),
        },
        "TOBOOLEAN" => match &args[0] {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => Ok(match s.to_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            }),
            other => Err(type_error("BOOLEAN or STRING", other)),
        },

        _ => Err(Error::UnknownFunction(name.to_string())),
    }
}

fn type_error(expected: &str, got: &Value) -> Error {
    Error::Type { expected: expected.into(), got: got.type_name().into() }
}

fn str_arg<'v>(name: &str, v: &'v Value) -> Result<&'v str> {
    v.as_str().ok_or_else(|| Error::Type {
        expected: format!("STRING argument for {name}()"),
        got: v.type_name().into(),
    })
}

fn int_arg(name: &str, v: &Value) -> Result<i64> {
    v.as_int().ok_or_else(|| Error::Type {
        expected: format!("INTEGER argument for {name}()"),
        got: v.type_name().into(),
    })
}

fn float_arg(name: &str, v: &Value) -> Result<f64> {
    v.as_float().ok_or_else(|| Error::Type {
        expected: format!("numeric argument for {name}()"),
        got: v.type_name().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_functions() {
        assert_eq!(call("toUpper", &[Value::from("ab")]).unwrap(), Value::from("AB"));
        assert_eq!(call("toLower", &[Value::from("AB")]).unwrap(), Value::from("ab"));
        assert_eq!(
            call("substring", &[Value::from("hello"), Value::Int(1), Value::Int(3)]).unwrap(),
            Value::from("ell")
        );
        assert_eq!(
            call("startsWith", &[Value::from("abc"), Value::from("ab")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_null_in_null_out() {
        assert_eq!(call("toUpper", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("size", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_coalesce_skips_nulls() {
        assert_eq!(
            call("coalesce", &[Value::Null, Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(call("coalesce", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_arity_errors() {
        let err = call("toUpper", &[]).unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
        let err = call("substring", &[Value::from("x")]).unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
    }

    #[test]
    fn test_type_errors() {
        let err = call("toUpper", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Type);
    }

    #[test]
    fn test_unknown_function() {
        let err = call("definitelyNot", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::UnknownFunction(_)));
    }

    #[test]
    fn test_math() {
        assert_eq!(call("abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert_eq!(call("ceil", &[Value::Float(1.2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("floor", &[Value::Float(1.8)]).unwrap(), Value::Float(1.0));
        assert_eq!(call("sqrt", &[Value::Int(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(call("sqrt", &[Value::Int(-1)]).unwrap(), Value::Null);
    }

    #[test]
    fn test_list_functions() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(call("head", &[list.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("last", &[list.clone()]).unwrap(), Value::Int(3));
        assert_eq!(
            call("tail", &[list]).unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(3)])
        );
        assert_eq!(call("head", &[Value::List(vec![])]).unwrap(), Value::Null);
    }

    #[test]
    fn test_range() {
        assert_eq!(
            call("range", &[Value::Int(1), Value::Int(3)]).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            call("range", &[Value::Int(3), Value::Int(1), Value::Int(-1)]).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("toInteger", &[Value::from("42")]).unwrap(), Value::Int(42));
        assert_eq!(call("toInteger", &[Value::from("nope")]).unwrap(), Value::Null);
        assert_eq!(call("toFloat", &[Value::Int(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("toBoolean", &[Value::from("TRUE")]).unwrap(), Value::Bool(true));
    }
}
