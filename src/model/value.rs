//! Runtime value type.
//!
//! A tagged union over the property value domain plus graph references.
//! Comparison and arithmetic follow openCypher semantics: NULL propagates,
//! Int promotes to Float when mixed, division and power always produce Float.

use std::cmp::Ordering;
use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{Edge, Node, Path};

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Box<Node>),
    Edge(Box<Edge>),
    Path(Box<Path>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Edge(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Boolean view for three-valued logic: NULL is unknown.
    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(Error::Type {
                expected: "BOOLEAN".into(),
                got: other.type_name().into(),
            }),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    // ========================================================================
    // Equality (three-valued)
    // ========================================================================

    /// Query-level equality. NULL against anything is unknown; node and edge
    /// references compare by identifier; lists element-wise; maps by key set.
    pub fn cypher_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::Int(a), Value::Int(b)) => Some(a == b),
            (Value::Float(a), Value::Float(b)) => Some(a == b),
            (Value::Int(a), Value::Float(b)) => Some((*a as f64) == *b),
            (Value::Float(a), Value::Int(b)) => Some(*a == (*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a == b),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cypher_eq(y) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                if unknown { None } else { Some(true) }
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (k, x) in a {
                    match b.get(k) {
                        None => return Some(false),
                        Some(y) => match x.cypher_eq(y) {
                            Some(false) => return Some(false),
                            Some(true) => {}
                            None => unknown = true,
                        },
                    }
                }
                if unknown { None } else { Some(true) }
            }
            (Value::Node(a), Value::Node(b)) => Some(a.id == b.id),
            (Value::Edge(a), Value::Edge(b)) => Some(a.id == b.id),
            (Value::Path(a), Value::Path(b)) => Some(a == b),
            _ => Some(false),
        }
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Query-level ordering. NULL against anything is unknown (`Ok(None)`);
    /// mixing incompatible types is a TYPE error the caller may catch.
    pub fn cypher_cmp(&self, other: &Value) -> Result<Option<Ordering>> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(None),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.partial_cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.partial_cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b)),
            (Value::Int(a), Value::Float(b)) => Ok((*a as f64).partial_cmp(b)),
            (Value::Float(a), Value::Int(b)) => Ok(a.partial_cmp(&(*b as f64))),
            (Value::String(a), Value::String(b)) => Ok(a.partial_cmp(b)),
            (a, b) => Err(Error::Incomparable {
                left: a.type_name().into(),
                right: b.type_name().into(),
            }),
        }
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// `+`: numeric addition, string concatenation, list concatenation.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(Value::Float(a.as_float().unwrap_or(0.0) + b.as_float().unwrap_or(0.0)))
            }
            (a, b) => Err(numeric_type_error(a, b)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, |a, b| a.wrapping_sub(b), |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, |a, b| a.wrapping_mul(b), |a, b| a * b)
    }

    /// `/` always produces Float; division by zero yields NULL.
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let denom = b.as_float().unwrap_or(0.0);
                if denom == 0.0 {
                    return Ok(Value::Null);
                }
                Ok(Value::Float(a.as_float().unwrap_or(0.0) / denom))
            }
            (a, b) => Err(numeric_type_error(a, b)),
        }
    }

    /// `%`; modulo by zero yields NULL.
    pub fn rem(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(_), Value::Int(0)) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let denom = b.as_float().unwrap_or(0.0);
                if denom == 0.0 {
                    return Ok(Value::Null);
                }
                Ok(Value::Float(a.as_float().unwrap_or(0.0) % denom))
            }
            (a, b) => Err(numeric_type_error(a, b)),
        }
    }

    /// `^` always produces Float.
    pub fn pow(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(Value::Float(
                a.as_float().unwrap_or(0.0).powf(b.as_float().unwrap_or(0.0)),
            )),
            (a, b) => Err(numeric_type_error(a, b)),
        }
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::Type {
                expected: "numeric".into(),
                got: other.type_name().into(),
            }),
        }
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(Value::Float(float_op(
            a.as_float().unwrap_or(0.0),
            b.as_float().unwrap_or(0.0),
        ))),
        (a, b) => Err(numeric_type_error(a, b)),
    }
}

fn numeric_type_error(left: &Value, right: &Value) -> Error {
    Error::Type {
        expected: "numeric".into(),
        got: format!("{}, {}", left.type_name(), right.type_name()),
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v as i64) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_owned()) }
}
impl From<Node> for Value {
    fn from(v: Node) -> Self { Value::Node(Box::new(v)) }
}
impl From<Edge> for Value {
    fn from(v: Edge) -> Self { Value::Edge(Box::new(v)) }
}
impl From<Path> for Value {
    fn from(v: Path) -> Self { Value::Path(Box::new(v)) }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                let mut keys: Vec<_> = m.keys().collect();
                keys.sort();
                for (i, k) in keys.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {}", m[k])?;
                }
                write!(f, "}}")
            }
            Value::Node(n) => write!(f, "(#{})", n.id),
            Value::Edge(e) => write!(f, "[#{}:{}]", e.id, e.edge_type),
            Value::Path(p) => write!(f, "<path len={}>", p.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(2.5), Value::Float(2.5));
        assert_eq!(Value::from(true), Value::Bool(true));
    }

    #[test]
    fn test_null_equality_is_unknown() {
        assert_eq!(Value::Null.cypher_eq(&Value::Null), None);
        assert_eq!(Value::Null.cypher_eq(&Value::Int(1)), None);
    }

    #[test]
    fn test_numeric_equality_promotes() {
        assert_eq!(Value::Int(1).cypher_eq(&Value::Float(1.0)), Some(true));
        assert_eq!(Value::Int(1).cypher_eq(&Value::Float(1.5)), Some(false));
    }

    #[test]
    fn test_node_equality_by_id() {
        let a = Node::new(NodeId(1)).with_property("x", 1);
        let b = Node::new(NodeId(1)).with_property("x", 2);
        assert_eq!(Value::from(a).cypher_eq(&Value::from(b)), Some(true));
    }

    #[test]
    fn test_list_equality_with_null_element() {
        let a = Value::List(vec![Value::Int(1), Value::Null]);
        let b = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(a.cypher_eq(&b), None);

        let c = Value::List(vec![Value::Int(9), Value::Null]);
        assert_eq!(c.cypher_eq(&b), Some(false));
    }

    #[test]
    fn test_cmp_mixed_numeric() {
        assert_eq!(
            Value::Int(1).cypher_cmp(&Value::Float(1.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.cypher_cmp(&Value::Int(1)).unwrap(), None);
    }

    #[test]
    fn test_cmp_incompatible_is_error() {
        assert!(Value::Int(1).cypher_cmp(&Value::String("a".into())).is_err());
    }

    #[test]
    fn test_division_always_float() {
        assert_eq!(Value::Int(4).div(&Value::Int(2)).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_division_by_zero_is_null() {
        assert_eq!(Value::Int(1).div(&Value::Int(0)).unwrap(), Value::Null);
        assert_eq!(Value::Int(1).rem(&Value::Int(0)).unwrap(), Value::Null);
        assert_eq!(Value::Float(1.0).div(&Value::Float(0.0)).unwrap(), Value::Null);
    }

    #[test]
    fn test_null_propagates_through_arithmetic() {
        assert_eq!(Value::Null.add(&Value::Int(1)).unwrap(), Value::Null);
        assert_eq!(Value::Int(1).mul(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_and_list_concat() {
        assert_eq!(
            Value::from("ab").add(&Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(
            Value::List(vec![Value::Int(1)]).add(&Value::List(vec![Value::Int(2)])).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_pow_always_float() {
        assert_eq!(Value::Int(2).pow(&Value::Int(3)).unwrap(), Value::Float(8.0));
    }
}
