//! JSON ↔ value conversion.
//!
//! Parsing goes through `serde_json`; output goes through a streaming writer
//! so the produced text is always well-formed and canonically escaped.
//! Graph references serialize as `{"_type":"node","_id":N}` stubs.

use crate::error::{Error, Result};
use crate::model::{LabelSet, PropertyMap, Value};

// ============================================================================
// Writer
// ============================================================================

/// Append the canonical JSON rendering of `value` to `out`.
pub fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            out.push_str(&i.to_string());
        }
        Value::Float(f) => write_float(out, *f),
        Value::String(s) => write_string(out, s),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
        Value::Node(n) => {
            out.push_str("{\"_type\":\"node\",\"_id\":");
            out.push_str(&n.id.0.to_string());
            out.push('}');
        }
        Value::Edge(e) => {
            out.push_str("{\"_type\":\"relationship\",\"_id\":");
            out.push_str(&e.id.0.to_string());
            out.push('}');
        }
        Value::Path(p) => {
            // A path renders as its node/edge reference sequence.
            out.push_str("{\"_type\":\"path\",\"_nodes\":[");
            for (i, n) in p.nodes.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&n.id.0.to_string());
            }
            out.push_str("],\"_edges\":[");
            for (i, e) in p.edges.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&e.id.0.to_string());
            }
            out.push_str("]}");
        }
    }
}

pub fn to_json_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_float(out: &mut String, f: f64) {
    if !f.is_finite() {
        // JSON has no NaN/Infinity.
        out.push_str("null");
        return;
    }
    if f == 0.0 {
        out.push_str(if f.is_sign_negative() { "-0.0" } else { "0.0" });
        return;
    }

    // At most 15 significant digits, in the shape printf's %.15g produces:
    // fixed notation for moderate exponents, exponential otherwise. The
    // rendering always carries a '.' or an 'e' so it re-parses as a float.
    let formatted = format!("{:.*e}", 14, f.abs());
    let (mantissa, exponent) = formatted
        .split_once('e')
        .expect("exponential format always contains 'e'");
    let exponent: i32 = exponent.parse().expect("exponent is an integer");
    let mut digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }

    if f.is_sign_negative() {
        out.push('-');
    }
    if !(-4..15).contains(&exponent) {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push_str(&exponent.to_string());
    } else if exponent < 0 {
        out.push_str("0.");
        for _ in 0..(-exponent - 1) {
            out.push('0');
        }
        out.push_str(&digits);
    } else if exponent as usize >= digits.len() - 1 {
        out.push_str(&digits);
        for _ in 0..(exponent as usize - (digits.len() - 1)) {
            out.push('0');
        }
        out.push_str(".0");
    } else {
        let point = exponent as usize + 1;
        out.push_str(&digits[..point]);
        out.push('.');
        out.push_str(&digits[point..]);
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse any JSON literal into a value.
pub fn value_from_json(text: &str) -> Result<Value> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::Runtime(format!("malformed JSON: {e}")))?;
    Ok(convert(parsed))
}

/// Parse a JSON object into a property map. Rejects non-objects and empty keys.
pub fn parse_property_map(text: &str) -> Result<PropertyMap> {
    match value_from_json(text)? {
        Value::Map(map) => {
            if map.keys().any(|k| k.is_empty()) {
                return Err(Error::Constraint("property keys must be non-empty".into()));
            }
            Ok(map)
        }
        other => Err(Error::Runtime(format!(
            "expected a JSON object for properties, got {}",
            other.type_name()
        ))),
    }
}

/// Serialize a property map as a canonical JSON object.
pub fn property_map_to_json(props: &PropertyMap) -> String {
    to_json_string(&Value::Map(props.clone()))
}

/// Parse a JSON array of strings into a label set, rejecting duplicates.
pub fn parse_labels(text: &str) -> Result<LabelSet> {
    match value_from_json(text)? {
        Value::List(items) => {
            let mut labels = LabelSet::new();
            for item in items {
                match item {
                    Value::String(s) => {
                        if labels.iter().any(|l| *l == s) {
                            return Err(Error::Constraint(format!("duplicate label '{s}'")));
                        }
                        labels.push(s);
                    }
                    other => {
                        return Err(Error::Runtime(format!(
                            "label array element must be a string, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(labels)
        }
        other => Err(Error::Runtime(format!(
            "expected a JSON array for labels, got {}",
            other.type_name()
        ))),
    }
}

/// Serialize labels as a JSON array of strings.
pub fn labels_to_json(labels: &[String]) -> String {
    let mut out = String::from("[");
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(&mut out, label);
    }
    out.push(']');
    out
}

fn convert(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(convert).collect())
        }
        serde_json::Value::Object(entries) => Value::Map(
            entries.into_iter().map(|(k, v)| (k, convert(v))).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, NodeId};
    use proptest::prelude::*;

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(to_json_string(&Value::Null), "null");
        assert_eq!(to_json_string(&Value::Bool(true)), "true");
        assert_eq!(to_json_string(&Value::Int(42)), "42");
        assert_eq!(to_json_string(&Value::Float(2.5)), "2.5");
        assert_eq!(to_json_string(&Value::Float(3.0)), "3.0");
        assert_eq!(to_json_string(&Value::from("a\"b")), "\"a\\\"b\"");
    }

    #[test]
    fn test_float_capped_at_15_significant_digits() {
        // Shortest round-trip rendering would need 17 digits here.
        assert_eq!(to_json_string(&Value::Float(0.1 + 0.2)), "0.3");
        assert_eq!(
            to_json_string(&Value::Float(1234567890123456.0)),
            "1.23456789012346e15"
        );
        assert_eq!(to_json_string(&Value::Float(-0.00123)), "-0.00123");
        assert_eq!(to_json_string(&Value::Float(1.0e300)), "1e300");
        assert_eq!(to_json_string(&Value::Float(2.5e-7)), "2.5e-7");
        assert_eq!(to_json_string(&Value::Float(-0.0)), "-0.0");
        assert_eq!(to_json_string(&Value::Float(f64::NAN)), "null");
    }

    #[test]
    fn test_escape_set() {
        assert_eq!(
            to_json_string(&Value::from("a/b\n\t\r\\")),
            "\"a\\/b\\n\\t\\r\\\\\""
        );
    }

    #[test]
    fn test_map_keys_sorted() {
        let mut map = hashbrown::HashMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Int(1));
        assert_eq!(to_json_string(&Value::Map(map)), "{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_node_reference_stub() {
        let node = Node::new(NodeId(7)).with_property("x", 1);
        assert_eq!(
            to_json_string(&Value::from(node)),
            "{\"_type\":\"node\",\"_id\":7}"
        );
    }

    #[test]
    fn test_parse_property_map_rejects_scalars() {
        assert!(parse_property_map("42").is_err());
        assert!(parse_property_map("{\"a\":1}").is_ok());
    }

    #[test]
    fn test_parse_labels_rejects_duplicates() {
        assert!(parse_labels("[\"A\",\"A\"]").is_err());
        let labels = parse_labels("[\"A\",\"B\"]").unwrap();
        assert_eq!(labels.as_slice(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_round_trip_nested() {
        let text = "{\"a\":[1,2.5,null,{\"b\":\"x\"}],\"c\":true}";
        let value = value_from_json(text).unwrap();
        let rendered = to_json_string(&value);
        assert_eq!(value_from_json(&rendered).unwrap(), value);
    }

    /// Floats that are exact values of ≤15-significant-digit decimals, so
    /// the canonical rendering identifies them uniquely.
    fn canonical_float_strategy() -> impl Strategy<Value = f64> {
        (-999_999_999_999_999i64..=999_999_999_999_999i64, -18i32..=18)
            .prop_map(|(mantissa, exponent)| {
                format!("{mantissa}e{exponent}").parse::<f64>().unwrap_or(0.0)
            })
            .prop_filter("finite", |f| f.is_finite())
    }

    fn json_value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            canonical_float_strategy().prop_map(Value::Float),
            "[a-zA-Z0-9 _/\\\\\"\n\t]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Map(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_json_round_trip(value in json_value_strategy()) {
            let rendered = to_json_string(&value);
            let reparsed = value_from_json(&rendered).unwrap();
            prop_assert_eq!(reparsed, value);
        }
    }
}
