//! PropertyMap — the key-value store on nodes and edges.

use hashbrown::HashMap;

use super::Value;

/// A map of property names to values. Keys are non-empty and unique.
pub type PropertyMap = HashMap<String, Value>;

/// Build a map value from (key, value) pairs.
pub fn map_value<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Value
where
    K: Into<String>,
    V: Into<Value>,
{
    Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}
