//! Host-table store.
//!
//! The production adapter: the graph lives in two ordinary tables owned by
//! the host relational engine, and every operation here is one or more SQL
//! statements issued through [`HostConnection`]. Labels are stored as a JSON
//! array, properties as a JSON object. No in-memory mirror is kept.

use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{json, Edge, EdgeId, Node, NodeId, PropertyMap, Value};

use super::{EdgeIter, GraphStore, NodeIter};

/// A parameter or result cell in a host statement.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl HostValue {
    fn as_i64(&self) -> Result<i64> {
        match self {
            HostValue::Int(i) => Ok(*i),
            other => Err(Error::Runtime(format!("host returned {other:?}, expected an integer"))),
        }
    }

    fn as_f64(&self) -> Result<f64> {
        match self {
            HostValue::Float(f) => Ok(*f),
            HostValue::Int(i) => Ok(*i as f64),
            other => Err(Error::Runtime(format!("host returned {other:?}, expected a number"))),
        }
    }

    fn as_text(&self) -> Result<&str> {
        match self {
            HostValue::Text(s) => Ok(s),
            other => Err(Error::Runtime(format!("host returned {other:?}, expected text"))),
        }
    }
}

/// The host's statement surface. Implementations wrap a live connection;
/// failures they report surface as TRANSACTION errors to callers.
pub trait HostConnection: Send + Sync {
    /// Run a statement that returns no rows. Returns affected row count.
    fn execute(&self, sql: &str, params: &[HostValue]) -> Result<u64>;

    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[HostValue]) -> Result<Vec<Vec<HostValue>>>;
}

/// Graph adapter over `<prefix>_nodes` / `<prefix>_edges`.
pub struct TableStore<C: HostConnection> {
    conn: C,
    nodes_table: String,
    edges_table: String,
}

impl<C: HostConnection> TableStore<C> {
    /// Wrap a host connection. The prefix names the companion tables and
    /// must be a plain identifier.
    pub fn new(conn: C, prefix: &str) -> Result<Self> {
        if prefix.is_empty()
            || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || prefix.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            return Err(Error::Constraint(format!(
                "graph name '{prefix}' is not a valid identifier"
            )));
        }
        Ok(Self {
            conn,
            nodes_table: format!("{prefix}_nodes"),
            edges_table: format!("{prefix}_edges"),
        })
    }

    /// Create the companion tables if absent.
    pub fn create_tables(&self) -> Result<()> {
        self.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}(id INTEGER PRIMARY KEY, \
                 labels TEXT DEFAULT '[]', properties TEXT DEFAULT '{{}}')",
                self.nodes_table
            ),
            &[],
        )?;
        self.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}(id INTEGER PRIMARY KEY, \
                 source INTEGER, target INTEGER, edge_type TEXT, \
                 weight REAL, properties TEXT DEFAULT '{{}}')",
                self.edges_table
            ),
            &[],
        )?;
        Ok(())
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn execute(&self, sql: &str, params: &[HostValue]) -> Result<u64> {
        trace!(sql, "host execute");
        self.conn.execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[HostValue]) -> Result<Vec<Vec<HostValue>>> {
        trace!(sql, "host query");
        self.conn.query(sql, params)
    }

    fn next_id(&self, table: &str) -> Result<u64> {
        let rows = self.query(
            &format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {table}"),
            &[],
        )?;
        rows.first()
            .and_then(|r| r.first())
            .ok_or_else(|| Error::Runtime("host returned no rows for id allocation".into()))?
            .as_i64()
            .map(|i| i as u64)
    }

    fn node_exists(&self, id: NodeId) -> Result<bool> {
        let rows = self.query(
            &format!("SELECT 1 FROM {} WHERE id = ?", self.nodes_table),
            &[HostValue::Int(id.0 as i64)],
        )?;
        Ok(!rows.is_empty())
    }

    fn parse_node_row(row: &[HostValue]) -> Result<Node> {
        if row.len() < 3 {
            return Err(Error::Runtime("malformed node row from host".into()));
        }
        Ok(Node {
            id: NodeId(row[0].as_i64()? as u64),
            labels: json::parse_labels(row[1].as_text()?)?,
            properties: json::parse_property_map(row[2].as_text()?)?,
        })
    }

    fn parse_edge_row(row: &[HostValue]) -> Result<Edge> {
        if row.len() < 6 {
            return Err(Error::Runtime("malformed edge row from host".into()));
        }
        Ok(Edge {
            id: EdgeId(row[0].as_i64()? as u64),
            source: NodeId(row[1].as_i64()? as u64),
            target: NodeId(row[2].as_i64()? as u64),
            edge_type: row[3].as_text()?.to_string(),
            weight: row[4].as_f64()?,
            properties: json::parse_property_map(row[5].as_text()?)?,
        })
    }

    fn load_node(&self, id: NodeId) -> Result<Node> {
        self.node(id)?
            .ok_or_else(|| Error::Runtime(format!("node {id} not found")))
    }

    fn load_edge(&self, id: EdgeId) -> Result<Edge> {
        self.edge(id)?
            .ok_or_else(|| Error::Runtime(format!("edge {id} not found")))
    }

    fn write_node_properties(&self, id: NodeId, props: &PropertyMap) -> Result<()> {
        self.execute(
            &format!("UPDATE {} SET properties = ? WHERE id = ?", self.nodes_table),
            &[
                HostValue::Text(json::property_map_to_json(props)),
                HostValue::Int(id.0 as i64),
            ],
        )?;
        Ok(())
    }

    fn write_node_labels(&self, id: NodeId, labels: &[String]) -> Result<()> {
        self.execute(
            &format!("UPDATE {} SET labels = ? WHERE id = ?", self.nodes_table),
            &[
                HostValue::Text(json::labels_to_json(labels)),
                HostValue::Int(id.0 as i64),
            ],
        )?;
        Ok(())
    }

    fn write_edge_properties(&self, id: EdgeId, props: &PropertyMap) -> Result<()> {
        self.execute(
            &format!("UPDATE {} SET properties = ? WHERE id = ?", self.edges_table),
            &[
                HostValue::Text(json::property_map_to_json(props)),
                HostValue::Int(id.0 as i64),
            ],
        )?;
        Ok(())
    }

    fn edge_select(&self) -> String {
        format!(
            "SELECT id, source, target, edge_type, weight, properties FROM {}",
            self.edges_table
        )
    }

    fn collect_edges(&self, sql: &str, params: &[HostValue]) -> Result<EdgeIter<'_>> {
        let rows = self.query(sql, params)?;
        Ok(Box::new(rows.into_iter().map(|row| Self::parse_edge_row(&row))))
    }
}

impl<C: HostConnection> GraphStore for TableStore<C> {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn add_node(
        &self,
        id: Option<NodeId>,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        if props.keys().any(|k| k.is_empty()) {
            return Err(Error::Constraint("property keys must be non-empty".into()));
        }
        let id = match id {
            Some(explicit) => {
                if self.node_exists(explicit)? {
                    return Err(Error::Constraint(format!("node {explicit} already exists")));
                }
                explicit
            }
            None => NodeId(self.next_id(&self.nodes_table)?),
        };

        let mut distinct: Vec<String> = Vec::new();
        for label in labels {
            if !distinct.iter().any(|l| l == label) {
                distinct.push((*label).to_string());
            }
        }

        self.execute(
            &format!(
                "INSERT INTO {}(id, labels, properties) VALUES (?, ?, ?)",
                self.nodes_table
            ),
            &[
                HostValue::Int(id.0 as i64),
                HostValue::Text(json::labels_to_json(&distinct)),
                HostValue::Text(json::property_map_to_json(&props)),
            ],
        )?;
        Ok(id)
    }

    fn node(&self, id: NodeId) -> Result<Option<Node>> {
        let rows = self.query(
            &format!(
                "SELECT id, labels, properties FROM {} WHERE id = ?",
                self.nodes_table
            ),
            &[HostValue::Int(id.0 as i64)],
        )?;
        rows.first().map(|row| Self::parse_node_row(row)).transpose()
    }

    fn delete_node(&self, id: NodeId, cascade: bool) -> Result<bool> {
        if !self.node_exists(id)? {
            return Ok(false);
        }

        let rows = self.query(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE source = ? OR target = ?",
                self.edges_table
            ),
            &[HostValue::Int(id.0 as i64), HostValue::Int(id.0 as i64)],
        )?;
        let connected = rows
            .first()
            .and_then(|r| r.first())
            .map(|v| v.as_i64())
            .transpose()?
            .unwrap_or(0);

        if connected > 0 {
            if !cascade {
                return Err(Error::NodeHasEdges { id: id.0, edges: connected as usize });
            }
            self.execute(
                &format!("DELETE FROM {} WHERE source = ? OR target = ?", self.edges_table),
                &[HostValue::Int(id.0 as i64), HostValue::Int(id.0 as i64)],
            )?;
        }

        let affected = self.execute(
            &format!("DELETE FROM {} WHERE id = ?", self.nodes_table),
            &[HostValue::Int(id.0 as i64)],
        )?;
        Ok(affected > 0)
    }

    fn update_node_properties(&self, id: NodeId, props: PropertyMap) -> Result<()> {
        if !self.node_exists(id)? {
            return Err(Error::Runtime(format!("node {id} not found")));
        }
        self.write_node_properties(id, &props)
    }

    fn set_node_property(&self, id: NodeId, key: &str, value: Value) -> Result<()> {
        let mut node = self.load_node(id)?;
        if value.is_null() {
            node.properties.remove(key);
        } else {
            node.properties.insert(key.to_string(), value);
        }
        self.write_node_properties(id, &node.properties)
    }

    fn remove_node_property(&self, id: NodeId, key: &str) -> Result<()> {
        let mut node = self.load_node(id)?;
        node.properties.remove(key);
        self.write_node_properties(id, &node.properties)
    }

    fn set_node_labels(&self, id: NodeId, labels: &[&str]) -> Result<()> {
        if !self.node_exists(id)? {
            return Err(Error::Runtime(format!("node {id} not found")));
        }
        let owned: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.write_node_labels(id, &owned)
    }

    fn add_label(&self, id: NodeId, label: &str) -> Result<()> {
        let mut node = self.load_node(id)?;
        if !node.has_label(label) {
            node.labels.push(label.to_string());
            self.write_node_labels(id, &node.labels)?;
        }
        Ok(())
    }

    fn remove_label(&self, id: NodeId, label: &str) -> Result<()> {
        let mut node = self.load_node(id)?;
        let before = node.labels.len();
        node.labels.retain(|l| l != label);
        if node.labels.len() != before {
            self.write_node_labels(id, &node.labels)?;
        }
        Ok(())
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    fn add_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
        weight: f64,
        props: PropertyMap,
    ) -> Result<EdgeId> {
        if !self.node_exists(source)? {
            return Err(Error::MissingEndpoint(source.0));
        }
        if !self.node_exists(target)? {
            return Err(Error::MissingEndpoint(target.0));
        }

        let id = EdgeId(self.next_id(&self.edges_table)?);
        self.execute(
            &format!(
                "INSERT INTO {}(id, source, target, edge_type, weight, properties) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                self.edges_table
            ),
            &[
                HostValue::Int(id.0 as i64),
                HostValue::Int(source.0 as i64),
                HostValue::Int(target.0 as i64),
                HostValue::Text(edge_type.to_string()),
                HostValue::Float(weight),
                HostValue::Text(json::property_map_to_json(&props)),
            ],
        )?;
        Ok(id)
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        let rows = self.query(
            &format!("{} WHERE id = ?", self.edge_select()),
            &[HostValue::Int(id.0 as i64)],
        )?;
        rows.first().map(|row| Self::parse_edge_row(row)).transpose()
    }

    fn delete_edge(&self, id: EdgeId) -> Result<bool> {
        let affected = self.execute(
            &format!("DELETE FROM {} WHERE id = ?", self.edges_table),
            &[HostValue::Int(id.0 as i64)],
        )?;
        Ok(affected > 0)
    }

    fn set_edge_property(&self, id: EdgeId, key: &str, value: Value) -> Result<()> {
        let mut edge = self.load_edge(id)?;
        if value.is_null() {
            edge.properties.remove(key);
        } else {
            edge.properties.insert(key.to_string(), value);
        }
        self.write_edge_properties(id, &edge.properties)
    }

    fn remove_edge_property(&self, id: EdgeId, key: &str) -> Result<()> {
        let mut edge = self.load_edge(id)?;
        edge.properties.remove(key);
        self.write_edge_properties(id, &edge.properties)
    }

    // ========================================================================
    // Scans
    // ========================================================================

    fn all_nodes(&self) -> Result<NodeIter<'_>> {
        let rows = self.query(
            &format!(
                "SELECT id, labels, properties FROM {} ORDER BY id",
                self.nodes_table
            ),
            &[],
        )?;
        Ok(Box::new(rows.into_iter().map(|row| Self::parse_node_row(&row))))
    }

    fn find_nodes_by_label(&self, label: &str) -> Result<NodeIter<'_>> {
        // LIKE prefilter against the JSON text; the parsed label set is
        // re-checked because the pattern can match inside other strings.
        let rows = self.query(
            &format!(
                "SELECT id, labels, properties FROM {} WHERE labels LIKE ? ORDER BY id",
                self.nodes_table
            ),
            &[HostValue::Text(format!("%\"{label}\"%"))],
        )?;
        let label = label.to_string();
        Ok(Box::new(rows.into_iter().filter_map(move |row| {
            match Self::parse_node_row(&row) {
                Ok(node) if node.has_label(&label) => Some(Ok(node)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })))
    }

    fn all_edges(&self) -> Result<EdgeIter<'_>> {
        self.collect_edges(&format!("{} ORDER BY id", self.edge_select()), &[])
    }

    fn find_edges_by_type(&self, edge_type: &str) -> Result<EdgeIter<'_>> {
        self.collect_edges(
            &format!("{} WHERE edge_type = ? ORDER BY id", self.edge_select()),
            &[HostValue::Text(edge_type.to_string())],
        )
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn iter_outgoing(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>> {
        match edge_type {
            Some(t) => self.collect_edges(
                &format!(
                    "{} WHERE source = ? AND edge_type = ? ORDER BY id",
                    self.edge_select()
                ),
                &[HostValue::Int(id.0 as i64), HostValue::Text(t.to_string())],
            ),
            None => self.collect_edges(
                &format!("{} WHERE source = ? ORDER BY id", self.edge_select()),
                &[HostValue::Int(id.0 as i64)],
            ),
        }
    }

    fn iter_incoming(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>> {
        match edge_type {
            Some(t) => self.collect_edges(
                &format!(
                    "{} WHERE target = ? AND edge_type = ? ORDER BY id",
                    self.edge_select()
                ),
                &[HostValue::Int(id.0 as i64), HostValue::Text(t.to_string())],
            ),
            None => self.collect_edges(
                &format!("{} WHERE target = ? ORDER BY id", self.edge_select()),
                &[HostValue::Int(id.0 as i64)],
            ),
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    fn node_count(&self) -> Result<u64> {
        let rows = self.query(&format!("SELECT COUNT(*) FROM {}", self.nodes_table), &[])?;
        rows.first()
            .and_then(|r| r.first())
            .map_or(Ok(0), |v| v.as_i64().map(|i| i as u64))
    }

    fn edge_count(&self) -> Result<u64> {
        let rows = self.query(&format!("SELECT COUNT(*) FROM {}", self.edges_table), &[])?;
        rows.first()
            .and_then(|r| r.first())
            .map_or(Ok(0), |v| v.as_i64().map(|i| i as u64))
    }

    fn labels(&self) -> Result<Vec<String>> {
        // Host-side JSON functions are not assumed; distinct labels come from
        // parsing each row's array.
        let rows = self.query(
            &format!("SELECT labels FROM {}", self.nodes_table),
            &[],
        )?;
        let mut labels: Vec<String> = Vec::new();
        for row in rows {
            let parsed = json::parse_labels(row[0].as_text()?)?;
            for label in parsed {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels.sort();
        Ok(labels)
    }

    fn edge_types(&self) -> Result<Vec<String>> {
        let rows = self.query(
            &format!("SELECT DISTINCT edge_type FROM {}", self.edges_table),
            &[],
        )?;
        let mut types: Vec<String> = Vec::new();
        for row in rows {
            types.push(row[0].as_text()?.to_string());
        }
        types.sort();
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A scripted host: records every statement and replays canned rows.
    #[derive(Default)]
    struct FakeHost {
        log: Mutex<Vec<(String, Vec<HostValue>)>>,
        responses: Mutex<VecDeque<Vec<Vec<HostValue>>>>,
    }

    impl FakeHost {
        fn push_response(&self, rows: Vec<Vec<HostValue>>) {
            self.responses.lock().push_back(rows);
        }

        fn issued(&self) -> Vec<String> {
            self.log.lock().iter().map(|(sql, _)| sql.clone()).collect()
        }

        fn params_of(&self, index: usize) -> Vec<HostValue> {
            self.log.lock()[index].1.clone()
        }
    }

    impl HostConnection for &FakeHost {
        fn execute(&self, sql: &str, params: &[HostValue]) -> Result<u64> {
            self.log.lock().push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        fn query(&self, sql: &str, params: &[HostValue]) -> Result<Vec<Vec<HostValue>>> {
            self.log.lock().push((sql.to_string(), params.to_vec()));
            Ok(self.responses.lock().pop_front().unwrap_or_default())
        }
    }

    fn store(host: &FakeHost) -> TableStore<&FakeHost> {
        TableStore::new(host, "g").unwrap()
    }

    #[test]
    fn test_prefix_validation() {
        let host = FakeHost::default();
        assert!(TableStore::new(&host, "ok_name").is_ok());
        assert!(TableStore::new(&host, "1bad").is_err());
        assert!(TableStore::new(&host, "bad; DROP TABLE x").is_err());
        assert!(TableStore::new(&host, "").is_err());
    }

    #[test]
    fn test_create_tables_ddl() {
        let host = FakeHost::default();
        store(&host).create_tables().unwrap();
        let issued = host.issued();
        assert!(issued[0].contains("CREATE TABLE IF NOT EXISTS g_nodes"));
        assert!(issued[0].contains("labels TEXT DEFAULT '[]'"));
        assert!(issued[1].contains("CREATE TABLE IF NOT EXISTS g_edges"));
        assert!(issued[1].contains("weight REAL"));
    }

    #[test]
    fn test_add_node_allocates_and_inserts() {
        let host = FakeHost::default();
        host.push_response(vec![vec![HostValue::Int(5)]]); // MAX(id)+1
        let s = store(&host);

        let mut props = PropertyMap::new();
        props.insert("name".into(), Value::from("Ada"));
        let id = s.add_node(None, &["Person", "Person"], props).unwrap();
        assert_eq!(id, NodeId(5));

        let issued = host.issued();
        assert!(issued[0].contains("COALESCE(MAX(id), 0) + 1"));
        assert!(issued[1].starts_with("INSERT INTO g_nodes"));
        // Duplicate labels collapse; values serialize as canonical JSON.
        assert_eq!(
            host.params_of(1),
            vec![
                HostValue::Int(5),
                HostValue::Text("[\"Person\"]".into()),
                HostValue::Text("{\"name\":\"Ada\"}".into()),
            ]
        );
    }

    #[test]
    fn test_add_edge_checks_endpoints() {
        let host = FakeHost::default();
        host.push_response(vec![]); // source existence check: empty
        let s = store(&host);
        let err = s
            .add_edge(NodeId(1), NodeId(2), "KNOWS", 1.0, PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingEndpoint(1)));
        // No INSERT was issued.
        assert_eq!(host.issued().len(), 1);
    }

    #[test]
    fn test_delete_connected_node_without_cascade() {
        let host = FakeHost::default();
        host.push_response(vec![vec![HostValue::Int(1)]]); // exists
        host.push_response(vec![vec![HostValue::Int(2)]]); // edge count
        let s = store(&host);

        let err = s.delete_node(NodeId(1), false).unwrap_err();
        assert!(matches!(err, Error::NodeHasEdges { id: 1, edges: 2 }));
        // Only SELECTs were issued; nothing was deleted.
        assert!(host.issued().iter().all(|sql| sql.starts_with("SELECT")));
    }

    #[test]
    fn test_delete_node_cascade_removes_edges_first() {
        let host = FakeHost::default();
        host.push_response(vec![vec![HostValue::Int(1)]]); // exists
        host.push_response(vec![vec![HostValue::Int(1)]]); // edge count
        let s = store(&host);

        assert!(s.delete_node(NodeId(1), true).unwrap());
        let issued = host.issued();
        assert!(issued[2].starts_with("DELETE FROM g_edges"));
        assert!(issued[3].starts_with("DELETE FROM g_nodes"));
    }

    #[test]
    fn test_find_nodes_by_label_reverifies() {
        let host = FakeHost::default();
        // Two rows survive the LIKE prefilter; only one really has the label.
        host.push_response(vec![
            vec![
                HostValue::Int(1),
                HostValue::Text("[\"Person\"]".into()),
                HostValue::Text("{}".into()),
            ],
            vec![
                HostValue::Int(2),
                HostValue::Text("[\"x\\\"Person\"]".into()),
                HostValue::Text("{}".into()),
            ],
        ]);
        let s = store(&host);

        let nodes: Vec<Node> = s
            .find_nodes_by_label("Person")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, NodeId(1));
        assert_eq!(
            host.params_of(0),
            vec![HostValue::Text("%\"Person\"%".into())]
        );
    }

    #[test]
    fn test_outgoing_with_type_filter() {
        let host = FakeHost::default();
        host.push_response(vec![vec![
            HostValue::Int(3),
            HostValue::Int(1),
            HostValue::Int(2),
            HostValue::Text("KNOWS".into()),
            HostValue::Float(1.0),
            HostValue::Text("{}".into()),
        ]]);
        let s = store(&host);

        let edges: Vec<Edge> = s
            .iter_outgoing(NodeId(1), Some("KNOWS"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, "KNOWS");
        assert_eq!(edges[0].weight, 1.0);
        assert!(host.issued()[0].contains("WHERE source = ? AND edge_type = ?"));
    }

    #[test]
    fn test_set_property_reads_then_writes() {
        let host = FakeHost::default();
        host.push_response(vec![vec![
            HostValue::Int(1),
            HostValue::Text("[]".into()),
            HostValue::Text("{\"a\":1}".into()),
        ]]);
        let s = store(&host);

        s.set_node_property(NodeId(1), "b", Value::Int(2)).unwrap();
        let issued = host.issued();
        assert!(issued[1].starts_with("UPDATE g_nodes SET properties"));
        assert_eq!(
            host.params_of(1)[0],
            HostValue::Text("{\"a\":1,\"b\":2}".into())
        );
    }
}
