//! End-to-end tests for the write pipeline: CREATE, MERGE, SET, REMOVE,
//! DELETE, and their constraint behavior.

use cypherite::{Edge, Graph, GraphStore, Node, PropertyMap, Value};

// ============================================================================
// CREATE
// ============================================================================

#[test]
fn test_create_relationship_between_matched_nodes() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:Person {name: 'a'})", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:Person {name: 'b'})", PropertyMap::new()).unwrap();

    let result = graph
        .execute(
            "MATCH (a:Person {name: 'a'}), (b:Person {name: 'b'}) \
             CREATE (a)-[r:KNOWS {since: 2020}]->(b) RETURN r",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let edge: Edge = result.rows[0].get("r").unwrap();
    assert_eq!(edge.edge_type, "KNOWS");
    assert_eq!(edge.properties.get("since"), Some(&Value::Int(2020)));
    assert_eq!(result.stats.edges_created, 1);
}

#[test]
fn test_create_chain_pattern() {
    let graph = Graph::open_memory();

    let result = graph
        .execute(
            "CREATE (a:Stop {n: 1})-[:NEXT]->(b:Stop {n: 2})-[:NEXT]->(c:Stop {n: 3}) RETURN c.n",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows[0].get_value("c.n"), Some(&Value::Int(3)));
    assert_eq!(result.stats.nodes_created, 3);
    assert_eq!(result.stats.edges_created, 2);
}

#[test]
fn test_create_weight_populates_column() {
    let graph = Graph::open_memory();

    let result = graph
        .execute(
            "CREATE (a:N)-[r:ROAD {weight: 2.5}]->(b:N) RETURN r.weight",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows[0].get_value("r.weight"), Some(&Value::Float(2.5)));
    let mut edges = graph.store().find_edges_by_type("ROAD").unwrap();
    let edge = edges.next().unwrap().unwrap();
    assert_eq!(edge.weight, 2.5);
}

#[test]
fn test_create_null_properties_dropped() {
    let graph = Graph::open_memory();

    let result = graph
        .execute("CREATE (n:X {a: 1, b: NULL}) RETURN n", PropertyMap::new())
        .unwrap();

    let node: Node = result.rows[0].get("n").unwrap();
    assert_eq!(node.get("a"), Some(&Value::Int(1)));
    assert!(node.get("b").is_none());
}

// ============================================================================
// MERGE
// ============================================================================

#[test]
fn test_merge_creates_then_matches() {
    let graph = Graph::open_memory();

    graph
        .execute("MERGE (n:Person {name: 'Ada'})", PropertyMap::new())
        .unwrap();
    graph
        .execute("MERGE (n:Person {name: 'Ada'})", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute("MATCH (n:Person) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(1)));
}

#[test]
fn test_merge_on_create_on_match() {
    let graph = Graph::open_memory();

    let first = graph
        .execute(
            "MERGE (n:P {k: 1}) ON CREATE SET n.born = TRUE ON MATCH SET n.seen = TRUE RETURN n",
            PropertyMap::new(),
        )
        .unwrap();
    let node: Node = first.rows[0].get("n").unwrap();
    assert_eq!(node.get("born"), Some(&Value::Bool(true)));
    assert!(node.get("seen").is_none());

    let second = graph
        .execute(
            "MERGE (n:P {k: 1}) ON CREATE SET n.born = TRUE ON MATCH SET n.seen = TRUE RETURN n",
            PropertyMap::new(),
        )
        .unwrap();
    let node: Node = second.rows[0].get("n").unwrap();
    assert_eq!(node.get("seen"), Some(&Value::Bool(true)));
}

// ============================================================================
// SET / REMOVE
// ============================================================================

#[test]
fn test_set_property_and_label() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:Person {name: 'Ada'})", PropertyMap::new()).unwrap();

    let result = graph
        .execute(
            "MATCH (n:Person) SET n.age = 36, n:Admin RETURN n",
            PropertyMap::new(),
        )
        .unwrap();

    let node: Node = result.rows[0].get("n").unwrap();
    assert_eq!(node.get("age"), Some(&Value::Int(36)));
    assert!(node.has_label("Admin"));
    assert_eq!(result.stats.properties_set, 1);
    assert_eq!(result.stats.labels_added, 1);
}

#[test]
fn test_set_merge_map() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:X {a: 1})", PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH (n:X) SET n += {b: 2, c: 3} RETURN n", PropertyMap::new())
        .unwrap();

    let node: Node = result.rows[0].get("n").unwrap();
    assert_eq!(node.get("a"), Some(&Value::Int(1)));
    assert_eq!(node.get("b"), Some(&Value::Int(2)));
    assert_eq!(node.get("c"), Some(&Value::Int(3)));
}

#[test]
fn test_remove_property_and_label() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (n:Person:Old {name: 'Ada', age: 99})", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute(
            "MATCH (n:Person) REMOVE n.age, n:Old RETURN n",
            PropertyMap::new(),
        )
        .unwrap();

    let node: Node = result.rows[0].get("n").unwrap();
    assert!(node.get("age").is_none());
    assert!(!node.has_label("Old"));
    assert!(node.has_label("Person"));
}

// ============================================================================
// DELETE (scenarios S4, S5) and DETACH DELETE
// ============================================================================

#[test]
fn test_delete_unconnected_node() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:X {id: 1})", PropertyMap::new()).unwrap();

    let deleted = graph
        .execute("MATCH (n) WHERE n.id = 1 DELETE n", PropertyMap::new())
        .unwrap();
    assert_eq!(deleted.rows.len(), 0);
    assert_eq!(deleted.stats.nodes_deleted, 1);

    let count = graph
        .execute("MATCH (n) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(count.rows[0].get_value("count(*)"), Some(&Value::Int(0)));
}

#[test]
fn test_delete_connected_node_is_constraint_error() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (a:X {id: 1})-[:R]->(b:X {id: 2})", PropertyMap::new())
        .unwrap();

    let err = graph
        .execute("MATCH (n) WHERE id(n) = 1 DELETE n", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), cypherite::ErrorCategory::Constraint);
    assert_eq!(err.code(), 5002);

    // Nothing was mutated.
    assert_eq!(graph.store().node_count().unwrap(), 2);
    assert_eq!(graph.store().edge_count().unwrap(), 1);
}

#[test]
fn test_detach_delete_cascades() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (a:X {id: 1})-[:R]->(b:X {id: 2})", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute("MATCH (n) WHERE id(n) = 1 DETACH DELETE n", PropertyMap::new())
        .unwrap();
    assert_eq!(result.stats.nodes_deleted, 1);

    assert_eq!(graph.store().node_count().unwrap(), 1);
    assert_eq!(graph.store().edge_count().unwrap(), 0);
}

#[test]
fn test_delete_relationship_variable() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (a:X)-[:R]->(b:X)", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute("MATCH (a)-[r:R]->(b) DELETE r", PropertyMap::new())
        .unwrap();
    assert_eq!(result.stats.edges_deleted, 1);
    assert_eq!(graph.store().edge_count().unwrap(), 0);
    assert_eq!(graph.store().node_count().unwrap(), 2);
}

// ============================================================================
// Adapter-level constraint: edges require both endpoints
// ============================================================================

#[test]
fn test_edge_endpoints_must_exist() {
    let graph = Graph::open_memory();
    let a = graph
        .store()
        .add_node(None, &["X"], PropertyMap::new())
        .unwrap();

    let err = graph
        .store()
        .add_edge(a, cypherite::NodeId(999), "R", 1.0, PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), cypherite::ErrorCategory::Constraint);
    assert_eq!(err.code(), 5001);
}

// ============================================================================
// Statistics accumulate across one statement
// ============================================================================

#[test]
fn test_write_statistics() {
    let graph = Graph::open_memory();

    let result = graph
        .execute(
            "CREATE (a:X {v: 1}), (b:X {v: 2}), (c:X {v: 3})",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.stats.nodes_created, 3);
    assert_eq!(result.rows.len(), 0); // no RETURN

    // The schema tracker observed the writes.
    let stats = graph.tracker().snapshot();
    assert_eq!(stats.label_frequency("X"), 3);
}
