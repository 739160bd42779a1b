//! End-to-end tests for the read pipeline.
//!
//! Each test exercises: lex -> parse -> plan -> optimize -> execute against
//! MemoryStore through `Graph::execute()`.

use cypherite::{Graph, Node, PropertyMap, Value};

fn seed_people(graph: &Graph<cypherite::MemoryStore>) {
    for (name, age) in [("Alice", 30), ("Bob", 20), ("Carol", 25)] {
        graph
            .execute(
                &format!("CREATE (n:Person {{name: '{name}', age: {age}}})"),
                PropertyMap::new(),
            )
            .unwrap();
    }
}

// ============================================================================
// 1. CREATE a node, then MATCH it back
// ============================================================================

#[test]
fn test_create_and_query_node() {
    let graph = Graph::open_memory();

    graph.execute("CREATE (n:Person)", PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH (n:Person) RETURN n", PropertyMap::new())
        .unwrap();

    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows.len(), 1);

    let node: Node = result.rows[0].get("n").unwrap();
    assert!(node.has_label("Person"));
}

// ============================================================================
// 2. CREATE with properties and RETURN a property (scenario S1)
// ============================================================================

#[test]
fn test_create_returning_property() {
    let graph = Graph::open_memory();

    let result = graph
        .execute(
            "CREATE (n:Person {name: \"Alice\", age: 30}) RETURN n.name",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.columns, vec!["n.name"]);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("n.name"), Some(&Value::from("Alice")));
    assert_eq!(result.stats.nodes_created, 1);
}

// ============================================================================
// 3. WHERE filtering (scenario S2)
// ============================================================================

#[test]
fn test_where_filters_by_age() {
    let graph = Graph::open_memory();
    seed_people(&graph);
    graph.execute("CREATE (d:Dog {name: 'Rex'})", PropertyMap::new()).unwrap();

    let result = graph
        .execute(
            "MATCH (n:Person) WHERE n.age > 25 RETURN n.age",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("n.age"), Some(&Value::Int(30)));
}

// ============================================================================
// 4. Projection aliases and default column names
// ============================================================================

#[test]
fn test_aliases_and_default_columns() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n:Person) WHERE n.name = 'Alice' RETURN n.name AS who, n.age + 1",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.columns, vec!["who", "n.age + 1"]);
    assert_eq!(result.rows[0].get_value("who"), Some(&Value::from("Alice")));
    assert_eq!(result.rows[0].get_value("n.age + 1"), Some(&Value::Int(31)));
}

// ============================================================================
// 5. ORDER BY / SKIP / LIMIT (scenario S6)
// ============================================================================

#[test]
fn test_order_by_desc_with_limit() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n) RETURN n.name ORDER BY n.name DESC LIMIT 2",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get_value("n.name"), Some(&Value::from("Carol")));
    assert_eq!(result.rows[1].get_value("n.name"), Some(&Value::from("Bob")));
}

#[test]
fn test_skip_offsets_rows() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN n.name ORDER BY n.name SKIP 1 LIMIT 1",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("n.name"), Some(&Value::from("Bob")));
}

// ============================================================================
// 6. DISTINCT
// ============================================================================

#[test]
fn test_distinct_removes_duplicates() {
    let graph = Graph::open_memory();
    seed_people(&graph);
    graph
        .execute("CREATE (n:Person {name: 'Alice', age: 99})", PropertyMap::new())
        .unwrap();

    let plain = graph
        .execute("MATCH (n:Person) RETURN n.name", PropertyMap::new())
        .unwrap();
    assert_eq!(plain.rows.len(), 4);

    let distinct = graph
        .execute("MATCH (n:Person) RETURN DISTINCT n.name", PropertyMap::new())
        .unwrap();
    assert_eq!(distinct.rows.len(), 3);
}

// ============================================================================
// 7. Parameters
// ============================================================================

#[test]
fn test_parameter_lookup() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let mut params = PropertyMap::new();
    params.insert("who".into(), Value::from("Bob"));

    let result = graph
        .execute("MATCH (n:Person) WHERE n.name = $who RETURN n.age", params)
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("n.age"), Some(&Value::Int(20)));
}

#[test]
fn test_missing_parameter_is_semantic_error() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let err = graph
        .execute("MATCH (n:Person) WHERE n.name = $who RETURN n", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), cypherite::ErrorCategory::Semantic);
}

// ============================================================================
// 8. WITH pipelines
// ============================================================================

#[test]
fn test_with_projects_new_horizon() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n:Person) WITH n.age AS age WHERE age >= 25 RETURN age ORDER BY age",
            PropertyMap::new(),
        )
        .unwrap();

    let ages: Vec<i64> = result.rows.iter().map(|r| r.get("age").unwrap()).collect();
    assert_eq!(ages, vec![25, 30]);
}

// ============================================================================
// 9. UNWIND
// ============================================================================

#[test]
fn test_unwind_list() {
    let graph = Graph::open_memory();

    let result = graph
        .execute("UNWIND [1, 2, 3] AS x RETURN x * 2", PropertyMap::new())
        .unwrap();

    let values: Vec<i64> = result.rows.iter().map(|r| r.get("x * 2").unwrap()).collect();
    assert_eq!(values, vec![2, 4, 6]);
}

// ============================================================================
// 10. UNION
// ============================================================================

#[test]
fn test_union_and_union_all() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:A {x: 1})", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:B {x: 1})", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:B {x: 2})", PropertyMap::new()).unwrap();

    let all = graph
        .execute(
            "MATCH (n:A) RETURN n.x UNION ALL MATCH (n:B) RETURN n.x",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(all.rows.len(), 3);

    let deduped = graph
        .execute(
            "MATCH (n:A) RETURN n.x UNION MATCH (n:B) RETURN n.x",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(deduped.rows.len(), 2);

    // Left branch rows come first.
    assert_eq!(deduped.rows[0].get_value("n.x"), Some(&Value::Int(1)));
}

// ============================================================================
// 11. RETURN * and result JSON
// ============================================================================

#[test]
fn test_return_star_binding_order() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (a:X {v: 1})-[:R]->(b:Y {v: 2})", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute("MATCH (a:X)-[r:R]->(b) RETURN *", PropertyMap::new())
        .unwrap();
    assert_eq!(result.columns, vec!["a", "r", "b"]);
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn test_result_serializes_to_json() {
    let graph = Graph::open_memory();
    graph
        .execute("CREATE (n:Person {name: 'Ada'})", PropertyMap::new())
        .unwrap();

    let result = graph
        .execute("MATCH (n:Person) RETURN n.name, n.missing", PropertyMap::new())
        .unwrap();
    assert_eq!(
        result.to_json(),
        "[{\"n.name\":\"Ada\",\"n.missing\":null}]"
    );
}

// ============================================================================
// 12. CASE expressions
// ============================================================================

#[test]
fn test_case_expression() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n:Person) \
             RETURN CASE WHEN n.age >= 25 THEN 'senior' ELSE 'junior' END AS band \
             ORDER BY n.age",
            PropertyMap::new(),
        )
        .unwrap();

    let bands: Vec<String> = result.rows.iter().map(|r| r.get("band").unwrap()).collect();
    assert_eq!(bands, vec!["junior", "senior", "senior"]);
}

// ============================================================================
// 13. String operators
// ============================================================================

#[test]
fn test_string_operators() {
    let graph = Graph::open_memory();
    seed_people(&graph);

    let result = graph
        .execute(
            "MATCH (n:Person) WHERE n.name STARTS WITH 'A' OR n.name CONTAINS 'aro' RETURN n.name ORDER BY n.name",
            PropertyMap::new(),
        )
        .unwrap();

    let names: Vec<String> = result.rows.iter().map(|r| r.get("n.name").unwrap()).collect();
    assert_eq!(names, vec!["Alice", "Carol"]);
}
