//! End-to-end tests for aggregation: grouping, the aggregate function set,
//! DISTINCT aggregates, and ordering over aggregated output.

use cypherite::{Graph, MemoryStore, PropertyMap, Value};

fn city_graph() -> Graph<MemoryStore> {
    let graph = Graph::open_memory();
    let rows = [
        ("Alice", "Paris", 30),
        ("Bob", "Paris", 20),
        ("Carol", "Oslo", 40),
        ("Dave", "Oslo", 20),
        ("Eve", "Oslo", 60),
    ];
    for (name, city, age) in rows {
        graph
            .execute(
                &format!("CREATE (n:Person {{name: '{name}', city: '{city}', age: {age}}})"),
                PropertyMap::new(),
            )
            .unwrap();
    }
    graph
}

// ============================================================================
// count
// ============================================================================

#[test]
fn test_count_star() {
    let graph = city_graph();
    let result = graph
        .execute("MATCH (n:Person) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(5)));
}

#[test]
fn test_count_on_empty_graph_is_zero() {
    let graph = Graph::open_memory();
    let result = graph
        .execute("MATCH (n) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(0)));
}

#[test]
fn test_count_expression_skips_nulls() {
    let graph = city_graph();
    graph.execute("CREATE (n:Person {name: 'X'})", PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH (n:Person) RETURN count(n.age)", PropertyMap::new())
        .unwrap();
    // The ageless node does not count.
    assert_eq!(result.rows[0].get_value("count(n.age)"), Some(&Value::Int(5)));
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_group_by_city() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN n.city, count(*) ORDER BY n.city",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.columns, vec!["n.city", "count(*)"]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get_value("n.city"), Some(&Value::from("Oslo")));
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(3)));
    assert_eq!(result.rows[1].get_value("n.city"), Some(&Value::from("Paris")));
    assert_eq!(result.rows[1].get_value("count(*)"), Some(&Value::Int(2)));
}

// ============================================================================
// sum / avg / min / max / collect
// ============================================================================

#[test]
fn test_numeric_aggregates() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN sum(n.age), avg(n.age), min(n.age), max(n.age)",
            PropertyMap::new(),
        )
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row.get_value("sum(n.age)"), Some(&Value::Int(170)));
    assert_eq!(row.get_value("avg(n.age)"), Some(&Value::Float(34.0)));
    assert_eq!(row.get_value("min(n.age)"), Some(&Value::Int(20)));
    assert_eq!(row.get_value("max(n.age)"), Some(&Value::Int(60)));
}

#[test]
fn test_min_max_strings() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN min(n.name), max(n.name)",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.rows[0].get_value("min(n.name)"), Some(&Value::from("Alice")));
    assert_eq!(result.rows[0].get_value("max(n.name)"), Some(&Value::from("Eve")));
}

#[test]
fn test_collect_groups_values() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) WHERE n.city = 'Paris' RETURN collect(n.name)",
            PropertyMap::new(),
        )
        .unwrap();

    let collected = match result.rows[0].get_value("collect(n.name)") {
        Some(Value::List(items)) => items.clone(),
        other => panic!("expected list, got {other:?}"),
    };
    assert_eq!(collected.len(), 2);
    assert!(collected.contains(&Value::from("Alice")));
    assert!(collected.contains(&Value::from("Bob")));
}

#[test]
fn test_avg_of_no_rows_is_null() {
    let graph = Graph::open_memory();
    let result = graph
        .execute("MATCH (n:Ghost) RETURN avg(n.age)", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("avg(n.age)"), Some(&Value::Null));
}

// ============================================================================
// DISTINCT aggregates
// ============================================================================

#[test]
fn test_count_distinct() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN count(DISTINCT n.age)",
            PropertyMap::new(),
        )
        .unwrap();
    // Ages are 30, 20, 40, 20, 60 -> four distinct.
    assert_eq!(
        result.rows[0].get_value("count(DISTINCT n.age)"),
        Some(&Value::Int(4))
    );
}

// ============================================================================
// Ordering aggregated output
// ============================================================================

#[test]
fn test_order_by_aggregate() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) RETURN n.city, count(*) ORDER BY count(*) DESC",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.rows[0].get_value("n.city"), Some(&Value::from("Oslo")));
}

#[test]
fn test_aggregate_after_with_pipeline() {
    let graph = city_graph();

    let result = graph
        .execute(
            "MATCH (n:Person) WITH n.city AS city, n.age AS age WHERE age >= 30 \
             RETURN city, count(*) ORDER BY city",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get_value("city"), Some(&Value::from("Oslo")));
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(2)));
    assert_eq!(result.rows[1].get_value("city"), Some(&Value::from("Paris")));
    assert_eq!(result.rows[1].get_value("count(*)"), Some(&Value::Int(1)));
}

// ============================================================================
// Mixed sum promotion
// ============================================================================

#[test]
fn test_sum_promotes_to_float_with_mixed_input() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:V {x: 1})", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:V {x: 2.5})", PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH (n:V) RETURN sum(n.x)", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("sum(n.x)"), Some(&Value::Float(3.5)));
}
