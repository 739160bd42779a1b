//! Edge cases: error taxonomy, resource caps, cancellation, three-valued
//! logic at the query surface, EXPLAIN, sort stability, and the
//! optimized-equals-naive property.

use cypherite::{
    CancelFlag, ErrorCategory, Graph, GraphConfig, MemoryStore, PropertyMap, Value,
};

fn graph_with_nodes(n: usize) -> Graph<MemoryStore> {
    let graph = Graph::open_memory();
    for i in 0..n {
        graph
            .execute(&format!("CREATE (x:Item {{seq: {i}}})"), PropertyMap::new())
            .unwrap();
    }
    graph
}

// ============================================================================
// Error taxonomy
// ============================================================================

#[test]
fn test_syntax_error_has_location_and_context() {
    let graph = Graph::open_memory();
    let err = graph
        .execute("MATCH (n RETURN n", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Syntax);
    assert_eq!(err.code(), 1001);
    let loc = err.location().unwrap();
    assert_eq!((loc.line, loc.column), (1, 10));
    assert!(err.context().is_some());
}

#[test]
fn test_undefined_variable_is_semantic() {
    let graph = Graph::open_memory();
    let err = graph
        .execute("MATCH (n) RETURN ghost", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Semantic);
    assert_eq!(err.code(), 2001);
}

#[test]
fn test_unknown_function_is_semantic() {
    let graph = graph_with_nodes(1);
    let err = graph
        .execute("MATCH (n) RETURN conjure(n)", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Semantic);
}

#[test]
fn test_type_error_from_incompatible_comparison() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:V {x: 1})", PropertyMap::new()).unwrap();
    let err = graph
        .execute("MATCH (n:V) WHERE n.x > 'text' RETURN n", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Type);
}

#[test]
fn test_empty_query_is_semantic() {
    let graph = Graph::open_memory();
    let err = graph.execute("  ", PropertyMap::new()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Semantic);
}

// ============================================================================
// Division semantics
// ============================================================================

#[test]
fn test_division_by_zero_yields_null_not_error() {
    let graph = Graph::open_memory();
    let result = graph
        .execute("UNWIND [1] AS x RETURN x / 0, x % 0", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("x / 0"), Some(&Value::Null));
    assert_eq!(result.rows[0].get_value("x % 0"), Some(&Value::Null));
}

#[test]
fn test_division_always_float() {
    let graph = Graph::open_memory();
    let result = graph
        .execute("UNWIND [9] AS x RETURN x / 3", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows[0].get_value("x / 3"), Some(&Value::Float(3.0)));
}

// ============================================================================
// Three-valued logic at the query surface
// ============================================================================

#[test]
fn test_null_predicate_drops_row() {
    let graph = graph_with_nodes(3);
    // n.missing > 1 is NULL for every row: nothing passes.
    let result = graph
        .execute("MATCH (n:Item) WHERE n.missing > 1 RETURN n", PropertyMap::new())
        .unwrap();
    assert_eq!(result.rows.len(), 0);
}

#[test]
fn test_is_null_is_two_valued() {
    let graph = graph_with_nodes(2);
    let result = graph
        .execute(
            "MATCH (n:Item) WHERE n.missing IS NULL RETURN count(*)",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(2)));
}

#[test]
fn test_false_and_null_short_circuits() {
    let graph = graph_with_nodes(1);
    // FALSE AND NULL = FALSE, so NOT(...) keeps the row.
    let result = graph
        .execute(
            "MATCH (n:Item) WHERE NOT (FALSE AND n.missing = 1) RETURN count(*)",
            PropertyMap::new(),
        )
        .unwrap();
    assert_eq!(result.rows[0].get_value("count(*)"), Some(&Value::Int(1)));
}

// ============================================================================
// Resource caps
// ============================================================================

#[test]
fn test_row_cap_without_limit() {
    let config = GraphConfig { max_result_rows: 3, ..GraphConfig::default() };
    let graph = Graph::with_config(MemoryStore::new(), config);
    for i in 0..5 {
        graph
            .execute(&format!("CREATE (x:Item {{seq: {i}}})"), PropertyMap::new())
            .unwrap();
    }

    let err = graph
        .execute("MATCH (n:Item) RETURN n.seq", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Runtime);
    assert_eq!(err.code(), 4001);

    // The same query with a LIMIT is exempt from the cap.
    let ok = graph
        .execute("MATCH (n:Item) RETURN n.seq LIMIT 5", PropertyMap::new())
        .unwrap();
    assert_eq!(ok.rows.len(), 5);
}

#[test]
fn test_parser_depth_cap() {
    let graph = Graph::open_memory();
    let mut source = String::from("RETURN ");
    for _ in 0..100 {
        source.push('(');
    }
    source.push('1');
    for _ in 0..100 {
        source.push(')');
    }
    let err = graph.execute(&source, PropertyMap::new()).unwrap_err();
    assert_eq!(err.code(), 4002);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancelled_flag_aborts_execution() {
    let graph = graph_with_nodes(10);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = graph
        .execute_with("MATCH (n:Item) RETURN n", PropertyMap::new(), cancel)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Runtime);
    assert_eq!(err.code(), 4004);
}

#[test]
fn test_unset_flag_does_not_interfere() {
    let graph = graph_with_nodes(2);
    let result = graph
        .execute_with("MATCH (n:Item) RETURN n", PropertyMap::new(), CancelFlag::new())
        .unwrap();
    assert_eq!(result.rows.len(), 2);
}

// ============================================================================
// Sort stability (equal keys keep input order)
// ============================================================================

#[test]
fn test_sort_is_stable_on_equal_keys() {
    let graph = Graph::open_memory();
    for (seq, bucket) in [(1, "b"), (2, "a"), (3, "b"), (4, "a")] {
        graph
            .execute(
                &format!("CREATE (n:Row {{seq: {seq}, bucket: '{bucket}'}})"),
                PropertyMap::new(),
            )
            .unwrap();
    }

    let result = graph
        .execute(
            "MATCH (n:Row) RETURN n.bucket, n.seq ORDER BY n.bucket",
            PropertyMap::new(),
        )
        .unwrap();

    // Scan order is id-ascending; within each bucket that order survives.
    let seqs: Vec<i64> = result.rows.iter().map(|r| r.get("n.seq").unwrap()).collect();
    assert_eq!(seqs, vec![2, 4, 1, 3]);
}

#[test]
fn test_nulls_sort_last_ascending() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:V {x: 2})", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:V)", PropertyMap::new()).unwrap();
    graph.execute("CREATE (n:V {x: 1})", PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH (n:V) RETURN n.x ORDER BY n.x", PropertyMap::new())
        .unwrap();
    let values: Vec<Value> = result
        .rows
        .iter()
        .map(|r| r.get_value("n.x").unwrap().clone())
        .collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Null]);
}

// ============================================================================
// EXPLAIN
// ============================================================================

#[test]
fn test_explain_returns_plan_text() {
    let graph = graph_with_nodes(3);
    graph.refresh_schema().unwrap();

    let result = graph
        .execute(
            "EXPLAIN MATCH (n:Item) WHERE n.seq = 1 RETURN n.seq LIMIT 1",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.columns, vec!["plan"]);
    let plan: String = result.rows[0].get("plan").unwrap();
    assert!(plan.contains("LabelScan(n:Item)"), "{plan}");
    assert!(plan.contains("Filter"), "{plan}");
    assert!(plan.contains("Limit"), "{plan}");
    assert!(plan.contains("rows="), "{plan}");

    // EXPLAIN does not touch the graph.
    assert_eq!(graph.tracker().snapshot().node_count, 3);
}

#[test]
fn test_explain_shows_index_seek() {
    let graph = graph_with_nodes(3);
    graph.refresh_schema().unwrap();
    graph.tracker().register_index("Item", "seq");

    let plan = graph
        .explain("MATCH (n:Item) WHERE n.seq = 1 RETURN n")
        .unwrap();
    assert!(plan.contains("NodeIndexSeek(n:Item.seq)"), "{plan}");
}

// ============================================================================
// Optimized plan ≡ naive plan
// ============================================================================

#[test]
fn test_pushdown_preserves_semantics() {
    use cypherite::exec;
    use cypherite::planner;

    let graph = Graph::open_memory();
    for (name, age, city) in [
        ("a", 10, "x"),
        ("b", 20, "x"),
        ("c", 30, "y"),
        ("d", 40, "y"),
    ] {
        graph
            .execute(
                &format!("CREATE (n:P {{name: '{name}', age: {age}, city: '{city}'}})"),
                PropertyMap::new(),
            )
            .unwrap();
    }
    for (src, dst) in [("a", "b"), ("b", "c"), ("c", "d"), ("a", "c")] {
        graph
            .execute(
                &format!(
                    "MATCH (s:P {{name: '{src}'}}), (t:P {{name: '{dst}'}}) CREATE (s)-[:E]->(t)"
                ),
                PropertyMap::new(),
            )
            .unwrap();
    }

    let queries = [
        "MATCH (a:P)-[:E]->(b:P) WHERE a.age > 15 AND b.city = 'y' RETURN a.name, b.name",
        "MATCH (a:P), (b:P) WHERE a.city = b.city AND a.age < b.age RETURN a.name, b.name",
        "MATCH (n:P) WHERE n:P AND n.age > 5 RETURN n.name",
    ];

    for query in queries {
        let statement = cypherite::cypher::parse(query).unwrap();
        let stats = graph.tracker().snapshot();
        let config = GraphConfig::default();

        let naive_logical = planner::plan(statement.query.clone()).unwrap();
        let optimized_logical = planner::optimize(naive_logical.clone());

        let run = |logical| {
            let physical = planner::plan_physical(logical, &stats);
            exec::execute(
                &physical,
                graph.store(),
                &PropertyMap::new(),
                None,
                &config,
                CancelFlag::new(),
            )
            .unwrap()
        };

        let mut naive_rows: Vec<String> = run(naive_logical)
            .rows
            .iter()
            .map(|r| format!("{:?}", r.values))
            .collect();
        let mut optimized_rows: Vec<String> = run(optimized_logical)
            .rows
            .iter()
            .map(|r| format!("{:?}", r.values))
            .collect();
        naive_rows.sort();
        optimized_rows.sort();
        assert_eq!(naive_rows, optimized_rows, "row multiset diverged for {query}");
    }
}

// ============================================================================
// Label scans vs later label changes
// ============================================================================

#[test]
fn test_set_label_makes_node_visible_to_label_scan() {
    let graph = Graph::open_memory();
    graph.execute("CREATE (n:Draft {v: 1})", PropertyMap::new()).unwrap();

    let before = graph
        .execute("MATCH (n:Published) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(before.rows[0].get_value("count(*)"), Some(&Value::Int(0)));

    graph
        .execute("MATCH (n:Draft) SET n:Published RETURN n", PropertyMap::new())
        .unwrap();

    let after = graph
        .execute("MATCH (n:Published) RETURN count(*)", PropertyMap::new())
        .unwrap();
    assert_eq!(after.rows[0].get_value("count(*)"), Some(&Value::Int(1)));
}
