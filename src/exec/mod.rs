//! Volcano-model executor.
//!
//! Each physical operator has one iterator with `open`/`next`/`close`.
//! Execution is single-threaded and demand-driven: pulling the root pulls
//! children as needed. Blocking operators (sort, aggregation, distinct, the
//! hash-join build side) drain their input during `open`.

mod blocking;
mod iters;
mod write;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::eval::{self, Env};
use crate::model::{json, Edge, Node, Path, PropertyMap, Value};
use crate::planner::physical::{PhysicalOp, PhysicalPlan};
use crate::schema::SchemaTracker;
use crate::storage::GraphStore;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag. Every iterator checks it on entry to `next`;
/// blocking operators also check between buffered elements.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Execution context
// ============================================================================

/// Everything an iterator needs at runtime. Threaded explicitly through
/// every call; there is no global state.
pub struct ExecContext<'e> {
    pub store: &'e dyn GraphStore,
    pub params: &'e PropertyMap,
    pub tracker: Option<&'e SchemaTracker>,
    pub config: &'e GraphConfig,
    pub cancel: CancelFlag,
    pub stats: ExecutionStats,
}

impl<'e> ExecContext<'e> {
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Mutation counters accumulated across the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub edges_created: u64,
    pub edges_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
}

// ============================================================================
// The iterator contract
// ============================================================================

/// One physical operator at runtime. `open` and `close` are idempotent;
/// `next` returns `None` at exhaustion and stays exhausted.
pub trait RowSource<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()>;
    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>>;
    fn close(&mut self, cx: &mut ExecContext<'e>);
}

/// Build the iterator tree for a physical plan. Iterators borrow the plan
/// and own their children.
pub fn build<'e>(plan: &'e PhysicalPlan) -> Box<dyn RowSource<'e> + 'e> {
    match &plan.op {
        PhysicalOp::Argument => Box::new(iters::ArgumentIter::new()),
        PhysicalOp::AllNodesScan { var } => Box::new(iters::NodeScanIter::all(var)),
        PhysicalOp::LabelScan { var, label } => Box::new(iters::NodeScanIter::label(var, label)),
        PhysicalOp::NodeIndexSeek { var, label, property, value } => {
            Box::new(iters::NodeScanIter::seek(var, label, property, value))
        }
        PhysicalOp::AllEdgesScan { source, edge, target, types } => {
            Box::new(iters::EdgeScanIter::new(source, edge, target, types))
        }
        PhysicalOp::Expand { input, source, edge, target, types, direction, target_bound } => {
            Box::new(iters::ExpandIter::new(
                build(input),
                source,
                edge.as_deref(),
                target,
                types,
                *direction,
                *target_bound,
            ))
        }
        PhysicalOp::OptionalExpand { input, source, edge, target, types, direction, predicate } => {
            Box::new(iters::OptionalExpandIter::new(
                build(input),
                source,
                edge.as_deref(),
                target,
                types,
                *direction,
                predicate.as_ref(),
            ))
        }
        PhysicalOp::VarLengthExpand {
            input, source, edge, target, types, direction, min, max, target_bound,
        } => Box::new(iters::VarLengthExpandIter::new(
            build(input),
            source,
            edge.as_deref(),
            target,
            types,
            *direction,
            *min,
            *max,
            *target_bound,
        )),
        PhysicalOp::Filter { input, predicate } => {
            Box::new(iters::FilterIter::new(build(input), predicate))
        }
        PhysicalOp::PathBind { input, var, nodes, edges } => {
            Box::new(iters::PathBindIter::new(build(input), var, nodes, edges))
        }
        PhysicalOp::HashJoin { left, right, join_vars } => {
            Box::new(blocking::HashJoinIter::new(build(left), build(right), join_vars))
        }
        PhysicalOp::CartesianProduct { left, right } => {
            Box::new(blocking::CartesianProductIter::new(build(left), build(right)))
        }
        PhysicalOp::Projection { input, items } => {
            Box::new(iters::ProjectionIter::new(build(input), items))
        }
        PhysicalOp::Aggregation { input, group_keys, aggregates } => {
            Box::new(blocking::AggregationIter::new(build(input), group_keys, aggregates))
        }
        PhysicalOp::Distinct { input } => Box::new(blocking::DistinctIter::new(build(input))),
        PhysicalOp::Sort { input, keys } => {
            Box::new(blocking::SortIter::new(build(input), keys))
        }
        PhysicalOp::Skip { input, count } => {
            Box::new(iters::SkipIter::new(build(input), count))
        }
        PhysicalOp::Limit { input, count } => {
            Box::new(iters::LimitIter::new(build(input), count))
        }
        PhysicalOp::Union { left, right } => {
            Box::new(iters::UnionIter::new(build(left), build(right)))
        }
        PhysicalOp::Unwind { input, expr, var } => {
            Box::new(iters::UnwindIter::new(build(input), expr, var))
        }
        PhysicalOp::Create { input, nodes, edges } => {
            Box::new(write::CreateIter::new(build(input), nodes, edges))
        }
        PhysicalOp::Merge { input, node, on_create, on_match } => {
            Box::new(write::MergeIter::new(build(input), node, on_create, on_match))
        }
        PhysicalOp::SetProps { input, items } => {
            Box::new(write::SetPropsIter::new(build(input), items))
        }
        PhysicalOp::RemoveProps { input, items } => {
            Box::new(write::RemovePropsIter::new(build(input), items))
        }
        PhysicalOp::Delete { input, vars, detach } => {
            Box::new(write::DeleteIter::new(build(input), vars, *detach))
        }
    }
}

// ============================================================================
// Result surface
// ============================================================================

/// A single result row with ordered named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub values: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self
            .get_value(column)
            .ok_or_else(|| Error::Runtime(format!("no column '{column}' in result row")))?;
        T::from_value(value)
    }

    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

/// Full result of a query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub stats: ExecutionStats,
}

impl QueryResult {
    /// Serialize as a JSON array of objects, column order preserved.
    pub fn to_json(&self) -> String {
        let mut out = String::from("[");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('{');
            for (j, (column, value)) in row.values.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                json::write_value(&mut out, &Value::String(column.clone()));
                out.push(':');
                json::write_value(&mut out, value);
            }
            out.push('}');
        }
        out.push(']');
        out
    }
}

/// Typed extraction from result values.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for Node {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Node(n) => Ok(*n.clone()),
            other => Err(Error::Type { expected: "NODE".into(), got: other.type_name().into() }),
        }
    }
}

impl FromValue for Edge {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Edge(e) => Ok(*e.clone()),
            other => Err(Error::Type {
                expected: "RELATIONSHIP".into(),
                got: other.type_name().into(),
            }),
        }
    }
}

impl FromValue for Path {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Path(p) => Ok(*p.clone()),
            other => Err(Error::Type { expected: "PATH".into(), got: other.type_name().into() }),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(Error::Type { expected: "STRING".into(), got: other.type_name().into() }),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_int().ok_or_else(|| Error::Type {
            expected: "INTEGER".into(),
            got: value.type_name().into(),
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_float().ok_or_else(|| Error::Type {
            expected: "FLOAT".into(),
            got: value.type_name().into(),
        })
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::Type {
                expected: "BOOLEAN".into(),
                got: other.type_name().into(),
            }),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::List(l) => Ok(l.clone()),
            other => Err(Error::Type { expected: "LIST".into(), got: other.type_name().into() }),
        }
    }
}

impl FromValue for HashMap<String, Value> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Map(m) => Ok(m.clone()),
            other => Err(Error::Type { expected: "MAP".into(), got: other.type_name().into() }),
        }
    }
}

// ============================================================================
// Top-level execution
// ============================================================================

/// Run a physical plan to completion. Iterators are closed on every
/// termination path; the row cap applies when the plan has no LIMIT.
pub fn execute<'e>(
    plan: &'e PhysicalPlan,
    store: &'e dyn GraphStore,
    params: &'e PropertyMap,
    tracker: Option<&'e SchemaTracker>,
    config: &'e GraphConfig,
    cancel: CancelFlag,
) -> Result<QueryResult> {
    let columns = plan.output_columns();
    let capped = !plan.has_limit();

    let mut cx = ExecContext {
        store,
        params,
        tracker,
        config,
        cancel,
        stats: ExecutionStats::default(),
    };

    let mut root = build(plan);
    if let Err(e) = root.open(&mut cx) {
        root.close(&mut cx);
        return Err(e);
    }

    let mut rows: Vec<ResultRow> = Vec::new();
    loop {
        match root.next(&mut cx) {
            Ok(Some(env)) => {
                if columns.is_empty() {
                    // Pure write pipeline: drain for effects only.
                    continue;
                }
                if capped && rows.len() >= cx.config.max_result_rows {
                    root.close(&mut cx);
                    return Err(Error::RowCapExceeded(cx.config.max_result_rows));
                }
                let values = columns
                    .iter()
                    .map(|c| (c.clone(), env.get(c).cloned().unwrap_or(Value::Null)))
                    .collect();
                rows.push(ResultRow { values });
            }
            Ok(None) => break,
            Err(e) => {
                root.close(&mut cx);
                return Err(e);
            }
        }
    }
    root.close(&mut cx);

    debug!(rows = rows.len(), "query executed");
    Ok(QueryResult { columns, rows, stats: cx.stats })
}

/// Evaluate a SKIP/LIMIT count: a non-negative integer, parameters allowed.
pub(crate) fn eval_count(expr: &crate::cypher::ast::Expr, cx: &ExecContext<'_>) -> Result<usize> {
    let value = eval::eval_expr(expr, &Env::new(), cx.params)?;
    match value {
        Value::Int(n) if n >= 0 => Ok(n as usize),
        other => Err(Error::Type {
            expected: "non-negative INTEGER for SKIP/LIMIT".into(),
            got: other.type_name().into(),
        }),
    }
}

/// Canonical signature for hashing/deduplicating a set of values. Graph
/// references reduce to their identifier stubs.
pub(crate) fn value_signature(values: &[&Value]) -> String {
    let mut out = String::new();
    for value in values {
        json::write_value(&mut out, value);
        out.push('|');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Probe child that counts open/close calls and emits `n` empty rows.
    struct Probe {
        rows: usize,
        emitted: usize,
        opens: Rc<Cell<usize>>,
        closes: Rc<Cell<usize>>,
        opened: bool,
        closed: bool,
    }

    impl Probe {
        fn new(rows: usize, opens: Rc<Cell<usize>>, closes: Rc<Cell<usize>>) -> Self {
            Self { rows, emitted: 0, opens, closes, opened: false, closed: false }
        }
    }

    impl<'e> RowSource<'e> for Probe {
        fn open(&mut self, _cx: &mut ExecContext<'e>) -> Result<()> {
            if !self.opened {
                self.opened = true;
                self.opens.set(self.opens.get() + 1);
            }
            Ok(())
        }

        fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
            cx.check_cancelled()?;
            if self.emitted < self.rows {
                self.emitted += 1;
                Ok(Some(Env::new()))
            } else {
                Ok(None)
            }
        }

        fn close(&mut self, _cx: &mut ExecContext<'e>) {
            if !self.closed {
                self.closed = true;
                self.closes.set(self.closes.get() + 1);
            }
        }
    }

    fn test_cx<'e>(
        store: &'e MemoryStore,
        params: &'e PropertyMap,
        config: &'e GraphConfig,
    ) -> ExecContext<'e> {
        ExecContext {
            store,
            params,
            tracker: None,
            config,
            cancel: CancelFlag::new(),
            stats: ExecutionStats::default(),
        }
    }

    #[test]
    fn test_probe_open_close_balance_through_sort() {
        let store = MemoryStore::new();
        let params = PropertyMap::new();
        let config = GraphConfig::default();
        let mut cx = test_cx(&store, &params, &config);

        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let probe = Probe::new(3, opens.clone(), closes.clone());

        let keys: Vec<(crate::cypher::ast::Expr, bool)> = Vec::new();
        let mut sort = blocking::SortIter::new(Box::new(probe), &keys);
        sort.open(&mut cx).unwrap();
        while sort.next(&mut cx).unwrap().is_some() {}
        sort.close(&mut cx);
        sort.close(&mut cx); // close is idempotent

        assert_eq!(opens.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_cancellation_surfaces() {
        let store = MemoryStore::new();
        let params = PropertyMap::new();
        let config = GraphConfig::default();
        let mut cx = test_cx(&store, &params, &config);
        cx.cancel.cancel();

        let opens = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let mut probe = Probe::new(3, opens, closes);
        probe.open(&mut cx).unwrap();
        let err = probe.next(&mut cx).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_result_row_typed_access() {
        let row = ResultRow {
            values: vec![
                ("name".into(), Value::from("Ada")),
                ("age".into(), Value::Int(3)),
            ],
        };
        let name: String = row.get("name").unwrap();
        assert_eq!(name, "Ada");
        let age: i64 = row.get("age").unwrap();
        assert_eq!(age, 3);
        assert!(row.get::<String>("age").is_err());
        assert!(row.get::<String>("missing").is_err());
    }

    #[test]
    fn test_query_result_json_shape() {
        let result = QueryResult {
            columns: vec!["n.name".into()],
            rows: vec![ResultRow {
                values: vec![("n.name".into(), Value::from("Ada"))],
            }],
            stats: ExecutionStats::default(),
        };
        assert_eq!(result.to_json(), "[{\"n.name\":\"Ada\"}]");
    }
}
