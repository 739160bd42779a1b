//! Streaming iterators: scans, expansion, filter, projection, limits.

use std::collections::VecDeque;

use crate::cypher::ast::Expr;
use crate::error::{Error, Result};
use crate::eval::{self, Env};
use crate::model::{Direction, Edge, Node, NodeId, Value};
use crate::storage::{EdgeIter, NodeIter};

use super::{eval_count, ExecContext, RowSource};

// ============================================================================
// Argument
// ============================================================================

/// Emits a single empty row; the seed for pipelines without a scan.
pub struct ArgumentIter {
    emitted: bool,
}

impl ArgumentIter {
    pub fn new() -> Self {
        Self { emitted: false }
    }
}

impl<'e> RowSource<'e> for ArgumentIter {
    fn open(&mut self, _cx: &mut ExecContext<'e>) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        if self.emitted {
            Ok(None)
        } else {
            self.emitted = true;
            Ok(Some(Env::new()))
        }
    }

    fn close(&mut self, _cx: &mut ExecContext<'e>) {}
}

// ============================================================================
// Node scans
// ============================================================================

#[derive(Clone, Copy)]
enum ScanKind<'e> {
    All,
    Label(&'e str),
    /// Label scan narrowed by a property equality; the adapter has no seek
    /// surface, so the residual check runs here.
    Seek { label: &'e str, property: &'e str, value: &'e Expr },
}

pub struct NodeScanIter<'e> {
    var: &'e str,
    kind: ScanKind<'e>,
    cursor: Option<NodeIter<'e>>,
    seek_value: Option<Value>,
}

impl<'e> NodeScanIter<'e> {
    pub fn all(var: &'e str) -> Self {
        Self { var, kind: ScanKind::All, cursor: None, seek_value: None }
    }

    pub fn label(var: &'e str, label: &'e str) -> Self {
        Self { var, kind: ScanKind::Label(label), cursor: None, seek_value: None }
    }

    pub fn seek(var: &'e str, label: &'e str, property: &'e str, value: &'e Expr) -> Self {
        Self {
            var,
            kind: ScanKind::Seek { label, property, value },
            cursor: None,
            seek_value: None,
        }
    }
}

impl<'e> RowSource<'e> for NodeScanIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.cursor.is_some() {
            return Ok(());
        }
        let cursor = match self.kind {
            ScanKind::All => cx.store.all_nodes()?,
            ScanKind::Label(label) => cx.store.find_nodes_by_label(label)?,
            ScanKind::Seek { label, value, .. } => {
                self.seek_value = Some(eval::eval_expr(value, &Env::new(), cx.params)?);
                cx.store.find_nodes_by_label(label)?
            }
        };
        self.cursor = Some(cursor);
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let kind = self.kind;
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        for node in cursor {
            let node = node?;
            if let ScanKind::Seek { property, .. } = kind {
                let expected = self.seek_value.as_ref().expect("set during open");
                let actual = node.get(property).cloned().unwrap_or(Value::Null);
                if actual.cypher_eq(expected) != Some(true) {
                    continue;
                }
            }
            let mut env = Env::new();
            env.insert(self.var.to_string(), Value::from(node));
            return Ok(Some(env));
        }
        Ok(None)
    }

    fn close(&mut self, _cx: &mut ExecContext<'e>) {
        self.cursor = None;
    }
}

// ============================================================================
// Edge scan
// ============================================================================

/// One row per edge, with both endpoints fetched and bound.
pub struct EdgeScanIter<'e> {
    source: &'e str,
    edge: &'e str,
    target: &'e str,
    types: &'e [String],
    cursor: Option<EdgeIter<'e>>,
}

impl<'e> EdgeScanIter<'e> {
    pub fn new(source: &'e str, edge: &'e str, target: &'e str, types: &'e [String]) -> Self {
        Self { source, edge, target, types, cursor: None }
    }
}

impl<'e> RowSource<'e> for EdgeScanIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.cursor.is_some() {
            return Ok(());
        }
        self.cursor = Some(match self.types {
            [single] => cx.store.find_edges_by_type(single)?,
            _ => cx.store.all_edges()?,
        });
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        for edge in cursor {
            let edge = edge?;
            if self.types.len() > 1 && !self.types.iter().any(|t| *t == edge.edge_type) {
                continue;
            }
            let source = fetch_endpoint(cx, edge.source)?;
            let target = fetch_endpoint(cx, edge.target)?;
            let mut env = Env::new();
            env.insert(self.source.to_string(), Value::from(source));
            env.insert(self.edge.to_string(), Value::from(edge));
            env.insert(self.target.to_string(), Value::from(target));
            return Ok(Some(env));
        }
        Ok(None)
    }

    fn close(&mut self, _cx: &mut ExecContext<'e>) {
        self.cursor = None;
    }
}

fn fetch_endpoint(cx: &ExecContext<'_>, id: NodeId) -> Result<Node> {
    cx.store
        .node(id)?
        .ok_or_else(|| Error::Runtime(format!("edge references missing node {id}")))
}

// ============================================================================
// Expand
// ============================================================================

pub struct ExpandIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    source: &'e str,
    edge: Option<&'e str>,
    target: &'e str,
    types: &'e [String],
    direction: Direction,
    target_bound: bool,
    ready: VecDeque<Env>,
}

impl<'e> ExpandIter<'e> {
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        source: &'e str,
        edge: Option<&'e str>,
        target: &'e str,
        types: &'e [String],
        direction: Direction,
        target_bound: bool,
    ) -> Self {
        Self { child, source, edge, target, types, direction, target_bound, ready: VecDeque::new() }
    }
}

/// Adjacent edges of `node` honoring the pattern's direction and types.
fn adjacency(
    cx: &ExecContext<'_>,
    node: NodeId,
    direction: Direction,
    types: &[String],
) -> Result<Vec<Edge>> {
    let single = if types.len() == 1 { Some(types[0].as_str()) } else { None };
    let mut edges = cx.store.adjacent_edges(node, direction, single)?;
    if types.len() > 1 {
        edges.retain(|e| types.iter().any(|t| *t == e.edge_type));
    }
    Ok(edges)
}

fn far_endpoint(edge: &Edge, from: NodeId, direction: Direction) -> NodeId {
    match direction {
        Direction::Outgoing => edge.target,
        Direction::Incoming => edge.source,
        Direction::Both => edge.other_node(from).unwrap_or(from),
    }
}

fn env_node(env: &Env, var: &str) -> Result<Option<Node>> {
    match env.get(var) {
        Some(Value::Node(n)) => Ok(Some((**n).clone())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(Error::Type {
            expected: "NODE".into(),
            got: other.type_name().into(),
        }),
    }
}

impl<'e> RowSource<'e> for ExpandIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        loop {
            if let Some(env) = self.ready.pop_front() {
                return Ok(Some(env));
            }
            let Some(env) = self.child.next(cx)? else {
                return Ok(None);
            };
            let Some(src) = env_node(&env, self.source)? else {
                continue;
            };

            let bound_target = if self.target_bound {
                match env_node(&env, self.target)? {
                    Some(n) => Some(n),
                    None => continue,
                }
            } else {
                None
            };

            for edge in adjacency(cx, src.id, self.direction, self.types)? {
                let far_id = far_endpoint(&edge, src.id, self.direction);
                let far = match &bound_target {
                    Some(bound) => {
                        if bound.id != far_id {
                            continue;
                        }
                        bound.clone()
                    }
                    None => fetch_endpoint(cx, far_id)?,
                };
                let mut row = env.clone();
                if let Some(edge_var) = self.edge {
                    row.insert(edge_var.to_string(), Value::from(edge.clone()));
                }
                row.insert(self.target.to_string(), Value::from(far));
                self.ready.push_back(row);
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.ready.clear();
        self.child.close(cx);
    }
}

// ============================================================================
// OptionalExpand
// ============================================================================

/// Expand that null-extends instead of dropping rows without a match.
pub struct OptionalExpandIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    source: &'e str,
    edge: Option<&'e str>,
    target: &'e str,
    types: &'e [String],
    direction: Direction,
    predicate: Option<&'e Expr>,
    ready: VecDeque<Env>,
}

impl<'e> OptionalExpandIter<'e> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        source: &'e str,
        edge: Option<&'e str>,
        target: &'e str,
        types: &'e [String],
        direction: Direction,
        predicate: Option<&'e Expr>,
    ) -> Self {
        Self { child, source, edge, target, types, direction, predicate, ready: VecDeque::new() }
    }

    fn null_extended(&self, env: &Env) -> Env {
        let mut row = env.clone();
        if let Some(edge_var) = self.edge {
            row.insert(edge_var.to_string(), Value::Null);
        }
        row.insert(self.target.to_string(), Value::Null);
        row
    }
}

impl<'e> RowSource<'e> for OptionalExpandIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        loop {
            if let Some(env) = self.ready.pop_front() {
                return Ok(Some(env));
            }
            let Some(env) = self.child.next(cx)? else {
                return Ok(None);
            };
            let Some(src) = env_node(&env, self.source)? else {
                return Ok(Some(self.null_extended(&env)));
            };

            let mut matched = false;
            for edge in adjacency(cx, src.id, self.direction, self.types)? {
                let far_id = far_endpoint(&edge, src.id, self.direction);
                let far = fetch_endpoint(cx, far_id)?;
                let mut row = env.clone();
                if let Some(edge_var) = self.edge {
                    row.insert(edge_var.to_string(), Value::from(edge.clone()));
                }
                row.insert(self.target.to_string(), Value::from(far));

                if let Some(predicate) = self.predicate {
                    if eval::eval_predicate(predicate, &row, cx.params)? != Some(true) {
                        continue;
                    }
                }
                matched = true;
                self.ready.push_back(row);
            }

            if !matched {
                return Ok(Some(self.null_extended(&env)));
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.ready.clear();
        self.child.close(cx);
    }
}

// ============================================================================
// VarLengthExpand
// ============================================================================

/// Breadth-first expansion between `min` and `max` hops. Edges may not
/// repeat along one path; the relationship variable binds the edge list.
pub struct VarLengthExpandIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    source: &'e str,
    edge: Option<&'e str>,
    target: &'e str,
    types: &'e [String],
    direction: Direction,
    min: u32,
    max: Option<u32>,
    target_bound: bool,
    ready: VecDeque<Env>,
}

impl<'e> VarLengthExpandIter<'e> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        source: &'e str,
        edge: Option<&'e str>,
        target: &'e str,
        types: &'e [String],
        direction: Direction,
        min: u32,
        max: Option<u32>,
        target_bound: bool,
    ) -> Self {
        Self {
            child,
            source,
            edge,
            target,
            types,
            direction,
            min,
            max,
            target_bound,
            ready: VecDeque::new(),
        }
    }

    fn expand_row(&self, cx: &mut ExecContext<'_>, env: &Env, src: &Node) -> Result<Vec<Env>> {
        let cap = cx.config.max_expand_depth as u32;
        let max = match self.max {
            Some(m) if m > cap => return Err(Error::ExpandDepthExceeded(cap as usize)),
            Some(m) => m,
            None => cap,
        };

        let bound_target_id = if self.target_bound {
            match env_node(env, self.target)? {
                Some(n) => Some(n.id),
                None => return Ok(Vec::new()),
            }
        } else {
            None
        };

        let mut results: Vec<(NodeId, Vec<Edge>)> = Vec::new();
        if self.min == 0 {
            results.push((src.id, Vec::new()));
        }

        // Frontier of (endpoint, edges walked so far).
        let mut frontier: Vec<(NodeId, Vec<Edge>)> = vec![(src.id, Vec::new())];
        for depth in 1..=max {
            cx.check_cancelled()?;
            let mut next_frontier = Vec::new();
            for (tip, walked) in &frontier {
                for edge in adjacency(cx, *tip, self.direction, self.types)? {
                    if walked.iter().any(|w| w.id == edge.id) {
                        continue;
                    }
                    let far = far_endpoint(&edge, *tip, self.direction);
                    let mut path = walked.clone();
                    path.push(edge);
                    if depth >= self.min {
                        results.push((far, path.clone()));
                    }
                    if depth < max {
                        next_frontier.push((far, path));
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        let mut rows = Vec::new();
        for (far_id, path) in results {
            if let Some(bound) = bound_target_id {
                if bound != far_id {
                    continue;
                }
            }
            let far = if far_id == src.id {
                src.clone()
            } else {
                fetch_endpoint(cx, far_id)?
            };
            let mut row = env.clone();
            if let Some(edge_var) = self.edge {
                row.insert(
                    edge_var.to_string(),
                    Value::List(path.into_iter().map(Value::from).collect()),
                );
            }
            row.insert(self.target.to_string(), Value::from(far));
            rows.push(row);
        }
        Ok(rows)
    }
}

impl<'e> RowSource<'e> for VarLengthExpandIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        loop {
            if let Some(env) = self.ready.pop_front() {
                return Ok(Some(env));
            }
            let Some(env) = self.child.next(cx)? else {
                return Ok(None);
            };
            let Some(src) = env_node(&env, self.source)? else {
                continue;
            };
            for row in self.expand_row(cx, &env, &src)? {
                self.ready.push_back(row);
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.ready.clear();
        self.child.close(cx);
    }
}

// ============================================================================
// Filter
// ============================================================================

pub struct FilterIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    predicate: &'e Expr,
}

impl<'e> FilterIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, predicate: &'e Expr) -> Self {
        Self { child, predicate }
    }
}

impl<'e> RowSource<'e> for FilterIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        while let Some(env) = self.child.next(cx)? {
            // Only TRUE passes; FALSE and NULL rows are skipped.
            if eval::eval_predicate(self.predicate, &env, cx.params)? == Some(true) {
                return Ok(Some(env));
            }
        }
        Ok(None)
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// PathBind
// ============================================================================

/// Assembles a PATH value from already-bound node and edge variables.
pub struct PathBindIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    var: &'e str,
    nodes: &'e [String],
    edges: &'e [String],
}

impl<'e> PathBindIter<'e> {
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        var: &'e str,
        nodes: &'e [String],
        edges: &'e [String],
    ) -> Self {
        Self { child, var, nodes, edges }
    }
}

impl<'e> RowSource<'e> for PathBindIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(mut env) = self.child.next(cx)? else {
            return Ok(None);
        };

        let first = env_node(&env, &self.nodes[0])?
            .ok_or_else(|| Error::Runtime("path start is unbound".into()))?;
        let mut path = crate::model::Path::single(first);
        for (edge_var, node_var) in self.edges.iter().zip(self.nodes.iter().skip(1)) {
            let edge = match env.get(edge_var.as_str()) {
                Some(Value::Edge(e)) => (**e).clone(),
                other => {
                    return Err(Error::Runtime(format!(
                        "path element '{edge_var}' is not a relationship: {other:?}"
                    )))
                }
            };
            let node = env_node(&env, node_var)?
                .ok_or_else(|| Error::Runtime("path node is unbound".into()))?;
            path.append(edge, node);
        }

        env.insert(self.var.to_string(), Value::from(path));
        Ok(Some(env))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// Projection
// ============================================================================

pub struct ProjectionIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    items: &'e [(Expr, String)],
}

impl<'e> ProjectionIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, items: &'e [(Expr, String)]) -> Self {
        Self { child, items }
    }
}

impl<'e> RowSource<'e> for ProjectionIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(env) = self.child.next(cx)? else {
            return Ok(None);
        };
        let mut projected = Env::new();
        for (expr, name) in self.items {
            projected.insert(name.clone(), eval::eval_expr(expr, &env, cx.params)?);
        }
        Ok(Some(projected))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// Skip / Limit
// ============================================================================

pub struct SkipIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    count: &'e Expr,
    remaining: usize,
}

impl<'e> SkipIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, count: &'e Expr) -> Self {
        Self { child, count, remaining: 0 }
    }
}

impl<'e> RowSource<'e> for SkipIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)?;
        self.remaining = eval_count(self.count, cx)?;
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        while self.remaining > 0 {
            self.remaining -= 1;
            if self.child.next(cx)?.is_none() {
                return Ok(None);
            }
        }
        self.child.next(cx)
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

pub struct LimitIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    count: &'e Expr,
    remaining: usize,
}

impl<'e> LimitIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, count: &'e Expr) -> Self {
        Self { child, count, remaining: 0 }
    }
}

impl<'e> RowSource<'e> for LimitIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)?;
        self.remaining = eval_count(self.count, cx)?;
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.child.next(cx)? {
            Some(env) => {
                self.remaining -= 1;
                Ok(Some(env))
            }
            None => {
                self.remaining = 0;
                Ok(None)
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// Union
// ============================================================================

/// Left rows first, then right; deduplication is a Distinct above.
pub struct UnionIter<'e> {
    left: Box<dyn RowSource<'e> + 'e>,
    right: Box<dyn RowSource<'e> + 'e>,
    on_right: bool,
}

impl<'e> UnionIter<'e> {
    pub fn new(left: Box<dyn RowSource<'e> + 'e>, right: Box<dyn RowSource<'e> + 'e>) -> Self {
        Self { left, right, on_right: false }
    }
}

impl<'e> RowSource<'e> for UnionIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.left.open(cx)?;
        self.right.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        if !self.on_right {
            if let Some(env) = self.left.next(cx)? {
                return Ok(Some(env));
            }
            self.on_right = true;
        }
        self.right.next(cx)
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.left.close(cx);
        self.right.close(cx);
    }
}

// ============================================================================
// Unwind
// ============================================================================

pub struct UnwindIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    expr: &'e Expr,
    var: &'e str,
    ready: VecDeque<Env>,
}

impl<'e> UnwindIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, expr: &'e Expr, var: &'e str) -> Self {
        Self { child, expr, var, ready: VecDeque::new() }
    }
}

impl<'e> RowSource<'e> for UnwindIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        loop {
            if let Some(env) = self.ready.pop_front() {
                return Ok(Some(env));
            }
            let Some(env) = self.child.next(cx)? else {
                return Ok(None);
            };
            match eval::eval_expr(self.expr, &env, cx.params)? {
                Value::List(items) => {
                    for item in items {
                        let mut row = env.clone();
                        row.insert(self.var.to_string(), item);
                        self.ready.push_back(row);
                    }
                }
                // UNWIND NULL produces no rows; a scalar produces one.
                Value::Null => {}
                other => {
                    let mut row = env;
                    row.insert(self.var.to_string(), other);
                    self.ready.push_back(row);
                }
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.ready.clear();
        self.child.close(cx);
    }
}
