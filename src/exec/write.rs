//! Mutating iterators: CREATE, MERGE, SET, REMOVE, DELETE.
//!
//! Each applies its mutation per input row through the storage adapter and
//! feeds the schema tracker opportunistically. CREATE emits its binding
//! rows so `CREATE ... RETURN` works; DELETE consumes its input and emits
//! nothing.

use hashbrown::HashSet;

use crate::cypher::ast::{Expr, RemoveItem, SetItem};
use crate::error::{Error, Result};
use crate::eval::{self, Env};
use crate::model::{Edge, EdgeId, Node, NodeId, PropertyMap, Value};
use crate::planner::logical::{EdgeSpec, NodeSpec};

use super::{ExecContext, RowSource};

/// Evaluate a property expression list. NULL-valued entries are dropped, as
/// a NULL property and an absent one are indistinguishable.
fn eval_properties(
    props: &[(String, Expr)],
    env: &Env,
    cx: &ExecContext<'_>,
) -> Result<PropertyMap> {
    let mut map = PropertyMap::new();
    for (key, expr) in props {
        let value = eval::eval_expr(expr, env, cx.params)?;
        if !value.is_null() {
            map.insert(key.clone(), value);
        }
    }
    Ok(map)
}

fn env_node(env: &Env, var: &str) -> Result<Node> {
    match env.get(var) {
        Some(Value::Node(n)) => Ok((**n).clone()),
        Some(other) => Err(Error::Type {
            expected: "NODE".into(),
            got: other.type_name().into(),
        }),
        None => Err(Error::UndefinedVariable(var.to_string())),
    }
}

// ============================================================================
// CREATE
// ============================================================================

pub struct CreateIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    nodes: &'e [NodeSpec],
    edges: &'e [EdgeSpec],
}

impl<'e> CreateIter<'e> {
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        nodes: &'e [NodeSpec],
        edges: &'e [EdgeSpec],
    ) -> Self {
        Self { child, nodes, edges }
    }
}

impl<'e> RowSource<'e> for CreateIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(mut env) = self.child.next(cx)? else {
            return Ok(None);
        };

        for spec in self.nodes {
            let props = eval_properties(&spec.properties, &env, cx)?;
            let labels: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
            let id = cx.store.add_node(None, &labels, props.clone())?;
            cx.stats.nodes_created += 1;
            if let Some(tracker) = cx.tracker {
                tracker.observe_node_created(&spec.labels);
            }
            let node = Node {
                id,
                labels: spec.labels.iter().cloned().collect(),
                properties: props,
            };
            env.insert(spec.var.clone(), Value::from(node));
        }

        for spec in self.edges {
            let source = env_node(&env, &spec.source)?;
            let target = env_node(&env, &spec.target)?;
            let mut props = eval_properties(&spec.properties, &env, cx)?;
            // A numeric `weight` entry populates the weight column.
            let weight = match props.get("weight").and_then(Value::as_float) {
                Some(w) => {
                    props.remove("weight");
                    w
                }
                None => 1.0,
            };
            let id = cx.store.add_edge(
                source.id,
                target.id,
                &spec.edge_type,
                weight,
                props.clone(),
            )?;
            cx.stats.edges_created += 1;
            if let Some(tracker) = cx.tracker {
                tracker.observe_edge_created(&spec.edge_type);
            }
            if let Some(var) = &spec.var {
                let edge = Edge {
                    id,
                    source: source.id,
                    target: target.id,
                    edge_type: spec.edge_type.clone(),
                    weight,
                    properties: props,
                };
                env.insert(var.clone(), Value::from(edge));
            }
        }

        Ok(Some(env))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Match-or-create for a single node pattern, with ON CREATE / ON MATCH
/// property actions.
pub struct MergeIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    node: &'e NodeSpec,
    on_create: &'e [SetItem],
    on_match: &'e [SetItem],
    ready: std::collections::VecDeque<Env>,
}

impl<'e> MergeIter<'e> {
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        node: &'e NodeSpec,
        on_create: &'e [SetItem],
        on_match: &'e [SetItem],
    ) -> Self {
        Self { child, node, on_create, on_match, ready: std::collections::VecDeque::new() }
    }

    fn matching_nodes(&self, cx: &ExecContext<'_>, props: &PropertyMap) -> Result<Vec<Node>> {
        let candidates: Vec<Node> = match self.node.labels.first() {
            Some(label) => cx.store.find_nodes_by_label(label)?.collect::<Result<_>>()?,
            None => cx.store.all_nodes()?.collect::<Result<_>>()?,
        };
        Ok(candidates
            .into_iter()
            .filter(|n| self.node.labels.iter().all(|l| n.has_label(l)))
            .filter(|n| {
                props.iter().all(|(key, expected)| {
                    n.get(key).is_some_and(|v| v.cypher_eq(expected) == Some(true))
                })
            })
            .collect())
    }
}

impl<'e> RowSource<'e> for MergeIter<'e> {
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

            let props = eval_properties(&self.node.properties, &env, cx)?;
            let matches = self.matching_nodes(cx, &props)?;

            if matches.is_empty() {
                let labels: Vec<&str> = self.node.labels.iter().map(String::as_str).collect();
                let id = cx.store.add_node(None, &labels, props.clone())?;
                cx.stats.nodes_created += 1;
                if let Some(tracker) = cx.tracker {
                    tracker.observe_node_created(&self.node.labels);
                }
                let mut row = env.clone();
                row.insert(
                    self.node.var.clone(),
                    Value::from(Node {
                        id,
                        labels: self.node.labels.iter().cloned().collect(),
                        properties: props,
                    }),
                );
                apply_set_items(cx, &mut row, self.on_create)?;
                self.ready.push_back(row);
            } else {
                for node in matches {
                    let mut row = env.clone();
                    row.insert(self.node.var.clone(), Value::from(node));
                    apply_set_items(cx, &mut row, self.on_match)?;
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

// ============================================================================
// SET / REMOVE
// ============================================================================

pub struct SetPropsIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    items: &'e [SetItem],
}

impl<'e> SetPropsIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, items: &'e [SetItem]) -> Self {
        Self { child, items }
    }
}

impl<'e> RowSource<'e> for SetPropsIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(mut env) = self.child.next(cx)? else {
            return Ok(None);
        };
        apply_set_items(cx, &mut env, self.items)?;
        Ok(Some(env))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

fn apply_set_items(cx: &mut ExecContext<'_>, env: &mut Env, items: &[SetItem]) -> Result<()> {
    let mut touched: Vec<String> = Vec::new();

    for item in items {
        match item {
            SetItem::Property { variable, key, value } => {
                let new_value = eval::eval_expr(value, env, cx.params)?;
                match env.get(variable) {
                    Some(Value::Node(n)) => {
                        cx.store.set_node_property(n.id, key, new_value)?;
                    }
                    Some(Value::Edge(e)) => {
                        cx.store.set_edge_property(e.id, key, new_value)?;
                    }
                    Some(Value::Null) => continue,
                    Some(other) => {
                        return Err(Error::Type {
                            expected: "NODE or RELATIONSHIP".into(),
                            got: other.type_name().into(),
                        })
                    }
                    None => return Err(Error::UndefinedVariable(variable.clone())),
                }
                cx.stats.properties_set += 1;
            }
            SetItem::Replace { variable, value } => {
                let node = env_node(env, variable)?;
                match eval::eval_expr(value, env, cx.params)? {
                    Value::Map(map) => {
                        let map: PropertyMap =
                            map.into_iter().filter(|(_, v)| !v.is_null()).collect();
                        let count = map.len() as u64;
                        cx.store.update_node_properties(node.id, map)?;
                        cx.stats.properties_set += count;
                    }
                    other => {
                        return Err(Error::Type {
                            expected: "MAP".into(),
                            got: other.type_name().into(),
                        })
                    }
                }
            }
            SetItem::Merge { variable, value } => {
                match eval::eval_expr(value, env, cx.params)? {
                    Value::Map(map) => match env.get(variable) {
                        Some(Value::Node(n)) => {
                            let id = n.id;
                            for (key, val) in map {
                                cx.store.set_node_property(id, &key, val)?;
                                cx.stats.properties_set += 1;
                            }
                        }
                        Some(Value::Edge(e)) => {
                            let id = e.id;
                            for (key, val) in map {
                                cx.store.set_edge_property(id, &key, val)?;
                                cx.stats.properties_set += 1;
                            }
                        }
                        Some(Value::Null) => continue,
                        _ => {
                            return Err(Error::Type {
                                expected: "NODE or RELATIONSHIP".into(),
                                got: "other".into(),
                            })
                        }
                    },
                    other => {
                        return Err(Error::Type {
                            expected: "MAP".into(),
                            got: other.type_name().into(),
                        })
                    }
                }
            }
            SetItem::Label { variable, label } => {
                let node = env_node(env, variable)?;
                cx.store.add_label(node.id, label)?;
                cx.stats.labels_added += 1;
                if let Some(tracker) = cx.tracker {
                    tracker.observe_label_added(label);
                }
            }
        }
        let variable = match item {
            SetItem::Property { variable, .. }
            | SetItem::Replace { variable, .. }
            | SetItem::Merge { variable, .. }
            | SetItem::Label { variable, .. } => variable,
        };
        if !touched.contains(variable) {
            touched.push(variable.clone());
        }
    }

    refresh_bindings(cx, env, &touched)
}

/// Re-fetch mutated entities so downstream operators see current state.
fn refresh_bindings(cx: &ExecContext<'_>, env: &mut Env, vars: &[String]) -> Result<()> {
    for var in vars {
        match env.get(var) {
            Some(Value::Node(n)) => {
                if let Some(node) = cx.store.node(n.id)? {
                    env.insert(var.clone(), Value::from(node));
                }
            }
            Some(Value::Edge(e)) => {
                if let Some(edge) = cx.store.edge(e.id)? {
                    env.insert(var.clone(), Value::from(edge));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

pub struct RemovePropsIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    items: &'e [RemoveItem],
}

impl<'e> RemovePropsIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, items: &'e [RemoveItem]) -> Self {
        Self { child, items }
    }
}

impl<'e> RowSource<'e> for RemovePropsIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let Some(mut env) = self.child.next(cx)? else {
            return Ok(None);
        };

        let mut touched: Vec<String> = Vec::new();
        for item in self.items {
            match item {
                RemoveItem::Property { variable, key } => match env.get(variable) {
                    Some(Value::Node(n)) => {
                        cx.store.remove_node_property(n.id, key)?;
                        cx.stats.properties_set += 1;
                    }
                    Some(Value::Edge(e)) => {
                        cx.store.remove_edge_property(e.id, key)?;
                        cx.stats.properties_set += 1;
                    }
                    Some(Value::Null) => continue,
                    Some(other) => {
                        return Err(Error::Type {
                            expected: "NODE or RELATIONSHIP".into(),
                            got: other.type_name().into(),
                        })
                    }
                    None => return Err(Error::UndefinedVariable(variable.clone())),
                },
                RemoveItem::Label { variable, label } => {
                    let node = env_node(&env, variable)?;
                    cx.store.remove_label(node.id, label)?;
                    cx.stats.labels_removed += 1;
                }
            }
            let variable = match item {
                RemoveItem::Property { variable, .. } | RemoveItem::Label { variable, .. } => {
                    variable
                }
            };
            if !touched.contains(variable) {
                touched.push(variable.clone());
            }
        }
        refresh_bindings(cx, &mut env, &touched)?;
        Ok(Some(env))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// Consumes all input rows, applies the deletions, and emits nothing.
pub struct DeleteIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    vars: &'e [String],
    detach: bool,
    done: bool,
}

impl<'e> DeleteIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, vars: &'e [String], detach: bool) -> Self {
        Self { child, vars, detach, done: false }
    }
}

impl<'e> RowSource<'e> for DeleteIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        if self.done {
            return Ok(None);
        }
        self.done = true;

        // Drain first: the same entity may appear in several rows.
        let mut node_targets: Vec<(NodeId, Vec<String>)> = Vec::new();
        let mut edge_targets: Vec<EdgeId> = Vec::new();
        let mut seen_nodes: HashSet<NodeId> = HashSet::new();
        let mut seen_edges: HashSet<EdgeId> = HashSet::new();

        while let Some(env) = self.child.next(cx)? {
            cx.check_cancelled()?;
            for var in self.vars {
                match env.get(var) {
                    Some(Value::Node(n)) => {
                        if seen_nodes.insert(n.id) {
                            node_targets.push((n.id, n.labels.to_vec()));
                        }
                    }
                    Some(Value::Edge(e)) => {
                        if seen_edges.insert(e.id) {
                            edge_targets.push(e.id);
                        }
                    }
                    Some(Value::List(items)) => {
                        // A variable-length relationship binds an edge list.
                        for item in items {
                            if let Value::Edge(e) = item {
                                if seen_edges.insert(e.id) {
                                    edge_targets.push(e.id);
                                }
                            }
                        }
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(Error::Type {
                            expected: "NODE or RELATIONSHIP".into(),
                            got: other.type_name().into(),
                        })
                    }
                }
            }
        }

        for id in edge_targets {
            if cx.store.delete_edge(id)? {
                cx.stats.edges_deleted += 1;
                if let Some(tracker) = cx.tracker {
                    tracker.observe_edge_deleted(1);
                }
            }
        }
        for (id, labels) in node_targets {
            if cx.store.delete_node(id, self.detach)? {
                cx.stats.nodes_deleted += 1;
                if let Some(tracker) = cx.tracker {
                    tracker.observe_node_deleted(&labels);
                }
            }
        }

        Ok(None)
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.child.close(cx);
    }
}
