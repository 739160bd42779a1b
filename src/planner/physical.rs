//! Physical planner.
//!
//! Maps each logical operator to exactly one physical operator, estimating
//! rows and cost bottom-up from schema-tracker statistics. Join order is
//! chosen greedily (smallest estimated product first), and a property
//! equality over an indexed label scan becomes an index seek.

use tracing::debug;

use crate::cypher::ast::{BinaryOp, Expr, ExprKind, Literal, RemoveItem, SetItem};
use crate::model::Direction;
use crate::schema::SchemaStats;

use super::logical::{AggregateCall, EdgeSpec, LogicalPlan, NodeSpec};

// Selectivity defaults.
const SEL_PROPERTY_EQ: f64 = 0.1;
const SEL_LABEL_OR_TYPE: f64 = 0.3;
const SEL_DEFAULT: f64 = 0.5;
const JOIN_OVERLAP: f64 = 0.75;

/// A physical operator with its estimates.
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    pub op: PhysicalOp,
    pub est_rows: f64,
    pub est_cost: f64,
}

#[derive(Debug, Clone)]
pub enum PhysicalOp {
    Argument,
    AllNodesScan {
        var: String,
    },
    LabelScan {
        var: String,
        label: String,
    },
    /// Label scan narrowed by an indexed property equality.
    NodeIndexSeek {
        var: String,
        label: String,
        property: String,
        value: Expr,
    },
    AllEdgesScan {
        source: String,
        edge: String,
        target: String,
        types: Vec<String>,
    },
    Expand {
        input: Box<PhysicalPlan>,
        source: String,
        edge: Option<String>,
        target: String,
        types: Vec<String>,
        direction: Direction,
        target_bound: bool,
    },
    OptionalExpand {
        input: Box<PhysicalPlan>,
        source: String,
        edge: Option<String>,
        target: String,
        types: Vec<String>,
        direction: Direction,
        predicate: Option<Expr>,
    },
    VarLengthExpand {
        input: Box<PhysicalPlan>,
        source: String,
        edge: Option<String>,
        target: String,
        types: Vec<String>,
        direction: Direction,
        min: u32,
        max: Option<u32>,
        target_bound: bool,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: Expr,
    },
    PathBind {
        input: Box<PhysicalPlan>,
        var: String,
        nodes: Vec<String>,
        edges: Vec<String>,
    },
    HashJoin {
        /// Build side; fully drained during open.
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        join_vars: Vec<String>,
    },
    CartesianProduct {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
    },
    Projection {
        input: Box<PhysicalPlan>,
        items: Vec<(Expr, String)>,
    },
    Aggregation {
        input: Box<PhysicalPlan>,
        group_keys: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateCall, String)>,
    },
    Distinct {
        input: Box<PhysicalPlan>,
    },
    Sort {
        input: Box<PhysicalPlan>,
        keys: Vec<(Expr, bool)>,
    },
    Skip {
        input: Box<PhysicalPlan>,
        count: Expr,
    },
    Limit {
        input: Box<PhysicalPlan>,
        count: Expr,
    },
    Union {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
    },
    Unwind {
        input: Box<PhysicalPlan>,
        expr: Expr,
        var: String,
    },
    Create {
        input: Box<PhysicalPlan>,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    },
    Merge {
        input: Box<PhysicalPlan>,
        node: NodeSpec,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    SetProps {
        input: Box<PhysicalPlan>,
        items: Vec<SetItem>,
    },
    RemoveProps {
        input: Box<PhysicalPlan>,
        items: Vec<RemoveItem>,
    },
    Delete {
        input: Box<PhysicalPlan>,
        vars: Vec<String>,
        detach: bool,
    },
}

impl PhysicalPlan {
    fn new(op: PhysicalOp, est_rows: f64, est_cost: f64) -> Self {
        Self { op, est_rows: est_rows.max(0.0), est_cost: est_cost.max(0.0) }
    }

    /// Does the plan carry a LIMIT anywhere above blocking boundaries? Used
    /// by the executor to decide whether the row cap applies.
    pub fn has_limit(&self) -> bool {
        match &self.op {
            PhysicalOp::Limit { .. } => true,
            PhysicalOp::Skip { input, .. }
            | PhysicalOp::Distinct { input }
            | PhysicalOp::Sort { input, .. }
            | PhysicalOp::Projection { input, .. }
            | PhysicalOp::Filter { input, .. } => input.has_limit(),
            PhysicalOp::Union { left, right } => left.has_limit() && right.has_limit(),
            _ => false,
        }
    }

    /// Output column names, mirroring the logical computation.
    pub fn output_columns(&self) -> Vec<String> {
        match &self.op {
            PhysicalOp::Projection { items, .. } => {
                items.iter().map(|(_, n)| n.clone()).collect()
            }
            PhysicalOp::Aggregation { group_keys, aggregates, .. } => group_keys
                .iter()
                .map(|(_, n)| n.clone())
                .chain(aggregates.iter().map(|(_, n)| n.clone()))
                .collect(),
            PhysicalOp::Distinct { input }
            | PhysicalOp::Sort { input, .. }
            | PhysicalOp::Skip { input, .. }
            | PhysicalOp::Limit { input, .. }
            | PhysicalOp::Filter { input, .. } => input.output_columns(),
            PhysicalOp::Union { left, .. } => left.output_columns(),
            _ => Vec::new(),
        }
    }

    /// Variables bound by this subtree.
    fn bound_vars(&self) -> Vec<String> {
        fn push(out: &mut Vec<String>, v: &str) {
            if !out.iter().any(|x| x == v) {
                out.push(v.to_string());
            }
        }
        fn collect(plan: &PhysicalPlan, out: &mut Vec<String>) {
            match &plan.op {
                PhysicalOp::Argument => {}
                PhysicalOp::AllNodesScan { var }
                | PhysicalOp::LabelScan { var, .. }
                | PhysicalOp::NodeIndexSeek { var, .. } => push(out, var),
                PhysicalOp::AllEdgesScan { source, edge, target, .. } => {
                    push(out, source);
                    push(out, edge);
                    push(out, target);
                }
                PhysicalOp::Expand { input, source, edge, target, .. }
                | PhysicalOp::OptionalExpand { input, source, edge, target, .. }
                | PhysicalOp::VarLengthExpand { input, source, edge, target, .. } => {
                    collect(input, out);
                    push(out, source);
                    if let Some(e) = edge {
                        push(out, e);
                    }
                    push(out, target);
                }
                PhysicalOp::Filter { input, .. }
                | PhysicalOp::Distinct { input }
                | PhysicalOp::Sort { input, .. }
                | PhysicalOp::Skip { input, .. }
                | PhysicalOp::Limit { input, .. } => collect(input, out),
                PhysicalOp::PathBind { input, var, .. } => {
                    collect(input, out);
                    push(out, var);
                }
                PhysicalOp::HashJoin { left, right, .. }
                | PhysicalOp::CartesianProduct { left, right } => {
                    collect(left, out);
                    collect(right, out);
                }
                PhysicalOp::Union { left, .. } => collect(left, out),
                PhysicalOp::Projection { items, .. } => {
                    for (_, name) in items {
                        push(out, name);
                    }
                }
                PhysicalOp::Aggregation { group_keys, aggregates, .. } => {
                    for (_, name) in group_keys {
                        push(out, name);
                    }
                    for (_, name) in aggregates {
                        push(out, name);
                    }
                }
                PhysicalOp::Unwind { input, var, .. } => {
                    collect(input, out);
                    push(out, var);
                }
                PhysicalOp::Create { input, nodes, edges } => {
                    collect(input, out);
                    for n in nodes {
                        push(out, &n.var);
                    }
                    for e in edges {
                        if let Some(v) = &e.var {
                            push(out, v);
                        }
                    }
                }
                PhysicalOp::Merge { input, node, .. } => {
                    collect(input, out);
                    push(out, &node.var);
                }
                PhysicalOp::SetProps { input, .. }
                | PhysicalOp::RemoveProps { input, .. }
                | PhysicalOp::Delete { input, .. } => collect(input, out),
            }
        }
        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }
}

// ============================================================================
// Planning
// ============================================================================

pub fn plan_physical(logical: LogicalPlan, stats: &SchemaStats) -> PhysicalPlan {
    let physical = convert(logical, stats);
    debug!(rows = physical.est_rows, cost = physical.est_cost, "physical plan");
    physical
}

fn convert(logical: LogicalPlan, stats: &SchemaStats) -> PhysicalPlan {
    let node_count = stats.node_count.max(1) as f64;
    let edge_count = stats.edge_count.max(1) as f64;
    let degree = stats.avg_out_degree();

    match logical {
        LogicalPlan::Argument => PhysicalPlan::new(PhysicalOp::Argument, 1.0, 0.0),

        LogicalPlan::AllNodesScan { var } => {
            PhysicalPlan::new(PhysicalOp::AllNodesScan { var }, node_count, node_count)
        }

        LogicalPlan::LabelScan { var, label } => {
            let freq = label_rows(stats, &label);
            PhysicalPlan::new(PhysicalOp::LabelScan { var, label }, freq, freq)
        }

        LogicalPlan::AllEdgesScan { source, edge, target, types } => {
            let rows = if types.is_empty() {
                edge_count
            } else {
                edge_count * SEL_LABEL_OR_TYPE
            };
            // Each emitted edge fetches both endpoints.
            PhysicalPlan::new(
                PhysicalOp::AllEdgesScan { source, edge, target, types },
                rows,
                edge_count + 2.0 * rows,
            )
        }

        LogicalPlan::Expand { input, source, edge, target, types, direction, target_bound } => {
            let input = convert(*input, stats);
            let mut rows = input.est_rows * degree;
            if !types.is_empty() {
                rows *= SEL_LABEL_OR_TYPE;
            }
            if target_bound {
                rows *= SEL_PROPERTY_EQ;
            }
            let cost = input.est_cost + input.est_rows * degree;
            PhysicalPlan::new(
                PhysicalOp::Expand {
                    input: input.into(),
                    source,
                    edge,
                    target,
                    types,
                    direction,
                    target_bound,
                },
                rows,
                cost,
            )
        }

        LogicalPlan::OptionalExpand { input, source, edge, target, types, direction, predicate } => {
            let input = convert(*input, stats);
            // Null extension keeps at least one row per input row.
            let rows = (input.est_rows * degree).max(input.est_rows);
            let cost = input.est_cost + input.est_rows * degree;
            PhysicalPlan::new(
                PhysicalOp::OptionalExpand {
                    input: input.into(),
                    source,
                    edge,
                    target,
                    types,
                    direction,
                    predicate,
                },
                rows,
                cost,
            )
        }

        LogicalPlan::VarLengthExpand {
            input, source, edge, target, types, direction, min, max, target_bound,
        } => {
            let input = convert(*input, stats);
            let hops = max.unwrap_or(min.saturating_add(2)).min(6);
            let fanout = degree.powi(hops.max(1) as i32);
            let rows = input.est_rows * fanout;
            let cost = input.est_cost + rows;
            PhysicalPlan::new(
                PhysicalOp::VarLengthExpand {
                    input: input.into(),
                    source,
                    edge,
                    target,
                    types,
                    direction,
                    min,
                    max,
                    target_bound,
                },
                rows,
                cost,
            )
        }

        LogicalPlan::Filter { input, predicate } => {
            let input = convert(*input, stats);
            // An equality on an indexed property over a label scan becomes a
            // seek.
            if let Some(seek) = try_index_seek(&input, &predicate, stats) {
                return seek;
            }
            let rows = input.est_rows * selectivity(&predicate);
            let cost = input.est_cost + input.est_rows;
            PhysicalPlan::new(
                PhysicalOp::Filter { input: input.into(), predicate },
                rows,
                cost,
            )
        }

        LogicalPlan::PathBind { input, var, nodes, edges } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows;
            PhysicalPlan::new(
                PhysicalOp::PathBind { input: input.into(), var, nodes, edges },
                rows,
                cost,
            )
        }

        LogicalPlan::HashJoin { .. } | LogicalPlan::CartesianProduct { .. } => {
            plan_joins(logical, stats)
        }

        LogicalPlan::Projection { input, items } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows;
            PhysicalPlan::new(PhysicalOp::Projection { input: input.into(), items }, rows, cost)
        }

        LogicalPlan::Aggregation { input, group_keys, aggregates } => {
            let input = convert(*input, stats);
            let rows = if group_keys.is_empty() {
                1.0
            } else {
                (input.est_rows * SEL_PROPERTY_EQ).max(1.0)
            };
            let cost = input.est_cost + input.est_rows;
            PhysicalPlan::new(
                PhysicalOp::Aggregation { input: input.into(), group_keys, aggregates },
                rows,
                cost,
            )
        }

        LogicalPlan::Distinct { input } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows;
            PhysicalPlan::new(PhysicalOp::Distinct { input: input.into() }, rows, cost)
        }

        LogicalPlan::Sort { input, keys } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows * rows.max(2.0).log2();
            PhysicalPlan::new(PhysicalOp::Sort { input: input.into(), keys }, rows, cost)
        }

        LogicalPlan::Skip { input, count } => {
            let input = convert(*input, stats);
            let rows = match literal_count(&count) {
                Some(n) => (input.est_rows - n as f64).max(0.0),
                None => input.est_rows,
            };
            let cost = input.est_cost;
            PhysicalPlan::new(PhysicalOp::Skip { input: input.into(), count }, rows, cost)
        }

        LogicalPlan::Limit { input, count } => {
            let input = convert(*input, stats);
            let rows = match literal_count(&count) {
                Some(n) => input.est_rows.min(n as f64),
                None => input.est_rows,
            };
            let cost = input.est_cost;
            PhysicalPlan::new(PhysicalOp::Limit { input: input.into(), count }, rows, cost)
        }

        LogicalPlan::Union { left, right } => {
            let left = convert(*left, stats);
            let right = convert(*right, stats);
            let rows = left.est_rows + right.est_rows;
            let cost = left.est_cost + right.est_cost;
            PhysicalPlan::new(
                PhysicalOp::Union { left: left.into(), right: right.into() },
                rows,
                cost,
            )
        }

        LogicalPlan::Unwind { input, expr, var } => {
            let input = convert(*input, stats);
            let rows = input.est_rows * 3.0;
            let cost = input.est_cost + rows;
            PhysicalPlan::new(PhysicalOp::Unwind { input: input.into(), expr, var }, rows, cost)
        }

        LogicalPlan::Create { input, nodes, edges } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows * (nodes.len() + edges.len()) as f64;
            PhysicalPlan::new(
                PhysicalOp::Create { input: input.into(), nodes, edges },
                rows,
                cost,
            )
        }

        LogicalPlan::Merge { input, node, on_create, on_match } => {
            let input = convert(*input, stats);
            let freq = node
                .labels
                .first()
                .map(|l| label_rows(stats, l))
                .unwrap_or(node_count);
            let rows = input.est_rows;
            let cost = input.est_cost + rows * freq;
            PhysicalPlan::new(
                PhysicalOp::Merge { input: input.into(), node, on_create, on_match },
                rows,
                cost,
            )
        }

        LogicalPlan::SetProps { input, items } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows * items.len() as f64;
            PhysicalPlan::new(PhysicalOp::SetProps { input: input.into(), items }, rows, cost)
        }

        LogicalPlan::RemoveProps { input, items } => {
            let input = convert(*input, stats);
            let rows = input.est_rows;
            let cost = input.est_cost + rows * items.len() as f64;
            PhysicalPlan::new(PhysicalOp::RemoveProps { input: input.into(), items }, rows, cost)
        }

        LogicalPlan::Delete { input, vars, detach } => {
            let input = convert(*input, stats);
            let cost = input.est_cost + input.est_rows;
            PhysicalPlan::new(
                PhysicalOp::Delete { input: input.into(), vars, detach },
                0.0,
                cost,
            )
        }
    }
}

fn label_rows(stats: &SchemaStats, label: &str) -> f64 {
    let freq = stats.label_frequency(label);
    if freq == 0 {
        // Unknown labels still cost a probe.
        1.0
    } else {
        freq as f64
    }
}

fn literal_count(expr: &Expr) -> Option<u64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) if *n >= 0 => Some(*n as u64),
        _ => None,
    }
}

/// Selectivity heuristic for one predicate (conjunctions multiply).
fn selectivity(predicate: &Expr) -> f64 {
    match &predicate.kind {
        ExprKind::Binary { op: BinaryOp::And, left, right } => {
            selectivity(left) * selectivity(right)
        }
        ExprKind::Binary { op: BinaryOp::Eq, left, right } => {
            let on_property = matches!(left.kind, ExprKind::Property { .. })
                || matches!(right.kind, ExprKind::Property { .. });
            let on_type = is_type_call(left) || is_type_call(right);
            if on_type {
                SEL_LABEL_OR_TYPE
            } else if on_property {
                SEL_PROPERTY_EQ
            } else {
                SEL_DEFAULT
            }
        }
        ExprKind::HasLabel { .. } => SEL_LABEL_OR_TYPE,
        _ => SEL_DEFAULT,
    }
}

fn is_type_call(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::FunctionCall { name, .. } if name.eq_ignore_ascii_case("type"))
}

/// `Filter(label_scan.prop = const)` with a covering index becomes a seek.
fn try_index_seek(
    input: &PhysicalPlan,
    predicate: &Expr,
    stats: &SchemaStats,
) -> Option<PhysicalPlan> {
    let PhysicalOp::LabelScan { var, label } = &input.op else {
        return None;
    };
    let ExprKind::Binary { op: BinaryOp::Eq, left, right } = &predicate.kind else {
        return None;
    };
    let (prop_expr, value) = if matches!(left.kind, ExprKind::Property { .. }) {
        (left, right)
    } else if matches!(right.kind, ExprKind::Property { .. }) {
        (right, left)
    } else {
        return None;
    };
    let ExprKind::Property { base, key } = &prop_expr.kind else {
        return None;
    };
    if !matches!(&base.kind, ExprKind::Variable(v) if v == var) {
        return None;
    }
    if !super::logical::free_vars(value).is_empty() {
        return None;
    }
    if !stats.has_index(label, key) {
        return None;
    }

    let rows = (label_rows(stats, label) * SEL_PROPERTY_EQ).max(1.0);
    Some(PhysicalPlan::new(
        PhysicalOp::NodeIndexSeek {
            var: var.clone(),
            label: label.clone(),
            property: key.clone(),
            value: (**value).clone(),
        },
        rows,
        rows,
    ))
}

// ============================================================================
// Join ordering
// ============================================================================

/// Flatten a nested join subtree into components, then combine greedily:
/// among candidate pairs the smallest rows-product wins, shared-variable
/// pairs before cartesian ones; ties keep source order.
fn plan_joins(logical: LogicalPlan, stats: &SchemaStats) -> PhysicalPlan {
    let mut components: Vec<PhysicalPlan> = Vec::new();
    flatten_joins(logical, stats, &mut components);

    while components.len() > 1 {
        let mut best: Option<(usize, usize, bool, f64)> = None;
        for i in 0..components.len() {
            for j in (i + 1)..components.len() {
                let shared = shared_vars(&components[i], &components[j]);
                let product = components[i].est_rows * components[j].est_rows;
                let joined = !shared.is_empty();
                let better = match best {
                    None => true,
                    Some((_, _, best_joined, best_product)) => {
                        (joined && !best_joined)
                            || (joined == best_joined && product < best_product)
                    }
                };
                if better {
                    best = Some((i, j, joined, product));
                }
            }
        }

        let (i, j, joined, _) = best.expect("at least two components");
        let right = components.remove(j);
        let left = components.remove(i);
        let combined = if joined {
            let join_vars = shared_vars(&left, &right);
            // Build side is the smaller input.
            let (build, probe) = if left.est_rows <= right.est_rows {
                (left, right)
            } else {
                (right, left)
            };
            let rows = build.est_rows.min(probe.est_rows) * JOIN_OVERLAP;
            let cost =
                build.est_cost + probe.est_cost + 2.0 * build.est_rows + probe.est_rows;
            PhysicalPlan::new(
                PhysicalOp::HashJoin { left: build.into(), right: probe.into(), join_vars },
                rows,
                cost,
            )
        } else {
            let rows = left.est_rows * right.est_rows;
            let cost = left.est_cost + right.est_cost + rows;
            PhysicalPlan::new(
                PhysicalOp::CartesianProduct { left: left.into(), right: right.into() },
                rows,
                cost,
            )
        };
        components.insert(i, combined);
    }

    components.pop().expect("joins have at least one component")
}

fn flatten_joins(logical: LogicalPlan, stats: &SchemaStats, out: &mut Vec<PhysicalPlan>) {
    match logical {
        LogicalPlan::HashJoin { left, right, .. }
        | LogicalPlan::CartesianProduct { left, right, .. } => {
            flatten_joins(*left, stats, out);
            flatten_joins(*right, stats, out);
        }
        other => out.push(convert(other, stats)),
    }
}

fn shared_vars(a: &PhysicalPlan, b: &PhysicalPlan) -> Vec<String> {
    let b_vars = b.bound_vars();
    a.bound_vars()
        .into_iter()
        .filter(|v| b_vars.iter().any(|x| x == v))
        .collect()
}

// ============================================================================
// EXPLAIN rendering
// ============================================================================

/// Nested text rendering of the operator tree with estimates.
pub fn explain(plan: &PhysicalPlan) -> String {
    let mut out = String::new();
    render(plan, 0, &mut out);
    out
}

fn render(plan: &PhysicalPlan, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push('+');
    out.push_str(&describe(&plan.op));
    out.push_str(&format!(
        " [rows={:.0}, cost={:.0}]\n",
        plan.est_rows, plan.est_cost
    ));
    for child in children(&plan.op) {
        render(child, depth + 1, out);
    }
}

fn describe(op: &PhysicalOp) -> String {
    match op {
        PhysicalOp::Argument => "Argument".into(),
        PhysicalOp::AllNodesScan { var } => format!("AllNodesScan({var})"),
        PhysicalOp::LabelScan { var, label } => format!("LabelScan({var}:{label})"),
        PhysicalOp::NodeIndexSeek { var, label, property, .. } => {
            format!("NodeIndexSeek({var}:{label}.{property})")
        }
        PhysicalOp::AllEdgesScan { source, edge, target, types } => {
            if types.is_empty() {
                format!("AllEdgesScan(({source})-[{edge}]->({target}))")
            } else {
                format!(
                    "EdgeTypeScan(({source})-[{edge}:{}]->({target}))",
                    types.join("|")
                )
            }
        }
        PhysicalOp::Expand { source, target, types, direction, .. } => format!(
            "Expand({source}){}({target}){}",
            arrow(*direction),
            type_suffix(types)
        ),
        PhysicalOp::OptionalExpand { source, target, types, direction, .. } => format!(
            "OptionalExpand({source}){}({target}){}",
            arrow(*direction),
            type_suffix(types)
        ),
        PhysicalOp::VarLengthExpand { source, target, types, direction, min, max, .. } => {
            let bound = match max {
                Some(m) => format!("{min}..{m}"),
                None => format!("{min}.."),
            };
            format!(
                "VarLengthExpand({source}){}({target})*{bound}{}",
                arrow(*direction),
                type_suffix(types)
            )
        }
        PhysicalOp::Filter { predicate, .. } => format!("Filter({predicate})"),
        PhysicalOp::PathBind { var, edges, .. } => {
            format!("PathBind({var}, length={})", edges.len())
        }
        PhysicalOp::HashJoin { join_vars, .. } => {
            format!("HashJoin({})", join_vars.join(", "))
        }
        PhysicalOp::CartesianProduct { .. } => "CartesianProduct".into(),
        PhysicalOp::Projection { items, .. } => {
            let cols: Vec<String> = items.iter().map(|(_, n)| n.clone()).collect();
            format!("Projection({})", cols.join(", "))
        }
        PhysicalOp::Aggregation { group_keys, aggregates, .. } => format!(
            "Aggregation(keys={}, aggregates={})",
            group_keys.len(),
            aggregates.len()
        ),
        PhysicalOp::Distinct { .. } => "Distinct".into(),
        PhysicalOp::Sort { keys, .. } => {
            let rendered: Vec<String> = keys
                .iter()
                .map(|(e, asc)| format!("{e}{}", if *asc { "" } else { " DESC" }))
                .collect();
            format!("Sort({})", rendered.join(", "))
        }
        PhysicalOp::Skip { count, .. } => format!("Skip({count})"),
        PhysicalOp::Limit { count, .. } => format!("Limit({count})"),
        PhysicalOp::Union { .. } => "Union".into(),
        PhysicalOp::Unwind { var, .. } => format!("Unwind({var})"),
        PhysicalOp::Create { nodes, edges, .. } => {
            format!("Create(nodes={}, edges={})", nodes.len(), edges.len())
        }
        PhysicalOp::Merge { node, .. } => format!("Merge({})", node.var),
        PhysicalOp::SetProps { items, .. } => format!("SetProperties(items={})", items.len()),
        PhysicalOp::RemoveProps { items, .. } => format!("Remove(items={})", items.len()),
        PhysicalOp::Delete { vars, detach, .. } => {
            if *detach {
                format!("DetachDelete({})", vars.join(", "))
            } else {
                format!("Delete({})", vars.join(", "))
            }
        }
    }
}

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "-->",
        Direction::Incoming => "<--",
        Direction::Both => "--",
    }
}

fn type_suffix(types: &[String]) -> String {
    if types.is_empty() {
        String::new()
    } else {
        format!(" [{}]", types.join("|"))
    }
}

fn children(op: &PhysicalOp) -> Vec<&PhysicalPlan> {
    match op {
        PhysicalOp::Argument
        | PhysicalOp::AllNodesScan { .. }
        | PhysicalOp::LabelScan { .. }
        | PhysicalOp::NodeIndexSeek { .. }
        | PhysicalOp::AllEdgesScan { .. } => Vec::new(),
        PhysicalOp::Expand { input, .. }
        | PhysicalOp::OptionalExpand { input, .. }
        | PhysicalOp::VarLengthExpand { input, .. }
        | PhysicalOp::Filter { input, .. }
        | PhysicalOp::PathBind { input, .. }
        | PhysicalOp::Projection { input, .. }
        | PhysicalOp::Aggregation { input, .. }
        | PhysicalOp::Distinct { input }
        | PhysicalOp::Sort { input, .. }
        | PhysicalOp::Skip { input, .. }
        | PhysicalOp::Limit { input, .. }
        | PhysicalOp::Unwind { input, .. }
        | PhysicalOp::Create { input, .. }
        | PhysicalOp::Merge { input, .. }
        | PhysicalOp::SetProps { input, .. }
        | PhysicalOp::RemoveProps { input, .. }
        | PhysicalOp::Delete { input, .. } => vec![input],
        PhysicalOp::HashJoin { left, right, .. }
        | PhysicalOp::CartesianProduct { left, right }
        | PhysicalOp::Union { left, right } => vec![left, right],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher;
    use crate::planner::{logical, optimize};
    use crate::schema::SchemaTracker;

    fn stats_with(labels: &[(&str, u64)], edges: u64) -> SchemaStats {
        let tracker = SchemaTracker::new();
        for (label, freq) in labels {
            for _ in 0..*freq {
                tracker.observe_node_created(&[label.to_string()]);
            }
        }
        for _ in 0..edges {
            tracker.observe_edge_created("X");
        }
        tracker.snapshot()
    }

    fn physical(source: &str, stats: &SchemaStats) -> PhysicalPlan {
        let logical = logical::plan(cypher::parse(source).unwrap().query).unwrap();
        plan_physical(optimize::optimize(logical), stats)
    }

    #[test]
    fn test_label_scan_estimates() {
        let stats = stats_with(&[("Person", 100), ("Dog", 5)], 0);
        let plan = physical("MATCH (n:Person) RETURN n", &stats);
        let rendered = explain(&plan);
        assert!(rendered.contains("LabelScan(n:Person) [rows=100, cost=100]"), "{rendered}");
    }

    #[test]
    fn test_filter_selectivity() {
        let stats = stats_with(&[("Person", 100)], 0);
        let plan = physical("MATCH (n:Person) WHERE n.age = 30 RETURN n", &stats);
        let rendered = explain(&plan);
        // 100 rows × 0.1 equality selectivity.
        assert!(rendered.contains("rows=10"), "{rendered}");
    }

    #[test]
    fn test_index_seek_selected_when_registered() {
        let tracker = SchemaTracker::new();
        for _ in 0..50 {
            tracker.observe_node_created(&["Person".to_string()]);
        }
        tracker.register_index("Person", "name");
        let stats = tracker.snapshot();

        let plan = physical("MATCH (n:Person) WHERE n.name = 'Ada' RETURN n", &stats);
        let rendered = explain(&plan);
        assert!(rendered.contains("NodeIndexSeek(n:Person.name)"), "{rendered}");
    }

    #[test]
    fn test_no_index_seek_without_registration() {
        let stats = stats_with(&[("Person", 50)], 0);
        let plan = physical("MATCH (n:Person) WHERE n.name = 'Ada' RETURN n", &stats);
        let rendered = explain(&plan);
        assert!(!rendered.contains("NodeIndexSeek"), "{rendered}");
    }

    #[test]
    fn test_greedy_join_order_smallest_product_first() {
        let stats = stats_with(&[("A", 1000), ("B", 10), ("C", 2)], 0);
        let plan = physical("MATCH (a:A), (b:B), (c:C) RETURN a, b, c", &stats);
        // The smallest pair (B × C) combines first; A joins last.
        fn first_product_labels(p: &PhysicalPlan) -> Option<(String, String)> {
            match &p.op {
                PhysicalOp::CartesianProduct { left, right } => {
                    match (&left.op, &right.op) {
                        (
                            PhysicalOp::LabelScan { label: l, .. },
                            PhysicalOp::LabelScan { label: r, .. },
                        ) => Some((l.clone(), r.clone())),
                        _ => first_product_labels(left).or_else(|| first_product_labels(right)),
                    }
                }
                PhysicalOp::Projection { input, .. } => first_product_labels(input),
                _ => None,
            }
        }
        let pair = first_product_labels(&plan).expect("nested products");
        assert!(
            (pair.0 == "B" && pair.1 == "C") || (pair.0 == "C" && pair.1 == "B"),
            "expected B×C first, got {pair:?}"
        );
    }

    #[test]
    fn test_hash_join_build_side_is_smaller() {
        let stats = stats_with(&[("A", 1000), ("B", 10)], 100);
        let plan = physical(
            "MATCH (a:A)-[:X]->(m), (b:B)-[:Y]->(m) RETURN a, b",
            &stats,
        );
        fn find_join(p: &PhysicalPlan) -> Option<(&PhysicalPlan, &PhysicalPlan)> {
            match &p.op {
                PhysicalOp::HashJoin { left, right, .. } => Some((left, right)),
                _ => children(&p.op).into_iter().find_map(find_join),
            }
        }
        let (build, probe) = find_join(&plan).expect("hash join in plan");
        assert!(build.est_rows <= probe.est_rows);
    }

    #[test]
    fn test_has_limit_detection() {
        let stats = stats_with(&[], 0);
        assert!(physical("MATCH (n) RETURN n LIMIT 5", &stats).has_limit());
        assert!(!physical("MATCH (n) RETURN n", &stats).has_limit());
    }

    #[test]
    fn test_explain_nesting() {
        let stats = stats_with(&[("Person", 3)], 0);
        let plan = physical(
            "MATCH (n:Person) WHERE n.age > 25 RETURN n.age ORDER BY n.age LIMIT 1",
            &stats,
        );
        let rendered = explain(&plan);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("+Limit"), "{rendered}");
        assert!(rendered.contains("+Sort"), "{rendered}");
        assert!(rendered.contains("+LabelScan"), "{rendered}");
        // Deeper operators are indented further.
        let scan_line = lines.iter().find(|l| l.contains("LabelScan")).unwrap();
        assert!(scan_line.starts_with("      "), "{rendered}");
    }
}
