//! Logical planner.
//!
//! Walks the AST in clause order and produces an owned tree of logical
//! operators. Variable scoping lives here: each pattern element introduces
//! its identifier, repeated node identifiers become join constraints, and
//! projection boundaries (WITH/RETURN) reset the scope.

use hashbrown::HashSet;
use tracing::debug;

use crate::cypher::ast::{
    self, Clause, Expr, ExprKind, MatchClause, Pattern, ProjectionItem, Query, RemoveItem,
    SetItem, SingleQuery, SortItem,
};
use crate::error::{Error, Result};
use crate::eval::functions;
use crate::model::Direction;

// ============================================================================
// Operator tree
// ============================================================================

#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// Produces a single empty row; the seed for pipelines.
    Argument,

    AllNodesScan {
        var: String,
    },
    LabelScan {
        var: String,
        label: String,
    },
    /// One row per edge, binding both endpoints. Empty `types` scans all
    /// edges; otherwise only the named types.
    AllEdgesScan {
        source: String,
        edge: String,
        target: String,
        types: Vec<String>,
    },

    Expand {
        input: Box<LogicalPlan>,
        source: String,
        edge: Option<String>,
        target: String,
        types: Vec<String>,
        direction: Direction,
        /// Target variable was already bound; the far endpoint must match.
        target_bound: bool,
    },
    OptionalExpand {
        input: Box<LogicalPlan>,
        source: String,
        edge: Option<String>,
        target: String,
        types: Vec<String>,
        direction: Direction,
        /// Candidate rows must satisfy this before counting as a match.
        predicate: Option<Expr>,
    },
    VarLengthExpand {
        input: Box<LogicalPlan>,
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
        input: Box<LogicalPlan>,
        predicate: Expr,
    },

    /// Assemble a `PATH` value from bound node and edge variables
    /// (`nodes.len() == edges.len() + 1`, in pattern order).
    PathBind {
        input: Box<LogicalPlan>,
        var: String,
        nodes: Vec<String>,
        edges: Vec<String>,
    },

    HashJoin {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_vars: Vec<String>,
    },
    /// `unavoidable` marks products retained because the sides share no
    /// variables.
    CartesianProduct {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        unavoidable: bool,
    },

    Projection {
        input: Box<LogicalPlan>,
        items: Vec<(Expr, String)>,
    },
    Aggregation {
        input: Box<LogicalPlan>,
        group_keys: Vec<(Expr, String)>,
        aggregates: Vec<(AggregateCall, String)>,
    },
    Distinct {
        input: Box<LogicalPlan>,
    },
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<(Expr, bool)>,
    },
    Skip {
        input: Box<LogicalPlan>,
        count: Expr,
    },
    Limit {
        input: Box<LogicalPlan>,
        count: Expr,
    },
    Union {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Unwind {
        input: Box<LogicalPlan>,
        expr: Expr,
        var: String,
    },

    // Mutating operators
    Create {
        input: Box<LogicalPlan>,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    },
    Merge {
        input: Box<LogicalPlan>,
        node: NodeSpec,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    SetProps {
        input: Box<LogicalPlan>,
        items: Vec<SetItem>,
    },
    RemoveProps {
        input: Box<LogicalPlan>,
        items: Vec<RemoveItem>,
    },
    Delete {
        input: Box<LogicalPlan>,
        vars: Vec<String>,
        detach: bool,
    },
}

/// A node to create: variable, labels, and property expressions.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub var: String,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

/// An edge to create between two bound (or just-created) node variables.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub var: Option<String>,
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub func: AggFunc,
    /// None means `count(*)`.
    pub arg: Option<Expr>,
    pub distinct: bool,
}

impl LogicalPlan {
    pub fn boxed(self) -> Box<LogicalPlan> {
        Box::new(self)
    }

    /// Variables bound by this subtree, in binding order.
    pub fn bound_vars(&self) -> Vec<String> {
        fn push(out: &mut Vec<String>, v: &str) {
            if !out.iter().any(|x| x == v) {
                out.push(v.to_string());
            }
        }
        fn collect(plan: &LogicalPlan, out: &mut Vec<String>) {
            match plan {
                LogicalPlan::Argument => {}
                LogicalPlan::AllNodesScan { var } | LogicalPlan::LabelScan { var, .. } => {
                    push(out, var)
                }
                LogicalPlan::AllEdgesScan { source, edge, target, .. } => {
                    push(out, source);
                    push(out, edge);
                    push(out, target);
                }
                LogicalPlan::Expand { input, source, edge, target, .. }
                | LogicalPlan::OptionalExpand { input, source, edge, target, .. }
                | LogicalPlan::VarLengthExpand { input, source, edge, target, .. } => {
                    collect(input, out);
                    push(out, source);
                    if let Some(e) = edge {
                        push(out, e);
                    }
                    push(out, target);
                }
                LogicalPlan::Filter { input, .. }
                | LogicalPlan::Distinct { input }
                | LogicalPlan::Sort { input, .. }
                | LogicalPlan::Skip { input, .. }
                | LogicalPlan::Limit { input, .. } => collect(input, out),
                LogicalPlan::PathBind { input, var, .. } => {
                    collect(input, out);
                    push(out, var);
                }
                LogicalPlan::HashJoin { left, right, .. }
                | LogicalPlan::CartesianProduct { left, right, .. } => {
                    collect(left, out);
                    collect(right, out);
                }
                LogicalPlan::Union { left, .. } => collect(left, out),
                LogicalPlan::Projection { items, .. } => {
                    for (_, name) in items {
                        push(out, name);
                    }
                }
                LogicalPlan::Aggregation { group_keys, aggregates, .. } => {
                    for (_, name) in group_keys {
                        push(out, name);
                    }
                    for (_, name) in aggregates {
                        push(out, name);
                    }
                }
                LogicalPlan::Unwind { input, var, .. } => {
                    collect(input, out);
                    push(out, var);
                }
                LogicalPlan::Create { input, nodes, edges } => {
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
                LogicalPlan::Merge { input, node, .. } => {
                    collect(input, out);
                    push(out, &node.var);
                }
                LogicalPlan::SetProps { input, .. }
                | LogicalPlan::RemoveProps { input, .. }
                | LogicalPlan::Delete { input, .. } => collect(input, out),
            }
        }
        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Output column names for the result surface.
    pub fn output_columns(&self) -> Vec<String> {
        match self {
            LogicalPlan::Projection { items, .. } => {
                items.iter().map(|(_, name)| name.clone()).collect()
            }
            LogicalPlan::Aggregation { group_keys, aggregates, .. } => group_keys
                .iter()
                .map(|(_, name)| name.clone())
                .chain(aggregates.iter().map(|(_, name)| name.clone()))
                .collect(),
            LogicalPlan::Distinct { input }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Skip { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Filter { input, .. } => input.output_columns(),
            LogicalPlan::Union { left, .. } => left.output_columns(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Node,
    Edge,
    /// Variable-length relationship variable: a list of edges.
    EdgeList,
    Path,
    Value,
}

/// Symbol table for one horizon of the query. Binding order is preserved so
/// `RETURN *` is deterministic.
#[derive(Debug, Default, Clone)]
struct Scope {
    vars: Vec<(String, SymKind)>,
    anon_counter: u32,
}

impl Scope {
    fn kind_of(&self, name: &str) -> Option<SymKind> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| *k)
    }

    fn is_bound(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    fn bind(&mut self, name: &str, kind: SymKind) -> Result<()> {
        match self.kind_of(name) {
            None => {
                self.vars.push((name.to_string(), kind));
                Ok(())
            }
            Some(existing) if existing == kind => Ok(()),
            Some(_) => Err(Error::InconsistentVariable { name: name.to_string() }),
        }
    }

    fn fresh_anon(&mut self) -> String {
        let name = format!("__v{}", self.anon_counter);
        self.anon_counter += 1;
        name
    }

    /// User-visible variables, for `RETURN *`.
    fn user_vars(&self) -> Vec<String> {
        self.vars
            .iter()
            .filter(|(n, _)| !n.starts_with("__"))
            .map(|(n, _)| n.clone())
            .collect()
    }
}

// ============================================================================
// Entry
// ============================================================================

/// Plan a whole query. Takes the AST by move; the plan owns every fragment
/// it keeps.
pub fn plan(query: Query) -> Result<LogicalPlan> {
    let first_columns;
    let mut plan = {
        let planned = plan_single(query.first)?;
        first_columns = planned.output_columns();
        planned
    };

    for branch in query.unions {
        let right = plan_single(branch.query)?;
        if right.output_columns() != first_columns {
            return Err(Error::UnionColumnMismatch);
        }
        plan = LogicalPlan::Union { left: plan.boxed(), right: right.boxed() };
        if !branch.all {
            plan = LogicalPlan::Distinct { input: plan.boxed() };
        }
    }

    debug!(columns = ?plan.output_columns(), "logical plan built");
    Ok(plan)
}

fn plan_single(query: SingleQuery) -> Result<LogicalPlan> {
    let mut scope = Scope::default();
    let mut plan: Option<LogicalPlan> = None;

    for clause in query.clauses {
        plan = Some(match clause {
            Clause::Match(m) => plan_match(plan.take(), m, &mut scope)?,
            Clause::Unwind(u) => {
                let input = plan.take().unwrap_or(LogicalPlan::Argument);
                scope.bind(&u.alias, SymKind::Value)?;
                LogicalPlan::Unwind { input: input.boxed(), expr: u.expr, var: u.alias }
            }
            Clause::With(w) => {
                let input = plan.take().unwrap_or(LogicalPlan::Argument);
                let piped = plan_projection(
                    input, w.items, w.distinct, w.order_by, w.skip, w.limit, &mut scope,
                )?;
                match w.where_clause {
                    Some(predicate) => LogicalPlan::Filter { input: piped.boxed(), predicate },
                    None => piped,
                }
            }
            Clause::Create(c) => plan_create(plan.take(), c.patterns, &mut scope)?,
            Clause::Merge(m) => plan_merge(plan.take(), m, &mut scope)?,
            Clause::Set(s) => {
                let input = require_input(plan.take(), "SET")?;
                check_set_items(&s.items, &scope)?;
                LogicalPlan::SetProps { input: input.boxed(), items: s.items }
            }
            Clause::Remove(r) => {
                let input = require_input(plan.take(), "REMOVE")?;
                for item in &r.items {
                    let var = match item {
                        RemoveItem::Property { variable, .. }
                        | RemoveItem::Label { variable, .. } => variable,
                    };
                    if !scope.is_bound(var) {
                        return Err(Error::UndefinedVariable(var.clone()));
                    }
                }
                LogicalPlan::RemoveProps { input: input.boxed(), items: r.items }
            }
            Clause::Delete(d) => {
                let input = require_input(plan.take(), "DELETE")?;
                for var in &d.variables {
                    if !scope.is_bound(var) {
                        return Err(Error::UndefinedVariable(var.clone()));
                    }
                }
                LogicalPlan::Delete {
                    input: input.boxed(),
                    vars: d.variables,
                    detach: d.detach,
                }
            }
        });
    }

    match query.return_clause {
        Some(ret) => {
            let input = plan.unwrap_or(LogicalPlan::Argument);
            plan_projection(
                input, ret.items, ret.distinct, ret.order_by, ret.skip, ret.limit, &mut scope,
            )
        }
        None => plan.ok_or_else(|| Error::Semantic("empty query".into())),
    }
}

fn require_input(plan: Option<LogicalPlan>, clause: &str) -> Result<LogicalPlan> {
    plan.ok_or_else(|| Error::Semantic(format!("{clause} requires a preceding reading clause")))
}

fn check_set_items(items: &[SetItem], scope: &Scope) -> Result<()> {
    for item in items {
        let var = match item {
            SetItem::Property { variable, .. }
            | SetItem::Replace { variable, .. }
            | SetItem::Merge { variable, .. }
            | SetItem::Label { variable, .. } => variable,
        };
        if !scope.is_bound(var) {
            return Err(Error::UndefinedVariable(var.clone()));
        }
    }
    Ok(())
}

// ============================================================================
// MATCH planning
// ============================================================================

fn plan_match(
    base: Option<LogicalPlan>,
    m: MatchClause,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    let mut plan = base;

    if m.optional {
        let mut current = require_input(plan, "OPTIONAL MATCH")?;
        let count = m.patterns.len();
        for (i, pattern) in m.patterns.into_iter().enumerate() {
            let predicate = if i + 1 == count { m.where_clause.clone() } else { None };
            current = plan_optional_pattern(current, pattern, predicate, scope)?;
        }
        return Ok(current);
    }

    for pattern in m.patterns {
        plan = Some(plan_pattern(plan.take(), pattern, scope)?);
    }
    let mut plan = plan.expect("MATCH has at least one pattern");

    if let Some(predicate) = m.where_clause {
        plan = LogicalPlan::Filter { input: plan.boxed(), predicate };
    }
    Ok(plan)
}

fn plan_pattern(
    base: Option<LogicalPlan>,
    pattern: Pattern,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    // A chain is built for this pattern, then combined with `base` by
    // extension, hash join, or cartesian product.
    let path_var = pattern.path_var.clone();
    if let Some(pv) = &path_var {
        if scope.is_bound(pv) {
            return Err(Error::InconsistentVariable { name: pv.clone() });
        }
        if pattern.segments.iter().any(|(rel, _)| rel.var_length.is_some()) {
            return Err(Error::Semantic(
                "a named path cannot contain a variable-length segment".into(),
            ));
        }
    }
    let start_var = pattern.start.variable.clone();
    let starts_bound = start_var.as_deref().is_some_and(|v| scope.is_bound(v));

    let mut base = base;
    let mut filters: Vec<Expr> = Vec::new();
    // Variables bound by THIS chain so far. A variable bound only on the
    // other side of a later join is not available to Expand.
    let mut chain_vars: HashSet<String> = HashSet::new();

    let (mut chain, mut current_var) = if starts_bound {
        // The pattern extends the current plan from the bound start.
        let var = start_var.expect("bound start has a name");
        if scope.kind_of(&var) != Some(SymKind::Node) {
            return Err(Error::InconsistentVariable { name: var });
        }
        node_pattern_filters(&var, &pattern.start, &mut filters);
        match base.take() {
            Some(b) => {
                chain_vars.extend(b.bound_vars());
                (b, var)
            }
            None => return Err(Error::UndefinedVariable(var)),
        }
    } else {
        // Single directed segment between unconstrained endpoints reads the
        // edge table directly instead of scanning nodes. A named path keeps
        // the expand shape so its element variables line up.
        if path_var.is_none() {
            if let Some(edge_chain) = try_edge_scan(&pattern, scope)? {
                let chain = combine(base, edge_chain, scope)?;
                return Ok(chain);
            }
        }

        let var = match start_var {
            Some(v) => v,
            None => scope.fresh_anon(),
        };
        scope.bind(&var, SymKind::Node)?;
        chain_vars.insert(var.clone());
        let leaf = match pattern.start.labels.first() {
            Some(label) => LogicalPlan::LabelScan { var: var.clone(), label: label.clone() },
            None => LogicalPlan::AllNodesScan { var: var.clone() },
        };
        // Extra labels beyond the scanned one become filters.
        for label in pattern.start.labels.iter().skip(1) {
            filters.push(has_label(&var, label));
        }
        for (key, value) in &pattern.start.properties {
            filters.push(prop_eq(&var, key, value.clone()));
        }
        (leaf, var)
    };

    let mut path_nodes: Vec<String> = vec![current_var.clone()];
    let mut path_edges: Vec<String> = Vec::new();

    for (rel, node) in pattern.segments {
        let target_var = match &node.variable {
            Some(v) => v.clone(),
            None => scope.fresh_anon(),
        };
        if scope.is_bound(&target_var)
            && scope.kind_of(&target_var) != Some(SymKind::Node)
        {
            return Err(Error::InconsistentVariable { name: target_var });
        }
        let target_bound = chain_vars.contains(&target_var);
        scope.bind(&target_var, SymKind::Node)?;
        chain_vars.insert(target_var.clone());

        let edge_var = match &rel.variable {
            Some(v) => {
                if scope.is_bound(v) {
                    return Err(Error::Semantic(format!(
                        "relationship variable '{v}' is already bound"
                    )));
                }
                let kind = if rel.var_length.is_some() {
                    SymKind::EdgeList
                } else {
                    SymKind::Edge
                };
                scope.bind(v, kind)?;
                Some(v.clone())
            }
            // A named path needs every element bound to a variable.
            None if rel.properties.is_empty() && path_var.is_none() => None,
            None => Some(scope.fresh_anon()),
        };
        if let Some(ev) = &edge_var {
            if rel.var_length.is_some() {
                scope.bind(ev, SymKind::EdgeList)?;
            } else {
                scope.bind(ev, SymKind::Edge)?;
            }
            chain_vars.insert(ev.clone());
            path_edges.push(ev.clone());
        }

        chain = match rel.var_length {
            Some(vl) => LogicalPlan::VarLengthExpand {
                input: chain.boxed(),
                source: current_var.clone(),
                edge: edge_var.clone(),
                target: target_var.clone(),
                types: rel.types.clone(),
                direction: rel.direction,
                min: vl.min.unwrap_or(1),
                max: vl.max,
                target_bound,
            },
            None => LogicalPlan::Expand {
                input: chain.boxed(),
                source: current_var.clone(),
                edge: edge_var.clone(),
                target: target_var.clone(),
                types: rel.types.clone(),
                direction: rel.direction,
                target_bound,
            },
        };

        if let Some(ev) = &edge_var {
            for (key, value) in &rel.properties {
                filters.push(prop_eq(ev, key, value.clone()));
            }
        }
        if !target_bound {
            node_pattern_filters(&target_var, &node, &mut filters);
        }

        path_nodes.push(target_var.clone());
        current_var = target_var;
    }

    for predicate in filters {
        chain = LogicalPlan::Filter { input: chain.boxed(), predicate };
    }

    if let Some(pv) = path_var {
        scope.bind(&pv, SymKind::Path)?;
        chain = LogicalPlan::PathBind {
            input: chain.boxed(),
            var: pv,
            nodes: path_nodes,
            edges: path_edges,
        };
    }

    // `base` is None when the pattern extended it in place.
    combine(base, chain, scope)
}

/// Single directed segment with unconstrained endpoints: scan the edges.
fn try_edge_scan(pattern: &Pattern, scope: &mut Scope) -> Result<Option<LogicalPlan>> {
    if pattern.segments.len() != 1 {
        return Ok(None);
    }
    let (rel, end) = &pattern.segments[0];
    let start = &pattern.start;

    let plain_node = |n: &ast::NodePattern| n.labels.is_empty() && n.properties.is_empty();
    let end_bound = end.variable.as_deref().is_some_and(|v| scope.is_bound(v));

    if rel.var_length.is_some()
        || rel.direction == Direction::Both
        || !rel.properties.is_empty()
        || !plain_node(start)
        || !plain_node(end)
        || end_bound
        || rel.variable.as_deref().is_some_and(|v| scope.is_bound(v))
    {
        return Ok(None);
    }

    let mut named = |v: &Option<String>| match v {
        Some(v) => v.clone(),
        None => scope.fresh_anon(),
    };
    let start_var = named(&start.variable);
    let end_var = named(&end.variable);
    let edge_var = named(&rel.variable);

    // Normalize to storage orientation: source -> target.
    let (source, target) = match rel.direction {
        Direction::Outgoing => (start_var, end_var),
        Direction::Incoming => (end_var, start_var),
        Direction::Both => unreachable!("filtered above"),
    };
    scope.bind(&source, SymKind::Node)?;
    scope.bind(&edge_var, SymKind::Edge)?;
    scope.bind(&target, SymKind::Node)?;

    Ok(Some(LogicalPlan::AllEdgesScan {
        source,
        edge: edge_var,
        target,
        types: rel.types.clone(),
    }))
}

fn combine(
    base: Option<LogicalPlan>,
    chain: LogicalPlan,
    _scope: &Scope,
) -> Result<LogicalPlan> {
    let Some(base) = base else { return Ok(chain) };

    let base_vars: HashSet<String> = base.bound_vars().into_iter().collect();
    let shared: Vec<String> = chain
        .bound_vars()
        .into_iter()
        .filter(|v| base_vars.contains(v))
        .collect();

    if shared.is_empty() {
        Ok(LogicalPlan::CartesianProduct {
            left: base.boxed(),
            right: chain.boxed(),
            unavoidable: true,
        })
    } else {
        Ok(LogicalPlan::HashJoin {
            left: base.boxed(),
            right: chain.boxed(),
            join_vars: shared,
        })
    }
}

fn plan_optional_pattern(
    base: LogicalPlan,
    pattern: Pattern,
    predicate: Option<Expr>,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    if pattern.path_var.is_some() {
        return Err(Error::Semantic(
            "OPTIONAL MATCH does not support named paths".into(),
        ));
    }
    let start_var = pattern.start.variable.clone().ok_or_else(|| {
        Error::Semantic("OPTIONAL MATCH must start at a bound variable".into())
    })?;
    if !scope.is_bound(&start_var) {
        return Err(Error::Semantic(
            "OPTIONAL MATCH must start at a bound variable".into(),
        ));
    }
    if pattern.segments.len() != 1 {
        return Err(Error::Semantic(
            "OPTIONAL MATCH supports a single relationship segment".into(),
        ));
    }

    let (rel, node) = pattern.segments.into_iter().next().expect("checked above");
    if rel.var_length.is_some() {
        return Err(Error::Semantic(
            "OPTIONAL MATCH does not support variable-length patterns".into(),
        ));
    }

    let target_var = match node.variable.clone() {
        Some(v) => v,
        None => scope.fresh_anon(),
    };
    scope.bind(&target_var, SymKind::Node)?;
    let edge_var = match &rel.variable {
        Some(v) => {
            scope.bind(v, SymKind::Edge)?;
            Some(v.clone())
        }
        None => None,
    };

    // Pattern constraints on the new endpoint fold into the match predicate
    // so that non-matching rows null-extend instead of disappearing.
    let mut constraints: Vec<Expr> = Vec::new();
    node_pattern_filters(&target_var, &node, &mut constraints);
    if let Some(ev) = &edge_var {
        for (key, value) in &rel.properties {
            constraints.push(prop_eq(ev, key, value.clone()));
        }
    }
    if let Some(p) = predicate {
        constraints.push(p);
    }
    let predicate = constraints.into_iter().reduce(and);

    Ok(LogicalPlan::OptionalExpand {
        input: base.boxed(),
        source: start_var,
        edge: edge_var,
        target: target_var,
        types: rel.types,
        direction: rel.direction,
        predicate,
    })
}

fn node_pattern_filters(var: &str, node: &ast::NodePattern, out: &mut Vec<Expr>) {
    for label in &node.labels {
        out.push(has_label(var, label));
    }
    for (key, value) in &node.properties {
        out.push(prop_eq(var, key, value.clone()));
    }
}

fn variable(name: &str) -> Expr {
    Expr::new(ExprKind::Variable(name.to_string()), ast::Pos::default())
}

fn has_label(var: &str, label: &str) -> Expr {
    Expr::new(
        ExprKind::HasLabel { base: variable(var).into(), label: label.to_string() },
        ast::Pos::default(),
    )
}

fn prop_eq(var: &str, key: &str, value: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op: ast::BinaryOp::Eq,
            left: Expr::new(
                ExprKind::Property { base: variable(var).into(), key: key.to_string() },
                ast::Pos::default(),
            )
            .into(),
            right: value.into(),
        },
        ast::Pos::default(),
    )
}

fn and(left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op: ast::BinaryOp::And,
            left: left.into(),
            right: right.into(),
        },
        ast::Pos::default(),
    )
}

// ============================================================================
// CREATE / MERGE planning
// ============================================================================

fn plan_create(
    base: Option<LogicalPlan>,
    patterns: Vec<Pattern>,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    let input = base.unwrap_or(LogicalPlan::Argument);
    let mut nodes: Vec<NodeSpec> = Vec::new();
    let mut edges: Vec<EdgeSpec> = Vec::new();

    for pattern in patterns {
        if pattern.path_var.is_some() {
            return Err(Error::Semantic("CREATE does not support named paths".into()));
        }
        // Resolve the pattern's node endpoints to variables, creating specs
        // for the unbound ones.
        let mut resolve_node = |node: ast::NodePattern,
                                scope: &mut Scope,
                                nodes: &mut Vec<NodeSpec>|
         -> Result<String> {
            match node.variable {
                Some(var) if scope.is_bound(&var) => {
                    if scope.kind_of(&var) != Some(SymKind::Node) {
                        return Err(Error::InconsistentVariable { name: var });
                    }
                    if !node.labels.is_empty() || !node.properties.is_empty() {
                        return Err(Error::Semantic(format!(
                            "variable '{var}' is already bound; CREATE cannot redefine it"
                        )));
                    }
                    Ok(var)
                }
                other => {
                    let var = match other {
                        Some(v) => v,
                        None => scope.fresh_anon(),
                    };
                    scope.bind(&var, SymKind::Node)?;
                    nodes.push(NodeSpec {
                        var: var.clone(),
                        labels: node.labels,
                        properties: node.properties,
                    });
                    Ok(var)
                }
            }
        };

        let mut current = resolve_node(pattern.start, scope, &mut nodes)?;
        for (rel, node) in pattern.segments {
            if rel.types.len() != 1 {
                return Err(Error::Semantic(
                    "CREATE requires exactly one relationship type".into(),
                ));
            }
            if rel.var_length.is_some() {
                return Err(Error::Semantic(
                    "CREATE does not accept variable-length patterns".into(),
                ));
            }
            let (source_is_current, edge_type) = match rel.direction {
                Direction::Outgoing => (true, rel.types[0].clone()),
                Direction::Incoming => (false, rel.types[0].clone()),
                Direction::Both => {
                    return Err(Error::Semantic(
                        "CREATE requires a directed relationship".into(),
                    ))
                }
            };

            let edge_var = match &rel.variable {
                Some(v) => {
                    scope.bind(v, SymKind::Edge)?;
                    Some(v.clone())
                }
                None => None,
            };

            let next = resolve_node(node, scope, &mut nodes)?;
            let (source, target) = if source_is_current {
                (current.clone(), next.clone())
            } else {
                (next.clone(), current.clone())
            };
            edges.push(EdgeSpec {
                var: edge_var,
                source,
                target,
                edge_type,
                properties: rel.properties,
            });
            current = next;
        }
    }

    Ok(LogicalPlan::Create { input: input.boxed(), nodes, edges })
}

fn plan_merge(
    base: Option<LogicalPlan>,
    m: ast::MergeClause,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    if !m.pattern.segments.is_empty() || m.pattern.path_var.is_some() {
        return Err(Error::Semantic(
            "MERGE supports single-node patterns only".into(),
        ));
    }
    let node = m.pattern.start;
    let var = match node.variable {
        Some(v) => v,
        None => scope.fresh_anon(),
    };
    if scope.is_bound(&var) {
        return Err(Error::Semantic(format!(
            "variable '{var}' is already bound; MERGE cannot redefine it"
        )));
    }
    scope.bind(&var, SymKind::Node)?;
    check_set_items(&m.on_create, scope)?;
    check_set_items(&m.on_match, scope)?;

    Ok(LogicalPlan::Merge {
        input: base.unwrap_or(LogicalPlan::Argument).boxed(),
        node: NodeSpec { var, labels: node.labels, properties: node.properties },
        on_create: m.on_create,
        on_match: m.on_match,
    })
}

// ============================================================================
// Projection planning (WITH / RETURN)
// ============================================================================

fn plan_projection(
    input: LogicalPlan,
    items: Vec<ProjectionItem>,
    distinct: bool,
    order_by: Vec<SortItem>,
    skip: Option<Expr>,
    limit: Option<Expr>,
    scope: &mut Scope,
) -> Result<LogicalPlan> {
    // RETURN * expands to every user-visible variable in binding order.
    let items: Vec<ProjectionItem> = if items.len() == 1
        && matches!(items[0].expr.kind, ExprKind::Star)
    {
        let vars = scope.user_vars();
        if vars.is_empty() {
            return Err(Error::Semantic("RETURN * requires bound variables".into()));
        }
        vars.into_iter()
            .map(|v| ProjectionItem { expr: variable(&v), alias: None, text: v })
            .collect()
    } else {
        items
    };

    // Validate free variables against the current scope.
    for item in &items {
        check_vars(&item.expr, scope)?;
    }

    let has_aggregate = items.iter().any(|i| contains_aggregate(&i.expr));
    let named: Vec<(Expr, String, SymKind)> = items
        .into_iter()
        .map(|item| {
            let name = item.column_name().to_string();
            let kind = match &item.expr.kind {
                ExprKind::Variable(v) => scope.kind_of(v).unwrap_or(SymKind::Value),
                _ => SymKind::Value,
            };
            (item.expr, name, kind)
        })
        .collect();

    let mut plan = if has_aggregate {
        let mut group_keys = Vec::new();
        let mut aggregates = Vec::new();
        for (expr, name, _) in &named {
            match to_aggregate_call(expr)? {
                Some(call) => aggregates.push((call, name.clone())),
                None => {
                    if contains_aggregate(expr) {
                        return Err(Error::Semantic(
                            "aggregate functions cannot be nested inside expressions".into(),
                        ));
                    }
                    group_keys.push((expr.clone(), name.clone()));
                }
            }
        }

        let mut plan = LogicalPlan::Aggregation {
            input: input.boxed(),
            group_keys: group_keys.clone(),
            aggregates,
        };

        if !order_by.is_empty() {
            // Sort keys must resolve against the aggregation's output.
            let keys = order_by
                .into_iter()
                .map(|sort| {
                    let rewritten = named
                        .iter()
                        .find(|(expr, _, _)| *expr == sort.expr)
                        .map(|(_, name, _)| variable(name))
                        .unwrap_or(sort.expr);
                    check_output_vars(&rewritten, &named)?;
                    Ok((rewritten, sort.ascending))
                })
                .collect::<Result<Vec<_>>>()?;
            plan = LogicalPlan::Sort { input: plan.boxed(), keys };
        }
        plan
    } else {
        let mut plan = input;
        if !order_by.is_empty() {
            // Aliases in sort keys are rewritten to their source expressions
            // so the sort runs below the projection, over full bindings.
            let keys: Vec<(Expr, bool)> = order_by
                .into_iter()
                .map(|sort| {
                    let rewritten = substitute_aliases(sort.expr, &named);
                    check_vars(&rewritten, scope)?;
                    Ok((rewritten, sort.ascending))
                })
                .collect::<Result<Vec<_>>>()?;
            plan = LogicalPlan::Sort { input: plan.boxed(), keys };
        }
        LogicalPlan::Projection {
            input: plan.boxed(),
            items: named.iter().map(|(e, n, _)| (e.clone(), n.clone())).collect(),
        }
    };

    if distinct {
        plan = LogicalPlan::Distinct { input: plan.boxed() };
    }
    if let Some(count) = skip {
        plan = LogicalPlan::Skip { input: plan.boxed(), count };
    }
    if let Some(count) = limit {
        plan = LogicalPlan::Limit { input: plan.boxed(), count };
    }

    // The projection opens a fresh horizon.
    *scope = Scope::default();
    for (_, name, kind) in &named {
        scope.bind(name, *kind)?;
    }

    Ok(plan)
}

/// Replace `Variable(alias)` with the aliased item's expression.
fn substitute_aliases(expr: Expr, named: &[(Expr, String, SymKind)]) -> Expr {
    if let ExprKind::Variable(name) = &expr.kind {
        if let Some((source, _, _)) = named.iter().find(|(_, n, _)| n == name) {
            return source.clone();
        }
    }
    expr
}

fn check_output_vars(expr: &Expr, named: &[(Expr, String, SymKind)]) -> Result<()> {
    for var in free_vars(expr) {
        if !named.iter().any(|(_, n, _)| *n == var) {
            return Err(Error::Semantic(format!(
                "ORDER BY in an aggregating query must reference output columns, not '{var}'"
            )));
        }
    }
    Ok(())
}

fn check_vars(expr: &Expr, scope: &Scope) -> Result<()> {
    for var in free_vars(expr) {
        if !scope.is_bound(&var) {
            return Err(Error::UndefinedVariable(var));
        }
    }
    Ok(())
}

/// Top-level aggregate calls become `AggregateCall`s.
fn to_aggregate_call(expr: &Expr) -> Result<Option<AggregateCall>> {
    let ExprKind::FunctionCall { name, args, distinct } = &expr.kind else {
        return Ok(None);
    };
    let func = match name.to_uppercase().as_str() {
        "COUNT" => AggFunc::Count,
        "SUM" => AggFunc::Sum,
        "AVG" => AggFunc::Avg,
        "MIN" => AggFunc::Min,
        "MAX" => AggFunc::Max,
        "COLLECT" => AggFunc::Collect,
        _ => return Ok(None),
    };
    if args.len() > 1 {
        return Err(Error::Arity {
            name: name.clone(),
            expected: "0..1".into(),
            got: args.len(),
        });
    }
    if func != AggFunc::Count && args.is_empty() {
        return Err(Error::Arity { name: name.clone(), expected: "1".into(), got: 0 });
    }
    Ok(Some(AggregateCall {
        func,
        arg: args.first().cloned(),
        distinct: *distinct,
    }))
}

/// Does the expression contain an aggregate call anywhere?
pub fn contains_aggregate(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::FunctionCall { name, args, .. } => {
            functions::is_aggregate(name) || args.iter().any(contains_aggregate)
        }
        ExprKind::Property { base, .. } => contains_aggregate(base),
        ExprKind::Index { base, index } => {
            contains_aggregate(base) || contains_aggregate(index)
        }
        ExprKind::Binary { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        ExprKind::Unary { operand, .. } => contains_aggregate(operand),
        ExprKind::List(items) => items.iter().any(contains_aggregate),
        ExprKind::Map(entries) => entries.iter().any(|(_, e)| contains_aggregate(e)),
        ExprKind::Case { operand, whens, else_expr } => {
            operand.as_deref().map_or(false, contains_aggregate)
                || whens
                    .iter()
                    .any(|(w, t)| contains_aggregate(w) || contains_aggregate(t))
                || else_expr.as_deref().map_or(false, contains_aggregate)
        }
        ExprKind::In { item, list } => contains_aggregate(item) || contains_aggregate(list),
        ExprKind::IsNull { operand, .. } => contains_aggregate(operand),
        ExprKind::StringOp { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        ExprKind::HasLabel { base, .. } => contains_aggregate(base),
        _ => false,
    }
}

/// Free variables of an expression.
pub fn free_vars(expr: &Expr) -> Vec<String> {
    fn walk(expr: &Expr, out: &mut Vec<String>) {
        match &expr.kind {
            ExprKind::Variable(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            ExprKind::Property { base, .. } => walk(base, out),
            ExprKind::Index { base, index } => {
                walk(base, out);
                walk(index, out);
            }
            ExprKind::FunctionCall { args, .. } => {
                for arg in args {
                    walk(arg, out);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            ExprKind::Unary { operand, .. } => walk(operand, out),
            ExprKind::List(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            ExprKind::Map(entries) => {
                for (_, e) in entries {
                    walk(e, out);
                }
            }
            ExprKind::Case { operand, whens, else_expr } => {
                if let Some(op) = operand {
                    walk(op, out);
                }
                for (w, t) in whens {
                    walk(w, out);
                    walk(t, out);
                }
                if let Some(e) = else_expr {
                    walk(e, out);
                }
            }
            ExprKind::In { item, list } => {
                walk(item, out);
                walk(list, out);
            }
            ExprKind::IsNull { operand, .. } => walk(operand, out),
            ExprKind::StringOp { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            ExprKind::HasLabel { base, .. } => walk(base, out),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(expr, &mut out);
    out
}
