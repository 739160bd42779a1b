//! Logical optimization passes.
//!
//! Two rewrites run over the logical tree before physical planning:
//! predicate pushdown (each WHERE conjunct sinks to the lowest subtree that
//! binds its free variables) and scan selection (a label test directly above
//! an all-nodes scan becomes a label scan).

use tracing::trace;

use crate::cypher::ast::{BinaryOp, Expr, ExprKind};

use super::logical::{free_vars, LogicalPlan};

pub fn optimize(plan: LogicalPlan) -> LogicalPlan {
    let plan = push_down_filters(plan);
    select_label_scans(plan)
}

// ============================================================================
// Predicate pushdown
// ============================================================================

fn push_down_filters(plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { input, predicate } => {
            let mut current = push_down_filters(*input);
            for conjunct in split_and(predicate) {
                trace!(pred = %conjunct, "pushing filter conjunct");
                current = attach(try_push(current, conjunct));
            }
            current
        }
        other => map_children(other, push_down_filters),
    }
}

/// Split a predicate on top-level ANDs.
fn split_and(expr: Expr) -> Vec<Expr> {
    match expr.kind {
        ExprKind::Binary { op: BinaryOp::And, left, right } => {
            let mut out = split_and(*left);
            out.extend(split_and(*right));
            out
        }
        kind => vec![Expr { kind, pos: expr.pos }],
    }
}

fn attach(result: std::result::Result<LogicalPlan, (LogicalPlan, Expr)>) -> LogicalPlan {
    match result {
        Ok(plan) => plan,
        Err((plan, predicate)) => LogicalPlan::Filter { input: plan.boxed(), predicate },
    }
}

fn binds_all(plan: &LogicalPlan, vars: &[String]) -> bool {
    let bound = plan.bound_vars();
    vars.iter().all(|v| bound.iter().any(|b| b == v))
}

/// Sink one conjunct as deep as its free variables allow. `Err` hands the
/// plan and predicate back for the caller to wrap.
fn try_push(
    plan: LogicalPlan,
    pred: Expr,
) -> std::result::Result<LogicalPlan, (LogicalPlan, Expr)> {
    let vars = free_vars(&pred);
    match plan {
        LogicalPlan::Expand { input, source, edge, target, types, direction, target_bound } => {
            if binds_all(&input, &vars) {
                Ok(LogicalPlan::Expand {
                    input: attach(try_push(*input, pred)).boxed(),
                    source,
                    edge,
                    target,
                    types,
                    direction,
                    target_bound,
                })
            } else {
                Err((
                    LogicalPlan::Expand { input, source, edge, target, types, direction, target_bound },
                    pred,
                ))
            }
        }
        LogicalPlan::VarLengthExpand {
            input, source, edge, target, types, direction, min, max, target_bound,
        } => {
            if binds_all(&input, &vars) {
                Ok(LogicalPlan::VarLengthExpand {
                    input: attach(try_push(*input, pred)).boxed(),
                    source,
                    edge,
                    target,
                    types,
                    direction,
                    min,
                    max,
                    target_bound,
                })
            } else {
                Err((
                    LogicalPlan::VarLengthExpand {
                        input, source, edge, target, types, direction, min, max, target_bound,
                    },
                    pred,
                ))
            }
        }
        LogicalPlan::Filter { input, predicate } => {
            // Adjacent filters commute; keep sinking.
            Ok(LogicalPlan::Filter {
                input: attach(try_push(*input, pred)).boxed(),
                predicate,
            })
        }
        LogicalPlan::Sort { input, keys } => Ok(LogicalPlan::Sort {
            input: attach(try_push(*input, pred)).boxed(),
            keys,
        }),
        LogicalPlan::Distinct { input } => Ok(LogicalPlan::Distinct {
            input: attach(try_push(*input, pred)).boxed(),
        }),
        LogicalPlan::PathBind { input, var, nodes, edges } => {
            if !vars.iter().any(|v| *v == var) && binds_all(&input, &vars) {
                Ok(LogicalPlan::PathBind {
                    input: attach(try_push(*input, pred)).boxed(),
                    var,
                    nodes,
                    edges,
                })
            } else {
                Err((LogicalPlan::PathBind { input, var, nodes, edges }, pred))
            }
        }
        LogicalPlan::Unwind { input, expr, var } => {
            if !vars.iter().any(|v| *v == var) && binds_all(&input, &vars) {
                Ok(LogicalPlan::Unwind {
                    input: attach(try_push(*input, pred)).boxed(),
                    expr,
                    var,
                })
            } else {
                Err((LogicalPlan::Unwind { input, expr, var }, pred))
            }
        }
        LogicalPlan::HashJoin { left, right, join_vars } => {
            if binds_all(&left, &vars) {
                Ok(LogicalPlan::HashJoin {
                    left: attach(try_push(*left, pred)).boxed(),
                    right,
                    join_vars,
                })
            } else if binds_all(&right, &vars) {
                Ok(LogicalPlan::HashJoin {
                    left,
                    right: attach(try_push(*right, pred)).boxed(),
                    join_vars,
                })
            } else {
                Err((LogicalPlan::HashJoin { left, right, join_vars }, pred))
            }
        }
        LogicalPlan::CartesianProduct { left, right, unavoidable } => {
            if binds_all(&left, &vars) {
                Ok(LogicalPlan::CartesianProduct {
                    left: attach(try_push(*left, pred)).boxed(),
                    right,
                    unavoidable,
                })
            } else if binds_all(&right, &vars) {
                Ok(LogicalPlan::CartesianProduct {
                    left,
                    right: attach(try_push(*right, pred)).boxed(),
                    unavoidable,
                })
            } else {
                Err((LogicalPlan::CartesianProduct { left, right, unavoidable }, pred))
            }
        }
        // Scans, projections, aggregations, optional expansion, and mutating
        // operators are pushdown boundaries.
        other => Err((other, pred)),
    }
}

// ============================================================================
// Scan selection
// ============================================================================

fn select_label_scans(plan: LogicalPlan) -> LogicalPlan {
    match map_children(plan, select_label_scans) {
        LogicalPlan::Filter { input, predicate } => {
            if let LogicalPlan::AllNodesScan { var } = &*input {
                if let ExprKind::HasLabel { base, label } = &predicate.kind {
                    if matches!(&base.kind, ExprKind::Variable(v) if v == var) {
                        trace!(var = %var, label = %label, "label test over all-nodes scan becomes label scan");
                        return LogicalPlan::LabelScan {
                            var: var.clone(),
                            label: label.clone(),
                        };
                    }
                }
            }
            LogicalPlan::Filter { input, predicate }
        }
        other => other,
    }
}

// ============================================================================
// Tree plumbing
// ============================================================================

fn map_children(plan: LogicalPlan, f: impl Fn(LogicalPlan) -> LogicalPlan + Copy) -> LogicalPlan {
    use LogicalPlan::*;
    match plan {
        Argument
        | AllNodesScan { .. }
        | LabelScan { .. }
        | AllEdgesScan { .. } => plan,
        Expand { input, source, edge, target, types, direction, target_bound } => Expand {
            input: f(*input).boxed(),
            source,
            edge,
            target,
            types,
            direction,
            target_bound,
        },
        OptionalExpand { input, source, edge, target, types, direction, predicate } => {
            OptionalExpand {
                input: f(*input).boxed(),
                source,
                edge,
                target,
                types,
                direction,
                predicate,
            }
        }
        VarLengthExpand { input, source, edge, target, types, direction, min, max, target_bound } => {
            VarLengthExpand {
                input: f(*input).boxed(),
                source,
                edge,
                target,
                types,
                direction,
                min,
                max,
                target_bound,
            }
        }
        Filter { input, predicate } => Filter { input: f(*input).boxed(), predicate },
        PathBind { input, var, nodes, edges } => PathBind {
            input: f(*input).boxed(),
            var,
            nodes,
            edges,
        },
        HashJoin { left, right, join_vars } => HashJoin {
            left: f(*left).boxed(),
            right: f(*right).boxed(),
            join_vars,
        },
        CartesianProduct { left, right, unavoidable } => CartesianProduct {
            left: f(*left).boxed(),
            right: f(*right).boxed(),
            unavoidable,
        },
        Projection { input, items } => Projection { input: f(*input).boxed(), items },
        Aggregation { input, group_keys, aggregates } => Aggregation {
            input: f(*input).boxed(),
            group_keys,
            aggregates,
        },
        Distinct { input } => Distinct { input: f(*input).boxed() },
        Sort { input, keys } => Sort { input: f(*input).boxed(), keys },
        Skip { input, count } => Skip { input: f(*input).boxed(), count },
        Limit { input, count } => Limit { input: f(*input).boxed(), count },
        Union { left, right } => Union { left: f(*left).boxed(), right: f(*right).boxed() },
        Unwind { input, expr, var } => Unwind { input: f(*input).boxed(), expr, var },
        Create { input, nodes, edges } => Create { input: f(*input).boxed(), nodes, edges },
        Merge { input, node, on_create, on_match } => Merge {
            input: f(*input).boxed(),
            node,
            on_create,
            on_match,
        },
        SetProps { input, items } => SetProps { input: f(*input).boxed(), items },
        RemoveProps { input, items } => RemoveProps { input: f(*input).boxed(), items },
        Delete { input, vars, detach } => Delete { input: f(*input).boxed(), vars, detach },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher;
    use crate::planner::logical::plan;

    fn optimized(source: &str) -> LogicalPlan {
        optimize(plan(cypher::parse(source).unwrap().query).unwrap())
    }

    /// Depth (from the root) of the first Filter, and of the first scan leaf.
    fn filter_above_scan(plan: &LogicalPlan) -> bool {
        match plan {
            LogicalPlan::Filter { input, .. } => matches!(
                **input,
                LogicalPlan::AllNodesScan { .. }
                    | LogicalPlan::LabelScan { .. }
                    | LogicalPlan::AllEdgesScan { .. }
            ),
            LogicalPlan::Projection { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Distinct { input }
            | LogicalPlan::Skip { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Expand { input, .. }
            | LogicalPlan::VarLengthExpand { input, .. }
            | LogicalPlan::Aggregation { input, .. } => filter_above_scan(input),
            LogicalPlan::HashJoin { left, right, .. }
            | LogicalPlan::CartesianProduct { left, right, .. } => {
                filter_above_scan(left) || filter_above_scan(right)
            }
            _ => false,
        }
    }

    #[test]
    fn test_where_sinks_below_expand() {
        // The predicate mentions only `a`, so it lands on the scan under the
        // expand instead of above it.
        let p = optimized("MATCH (a:Person)-[:KNOWS]->(b) WHERE a.age > 25 RETURN b");
        assert!(filter_above_scan(&p), "{p:?}");
    }

    #[test]
    fn test_conjuncts_split_to_sides() {
        let p = optimized("MATCH (a:A), (b:B) WHERE a.x = 1 AND b.y = 2 RETURN a, b");
        fn product_sides_filtered(p: &LogicalPlan) -> bool {
            match p {
                LogicalPlan::CartesianProduct { left, right, .. } => {
                    matches!(**left, LogicalPlan::Filter { .. })
                        && matches!(**right, LogicalPlan::Filter { .. })
                }
                LogicalPlan::Projection { input, .. }
                | LogicalPlan::Filter { input, .. }
                | LogicalPlan::Sort { input, .. } => product_sides_filtered(input),
                _ => false,
            }
        }
        assert!(product_sides_filtered(&p), "{p:?}");
    }

    #[test]
    fn test_cross_side_predicate_stays_above_join() {
        let p = optimized("MATCH (a:A), (b:B) WHERE a.x = b.y RETURN a, b");
        fn filter_over_product(p: &LogicalPlan) -> bool {
            match p {
                LogicalPlan::Filter { input, .. } => {
                    matches!(**input, LogicalPlan::CartesianProduct { .. })
                }
                LogicalPlan::Projection { input, .. } | LogicalPlan::Sort { input, .. } => {
                    filter_over_product(input)
                }
                _ => false,
            }
        }
        assert!(filter_over_product(&p), "{p:?}");
    }

    #[test]
    fn test_label_filter_becomes_label_scan() {
        let p = optimized("MATCH (n) WHERE n:Person RETURN n");
        fn has_label_scan(p: &LogicalPlan) -> bool {
            match p {
                LogicalPlan::LabelScan { label, .. } => label == "Person",
                LogicalPlan::Projection { input, .. }
                | LogicalPlan::Filter { input, .. } => has_label_scan(input),
                _ => false,
            }
        }
        assert!(has_label_scan(&p), "{p:?}");
    }

    #[test]
    fn test_filter_does_not_cross_limit() {
        // The WHERE belongs to the WITH horizon above LIMIT; pushing it below
        // would change which rows are limited.
        let p = optimized("MATCH (n) WITH n LIMIT 5 WHERE n.x = 1 RETURN n");
        fn filter_over_limit(p: &LogicalPlan) -> bool {
            match p {
                LogicalPlan::Filter { input, .. } => {
                    matches!(**input, LogicalPlan::Limit { .. })
                }
                LogicalPlan::Projection { input, .. } => filter_over_limit(input),
                _ => false,
            }
        }
        assert!(filter_over_limit(&p), "{p:?}");
    }
}
