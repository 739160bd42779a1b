//! Blocking iterators: sort, distinct, aggregation, joins.
//!
//! Each drains its input during `open` (checking the cancellation flag
//! between elements) and then serves rows in amortized O(1).

use std::cmp::Ordering;
use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::cypher::ast::Expr;
use crate::error::Result;
use crate::eval::{self, Env};
use crate::model::Value;
use crate::planner::logical::{AggFunc, AggregateCall};

use super::{value_signature, ExecContext, RowSource};

// ============================================================================
// Sort
// ============================================================================

pub struct SortIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    keys: &'e [(Expr, bool)],
    buffer: Option<VecDeque<Env>>,
}

impl<'e> SortIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>, keys: &'e [(Expr, bool)]) -> Self {
        Self { child, keys, buffer: None }
    }
}

/// NULLs sort last ascending. Incomparable pairs rank equal, which keeps
/// the sort total and stable.
fn sort_value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cypher_cmp(b).ok().flatten().unwrap_or(Ordering::Equal),
    }
}

impl<'e> RowSource<'e> for SortIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.buffer.is_some() {
            return Ok(());
        }
        self.child.open(cx)?;
        let mut rows: Vec<(Vec<Value>, Env)> = Vec::new();
        while let Some(env) = self.child.next(cx)? {
            cx.check_cancelled()?;
            let keys: Vec<Value> = self
                .keys
                .iter()
                .map(|(expr, _)| {
                    eval::eval_expr(expr, &env, cx.params).unwrap_or(Value::Null)
                })
                .collect();
            rows.push((keys, env));
        }

        // Stable: rows with fully equal keys keep their input order.
        rows.sort_by(|(a, _), (b, _)| {
            for (i, (_, ascending)) in self.keys.iter().enumerate() {
                let ord = sort_value_cmp(&a[i], &b[i]);
                let ord = if *ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        self.buffer = Some(rows.into_iter().map(|(_, env)| env).collect());
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.buffer = None;
        self.child.close(cx);
    }
}

// ============================================================================
// Distinct
// ============================================================================

pub struct DistinctIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    buffer: Option<VecDeque<Env>>,
}

impl<'e> DistinctIter<'e> {
    pub fn new(child: Box<dyn RowSource<'e> + 'e>) -> Self {
        Self { child, buffer: None }
    }
}

fn row_signature(env: &Env) -> String {
    let mut columns: Vec<&String> = env.keys().collect();
    columns.sort();
    let mut out = String::new();
    for column in columns {
        out.push_str(column);
        out.push('=');
        out.push_str(&value_signature(&[&env[column]]));
    }
    out
}

impl<'e> RowSource<'e> for DistinctIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.buffer.is_some() {
            return Ok(());
        }
        self.child.open(cx)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept = VecDeque::new();
        while let Some(env) = self.child.next(cx)? {
            cx.check_cancelled()?;
            if seen.insert(row_signature(&env)) {
                kept.push_back(env);
            }
        }
        self.buffer = Some(kept);
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.buffer = None;
        self.child.close(cx);
    }
}

// ============================================================================
// Aggregation
// ============================================================================

pub struct AggregationIter<'e> {
    child: Box<dyn RowSource<'e> + 'e>,
    group_keys: &'e [(Expr, String)],
    aggregates: &'e [(AggregateCall, String)],
    buffer: Option<VecDeque<Env>>,
}

impl<'e> AggregationIter<'e> {
    pub fn new(
        child: Box<dyn RowSource<'e> + 'e>,
        group_keys: &'e [(Expr, String)],
        aggregates: &'e [(AggregateCall, String)],
    ) -> Self {
        Self { child, group_keys, aggregates, buffer: None }
    }
}

impl<'e> RowSource<'e> for AggregationIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.buffer.is_some() {
            return Ok(());
        }
        self.child.open(cx)?;

        // Group rows by the key values.
        let mut groups: Vec<(Vec<Value>, Vec<Env>)> = Vec::new();
        while let Some(env) = self.child.next(cx)? {
            cx.check_cancelled()?;
            let key: Vec<Value> = self
                .group_keys
                .iter()
                .map(|(expr, _)| eval::eval_expr(expr, &env, cx.params))
                .collect::<Result<_>>()?;
            match groups.iter().position(|(k, _)| *k == key) {
                Some(i) => groups[i].1.push(env),
                None => groups.push((key, vec![env])),
            }
        }

        // A grand aggregate over zero rows still produces one row.
        if groups.is_empty() && self.group_keys.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let mut output = VecDeque::new();
        for (key, rows) in groups {
            cx.check_cancelled()?;
            let mut env = Env::new();
            for (i, (_, name)) in self.group_keys.iter().enumerate() {
                env.insert(name.clone(), key[i].clone());
            }
            for (call, name) in self.aggregates {
                env.insert(name.clone(), compute_aggregate(call, &rows, cx)?);
            }
            output.push_back(env);
        }
        self.buffer = Some(output);
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.buffer = None;
        self.child.close(cx);
    }
}

fn compute_aggregate(call: &AggregateCall, rows: &[Env], cx: &ExecContext<'_>) -> Result<Value> {
    // count(*) counts rows; everything else evaluates the argument and
    // skips NULLs.
    let Some(arg) = &call.arg else {
        return Ok(Value::Int(rows.len() as i64));
    };

    let mut values: Vec<Value> = Vec::new();
    for env in rows {
        let value = eval::eval_expr(arg, env, cx.params)?;
        if !value.is_null() {
            values.push(value);
        }
    }

    if call.distinct {
        let mut seen: HashSet<String> = HashSet::new();
        values.retain(|v| seen.insert(value_signature(&[v])));
    }

    Ok(match call.func {
        AggFunc::Count => Value::Int(values.len() as i64),
        AggFunc::Sum => {
            let mut int_sum: i64 = 0;
            let mut float_sum: f64 = 0.0;
            let mut saw_float = false;
            for value in &values {
                match value {
                    Value::Int(i) => int_sum = int_sum.wrapping_add(*i),
                    Value::Float(f) => {
                        saw_float = true;
                        float_sum += f;
                    }
                    _ => {}
                }
            }
            if saw_float {
                Value::Float(int_sum as f64 + float_sum)
            } else {
                Value::Int(int_sum)
            }
        }
        AggFunc::Avg => {
            if values.is_empty() {
                Value::Null
            } else {
                let sum: f64 = values.iter().filter_map(Value::as_float).sum();
                Value::Float(sum / values.len() as f64)
            }
        }
        AggFunc::Min => fold_extreme(values, Ordering::Less),
        AggFunc::Max => fold_extreme(values, Ordering::Greater),
        AggFunc::Collect => Value::List(values),
    })
}

fn fold_extreme(values: Vec<Value>, keep: Ordering) -> Value {
    let mut result: Option<Value> = None;
    for value in values {
        result = Some(match result {
            None => value,
            Some(current) => match value.cypher_cmp(&current) {
                Ok(Some(ord)) if ord == keep => value,
                _ => current,
            },
        });
    }
    result.unwrap_or(Value::Null)
}

// ============================================================================
// Hash join
// ============================================================================

/// Drains the build side into a hash table during `open`, then probes with
/// each row of the other side. NULL join keys never match.
pub struct HashJoinIter<'e> {
    build: Box<dyn RowSource<'e> + 'e>,
    probe: Box<dyn RowSource<'e> + 'e>,
    join_vars: &'e [String],
    table: Option<HashMap<String, Vec<Env>>>,
    pending: VecDeque<Env>,
}

impl<'e> HashJoinIter<'e> {
    pub fn new(
        build: Box<dyn RowSource<'e> + 'e>,
        probe: Box<dyn RowSource<'e> + 'e>,
        join_vars: &'e [String],
    ) -> Self {
        Self { build, probe, join_vars, table: None, pending: VecDeque::new() }
    }

    fn join_key(&self, env: &Env) -> Option<String> {
        let mut values: Vec<&Value> = Vec::with_capacity(self.join_vars.len());
        for var in self.join_vars {
            match env.get(var) {
                Some(v) if !v.is_null() => values.push(v),
                _ => return None,
            }
        }
        Some(value_signature(&values))
    }
}

impl<'e> RowSource<'e> for HashJoinIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.table.is_some() {
            return Ok(());
        }
        self.build.open(cx)?;
        self.probe.open(cx)?;

        let mut table: HashMap<String, Vec<Env>> = HashMap::new();
        while let Some(env) = self.build.next(cx)? {
            cx.check_cancelled()?;
            if let Some(key) = self.join_key(&env) {
                table.entry(key).or_default().push(env);
            }
        }
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        loop {
            if let Some(env) = self.pending.pop_front() {
                return Ok(Some(env));
            }
            let Some(probe_env) = self.probe.next(cx)? else {
                return Ok(None);
            };
            let Some(key) = self.join_key(&probe_env) else {
                continue;
            };
            let Some(table) = self.table.as_ref() else {
                return Ok(None);
            };
            if let Some(bucket) = table.get(&key) {
                for build_env in bucket {
                    let mut merged = build_env.clone();
                    for (k, v) in &probe_env {
                        merged.insert(k.clone(), v.clone());
                    }
                    self.pending.push_back(merged);
                }
            }
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.table = None;
        self.pending.clear();
        self.build.close(cx);
        self.probe.close(cx);
    }
}

// ============================================================================
// Cartesian product
// ============================================================================

/// Materializes the right side during `open`, then streams the left.
pub struct CartesianProductIter<'e> {
    left: Box<dyn RowSource<'e> + 'e>,
    right: Box<dyn RowSource<'e> + 'e>,
    right_rows: Option<Vec<Env>>,
    current_left: Option<Env>,
    right_index: usize,
}

impl<'e> CartesianProductIter<'e> {
    pub fn new(left: Box<dyn RowSource<'e> + 'e>, right: Box<dyn RowSource<'e> + 'e>) -> Self {
        Self { left, right, right_rows: None, current_left: None, right_index: 0 }
    }
}

impl<'e> RowSource<'e> for CartesianProductIter<'e> {
    fn open(&mut self, cx: &mut ExecContext<'e>) -> Result<()> {
        if self.right_rows.is_some() {
            return Ok(());
        }
        self.left.open(cx)?;
        self.right.open(cx)?;
        let mut rows = Vec::new();
        while let Some(env) = self.right.next(cx)? {
            cx.check_cancelled()?;
            rows.push(env);
        }
        self.right_rows = Some(rows);
        Ok(())
    }

    fn next(&mut self, cx: &mut ExecContext<'e>) -> Result<Option<Env>> {
        cx.check_cancelled()?;
        let right_len = match &self.right_rows {
            Some(rows) => rows.len(),
            None => return Ok(None),
        };
        if right_len == 0 {
            return Ok(None);
        }

        loop {
            if self.current_left.is_none() {
                self.current_left = self.left.next(cx)?;
                self.right_index = 0;
                if self.current_left.is_none() {
                    return Ok(None);
                }
            }
            if self.right_index < right_len {
                let left_env = self.current_left.as_ref().expect("set above");
                let mut merged = left_env.clone();
                let right_env = &self.right_rows.as_ref().expect("opened")[self.right_index];
                for (k, v) in right_env {
                    merged.insert(k.clone(), v.clone());
                }
                self.right_index += 1;
                return Ok(Some(merged));
            }
            self.current_left = None;
        }
    }

    fn close(&mut self, cx: &mut ExecContext<'e>) {
        self.right_rows = None;
        self.current_left = None;
        self.left.close(cx);
        self.right.close(cx);
    }
}
