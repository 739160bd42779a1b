//! Cypher AST.
//!
//! Pure data produced by the parser and consumed (by move) by the planner.
//! Every node records the source position of its first token. Positions do
//! not participate in structural equality, so a pretty-printed and re-parsed
//! query compares equal to the original.

use crate::model::Direction;

/// Source position, 1-based. Equality always holds so that AST comparison
/// is structural.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl PartialEq for Pos {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}
impl Eq for Pos {}

// ============================================================================
// Query structure
// ============================================================================

/// A complete query: one or more single queries joined by UNION.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub first: SingleQuery,
    pub unions: Vec<UnionBranch>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionBranch {
    /// UNION ALL keeps duplicates.
    pub all: bool,
    pub query: SingleQuery,
}

/// A clause sequence with an optional trailing RETURN.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
    pub return_clause: Option<ReturnClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    Unwind(UnwindClause),
    With(WithClause),
    Create(CreateClause),
    Merge(MergeClause),
    Set(SetClause),
    Remove(RemoveClause),
    Delete(DeleteClause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnwindClause {
    pub expr: Expr,
    pub alias: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    pub where_clause: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateClause {
    pub patterns: Vec<Pattern>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeClause {
    pub pattern: Pattern,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub items: Vec<SetItem>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetItem {
    /// SET n.prop = expr
    Property { variable: String, key: String, value: Expr },
    /// SET n = {map}
    Replace { variable: String, value: Expr },
    /// SET n += {map}
    Merge { variable: String, value: Expr },
    /// SET n:Label
    Label { variable: String, label: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveClause {
    pub items: Vec<RemoveItem>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveItem {
    Property { variable: String, key: String },
    Label { variable: String, label: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteClause {
    pub detach: bool,
    pub variables: Vec<String>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    pub pos: Pos,
}

/// One projected expression. `text` is the exact source slice, used as the
/// column name when no alias is given; it does not participate in equality.
#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub expr: Expr,
    pub alias: Option<String>,
    pub text: String,
}

impl PartialEq for ProjectionItem {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr && self.alias == other.alias
    }
}

impl ProjectionItem {
    pub fn column_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expr: Expr,
    pub ascending: bool,
}

// ============================================================================
// Patterns
// ============================================================================

/// A path pattern: node, then zero or more (edge, node) segments, with an
/// optional `p = ...` binding for the whole path.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub path_var: Option<String>,
    pub start: NodePattern,
    pub segments: Vec<(RelPattern, NodePattern)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub variable: Option<String>,
    pub types: Vec<String>,
    pub direction: Direction,
    pub var_length: Option<VarLength>,
    pub properties: Vec<(String, Expr)>,
    pub pos: Pos,
}

/// `*`, `*n`, `*n..`, `*n..m`, `*..m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLength {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Parameter(String),
    /// `base.key`
    Property { base: Box<Expr>, key: String },
    /// `base[index]`
    Index { base: Box<Expr>, index: Box<Expr> },
    FunctionCall { name: String, args: Vec<Expr>, distinct: bool },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    List(Vec<Expr>),
    /// Literal map; entry order is preserved for rendering.
    Map(Vec<(String, Expr)>),
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// `item IN list`
    In { item: Box<Expr>, list: Box<Expr> },
    IsNull { operand: Box<Expr>, negated: bool },
    StringOp { op: StringOp, left: Box<Expr>, right: Box<Expr> },
    /// `n:Label`
    HasLabel { base: Box<Expr>, label: String },
    /// `*` in RETURN or count(*)
    Star,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod, Pow,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or, Xor,
    RegexMatch,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::RegexMatch => "=~",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    StartsWith,
    EndsWith,
    Contains,
}

impl StringOp {
    pub fn keyword(self) -> &'static str {
        match self {
            StringOp::StartsWith => "STARTS WITH",
            StringOp::EndsWith => "ENDS WITH",
            StringOp::Contains => "CONTAINS",
        }
    }
}

// ============================================================================
// Rendering (pretty printer)
// ============================================================================

use std::fmt;

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        for branch in &self.unions {
            if branch.all {
                write!(f, " UNION ALL {}", branch.query)?;
            } else {
                write!(f, " UNION {}", branch.query)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for SingleQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{clause}")?;
        }
        if let Some(ret) = &self.return_clause {
            if !self.clauses.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "{ret}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Match(m) => {
                if m.optional {
                    write!(f, "OPTIONAL ")?;
                }
                write!(f, "MATCH {}", join(&m.patterns, ", "))?;
                if let Some(w) = &m.where_clause {
                    write!(f, " WHERE {w}")?;
                }
                Ok(())
            }
            Clause::Unwind(u) => write!(f, "UNWIND {} AS {}", u.expr, u.alias),
            Clause::With(w) => {
                write!(f, "WITH ")?;
                if w.distinct {
                    write!(f, "DISTINCT ")?;
                }
                write!(f, "{}", join(&w.items, ", "))?;
                write_tail(f, &w.order_by, &w.skip, &w.limit)?;
                if let Some(pred) = &w.where_clause {
                    write!(f, " WHERE {pred}")?;
                }
                Ok(())
            }
            Clause::Create(c) => write!(f, "CREATE {}", join(&c.patterns, ", ")),
            Clause::Merge(m) => {
                write!(f, "MERGE {}", m.pattern)?;
                if !m.on_create.is_empty() {
                    write!(f, " ON CREATE SET {}", join(&m.on_create, ", "))?;
                }
                if !m.on_match.is_empty() {
                    write!(f, " ON MATCH SET {}", join(&m.on_match, ", "))?;
                }
                Ok(())
            }
            Clause::Set(s) => write!(f, "SET {}", join(&s.items, ", ")),
            Clause::Remove(r) => write!(f, "REMOVE {}", join(&r.items, ", ")),
            Clause::Delete(d) => {
                if d.detach {
                    write!(f, "DETACH ")?;
                }
                write!(f, "DELETE {}", d.variables.join(", "))
            }
        }
    }
}

fn write_tail(
    f: &mut fmt::Formatter<'_>,
    order_by: &[SortItem],
    skip: &Option<Expr>,
    limit: &Option<Expr>,
) -> fmt::Result {
    if !order_by.is_empty() {
        write!(f, " ORDER BY {}", join(order_by, ", "))?;
    }
    if let Some(s) = skip {
        write!(f, " SKIP {s}")?;
    }
    if let Some(l) = limit {
        write!(f, " LIMIT {l}")?;
    }
    Ok(())
}

impl fmt::Display for ReturnClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RETURN ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{}", join(&self.items, ", "))?;
        write_tail(f, &self.order_by, &self.skip, &self.limit)
    }
}

impl fmt::Display for ProjectionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SortItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if !self.ascending {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

impl fmt::Display for SetItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetItem::Property { variable, key, value } => write!(f, "{variable}.{key} = {value}"),
            SetItem::Replace { variable, value } => write!(f, "{variable} = {value}"),
            SetItem::Merge { variable, value } => write!(f, "{variable} += {value}"),
            SetItem::Label { variable, label } => write!(f, "{variable}:{label}"),
        }
    }
}

impl fmt::Display for RemoveItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveItem::Property { variable, key } => write!(f, "{variable}.{key}"),
            RemoveItem::Label { variable, label } => write!(f, "{variable}:{label}"),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path_var {
            write!(f, "{p} = ")?;
        }
        write!(f, "{}", self.start)?;
        for (rel, node) in &self.segments {
            write!(f, "{rel}{node}")?;
        }
        Ok(())
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(v) = &self.variable {
            write!(f, "{v}")?;
        }
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        if !self.properties.is_empty() {
            if self.variable.is_some() || !self.labels.is_empty() {
                write!(f, " ")?;
            }
            write_property_map(f, &self.properties)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for RelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Incoming => write!(f, "<-")?,
            _ => write!(f, "-")?,
        }
        let has_body = self.variable.is_some()
            || !self.types.is_empty()
            || self.var_length.is_some()
            || !self.properties.is_empty();
        if has_body {
            write!(f, "[")?;
            if let Some(v) = &self.variable {
                write!(f, "{v}")?;
            }
            if !self.types.is_empty() {
                write!(f, ":{}", self.types.join("|"))?;
            }
            if let Some(vl) = &self.var_length {
                write!(f, "*")?;
                match (vl.min, vl.max) {
                    (Some(min), Some(max)) if min == max => write!(f, "{min}")?,
                    (min, max) => {
                        if let Some(m) = min {
                            write!(f, "{m}")?;
                        }
                        if min.is_some() || max.is_some() {
                            write!(f, "..")?;
                        }
                        if let Some(m) = max {
                            write!(f, "{m}")?;
                        }
                    }
                }
            }
            if !self.properties.is_empty() {
                write!(f, " ")?;
                write_property_map(f, &self.properties)?;
            }
            write!(f, "]")?;
        }
        match self.direction {
            Direction::Outgoing => write!(f, "->"),
            _ => write!(f, "-"),
        }
    }
}

fn write_property_map(f: &mut fmt::Formatter<'_>, props: &[(String, Expr)]) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in props.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key}: {value}")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(lit) => write!(f, "{lit}"),
            ExprKind::Variable(name) => write!(f, "{name}"),
            ExprKind::Parameter(name) => write!(f, "${name}"),
            ExprKind::Property { base, key } => write!(f, "{base}.{key}"),
            ExprKind::Index { base, index } => write!(f, "{base}[{index}]"),
            ExprKind::FunctionCall { name, args, distinct } => {
                write!(f, "{name}(")?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                write!(f, "{})", join(args, ", "))
            }
            // Binary expressions render fully parenthesized so the printed
            // form re-parses to the same tree.
            ExprKind::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "(NOT {operand})"),
                UnaryOp::Neg => write!(f, "(-{operand})"),
            },
            ExprKind::List(items) => write!(f, "[{}]", join(items, ", ")),
            ExprKind::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            ExprKind::Case { operand, whens, else_expr } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {op}")?;
                }
                for (when, then) in whens {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = else_expr {
                    write!(f, " ELSE {e}")?;
                }
                write!(f, " END")
            }
            ExprKind::In { item, list } => write!(f, "({item} IN {list})"),
            ExprKind::IsNull { operand, negated } => {
                if *negated {
                    write!(f, "({operand} IS NOT NULL)")
                } else {
                    write!(f, "({operand} IS NULL)")
                }
            }
            ExprKind::StringOp { op, left, right } => {
                write!(f, "({left} {} {right})", op.keyword())
            }
            ExprKind::HasLabel { base, label } => write!(f, "{base}:{label}"),
            ExprKind::Star => write!(f, "*"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => {
                let s = format!("{v}");
                if s.contains('.') || s.contains('e') || s.contains('E') {
                    write!(f, "{s}")
                } else {
                    write!(f, "{s}.0")
                }
            }
            Literal::String(s) => {
                write!(f, "'")?;
                for ch in s.chars() {
                    match ch {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "'")
            }
        }
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}
