//! Cypher recursive descent parser.
//!
//! One-token lookahead over the lexer's stream. Produces a `Statement`
//! rooted at a [`Query`]. Syntax errors carry the failing token's line,
//! column, and a short slice of surrounding source. Expression recursion is
//! depth-capped.

use crate::error::{Error, Location, Result};
use crate::model::Direction;

use super::ast::*;
use super::lexer::{tokenize, unescape_string, Token, TokenKind};

/// A parsed statement: the query plus the EXPLAIN flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub explain: bool,
    pub query: Query,
}

/// Parse with the default recursion limit.
pub fn parse_statement(source: &str) -> Result<Statement> {
    parse_statement_with_limit(source, crate::config::DEFAULT_MAX_PARSER_DEPTH)
}

pub fn parse_statement_with_limit(source: &str, max_depth: usize) -> Result<Statement> {
    let tokens = tokenize(source);
    let mut p = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
        last_end: 0,
    };

    let explain = p.eat(TokenKind::Explain);
    let query = parse_query(&mut p)?;

    p.eat(TokenKind::Semicolon);
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!("unexpected token '{}' after query", p.peek().text)));
    }

    Ok(Statement { explain, query })
}

// ============================================================================
// Parser state
// ============================================================================

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    /// Byte offset just past the last consumed token.
    last_end: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_second_kind(&self) -> TokenKind {
        self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.last_end = tok.offset + tok.text.len();
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else if self.at(TokenKind::Error) {
            Err(self.error(self.peek().text.clone()))
        } else {
            Err(self.error(format!(
                "expected {:?}, found '{}'",
                kind,
                describe(self.peek())
            )))
        }
    }

    fn pos_of(&self, tok: &Token) -> Pos {
        Pos { line: tok.line, column: tok.column }
    }

    fn here(&self) -> Pos {
        self.pos_of(self.peek())
    }

    fn error(&self, message: String) -> Error {
        let tok = self.peek();
        Error::Syntax {
            message,
            location: Location { line: tok.line, column: tok.column },
            context: context_slice(self.source, tok.offset),
        }
    }

    /// Surface an in-stream lexer failure as a syntax error.
    fn check_lex_error(&self) -> Result<()> {
        if self.at(TokenKind::Error) {
            Err(self.error(self.peek().text.clone()))
        } else {
            Ok(())
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::DepthExceeded(self.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Consume a name token: an identifier, or any keyword used as a name
    /// (labels and property keys like `order` collide with keywords).
    fn expect_name(&mut self) -> Result<String> {
        if self.at(TokenKind::Identifier) || is_keyword(self.peek_kind()) {
            Ok(self.advance().text)
        } else {
            self.check_lex_error()?;
            Err(self.error(format!("expected a name, found '{}'", describe(self.peek()))))
        }
    }

    fn expect_variable(&mut self) -> Result<String> {
        if self.at(TokenKind::Identifier) {
            Ok(self.advance().text)
        } else {
            self.check_lex_error()?;
            Err(self.error(format!("expected a variable, found '{}'", describe(self.peek()))))
        }
    }
}

fn describe(tok: &Token) -> String {
    if tok.kind == TokenKind::Eof {
        "end of input".to_string()
    } else {
        tok.text.clone()
    }
}

fn is_keyword(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Match | Optional | Where | Return | Create | Merge | Set | Delete | Detach | Remove
            | With | Union | All | As | Order | By | Asc | Desc | Limit | Skip | Distinct
            | And | Or | Xor | Not | In | Starts | Ends | Contains | Is | Null | True | False
            | Case | When | Then | Else | End | Unwind | On | Explain
    )
}

/// Up to 64 chars of source around `offset`, for error messages.
fn context_slice(source: &str, offset: usize) -> String {
    let mut start = offset.saturating_sub(30).min(source.len());
    while start > 0 && !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + 34).min(source.len());
    while end < source.len() && !source.is_char_boundary(end) {
        end += 1;
    }
    source[start..end].trim().chars().take(64).collect()
}

// ============================================================================
// Query structure
// ============================================================================

fn parse_query(p: &mut Parser) -> Result<Query> {
    let pos = p.here();
    let first = parse_single_query(p)?;
    let mut unions = Vec::new();
    while p.eat(TokenKind::Union) {
        let all = p.eat(TokenKind::All);
        unions.push(UnionBranch { all, query: parse_single_query(p)? });
    }
    Ok(Query { first, unions, pos })
}

fn parse_single_query(p: &mut Parser) -> Result<SingleQuery> {
    let mut clauses = Vec::new();
    let mut return_clause = None;

    loop {
        p.check_lex_error()?;
        match p.peek_kind() {
            TokenKind::Match | TokenKind::Optional => {
                clauses.push(Clause::Match(parse_match(p)?));
            }
            TokenKind::Unwind => clauses.push(Clause::Unwind(parse_unwind(p)?)),
            TokenKind::With => clauses.push(Clause::With(parse_with(p)?)),
            TokenKind::Create => clauses.push(Clause::Create(parse_create(p)?)),
            TokenKind::Merge => clauses.push(Clause::Merge(parse_merge(p)?)),
            TokenKind::Set => clauses.push(Clause::Set(parse_set(p)?)),
            TokenKind::Remove => clauses.push(Clause::Remove(parse_remove(p)?)),
            TokenKind::Delete | TokenKind::Detach => {
                clauses.push(Clause::Delete(parse_delete(p)?));
            }
            TokenKind::Return => {
                return_clause = Some(parse_return(p)?);
                break;
            }
            _ => break,
        }
    }

    if clauses.is_empty() && return_clause.is_none() {
        p.check_lex_error()?;
        if p.at(TokenKind::Eof) {
            return Err(Error::Semantic("empty query".into()));
        }
        return Err(p.error(format!(
            "expected a clause, found '{}'",
            describe(p.peek())
        )));
    }

    Ok(SingleQuery { clauses, return_clause })
}

// ============================================================================
// Clauses
// ============================================================================

fn parse_match(p: &mut Parser) -> Result<MatchClause> {
    let pos = p.here();
    let optional = p.eat(TokenKind::Optional);
    p.expect(TokenKind::Match)?;
    let patterns = parse_pattern_list(p)?;
    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    Ok(MatchClause { optional, patterns, where_clause, pos })
}

fn parse_unwind(p: &mut Parser) -> Result<UnwindClause> {
    let pos = p.here();
    p.expect(TokenKind::Unwind)?;
    let expr = parse_expr(p)?;
    p.expect(TokenKind::As)?;
    let alias = p.expect_variable()?;
    Ok(UnwindClause { expr, alias, pos })
}

fn parse_with(p: &mut Parser) -> Result<WithClause> {
    let pos = p.here();
    p.expect(TokenKind::With)?;
    let (distinct, items, order_by, skip, limit) = parse_projection_body(p)?;
    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    Ok(WithClause { distinct, items, order_by, skip, limit, where_clause, pos })
}

fn parse_create(p: &mut Parser) -> Result<CreateClause> {
    let pos = p.here();
    p.expect(TokenKind::Create)?;
    let patterns = parse_pattern_list(p)?;
    Ok(CreateClause { patterns, pos })
}

fn parse_merge(p: &mut Parser) -> Result<MergeClause> {
    let pos = p.here();
    p.expect(TokenKind::Merge)?;
    let pattern = parse_pattern(p)?;

    let mut on_create = Vec::new();
    let mut on_match = Vec::new();
    while p.eat(TokenKind::On) {
        if p.eat(TokenKind::Create) {
            p.expect(TokenKind::Set)?;
            on_create.extend(parse_set_items(p)?);
        } else if p.eat(TokenKind::Match) {
            p.expect(TokenKind::Set)?;
            on_match.extend(parse_set_items(p)?);
        } else {
            return Err(p.error("expected CREATE or MATCH after ON".into()));
        }
    }

    Ok(MergeClause { pattern, on_create, on_match, pos })
}

fn parse_set(p: &mut Parser) -> Result<SetClause> {
    let pos = p.here();
    p.expect(TokenKind::Set)?;
    let items = parse_set_items(p)?;
    Ok(SetClause { items, pos })
}

fn parse_set_items(p: &mut Parser) -> Result<Vec<SetItem>> {
    let mut items = vec![parse_set_item(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_set_item(p)?);
    }
    Ok(items)
}

fn parse_set_item(p: &mut Parser) -> Result<SetItem> {
    let variable = p.expect_variable()?;
    if p.eat(TokenKind::Dot) {
        let key = p.expect_name()?;
        p.expect(TokenKind::Eq)?;
        let value = parse_expr(p)?;
        Ok(SetItem::Property { variable, key, value })
    } else if p.eat(TokenKind::PlusEq) {
        let value = parse_expr(p)?;
        Ok(SetItem::Merge { variable, value })
    } else if p.eat(TokenKind::Eq) {
        let value = parse_expr(p)?;
        Ok(SetItem::Replace { variable, value })
    } else if p.eat(TokenKind::Colon) {
        let label = p.expect_name()?;
        Ok(SetItem::Label { variable, label })
    } else {
        Err(p.error("expected '.', '=', '+=', or ':' after SET variable".into()))
    }
}

fn parse_remove(p: &mut Parser) -> Result<RemoveClause> {
    let pos = p.here();
    p.expect(TokenKind::Remove)?;
    let mut items = vec![parse_remove_item(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_remove_item(p)?);
    }
    Ok(RemoveClause { items, pos })
}

fn parse_remove_item(p: &mut Parser) -> Result<RemoveItem> {
    let variable = p.expect_variable()?;
    if p.eat(TokenKind::Dot) {
        let key = p.expect_name()?;
        Ok(RemoveItem::Property { variable, key })
    } else if p.eat(TokenKind::Colon) {
        let label = p.expect_name()?;
        Ok(RemoveItem::Label { variable, label })
    } else {
        Err(p.error("expected '.' or ':' after REMOVE variable".into()))
    }
}

fn parse_delete(p: &mut Parser) -> Result<DeleteClause> {
    let pos = p.here();
    let detach = p.eat(TokenKind::Detach);
    p.expect(TokenKind::Delete)?;
    let mut variables = vec![p.expect_variable()?];
    while p.eat(TokenKind::Comma) {
        variables.push(p.expect_variable()?);
    }
    Ok(DeleteClause { detach, variables, pos })
}

fn parse_return(p: &mut Parser) -> Result<ReturnClause> {
    let pos = p.here();
    p.expect(TokenKind::Return)?;
    let (distinct, items, order_by, skip, limit) = parse_projection_body(p)?;
    Ok(ReturnClause { distinct, items, order_by, skip, limit, pos })
}

type ProjectionBody = (bool, Vec<ProjectionItem>, Vec<SortItem>, Option<Expr>, Option<Expr>);

fn parse_projection_body(p: &mut Parser) -> Result<ProjectionBody> {
    let distinct = p.eat(TokenKind::Distinct);

    let mut items = vec![parse_projection_item(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_projection_item(p)?);
    }

    let mut order_by = Vec::new();
    if p.at(TokenKind::Order) {
        p.advance();
        p.expect(TokenKind::By)?;
        order_by.push(parse_sort_item(p)?);
        while p.eat(TokenKind::Comma) {
            order_by.push(parse_sort_item(p)?);
        }
    }

    let skip = if p.eat(TokenKind::Skip) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    let limit = if p.eat(TokenKind::Limit) {
        Some(parse_expr(p)?)
    } else {
        None
    };

    Ok((distinct, items, order_by, skip, limit))
}

fn parse_projection_item(p: &mut Parser) -> Result<ProjectionItem> {
    if p.at(TokenKind::Star) {
        let tok = p.advance();
        return Ok(ProjectionItem {
            expr: Expr::new(ExprKind::Star, Pos { line: tok.line, column: tok.column }),
            alias: None,
            text: "*".into(),
        });
    }

    let start = p.peek().offset;
    let expr = parse_expr(p)?;
    let text = p.source[start..p.last_end].trim().to_string();

    let alias = if p.eat(TokenKind::As) {
        Some(p.expect_name()?)
    } else {
        None
    };

    Ok(ProjectionItem { expr, alias, text })
}

fn parse_sort_item(p: &mut Parser) -> Result<SortItem> {
    let expr = parse_expr(p)?;
    let ascending = if p.eat(TokenKind::Desc) {
        false
    } else {
        p.eat(TokenKind::Asc);
        true
    };
    Ok(SortItem { expr, ascending })
}

// ============================================================================
// Patterns
// ============================================================================

fn parse_pattern_list(p: &mut Parser) -> Result<Vec<Pattern>> {
    let mut patterns = vec![parse_pattern(p)?];
    while p.eat(TokenKind::Comma) {
        patterns.push(parse_pattern(p)?);
    }
    Ok(patterns)
}

fn parse_pattern(p: &mut Parser) -> Result<Pattern> {
    // `p = (a)-[...]->(b)` binds the whole path.
    let path_var = if p.at(TokenKind::Identifier) && p.peek_second_kind() == TokenKind::Eq {
        let var = p.advance().text;
        p.advance(); // =
        Some(var)
    } else {
        None
    };

    let start = parse_node_pattern(p)?;
    let mut segments = Vec::new();
    while matches!(
        p.peek_kind(),
        TokenKind::Dash | TokenKind::LeftArrow | TokenKind::BothArrow
    ) {
        let rel = parse_rel_pattern(p)?;
        let node = parse_node_pattern(p)?;
        segments.push((rel, node));
    }
    Ok(Pattern { path_var, start, segments })
}

fn parse_node_pattern(p: &mut Parser) -> Result<NodePattern> {
    let pos = p.here();
    p.expect(TokenKind::LParen)?;

    let variable = if p.at(TokenKind::Identifier) {
        Some(p.advance().text)
    } else {
        None
    };

    let mut labels = Vec::new();
    while p.eat(TokenKind::Colon) {
        labels.push(p.expect_name()?);
    }

    let properties = if p.at(TokenKind::LBrace) {
        parse_property_entries(p)?
    } else {
        Vec::new()
    };

    p.expect(TokenKind::RParen)?;
    Ok(NodePattern { variable, labels, properties, pos })
}

fn parse_rel_pattern(p: &mut Parser) -> Result<RelPattern> {
    let pos = p.here();

    // Leading edge: `-`, `<-`, or the fused `<->`.
    let (left_arrow, fused_both) = if p.eat(TokenKind::BothArrow) {
        (false, true)
    } else if p.eat(TokenKind::LeftArrow) {
        (true, false)
    } else {
        p.expect(TokenKind::Dash)?;
        (false, false)
    };

    let mut variable = None;
    let mut types = Vec::new();
    let mut var_length = None;
    let mut properties = Vec::new();

    if !fused_both && p.at(TokenKind::LBracket) {
        p.advance();

        if p.at(TokenKind::Identifier) {
            variable = Some(p.advance().text);
        }

        if p.eat(TokenKind::Colon) {
            types.push(p.expect_name()?);
            while p.eat(TokenKind::Pipe) {
                types.push(p.expect_name()?);
            }
        }

        if p.eat(TokenKind::Star) {
            var_length = Some(parse_var_length(p)?);
        }

        if p.at(TokenKind::LBrace) {
            properties = parse_property_entries(p)?;
        }

        p.expect(TokenKind::RBracket)?;
    }

    // Trailing edge. `<->` has consumed everything already.
    let right_arrow = if fused_both {
        false
    } else if p.eat(TokenKind::Arrow) {
        true
    } else {
        p.expect(TokenKind::Dash)?;
        false
    };

    let direction = match (fused_both, left_arrow, right_arrow) {
        (true, _, _) => Direction::Both,
        (_, true, true) => Direction::Both,
        (_, true, false) => Direction::Incoming,
        (_, false, true) => Direction::Outgoing,
        (_, false, false) => Direction::Both,
    };

    Ok(RelPattern { variable, types, direction, var_length, properties, pos })
}

fn parse_var_length(p: &mut Parser) -> Result<VarLength> {
    let parse_bound = |tok: Token| -> Result<u32> {
        tok.text.parse::<u32>().map_err(|_| Error::Syntax {
            message: format!("invalid path length '{}'", tok.text),
            location: Location { line: tok.line, column: tok.column },
            context: tok.text.clone(),
        })
    };

    let min = if p.at(TokenKind::Integer) {
        Some(parse_bound(p.advance())?)
    } else {
        None
    };

    if p.eat(TokenKind::DotDot) {
        let max = if p.at(TokenKind::Integer) {
            Some(parse_bound(p.advance())?)
        } else {
            None
        };
        Ok(VarLength { min, max })
    } else {
        // `*n` means exactly n hops; bare `*` is unbounded.
        Ok(VarLength { min, max: min })
    }
}

fn parse_property_entries(p: &mut Parser) -> Result<Vec<(String, Expr)>> {
    p.expect(TokenKind::LBrace)?;
    let mut entries = Vec::new();
    if !p.at(TokenKind::RBrace) {
        loop {
            let key = p.expect_name()?;
            p.expect(TokenKind::Colon)?;
            let value = parse_expr(p)?;
            entries.push((key, value));
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(entries)
}

// ============================================================================
// Expressions (precedence climbing)
// ============================================================================

fn parse_expr(p: &mut Parser) -> Result<Expr> {
    p.enter()?;
    let result = parse_or(p);
    p.leave();
    result
}

fn parse_or(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_xor(p)?;
    while p.at(TokenKind::Or) {
        let pos = left.pos;
        p.advance();
        let right = parse_xor(p)?;
        left = Expr::new(
            ExprKind::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) },
            pos,
        );
    }
    Ok(left)
}

fn parse_xor(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and(p)?;
    while p.at(TokenKind::Xor) {
        let pos = left.pos;
        p.advance();
        let right = parse_and(p)?;
        left = Expr::new(
            ExprKind::Binary { op: BinaryOp::Xor, left: Box::new(left), right: Box::new(right) },
            pos,
        );
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not(p)?;
    while p.at(TokenKind::And) {
        let pos = left.pos;
        p.advance();
        let right = parse_not(p)?;
        left = Expr::new(
            ExprKind::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) },
            pos,
        );
    }
    Ok(left)
}

fn parse_not(p: &mut Parser) -> Result<Expr> {
    if p.at(TokenKind::Not) {
        p.enter()?;
        let pos = p.here();
        p.advance();
        let operand = parse_not(p);
        p.leave();
        let operand = operand?;
        return Ok(Expr::new(
            ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) },
            pos,
        ));
    }
    parse_comparison(p)
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_additive(p)?;
    loop {
        let pos = left.pos;
        let op = match p.peek_kind() {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::Neq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Lte => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Gte => Some(BinaryOp::Ge),
            TokenKind::RegexMatch => Some(BinaryOp::RegexMatch),
            _ => None,
        };
        if let Some(op) = op {
            p.advance();
            let right = parse_additive(p)?;
            left = Expr::new(
                ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                pos,
            );
            continue;
        }

        match p.peek_kind() {
            TokenKind::Starts => {
                p.advance();
                p.expect(TokenKind::With)?;
                let right = parse_additive(p)?;
                left = Expr::new(
                    ExprKind::StringOp {
                        op: StringOp::StartsWith,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    pos,
                );
            }
            TokenKind::Ends => {
                p.advance();
                p.expect(TokenKind::With)?;
                let right = parse_additive(p)?;
                left = Expr::new(
                    ExprKind::StringOp {
                        op: StringOp::EndsWith,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    pos,
                );
            }
            TokenKind::Contains => {
                p.advance();
                let right = parse_additive(p)?;
                left = Expr::new(
                    ExprKind::StringOp {
                        op: StringOp::Contains,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    pos,
                );
            }
            TokenKind::In => {
                p.advance();
                let list = parse_additive(p)?;
                left = Expr::new(
                    ExprKind::In { item: Box::new(left), list: Box::new(list) },
                    pos,
                );
            }
            TokenKind::Is => {
                p.advance();
                let negated = p.eat(TokenKind::Not);
                p.expect(TokenKind::Null)?;
                left = Expr::new(
                    ExprKind::IsNull { operand: Box::new(left), negated },
                    pos,
                );
            }
            _ => break,
        }
    }
    Ok(left)
}

fn parse_additive(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplicative(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Dash => BinaryOp::Sub,
            _ => break,
        };
        let pos = left.pos;
        p.advance();
        let right = parse_multiplicative(p)?;
        left = Expr::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            pos,
        );
    }
    Ok(left)
}

fn parse_multiplicative(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_power(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        let pos = left.pos;
        p.advance();
        let right = parse_power(p)?;
        left = Expr::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            pos,
        );
    }
    Ok(left)
}

fn parse_power(p: &mut Parser) -> Result<Expr> {
    let left = parse_unary(p)?;
    if p.at(TokenKind::Caret) {
        let pos = left.pos;
        p.advance();
        // Right-associative.
        let right = parse_power(p)?;
        return Ok(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            },
            pos,
        ));
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.at(TokenKind::Dash) {
        let pos = p.here();
        p.advance();
        let operand = parse_unary(p)?;
        return Ok(Expr::new(
            ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) },
            pos,
        ));
    }
    if p.at(TokenKind::Plus) {
        p.advance();
        return parse_unary(p);
    }
    parse_postfix(p)
}

fn parse_postfix(p: &mut Parser) -> Result<Expr> {
    let mut expr = parse_primary(p)?;

    loop {
        if p.at(TokenKind::Dot) {
            let pos = expr.pos;
            p.advance();
            let key = p.expect_name()?;
            expr = Expr::new(ExprKind::Property { base: Box::new(expr), key }, pos);
        } else if p.at(TokenKind::LBracket) {
            let pos = expr.pos;
            p.advance();
            let index = parse_expr(p)?;
            p.expect(TokenKind::RBracket)?;
            expr = Expr::new(
                ExprKind::Index { base: Box::new(expr), index: Box::new(index) },
                pos,
            );
        } else if p.at(TokenKind::Colon) && matches!(expr.kind, ExprKind::Variable(_)) {
            let pos = expr.pos;
            p.advance();
            let label = p.expect_name()?;
            expr = Expr::new(ExprKind::HasLabel { base: Box::new(expr), label }, pos);
        } else {
            break;
        }
    }

    Ok(expr)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    p.check_lex_error()?;
    let pos = p.here();

    match p.peek_kind() {
        TokenKind::Integer => {
            let tok = p.advance();
            let value = tok.text.parse::<i64>().map_err(|_| Error::Syntax {
                message: format!("integer literal '{}' out of range", tok.text),
                location: Location { line: tok.line, column: tok.column },
                context: tok.text.clone(),
            })?;
            Ok(Expr::new(ExprKind::Literal(Literal::Int(value)), pos))
        }
        TokenKind::Float => {
            let tok = p.advance();
            let value = tok.text.parse::<f64>().map_err(|_| Error::Syntax {
                message: format!("invalid float literal '{}'", tok.text),
                location: Location { line: tok.line, column: tok.column },
                context: tok.text.clone(),
            })?;
            Ok(Expr::new(ExprKind::Literal(Literal::Float(value)), pos))
        }
        TokenKind::StringLiteral => {
            let tok = p.advance();
            Ok(Expr::new(
                ExprKind::Literal(Literal::String(unescape_string(&tok.text))),
                pos,
            ))
        }
        TokenKind::True => {
            p.advance();
            Ok(Expr::new(ExprKind::Literal(Literal::Bool(true)), pos))
        }
        TokenKind::False => {
            p.advance();
            Ok(Expr::new(ExprKind::Literal(Literal::Bool(false)), pos))
        }
        TokenKind::Null => {
            p.advance();
            Ok(Expr::new(ExprKind::Literal(Literal::Null), pos))
        }
        TokenKind::Parameter => {
            let tok = p.advance();
            Ok(Expr::new(ExprKind::Parameter(tok.text[1..].to_string()), pos))
        }
        TokenKind::LParen => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }
        TokenKind::LBracket => {
            p.advance();
            let mut items = Vec::new();
            if !p.at(TokenKind::RBracket) {
                items.push(parse_expr(p)?);
                while p.eat(TokenKind::Comma) {
                    items.push(parse_expr(p)?);
                }
            }
            p.expect(TokenKind::RBracket)?;
            Ok(Expr::new(ExprKind::List(items), pos))
        }
        TokenKind::LBrace => {
            let entries = parse_property_entries(p)?;
            Ok(Expr::new(ExprKind::Map(entries), pos))
        }
        TokenKind::Case => {
            p.advance();
            let operand = if !p.at(TokenKind::When) {
                Some(Box::new(parse_expr(p)?))
            } else {
                None
            };
            let mut whens = Vec::new();
            while p.eat(TokenKind::When) {
                let when = parse_expr(p)?;
                p.expect(TokenKind::Then)?;
                let then = parse_expr(p)?;
                whens.push((when, then));
            }
            if whens.is_empty() {
                return Err(p.error("CASE requires at least one WHEN branch".into()));
            }
            let else_expr = if p.eat(TokenKind::Else) {
                Some(Box::new(parse_expr(p)?))
            } else {
                None
            };
            p.expect(TokenKind::End)?;
            Ok(Expr::new(ExprKind::Case { operand, whens, else_expr }, pos))
        }
        TokenKind::Identifier => {
            let tok = p.advance();
            if p.at(TokenKind::LParen) {
                p.advance();
                let distinct = p.eat(TokenKind::Distinct);
                let mut args = Vec::new();
                if p.at(TokenKind::Star) {
                    // count(*)
                    p.advance();
                } else if !p.at(TokenKind::RParen) {
                    args.push(parse_expr(p)?);
                    while p.eat(TokenKind::Comma) {
                        args.push(parse_expr(p)?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::FunctionCall { name: tok.text, args, distinct },
                    pos,
                ))
            } else {
                Ok(Expr::new(ExprKind::Variable(tok.text), pos))
            }
        }
        _ => Err(p.error(format!(
            "unexpected '{}' in expression",
            describe(p.peek())
        ))),
    }
}
