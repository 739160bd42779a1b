//! Cypher lexer.
//!
//! Produces tokens on demand from a UTF-8 source string. Each token carries
//! its kind, the original source slice, and the 1-based line and column of
//! its first character. Lexical failures become `Error` tokens; the parser
//! turns them into syntax errors.

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original source slice for this token. For `Error` tokens this is the
    /// failure message instead.
    pub text: String,
    pub line: u32,
    pub column: u32,
    /// Byte offset of the first character.
    pub offset: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Match, Optional, Where, Return, Create, Merge, Set, Delete, Detach,
    Remove, With, Union, All, As, Order, By, Asc, Desc, Limit, Skip,
    Distinct, And, Or, Xor, Not, In, Starts, Ends, Contains, Is, Null,
    True, False, Case, When, Then, Else, End, Unwind, On, Explain,

    // Literals
    Integer, Float, StringLiteral,

    // Identifiers and parameters
    Identifier, Parameter,

    // Punctuation
    LParen, RParen, LBracket, RBracket, LBrace, RBrace,
    Dot, DotDot, Comma, Colon, Semicolon, Pipe, Star,
    Arrow,      // ->
    LeftArrow,  // <-
    BothArrow,  // <->
    Dash,       // -

    // Operators
    Eq, Neq, Lt, Lte, Gt, Gte,
    Plus, PlusEq, Slash, Percent, Caret,
    RegexMatch, // =~

    // Failure / end of input
    Error,
    Eof,
}

/// Lazy tokenizer. Restart by constructing a new lexer.
pub struct Lexer<'s> {
    source: &'s str,
    chars: std::iter::Peekable<std::str::CharIndices<'s>>,
    line: u32,
    column: u32,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, ch)) = next {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next().map(|(_, c)| c)
    }

    fn end_offset(&mut self) -> usize {
        self.peek().map_or(self.source.len(), |(i, _)| i)
    }

    fn slice_token(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) -> Token {
        let end = self.end_offset();
        Token {
            kind,
            text: self.source[start..end].to_string(),
            line,
            column,
            offset: start,
        }
    }

    fn error_token(&self, message: String, start: usize, line: u32, column: u32) -> Token {
        Token { kind: TokenKind::Error, text: message, line, column, offset: start }
    }

    /// Produce the next token. After end of input, repeats `Eof`.
    pub fn next_token(&mut self) -> Token {
        loop {
            let Some((start, ch)) = self.peek() else {
                return Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line: self.line,
                    column: self.column,
                    offset: self.source.len(),
                };
            };
            let (line, column) = (self.line, self.column);

            match ch {
                c if c.is_whitespace() => {
                    self.bump();
                }

                // Line comment
                '/' if self.peek_second() == Some('/') => {
                    while let Some((_, c)) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }

                // Block comment
                '/' if self.peek_second() == Some('*') => {
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some((_, c)) = self.bump() {
                        if c == '*' && matches!(self.peek(), Some((_, '/'))) {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return self.error_token("unterminated block comment".into(), start, line, column);
                    }
                }

                '\'' | '"' => return self.lex_string(start, line, column),

                c if c.is_ascii_digit() => return self.lex_number(start, line, column),

                '$' => {
                    self.bump();
                    let mut has_name = false;
                    while let Some((_, c)) = self.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            self.bump();
                            has_name = true;
                        } else {
                            break;
                        }
                    }
                    if !has_name {
                        return self.error_token("expected parameter name after '$'".into(), start, line, column);
                    }
                    return self.slice_token(TokenKind::Parameter, start, line, column);
                }

                c if c.is_alphabetic() || c == '_' => {
                    self.bump();
                    while let Some((_, c)) = self.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let end = self.end_offset();
                    let text = &self.source[start..end];
                    let kind = keyword_or_ident(text);
                    return Token { kind, text: text.to_string(), line, column, offset: start };
                }

                _ => return self.lex_punct(start, line, column),
            }
        }
    }

    fn lex_punct(&mut self, start: usize, line: u32, column: u32) -> Token {
        let (_, ch) = self.bump().expect("caller peeked");
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '|' => TokenKind::Pipe,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '.' => {
                if matches!(self.peek(), Some((_, '.'))) {
                    self.bump();
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if matches!(self.peek(), Some((_, '='))) {
                    self.bump();
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '=' => {
                if matches!(self.peek(), Some((_, '~'))) {
                    self.bump();
                    TokenKind::RegexMatch
                } else {
                    TokenKind::Eq
                }
            }
            '<' => match self.peek() {
                Some((_, '=')) => {
                    self.bump();
                    TokenKind::Lte
                }
                Some((_, '>')) => {
                    self.bump();
                    TokenKind::Neq
                }
                Some((_, '-')) => {
                    self.bump();
                    if matches!(self.peek(), Some((_, '>'))) {
                        self.bump();
                        TokenKind::BothArrow
                    } else {
                        TokenKind::LeftArrow
                    }
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if matches!(self.peek(), Some((_, '='))) {
                    self.bump();
                    TokenKind::Gte
                } else {
                    TokenKind::Gt
                }
            }
            '-' => {
                if matches!(self.peek(), Some((_, '>'))) {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Dash
                }
            }
            other => {
                return self.error_token(format!("unexpected character '{other}'"), start, line, column);
            }
        };
        self.slice_token(kind, start, line, column)
    }

    fn lex_number(&mut self, start: usize, line: u32, column: u32) -> Token {
        let mut is_float = false;
        while let Some((_, c)) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !is_float {
                // Only part of the number when a digit follows; otherwise it
                // belongs to `.` / `..`.
                match self.peek_second() {
                    Some(d) if d.is_ascii_digit() => {
                        is_float = true;
                        self.bump();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        let kind = if is_float { TokenKind::Float } else { TokenKind::Integer };
        self.slice_token(kind, start, line, column)
    }

    fn lex_string(&mut self, start: usize, line: u32, column: u32) -> Token {
        let (_, quote) = self.bump().expect("caller peeked");
        loop {
            match self.bump() {
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n' | 'r' | 't' | '\\' | '\'' | '"')) => {}
                    Some((_, 'u')) => {
                        for _ in 0..4 {
                            match self.bump() {
                                Some((_, c)) if c.is_ascii_hexdigit() => {}
                                _ => {
                                    return self.error_token(
                                        "invalid \\u escape: expected 4 hex digits".into(),
                                        start,
                                        line,
                                        column,
                                    )
                                }
                            }
                        }
                    }
                    Some((_, c)) => {
                        return self.error_token(format!("unknown escape '\\{c}'"), start, line, column)
                    }
                    None => {
                        return self.error_token("unterminated string literal".into(), start, line, column)
                    }
                },
                Some((_, c)) if c == quote => {
                    return self.slice_token(TokenKind::StringLiteral, start, line, column);
                }
                Some(_) => {}
                None => {
                    return self.error_token("unterminated string literal".into(), start, line, column)
                }
            }
        }
    }
}

/// Tokenize an entire query. Error tokens are carried in-stream.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof || token.kind == TokenKind::Error;
        tokens.push(token);
        if done {
            break;
        }
    }
    tokens
}

/// Decode a string literal token's source slice (including quotes).
pub fn unescape_string(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            Some(c) => out.push(c),
            None => {}
        }
    }
    out
}

fn keyword_or_ident(s: &str) -> TokenKind {
    match s.to_uppercase().as_str() {
        "MATCH" => TokenKind::Match,
        "OPTIONAL" => TokenKind::Optional,
        "WHERE" => TokenKind::Where,
        "RETURN" => TokenKind::Return,
        "CREATE" => TokenKind::Create,
        "MERGE" => TokenKind::Merge,
        "SET" => TokenKind::Set,
        "DELETE" => TokenKind::Delete,
        "DETACH" => TokenKind::Detach,
        "REMOVE" => TokenKind::Remove,
        "WITH" => TokenKind::With,
        "UNION" => TokenKind::Union,
        "ALL" => TokenKind::All,
        "AS" => TokenKind::As,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "ASC" | "ASCENDING" => TokenKind::Asc,
        "DESC" | "DESCENDING" => TokenKind::Desc,
        "LIMIT" => TokenKind::Limit,
        "SKIP" => TokenKind::Skip,
        "DISTINCT" => TokenKind::Distinct,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "XOR" => TokenKind::Xor,
        "NOT" => TokenKind::Not,
        "IN" => TokenKind::In,
        "STARTS" => TokenKind::Starts,
        "ENDS" => TokenKind::Ends,
        "CONTAINS" => TokenKind::Contains,
        "IS" => TokenKind::Is,
        "NULL" => TokenKind::Null,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "CASE" => TokenKind::Case,
        "WHEN" => TokenKind::When,
        "THEN" => TokenKind::Then,
        "ELSE" => TokenKind::Else,
        "END" => TokenKind::End,
        "UNWIND" => TokenKind::Unwind,
        "ON" => TokenKind::On,
        "EXPLAIN" => TokenKind::Explain,
        _ => TokenKind::Identifier,
    }
}
