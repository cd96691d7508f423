//! Identifier-aware tokenizer for stored schema SQL.
//!
//! The rebuild engine only ever reads back statements it generated itself
//! (`CREATE TABLE`, `CREATE INDEX`, `CREATE TRIGGER`), so the lexer knows
//! just enough SQL to tell identifiers apart from keywords inside string
//! literals and comments. Every token carries its byte span so rewrites can
//! splice replacements into the original text without reformatting it.

use std::borrow::Cow;

/// Byte range of a token in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier.
    Word,
    /// Quoted identifier; carries the opening quote character.
    QuotedIdent(char),
    /// Single-quoted string literal.
    String,
    /// Numeric literal.
    Number,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// Any other punctuation or operator character.
    Symbol,
}

/// A token borrowed from its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token kind.
    pub kind: TokenKind,
    /// Raw text, including quotes.
    pub text: &'a str,
    /// Location in the source.
    pub span: Span,
}

impl<'a> Token<'a> {
    /// Returns the identifier this token names, unquoted, if it is one.
    #[must_use]
    pub fn identifier(&self) -> Option<Cow<'a, str>> {
        match self.kind {
            TokenKind::Word => Some(Cow::Borrowed(self.text)),
            TokenKind::QuotedIdent(open) => {
                let close = closing_quote(open);
                let inner = self
                    .text
                    .strip_prefix(open)
                    .map(|s| s.strip_suffix(close).unwrap_or(s))
                    .unwrap_or(self.text);
                if open == '[' {
                    Some(Cow::Borrowed(inner))
                } else {
                    let doubled = format!("{close}{close}");
                    if inner.contains(&doubled) {
                        Some(Cow::Owned(inner.replace(&doubled, &close.to_string())))
                    } else {
                        Some(Cow::Borrowed(inner))
                    }
                }
            }
            _ => None,
        }
    }

    /// Returns true if this token is an identifier equal to `name`
    /// (ASCII case-insensitive, as SQLite compares identifiers).
    #[must_use]
    pub fn is_identifier(&self, name: &str) -> bool {
        self.identifier()
            .is_some_and(|ident| ident.eq_ignore_ascii_case(name))
    }

    /// Returns true if this token is the bare keyword `keyword`.
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

const fn closing_quote(open: char) -> char {
    match open {
        '[' => ']',
        other => other,
    }
}

/// A lexer over schema SQL text.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token {
            kind,
            text: &self.input[self.start..self.pos],
            span: Span::new(self.start, self.pos),
        }
    }

    /// Consumes a quoted run; a doubled closing quote is an escape.
    /// Unterminated quotes run to the end of input.
    fn scan_quoted(&mut self, close: char, escapable: bool) {
        loop {
            match self.advance() {
                Some(c) if c == close => {
                    if escapable && self.peek() == Some(close) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    /// Scans the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace_and_comments();
        self.start = self.pos;

        let c = self.advance()?;
        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' if !self.peek().is_some_and(|n| n.is_ascii_digit()) => TokenKind::Dot,
            '\'' => {
                self.scan_quoted('\'', true);
                TokenKind::String
            }
            '"' | '`' => {
                self.scan_quoted(c, true);
                TokenKind::QuotedIdent(c)
            }
            '[' => {
                self.scan_quoted(']', false);
                TokenKind::QuotedIdent('[')
            }
            c if c.is_ascii_digit() || c == '.' => {
                while self
                    .peek()
                    .is_some_and(|n| n.is_ascii_alphanumeric() || n == '.')
                {
                    self.advance();
                }
                TokenKind::Number
            }
            c if c.is_alphanumeric() || c == '_' => {
                while self
                    .peek()
                    .is_some_and(|n| n.is_alphanumeric() || n == '_' || n == '$')
                {
                    self.advance();
                }
                TokenKind::Word
            }
            _ => TokenKind::Symbol,
        };
        Some(self.make_token(kind))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokenizes `input` completely.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// How many occurrences a rewrite touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrences {
    /// Only the first occurrence.
    First,
    /// Every occurrence.
    All,
}

/// Returns true if `sql` mentions `name` as a whole identifier.
#[must_use]
pub fn mentions_identifier(sql: &str, name: &str) -> bool {
    Lexer::new(sql).any(|token| token.is_identifier(name))
}

/// Replaces whole-identifier occurrences of `from` with `to`.
///
/// Quoted identifiers keep their quoting style; string literals, comments
/// and identifiers that merely contain `from` are left untouched.
#[must_use]
pub fn replace_identifier(sql: &str, from: &str, to: &str, occurrences: Occurrences) -> String {
    let mut out = String::with_capacity(sql.len() + to.len());
    let mut last = 0;
    for token in Lexer::new(sql) {
        if !token.is_identifier(from) {
            continue;
        }
        out.push_str(&sql[last..token.span.start]);
        out.push_str(&respell(&token, to));
        last = token.span.end;
        if occurrences == Occurrences::First {
            break;
        }
    }
    out.push_str(&sql[last..]);
    out
}

/// Replaces mentions of column `from` with `to` in SQL that belongs to
/// another table.
///
/// Unqualified mentions and mentions qualified by `table` are rewritten;
/// mentions qualified by anything else (`NEW.`, `OLD.`, other tables) are
/// left untouched.
#[must_use]
pub fn replace_column(sql: &str, table: &str, from: &str, to: &str) -> String {
    let tokens = tokenize(sql);
    let mut out = String::with_capacity(sql.len() + to.len());
    let mut last = 0;
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_identifier(from) {
            continue;
        }
        let qualifier = i
            .checked_sub(2)
            .filter(|_| tokens[i - 1].kind == TokenKind::Dot)
            .map(|q| &tokens[q]);
        if qualifier.is_some_and(|q| !q.is_identifier(table)) {
            continue;
        }
        out.push_str(&sql[last..token.span.start]);
        out.push_str(&respell(token, to));
        last = token.span.end;
    }
    out.push_str(&sql[last..]);
    out
}

fn respell(token: &Token<'_>, to: &str) -> String {
    match token.kind {
        TokenKind::QuotedIdent(open) => quote_with(open, to),
        _ => to.to_string(),
    }
}

/// Quotes `name` using the given opening quote character.
#[must_use]
pub fn quote_with(open: char, name: &str) -> String {
    let close = closing_quote(open);
    if open == '[' {
        format!("[{name}]")
    } else {
        format!("{open}{}{close}", name.replace(close, &format!("{close}{close}")))
    }
}

/// Returns the unquoted identifier at the start of `fragment`, if any.
#[must_use]
pub fn leading_identifier(fragment: &str) -> Option<String> {
    Lexer::new(fragment)
        .next()
        .and_then(|token| token.identifier().map(Cow::into_owned))
}
