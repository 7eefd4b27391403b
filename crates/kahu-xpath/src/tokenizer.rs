//! Query tokenizer.
//!
//! Produces a flat token stream with source spans. Token text borrows from
//! the input unless escape processing altered it. The `*` character is
//! classified as either a wildcard or a multiplication operator from the
//! surrounding token context, and the value comparators (`eq`, `ne`, `lt`,
//! `le`, `gt`, `ge`) are promoted from identifiers only when they follow an
//! operand.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Path operators
    Slash,
    DoubleSlash,
    Dot,
    DoubleDot,

    // Literals and names
    Identifier,
    String,
    Number,
    Wildcard,

    // Delimiters
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    At,
    Comma,
    Pipe,
    Semicolon,

    // Comparison operators
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,

    // Boolean operators
    And,
    Or,
    Not,

    // Arithmetic operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,

    // Structure
    AxisSeparator,
    Colon,
    Dollar,
    Assign,

    End,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub offset: usize,
    pub len: usize,
    text: Cow<'a, str>,
}

impl<'a> Token<'a> {
    fn borrowed(kind: TokenKind, offset: usize, text: &'a str) -> Self {
        Self { kind, offset, len: text.len(), text: Cow::Borrowed(text) }
    }

    fn owned(kind: TokenKind, offset: usize, len: usize, text: String) -> Self {
        Self { kind, offset, len, text: Cow::Owned(text) }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

pub struct TokenStream<'a> {
    pub tokens: Vec<Token<'a>>,
    /// Offsets of string tokens that were never closed. Reported by the
    /// parser only when such a token is actually consumed; raw-scanned
    /// constructor content legitimately covers these spans.
    pub unterminated: Vec<usize>,
}

/// Tokenize `input`, reporting spans relative to `base + local offset`.
#[must_use]
pub fn tokenize(input: &str, base: usize) -> TokenStream<'_> {
    Tokenizer::new(input, base).run()
}

struct Tokenizer<'a> {
    input: &'a str,
    base: usize,
    pos: usize,
    bracket_depth: i32,
    paren_depth: i32,
    tokens: Vec<Token<'a>>,
    unterminated: Vec<usize>,
}

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str, base: usize) -> Self {
        Self {
            input,
            base,
            pos: 0,
            bracket_depth: 0,
            paren_depth: 0,
            tokens: Vec::new(),
            unterminated: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> u8 {
        *self.input.as_bytes().get(self.pos + offset).unwrap_or(&0)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(0), b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::borrowed(kind, self.base + start, &self.input[start..end]));
    }

    /// True when the last pushed token can terminate an operand.
    fn prev_is_operand(&self) -> bool {
        match self.tokens.last() {
            Some(token) => match token.kind {
                TokenKind::Number
                | TokenKind::String
                | TokenKind::Identifier
                | TokenKind::RParen
                | TokenKind::RBracket => true,
                // A prior wildcard only reads as an operand inside a
                // structural context such as a predicate or argument list.
                TokenKind::Wildcard => self.bracket_depth > 0 || self.paren_depth > 0,
                _ => false,
            },
            None => false,
        }
    }

    /// True when the previous token always forces `*` to be a wildcard.
    fn prev_forces_wildcard(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| t.kind),
            Some(
                TokenKind::At
                    | TokenKind::AxisSeparator
                    | TokenKind::Slash
                    | TokenKind::DoubleSlash
                    | TokenKind::Colon
            )
        )
    }

    /// True when the next non-whitespace byte can start an operand.
    fn next_starts_operand(&self) -> bool {
        let mut idx = self.pos;
        let bytes = self.input.as_bytes();
        while idx < bytes.len() && matches!(bytes[idx], b' ' | b'\t' | b'\r' | b'\n') {
            idx += 1;
        }
        let Some(&byte) = bytes.get(idx) else { return false };
        byte.is_ascii_digit()
            || is_name_start(byte)
            || matches!(byte, b'$' | b'@' | b'(' | b'\'' | b'"' | b'+' | b'-')
            || (byte == b'.' && bytes.get(idx + 1).is_some_and(u8::is_ascii_digit))
    }

    fn scan_string(&mut self, quote: u8) {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;
        let mut processed: Option<String> = None;
        loop {
            let byte = self.peek(0);
            if byte == 0 {
                // Unterminated; surface the span and let the parser decide.
                let text = &self.input[content_start..self.pos];
                let token = match processed {
                    Some(owned) => {
                        Token::owned(TokenKind::String, self.base + start, self.pos - start, owned)
                    }
                    None => Token {
                        kind: TokenKind::String,
                        offset: self.base + start,
                        len: self.pos - start,
                        text: Cow::Borrowed(text),
                    },
                };
                self.unterminated.push(self.base + start);
                self.tokens.push(token);
                return;
            }
            if byte == quote {
                break;
            }
            if byte == b'\\' {
                let next = self.peek(1);
                let owned = processed
                    .get_or_insert_with(|| self.input[content_start..self.pos].to_string());
                match next {
                    b'\\' | b'*' => {
                        owned.push(next as char);
                        self.pos += 2;
                    }
                    _ if next == quote => {
                        owned.push(quote as char);
                        self.pos += 2;
                    }
                    0 => {
                        owned.push('\\');
                        self.pos += 1;
                    }
                    _ => {
                        // Unknown escapes are retained verbatim.
                        owned.push('\\');
                        self.pos += 1;
                    }
                }
                continue;
            }
            self.pos += 1;
            if let Some(owned) = processed.as_mut() {
                // Keep multi-byte sequences intact by copying raw bytes.
                let ch_start = self.pos - 1;
                let mut end = self.pos;
                while end < self.input.len() && !self.input.is_char_boundary(end) {
                    end += 1;
                }
                owned.push_str(&self.input[ch_start..end]);
                self.pos = end;
            }
        }
        let content_end = self.pos;
        self.pos += 1; // closing quote
        match processed {
            Some(owned) => self.tokens.push(Token::owned(
                TokenKind::String,
                self.base + start,
                self.pos - start,
                owned,
            )),
            None => self.tokens.push(Token {
                kind: TokenKind::String,
                offset: self.base + start,
                len: self.pos - start,
                text: Cow::Borrowed(&self.input[content_start..content_end]),
            }),
        }
    }

    fn scan_number(&mut self) {
        let start = self.pos;
        while self.peek(0).is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek(0) == b'.' {
            self.pos += 1;
            while self.peek(0).is_ascii_digit() {
                self.pos += 1;
            }
        }
        self.push(TokenKind::Number, start, self.pos);
    }

    fn scan_identifier(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while is_name_char(self.peek(0)) {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        let kind = match text {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "div" => TokenKind::Divide,
            "mod" => TokenKind::Modulo,
            // Value comparators read as operators only after an operand;
            // `/lt` stays a name test.
            "eq" if self.prev_is_operand() => TokenKind::ValueEq,
            "ne" if self.prev_is_operand() => TokenKind::ValueNe,
            "lt" if self.prev_is_operand() => TokenKind::ValueLt,
            "le" if self.prev_is_operand() => TokenKind::ValueLe,
            "gt" if self.prev_is_operand() => TokenKind::ValueGt,
            "ge" if self.prev_is_operand() => TokenKind::ValueGe,
            _ => TokenKind::Identifier,
        };
        self.push(kind, start, self.pos);
    }

    fn classify_star(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let multiply =
            self.prev_is_operand() && !self.prev_forces_wildcard() && self.next_starts_operand();
        self.push(if multiply { TokenKind::Multiply } else { TokenKind::Wildcard }, start, self.pos);
    }

    fn run(mut self) -> TokenStream<'a> {
        loop {
            self.skip_whitespace();
            let byte = self.peek(0);
            if byte == 0 {
                break;
            }
            let start = self.pos;
            match byte {
                b'/' => {
                    if self.peek(1) == b'/' {
                        self.pos += 2;
                        self.push(TokenKind::DoubleSlash, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Slash, start, self.pos);
                    }
                }
                b'.' => {
                    if self.peek(1).is_ascii_digit() {
                        self.scan_number();
                    } else if self.peek(1) == b'.' {
                        self.pos += 2;
                        self.push(TokenKind::DoubleDot, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Dot, start, self.pos);
                    }
                }
                b'[' => {
                    self.pos += 1;
                    self.bracket_depth += 1;
                    self.push(TokenKind::LBracket, start, self.pos);
                }
                b']' => {
                    self.pos += 1;
                    self.bracket_depth -= 1;
                    self.push(TokenKind::RBracket, start, self.pos);
                }
                b'(' => {
                    self.pos += 1;
                    self.paren_depth += 1;
                    self.push(TokenKind::LParen, start, self.pos);
                }
                b')' => {
                    self.pos += 1;
                    self.paren_depth -= 1;
                    self.push(TokenKind::RParen, start, self.pos);
                }
                b'{' => {
                    self.pos += 1;
                    self.push(TokenKind::LBrace, start, self.pos);
                }
                b'}' => {
                    self.pos += 1;
                    self.push(TokenKind::RBrace, start, self.pos);
                }
                b'@' => {
                    self.pos += 1;
                    self.push(TokenKind::At, start, self.pos);
                }
                b',' => {
                    self.pos += 1;
                    self.push(TokenKind::Comma, start, self.pos);
                }
                b';' => {
                    self.pos += 1;
                    self.push(TokenKind::Semicolon, start, self.pos);
                }
                b'|' => {
                    self.pos += 1;
                    self.push(TokenKind::Pipe, start, self.pos);
                }
                b'$' => {
                    self.pos += 1;
                    self.push(TokenKind::Dollar, start, self.pos);
                }
                b'+' => {
                    self.pos += 1;
                    self.push(TokenKind::Plus, start, self.pos);
                }
                b'-' => {
                    self.pos += 1;
                    self.push(TokenKind::Minus, start, self.pos);
                }
                b'=' => {
                    self.pos += 1;
                    self.push(TokenKind::Equals, start, self.pos);
                }
                b'!' => {
                    if self.peek(1) == b'=' {
                        self.pos += 2;
                        self.push(TokenKind::NotEquals, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Unknown, start, self.pos);
                    }
                }
                b'<' => {
                    if self.peek(1) == b'=' {
                        self.pos += 2;
                        self.push(TokenKind::LessEqual, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::LessThan, start, self.pos);
                    }
                }
                b'>' => {
                    if self.peek(1) == b'=' {
                        self.pos += 2;
                        self.push(TokenKind::GreaterEqual, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::GreaterThan, start, self.pos);
                    }
                }
                b':' => {
                    if self.peek(1) == b':' {
                        self.pos += 2;
                        self.push(TokenKind::AxisSeparator, start, self.pos);
                    } else if self.peek(1) == b'=' {
                        self.pos += 2;
                        self.push(TokenKind::Assign, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Colon, start, self.pos);
                    }
                }
                b'*' => self.classify_star(),
                b'\'' | b'"' => self.scan_string(byte),
                b if b.is_ascii_digit() => self.scan_number(),
                b if is_name_start(b) => self.scan_identifier(),
                _ => {
                    // Advance over the full UTF-8 sequence so spans stay valid.
                    let mut end = self.pos + 1;
                    while end < self.input.len() && !self.input.is_char_boundary(end) {
                        end += 1;
                    }
                    self.pos = end;
                    self.push(TokenKind::Unknown, start, self.pos);
                }
            }
        }
        self.tokens.push(Token::borrowed(TokenKind::End, self.base + self.pos, ""));
        TokenStream { tokens: self.tokens, unterminated: self.unterminated }
    }
}
