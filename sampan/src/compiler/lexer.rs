use std::borrow::Cow;

use crate::compiler::cursor::Cursor;
use crate::compiler::tokens::{Pos, Span, Token};
use crate::error::{Error, ErrorKind};
use crate::utils::unescape;

/// A piece of template source as produced by the [`Scanner`].
///
/// Comments never show up as chunks, they are dropped while scanning.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk<'s> {
    /// Literal text, passed through verbatim.
    Text(&'s str),
    /// The trimmed contents of a `{{ ... }}` tag and where they start.
    Expr { source: &'s str, pos: Pos },
    /// A `{% ... %}` tag split into its operator and trimmed suffix.
    Stmt {
        operator: &'s str,
        suffix: &'s str,
        suffix_pos: Pos,
    },
}

/// Splits template source into text and directive chunks.
pub struct Scanner<'s> {
    name: &'s str,
    cursor: Cursor<'s>,
    failed: bool,
}

fn syntax_error(name: &str, msg: &'static str, pos: Pos) -> Error {
    let mut err = Error::new(ErrorKind::SyntaxError, msg);
    err.set_location(name, pos.line as usize, pos.col as usize);
    err
}

/// Finds the start of the next directive in `s`.
///
/// Returns the offset of the two character start marker.  If more than two
/// curly braces follow each other, the innermost pair is used.
fn find_start_marker(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut offset = 0;
    loop {
        let idx = offset + some!(memchr(&bytes[offset..], b'{'));
        match bytes.get(idx + 1) {
            Some(b'{') if bytes.get(idx + 2) == Some(&b'{') => offset = idx + 1,
            Some(b'{' | b'%' | b'#') => return Some(idx),
            Some(_) => offset = idx + 1,
            None => return None,
        }
    }
}

fn memchr(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&x| x == needle)
}

impl<'s> Scanner<'s> {
    /// Creates a scanner for the template `name`.
    pub fn new(name: &'s str, source: &'s str) -> Scanner<'s> {
        Scanner {
            name,
            cursor: Cursor::new(source),
            failed: false,
        }
    }

    /// The name of the template being scanned.
    pub fn name(&self) -> &'s str {
        self.name
    }

    /// The current position of the scanner.
    pub fn pos(&self) -> Pos {
        self.cursor.pos()
    }

    fn error(&self, msg: &'static str) -> Error {
        syntax_error(self.name, msg, self.cursor.pos())
    }

    /// Consumes the tag body up to `end_marker` and returns the trimmed
    /// contents together with the position the contents start at.
    fn eat_tag_body(&mut self, end_marker: &str, msg: &'static str) -> Result<(&'s str, Pos), Error> {
        let end = match self.cursor.find(end_marker) {
            Some(end) => end,
            None => return Err(self.error(msg)),
        };
        let raw = &self.cursor.rest()[..end];
        let trimmed = raw.trim_start();
        self.cursor.consume(raw.len() - trimmed.len());
        let pos = self.cursor.pos();
        self.cursor.consume(trimmed.len());
        self.cursor.consume(end_marker.len());
        Ok((trimmed.trim_end(), pos))
    }

    fn scan(&mut self) -> Result<Option<(Chunk<'s>, Span)>, Error> {
        loop {
            if self.cursor.is_eof() {
                return Ok(None);
            }
            let start = self.cursor.pos();

            match find_start_marker(self.cursor.rest()) {
                None => {
                    let text = self.cursor.consume_rest();
                    return Ok(Some((Chunk::Text(text), self.cursor.span_from(start))));
                }
                Some(0) => {}
                Some(idx) => {
                    let text = self.cursor.consume(idx);
                    return Ok(Some((Chunk::Text(text), self.cursor.span_from(start))));
                }
            }

            let marker = self.cursor.consume(2);

            // `{{!`, `{%!` and `{#!` emit the start marker as text
            if self.cursor.match_literal("!") {
                return Ok(Some((Chunk::Text(marker), self.cursor.span_from(start))));
            }

            match marker {
                "{#" => {
                    ok!(self.eat_tag_body("#}", "missing end of comment tag"));
                    continue;
                }
                "{{" => {
                    let (source, pos) = ok!(self.eat_tag_body("}}", "missing end of expression tag"));
                    if source.is_empty() {
                        return Err(syntax_error(self.name, "empty expression", start));
                    }
                    return Ok(Some((Chunk::Expr { source, pos }, self.cursor.span_from(start))));
                }
                _ => {
                    let (contents, pos) = ok!(self.eat_tag_body("%}", "missing end of block tag"));
                    if contents.is_empty() {
                        return Err(syntax_error(self.name, "empty block tag", start));
                    }
                    let op_len = contents
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(contents.len());
                    let mut inner = Cursor::at(contents, pos);
                    let operator = inner.consume(op_len);
                    inner.skip_whitespace();
                    let suffix_pos = inner.pos();
                    let suffix = inner.consume_rest();
                    return Ok(Some((
                        Chunk::Stmt {
                            operator,
                            suffix,
                            suffix_pos,
                        },
                        self.cursor.span_from(start),
                    )));
                }
            }
        }
    }
}

impl<'s> Iterator for Scanner<'s> {
    type Item = Result<(Chunk<'s>, Span), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.scan() {
            Ok(rv) => rv.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(not(feature = "unicode"))]
fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' || c.is_ascii_alphabetic() {
                true
            } else {
                c.is_ascii_digit() && idx > 0
            }
        })
        .count()
}

#[cfg(feature = "unicode")]
fn lex_identifier(s: &str) -> usize {
    s.chars()
        .enumerate()
        .map_while(|(idx, c)| {
            let cont = if c == '_' {
                true
            } else if idx == 0 {
                unicode_ident::is_xid_start(c)
            } else {
                unicode_ident::is_xid_continue(c)
            };
            cont.then(|| c.len_utf8())
        })
        .sum::<usize>()
}

/// Tokenizes the source of a single expression.
pub struct ExprTokenizer<'s> {
    name: &'s str,
    cursor: Cursor<'s>,
}

impl<'s> ExprTokenizer<'s> {
    /// Creates a tokenizer for expression `source` found at `pos` within
    /// the template `name`.
    pub fn new(name: &'s str, source: &'s str, pos: Pos) -> ExprTokenizer<'s> {
        ExprTokenizer {
            name,
            cursor: Cursor::at(source, pos),
        }
    }

    /// The current position.
    pub fn pos(&self) -> Pos {
        self.cursor.pos()
    }

    /// The name of the template the expression belongs to.
    pub fn name(&self) -> &'s str {
        self.name
    }

    fn syntax_error(&self, msg: &'static str) -> Error {
        syntax_error(self.name, msg, self.cursor.pos())
    }

    /// Produces the next token or `None` at the end of the expression.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        self.cursor.skip_whitespace();
        let start = self.cursor.pos();
        let c = match self.cursor.peek(0) {
            Some(c) => c,
            None => return Ok(None),
        };

        let (token, len) = match (c, self.cursor.peek(1)) {
            (b'/', Some(b'/')) => (Token::FloorDiv, 2),
            (b'=', Some(b'=')) => (Token::Eq, 2),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'>', Some(b'=')) => (Token::Gte, 2),
            (b'<', Some(b'=')) => (Token::Lte, 2),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Mul, 1),
            (b'/', _) => (Token::Div, 1),
            (b'%', _) => (Token::Mod, 1),
            (b'.', _) => (Token::Dot, 1),
            (b',', _) => (Token::Comma, 1),
            (b':', _) => (Token::Colon, 1),
            (b'=', _) => (Token::Assign, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'[', _) => (Token::BracketOpen, 1),
            (b']', _) => (Token::BracketClose, 1),
            (b'(', _) => (Token::ParenOpen, 1),
            (b')', _) => (Token::ParenClose, 1),
            (b'{', _) => (Token::BraceOpen, 1),
            (b'}', _) => (Token::BraceClose, 1),
            (b'"' | b'\'', _) => return self.eat_string(c).map(Some),
            (b'0'..=b'9', _) => return self.eat_number().map(Some),
            _ => {
                let len = lex_identifier(self.cursor.rest());
                if len == 0 {
                    return Err(self.syntax_error("unexpected character"));
                }
                let ident = self.cursor.consume(len);
                return Ok(Some((Token::Ident(ident), self.cursor.span_from(start))));
            }
        };
        self.cursor.consume(len);
        Ok(Some((token, self.cursor.span_from(start))))
    }

    fn eat_number(&mut self) -> Result<(Token<'s>, Span), Error> {
        #[derive(Copy, Clone)]
        enum State {
            Integer,
            Fraction,
            Exponent,
            ExponentSign,
        }

        let start = self.cursor.pos();
        let rest = self.cursor.rest().as_bytes();
        let mut state = State::Integer;
        let mut num_len = 0;
        let mut has_underscore = false;
        for (idx, c) in rest.iter().copied().enumerate() {
            state = match (c, state) {
                (b'.', State::Integer)
                    if rest.get(idx + 1).map_or(false, |c| c.is_ascii_digit()) =>
                {
                    State::Fraction
                }
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', state) => state,
                (b'_', _) => {
                    has_underscore = true;
                    state
                }
                _ => break,
            };
            num_len += 1;
        }

        let mut num = Cow::Borrowed(self.cursor.consume(num_len));
        if has_underscore {
            if num.ends_with('_') {
                return Err(self.syntax_error("'_' may not occur at end of number"));
            }
            num = Cow::Owned(num.replace('_', ""));
        }

        let token = match state {
            State::Integer => ok!(num
                .parse()
                .map(Token::Int)
                .map_err(|_| self.syntax_error("invalid integer"))),
            _ => ok!(num
                .parse()
                .map(Token::Float)
                .map_err(|_| self.syntax_error("invalid float"))),
        };
        Ok((token, self.cursor.span_from(start)))
    }

    fn eat_string(&mut self, delim: u8) -> Result<(Token<'s>, Span), Error> {
        let start = self.cursor.pos();
        let rest = self.cursor.rest().as_bytes();
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = rest
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || rest.get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        self.cursor.consume(1);
        let s = self.cursor.consume(str_len);
        self.cursor.consume(1);
        let value = if has_escapes {
            match unescape(s) {
                Ok(value) => value,
                Err(mut err) => {
                    err.set_location(self.name, start.line as usize, start.col as usize);
                    return Err(err);
                }
            }
        } else {
            s.to_string()
        };
        Ok((Token::Str(value), self.cursor.span_from(start)))
    }
}

impl<'s> Iterator for ExprTokenizer<'s> {
    type Item = Result<(Token<'s>, Span), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Scans a template into chunks.
#[cfg(any(test, feature = "unstable_machinery"))]
pub fn scan<'s>(name: &'s str, source: &'s str) -> Scanner<'s> {
    Scanner::new(name, source)
}

/// Tokenizes a single expression.
#[cfg(any(test, feature = "unstable_machinery"))]
pub fn tokenize_expr<'s>(name: &'s str, source: &'s str, pos: Pos) -> ExprTokenizer<'s> {
    ExprTokenizer::new(name, source, pos)
}
