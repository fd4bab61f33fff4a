use crate::compiler::tokens::{Pos, Span};

/// A forward-only view over template source.
///
/// All offsets are byte offsets relative to the current position.  Lines
/// and columns are one-based and advance as text is consumed.
pub struct Cursor<'s> {
    source: &'s str,
    offset: usize,
    line: u32,
    col: u32,
}

impl<'s> Cursor<'s> {
    /// Creates a cursor at the start of `source`.
    pub fn new(source: &'s str) -> Cursor<'s> {
        Cursor::at(source, Pos::default())
    }

    /// Creates a cursor for a fragment that starts at `pos` of some
    /// larger document.
    pub fn at(source: &'s str, pos: Pos) -> Cursor<'s> {
        Cursor {
            source,
            offset: 0,
            line: pos.line,
            col: pos.col,
        }
    }

    /// The unconsumed rest of the source.
    #[inline]
    pub fn rest(&self) -> &'s str {
        &self.source[self.offset..]
    }

    /// Number of bytes left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.source.len() - self.offset
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    /// Looks at the byte `offset` bytes ahead without consuming.
    #[inline]
    pub fn peek(&self, offset: usize) -> Option<u8> {
        self.rest().as_bytes().get(offset).copied()
    }

    /// Looks at the next character.
    #[cfg(test)]
    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Finds `needle` in the rest and returns its relative offset.
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.rest().find(needle)
    }

    #[inline]
    pub fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    /// Creates a span from `start` to the current position.
    #[inline]
    pub fn span_from(&self, start: Pos) -> Span {
        Span {
            start_line: start.line,
            start_col: start.col,
            end_line: self.line,
            end_col: self.col,
        }
    }

    /// Consumes `n` bytes (clamped to the rest) and returns them.
    pub fn consume(&mut self, n: usize) -> &'s str {
        let rest = self.rest();
        let mut n = n.min(rest.len());
        while !rest.is_char_boundary(n) {
            n += 1;
        }
        let skipped = &rest[..n];
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.col = 1;
                }
                _ => self.col += 1,
            }
        }
        self.offset += n;
        skipped
    }

    /// Consumes everything that is left.
    pub fn consume_rest(&mut self) -> &'s str {
        self.consume(self.remaining())
    }

    /// Consumes `lit` if the rest starts with it.
    pub fn match_literal(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.consume(lit.len());
            true
        } else {
            false
        }
    }

    /// Consumes the longest prefix of characters matching `pred` and
    /// returns it.  Returns `None` (consuming nothing) if not even the
    /// first character matches.
    pub fn match_pattern<F: FnMut(usize, char) -> bool>(&mut self, mut pred: F) -> Option<&'s str> {
        let len = self
            .rest()
            .char_indices()
            .enumerate()
            .take_while(|&(idx, (_, c))| pred(idx, c))
            .map(|(_, (_, c))| c.len_utf8())
            .sum::<usize>();
        if len == 0 {
            None
        } else {
            Some(self.consume(len))
        }
    }

    /// Skips over whitespace.
    pub fn skip_whitespace(&mut self) {
        self.match_pattern(|_, c| c.is_whitespace());
    }
}
