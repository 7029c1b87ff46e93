//! Byte cursor for the document loader
//!
//! Delimiter searches go through memchr, which uses SSE2/AVX2 on x86_64
//! and NEON on aarch64. Positions are byte offsets into the input.

use std::ops::Range;

use memchr::{memchr, memmem};

pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    #[inline]
    fn rest(&self) -> &'a [u8] {
        self.input.get(self.pos..).unwrap_or_default()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.set_position(self.pos + n);
    }

    /// Consume `prefix` if the input continues with it.
    #[inline]
    pub fn eat(&mut self, prefix: &[u8]) -> bool {
        let matched = self.rest().starts_with(prefix);
        if matched {
            self.pos += prefix.len();
        }
        matched
    }

    /// Skip XML whitespace (space, tab, CR, LF).
    #[inline]
    pub fn skip_whitespace(&mut self) {
        let skipped = self
            .rest()
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .count();
        self.pos += skipped;
    }

    /// Absolute offset of the next `byte`.
    #[inline]
    pub fn find(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.rest()).map(|i| self.pos + i)
    }

    /// Absolute offset of the next `needle`, e.g. `-->`.
    #[inline]
    pub fn find_sequence(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(self.rest(), needle).map(|i| self.pos + i)
    }

    /// Consume an XML name and return its byte range.
    ///
    /// Non-ASCII bytes are accepted as name characters; the loader checks
    /// character boundaries when slicing the input.
    pub fn take_name(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        if !self.peek().is_some_and(is_name_start) {
            return None;
        }
        let len = 1 + self.rest()[1..].iter().take_while(|&&b| is_name_byte(b)).count();
        self.pos += len;
        Some(start..self.pos)
    }
}

#[inline]
fn is_name_start(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

#[inline]
fn is_name_byte(b: u8) -> bool {
    is_name_start(b) || matches!(b, b'0'..=b'9' | b'-' | b'.')
}
