//! Unified Scanner with ScanHandler Trait
//!
//! Tokenizes XML text and dispatches events to a [`ScanHandler`]. The
//! document loader implements the trait to turn markup into node records.
//!
//! The scanner uses the memchr-based [`Scanner`] for byte searching. Text
//! and attribute values arrive with character references decoded. The XML
//! declaration and DOCTYPE are consumed without events. Malformed markup
//! stops the scan with [`Error::Load`].

use std::borrow::Cow;

use super::entities::decode_text;
use super::scanner::Scanner;
use crate::error::{Error, Result};

/// Receives scan events in document order.
pub trait ScanHandler {
    /// Called when an element starts
    ///
    /// # Arguments
    /// * `name` - Qualified element name
    /// * `attrs` - (qualified name, decoded value) pairs in source order
    /// * `is_empty` - True for a self-closing element (e.g., `<br/>`)
    fn start_element(&mut self, name: &str, attrs: &[(&str, Cow<'_, str>)], is_empty: bool)
        -> Result<()>;

    /// Called when an element ends; not called for self-closing elements
    fn end_element(&mut self, name: &str) -> Result<()>;

    /// Called for text content, references decoded
    fn text(&mut self, text: Cow<'_, str>) -> Result<()>;

    /// Called for CDATA sections (content between `<![CDATA[` and `]]>`)
    fn cdata(&mut self, text: &str) -> Result<()>;

    /// Called for comments (content between `<!--` and `-->`)
    fn comment(&mut self, text: &str) -> Result<()>;

    /// Called for processing instructions other than the XML declaration
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;
}

/// Unified scanner that uses ScanHandler for event dispatch
pub struct UnifiedScanner<'a> {
    input: &'a str,
    scanner: Scanner<'a>,
}

impl<'a> UnifiedScanner<'a> {
    /// Create a new unified scanner for the input
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            scanner: Scanner::new(input.as_bytes()),
        }
    }

    /// Scan the entire document, calling handler methods for each token
    pub fn scan<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        // byte order mark
        self.scanner.eat("\u{FEFF}".as_bytes());
        while !self.scanner.is_eof() {
            let start = self.scanner.position();
            let result = match self.scanner.peek() {
                Some(b'<') => self.scan_markup(handler),
                Some(_) => self.scan_text(handler),
                None => break,
            };
            result.map_err(|err| err.positioned(start))?;
        }
        Ok(())
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.scanner.position()
    }

    fn slice(&self, start: usize, end: usize) -> Result<&'a str> {
        self.input
            .get(start..end)
            .ok_or_else(|| Error::load("invalid character boundary", start))
    }

    fn error(&self, message: &str) -> Error {
        Error::load(message, self.scanner.position())
    }

    /// Scan markup starting with '<'
    fn scan_markup<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        let start = self.scanner.position();
        match self.scanner.peek_at(1) {
            Some(b'/') => {
                self.scanner.advance(2);
                self.scan_end_tag(handler)
            }
            Some(b'!') => {
                if self.scanner.eat(b"<!--") {
                    let text = self.read_until(b"-->", "unterminated comment")?;
                    handler.comment(text)
                } else if self.scanner.eat(b"<![CDATA[") {
                    let text = self.read_until(b"]]>", "unterminated CDATA section")?;
                    handler.cdata(text)
                } else if self.scanner.eat(b"<!DOCTYPE") {
                    self.skip_doctype()
                } else {
                    Err(Error::load("unknown markup declaration", start))
                }
            }
            Some(b'?') => {
                self.scanner.advance(2);
                self.scan_pi(handler)
            }
            _ => self.scan_start_tag(handler),
        }
    }

    /// Content up to `delimiter`, leaving the scanner after it
    fn read_until(&mut self, delimiter: &[u8], message: &str) -> Result<&'a str> {
        let start = self.scanner.position();
        let end = self
            .scanner
            .find_sequence(delimiter)
            .ok_or_else(|| Error::load(message, start))?;
        self.scanner.set_position(end + delimiter.len());
        self.slice(start, end)
    }

    fn read_name(&mut self) -> Result<&'a str> {
        let range = self
            .scanner
            .take_name()
            .ok_or_else(|| self.error("expected a name"))?;
        self.slice(range.start, range.end)
    }

    /// Scan a start tag
    fn scan_start_tag<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        self.scanner.advance(1); // Skip '<'
        let name = self.read_name()?;

        let mut attrs: Vec<(&str, Cow<'_, str>)> = Vec::new();
        loop {
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                Some(b'>') => {
                    self.scanner.advance(1);
                    return handler.start_element(name, &attrs, false);
                }
                Some(b'/') if self.scanner.peek_at(1) == Some(b'>') => {
                    self.scanner.advance(2);
                    return handler.start_element(name, &attrs, true);
                }
                Some(_) => {
                    let attr = self.scan_attribute()?;
                    if attrs.iter().any(|(existing, _)| *existing == attr.0) {
                        return Err(self.error("duplicate attribute"));
                    }
                    attrs.push(attr);
                }
                None => return Err(self.error("unterminated start tag")),
            }
        }
    }

    /// Scan an attribute, returning (name, decoded value)
    fn scan_attribute(&mut self) -> Result<(&'a str, Cow<'a, str>)> {
        let name = self.read_name()?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'=') {
            return Err(self.error("expected '=' after attribute name"));
        }
        self.scanner.advance(1);
        self.scanner.skip_whitespace();

        let quote = match self.scanner.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error("expected quoted attribute value")),
        };
        self.scanner.advance(1);
        let start = self.scanner.position();
        let end = self
            .scanner
            .find(quote)
            .ok_or_else(|| self.error("unterminated attribute value"))?;
        self.scanner.set_position(end + 1);
        let raw = self.slice(start, end)?;
        if raw.contains('<') {
            return Err(Error::load("'<' in attribute value", start));
        }
        Ok((name, decode_text(raw)))
    }

    /// Scan an end tag
    fn scan_end_tag<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        let name = self.read_name()?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(self.error("expected '>' to close end tag"));
        }
        self.scanner.advance(1);
        handler.end_element(name)
    }

    /// Scan text content up to the next '<'
    fn scan_text<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        let start = self.scanner.position();
        let end = self.scanner.find(b'<').unwrap_or(self.input.len());
        self.scanner.set_position(end);
        let raw = self.slice(start, end)?;
        handler.text(decode_text(raw))
    }

    /// Scan a processing instruction; the XML declaration is skipped
    fn scan_pi<H: ScanHandler>(&mut self, handler: &mut H) -> Result<()> {
        let target = self.read_name()?;
        self.scanner.skip_whitespace();
        let data = self.read_until(b"?>", "unterminated processing instruction")?;
        if target.eq_ignore_ascii_case("xml") {
            return Ok(());
        }
        handler.processing_instruction(target, data)
    }

    /// Skip a DOCTYPE declaration including an internal subset
    fn skip_doctype(&mut self) -> Result<()> {
        let start = self.scanner.position();
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        while let Some(b) = self.scanner.peek() {
            self.scanner.advance(1);
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(b),
                (None, b'[') => depth += 1,
                (None, b']') => depth = depth.saturating_sub(1),
                (None, b'>') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(Error::load("unterminated DOCTYPE", start))
    }
}
