//! Document Builder
//!
//! Turns scan events into node records, minting node identifiers and
//! interning names on the way. Implements [`ScanHandler`] so the loader can
//! drive it with the XML scanner.
//!
//! Numbering: top-level nodes (prologue comments and PIs, the document
//! element, trailing comments) are `1`, `2`, `3`, ... An element's
//! attributes take the first child codes, its content the following ones:
//!
//! ```text
//! <a x="1">text<b/></a>     a = 1, @x = 1.1, text = 1.2, b = 1.3
//! ```
//!
//! Element child counts are known only when the element closes, so the
//! count field of the buffered element record is patched then.

use std::borrow::Cow;

use tracing::debug;

use crate::config::LoadOptions;
use crate::core::{ScanHandler, UnifiedScanner};
use crate::dom::qname::split_prefixed;
use crate::dom::{AttrType, MemorySymbols, NamespaceScope, NodeKind};
use crate::error::{Error, Result};
use crate::numbering::NodeId;
use crate::record::{self, ElementFields, LENGTH_SIGNATURE};

/// One encoded record in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRecord {
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// Attribute records directly following this element record
    pub attribute_count: u16,
    pub bytes: Vec<u8>,
}

/// Element still waiting for its end tag
#[derive(Debug)]
struct OpenElement {
    record: usize,
    node_id: NodeId,
    qualified: String,
    /// Attributes plus direct children so far
    children: u32,
    next_child: u32,
}

/// Builds the records of one document.
pub struct DocumentBuilder<'s> {
    symbols: &'s mut MemorySymbols,
    options: LoadOptions,
    records: Vec<BuiltRecord>,
    stack: Vec<OpenElement>,
    namespaces: NamespaceScope,
    next_top_level: u32,
    root_seen: bool,
}

impl<'s> DocumentBuilder<'s> {
    pub fn new(symbols: &'s mut MemorySymbols, options: LoadOptions) -> Self {
        DocumentBuilder {
            symbols,
            options,
            records: Vec::with_capacity(64),
            stack: Vec::with_capacity(16),
            namespaces: NamespaceScope::new(),
            next_top_level: 1,
            root_seen: false,
        }
    }

    /// Scan `xml` and return its records.
    pub fn build(mut self, xml: &str) -> Result<Vec<BuiltRecord>> {
        let mut scanner = UnifiedScanner::new(xml);
        scanner.scan(&mut self)?;
        let position = scanner.position();
        self.finish().map_err(|err| err.positioned(position))
    }

    /// Check the document is complete and hand out its records.
    pub fn finish(self) -> Result<Vec<BuiltRecord>> {
        if let Some(open) = self.stack.last() {
            return Err(Error::load_unpositioned(format!(
                "unclosed element <{}>",
                open.qualified
            )));
        }
        if !self.root_seen {
            return Err(Error::load_unpositioned("no document element"));
        }
        debug!(records = self.records.len(), "document built");
        Ok(self.records)
    }

    /// Identifier for the next node at the current position.
    fn mint(&mut self) -> NodeId {
        match self.stack.last_mut() {
            Some(parent) => {
                let id = parent.node_id.child(parent.next_child);
                parent.next_child += 1;
                parent.children += 1;
                id
            }
            None => {
                let id = NodeId::document().child(self.next_top_level);
                self.next_top_level += 1;
                id
            }
        }
    }

    fn push(&mut self, node_id: NodeId, kind: NodeKind, bytes: Vec<u8>) {
        self.records.push(BuiltRecord {
            node_id,
            kind,
            attribute_count: 0,
            bytes,
        });
    }

    fn resolve(&self, prefix: Option<&str>, is_attribute: bool) -> Result<Option<String>> {
        match prefix {
            Some(prefix) => self
                .namespaces
                .resolve(prefix)
                .map(|uri| Some(uri.to_owned()))
                .ok_or_else(|| Error::load_unpositioned(format!("unbound prefix '{prefix}'"))),
            // unprefixed attributes are in no namespace
            None if is_attribute => Ok(None),
            None => Ok(self.namespaces.resolve("").map(str::to_owned)),
        }
    }

    fn close_element(&mut self) -> Result<()> {
        let open = self
            .stack
            .pop()
            .ok_or_else(|| Error::load_unpositioned("end tag without start tag"))?;
        let count = open.children.to_be_bytes();
        let bytes = &mut self.records[open.record].bytes;
        bytes[LENGTH_SIGNATURE..LENGTH_SIGNATURE + count.len()].copy_from_slice(&count);
        self.namespaces.pop_scope();
        Ok(())
    }
}

impl ScanHandler for DocumentBuilder<'_> {
    fn start_element(
        &mut self,
        name: &str,
        attrs: &[(&str, Cow<'_, str>)],
        is_empty: bool,
    ) -> Result<()> {
        if self.stack.is_empty() && self.root_seen {
            return Err(Error::load_unpositioned("more than one document element"));
        }
        self.root_seen = true;
        self.namespaces.push_scope();

        // namespace declarations first, they apply to the element's own name
        let mut decls = Vec::new();
        let mut plain = Vec::with_capacity(attrs.len());
        for (attr_name, value) in attrs {
            let declared = match split_prefixed(attr_name) {
                (None, "xmlns") => Some(""),
                (Some("xmlns"), prefix) => Some(prefix),
                _ => None,
            };
            match declared {
                Some(prefix) => {
                    if self.namespaces.declare(prefix, value) {
                        let ns = self.symbols.intern_namespace(value)?;
                        decls.push((prefix.to_owned(), ns));
                    }
                }
                None => plain.push((*attr_name, value)),
            }
        }

        let (prefix, local) = split_prefixed(name);
        let uri = self.resolve(prefix, false)?;
        let name_symbol = self.symbols.intern_name(local)?;
        let ns_symbol = self.symbols.intern_namespace(uri.as_deref().unwrap_or(""))?;
        let attribute_count = u16::try_from(plain.len())
            .map_err(|_| Error::load_unpositioned("too many attributes"))?;

        let node_id = self.mint();
        let bytes = record::encode_element(&ElementFields {
            node_id: &node_id,
            child_count: 0,
            attribute_count,
            name: name_symbol,
            namespace: ns_symbol,
            prefix: prefix.filter(|_| ns_symbol != 0),
            namespace_decls: &decls,
            dirty: false,
        })?;
        let record = self.records.len();
        self.records.push(BuiltRecord {
            node_id: node_id.clone(),
            kind: NodeKind::Element,
            attribute_count,
            bytes,
        });
        self.stack.push(OpenElement {
            record,
            node_id,
            qualified: name.to_owned(),
            children: 0,
            next_child: 1,
        });

        for (attr_name, value) in plain {
            let (prefix, local) = split_prefixed(attr_name);
            let uri = self.resolve(prefix, true)?;
            let name_symbol = self.symbols.intern_name(local)?;
            let ns_symbol = self.symbols.intern_namespace(uri.as_deref().unwrap_or(""))?;
            let attr_type = if attr_name == "xml:id" {
                AttrType::Id
            } else {
                AttrType::Cdata
            };
            let attr_id = self.mint();
            let bytes = record::encode_attribute(
                &attr_id,
                name_symbol,
                ns_symbol,
                prefix.filter(|_| ns_symbol != 0),
                attr_type,
                value,
            )?;
            self.push(attr_id, NodeKind::Attribute, bytes);
        }

        if is_empty {
            self.close_element()?;
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<()> {
        match self.stack.last() {
            Some(open) if open.qualified == name => self.close_element(),
            Some(open) => Err(Error::load_unpositioned(format!(
                "end tag </{name}> does not match <{}>",
                open.qualified
            ))),
            None => Err(Error::load_unpositioned(format!("unexpected end tag </{name}>"))),
        }
    }

    fn text(&mut self, text: Cow<'_, str>) -> Result<()> {
        let blank = text.bytes().all(|b| b.is_ascii_whitespace());
        if self.stack.is_empty() {
            if blank {
                return Ok(());
            }
            return Err(Error::load_unpositioned("text outside the document element"));
        }
        if text.is_empty() || (blank && !self.options.preserve_whitespace) {
            return Ok(());
        }
        let node_id = self.mint();
        let bytes = record::encode_text(NodeKind::Text, &node_id, &text)?;
        self.push(node_id, NodeKind::Text, bytes);
        Ok(())
    }

    fn cdata(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            return Err(Error::load_unpositioned("CDATA outside the document element"));
        }
        let node_id = self.mint();
        let bytes = record::encode_text(NodeKind::CData, &node_id, text)?;
        self.push(node_id, NodeKind::CData, bytes);
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        let node_id = self.mint();
        let bytes = record::encode_text(NodeKind::Comment, &node_id, text)?;
        self.push(node_id, NodeKind::Comment, bytes);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        let node_id = self.mint();
        let bytes = record::encode_pi(&node_id, target, data)?;
        self.push(node_id, NodeKind::ProcessingInstruction, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SymbolTable;
    use crate::record::{decode_header, ElementRecord};

    fn build(xml: &str) -> Result<(Vec<BuiltRecord>, MemorySymbols)> {
        let mut symbols = MemorySymbols::new();
        let records = DocumentBuilder::new(&mut symbols, LoadOptions::default()).build(xml)?;
        Ok((records, symbols))
    }

    fn ids(records: &[BuiltRecord]) -> Vec<String> {
        records.iter().map(|r| r.node_id.to_string()).collect()
    }

    #[test]
    fn test_numbering_and_counts() {
        let (records, _) = build(r#"<a x="1">text<b/></a>"#).unwrap();
        assert_eq!(ids(&records), vec!["1", "1.1", "1.2", "1.3"]);
        assert_eq!(records[0].attribute_count, 1);

        let header = decode_header(&records[0].bytes).unwrap();
        assert_eq!(header.child_count, 3);
        let b = decode_header(&records[3].bytes).unwrap();
        assert_eq!(b.kind, NodeKind::Element);
        assert_eq!(b.child_count, 0);
    }

    #[test]
    fn test_top_level_nodes() {
        let (records, _) = build("<!-- 1 --><x/><!-- 2 -->").unwrap();
        assert_eq!(ids(&records), vec!["1", "2", "3"]);
        assert_eq!(records[1].kind, NodeKind::Element);
    }

    #[test]
    fn test_records_in_document_order() {
        let (records, _) = build("<s><p>01234</p><p a='v'>56789</p></s>").unwrap();
        for pair in records.windows(2) {
            assert!(pair[0].node_id < pair[1].node_id);
        }
    }

    #[test]
    fn test_whitespace_policy() {
        let xml = "<a>\n  <b/>\n</a>";
        let (records, _) = build(xml).unwrap();
        assert_eq!(records.len(), 2);

        let mut symbols = MemorySymbols::new();
        let records = DocumentBuilder::new(&mut symbols, LoadOptions::preserve_whitespace())
            .build(xml)
            .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(decode_header(&records[0].bytes).unwrap().child_count, 3);
    }

    #[test]
    fn test_namespaces() {
        let xml = r#"<r xmlns="urn:default" xmlns:p="urn:p"><p:c p:attr="1" plain="2"/></r>"#;
        let (records, symbols) = build(xml).unwrap();

        let root = ElementRecord::parse(&records[0].bytes).unwrap();
        let name = root.qname(&symbols).unwrap();
        assert_eq!(name.namespace, "urn:default");
        assert_eq!(name.prefix, None);
        assert_eq!(root.attribute_count(), 0);
        let decls = root.namespace_decls(&symbols).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].prefix, "");
        assert_eq!(decls[1].uri, "urn:p");

        let child = ElementRecord::parse(&records[1].bytes).unwrap();
        assert_eq!(child.qname(&symbols).unwrap().to_string(), "p:c");
        assert_eq!(child.attribute_count(), 2);

        let attr = crate::record::AttributeRecord::parse(&records[2].bytes).unwrap();
        assert_eq!(attr.qname(&symbols).unwrap().namespace, "urn:p");
        let plain = crate::record::AttributeRecord::parse(&records[3].bytes).unwrap();
        assert_eq!(plain.symbols().1, 0);
        assert_eq!(symbols.namespace_symbol("urn:p"), Some(attr.symbols().1));
    }

    #[test]
    fn test_xml_id_attribute_type() {
        let (records, _) = build(r#"<r xml:id="top" id="x"/>"#).unwrap();
        let xml_id = crate::record::AttributeRecord::parse(&records[1].bytes).unwrap();
        let id = crate::record::AttributeRecord::parse(&records[2].bytes).unwrap();
        assert_eq!(xml_id.attr_type(), AttrType::Id);
        assert_eq!(id.attr_type(), AttrType::Cdata);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(build("<a><b></a>"), Err(Error::Load { .. })));
        assert!(build("<a>").is_err());
        assert!(build("<a/><b/>").is_err());
        assert!(build("text<a/>").is_err());
        assert!(build("<!-- only -->").is_err());
        assert!(build("<p:a/>").is_err());
        match build("<a></b>") {
            Err(Error::Load { position, .. }) => assert_eq!(position, 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
