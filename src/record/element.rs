//! Element records.

use std::ops::Range;

use super::signature::{self, SizeType, DIRTY, HAS_NAMESPACE};
use super::{read_str, read_symbol, read_u16, write_node_id, write_short_str, write_symbol};
use super::{decode_header, RecordHeader, LENGTH_ATTRIBUTE_COUNT};
use crate::dom::{NamespaceDecl, NodeKind, QName, SymbolTable};
use crate::error::{Error, Result};
use crate::numbering::NodeId;

/// Fields needed to write an element record.
#[derive(Debug, Clone)]
pub struct ElementFields<'a> {
    pub node_id: &'a NodeId,
    pub child_count: u32,
    pub attribute_count: u16,
    pub name: u16,
    /// Namespace symbol, 0 for none
    pub namespace: u16,
    pub prefix: Option<&'a str>,
    /// In-scope declarations made on this element: (prefix, namespace symbol)
    pub namespace_decls: &'a [(String, u16)],
    pub dirty: bool,
}

pub fn encode_element(fields: &ElementFields<'_>) -> Result<Vec<u8>> {
    let size = SizeType::for_symbol(fields.name);
    let has_ns = fields.namespace != 0;
    let mut out = Vec::with_capacity(16 + fields.node_id.units());
    out.push(signature::element_signature(size, has_ns, fields.dirty));
    out.extend_from_slice(&fields.child_count.to_be_bytes());
    write_node_id(&mut out, fields.node_id)?;
    out.extend_from_slice(&fields.attribute_count.to_be_bytes());
    write_symbol(&mut out, fields.name, size);
    if has_ns {
        out.extend_from_slice(&fields.namespace.to_be_bytes());
        write_short_str(&mut out, fields.prefix.unwrap_or(""))?;
    }
    let decls = u16::try_from(fields.namespace_decls.len())
        .map_err(|_| Error::malformed_record("too many namespace declarations"))?;
    out.extend_from_slice(&decls.to_be_bytes());
    for (prefix, ns) in fields.namespace_decls {
        write_short_str(&mut out, prefix)?;
        out.extend_from_slice(&ns.to_be_bytes());
    }
    Ok(out)
}

/// Borrowed view of an element record. Fixed fields are read on parse;
/// the prefix and declarations are located but decoded on demand.
#[derive(Debug, Clone)]
pub struct ElementRecord<'a> {
    data: &'a [u8],
    header: RecordHeader,
    attribute_count: u16,
    name: u16,
    namespace: u16,
    prefix: Option<Range<usize>>,
    decls_pos: usize,
}

impl<'a> ElementRecord<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = decode_header(data)?;
        if header.kind != NodeKind::Element {
            return Err(Error::malformed_record("not an element record"));
        }
        let mut pos = header.body_start();
        let attribute_count = read_u16(data, pos)?;
        pos += LENGTH_ATTRIBUTE_COUNT;

        let size = SizeType::from_signature(header.signature);
        let name = read_symbol(data, pos, size)?;
        pos += size.width();

        let (namespace, prefix) = if header.signature & HAS_NAMESPACE != 0 {
            let ns = read_u16(data, pos)?;
            let len = read_u16(data, pos + 2)? as usize;
            let start = pos + 4;
            pos = start + len;
            (ns, (len > 0).then_some(start..pos))
        } else {
            (0, None)
        };

        Ok(ElementRecord {
            data,
            header,
            attribute_count,
            name,
            namespace,
            prefix,
            decls_pos: pos,
        })
    }

    #[inline]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    #[inline]
    pub fn child_count(&self) -> u32 {
        self.header.child_count
    }

    #[inline]
    pub fn attribute_count(&self) -> u16 {
        self.attribute_count
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.header.signature & DIRTY != 0
    }

    /// (name symbol, namespace symbol)
    #[inline]
    pub fn symbols(&self) -> (u16, u16) {
        (self.name, self.namespace)
    }

    pub fn node_id(&self) -> Result<NodeId> {
        self.header.node_id(self.data)
    }

    pub fn prefix(&self) -> Result<Option<&'a str>> {
        self.prefix
            .clone()
            .map(|range| read_str(self.data, range))
            .transpose()
    }

    pub fn qname<S: SymbolTable + ?Sized>(&self, symbols: &S) -> Result<QName> {
        let local = symbols.name(self.name).ok_or(Error::UnknownSymbol(self.name))?;
        let namespace = symbols
            .namespace(self.namespace)
            .ok_or(Error::UnknownSymbol(self.namespace))?;
        Ok(QName::with_namespace(
            local,
            namespace,
            self.prefix()?.map(str::to_owned),
        ))
    }

    /// Declarations as stored: (prefix, namespace symbol).
    pub fn namespace_decl_symbols(&self) -> Result<Vec<(&'a str, u16)>> {
        let count = read_u16(self.data, self.decls_pos)? as usize;
        let mut pos = self.decls_pos + 2;
        let mut decls = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_u16(self.data, pos)? as usize;
            let prefix = read_str(self.data, pos + 2..pos + 2 + len)?;
            pos += 2 + len;
            decls.push((prefix, read_u16(self.data, pos)?));
            pos += 2;
        }
        Ok(decls)
    }

    pub fn namespace_decls<S: SymbolTable + ?Sized>(&self, symbols: &S) -> Result<Vec<NamespaceDecl>> {
        self.namespace_decl_symbols()?
            .into_iter()
            .map(|(prefix, ns)| {
                let uri = symbols.namespace(ns).ok_or(Error::UnknownSymbol(ns))?;
                Ok(NamespaceDecl {
                    prefix: prefix.to_owned(),
                    uri: uri.to_owned(),
                })
            })
            .collect()
    }
}
