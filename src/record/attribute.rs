//! Attribute records.

use std::ops::Range;

use super::signature::{self, SizeType, HAS_NAMESPACE};
use super::{decode_header, read_str, read_symbol, read_u16, write_node_id, write_short_str, write_symbol, RecordHeader};
use crate::dom::{AttrType, NodeKind, QName, SymbolTable};
use crate::error::{Error, Result};
use crate::numbering::NodeId;

pub fn encode_attribute(
    node_id: &NodeId,
    name: u16,
    namespace: u16,
    prefix: Option<&str>,
    attr_type: AttrType,
    value: &str,
) -> Result<Vec<u8>> {
    let size = SizeType::for_symbol(name);
    let has_ns = namespace != 0;
    let mut out = Vec::with_capacity(8 + node_id.units() + value.len());
    out.push(signature::attribute_signature(size, has_ns, attr_type.bits()));
    write_node_id(&mut out, node_id)?;
    write_symbol(&mut out, name, size);
    if has_ns {
        out.extend_from_slice(&namespace.to_be_bytes());
        write_short_str(&mut out, prefix.unwrap_or(""))?;
    }
    out.extend_from_slice(value.as_bytes());
    Ok(out)
}

/// Borrowed view of an attribute record.
#[derive(Debug, Clone)]
pub struct AttributeRecord<'a> {
    data: &'a [u8],
    header: RecordHeader,
    name: u16,
    namespace: u16,
    prefix: Option<Range<usize>>,
    value_pos: usize,
}

impl<'a> AttributeRecord<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = decode_header(data)?;
        if header.kind != NodeKind::Attribute {
            return Err(Error::malformed_record("not an attribute record"));
        }
        let size = SizeType::from_signature(header.signature);
        let mut pos = header.body_start();
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
        if pos > data.len() {
            return Err(Error::malformed_record("truncated attribute record"));
        }

        Ok(AttributeRecord {
            data,
            header,
            name,
            namespace,
            prefix,
            value_pos: pos,
        })
    }

    pub fn node_id(&self) -> Result<NodeId> {
        self.header.node_id(self.data)
    }

    /// (name symbol, namespace symbol)
    #[inline]
    pub fn symbols(&self) -> (u16, u16) {
        (self.name, self.namespace)
    }

    #[inline]
    pub fn attr_type(&self) -> AttrType {
        AttrType::from_bits(signature::attr_type_bits(self.header.signature))
    }

    pub fn prefix(&self) -> Result<Option<&'a str>> {
        self.prefix
            .clone()
            .map(|range| read_str(self.data, range))
            .transpose()
    }

    pub fn value(&self) -> Result<&'a str> {
        read_str(self.data, self.value_pos..self.data.len())
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
}
