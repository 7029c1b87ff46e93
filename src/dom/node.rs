//! Decoded node values
//!
//! Owned, fully decoded form of one stored node, as returned by the
//! cursor's `node()` and `previous_node()` accessors.

use crate::error::{Error, Result};
use crate::numbering::NodeId;
use crate::record::{self, AttributeRecord, CharacterRecord, ElementRecord, PiRecord};
use crate::storage::Address;

use super::qname::QName;
use super::symbols::SymbolTable;

/// Type of a stored node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Element node
    Element,
    /// Attribute, stored as a record following its element
    Attribute,
    /// Text content
    Text,
    /// CDATA section
    CData,
    /// Comment
    Comment,
    /// Processing instruction
    ProcessingInstruction,
}

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttrType {
    #[default]
    Cdata,
    Id,
    IdRef,
    IdRefs,
}

impl AttrType {
    pub(crate) fn bits(self) -> u8 {
        match self {
            AttrType::Cdata => 0,
            AttrType::Id => 1,
            AttrType::IdRef => 2,
            AttrType::IdRefs => 3,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            1 => AttrType::Id,
            2 => AttrType::IdRef,
            3 => AttrType::IdRefs,
            _ => AttrType::Cdata,
        }
    }
}

/// Namespace declaration carried by an element (`xmlns:prefix="uri"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Empty for the default namespace
    pub prefix: String,
    pub uri: String,
}

/// A decoded attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub node_id: NodeId,
    pub name: QName,
    pub value: String,
    pub attr_type: AttrType,
}

/// Kind-specific payload of a stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element {
        name: QName,
        /// Attributes plus direct children
        child_count: u32,
        attribute_count: u16,
        namespaces: Vec<NamespaceDecl>,
    },
    Attribute {
        name: QName,
        value: String,
        attr_type: AttrType,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

/// One node decoded from its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub node_id: NodeId,
    pub address: Option<Address>,
    pub data: NodeData,
}

impl StoredNode {
    /// Decode a whole record.
    pub fn decode<S: SymbolTable + ?Sized>(
        data: &[u8],
        address: Option<Address>,
        symbols: &S,
    ) -> Result<Self> {
        let header = record::decode_header(data)?;
        let node_id = header.node_id(data)?;
        let data = match header.kind {
            NodeKind::Element => {
                let element = ElementRecord::parse(data)?;
                NodeData::Element {
                    name: element.qname(symbols)?,
                    child_count: element.child_count(),
                    attribute_count: element.attribute_count(),
                    namespaces: element.namespace_decls(symbols)?,
                }
            }
            NodeKind::Attribute => {
                let attr = AttributeRecord::parse(data)?;
                NodeData::Attribute {
                    name: attr.qname(symbols)?,
                    value: attr.value()?.to_owned(),
                    attr_type: attr.attr_type(),
                }
            }
            NodeKind::ProcessingInstruction => {
                let pi = PiRecord::parse(data)?;
                NodeData::ProcessingInstruction {
                    target: pi.target()?.to_owned(),
                    data: pi.data()?.to_owned(),
                }
            }
            kind => {
                let text = CharacterRecord::parse(data)?.text()?.to_owned();
                match kind {
                    NodeKind::CData => NodeData::CData(text),
                    NodeKind::Comment => NodeData::Comment(text),
                    NodeKind::Text => NodeData::Text(text),
                    _ => return Err(Error::malformed_record("unexpected node kind")),
                }
            }
        };
        Ok(StoredNode {
            node_id,
            address,
            data,
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Attribute { .. } => NodeKind::Attribute,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::CData(_) => NodeKind::CData,
            NodeData::Comment(_) => NodeKind::Comment,
            NodeData::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
        }
    }

    /// Element or attribute name.
    pub fn name(&self) -> Option<&QName> {
        match &self.data {
            NodeData::Element { name, .. } | NodeData::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Character content of text-like nodes, attribute value, PI data.
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(s) | NodeData::CData(s) | NodeData::Comment(s) => Some(s),
            NodeData::Attribute { value, .. } => Some(value),
            NodeData::ProcessingInstruction { data, .. } => Some(data),
            NodeData::Element { .. } => None,
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }
}
