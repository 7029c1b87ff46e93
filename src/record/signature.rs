//! Signature byte
//!
//! ```text
//!   bit  7 6 5 | 4    | 3     | 2 1 0
//!        kind  | ns   | dirty | name symbol width   (element)
//!        kind  | ns   | attr type | name width      (attribute, type in bits 2-3)
//!        kind  | unused                             (other kinds)
//! ```

use crate::dom::NodeKind;
use crate::error::{Error, Result};

const KIND_SHIFT: u8 = 5;

const KIND_TEXT: u8 = 0;
const KIND_ELEMENT: u8 = 1;
const KIND_PROC_INST: u8 = 2;
const KIND_COMMENT: u8 = 3;
const KIND_ATTRIBUTE: u8 = 4;
const KIND_CDATA: u8 = 5;

/// Element or attribute name has a namespace.
pub const HAS_NAMESPACE: u8 = 0x10;
/// Element record was modified since it was written.
pub const DIRTY: u8 = 0x08;

const ATTR_TYPE_SHIFT: u8 = 2;
const SIZE_TYPE_MASK: u8 = 0x03;

/// Width of a stored name symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeType {
    None,
    Int,
    Short,
    Byte,
}

impl SizeType {
    /// Smallest width holding `symbol`.
    pub fn for_symbol(symbol: u16) -> Self {
        if symbol <= u8::MAX as u16 {
            SizeType::Byte
        } else {
            SizeType::Short
        }
    }

    #[inline]
    pub fn width(self) -> usize {
        match self {
            SizeType::None => 0,
            SizeType::Int => 4,
            SizeType::Short => 2,
            SizeType::Byte => 1,
        }
    }

    fn bits(self) -> u8 {
        match self {
            SizeType::None => 0,
            SizeType::Int => 1,
            SizeType::Short => 2,
            SizeType::Byte => 3,
        }
    }

    pub fn from_signature(signature: u8) -> Self {
        match signature & SIZE_TYPE_MASK {
            1 => SizeType::Int,
            2 => SizeType::Short,
            3 => SizeType::Byte,
            _ => SizeType::None,
        }
    }
}

/// Node kind stored in a signature byte.
pub fn kind_of(signature: u8) -> Result<NodeKind> {
    Ok(match signature >> KIND_SHIFT {
        KIND_TEXT => NodeKind::Text,
        KIND_ELEMENT => NodeKind::Element,
        KIND_PROC_INST => NodeKind::ProcessingInstruction,
        KIND_COMMENT => NodeKind::Comment,
        KIND_ATTRIBUTE => NodeKind::Attribute,
        KIND_CDATA => NodeKind::CData,
        other => {
            return Err(Error::malformed_record(format!(
                "unknown node kind {other} in signature 0x{signature:02X}"
            )))
        }
    })
}

/// Signature byte with only the kind bits set.
pub fn kind_bits(kind: NodeKind) -> u8 {
    let code = match kind {
        NodeKind::Text => KIND_TEXT,
        NodeKind::Element => KIND_ELEMENT,
        NodeKind::ProcessingInstruction => KIND_PROC_INST,
        NodeKind::Comment => KIND_COMMENT,
        NodeKind::Attribute => KIND_ATTRIBUTE,
        NodeKind::CData => KIND_CDATA,
    };
    code << KIND_SHIFT
}

pub fn element_signature(size: SizeType, has_namespace: bool, dirty: bool) -> u8 {
    let mut sig = kind_bits(NodeKind::Element) | size.bits();
    if has_namespace {
        sig |= HAS_NAMESPACE;
    }
    if dirty {
        sig |= DIRTY;
    }
    sig
}

pub fn attribute_signature(size: SizeType, has_namespace: bool, attr_type_bits: u8) -> u8 {
    let mut sig = kind_bits(NodeKind::Attribute)
        | size.bits()
        | ((attr_type_bits & 0x3) << ATTR_TYPE_SHIFT);
    if has_namespace {
        sig |= HAS_NAMESPACE;
    }
    sig
}

#[inline]
pub fn attr_type_bits(signature: u8) -> u8 {
    (signature >> ATTR_TYPE_SHIFT) & 0x3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            NodeKind::Text,
            NodeKind::Element,
            NodeKind::ProcessingInstruction,
            NodeKind::Comment,
            NodeKind::Attribute,
            NodeKind::CData,
        ] {
            assert_eq!(kind_of(kind_bits(kind)).unwrap(), kind);
        }
        assert!(kind_of(0xE0).is_err());
    }

    #[test]
    fn test_element_flags() {
        let sig = element_signature(SizeType::Short, true, true);
        assert_eq!(kind_of(sig).unwrap(), NodeKind::Element);
        assert_eq!(sig & HAS_NAMESPACE, HAS_NAMESPACE);
        assert_eq!(sig & DIRTY, DIRTY);
        assert_eq!(SizeType::from_signature(sig), SizeType::Short);
    }

    #[test]
    fn test_attribute_type_bits() {
        let sig = attribute_signature(SizeType::Byte, false, 2);
        assert_eq!(kind_of(sig).unwrap(), NodeKind::Attribute);
        assert_eq!(attr_type_bits(sig), 2);
        assert_eq!(SizeType::from_signature(sig), SizeType::Byte);
        assert_eq!(sig & HAS_NAMESPACE, 0);
    }

    #[test]
    fn test_size_for_symbol() {
        assert_eq!(SizeType::for_symbol(200), SizeType::Byte);
        assert_eq!(SizeType::for_symbol(300), SizeType::Short);
        assert_eq!(SizeType::Int.width(), 4);
    }
}
