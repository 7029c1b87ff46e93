//! Node Record Codec
//!
//! Binary layout of stored nodes. One record per node; the records of a
//! subtree are contiguous and in document order, an element's attributes
//! directly after the element record.
//!
//! ## Layouts (integers big-endian)
//!
//! ```text
//! element    sig | children u32 | units u16 | node id | attrs u16 | name
//!                | [ns u16 | prefix len u16 | prefix] | decls u16 | decl*
//! decl       prefix len u16 | prefix | ns u16
//! attribute  sig | units u16 | node id | name | [ns u16 | prefix len u16 | prefix] | value
//! text       sig | units u16 | node id | utf-8           (also comment, CDATA)
//! proc-inst  sig | units u16 | node id | target len u32 | target | data
//! ```
//!
//! `children` counts the element's attributes plus its direct children:
//! the number of records the cursor pulls before the element ends.
//!
//! Stored runs frame every record as `[len u32][record]`.
//!
//! The codec works on borrowed byte ranges and returns offsets into them;
//! it never copies record bytes.

pub mod attribute;
pub mod character;
pub mod element;
pub mod signature;

use std::ops::Range;

use crate::dom::NodeKind;
use crate::error::{Error, Result};
use crate::numbering::NodeId;

pub use attribute::{encode_attribute, AttributeRecord};
pub use character::{encode_pi, encode_text, CharacterRecord, PiRecord};
pub use element::{encode_element, ElementFields, ElementRecord};

pub const LENGTH_SIGNATURE: usize = 1;
pub const LENGTH_CHILD_COUNT: usize = 4;
pub const LENGTH_ID_UNITS: usize = 2;
pub const LENGTH_ATTRIBUTE_COUNT: usize = 2;
pub const LENGTH_FRAME: usize = 4;

/// Fixed header fields shared by all records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub signature: u8,
    pub kind: NodeKind,
    /// Attributes plus direct children; 0 for non-elements
    pub child_count: u32,
    /// Byte range of the encoded node identifier
    pub id_range: Range<usize>,
}

impl RecordHeader {
    /// Decode the node identifier the header points at.
    pub fn node_id(&self, data: &[u8]) -> Result<NodeId> {
        let bytes = data
            .get(self.id_range.start..)
            .ok_or_else(|| Error::malformed_identifier("identifier outside record"))?;
        NodeId::decode(bytes, self.id_range.len())
    }

    /// First byte after the identifier.
    #[inline]
    pub fn body_start(&self) -> usize {
        self.id_range.end
    }
}

/// Decode the kind, child count and identifier range of a record.
pub fn decode_header(data: &[u8]) -> Result<RecordHeader> {
    let signature = *data
        .first()
        .ok_or_else(|| Error::malformed_record("empty record"))?;
    let kind = signature::kind_of(signature)?;
    let (child_count, units_pos) = if kind == NodeKind::Element {
        (read_u32(data, LENGTH_SIGNATURE)?, LENGTH_SIGNATURE + LENGTH_CHILD_COUNT)
    } else {
        (0, LENGTH_SIGNATURE)
    };
    let units = read_u16(data, units_pos)? as usize;
    let start = units_pos + LENGTH_ID_UNITS;
    if start + units > data.len() {
        return Err(Error::malformed_identifier(format!(
            "declared {units} units but record has {} bytes left",
            data.len().saturating_sub(start)
        )));
    }
    Ok(RecordHeader {
        signature,
        kind,
        child_count,
        id_range: start..start + units,
    })
}

/// Byte ranges of the attribute records following an element record.
///
/// `element` is the element record's range inside `page`; its attributes
/// are the next framed records of the same run. The attribute count is
/// found right after the element's identifier, so the element header is
/// decoded first.
pub fn attribute_record_offsets(page: &[u8], element: Range<usize>) -> Result<Vec<Range<usize>>> {
    let record = page
        .get(element.clone())
        .ok_or_else(|| Error::malformed_record("element range outside page"))?;
    let header = decode_header(record)?;
    if header.kind != NodeKind::Element {
        return Err(Error::malformed_record("attribute offsets of a non-element"));
    }
    let count = read_u16(record, header.body_start())? as usize;

    let mut offsets = Vec::with_capacity(count);
    let mut pos = element.end;
    for _ in 0..count {
        let range = read_frame(page, pos)?;
        let sig = page[range.start];
        if signature::kind_of(sig)? != NodeKind::Attribute {
            return Err(Error::malformed_record("element is followed by too few attributes"));
        }
        pos = range.end;
        offsets.push(range);
    }
    Ok(offsets)
}

/// Append `[len u32][record]`.
pub fn frame(record: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(record.len())
        .map_err(|_| Error::malformed_record("record larger than 4 GiB"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(record);
    Ok(())
}

/// Range of the record framed at `pos`.
pub fn read_frame(page: &[u8], pos: usize) -> Result<Range<usize>> {
    let len = read_u32(page, pos)? as usize;
    let start = pos + LENGTH_FRAME;
    if len == 0 || start + len > page.len() {
        return Err(Error::malformed_record(format!("bad frame at offset {pos}")));
    }
    Ok(start..start + len)
}

#[inline]
pub(crate) fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::malformed_record(format!("truncated at offset {pos}")))
}

#[inline]
pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::malformed_record(format!("truncated at offset {pos}")))
}

pub(crate) fn read_str(data: &[u8], range: Range<usize>) -> Result<&str> {
    let bytes = data
        .get(range.clone())
        .ok_or_else(|| Error::malformed_record(format!("truncated string at {range:?}")))?;
    std::str::from_utf8(bytes).map_err(|_| Error::malformed_record("invalid utf-8"))
}

/// Read a symbol of the given width.
pub(crate) fn read_symbol(data: &[u8], pos: usize, size: signature::SizeType) -> Result<u16> {
    use signature::SizeType;
    match size {
        SizeType::None => Ok(0),
        SizeType::Byte => data
            .get(pos)
            .map(|&b| b as u16)
            .ok_or_else(|| Error::malformed_record("truncated symbol")),
        SizeType::Short => read_u16(data, pos),
        SizeType::Int => {
            let wide = read_u32(data, pos)?;
            u16::try_from(wide).map_err(|_| Error::UnknownSymbol(u16::MAX))
        }
    }
}

pub(crate) fn write_symbol(out: &mut Vec<u8>, symbol: u16, size: signature::SizeType) {
    use signature::SizeType;
    match size {
        SizeType::None => {}
        SizeType::Byte => out.push(symbol as u8),
        SizeType::Short => out.extend_from_slice(&symbol.to_be_bytes()),
        SizeType::Int => out.extend_from_slice(&(symbol as u32).to_be_bytes()),
    }
}

/// Write signature-independent header: units and identifier.
pub(crate) fn write_node_id(out: &mut Vec<u8>, node_id: &NodeId) -> Result<()> {
    let units = u16::try_from(node_id.units()).map_err(|_| {
        Error::malformed_identifier(format!("identifier of {} units too long", node_id.units()))
    })?;
    out.extend_from_slice(&units.to_be_bytes());
    out.extend_from_slice(node_id.as_bytes());
    Ok(())
}

pub(crate) fn write_short_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| Error::malformed_record("string too long"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}
