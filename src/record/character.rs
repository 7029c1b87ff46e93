//! Text, comment, CDATA and processing-instruction records.

use super::signature;
use super::{decode_header, read_str, read_u32, write_node_id, RecordHeader};
use crate::dom::NodeKind;
use crate::error::{Error, Result};
use crate::numbering::NodeId;

/// Encode a text, comment or CDATA record.
pub fn encode_text(kind: NodeKind, node_id: &NodeId, text: &str) -> Result<Vec<u8>> {
    if !matches!(kind, NodeKind::Text | NodeKind::Comment | NodeKind::CData) {
        return Err(Error::malformed_record(format!("{kind:?} is not character data")));
    }
    let mut out = Vec::with_capacity(3 + node_id.units() + text.len());
    out.push(signature::kind_bits(kind));
    write_node_id(&mut out, node_id)?;
    out.extend_from_slice(text.as_bytes());
    Ok(out)
}

pub fn encode_pi(node_id: &NodeId, target: &str, data: &str) -> Result<Vec<u8>> {
    let target_len =
        u32::try_from(target.len()).map_err(|_| Error::malformed_record("target too long"))?;
    let mut out = Vec::with_capacity(7 + node_id.units() + target.len() + data.len());
    out.push(signature::kind_bits(NodeKind::ProcessingInstruction));
    write_node_id(&mut out, node_id)?;
    out.extend_from_slice(&target_len.to_be_bytes());
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(data.as_bytes());
    Ok(out)
}

/// Borrowed view of a text, comment or CDATA record.
#[derive(Debug, Clone)]
pub struct CharacterRecord<'a> {
    data: &'a [u8],
    header: RecordHeader,
}

impl<'a> CharacterRecord<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = decode_header(data)?;
        match header.kind {
            NodeKind::Text | NodeKind::Comment | NodeKind::CData => {
                Ok(CharacterRecord { data, header })
            }
            kind => Err(Error::malformed_record(format!("{kind:?} is not character data"))),
        }
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.header.kind
    }

    pub fn text(&self) -> Result<&'a str> {
        read_str(self.data, self.header.body_start()..self.data.len())
    }
}

/// Borrowed view of a processing-instruction record.
#[derive(Debug, Clone)]
pub struct PiRecord<'a> {
    data: &'a [u8],
    target_start: usize,
    data_start: usize,
}

impl<'a> PiRecord<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = decode_header(data)?;
        if header.kind != NodeKind::ProcessingInstruction {
            return Err(Error::malformed_record("not a processing instruction"));
        }
        let len_pos = header.body_start();
        let target_len = read_u32(data, len_pos)? as usize;
        let target_start = len_pos + 4;
        let data_start = target_start + target_len;
        if data_start > data.len() {
            return Err(Error::malformed_record("truncated processing instruction"));
        }
        Ok(PiRecord {
            data,
            target_start,
            data_start,
        })
    }

    pub fn target(&self) -> Result<&'a str> {
        read_str(self.data, self.target_start..self.data_start)
    }

    pub fn data(&self) -> Result<&'a str> {
        read_str(self.data, self.data_start..self.data.len())
    }
}
