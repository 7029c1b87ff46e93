//! Node identifier value type.

use std::fmt;
use std::str::FromStr;

use super::level::{self, component_width, LEVEL_END};
use crate::error::{Error, Result};

/// Structural identifier of a node: its root-to-node path of level codes,
/// kept in encoded form.
///
/// Ordering is byte ordering of the encoded form, which is document order.
/// The document node is the empty identifier and the document element is
/// `1`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    bytes: Vec<u8>,
}

impl NodeId {
    /// Identifier of the document node (no levels).
    #[inline]
    pub const fn document() -> Self {
        NodeId { bytes: Vec::new() }
    }

    /// Identifier of the document element.
    pub fn root() -> Self {
        NodeId::document().child(1)
    }

    /// Build an identifier from explicit level codes.
    pub fn from_levels<L: AsRef<[u32]>>(levels: &[L]) -> Result<Self> {
        let mut bytes = Vec::with_capacity(levels.len() * 2);
        for code in levels {
            let code = code.as_ref();
            if code.is_empty() {
                return Err(Error::malformed_identifier("empty level code"));
            }
            level::encode_level(code, &mut bytes);
        }
        Ok(NodeId { bytes })
    }

    /// Decode an identifier from the first `units` bytes of `data`.
    ///
    /// Fails when `units` exceeds the supplied bytes or does not end on a
    /// level boundary.
    pub fn decode(data: &[u8], units: usize) -> Result<Self> {
        let bytes = data.get(..units).ok_or_else(|| {
            Error::malformed_identifier(format!(
                "declared {units} units but only {} bytes available",
                data.len()
            ))
        })?;
        let mut pos = 0;
        while pos < bytes.len() {
            let (_, end) = level::decode_level(bytes, pos)?;
            pos = end;
        }
        Ok(NodeId {
            bytes: bytes.to_vec(),
        })
    }

    /// Encoded form.
    #[inline]
    pub fn encode(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Encoded form, borrowed.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of encoding units (bytes).
    #[inline]
    pub fn units(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_document(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Tree level: 0 for the document node, 1 for the document element.
    pub fn tree_level(&self) -> usize {
        self.level_ends().len()
    }

    /// Decoded level codes.
    pub fn levels(&self) -> Vec<Vec<u32>> {
        let mut levels = Vec::new();
        let mut pos = 0;
        while pos < self.bytes.len() {
            match level::decode_level(&self.bytes, pos) {
                Ok((code, end)) => {
                    levels.push(code);
                    pos = end;
                }
                Err(_) => break,
            }
        }
        levels
    }

    /// Code of the last level, empty for the document node.
    pub fn last_level(&self) -> Vec<u32> {
        let start = self.parent_len();
        level::decode_level(&self.bytes, start)
            .map(|(code, _)| code)
            .unwrap_or_default()
    }

    /// Parent identifier, `None` for the document node.
    pub fn parent_id(&self) -> Option<NodeId> {
        if self.is_document() {
            return None;
        }
        Some(NodeId {
            bytes: self.bytes[..self.parent_len()].to_vec(),
        })
    }

    /// First child identifier.
    pub fn new_child(&self) -> NodeId {
        self.child(1)
    }

    /// Child with a single-component level code `n`.
    pub fn child(&self, n: u32) -> NodeId {
        let mut bytes = Vec::with_capacity(self.bytes.len() + 2);
        bytes.extend_from_slice(&self.bytes);
        level::encode_level(&[n], &mut bytes);
        NodeId { bytes }
    }

    /// Identifier of the following sibling when appending.
    ///
    /// Sub-level components are dropped: the sibling after `1.2/1` is `1.3`.
    pub fn next_sibling(&self) -> Result<NodeId> {
        let parent = self.parent_id().ok_or_else(|| self.no_sibling())?;
        let first = self.last_level().first().copied().unwrap_or(0);
        let next = first.checked_add(1).ok_or_else(|| self.no_sibling())?;
        Ok(parent.child(next))
    }

    /// Identifier for a node inserted directly before `self`, when `self`
    /// has no preceding sibling.
    pub fn insert_before(&self) -> Result<NodeId> {
        let parent = self.parent_id().ok_or_else(|| self.no_sibling())?;
        let code = level::before(&self.last_level()).ok_or_else(|| self.no_sibling())?;
        parent.with_level(&code)
    }

    /// Identifier for a node inserted between two adjacent siblings.
    ///
    /// Neither sibling changes; the new identifier sorts strictly between
    /// them.
    pub fn between(left: &NodeId, right: &NodeId) -> Result<NodeId> {
        let invalid = || Error::InvalidInsertion {
            left: left.to_string(),
            right: right.to_string(),
        };
        if !left.is_sibling_of(right) {
            return Err(invalid());
        }
        let code = level::between(&left.last_level(), &right.last_level()).ok_or_else(invalid)?;
        left.parent_id().ok_or_else(invalid)?.with_level(&code)
    }

    /// `self` is a proper ancestor of `other`.
    ///
    /// Runs in O(depth) over the encoded bytes: the encoded ancestor is a
    /// byte-prefix of every descendant.
    #[inline]
    pub fn is_ancestor_of(&self, other: &NodeId) -> bool {
        other.bytes.len() > self.bytes.len() && other.bytes.starts_with(&self.bytes)
    }

    #[inline]
    pub fn is_descendant_of(&self, other: &NodeId) -> bool {
        other.is_ancestor_of(self)
    }

    #[inline]
    pub fn is_descendant_or_self_of(&self, other: &NodeId) -> bool {
        self.bytes.starts_with(&other.bytes)
    }

    pub fn is_child_of(&self, parent: &NodeId) -> bool {
        self.parent_id().as_ref() == Some(parent)
    }

    pub fn is_sibling_of(&self, other: &NodeId) -> bool {
        self != other
            && !self.is_document()
            && self.bytes[..self.parent_len()] == other.bytes[..other.parent_len()]
            && !other.is_document()
    }

    fn with_level(&self, code: &[u32]) -> Result<NodeId> {
        if code.is_empty() {
            return Err(Error::malformed_identifier("empty level code"));
        }
        let mut bytes = self.bytes.clone();
        level::encode_level(code, &mut bytes);
        Ok(NodeId { bytes })
    }

    fn no_sibling(&self) -> Error {
        Error::InvalidInsertion {
            left: self.to_string(),
            right: String::new(),
        }
    }

    /// Byte offsets just past each level's end marker.
    fn level_ends(&self) -> Vec<usize> {
        let mut ends = Vec::new();
        let mut pos = 0;
        while pos < self.bytes.len() {
            let width = component_width(self.bytes[pos]).unwrap_or(1);
            pos += width;
            if self.bytes.get(pos) == Some(&LEVEL_END) {
                ends.push(pos + 1);
            }
            pos += 1;
        }
        ends
    }

    fn parent_len(&self) -> usize {
        let ends = self.level_ends();
        match ends.len() {
            0 | 1 => 0,
            n => ends[n - 2],
        }
    }
}

impl fmt::Display for NodeId {
    /// Dotted levels, sub-level components separated by `/`; the document
    /// node prints as `/`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_document() {
            return f.write_str("/");
        }
        for (i, code) in self.levels().iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            for (j, component) in code.iter().enumerate() {
                if j > 0 {
                    f.write_str("/")?;
                }
                write!(f, "{component}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "/" {
            return Ok(NodeId::document());
        }
        let levels = s
            .split('.')
            .map(|level| {
                level
                    .split('/')
                    .map(|c| {
                        c.parse::<u32>().map_err(|_| {
                            Error::malformed_identifier(format!("invalid level code in {s:?}"))
                        })
                    })
                    .collect::<Result<Vec<u32>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        NodeId::from_levels(&levels)
    }
}
