//! Storage Collaborator
//!
//! The cursor reads node records through the [`RecordSource`] trait: a
//! one-directional iterator over the records of a document that can be
//! re-positioned by address or by node identifier.
//!
//! ## Architecture
//!
//! ```text
//! MemoryStore
//! ├── symbols: MemorySymbols          # names and namespaces
//! └── documents: DocumentId -> pages
//!       ├── Page { data: Bytes, slots }   # framed records
//!       └── index: NodeId -> Address      # lookup used by seek-by-id
//!
//! MemoryRecordSource  ──next()──▶  Value { page, range, address }
//! ```
//!
//! [`MemoryStore`] is the in-memory implementation used by the loader,
//! the index builder and the tests. Other engines implement
//! [`RecordSource`] over their own page format.

pub mod builder;
pub mod memory;

use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use thiserror::Error;

use crate::numbering::NodeId;

pub use builder::DocumentBuilder;
pub use memory::{MemoryRecordSource, MemoryStore, SeekStats};

/// Document identifier inside a store.
pub type DocumentId = u32;

/// Physical location of a record: page number and slot within the page.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

impl Address {
    #[inline]
    pub const fn new(page: u32, slot: u16) -> Self {
        Address(((page as u64) << 16) | slot as u64)
    }

    #[inline]
    pub const fn page(self) -> u32 {
        (self.0 >> 16) as u32
    }

    #[inline]
    pub const fn slot(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_u64(raw: u64) -> Self {
        Address(raw)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page(), self.slot())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Reference to a stored node: its identifier plus a possibly stale
/// storage address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    pub document: DocumentId,
    pub node_id: NodeId,
    /// `None` when unknown; the source then looks the node up by id.
    pub address: Option<Address>,
}

impl NodeHandle {
    pub fn new(document: DocumentId, node_id: NodeId, address: Option<Address>) -> Self {
        NodeHandle {
            document,
            node_id,
            address,
        }
    }

    /// Same node, address forgotten.
    pub fn without_address(&self) -> Self {
        NodeHandle {
            address: None,
            ..self.clone()
        }
    }
}

/// One record handed out by a source: a shared page buffer and the
/// record's byte range in it.
#[derive(Clone, PartialEq, Eq)]
pub struct Value {
    pub page: Bytes,
    pub range: Range<usize>,
    pub address: Address,
}

impl Value {
    /// The record bytes. A range outside the page yields an empty slice,
    /// which record decoding rejects as malformed.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.page.get(self.range.clone()).unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("address", &self.address)
            .field("len", &self.range.len())
            .finish()
    }
}

/// Failures of the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record source is closed")]
    Closed,

    #[error("node {node_id} not found in document {document}")]
    NodeNotFound { document: DocumentId, node_id: NodeId },

    #[error("no record at address {0}")]
    InvalidAddress(Address),

    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),

    #[error("document {0} already exists")]
    DocumentExists(DocumentId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sequential record iterator supplied by a storage engine.
///
/// Blocking, locking and timeouts all live behind these calls.
pub trait RecordSource {
    /// Next record in storage order, `None` at the end of the document.
    fn next(&mut self) -> Result<Option<Value>, StorageError>;

    /// Position the source so that `next` returns the target's record.
    ///
    /// Uses `target.address` when present and valid, otherwise looks the
    /// node up by identifier.
    fn seek(&mut self, target: &NodeHandle) -> Result<(), StorageError>;

    /// Address of the record last returned by `next`.
    fn current_address(&self) -> Option<Address>;

    /// Release the source. Calling it again has no effect.
    fn close(&mut self) -> Result<(), StorageError>;
}

impl<R: RecordSource + ?Sized> RecordSource for Box<R> {
    fn next(&mut self) -> Result<Option<Value>, StorageError> {
        (**self).next()
    }

    fn seek(&mut self, target: &NodeHandle) -> Result<(), StorageError> {
        (**self).seek(target)
    }

    fn current_address(&self) -> Option<Address> {
        (**self).current_address()
    }

    fn close(&mut self) -> Result<(), StorageError> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record;

    #[test]
    fn test_address_packing() {
        let address = Address::new(70_000, 513);
        assert_eq!(address.page(), 70_000);
        assert_eq!(address.slot(), 513);
        assert_eq!(Address::from_u64(address.as_u64()), address);
        assert_eq!(address.to_string(), "70000:513");
        assert!(Address::new(1, 9) < Address::new(2, 0));
    }

    #[test]
    fn test_value_bytes() {
        let value = Value {
            page: Bytes::from_static(b"xxabcxx"),
            range: 2..5,
            address: Address::new(0, 0),
        };
        assert_eq!(value.bytes(), b"abc");
        assert_eq!(value.len(), 3);
        assert!(!value.is_empty());
    }

    #[test]
    fn test_handle_without_address() {
        let handle = NodeHandle::new(3, NodeId::root(), Some(Address::new(1, 2)));
        let bare = handle.without_address();
        assert_eq!(bare.address, None);
        assert_eq!(bare.node_id, handle.node_id);
    }

    #[test]
    fn test_value_outside_page_is_malformed() {
        let value = Value {
            page: Bytes::from_static(&[0x20, 0, 0]),
            range: 1..9,
            address: Address::new(0, 0),
        };
        assert!(value.bytes().is_empty());
        assert!(matches!(
            record::decode_header(value.bytes()),
            Err(Error::MalformedRecord(_))
        ));
    }
}
