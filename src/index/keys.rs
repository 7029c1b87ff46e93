//! Index key encoding.
//!
//! All integers big-endian, so byte order equals numeric order:
//!
//! ```text
//! element / attribute      collection u32 | kind u8 | name u16                (7 bytes)
//! attribute with namespace collection u32 | kind u8 | name u16 | ns u16       (9 bytes)
//! id value                 collection u32 | kind u8 | utf-8 value
//! qname entry              kind u8 | name u16 | ns u16 | document u32 | node id
//! document qname           2 | document u32 | kind u8 | name u16 | ns u16
//! ```
//!
//! The kind byte separates element, attribute and id keys of one
//! collection, and the fixed widths keep any key from being a prefix of a
//! key with a different tuple.

use crate::numbering::NodeId;
use crate::storage::DocumentId;

/// Collection identifier used as the leading key component.
pub type CollectionId = u32;

/// Node-kind discriminator inside index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum KeyKind {
    Element = 0,
    Attribute = 1,
    AttributeId = 2,
}

/// Leading byte of [`document_key`].
pub const DOCUMENT_KEY_TAG: u8 = 2;

pub const ELEMENT_KEY_LEN: usize = 7;
pub const NAMESPACED_KEY_LEN: usize = 9;
pub const QNAME_PREFIX_LEN: usize = 5;
pub const DOCUMENT_KEY_LEN: usize = 10;

#[inline]
fn collection_prefix(collection: CollectionId, kind: KeyKind, capacity: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(capacity);
    key.extend_from_slice(&collection.to_be_bytes());
    key.push(kind as u8);
    key
}

/// Key of all elements named `name` in a collection.
pub fn element_key(collection: CollectionId, name: u16) -> Vec<u8> {
    let mut key = collection_prefix(collection, KeyKind::Element, ELEMENT_KEY_LEN);
    key.extend_from_slice(&name.to_be_bytes());
    key
}

/// Key of all attributes named `name` in a collection.
pub fn attribute_key(collection: CollectionId, name: u16) -> Vec<u8> {
    let mut key = collection_prefix(collection, KeyKind::Attribute, ELEMENT_KEY_LEN);
    key.extend_from_slice(&name.to_be_bytes());
    key
}

pub fn attribute_key_with_namespace(collection: CollectionId, name: u16, namespace: u16) -> Vec<u8> {
    let mut key = collection_prefix(collection, KeyKind::Attribute, NAMESPACED_KEY_LEN);
    key.extend_from_slice(&name.to_be_bytes());
    key.extend_from_slice(&namespace.to_be_bytes());
    key
}

/// Key of an ID-typed attribute value.
pub fn id_key(collection: CollectionId, value: &str) -> Vec<u8> {
    let mut key = collection_prefix(collection, KeyKind::AttributeId, 5 + value.len());
    key.extend_from_slice(value.as_bytes());
    key
}

/// Structural index entry for one node.
pub fn qname_key(kind: KeyKind, name: u16, namespace: u16, document: DocumentId, node_id: &NodeId) -> Vec<u8> {
    let mut key = qname_prefix(kind, name, namespace);
    key.extend_from_slice(&document.to_be_bytes());
    key.extend_from_slice(node_id.as_bytes());
    key
}

/// Common prefix of all [`qname_key`]s for one qualified name.
pub fn qname_prefix(kind: KeyKind, name: u16, namespace: u16) -> Vec<u8> {
    let mut key = Vec::with_capacity(QNAME_PREFIX_LEN + 4);
    key.push(kind as u8);
    key.extend_from_slice(&name.to_be_bytes());
    key.extend_from_slice(&namespace.to_be_bytes());
    key
}

/// Common prefix of the [`qname_key`]s of one name in one document.
pub fn qname_document_prefix(kind: KeyKind, name: u16, namespace: u16, document: DocumentId) -> Vec<u8> {
    let mut key = qname_prefix(kind, name, namespace);
    key.extend_from_slice(&document.to_be_bytes());
    key
}

/// Records that a qualified name occurs in a document.
pub fn document_key(document: DocumentId, kind: KeyKind, name: u16, namespace: u16) -> Vec<u8> {
    let mut key = Vec::with_capacity(DOCUMENT_KEY_LEN);
    key.push(DOCUMENT_KEY_TAG);
    key.extend_from_slice(&document.to_be_bytes());
    key.push(kind as u8);
    key.extend_from_slice(&name.to_be_bytes());
    key.extend_from_slice(&namespace.to_be_bytes());
    key
}

/// Half-open byte range `[start, end)` for a B-tree range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    /// `None` means unbounded
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    /// All keys starting with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = successor(&prefix);
        KeyRange { start: prefix, end }
    }

    /// Every key of a collection, any kind.
    pub fn collection(collection: CollectionId) -> Self {
        KeyRange::prefix(collection.to_be_bytes().to_vec())
    }

    /// Keys of one kind in a collection.
    pub fn collection_kind(collection: CollectionId, kind: KeyKind) -> Self {
        KeyRange::prefix(collection_prefix(collection, kind, 5))
    }

    /// Structural entries of one qualified name, all documents.
    pub fn qname(kind: KeyKind, name: u16, namespace: u16) -> Self {
        KeyRange::prefix(qname_prefix(kind, name, namespace))
    }

    /// Qualified names occurring in a document.
    pub fn document(document: DocumentId) -> Self {
        let mut prefix = vec![DOCUMENT_KEY_TAG];
        prefix.extend_from_slice(&document.to_be_bytes());
        KeyRange::prefix(prefix)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(element_key(1, 0x0203), vec![0, 0, 0, 1, 0, 2, 3]);
        assert_eq!(attribute_key(1, 0x0203), vec![0, 0, 0, 1, 1, 2, 3]);
        assert_eq!(
            attribute_key_with_namespace(1, 2, 3),
            vec![0, 0, 0, 1, 1, 0, 2, 0, 3]
        );
        assert_eq!(id_key(7, "ab"), vec![0, 0, 0, 7, 2, b'a', b'b']);
        assert_eq!(document_key(5, KeyKind::Attribute, 1, 0).len(), DOCUMENT_KEY_LEN);
    }

    #[test]
    fn test_element_and_attribute_keys_differ() {
        assert_ne!(element_key(1, 1), attribute_key(1, 1));
        assert_eq!(element_key(9, 4), element_key(9, 4));
    }

    #[test]
    fn test_collection_range() {
        let range = KeyRange::collection(3);
        assert!(range.contains(&element_key(3, 1)));
        assert!(range.contains(&attribute_key_with_namespace(3, u16::MAX, u16::MAX)));
        assert!(range.contains(&id_key(3, "zzz")));
        assert!(!range.contains(&element_key(4, 0)));
        assert!(!range.contains(&element_key(2, u16::MAX)));
    }

    #[test]
    fn test_kind_range() {
        let range = KeyRange::collection_kind(3, KeyKind::Attribute);
        assert!(range.contains(&attribute_key(3, 10)));
        assert!(range.contains(&attribute_key_with_namespace(3, 10, 2)));
        assert!(!range.contains(&element_key(3, 10)));
        assert!(!range.contains(&id_key(3, "x")));
    }

    #[test]
    fn test_qname_range() {
        let node: NodeId = "1.3".parse().unwrap();
        let key = qname_key(KeyKind::Element, 4, 0, 12, &node);
        assert!(KeyRange::qname(KeyKind::Element, 4, 0).contains(&key));
        assert!(!KeyRange::qname(KeyKind::Element, 4, 1).contains(&key));
        assert!(!KeyRange::qname(KeyKind::Attribute, 4, 0).contains(&key));
        assert!(key.starts_with(&qname_document_prefix(KeyKind::Element, 4, 0, 12)));
    }

    #[test]
    fn test_qname_keys_follow_document_order() {
        let a: NodeId = "1.2".parse().unwrap();
        let b: NodeId = "1.2.1".parse().unwrap();
        let c: NodeId = "1.3".parse().unwrap();
        let keys: Vec<_> = [&a, &b, &c]
            .iter()
            .map(|n| qname_key(KeyKind::Element, 1, 0, 1, n))
            .collect();
        assert!(keys[0] < keys[1] && keys[1] < keys[2]);
    }

    #[test]
    fn test_document_range() {
        let range = KeyRange::document(8);
        assert!(range.contains(&document_key(8, KeyKind::Element, 1, 0)));
        assert!(!range.contains(&document_key(9, KeyKind::Element, 1, 0)));
    }

    #[test]
    fn test_successor_of_all_ones() {
        let range = KeyRange::collection(u32::MAX);
        assert_eq!(range.end, None);
        assert!(range.contains(&element_key(u32::MAX, 1)));
    }

    fn kind() -> impl Strategy<Value = KeyKind> {
        prop_oneof![Just(KeyKind::Element), Just(KeyKind::Attribute)]
    }

    fn encode(collection: u32, kind: KeyKind, name: u16, namespace: u16) -> Vec<u8> {
        match kind {
            KeyKind::Element => element_key(collection, name),
            _ => attribute_key_with_namespace(collection, name, namespace),
        }
    }

    proptest! {
        #[test]
        fn prop_byte_order_matches_tuple_order(
            a in (any::<u32>(), kind(), any::<u16>(), any::<u16>()),
            b in (any::<u32>(), kind(), any::<u16>(), any::<u16>()),
        ) {
            // element keys carry no namespace
            let norm = |(c, k, n, ns): (u32, KeyKind, u16, u16)| {
                (c, k, n, if k == KeyKind::Element { 0 } else { ns })
            };
            let (a, b) = (norm(a), norm(b));
            let key_a = encode(a.0, a.1, a.2, a.3);
            let key_b = encode(b.0, b.1, b.2, b.3);
            prop_assert_eq!(key_a.cmp(&key_b), a.cmp(&b));
        }

        #[test]
        fn prop_distinct_tuples_distinct_keys(
            c in any::<u32>(),
            n1 in any::<u16>(),
            n2 in any::<u16>(),
            ns in any::<u16>(),
        ) {
            prop_assert_ne!(element_key(c, n1), attribute_key(c, n2));
            prop_assert_ne!(attribute_key(c, n1), attribute_key_with_namespace(c, n2, ns));
            prop_assert_eq!(element_key(c, n1) == element_key(c, n2), n1 == n2);
        }

        #[test]
        fn prop_collection_range_holds_its_keys(c in any::<u32>(), n in any::<u16>(), v in "[a-z]{0,8}") {
            let range = KeyRange::collection(c);
            prop_assert!(range.contains(&element_key(c, n)));
            prop_assert!(range.contains(&attribute_key(c, n)));
            prop_assert!(range.contains(&id_key(c, &v)));
        }
    }
}
