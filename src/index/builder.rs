//! Index Builder
//!
//! Streams one stored document through an [`EmbeddedReader`] and derives
//! its secondary index entries:
//! - structural keys for every element and attribute
//! - qualified-name keys locating each node by document and node id
//! - ID attribute values
//! - term occurrences of text and CDATA nodes

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::keys::{self, CollectionId, KeyKind};
use super::occurrences::OccurrenceList;
use super::terms::terms;
use crate::config::{StreamConfig, StreamScope};
use crate::dom::{AttrType, SymbolTable, NO_NAMESPACE};
use crate::error::{Error, Result};
use crate::numbering::NodeId;
use crate::reader::{EmbeddedReader, StreamEvent};
use crate::storage::{DocumentId, MemoryStore, RecordSource};

/// Index entries of one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    pub document: DocumentId,
    pub collection: CollectionId,
    /// Collection-level element/attribute key per node, in document order
    pub structural: Vec<(Vec<u8>, NodeId)>,
    /// Per-node qualified-name keys, in document order
    pub qnames: Vec<Vec<u8>>,
    /// Qualified names occurring in the document
    pub document_qnames: BTreeSet<Vec<u8>>,
    /// ID attribute keys
    pub ids: Vec<(Vec<u8>, NodeId)>,
    /// Sorted occurrences per term
    pub terms: BTreeMap<String, OccurrenceList>,
}

/// Summary of one term's occurrences in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPosting {
    pub term: String,
    /// Number of nodes containing the term
    pub term_count: usize,
    /// Occurrences per node, in document order
    pub occurrences: Vec<(NodeId, usize)>,
}

impl DocumentIndex {
    fn new(document: DocumentId, collection: CollectionId) -> Self {
        DocumentIndex {
            document,
            collection,
            ..Default::default()
        }
    }

    /// Nodes indexed under a collection-level key.
    pub fn nodes_for<'a>(&'a self, key: &'a [u8]) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.structural
            .iter()
            .filter(move |(k, _)| k.as_slice() == key)
            .map(|(_, node)| node)
    }

    /// Element carrying an ID attribute with `value`.
    pub fn node_with_id(&self, value: &str) -> Option<&NodeId> {
        let key = keys::id_key(self.collection, value);
        self.ids.iter().find(|(k, _)| *k == key).map(|(_, node)| node)
    }

    pub fn posting(&self, term: &str) -> Option<TermPosting> {
        let list = self.terms.get(term)?;
        Some(TermPosting {
            term: term.to_owned(),
            term_count: list.term_count(),
            occurrences: list
                .runs()
                .map(|run| (run.node_id.clone(), run.count))
                .collect(),
        })
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn add_node(&mut self, kind: KeyKind, name: u16, namespace: u16, node_id: NodeId) {
        let key = match kind {
            KeyKind::Attribute if namespace != NO_NAMESPACE => {
                keys::attribute_key_with_namespace(self.collection, name, namespace)
            }
            KeyKind::Attribute => keys::attribute_key(self.collection, name),
            _ => keys::element_key(self.collection, name),
        };
        self.qnames
            .push(keys::qname_key(kind, name, namespace, self.document, &node_id));
        self.document_qnames
            .insert(keys::document_key(self.document, kind, name, namespace));
        self.structural.push((key, node_id));
    }

    fn add_text(&mut self, text: &str, node_id: &NodeId) {
        for term in terms(text) {
            self.terms
                .entry(term.text)
                .or_default()
                .add(node_id.clone(), term.offset);
        }
    }
}

/// Builds [`DocumentIndex`]es for documents of one collection.
#[derive(Debug, Clone, Copy)]
pub struct IndexBuilder {
    collection: CollectionId,
}

impl IndexBuilder {
    pub fn new(collection: CollectionId) -> Self {
        IndexBuilder { collection }
    }

    /// Stream `document` from its first node and index it.
    pub fn build(&self, store: &MemoryStore, document: DocumentId) -> Result<DocumentIndex> {
        let first = store.first_handle(document)?;
        let config = StreamConfig::default()
            .with_report_attributes(true)
            .with_scope(StreamScope::Document);
        let mut reader = store.stream(&first, config)?;
        self.build_from(document, &mut reader)
    }

    /// Index everything `reader` still yields. Attribute reporting must be
    /// enabled for attributes to be indexed.
    pub fn build_from<R, S>(
        &self,
        document: DocumentId,
        reader: &mut EmbeddedReader<'_, R, S>,
    ) -> Result<DocumentIndex>
    where
        R: RecordSource,
        S: SymbolTable + ?Sized,
    {
        let mut index = DocumentIndex::new(document, self.collection);
        // owner of the attributes being reported
        let mut element: Option<NodeId> = None;
        while reader.has_next() {
            let event = reader.next_event()?;
            match event {
                StreamEvent::StartElement => {
                    let node_id = current_node_id(reader, event)?;
                    let (name, namespace) = reader.name_symbols()?;
                    element = Some(node_id.clone());
                    index.add_node(KeyKind::Element, name, namespace, node_id);
                }
                StreamEvent::Attribute => {
                    let node_id = current_node_id(reader, event)?;
                    let (name, namespace) = reader.name_symbols()?;
                    let attribute = reader.current_attribute()?;
                    if attribute.attr_type == AttrType::Id {
                        let owner = element.clone().unwrap_or_else(|| node_id.clone());
                        index
                            .ids
                            .push((keys::id_key(self.collection, &attribute.value), owner));
                    }
                    index.add_node(KeyKind::Attribute, name, namespace, node_id);
                }
                StreamEvent::Characters | StreamEvent::CData => {
                    let node_id = current_node_id(reader, event)?;
                    index.add_text(reader.text()?, &node_id);
                }
                _ => {}
            }
        }
        for list in index.terms.values_mut() {
            list.sort();
        }
        debug!(
            document,
            nodes = index.structural.len(),
            terms = index.terms.len(),
            "document indexed"
        );
        Ok(index)
    }
}

fn current_node_id<R, S>(reader: &EmbeddedReader<'_, R, S>, event: StreamEvent) -> Result<NodeId>
where
    R: RecordSource,
    S: SymbolTable + ?Sized,
{
    reader.node_id().cloned().ok_or(Error::InvalidState {
        operation: "index",
        state: event,
    })
}
