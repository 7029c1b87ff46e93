//! In-memory record store.
//!
//! Documents are kept as pages of framed records. Pages are immutable
//! `Bytes` buffers, so every [`Value`] handed out shares the page instead of
//! copying the record.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, trace};

use super::builder::{BuiltRecord, DocumentBuilder};
use super::{Address, DocumentId, NodeHandle, RecordSource, StorageError, Value};
use crate::config::{LoadOptions, StoreConfig, StreamConfig};
use crate::dom::{Attribute, MemorySymbols, NodeKind, StoredNode, SymbolTable};
use crate::error::{Error, Result};
use crate::numbering::NodeId;
use crate::reader::EmbeddedReader;
use crate::record::{self, AttributeRecord, ElementRecord, LENGTH_FRAME};

/// One page: framed records plus the slot table.
#[derive(Debug, Clone)]
struct Page {
    data: Bytes,
    slots: Vec<std::ops::Range<usize>>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    pages: Vec<Page>,
    index: BTreeMap<NodeId, Address>,
}

impl StoredDocument {
    fn value(&self, address: Address) -> Option<Value> {
        let page = self.pages.get(address.page() as usize)?;
        let range = page.slots.get(address.slot() as usize)?.clone();
        Some(Value {
            page: page.data.clone(),
            range,
            address,
        })
    }

    /// All records in storage order.
    fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.pages.iter().enumerate().flat_map(|(p, page)| {
            page.slots.iter().enumerate().map(move |(s, range)| Value {
                page: page.data.clone(),
                range: range.clone(),
                address: Address::new(p as u32, s as u16),
            })
        })
    }
}

/// Split records into pages; an element and its attributes share a page.
fn pack(records: &[BuiltRecord], page_size: usize) -> Result<StoredDocument> {
    let mut pages = Vec::new();
    let mut index = BTreeMap::new();
    let mut data = Vec::with_capacity(page_size);
    let mut slots = Vec::new();

    let mut i = 0;
    while i < records.len() {
        let group_end = (i + 1 + records[i].attribute_count as usize).min(records.len());
        let group = &records[i..group_end];
        let group_len: usize = group.iter().map(|r| LENGTH_FRAME + r.bytes.len()).sum();

        let full = data.len() + group_len > page_size || slots.len() + group.len() > u16::MAX as usize;
        if !slots.is_empty() && full {
            pages.push(Page {
                data: Bytes::from(std::mem::take(&mut data)),
                slots: std::mem::take(&mut slots),
            });
        }
        for built in group {
            let address = Address::new(pages.len() as u32, slots.len() as u16);
            let start = data.len() + LENGTH_FRAME;
            record::frame(&built.bytes, &mut data)?;
            slots.push(start..data.len());
            index.insert(built.node_id.clone(), address);
        }
        i = group_end;
    }
    if !slots.is_empty() {
        pages.push(Page {
            data: Bytes::from(data),
            slots,
        });
    }
    Ok(StoredDocument { pages, index })
}

/// Decode stored records back into builder form, for repacking.
fn unpack(document: &StoredDocument) -> Result<Vec<BuiltRecord>> {
    document
        .values()
        .map(|value| {
            let bytes = value.bytes();
            let header = record::decode_header(bytes)?;
            let attribute_count = if header.kind == NodeKind::Element {
                ElementRecord::parse(bytes)?.attribute_count()
            } else {
                0
            };
            Ok(BuiltRecord {
                node_id: header.node_id(bytes)?,
                kind: header.kind,
                attribute_count,
                bytes: bytes.to_vec(),
            })
        })
        .collect()
}

/// In-memory storage engine: symbol table plus paged documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: StoreConfig,
    symbols: MemorySymbols,
    documents: BTreeMap<DocumentId, StoredDocument>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        MemoryStore {
            config,
            symbols: MemorySymbols::new(),
            documents: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn symbols(&self) -> &MemorySymbols {
        &self.symbols
    }

    #[inline]
    pub fn symbols_mut(&mut self) -> &mut MemorySymbols {
        &mut self.symbols
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Parse `xml` and store it as `document`.
    pub fn load_str(&mut self, document: DocumentId, xml: &str, options: &LoadOptions) -> Result<()> {
        if self.documents.contains_key(&document) {
            return Err(StorageError::DocumentExists(document).into());
        }
        let records = DocumentBuilder::new(&mut self.symbols, options.clone()).build(xml)?;
        self.insert_records(document, records)
    }

    /// Like [`load_str`](Self::load_str) for UTF-8 bytes.
    pub fn load_bytes(&mut self, document: DocumentId, xml: &[u8], options: &LoadOptions) -> Result<()> {
        let xml = std::str::from_utf8(xml)
            .map_err(|e| Error::load("document is not valid UTF-8", e.valid_up_to()))?;
        self.load_str(document, xml, options)
    }

    /// Store records produced by a [`DocumentBuilder`].
    pub fn insert_records(&mut self, document: DocumentId, records: Vec<BuiltRecord>) -> Result<()> {
        if self.documents.contains_key(&document) {
            return Err(StorageError::DocumentExists(document).into());
        }
        let stored = pack(&records, self.config.page_size)?;
        debug!(
            document,
            records = records.len(),
            pages = stored.pages.len(),
            "document stored"
        );
        self.documents.insert(document, stored);
        Ok(())
    }

    pub fn remove_document(&mut self, document: DocumentId) -> bool {
        self.documents.remove(&document).is_some()
    }

    pub fn documents(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.documents.keys().copied()
    }

    /// Number of pages holding `document`.
    pub fn page_count(&self, document: DocumentId) -> Result<usize> {
        Ok(self.document(document)?.pages.len())
    }

    /// Rewrite a document's pages with a new page size. Addresses issued
    /// before the call may now point at other records; node ids are kept.
    pub fn repack(&mut self, document: DocumentId, page_size: usize) -> Result<()> {
        let records = unpack(self.document(document)?)?;
        let stored = pack(&records, page_size)?;
        debug!(document, page_size, pages = stored.pages.len(), "document repacked");
        self.documents.insert(document, stored);
        Ok(())
    }

    /// Source positioned at the first record of `document`.
    pub fn open(&self, document: DocumentId) -> Result<MemoryRecordSource<'_>> {
        let stored = self.document(document)?;
        Ok(MemoryRecordSource {
            document,
            stored,
            page: 0,
            slot: 0,
            current: None,
            closed: false,
            stats: SeekStats::default(),
        })
    }

    /// Source positioned at `handle`'s record.
    pub fn open_at(&self, handle: &NodeHandle) -> Result<MemoryRecordSource<'_>> {
        let mut source = self.open(handle.document)?;
        source.seek(handle)?;
        Ok(source)
    }

    /// Cursor streaming from `handle`, which is also the cursor's origin.
    pub fn stream(
        &self,
        handle: &NodeHandle,
        config: StreamConfig,
    ) -> Result<EmbeddedReader<'_, MemoryRecordSource<'_>, MemorySymbols>> {
        let source = self.open_at(handle)?;
        Ok(EmbeddedReader::new(source, &self.symbols, config, Some(handle.clone())))
    }

    /// Handle with the node's current address.
    pub fn handle(&self, document: DocumentId, node_id: &NodeId) -> Result<NodeHandle> {
        let address = self
            .document(document)?
            .index
            .get(node_id)
            .copied()
            .ok_or_else(|| StorageError::NodeNotFound {
                document,
                node_id: node_id.clone(),
            })?;
        Ok(NodeHandle::new(document, node_id.clone(), Some(address)))
    }

    /// Handle of the first stored node (the first top-level node).
    pub fn first_handle(&self, document: DocumentId) -> Result<NodeHandle> {
        let stored = self.document(document)?;
        let (node_id, address) = stored
            .index
            .iter()
            .next()
            .ok_or(StorageError::UnknownDocument(document))?;
        Ok(NodeHandle::new(document, node_id.clone(), Some(*address)))
    }

    /// Handle of the document element.
    pub fn root_handle(&self, document: DocumentId) -> Result<NodeHandle> {
        let stored = self.document(document)?;
        for value in stored.values() {
            let header = record::decode_header(value.bytes())?;
            if header.kind == NodeKind::Element {
                let node_id = header.node_id(value.bytes())?;
                return Ok(NodeHandle::new(document, node_id, Some(value.address)));
            }
        }
        Err(Error::malformed_record(format!("document {document} has no element")))
    }

    /// Handles of all elements with local name `local`, in document order.
    pub fn elements_named(&self, document: DocumentId, local: &str) -> Result<Vec<NodeHandle>> {
        let Some(symbol) = self.symbols.name_symbol(local) else {
            return Ok(Vec::new());
        };
        let mut handles = Vec::new();
        for value in self.document(document)?.values() {
            let bytes = value.bytes();
            if record::decode_header(bytes)?.kind != NodeKind::Element {
                continue;
            }
            let element = ElementRecord::parse(bytes)?;
            if element.symbols().0 == symbol {
                handles.push(NodeHandle::new(document, element.node_id()?, Some(value.address)));
            }
        }
        Ok(handles)
    }

    /// Node ids of `document` in document order.
    pub fn node_ids(&self, document: DocumentId) -> Result<Vec<NodeId>> {
        Ok(self.document(document)?.index.keys().cloned().collect())
    }

    /// Record of a node, looked up by id.
    pub fn record(&self, handle: &NodeHandle) -> Result<Value> {
        let stored = self.document(handle.document)?;
        let address = *stored
            .index
            .get(&handle.node_id)
            .ok_or_else(|| StorageError::NodeNotFound {
                document: handle.document,
                node_id: handle.node_id.clone(),
            })?;
        stored
            .value(address)
            .ok_or_else(|| StorageError::InvalidAddress(address).into())
    }

    /// Decoded node, looked up by id.
    pub fn node(&self, handle: &NodeHandle) -> Result<StoredNode> {
        let value = self.record(handle)?;
        StoredNode::decode(value.bytes(), Some(value.address), &self.symbols)
    }

    /// Attributes of an element, read from the element's page.
    pub fn element_attributes(&self, handle: &NodeHandle) -> Result<Vec<Attribute>> {
        let value = self.record(handle)?;
        record::attribute_record_offsets(&value.page, value.range.clone())?
            .into_iter()
            .map(|range| {
                let attr = AttributeRecord::parse(&value.page[range])?;
                Ok(Attribute {
                    node_id: attr.node_id()?,
                    name: attr.qname(&self.symbols)?,
                    value: attr.value()?.to_owned(),
                    attr_type: attr.attr_type(),
                })
            })
            .collect()
    }

    fn document(&self, document: DocumentId) -> std::result::Result<&StoredDocument, StorageError> {
        self.documents
            .get(&document)
            .ok_or(StorageError::UnknownDocument(document))
    }
}

/// How a source was positioned, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekStats {
    pub by_address: usize,
    pub by_node_id: usize,
    pub records_read: usize,
}

/// Sequential reader over one document of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryRecordSource<'s> {
    document: DocumentId,
    stored: &'s StoredDocument,
    page: usize,
    slot: usize,
    current: Option<Address>,
    closed: bool,
    stats: SeekStats,
}

impl MemoryRecordSource<'_> {
    pub fn stats(&self) -> SeekStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn position_at(&mut self, address: Address) {
        self.page = address.page() as usize;
        self.slot = address.slot() as usize;
    }
}

impl RecordSource for MemoryRecordSource<'_> {
    fn next(&mut self) -> std::result::Result<Option<Value>, StorageError> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        while let Some(page) = self.stored.pages.get(self.page) {
            if self.slot < page.slots.len() {
                let address = Address::new(self.page as u32, self.slot as u16);
                let value = Value {
                    page: page.data.clone(),
                    range: page.slots[self.slot].clone(),
                    address,
                };
                self.slot += 1;
                self.current = Some(address);
                self.stats.records_read += 1;
                trace!(%address, "record pulled");
                return Ok(Some(value));
            }
            self.page += 1;
            self.slot = 0;
        }
        Ok(None)
    }

    fn seek(&mut self, target: &NodeHandle) -> std::result::Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if target.document != self.document {
            return Err(StorageError::UnknownDocument(target.document));
        }
        if let Some(address) = target.address {
            if self.stored.value(address).is_some() {
                self.position_at(address);
                self.stats.by_address += 1;
                trace!(%address, "seek by address");
                return Ok(());
            }
        }
        let address = self
            .stored
            .index
            .get(&target.node_id)
            .copied()
            .ok_or_else(|| StorageError::NodeNotFound {
                document: self.document,
                node_id: target.node_id.clone(),
            })?;
        self.position_at(address);
        self.stats.by_node_id += 1;
        trace!(node = %target.node_id, %address, "seek by node id");
        Ok(())
    }

    fn current_address(&self) -> Option<Address> {
        self.current
    }

    fn close(&mut self) -> std::result::Result<(), StorageError> {
        self.closed = true;
        Ok(())
    }
}
