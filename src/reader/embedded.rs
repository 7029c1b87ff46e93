//! Embedded Stream Reader
//!
//! Pull cursor over node records supplied by a [`RecordSource`]. Only the
//! current record and one frame per open element are held; names,
//! attributes and namespace declarations are decoded when first asked for
//! and dropped when the cursor advances.

use lru::LruCache;
use tracing::{debug, trace, warn};

use super::events::StreamEvent;
use crate::config::{StreamConfig, StreamScope};
use crate::dom::{Attribute, NamespaceDecl, NodeKind, QName, StoredNode, SymbolTable};
use crate::error::{Error, Result};
use crate::numbering::NodeId;
use crate::record::{self, AttributeRecord, CharacterRecord, ElementRecord, PiRecord};
use crate::storage::{Address, NodeHandle, RecordSource, StorageError, Value};

/// Property name under which [`EmbeddedReader::property`] reports the
/// current node identifier.
pub const PROPERTY_NODE_ID: &str = "node-id";

/// Re-seeks by node identifier after the first record read from an origin
/// turns out to be a different node.
pub const MAX_RESYNC_ATTEMPTS: usize = 1;

/// An open element.
#[derive(Debug)]
struct ElementFrame {
    record: Value,
    node_id: NodeId,
    /// Records owned by the element: attributes plus direct children
    child_count: u32,
    consumed: u32,
}

/// Values decoded from the current record on first access.
#[derive(Debug, Default)]
struct NodeCache {
    name: Option<QName>,
    attributes: Option<Vec<Attribute>>,
    namespaces: Option<Vec<NamespaceDecl>>,
}

impl NodeCache {
    #[inline]
    fn clear(&mut self) {
        *self = NodeCache::default();
    }
}

/// Streaming cursor over stored node records.
///
/// Events are pulled with [`next_event`](Self::next_event) while
/// [`has_next`](Self::has_next) holds. Where the stream ends depends on
/// [`StreamScope`].
pub struct EmbeddedReader<'s, R: RecordSource, S: SymbolTable + ?Sized> {
    source: R,
    symbols: &'s S,
    config: StreamConfig,
    state: StreamEvent,
    origin: Option<NodeHandle>,
    verify_pending: bool,
    current: Option<Value>,
    previous: Option<Value>,
    node_id: Option<NodeId>,
    stack: Vec<ElementFrame>,
    /// No element has been read since the start of the stream
    before_root: bool,
    /// Record read ahead while no element is open (document scope)
    lookahead: Option<Option<Value>>,
    /// Attribute records of the current element were read from the source
    attributes_pulled: bool,
    cache: NodeCache,
    names: LruCache<(u16, u16), QName>,
    /// A malformed record or failed resync ended the stream
    failed: bool,
    closed: bool,
}

impl<'s, R: RecordSource, S: SymbolTable + ?Sized> EmbeddedReader<'s, R, S> {
    /// Wrap a source already positioned at the first record to stream.
    ///
    /// With an `origin`, the first record read must be that node; a
    /// mismatch means the handle's address was stale and triggers a
    /// re-seek by identifier.
    pub fn new(source: R, symbols: &'s S, config: StreamConfig, origin: Option<NodeHandle>) -> Self {
        let names = LruCache::new(config.name_cache_capacity);
        EmbeddedReader {
            source,
            symbols,
            config,
            state: StreamEvent::StartDocument,
            verify_pending: origin.is_some(),
            origin,
            current: None,
            previous: None,
            node_id: None,
            stack: Vec::new(),
            before_root: true,
            lookahead: None,
            attributes_pulled: false,
            cache: NodeCache::default(),
            names,
            failed: false,
            closed: false,
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn has_next(&self) -> bool {
        if self.closed || self.failed {
            return false;
        }
        match self.state {
            StreamEvent::StartDocument => true,
            StreamEvent::EndDocument => false,
            _ if !self.stack.is_empty() => true,
            _ => match self.config.scope {
                StreamScope::Subtree => self.before_root,
                StreamScope::Document => matches!(self.lookahead, Some(Some(_))),
            },
        }
    }

    /// Advance to the next event.
    ///
    /// After a malformed record or a failed resync the stream is over until
    /// [`reposition`](Self::reposition).
    pub fn next_event(&mut self) -> Result<StreamEvent> {
        let result = self.advance();
        if let Err(err) = &result {
            if is_fatal(err) {
                debug!(%err, "cursor stopped");
                self.failed = true;
                self.stack.clear();
                self.lookahead = None;
            }
        }
        result
    }

    fn advance(&mut self) -> Result<StreamEvent> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }
        if !self.has_next() {
            return Err(Error::NoMoreEvents);
        }
        if self.state != StreamEvent::EndElement {
            self.previous = self.current.clone();
        }
        if self.state == StreamEvent::StartElement
            && !self.config.report_attributes
            && !self.attributes_pulled
        {
            self.skip_attributes()?;
        }

        if let Some(frame) = self.stack.last_mut() {
            if frame.consumed == frame.child_count {
                return self.end_element();
            }
            frame.consumed += 1;
        }

        let first = self.state == StreamEvent::StartDocument;
        let pulled = match self.lookahead.take() {
            Some(ahead) => ahead,
            None => self.source.next()?,
        };
        let Some(value) = pulled else {
            if let Some(frame) = self.stack.last() {
                return Err(Error::malformed_record(format!(
                    "record source ended inside element {}",
                    frame.node_id
                )));
            }
            self.state = StreamEvent::EndDocument;
            self.current = None;
            self.node_id = None;
            self.cache.clear();
            return Ok(self.state);
        };

        self.init_node(value)?;
        if first && self.verify_pending {
            self.verify_pending = false;
            self.verify_origin()?;
        }
        self.prefetch()?;
        Ok(self.state)
    }

    /// Iterator over the remaining events. Stops after the first error.
    pub fn events(&mut self) -> Events<'_, 's, R, S> {
        Events {
            reader: self,
            failed: false,
        }
    }

    /// Advance until `accept` rejects the current event or the stream ends.
    pub fn filter<F>(&mut self, mut accept: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<bool>,
    {
        while self.has_next() {
            self.next_event()?;
            if !accept(self)? {
                break;
            }
        }
        Ok(())
    }

    /// Restart the stream at `handle`.
    ///
    /// The first record read must be `handle`'s node, otherwise the source
    /// is re-seeked by identifier once.
    pub fn reposition(&mut self, handle: NodeHandle, report_attributes: bool) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }
        self.source.seek(&handle)?;
        self.reset();
        self.config.report_attributes = report_attributes;
        debug!(node = %handle.node_id, address = ?handle.address, "cursor repositioned");
        self.origin = Some(handle);
        self.verify_pending = true;
        Ok(())
    }

    /// Release the source. Further calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stack.clear();
        self.lookahead = None;
        self.cache.clear();
        debug!("cursor closed");
        self.source.close()?;
        Ok(())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Current node
    // ========================================================================

    #[inline]
    pub fn event(&self) -> StreamEvent {
        self.state
    }

    /// Number of open elements.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    /// Named property of the current node. Only [`PROPERTY_NODE_ID`] is known.
    pub fn property(&self, name: &str) -> Option<&NodeId> {
        if name == PROPERTY_NODE_ID {
            self.node_id()
        } else {
            None
        }
    }

    /// Element or attribute name.
    pub fn name(&mut self) -> Result<&QName> {
        self.require(
            "name",
            &[
                StreamEvent::StartElement,
                StreamEvent::EndElement,
                StreamEvent::Attribute,
            ],
        )?;
        let name = match self.cache.name.take() {
            Some(name) => name,
            None => self.decode_name()?,
        };
        Ok(&*self.cache.name.insert(name))
    }

    /// (name symbol, namespace symbol) of the current element or attribute.
    pub fn name_symbols(&self) -> Result<(u16, u16)> {
        let value = self.current_value("name_symbols")?;
        match self.state {
            StreamEvent::StartElement | StreamEvent::EndElement => {
                Ok(ElementRecord::parse(value.bytes())?.symbols())
            }
            StreamEvent::Attribute => Ok(AttributeRecord::parse(value.bytes())?.symbols()),
            state => Err(Error::InvalidState {
                operation: "name_symbols",
                state,
            }),
        }
    }

    /// Character content: text, CDATA, comment, attribute value or PI data.
    pub fn text(&self) -> Result<&str> {
        let value = self.current_value("text")?;
        match self.state {
            StreamEvent::Characters | StreamEvent::CData | StreamEvent::Comment => {
                CharacterRecord::parse(value.bytes())?.text()
            }
            StreamEvent::Attribute => AttributeRecord::parse(value.bytes())?.value(),
            StreamEvent::ProcessingInstruction => PiRecord::parse(value.bytes())?.data(),
            state => Err(Error::InvalidState {
                operation: "text",
                state,
            }),
        }
    }

    pub fn pi_target(&self) -> Result<&str> {
        self.require("pi_target", &[StreamEvent::ProcessingInstruction])?;
        PiRecord::parse(self.current_value("pi_target")?.bytes())?.target()
    }

    pub fn pi_data(&self) -> Result<&str> {
        self.require("pi_data", &[StreamEvent::ProcessingInstruction])?;
        PiRecord::parse(self.current_value("pi_data")?.bytes())?.data()
    }

    pub fn attribute_count(&self) -> Result<u16> {
        self.require("attribute_count", &[StreamEvent::StartElement])?;
        Ok(ElementRecord::parse(self.current_value("attribute_count")?.bytes())?.attribute_count())
    }

    /// Attributes of the current element.
    ///
    /// Read from the element's page when the attribute records follow it
    /// there; otherwise pulled from the source, in which case they are not
    /// reported as ATTRIBUTE events afterwards.
    pub fn attributes(&mut self) -> Result<&[Attribute]> {
        self.require("attributes", &[StreamEvent::StartElement])?;
        let attributes = match self.cache.attributes.take() {
            Some(attributes) => attributes,
            None => self.read_attributes()?,
        };
        Ok(self.cache.attributes.insert(attributes).as_slice())
    }

    /// Value of the attribute with local name `local`.
    pub fn attribute_value(&mut self, local: &str) -> Result<Option<&str>> {
        Ok(self
            .attributes()?
            .iter()
            .find(|a| a.name.local == local)
            .map(|a| a.value.as_str()))
    }

    /// The attribute at an ATTRIBUTE event.
    pub fn current_attribute(&mut self) -> Result<Attribute> {
        self.require("current_attribute", &[StreamEvent::Attribute])?;
        let value = self.current_value("current_attribute")?.clone();
        self.decode_attribute(value.bytes())
    }

    pub fn namespace_count(&mut self) -> Result<usize> {
        Ok(self.namespaces()?.len())
    }

    /// Prefix of the `index`th declaration, `""` for the default namespace.
    pub fn namespace_prefix(&mut self, index: usize) -> Result<Option<&str>> {
        Ok(self.namespaces()?.get(index).map(|d| d.prefix.as_str()))
    }

    pub fn namespace_uri(&mut self, index: usize) -> Result<Option<&str>> {
        Ok(self.namespaces()?.get(index).map(|d| d.uri.as_str()))
    }

    /// Namespace declarations of the current element.
    pub fn namespaces(&mut self) -> Result<&[NamespaceDecl]> {
        self.require(
            "namespaces",
            &[StreamEvent::StartElement, StreamEvent::EndElement],
        )?;
        let decls = match self.cache.namespaces.take() {
            Some(decls) => decls,
            None => ElementRecord::parse(self.current_value("namespaces")?.bytes())?
                .namespace_decls(self.symbols)?,
        };
        Ok(self.cache.namespaces.insert(decls).as_slice())
    }

    /// Text content of the current element, leaving the cursor on its END.
    ///
    /// Comments and processing instructions are skipped; a child element is
    /// an error.
    pub fn element_text(&mut self) -> Result<String> {
        self.require("element_text", &[StreamEvent::StartElement])?;
        let mut content = String::new();
        loop {
            match self.next_event()? {
                StreamEvent::EndElement => return Ok(content),
                StreamEvent::Characters | StreamEvent::CData => content.push_str(self.text()?),
                StreamEvent::Comment
                | StreamEvent::ProcessingInstruction
                | StreamEvent::Attribute => {}
                state => {
                    return Err(Error::InvalidState {
                        operation: "element_text",
                        state,
                    })
                }
            }
        }
    }

    /// Decoded copy of the current node.
    pub fn node(&self) -> Result<StoredNode> {
        let value = self.current_value("node")?;
        StoredNode::decode(value.bytes(), Some(value.address), self.symbols)
    }

    /// Node read before the current one. END events do not move it.
    pub fn previous_node(&self) -> Result<Option<StoredNode>> {
        self.previous
            .as_ref()
            .map(|value| StoredNode::decode(value.bytes(), Some(value.address), self.symbols))
            .transpose()
    }

    /// Storage address of the current record.
    #[inline]
    pub fn current_position(&self) -> Option<Address> {
        self.current.as_ref().map(|value| value.address)
    }

    /// Node the stream was started at, with its address refreshed once the
    /// first record has been checked.
    #[inline]
    pub fn origin(&self) -> Option<&NodeHandle> {
        self.origin.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    #[inline]
    pub fn source(&self) -> &R {
        &self.source
    }

    #[inline]
    pub fn source_mut(&mut self) -> &mut R {
        &mut self.source
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require(&self, operation: &'static str, allowed: &[StreamEvent]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn current_value(&self, operation: &'static str) -> Result<&Value> {
        self.current.as_ref().ok_or(Error::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn reset(&mut self) {
        self.state = StreamEvent::StartDocument;
        self.stack.clear();
        self.current = None;
        self.previous = None;
        self.node_id = None;
        self.before_root = true;
        self.lookahead = None;
        self.attributes_pulled = false;
        self.failed = false;
        self.cache.clear();
    }

    fn init_node(&mut self, value: Value) -> Result<()> {
        let header = record::decode_header(value.bytes())?;
        let node_id = header.node_id(value.bytes())?;
        self.state = StreamEvent::for_kind(header.kind);
        if header.kind == NodeKind::Element {
            self.stack.push(ElementFrame {
                record: value.clone(),
                node_id: node_id.clone(),
                child_count: header.child_count,
                consumed: 0,
            });
            self.before_root = false;
        }
        trace!(node = %node_id, event = %self.state, "record read");
        self.current = Some(value);
        self.node_id = Some(node_id);
        self.attributes_pulled = false;
        self.cache.clear();
        Ok(())
    }

    fn end_element(&mut self) -> Result<StreamEvent> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| Error::malformed_record("no open element to end"))?;
        self.state = StreamEvent::EndElement;
        self.current = Some(frame.record);
        self.node_id = Some(frame.node_id);
        self.cache.clear();
        self.prefetch()?;
        Ok(self.state)
    }

    /// In document scope, read ahead once no element is open so that
    /// `has_next` knows whether the source is exhausted.
    fn prefetch(&mut self) -> Result<()> {
        if self.config.scope == StreamScope::Document
            && self.stack.is_empty()
            && self.lookahead.is_none()
        {
            self.lookahead = Some(self.source.next()?);
        }
        Ok(())
    }

    fn verify_origin(&mut self) -> Result<()> {
        let Some(mut origin) = self.origin.take() else {
            return Ok(());
        };
        let result = self.resync(&mut origin);
        self.origin = Some(origin);
        result
    }

    fn resync(&mut self, origin: &mut NodeHandle) -> Result<()> {
        let mut attempts = 0;
        loop {
            if self.node_id.as_ref() == Some(&origin.node_id) {
                origin.address = self.current_position();
                return Ok(());
            }
            if attempts == MAX_RESYNC_ATTEMPTS {
                return Err(Error::AddressResyncFailed {
                    expected: origin.node_id.clone(),
                    found: self.node_id.clone(),
                });
            }
            attempts += 1;
            warn!(
                expected = %origin.node_id,
                found = ?self.node_id,
                "stale node address, re-seeking by node id"
            );
            origin.address = None;
            self.source.seek(origin)?;
            self.reset();
            if let Some(value) = self.source.next()? {
                self.init_node(value)?;
            }
        }
    }

    /// Pull one record owned by the innermost open element.
    fn pull_child(&mut self) -> Result<Value> {
        let value = self
            .source
            .next()?
            .ok_or_else(|| Error::malformed_record("record source ended inside an element"))?;
        if let Some(frame) = self.stack.last_mut() {
            frame.consumed += 1;
        }
        Ok(value)
    }

    fn skip_attributes(&mut self) -> Result<()> {
        for _ in 0..self.attribute_count()? {
            let value = self.pull_child()?;
            if record::decode_header(value.bytes())?.kind != NodeKind::Attribute {
                return Err(Error::malformed_record("element is followed by too few attributes"));
            }
        }
        self.attributes_pulled = true;
        Ok(())
    }

    fn read_attributes(&mut self) -> Result<Vec<Attribute>> {
        let value = self.current_value("attributes")?.clone();
        match record::attribute_record_offsets(&value.page, value.range.clone()) {
            Ok(ranges) => ranges
                .into_iter()
                .map(|range| self.decode_attribute(&value.page[range]))
                .collect(),
            Err(err) => {
                trace!(%err, "attributes not on the element's page, reading them from the source");
                self.pull_attributes()
            }
        }
    }

    fn pull_attributes(&mut self) -> Result<Vec<Attribute>> {
        let count = self.attribute_count()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let value = self.pull_child()?;
            attributes.push(self.decode_attribute(value.bytes())?);
        }
        self.attributes_pulled = true;
        Ok(attributes)
    }

    fn decode_attribute(&mut self, bytes: &[u8]) -> Result<Attribute> {
        let attr = AttributeRecord::parse(bytes)?;
        let (name, namespace) = attr.symbols();
        let prefix = attr.prefix()?.map(str::to_owned);
        Ok(Attribute {
            node_id: attr.node_id()?,
            name: self.resolve_name(name, namespace, prefix)?,
            value: attr.value()?.to_owned(),
            attr_type: attr.attr_type(),
        })
    }

    fn decode_name(&mut self) -> Result<QName> {
        let value = self.current_value("name")?;
        let (name, namespace, prefix) = if self.state == StreamEvent::Attribute {
            let attr = AttributeRecord::parse(value.bytes())?;
            let (name, namespace) = attr.symbols();
            (name, namespace, attr.prefix()?.map(str::to_owned))
        } else {
            let element = ElementRecord::parse(value.bytes())?;
            let (name, namespace) = element.symbols();
            (name, namespace, element.prefix()?.map(str::to_owned))
        };
        self.resolve_name(name, namespace, prefix)
    }

    fn resolve_name(&mut self, name: u16, namespace: u16, prefix: Option<String>) -> Result<QName> {
        let cached = self.names.get(&(name, namespace)).cloned();
        let mut qname = match cached {
            Some(qname) => qname,
            None => {
                let local = self.symbols.name(name).ok_or(Error::UnknownSymbol(name))?;
                let uri = self
                    .symbols
                    .namespace(namespace)
                    .ok_or(Error::UnknownSymbol(namespace))?;
                let qname = QName::with_namespace(local, uri, None);
                self.names.put((name, namespace), qname.clone());
                qname
            }
        };
        qname.prefix = prefix;
        Ok(qname)
    }
}

fn is_fatal(err: &Error) -> bool {
    matches!(
        err,
        Error::AddressResyncFailed { .. } | Error::MalformedRecord(_) | Error::MalformedIdentifier(_)
    )
}

impl<R: RecordSource, S: SymbolTable + ?Sized> Drop for EmbeddedReader<'_, R, S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(%err, "closing record source failed");
        }
    }
}

/// Iterator returned by [`EmbeddedReader::events`].
pub struct Events<'r, 's, R: RecordSource, S: SymbolTable + ?Sized> {
    reader: &'r mut EmbeddedReader<'s, R, S>,
    failed: bool,
}

impl<R: RecordSource, S: SymbolTable + ?Sized> Iterator for Events<'_, '_, R, S> {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.reader.has_next() {
            return None;
        }
        let event = self.reader.next_event();
        self.failed = event.is_err();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;
    use crate::config::LoadOptions;
    use crate::dom::MemorySymbols;
    use crate::storage::{MemoryRecordSource, MemoryStore};
    use StreamEvent::{
        CData, Characters, Comment, EndDocument, EndElement, ProcessingInstruction, StartDocument,
        StartElement,
    };

    type TestReader<'s> = EmbeddedReader<'s, MemoryRecordSource<'s>, MemorySymbols>;

    const SECTION: &str = "<section><para>01234</para><para>56789</para></section>";

    const MIXED_XML: &str = "<!-- 1 -->\n\
        <x>\n  \
        <!-- x.1 -->\n  \
        <y1>text1<z1/><!-- y.1 --></y1>\n  \
        <!-- x.2 -->\n  \
        <y2>text2<z2/><!-- y.2 --></y2>\n  \
        <!-- x.3 -->\n\
        </x>\n\
        <!-- 2 -->";

    fn load(xml: &str, options: LoadOptions) -> MemoryStore {
        let mut store = MemoryStore::default();
        store.load_str(1, xml, &options).unwrap();
        store
    }

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    fn labelled(reader: &mut TestReader<'_>) -> Vec<String> {
        let mut out = Vec::new();
        while reader.has_next() {
            let event = reader.next_event().unwrap();
            let label = match event {
                StartElement | EndElement | StreamEvent::Attribute => format!("{event}({})", reader.name().unwrap()),
                Characters => format!("{event}({})", reader.text().unwrap()),
                _ => event.to_string(),
            };
            out.push(label);
        }
        out
    }

    /// Events until the current node leaves `container`, if given.
    fn read_all(reader: &mut TestReader<'_>, container: Option<&NodeId>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while reader.has_next() {
            let event = reader.next_event().unwrap();
            if let Some(container) = container {
                let inside = reader
                    .property(PROPERTY_NODE_ID)
                    .is_some_and(|node| node.is_descendant_or_self_of(container));
                if !inside {
                    break;
                }
            }
            events.push(event);
        }
        events
    }

    #[test]
    fn test_section_events() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        assert_eq!(
            labelled(&mut reader),
            vec![
                "START_ELEMENT(section)",
                "START_ELEMENT(para)",
                "CHARACTERS(01234)",
                "END_ELEMENT(para)",
                "START_ELEMENT(para)",
                "CHARACTERS(56789)",
                "END_ELEMENT(para)",
                "END_ELEMENT(section)",
            ]
        );
        assert!(!reader.has_next());
        assert!(matches!(reader.next_event(), Err(Error::NoMoreEvents)));
    }

    #[test]
    fn test_reposition_to_second_para() {
        let store = load(SECTION, LoadOptions::default());
        let mut reader: TestReader<'_> =
            EmbeddedReader::new(store.open(1).unwrap(), store.symbols(), StreamConfig::default(), None);
        assert_eq!(reader.next_event().unwrap(), StartElement);

        let para = store.handle(1, &id("1.2")).unwrap();
        reader.reposition(para, false).unwrap();
        assert_eq!(reader.event(), StartDocument);
        assert_eq!(reader.next_event().unwrap(), StartElement);
        assert_eq!(reader.name().unwrap().local, "para");
        assert_eq!(reader.element_text().unwrap(), "56789");
        assert_eq!(reader.event(), EndElement);
        assert!(!reader.has_next());
        assert_eq!(reader.source().stats().by_node_id, 0);
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_stale_address_resyncs_once() {
        let store = load(SECTION, LoadOptions::default());
        let first_para = store.handle(1, &id("1.1")).unwrap();
        let current = store.handle(1, &id("1.2")).unwrap();
        let stale = NodeHandle::new(1, id("1.2"), first_para.address);

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        tracing::subscriber::with_default(subscriber, || {
            let mut reader = store.stream(&stale, StreamConfig::default()).unwrap();
            assert_eq!(reader.next_event().unwrap(), StartElement);
            assert_eq!(reader.node_id(), Some(&id("1.2")));
            assert_eq!(reader.source().stats().by_address, 1);
            assert_eq!(reader.source().stats().by_node_id, 1);
            assert_eq!(reader.origin().unwrap().address, current.address);
            assert_eq!(reader.current_position(), current.address);
            assert!(reader.previous_node().unwrap().is_none());
            assert_eq!(reader.element_text().unwrap(), "56789");
            assert!(!reader.has_next());
        });
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repacked_document_found_by_id() {
        let mut store = load(SECTION, LoadOptions::default());
        let before = store.handle(1, &id("1.2")).unwrap();
        store.repack(1, 16).unwrap();
        let mut reader = store.stream(&before, StreamConfig::default()).unwrap();
        assert_eq!(reader.next_event().unwrap(), StartElement);
        assert_eq!(reader.element_text().unwrap(), "56789");
        assert_eq!(reader.source().stats().by_node_id, 1);
    }

    /// Sends every seek to the same node.
    struct Misrouting<'s> {
        inner: MemoryRecordSource<'s>,
        decoy: NodeHandle,
    }

    impl RecordSource for Misrouting<'_> {
        fn next(&mut self) -> std::result::Result<Option<Value>, StorageError> {
            self.inner.next()
        }

        fn seek(&mut self, _target: &NodeHandle) -> std::result::Result<(), StorageError> {
            self.inner.seek(&self.decoy)
        }

        fn current_address(&self) -> Option<Address> {
            self.inner.current_address()
        }

        fn close(&mut self) -> std::result::Result<(), StorageError> {
            self.inner.close()
        }
    }

    #[test]
    fn test_second_mismatch_is_fatal() {
        let store = load(SECTION, LoadOptions::default());
        let decoy = store.handle(1, &id("1.1")).unwrap();
        let source = Misrouting {
            inner: store.open_at(&decoy).unwrap(),
            decoy,
        };
        let target = NodeHandle::new(1, id("1.2"), None);
        let mut reader =
            EmbeddedReader::new(source, store.symbols(), StreamConfig::default(), Some(target));
        match reader.next_event() {
            Err(Error::AddressResyncFailed { expected, found }) => {
                assert_eq!(expected, id("1.2"));
                assert_eq!(found, Some(id("1.1")));
            }
            other => panic!("expected resync failure, got {other:?}"),
        }
        assert!(!reader.has_next());
        assert_eq!(reader.depth(), 0);
        assert!(reader.events().next().is_none());
        assert!(matches!(reader.next_event(), Err(Error::NoMoreEvents)));
    }

    #[test]
    fn test_mixed_from_first_child_document_scope() {
        let store = load(MIXED_XML, LoadOptions::preserve_whitespace());
        let first = store.first_handle(1).unwrap();
        let config = StreamConfig::default().with_scope(StreamScope::Document);
        let mut reader = store.stream(&first, config).unwrap();
        let events = read_all(&mut reader, None);
        assert_eq!(
            events,
            vec![
                Comment, StartElement, Characters, Comment, Characters, StartElement, Characters,
                StartElement, EndElement, Comment, EndElement, Characters, Comment, Characters,
                StartElement, Characters, StartElement, EndElement, Comment, EndElement,
                Characters, Comment, Characters, EndElement, Comment,
            ]
        );
        assert_eq!(reader.text().unwrap(), " 2 ");
    }

    #[test]
    fn test_mixed_subtrees() {
        let store = load(MIXED_XML, LoadOptions::preserve_whitespace());
        let x = store.root_handle(1).unwrap();
        let mut reader = store.stream(&x, StreamConfig::default()).unwrap();
        assert_eq!(
            read_all(&mut reader, None),
            vec![
                StartElement, Characters, Comment, Characters, StartElement, Characters,
                StartElement, EndElement, Comment, EndElement, Characters, Comment, Characters,
                StartElement, Characters, StartElement, EndElement, Comment, EndElement,
                Characters, Comment, Characters, EndElement,
            ]
        );

        for name in ["y1", "y2"] {
            let handle = &store.elements_named(1, name).unwrap()[0];
            let mut reader = store.stream(handle, StreamConfig::default()).unwrap();
            assert_eq!(
                read_all(&mut reader, Some(&handle.node_id)),
                vec![StartElement, Characters, StartElement, EndElement, Comment, EndElement],
                "{name}"
            );
        }
        for name in ["z1", "z2"] {
            let handle = &store.elements_named(1, name).unwrap()[0];
            let mut reader = store.stream(handle, StreamConfig::default()).unwrap();
            assert_eq!(read_all(&mut reader, None), vec![StartElement, EndElement], "{name}");
        }
    }

    #[test]
    fn test_mixed_following_nodes_inside_container() {
        let store = load(MIXED_XML, LoadOptions::preserve_whitespace());
        let x = store.root_handle(1).unwrap();
        let config = StreamConfig::default().with_scope(StreamScope::Document);

        let first_child = store.handle(1, &x.node_id.child(1)).unwrap();
        let mut reader = store.stream(&first_child, config.clone()).unwrap();
        let events = read_all(&mut reader, Some(&x.node_id));
        assert_eq!(events.len(), 21);
        assert_eq!(events.first(), Some(&Characters));
        assert_eq!(events.last(), Some(&Characters));

        let y1 = &store.elements_named(1, "y1").unwrap()[0];
        let mut reader = store.stream(y1, config).unwrap();
        let events = read_all(&mut reader, Some(&x.node_id));
        assert_eq!(events.len(), 18);
        assert_eq!(events[..6], [StartElement, Characters, StartElement, EndElement, Comment, EndElement]);
    }

    #[test]
    fn test_end_document_before_root() {
        let store = load(MIXED_XML, LoadOptions::preserve_whitespace());
        let last = store.handle(1, &id("3")).unwrap();
        let mut reader = store.stream(&last, StreamConfig::default()).unwrap();
        assert_eq!(reader.next_event().unwrap(), Comment);
        assert!(reader.has_next());
        assert_eq!(reader.next_event().unwrap(), EndDocument);
        assert!(!reader.has_next());
        assert!(reader.node_id().is_none());
    }

    /// Stops after `remaining` records.
    struct Truncated<'s> {
        inner: MemoryRecordSource<'s>,
        remaining: usize,
    }

    impl RecordSource for Truncated<'_> {
        fn next(&mut self) -> std::result::Result<Option<Value>, StorageError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.inner.next()
        }

        fn seek(&mut self, target: &NodeHandle) -> std::result::Result<(), StorageError> {
            self.inner.seek(target)
        }

        fn current_address(&self) -> Option<Address> {
            self.inner.current_address()
        }

        fn close(&mut self) -> std::result::Result<(), StorageError> {
            self.inner.close()
        }
    }

    #[test]
    fn test_source_ending_inside_element() {
        let store = load(SECTION, LoadOptions::default());
        let source = Truncated {
            inner: store.open(1).unwrap(),
            remaining: 3,
        };
        let mut reader = EmbeddedReader::new(source, store.symbols(), StreamConfig::default(), None);
        let events: Vec<_> = reader.events().collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[3], Ok(EndElement)));
        assert!(matches!(events[4], Err(Error::MalformedRecord(_))));
        assert!(!reader.has_next());
        assert!(matches!(reader.next_event(), Err(Error::NoMoreEvents)));

        let root = store.root_handle(1).unwrap();
        reader.source_mut().remaining = usize::MAX;
        reader.reposition(root, false).unwrap();
        assert!(reader.has_next());
        assert_eq!(reader.next_event().unwrap(), StartElement);
    }

    #[test]
    fn test_storage_errors_pass_through() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        reader.next_event().unwrap();
        reader.source_mut().close().unwrap();
        assert!(matches!(reader.next_event(), Err(Error::Storage(StorageError::Closed))));

        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        let missing = NodeHandle::new(1, id("1.9"), None);
        assert!(matches!(
            reader.reposition(missing, false),
            Err(Error::Storage(StorageError::NodeNotFound { .. }))
        ));
    }

    const ATTRS: &str = r#"<r><e a="1" b="2">x</e></r>"#;

    #[test]
    fn test_attribute_reporting() {
        let store = load(ATTRS, LoadOptions::default());
        let root = store.root_handle(1).unwrap();

        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        assert_eq!(
            labelled(&mut reader),
            vec!["START_ELEMENT(r)", "START_ELEMENT(e)", "CHARACTERS(x)", "END_ELEMENT(e)", "END_ELEMENT(r)"]
        );

        let config = StreamConfig::default().with_report_attributes(true);
        let mut reader = store.stream(&root, config).unwrap();
        assert_eq!(
            labelled(&mut reader),
            vec![
                "START_ELEMENT(r)",
                "START_ELEMENT(e)",
                "ATTRIBUTE(a)",
                "ATTRIBUTE(b)",
                "CHARACTERS(x)",
                "END_ELEMENT(e)",
                "END_ELEMENT(r)",
            ]
        );
    }

    #[test]
    fn test_attributes_read_from_page() {
        let store = load(ATTRS, LoadOptions::default());
        let e = &store.elements_named(1, "e").unwrap()[0];
        let config = StreamConfig::default().with_report_attributes(true);
        let mut reader = store.stream(e, config).unwrap();
        reader.next_event().unwrap();
        assert_eq!(reader.attribute_count().unwrap(), 2);
        assert_eq!(reader.attribute_value("b").unwrap(), Some("2"));
        assert_eq!(reader.attribute_value("c").unwrap(), None);
        let attrs = reader.attributes().unwrap().to_vec();
        assert_eq!(attrs[0].node_id, e.node_id.child(1));

        assert_eq!(reader.next_event().unwrap(), StreamEvent::Attribute);
        assert_eq!(reader.current_attribute().unwrap(), attrs[0]);
        assert_eq!(reader.text().unwrap(), "1");
        assert!(reader.attributes().is_err());
    }

    /// Hands out every record on a page of its own.
    struct Unpaged<'s>(MemoryRecordSource<'s>);

    impl RecordSource for Unpaged<'_> {
        fn next(&mut self) -> std::result::Result<Option<Value>, StorageError> {
            Ok(self.0.next()?.map(|value| Value {
                page: Bytes::copy_from_slice(value.bytes()),
                range: 0..value.len(),
                address: value.address,
            }))
        }

        fn seek(&mut self, target: &NodeHandle) -> std::result::Result<(), StorageError> {
            self.0.seek(target)
        }

        fn current_address(&self) -> Option<Address> {
            self.0.current_address()
        }

        fn close(&mut self) -> std::result::Result<(), StorageError> {
            self.0.close()
        }
    }

    #[test]
    fn test_attributes_pulled_from_source() {
        let store = load(ATTRS, LoadOptions::default());
        let e = store.elements_named(1, "e").unwrap().remove(0);
        for report in [false, true] {
            let config = StreamConfig::default().with_report_attributes(report);
            let source = Unpaged(store.open_at(&e).unwrap());
            let mut reader = EmbeddedReader::new(source, store.symbols(), config, Some(e.clone()));
            assert_eq!(reader.next_event().unwrap(), StartElement);
            let names: Vec<String> = reader
                .attributes()
                .unwrap()
                .iter()
                .map(|a| a.name.to_string())
                .collect();
            assert_eq!(names, vec!["a", "b"]);
            assert_eq!(reader.next_event().unwrap(), Characters);
            assert_eq!(reader.next_event().unwrap(), EndElement);
            assert!(!reader.has_next());
        }
    }

    #[test]
    fn test_namespaces() {
        let xml = r#"<r xmlns="urn:d" xmlns:p="urn:p"><p:c p:attr="1" plain="2"/></r>"#;
        let store = load(xml, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();

        assert_eq!(reader.next_event().unwrap(), StartElement);
        assert_eq!(reader.name().unwrap(), &QName::with_namespace("r", "urn:d", None));
        assert_eq!(reader.namespace_count().unwrap(), 2);
        assert_eq!(reader.namespace_prefix(0).unwrap(), Some(""));
        assert_eq!(reader.namespace_uri(1).unwrap(), Some("urn:p"));
        assert_eq!(reader.namespace_prefix(2).unwrap(), None);

        assert_eq!(reader.next_event().unwrap(), StartElement);
        let name = reader.name().unwrap().clone();
        assert_eq!(name.prefix.as_deref(), Some("p"));
        assert_eq!(name.namespace, "urn:p");
        assert_eq!(reader.namespace_count().unwrap(), 0);
        let attrs = reader.attributes().unwrap().to_vec();
        assert_eq!(attrs[0].name.qualified(), "p:attr");
        assert_eq!(attrs[0].name.namespace, "urn:p");
        assert!(!attrs[1].name.has_namespace());

        assert_eq!(reader.next_event().unwrap(), EndElement);
        assert_eq!(reader.name().unwrap().local, "c");
        assert_eq!(reader.next_event().unwrap(), EndElement);
        assert_eq!(reader.namespace_count().unwrap(), 2);
    }

    #[test]
    fn test_processing_instruction_and_cdata() {
        let xml = "<r><?target some data?><![CDATA[a<b]]>tail</r>";
        let store = load(xml, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        reader.next_event().unwrap();
        assert_eq!(reader.next_event().unwrap(), ProcessingInstruction);
        assert_eq!(reader.pi_target().unwrap(), "target");
        assert_eq!(reader.pi_data().unwrap(), "some data");
        assert!(reader.name().is_err());
        assert_eq!(reader.next_event().unwrap(), CData);
        assert_eq!(reader.text().unwrap(), "a<b");
        assert!(reader.pi_target().is_err());
    }

    #[test]
    fn test_element_text() {
        let xml = "<r><t>a<!--c--><![CDATA[b]]><?p d?>c</t><m>x<i/></m></r>";
        let store = load(xml, LoadOptions::default());
        let t = &store.elements_named(1, "t").unwrap()[0];
        let mut reader = store.stream(t, StreamConfig::default()).unwrap();
        reader.next_event().unwrap();
        assert_eq!(reader.element_text().unwrap(), "abc");

        let m = &store.elements_named(1, "m").unwrap()[0];
        let mut reader = store.stream(m, StreamConfig::default()).unwrap();
        assert!(matches!(
            reader.element_text(),
            Err(Error::InvalidState { state: StartDocument, .. })
        ));
        reader.next_event().unwrap();
        assert!(matches!(
            reader.element_text(),
            Err(Error::InvalidState { state: StartElement, .. })
        ));
    }

    #[test]
    fn test_node_and_previous_node() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        reader.next_event().unwrap();
        reader.next_event().unwrap();
        assert_eq!(reader.next_event().unwrap(), Characters);
        assert_eq!(reader.node().unwrap().text(), Some("01234"));
        assert_eq!(reader.previous_node().unwrap().unwrap().node_id, id("1.1"));

        assert_eq!(reader.next_event().unwrap(), EndElement);
        assert_eq!(reader.node_id(), Some(&id("1.1")));
        assert_eq!(reader.next_event().unwrap(), StartElement);
        // END events leave the previous node alone
        assert_eq!(reader.previous_node().unwrap().unwrap().node_id, id("1.1.1"));
        let node = reader.node().unwrap();
        assert!(node.is_element());
        assert_eq!(node.address, reader.current_position());
    }

    #[test]
    fn test_property_and_symbols() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        assert!(reader.property(PROPERTY_NODE_ID).is_none());
        reader.next_event().unwrap();
        assert_eq!(reader.property(PROPERTY_NODE_ID), Some(&NodeId::root()));
        assert_eq!(reader.property("unknown"), None);
        let section = store.symbols().name_symbol("section").unwrap();
        assert_eq!(reader.name_symbols().unwrap(), (section, 0));
    }

    #[test]
    fn test_siblings_increase_and_events_balance() {
        let xml = "<a><b><c/>t<c x='1'/></b><!--k--><b>u</b><?p?><d><e/><e/><e/></d></a>";
        let store = load(xml, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let config = StreamConfig::default().with_report_attributes(true);
        let mut reader = store.stream(&root, config).unwrap();

        let mut last_child: Vec<Option<NodeId>> = vec![None];
        // (declared child count, attributes and children seen) per open element
        let mut owned: Vec<(u32, u32)> = Vec::new();
        let (mut starts, mut ends, mut records) = (0, 0, 0);
        while reader.has_next() {
            let event = reader.next_event().unwrap();
            if event == EndElement {
                ends += 1;
                last_child.pop();
                let (declared, seen) = owned.pop().unwrap();
                assert_eq!(seen, declared, "{}", reader.node_id().unwrap());
                continue;
            }
            records += 1;
            if let Some((_, seen)) = owned.last_mut() {
                *seen += 1;
            }
            if event == StartElement {
                let handle = NodeHandle::new(1, reader.node_id().unwrap().clone(), None);
                let value = store.record(&handle).unwrap();
                owned.push((record::decode_header(value.bytes()).unwrap().child_count, 0));
            }
            let node = reader.node_id().unwrap().clone();
            let depth = reader.depth() - usize::from(event == StartElement);
            if let Some(previous) = &last_child[depth] {
                assert!(previous < &node, "{previous} !< {node}");
                assert!(previous.is_sibling_of(&node));
            }
            last_child[depth] = Some(node);
            if event == StartElement {
                starts += 1;
                last_child.push(None);
            }
        }
        assert_eq!(starts, 9);
        assert_eq!(starts, ends);
        assert_eq!(last_child.len(), 1);
        assert!(owned.is_empty());
        assert_eq!(reader.source().stats().records_read, records);
    }

    #[test]
    fn test_filter_and_events() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        reader.filter(|r| Ok(r.event() != EndElement)).unwrap();
        assert_eq!(reader.event(), EndElement);
        assert_eq!(reader.name().unwrap().local, "para");

        let rest = reader.events().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rest, vec![StartElement, Characters, EndElement, EndElement]);
        assert_eq!(reader.events().count(), 0);
    }

    #[test]
    fn test_document_scope_ends_with_source() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let config = StreamConfig::default().with_scope(StreamScope::Document);
        let mut reader = store.stream(&root, config).unwrap();
        let events = reader.events().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(events.len(), 8);
        assert_eq!(events.last(), Some(&EndElement));
        assert!(!reader.has_next());
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = load(SECTION, LoadOptions::default());
        let root = store.root_handle(1).unwrap();
        let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
        reader.next_event().unwrap();
        reader.close().unwrap();
        reader.close().unwrap();
        assert!(reader.is_closed());
        assert!(reader.source().is_closed());
        assert!(!reader.has_next());
        assert!(matches!(reader.next_event(), Err(Error::Storage(StorageError::Closed))));
        assert!(reader.reposition(root, false).is_err());
    }

    #[test]
    fn test_name_invalid_at_text() {
        let store = load(SECTION, LoadOptions::default());
        let text = store.handle(1, &id("1.1.1")).unwrap();
        let mut reader = store.stream(&text, StreamConfig::default()).unwrap();
        assert_eq!(reader.next_event().unwrap(), Characters);
        assert!(matches!(
            reader.name(),
            Err(Error::InvalidState { operation: "name", state: Characters })
        ));
        assert!(reader.attributes().is_err());
        assert!(reader.namespaces().is_err());
    }
}
