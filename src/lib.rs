//! RustyXML DB - storage core of a native XML database
//!
//! Layers, bottom-up:
//! - numbering: hierarchical, byte-comparable node identifiers
//! - record: binary node records (element, attribute, text, comment, PI, CDATA)
//! - dom: symbol interning, qualified names, decoded nodes
//! - core: memchr-based XML scanning for the loader
//! - storage: document loader and the in-memory paged record store
//! - reader: pull cursor over stored records ([`EmbeddedReader`])
//! - index: index keys, term occurrences and the index builder
//!
//! ```
//! use rustyxml_db::{LoadOptions, MemoryStore, StreamConfig, StreamEvent};
//!
//! let mut store = MemoryStore::default();
//! store.load_str(1, "<a><b>hi</b></a>", &LoadOptions::default()).unwrap();
//! let root = store.root_handle(1).unwrap();
//! let mut reader = store.stream(&root, StreamConfig::default()).unwrap();
//! let mut starts = 0;
//! while reader.has_next() {
//!     if reader.next_event().unwrap() == StreamEvent::StartElement {
//!         starts += 1;
//!     }
//! }
//! assert_eq!(starts, 2);
//! ```

pub mod config;
pub mod core;
pub mod dom;
pub mod error;
pub mod index;
pub mod numbering;
pub mod reader;
pub mod record;
pub mod storage;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Public API
// ============================================================================

pub use config::{LoadOptions, StoreConfig, StreamConfig, StreamScope};
pub use dom::{MemorySymbols, QName, StoredNode, SymbolTable};
pub use error::{Error, Result};
pub use index::{DocumentIndex, IndexBuilder, KeyKind, KeyRange, OccurrenceList};
pub use numbering::NodeId;
pub use reader::{EmbeddedReader, StreamEvent};
pub use storage::{Address, DocumentId, MemoryStore, NodeHandle, RecordSource, StorageError};
