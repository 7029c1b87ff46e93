//! Secondary Index Module
//!
//! Derives index entries from stored documents by streaming them through
//! the embedded cursor:
//!
//! - **Keys**: byte-comparable encodings of (collection, kind, name,
//!   namespace) tuples, so a B-tree range scan finds all nodes of a name.
//! - **Occurrences**: per-term (node id, offset) lists, sorted into
//!   document order before they are written out.
//! - **Builder**: one pass over a document producing both.
//!
//! ## Architecture
//!
//! ```text
//! MemoryStore ──stream()──> EmbeddedReader ──events──> IndexBuilder
//!                                                      ├── structural: (key, NodeId)
//!                                                      ├── qnames / document_qnames
//!                                                      ├── ids: (id key, NodeId)
//!                                                      └── terms: term -> OccurrenceList
//! ```

pub mod builder;
pub mod keys;
pub mod occurrences;
pub mod parallel;
pub mod terms;

pub use builder::{DocumentIndex, IndexBuilder, TermPosting};
pub use keys::{CollectionId, KeyKind, KeyRange};
pub use occurrences::{Occurrence, OccurrenceList};
pub use parallel::{document_frequencies, index_documents};
