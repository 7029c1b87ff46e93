//! Parallel Indexing
//!
//! Uses Rayon to index the documents of a collection concurrently. Each
//! document gets its own cursor over the shared, read-only store.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::builder::{DocumentIndex, IndexBuilder};
use super::keys::CollectionId;
use crate::error::Result;
use crate::storage::{DocumentId, MemoryStore};

/// Index `documents` in parallel. Results keep the order of `documents`;
/// the first failure is returned.
pub fn index_documents(
    store: &MemoryStore,
    documents: &[DocumentId],
    collection: CollectionId,
) -> Result<Vec<DocumentIndex>> {
    let builder = IndexBuilder::new(collection);
    documents
        .par_iter()
        .map(|&document| builder.build(store, document))
        .collect()
}

/// Number of documents containing each term.
pub fn document_frequencies(indexes: &[DocumentIndex]) -> BTreeMap<&str, usize> {
    let mut frequencies = BTreeMap::new();
    for index in indexes {
        for term in index.terms.keys() {
            *frequencies.entry(term.as_str()).or_insert(0) += 1;
        }
    }
    frequencies
}
