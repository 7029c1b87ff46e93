//! Configuration for the cursor, the in-memory store and the loader.

use std::num::NonZeroUsize;

/// How far a cursor streams past its origin node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamScope {
    /// The origin's subtree, preceded by any non-element siblings the
    /// stream started on. Ends when the first element subtree closes.
    #[default]
    Subtree,
    /// Keep reading following records until the source is exhausted.
    Document,
}

/// Streaming cursor options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Emit ATTRIBUTE events after START_ELEMENT instead of skipping them
    pub report_attributes: bool,
    pub scope: StreamScope,
    /// Capacity of the per-cursor qualified-name cache
    pub name_cache_capacity: NonZeroUsize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            report_attributes: false,
            scope: StreamScope::Subtree,
            name_cache_capacity: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl StreamConfig {
    pub fn with_report_attributes(mut self, report: bool) -> Self {
        self.report_attributes = report;
        self
    }

    pub fn with_scope(mut self, scope: StreamScope) -> Self {
        self.scope = scope;
        self
    }

    /// A capacity of 0 is raised to 1.
    pub fn with_name_cache_capacity(mut self, capacity: usize) -> Self {
        self.name_cache_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }
}

/// In-memory store options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Target page size in bytes. A page always holds at least one element
    /// together with its attributes, so oversized groups get a page of
    /// their own.
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { page_size: 4096 }
    }
}

impl StoreConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Document loader options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep whitespace-only text nodes
    pub preserve_whitespace: bool,
}

impl LoadOptions {
    pub fn preserve_whitespace() -> Self {
        LoadOptions {
            preserve_whitespace: true,
        }
    }
}
