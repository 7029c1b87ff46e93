//! Term occurrence accumulator.
//!
//! Collects (node id, offset) pairs while a document is scanned. After
//! [`OccurrenceList::sort`] the pairs of one node form a contiguous run, so
//! per-node counts are the run lengths.

use std::cmp::Ordering;

use rayon::slice::ParallelSliceMut;

use crate::numbering::NodeId;

/// Lists at least this long are sorted on the rayon pool.
pub const PARALLEL_SORT_THRESHOLD: usize = 4096;

/// One occurrence: the node containing the term and its offset there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub node_id: NodeId,
    pub offset: u32,
}

/// Append-then-sort list of occurrences.
///
/// `term_count`, `occurrences_at` and `runs` are only meaningful after
/// `sort`; debug builds assert this.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceList {
    entries: Vec<Occurrence>,
    sorted: bool,
}

impl OccurrenceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OccurrenceList {
            entries: Vec::with_capacity(capacity),
            sorted: false,
        }
    }

    #[inline]
    pub fn add(&mut self, node_id: NodeId, offset: u32) {
        self.entries.push(Occurrence { node_id, offset });
        self.sorted = false;
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<(&NodeId, u32)> {
        self.entries.get(index).map(|o| (&o.node_id, o.offset))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.sorted = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.entries.iter()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        if self.sorted {
            self.entries
                .binary_search_by(|o| o.node_id.cmp(node_id))
                .is_ok()
        } else {
            self.entries.iter().any(|o| &o.node_id == node_id)
        }
    }

    /// Stable sort by node identifier (document order).
    pub fn sort(&mut self) {
        let by_node = |a: &Occurrence, b: &Occurrence| -> Ordering { a.node_id.cmp(&b.node_id) };
        if self.entries.len() >= PARALLEL_SORT_THRESHOLD {
            self.entries.par_sort_by(by_node);
        } else {
            self.entries.sort_by(by_node);
        }
        self.sorted = true;
    }

    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Number of distinct nodes.
    pub fn term_count(&self) -> usize {
        debug_assert!(self.sorted, "term_count before sort");
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .filter(|(a, b)| a.node_id != b.node_id)
            .count()
            + usize::from(!self.entries.is_empty())
    }

    /// Length of the run of equal node ids starting at `start`.
    pub fn occurrences_at(&self, start: usize) -> usize {
        debug_assert!(self.sorted, "occurrences_at before sort");
        let Some(first) = self.entries.get(start) else {
            return 0;
        };
        self.entries[start..]
            .iter()
            .take_while(|o| o.node_id == first.node_id)
            .count()
    }

    /// Runs of equal node ids.
    pub fn runs(&self) -> Runs<'_> {
        debug_assert!(self.sorted, "runs before sort");
        Runs {
            entries: &self.entries,
        }
    }
}

/// One node's occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run<'a> {
    pub node_id: &'a NodeId,
    pub count: usize,
    pub offsets: Vec<u32>,
}

/// Iterator over the runs of a sorted [`OccurrenceList`].
pub struct Runs<'a> {
    entries: &'a [Occurrence],
}

impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        let first = self.entries.first()?;
        let count = self
            .entries
            .iter()
            .take_while(|o| o.node_id == first.node_id)
            .count();
        let (run, rest) = self.entries.split_at(count);
        self.entries = rest;
        Some(Run {
            node_id: &first.node_id,
            count,
            offsets: run.iter().map(|o| o.offset).collect(),
        })
    }
}
