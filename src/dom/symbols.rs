//! Symbol Interning
//!
//! Maps local names and namespace URIs to compact `u16` ids. Node records
//! and index keys store these ids instead of the strings.
//!
//! Two independent tables:
//! - names: local names of elements and attributes, ids start at 1
//! - namespaces: namespace URIs, id 0 means "no namespace"
//!
//! Uses hash-based lookup to avoid storing duplicate string data.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Namespace symbol meaning "no namespace".
pub const NO_NAMESPACE: u16 = 0;

/// Read side of the symbol interner, as consumed by the cursor and the
/// index builder.
pub trait SymbolTable {
    /// Id of an interned local name.
    fn name_symbol(&self, local: &str) -> Option<u16>;

    /// Id of an interned namespace URI; empty URI maps to [`NO_NAMESPACE`].
    fn namespace_symbol(&self, uri: &str) -> Option<u16>;

    /// Local name for a name id.
    fn name(&self, id: u16) -> Option<&str>;

    /// Namespace URI for a namespace id; [`NO_NAMESPACE`] resolves to `""`.
    fn namespace(&self, id: u16) -> Option<&str>;
}

/// One interning table: entries indexed by id plus a hash index.
#[derive(Debug, Default)]
struct Interner {
    entries: Vec<String>,
    /// Hash of string content -> list of ids with that hash
    hash_index: HashMap<u64, Vec<u16>>,
}

impl Interner {
    /// Entry 0 is reserved.
    fn new() -> Self {
        Interner {
            entries: vec![String::new()],
            hash_index: HashMap::new(),
        }
    }

    #[inline]
    fn compute_hash(s: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    fn lookup(&self, s: &str) -> Option<u16> {
        let ids = self.hash_index.get(&Self::compute_hash(s))?;
        ids.iter()
            .copied()
            .find(|&id| self.entries[id as usize] == s)
    }

    fn intern(&mut self, s: &str) -> Result<u16> {
        if let Some(id) = self.lookup(s) {
            return Ok(id);
        }
        let id = u16::try_from(self.entries.len()).map_err(|_| Error::SymbolTableFull)?;
        self.entries.push(s.to_owned());
        self.hash_index
            .entry(Self::compute_hash(s))
            .or_default()
            .push(id);
        Ok(id)
    }

    #[inline]
    fn get(&self, id: u16) -> Option<&str> {
        self.entries.get(id as usize).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.entries.len() - 1
    }
}

/// In-memory symbol table.
#[derive(Debug)]
pub struct MemorySymbols {
    names: Interner,
    namespaces: Interner,
}

impl Default for MemorySymbols {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySymbols {
    pub fn new() -> Self {
        MemorySymbols {
            names: Interner::new(),
            namespaces: Interner::new(),
        }
    }

    /// Intern a local name. The empty name is rejected.
    pub fn intern_name(&mut self, local: &str) -> Result<u16> {
        if local.is_empty() {
            return Err(Error::malformed_record("empty local name"));
        }
        self.names.intern(local)
    }

    /// Intern a namespace URI; the empty URI is [`NO_NAMESPACE`].
    pub fn intern_namespace(&mut self, uri: &str) -> Result<u16> {
        if uri.is_empty() {
            return Ok(NO_NAMESPACE);
        }
        self.namespaces.intern(uri)
    }

    /// Number of interned local names.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Number of interned namespace URIs.
    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

impl SymbolTable for MemorySymbols {
    fn name_symbol(&self, local: &str) -> Option<u16> {
        self.names.lookup(local).filter(|&id| id != 0)
    }

    fn namespace_symbol(&self, uri: &str) -> Option<u16> {
        if uri.is_empty() {
            return Some(NO_NAMESPACE);
        }
        self.namespaces.lookup(uri)
    }

    fn name(&self, id: u16) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.names.get(id)
    }

    fn namespace(&self, id: u16) -> Option<&str> {
        self.namespaces.get(id)
    }
}
