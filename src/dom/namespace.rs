//! Namespace Resolution
//!
//! Stack-based prefix resolver used while loading documents: each element
//! opens a scope, `xmlns` attributes declare bindings in it, and closing the
//! element drops them again.

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// `prefix` is empty for the default namespace.
#[derive(Debug, Clone)]
struct Binding {
    prefix: String,
    uri: String,
    depth: u16,
}

/// Prefix bindings in scope at the element being loaded.
#[derive(Debug)]
pub struct NamespaceScope {
    bindings: Vec<Binding>,
    depth: u16,
}

impl Default for NamespaceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceScope {
    /// Only `xml` is bound initially.
    pub fn new() -> Self {
        NamespaceScope {
            bindings: vec![Binding {
                prefix: "xml".to_owned(),
                uri: ns::XML.to_owned(),
                depth: 0,
            }],
            depth: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    /// Drops the bindings declared since the matching `push_scope`.
    pub fn pop_scope(&mut self) {
        while let Some(binding) = self.bindings.last() {
            if binding.depth < self.depth {
                break;
            }
            self.bindings.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Declare a binding in the current scope. `xml` and `xmlns` cannot be
    /// rebound; returns whether the declaration was accepted.
    pub fn declare(&mut self, prefix: &str, uri: &str) -> bool {
        if prefix == "xml" || prefix == "xmlns" {
            return false;
        }
        self.bindings.push(Binding {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
            depth: self.depth,
        });
        true
    }

    /// Resolve a prefix (empty for the default namespace). An empty URI
    /// undeclares the default namespace and resolves to `None`.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    #[inline]
    pub fn depth(&self) -> u16 {
        self.depth
    }
}
