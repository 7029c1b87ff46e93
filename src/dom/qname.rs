//! Qualified names.

use std::borrow::Cow;
use std::fmt;

use memchr::memchr;

/// Namespace-qualified name as reported by the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QName {
    pub local: String,
    /// Namespace URI, empty when the name is in no namespace.
    pub namespace: String,
    pub prefix: Option<String>,
}

impl QName {
    pub fn new(local: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            namespace: String::new(),
            prefix: None,
        }
    }

    pub fn with_namespace(
        local: impl Into<String>,
        namespace: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        QName {
            local: local.into(),
            namespace: namespace.into(),
            prefix,
        }
    }

    #[inline]
    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn qualified(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => Cow::Owned(format!("{prefix}:{}", self.local)),
            _ => Cow::Borrowed(&self.local),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Split `prefix:local` into its parts.
#[inline]
pub fn split_prefixed(name: &str) -> (Option<&str>, &str) {
    match memchr(b':', name.as_bytes()) {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}
