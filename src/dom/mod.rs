//! Node Model
//!
//! Types shared by the record codec, the cursor and the loader:
//! - NodeKind / StoredNode: decoded node values
//! - QName: namespace-qualified names
//! - SymbolTable: name and namespace interning
//! - NamespaceScope: prefix resolution stack

pub mod namespace;
pub mod node;
pub mod qname;
pub mod symbols;

pub use namespace::NamespaceScope;
pub use node::{AttrType, Attribute, NamespaceDecl, NodeData, NodeKind, StoredNode};
pub use qname::QName;
pub use symbols::{MemorySymbols, SymbolTable, NO_NAMESPACE};
