//! Node Numbering
//!
//! Hierarchical node identifiers. Every node carries its path from the
//! document root as a list of level codes:
//!
//! ```text
//! <section>              1
//!   <para>               1.1
//!     01234              1.1.1
//!   </para>
//!   <para>               1.2
//!   <note>               1.2/1   (inserted later between 1.2 and 1.3)
//!   <para>               1.3
//! </section>
//! ```
//!
//! The encoded form is byte-comparable: comparing two encoded identifiers
//! gives document order, and an ancestor's encoding is a byte-prefix of all
//! its descendants' encodings. Neither check needs the node's storage
//! address.

pub mod level;
pub mod node_id;

pub use node_id::NodeId;
