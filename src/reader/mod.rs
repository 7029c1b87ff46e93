//! Streaming Cursor
//!
//! Pull reader over the flat record sequence of a stored document. Records
//! carry no end markers; nesting is rebuilt from each element's child count:
//!
//! ```text
//! records                       stack (consumed/children)      event
//! section  children=2           [section 0/2]                  START section
//! para     children=1           [section 1/2, para 0/1]        START para
//! "01234"                       [section 1/2, para 1/1]        CHARACTERS
//!                               [section 1/2]                  END para
//! para     children=1           [section 2/2, para 0/1]        START para
//! "56789"                       [section 2/2, para 1/1]        CHARACTERS
//!                               [section 2/2]                  END para
//!                               []                             END section
//! ```
//!
//! - `EmbeddedReader`: the cursor, generic over the record source and the
//!   symbol table
//! - `StreamEvent`: cursor states

pub mod embedded;
pub mod events;

pub use embedded::{EmbeddedReader, Events, MAX_RESYNC_ATTEMPTS, PROPERTY_NODE_ID};
pub use events::StreamEvent;
