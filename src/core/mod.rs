//! XML text scanning for the document loader
//!
//! - Scanner: SIMD-accelerated delimiter detection using memchr
//! - Entities: character reference decoding with Cow (zero-copy when possible)
//! - UnifiedScanner: ScanHandler-based tokenizer feeding the record builder

pub mod entities;
pub mod scanner;
pub mod unified_scanner;

pub use unified_scanner::{ScanHandler, UnifiedScanner};
