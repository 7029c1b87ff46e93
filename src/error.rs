//! Error types shared by every layer of the crate.

use thiserror::Error;

use crate::numbering::NodeId;
use crate::reader::StreamEvent;
use crate::storage::StorageError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding, streaming, or loading node records.
#[derive(Debug, Error)]
pub enum Error {
    /// An encoded node identifier is inconsistent with its declared length.
    #[error("malformed node identifier: {0}")]
    MalformedIdentifier(String),

    /// A node record is truncated or carries an unknown signature.
    #[error("malformed node record: {0}")]
    MalformedRecord(String),

    /// A symbol id was not found in the symbol table.
    #[error("unknown symbol {0}")]
    UnknownSymbol(u16),

    /// The symbol table has no free ids left.
    #[error("symbol table is full")]
    SymbolTableFull,

    /// No identifier can be minted between the given nodes.
    #[error("cannot insert between {left} and {right}")]
    InvalidInsertion { left: String, right: String },

    /// A repositioned node could not be found again after re-seeking by id.
    #[error(
        "expected node {expected} after re-seeking by identifier, found {}",
        .found.as_ref().map_or_else(|| "nothing".to_string(), ToString::to_string)
    )]
    AddressResyncFailed {
        expected: NodeId,
        found: Option<NodeId>,
    },

    /// `next_event` was called although `has_next` is false.
    #[error("no more events")]
    NoMoreEvents,

    /// An accessor was called in a cursor state that does not support it.
    #[error("{operation} is not valid at {state:?}")]
    InvalidState {
        operation: &'static str,
        state: StreamEvent,
    },

    /// XML text rejected by the document loader.
    #[error("{message} at byte {position}")]
    Load { message: String, position: usize },

    /// Failure reported by the storage collaborator.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub(crate) fn malformed_record(message: impl Into<String>) -> Self {
        Error::MalformedRecord(message.into())
    }

    pub(crate) fn malformed_identifier(message: impl Into<String>) -> Self {
        Error::MalformedIdentifier(message.into())
    }

    pub(crate) fn load(message: impl Into<String>, position: usize) -> Self {
        Error::Load {
            message: message.into(),
            position,
        }
    }

    /// Load error raised by a scan handler, which has no byte offset.
    pub(crate) fn load_unpositioned(message: impl Into<String>) -> Self {
        Error::load(message, UNKNOWN_POSITION)
    }

    /// Fill in the offset of a handler-raised load error.
    pub(crate) fn positioned(self, position: usize) -> Self {
        match self {
            Error::Load {
                message,
                position: UNKNOWN_POSITION,
            } => Error::Load { message, position },
            other => other,
        }
    }
}

const UNKNOWN_POSITION: usize = usize::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_message_names_both_nodes() {
        let err = Error::AddressResyncFailed {
            expected: "1.2".parse().unwrap(),
            found: Some("1.3".parse().unwrap()),
        };
        assert_eq!(
            err.to_string(),
            "expected node 1.2 after re-seeking by identifier, found 1.3"
        );

        let err = Error::AddressResyncFailed {
            expected: "1.2".parse().unwrap(),
            found: None,
        };
        assert!(err.to_string().ends_with("found nothing"));
    }

    #[test]
    fn test_positioned_only_fills_unknown() {
        let err = Error::load_unpositioned("boom").positioned(12);
        assert_eq!(err.to_string(), "boom at byte 12");
        let err = Error::load("boom", 3).positioned(12);
        assert_eq!(err.to_string(), "boom at byte 3");
    }

    #[test]
    fn test_storage_error_is_wrapped() {
        let err: Error = StorageError::Closed.into();
        assert!(matches!(err, Error::Storage(StorageError::Closed)));
        assert_eq!(err.to_string(), StorageError::Closed.to_string());
    }
}
