//! Stream Event Types
//!
//! States of the pull cursor. Each call to `next_event` moves the cursor to
//! one of these.

use std::fmt;

use crate::dom::NodeKind;

/// Cursor state / event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    /// Nothing read yet
    StartDocument,
    StartElement,
    /// Only reported when attribute reporting is enabled
    Attribute,
    Characters,
    CData,
    Comment,
    ProcessingInstruction,
    EndElement,
    /// Source exhausted before any element was read
    EndDocument,
}

impl StreamEvent {
    /// Event emitted when a record of `kind` is read.
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Element => StreamEvent::StartElement,
            NodeKind::Attribute => StreamEvent::Attribute,
            NodeKind::Text => StreamEvent::Characters,
            NodeKind::CData => StreamEvent::CData,
            NodeKind::Comment => StreamEvent::Comment,
            NodeKind::ProcessingInstruction => StreamEvent::ProcessingInstruction,
        }
    }

    /// Characters or CDATA.
    #[inline]
    pub fn is_text(self) -> bool {
        matches!(self, StreamEvent::Characters | StreamEvent::CData)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamEvent::StartDocument => "START_DOCUMENT",
            StreamEvent::StartElement => "START_ELEMENT",
            StreamEvent::Attribute => "ATTRIBUTE",
            StreamEvent::Characters => "CHARACTERS",
            StreamEvent::CData => "CDATA",
            StreamEvent::Comment => "COMMENT",
            StreamEvent::ProcessingInstruction => "PROCESSING_INSTRUCTION",
            StreamEvent::EndElement => "END_ELEMENT",
            StreamEvent::EndDocument => "END_DOCUMENT",
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
