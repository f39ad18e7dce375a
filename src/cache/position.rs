use tower_lsp::lsp_types::{Position, Range};

use super::{document::DocumentHandle, CacheError};
use crate::position::{offset_to_position, position_to_offset, Span};

impl DocumentHandle {
    /// Protocol position of a byte offset of this version's content.
    pub fn offset_to_position(&self, offset: usize) -> Result<Position, CacheError> {
        let state = self.doc.state.read();
        self.check()?;
        offset_to_position(&state.rope, offset).ok_or(CacheError::OffsetOutOfRange(offset))
    }

    /// Byte offset of a protocol position of this version's content.
    pub fn position_to_offset(&self, position: Position) -> Result<usize, CacheError> {
        let state = self.doc.state.read();
        self.check()?;
        position_to_offset(&state.rope, position).ok_or(CacheError::PositionOutOfRange {
            line: position.line,
            character: position.character,
        })
    }

    /// Protocol range of a span. The span must point into this document.
    pub fn span_to_range(&self, span: Span) -> Result<Range, CacheError> {
        Ok(Range {
            start: self.offset_to_position(span.start)?,
            end: self.offset_to_position(span.end)?,
        })
    }
}
