use std::fmt;

use thiserror::Error;

use crate::{
    position::{Pos, Span},
    syntax::ParseError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    ImportNotFound,
    ImportCollision,
    ReferenceCycle,
    UnresolvedReference,
    NoLabels,
    NoInstance,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::ImportNotFound => "import not found",
            ErrorKind::ImportCollision => "import collision",
            ErrorKind::ReferenceCycle => "reference cycle",
            ErrorKind::UnresolvedReference => "unresolved reference",
            ErrorKind::NoLabels => "no labels",
            ErrorKind::NoInstance => "no instance",
        };
        write!(f, "{name}")
    }
}

/// Where an error points. A range error highlights a whole span, a point
/// error only knows where the problem starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSpan {
    None,
    Point(Pos),
    Range(Span),
}

impl ErrorSpan {
    pub fn pos(&self) -> Option<Pos> {
        match self {
            ErrorSpan::None => None,
            ErrorSpan::Point(pos) => Some(*pos),
            ErrorSpan::Range(span) => Some(span.pos()),
        }
    }
}

/// A non-fatal problem found while building the semantic graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: ErrorSpan,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CompileError {
        CompileError {
            kind,
            span: ErrorSpan::None,
            message: message.into(),
        }
    }

    pub fn point(kind: ErrorKind, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError {
            kind,
            span: ErrorSpan::Point(pos),
            message: message.into(),
        }
    }

    pub fn range(kind: ErrorKind, span: Span, message: impl Into<String>) -> CompileError {
        CompileError {
            kind,
            span: ErrorSpan::Range(span),
            message: message.into(),
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> CompileError {
        CompileError::range(ErrorKind::Parse, err.span, err.message)
    }
}
