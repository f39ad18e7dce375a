//! Syntax tree of the configuration language and its parser.
//!
//! The analysis core only consumes the types in this module. [`parse_file`]
//! is the default parse hook handed to the loader: it never fails, it returns
//! a best-effort tree together with every error it recovered from.
//!
//! Lexing and parsing are `chumsky` parsers; the lexer drops newlines that
//! cannot end a declaration, the parser recovers per declaration.

mod lexer;
mod parser;

use thiserror::Error;

use crate::position::{FileId, Span};

/// A syntax error with the range it covers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> ParseError {
        ParseError {
            message: message.into(),
            span,
        }
    }
}

/// Parses one file. The returned tree is always usable, even when errors are
/// reported.
pub fn parse_file(file: FileId, source: &str) -> (File, Vec<ParseError>) {
    parser::parse_source(file, source)
}

/// The constant name of a label. Dynamic and interpolated labels have none.
pub fn label_name(label: &Label) -> Result<String, ParseError> {
    label
        .name()
        .ok_or_else(|| ParseError::new("label is not a constant", label.span()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitKind {
    Int,
    Float,
    String,
    Bool,
    Null,
    Bottom,
}

/// A literal; `value` is the raw source text, quotes included.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicLit {
    pub kind: LitKind,
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageClause {
    pub name: Ident,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub name: Option<Ident>,
    pub path: BasicLit,
    pub span: Span,
}

impl ImportSpec {
    /// The import path without quotes, `None` if the literal is malformed.
    pub fn path_value(&self) -> Option<String> {
        unquote(&self.path.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub id: FileId,
    pub package: Option<PackageClause>,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
    pub span: Span,
}

impl File {
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.name.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Ident(Ident),
    String(BasicLit),
    /// `(expr)` or an interpolated string; not known before evaluation.
    Dynamic(Box<Expr>),
}

impl Label {
    pub fn span(&self) -> Span {
        match self {
            Label::Ident(ident) => ident.span,
            Label::String(lit) => lit.span,
            Label::Dynamic(expr) => expr.span(),
        }
    }

    /// The constant name of this label, `None` for dynamic labels.
    pub fn name(&self) -> Option<String> {
        match self {
            Label::Ident(ident) => Some(ident.name.clone()),
            Label::String(lit) => unquote(&lit.value),
            Label::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: Label,
    pub optional: bool,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Field(Field),
    /// An expression embedded in a struct or at file level.
    Embed(Expr),
    Bad(Span),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Field(field) => field.span,
            Decl::Embed(expr) => expr.span(),
            Decl::Bad(span) => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    LOr,
    LAnd,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
    Mat,
    NMat,
    Add,
    Sub,
    Mul,
    Quo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    /// `*x`, marks a default value.
    Default,
    Lss,
    Leq,
    Gtr,
    Geq,
    Neq,
    Mat,
    NMat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructLit {
    pub elts: Vec<Decl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(Ident),
    Selector {
        x: Box<Expr>,
        sel: Ident,
        span: Span,
    },
    Lit(BasicLit),
    Struct(StructLit),
    List {
        elts: Vec<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
        span: Span,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Paren {
        x: Box<Expr>,
        span: Span,
    },
    /// A string literal with `\(expr)` parts; only the embedded expressions are kept.
    Interpolation {
        elts: Vec<Expr>,
        span: Span,
    },
    Bad(Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident(ident) => ident.span,
            Expr::Lit(lit) => lit.span,
            Expr::Struct(lit) => lit.span,
            Expr::Selector { span, .. }
            | Expr::List { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Paren { span, .. }
            | Expr::Interpolation { span, .. }
            | Expr::Bad(span) => *span,
        }
    }
}

/// Strips the quotes of a simple string literal and resolves the common escapes.
pub fn unquote(raw: &str) -> Option<String> {
    let quote = raw.chars().next()?;
    if !matches!(quote, '"' | '\'') {
        return None;
    }
    let inner = raw
        .strip_prefix(&quote.to_string().repeat(3))
        .and_then(|s| s.strip_suffix(&quote.to_string().repeat(3)))
        .or_else(|| raw.get(1..raw.len().checked_sub(1)?))?;
    if raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\""), Some("abc".to_string()));
        assert_eq!(unquote("\"a\\\"b\""), Some("a\"b".to_string()));
        assert_eq!(unquote("'bytes'"), Some("bytes".to_string()));
        assert_eq!(unquote("\"\"\"\nmulti\n\"\"\""), Some("\nmulti\n".to_string()));
        assert_eq!(unquote("abc"), None);
        assert_eq!(unquote("\""), None);
    }

    #[test]
    fn test_label_names() {
        let (file, errors) = parse_file(FileId(0), "a: 1\n\"b-c\": 2\n(x): 3");
        assert!(errors.is_empty(), "{errors:?}");
        let names: Vec<_> = file
            .decls
            .iter()
            .map(|decl| match decl {
                Decl::Field(field) => field.label.name(),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec![Some("a".into()), Some("b-c".into()), None]);
    }
}
