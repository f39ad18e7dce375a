use std::{collections::HashMap, path::Path};

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range, Url};

use crate::{
    asg::{Asg, CompileError, ErrorSpan, NodeRef},
    position::Span,
};

pub const SOURCE: &str = "cuels";

/// Source range to highlight for an error. Point errors are widened to the
/// end of the most specific node containing them; errors without position
/// are anchored at the start of the compiled document.
fn error_span(asg: &Asg, doc_path: &Path, error: &CompileError) -> Option<Span> {
    match error.span {
        ErrorSpan::Range(span) => Some(span),
        ErrorSpan::Point(pos) => {
            let end = asg
                .root()
                .and_then(|root| asg.find(NodeRef::Node(root), pos))
                .and_then(|node| asg.span(node))
                .filter(|span| span.file == pos.file && span.end >= pos.offset)
                .map_or(pos.offset, |span| span.end);
            Some(Span::new(pos.file, pos.offset, end))
        }
        ErrorSpan::None => asg
            .sources()
            .file_id(doc_path)
            .map(|file| Span::new(file, 0, 0)),
    }
}

/// Converts compile errors into protocol diagnostics, grouped by the
/// document each one points into.
pub(crate) fn collect(
    doc_uri: &Url,
    doc_path: &Path,
    asg: &Asg,
    errors: &[CompileError],
) -> HashMap<Url, Vec<Diagnostic>> {
    let mut diagnostics: HashMap<Url, Vec<Diagnostic>> = HashMap::new();
    for error in errors {
        let span = error_span(asg, doc_path, error);
        let range = span
            .and_then(|span| asg.sources().to_lsp_range(span))
            .unwrap_or_default();
        let uri = span
            .and_then(|span| asg.path(span.file))
            .and_then(|path| Url::from_file_path(path).ok())
            .unwrap_or_else(|| doc_uri.clone());

        diagnostics.entry(uri).or_default().push(to_diagnostic(error, range));
    }
    diagnostics
}

fn to_diagnostic(error: &CompileError, range: Range) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some(SOURCE.to_string()),
        message: error.message.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asg::ErrorKind,
        position::Pos,
        test_utils::{compile_overlay, virtual_path},
    };
    use tower_lsp::lsp_types::Position;

    fn uri(rel: &str) -> Url {
        Url::from_file_path(virtual_path(rel)).unwrap()
    }

    #[test]
    fn test_range_errors_keep_their_range() {
        let src = "import \"example.com/missing\"\na: 1";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let diagnostics = collect(&uri("a.cue"), &virtual_path("a.cue"), &compilation.asg, &compilation.errors);

        let for_doc = &diagnostics[&uri("a.cue")];
        assert_eq!(for_doc.len(), 1);
        assert_eq!(for_doc[0].range.start, Position::new(0, 7));
        assert_eq!(for_doc[0].range.end, Position::new(0, 28));
        assert_eq!(for_doc[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(for_doc[0].source.as_deref(), Some("cuels"));
    }

    #[test]
    fn test_point_errors_widen_to_node() {
        let src = "a: 1\nb: foo";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let file = compilation.asg.sources().file_id(&virtual_path("a.cue")).unwrap();
        let error = CompileError::point(ErrorKind::NoLabels, Pos::new(file, 8), "no labels in expression");

        let diagnostics = collect(&uri("a.cue"), &virtual_path("a.cue"), &compilation.asg, &[error]);
        let diagnostic = &diagnostics[&uri("a.cue")][0];
        assert_eq!(diagnostic.range.start, Position::new(1, 3));
        assert_eq!(diagnostic.range.end, Position::new(1, 6));
    }

    #[test]
    fn test_errors_without_position_anchor_at_document_start() {
        let compilation = compile_overlay(&[("a.cue", "a: 1")], "a.cue");
        let error = CompileError::new(ErrorKind::NoInstance, "failed to load");

        let diagnostics = collect(&uri("a.cue"), &virtual_path("a.cue"), &compilation.asg, &[error.clone()]);
        assert_eq!(diagnostics[&uri("a.cue")][0].range, Range::default());

        // unknown documents still get the diagnostic
        let diagnostics = collect(&uri("b.cue"), &virtual_path("b.cue"), &Asg::default(), &[error]);
        assert_eq!(diagnostics[&uri("b.cue")].len(), 1);
    }
}
