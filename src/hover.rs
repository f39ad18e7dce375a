//! Hover provider for CUE documents.
//!
//! This module implements the LSP `textDocument/hover` capability on top of
//! the semantic graph, showing what the identifier under the cursor resolves
//! to.
//!
//! # Hover Targets
//!
//! | Target | Shows |
//! |--------|-------|
//! | Declaration (label or reference) | Label and every conjunct unified under it |
//! | Builtin type or function | Signature and documentation |
//! | Builtin package | Package documentation |
//! | Imported package | Package display path |
//!
//! # Configuration
//!
//! Hover can be disabled via [`Settings::hover`]:
//!
//! ```toml
//! hover = false
//! ```

use itertools::Itertools;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

use crate::{
    asg::{Asg, NodeKind, NodeRef},
    config::Settings,
    gotodef::definition,
};

/// Generate hover content for the node under the cursor.
///
/// Returns `None` if hover is disabled, the node is neither a reference nor
/// a declaration label, or the reference is unresolved.
pub fn hover(asg: &Asg, node: NodeRef, settings: &Settings) -> Option<Hover> {
    if !settings.hover {
        return None;
    }

    let target = definition(asg, node)?;
    let value = describe_target(asg, target)?;
    let range = asg
        .span(node)
        .and_then(|span| asg.sources().to_lsp_range(span));

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range,
    })
}

fn describe_target(asg: &Asg, target: NodeRef) -> Option<String> {
    match target {
        NodeRef::Builtin(builtin) => Some(builtin.doc.clone()),
        NodeRef::BuiltinPackage(package) => Some(package.doc.clone()),
        NodeRef::Node(id) => match asg.kind(id) {
            NodeKind::Decl(decl) => {
                let conjuncts = decl
                    .values
                    .iter()
                    .filter_map(|value| asg.text(NodeRef::Node(*value)))
                    .join(" & ");
                let mut text = format!("```cue\n{}: {}\n```", decl.label_name, conjuncts);
                if decl.spans.len() > 1 {
                    text.push_str(&format!("\n\nDeclared in {} places", decl.spans.len()));
                }
                Some(text)
            }
            NodeKind::Package(package) => Some(format!("package `\"{}\"`", package.display_path)),
            _ => None,
        },
    }
}
