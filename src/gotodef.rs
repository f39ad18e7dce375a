use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::asg::{visitors::parent_decl, Asg, NodeKind, NodeRef, ValueKind};

/// The node an identifier under the cursor stands for: the referenced node of
/// a resolved reference, or the declaration owning a label.
pub fn definition(asg: &Asg, node: NodeRef) -> Option<NodeRef> {
    let NodeRef::Node(id) = node else {
        return Some(node);
    };
    match asg.kind(id) {
        NodeKind::Reference(reference) => reference.referenced(),
        NodeKind::Value(value) if value.kind == ValueKind::Label => {
            parent_decl(asg, node).map(NodeRef::Node)
        }
        NodeKind::Decl(_) => Some(node),
        _ => None,
    }
}

/// Label ranges of every declaration site of the node's definition. Imported
/// packages point at the start of each of their files. Builtins have no
/// location.
pub fn goto_definition(asg: &Asg, node: NodeRef) -> Option<Vec<Location>> {
    let NodeRef::Node(target) = definition(asg, node)? else {
        return None;
    };

    let locations: Vec<Location> = match asg.kind(target) {
        NodeKind::Decl(decl) => decl
            .labels
            .iter()
            .filter_map(|label| {
                let span = asg.span(NodeRef::Node(*label))?;
                Some(Location {
                    uri: Url::from_file_path(asg.path(span.file)?).ok()?,
                    range: asg.sources().to_lsp_range(span)?,
                })
            })
            .collect(),
        NodeKind::Package(package) => package
            .files
            .iter()
            .filter_map(|file| {
                let file = asg.file(*file)?;
                Some(Location {
                    uri: Url::from_file_path(&file.path).ok()?,
                    range: Range::new(Position::new(0, 0), Position::new(0, 0)),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    match locations.is_empty() {
        true => None,
        false => Some(locations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        position::Pos,
        test_utils::{compile_overlay, offset_of, virtual_path},
    };

    fn node_at(asg: &Asg, src: &str, needle: &str) -> NodeRef {
        let file = asg.sources().file_id(&virtual_path("a.cue")).unwrap();
        let pos = Pos::new(file, offset_of(src, needle));
        asg.find(NodeRef::Node(asg.root().unwrap()), pos).unwrap()
    }

    /// Test: a reference jumps to every label of the merged declaration.
    #[test]
    fn test_goto_definition_merged_declaration() {
        let src = "a: int\nb: a\na: 1";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let asg = &compilation.asg;

        let locations = goto_definition(asg, node_at(asg, src, "a\n")).unwrap();
        let uri = Url::from_file_path(virtual_path("a.cue")).unwrap();
        assert_eq!(
            locations,
            vec![
                Location {
                    uri: uri.clone(),
                    range: Range::new(Position::new(0, 0), Position::new(0, 1)),
                },
                Location {
                    uri,
                    range: Range::new(Position::new(2, 0), Position::new(2, 1)),
                },
            ]
        );
    }

    /// Test: a selector into another file of the package lands in that file.
    #[test]
    fn test_goto_definition_other_file() {
        let src = "package p\nb: x.y";
        let compilation = compile_overlay(
            &[("a.cue", src), ("b.cue", "package p\nx: {\n\ty: 1\n}")],
            "a.cue",
        );
        let asg = &compilation.asg;

        let locations = goto_definition(asg, node_at(asg, src, "x.y")).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, Url::from_file_path(virtual_path("b.cue")).unwrap());
        assert_eq!(locations[0].range.start, Position::new(2, 1));
    }

    /// Test: builtins and unresolved references have no definition.
    #[test]
    fn test_goto_definition_without_location() {
        let src = "a: int\nb: nope";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let asg = &compilation.asg;

        assert_eq!(goto_definition(asg, node_at(asg, src, "int")), None);
        assert_eq!(goto_definition(asg, node_at(asg, src, "nope")), None);
    }
}
