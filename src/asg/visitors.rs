use super::{
    visitor::{walk, Direction, Flow, Visitor},
    Asg, NodeId, NodeRef,
};

/// Finds the declaration enclosing a node, skipping the node itself when it
/// is a declaration.
struct ParentDecl {
    start: NodeRef,
    found: Option<NodeId>,
}

impl Visitor for ParentDecl {
    fn node(&mut self, _asg: &Asg, _node: NodeRef) -> Flow {
        Flow::UP
    }

    fn decl(&mut self, _asg: &Asg, id: NodeId) -> Flow {
        if NodeRef::Node(id) == self.start {
            return Flow::UP;
        }
        self.found = Some(id);
        Flow::STOP
    }
}

pub fn parent_decl(asg: &Asg, node: NodeRef) -> Option<NodeId> {
    let mut visitor = ParentDecl {
        start: node,
        found: None,
    };
    walk(asg, &mut visitor, node, Direction::Up);
    visitor.found
}

/// References below `root` that resolve to `target`.
struct ReferencesTo {
    target: NodeRef,
    found: Vec<NodeId>,
}

impl Visitor for ReferencesTo {
    fn node(&mut self, _asg: &Asg, _node: NodeRef) -> Flow {
        Flow::DOWN
    }

    fn reference(&mut self, asg: &Asg, id: NodeId) -> Flow {
        if asg.referenced(id) == Some(self.target) {
            self.found.push(id);
        }
        // do not follow the reference into other declarations
        Flow::STOP
    }
}

pub fn references_to(asg: &Asg, root: NodeRef, target: NodeRef) -> Vec<NodeId> {
    let mut visitor = ReferencesTo {
        target,
        found: Vec::new(),
    };
    walk(asg, &mut visitor, root, Direction::Down);
    visitor.found.sort();
    visitor.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compile_overlay, offset_of};

    fn node_at(asg: &Asg, src_offset: usize) -> NodeRef {
        let root = NodeRef::Node(asg.root().unwrap());
        let (file, _) = asg.sources().iter().next().unwrap();
        asg.find(root, crate::position::Pos::new(file, src_offset)).unwrap()
    }

    #[test]
    fn test_parent_decl_of_value() {
        let src = "a: {\n\tb: x\n}\nx: 1";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let asg = &compilation.asg;

        let reference = node_at(asg, offset_of(src, "x\n}"));
        let decl = parent_decl(asg, reference).unwrap();
        assert_eq!(asg.decl(decl).unwrap().label_name, "b");

        // a declaration skips itself
        let outer = parent_decl(asg, NodeRef::Node(decl)).unwrap();
        assert_eq!(asg.decl(outer).unwrap().label_name, "a");

        // top level declarations have none
        assert_eq!(parent_decl(asg, NodeRef::Node(outer)), None);
    }

    #[test]
    fn test_references_to_declaration() {
        let src = "x: 1\na: x\nb: [x, y]\ny: x";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let asg = &compilation.asg;

        let reference = node_at(asg, offset_of(src, "x\nb"));
        let target = asg.referenced(reference.id().unwrap()).unwrap();
        let found = references_to(asg, NodeRef::Node(asg.root().unwrap()), target);
        assert_eq!(found.len(), 3);
    }
}
