//! Generic traversal of the semantic graph.
//!
//! A [`Visitor`] gets one callback per node variant. Each callback decides
//! whether the walk continues into the node's children, towards its parent,
//! or both. Callbacks that are not overridden fall back to a more general
//! one: packages, declarations, values, references and builtins use
//! [`Visitor::node`], files and structs use [`Visitor::decl_store`] which in
//! turn uses [`Visitor::node`]. Only the most specific callback runs for a
//! node.
//!
//! Every node is visited at most once per walk, so reference cycles such as
//! `a: a` terminate.

use std::collections::HashSet;

use super::{Asg, Builtin, NodeId, NodeKind, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// What to do after a callback: continue into the children, to the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow {
    pub down: bool,
    pub up: bool,
}

impl Flow {
    pub const STOP: Flow = Flow {
        down: false,
        up: false,
    };
    pub const DOWN: Flow = Flow {
        down: true,
        up: false,
    };
    pub const UP: Flow = Flow {
        down: false,
        up: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageFlow {
    pub files: bool,
    pub builtins: bool,
    pub up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlow {
    pub decls: bool,
    pub imports: bool,
    pub up: bool,
}

pub trait Visitor {
    fn node(&mut self, _asg: &Asg, _node: NodeRef) -> Flow {
        Flow::STOP
    }

    fn decl_store(&mut self, asg: &Asg, id: NodeId) -> Flow {
        self.node(asg, NodeRef::Node(id))
    }

    /// Called for compiled packages and builtin packages alike.
    fn package(&mut self, asg: &Asg, package: NodeRef) -> PackageFlow {
        let flow = self.node(asg, package);
        PackageFlow {
            files: flow.down,
            builtins: flow.down,
            up: flow.up,
        }
    }

    fn file(&mut self, asg: &Asg, id: NodeId) -> FileFlow {
        let flow = self.decl_store(asg, id);
        FileFlow {
            decls: flow.down,
            imports: flow.down,
            up: flow.up,
        }
    }

    fn structure(&mut self, asg: &Asg, id: NodeId) -> Flow {
        self.decl_store(asg, id)
    }

    fn decl(&mut self, asg: &Asg, id: NodeId) -> Flow {
        self.node(asg, NodeRef::Node(id))
    }

    fn value(&mut self, asg: &Asg, id: NodeId) -> Flow {
        self.node(asg, NodeRef::Node(id))
    }

    fn reference(&mut self, asg: &Asg, id: NodeId) -> Flow {
        self.node(asg, NodeRef::Node(id))
    }

    /// Builtins are leaves; the result of the fallback is ignored.
    fn builtin(&mut self, asg: &Asg, builtin: &'static Builtin) {
        self.node(asg, NodeRef::Builtin(builtin));
    }
}

/// Walks the graph from `start`, calling `visitor` for each node reached.
pub fn walk<V: Visitor + ?Sized>(asg: &Asg, visitor: &mut V, start: NodeRef, direction: Direction) {
    Walk {
        asg,
        visitor,
        direction,
        seen: HashSet::new(),
    }
    .visit(start);
}

struct Walk<'a, V: ?Sized> {
    asg: &'a Asg,
    visitor: &'a mut V,
    direction: Direction,
    seen: HashSet<NodeRef>,
}

impl<V: Visitor + ?Sized> Walk<'_, V> {
    fn visit(&mut self, node: NodeRef) {
        if !self.seen.insert(node) {
            return;
        }
        let asg = self.asg;
        let down = self.direction == Direction::Down;

        let id = match node {
            NodeRef::Builtin(builtin) => {
                self.visitor.builtin(asg, builtin);
                return;
            }
            NodeRef::BuiltinPackage(package) => {
                let flow = self.visitor.package(asg, node);
                if down && flow.builtins {
                    for builtin in &package.builtins {
                        self.visit(NodeRef::Builtin(builtin));
                    }
                }
                return;
            }
            NodeRef::Node(id) => id,
        };

        let up = match asg.kind(id) {
            NodeKind::Package(package) => {
                let flow = self.visitor.package(asg, node);
                if down && flow.files {
                    self.visit_all(&package.files);
                }
                flow.up
            }
            NodeKind::File(file) => {
                let flow = self.visitor.file(asg, id);
                if down && flow.decls {
                    self.visit_all(&file.decls);
                }
                if down && flow.imports {
                    for imported in file.imports.values() {
                        self.visit(*imported);
                    }
                }
                flow.up
            }
            NodeKind::Struct(s) => {
                let flow = self.visitor.structure(asg, id);
                if down && flow.down {
                    self.visit_all(&s.decls);
                }
                flow.up
            }
            NodeKind::Decl(decl) => {
                let flow = self.visitor.decl(asg, id);
                if down && flow.down {
                    self.visit_all(&decl.values);
                }
                flow.up
            }
            NodeKind::Value(value) => {
                let flow = self.visitor.value(asg, id);
                if down && flow.down {
                    self.visit_all(&value.children);
                }
                flow.up
            }
            NodeKind::Reference(reference) => {
                let flow = self.visitor.reference(asg, id);
                if down && flow.down {
                    if let Some(referenced) = reference.referenced() {
                        self.visit(referenced);
                    }
                }
                flow.up
            }
        };

        if !down && up {
            if let Some(parent) = asg.parent(node) {
                self.visit(parent);
            }
        }
    }

    fn visit_all(&mut self, ids: &[NodeId]) {
        for id in ids {
            self.visit(NodeRef::Node(*id));
        }
    }
}
