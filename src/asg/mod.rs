//! The abstract semantic graph.
//!
//! A compiled package is stored in an arena ([`Asg`]) of [`Node`]s addressed
//! by [`NodeId`]. Ownership is top-down (a package lists its files, a file its
//! declarations, ...) and every node keeps a plain index to its parent.
//! Builtins live outside the arena in the process-wide registry and are
//! referred to through [`NodeRef`].
//!
//! # Node variants
//!
//! | Variant   | Children                          | Scope |
//! |-----------|-----------------------------------|-------|
//! | Package   | files (and builtins if builtin)   | root  |
//! | File      | decls, imports                    | yes   |
//! | Struct    | decls                             | yes   |
//! | Decl      | labels, values (conjuncts)        | no    |
//! | Reference | its referent, once resolved       | no    |
//! | Value     | sub expressions                   | no    |
//! | Builtin   | none                              | no    |

pub mod builtins;
mod compiler;
mod errors;
mod resolve;
pub mod visitor;
pub mod visitors;

use std::{
    collections::BTreeMap,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use once_cell::sync::OnceCell;

use crate::{
    position::{FileId, Pos, Rangeable, SourceMap, Span},
    syntax::LitKind,
};

pub use builtins::{Builtin, BuiltinKind, BuiltinPackage};
pub use compiler::{Compilation, Compiler};
pub use errors::{CompileError, ErrorKind, ErrorSpan};
pub use resolve::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to any node of the graph, including the builtins outside the arena.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef {
    Node(NodeId),
    Builtin(&'static Builtin),
    BuiltinPackage(&'static BuiltinPackage),
}

impl NodeRef {
    pub fn id(&self) -> Option<NodeId> {
        match self {
            NodeRef::Node(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> NodeRef {
        NodeRef::Node(id)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &NodeRef) -> bool {
        match (self, other) {
            (NodeRef::Node(a), NodeRef::Node(b)) => a == b,
            (NodeRef::Builtin(a), NodeRef::Builtin(b)) => std::ptr::eq(*a, *b),
            (NodeRef::BuiltinPackage(a), NodeRef::BuiltinPackage(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            NodeRef::Node(id) => id.hash(state),
            NodeRef::Builtin(b) => std::ptr::hash(*b, state),
            NodeRef::BuiltinPackage(p) => std::ptr::hash(*p, state),
        }
    }
}

#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub display_path: String,
    pub dir: PathBuf,
    pub files: Vec<NodeId>,
}

#[derive(Debug)]
pub struct File {
    pub id: FileId,
    pub path: PathBuf,
    pub span: Span,
    pub decls: Vec<NodeId>,
    /// Import alias to imported package, a builtin package or a compiled one.
    pub imports: BTreeMap<String, NodeRef>,
}

#[derive(Debug)]
pub struct Struct {
    pub span: Span,
    pub decls: Vec<NodeId>,
}

/// All declarations of one label inside one scope.
#[derive(Debug)]
pub struct Decl {
    /// Empty for embeddings and dynamic labels; those are never merged.
    pub label_name: String,
    pub labels: Vec<NodeId>,
    pub values: Vec<NodeId>,
    /// Source range of every merged declaration, in source order.
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub span: Span,
}

#[derive(Debug)]
pub struct Reference {
    pub span: Span,
    /// `a.b.c` is `[a, b, c]`.
    pub path: Vec<Segment>,
    referenced: OnceCell<NodeRef>,
}

impl Reference {
    pub fn new(span: Span, path: Vec<Segment>) -> Reference {
        Reference {
            span,
            path,
            referenced: OnceCell::new(),
        }
    }

    pub fn referenced(&self) -> Option<NodeRef> {
        self.referenced.get().copied()
    }

    pub fn is_resolved(&self) -> bool {
        self.referenced.get().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Label,
    Literal(LitKind),
    List,
    Interpolation,
    Paren,
    Call,
    Unary,
    Index,
    Selector,
    Bad,
}

#[derive(Debug)]
pub struct Value {
    pub span: Span,
    pub kind: ValueKind,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub enum NodeKind {
    Package(Package),
    File(File),
    Struct(Struct),
    Decl(Decl),
    Reference(Reference),
    Value(Value),
}

#[derive(Debug)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Arena holding every package of one compilation.
#[derive(Debug, Default)]
pub struct Asg {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    sources: SourceMap,
}

impl Asg {
    /// The package the compilation was started for.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { parent, kind });
        NodeId((self.nodes.len() - 1) as u32)
    }

    fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn package(&self, id: NodeId) -> Option<&Package> {
        match self.kind(id) {
            NodeKind::Package(pkg) => Some(pkg),
            _ => None,
        }
    }

    pub fn file(&self, id: NodeId) -> Option<&File> {
        match self.kind(id) {
            NodeKind::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn decl(&self, id: NodeId) -> Option<&Decl> {
        match self.kind(id) {
            NodeKind::Decl(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn reference(&self, id: NodeId) -> Option<&Reference> {
        match self.kind(id) {
            NodeKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        match self.kind(id) {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Declarations of a File or a Struct.
    pub fn decl_store(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id) {
            NodeKind::File(file) => Some(&file.decls),
            NodeKind::Struct(s) => Some(&s.decls),
            _ => None,
        }
    }

    /// The node a resolved reference points to.
    pub fn referenced(&self, id: NodeId) -> Option<NodeRef> {
        self.reference(id)?.referenced()
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        match node {
            NodeRef::Node(id) => self.node(id).parent.map(NodeRef::Node),
            NodeRef::Builtin(_) | NodeRef::BuiltinPackage(_) => None,
        }
    }

    /// Source range of a node. Packages and builtins have none.
    pub fn span(&self, node: NodeRef) -> Option<Span> {
        let NodeRef::Node(id) = node else {
            return None;
        };
        match self.kind(id) {
            NodeKind::Package(_) => None,
            NodeKind::File(file) => Some(file.span),
            NodeKind::Struct(s) => Some(s.span),
            NodeKind::Decl(decl) => decl.spans.first().copied(),
            NodeKind::Reference(reference) => Some(reference.span),
            NodeKind::Value(value) => Some(value.span),
        }
    }

    pub fn path(&self, file: FileId) -> Option<&Path> {
        self.sources.path(file)
    }

    /// Source text of a node.
    pub fn text(&self, node: NodeRef) -> Option<&str> {
        self.sources.slice(self.span(node)?)
    }

    /// The most specific node below `node` whose range contains `pos`.
    pub fn find(&self, node: NodeRef, pos: Pos) -> Option<NodeRef> {
        let NodeRef::Node(id) = node else {
            return None;
        };
        let first_match = |ids: &[NodeId]| ids.iter().find_map(|child| self.find(NodeRef::Node(*child), pos));

        match self.kind(id) {
            NodeKind::Package(pkg) => first_match(&pkg.files),
            NodeKind::File(file) => first_match(&file.decls)
                .or_else(|| {
                    file.imports
                        .values()
                        .filter(|imported| matches!(imported, NodeRef::Node(_)))
                        .find_map(|imported| self.find(*imported, pos))
                })
                .or_else(|| file.span.contains(pos).then_some(node)),
            NodeKind::Struct(s) => {
                if !s.span.contains(pos) {
                    return None;
                }
                first_match(&s.decls).or(Some(node))
            }
            NodeKind::Decl(decl) => first_match(&decl.labels)
                .or_else(|| first_match(&decl.values))
                .or_else(|| decl.spans.iter().any(|span| span.contains(pos)).then_some(node)),
            NodeKind::Reference(reference) => reference.span.contains(pos).then_some(node),
            NodeKind::Value(value) => {
                first_match(&value.children).or_else(|| value.span.contains(pos).then_some(node))
            }
        }
    }

    /// Human readable variant name, used by logs and tests.
    pub fn describe(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Builtin(b) => format!("Builtin({})", b.name),
            NodeRef::BuiltinPackage(p) => format!("Package({})", p.id),
            NodeRef::Node(id) => match self.kind(id) {
                NodeKind::Package(pkg) => format!("Package({})", pkg.display_path),
                NodeKind::File(file) => format!("File({})", file.path.display()),
                NodeKind::Struct(_) => "Struct".to_string(),
                NodeKind::Decl(decl) => format!("Decl({})", decl.label_name),
                NodeKind::Reference(reference) => format!(
                    "Reference({})",
                    reference.path.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(".")
                ),
                NodeKind::Value(value) => format!("Value({:?})", value.kind),
            },
        }
    }
}
