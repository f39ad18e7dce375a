//! A small lowered graph of evaluation nodes.
//!
//! Field names are interned into [`Feature`]s through a [`LabelIndex`] so
//! nodes compare labels without comparing strings. The graph is an arena;
//! a child may be shared by several parents.

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use crate::{
    position::Span,
    syntax::{self, BinaryOp, Expr, Label, LitKind, UnaryOp},
};

/// Interned label name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Feature(u32);

impl Feature {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maps label names to features. Lookups fall through to the parent index,
/// new names are added to the child.
#[derive(Debug)]
pub struct LabelIndex {
    labels: Vec<String>,
    label_map: HashMap<String, u32>,
    offset: u32,
    parent: Option<Arc<LabelIndex>>,
}

/// Labels common to every index. Index 0 is `_`, the empty name maps there too.
static SHARED_INDEX: Lazy<Arc<LabelIndex>> = Lazy::new(|| {
    Arc::new(LabelIndex {
        labels: vec!["_".to_string()],
        label_map: HashMap::from([("_".to_string(), 0), (String::new(), 0)]),
        offset: 0,
        parent: None,
    })
});

impl LabelIndex {
    pub fn new() -> LabelIndex {
        LabelIndex::with_parent(SHARED_INDEX.clone())
    }

    pub fn with_parent(parent: Arc<LabelIndex>) -> LabelIndex {
        LabelIndex {
            labels: Vec::new(),
            label_map: HashMap::new(),
            offset: parent.offset + parent.labels.len() as u32,
            parent: Some(parent),
        }
    }

    pub fn feature(&mut self, name: &str) -> Feature {
        let mut index = Some(&*self);
        while let Some(current) = index {
            if let Some(found) = current.label_map.get(name) {
                return Feature(*found);
            }
            index = current.parent.as_deref();
        }

        let feature = self.offset + self.labels.len() as u32;
        self.label_map.insert(name.to_string(), feature);
        self.labels.push(name.to_string());
        Feature(feature)
    }

    pub fn label(&self, feature: Feature) -> Option<&str> {
        let mut index = self;
        while feature.0 < index.offset {
            index = index.parent.as_deref()?;
        }
        index
            .labels
            .get((feature.0 - index.offset) as usize)
            .map(String::as_str)
    }
}

impl Default for LabelIndex {
    fn default() -> LabelIndex {
        LabelIndex::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdtId(u32);

impl AdtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdtKind {
    StructLit { decls: Vec<AdtId> },
    ListLit { elems: Vec<AdtId> },
    Conjunction { values: Vec<AdtId> },
    Field { label: Feature, value: AdtId },
    BinaryExpr { op: BinaryOp, x: AdtId, y: AdtId },
    UnaryExpr { op: UnaryOp, x: AdtId },
    SelectorExpr { x: AdtId, sel: Feature },
    FieldReference { label: Feature },
    Literal(LitKind),
    Top,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdtNode {
    pub kind: AdtKind,
    pub source: Option<Span>,
}

#[derive(Debug, Default)]
pub struct AdtGraph {
    nodes: Vec<AdtNode>,
    top: Option<AdtId>,
}

impl AdtGraph {
    pub fn node(&self, id: AdtId) -> &AdtNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children, in source order.
    pub fn children(&self, id: AdtId) -> Vec<AdtId> {
        match &self.node(id).kind {
            AdtKind::StructLit { decls } => decls.clone(),
            AdtKind::ListLit { elems } => elems.clone(),
            AdtKind::Conjunction { values } => values.clone(),
            AdtKind::Field { value, .. } => vec![*value],
            AdtKind::BinaryExpr { x, y, .. } => vec![*x, *y],
            AdtKind::UnaryExpr { x, .. } | AdtKind::SelectorExpr { x, .. } => vec![*x],
            AdtKind::FieldReference { .. } | AdtKind::Literal(_) | AdtKind::Top => Vec::new(),
        }
    }

    fn push(&mut self, kind: AdtKind, source: Option<Span>) -> AdtId {
        self.nodes.push(AdtNode { kind, source });
        AdtId((self.nodes.len() - 1) as u32)
    }

    /// The single `_` node every unsupported expression lowers to.
    fn top(&mut self) -> AdtId {
        match self.top {
            Some(top) => top,
            None => {
                let top = self.push(AdtKind::Top, None);
                self.top = Some(top);
                top
            }
        }
    }
}

/// Lowers the files of one package into a single root struct.
pub fn lower_files(files: &[syntax::File], index: &mut LabelIndex) -> (AdtGraph, AdtId) {
    let mut lower = Lower {
        graph: AdtGraph::default(),
        index,
    };
    let decls = files
        .iter()
        .flat_map(|file| file.decls.iter())
        .filter_map(|decl| lower.decl(decl))
        .collect();
    let source = match files {
        [file] => Some(file.span),
        _ => None,
    };
    let root = lower.graph.push(AdtKind::StructLit { decls }, source);
    (lower.graph, root)
}

struct Lower<'a> {
    graph: AdtGraph,
    index: &'a mut LabelIndex,
}

impl Lower<'_> {
    fn decl(&mut self, decl: &syntax::Decl) -> Option<AdtId> {
        match decl {
            syntax::Decl::Field(field) => {
                let label = match &field.label {
                    Label::Dynamic(_) => Feature(0),
                    label => self.index.feature(&label.name().unwrap_or_default()),
                };
                let value = self.expr(&field.value);
                Some(self.graph.push(AdtKind::Field { label, value }, Some(field.span)))
            }
            syntax::Decl::Embed(expr) => Some(self.expr(expr)),
            syntax::Decl::Bad(_) => None,
        }
    }

    fn expr(&mut self, expr: &Expr) -> AdtId {
        let source = Some(expr.span());
        match expr {
            Expr::Ident(ident) => {
                let label = self.index.feature(&ident.name);
                self.graph.push(AdtKind::FieldReference { label }, source)
            }
            Expr::Selector { x, sel, .. } => {
                let x = self.expr(x);
                let sel = self.index.feature(&sel.name);
                self.graph.push(AdtKind::SelectorExpr { x, sel }, source)
            }
            Expr::Lit(lit) => self.graph.push(AdtKind::Literal(lit.kind), source),
            Expr::Struct(lit) => {
                let decls = lit.elts.iter().filter_map(|decl| self.decl(decl)).collect();
                self.graph.push(AdtKind::StructLit { decls }, source)
            }
            Expr::List { elts, .. } => {
                let elems = elts.iter().map(|elt| self.expr(elt)).collect();
                self.graph.push(AdtKind::ListLit { elems }, source)
            }
            Expr::Binary {
                op: BinaryOp::And,
                ..
            } => {
                let mut values = Vec::new();
                self.conjuncts(expr, &mut values);
                self.graph.push(AdtKind::Conjunction { values }, source)
            }
            Expr::Binary { op, x, y, .. } => {
                let x = self.expr(x);
                let y = self.expr(y);
                self.graph.push(AdtKind::BinaryExpr { op: *op, x, y }, source)
            }
            Expr::Unary { op, x, .. } => {
                let x = self.expr(x);
                self.graph.push(AdtKind::UnaryExpr { op: *op, x }, source)
            }
            Expr::Paren { x, .. } => self.expr(x),
            Expr::Call { .. } | Expr::Index { .. } | Expr::Interpolation { .. } | Expr::Bad(_) => self.graph.top(),
        }
    }

    /// Flattens `a & b & c` into one conjunction.
    fn conjuncts(&mut self, expr: &Expr, values: &mut Vec<AdtId>) {
        match expr {
            Expr::Binary {
                op: BinaryOp::And,
                x,
                y,
                ..
            } => {
                self.conjuncts(x, values);
                self.conjuncts(y, values);
            }
            other => values.push(self.expr(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FileId;

    #[test]
    fn test_label_index_shares_parent() {
        let mut index = LabelIndex::new();
        assert_eq!(index.feature(""), Feature(0));
        assert_eq!(index.feature("_"), Feature(0));
        assert_eq!(index.label(Feature(0)), Some("_"));

        let a = index.feature("a");
        let b = index.feature("b");
        assert_eq!(a, Feature(1));
        assert_eq!(b, Feature(2));
        assert_eq!(index.feature("a"), a);
        assert_eq!(index.label(b), Some("b"));
        assert_eq!(index.label(Feature(42)), None);

        let parent = Arc::new(index);
        let mut child = LabelIndex::with_parent(parent.clone());
        assert_eq!(child.feature("a"), a);
        let c = child.feature("c");
        assert_eq!(c, Feature(3));
        assert_eq!(child.label(a), Some("a"));
        assert_eq!(parent.label(c), None);
    }

    #[test]
    fn test_lower_fields_and_conjunctions() {
        let src = "a: int & >=0\nb: {c: a}\nd: [1, f(2)]\ne: g(3)";
        let (file, errors) = syntax::parse_file(FileId(0), src);
        assert!(errors.is_empty(), "{errors:?}");

        let mut index = LabelIndex::new();
        let (graph, root) = lower_files(&[file], &mut index);
        let AdtKind::StructLit { decls } = &graph.node(root).kind else {
            panic!("root is not a struct");
        };
        assert_eq!(decls.len(), 4);

        let AdtKind::Field { label, value } = graph.node(decls[0]).kind.clone() else {
            panic!("expected a field");
        };
        assert_eq!(index.label(label), Some("a"));
        assert!(matches!(&graph.node(value).kind, AdtKind::Conjunction { values } if values.len() == 2));

        // calls share the one top node
        let AdtKind::Field { value: list, .. } = graph.node(decls[2]).kind.clone() else {
            panic!("expected a field");
        };
        let AdtKind::Field { value: call, .. } = graph.node(decls[3]).kind.clone() else {
            panic!("expected a field");
        };
        assert_eq!(graph.children(list)[1], call);
        assert_eq!(graph.node(call).source, None);
    }
}
