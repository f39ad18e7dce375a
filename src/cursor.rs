//! Sibling linked tree view over an [`AdtGraph`].
//!
//! Cursors are built once per graph node: a node shared by several parents
//! gets a single cursor, linked under the first parent that reaches it.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    adt::{AdtGraph, AdtId, AdtKind, Feature},
    position::{Pos, Rangeable, Span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(u32);

#[derive(Debug, Clone)]
struct Cursor {
    node: AdtId,
    parent: Option<CursorId>,
    first_child: Option<CursorId>,
    last_child: Option<CursorId>,
    next_sibling: Option<CursorId>,
    previous_sibling: Option<CursorId>,
}

pub struct CursorTree<'g> {
    graph: &'g AdtGraph,
    cursors: Vec<Cursor>,
    mapping: HashMap<AdtId, CursorId>,
    root: CursorId,
}

impl<'g> CursorTree<'g> {
    pub fn new(graph: &'g AdtGraph, root: AdtId) -> CursorTree<'g> {
        let mut tree = CursorTree {
            graph,
            cursors: Vec::new(),
            mapping: HashMap::new(),
            root: CursorId(0),
        };
        tree.root = tree.create(root);
        tree
    }

    fn create(&mut self, node: AdtId) -> CursorId {
        if let Some(existing) = self.mapping.get(&node) {
            return *existing;
        }
        let id = CursorId(self.cursors.len() as u32);
        self.cursors.push(Cursor {
            node,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            previous_sibling: None,
        });
        self.mapping.insert(node, id);

        for child in self.graph.children(node) {
            self.add_child(id, child);
        }
        id
    }

    fn add_child(&mut self, parent: CursorId, node: AdtId) {
        let child = self.create(node);
        // shared nodes keep their first parent
        if child == self.root || child == parent || self.cursor(child).parent.is_some() {
            return;
        }

        match self.cursor(parent).last_child {
            None => {
                let cursor = self.cursor_mut(parent);
                cursor.first_child = Some(child);
                cursor.last_child = Some(child);
            }
            Some(last) => {
                self.cursor_mut(last).next_sibling = Some(child);
                self.cursor_mut(child).previous_sibling = Some(last);
                self.cursor_mut(parent).last_child = Some(child);
            }
        }
        self.cursor_mut(child).parent = Some(parent);
    }

    fn cursor(&self, id: CursorId) -> &Cursor {
        &self.cursors[id.0 as usize]
    }

    fn cursor_mut(&mut self, id: CursorId) -> &mut Cursor {
        &mut self.cursors[id.0 as usize]
    }

    pub fn root(&self) -> CursorId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn node(&self, id: CursorId) -> AdtId {
        self.cursor(id).node
    }

    pub fn kind(&self, id: CursorId) -> &'g AdtKind {
        &self.graph.node(self.node(id)).kind
    }

    pub fn parent(&self, id: CursorId) -> Option<CursorId> {
        self.cursor(id).parent
    }

    pub fn source(&self, id: CursorId) -> Option<Span> {
        self.graph.node(self.node(id)).source
    }

    /// Whether the node's source contains `pos`; nodes without source never do.
    pub fn contains(&self, id: CursorId, pos: Pos) -> bool {
        self.source(id).is_some_and(|span| span.contains(pos))
    }

    pub fn length(&self, id: CursorId) -> usize {
        self.source(id).map_or(0, |span| span.len())
    }

    fn depth(&self, id: CursorId) -> usize {
        std::iter::successors(self.parent(id), |p| self.parent(*p)).count()
    }

    pub fn children(&self, id: CursorId) -> Children<'_, 'g> {
        Children {
            tree: self,
            next: self.cursor(id).first_child,
        }
    }

    /// The other children of this node's parent, starting after it and
    /// wrapping around to the first child.
    pub fn siblings(&self, id: CursorId) -> Siblings<'_, 'g> {
        Siblings {
            tree: self,
            start: id,
            current: id,
            wrapped: false,
        }
    }

    /// Depth-first traversal in post-order: every child comes before its
    /// parent, each node exactly once.
    pub fn dfs(&self, id: CursorId) -> Dfs<'_, 'g> {
        Dfs {
            tree: self,
            stack: vec![(id, false)],
            seen: HashSet::new(),
        }
    }

    /// The shortest node below `id` containing `pos`. Among nodes of equal
    /// length the deepest wins, then the first in traversal order.
    pub fn smallest_surrounding_node(&self, id: CursorId, pos: Pos) -> Option<CursorId> {
        let mut best: Option<(usize, usize, CursorId)> = None;
        for cursor in self.dfs(id) {
            if !self.contains(cursor, pos) {
                continue;
            }
            let length = self.length(cursor);
            let depth = self.depth(cursor);
            let better = match best {
                None => true,
                Some((best_length, best_depth, _)) => {
                    length < best_length || (length == best_length && depth > best_depth)
                }
            };
            if better {
                best = Some((length, depth, cursor));
            }
        }
        best.map(|(_, _, cursor)| cursor)
    }

    /// Every field below `id`, grouped by label.
    pub fn get_decls(&self, id: CursorId) -> BTreeMap<Feature, Vec<CursorId>> {
        let mut decls: BTreeMap<Feature, Vec<CursorId>> = BTreeMap::new();
        for cursor in self.dfs(id) {
            if let AdtKind::Field { label, .. } = self.kind(cursor) {
                decls.entry(*label).or_default().push(cursor);
            }
        }
        decls
    }

    pub fn resolve_label(&self, id: CursorId, feature: Feature) -> Vec<CursorId> {
        self.get_decls(id).remove(&feature).unwrap_or_default()
    }

    /// Fields reached by following `features` as a path, one nesting level
    /// per feature.
    pub fn resolve_labels(&self, id: CursorId, features: &[Feature]) -> Vec<CursorId> {
        match features {
            [] => Vec::new(),
            [feature] => self.resolve_label(id, *feature),
            [feature, rest @ ..] => self
                .resolve_label(id, *feature)
                .into_iter()
                .flat_map(|field| {
                    self.children(field)
                        .flat_map(|value| self.resolve_labels(value, rest))
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    /// The nearest enclosing field, or the root.
    pub fn parent_scope(&self, id: CursorId) -> CursorId {
        let Some(parent) = self.parent(id) else {
            return id;
        };
        match self.kind(parent) {
            AdtKind::Field { .. } => parent,
            _ => self.parent_scope(parent),
        }
    }

    /// Values of the given fields, in order.
    pub fn conjuncts(&self, fields: &[CursorId]) -> Vec<AdtId> {
        fields
            .iter()
            .filter_map(|field| match self.kind(*field) {
                AdtKind::Field { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }
}

pub struct Children<'t, 'g> {
    tree: &'t CursorTree<'g>,
    next: Option<CursorId>,
}

impl Iterator for Children<'_, '_> {
    type Item = CursorId;

    fn next(&mut self) -> Option<CursorId> {
        let current = self.next?;
        self.next = self.tree.cursor(current).next_sibling;
        Some(current)
    }
}

pub struct Siblings<'t, 'g> {
    tree: &'t CursorTree<'g>,
    start: CursorId,
    current: CursorId,
    wrapped: bool,
}

impl Iterator for Siblings<'_, '_> {
    type Item = CursorId;

    fn next(&mut self) -> Option<CursorId> {
        let parent = self.tree.parent(self.start)?;
        let next = match self.tree.cursor(self.current).next_sibling {
            Some(next) => next,
            None if !self.wrapped => {
                self.wrapped = true;
                self.tree.cursor(parent).first_child?
            }
            None => return None,
        };
        if next == self.start {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

pub struct Dfs<'t, 'g> {
    tree: &'t CursorTree<'g>,
    /// Nodes with a flag telling whether their children are already pushed.
    stack: Vec<(CursorId, bool)>,
    seen: HashSet<CursorId>,
}

impl Iterator for Dfs<'_, '_> {
    type Item = CursorId;

    fn next(&mut self) -> Option<CursorId> {
        while let Some((current, expanded)) = self.stack.pop() {
            if expanded {
                return Some(current);
            }
            if !self.seen.insert(current) {
                continue;
            }
            self.stack.push((current, true));
            let children: Vec<_> = self.tree.children(current).collect();
            for child in children.into_iter().rev() {
                if !self.seen.contains(&child) {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adt::{lower_files, LabelIndex},
        position::FileId,
        syntax,
    };

    fn lower(src: &str) -> (AdtGraph, AdtId, LabelIndex) {
        let (file, errors) = syntax::parse_file(FileId(0), src);
        assert!(errors.is_empty(), "{errors:?}");
        let mut index = LabelIndex::new();
        let (graph, root) = lower_files(&[file], &mut index);
        (graph, root, index)
    }

    #[test]
    fn test_dfs_is_post_order() {
        let (graph, root, _) = lower("a: {b: 1}\nc: 2");
        let tree = CursorTree::new(&graph, root);
        let order: Vec<_> = tree.dfs(tree.root()).collect();

        assert_eq!(order.len(), tree.len());
        assert_eq!(*order.last().unwrap(), tree.root());
        for (i, cursor) in order.iter().enumerate() {
            for child in tree.children(*cursor) {
                let position = order.iter().position(|c| *c == child).unwrap();
                assert!(position < i);
            }
        }
    }

    #[test]
    fn test_shared_nodes_have_one_cursor() {
        let (graph, root, _) = lower("a: f(1)\nb: g(2)");
        let tree = CursorTree::new(&graph, root);
        // root, two fields, one shared top
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.dfs(tree.root()).count(), 4);
    }

    #[test]
    fn test_siblings_wrap_around() {
        let (graph, root, _) = lower("a: 1\nb: 2\nc: 3");
        let tree = CursorTree::new(&graph, root);
        let fields: Vec<_> = tree.children(tree.root()).collect();
        assert_eq!(fields.len(), 3);

        let siblings: Vec<_> = tree.siblings(fields[1]).collect();
        assert_eq!(siblings, vec![fields[2], fields[0]]);
        assert_eq!(tree.siblings(tree.root()).count(), 0);
    }

    #[test]
    fn test_smallest_surrounding_node() {
        let src = "a: {b: x}\nc: 2";
        let (graph, root, _) = lower(src);
        let tree = CursorTree::new(&graph, root);

        let pos = Pos::new(FileId(0), src.find('x').unwrap());
        let found = tree.smallest_surrounding_node(tree.root(), pos).unwrap();
        assert!(matches!(tree.kind(found), AdtKind::FieldReference { .. }));

        let pos = Pos::new(FileId(0), src.find('{').unwrap());
        let found = tree.smallest_surrounding_node(tree.root(), pos).unwrap();
        assert!(matches!(tree.kind(found), AdtKind::StructLit { .. }));
        assert_ne!(found, tree.root());

        assert!(tree
            .smallest_surrounding_node(tree.root(), Pos::new(FileId(1), 0))
            .is_none());
    }

    #[test]
    fn test_equal_length_prefers_deepest() {
        // the only field spans the whole file, like the root struct
        let src = "a: [x]";
        let (graph, root, _) = lower(src);
        let tree = CursorTree::new(&graph, root);
        let found = tree
            .smallest_surrounding_node(tree.root(), Pos::new(FileId(0), 0))
            .unwrap();
        assert!(matches!(tree.kind(found), AdtKind::Field { .. }));
    }

    #[test]
    fn test_resolve_labels_across_sites() {
        let src = "a: {b: 1}\na: {b: int}\nc: {b: 2}";
        let (graph, root, mut index) = lower(src);
        let tree = CursorTree::new(&graph, root);

        let a = index.feature("a");
        let b = index.feature("b");
        assert_eq!(tree.resolve_label(tree.root(), a).len(), 2);
        // every `b`, at any depth
        assert_eq!(tree.resolve_label(tree.root(), b).len(), 3);

        let a_b = tree.resolve_labels(tree.root(), &[a, b]);
        assert_eq!(a_b.len(), 2);
        let conjuncts = tree.conjuncts(&a_b);
        assert!(matches!(graph.node(conjuncts[0]).kind, AdtKind::Literal(_)));
        assert!(matches!(graph.node(conjuncts[1]).kind, AdtKind::FieldReference { .. }));

        assert!(tree.resolve_labels(tree.root(), &[]).is_empty());
    }

    #[test]
    fn test_parent_scope() {
        let src = "a: {b: x}";
        let (graph, root, _) = lower(src);
        let tree = CursorTree::new(&graph, root);
        let pos = Pos::new(FileId(0), src.find('x').unwrap());
        let reference = tree.smallest_surrounding_node(tree.root(), pos).unwrap();

        let b = tree.parent_scope(reference);
        assert!(matches!(tree.kind(b), AdtKind::Field { .. }));
        let a = tree.parent_scope(b);
        assert!(matches!(tree.kind(a), AdtKind::Field { .. }));
        assert_ne!(a, b);
        assert_eq!(tree.parent_scope(a), tree.root());
        assert_eq!(tree.parent_scope(tree.root()), tree.root());
    }
}
