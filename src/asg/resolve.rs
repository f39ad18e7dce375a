use tracing::trace;

use super::{
    builtins::builtin_type, Asg, CompileError, ErrorKind, NodeId, NodeKind, NodeRef,
};

impl Asg {
    fn resolve_in_store(&self, store: &[NodeId], name: &str) -> Option<NodeRef> {
        store
            .iter()
            .find(|id| matches!(self.kind(**id), NodeKind::Decl(decl) if decl.label_name == name))
            .map(|id| NodeRef::Node(*id))
    }

    /// Resolves `name` from the lexical position of `node`, walking towards
    /// the root.
    pub fn resolve_up(&self, node: NodeRef, name: &str) -> Option<NodeRef> {
        let id = match node {
            NodeRef::Node(id) => id,
            NodeRef::BuiltinPackage(pkg) => return (pkg.name == name).then_some(node),
            NodeRef::Builtin(_) => return None,
        };
        let parent = self.node(id).parent.map(NodeRef::Node);

        match self.kind(id) {
            NodeKind::Package(pkg) => (pkg.name == name).then_some(node),
            NodeKind::File(file) => self
                .resolve_in_store(&file.decls, name)
                .or_else(|| file.imports.get(name).copied())
                .or_else(|| {
                    // top level declarations are visible in every file of the package
                    let pkg = self.package(self.node(id).parent?)?;
                    pkg.files
                        .iter()
                        .filter(|other| **other != id)
                        .find_map(|other| self.resolve_in_store(self.decl_store(*other)?, name))
                })
                .or_else(|| self.resolve_up(parent?, name)),
            NodeKind::Struct(s) => self
                .resolve_in_store(&s.decls, name)
                .or_else(|| self.resolve_up(parent?, name)),
            NodeKind::Decl(_) | NodeKind::Reference(_) | NodeKind::Value(_) => self.resolve_up(parent?, name),
        }
    }

    /// Resolves `name` inside the scope `node` opens, without leaving it.
    pub fn resolve_down(&self, node: NodeRef, name: &str) -> Option<NodeRef> {
        let id = match node {
            NodeRef::Node(id) => id,
            NodeRef::BuiltinPackage(pkg) => {
                if pkg.name == name {
                    return Some(node);
                }
                return pkg.builtin(name).map(NodeRef::Builtin);
            }
            NodeRef::Builtin(_) => return None,
        };

        match self.kind(id) {
            NodeKind::Package(pkg) => {
                if pkg.name == name {
                    return Some(node);
                }
                pkg.files
                    .iter()
                    .find_map(|file| self.resolve_down(NodeRef::Node(*file), name))
            }
            NodeKind::File(file) => self.resolve_in_store(&file.decls, name),
            NodeKind::Struct(s) => self.resolve_in_store(&s.decls, name),
            NodeKind::Decl(decl) => decl
                .values
                .iter()
                .find_map(|value| self.resolve_down(NodeRef::Node(*value), name)),
            NodeKind::Reference(_) | NodeKind::Value(_) => None,
        }
    }
}

/// Binds references to the nodes they denote.
///
/// A reference is resolved at most once; later calls return the memoized
/// node without walking the graph. `walks` counts the walks actually done.
pub struct Resolver<'a> {
    asg: &'a Asg,
    errors: &'a mut Vec<CompileError>,
    walks: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(asg: &'a Asg, errors: &'a mut Vec<CompileError>) -> Resolver<'a> {
        Resolver {
            asg,
            errors,
            walks: 0,
        }
    }

    pub fn walks(&self) -> usize {
        self.walks
    }

    /// Resolves every reference below `node`.
    pub fn resolve_all(&mut self, node: NodeId) {
        let asg = self.asg;
        let children: Vec<NodeId> = match asg.kind(node) {
            NodeKind::Package(pkg) => pkg.files.clone(),
            NodeKind::File(file) => file.decls.clone(),
            NodeKind::Struct(s) => s.decls.clone(),
            NodeKind::Decl(decl) => decl.labels.iter().chain(&decl.values).copied().collect(),
            NodeKind::Value(value) => value.children.clone(),
            NodeKind::Reference(_) => {
                self.resolve_reference(node);
                return;
            }
        };
        for child in children {
            self.resolve_all(child);
        }
    }

    pub fn resolve_reference(&mut self, id: NodeId) -> Option<NodeRef> {
        let asg = self.asg;
        let reference = asg.reference(id)?;
        if let Some(referenced) = reference.referenced() {
            return Some(referenced);
        }

        self.walks += 1;
        let start = NodeRef::Node(asg.node(id).parent?);
        let resolved = self.resolve_path(start, id)?;
        // a concurrent resolution of the same reference lands on the same node
        let _ = reference.referenced.set(resolved);
        trace!(reference = %asg.describe(NodeRef::Node(id)), to = %asg.describe(resolved), "resolved");
        Some(resolved)
    }

    fn resolve_path(&mut self, start: NodeRef, id: NodeId) -> Option<NodeRef> {
        let asg = self.asg;
        let reference = asg.reference(id)?;

        let Some((first, rest)) = reference.path.split_first() else {
            self.errors.push(CompileError::point(
                ErrorKind::NoLabels,
                reference.span.pos(),
                "no labels in expression",
            ));
            return None;
        };

        let Some(mut current) = asg.resolve_up(start, &first.name) else {
            if rest.is_empty() {
                if let Some(builtin) = builtin_type(&first.name) {
                    return Some(NodeRef::Builtin(builtin));
                }
            }
            self.errors.push(CompileError::range(
                ErrorKind::UnresolvedReference,
                first.span,
                format!("unresolved reference {}", first.name),
            ));
            return None;
        };

        for segment in rest {
            match asg.resolve_down(current, &segment.name) {
                Some(next) => current = next,
                None => {
                    // keep the partial result
                    self.errors.push(CompileError::range(
                        ErrorKind::UnresolvedReference,
                        segment.span,
                        format!("unresolved reference {}", segment.name),
                    ));
                    return Some(current);
                }
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::{builtins, Compilation};
    use crate::test_utils::{compile_overlay, offset_of, virtual_path};
    use crate::position::Pos;

    fn reference_at(compilation: &Compilation, file: &str, offset: usize) -> NodeId {
        let asg = &compilation.asg;
        let file = asg.sources().file_id(&virtual_path(file)).unwrap();
        let root = NodeRef::Node(asg.root().unwrap());
        match asg.find(root, Pos::new(file, offset)) {
            Some(NodeRef::Node(id)) if asg.reference(id).is_some() => id,
            other => panic!("no reference at {offset}: {other:?}"),
        }
    }

    fn label_of(asg: &Asg, node: NodeRef) -> String {
        match node {
            NodeRef::Node(id) => asg.decl(id).map(|d| d.label_name.clone()).unwrap_or_default(),
            NodeRef::Builtin(b) => b.name.clone(),
            NodeRef::BuiltinPackage(p) => p.id.to_string(),
        }
    }

    #[test]
    fn test_simple_reference() {
        let src = "a: 1\nb: a + 1";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);

        let asg = &compilation.asg;
        let reference = reference_at(&compilation, "a.cue", offset_of(src, "a + 1"));
        let referenced = asg.referenced(reference).unwrap();
        let decl = asg.decl(referenced.id().unwrap()).unwrap();
        assert_eq!(decl.label_name, "a");
        assert_eq!(decl.values.len(), 1);
        assert_eq!(asg.text(NodeRef::Node(decl.values[0])), Some("1"));
    }

    #[test]
    fn test_resolution_is_memoized() {
        let src = "a: 1\nb: a";
        let mut compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        let reference = reference_at(&compilation, "a.cue", src.rfind('a').unwrap());

        let Compilation { asg, errors, .. } = &mut compilation;
        let first = asg.referenced(reference).unwrap();
        let mut resolver = Resolver::new(asg, errors);
        let second = resolver.resolve_reference(reference).unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.walks(), 0);
    }

    #[test]
    fn test_dotted_path_resolves_down() {
        let src = "x: {\n\ty: {\n\t\tz: 1\n\t}\n}\nv: x.y.z";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);

        let reference = reference_at(&compilation, "a.cue", offset_of(src, "x.y.z"));
        let target = compilation.asg.referenced(reference).unwrap();
        assert_eq!(label_of(&compilation.asg, target), "z");
    }

    #[test]
    fn test_partial_resolution_records_error() {
        let src = "x: y: 1\nv: x.nope";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].message, "unresolved reference nope");

        let reference = reference_at(&compilation, "a.cue", offset_of(src, "x.nope"));
        let target = compilation.asg.referenced(reference).unwrap();
        assert_eq!(label_of(&compilation.asg, target), "x");
    }

    #[test]
    fn test_resolve_down_does_not_walk_up() {
        let src = "top: 1\nx: {}\nv: x.top";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].message, "unresolved reference top");
    }

    #[test]
    fn test_nested_scopes_are_not_shared() {
        let src = "a: {\n\tinner: 1\n}\nb: {\n\tc: inner\n}";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].message, "unresolved reference inner");

        let reference = reference_at(&compilation, "a.cue", offset_of(src, "inner\n}"));
        assert!(compilation.asg.referenced(reference).is_none());
    }

    #[test]
    fn test_builtin_fallback_only_for_single_segment() {
        let src = "a: int\nb: string.x";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert_eq!(compilation.errors.len(), 1);
        assert_eq!(compilation.errors[0].message, "unresolved reference string");

        let reference = reference_at(&compilation, "a.cue", offset_of(src, "int"));
        let target = compilation.asg.referenced(reference).unwrap();
        assert_eq!(target, NodeRef::Builtin(builtins::builtin_type("int").unwrap()));
    }

    #[test]
    fn test_declarations_visible_across_files() {
        let a = "package p\nx: y + 1";
        let b = "package p\ny: 2";
        let compilation = compile_overlay(&[("a.cue", a), ("b.cue", b)], "a.cue");
        assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);

        let reference = reference_at(&compilation, "a.cue", offset_of(a, "y + 1"));
        let target = compilation.asg.referenced(reference).unwrap();
        let decl_file = compilation.asg.span(target).unwrap().file;
        assert_eq!(
            compilation.asg.path(decl_file),
            Some(virtual_path("b.cue").as_path())
        );
    }

    #[test]
    fn test_own_file_shadows_other_files() {
        let a = "package p\ny: 1\nx: y";
        let b = "package p\ny: 2";
        let compilation = compile_overlay(&[("a.cue", a), ("b.cue", b)], "a.cue");
        let reference = reference_at(&compilation, "a.cue", offset_of(a, "x: y") + 3);
        let target = compilation.asg.referenced(reference).unwrap();
        let file = compilation.asg.span(target).unwrap().file;
        assert_eq!(compilation.asg.path(file), Some(virtual_path("a.cue").as_path()));
    }

    #[test]
    fn test_builtin_package_members() {
        let src = "import \"strings\"\nx: strings.ToUpper(\"a\")\ny: strings.Nope";
        let compilation = compile_overlay(&[("a.cue", src)], "a.cue");
        assert_eq!(compilation.errors.len(), 1, "{:?}", compilation.errors);

        let upper = reference_at(&compilation, "a.cue", offset_of(src, "strings.ToUpper"));
        let target = compilation.asg.referenced(upper).unwrap();
        let NodeRef::Builtin(builtin) = target else {
            panic!("expected builtin, got {target:?}");
        };
        assert!(builtin.is_function());
        assert_eq!(builtin.name, "ToUpper");

        let nope = reference_at(&compilation, "a.cue", offset_of(src, "strings.Nope"));
        let target = compilation.asg.referenced(nope).unwrap();
        assert!(matches!(target, NodeRef::BuiltinPackage(pkg) if pkg.id == "strings"));
    }
}
