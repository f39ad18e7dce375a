use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    load::{InstanceId, Instances, LoadConfig, Loader, ParseHook},
    position::FileId,
    syntax::{self, Decl as AstDecl, Expr, Label, StructLit},
};

use super::{
    builtins::builtin_package, Asg, CompileError, Decl, ErrorKind, File, NodeId, NodeKind, NodeRef,
    Package, Reference, Resolver, Segment, Struct, Value, ValueKind,
};

/// Result of compiling one package: the graph and every non-fatal error met
/// on the way, parse errors first.
#[derive(Debug, Default)]
pub struct Compilation {
    pub asg: Asg,
    pub errors: Vec<CompileError>,
}

impl Compilation {
    pub fn package(&self) -> Option<NodeId> {
        self.asg.root()
    }
}

/// Builds semantic graphs from the instances a [`Loader`] produces.
#[derive(Clone)]
pub struct Compiler {
    loader: Arc<dyn Loader>,
    config: LoadConfig,
}

impl Compiler {
    pub fn new(loader: Arc<dyn Loader>, config: LoadConfig) -> Compiler {
        Compiler { loader, config }
    }

    /// Compiles the package `path` belongs to, together with everything it
    /// imports. Fails only when the loader finds no instance at all.
    pub fn compile_file(&self, path: &Path) -> Result<Compilation, CompileError> {
        let parse_errors = Arc::new(Mutex::new(Vec::<CompileError>::new()));
        let hook: ParseHook = {
            let parse_errors = parse_errors.clone();
            Arc::new(move |id: FileId, _path: &Path, source: &str| {
                let (file, errors) = syntax::parse_file(id, source);
                parse_errors.lock().extend(errors.into_iter().map(CompileError::from));
                file
            })
        };
        let config = self.config.clone().with_parse_hook(hook);

        let instances = self.loader.load_instances(&[path.to_path_buf()], &config);
        let Some(root) = instances.roots.first().copied() else {
            return Err(CompileError::new(
                ErrorKind::NoInstance,
                format!("failed to load any instance for path: {}", path.display()),
            ));
        };

        let mut state = CompileState {
            instances: &instances,
            asg: Asg::default(),
            index: HashMap::new(),
            errors: Vec::new(),
        };
        let package = state.compile_instance(root);
        let CompileState { mut asg, errors, .. } = state;

        asg.root = package;
        asg.sources = instances.sources;

        let mut all_errors = std::mem::take(&mut *parse_errors.lock());
        all_errors.extend(errors);
        info!(path = %path.display(), nodes = asg.len(), errors = all_errors.len(), "compiled");

        Ok(Compilation {
            asg,
            errors: all_errors,
        })
    }
}

struct PackageEntry {
    package: NodeId,
    complete: bool,
}

struct CompileState<'a> {
    instances: &'a Instances,
    asg: Asg,
    /// Packages by directory; an incomplete entry is still being compiled.
    index: HashMap<PathBuf, PackageEntry>,
    errors: Vec<CompileError>,
}

impl CompileState<'_> {
    /// `None` when the instance is already being compiled further up the
    /// import chain.
    fn compile_instance(&mut self, id: InstanceId) -> Option<NodeId> {
        let instances = self.instances;
        let instance = instances.instance(id)?;
        if let Some(entry) = self.index.get(&instance.dir) {
            return entry.complete.then_some(entry.package);
        }

        let package = self.asg.push(
            None,
            NodeKind::Package(Package {
                name: instance.pkg_name.clone().unwrap_or_default(),
                display_path: instance.display_path.clone(),
                dir: instance.dir.clone(),
                files: Vec::new(),
            }),
        );
        self.index.insert(
            instance.dir.clone(),
            PackageEntry {
                package,
                complete: false,
            },
        );

        for (_, imported) in instances.imports(id) {
            self.compile_instance(imported);
        }

        for file in &instance.files {
            let file = self.compile_file(id, package, file);
            if let NodeKind::Package(pkg) = self.asg.kind_mut(package) {
                pkg.files.push(file);
            }
        }

        Resolver::new(&self.asg, &mut self.errors).resolve_all(package);

        if let Some(entry) = self.index.get_mut(&instance.dir) {
            entry.complete = true;
        }
        debug!(package = %instance.display_path, "package complete");
        Some(package)
    }

    fn compile_file(&mut self, instance: InstanceId, package: NodeId, file: &syntax::File) -> NodeId {
        let path = self
            .instances
            .sources
            .path(file.id)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let id = self.asg.push(
            Some(package),
            NodeKind::File(File {
                id: file.id,
                path,
                span: file.span,
                decls: Vec::new(),
                imports: BTreeMap::new(),
            }),
        );

        let mut imports = BTreeMap::new();
        for spec in &file.imports {
            let Some(import_path) = spec.path_value() else {
                continue;
            };
            let alias = match &spec.name {
                Some(name) => name.name.clone(),
                None => import_alias(&import_path).to_string(),
            };

            let imported = if let Some(builtin) = builtin_package(&import_path) {
                NodeRef::BuiltinPackage(builtin)
            } else if let Some(target) = self.instances.lookup_import(instance, &import_path) {
                match self.compile_instance(target) {
                    Some(package) => NodeRef::Node(package),
                    None => {
                        let display = self
                            .instances
                            .instance(target)
                            .map(|i| i.display_path.clone())
                            .unwrap_or(import_path);
                        self.errors.push(CompileError::range(
                            ErrorKind::ReferenceCycle,
                            spec.span,
                            format!("package {display} is in a reference cycle"),
                        ));
                        continue;
                    }
                }
            } else {
                self.errors.push(CompileError::range(
                    ErrorKind::ImportNotFound,
                    spec.span,
                    format!("unable to find import with path {import_path}"),
                ));
                continue;
            };

            if imports.contains_key(&alias) {
                self.errors.push(CompileError::point(
                    ErrorKind::ImportCollision,
                    spec.span.pos(),
                    format!("identifier {alias} already used for another import"),
                ));
                continue;
            }
            imports.insert(alias, imported);
        }
        if let NodeKind::File(f) = self.asg.kind_mut(id) {
            f.imports = imports;
        }

        for decl in &file.decls {
            self.compile_decl(id, decl);
        }
        id
    }

    fn push_decl(&mut self, store: NodeId, decl: NodeId) {
        match self.asg.kind_mut(store) {
            NodeKind::File(file) => file.decls.push(decl),
            NodeKind::Struct(s) => s.decls.push(decl),
            _ => {}
        }
    }

    /// Existing declaration of `name` in a file or struct.
    fn existing_decl(&self, store: NodeId, name: &str) -> Option<NodeId> {
        if name.is_empty() {
            return None;
        }
        self.asg
            .decl_store(store)?
            .iter()
            .copied()
            .find(|id| self.asg.decl(*id).is_some_and(|decl| decl.label_name == name))
    }

    fn compile_decl(&mut self, store: NodeId, decl: &AstDecl) {
        match decl {
            AstDecl::Field(field) => {
                let label_name = field.label.name().unwrap_or_default();
                let id = match self.existing_decl(store, &label_name) {
                    Some(existing) => {
                        if let NodeKind::Decl(d) = self.asg.kind_mut(existing) {
                            d.spans.push(field.span);
                        }
                        existing
                    }
                    None => {
                        let id = self.asg.push(
                            Some(store),
                            NodeKind::Decl(Decl {
                                label_name,
                                labels: Vec::new(),
                                values: Vec::new(),
                                spans: vec![field.span],
                            }),
                        );
                        self.push_decl(store, id);
                        id
                    }
                };

                let label = self.compile_label(id, &field.label);
                let values = self.compile_expr(id, &field.value);
                if let NodeKind::Decl(d) = self.asg.kind_mut(id) {
                    d.labels.push(label);
                    d.values.extend(values);
                }
            }
            AstDecl::Embed(expr) => {
                let id = self.asg.push(
                    Some(store),
                    NodeKind::Decl(Decl {
                        label_name: String::new(),
                        labels: Vec::new(),
                        values: Vec::new(),
                        spans: vec![expr.span()],
                    }),
                );
                self.push_decl(store, id);
                let values = self.compile_expr(id, expr);
                if let NodeKind::Decl(d) = self.asg.kind_mut(id) {
                    d.values = values;
                }
            }
            AstDecl::Bad(_) => {}
        }
    }

    fn compile_label(&mut self, decl: NodeId, label: &Label) -> NodeId {
        let value = self.asg.push(
            Some(decl),
            NodeKind::Value(Value {
                span: label.span(),
                kind: ValueKind::Label,
                children: Vec::new(),
            }),
        );
        if let Label::Dynamic(expr) = label {
            let children = self.compile_expr(value, expr);
            self.set_children(value, children);
        }
        value
    }

    fn compile_struct(&mut self, parent: NodeId, lit: &StructLit) -> NodeId {
        let id = self.asg.push(
            Some(parent),
            NodeKind::Struct(Struct {
                span: lit.span,
                decls: Vec::new(),
            }),
        );
        for decl in &lit.elts {
            self.compile_decl(id, decl);
        }
        id
    }

    fn compile_expr(&mut self, parent: NodeId, expr: &Expr) -> Vec<NodeId> {
        match expr {
            Expr::Ident(_) | Expr::Selector { .. } => match reference_path(expr) {
                Some(path) => {
                    let reference = Reference::new(expr.span(), path);
                    vec![self.asg.push(Some(parent), NodeKind::Reference(reference))]
                }
                None => vec![self.compile_value(parent, expr)],
            },
            Expr::Struct(lit) => vec![self.compile_struct(parent, lit)],
            Expr::Binary { x, y, .. } => {
                let mut conjuncts = self.compile_expr(parent, x);
                conjuncts.extend(self.compile_expr(parent, y));
                conjuncts
            }
            _ => vec![self.compile_value(parent, expr)],
        }
    }

    fn compile_value(&mut self, parent: NodeId, expr: &Expr) -> NodeId {
        let kind = match expr {
            Expr::Lit(lit) => ValueKind::Literal(lit.kind),
            Expr::List { .. } => ValueKind::List,
            Expr::Interpolation { .. } => ValueKind::Interpolation,
            Expr::Paren { .. } => ValueKind::Paren,
            Expr::Call { .. } => ValueKind::Call,
            Expr::Unary { .. } => ValueKind::Unary,
            Expr::Index { .. } => ValueKind::Index,
            Expr::Selector { .. } => ValueKind::Selector,
            _ => ValueKind::Bad,
        };
        let value = self.asg.push(
            Some(parent),
            NodeKind::Value(Value {
                span: expr.span(),
                kind,
                children: Vec::new(),
            }),
        );

        let mut children = Vec::new();
        match expr {
            Expr::List { elts, .. } | Expr::Interpolation { elts, .. } => {
                for elt in elts {
                    children.extend(self.compile_expr(value, elt));
                }
            }
            Expr::Call { fun, args, .. } => {
                for arg in args {
                    children.extend(self.compile_expr(value, arg));
                }
                children.extend(self.compile_expr(value, fun));
            }
            Expr::Index { x, index, .. } => {
                children.extend(self.compile_expr(value, x));
                children.extend(self.compile_expr(value, index));
            }
            Expr::Paren { x, .. } | Expr::Unary { x, .. } | Expr::Selector { x, .. } => {
                children.extend(self.compile_expr(value, x));
            }
            _ => {}
        }
        self.set_children(value, children);
        value
    }

    fn set_children(&mut self, value: NodeId, children: Vec<NodeId>) {
        if let NodeKind::Value(v) = self.asg.kind_mut(value) {
            v.children = children;
        }
    }
}

/// `a.b.c` as segments; `None` when the base is not an identifier.
fn reference_path(expr: &Expr) -> Option<Vec<Segment>> {
    match expr {
        Expr::Ident(ident) => Some(vec![Segment {
            name: ident.name.clone(),
            span: ident.span,
        }]),
        Expr::Selector { x, sel, .. } => {
            let mut path = reference_path(x)?;
            path.push(Segment {
                name: sel.name.clone(),
                span: sel.span,
            });
            Some(path)
        }
        _ => None,
    }
}

/// Default alias of an import: the explicit `:name` qualifier or the last
/// path element.
fn import_alias(path: &str) -> &str {
    if let Some((_, qualifier)) = path.rsplit_once(':') {
        return qualifier;
    }
    path.rsplit('/').next().unwrap_or(path)
}
