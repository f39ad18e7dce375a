//! Instance loading: from paths on disk (and in-memory overlays) to a graph of
//! package instances connected by their imports.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use itertools::Itertools;
use once_cell::sync::Lazy;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    position::{FileId, SourceMap},
    syntax::{self, File},
};

pub const FILE_EXTENSION: &str = "cue";

/// Injected parse function. Implementations capture the errors they see, the
/// loader only keeps the returned tree.
pub type ParseHook = Arc<dyn Fn(FileId, &Path, &str) -> File + Send + Sync>;

pub fn default_parse_hook() -> ParseHook {
    Arc::new(|id, _path, source| syntax::parse_file(id, source).0)
}

#[derive(Clone)]
pub struct LoadConfig {
    /// Working directory; relative paths are resolved against it.
    pub dir: PathBuf,
    /// In-memory file contents that take precedence over the disk.
    pub overlay: HashMap<PathBuf, Arc<str>>,
    pub parse_file: ParseHook,
}

impl LoadConfig {
    pub fn new(dir: impl Into<PathBuf>) -> LoadConfig {
        LoadConfig {
            dir: dir.into(),
            overlay: HashMap::new(),
            parse_file: default_parse_hook(),
        }
    }

    pub fn with_overlay(mut self, overlay: HashMap<PathBuf, Arc<str>>) -> LoadConfig {
        self.overlay = overlay;
        self
    }

    pub fn with_parse_hook(mut self, hook: ParseHook) -> LoadConfig {
        self.parse_file = hook;
        self
    }
}

impl fmt::Debug for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadConfig")
            .field("dir", &self.dir)
            .field("overlay", &self.overlay.keys().collect_vec())
            .finish_non_exhaustive()
    }
}

pub type InstanceId = NodeIndex;

/// The files of one package in one directory.
#[derive(Debug, Clone)]
pub struct Instance {
    pub dir: PathBuf,
    pub display_path: String,
    pub pkg_name: Option<String>,
    pub files: Vec<File>,
}

/// Loaded instances; edges point from an importing instance to the imported
/// one and carry the import path.
#[derive(Debug, Default)]
pub struct Instances {
    pub graph: DiGraph<Instance, String>,
    pub roots: Vec<InstanceId>,
    pub sources: SourceMap,
}

impl Instances {
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.graph.node_weight(id)
    }

    pub fn lookup_import(&self, from: InstanceId, path: &str) -> Option<InstanceId> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .find(|edge| edge.weight() == path)
            .map(|edge| edge.target())
    }

    /// Imported instances in import-path order.
    pub fn imports(&self, from: InstanceId) -> Vec<(String, InstanceId)> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .map(|edge| (edge.weight().clone(), edge.target()))
            .sorted()
            .collect()
    }
}

pub trait Loader: Send + Sync {
    fn load_instances(&self, paths: &[PathBuf], config: &LoadConfig) -> Instances;
}

/// Loads instances from the file system, merged with the config overlay.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl Loader for FsLoader {
    fn load_instances(&self, paths: &[PathBuf], config: &LoadConfig) -> Instances {
        let mut state = LoadState {
            config,
            instances: Instances::default(),
            memo: HashMap::new(),
            module: None,
        };

        for path in paths {
            let path = match path.is_absolute() {
                true => path.clone(),
                false => config.dir.join(path),
            };

            let (dir, filter) = if path.extension().is_some_and(|ext| ext == FILE_EXTENSION) {
                let Some(dir) = path.parent() else {
                    warn!(path = %path.display(), "file without parent directory");
                    continue;
                };
                let package = state.package_of(&path);
                (dir.to_path_buf(), PackageFilter::Exactly(package))
            } else {
                let preferred = path.file_name().map(|name| name.to_string_lossy().to_string());
                (path.clone(), PackageFilter::Prefer(preferred))
            };

            if state.module.is_none() {
                state.module = Module::discover(&dir, &config.overlay);
            }
            let display_path = state.display_path(&dir);
            let root = state.load_dir(&dir, filter, display_path);
            state.instances.roots.push(root);
        }

        state.instances
    }
}

enum PackageFilter {
    /// Only files of this package; `None` selects files without a package clause.
    Exactly(Option<String>),
    /// Files of this package if there are any, otherwise the first package found.
    Prefer(Option<String>),
}

#[derive(Debug, Clone)]
struct Module {
    root: PathBuf,
    path: Option<String>,
}

static MODULE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*module\s*:\s*"(?<path>[^"]+)""#).unwrap());

impl Module {
    /// Walks up from `dir` to the first directory holding `cue.mod/module.cue`.
    fn discover(dir: &Path, overlay: &HashMap<PathBuf, Arc<str>>) -> Option<Module> {
        dir.ancestors().find_map(|candidate| {
            let module_file = candidate.join("cue.mod").join("module.cue");
            let text = match overlay.get(&module_file) {
                Some(text) => Some(text.to_string()),
                None => fs::read_to_string(&module_file).ok(),
            }?;
            let path = MODULE_PATH_RE
                .captures(&text)
                .and_then(|caps| caps.name("path"))
                .map(|m| m.as_str().to_string());
            debug!(root = %candidate.display(), module = ?path, "found module");
            Some(Module {
                root: candidate.to_path_buf(),
                path,
            })
        })
    }
}

struct LoadState<'a> {
    config: &'a LoadConfig,
    instances: Instances,
    memo: HashMap<PathBuf, InstanceId>,
    module: Option<Module>,
}

impl LoadState<'_> {
    fn read(&self, path: &Path) -> Option<Arc<str>> {
        if let Some(text) = self.config.overlay.get(path) {
            return Some(text.clone());
        }
        match fs::read_to_string(path) {
            Ok(text) => Some(text.into()),
            Err(err) => {
                warn!(path = %path.display(), %err, "unable to read file");
                None
            }
        }
    }

    /// Package clause of a single file. Parsed without the hook so its errors
    /// are only reported once, when the instance itself is loaded.
    fn package_of(&mut self, path: &Path) -> Option<String> {
        let text = self.read(path)?;
        let id = self.instances.sources.add(path, text.clone());
        let (file, _) = syntax::parse_file(id, &text);
        file.package_name().map(str::to_string)
    }

    /// Source files of a directory: the disk listing merged with overlay entries.
    fn list_files(&self, dir: &Path) -> BTreeSet<PathBuf> {
        let on_disk = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .flatten()
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path());

        let in_overlay = self
            .config
            .overlay
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned();

        on_disk
            .chain(in_overlay)
            .filter(|path| path.extension().is_some_and(|ext| ext == FILE_EXTENSION))
            .collect()
    }

    fn display_path(&self, dir: &Path) -> String {
        if let Some(Module { root, path: Some(module_path) }) = &self.module {
            if let Ok(rest) = dir.strip_prefix(root) {
                return match rest.as_os_str().is_empty() {
                    true => module_path.clone(),
                    false => format!("{module_path}/{}", rest.display()),
                };
            }
        }
        match pathdiff::diff_paths(dir, &self.config.dir) {
            Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Some(rel) => rel.display().to_string(),
            None => dir.display().to_string(),
        }
    }

    /// Directory of a non-builtin import, or `None` for builtin packages.
    fn import_dir(&self, import_path: &str) -> Option<PathBuf> {
        let module = self.module.as_ref()?;
        if let Some(module_path) = &module.path {
            if import_path == module_path {
                return Some(module.root.clone());
            }
            if let Some(rest) = import_path.strip_prefix(&format!("{module_path}/")) {
                return Some(module.root.join(rest));
            }
        }
        let first = import_path.split('/').next().unwrap_or_default();
        if !first.contains('.') {
            return None;
        }
        Some(module.root.join("cue.mod").join("pkg").join(import_path))
    }

    fn load_dir(&mut self, dir: &Path, filter: PackageFilter, display_path: String) -> InstanceId {
        if let Some(id) = self.memo.get(dir) {
            return *id;
        }

        let entries = self
            .list_files(dir)
            .into_iter()
            .filter_map(|path| {
                let text = self.read(&path)?;
                Some((path, text))
            })
            .collect_vec();
        let entries = entries
            .into_iter()
            .map(|(path, text)| (self.instances.sources.add(&path, text.clone()), path, text))
            .collect_vec();

        let hook = &self.config.parse_file;
        let parsed: Vec<File> = entries
            .par_iter()
            .map(|(id, path, text)| hook(*id, path.as_path(), text.as_ref()))
            .collect();

        let pkg_name = match filter {
            PackageFilter::Exactly(name) => name,
            PackageFilter::Prefer(preferred) => {
                let names = parsed.iter().filter_map(|f| f.package_name()).collect_vec();
                match preferred {
                    Some(name) if names.contains(&name.as_str()) => Some(name),
                    _ => names.first().map(|name| name.to_string()),
                }
            }
        };
        let files = parsed
            .into_iter()
            .filter(|file| file.package_name() == pkg_name.as_deref())
            .collect_vec();
        debug!(dir = %dir.display(), package = ?pkg_name, files = files.len(), "loaded instance");

        let import_paths = files
            .iter()
            .flat_map(|file| file.imports.iter().filter_map(|spec| spec.path_value()))
            .unique()
            .collect_vec();

        let id = self.instances.graph.add_node(Instance {
            dir: dir.to_path_buf(),
            display_path,
            pkg_name,
            files,
        });
        self.memo.insert(dir.to_path_buf(), id);

        for import_path in import_paths {
            let Some(import_dir) = self.import_dir(&import_path) else {
                continue;
            };
            if self.list_files(&import_dir).is_empty() {
                debug!(path = %import_path, dir = %import_dir.display(), "import not found");
                continue;
            }
            let preferred = import_path.rsplit('/').next().map(str::to_string);
            let target = self.load_dir(&import_dir, PackageFilter::Prefer(preferred), import_path.clone());
            self.instances.graph.add_edge(id, target, import_path);
        }

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::overlay_config;

    #[test]
    fn test_loads_package_files_from_overlay() {
        let config = overlay_config(&[
            ("a.cue", "package p\na: 1"),
            ("b.cue", "package p\nb: 2"),
            ("other.cue", "package q\nc: 3"),
        ]);
        let instances = FsLoader.load_instances(&[config.dir.join("a.cue")], &config);

        assert_eq!(instances.roots.len(), 1);
        let root = instances.instance(instances.roots[0]).unwrap();
        assert_eq!(root.pkg_name.as_deref(), Some("p"));
        assert_eq!(root.files.len(), 2);
        assert_eq!(root.display_path, ".");
    }

    #[test]
    fn test_resolves_module_imports() {
        let config = overlay_config(&[
            ("cue.mod/module.cue", "module: \"example.com/m\"\n"),
            ("main.cue", "package main\nimport \"example.com/m/lib\"\nx: lib.y"),
            ("lib/lib.cue", "package lib\ny: 1"),
        ]);
        let instances = FsLoader.load_instances(&[config.dir.join("main.cue")], &config);

        let root = instances.roots[0];
        assert_eq!(instances.instance(root).unwrap().display_path, "example.com/m");
        let lib = instances.lookup_import(root, "example.com/m/lib").unwrap();
        let lib = instances.instance(lib).unwrap();
        assert_eq!(lib.pkg_name.as_deref(), Some("lib"));
        assert_eq!(lib.display_path, "example.com/m/lib");
    }

    #[test]
    fn test_builtin_and_missing_imports_have_no_edge() {
        let config = overlay_config(&[
            ("cue.mod/module.cue", "module: \"example.com/m\"\n"),
            ("main.cue", "package main\nimport (\n\t\"strings\"\n\t\"example.com/m/nope\"\n)\n"),
        ]);
        let instances = FsLoader.load_instances(&[config.dir.join("main.cue")], &config);
        let root = instances.roots[0];
        assert!(instances.imports(root).is_empty());
    }

    #[test]
    fn test_cyclic_imports_are_representable() {
        let config = overlay_config(&[
            ("cue.mod/module.cue", "module: \"example.com/m\"\n"),
            ("a/a.cue", "package a\nimport \"example.com/m/b\"\nx: b.y"),
            ("b/b.cue", "package b\nimport \"example.com/m/a\"\ny: a.x"),
        ]);
        let instances = FsLoader.load_instances(&[config.dir.join("a/a.cue")], &config);
        let a = instances.roots[0];
        let b = instances.lookup_import(a, "example.com/m/b").unwrap();
        assert_eq!(instances.lookup_import(b, "example.com/m/a"), Some(a));
    }

    #[test]
    fn test_overlay_wins_over_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.cue");
        fs::write(&path, "package p\nfromDisk: 1").unwrap();

        let mut overlay = HashMap::new();
        overlay.insert(path.clone(), Arc::from("package p\nfromOverlay: 1"));
        let config = LoadConfig::new(dir.path()).with_overlay(overlay);

        let instances = FsLoader.load_instances(&[path.clone()], &config);
        let id = instances.sources.file_id(&path).unwrap();
        assert!(instances.sources.get(id).unwrap().text.contains("fromOverlay"));
    }
}
