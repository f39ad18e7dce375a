//! Integration tests for the cuels library public API.
//!
//! These tests verify that the library can be used as an external dependency,
//! compiling packages from disk the way the binary does.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use cuels::adt::{lower_files, AdtKind, LabelIndex};
use cuels::asg::{Compiler, ErrorKind, NodeKind, NodeRef};
use cuels::check::check;
use cuels::cursor::CursorTree;
use cuels::load::{FsLoader, LoadConfig};
use cuels::position::{FileId, Pos};
use cuels::syntax::parse_file;

/// Helper: Create a temporary project directory with the given files.
///
/// Returns (TempDir, PathBuf) - keep TempDir alive for test duration.
fn create_test_project_dir(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let project_dir = temp_dir.path().join("project");
    fs::create_dir(&project_dir).expect("Failed to create project subdirectory");
    for (rel, content) in files {
        let path = project_dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    (temp_dir, project_dir)
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_compile_module_package_from_disk() {
    let (_temp_dir, root) = create_test_project_dir(&[
        ("cue.mod/module.cue", "module: \"example.com/app\"\n"),
        ("app.cue", "package app\nimport \"example.com/app/lib\"\nport: lib.default\n"),
        ("lib/lib.cue", "package lib\ndefault: 8080\n"),
    ]);

    let compiler = Compiler::new(Arc::new(FsLoader), LoadConfig::new(&root));
    let compilation = compiler.compile_file(&root.join("app.cue")).unwrap();
    assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);

    let asg = &compilation.asg;
    let package = asg.package(compilation.package().unwrap()).unwrap();
    assert_eq!(package.name, "app");
    assert_eq!(package.display_path, "example.com/app");

    let port = asg.resolve_down(NodeRef::Node(asg.root().unwrap()), "port").unwrap();
    let NodeRef::Node(port) = port else {
        panic!("port is not a graph node");
    };
    let NodeKind::Decl(decl) = asg.kind(port) else {
        panic!("port is not a declaration");
    };
    let target = asg.referenced(decl.values[0]).unwrap();
    let span = asg.span(target).unwrap();
    assert_eq!(asg.path(span.file), Some(root.join("lib/lib.cue").as_path()));
}

#[test]
fn test_missing_import_is_reported_once() {
    let (_temp_dir, root) = create_test_project_dir(&[("a.cue", "import \"example.com/nowhere\"\na: 1\n")]);

    let compiler = Compiler::new(Arc::new(FsLoader), LoadConfig::new(&root));
    let compilation = compiler.compile_file(&root.join("a.cue")).unwrap();

    assert!(compilation.package().is_some());
    assert_eq!(compilation.errors.len(), 1);
    assert_eq!(compilation.errors[0].kind, ErrorKind::ImportNotFound);
}

#[test]
fn test_check_reports_diagnostics() {
    let (_temp_dir, root) = create_test_project_dir(&[("a.cue", "a: b\n")]);

    let diagnostics = check(&root.join("a.cue")).unwrap();
    let messages: Vec<&str> = diagnostics
        .values()
        .flatten()
        .map(|diagnostic| diagnostic.message.as_str())
        .collect();
    assert_eq!(messages, vec!["unresolved reference b"]);
}

// ============================================================================
// Graph cursor
// ============================================================================

#[test]
fn test_cursor_over_lowered_files() {
    let src = "a: {x: 1}\nb: a.x\na: {y: 2}\n";
    let (file, errors) = parse_file(FileId(0), src);
    assert!(errors.is_empty());

    let mut index = LabelIndex::new();
    let (graph, root) = lower_files(&[file], &mut index);
    let tree = CursorTree::new(&graph, root);

    let a = index.feature("a");
    let sites = tree.resolve_label(tree.root(), a);
    assert_eq!(sites.len(), 2);
    assert_eq!(tree.conjuncts(&sites).len(), 2);

    let at_x = tree
        .smallest_surrounding_node(tree.root(), Pos::new(FileId(0), src.find("x:").unwrap()))
        .unwrap();
    assert!(matches!(tree.kind(tree.parent_scope(at_x)), AdtKind::Field { .. }));
}
