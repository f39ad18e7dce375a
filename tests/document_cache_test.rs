//! Integration tests for the document cache: the editor-facing scenarios of
//! opening, hovering and editing documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use tower_lsp::lsp_types::{HoverContents, Position, TextDocumentItem, Url};

use cuels::cache::{CacheError, DocumentCache};
use cuels::config::Settings;
use cuels::hover::hover;
use cuels::load::FsLoader;

fn create_test_project_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let project_dir = temp_dir.path().join("project");
    fs::create_dir(&project_dir).expect("Failed to create project subdirectory");
    (temp_dir, project_dir)
}

fn cache(root: &Path) -> DocumentCache {
    let cache = DocumentCache::new(Arc::new(FsLoader), Settings::default());
    cache.set_root(root);
    cache
}

fn open(cache: &DocumentCache, path: &Path, text: &str, version: i32) -> Url {
    let uri = Url::from_file_path(path).unwrap();
    cache
        .add_document(TextDocumentItem {
            uri: uri.clone(),
            language_id: "cue".to_string(),
            version,
            text: text.to_string(),
        })
        .unwrap();
    uri
}

/// Test: hovering a reference shows the declaration it resolves to, and the
/// document has no diagnostics.
#[tokio::test]
async fn test_hover_on_reference() {
    let (_temp_dir, root) = create_test_project_dir();
    let cache = cache(&root);
    let uri = open(&cache, &root.join("a.cue"), "a: 1\nb: a + 1", 1);

    let location = cache.find(&uri, Position::new(1, 3)).await.unwrap();
    let hover = hover(&location.compiled.asg, location.node.unwrap(), &cache.settings()).unwrap();
    let HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markup");
    };
    assert_eq!(markup.value, "```cue\na: 1\n```");

    let doc = cache.get_document(&uri).unwrap();
    assert!(doc.get_diagnostics().await.unwrap().is_empty());
}

/// Test: an import of an unknown package still compiles, with one error on
/// the import.
#[tokio::test]
async fn test_unknown_import() {
    let (_temp_dir, root) = create_test_project_dir();
    let cache = cache(&root);
    let uri = open(&cache, &root.join("a.cue"), "import \"example.com/unknown\"\n\na: 1", 1);

    let doc = cache.get_document(&uri).unwrap();
    let compiled = doc.get_compiled().await.unwrap();
    assert!(compiled.asg.root().is_some());
    assert_eq!(compiled.errors.len(), 1);

    let diagnostics = doc.get_diagnostics().await.unwrap();
    let for_doc = &diagnostics[&uri];
    assert_eq!(for_doc.len(), 1);
    assert_eq!(for_doc[0].range.start, Position::new(0, 7));
    assert_eq!(for_doc[0].range.end, Position::new(0, 28));
}

/// Test: only the latest of two rapid edits is ever observed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rapid_edits() {
    let (_temp_dir, root) = create_test_project_dir();
    let cache = cache(&root);
    let uri = open(&cache, &root.join("a.cue"), "a: 1", 1);

    let v1 = cache.get_document(&uri).unwrap();
    let v2 = v1.set_content("a: 1\nb: a".to_string(), 2).unwrap();

    assert_eq!(v1.get_compiled().await.err(), Some(CacheError::Expired));
    assert_eq!(v2.get_compiled().await.unwrap().version, 2);

    let v3 = v2.set_content("a: 2".to_string(), 3).unwrap();
    let current = cache.get_document(&uri).unwrap();
    assert_eq!(current.get_compiled().await.unwrap().version, 3);
    assert_eq!(v2.get_diagnostics().await.err(), Some(CacheError::Expired));
    assert_eq!(v3.get_version().unwrap(), 3);
}

/// Test: an open document shadows its file on disk for every compile.
#[tokio::test]
async fn test_open_documents_shadow_disk() {
    let (_temp_dir, root) = create_test_project_dir();
    fs::write(root.join("b.cue"), "package p\nx: 1\n").unwrap();
    let cache = cache(&root);

    open(&cache, &root.join("b.cue"), "package p\ny: 1\n", 1);
    let uri = open(&cache, &root.join("a.cue"), "package p\nz: y\n", 1);

    let diagnostics = cache.get_document(&uri).unwrap().get_diagnostics().await.unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}
