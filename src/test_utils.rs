//! Shared test utilities for cuels.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tempfile::TempDir;

use crate::{
    asg::{Compilation, Compiler},
    load::{FsLoader, LoadConfig},
};

/// Directory the overlay helpers pretend the project lives in. Nothing is
/// ever read from it on disk.
pub const VIRTUAL_ROOT: &str = "/virtual/project";

pub fn virtual_path(rel: impl AsRef<Path>) -> PathBuf {
    Path::new(VIRTUAL_ROOT).join(rel)
}

/// A load config whose files only exist in the overlay.
///
/// # Example
///
/// ```ignore
/// use crate::test_utils::overlay_config;
///
/// let config = overlay_config(&[("a.cue", "a: 1")]);
/// ```
pub fn overlay_config(files: &[(&str, &str)]) -> LoadConfig {
    let overlay: HashMap<PathBuf, Arc<str>> = files
        .iter()
        .map(|(rel, content)| (virtual_path(rel), Arc::from(*content)))
        .collect();
    LoadConfig::new(VIRTUAL_ROOT).with_overlay(overlay)
}

/// Compiles the package of `entry` from overlay-only `files`.
pub fn compile_overlay(files: &[(&str, &str)], entry: &str) -> Compilation {
    let compiler = Compiler::new(Arc::new(FsLoader), overlay_config(files));
    compiler
        .compile_file(&virtual_path(entry))
        .expect("compilation failed")
}

/// Byte offset of the first occurrence of `needle`.
pub fn offset_of(text: &str, needle: &str) -> usize {
    text.find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in {text:?}"))
}

/// Creates a temporary project directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the project subdirectory
///
/// The loader lists directories with WalkDir. Temp directories can live under
/// hidden paths like `/tmp/.tmpXXXXX`, so the project gets its own plain
/// subdirectory.
pub fn create_test_project_dir(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let project_dir = temp_dir.path().join("project");
    fs::create_dir(&project_dir).expect("Failed to create project subdirectory");
    for (rel, content) in files {
        let path = project_dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }
    (temp_dir, project_dir)
}
