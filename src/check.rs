//! Headless compile of one package, for use without an editor.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{anyhow, Context};
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::{
    asg::{Asg, Compiler},
    cache::diagnostics,
    load::{FsLoader, LoadConfig},
};

/// Diagnostics of the package at `path` (a `.cue` file or a directory), keyed
/// by file URI.
pub fn check(path: &Path) -> anyhow::Result<BTreeMap<Url, Vec<Diagnostic>>> {
    let path = path
        .canonicalize()
        .with_context(|| format!("can't access {}", path.display()))?;
    let dir = match path.is_dir() {
        true => path.clone(),
        false => path
            .parent()
            .ok_or(anyhow!("{} has no parent directory", path.display()))?
            .to_path_buf(),
    };
    let uri = Url::from_file_path(&path).map_err(|_| anyhow!("Can't convert {} to a URI", path.display()))?;

    let compiler = Compiler::new(Arc::new(FsLoader), LoadConfig::new(dir));
    let diagnostics = match compiler.compile_file(&path) {
        Ok(compilation) => diagnostics::collect(&uri, &path, &compilation.asg, &compilation.errors),
        Err(err) => diagnostics::collect(&uri, &path, &Asg::default(), &[err]),
    };

    Ok(diagnostics.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_project_dir;

    #[test]
    fn test_check_clean_package() {
        let (_temp_dir, root) = create_test_project_dir(&[("a.cue", "package p\na: 1"), ("b.cue", "package p\nb: a")]);
        assert!(check(&root).unwrap().is_empty());
    }

    #[test]
    fn test_check_reports_per_file() {
        let (_temp_dir, root) = create_test_project_dir(&[
            ("a.cue", "package p\na: nope"),
            ("b.cue", "package p\nb: a.missing"),
        ]);
        let diagnostics = check(&root.join("a.cue")).unwrap();

        assert_eq!(diagnostics.len(), 2);
        let root = root.canonicalize().unwrap();
        let a = &diagnostics[&Url::from_file_path(root.join("a.cue")).unwrap()];
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].range.start.line, 1);
    }

    #[test]
    fn test_check_missing_path() {
        let (_temp_dir, root) = create_test_project_dir(&[]);
        assert!(check(&root.join("nothing.cue")).is_err());
    }
}
