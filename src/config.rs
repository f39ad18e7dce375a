use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

/// Reserved byte range per document; larger documents are rejected.
pub const MAX_DOCUMENT_SIZE: usize = 1_000_000_000;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Publish diagnostics after every compile
    pub diagnostics: bool,
    pub hover: bool,
    pub max_document_size: usize,
    /// Documents with other language ids are cached but never compiled
    pub language_ids: Vec<String>,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/cuels/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.cuels",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("diagnostics", true)?
            .set_default("hover", true)?
            .set_default("max_document_size", MAX_DOCUMENT_SIZE as u64)?
            .set_default("language_ids", vec!["cue"])?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    pub fn compiles(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|id| id == language_id)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            diagnostics: true,
            hover: true,
            max_document_size: MAX_DOCUMENT_SIZE,
            language_ids: vec!["cue".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_project_dir;

    #[test]
    fn test_defaults_without_files() {
        let (_temp_dir, root) = create_test_project_dir(&[]);
        let settings = Settings::new(&root).unwrap();
        assert!(settings.diagnostics);
        assert!(settings.hover);
        assert_eq!(settings.max_document_size, MAX_DOCUMENT_SIZE);
        assert!(settings.compiles("cue"));
        assert!(!settings.compiles("json"));
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let (_temp_dir, root) = create_test_project_dir(&[(
            ".cuels.toml",
            "hover = false\nlanguage_ids = [\"cue\", \"cue-experimental\"]\n",
        )]);
        let settings = Settings::new(&root).unwrap();
        assert!(!settings.hover);
        assert!(settings.diagnostics);
        assert!(settings.compiles("cue-experimental"));
    }
}
