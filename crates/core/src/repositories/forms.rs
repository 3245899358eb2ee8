//! Form templates on disk.

use crate::config::CoreConfig;
use crate::constants::FORM_FILE_EXTENSION;
use crate::validation::validate_form_name;
use crate::{FormEntryError, FormEntryResult};
use htmlform::FormTemplate;
use std::sync::Arc;

/// Loads form templates from the configured form directory.
///
/// A form named `complete-program` is the file `complete-program.html`.
#[derive(Clone, Debug)]
pub struct FormRepository {
    cfg: Arc<CoreConfig>,
}

impl FormRepository {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    /// Raw template text of form `name`.
    pub fn load_text(&self, name: &str) -> FormEntryResult<String> {
        validate_form_name(name)?;
        let path = self.cfg.form_path(name);
        if !path.is_file() {
            return Err(FormEntryError::UnknownForm(name.to_string()));
        }
        std::fs::read_to_string(&path).map_err(FormEntryError::FileRead)
    }

    pub fn load(&self, name: &str) -> FormEntryResult<FormTemplate> {
        Ok(FormTemplate::parse(&self.load_text(name)?)?)
    }

    /// Names of all forms, sorted.
    pub fn list(&self) -> FormEntryResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.cfg.form_dir()).map_err(FormEntryError::FileRead)? {
            let path = entry.map_err(FormEntryError::FileRead)?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != FORM_FILE_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if validate_form_name(stem).is_ok() => names.push(stem.to_string()),
                _ => tracing::warn!(path = %path.display(), "skipping form with unusable name"),
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn repo_in(dir: &TempDir) -> FormRepository {
        let cfg = CoreConfig::new(dir.path().to_path_buf(), None, false).expect("config");
        FormRepository::new(Arc::new(cfg))
    }

    #[test]
    fn test_list_and_load_forms() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("b-form.html"), "<htmlform>B</htmlform>").expect("write");
        fs::write(temp.path().join("a-form.html"), "<htmlform>A</htmlform>").expect("write");
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write");
        fs::write(temp.path().join("bad name.html"), "<htmlform/>").expect("write");
        let repo = repo_in(&temp);

        assert_eq!(repo.list().expect("list"), vec!["a-form", "b-form"]);
        let template = repo.load("a-form").expect("load");
        assert_eq!(template.root().text_content(), "A");
    }

    #[test]
    fn test_load_rejects_unknown_and_unsafe_names() {
        let temp = TempDir::new().expect("temp dir");
        let repo = repo_in(&temp);

        assert!(matches!(
            repo.load("missing").expect_err("missing"),
            FormEntryError::UnknownForm(_)
        ));
        assert!(matches!(
            repo.load("../etc/passwd").expect_err("unsafe"),
            FormEntryError::InvalidFormName(_)
        ));
    }

    #[test]
    fn test_load_reports_markup_errors() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("broken.html"), "<htmlform><p></htmlform>").expect("write");
        let repo = repo_in(&temp);

        assert!(matches!(
            repo.load("broken").expect_err("broken"),
            FormEntryError::Template(_)
        ));
    }
}
