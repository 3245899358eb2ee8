//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read by the binaries only; request
//! handling never consults them.

use crate::constants::{FORM_DIR, FORM_FILE_EXTENSION};
use crate::{FormEntryError, FormEntryResult};
use htmlform::FormTemplate;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    form_dir: PathBuf,
    dataset_file: Option<PathBuf>,
    persist: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `persist` writes the dataset back to `dataset_file` after every committed transaction, so
    /// it requires a dataset file.
    pub fn new(
        form_dir: PathBuf,
        dataset_file: Option<PathBuf>,
        persist: bool,
    ) -> FormEntryResult<Self> {
        if persist && dataset_file.is_none() {
            return Err(FormEntryError::InvalidInput(
                "persisting the store requires a dataset file".into(),
            ));
        }

        Ok(Self {
            form_dir,
            dataset_file,
            persist,
        })
    }

    pub fn form_dir(&self) -> &Path {
        &self.form_dir
    }

    pub fn dataset_file(&self) -> Option<&Path> {
        self.dataset_file.as_deref()
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    /// Path of the template for form `name`. The name is not validated here.
    pub fn form_path(&self, name: &str) -> PathBuf {
        self.form_dir
            .join(name)
            .with_extension(FORM_FILE_EXTENSION)
    }
}

/// Resolve the form template directory without reading environment variables.
///
/// If `override_dir` is provided, it must be a directory. Otherwise this searches for `forms/`
/// relative to the current working directory and then walks up from `CARGO_MANIFEST_DIR`.
pub fn resolve_form_dir(override_dir: Option<PathBuf>) -> FormEntryResult<PathBuf> {
    if let Some(form_dir) = override_dir {
        if form_dir.is_dir() {
            return Ok(form_dir);
        }
        return Err(FormEntryError::InvalidInput(format!(
            "form directory override {} is not a directory",
            form_dir.display()
        )));
    }

    let cwd_relative = PathBuf::from(FORM_DIR);
    if cwd_relative.is_dir() {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(FORM_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }

    Err(FormEntryError::InvalidInput(
        "could not locate forms/ directory".into(),
    ))
}

/// Validate the resolved form directory at startup.
///
/// The directory is scanned one level deep. Symlinks, nested directories and special files are
/// rejected, the number and total size of files are bounded, and every `.html` file must parse
/// as a form template. Other files are ignored. Returns the number of templates found.
pub fn validate_form_dir(form_dir: &Path) -> FormEntryResult<usize> {
    const MAX_FILES: usize = 1_000;
    const MAX_TOTAL_BYTES: u64 = 20 * 1024 * 1024; // 20 MiB

    let mut files = 0usize;
    let mut bytes = 0u64;
    let mut templates = 0usize;

    for entry in std::fs::read_dir(form_dir).map_err(FormEntryError::FileRead)? {
        let entry = entry.map_err(FormEntryError::FileRead)?;
        let entry_path = entry.path();
        let metadata = std::fs::symlink_metadata(&entry_path).map_err(FormEntryError::FileRead)?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            return Err(FormEntryError::InvalidInput(
                "form directory must not contain symlinks".into(),
            ));
        }
        if !file_type.is_file() {
            return Err(FormEntryError::InvalidInput(format!(
                "form directory must contain only files, found {}",
                entry_path.display()
            )));
        }

        files = files.saturating_add(1);
        bytes = bytes.saturating_add(metadata.len());
        if files > MAX_FILES || bytes > MAX_TOTAL_BYTES {
            return Err(FormEntryError::InvalidInput(
                "form directory exceeds maximum file count or total size".into(),
            ));
        }

        let is_template = entry_path
            .extension()
            .is_some_and(|ext| ext == FORM_FILE_EXTENSION);
        if is_template {
            let text = std::fs::read_to_string(&entry_path).map_err(FormEntryError::FileRead)?;
            FormTemplate::parse(&text).map_err(|e| {
                FormEntryError::InvalidInput(format!("{}: {e}", entry_path.display()))
            })?;
            templates += 1;
        }
    }

    Ok(templates)
}

/// Parse the persist flag from an optional string value.
///
/// If `value` is `None` or empty/whitespace, persistence is off.
pub fn persist_from_env_value(value: Option<String>) -> FormEntryResult<bool> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value
        .map(|v| formentry_types::parse_flag(&v))
        .transpose()?;

    Ok(parsed.unwrap_or(false))
}
