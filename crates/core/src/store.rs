//! Shared, transactional access to the dataset.

use crate::config::CoreConfig;
use crate::dataset::Dataset;
use crate::{FormEntryError, FormEntryResult};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle to the dataset shared by every repository and form session.
///
/// Cloning the handle shares the same data. Reads run under a read lock. A transaction runs
/// under the write lock against a private copy, which replaces the shared dataset only when the
/// transaction succeeds, so a failed submission never leaves partial writes behind.
#[derive(Clone, Debug, Default)]
pub struct DataStore {
    inner: Arc<RwLock<Dataset>>,
    snapshot_path: Option<PathBuf>,
}

impl DataStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            inner: Arc::new(RwLock::new(dataset)),
            snapshot_path: None,
        }
    }

    /// Opens the store described by `cfg`: loads the dataset file if one is configured and,
    /// when persistence is on, writes every committed transaction back to it.
    pub fn open(cfg: &CoreConfig) -> FormEntryResult<Self> {
        let dataset = match cfg.dataset_file() {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(FormEntryError::FileRead)?;
                Dataset::parse(&text)?
            }
            None => Dataset::default(),
        };
        tracing::debug!(counts = ?dataset.entity_counts(), "dataset loaded");

        let mut store = Self::new(dataset);
        if cfg.persist() {
            store.snapshot_path = cfg.dataset_file().map(Path::to_path_buf);
        }
        Ok(store)
    }

    pub fn from_yaml(text: &str) -> FormEntryResult<Self> {
        Ok(Self::new(Dataset::parse(text)?))
    }

    pub fn read<R>(&self, f: impl FnOnce(&Dataset) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs `f` against a copy of the dataset and commits the copy if `f` succeeds.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Dataset) -> FormEntryResult<R>,
    ) -> FormEntryResult<R> {
        let mut guard = self.inner.write();
        let mut working = guard.clone();

        match f(&mut working) {
            Ok(value) => {
                if let Some(path) = &self.snapshot_path {
                    write_snapshot(path, &working)?;
                }
                *guard = working;
                tracing::debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Merges a fixture document into the store.
    pub fn execute_dataset(&self, text: &str) -> FormEntryResult<()> {
        self.transaction(|dataset| dataset.merge_yaml(text))
    }

    /// Copy of the current dataset.
    pub fn snapshot(&self) -> Dataset {
        self.inner.read().clone()
    }

    pub fn render(&self) -> FormEntryResult<String> {
        self.read(Dataset::render)
    }
}

fn write_snapshot(path: &Path, dataset: &Dataset) -> FormEntryResult<()> {
    let rendered = dataset.render()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, rendered).map_err(FormEntryError::FileWrite)?;
    std::fs::rename(&tmp, path).map_err(FormEntryError::FileWrite)?;
    Ok(())
}
