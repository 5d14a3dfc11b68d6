//! Application state for the exhibit server

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use exhibit_core::{ProcessedExhibit, StampContext};
use uuid::Uuid;

use crate::error::ServerError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub stamp: Arc<StampContext>,
    /// Batch timeout in milliseconds
    pub timeout_ms: u64,
    pub downloads: Arc<DownloadRegistry>,
}

impl AppState {
    pub fn new(stamp: StampContext, timeout_ms: u64) -> Self {
        Self {
            stamp: Arc::new(stamp),
            timeout_ms,
            downloads: Arc::new(DownloadRegistry::default()),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.stamp.scratch_dir
    }
}

/// A stamped PDF waiting to be downloaded
#[derive(Debug, Clone)]
pub struct Download {
    pub exhibit: u32,
    pub path: PathBuf,
    pub filename: String,
    /// Per-batch scratch subdirectory holding `path`
    pub batch_dir: PathBuf,
}

/// Stamped PDFs that have not been served yet. Each entry is handed out once.
#[derive(Default)]
pub struct DownloadRegistry {
    entries: Mutex<HashMap<Uuid, Download>>,
}

impl DownloadRegistry {
    pub fn register(&self, processed: &ProcessedExhibit, batch_dir: &Path) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        let download = Download {
            exhibit: processed.exhibit,
            path: processed.path.clone(),
            filename: processed.download_name.clone(),
            batch_dir: batch_dir.to_path_buf(),
        };
        self.lock()?.insert(id, download);
        Ok(id)
    }

    /// Remove and return the entry for `id`
    pub fn take(&self, id: &Uuid) -> Result<Option<Download>, ServerError> {
        Ok(self.lock()?.remove(id))
    }

    pub fn len(&self) -> Result<usize, ServerError> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Download>>, ServerError> {
        self.entries
            .lock()
            .map_err(|_| ServerError::Internal("download registry poisoned".into()))
    }
}
