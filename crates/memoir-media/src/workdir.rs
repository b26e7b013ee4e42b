//! Per-job scratch directories.
//!
//! Every assembly or ingestion job gets its own [`WorkingDirectory`] under a
//! shared [`Workspace`] root. The directory records each file path handed out
//! through [`WorkingDirectory::track`], so callers never keep their own list
//! for cleanup. Release happens through [`WorkingDirectory::close`] or, on any
//! early return or panic unwind, through `Drop`. Release never fails: removal
//! errors are logged as cleanup warnings because they must not mask the job's
//! real outcome.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memoir_models::FileRole;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Root under which job scratch directories are created.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named directory for one job.
    pub async fn open(&self, label: &str) -> MediaResult<WorkingDirectory> {
        tokio::fs::create_dir_all(&self.root).await?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", label))
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();

        debug!(path = %path.display(), "Opened working directory");

        Ok(WorkingDirectory {
            path,
            dir: Some(dir),
            files: Mutex::new(Vec::new()),
        })
    }
}

/// A scratch file owned by a [`WorkingDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFile {
    path: PathBuf,
    role: FileRole,
}

impl WorkingFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> FileRole {
        self.role
    }
}

/// Job-exclusive scratch directory.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    /// `None` once released
    dir: Option<TempDir>,
    files: Mutex<Vec<WorkingFile>>,
}

impl WorkingDirectory {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve a file named `name` inside this directory.
    ///
    /// The path is tracked before anything is written, so partially written
    /// files are covered by cleanup too.
    pub fn track(&self, name: &str, role: FileRole) -> WorkingFile {
        let file = WorkingFile {
            path: self.path.join(name),
            role,
        };
        self.lock_files().push(file.clone());
        file
    }

    /// Every file handed out so far, in tracking order.
    pub fn files(&self) -> Vec<WorkingFile> {
        self.lock_files().clone()
    }

    pub fn files_with_role(&self, role: FileRole) -> Vec<WorkingFile> {
        self.lock_files()
            .iter()
            .filter(|f| f.role == role)
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.dir.is_none()
    }

    /// Delete every tracked file and the directory itself.
    ///
    /// Idempotent and best-effort: failures are logged, never returned.
    pub fn close(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let files = std::mem::take(&mut *self.lock_files());
        for file in &files {
            if let Err(e) = std::fs::remove_file(&file.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %file.path.display(),
                        role = %file.role,
                        error = %e,
                        "Cleanup warning: failed to remove working file"
                    );
                }
            }
        }

        match dir.close() {
            Ok(()) => debug!(
                path = %self.path.display(),
                files = files.len(),
                "Released working directory"
            ),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Cleanup warning: failed to remove working directory"
            ),
        }
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<WorkingFile>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        self.close();
    }
}
