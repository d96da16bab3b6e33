//! Artifact directory management.
//!
//! Every job owns exactly one directory, named after its identifier, under a
//! common results root. The directory is the only channel between steps: it
//! starts out holding the shared document and accumulates whatever the steps
//! write.
//!
//! # Directory Layout
//!
//! ```text
//! <results>/
//! └── <job-id>/
//!     ├── data.json        # shared document, seeded at creation
//!     ├── img/...          # free-form step output
//!     └── report.docx      # optional final report
//! ```

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{JobError, Result};

/// Allocates and seeds per-job workspaces.
///
/// This struct is `Send + Sync` safe (only contains `PathBuf`s).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    shared_document: String,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, seeding workspaces with `shared_document`.
    pub fn new(root: impl Into<PathBuf>, shared_document: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            shared_document: shared_document.into(),
        }
    }

    /// Returns the results root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name of the shared document.
    pub fn shared_document(&self) -> &str {
        &self.shared_document
    }

    /// Returns the workspace path for a job. Does not touch the filesystem.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Returns the shared document path for a job.
    pub fn document_path(&self, id: &str) -> PathBuf {
        self.path_for(id).join(&self.shared_document)
    }

    /// Checks if a job's workspace exists.
    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).is_dir()
    }

    /// Allocate the workspace for a job.
    ///
    /// The results root is created as needed. Fails with
    /// [`JobError::AlreadyExists`] if the job's own directory is already
    /// present, and with [`JobError::Io`] if the filesystem refuses.
    pub fn create_for(&self, id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(id);
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(JobError::AlreadyExists(path));
            }
            Err(e) => return Err(JobError::Io(e)),
        }

        // Steps receive this path as their argument, so hand out the absolute form.
        let absolute = path.canonicalize()?;
        tracing::debug!(job_id = %id, path = %absolute.display(), "Created artifact directory");
        Ok(absolute)
    }

    /// Write the initial shared document into a job's workspace.
    pub fn seed(&self, id: &str, document: &Value) -> Result<PathBuf> {
        if !self.exists(id) {
            return Err(JobError::WorkspaceMissing(id.to_string()));
        }
        let path = self.document_path(id);
        let contents = serde_json::to_vec_pretty(document)?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Remove a job's workspace. Used only to undo a half-created run.
    pub fn discard(&self, id: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.path_for(id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Read back the current shared document of a job.
    pub fn read_document(&self, id: &str) -> Result<Value> {
        let bytes = fs::read(self.document_path(id)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => JobError::WorkspaceMissing(id.to_string()),
            _ => JobError::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
