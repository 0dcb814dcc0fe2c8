use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// On-disk layout under the storage root:
/// `<root>/<results>/<user_id>/<job_id>` and `<root>/<uploads>/<user_id>/<job_id>`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    results_dir: String,
    uploads_dir: String,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`. A relative root is resolved
    /// against the current directory so that indexed paths are absolute.
    pub fn new<P: AsRef<Path>>(root: P, results_dir: &str, uploads_dir: &str) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root,
            results_dir: results_dir.to_string(),
            uploads_dir: uploads_dir.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Result directory of a job. Not created.
    pub fn results_path(&self, user_id: i64, job_id: &str) -> PathBuf {
        self.root
            .join(&self.results_dir)
            .join(user_id.to_string())
            .join(job_id)
    }

    /// Upload staging directory of a job. Not created.
    pub fn uploads_path(&self, user_id: i64, job_id: &str) -> PathBuf {
        self.root
            .join(&self.uploads_dir)
            .join(user_id.to_string())
            .join(job_id)
    }

    /// Result directory of a job, created if absent.
    pub fn results_dir(&self, user_id: i64, job_id: &str) -> Result<PathBuf, StorageError> {
        let path = self.results_path(user_id, job_id);
        ensure_directory(&path)?;
        Ok(path)
    }

    /// Upload staging directory of a job, created if absent.
    pub fn uploads_dir(&self, user_id: i64, job_id: &str) -> Result<PathBuf, StorageError> {
        let path = self.uploads_path(user_id, job_id);
        ensure_directory(&path)?;
        Ok(path)
    }

    /// Writes staged input files for a job and returns their paths.
    pub fn save_uploads<'a, I>(
        &self,
        user_id: i64,
        job_id: &str,
        files: I,
    ) -> Result<Vec<PathBuf>, StorageError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let target_dir = self.uploads_dir(user_id, job_id)?;
        let mut saved = Vec::new();
        for (name, content) in files {
            let target = target_dir.join(file_component(name));
            write_file(&target, content)?;
            saved.push(target);
        }
        Ok(saved)
    }
}

/// Reduces an externally supplied file name to its last path component so
/// it can never address anything outside the target directory.
pub fn file_component(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| "unnamed".to_string())
}

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

pub fn write_file(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    std::fs::write(path, content).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Removes a file or directory tree. A missing path is not an error.
/// Returns whether anything was removed.
pub fn remove_tree(path: &Path) -> Result<bool, StorageError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(StorageError::RemoveTree {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::RemoveTree {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
