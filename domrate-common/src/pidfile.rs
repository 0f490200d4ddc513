//! Single-instance guard: each process writes a PID file at startup and
//! removes it on clean shutdown. A pre-existing PID file is a fatal
//! "already running" condition (§5 resource policy).

use crate::errors::DomRateError;
use std::fs;
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create the PID file, failing if one already exists at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, DomRateError> {
        let path = path.into();
        if path.exists() {
            return Err(DomRateError::AlreadyRunning {
                path: path.display().to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DomRateError::InvalidConfigValue {
                key: "pid_file".to_string(),
                detail: format!("could not create {}: {e}", parent.display()),
            })?;
        }
        fs::write(&path, std::process::id().to_string()).map_err(|e| {
            DomRateError::InvalidConfigValue {
                key: "pid_file".to_string(),
                detail: format!("could not write {}: {e}", path.display()),
            }
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the PID file. Called explicitly during shutdown orchestration
    /// as well as from `Drop`, so a panic unwind still cleans up.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_writes_current_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domrated.pid");
        let guard = PidFile::create(&path).unwrap();
        let contents = fs::read_to_string(guard.path()).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }

    #[test]
    fn create_fails_if_already_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domrated.pid");
        fs::write(&path, "1").unwrap();
        let result = PidFile::create(&path);
        assert!(matches!(result, Err(DomRateError::AlreadyRunning { .. })));
    }

    #[test]
    fn drop_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domrated.pid");
        {
            let _guard = PidFile::create(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
