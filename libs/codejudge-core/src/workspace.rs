/// Workspace Manager - Per-Submission Filesystem Isolation
///
/// **Core Responsibility:**
/// Give every submission its own freshly created directory and remove it
/// (source, compiled output, stray files) when the submission is done.
///
/// **Guarantees:**
/// - Directory names embed the submission id plus a random UUID, and are
///   created with `create_dir` (never `create_dir_all` on the leaf), so two
///   concurrent `acquire` calls can never resolve to the same directory
/// - A failed `acquire` leaves nothing behind
/// - `release` consumes the handle, so it runs at most once; a handle dropped
///   without `release` (early return, cancelled future, panic) still deletes
///   its directory in `Drop`

use crate::error::{JudgeError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const DIR_PREFIX: &str = "sub";

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a workspace for `submission_id` and write the source into it
    pub async fn acquire(
        &self,
        submission_id: Uuid,
        source_file: &str,
        source_code: &str,
    ) -> Result<Workspace> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| JudgeError::workspace(&self.root, e))?;

        let path = self
            .root
            .join(format!("{}-{}-{}", DIR_PREFIX, submission_id, Uuid::new_v4().simple()));

        fs::create_dir(&path)
            .await
            .map_err(|e| JudgeError::workspace(&path, e))?;

        // From here on the handle owns the directory; dropping it on the
        // error path below removes the half-created workspace.
        let workspace = Workspace {
            path,
            submission_id,
            source_file: source_file.to_string(),
            released: false,
        };

        let source_path = workspace.source_path();
        fs::write(&source_path, source_code)
            .await
            .map_err(|e| JudgeError::workspace(&source_path, e))?;

        tracing::debug!(
            submission_id = %submission_id,
            path = %workspace.path.display(),
            "Workspace acquired"
        );

        Ok(workspace)
    }
}

/// Exclusive handle to one submission's directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    submission_id: Uuid,
    source_file: String,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn source_path(&self) -> PathBuf {
        self.path.join(&self.source_file)
    }

    /// Delete everything created under this workspace
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!(
                    submission_id = %self.submission_id,
                    path = %self.path.display(),
                    "Workspace released"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JudgeError::workspace(&self.path, e)),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(
                    submission_id = %self.submission_id,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up dropped workspace"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_acquire_writes_source() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = Uuid::new_v4();

        let ws = manager.acquire(id, "Main.java", "class Main {}").await.unwrap();

        assert!(ws.path().starts_with(root.path()));
        assert!(ws.path().to_string_lossy().contains(&id.to_string()));
        assert_eq!(ws.submission_id(), id);
        let written = std::fs::read_to_string(ws.source_path()).unwrap();
        assert_eq!(written, "class Main {}");

        ws.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_removes_all_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let ws = manager.acquire(Uuid::new_v4(), "main.py", "print(1)").await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("Main.class"), b"\xca\xfe").unwrap();
        std::fs::create_dir(path.join("__pycache__")).unwrap();
        std::fs::write(path.join("__pycache__").join("main.pyc"), b"x").unwrap();

        ws.release().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_without_release_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let path = {
            let ws = manager.acquire(Uuid::new_v4(), "main.rs", "fn main() {}").await.unwrap();
            ws.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let ws = manager.acquire(Uuid::new_v4(), "main.py", "").await.unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();

        assert!(ws.release().await.is_ok());
    }

    #[tokio::test]
    async fn test_same_submission_gets_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = Uuid::new_v4();

        let a = manager.acquire(id, "main.py", "a").await.unwrap();
        let b = manager.acquire(id, "main.py", "b").await.unwrap();

        assert_ne!(a.path(), b.path());
        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_collides() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let mut handles = Vec::new();
        for i in 0..32 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .acquire(Uuid::new_v4(), "main.py", &format!("print({})", i))
                    .await
            }));
        }

        let mut paths = HashSet::new();
        let mut workspaces = Vec::new();
        for handle in handles {
            let ws = handle.await.unwrap().unwrap();
            assert!(paths.insert(ws.path().to_path_buf()));
            workspaces.push(ws);
        }
        assert_eq!(paths.len(), 32);

        for ws in workspaces {
            ws.release().await.unwrap();
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_fails_when_root_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let manager = WorkspaceManager::new(&blocker);

        let err = manager.acquire(Uuid::new_v4(), "main.py", "").await.unwrap_err();
        assert!(matches!(err, JudgeError::Workspace { .. }));
    }
}
