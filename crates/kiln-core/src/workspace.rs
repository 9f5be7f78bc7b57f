//! Workspace type - an exclusively owned scratch directory for one request.

use crate::error::SandboxError;
use crate::language::LanguageProfile;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix of every workspace directory under the scratch root.
pub const WORKSPACE_PREFIX: &str = "kiln-";

/// Unique identifier for a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkspaceId(Uuid);

impl WorkspaceId {
    /// Create a new random workspace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WorkspaceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A per-request directory holding the source file and build artifacts.
///
/// The directory is named from a random UUID and created non-recursively,
/// so two requests can never end up sharing one. It is removed by
/// [`release`](Self::release), or by `Drop` on any path that never reaches
/// `release` (early return, panic, cancelled future).
#[derive(Debug)]
pub struct Workspace {
    id: WorkspaceId,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a fresh, empty workspace below `scratch_root`.
    pub async fn acquire(scratch_root: &Path) -> Result<Self, SandboxError> {
        let id = WorkspaceId::new();
        tokio::fs::create_dir_all(scratch_root)
            .await
            .map_err(|source| SandboxError::Workspace { id, source })?;

        let path = scratch_root.join(format!("{WORKSPACE_PREFIX}{id}"));
        tokio::fs::create_dir(&path).await.map_err(|source| {
            tracing::error!(workspace_id = %id, error = %source, "Failed to create workspace");
            SandboxError::Workspace { id, source }
        })?;

        tracing::debug!(workspace_id = %id, path = %path.display(), "Workspace acquired");
        Ok(Self {
            id,
            path,
            released: false,
        })
    }

    /// Get the workspace ID.
    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    /// Get the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `code` verbatim to the profile's source file (`main.<extension>`
    /// unless the profile overrides the stem).
    pub async fn write_source(
        &self,
        profile: &LanguageProfile,
        code: &str,
    ) -> Result<PathBuf, SandboxError> {
        let file = self.path.join(profile.source_name());
        tokio::fs::write(&file, code)
            .await
            .map_err(|source| SandboxError::Workspace {
                id: self.id,
                source,
            })?;
        tracing::trace!(
            workspace_id = %self.id,
            file = %file.display(),
            size = code.len(),
            "Source written"
        );
        Ok(file)
    }

    /// Remove the directory and everything in it.
    pub async fn release(mut self) -> Result<(), SandboxError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!(workspace_id = %self.id, "Workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                tracing::warn!(workspace_id = %self.id, error = %source, "Failed to remove workspace");
                // Leave the retry to Drop.
                self.released = false;
                Err(SandboxError::Workspace {
                    id: self.id,
                    source,
                })
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(workspace_id = %self.id, "Workspace removed on drop");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(workspace_id = %self.id, error = %e, "Workspace leaked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageRegistry;

    #[test]
    fn test_workspace_id_display() {
        let id = WorkspaceId::new();
        let s = format!("{}", id);
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn test_workspace_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id: WorkspaceId = uuid.into();
        assert_eq!(id.as_uuid(), uuid);
    }

    #[tokio::test]
    async fn test_acquire_creates_unique_empty_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::acquire(root.path()).await.unwrap();
        let b = Workspace::acquire(root.path()).await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        assert_eq!(std::fs::read_dir(a.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_creates_missing_scratch_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let ws = Workspace::acquire(&nested).await.unwrap();
        assert!(ws.path().is_dir());
    }

    #[tokio::test]
    async fn test_write_source_is_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path()).await.unwrap();
        let registry = LanguageRegistry::builtin();
        let python = registry.resolve("python").unwrap();

        let code = "print('a')\n# $(rm -rf /) `x` \u{1F600}\n";
        let file = ws.write_source(python, code).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "main.py");
        assert_eq!(std::fs::read_to_string(file).unwrap(), code);
    }

    #[tokio::test]
    async fn test_release_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path()).await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("artifact"), b"x").unwrap();

        ws.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::acquire(root.path()).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
