//! Ephemeral per-submission work directories shared with the sandbox.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::future;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// Layout: `code/` holds the source (and compiled artifacts), `testcases/`
/// the 1-based inputs, `results/` whatever the runner leaves behind.
///
/// The directory is owned by the batch executor and removed on every exit
/// path. The happy path calls [`WorkDir::cleanup`]; a synchronous `Drop`
/// guard backstops errors and task cancellation.
pub struct WorkDir {
    root: PathBuf,
    removed: bool,
}

impl WorkDir {
    pub async fn create(base: &Path) -> Result<WorkDir> {
        let root = base.join(Uuid::new_v4().to_string());
        for sub in ["code", "testcases", "results"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        // The sandbox runs as an unprivileged user and must read the inputs
        // and write into results/.
        for dir in [
            root.clone(),
            root.join("code"),
            root.join("testcases"),
            root.join("results"),
        ] {
            fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o777))
                .await
                .with_context(|| format!("failed to chmod {}", dir.display()))?;
        }
        Ok(WorkDir {
            root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub async fn write_source(&self, file_name: &str, source: &str) -> Result<()> {
        let path = self.root.join("code").join(file_name);
        fs::write(&path, source)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await?;
        Ok(())
    }

    /// Materialise all inputs concurrently as `testcases/<i>.in`, 1-based.
    pub async fn write_inputs(&self, inputs: &[String]) -> Result<()> {
        let writes = inputs.iter().enumerate().map(|(index, input)| {
            let path = self
                .root
                .join("testcases")
                .join(format!("{}.in", index + 1));
            async move { fs::write(&path, input).await }
        });
        future::try_join_all(writes)
            .await
            .context("failed to write test inputs")?;
        Ok(())
    }

    pub fn result_path(&self, index: usize, extension: &str) -> PathBuf {
        self.root.join("results").join(format!("{index}.{extension}"))
    }

    /// Remove the directory tree. Failures are logged and swallowed; cleanup
    /// must never replace the primary result.
    pub async fn cleanup(mut self) {
        self.removed = true;
        if let Err(err) = fs::remove_dir_all(&self.root).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %self.root.display(),
                    error = %err,
                    "failed to remove work directory"
                );
            }
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_the_expected_layout() {
        let base = tempfile::tempdir().unwrap();
        let workdir = WorkDir::create(base.path()).await.unwrap();

        for sub in ["code", "testcases", "results"] {
            assert!(workdir.path().join(sub).is_dir(), "missing {sub}/");
        }
        workdir.cleanup().await;
    }

    #[tokio::test]
    async fn inputs_are_one_based() {
        let base = tempfile::tempdir().unwrap();
        let workdir = WorkDir::create(base.path()).await.unwrap();
        workdir
            .write_inputs(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        let first = fs::read_to_string(workdir.path().join("testcases/1.in"))
            .await
            .unwrap();
        let second = fs::read_to_string(workdir.path().join("testcases/2.in"))
            .await
            .unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "second");
        workdir.cleanup().await;
    }

    #[tokio::test]
    async fn cleanup_removes_the_tree() {
        let base = tempfile::tempdir().unwrap();
        let workdir = WorkDir::create(base.path()).await.unwrap();
        workdir
            .write_source("main.py", "print('hi')")
            .await
            .unwrap();
        let root = workdir.path().to_path_buf();

        workdir.cleanup().await;
        assert!(!root.exists());
        // The temp root itself stays usable for the next submission.
        assert!(base.path().exists());
    }

    #[tokio::test]
    async fn drop_guard_removes_the_tree() {
        let base = tempfile::tempdir().unwrap();
        let root = {
            let workdir = WorkDir::create(base.path()).await.unwrap();
            workdir.path().to_path_buf()
        };
        assert!(!root.exists());
    }
}
