use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

/// Filesystem operations used by the upload receiver and the document store.
#[async_trait]
pub trait FileUtility: Send + Sync {
    /// Creates the directory and all of its parents if missing.
    async fn ensure_dir(&self, path: &Path) -> io::Result<()>;

    /// Makes sure the directory exists and contains nothing.
    async fn empty_dir(&self, path: &Path) -> io::Result<()>;

    /// Moves a file or directory. Moving a path onto itself does nothing.
    async fn move_path(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file or a whole directory tree. Missing paths are fine.
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileUtility;

#[async_trait]
impl FileUtility for LocalFileUtility {
    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn empty_dir(&self, path: &Path) -> io::Result<()> {
        self.remove(path).await?;
        fs::create_dir_all(path).await
    }

    async fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
        if from == to {
            return Ok(());
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                // rename cannot cross filesystems, fall back to copy + delete
                let metadata = match fs::metadata(from).await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    _ => return Err(rename_err),
                };
                tracing::debug!(
                    "rename {} -> {} failed ({}), copying {} bytes instead",
                    from.display(),
                    to.display(),
                    rename_err,
                    metadata.len()
                );
                fs::copy(from, to).await?;
                fs::remove_file(from).await
            }
        }
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(from, to).await.map(|_| ())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).await,
            Ok(_) => fs::remove_file(path).await,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
