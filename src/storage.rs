use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Byte storage for uploaded files, addressed by filesystem path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(false)` only when the path is definitely absent; any other lookup
    /// failure is an error.
    async fn exists(&self, path: &Path) -> anyhow::Result<bool>;
    /// Writes a new file. Fails if something already exists at `path`, and
    /// leaves nothing at `path` when the write fails.
    async fn put(&self, path: &Path, body: Bytes) -> anyhow::Result<()>;
    async fn read(&self, path: &Path) -> anyhow::Result<Bytes>;
    async fn remove(&self, path: &Path) -> anyhow::Result<()>;
}

/// Local-disk blob store.
#[derive(Clone, Default)]
pub struct LocalDisk;

#[async_trait]
impl BlobStore for LocalDisk {
    async fn exists(&self, path: &Path) -> anyhow::Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("stat {}", path.display()))
    }

    async fn put(&self, path: &Path, body: Bytes) -> anyhow::Result<()> {
        write_new(path, &body, |file| file).await
    }

    async fn read(&self, path: &Path) -> anyhow::Result<Bytes> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        Ok(Bytes::from(data))
    }

    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    }
}

/// Creates `path` (never overwriting) and writes `body` through the writer
/// `wrap` builds around the new file. A failed write removes the partial
/// file again, so a failed `put` leaves nothing behind.
async fn write_new<W, F>(path: &Path, body: &[u8], wrap: F) -> anyhow::Result<()>
where
    F: FnOnce(tokio::fs::File) -> W,
    W: AsyncWrite + Unpin + Send,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .with_context(|| format!("create {}", path.display()))?;

    let mut writer = wrap(file);
    let written = async {
        writer.write_all(body).await?;
        writer.flush().await
    }
    .await;
    let Err(e) = written else {
        return Ok(());
    };

    drop(writer);
    let cause = anyhow::Error::new(e).context(format!("write {}", path.display()));
    match tokio::fs::remove_file(path).await {
        Ok(()) => Err(cause),
        Err(cleanup) => Err(cause.context(format!(
            "partial file left at {}: {cleanup}",
            path.display()
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_creates_parents_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7").join("a.txt");
        let disk = LocalDisk;

        assert!(!disk.exists(&path).await.unwrap());
        disk.put(&path, Bytes::from_static(b"first")).await.unwrap();
        assert!(disk.exists(&path).await.unwrap());

        let err = disk.put(&path, Bytes::from_static(b"second")).await;
        assert!(err.is_err());
        assert_eq!(disk.read(&path).await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let disk = LocalDisk;
        disk.put(&path, Bytes::from_static(b"x")).await.unwrap();
        disk.remove(&path).await.unwrap();
        assert!(!disk.exists(&path).await.unwrap());
        assert!(disk.remove(&path).await.is_err());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("9").join("big.bin");
        let disk = test_support::FullDisk { capacity: 16 };

        let err = disk
            .put(&path, Bytes::from(vec![7u8; 64 * 1024]))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("no space left"), "{err:#}");
        assert!(!path.exists());

        // the name is free again for the next attempt
        LocalDisk
            .put(&path, Bytes::from_static(b"retry"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"retry");
    }
}
