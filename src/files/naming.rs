use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::storage::BlobStore;

/// Why a client-supplied filename was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("file name is empty")]
    Empty,
    #[error("file name must not contain '/' or '\\'")]
    Separator,
    #[error("'.' and '..' are not file names")]
    DotEntry,
    #[error("file name must not start with '.'")]
    Hidden,
    #[error("file name must not contain control characters")]
    Control,
}

/// Checks a name that is stored as-is. Surrounding whitespace is dropped;
/// the name must be a single visible, non-hidden path component.
pub fn validate_flat_filename(name: &str) -> Result<&str, FilenameError> {
    let name = name.trim();
    for c in name.chars() {
        match c {
            '/' | '\\' => return Err(FilenameError::Separator),
            _ if c.is_control() => return Err(FilenameError::Control),
            _ => {}
        }
    }
    match name {
        "" => Err(FilenameError::Empty),
        "." | ".." => Err(FilenameError::DotEntry),
        _ if name.starts_with('.') => Err(FilenameError::Hidden),
        _ => Ok(name),
    }
}

/// Last component of an uploaded filename. Browsers may send a client-side
/// path with either separator.
pub fn upload_base_name(raw: &str) -> Result<&str, FilenameError> {
    let base = raw.rfind(['/', '\\']).map_or(raw, |i| &raw[i + 1..]);
    validate_flat_filename(base)
}

/// Splits `name` into stem and extension; the extension keeps its dot.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn numbered(stem: &str, ext: &str, n: u64) -> String {
    if n == 0 {
        format!("{stem}{ext}")
    } else {
        format!("{stem}({n}){ext}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("check {path}: {reason}")]
    Lookup { path: PathBuf, reason: String },
    #[error("no free name left for {0}")]
    Exhausted(String),
}

/// Picks a free path for each file of one upload batch.
///
/// Candidates are `stem.ext`, `stem(1).ext`, `stem(2).ext`, ... tried in
/// order. A candidate is taken if it exists on disk or was already handed
/// out by this resolver. The disk check is advisory: concurrent requests
/// have separate resolvers and are arbitrated by the file store's unique
/// constraint.
pub struct CollisionResolver {
    blobs: Arc<dyn BlobStore>,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl CollisionResolver {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn resolve(&self, dir: &Path, desired: &str) -> Result<PathBuf, ResolveError> {
        let (stem, ext) = split_extension(desired);
        for n in 0..=u64::MAX {
            let path = dir.join(numbered(stem, ext, n));
            if self.is_claimed(&path) {
                continue;
            }
            let exists = self
                .blobs
                .exists(&path)
                .await
                .map_err(|e| ResolveError::Lookup {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                })?;
            if exists {
                continue;
            }
            // another task may have claimed it during the disk check
            if self.claim(&path) {
                debug!(path = %path.display(), attempts = n + 1, "resolved upload path");
                return Ok(path);
            }
        }
        Err(ResolveError::Exhausted(desired.to_string()))
    }

    fn is_claimed(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(path)
    }

    fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalDisk;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct UnreadableDisk;

    #[async_trait]
    impl BlobStore for UnreadableDisk {
        async fn exists(&self, _path: &Path) -> anyhow::Result<bool> {
            anyhow::bail!("permission denied")
        }
        async fn put(&self, _path: &Path, _body: Bytes) -> anyhow::Result<()> {
            Ok(())
        }
        async fn read(&self, _path: &Path) -> anyhow::Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn remove(&self, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn split_extension_works() {
        assert_eq!(split_extension("a.txt"), ("a", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    }

    #[test]
    fn upload_base_name_strips_directories() {
        assert_eq!(upload_base_name("a.txt"), Ok("a.txt"));
        assert_eq!(upload_base_name("../../etc/passwd"), Ok("passwd"));
        assert_eq!(upload_base_name("C:\\Users\\me\\b.png"), Ok("b.png"));
        assert_eq!(upload_base_name("dir/"), Err(FilenameError::Empty));
        assert_eq!(upload_base_name("dir/.."), Err(FilenameError::DotEntry));
        assert_eq!(upload_base_name("dir\\."), Err(FilenameError::DotEntry));
        assert_eq!(upload_base_name(".env"), Err(FilenameError::Hidden));
    }

    #[test]
    fn validate_flat_filename_rejects_bad_names() {
        assert_eq!(validate_flat_filename("  padded.txt "), Ok("padded.txt"));
        assert_eq!(validate_flat_filename("foo..bar"), Ok("foo..bar"));
        assert_eq!(
            validate_flat_filename("src/main.rs"),
            Err(FilenameError::Separator)
        );
        assert_eq!(validate_flat_filename("foo\0bar"), Err(FilenameError::Control));
        assert_eq!(
            validate_flat_filename("file\r\nname.txt"),
            Err(FilenameError::Control)
        );
        assert_eq!(validate_flat_filename(" \t "), Err(FilenameError::Empty));
        assert_eq!(validate_flat_filename(".."), Err(FilenameError::DotEntry));
    }

    #[tokio::test]
    async fn skips_existing_numbered_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "0").unwrap();
        std::fs::write(dir.path().join("a(1).txt"), "1").unwrap();

        let resolver = CollisionResolver::new(Arc::new(LocalDisk));
        let path = resolver.resolve(dir.path(), "a.txt").await.unwrap();
        assert_eq!(path, dir.path().join("a(2).txt"));
    }

    #[tokio::test]
    async fn free_name_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CollisionResolver::new(Arc::new(LocalDisk));
        assert_eq!(
            resolver.resolve(dir.path(), "notes").await.unwrap(),
            dir.path().join("notes")
        );
    }

    #[tokio::test]
    async fn never_hands_out_the_same_path_twice() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CollisionResolver::new(Arc::new(LocalDisk));
        let first = resolver.resolve(dir.path(), "x.txt").await.unwrap();
        let second = resolver.resolve(dir.path(), "x.txt").await.unwrap();
        let third = resolver.resolve(dir.path(), "x.txt").await.unwrap();
        assert_eq!(first, dir.path().join("x.txt"));
        assert_eq!(second, dir.path().join("x(1).txt"));
        assert_eq!(third, dir.path().join("x(2).txt"));
    }

    #[tokio::test]
    async fn failed_lookup_is_not_a_free_pass() {
        let resolver = CollisionResolver::new(Arc::new(UnreadableDisk));
        let err = resolver.resolve(Path::new("/data/1"), "a.txt").await.unwrap_err();
        assert!(matches!(err, ResolveError::Lookup { .. }));
    }
}
