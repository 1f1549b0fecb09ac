use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::future::join_all;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::naming::{split_extension, upload_base_name, CollisionResolver, FilenameError};
use super::repo::FileStore;
use super::repo_types::{FileRecord, NewFileRecord};
use crate::db::StoreError;
use crate::storage::BlobStore;

/// One file of a multi-file upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("{0}")]
    InvalidName(FilenameError),
    #[error("file already exists")]
    Conflict,
    #[error("could not pick a path: {0}")]
    Resolve(String),
    #[error("could not write bytes: {0}")]
    Write(String),
    /// Bytes failed to land and the record could not be rolled back.
    #[error("record stored without bytes: {0}")]
    Inconsistent(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Stored(FileRecord),
    Failed(FailureReason),
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Name the file was stored under, or the best name known when it failed.
    pub filename: String,
    pub outcome: Outcome,
}

impl FileOutcome {
    fn failed(filename: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            filename: filename.into(),
            outcome: Outcome::Failed(reason),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.outcome, Outcome::Stored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Complete,
    Partial,
}

/// Per-file outcomes of one upload, one entry per input file, in input order.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub outcomes: Vec<FileOutcome>,
}

impl UploadReport {
    pub fn status(&self) -> UploadStatus {
        if self.outcomes.iter().all(FileOutcome::is_stored) {
            UploadStatus::Complete
        } else {
            UploadStatus::Partial
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self.status() {
            UploadStatus::Complete => StatusCode::OK,
            UploadStatus::Partial => StatusCode::CONFLICT,
        }
    }

    /// `"Loaded files: a.txt, b(1).txt, c.txt FAILED!"`
    pub fn message(&self) -> String {
        let names: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match o.outcome {
                Outcome::Stored(_) => o.filename.clone(),
                Outcome::Failed(_) => format!("{} FAILED!", o.filename),
            })
            .collect();
        format!("Loaded files: {}", names.join(", "))
    }
}

/// Runs one ingestion task per uploaded file, at most `max_in_flight` at a
/// time, and waits for all of them.
///
/// Each task resolves a free path, creates the file record (the store's
/// unique constraint is the collision arbiter), and only then writes the
/// bytes. A failed write deletes the record again. Tasks never share mutable
/// state: each returns its own outcome and the coordinator collects them.
#[derive(Clone)]
pub struct UploadCoordinator {
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    max_in_flight: usize,
}

impl UploadCoordinator {
    pub fn new(files: Arc<dyn FileStore>, blobs: Arc<dyn BlobStore>, max_in_flight: usize) -> Self {
        Self {
            files,
            blobs,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn ingest(&self, owner: i64, dir: &Path, uploads: Vec<UploadedFile>) -> UploadReport {
        if uploads.is_empty() {
            return UploadReport::default();
        }

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let resolver = Arc::new(CollisionResolver::new(self.blobs.clone()));

        let (names, handles): (Vec<_>, Vec<_>) = uploads
            .into_iter()
            .map(|upload| {
                let task = IngestTask {
                    owner,
                    dir: dir.to_path_buf(),
                    files: self.files.clone(),
                    blobs: self.blobs.clone(),
                    resolver: resolver.clone(),
                };
                let permits = permits.clone();
                let name = upload.filename.clone();
                let handle = tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return FileOutcome::failed(
                            upload.filename,
                            FailureReason::Internal("ingestion closed".into()),
                        );
                    };
                    task.run(upload).await
                });
                (name, handle)
            })
            .unzip();

        let outcomes = names
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(name, joined)| {
                joined.unwrap_or_else(|e| {
                    error!(file = %name, error = %e, "ingestion task died");
                    FileOutcome::failed(name, FailureReason::Internal("ingestion task died".into()))
                })
            })
            .collect();

        let report = UploadReport { outcomes };
        info!(
            owner,
            files = report.outcomes.len(),
            status = ?report.status(),
            "upload finished"
        );
        report
    }
}

struct IngestTask {
    owner: i64,
    dir: PathBuf,
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    resolver: Arc<CollisionResolver>,
}

impl IngestTask {
    async fn run(self, upload: UploadedFile) -> FileOutcome {
        let base = match upload_base_name(&upload.filename) {
            Ok(b) => b.to_string(),
            Err(e) => {
                warn!(owner = self.owner, file = %upload.filename, error = %e, "rejected filename");
                return FileOutcome::failed(upload.filename, FailureReason::InvalidName(e));
            }
        };

        let path = match self.resolver.resolve(&self.dir, &base).await {
            Ok(p) => p,
            Err(e) => {
                error!(owner = self.owner, file = %base, error = %e, "path resolution failed");
                return FileOutcome::failed(base, FailureReason::Resolve(e.to_string()));
            }
        };
        let stored_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&base)
            .to_string();

        let candidate = new_record(self.owner, &stored_name, &path, upload.body.len());
        let record = match self.files.create(candidate).await {
            Ok(r) => r,
            Err(StoreError::Conflict(constraint)) => {
                warn!(owner = self.owner, file = %stored_name, %constraint, "file is not unique");
                return FileOutcome::failed(stored_name, FailureReason::Conflict);
            }
            Err(e) => {
                error!(owner = self.owner, file = %stored_name, error = %e, "create file record failed");
                return FileOutcome::failed(stored_name, FailureReason::Internal(e.to_string()));
            }
        };

        if let Err(e) = self.blobs.put(&path, upload.body).await {
            let cause = format!("{e:#}");
            error!(owner = self.owner, file = %stored_name, error = %cause, "write failed; rolling back record");
            return match self.files.delete(record.id).await {
                Ok(()) => FileOutcome::failed(stored_name, FailureReason::Write(cause)),
                Err(rollback) => {
                    error!(
                        owner = self.owner,
                        file_id = record.id,
                        path = %record.path,
                        error = %rollback,
                        "rollback failed; record has no bytes"
                    );
                    FileOutcome::failed(stored_name, FailureReason::Inconsistent(cause))
                }
            };
        }

        info!(owner = self.owner, file_id = record.id, file = %stored_name, size = record.size, "file stored");
        FileOutcome {
            filename: stored_name,
            outcome: Outcome::Stored(record),
        }
    }
}

fn new_record(owner: i64, stored_name: &str, path: &Path, size: usize) -> NewFileRecord {
    let (stem, ext) = split_extension(stored_name);
    NewFileRecord {
        user_id: owner,
        name: format!("/{owner}/{stored_name}"),
        list_name: stem.to_string(),
        extension: ext.to_string(),
        path: path.to_string_lossy().into_owned(),
        size: i64::try_from(size).unwrap_or(i64::MAX),
        created_at: OffsetDateTime::now_utc(),
    }
}
