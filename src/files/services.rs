use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use tracing::{error, info, warn};

use super::naming::{validate_flat_filename, FilenameError};
use super::repo::FileStore;
use super::repo_types::FileRecord;
use crate::db::StoreError;
use crate::error::ApiError;
use crate::storage::BlobStore;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    InvalidName(#[from] FilenameError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("blob storage: {0}")]
    Blob(String),
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::InvalidName(e) => ApiError::Validation(e.to_string()),
            FileError::Store(e) => e.into(),
            FileError::Blob(e) => ApiError::Internal(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    ListName,
    Extension,
    Date,
    Size,
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ListName" => Ok(SortColumn::ListName),
            "Extension" => Ok(SortColumn::Extension),
            "Date" => Ok(SortColumn::Date),
            "Size" => Ok(SortColumn::Size),
            other => Err(other.to_string()),
        }
    }
}

impl SortColumn {
    fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            SortColumn::ListName => a.list_name.cmp(&b.list_name),
            SortColumn::Extension => a.extension.cmp(&b.extension),
            SortColumn::Date => a.created_at.cmp(&b.created_at),
            SortColumn::Size => a.size.cmp(&b.size),
        }
    }
}

/// Sorts by `col`; `ord == "asc"` sorts ascending, anything else descending.
/// An unknown or missing column leaves the store's order alone.
pub fn sort_records(records: &mut [FileRecord], col: Option<&str>, ord: Option<&str>) {
    let Some(col) = col else {
        return;
    };
    let column = match col.parse::<SortColumn>() {
        Ok(c) => c,
        Err(unknown) => {
            warn!(column = %unknown, "unknown sort column");
            return;
        }
    };
    let ascending = ord == Some("asc");
    records.sort_by(|a, b| {
        let o = column.compare(a, b);
        if ascending {
            o
        } else {
            o.reverse()
        }
    });
}

pub async fn list_files(
    files: &dyn FileStore,
    user_id: i64,
    col: Option<&str>,
    ord: Option<&str>,
) -> Result<Vec<FileRecord>, FileError> {
    let mut records = files.list_by_user(user_id).await?;
    sort_records(&mut records, col, ord);
    Ok(records)
}

/// Loads the caller's file and its bytes.
pub async fn read_file(
    files: &dyn FileStore,
    blobs: &dyn BlobStore,
    user_id: i64,
    id: i64,
) -> Result<(FileRecord, Bytes), FileError> {
    let record = files.find(user_id, id).await?;
    let body = blobs.read(Path::new(&record.path)).await.map_err(|e| {
        error!(file_id = id, error = %format!("{e:#}"), "read file bytes failed");
        FileError::Blob(format!("{e:#}"))
    })?;
    Ok((record, body))
}

/// Changes the display name of the caller's file. The extension and the
/// bytes on disk stay where they are.
pub async fn rename_file(
    files: &dyn FileStore,
    user_id: i64,
    id: i64,
    new_name: &str,
) -> Result<FileRecord, FileError> {
    let list_name = validate_flat_filename(new_name)?;
    let mut record = files.find(user_id, id).await?;
    let name = format!("/{user_id}/{list_name}{}", record.extension);

    files.rename(user_id, id, &name, list_name).await?;
    info!(user_id, file_id = id, %name, "file renamed");

    record.name = name;
    record.list_name = list_name.to_string();
    Ok(record)
}

/// Removes the bytes first and then the record, so a record never outlives
/// a successful delete. Bytes that are already gone do not block removal.
pub async fn delete_file(
    files: &dyn FileStore,
    blobs: &dyn BlobStore,
    user_id: i64,
    id: i64,
) -> Result<(), FileError> {
    let record = files.find(user_id, id).await?;
    let path = Path::new(&record.path);

    if let Err(e) = blobs.remove(path).await {
        let gone = matches!(blobs.exists(path).await, Ok(false));
        if !gone {
            error!(file_id = id, error = %format!("{e:#}"), "remove file bytes failed");
            return Err(FileError::Blob(format!("{e:#}")));
        }
        warn!(file_id = id, path = %record.path, "bytes already missing; dropping record");
    }

    files.delete(id).await?;
    info!(user_id, file_id = id, "file deleted");
    Ok(())
}

/// `Content-Disposition` value for a download of `record`.
pub fn attachment_header(record: &FileRecord) -> String {
    let base = record.name.rsplit('/').next().unwrap_or(&record.name);
    let escaped: String = base
        .chars()
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{escaped}\"")
}
