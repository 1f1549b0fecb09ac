use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Stored file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,      // display name, "/<user id>/<base name>"
    pub list_name: String, // display name without extension
    pub extension: String, // ".txt", or empty
    #[serde(skip_serializing)]
    pub path: String,      // location of the bytes on disk
    pub size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub user_id: i64,
    pub name: String,
    pub list_name: String,
    pub extension: String,
    pub path: String,
    pub size: i64,
    pub created_at: OffsetDateTime,
}
