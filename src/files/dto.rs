use serde::Deserialize;

/// `GET /files?col=Size&ord=asc`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub col: Option<String>,
    pub ord: Option<String>,
}

/// `GET /download?id=7`
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub id: i64,
}

/// Request body for renaming a file. `name` excludes the extension.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: i64,
}
