//! In-memory stores used by unit tests. They enforce the same unique
//! constraints as the Postgres schema.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::repo::UserStore;
use crate::auth::repo_types::User;
use crate::db::StoreError;
use crate::files::repo::FileStore;
use crate::files::repo_types::{FileRecord, NewFileRecord};

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    users: Mutex<Vec<User>>,
    files: Mutex<Vec<FileRecord>>,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Makes every subsequent `FileStore::delete` fail.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }
        let user = User {
            id: self.next_id(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create(&self, new: NewFileRecord) -> Result<FileRecord, StoreError> {
        let mut files = self.files.lock().unwrap();
        if files.iter().any(|f| f.path == new.path) {
            return Err(StoreError::Conflict("files_path_key".into()));
        }
        if files.iter().any(|f| f.name == new.name) {
            return Err(StoreError::Conflict("files_name_key".into()));
        }
        let record = FileRecord {
            id: self.next_id(),
            user_id: new.user_id,
            name: new.name,
            list_name: new.list_name,
            extension: new.extension,
            path: new.path,
            size: new.size,
            created_at: new.created_at,
        };
        files.push(record.clone());
        Ok(record)
    }

    async fn find(&self, user_id: i64, id: i64) -> Result<FileRecord, StoreError> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id && f.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn rename(
        &self,
        user_id: i64,
        id: i64,
        name: &str,
        list_name: &str,
    ) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        if files.iter().any(|f| f.name == name && f.id != id) {
            return Err(StoreError::Conflict("files_name_key".into()));
        }
        let record = files
            .iter_mut()
            .find(|f| f.id == id && f.user_id == user_id)
            .ok_or(StoreError::NotFound)?;
        record.name = name.to_string();
        record.list_name = list_name.to_string();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("delete disabled".into()));
        }
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|f| f.id != id);
        if files.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
