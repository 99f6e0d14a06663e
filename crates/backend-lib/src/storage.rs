// ============================
// warden-lib/src/storage.rs
// ============================
//! Storage abstraction with flat-file and in-memory implementations.
//!
//! Two write paths exist. `save_user` persists the outcome of a validated
//! save and never touches the remember-token digest. `update_token_digest_only`
//! writes nothing but that digest and is used without running validation.
//!
//! Writers on one store are serialized, so concurrent writes to the same
//! record are last-writer-wins and never lose the other path's field. Email
//! uniqueness is re-checked under that serialization when a record is
//! inserted or its email changes.
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tempfile::NamedTempFile;
use tokio::{fs as tokio_fs, sync::Mutex};
use tracing::debug;
use warden_common::UserId;

use crate::error::AppError;
use crate::user::User;
use crate::validation::{normalize_email, Field, ValidationErrors, MSG_TAKEN};

/// Trait for storage backends
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new record; fails if the id is already present or another
    /// record holds the email
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Persist email, password digest and `updated_at` of an existing record.
    /// A new email already held by another record is rejected.
    async fn save_user(&self, user: &User) -> Result<(), AppError>;

    /// Replace or clear the remember-token digest, nothing else
    async fn update_token_digest_only(
        &self,
        id: UserId,
        digest: Option<&str>,
    ) -> Result<(), AppError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError>;

    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Whether a user other than `except` holds `email`
    async fn email_taken(&self, email: &str, except: Option<UserId>) -> Result<bool, AppError> {
        Ok(self
            .find_by_email(email)
            .await?
            .is_some_and(|user| Some(user.id) != except))
    }
}

fn same_email(stored: &str, wanted: &str) -> bool {
    normalize_email(stored) == normalize_email(wanted)
}

fn email_taken_error() -> AppError {
    let mut errors = ValidationErrors::default();
    errors.add(Field::Email, MSG_TAKEN);
    AppError::Validation(errors)
}

/// Copy the validated-save fields onto the stored record
fn apply_save(stored: &mut User, user: &User) {
    stored.email = user.email.clone();
    stored.password_digest = user.password_digest.clone();
    stored.updated_at = user.updated_at;
}

/// Flat-file implementation: one JSON document per user under `<root>/users`
#[derive(Clone, Debug)]
pub struct FlatFileStorage {
    root: PathBuf,
    /// Held across every load-modify-write
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("users"))?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    fn user_path(&self, id: UserId) -> PathBuf {
        self.users_dir().join(format!("{id}.json"))
    }

    async fn read(&self, path: &Path) -> Result<User, AppError> {
        let content = tokio_fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a fresh temp file in the users dir and rename it over the
    /// record, so readers see either the old or the new document
    async fn write(&self, user: &User) -> Result<(), AppError> {
        let dir = self.users_dir();
        let path = self.user_path(user.id);
        let json = serde_json::to_vec_pretty(user)?;

        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| AppError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Storage(format!("write task failed: {e}")))?
    }

    async fn load(&self, id: UserId) -> Result<User, AppError> {
        self.find_user(id).await?.ok_or(AppError::UserNotFound)
    }

    async fn held_by_other(&self, email: &str, id: UserId) -> Result<bool, AppError> {
        Ok(self
            .find_by_email(email)
            .await?
            .is_some_and(|other| other.id != id))
    }
}

#[async_trait]
impl UserStore for FlatFileStorage {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        if tokio_fs::try_exists(self.user_path(user.id)).await? {
            return Err(AppError::Storage(format!("user {} already exists", user.id)));
        }
        if self.held_by_other(&user.email, user.id).await? {
            return Err(email_taken_error());
        }
        self.write(user).await
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load(user.id).await?;
        if !same_email(&stored.email, &user.email)
            && self.held_by_other(&user.email, user.id).await?
        {
            return Err(email_taken_error());
        }
        apply_save(&mut stored, user);
        self.write(&stored).await
    }

    async fn update_token_digest_only(
        &self,
        id: UserId,
        digest: Option<&str>,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load(id).await?;
        stored.remember_token_digest = digest.map(str::to_string);
        self.write(&stored).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        let path = self.user_path(id);
        if !tokio_fs::try_exists(&path).await? {
            return Ok(None);
        }
        self.read(&path).await.map(Some)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let mut entries = tokio_fs::read_dir(self.users_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Skips in-flight temp files
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let user = self.read(&path).await?;
            if same_email(&user.email, email) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}

/// In-memory implementation backed by a concurrent map
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    users: Arc<DashMap<UserId, User>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn held_by_other(&self, email: &str, id: UserId) -> bool {
        self.users
            .iter()
            .any(|entry| entry.id != id && same_email(&entry.email, email))
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        if self.held_by_other(&user.email, user.id) {
            return Err(email_taken_error());
        }
        match self.users.entry(user.id) {
            Entry::Occupied(_) => {
                Err(AppError::Storage(format!("user {} already exists", user.id)))
            }
            Entry::Vacant(slot) => {
                let mut stored = user.clone();
                stored.remember_token = None;
                slot.insert(stored);
                Ok(())
            }
        }
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        if self.held_by_other(&user.email, user.id) {
            return Err(email_taken_error());
        }
        let mut stored = self.users.get_mut(&user.id).ok_or(AppError::UserNotFound)?;
        apply_save(&mut stored, user);
        Ok(())
    }

    async fn update_token_digest_only(
        &self,
        id: UserId,
        digest: Option<&str>,
    ) -> Result<(), AppError> {
        let mut stored = self.users.get_mut(&id).ok_or(AppError::UserNotFound)?;
        stored.remember_token_digest = digest.map(str::to_string);
        debug!(user_id = %id, "token digest written");
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|entry| same_email(&entry.email, email))
            .map(|entry| entry.value().clone()))
    }
}
