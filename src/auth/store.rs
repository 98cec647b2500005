//! Durable credential storage.
//!
//! The store is a small file-backed key-value space under the app data
//! directory, holding exactly two keys: the bearer token and the
//! serialized user record. It is the only state that survives a process
//! restart; the in-memory session is rebuilt from it at startup.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::User;

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "access_token";

/// Key holding the serialized user record
pub const USER_KEY: &str = "user";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("credential store I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("credential store record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Value wrapper recording when a key was last written.
///
/// The timestamp is metadata only; readers unwrap `data` and never
/// reconcile against `saved_at` (token validity is decided by the
/// server, not by local age).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Persisted<T> {
    data: T,
    saved_at: DateTime<Utc>,
}

impl<T> Persisted<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }

    fn age_minutes(&self) -> i64 {
        (Utc::now() - self.saved_at).num_minutes()
    }
}

/// File-backed credential store.
///
/// Each key maps to one JSON file in the store directory. There is no
/// cross-key transaction: a crash between writing the token and writing
/// the user can leave the two inconsistent, which the startup
/// verification path recovers from.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Write a value under `key`, replacing any previous value.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&Persisted::new(value))?;
        tokio::fs::write(self.key_path(key), contents).await?;
        Ok(())
    }

    /// Read the value under `key`, or `None` when the key is absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.key_path(key);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let persisted: Persisted<T> = serde_json::from_str(&contents)?;
        debug!(key, age_minutes = persisted.age_minutes(), "Credential store read");
        Ok(Some(persisted.data))
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ===== Typed helpers for the two durable keys =====

    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.get(TOKEN_KEY).await
    }

    pub async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.set(TOKEN_KEY, &token).await
    }

    pub async fn user(&self) -> Result<Option<User>, StoreError> {
        self.get(USER_KEY).await
    }

    pub async fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.set(USER_KEY, user).await
    }

    /// Remove both durable keys. Used at logout and when a request
    /// comes back 401.
    pub async fn purge(&self) -> Result<(), StoreError> {
        self.remove(TOKEN_KEY).await?;
        self.remove(USER_KEY).await?;
        Ok(())
    }
}
