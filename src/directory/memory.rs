//! In-process directory, used for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DirectoryClient, DirectoryError, NewDirectoryUser};

#[derive(Debug, Clone)]
struct Entry {
    user: NewDirectoryUser,
    password: String,
}

/// Directory that keeps its entries in a map.
///
/// Availability can be toggled to simulate an outage, and entries can be
/// inserted or removed behind the workflow's back to simulate out-of-band
/// changes.
#[derive(Debug)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<String, Entry>>,
    available: AtomicBool,
    creates: AtomicUsize,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    /// Create an empty, available directory.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            creates: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent operation fail with `Unavailable` (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert an entry directly, bypassing the client API.
    pub async fn insert_existing(&self, user: NewDirectoryUser, password: &str) {
        self.entries.write().await.insert(
            user.username.clone(),
            Entry {
                user,
                password: password.to_string(),
            },
        );
    }

    /// Remove an entry directly. Returns whether it existed.
    pub async fn remove(&self, username: &str) -> bool {
        self.entries.write().await.remove(username).is_some()
    }

    /// Whether an entry exists, without the availability check.
    pub async fn contains(&self, username: &str) -> bool {
        self.entries.read().await.contains_key(username)
    }

    /// Current password of an entry.
    pub async fn password_of(&self, username: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(username)
            .map(|e| e.password.clone())
    }

    /// Number of successful `create_user` calls so far.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable(
                "in-memory directory is offline".to_string(),
            ))
        }
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, username: &str) -> Result<bool, DirectoryError> {
        self.ensure_available()?;
        Ok(self.entries.read().await.contains_key(username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        self.ensure_available()?;
        Ok(self
            .entries
            .read()
            .await
            .values()
            .any(|e| e.user.email.eq_ignore_ascii_case(email)))
    }

    async fn create_user(
        &self,
        user: &NewDirectoryUser,
        password: &str,
    ) -> Result<(), DirectoryError> {
        user.check()?;
        self.ensure_available()?;

        let mut entries = self.entries.write().await;
        if entries.contains_key(&user.username) {
            return Err(DirectoryError::Conflict(user.username.clone()));
        }
        entries.insert(
            user.username.clone(),
            Entry {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<(), DirectoryError> {
        self.ensure_available()?;
        match self.entries.write().await.get_mut(username) {
            Some(entry) => {
                entry.password = password.to_string();
                Ok(())
            }
            None => Err(DirectoryError::NotFound(username.to_string())),
        }
    }

    async fn delete_user(&self, username: &str) -> Result<(), DirectoryError> {
        self.ensure_available()?;
        match self.entries.write().await.remove(username) {
            Some(_) => Ok(()),
            None => Err(DirectoryError::NotFound(username.to_string())),
        }
    }
}
