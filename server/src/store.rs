//! Document store accessors.
//!
//! The relay reads and writes two kinds of documents: chat [`Message`]s and
//! user profiles ([`User`]). Both are reached through narrow, object-safe
//! traits so that handlers never depend on a particular backend:
//!
//! - [`MessageStore`] - insert, find all, find all sorted by creation time
//! - [`UserStore`] - find by primary key (plus insert, used for seeding)
//!
//! Messages are never updated or deleted.
//!
//! # Backends
//!
//! - [`InMemoryStore`] - insertion-ordered vectors, selected when no
//!   `DATABASE_URL` is configured
//! - [`SqliteStore`](crate::sqlite::SqliteStore) - sqlx SQLite pool
//!
//! Use [`Stores::connect`] to pick a backend from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::sqlite::SqliteStore;
use crate::types::{Message, User};

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The document failed schema validation and was not written.
    #[error("invalid document: {0}")]
    Validation(String),

    /// The backend failed to complete the operation.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Persistence for chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns the stored document.
    async fn insert(&self, message: Message) -> Result<Message, StoreError>;

    /// Returns every stored message. No ordering is guaranteed.
    async fn find_all(&self) -> Result<Vec<Message>, StoreError>;

    /// Returns every stored message ordered by `created_at` ascending.
    /// Messages with equal timestamps keep insertion order.
    async fn find_all_sorted(&self) -> Result<Vec<Message>, StoreError>;
}

/// Read access to user profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user by primary key.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Inserts or replaces a user. The relay itself never calls this; it
    /// exists for seeding and tests.
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;
}

/// The pair of stores shared by the HTTP and realtime layers.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Opens the backend selected by `database_url`.
    ///
    /// `None` selects a fresh [`InMemoryStore`]; a `sqlite:` URL opens (and
    /// if necessary creates) a SQLite database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database cannot be opened or
    /// its schema cannot be created.
    pub async fn connect(database_url: Option<&str>) -> Result<Self, StoreError> {
        match database_url {
            Some(url) => {
                let store = Arc::new(SqliteStore::connect(url).await?);
                info!("Connected to SQLite document store");
                Ok(Self {
                    messages: store.clone(),
                    users: store,
                })
            }
            None => Ok(Self::in_memory()),
        }
    }

    /// Stores backed by a single fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            messages: store.clone(),
            users: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    messages: RwLock<Vec<Message>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        debug!(message_id = %message.id, total = messages.len(), "Message stored");
        Ok(message)
    }

    async fn find_all(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages.read().await.clone())
    }

    async fn find_all_sorted(&self) -> Result<Vec<Message>, StoreError> {
        let mut messages = self.messages.read().await.clone();
        // sort_by_key is stable, so ties keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let user = user.without_reserved_fields();
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        Ok(user)
    }
}
