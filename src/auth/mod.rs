//! Subscriber authentication
//!
//! A subscribe request carries an opaque token. The token is looked up in a
//! key-value credential store under `<key_prefix><token>`; a non-empty stored
//! value admits the client. Every store failure rejects the request.

pub mod config;
pub mod redis;
pub mod resp;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::error::{AuthError, StoreError};

pub use config::RedisConfig;
pub use redis::{RedisConnection, RedisCredentialStore};

/// Default key prefix for API tokens
pub const DEFAULT_KEY_PREFIX: &str = "laravel:api_keys:";

/// Key-value lookup used to validate tokens
pub trait CredentialStore: Send + Sync + 'static {
    /// Fetch the value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
}

/// In-process credential store
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    /// Remove `key`
    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

/// Validates subscribe tokens against a credential store
pub struct Authenticator<S> {
    store: S,
    key_prefix: String,
}

impl<S: CredentialStore> Authenticator<S> {
    /// Create an authenticator using [`DEFAULT_KEY_PREFIX`]
    pub fn new(store: S) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    /// Create an authenticator with a custom key prefix
    pub fn with_prefix(store: S, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    /// Get the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the key prefix
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Check a token
    ///
    /// Missing or empty tokens, absent or empty stored values, and store
    /// errors are all rejections.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<(), AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let key = format!("{}{}", self.key_prefix, token);
        match self.store.get(&key).await {
            Ok(Some(value)) if !value.is_empty() => Ok(()),
            Ok(_) => Err(AuthError::InvalidToken),
            Err(e) => {
                tracing::warn!(error = %e, "Credential lookup failed, rejecting client");
                Err(AuthError::StoreUnavailable(e))
            }
        }
    }
}
