//! Credential store collaborators
//!
//! The SDK never owns account credentials. It reads them through a
//! [`TokenProvider`] and reports rotated session cookies through a
//! [`SessionSink`].

use super::credentials::SessionCredentials;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Yields the current credentials for an account
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn session_credentials(&self, account: &str) -> Result<SessionCredentials>;
}

/// Persists a session id the platform rotated
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn persist(&self, account: &str, new_sid: &str) -> Result<()>;
}

/// In-memory credential store implementing both collaborator traits
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<String, SessionCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, credentials: SessionCredentials) {
        self.accounts
            .write()
            .await
            .insert(credentials.account.clone(), credentials);
    }

    pub async fn get(&self, account: &str) -> Option<SessionCredentials> {
        self.accounts.read().await.get(account).cloned()
    }

    /// Forget an account, e.g. after its session was invalidated
    pub async fn remove(&self, account: &str) -> Option<SessionCredentials> {
        self.accounts.write().await.remove(account)
    }
}

#[async_trait]
impl TokenProvider for MemoryCredentialStore {
    async fn session_credentials(&self, account: &str) -> Result<SessionCredentials> {
        self.get(account).await.ok_or(ApiError::InvalidAccount)
    }
}

#[async_trait]
impl SessionSink for MemoryCredentialStore {
    async fn persist(&self, account: &str, new_sid: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let credentials = accounts
            .get_mut(account)
            .ok_or_else(|| ApiError::store(format!("Unknown account {account}")))?;
        credentials.sid = Some(new_sid.to_string());
        debug!("Stored rotated session for {}", account);
        Ok(())
    }
}
