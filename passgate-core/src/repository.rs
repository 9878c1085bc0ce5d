//! Credential source storage contract.
//!
//! Hosts persist credential sources in their own database by implementing
//! [`PublicKeyCredentialSourceRepository`]. The in-memory implementation is
//! meant for tests and local development; credentials are lost on restart.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::source::PublicKeyCredentialSource;

/// Storage errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub trait PublicKeyCredentialSourceRepository: Send + Sync {
    fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<PublicKeyCredentialSource>, RepositoryError>;

    fn find_all_for_user(
        &self,
        user_handle: &[u8],
    ) -> Result<Vec<PublicKeyCredentialSource>, RepositoryError>;

    /// Insert or replace the record for `source.credential_id`.
    fn save(&self, source: &PublicKeyCredentialSource) -> Result<(), RepositoryError>;
}

impl<T: PublicKeyCredentialSourceRepository + ?Sized> PublicKeyCredentialSourceRepository for Arc<T> {
    fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<PublicKeyCredentialSource>, RepositoryError> {
        (**self).find_by_credential_id(credential_id)
    }

    fn find_all_for_user(
        &self,
        user_handle: &[u8],
    ) -> Result<Vec<PublicKeyCredentialSource>, RepositoryError> {
        (**self).find_all_for_user(user_handle)
    }

    fn save(&self, source: &PublicKeyCredentialSource) -> Result<(), RepositoryError> {
        (**self).save(source)
    }
}

/// DashMap-backed repository keyed by credential id.
pub struct InMemoryCredentialRepository {
    sources: DashMap<Vec<u8>, PublicKeyCredentialSource>,
}

impl Default for InMemoryCredentialRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        tracing::warn!("Using in-memory credential storage - credentials will be lost on restart!");
        Self {
            sources: DashMap::new(),
        }
    }

    /// Short-lived repository seeded with `sources`, for one-shot checks
    /// where the caller writes the resulting source back itself.
    pub fn with_sources(sources: impl IntoIterator<Item = PublicKeyCredentialSource>) -> Self {
        let sources: DashMap<_, _> = sources
            .into_iter()
            .map(|source| (source.credential_id.clone(), source))
            .collect();
        tracing::debug!(count = sources.len(), "Seeded ephemeral credential storage");
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl PublicKeyCredentialSourceRepository for InMemoryCredentialRepository {
    fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<PublicKeyCredentialSource>, RepositoryError> {
        Ok(self.sources.get(credential_id).map(|entry| entry.clone()))
    }

    fn find_all_for_user(
        &self,
        user_handle: &[u8],
    ) -> Result<Vec<PublicKeyCredentialSource>, RepositoryError> {
        Ok(self
            .sources
            .iter()
            .filter(|entry| entry.user_handle == user_handle)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn save(&self, source: &PublicKeyCredentialSource) -> Result<(), RepositoryError> {
        self.sources
            .insert(source.credential_id.clone(), source.clone());
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCredentialRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialRepository")
            .field("sources", &self.sources.len())
            .finish()
    }
}
