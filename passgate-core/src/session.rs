//! In-memory storage for pending ceremony options
//!
//! Options live between the two round trips of a ceremony and expire after
//! five minutes by default. Each entry can be taken once, so a replayed
//! response finds nothing to verify against.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::options::{PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions};

/// Maximum age for pending options (5 minutes)
pub const CEREMONY_EXPIRY_SECS: u64 = 300;

/// Pending registration with expiration
struct RegistrationEntry {
    options: PublicKeyCredentialCreationOptions,
    expires_at: Instant,
}

/// Pending authentication with expiration
struct AuthenticationEntry {
    options: PublicKeyCredentialRequestOptions,
    user_handle: Option<Vec<u8>>,
    expires_at: Instant,
}

/// Take-once store of issued options keyed by a host-chosen session id
pub struct CeremonyStore {
    ttl: Duration,
    registrations: DashMap<String, RegistrationEntry>,
    authentications: DashMap<String, AuthenticationEntry>,
}

impl Default for CeremonyStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(CEREMONY_EXPIRY_SECS))
    }
}

impl CeremonyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            registrations: DashMap::new(),
            authentications: DashMap::new(),
        }
    }

    pub fn store_registration(
        &self,
        session_id: impl Into<String>,
        options: PublicKeyCredentialCreationOptions,
    ) {
        self.registrations.insert(
            session_id.into(),
            RegistrationEntry {
                options,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Retrieve and remove pending creation options
    pub fn take_registration(&self, session_id: &str) -> Option<PublicKeyCredentialCreationOptions> {
        let (_, entry) = self.registrations.remove(session_id)?;
        (entry.expires_at > Instant::now()).then_some(entry.options)
    }

    /// `user_handle` records the account identified before the ceremony,
    /// or `None` for a usernameless sign-in.
    pub fn store_authentication(
        &self,
        session_id: impl Into<String>,
        options: PublicKeyCredentialRequestOptions,
        user_handle: Option<Vec<u8>>,
    ) {
        self.authentications.insert(
            session_id.into(),
            AuthenticationEntry {
                options,
                user_handle,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Retrieve and remove pending request options
    pub fn take_authentication(
        &self,
        session_id: &str,
    ) -> Option<(PublicKeyCredentialRequestOptions, Option<Vec<u8>>)> {
        let (_, entry) = self.authentications.remove(session_id)?;
        (entry.expires_at > Instant::now()).then_some((entry.options, entry.user_handle))
    }

    /// Remove expired entries (called periodically)
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.registrations.retain(|_, entry| entry.expires_at > now);
        self.authentications.retain(|_, entry| entry.expires_at > now);
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn authentication_count(&self) -> usize {
        self.authentications.len()
    }
}

impl std::fmt::Debug for CeremonyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyStore")
            .field("ttl", &self.ttl)
            .field("registrations", &self.registrations.len())
            .field("authentications", &self.authentications.len())
            .finish()
    }
}
