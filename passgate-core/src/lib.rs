//! Passgate Core - server-side WebAuthn / FIDO2 verification
//!
//! This crate verifies the two WebAuthn ceremonies a relying party runs:
//! registering a credential (attestation) and signing in with it
//! (assertion).
//!
//! # Features
//!
//! - CBOR decoder with pluggable tag and simple-value registries
//! - COSE keys (EC2, RSA, OKP) and signature algorithms backed by OpenSSL
//! - Attestation formats: none, fido-u2f, packed, tpm, android-key,
//!   android-safetynet, apple
//! - Ordered registration and authentication checks with typed errors
//! - Pluggable credential storage and signature-counter policy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use passgate_core::{
//!     InMemoryCredentialRepository, PublicKeyCredentialSourceRepository,
//!     PublicKeyCredentialUserEntity, RelyingParty, RelyingPartyConfig, RequestInfo,
//! };
//!
//! # fn example(credential_json: &str) -> passgate_core::Result<()> {
//! let repository = Arc::new(InMemoryCredentialRepository::new());
//! let rp = RelyingParty::new(RelyingPartyConfig::default(), repository.clone());
//!
//! let user = PublicKeyCredentialUserEntity {
//!     id: b"user-1".to_vec(),
//!     name: "alice".into(),
//!     display_name: "Alice".into(),
//! };
//! let options = rp.creation_options(user)?;
//! // ... send `options` to the browser, receive `credential_json` back ...
//! let source = rp.finish_registration(credential_json, &options, &RequestInfo::new("localhost"))?;
//! rp.repository().save(&source)?;
//! # Ok(())
//! # }
//! ```

pub mod attestation;
pub mod authenticator_data;
pub mod base64url;
pub mod cbor;
pub mod ceremony;
pub mod client_data;
pub mod config;
pub mod cose;
pub mod counter;
pub mod credential;
pub mod error;
pub mod metadata;
pub mod options;
pub mod relying_party;
pub mod repository;
pub mod request;
pub mod session;
pub mod source;

#[cfg(feature = "network")]
pub mod safetynet_client;

#[cfg(test)]
mod fixtures;

// Re-export main types for convenience
pub use attestation::{
    AttestationFormat, AttestationFormatRegistry, AttestationObject, AttestationObjectLoader,
    AttestationStatement, AttestationType, SafetyNetAttestation, SafetyNetVerdict,
    SafetyNetVerdictSource, TrustPath,
};
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData};
pub use cbor::{CborError, CborValue, Decoder};
pub use ceremony::{
    AppIdExtensionChecker, AuthenticationValidator, CeremonyPolicy, ExtensionOutputChecker,
    ExtensionOutputCheckers, RegistrationValidator, TokenBindingPolicy,
};
pub use client_data::CollectedClientData;
pub use config::{ConfigError, RelyingPartyConfig};
pub use cose::{AlgorithmManager, CoseAlgorithm, CoseKey};
pub use counter::{CounterChecker, CounterPolicy, LenientCounterChecker, StrictCounterChecker};
pub use credential::{AuthenticatorResponse, PublicKeyCredential, PublicKeyCredentialLoader};
pub use error::{Result, WebauthnError};
pub use metadata::{
    AuthenticatorDescription, AuthenticatorStatus, MetadataStatusCheck,
    StaticAuthenticatorCatalog,
};
pub use options::{
    AttestationConveyance, AuthenticationExtensions, AuthenticatorSelectionCriteria,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, PublicKeyCredentialRequestOptions, PublicKeyCredentialRpEntity,
    PublicKeyCredentialUserEntity, UserVerificationRequirement,
};
pub use relying_party::{RelyingParty, RelyingPartyBuilder};
pub use repository::{
    InMemoryCredentialRepository, PublicKeyCredentialSourceRepository, RepositoryError,
};
pub use request::{RequestInfo, ServerRequest};
pub use session::CeremonyStore;
pub use source::PublicKeyCredentialSource;

#[cfg(feature = "network")]
pub use safetynet_client::{GoogleSafetyNetClient, SafetyNetClientConfig};
