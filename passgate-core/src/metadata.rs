//! Authenticator metadata lookup.
//!
//! Provides authenticator model lookup by AAGUID from a static table of
//! well-known authenticators, plus a host-supplied status map used to refuse
//! authenticators whose attestation keys are known to be compromised.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, WebauthnError};

/// Known authenticator AAGUIDs with their descriptions
static KNOWN_AUTHENTICATORS: &[(&str, &str, &str)] = &[
    // Apple
    (
        "f24a8e70-d0d3-f82c-2937-32523cc4de5a",
        "Apple iCloud Keychain",
        "Apple",
    ),
    // Google
    (
        "adce0002-35bc-c60a-648b-0b25f1f05503",
        "Google Password Manager",
        "Google",
    ),
    (
        "ea9b8d66-4d01-1d21-3ce4-b6b48cb575d4",
        "Google Titan Security Key",
        "Google",
    ),
    // Microsoft
    (
        "6028b017-b1d4-4c02-b4b3-afcdafc96bb2",
        "Windows Hello",
        "Microsoft",
    ),
    (
        "08987058-cadc-4b81-b6e1-30de50dcbe96",
        "Windows Hello Hardware",
        "Microsoft",
    ),
    // Yubico
    (
        "2fc0579f-8113-47ea-b116-bb5a8db9202a",
        "YubiKey 5 NFC",
        "Yubico",
    ),
    (
        "c5ef55ff-ad9a-4b9f-b580-adebafe026d0",
        "YubiKey 5Ci",
        "Yubico",
    ),
    (
        "fa2b99dc-9e39-4257-8f92-4a30d23c4118",
        "YubiKey 5 FIPS",
        "Yubico",
    ),
    (
        "73bb0cd4-e502-49b8-9c6f-b59445bf720b",
        "YubiKey 5 Bio",
        "Yubico",
    ),
    // Feitian
    (
        "77010bd7-212a-4fc9-b236-d2ca5e9d4084",
        "Feitian BioPass K27",
        "Feitian",
    ),
    (
        "3e22415d-7fdf-4ea4-8a0c-dd60c4249b9d",
        "Feitian ePass FIDO2",
        "Feitian",
    ),
    // Password managers
    (
        "bada5566-a7aa-401f-bd96-45619a55120d",
        "1Password",
        "1Password",
    ),
    (
        "d548826e-79b4-db40-a3d8-11116f7e8349",
        "Dashlane",
        "Dashlane",
    ),
    // Samsung
    (
        "53414d53-554e-4700-0000-000000000000",
        "Samsung Pass",
        "Samsung",
    ),
];

/// Human-readable authenticator model, stored with the credential source
/// for account-management screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorDescription {
    pub aaguid: Uuid,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

/// Status reports a metadata service can publish for an authenticator model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticatorStatus {
    FidoCertified,
    NotFidoCertified,
    Revoked,
    AttestationKeyCompromise,
    UserKeyRemoteCompromise,
    UserKeyPhysicalCompromise,
}

impl AuthenticatorStatus {
    pub fn is_compromised(self) -> bool {
        matches!(
            self,
            AuthenticatorStatus::Revoked
                | AuthenticatorStatus::AttestationKeyCompromise
                | AuthenticatorStatus::UserKeyRemoteCompromise
                | AuthenticatorStatus::UserKeyPhysicalCompromise
        )
    }
}

/// Hook consulted after a successful attestation check.
pub trait MetadataStatusCheck: Send + Sync {
    /// Fail if the authenticator model must not be registered.
    fn check(&self, aaguid: &Uuid) -> Result<()>;

    fn describe(&self, aaguid: &Uuid) -> Option<AuthenticatorDescription>;
}

/// In-process catalog backed by the known-authenticator table.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticatorCatalog {
    statuses: HashMap<Uuid, AuthenticatorStatus>,
}

impl StaticAuthenticatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, aaguid: Uuid, status: AuthenticatorStatus) -> Self {
        self.statuses.insert(aaguid, status);
        self
    }

    pub fn status(&self, aaguid: &Uuid) -> Option<AuthenticatorStatus> {
        self.statuses.get(aaguid).copied()
    }
}

/// Look up an authenticator model by AAGUID.
pub fn lookup_authenticator(aaguid: &Uuid) -> Option<AuthenticatorDescription> {
    let key = aaguid.hyphenated().to_string();
    KNOWN_AUTHENTICATORS
        .iter()
        .find(|(known, _, _)| *known == key)
        .map(|(_, description, vendor)| AuthenticatorDescription {
            aaguid: *aaguid,
            description: description.to_string(),
            vendor: Some(vendor.to_string()),
        })
}

impl MetadataStatusCheck for StaticAuthenticatorCatalog {
    fn check(&self, aaguid: &Uuid) -> Result<()> {
        match self.status(aaguid) {
            Some(status) if status.is_compromised() => {
                warn!(%aaguid, ?status, "Refusing compromised authenticator");
                Err(WebauthnError::AttestationInvalid(format!(
                    "authenticator {aaguid} is reported as {status:?}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn describe(&self, aaguid: &Uuid) -> Option<AuthenticatorDescription> {
        if aaguid.is_nil() {
            return None;
        }
        lookup_authenticator(aaguid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_authenticator_lookup() {
        let aaguid = Uuid::parse_str("2fc0579f-8113-47ea-b116-bb5a8db9202a").unwrap();
        let model = lookup_authenticator(&aaguid).unwrap();
        assert!(model.description.contains("YubiKey"));
        assert_eq!(model.vendor, Some("Yubico".to_string()));
    }

    #[test]
    fn test_unknown_authenticator() {
        let aaguid = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        assert!(lookup_authenticator(&aaguid).is_none());
        assert!(StaticAuthenticatorCatalog::new().describe(&Uuid::nil()).is_none());
    }

    #[test]
    fn test_compromised_status_rejected() {
        let aaguid = Uuid::from_bytes([1; 16]);
        let catalog = StaticAuthenticatorCatalog::new()
            .with_status(aaguid, AuthenticatorStatus::AttestationKeyCompromise);
        assert!(catalog.check(&aaguid).is_err());
        assert!(catalog.check(&Uuid::from_bytes([2; 16])).is_ok());

        let certified = StaticAuthenticatorCatalog::new()
            .with_status(aaguid, AuthenticatorStatus::FidoCertified);
        assert!(certified.check(&aaguid).is_ok());
    }
}
