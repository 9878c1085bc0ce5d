//! Creation and request options sent to the browser and kept server-side
//! between the two round trips of a ceremony.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::base64url;
use crate::cose::CoseAlgorithm;
use crate::error::{Result, WebauthnError};

pub const CREDENTIAL_TYPE_PUBLIC_KEY: &str = "public-key";
pub const MIN_CHALLENGE_LENGTH: usize = 16;
pub const DEFAULT_CHALLENGE_LENGTH: usize = 32;

/// Fresh random challenge of `length` bytes.
pub fn generate_challenge(length: usize) -> Result<Vec<u8>> {
    if length < MIN_CHALLENGE_LENGTH {
        return Err(WebauthnError::InvalidOptions(format!(
            "challenge must be at least {MIN_CHALLENGE_LENGTH} bytes"
        )));
    }
    let mut challenge = vec![0u8; length];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    Ok(challenge)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRpEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    #[serde(with = "base64url::bytes")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub ty: String,
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    pub fn public_key(alg: CoseAlgorithm) -> Self {
        Self {
            ty: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
            alg: alg.id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(with = "base64url::bytes")]
    pub id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(id: Vec<u8>, transports: Vec<String>) -> Self {
        Self {
            ty: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
            id,
            transports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(default)]
    pub require_resident_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<ResidentKeyRequirement>,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
}

/// Extension inputs or client outputs: a JSON object keyed by extension id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticationExtensions(pub Map<String, Value>);

impl AuthenticationExtensions {
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.0.insert(id.into(), value);
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: PublicKeyCredentialRpEntity,
    pub user: PublicKeyCredentialUserEntity,
    #[serde(with = "base64url::bytes")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    #[serde(default)]
    pub attestation: AttestationConveyance,
    #[serde(default, skip_serializing_if = "AuthenticationExtensions::is_empty")]
    pub extensions: AuthenticationExtensions,
}

impl PublicKeyCredentialCreationOptions {
    pub fn new(
        rp: PublicKeyCredentialRpEntity,
        user: PublicKeyCredentialUserEntity,
        challenge: Vec<u8>,
        pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    ) -> Self {
        Self {
            rp,
            user,
            challenge,
            pub_key_cred_params,
            timeout: None,
            exclude_credentials: Vec::new(),
            authenticator_selection: None,
            attestation: AttestationConveyance::None,
            extensions: AuthenticationExtensions::default(),
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_exclude_credentials(mut self, credentials: Vec<PublicKeyCredentialDescriptor>) -> Self {
        self.exclude_credentials = credentials;
        self
    }

    pub fn with_authenticator_selection(mut self, selection: AuthenticatorSelectionCriteria) -> Self {
        self.authenticator_selection = Some(selection);
        self
    }

    pub fn with_attestation(mut self, attestation: AttestationConveyance) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn with_extensions(mut self, extensions: AuthenticationExtensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.authenticator_selection
            .as_ref()
            .map(|s| s.user_verification)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    #[serde(with = "base64url::bytes")]
    pub challenge: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
    #[serde(default, skip_serializing_if = "AuthenticationExtensions::is_empty")]
    pub extensions: AuthenticationExtensions,
}

impl PublicKeyCredentialRequestOptions {
    pub fn new(challenge: Vec<u8>) -> Self {
        Self {
            challenge,
            timeout: None,
            rp_id: None,
            allow_credentials: Vec::new(),
            user_verification: UserVerificationRequirement::Preferred,
            extensions: AuthenticationExtensions::default(),
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = Some(rp_id.into());
        self
    }

    pub fn with_allow_credentials(mut self, credentials: Vec<PublicKeyCredentialDescriptor>) -> Self {
        self.allow_credentials = credentials;
        self
    }

    pub fn with_user_verification(mut self, requirement: UserVerificationRequirement) -> Self {
        self.user_verification = requirement;
        self
    }

    pub fn with_extensions(mut self, extensions: AuthenticationExtensions) -> Self {
        self.extensions = extensions;
        self
    }
}
