//! Registration and authentication ceremony validators (WebAuthn §7).
//!
//! Both validators run their steps in a fixed order and stop at the first
//! failure. The checks they share (client data type, challenge, origin and
//! RP ID, token binding, user presence) live here.

mod authentication;
mod extensions;
mod registration;

use openssl::memcmp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::authenticator_data::AuthenticatorData;
use crate::client_data::{CollectedClientData, TokenBinding, TokenBindingStatus};
use crate::error::{Result, WebauthnError};
use crate::options::{AuthenticationExtensions, UserVerificationRequirement};
use crate::request::ServerRequest;

pub use authentication::AuthenticationValidator;
pub use extensions::{AppIdExtensionChecker, ExtensionOutputChecker, ExtensionOutputCheckers};
pub use registration::RegistrationValidator;

/// Header carrying the token binding message on bound connections.
pub const SEC_TOKEN_BINDING_HEADER: &str = "Sec-Token-Binding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingPolicy {
    /// Accept any token binding report.
    Ignore,
    /// Reject a client that claims the connection is bound.
    #[default]
    NotSupported,
    /// A bound connection must present the same id in the request header.
    Verify,
}

impl TokenBindingPolicy {
    pub fn check(self, binding: Option<&TokenBinding>, request: &dyn ServerRequest) -> Result<()> {
        let Some(binding) = binding else {
            return Ok(());
        };
        if binding.status != TokenBindingStatus::Present {
            return Ok(());
        }
        match self {
            TokenBindingPolicy::Ignore => Ok(()),
            TokenBindingPolicy::NotSupported => Err(WebauthnError::TokenBinding(
                "token binding is not supported by this relying party".into(),
            )),
            TokenBindingPolicy::Verify => {
                let header = request.header(SEC_TOKEN_BINDING_HEADER).ok_or_else(|| {
                    WebauthnError::TokenBinding(format!("missing {SEC_TOKEN_BINDING_HEADER} header"))
                })?;
                if binding.id.as_deref() != Some(header) {
                    return Err(WebauthnError::TokenBinding("token binding id mismatch".into()));
                }
                Ok(())
            }
        }
    }
}

/// Relying-party settings shared by both ceremonies.
#[derive(Debug, Clone)]
pub struct CeremonyPolicy {
    /// RP IDs that may be served over plain http (development hosts).
    pub secured_rp_ids: Vec<String>,
    pub token_binding: TokenBindingPolicy,
    pub extension_checkers: ExtensionOutputCheckers,
}

impl Default for CeremonyPolicy {
    fn default() -> Self {
        Self {
            secured_rp_ids: vec!["localhost".to_string()],
            token_binding: TokenBindingPolicy::default(),
            extension_checkers: ExtensionOutputCheckers::default(),
        }
    }
}

impl CeremonyPolicy {
    pub fn with_secured_rp_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.secured_rp_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_token_binding(mut self, policy: TokenBindingPolicy) -> Self {
        self.token_binding = policy;
        self
    }

    pub fn with_extension_checkers(mut self, checkers: ExtensionOutputCheckers) -> Self {
        self.extension_checkers = checkers;
        self
    }

    pub(crate) fn is_secured(&self, facet_id: &str) -> bool {
        self.secured_rp_ids.iter().any(|id| id == facet_id)
    }
}

/// The identity the authenticator scoped the credential to: the RP ID, or
/// the FIDO AppID when the client reports having used the `appid` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Facet {
    /// What the authenticator hashed into `rpIdHash`.
    pub id: String,
    /// Host name origins are matched against.
    pub host: String,
}

impl Facet {
    pub(crate) fn resolve(
        rp_id: &str,
        extensions: &AuthenticationExtensions,
        client_outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let app_id = extensions.get("appid").and_then(|v| v.as_str());
        let used = client_outputs.get("appid").and_then(|v| v.as_bool()) == Some(true);
        match app_id {
            Some(app_id) if used => {
                let host = Url::parse(app_id)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| app_id.to_string());
                Facet {
                    id: app_id.to_string(),
                    host,
                }
            }
            _ => Facet {
                id: rp_id.to_string(),
                host: rp_id.to_string(),
            },
        }
    }
}

pub(crate) fn resolve_rp_id(configured: Option<&str>, request: &dyn ServerRequest) -> Result<String> {
    configured
        .or_else(|| request.host())
        .map(str::to_string)
        .ok_or_else(|| WebauthnError::InvalidOptions("no RP ID and no request host".into()))
}

pub(crate) fn check_client_data_type(client_data: &CollectedClientData, expected: &str) -> Result<()> {
    if client_data.ty() != expected {
        return Err(WebauthnError::ClientDataTypeMismatch {
            expected: expected.to_string(),
            actual: client_data.ty().to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_challenge(client_data: &CollectedClientData, expected: &[u8]) -> Result<()> {
    let presented = client_data.challenge();
    // memcmp::eq panics on unequal lengths
    if presented.len() != expected.len() || !memcmp::eq(presented, expected) {
        return Err(WebauthnError::ChallengeMismatch);
    }
    Ok(())
}

/// The origin's host must be the facet host or a subdomain of it, and the
/// origin must be https. Allow-listed facets may also use plain http.
pub(crate) fn check_origin(origin: &str, facet: &Facet, policy: &CeremonyPolicy) -> Result<()> {
    let parsed = Url::parse(origin)
        .map_err(|e| WebauthnError::OriginMismatch(format!("invalid origin \"{origin}\": {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| WebauthnError::OriginMismatch(format!("origin \"{origin}\" has no host")))?;

    let on_label_boundary = host == facet.host
        || host
            .strip_suffix(facet.host.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'));
    if !on_label_boundary {
        return Err(WebauthnError::OriginMismatch(format!(
            "origin host \"{host}\" is not within \"{}\"",
            facet.host
        )));
    }

    let scheme_allowed = match parsed.scheme() {
        "https" => true,
        "http" => policy.is_secured(&facet.id),
        _ => false,
    };
    if !scheme_allowed {
        return Err(WebauthnError::OriginMismatch(format!(
            "origin \"{origin}\" must use https"
        )));
    }
    Ok(())
}

pub(crate) fn check_rp_id_hash(auth_data: &AuthenticatorData, hashed: &str) -> Result<()> {
    let expected: [u8; 32] = Sha256::digest(hashed.as_bytes()).into();
    if auth_data.rp_id_hash() != &expected {
        return Err(WebauthnError::RpIdMismatch(format!(
            "authenticator data is not scoped to \"{hashed}\""
        )));
    }
    Ok(())
}

pub(crate) fn check_user_flags(
    auth_data: &AuthenticatorData,
    requirement: UserVerificationRequirement,
) -> Result<()> {
    if !auth_data.is_user_present() {
        return Err(WebauthnError::PresenceOrVerification(
            "user presence flag is not set".into(),
        ));
    }
    if requirement == UserVerificationRequirement::Required && !auth_data.is_user_verified() {
        return Err(WebauthnError::PresenceOrVerification(
            "user verification is required".into(),
        ));
    }
    Ok(())
}

pub(crate) fn passed(ceremony: &'static str, step: &'static str) {
    debug!(ceremony, step, "Check passed");
}
