//! Loading of the `PublicKeyCredential` JSON the browser posts back.

use serde_json::{Map, Value};
use tracing::debug;

use crate::attestation::{AttestationObject, AttestationObjectLoader};
use crate::authenticator_data::AuthenticatorData;
use crate::base64url;
use crate::client_data::CollectedClientData;
use crate::error::{Result, WebauthnError};
use crate::options::CREDENTIAL_TYPE_PUBLIC_KEY;

/// The two response shapes a credential can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticatorResponse {
    Attestation {
        client_data: CollectedClientData,
        attestation_object: AttestationObject,
        transports: Vec<String>,
    },
    Assertion {
        client_data: CollectedClientData,
        auth_data: AuthenticatorData,
        signature: Vec<u8>,
        user_handle: Option<Vec<u8>>,
    },
}

impl AuthenticatorResponse {
    pub fn client_data(&self) -> &CollectedClientData {
        match self {
            AuthenticatorResponse::Attestation { client_data, .. }
            | AuthenticatorResponse::Assertion { client_data, .. } => client_data,
        }
    }

    pub fn is_attestation(&self) -> bool {
        matches!(self, AuthenticatorResponse::Attestation { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeyCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub ty: String,
    pub response: AuthenticatorResponse,
    pub client_extension_results: Map<String, Value>,
}

/// Turns the browser's JSON envelope into a typed [`PublicKeyCredential`].
#[derive(Debug, Clone, Default)]
pub struct PublicKeyCredentialLoader {
    attestation_objects: AttestationObjectLoader,
}

impl PublicKeyCredentialLoader {
    pub fn new(attestation_objects: AttestationObjectLoader) -> Self {
        Self {
            attestation_objects,
        }
    }

    pub fn attestation_object_loader(&self) -> &AttestationObjectLoader {
        &self.attestation_objects
    }

    pub fn load(&self, json: &str) -> Result<PublicKeyCredential> {
        let value: Value = serde_json::from_str(json)?;
        self.load_value(&value)
    }

    pub fn load_value(&self, value: &Value) -> Result<PublicKeyCredential> {
        let envelope = value
            .as_object()
            .ok_or_else(|| WebauthnError::syntax("credential must be a JSON object"))?;

        let id = required_str(envelope, "id")?;
        let raw_id = base64url::decode(required_str(envelope, "rawId")?)?;
        if id != base64url::encode(&raw_id) {
            return Err(WebauthnError::syntax("\"id\" and \"rawId\" differ"));
        }

        let ty = required_str(envelope, "type")?;
        if ty != CREDENTIAL_TYPE_PUBLIC_KEY {
            return Err(WebauthnError::syntax(format!(
                "unsupported credential type \"{ty}\""
            )));
        }

        let response = envelope
            .get("response")
            .and_then(Value::as_object)
            .ok_or_else(|| WebauthnError::syntax("\"response\" must be an object"))?;
        let response = self.load_response(response)?;

        let client_extension_results = match envelope.get("clientExtensionResults") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(results)) => results.clone(),
            Some(_) => {
                return Err(WebauthnError::syntax(
                    "\"clientExtensionResults\" must be an object",
                ))
            }
        };

        debug!(
            credential_id = %id,
            attestation = response.is_attestation(),
            "Loaded public key credential"
        );

        Ok(PublicKeyCredential {
            id: id.to_string(),
            raw_id,
            ty: ty.to_string(),
            response,
            client_extension_results,
        })
    }

    fn load_response(&self, response: &Map<String, Value>) -> Result<AuthenticatorResponse> {
        let client_data = CollectedClientData::from_base64url(required_str(response, "clientDataJSON")?)?;

        if let Some(attestation_object) = response.get("attestationObject") {
            let encoded = attestation_object
                .as_str()
                .ok_or_else(|| WebauthnError::syntax("\"attestationObject\" must be a string"))?;
            let transports = match response.get("transports") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|t| {
                        t.as_str().map(str::to_string).ok_or_else(|| {
                            WebauthnError::syntax("\"transports\" must contain strings")
                        })
                    })
                    .collect::<Result<_>>()?,
                Some(_) => return Err(WebauthnError::syntax("\"transports\" must be an array")),
            };
            return Ok(AuthenticatorResponse::Attestation {
                client_data,
                attestation_object: self.attestation_objects.load(encoded)?,
                transports,
            });
        }

        if response.contains_key("authenticatorData") && response.contains_key("signature") {
            let auth_data = base64url::decode(required_str(response, "authenticatorData")?)?;
            let auth_data =
                AuthenticatorData::parse_with(&auth_data, self.attestation_objects.decoder())?;
            let signature = base64url::decode(required_str(response, "signature")?)?;
            let user_handle = match response.get("userHandle") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(Value::String(s)) => Some(base64url::decode(s)?),
                Some(_) => return Err(WebauthnError::syntax("\"userHandle\" must be a string")),
            };
            return Ok(AuthenticatorResponse::Assertion {
                client_data,
                auth_data,
                signature,
                user_handle,
            });
        }

        Err(WebauthnError::syntax("unrecognized response"))
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| WebauthnError::syntax(format!("\"{key}\" must be a string")))
}
