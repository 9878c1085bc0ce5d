//! CollectedClientData (WebAuthn §5.8.1).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::base64url;
use crate::error::{Result, WebauthnError};

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingStatus {
    Present,
    Supported,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientDataJson {
    #[serde(rename = "type")]
    ty: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: Option<bool>,
    #[serde(default)]
    token_binding: Option<TokenBinding>,
}

/// Parsed client data plus the exact bytes the browser sent, which are what
/// gets hashed into the signature base.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedClientData {
    raw: Vec<u8>,
    ty: String,
    challenge: Vec<u8>,
    origin: String,
    cross_origin: Option<bool>,
    token_binding: Option<TokenBinding>,
}

impl CollectedClientData {
    /// Parse the base64url `clientDataJSON` field of a response.
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        Self::from_json_bytes(&base64url::decode(encoded)?)
    }

    pub fn from_json_bytes(raw: &[u8]) -> Result<Self> {
        let parsed: ClientDataJson = serde_json::from_slice(raw)
            .map_err(|e| WebauthnError::syntax(format!("invalid client data: {e}")))?;

        if let Some(binding) = &parsed.token_binding {
            if binding.status == TokenBindingStatus::Present && binding.id.is_none() {
                return Err(WebauthnError::syntax(
                    "token binding status is present but no id was given",
                ));
            }
        }

        Ok(Self {
            raw: raw.to_vec(),
            ty: parsed.ty,
            challenge: base64url::decode(&parsed.challenge)?,
            origin: parsed.origin,
            cross_origin: parsed.cross_origin,
            token_binding: parsed.token_binding,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn cross_origin(&self) -> Option<bool> {
        self.cross_origin
    }

    pub fn token_binding(&self) -> Option<&TokenBinding> {
        self.token_binding.as_ref()
    }

    /// SHA-256 of the raw JSON bytes.
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(&self.raw).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_hash() {
        let json = br#"{"type":"webauthn.create","challenge":"AQID","origin":"https://example.com","crossOrigin":false}"#;
        let data = CollectedClientData::from_json_bytes(json).unwrap();
        assert_eq!(data.ty(), TYPE_CREATE);
        assert_eq!(data.challenge(), &[1, 2, 3]);
        assert_eq!(data.origin(), "https://example.com");
        assert_eq!(data.cross_origin(), Some(false));
        assert_eq!(data.raw(), json);
        assert_eq!(data.hash().to_vec(), Sha256::digest(json).to_vec());
    }

    #[test]
    fn test_token_binding_present_requires_id() {
        let json = br#"{"type":"webauthn.get","challenge":"AQID","origin":"https://example.com","tokenBinding":{"status":"present"}}"#;
        assert!(matches!(
            CollectedClientData::from_json_bytes(json),
            Err(WebauthnError::Syntax(_))
        ));

        let json = br#"{"type":"webauthn.get","challenge":"AQID","origin":"https://example.com","tokenBinding":{"status":"not-supported"}}"#;
        let data = CollectedClientData::from_json_bytes(json).unwrap();
        assert_eq!(
            data.token_binding().map(|t| t.status),
            Some(TokenBindingStatus::NotSupported)
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(CollectedClientData::from_json_bytes(br#"{"type":"webauthn.get"}"#).is_err());
        assert!(CollectedClientData::from_json_bytes(b"not json").is_err());
    }
}
