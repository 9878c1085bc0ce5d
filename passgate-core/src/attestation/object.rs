//! Attestation object (WebAuthn §6.5) loading.

use tracing::debug;

use crate::authenticator_data::AuthenticatorData;
use crate::base64url;
use crate::cbor::{CborValue, Decoder};
use crate::error::{Result, WebauthnError};

use super::{AttestationFormatRegistry, AttestationStatement};

const TOP_LEVEL_KEYS: [&str; 3] = ["authData", "fmt", "attStmt"];

/// A decoded `attestationObject`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub raw: Vec<u8>,
    pub statement: AttestationStatement,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn fmt(&self) -> &str {
        &self.statement.fmt
    }
}

/// Decodes attestation objects with a configured CBOR decoder and the
/// formats the relying party accepts.
#[derive(Debug, Clone, Default)]
pub struct AttestationObjectLoader {
    decoder: Decoder,
    registry: AttestationFormatRegistry,
}

impl AttestationObjectLoader {
    pub fn new(decoder: Decoder, registry: AttestationFormatRegistry) -> Self {
        Self { decoder, registry }
    }

    pub fn registry(&self) -> &AttestationFormatRegistry {
        &self.registry
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn load(&self, encoded: &str) -> Result<AttestationObject> {
        self.load_bytes(&base64url::decode(encoded)?)
    }

    pub fn load_bytes(&self, raw: &[u8]) -> Result<AttestationObject> {
        let value = self.decoder.decode_all(raw)?;
        let map = value
            .as_map()
            .ok_or_else(|| WebauthnError::syntax("attestation object must be a map"))?;
        if map.len() != TOP_LEVEL_KEYS.len()
            || !TOP_LEVEL_KEYS.iter().all(|key| value.get(key).is_some())
        {
            return Err(WebauthnError::syntax(
                "attestation object must contain exactly authData, fmt and attStmt",
            ));
        }

        let fmt = value
            .get("fmt")
            .and_then(CborValue::as_text)
            .ok_or_else(|| WebauthnError::syntax("\"fmt\" must be a text string"))?;
        let auth_data = value
            .get("authData")
            .and_then(CborValue::as_bytes)
            .ok_or_else(|| WebauthnError::syntax("\"authData\" must be a byte string"))?;
        let att_stmt = value
            .get("attStmt")
            .cloned()
            .ok_or_else(|| WebauthnError::syntax("\"attStmt\" is missing"))?;

        let statement = self.registry.load(fmt, att_stmt)?;
        let auth_data = AuthenticatorData::parse_with(auth_data, &self.decoder)?;
        debug!(
            fmt = %statement.fmt,
            attestation_type = %statement.attestation_type,
            "Loaded attestation object"
        );

        Ok(AttestationObject {
            raw: raw.to_vec(),
            statement,
            auth_data,
        })
    }
}
