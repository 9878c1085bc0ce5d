//! Attestation statement formats (WebAuthn §8).
//!
//! The set of formats is closed: [`AttestationFormat`] names every format
//! this crate understands, and an [`AttestationFormatRegistry`] decides which
//! of them a relying party accepts. Each format knows how to `load` its
//! `attStmt` map into an [`AttestationStatement`] and how to check that
//! statement against the authenticator data and client data hash.

mod android_key;
mod android_safetynet;
mod apple;
pub mod certificate;
mod fido_u2f;
mod none;
pub mod object;
mod packed;
mod tpm;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::authenticator_data::AuthenticatorData;
use crate::base64url;
use crate::cbor::CborValue;
use crate::cose::AlgorithmManager;
use crate::error::{Result, WebauthnError};

pub use android_safetynet::{SafetyNetAttestation, SafetyNetVerdict, SafetyNetVerdictSource};
pub use object::{AttestationObject, AttestationObjectLoader};
pub use tpm::{CertInfo, PubArea, TpmParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationType {
    None,
    Basic,
    #[serde(rename = "self")]
    SelfAttestation,
    AttCa,
    Ecdaa,
    AnonCa,
}

impl AttestationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationType::None => "none",
            AttestationType::Basic => "basic",
            AttestationType::SelfAttestation => "self",
            AttestationType::AttCa => "attca",
            AttestationType::Ecdaa => "ecdaa",
            AttestationType::AnonCa => "anonca",
        }
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the attestation can be traced back to a trust anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustPath {
    Empty,
    /// DER certificates, leaf first.
    CertificateChain {
        #[serde(with = "der_list")]
        certificates: Vec<Vec<u8>>,
    },
    EcdaaKeyId {
        #[serde(with = "base64url::bytes")]
        key_id: Vec<u8>,
    },
}

impl TrustPath {
    pub fn certificates(&self) -> &[Vec<u8>] {
        match self {
            TrustPath::CertificateChain { certificates } => certificates,
            _ => &[],
        }
    }
}

mod der_list {
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        value
            .iter()
            .map(crate::base64url::encode)
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| crate::base64url::decode(s).map_err(D::Error::custom))
            .collect()
    }
}

/// A loaded `attStmt` together with what its format concluded about it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationStatement {
    pub fmt: String,
    pub att_stmt: CborValue,
    pub attestation_type: AttestationType,
    pub trust_path: TrustPath,
}

impl AttestationStatement {
    pub fn none() -> Self {
        Self {
            fmt: "none".to_string(),
            att_stmt: CborValue::Map(Vec::new()),
            attestation_type: AttestationType::None,
            trust_path: TrustPath::Empty,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CborValue> {
        self.att_stmt.get(key)
    }

    pub(crate) fn require(&self, key: &str) -> Result<&CborValue> {
        self.get(key).ok_or_else(|| {
            WebauthnError::attestation(format!("{} statement is missing \"{key}\"", self.fmt))
        })
    }

    pub(crate) fn require_bytes(&self, key: &str) -> Result<&[u8]> {
        self.require(key)?.as_bytes().ok_or_else(|| {
            WebauthnError::attestation(format!("{} \"{key}\" must be a byte string", self.fmt))
        })
    }

    pub(crate) fn require_int(&self, key: &str) -> Result<i64> {
        self.require(key)?.as_i64().ok_or_else(|| {
            WebauthnError::attestation(format!("{} \"{key}\" must be an integer", self.fmt))
        })
    }

    pub(crate) fn require_text(&self, key: &str) -> Result<&str> {
        self.require(key)?.as_text().ok_or_else(|| {
            WebauthnError::attestation(format!("{} \"{key}\" must be a text string", self.fmt))
        })
    }
}

/// Every attestation statement format understood by the verifier.
#[derive(Debug, Clone)]
pub enum AttestationFormat {
    None,
    FidoU2f,
    Packed,
    Tpm,
    AndroidKey,
    AndroidSafetyNet(SafetyNetAttestation),
    Apple,
}

impl AttestationFormat {
    pub fn name(&self) -> &'static str {
        match self {
            AttestationFormat::None => "none",
            AttestationFormat::FidoU2f => "fido-u2f",
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet(_) => "android-safetynet",
            AttestationFormat::Apple => "apple",
        }
    }

    pub fn all() -> Vec<AttestationFormat> {
        vec![
            AttestationFormat::None,
            AttestationFormat::FidoU2f,
            AttestationFormat::Packed,
            AttestationFormat::Tpm,
            AttestationFormat::AndroidKey,
            AttestationFormat::AndroidSafetyNet(SafetyNetAttestation::default()),
            AttestationFormat::Apple,
        ]
    }

    /// Check the shape of `attStmt` and decide the attestation type and
    /// trust path.
    pub fn load(&self, att_stmt: CborValue) -> Result<AttestationStatement> {
        if !att_stmt.is_map() {
            return Err(WebauthnError::syntax("attStmt must be a map"));
        }
        match self {
            AttestationFormat::None => none::load(att_stmt),
            AttestationFormat::FidoU2f => fido_u2f::load(att_stmt),
            AttestationFormat::Packed => packed::load(att_stmt),
            AttestationFormat::Tpm => tpm::load(att_stmt),
            AttestationFormat::AndroidKey => android_key::load(att_stmt),
            AttestationFormat::AndroidSafetyNet(_) => android_safetynet::load(att_stmt),
            AttestationFormat::Apple => apple::load(att_stmt),
        }
    }

    /// `Ok(false)` means a signature did not verify; requirement violations
    /// are reported as errors.
    pub fn is_valid(
        &self,
        client_data_hash: &[u8; 32],
        statement: &AttestationStatement,
        auth_data: &AuthenticatorData,
        algorithms: &AlgorithmManager,
    ) -> Result<bool> {
        match self {
            AttestationFormat::None => Ok(none::is_valid(statement)),
            AttestationFormat::FidoU2f => fido_u2f::is_valid(client_data_hash, statement, auth_data),
            AttestationFormat::Packed => {
                packed::is_valid(client_data_hash, statement, auth_data, algorithms)
            }
            AttestationFormat::Tpm => tpm::is_valid(client_data_hash, statement, auth_data, algorithms),
            AttestationFormat::AndroidKey => {
                android_key::is_valid(client_data_hash, statement, auth_data, algorithms)
            }
            AttestationFormat::AndroidSafetyNet(safetynet) => {
                safetynet.is_valid(client_data_hash, statement, auth_data)
            }
            AttestationFormat::Apple => apple::is_valid(client_data_hash, statement, auth_data),
        }
    }
}

impl TryFrom<&str> for AttestationFormat {
    type Error = WebauthnError;

    fn try_from(name: &str) -> Result<Self> {
        AttestationFormat::all()
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| WebauthnError::UnsupportedFormat(format!("attestation format \"{name}\"")))
    }
}

/// The formats a relying party accepts, plus the algorithms their
/// signatures may use.
#[derive(Debug, Clone)]
pub struct AttestationFormatRegistry {
    formats: Vec<AttestationFormat>,
    algorithms: AlgorithmManager,
}

impl Default for AttestationFormatRegistry {
    fn default() -> Self {
        Self {
            formats: AttestationFormat::all(),
            algorithms: AlgorithmManager::default(),
        }
    }
}

impl AttestationFormatRegistry {
    /// A registry that only accepts the `none` format.
    pub fn none_only(algorithms: AlgorithmManager) -> Self {
        Self {
            formats: vec![AttestationFormat::None],
            algorithms,
        }
    }

    pub fn with_algorithms(mut self, algorithms: AlgorithmManager) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Add a format, replacing any registered format with the same name.
    pub fn with_format(mut self, format: AttestationFormat) -> Self {
        self.formats.retain(|f| f.name() != format.name());
        self.formats.push(format);
        self
    }

    pub fn without_format(mut self, name: &str) -> Self {
        self.formats.retain(|f| f.name() != name);
        self
    }

    pub fn algorithms(&self) -> &AlgorithmManager {
        &self.algorithms
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formats.iter().map(AttestationFormat::name).collect()
    }

    pub fn get(&self, name: &str) -> Result<&AttestationFormat> {
        self.formats
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| WebauthnError::UnsupportedFormat(format!("attestation format \"{name}\"")))
    }

    pub fn load(&self, fmt: &str, att_stmt: CborValue) -> Result<AttestationStatement> {
        self.get(fmt)?.load(att_stmt)
    }

    pub fn is_valid(
        &self,
        client_data_hash: &[u8; 32],
        statement: &AttestationStatement,
        auth_data: &AuthenticatorData,
    ) -> Result<bool> {
        self.get(&statement.fmt)?
            .is_valid(client_data_hash, statement, auth_data, &self.algorithms)
    }
}
