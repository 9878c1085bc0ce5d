//! `tpm` attestation (WebAuthn §8.3).
//!
//! The statement carries two TPM 2.0 structures: `pubArea` (TPMT_PUBLIC, the
//! credential key as the TPM sees it) and `certInfo` (TPMS_ATTEST, signed by
//! the attestation identity key). Both are big-endian with u16-length
//! prefixed buffers, so they are read with the same [`ByteStream`] the CBOR
//! decoder uses.

use openssl::hash::{hash, MessageDigest};
use tracing::debug;

use crate::authenticator_data::AuthenticatorData;
use crate::cbor::{ByteStream, CborError, CborValue};
use crate::cose::{AlgorithmManager, CoseKey, Curve, KeyMaterial};
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, load_x5c, CertificateDetails, OID_TCG_KP_AIK_CERTIFICATE};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "tpm";

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_ECC: u16 = 0x0023;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000b;
pub const TPM_ALG_SHA384: u16 = 0x000c;
pub const TPM_ALG_SHA512: u16 = 0x000d;

const CLOCK_INFO_LEN: usize = 17;
const DEFAULT_RSA_EXPONENT: u32 = 65_537;

/// Algorithm-specific half of a TPMT_PUBLIC, with its `unique` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmParameters {
    Rsa {
        symmetric: u16,
        scheme: u16,
        key_bits: u16,
        /// Zero on the wire means the default exponent 65537.
        exponent: u32,
        modulus: Vec<u8>,
    },
    Ecc {
        symmetric: u16,
        scheme: u16,
        curve_id: u16,
        kdf: u16,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

/// TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubArea {
    pub key_type: u16,
    pub name_alg: u16,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmParameters,
}

impl PubArea {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read(bytes)
            .map_err(|e| WebauthnError::attestation(format!("invalid pubArea: {e}")))?
            .ok_or_else(|| WebauthnError::UnsupportedFormat("TPM key type".into()))
    }

    fn read(bytes: &[u8]) -> std::result::Result<Option<Self>, CborError> {
        let mut stream = ByteStream::new(bytes);
        let key_type = stream.read_u16()?;
        let name_alg = stream.read_u16()?;
        let object_attributes = stream.read_u32()?;
        let auth_policy = stream.read_sized()?.to_vec();

        let parameters = match key_type {
            TPM_ALG_RSA => {
                let symmetric = stream.read_u16()?;
                let scheme = stream.read_u16()?;
                let key_bits = stream.read_u16()?;
                let exponent = match stream.read_u32()? {
                    0 => DEFAULT_RSA_EXPONENT,
                    e => e,
                };
                let modulus = stream.read_sized()?.to_vec();
                TpmParameters::Rsa {
                    symmetric,
                    scheme,
                    key_bits,
                    exponent,
                    modulus,
                }
            }
            TPM_ALG_ECC => {
                let symmetric = stream.read_u16()?;
                let scheme = stream.read_u16()?;
                let curve_id = stream.read_u16()?;
                let kdf = stream.read_u16()?;
                let x = stream.read_sized()?.to_vec();
                let y = stream.read_sized()?.to_vec();
                TpmParameters::Ecc {
                    symmetric,
                    scheme,
                    curve_id,
                    kdf,
                    x,
                    y,
                }
            }
            _ => return Ok(None),
        };
        stream.expect_eof()?;

        Ok(Some(Self {
            key_type,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
        }))
    }

    /// Whether the TPM key is the credential public key.
    pub fn matches(&self, key: &CoseKey) -> bool {
        match (&self.parameters, &key.material) {
            (
                TpmParameters::Rsa {
                    exponent, modulus, ..
                },
                KeyMaterial::Rsa { n, e },
            ) => {
                strip_zeros(modulus) == strip_zeros(n)
                    && be_to_u64(e).is_some_and(|e| e == u64::from(*exponent))
            }
            (
                TpmParameters::Ecc { curve_id, x, y, .. },
                KeyMaterial::Ec2 {
                    curve,
                    x: key_x,
                    y: key_y,
                },
            ) => Curve::from_tpm_id(*curve_id) == Some(*curve) && x == key_x && y == key_y,
            _ => false,
        }
    }
}

/// TPMS_ATTEST for a TPM2_Certify result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub magic: u32,
    pub attest_type: u16,
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock_info: [u8; CLOCK_INFO_LEN],
    pub firmware_version: u64,
    pub attested_name: Vec<u8>,
    pub attested_qualified_name: Vec<u8>,
}

impl CertInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let info = Self::read(bytes)
            .map_err(|e| WebauthnError::attestation(format!("invalid certInfo: {e}")))?;
        if info.magic != TPM_GENERATED_VALUE {
            return Err(WebauthnError::attestation(format!(
                "certInfo magic is {:#010x}, expected TPM_GENERATED_VALUE",
                info.magic
            )));
        }
        if info.attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(WebauthnError::attestation(format!(
                "certInfo type is {:#06x}, expected TPM_ST_ATTEST_CERTIFY",
                info.attest_type
            )));
        }
        Ok(info)
    }

    fn read(bytes: &[u8]) -> std::result::Result<Self, CborError> {
        let mut stream = ByteStream::new(bytes);
        let info = Self {
            magic: stream.read_u32()?,
            attest_type: stream.read_u16()?,
            qualified_signer: stream.read_sized()?.to_vec(),
            extra_data: stream.read_sized()?.to_vec(),
            clock_info: stream.read_array::<CLOCK_INFO_LEN>()?,
            firmware_version: stream.read_u64()?,
            attested_name: stream.read_sized()?.to_vec(),
            attested_qualified_name: stream.read_sized()?.to_vec(),
        };
        stream.expect_eof()?;
        Ok(info)
    }
}

/// Hash for a TPM_ALG_ID name algorithm.
pub fn name_digest(name_alg: u16) -> Option<MessageDigest> {
    match name_alg {
        TPM_ALG_SHA1 => Some(MessageDigest::sha1()),
        TPM_ALG_SHA256 => Some(MessageDigest::sha256()),
        TPM_ALG_SHA384 => Some(MessageDigest::sha384()),
        TPM_ALG_SHA512 => Some(MessageDigest::sha512()),
        _ => None,
    }
}

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt.get("ver").and_then(CborValue::as_text) != Some("2.0") {
        return Err(WebauthnError::attestation("tpm \"ver\" must be \"2.0\""));
    }
    if att_stmt.get("alg").and_then(CborValue::as_i64).is_none() {
        return Err(WebauthnError::attestation("tpm statement is missing \"alg\""));
    }
    for key in ["sig", "certInfo", "pubArea"] {
        if att_stmt.get(key).and_then(CborValue::as_bytes).is_none() {
            return Err(WebauthnError::attestation(format!(
                "tpm statement is missing \"{key}\""
            )));
        }
    }

    let (attestation_type, trust_path) = if att_stmt.get("x5c").is_some() {
        let certificates = load_x5c(&att_stmt, FMT)?;
        (
            AttestationType::AttCa,
            TrustPath::CertificateChain { certificates },
        )
    } else if let Some(key_id) = att_stmt.get("ecdaaKeyId").and_then(CborValue::as_bytes) {
        (
            AttestationType::Ecdaa,
            TrustPath::EcdaaKeyId {
                key_id: key_id.to_vec(),
            },
        )
    } else {
        return Err(WebauthnError::attestation(
            "tpm statement needs either \"x5c\" or \"ecdaaKeyId\"",
        ));
    };

    Ok(AttestationStatement {
        fmt: FMT.to_string(),
        att_stmt,
        attestation_type,
        trust_path,
    })
}

pub(super) fn is_valid(
    client_data_hash: &[u8; 32],
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    algorithms: &AlgorithmManager,
) -> Result<bool> {
    let alg = algorithms.get(statement.require_int("alg")?)?;
    let signature = statement.require_bytes("sig")?;
    let raw_pub_area = statement.require_bytes("pubArea")?;
    let raw_cert_info = statement.require_bytes("certInfo")?;

    let attested = auth_data
        .attested_credential_data()
        .ok_or_else(|| WebauthnError::attestation("no attested credential data"))?;
    let pub_area = PubArea::parse(raw_pub_area)?;
    if !pub_area.matches(&attested.public_key()?) {
        return Err(WebauthnError::attestation(
            "pubArea key does not match the credential public key",
        ));
    }

    let cert_info = CertInfo::parse(raw_cert_info)?;
    let mut att_to_be_signed = auth_data.raw().to_vec();
    att_to_be_signed.extend_from_slice(client_data_hash);
    if cert_info.extra_data != alg.digest(&att_to_be_signed)? {
        return Err(WebauthnError::attestation(
            "certInfo extraData is not the hash of authData and clientDataHash",
        ));
    }
    check_attested_name(&cert_info, &pub_area, raw_pub_area)?;

    match &statement.trust_path {
        TrustPath::CertificateChain { certificates } => {
            let chain = check_chain(certificates)?;
            let details = CertificateDetails::from_der(&certificates[0])?;
            check_aik_requirements(&details)?;
            details.check_aaguid(&attested.aaguid)?;
            debug!(alg = alg.jose_name(), "Verifying certInfo signature");
            alg.verify(raw_cert_info, &*chain[0].public_key()?, signature)
        }
        TrustPath::EcdaaKeyId { .. } => Err(WebauthnError::UnsupportedFormat(
            "ECDAA attestation is not supported".into(),
        )),
        TrustPath::Empty => Err(WebauthnError::attestation("tpm attestation has no trust path")),
    }
}

fn check_attested_name(cert_info: &CertInfo, pub_area: &PubArea, raw_pub_area: &[u8]) -> Result<()> {
    let name = &cert_info.attested_name;
    if name.len() < 2 {
        return Err(WebauthnError::attestation("certInfo attested name is too short"));
    }
    let name_alg = u16::from_be_bytes([name[0], name[1]]);
    if name_alg != pub_area.name_alg {
        return Err(WebauthnError::attestation(
            "attested name algorithm differs from pubArea nameAlg",
        ));
    }
    let md = name_digest(name_alg).ok_or_else(|| {
        WebauthnError::UnsupportedFormat(format!("TPM name algorithm {name_alg:#06x}"))
    })?;
    if *hash(md, raw_pub_area)? != name[2..] {
        return Err(WebauthnError::attestation(
            "certInfo attested name is not the hash of pubArea",
        ));
    }
    Ok(())
}

fn check_aik_requirements(details: &CertificateDetails) -> Result<()> {
    if details.version != 3 {
        return Err(WebauthnError::attestation("AIK certificate must be X.509 v3"));
    }
    if !details.subject_empty {
        return Err(WebauthnError::attestation("AIK certificate subject must be empty"));
    }
    if !details.has_subject_alt_name {
        return Err(WebauthnError::attestation(
            "AIK certificate must carry a subject alternative name",
        ));
    }
    if !details
        .extended_key_usages
        .iter()
        .any(|eku| eku == OID_TCG_KP_AIK_CERTIFICATE)
    {
        return Err(WebauthnError::attestation(
            "AIK certificate lacks the tcg-kp-AIKCertificate key purpose",
        ));
    }
    if details.is_ca {
        return Err(WebauthnError::attestation("AIK certificate must not be a CA"));
    }
    Ok(())
}

fn strip_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn be_to_u64(bytes: &[u8]) -> Option<u64> {
    let bytes = strip_zeros(bytes);
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
