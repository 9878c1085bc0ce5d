//! `packed` attestation (WebAuthn §8.2): basic (x5c), self, or ECDAA.

use tracing::debug;

use crate::authenticator_data::AuthenticatorData;
use crate::cbor::CborValue;
use crate::cose::AlgorithmManager;
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, load_x5c, CertificateDetails};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "packed";
const REQUIRED_OU: &str = "Authenticator Attestation";

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt.get("alg").and_then(CborValue::as_i64).is_none() {
        return Err(WebauthnError::attestation("packed statement is missing \"alg\""));
    }
    if att_stmt.get("sig").and_then(CborValue::as_bytes).is_none() {
        return Err(WebauthnError::attestation("packed statement is missing \"sig\""));
    }

    let (attestation_type, trust_path) = if att_stmt.get("x5c").is_some() {
        let certificates = load_x5c(&att_stmt, FMT)?;
        (
            AttestationType::Basic,
            TrustPath::CertificateChain { certificates },
        )
    } else if let Some(key_id) = att_stmt.get("ecdaaKeyId") {
        let key_id = key_id
            .as_bytes()
            .ok_or_else(|| WebauthnError::attestation("packed \"ecdaaKeyId\" must be bytes"))?;
        (
            AttestationType::Ecdaa,
            TrustPath::EcdaaKeyId {
                key_id: key_id.to_vec(),
            },
        )
    } else {
        (AttestationType::SelfAttestation, TrustPath::Empty)
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
    let alg = statement.require_int("alg")?;
    let signature = statement.require_bytes("sig")?;
    let mut signed = auth_data.raw().to_vec();
    signed.extend_from_slice(client_data_hash);

    match &statement.trust_path {
        TrustPath::CertificateChain { certificates } => {
            let chain = check_chain(certificates)?;
            let details = CertificateDetails::from_der(&certificates[0])?;
            check_certificate_requirements(&details, auth_data)?;
            algorithms.verify(alg, &signed, &*chain[0].public_key()?, signature)
        }
        TrustPath::EcdaaKeyId { .. } => Err(WebauthnError::UnsupportedFormat(
            "ECDAA attestation is not supported".into(),
        )),
        TrustPath::Empty => {
            let attested = auth_data
                .attested_credential_data()
                .ok_or_else(|| WebauthnError::attestation("no attested credential data"))?;
            let key = attested.public_key()?;
            if key.algorithm != alg {
                return Err(WebauthnError::attestation(format!(
                    "self attestation alg {alg} does not match credential key alg {}",
                    key.algorithm
                )));
            }
            debug!(alg, "Verifying packed self attestation");
            algorithms.verify_with_key(&key, &signed, signature)
        }
    }
}

fn check_certificate_requirements(
    details: &CertificateDetails,
    auth_data: &AuthenticatorData,
) -> Result<()> {
    if details.version != 3 {
        return Err(WebauthnError::attestation(
            "packed attestation certificate must be X.509 v3",
        ));
    }
    match details.country.as_deref() {
        Some(c) if c.len() == 2 => {}
        _ => {
            return Err(WebauthnError::attestation(
                "packed attestation certificate subject needs a country code",
            ))
        }
    }
    if details.organization.as_deref().map_or(true, str::is_empty) {
        return Err(WebauthnError::attestation(
            "packed attestation certificate subject needs an organization",
        ));
    }
    if details.organizational_unit.as_deref() != Some(REQUIRED_OU) {
        return Err(WebauthnError::attestation(format!(
            "packed attestation certificate OU must be \"{REQUIRED_OU}\""
        )));
    }
    if details.common_name.as_deref().map_or(true, str::is_empty) {
        return Err(WebauthnError::attestation(
            "packed attestation certificate subject needs a common name",
        ));
    }
    if details.is_ca {
        return Err(WebauthnError::attestation(
            "packed attestation certificate must not be a CA",
        ));
    }
    if let Some(attested) = auth_data.attested_credential_data() {
        details.check_aaguid(&attested.aaguid)?;
    }
    Ok(())
}
