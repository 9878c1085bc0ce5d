//! `fido-u2f` attestation (WebAuthn §8.6).

use openssl::nid::Nid;
use openssl::pkey::Id;

use crate::authenticator_data::AuthenticatorData;
use crate::cbor::CborValue;
use crate::cose::{CoseAlgorithm, Curve, KeyMaterial};
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, load_x5c, parse_certificate};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "fido-u2f";

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt.get("sig").and_then(CborValue::as_bytes).is_none() {
        return Err(WebauthnError::attestation("fido-u2f statement is missing \"sig\""));
    }
    let certificates = load_x5c(&att_stmt, FMT)?;
    if certificates.len() != 1 {
        return Err(WebauthnError::attestation(
            "fido-u2f \"x5c\" must contain exactly one certificate",
        ));
    }

    let key = parse_certificate(&certificates[0])?.public_key()?;
    let on_p256 = key.id() == Id::EC
        && key.ec_key()?.group().curve_name() == Some(Nid::X9_62_PRIME256V1);
    if !on_p256 {
        return Err(WebauthnError::attestation(
            "fido-u2f attestation certificate key must be EC P-256",
        ));
    }

    Ok(AttestationStatement {
        fmt: FMT.to_string(),
        att_stmt,
        attestation_type: AttestationType::Basic,
        trust_path: TrustPath::CertificateChain { certificates },
    })
}

pub(super) fn is_valid(
    client_data_hash: &[u8; 32],
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
) -> Result<bool> {
    let attested = auth_data
        .attested_credential_data()
        .ok_or_else(|| WebauthnError::attestation("no attested credential data"))?;
    if !attested.aaguid.is_nil() {
        return Err(WebauthnError::attestation(
            "fido-u2f authenticators must report an all-zero AAGUID",
        ));
    }

    let credential_key = attested.public_key()?;
    let point = match &credential_key.material {
        KeyMaterial::Ec2 {
            curve: Curve::P256, ..
        } => credential_key.uncompressed_point(),
        _ => None,
    }
    .ok_or_else(|| WebauthnError::attestation("fido-u2f credential key must be EC P-256"))?;

    let certificates = check_chain(statement.trust_path.certificates())?;
    let signature = statement.require_bytes("sig")?;

    let mut signed = Vec::with_capacity(1 + 32 + 32 + attested.credential_id.len() + 65);
    signed.push(0x00);
    signed.extend_from_slice(auth_data.rp_id_hash());
    signed.extend_from_slice(client_data_hash);
    signed.extend_from_slice(&attested.credential_id);
    signed.extend_from_slice(&point);

    CoseAlgorithm::ES256.verify(&signed, &*certificates[0].public_key()?, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator_data::{FLAG_AT, FLAG_UP};
    use crate::fixtures::{self, CertSpec, EcCredential, TestCa};
    use uuid::Uuid;

    struct Case {
        statement: AttestationStatement,
        auth_data: AuthenticatorData,
        cdh: [u8; 32],
    }

    fn build(aaguid: Uuid, tamper: bool) -> Case {
        let credential = EcCredential::generate();
        let ca = TestCa::new();
        let (cert, cert_key) = ca.issue(CertSpec::packed_subject());
        let credential_id = b"u2f-credential".to_vec();
        let raw = fixtures::auth_data(
            "example.com",
            FLAG_UP | FLAG_AT,
            0,
            Some((aaguid, credential_id.as_slice(), credential.cose_bytes.as_slice())),
            None,
        );
        let auth_data = AuthenticatorData::parse(&raw).unwrap();
        let cdh = fixtures::sha256(b"client data");

        let mut signed = vec![0x00];
        signed.extend_from_slice(&fixtures::sha256(b"example.com"));
        signed.extend_from_slice(&cdh);
        signed.extend_from_slice(&credential_id);
        signed.extend(credential.cose_key.uncompressed_point().unwrap());
        if tamper {
            signed.push(0xff);
        }
        let sig = fixtures::sign_sha256(&cert_key, &signed);

        let att_stmt = CborValue::Map(vec![
            (CborValue::text("sig"), CborValue::Bytes(sig)),
            (
                CborValue::text("x5c"),
                CborValue::Array(vec![CborValue::Bytes(cert.to_der().unwrap())]),
            ),
        ]);
        Case {
            statement: load(att_stmt).unwrap(),
            auth_data,
            cdh,
        }
    }

    #[test]
    fn test_valid_u2f_statement() {
        let case = build(Uuid::nil(), false);
        assert_eq!(case.statement.attestation_type, AttestationType::Basic);
        assert!(is_valid(&case.cdh, &case.statement, &case.auth_data).unwrap());
    }

    #[test]
    fn test_bad_signature() {
        let case = build(Uuid::nil(), true);
        assert!(!is_valid(&case.cdh, &case.statement, &case.auth_data).unwrap());
    }

    #[test]
    fn test_non_zero_aaguid_fails_with_valid_signature() {
        let case = build(Uuid::from_bytes([1; 16]), false);
        assert!(matches!(
            is_valid(&case.cdh, &case.statement, &case.auth_data),
            Err(WebauthnError::AttestationInvalid(_))
        ));
    }

    #[test]
    fn test_load_requires_single_p256_certificate() {
        let ca = TestCa::new();
        let (cert, _) = ca.issue(CertSpec::packed_subject());
        let der = CborValue::Bytes(cert.to_der().unwrap());
        let two = CborValue::Map(vec![
            (CborValue::text("sig"), CborValue::Bytes(vec![1])),
            (CborValue::text("x5c"), CborValue::Array(vec![der.clone(), der])),
        ]);
        assert!(load(two).is_err());

        let (rsa_cert, _) = ca.issue(CertSpec::packed_subject().with_rsa_key());
        let rsa = CborValue::Map(vec![
            (CborValue::text("sig"), CborValue::Bytes(vec![1])),
            (
                CborValue::text("x5c"),
                CborValue::Array(vec![CborValue::Bytes(rsa_cert.to_der().unwrap())]),
            ),
        ]);
        assert!(load(rsa).is_err());

        let no_sig = CborValue::Map(vec![(CborValue::text("x5c"), CborValue::Array(vec![]))]);
        assert!(load(no_sig).is_err());
    }
}
