//! `android-key` attestation (WebAuthn §8.4).

use der_parser::ber::{BerObjectContent, Header, Tag};
use der_parser::der::{
    parse_der, parse_der_container, parse_der_enum, parse_der_integer, parse_der_octetstring,
};
use der_parser::error::{BerError, BerResult};
use tracing::debug;

use crate::authenticator_data::AuthenticatorData;
use crate::cbor::CborValue;
use crate::cose::AlgorithmManager;
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, load_x5c, CertificateDetails, OID_ANDROID_KEY_DESCRIPTION};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "android-key";
const TAG_ALL_APPLICATIONS: Tag = Tag(600);

/// The parts of the KeyDescription extension the verifier relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub attestation_challenge: Vec<u8>,
    /// `allApplications` in either the software or TEE authorization list.
    pub all_applications: bool,
}

impl KeyDescription {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        parse_key_description(der)
            .map(|(_, description)| description)
            .map_err(|e| WebauthnError::attestation(format!("malformed key description: {e:?}")))
    }
}

fn parse_key_description(i: &[u8]) -> BerResult<KeyDescription> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let (i, _attestation_version) = parse_der_integer(i)?;
        let (i, _attestation_security_level) = parse_der_enum(i)?;
        let (i, _keymaster_version) = parse_der_integer(i)?;
        let (i, _keymaster_security_level) = parse_der_enum(i)?;
        let (i, challenge) = parse_der_octetstring(i)?;
        let (i, _unique_id) = parse_der_octetstring(i)?;
        let (i, software_all_applications) = parse_authorization_list(i)?;
        let (i, tee_all_applications) = parse_authorization_list(i)?;

        Ok((
            i,
            KeyDescription {
                attestation_challenge: challenge.as_slice()?.to_vec(),
                all_applications: software_all_applications || tee_all_applications,
            },
        ))
    })(i)
}

/// Returns whether the list carries the `allApplications` tag.
fn parse_authorization_list(i: &[u8]) -> BerResult<bool> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let mut all_applications = false;
        let mut rest = i;
        while !rest.is_empty() {
            let (next, obj) = parse_der(rest)?;
            rest = next;
            if obj.content == BerObjectContent::Optional(None) {
                continue;
            }
            if obj.tag() == TAG_ALL_APPLICATIONS {
                all_applications = true;
            }
        }
        Ok((rest, all_applications))
    })(i)
}

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt.get("alg").and_then(CborValue::as_i64).is_none() {
        return Err(WebauthnError::attestation("android-key statement is missing \"alg\""));
    }
    if att_stmt.get("sig").and_then(CborValue::as_bytes).is_none() {
        return Err(WebauthnError::attestation("android-key statement is missing \"sig\""));
    }
    let certificates = load_x5c(&att_stmt, FMT)?;

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
    algorithms: &AlgorithmManager,
) -> Result<bool> {
    let alg = statement.require_int("alg")?;
    let signature = statement.require_bytes("sig")?;
    let certificates = statement.trust_path.certificates();
    let chain = check_chain(certificates)?;
    let leaf_key = chain[0].public_key()?;

    let mut signed = auth_data.raw().to_vec();
    signed.extend_from_slice(client_data_hash);
    if !algorithms.verify(alg, &signed, &leaf_key, signature)? {
        debug!("android-key signature did not verify");
        return Ok(false);
    }

    let attested = auth_data
        .attested_credential_data()
        .ok_or_else(|| WebauthnError::attestation("no attested credential data"))?;
    if !attested.public_key()?.matches_pkey(&leaf_key)? {
        return Err(WebauthnError::attestation(
            "attestation certificate key differs from the credential public key",
        ));
    }

    let details = CertificateDetails::from_der(&certificates[0])?;
    let extension = details.extension(OID_ANDROID_KEY_DESCRIPTION).ok_or_else(|| {
        WebauthnError::attestation("attestation certificate lacks the key description extension")
    })?;
    let description = KeyDescription::from_der(&extension.value)?;
    if description.attestation_challenge != client_data_hash {
        return Err(WebauthnError::attestation(
            "attestationChallenge does not match clientDataHash",
        ));
    }
    if description.all_applications {
        return Err(WebauthnError::attestation(
            "key is usable by all applications, not bound to the relying party",
        ));
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator_data::{FLAG_AT, FLAG_UP};
    use crate::fixtures::{self, der, CertSpec, EcCredential, TestCa};
    use uuid::Uuid;

    fn key_description(challenge: &[u8], all_applications: bool) -> Vec<u8> {
        let tee = if all_applications {
            der::sequence(&[der::context_constructed(600, &der::null())])
        } else {
            der::sequence(&[])
        };
        der::sequence(&[
            der::integer(3),
            der::enumerated(1),
            der::integer(4),
            der::enumerated(1),
            der::octet_string(challenge),
            der::octet_string(&[]),
            der::sequence(&[]),
            tee,
        ])
    }

    struct Case {
        statement: AttestationStatement,
        auth_data: AuthenticatorData,
        cdh: [u8; 32],
    }

    fn build(challenge_ok: bool, all_applications: bool, same_key: bool) -> Case {
        let credential = EcCredential::generate();
        let cdh = fixtures::sha256(b"android client data");
        let challenge = if challenge_ok { cdh.to_vec() } else { vec![0; 32] };

        let ca = TestCa::new();
        let spec = CertSpec::packed_subject().with_extension(
            OID_ANDROID_KEY_DESCRIPTION,
            false,
            key_description(&challenge, all_applications),
        );
        let spec = if same_key {
            spec.with_key(credential.private_key.clone())
        } else {
            spec
        };
        let (cert, cert_key) = ca.issue(spec);

        let raw = fixtures::auth_data(
            "example.com",
            FLAG_UP | FLAG_AT,
            0,
            Some((
                Uuid::from_bytes([5; 16]),
                b"android".as_slice(),
                credential.cose_bytes.as_slice(),
            )),
            None,
        );
        let mut signed = raw.clone();
        signed.extend_from_slice(&cdh);
        let sig = fixtures::sign_sha256(&cert_key, &signed);

        let att_stmt = CborValue::Map(vec![
            (CborValue::text("alg"), CborValue::integer(-7)),
            (CborValue::text("sig"), CborValue::Bytes(sig)),
            (
                CborValue::text("x5c"),
                CborValue::Array(vec![
                    CborValue::Bytes(cert.to_der().unwrap()),
                    CborValue::Bytes(ca.certificate.to_der().unwrap()),
                ]),
            ),
        ]);
        Case {
            statement: load(att_stmt).unwrap(),
            auth_data: AuthenticatorData::parse(&raw).unwrap(),
            cdh,
        }
    }

    fn check(case: &Case) -> Result<bool> {
        is_valid(&case.cdh, &case.statement, &case.auth_data, &AlgorithmManager::default())
    }

    #[test]
    fn test_valid_android_key() {
        assert!(check(&build(true, false, true)).unwrap());
    }

    #[test]
    fn test_challenge_mismatch() {
        assert!(check(&build(false, false, true)).is_err());
    }

    #[test]
    fn test_all_applications_rejected() {
        assert!(check(&build(true, true, true)).is_err());
    }

    #[test]
    fn test_certificate_key_must_be_credential_key() {
        assert!(check(&build(true, false, false)).is_err());
    }

    #[test]
    fn test_key_description_parse() {
        let description = KeyDescription::from_der(&key_description(b"nonce", true)).unwrap();
        assert_eq!(description.attestation_challenge, b"nonce");
        assert!(description.all_applications);
        assert!(KeyDescription::from_der(&[0x04, 0x00]).is_err());
    }
}
