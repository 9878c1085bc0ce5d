//! `apple` anonymous attestation (WebAuthn §8.8).

use der_parser::ber::{Class, Header, Tag};
use der_parser::der::{parse_der_container, parse_der_octetstring, parse_der_tagged_explicit};
use der_parser::error::{BerError, BerResult};
use sha2::{Digest, Sha256};

use crate::authenticator_data::AuthenticatorData;
use crate::cbor::CborValue;
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, load_x5c, CertificateDetails, OID_APPLE_NONCE};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "apple";

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }`
fn parse_nonce(i: &[u8]) -> BerResult<Vec<u8>> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let (i, tagged) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
        let (class, _tag, nonce) = tagged.as_tagged()?;
        if class != Class::ContextSpecific {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        Ok((i, nonce.as_slice()?.to_vec()))
    })(i)
}

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    let certificates = load_x5c(&att_stmt, FMT)?;
    Ok(AttestationStatement {
        fmt: FMT.to_string(),
        att_stmt,
        attestation_type: AttestationType::AnonCa,
        trust_path: TrustPath::CertificateChain { certificates },
    })
}

pub(super) fn is_valid(
    client_data_hash: &[u8; 32],
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
) -> Result<bool> {
    let certificates = statement.trust_path.certificates();
    let chain = check_chain(certificates)?;

    let details = CertificateDetails::from_der(&certificates[0])?;
    let extension = details
        .extension(OID_APPLE_NONCE)
        .ok_or_else(|| WebauthnError::attestation("credential certificate lacks the nonce extension"))?;
    let (_, nonce) = parse_nonce(&extension.value)
        .map_err(|e| WebauthnError::attestation(format!("malformed nonce extension: {e:?}")))?;

    let expected = Sha256::new()
        .chain_update(auth_data.raw())
        .chain_update(client_data_hash)
        .finalize();
    if nonce.as_slice() != expected.as_slice() {
        return Err(WebauthnError::attestation(
            "certificate nonce is not the hash of authData and clientDataHash",
        ));
    }

    let attested = auth_data
        .attested_credential_data()
        .ok_or_else(|| WebauthnError::attestation("no attested credential data"))?;
    if !attested.public_key()?.matches_pkey(&*chain[0].public_key()?)? {
        return Err(WebauthnError::attestation(
            "credential certificate key differs from the credential public key",
        ));
    }

    Ok(true)
}
