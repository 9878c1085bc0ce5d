//! X.509 helpers shared by the certificate-based attestation formats.
//!
//! OpenSSL does the signature work; `x509-parser` is used to read the
//! extensions OpenSSL does not expose (FIDO AAGUID, Android key description,
//! Apple nonce, TCG key purposes).

use der_parser::der::parse_der_octetstring;
use openssl::x509::X509;
use tracing::debug;
use uuid::Uuid;
use x509_parser::extensions::ParsedExtension;
use x509_parser::x509::AttributeTypeAndValue;

use crate::cbor::CborValue;
use crate::error::{Result, WebauthnError};

pub const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
pub const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";
pub const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";
pub const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";
const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub oid: String,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// The parts of a certificate the attestation requirements look at.
#[derive(Debug, Clone, Default)]
pub struct CertificateDetails {
    /// 1, 2 or 3.
    pub version: u32,
    pub subject_empty: bool,
    pub country: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub common_name: Option<String>,
    pub is_ca: bool,
    pub extended_key_usages: Vec<String>,
    pub has_subject_alt_name: bool,
    pub currently_valid: bool,
    pub extensions: Vec<Extension>,
}

impl CertificateDetails {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| WebauthnError::attestation(format!("invalid certificate: {e}")))?;

        let subject = cert.subject();
        let mut details = CertificateDetails {
            version: cert.version().0 + 1,
            subject_empty: subject.iter_attributes().next().is_none(),
            country: first_value(subject.iter_country()),
            organization: first_value(subject.iter_organization()),
            organizational_unit: first_value(subject.iter_organizational_unit()),
            common_name: first_value(subject.iter_common_name()),
            currently_valid: cert.validity().is_valid(),
            ..Default::default()
        };

        for ext in cert.extensions() {
            let oid = ext.oid.to_id_string();
            match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(bc) => details.is_ca = bc.ca,
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    details
                        .extended_key_usages
                        .extend(eku.other.iter().map(|o| o.to_id_string()));
                }
                _ => {}
            }
            if oid == OID_SUBJECT_ALT_NAME {
                details.has_subject_alt_name = true;
            }
            details.extensions.push(Extension {
                oid,
                critical: ext.critical,
                value: ext.value.to_vec(),
            });
        }

        Ok(details)
    }

    pub fn extension(&self, oid: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.oid == oid)
    }

    /// If the id-fido-gen-ce-aaguid extension is present it must be
    /// non-critical and carry the authenticator's AAGUID.
    pub fn check_aaguid(&self, aaguid: &Uuid) -> Result<()> {
        let Some(ext) = self.extension(OID_FIDO_GEN_CE_AAGUID) else {
            return Ok(());
        };
        if ext.critical {
            return Err(WebauthnError::attestation(
                "AAGUID certificate extension must not be critical",
            ));
        }
        let (_, octets) = parse_der_octetstring(&ext.value)
            .map_err(|e| WebauthnError::attestation(format!("malformed AAGUID extension: {e:?}")))?;
        let bytes = octets
            .as_slice()
            .map_err(|e| WebauthnError::attestation(format!("malformed AAGUID extension: {e:?}")))?;
        if bytes != aaguid.as_bytes() {
            return Err(WebauthnError::attestation(
                "AAGUID certificate extension does not match authenticator data",
            ));
        }
        Ok(())
    }
}

fn first_value<'a, 'b: 'a>(
    mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    attrs
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Read a non-empty `x5c` array of DER certificates from an attStmt map.
pub fn load_x5c(att_stmt: &CborValue, fmt: &str) -> Result<Vec<Vec<u8>>> {
    let items = att_stmt
        .get("x5c")
        .and_then(CborValue::as_array)
        .ok_or_else(|| WebauthnError::attestation(format!("{fmt} \"x5c\" must be an array")))?;
    if items.is_empty() {
        return Err(WebauthnError::attestation(format!("{fmt} \"x5c\" is empty")));
    }
    items
        .iter()
        .map(|item| {
            item.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
                WebauthnError::attestation(format!("{fmt} \"x5c\" entries must be byte strings"))
            })
        })
        .collect()
}

pub fn parse_certificate(der: &[u8]) -> Result<X509> {
    X509::from_der(der).map_err(|e| WebauthnError::attestation(format!("invalid certificate: {e}")))
}

/// Parse a leaf-first chain and check it is internally consistent: every
/// certificate is signed by the next one and the leaf is inside its
/// validity window. Anchoring the last certificate is left to metadata.
pub fn check_chain(chain: &[Vec<u8>]) -> Result<Vec<X509>> {
    let certificates = chain
        .iter()
        .map(|der| parse_certificate(der))
        .collect::<Result<Vec<_>>>()?;

    let leaf = certificates
        .first()
        .ok_or_else(|| WebauthnError::attestation("empty certificate chain"))?;

    for pair in certificates.windows(2) {
        let issuer_key = pair[1].public_key()?;
        if !pair[0].verify(&issuer_key).unwrap_or(false) {
            return Err(WebauthnError::attestation(
                "certificate chain is broken: a certificate is not signed by its successor",
            ));
        }
    }

    if !CertificateDetails::from_der(&leaf.to_der()?)?.currently_valid {
        return Err(WebauthnError::attestation(
            "attestation certificate is outside its validity period",
        ));
    }

    debug!(length = certificates.len(), "Certificate chain is consistent");
    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{CertSpec, TestCa};

    #[test]
    fn test_details_for_packed_style_certificate() {
        let ca = TestCa::new();
        let aaguid = Uuid::from_bytes([9; 16]);
        let (cert, _) = ca.issue(
            CertSpec::packed_subject()
                .with_extension(OID_FIDO_GEN_CE_AAGUID, false, crate::fixtures::der_octet_string(aaguid.as_bytes())),
        );
        let details = CertificateDetails::from_der(&cert.to_der().unwrap()).unwrap();
        assert_eq!(details.version, 3);
        assert_eq!(details.country.as_deref(), Some("US"));
        assert_eq!(details.organizational_unit.as_deref(), Some("Authenticator Attestation"));
        assert!(!details.is_ca);
        assert!(details.currently_valid);
        assert!(details.check_aaguid(&aaguid).is_ok());
        assert!(details.check_aaguid(&Uuid::nil()).is_err());
    }

    #[test]
    fn test_critical_aaguid_extension_rejected() {
        let ca = TestCa::new();
        let aaguid = Uuid::from_bytes([9; 16]);
        let (cert, _) = ca.issue(
            CertSpec::packed_subject()
                .with_extension(OID_FIDO_GEN_CE_AAGUID, true, crate::fixtures::der_octet_string(aaguid.as_bytes())),
        );
        let details = CertificateDetails::from_der(&cert.to_der().unwrap()).unwrap();
        assert!(details.check_aaguid(&aaguid).is_err());
    }

    #[test]
    fn test_chain_consistency() {
        let ca = TestCa::new();
        let (leaf, _) = ca.issue(CertSpec::packed_subject());
        let chain = vec![leaf.to_der().unwrap(), ca.certificate.to_der().unwrap()];
        assert_eq!(check_chain(&chain).unwrap().len(), 2);

        let other = TestCa::new();
        let broken = vec![leaf.to_der().unwrap(), other.certificate.to_der().unwrap()];
        assert!(check_chain(&broken).is_err());
    }

    #[test]
    fn test_expired_leaf_rejected() {
        let ca = TestCa::new();
        let (leaf, _) = ca.issue(CertSpec::packed_subject().expired());
        assert!(check_chain(&[leaf.to_der().unwrap()]).is_err());
    }

    #[test]
    fn test_load_x5c_shapes() {
        let stmt = CborValue::Map(vec![(
            CborValue::text("x5c"),
            CborValue::Array(vec![CborValue::Bytes(vec![1, 2])]),
        )]);
        assert_eq!(load_x5c(&stmt, "packed").unwrap(), vec![vec![1, 2]]);

        let empty = CborValue::Map(vec![(CborValue::text("x5c"), CborValue::Array(vec![]))]);
        assert!(load_x5c(&empty, "packed").is_err());

        let wrong = CborValue::Map(vec![(
            CborValue::text("x5c"),
            CborValue::Array(vec![CborValue::text("pem")]),
        )]);
        assert!(load_x5c(&wrong, "packed").is_err());
    }
}
