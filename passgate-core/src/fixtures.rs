//! Keys, certificates and authenticator data generated on the fly for unit
//! tests.

use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cose::CoseKey;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Raw authenticator data: rpIdHash, flags, counter, then the optional
/// attested credential data and extension bytes verbatim.
pub fn auth_data(
    rp_id: &str,
    flags: u8,
    counter: u32,
    attested: Option<(Uuid, &[u8], &[u8])>,
    extensions: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = sha256(rp_id.as_bytes()).to_vec();
    out.push(flags);
    out.extend_from_slice(&counter.to_be_bytes());
    if let Some((aaguid, credential_id, public_key)) = attested {
        out.extend_from_slice(aaguid.as_bytes());
        out.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(credential_id);
        out.extend_from_slice(public_key);
    }
    if let Some(extensions) = extensions {
        out.extend_from_slice(extensions);
    }
    out
}

pub fn public_only(key: &PKey<Private>) -> PKey<Public> {
    PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap()
}

/// SHA-256 signature: DER ECDSA for EC keys, PKCS#1 v1.5 for RSA keys.
pub fn sign_sha256(key: &PKey<Private>, data: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
}

fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// An ES256 credential key pair.
pub struct EcCredential {
    pub private_key: PKey<Private>,
    pub cose_key: CoseKey,
    pub cose_bytes: Vec<u8>,
}

impl EcCredential {
    pub fn generate() -> Self {
        let private_key = p256_key();
        let cose_key = CoseKey::from_pkey(&public_only(&private_key), -7).unwrap();
        let cose_bytes = cose_key.to_cbor().unwrap();
        Self {
            private_key,
            cose_key,
            cose_bytes,
        }
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        sign_sha256(&self.private_key, data)
    }
}

enum KeySpec {
    Ec,
    Rsa,
    Given(PKey<Private>),
}

/// What an issued test certificate should look like.
pub struct CertSpec {
    subject: Vec<(Nid, String)>,
    extensions: Vec<(String, bool, Vec<u8>)>,
    extended_key_usages: Vec<String>,
    subject_alt_name: Option<String>,
    expired: bool,
    key: KeySpec,
}

impl CertSpec {
    fn empty() -> Self {
        Self {
            subject: Vec::new(),
            extensions: Vec::new(),
            extended_key_usages: Vec::new(),
            subject_alt_name: None,
            expired: false,
            key: KeySpec::Ec,
        }
    }

    /// Subject satisfying the packed attestation certificate requirements.
    pub fn packed_subject() -> Self {
        Self::empty()
            .with_subject(Nid::COUNTRYNAME, "US")
            .with_subject(Nid::ORGANIZATIONNAME, "Passgate Test")
            .with_subject(Nid::ORGANIZATIONALUNITNAME, "Authenticator Attestation")
            .with_subject(Nid::COMMONNAME, "Passgate Test Authenticator")
    }

    /// Empty subject, a SAN and the tcg-kp-AIKCertificate key purpose.
    pub fn tpm_aik() -> Self {
        let mut spec = Self::empty();
        spec.subject_alt_name = Some("tpm.passgate.test".into());
        spec.extended_key_usages.push("2.23.133.8.3".into());
        spec
    }

    fn with_subject(mut self, nid: Nid, value: &str) -> Self {
        self.subject.retain(|(n, _)| *n != nid);
        self.subject.push((nid, value.to_string()));
        self
    }

    pub fn with_common_name(self, cn: &str) -> Self {
        self.with_subject(Nid::COMMONNAME, cn)
    }

    pub fn with_organizational_unit(self, ou: &str) -> Self {
        self.with_subject(Nid::ORGANIZATIONALUNITNAME, ou)
    }

    pub fn with_extension(mut self, oid: &str, critical: bool, der: Vec<u8>) -> Self {
        self.extensions.push((oid.to_string(), critical, der));
        self
    }

    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    pub fn with_rsa_key(mut self) -> Self {
        self.key = KeySpec::Rsa;
        self
    }

    pub fn with_key(mut self, key: PKey<Private>) -> Self {
        self.key = KeySpec::Given(key);
        self
    }
}

/// A self-signed P-256 root that issues leaf certificates.
pub struct TestCa {
    pub certificate: X509,
    pub key: PKey<Private>,
}

impl TestCa {
    pub fn new() -> Self {
        let key = p256_key();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "Passgate Test Root").unwrap();
        let name = name.build();

        let mut builder = base_builder(&key, false);
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Self {
            certificate: builder.build(),
            key,
        }
    }

    pub fn issue(&self, spec: CertSpec) -> (X509, PKey<Private>) {
        let key = match spec.key {
            KeySpec::Ec => p256_key(),
            KeySpec::Rsa => PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap(),
            KeySpec::Given(key) => key,
        };

        let mut name = X509NameBuilder::new().unwrap();
        for (nid, value) in &spec.subject {
            name.append_entry_by_nid(*nid, value).unwrap();
        }
        let name = name.build();

        let mut builder = base_builder(&key, spec.expired);
        builder.set_subject_name(&name).unwrap();
        builder
            .set_issuer_name(self.certificate.subject_name())
            .unwrap();
        builder
            .append_extension(BasicConstraints::new().build().unwrap())
            .unwrap();
        if !spec.extended_key_usages.is_empty() {
            let mut eku = ExtendedKeyUsage::new();
            for oid in &spec.extended_key_usages {
                eku.other(oid);
            }
            builder.append_extension(eku.build().unwrap()).unwrap();
        }
        if let Some(dns) = &spec.subject_alt_name {
            let san = SubjectAlternativeName::new()
                .dns(dns)
                .build(&builder.x509v3_context(Some(&*self.certificate), None))
                .unwrap();
            builder.append_extension(san).unwrap();
        }
        for (oid, critical, der) in &spec.extensions {
            let extension = X509Extension::new_from_der(
                &Asn1Object::from_str(oid).unwrap(),
                *critical,
                &Asn1OctetString::new_from_bytes(der).unwrap(),
            )
            .unwrap();
            builder.append_extension(extension).unwrap();
        }
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        (builder.build(), key)
    }
}

fn base_builder(key: &PKey<Private>, expired: bool) -> X509Builder {
    let now = chrono::Utc::now().timestamp();
    let (not_before, not_after) = if expired {
        (now - 2 * 86_400, now - 86_400)
    } else {
        (now - 3_600, now + 365 * 86_400)
    };

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(rand::thread_rng().next_u32() | 1).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder.set_pubkey(key).unwrap();
    builder
}

pub fn der_octet_string(bytes: &[u8]) -> Vec<u8> {
    der::octet_string(bytes)
}

/// Just enough DER encoding to build certificate extension payloads.
pub mod der {
    fn length(len: usize) -> Vec<u8> {
        if len < 0x80 {
            return vec![len as u8];
        }
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }

    fn tlv(tag: &[u8], content: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend(length(content.len()));
        out.extend_from_slice(content);
        out
    }

    pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x30], &items.concat())
    }

    pub fn integer(value: u8) -> Vec<u8> {
        if value & 0x80 != 0 {
            tlv(&[0x02], &[0x00, value])
        } else {
            tlv(&[0x02], &[value])
        }
    }

    pub fn enumerated(value: u8) -> Vec<u8> {
        tlv(&[0x0a], &[value])
    }

    pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
        tlv(&[0x04], bytes)
    }

    pub fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    /// `[tag] EXPLICIT`, using the high-tag-number form above 30.
    pub fn context_constructed(tag: u32, content: &[u8]) -> Vec<u8> {
        if tag < 31 {
            return tlv(&[0xa0 | tag as u8], content);
        }
        let mut groups = Vec::new();
        let mut rest = tag;
        while rest > 0 {
            groups.push((rest & 0x7f) as u8);
            rest >>= 7;
        }
        let mut header = vec![0xbf];
        for (i, group) in groups.iter().enumerate().rev() {
            header.push(if i == 0 { *group } else { group | 0x80 });
        }
        tlv(&header, content)
    }
}
