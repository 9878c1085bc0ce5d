//! COSE signature algorithms and the manager that decides which are enabled.

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{Id, PKeyRef, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WebauthnError};

use super::{CoseKey, Curve, KeyMaterial};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    ES256K,
    EdDSA,
    PS256,
    PS384,
    PS512,
    RS256,
    RS384,
    RS512,
    RS1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Ecdsa(Curve),
    RsaPkcs1,
    RsaPss,
    EdDsa,
}

impl CoseAlgorithm {
    pub const ALL: [CoseAlgorithm; 12] = [
        CoseAlgorithm::ES256,
        CoseAlgorithm::EdDSA,
        CoseAlgorithm::ES384,
        CoseAlgorithm::ES512,
        CoseAlgorithm::RS256,
        CoseAlgorithm::PS256,
        CoseAlgorithm::RS384,
        CoseAlgorithm::RS512,
        CoseAlgorithm::PS384,
        CoseAlgorithm::PS512,
        CoseAlgorithm::ES256K,
        CoseAlgorithm::RS1,
    ];

    pub fn id(self) -> i64 {
        match self {
            CoseAlgorithm::ES256 => -7,
            CoseAlgorithm::ES384 => -35,
            CoseAlgorithm::ES512 => -36,
            CoseAlgorithm::ES256K => -47,
            CoseAlgorithm::EdDSA => -8,
            CoseAlgorithm::PS256 => -37,
            CoseAlgorithm::PS384 => -38,
            CoseAlgorithm::PS512 => -39,
            CoseAlgorithm::RS256 => -257,
            CoseAlgorithm::RS384 => -258,
            CoseAlgorithm::RS512 => -259,
            CoseAlgorithm::RS1 => -65535,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.id() == id)
    }

    /// JWS `alg` header name.
    pub fn jose_name(self) -> &'static str {
        match self {
            CoseAlgorithm::ES256 => "ES256",
            CoseAlgorithm::ES384 => "ES384",
            CoseAlgorithm::ES512 => "ES512",
            CoseAlgorithm::ES256K => "ES256K",
            CoseAlgorithm::EdDSA => "EdDSA",
            CoseAlgorithm::PS256 => "PS256",
            CoseAlgorithm::PS384 => "PS384",
            CoseAlgorithm::PS512 => "PS512",
            CoseAlgorithm::RS256 => "RS256",
            CoseAlgorithm::RS384 => "RS384",
            CoseAlgorithm::RS512 => "RS512",
            CoseAlgorithm::RS1 => "RS1",
        }
    }

    pub fn from_jose_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.jose_name() == name)
    }

    fn family(self) -> Family {
        match self {
            CoseAlgorithm::ES256 => Family::Ecdsa(Curve::P256),
            CoseAlgorithm::ES384 => Family::Ecdsa(Curve::P384),
            CoseAlgorithm::ES512 => Family::Ecdsa(Curve::P521),
            CoseAlgorithm::ES256K => Family::Ecdsa(Curve::Secp256k1),
            CoseAlgorithm::EdDSA => Family::EdDsa,
            CoseAlgorithm::PS256 | CoseAlgorithm::PS384 | CoseAlgorithm::PS512 => Family::RsaPss,
            _ => Family::RsaPkcs1,
        }
    }

    /// Hash used by the algorithm. EdDSA hashes internally and has none.
    pub fn message_digest(self) -> Option<MessageDigest> {
        match self {
            CoseAlgorithm::ES256
            | CoseAlgorithm::ES256K
            | CoseAlgorithm::PS256
            | CoseAlgorithm::RS256 => Some(MessageDigest::sha256()),
            CoseAlgorithm::ES384 | CoseAlgorithm::PS384 | CoseAlgorithm::RS384 => {
                Some(MessageDigest::sha384())
            }
            CoseAlgorithm::ES512 | CoseAlgorithm::PS512 | CoseAlgorithm::RS512 => {
                Some(MessageDigest::sha512())
            }
            CoseAlgorithm::RS1 => Some(MessageDigest::sha1()),
            CoseAlgorithm::EdDSA => None,
        }
    }

    /// Hash `data` with the algorithm's digest.
    pub fn digest(self, data: &[u8]) -> Result<Vec<u8>> {
        let md = self.message_digest().ok_or_else(|| {
            WebauthnError::UnsupportedFormat(format!("{} has no digest", self.jose_name()))
        })?;
        Ok(hash(md, data)?.to_vec())
    }

    /// Whether COSE key material can be used with this algorithm.
    pub fn accepts(self, material: &KeyMaterial) -> bool {
        match (self.family(), material) {
            (Family::Ecdsa(expected), KeyMaterial::Ec2 { curve, .. }) => expected == *curve,
            (Family::EdDsa, KeyMaterial::Okp { curve, .. }) => curve.is_edwards(),
            (Family::RsaPkcs1 | Family::RsaPss, KeyMaterial::Rsa { .. }) => true,
            _ => false,
        }
    }

    /// Verify `signature` over `data`. A signature the backend cannot parse
    /// verifies as false; a key of the wrong type is an error.
    pub fn verify(self, data: &[u8], key: &PKeyRef<Public>, signature: &[u8]) -> Result<bool> {
        self.check_key(key)?;

        match self.family() {
            Family::EdDsa => {
                let mut verifier = Verifier::new_without_digest(key)?;
                Ok(verifier.verify_oneshot(signature, data).unwrap_or(false))
            }
            Family::Ecdsa(curve) => {
                let der = match ecdsa_der_signature(signature, curve.coordinate_size()) {
                    Some(der) => der,
                    None => {
                        debug!(alg = self.jose_name(), "Malformed ECDSA signature");
                        return Ok(false);
                    }
                };
                self.verify_digest(data, key, &der)
            }
            Family::RsaPkcs1 | Family::RsaPss => self.verify_digest(data, key, signature),
        }
    }

    fn verify_digest(self, data: &[u8], key: &PKeyRef<Public>, signature: &[u8]) -> Result<bool> {
        let md = self.message_digest().ok_or_else(|| {
            WebauthnError::UnsupportedFormat(format!("{} has no digest", self.jose_name()))
        })?;
        let mut verifier = Verifier::new(md, key)?;
        match self.family() {
            Family::RsaPss => {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_mgf1_md(md)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            }
            Family::RsaPkcs1 => verifier.set_rsa_padding(Padding::PKCS1)?,
            _ => {}
        }
        verifier.update(data)?;
        Ok(verifier.verify(signature).unwrap_or(false))
    }

    fn check_key(self, key: &PKeyRef<Public>) -> Result<()> {
        let ok = match self.family() {
            Family::Ecdsa(curve) => {
                key.id() == Id::EC
                    && key
                        .ec_key()
                        .ok()
                        .and_then(|ec| ec.group().curve_name())
                        .and_then(Curve::from_nid)
                        == Some(curve)
            }
            Family::EdDsa => key.id() == Id::ED25519 || key.id() == Id::ED448,
            Family::RsaPkcs1 | Family::RsaPss => key.id() == Id::RSA,
        };
        if ok {
            Ok(())
        } else {
            Err(WebauthnError::SignatureInvalid(format!(
                "key type does not match algorithm {}",
                self.jose_name()
            )))
        }
    }
}

/// Produce a DER ECDSA signature. Strict DER input passes through; a raw
/// `r‖s` pair of the curve's size is re-encoded.
pub fn ecdsa_der_signature(signature: &[u8], coordinate_size: usize) -> Option<Vec<u8>> {
    if let Ok(sig) = EcdsaSig::from_der(signature) {
        if sig.to_der().ok().as_deref() == Some(signature) {
            return Some(signature.to_vec());
        }
    }
    if signature.len() != 2 * coordinate_size {
        return None;
    }
    let r = BigNum::from_slice(&signature[..coordinate_size]).ok()?;
    let s = BigNum::from_slice(&signature[coordinate_size..]).ok()?;
    EcdsaSig::from_private_components(r, s).ok()?.to_der().ok()
}

/// The set of algorithms a relying party accepts, in preference order.
#[derive(Debug, Clone)]
pub struct AlgorithmManager {
    enabled: Vec<CoseAlgorithm>,
}

impl Default for AlgorithmManager {
    fn default() -> Self {
        Self {
            enabled: CoseAlgorithm::ALL.to_vec(),
        }
    }
}

impl AlgorithmManager {
    pub fn new(algorithms: impl IntoIterator<Item = CoseAlgorithm>) -> Self {
        let mut enabled = Vec::new();
        for alg in algorithms {
            if !enabled.contains(&alg) {
                enabled.push(alg);
            }
        }
        Self { enabled }
    }

    pub fn with(mut self, algorithm: CoseAlgorithm) -> Self {
        if !self.enabled.contains(&algorithm) {
            self.enabled.push(algorithm);
        }
        self
    }

    pub fn without(mut self, algorithm: CoseAlgorithm) -> Self {
        self.enabled.retain(|a| *a != algorithm);
        self
    }

    pub fn algorithms(&self) -> &[CoseAlgorithm] {
        &self.enabled
    }

    /// Resolve a COSE identifier to an enabled algorithm.
    pub fn get(&self, id: i64) -> Result<CoseAlgorithm> {
        CoseAlgorithm::from_id(id)
            .filter(|alg| self.enabled.contains(alg))
            .ok_or_else(|| WebauthnError::UnsupportedFormat(format!("COSE algorithm {id}")))
    }

    /// Verify with an arbitrary public key (attestation certificates).
    pub fn verify(
        &self,
        id: i64,
        data: &[u8],
        key: &PKeyRef<Public>,
        signature: &[u8],
    ) -> Result<bool> {
        self.get(id)?.verify(data, key, signature)
    }

    /// Verify with a credential key using the key's own algorithm.
    pub fn verify_with_key(&self, key: &CoseKey, data: &[u8], signature: &[u8]) -> Result<bool> {
        let alg = self.get(key.algorithm)?;
        if !alg.accepts(&key.material) {
            return Err(WebauthnError::SignatureInvalid(format!(
                "credential key cannot be used with {}",
                alg.jose_name()
            )));
        }
        alg.verify(data, &*key.to_pkey()?, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::sign::Signer;

    fn ec_pair(nid: Nid) -> (PKey<Private>, PKey<Public>) {
        let group = EcGroup::from_curve_name(nid).unwrap();
        let private = EcKey::generate(&group).unwrap();
        let public = EcKey::from_public_key(&group, private.public_key()).unwrap();
        (
            PKey::from_ec_key(private).unwrap(),
            PKey::from_ec_key(public).unwrap(),
        )
    }

    fn sign(md: MessageDigest, key: &PKey<Private>, data: &[u8]) -> Vec<u8> {
        let mut signer = Signer::new(md, key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    #[test]
    fn test_ids_round_trip() {
        for alg in CoseAlgorithm::ALL {
            assert_eq!(CoseAlgorithm::from_id(alg.id()), Some(alg));
            assert_eq!(CoseAlgorithm::from_jose_name(alg.jose_name()), Some(alg));
        }
        assert_eq!(CoseAlgorithm::from_id(-7), Some(CoseAlgorithm::ES256));
        assert_eq!(CoseAlgorithm::from_id(-999), None);
    }

    #[test]
    fn test_es256_der_and_raw_signatures() {
        let (private, public) = ec_pair(Nid::X9_62_PRIME256V1);
        let der = sign(MessageDigest::sha256(), &private, b"payload");
        assert!(CoseAlgorithm::ES256.verify(b"payload", &public, &der).unwrap());
        assert!(!CoseAlgorithm::ES256.verify(b"other", &public, &der).unwrap());

        let sig = EcdsaSig::from_der(&der).unwrap();
        let mut raw = sig.r().to_vec_padded(32).unwrap();
        raw.extend(sig.s().to_vec_padded(32).unwrap());
        assert!(CoseAlgorithm::ES256.verify(b"payload", &public, &raw).unwrap());

        assert!(!CoseAlgorithm::ES256
            .verify(b"payload", &public, &raw[..63])
            .unwrap());
    }

    #[test]
    fn test_curve_mismatch_is_an_error() {
        let (private, public) = ec_pair(Nid::SECP384R1);
        let der = sign(MessageDigest::sha256(), &private, b"payload");
        assert!(matches!(
            CoseAlgorithm::ES256.verify(b"payload", &public, &der),
            Err(WebauthnError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_rsa_pkcs1_and_pss() {
        let rsa = Rsa::generate(2048).unwrap();
        let private = PKey::from_rsa(rsa).unwrap();
        let public = PKey::public_key_from_der(&private.public_key_to_der().unwrap()).unwrap();

        let pkcs1 = sign(MessageDigest::sha256(), &private, b"data");
        assert!(CoseAlgorithm::RS256.verify(b"data", &public, &pkcs1).unwrap());
        assert!(!CoseAlgorithm::PS256.verify(b"data", &public, &pkcs1).unwrap());

        let mut signer = Signer::new(MessageDigest::sha256(), &private).unwrap();
        signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
        signer.set_rsa_mgf1_md(MessageDigest::sha256()).unwrap();
        signer
            .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
            .unwrap();
        signer.update(b"data").unwrap();
        let pss = signer.sign_to_vec().unwrap();
        assert!(CoseAlgorithm::PS256.verify(b"data", &public, &pss).unwrap());
    }

    #[test]
    fn test_eddsa() {
        let private = PKey::generate_ed25519().unwrap();
        let public =
            PKey::public_key_from_raw_bytes(&private.raw_public_key().unwrap(), Id::ED25519)
                .unwrap();
        let mut signer = Signer::new_without_digest(&private).unwrap();
        let sig = signer.sign_oneshot_to_vec(b"msg").unwrap();
        assert!(CoseAlgorithm::EdDSA.verify(b"msg", &public, &sig).unwrap());
        assert!(!CoseAlgorithm::EdDSA.verify(b"msg2", &public, &sig).unwrap());
    }

    #[test]
    fn test_manager_rejects_disabled_algorithm() {
        let manager = AlgorithmManager::default().without(CoseAlgorithm::RS1);
        assert!(manager.get(-7).is_ok());
        assert!(matches!(
            manager.get(-65535),
            Err(WebauthnError::UnsupportedFormat(_))
        ));

        let manager = AlgorithmManager::new([CoseAlgorithm::ES256, CoseAlgorithm::ES256]);
        assert_eq!(manager.algorithms(), &[CoseAlgorithm::ES256]);
    }

    #[test]
    fn test_verify_with_key_checks_compatibility() {
        let (private, public) = ec_pair(Nid::X9_62_PRIME256V1);
        let mut key = CoseKey::from_pkey(&public, CoseAlgorithm::ES256.id()).unwrap();
        let der = sign(MessageDigest::sha256(), &private, b"abc");
        let manager = AlgorithmManager::default();
        assert!(manager.verify_with_key(&key, b"abc", &der).unwrap());

        key.algorithm = CoseAlgorithm::RS256.id();
        assert!(matches!(
            manager.verify_with_key(&key, b"abc", &der),
            Err(WebauthnError::SignatureInvalid(_))
        ));
    }
}
