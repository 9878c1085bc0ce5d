//! COSE_Key (RFC 8152 §7) decoding and conversion to OpenSSL keys.

use ciborium::value::{Integer, Value};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPointRef, PointConversionForm};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use openssl::rsa::Rsa;

use crate::cbor::{decode_one, CborValue};
use crate::error::{Result, WebauthnError};

use super::CoseAlgorithm;

pub const LABEL_KTY: i64 = 1;
pub const LABEL_ALG: i64 = 3;
pub const LABEL_CRV: i64 = -1;
pub const LABEL_X: i64 = -2;
pub const LABEL_Y: i64 = -3;
pub const LABEL_N: i64 = -1;
pub const LABEL_E: i64 = -2;

pub const KTY_OKP: i64 = 1;
pub const KTY_EC2: i64 = 2;
pub const KTY_RSA: i64 = 3;

/// Length of an uncompressed SEC1 P-256 point as stored by legacy U2F.
pub const U2F_PUBLIC_KEY_LEN: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
    P521,
    Ed25519,
    Ed448,
    Secp256k1,
}

impl Curve {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Curve::P256),
            2 => Some(Curve::P384),
            3 => Some(Curve::P521),
            6 => Some(Curve::Ed25519),
            7 => Some(Curve::Ed448),
            8 => Some(Curve::Secp256k1),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Curve::P256 => 1,
            Curve::P384 => 2,
            Curve::P521 => 3,
            Curve::Ed25519 => 6,
            Curve::Ed448 => 7,
            Curve::Secp256k1 => 8,
        }
    }

    /// Byte length of one coordinate (EC2) or of the public key (OKP).
    pub fn coordinate_size(self) -> usize {
        match self {
            Curve::P256 | Curve::Secp256k1 | Curve::Ed25519 => 32,
            Curve::P384 => 48,
            Curve::P521 => 66,
            Curve::Ed448 => 57,
        }
    }

    pub fn is_edwards(self) -> bool {
        matches!(self, Curve::Ed25519 | Curve::Ed448)
    }

    fn nid(self) -> Option<Nid> {
        match self {
            Curve::P256 => Some(Nid::X9_62_PRIME256V1),
            Curve::P384 => Some(Nid::SECP384R1),
            Curve::P521 => Some(Nid::SECP521R1),
            Curve::Secp256k1 => Some(Nid::SECP256K1),
            Curve::Ed25519 | Curve::Ed448 => None,
        }
    }

    /// TPM_ECC_CURVE identifier.
    pub fn from_tpm_id(id: u16) -> Option<Self> {
        match id {
            0x0003 => Some(Curve::P256),
            0x0004 => Some(Curve::P384),
            0x0005 => Some(Curve::P521),
            _ => None,
        }
    }

    pub fn from_nid(nid: Nid) -> Option<Self> {
        match nid {
            Nid::X9_62_PRIME256V1 => Some(Curve::P256),
            Nid::SECP384R1 => Some(Curve::P384),
            Nid::SECP521R1 => Some(Curve::P521),
            Nid::SECP256K1 => Some(Curve::Secp256k1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Ec2 { curve: Curve, x: Vec<u8>, y: Vec<u8> },
    Okp { curve: Curve, x: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// A credential public key with its declared COSE algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub algorithm: i64,
    pub material: KeyMaterial,
}

impl CoseKey {
    pub fn from_value(value: &CborValue) -> Result<Self> {
        if !value.is_map() {
            return Err(WebauthnError::syntax("COSE key must be a map"));
        }

        let kty = int_field(value, LABEL_KTY, "kty")?;
        let algorithm = int_field(value, LABEL_ALG, "alg")?;

        let material = match kty {
            KTY_EC2 => {
                let curve = curve_field(value)?;
                if curve.is_edwards() {
                    return Err(WebauthnError::syntax("EC2 key with an OKP curve"));
                }
                let x = bytes_field(value, LABEL_X, "x")?;
                let y = bytes_field(value, LABEL_Y, "y")?;
                let size = curve.coordinate_size();
                if x.len() != size || y.len() != size {
                    return Err(WebauthnError::syntax(format!(
                        "EC2 coordinates must be {size} bytes"
                    )));
                }
                KeyMaterial::Ec2 { curve, x, y }
            }
            KTY_OKP => {
                let curve = curve_field(value)?;
                if !curve.is_edwards() {
                    return Err(WebauthnError::syntax("OKP key with a Weierstrass curve"));
                }
                let x = bytes_field(value, LABEL_X, "x")?;
                if x.len() != curve.coordinate_size() {
                    return Err(WebauthnError::syntax("OKP public key has wrong length"));
                }
                KeyMaterial::Okp { curve, x }
            }
            KTY_RSA => KeyMaterial::Rsa {
                n: bytes_field(value, LABEL_N, "n")?,
                e: bytes_field(value, LABEL_E, "e")?,
            },
            other => {
                return Err(WebauthnError::UnsupportedFormat(format!(
                    "COSE key type {other}"
                )))
            }
        };

        Ok(Self {
            algorithm,
            material,
        })
    }

    /// Decode key bytes holding exactly one COSE_Key map.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(&decode_one(bytes)?)
    }

    /// Build an ES256 key from a raw uncompressed P-256 point (`0x04‖x‖y`).
    pub fn from_u2f_public_key(raw: &[u8]) -> Result<Self> {
        if !is_u2f_public_key(raw) {
            return Err(WebauthnError::syntax(
                "U2F public key must be a 65-byte uncompressed point",
            ));
        }
        Ok(Self {
            algorithm: CoseAlgorithm::ES256.id(),
            material: KeyMaterial::Ec2 {
                curve: Curve::P256,
                x: raw[1..33].to_vec(),
                y: raw[33..65].to_vec(),
            },
        })
    }

    /// Build a key from an OpenSSL public key, e.g. an attestation
    /// certificate's subject key.
    pub fn from_pkey(pkey: &PKeyRef<Public>, algorithm: i64) -> Result<Self> {
        let material = match pkey.id() {
            Id::EC => {
                let ec = pkey.ec_key()?;
                let curve = ec
                    .group()
                    .curve_name()
                    .and_then(Curve::from_nid)
                    .ok_or_else(|| WebauthnError::UnsupportedFormat("EC curve".into()))?;
                let (x, y) = affine_coordinates(ec.group(), ec.public_key(), curve)?;
                KeyMaterial::Ec2 { curve, x, y }
            }
            Id::RSA => {
                let rsa = pkey.rsa()?;
                KeyMaterial::Rsa {
                    n: rsa.n().to_vec(),
                    e: rsa.e().to_vec(),
                }
            }
            Id::ED25519 => KeyMaterial::Okp {
                curve: Curve::Ed25519,
                x: pkey.raw_public_key()?,
            },
            Id::ED448 => KeyMaterial::Okp {
                curve: Curve::Ed448,
                x: pkey.raw_public_key()?,
            },
            _ => return Err(WebauthnError::UnsupportedFormat("public key type".into())),
        };
        Ok(Self {
            algorithm,
            material,
        })
    }

    pub fn key_type(&self) -> i64 {
        match self.material {
            KeyMaterial::Okp { .. } => KTY_OKP,
            KeyMaterial::Ec2 { .. } => KTY_EC2,
            KeyMaterial::Rsa { .. } => KTY_RSA,
        }
    }

    pub fn to_pkey(&self) -> Result<PKey<Public>> {
        let pkey = match &self.material {
            KeyMaterial::Ec2 { curve, x, y } => {
                let nid = curve
                    .nid()
                    .ok_or_else(|| WebauthnError::UnsupportedFormat("EC2 curve".into()))?;
                let group = EcGroup::from_curve_name(nid)?;
                let x = BigNum::from_slice(x)?;
                let y = BigNum::from_slice(y)?;
                let ec = EcKey::from_public_key_affine_coordinates(&group, &x, &y)
                    .map_err(|_| WebauthnError::syntax("EC2 point is not on the curve"))?;
                PKey::from_ec_key(ec)?
            }
            KeyMaterial::Rsa { n, e } => {
                let rsa = Rsa::from_public_components(BigNum::from_slice(n)?, BigNum::from_slice(e)?)?;
                PKey::from_rsa(rsa)?
            }
            KeyMaterial::Okp { curve, x } => {
                let id = match curve {
                    Curve::Ed25519 => Id::ED25519,
                    _ => Id::ED448,
                };
                PKey::public_key_from_raw_bytes(x, id)?
            }
        };
        Ok(pkey)
    }

    /// Compare key material only, ignoring the declared algorithm.
    pub fn same_key(&self, other: &CoseKey) -> bool {
        match (&self.material, &other.material) {
            (KeyMaterial::Rsa { n: n1, e: e1 }, KeyMaterial::Rsa { n: n2, e: e2 }) => {
                strip_leading_zeros(n1) == strip_leading_zeros(n2)
                    && strip_leading_zeros(e1) == strip_leading_zeros(e2)
            }
            (a, b) => a == b,
        }
    }

    /// True when `pkey` holds the same public key as this COSE key.
    pub fn matches_pkey(&self, pkey: &PKeyRef<Public>) -> Result<bool> {
        Ok(self.to_pkey()?.public_eq(pkey))
    }

    /// Uncompressed point `0x04‖x‖y`, as used by the FIDO U2F signature base.
    pub fn uncompressed_point(&self) -> Option<Vec<u8>> {
        match &self.material {
            KeyMaterial::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    /// Canonical COSE_Key encoding.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let int = |v: i64| Value::Integer(Integer::from(v));
        let mut entries = vec![
            (int(LABEL_KTY), int(self.key_type())),
            (int(LABEL_ALG), int(self.algorithm)),
        ];
        match &self.material {
            KeyMaterial::Ec2 { curve, x, y } => {
                entries.push((int(LABEL_CRV), int(curve.id())));
                entries.push((int(LABEL_X), Value::Bytes(x.clone())));
                entries.push((int(LABEL_Y), Value::Bytes(y.clone())));
            }
            KeyMaterial::Okp { curve, x } => {
                entries.push((int(LABEL_CRV), int(curve.id())));
                entries.push((int(LABEL_X), Value::Bytes(x.clone())));
            }
            KeyMaterial::Rsa { n, e } => {
                entries.push((int(LABEL_N), Value::Bytes(n.clone())));
                entries.push((int(LABEL_E), Value::Bytes(e.clone())));
            }
        }

        let mut out = Vec::new();
        ciborium::ser::into_writer(&Value::Map(entries), &mut out)
            .map_err(|e| WebauthnError::syntax(format!("COSE key encoding failed: {e}")))?;
        Ok(out)
    }
}

pub fn is_u2f_public_key(raw: &[u8]) -> bool {
    raw.len() == U2F_PUBLIC_KEY_LEN && raw[0] == 0x04
}

/// Re-encode a stored legacy U2F key as a COSE ES256 key. COSE keys are
/// returned unchanged.
pub fn upgrade_legacy_key(stored: &[u8]) -> Result<Vec<u8>> {
    if is_u2f_public_key(stored) {
        CoseKey::from_u2f_public_key(stored)?.to_cbor()
    } else {
        Ok(stored.to_vec())
    }
}

fn affine_coordinates(
    group: &openssl::ec::EcGroupRef,
    point: &EcPointRef,
    curve: Curve,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut ctx = BigNumContext::new()?;
    let bytes = point.to_bytes(group, PointConversionForm::UNCOMPRESSED, &mut ctx)?;
    let size = curve.coordinate_size();
    if bytes.len() != 1 + 2 * size {
        return Err(WebauthnError::syntax("unexpected EC point length"));
    }
    Ok((bytes[1..1 + size].to_vec(), bytes[1 + size..].to_vec()))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn int_field(map: &CborValue, label: i64, name: &str) -> Result<i64> {
    map.get_int(label)
        .and_then(CborValue::as_i64)
        .ok_or_else(|| WebauthnError::syntax(format!("COSE key is missing integer {name}")))
}

fn bytes_field(map: &CborValue, label: i64, name: &str) -> Result<Vec<u8>> {
    map.get_int(label)
        .and_then(CborValue::as_bytes)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| WebauthnError::syntax(format!("COSE key is missing byte string {name}")))
}

fn curve_field(map: &CborValue) -> Result<Curve> {
    let id = int_field(map, LABEL_CRV, "crv")?;
    Curve::from_id(id).ok_or_else(|| WebauthnError::UnsupportedFormat(format!("COSE curve {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::EcKey;

    fn p256_key() -> (EcKey<openssl::pkey::Private>, CoseKey) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private = EcKey::generate(&group).unwrap();
        let public = PKey::from_ec_key(EcKey::from_public_key(&group, private.public_key()).unwrap())
            .unwrap();
        let cose = CoseKey::from_pkey(&public, CoseAlgorithm::ES256.id()).unwrap();
        (private, cose)
    }

    #[test]
    fn test_ec2_round_trip_through_cbor() {
        let (_, key) = p256_key();
        let encoded = key.to_cbor().unwrap();
        let decoded = CoseKey::from_slice(&encoded).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.key_type(), KTY_EC2);
        assert!(decoded.to_pkey().is_ok());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let (_, key) = p256_key();
        let mut encoded = key.to_cbor().unwrap();
        encoded.push(0x00);
        assert!(matches!(
            CoseKey::from_slice(&encoded),
            Err(WebauthnError::Syntax(_))
        ));
    }

    #[test]
    fn test_missing_fields_and_unknown_type() {
        let no_alg = CborValue::Map(vec![(CborValue::integer(1), CborValue::integer(2))]);
        assert!(matches!(
            CoseKey::from_value(&no_alg),
            Err(WebauthnError::Syntax(_))
        ));

        let symmetric = CborValue::Map(vec![
            (CborValue::integer(1), CborValue::integer(4)),
            (CborValue::integer(3), CborValue::integer(5)),
        ]);
        assert!(matches!(
            CoseKey::from_value(&symmetric),
            Err(WebauthnError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_wrong_coordinate_length() {
        let value = CborValue::Map(vec![
            (CborValue::integer(1), CborValue::integer(2)),
            (CborValue::integer(3), CborValue::integer(-7)),
            (CborValue::integer(-1), CborValue::integer(1)),
            (CborValue::integer(-2), CborValue::Bytes(vec![1; 31])),
            (CborValue::integer(-3), CborValue::Bytes(vec![1; 32])),
        ]);
        assert!(CoseKey::from_value(&value).is_err());
    }

    #[test]
    fn test_u2f_upgrade() {
        let (_, key) = p256_key();
        let raw = key.uncompressed_point().unwrap();
        assert!(is_u2f_public_key(&raw));

        let upgraded = upgrade_legacy_key(&raw).unwrap();
        assert_eq!(CoseKey::from_slice(&upgraded).unwrap(), key);

        let cose = key.to_cbor().unwrap();
        assert_eq!(upgrade_legacy_key(&cose).unwrap(), cose);
    }

    #[test]
    fn test_rsa_and_ed25519_from_pkey() {
        let rsa = Rsa::generate(2048).unwrap();
        let public = PKey::from_rsa(
            Rsa::from_public_components(rsa.n().to_owned().unwrap(), rsa.e().to_owned().unwrap())
                .unwrap(),
        )
        .unwrap();
        let key = CoseKey::from_pkey(&public, CoseAlgorithm::RS256.id()).unwrap();
        assert!(key.matches_pkey(&public).unwrap());

        let ed = PKey::generate_ed25519().unwrap();
        let ed_public = PKey::public_key_from_raw_bytes(&ed.raw_public_key().unwrap(), Id::ED25519)
            .unwrap();
        let key = CoseKey::from_pkey(&ed_public, CoseAlgorithm::EdDSA.id()).unwrap();
        assert_eq!(key.key_type(), KTY_OKP);
        assert!(key.matches_pkey(&ed_public).unwrap());
        assert!(!key.matches_pkey(&public).unwrap());
    }
}
