//! COSE keys and signature algorithms.

mod algorithm;
mod key;

pub use algorithm::{ecdsa_der_signature, AlgorithmManager, CoseAlgorithm};
pub use key::{
    is_u2f_public_key, upgrade_legacy_key, CoseKey, Curve, KeyMaterial, KTY_EC2, KTY_OKP,
    KTY_RSA, U2F_PUBLIC_KEY_LEN,
};
