//! Shared helpers: a software authenticator that produces registration and
//! assertion responses in the browser's JSON shape.

#![allow(dead_code)]

use ciborium::value::Value;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use passgate_core::base64url;
use passgate_core::CoseKey;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_AT: u8 = 0x40;

/// Route library logs through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("passgate_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub struct SoftAuthenticator {
    pub key: PKey<Private>,
    pub credential_id: Vec<u8>,
    pub cose_key: Vec<u8>,
    pub aaguid: Uuid,
}

impl SoftAuthenticator {
    pub fn new(credential_id: &[u8]) -> Self {
        init_tracing();
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let public = PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap();
        let cose_key = CoseKey::from_pkey(&public, -7).unwrap().to_cbor().unwrap();
        Self {
            key,
            credential_id: credential_id.to_vec(),
            cose_key,
            aaguid: Uuid::nil(),
        }
    }

    pub fn with_aaguid(mut self, aaguid: Uuid) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    /// Authenticator data carrying this credential.
    pub fn attested_auth_data(&self, rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
        let mut out = auth_data(rp_id, flags | FLAG_AT, counter);
        out.extend_from_slice(self.aaguid.as_bytes());
        out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&self.cose_key);
        out
    }

    /// Registration response with a `none` attestation statement.
    pub fn register(&self, challenge: &[u8], origin: &str, rp_id: &str) -> String {
        let auth_data = self.attested_auth_data(rp_id, FLAG_UP | FLAG_UV, 0);
        let object = attestation_object("none", Value::Map(vec![]), &auth_data);
        self.registration_json(&client_data("webauthn.create", challenge, origin), &object)
    }

    /// Registration response with a `packed` self attestation.
    pub fn register_packed_self(&self, challenge: &[u8], origin: &str, rp_id: &str) -> String {
        let auth_data = self.attested_auth_data(rp_id, FLAG_UP | FLAG_UV, 1);
        let client_data = client_data("webauthn.create", challenge, origin);
        let mut signed = auth_data.clone();
        signed.extend_from_slice(&sha256(&client_data));
        let att_stmt = Value::Map(vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(self.sign(&signed))),
        ]);
        let object = attestation_object("packed", att_stmt, &auth_data);
        self.registration_json(&client_data, &object)
    }

    pub fn registration_json(&self, client_data: &[u8], attestation_object: &[u8]) -> String {
        json!({
            "id": base64url::encode(&self.credential_id),
            "rawId": base64url::encode(&self.credential_id),
            "type": "public-key",
            "response": {
                "clientDataJSON": base64url::encode(client_data),
                "attestationObject": base64url::encode(attestation_object),
                "transports": ["usb"],
            },
        })
        .to_string()
    }

    pub fn assert(
        &self,
        challenge: &[u8],
        origin: &str,
        rp_id: &str,
        counter: u32,
        user_handle: Option<&[u8]>,
    ) -> String {
        let auth_data = auth_data(rp_id, FLAG_UP | FLAG_UV, counter);
        self.assertion_json(&auth_data, &client_data("webauthn.get", challenge, origin), user_handle)
    }

    pub fn assertion_json(
        &self,
        auth_data: &[u8],
        client_data: &[u8],
        user_handle: Option<&[u8]>,
    ) -> String {
        let mut signed = auth_data.to_vec();
        signed.extend_from_slice(&sha256(client_data));
        json!({
            "id": base64url::encode(&self.credential_id),
            "rawId": base64url::encode(&self.credential_id),
            "type": "public-key",
            "response": {
                "clientDataJSON": base64url::encode(client_data),
                "authenticatorData": base64url::encode(auth_data),
                "signature": base64url::encode(self.sign(&signed)),
                "userHandle": user_handle.map(base64url::encode),
            },
        })
        .to_string()
    }
}

pub fn auth_data(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
    let mut out = sha256(rp_id.as_bytes()).to_vec();
    out.push(flags);
    out.extend_from_slice(&counter.to_be_bytes());
    out
}

pub fn client_data(ty: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    json!({
        "type": ty,
        "challenge": base64url::encode(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

pub fn attestation_object(fmt: &str, att_stmt: Value, auth_data: &[u8]) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), att_stmt),
        (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
    ]);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&map, &mut out).unwrap();
    out
}
