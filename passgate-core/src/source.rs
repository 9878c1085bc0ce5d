//! The stored form of a registered credential.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attestation::{AttestationType, TrustPath};
use crate::base64url;
use crate::cose::{upgrade_legacy_key, CoseKey};
use crate::error::Result;
use crate::metadata::AuthenticatorDescription;
use crate::options::{PublicKeyCredentialDescriptor, CREDENTIAL_TYPE_PUBLIC_KEY};

/// Everything the relying party keeps about a credential. Serializes to a
/// flat JSON object (binary fields base64url) that hosts can store as a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialSource {
    #[serde(with = "base64url::bytes")]
    pub credential_id: Vec<u8>,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub transports: Vec<String>,
    pub attestation_type: AttestationType,
    pub trust_path: TrustPath,
    pub aaguid: Uuid,
    /// COSE_Key bytes, or a raw 65-byte point for credentials migrated from
    /// a U2F deployment.
    #[serde(with = "base64url::bytes")]
    pub credential_public_key: Vec<u8>,
    #[serde(with = "base64url::bytes")]
    pub user_handle: Vec<u8>,
    pub counter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_ui: Option<AuthenticatorDescription>,
}

impl PublicKeyCredentialSource {
    pub fn descriptor(&self) -> PublicKeyCredentialDescriptor {
        PublicKeyCredentialDescriptor {
            ty: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
            id: self.credential_id.clone(),
            transports: self.transports.clone(),
        }
    }

    /// The stored key as COSE, upgrading a legacy U2F point on the fly.
    pub fn public_key(&self) -> Result<CoseKey> {
        CoseKey::from_slice(&upgrade_legacy_key(&self.credential_public_key)?)
    }

    pub fn is_legacy_u2f(&self) -> bool {
        crate::cose::is_u2f_public_key(&self.credential_public_key)
    }

    pub fn credential_id_base64url(&self) -> String {
        base64url::encode(&self.credential_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::EcCredential;

    fn source(public_key: Vec<u8>) -> PublicKeyCredentialSource {
        PublicKeyCredentialSource {
            credential_id: vec![1, 2, 3],
            ty: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
            transports: vec!["usb".into()],
            attestation_type: AttestationType::None,
            trust_path: TrustPath::Empty,
            aaguid: Uuid::nil(),
            credential_public_key: public_key,
            user_handle: b"user-1".to_vec(),
            counter: 7,
            other_ui: None,
        }
    }

    #[test]
    fn test_json_row_shape() {
        let credential = EcCredential::generate();
        let source = source(credential.cose_bytes.clone());
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["credentialId"], "AQID");
        assert_eq!(json["type"], "public-key");
        assert_eq!(json["attestationType"], "none");
        assert_eq!(json["trustPath"]["type"], "empty");
        assert_eq!(json["aaguid"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["counter"], 7);
        assert!(json.get("otherUi").is_none());

        let back: PublicKeyCredentialSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
        assert_eq!(back.public_key().unwrap(), credential.cose_key);
    }

    #[test]
    fn test_legacy_key_is_upgraded() {
        let credential = EcCredential::generate();
        let point = credential.cose_key.uncompressed_point().unwrap();
        let source = source(point);
        assert!(source.is_legacy_u2f());
        assert!(source.public_key().unwrap().same_key(&credential.cose_key));
    }

    #[test]
    fn test_descriptor() {
        let descriptor = source(vec![]).descriptor();
        assert_eq!(descriptor.id, vec![1, 2, 3]);
        assert_eq!(descriptor.transports, vec!["usb".to_string()]);
    }
}
