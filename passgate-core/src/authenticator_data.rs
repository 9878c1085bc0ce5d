//! Authenticator data (WebAuthn §6.1) parsing.

use tracing::debug;
use uuid::Uuid;

use crate::cbor::{ByteStream, CborValue, Decoder};
use crate::cose::CoseKey;
use crate::error::{Result, WebauthnError};

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_RFU1: u8 = 0x02;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_BE: u8 = 0x08;
pub const FLAG_BS: u8 = 0x10;
pub const FLAG_RFU2: u8 = 0x20;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

const RP_ID_HASH_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes exactly as they appeared in the authenticator data.
    pub credential_public_key: Vec<u8>,
}

impl AttestedCredentialData {
    pub fn public_key(&self) -> Result<CoseKey> {
        CoseKey::from_slice(&self.credential_public_key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    raw: Vec<u8>,
    rp_id_hash: [u8; RP_ID_HASH_LEN],
    flags: u8,
    sign_count: u32,
    attested_credential_data: Option<AttestedCredentialData>,
    extensions: Option<CborValue>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_with(bytes, &Decoder::default())
    }

    /// Parse with a caller-configured CBOR decoder. Every byte must be
    /// accounted for by the structures the flags announce.
    pub fn parse_with(bytes: &[u8], decoder: &Decoder) -> Result<Self> {
        let mut stream = ByteStream::new(bytes);
        let rp_id_hash = stream.read_array::<RP_ID_HASH_LEN>()?;
        let flags = stream.read_u8()?;
        let sign_count = stream.read_u32()?;

        let attested_credential_data = if flags & FLAG_AT != 0 {
            let aaguid = Uuid::from_bytes(stream.read_array::<16>()?);
            let id_len = stream.read_u16()? as usize;
            let credential_id = stream.read(id_len)?.to_vec();

            let key_start = stream.position();
            let key = decoder.decode(&mut stream)?;
            if !key.is_map() {
                return Err(WebauthnError::syntax("credential public key is not a map"));
            }
            let credential_public_key = stream.span(key_start, stream.position()).to_vec();

            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_public_key,
            })
        } else {
            None
        };

        let extensions = if flags & FLAG_ED != 0 {
            let value = decoder.decode(&mut stream)?;
            if !value.is_map() {
                return Err(WebauthnError::syntax("authenticator extensions are not a map"));
            }
            Some(value)
        } else {
            None
        };

        if !stream.is_eof() {
            return Err(WebauthnError::syntax(format!(
                "invalid authenticator data: {} extra bytes",
                stream.remaining()
            )));
        }

        debug!(
            flags = format_args!("0x{flags:02x}"),
            sign_count,
            attested = attested_credential_data.is_some(),
            extensions = extensions.is_some(),
            "Parsed authenticator data"
        );

        Ok(Self {
            raw: bytes.to_vec(),
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn rp_id_hash(&self) -> &[u8; RP_ID_HASH_LEN] {
        &self.rp_id_hash
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn is_user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn is_user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn is_backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    pub fn is_backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }

    pub fn has_attested_credential_data(&self) -> bool {
        self.flags & FLAG_AT != 0
    }

    pub fn has_extensions(&self) -> bool {
        self.flags & FLAG_ED != 0
    }

    pub fn reserved_flags(&self) -> u8 {
        self.flags & (FLAG_RFU1 | FLAG_RFU2)
    }

    pub fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.attested_credential_data.as_ref()
    }

    pub fn extensions(&self) -> Option<&CborValue> {
        self.extensions.as_ref()
    }

    /// Replace the AAGUID with the nil UUID. The raw bytes are left alone
    /// since they are the signed representation.
    pub fn anonymize_aaguid(&mut self) {
        if let Some(data) = self.attested_credential_data.as_mut() {
            data.aaguid = Uuid::nil();
        }
    }
}
