//! `android-safetynet` attestation (WebAuthn §8.5).
//!
//! The statement's `response` is a compact JWS produced by the SafetyNet
//! attestation API. Its header carries the signing chain, its payload the
//! nonce binding it to this registration.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::authenticator_data::AuthenticatorData;
use crate::base64url;
use crate::cbor::CborValue;
use crate::cose::CoseAlgorithm;
use crate::error::{Result, WebauthnError};

use super::certificate::{check_chain, CertificateDetails};
use super::{AttestationStatement, AttestationType, TrustPath};

const FMT: &str = "android-safetynet";
pub const SAFETYNET_HOSTNAME: &str = "attest.android.com";
pub const DEFAULT_LEEWAY_MS: i64 = 0;
pub const DEFAULT_MAX_AGE_MS: i64 = 60_000;

/// Result of an online check of a SafetyNet JWS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetVerdict {
    pub is_valid_signature: bool,
}

/// Second opinion on a SafetyNet response, usually Google's verify endpoint.
pub trait SafetyNetVerdictSource: Send + Sync {
    fn verify(&self, jws: &str) -> Result<SafetyNetVerdict>;
}

#[derive(Clone)]
pub struct SafetyNetAttestation {
    leeway_ms: i64,
    max_age_ms: i64,
    verdict_source: Option<Arc<dyn SafetyNetVerdictSource>>,
}

impl Default for SafetyNetAttestation {
    fn default() -> Self {
        Self {
            leeway_ms: DEFAULT_LEEWAY_MS,
            max_age_ms: DEFAULT_MAX_AGE_MS,
            verdict_source: None,
        }
    }
}

impl fmt::Debug for SafetyNetAttestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyNetAttestation")
            .field("leeway_ms", &self.leeway_ms)
            .field("max_age_ms", &self.max_age_ms)
            .field("verdict_source", &self.verdict_source.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
}

struct Jws<'a> {
    raw: &'a str,
    header: JwsHeader,
    payload: SafetyNetPayload,
    signing_input: &'a str,
    signature: Vec<u8>,
}

impl<'a> Jws<'a> {
    fn parse(raw: &'a str) -> Result<Self> {
        let mut parts = raw.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(WebauthnError::attestation(
                "SafetyNet response is not a compact JWS",
            ));
        };

        let header_json = base64url::decode(header)?;
        let payload_json = base64url::decode(payload)?;
        Ok(Self {
            raw,
            header: serde_json::from_slice(&header_json)?,
            payload: serde_json::from_slice(&payload_json)?,
            signing_input: &raw[..header.len() + 1 + payload.len()],
            signature: base64url::decode(signature)?,
        })
    }

    fn certificates(&self) -> Result<Vec<Vec<u8>>> {
        if self.header.x5c.is_empty() {
            return Err(WebauthnError::attestation("SafetyNet JWS header has no x5c"));
        }
        self.header
            .x5c
            .iter()
            .map(|c| base64url::decode_standard(c))
            .collect()
    }
}

fn response_text(att_stmt: &CborValue) -> Result<&str> {
    let response = att_stmt
        .get("response")
        .ok_or_else(|| WebauthnError::attestation("android-safetynet statement is missing \"response\""))?;
    if let Some(text) = response.as_text() {
        return Ok(text);
    }
    let bytes = response.as_bytes().ok_or_else(|| {
        WebauthnError::attestation("android-safetynet \"response\" must be bytes")
    })?;
    std::str::from_utf8(bytes)
        .map_err(|_| WebauthnError::attestation("android-safetynet \"response\" is not UTF-8"))
}

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt
        .get("ver")
        .and_then(CborValue::as_text)
        .map_or(true, str::is_empty)
    {
        return Err(WebauthnError::attestation(
            "android-safetynet statement is missing \"ver\"",
        ));
    }
    let certificates = Jws::parse(response_text(&att_stmt)?)?.certificates()?;

    Ok(AttestationStatement {
        fmt: FMT.to_string(),
        att_stmt,
        attestation_type: AttestationType::Basic,
        trust_path: TrustPath::CertificateChain { certificates },
    })
}

impl SafetyNetAttestation {
    /// Allowed clock skew for responses stamped in the future.
    pub fn with_leeway_ms(mut self, leeway_ms: i64) -> Self {
        self.leeway_ms = leeway_ms;
        self
    }

    pub fn with_max_age_ms(mut self, max_age_ms: i64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    pub fn with_verdict_source(mut self, source: Arc<dyn SafetyNetVerdictSource>) -> Self {
        self.verdict_source = Some(source);
        self
    }

    pub fn leeway_ms(&self) -> i64 {
        self.leeway_ms
    }

    pub fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }

    pub fn is_valid(
        &self,
        client_data_hash: &[u8; 32],
        statement: &AttestationStatement,
        auth_data: &AuthenticatorData,
    ) -> Result<bool> {
        let jws = Jws::parse(response_text(&statement.att_stmt)?)?;
        let certificates = statement.trust_path.certificates();
        let chain = check_chain(certificates)?;

        let details = CertificateDetails::from_der(&certificates[0])?;
        if details.common_name.as_deref() != Some(SAFETYNET_HOSTNAME) {
            return Err(WebauthnError::attestation(format!(
                "SafetyNet certificate is not issued to {SAFETYNET_HOSTNAME}"
            )));
        }

        let expected_nonce = base64url::encode_standard(
            Sha256::new()
                .chain_update(auth_data.raw())
                .chain_update(client_data_hash)
                .finalize(),
        );
        if jws.payload.nonce != expected_nonce {
            return Err(WebauthnError::attestation(
                "SafetyNet nonce does not match authData and clientDataHash",
            ));
        }
        if !jws.payload.cts_profile_match {
            return Err(WebauthnError::attestation(
                "SafetyNet reports ctsProfileMatch = false",
            ));
        }
        self.check_timestamp(jws.payload.timestamp_ms)?;

        let alg = CoseAlgorithm::from_jose_name(&jws.header.alg).ok_or_else(|| {
            WebauthnError::UnsupportedFormat(format!("JWS algorithm {}", jws.header.alg))
        })?;
        if !alg.verify(jws.signing_input.as_bytes(), &*chain[0].public_key()?, &jws.signature)? {
            debug!("SafetyNet JWS signature did not verify");
            return Ok(false);
        }

        if let Some(source) = &self.verdict_source {
            let verdict = source.verify(jws.raw)?;
            if !verdict.is_valid_signature {
                warn!("SafetyNet verdict source rejected the response");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_timestamp(&self, timestamp_ms: i64) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        if timestamp_ms > now + self.leeway_ms {
            return Err(WebauthnError::attestation(
                "SafetyNet response is stamped in the future",
            ));
        }
        if now - timestamp_ms > self.max_age_ms {
            return Err(WebauthnError::attestation(format!(
                "SafetyNet response is older than {} ms",
                self.max_age_ms
            )));
        }
        Ok(())
    }
}
