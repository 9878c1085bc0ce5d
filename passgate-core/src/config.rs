//! Relying Party configuration
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::str::FromStr;

use crate::counter::CounterPolicy;
use crate::options::{
    AttestationConveyance, UserVerificationRequirement, DEFAULT_CHALLENGE_LENGTH,
    MIN_CHALLENGE_LENGTH,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Relying Party configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct RelyingPartyConfig {
    /// Relying Party ID (default: localhost)
    pub rp_id: String,
    /// Human-readable RP name (default: passgate)
    pub rp_name: String,
    /// RP IDs allowed to use plain http origins (default: localhost)
    pub secured_rp_ids: Vec<String>,
    /// Challenge size in bytes (default: 32, minimum 16)
    pub challenge_length: usize,
    /// Ceremony timeout hint sent to the browser in ms (default: 60000)
    pub timeout_ms: u64,
    pub attestation: AttestationConveyance,
    pub user_verification: UserVerificationRequirement,
    pub counter_policy: CounterPolicy,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "passgate".to_string(),
            secured_rp_ids: vec!["localhost".to_string()],
            challenge_length: DEFAULT_CHALLENGE_LENGTH,
            timeout_ms: 60_000,
            attestation: AttestationConveyance::None,
            user_verification: UserVerificationRequirement::Preferred,
            counter_policy: CounterPolicy::Strict,
        }
    }
}

impl RelyingPartyConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WEBAUTHN_RP_ID`, `WEBAUTHN_RP_NAME`
    /// - `WEBAUTHN_SECURED_RP_IDS` - comma-separated
    /// - `WEBAUTHN_CHALLENGE_LENGTH`, `WEBAUTHN_TIMEOUT_MS`
    /// - `WEBAUTHN_ATTESTATION` - none, indirect, direct or enterprise
    /// - `WEBAUTHN_USER_VERIFICATION` - required, preferred or discouraged
    /// - `WEBAUTHN_COUNTER_POLICY` - strict or lenient
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let rp_id = lookup("WEBAUTHN_RP_ID").unwrap_or(defaults.rp_id);
        let rp_name = lookup("WEBAUTHN_RP_NAME").unwrap_or(defaults.rp_name);

        let secured_rp_ids = lookup("WEBAUTHN_SECURED_RP_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.secured_rp_ids);

        let challenge_length: usize = parse(&lookup, "WEBAUTHN_CHALLENGE_LENGTH", |v| {
            v.parse::<usize>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.challenge_length);
        if challenge_length < MIN_CHALLENGE_LENGTH {
            return Err(ConfigError::InvalidValue {
                name: "WEBAUTHN_CHALLENGE_LENGTH",
                reason: format!("must be at least {MIN_CHALLENGE_LENGTH}"),
            });
        }

        let timeout_ms = parse(&lookup, "WEBAUTHN_TIMEOUT_MS", |v| {
            v.parse::<u64>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.timeout_ms);

        let attestation = parse(&lookup, "WEBAUTHN_ATTESTATION", |v| {
            match v.to_ascii_lowercase().as_str() {
                "none" => Ok(AttestationConveyance::None),
                "indirect" => Ok(AttestationConveyance::Indirect),
                "direct" => Ok(AttestationConveyance::Direct),
                "enterprise" => Ok(AttestationConveyance::Enterprise),
                other => Err(format!("unknown conveyance \"{other}\"")),
            }
        })?
        .unwrap_or(defaults.attestation);

        let user_verification = parse(&lookup, "WEBAUTHN_USER_VERIFICATION", |v| {
            match v.to_ascii_lowercase().as_str() {
                "required" => Ok(UserVerificationRequirement::Required),
                "preferred" => Ok(UserVerificationRequirement::Preferred),
                "discouraged" => Ok(UserVerificationRequirement::Discouraged),
                other => Err(format!("unknown requirement \"{other}\"")),
            }
        })?
        .unwrap_or(defaults.user_verification);

        let counter_policy = parse(&lookup, "WEBAUTHN_COUNTER_POLICY", CounterPolicy::from_str)?
            .unwrap_or(defaults.counter_policy);

        Ok(Self {
            rp_id,
            rp_name,
            secured_rp_ids,
            challenge_length,
            timeout_ms,
            attestation,
            user_verification,
            counter_policy,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    convert: impl Fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| convert(value.trim()))
        .transpose()
        .map_err(|reason| ConfigError::InvalidValue { name, reason })
}
