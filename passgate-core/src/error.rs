use thiserror::Error;

use crate::cbor::CborError;
use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum WebauthnError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unsupported: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid client data type: expected {expected}, got {actual}")]
    ClientDataTypeMismatch { expected: String, actual: String },

    #[error("Challenge mismatch")]
    ChallengeMismatch,

    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    #[error("RP ID mismatch: {0}")]
    RpIdMismatch(String),

    #[error("Token binding error: {0}")]
    TokenBinding(String),

    #[error("User presence or verification failed: {0}")]
    PresenceOrVerification(String),

    #[error("Extension policy violation: {0}")]
    ExtensionPolicyViolation(String),

    #[error("Invalid attestation: {0}")]
    AttestationInvalid(String),

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Signature counter replay suspected: stored={stored}, presented={presented}")]
    CounterReplaySuspected { stored: u32, presented: u32 },

    #[error("Credential already registered")]
    DuplicateCredential,

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("User handle mismatch: {0}")]
    UserHandleMismatch(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl WebauthnError {
    /// Stable machine-readable identifier for the failure kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            WebauthnError::Syntax(_) => "SYNTAX_ERROR",
            WebauthnError::UnsupportedFormat(_) => "UNSUPPORTED",
            WebauthnError::ClientDataTypeMismatch { .. } => "CLIENT_DATA_TYPE_MISMATCH",
            WebauthnError::ChallengeMismatch => "CHALLENGE_MISMATCH",
            WebauthnError::OriginMismatch(_) => "ORIGIN_MISMATCH",
            WebauthnError::RpIdMismatch(_) => "RP_ID_MISMATCH",
            WebauthnError::TokenBinding(_) => "TOKEN_BINDING",
            WebauthnError::PresenceOrVerification(_) => "USER_PRESENCE_OR_VERIFICATION",
            WebauthnError::ExtensionPolicyViolation(_) => "EXTENSION_POLICY_VIOLATION",
            WebauthnError::AttestationInvalid(_) => "ATTESTATION_INVALID",
            WebauthnError::SignatureInvalid(_) => "SIGNATURE_INVALID",
            WebauthnError::CounterReplaySuspected { .. } => "COUNTER_REPLAY_SUSPECTED",
            WebauthnError::DuplicateCredential => "DUPLICATE_CREDENTIAL",
            WebauthnError::UnknownCredential => "UNKNOWN_CREDENTIAL",
            WebauthnError::UserHandleMismatch(_) => "USER_HANDLE_MISMATCH",
            WebauthnError::InvalidOptions(_) => "INVALID_OPTIONS",
            WebauthnError::Repository(_) => "REPOSITORY_ERROR",
        }
    }

    /// True for failures caused by malformed or unsupported input rather than
    /// a failed security check.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            WebauthnError::Syntax(_) | WebauthnError::UnsupportedFormat(_)
        )
    }

    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        WebauthnError::Syntax(msg.into())
    }

    pub(crate) fn attestation(msg: impl Into<String>) -> Self {
        WebauthnError::AttestationInvalid(msg.into())
    }
}

impl From<CborError> for WebauthnError {
    fn from(err: CborError) -> Self {
        WebauthnError::Syntax(err.to_string())
    }
}

impl From<serde_json::Error> for WebauthnError {
    fn from(err: serde_json::Error) -> Self {
        WebauthnError::Syntax(format!("invalid JSON: {err}"))
    }
}

impl From<openssl::error::ErrorStack> for WebauthnError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        WebauthnError::AttestationInvalid(format!("crypto backend: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, WebauthnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            WebauthnError::Syntax("x".into()),
            WebauthnError::UnsupportedFormat("x".into()),
            WebauthnError::ChallengeMismatch,
            WebauthnError::DuplicateCredential,
            WebauthnError::CounterReplaySuspected {
                stored: 5,
                presented: 5,
            },
        ];
        let codes: std::collections::HashSet<_> =
            errors.iter().map(WebauthnError::error_code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_cbor_error_maps_to_syntax() {
        let err: WebauthnError = CborError::UnexpectedBreak.into();
        assert!(matches!(err, WebauthnError::Syntax(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_counter_message_includes_values() {
        let err = WebauthnError::CounterReplaySuspected {
            stored: 7,
            presented: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("stored=7"));
        assert!(msg.contains("presented=3"));
    }
}
