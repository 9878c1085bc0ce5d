//! Signature counter policies (WebAuthn §6.1.1).

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, WebauthnError};
use crate::source::PublicKeyCredentialSource;

/// Decides what happens when an assertion's counter does not move forward.
/// Not consulted when both the stored and presented counters are zero.
pub trait CounterChecker: Send + Sync {
    fn check(&self, source: &PublicKeyCredentialSource, presented: u32) -> Result<()>;
}

/// Rejects any counter that is not strictly greater than the stored one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictCounterChecker;

impl CounterChecker for StrictCounterChecker {
    fn check(&self, source: &PublicKeyCredentialSource, presented: u32) -> Result<()> {
        if presented <= source.counter {
            return Err(WebauthnError::CounterReplaySuspected {
                stored: source.counter,
                presented,
            });
        }
        Ok(())
    }
}

/// Logs a non-increasing counter and accepts the assertion anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientCounterChecker;

impl CounterChecker for LenientCounterChecker {
    fn check(&self, source: &PublicKeyCredentialSource, presented: u32) -> Result<()> {
        if presented <= source.counter {
            warn!(
                credential_id = %source.credential_id_base64url(),
                stored = source.counter,
                presented,
                "Signature counter did not increase; accepting under lenient policy"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterPolicy {
    #[default]
    Strict,
    Lenient,
}

impl CounterPolicy {
    pub fn checker(self) -> Arc<dyn CounterChecker> {
        match self {
            CounterPolicy::Strict => Arc::new(StrictCounterChecker),
            CounterPolicy::Lenient => Arc::new(LenientCounterChecker),
        }
    }
}

impl FromStr for CounterPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(CounterPolicy::Strict),
            "lenient" => Ok(CounterPolicy::Lenient),
            other => Err(format!("unknown counter policy \"{other}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{AttestationType, TrustPath};
    use uuid::Uuid;

    fn source(counter: u32) -> PublicKeyCredentialSource {
        PublicKeyCredentialSource {
            credential_id: vec![1],
            ty: "public-key".into(),
            transports: vec![],
            attestation_type: AttestationType::None,
            trust_path: TrustPath::Empty,
            aaguid: Uuid::nil(),
            credential_public_key: vec![],
            user_handle: vec![],
            counter,
            other_ui: None,
        }
    }

    #[test]
    fn test_strict_checker() {
        let checker = StrictCounterChecker;
        assert!(checker.check(&source(5), 6).is_ok());
        assert!(matches!(
            checker.check(&source(5), 5),
            Err(WebauthnError::CounterReplaySuspected {
                stored: 5,
                presented: 5
            })
        ));
        assert!(checker.check(&source(5), 4).is_err());
    }

    #[test]
    fn test_lenient_checker_accepts() {
        assert!(LenientCounterChecker.check(&source(5), 5).is_ok());
        assert!(LenientCounterChecker.check(&source(5), 1).is_ok());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("strict".parse::<CounterPolicy>().unwrap(), CounterPolicy::Strict);
        assert_eq!("LENIENT".parse::<CounterPolicy>().unwrap(), CounterPolicy::Lenient);
        assert!("sometimes".parse::<CounterPolicy>().is_err());
    }
}
