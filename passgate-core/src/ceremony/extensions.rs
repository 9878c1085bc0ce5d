use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cbor::CborValue;
use crate::error::{Result, WebauthnError};
use crate::options::AuthenticationExtensions;

/// Inspects extension outputs after the authenticator data has been
/// checked. `authenticator_outputs` is the ED map from the authenticator
/// data, if any.
pub trait ExtensionOutputChecker: Send + Sync {
    fn check(
        &self,
        inputs: &AuthenticationExtensions,
        client_outputs: &Map<String, Value>,
        authenticator_outputs: Option<&CborValue>,
    ) -> Result<()>;
}

/// A client may only report using the AppID if one was requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppIdExtensionChecker;

impl ExtensionOutputChecker for AppIdExtensionChecker {
    fn check(
        &self,
        inputs: &AuthenticationExtensions,
        client_outputs: &Map<String, Value>,
        _authenticator_outputs: Option<&CborValue>,
    ) -> Result<()> {
        match client_outputs.get("appid") {
            None => Ok(()),
            Some(Value::Bool(false)) => Ok(()),
            Some(Value::Bool(true)) if inputs.get("appid").is_some_and(Value::is_string) => Ok(()),
            Some(Value::Bool(true)) => Err(WebauthnError::ExtensionPolicyViolation(
                "client used the appid extension without it being requested".into(),
            )),
            Some(_) => Err(WebauthnError::ExtensionPolicyViolation(
                "appid output must be a boolean".into(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct ExtensionOutputCheckers {
    checkers: Vec<Arc<dyn ExtensionOutputChecker>>,
}

impl Default for ExtensionOutputCheckers {
    fn default() -> Self {
        Self::empty().with(AppIdExtensionChecker)
    }
}

impl ExtensionOutputCheckers {
    pub fn empty() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    pub fn with(mut self, checker: impl ExtensionOutputChecker + 'static) -> Self {
        self.checkers.push(Arc::new(checker));
        self
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    pub fn check(
        &self,
        inputs: &AuthenticationExtensions,
        client_outputs: &Map<String, Value>,
        authenticator_outputs: Option<&CborValue>,
    ) -> Result<()> {
        self.checkers
            .iter()
            .try_for_each(|c| c.check(inputs, client_outputs, authenticator_outputs))
    }
}

impl fmt::Debug for ExtensionOutputCheckers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionOutputCheckers")
            .field("checkers", &self.checkers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RejectAll;

    impl ExtensionOutputChecker for RejectAll {
        fn check(
            &self,
            _: &AuthenticationExtensions,
            _: &Map<String, Value>,
            _: Option<&CborValue>,
        ) -> Result<()> {
            Err(WebauthnError::ExtensionPolicyViolation("nope".into()))
        }
    }

    #[test]
    fn test_appid_requires_request() {
        let mut outputs = Map::new();
        outputs.insert("appid".into(), json!(true));
        let requested = AuthenticationExtensions::default().with("appid", json!("https://example.com"));

        assert!(AppIdExtensionChecker.check(&requested, &outputs, None).is_ok());
        assert!(matches!(
            AppIdExtensionChecker.check(&AuthenticationExtensions::default(), &outputs, None),
            Err(WebauthnError::ExtensionPolicyViolation(_))
        ));
    }

    #[test]
    fn test_checkers_run_in_order() {
        let checkers = ExtensionOutputCheckers::default();
        assert_eq!(checkers.len(), 1);
        assert!(checkers
            .check(&AuthenticationExtensions::default(), &Map::new(), None)
            .is_ok());

        let checkers = checkers.with(RejectAll);
        assert!(checkers
            .check(&AuthenticationExtensions::default(), &Map::new(), None)
            .is_err());
    }
}
