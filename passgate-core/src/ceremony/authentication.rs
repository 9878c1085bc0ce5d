use std::sync::Arc;

use tracing::debug;

use crate::client_data::TYPE_GET;
use crate::cose::AlgorithmManager;
use crate::counter::{CounterChecker, StrictCounterChecker};
use crate::credential::{AuthenticatorResponse, PublicKeyCredential};
use crate::error::{Result, WebauthnError};
use crate::options::PublicKeyCredentialRequestOptions;
use crate::repository::PublicKeyCredentialSourceRepository;
use crate::request::ServerRequest;
use crate::source::PublicKeyCredentialSource;

use super::{
    check_challenge, check_client_data_type, check_origin, check_rp_id_hash, check_user_flags,
    passed, resolve_rp_id, CeremonyPolicy, Facet,
};

const CEREMONY: &str = "authentication";

/// Verifies an assertion against a registered credential (WebAuthn §7.2)
/// and records the new signature counter.
pub struct AuthenticationValidator {
    algorithms: AlgorithmManager,
    repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    policy: CeremonyPolicy,
    counter_checker: Arc<dyn CounterChecker>,
}

impl AuthenticationValidator {
    pub fn new(
        algorithms: AlgorithmManager,
        repository: Arc<dyn PublicKeyCredentialSourceRepository>,
        policy: CeremonyPolicy,
    ) -> Self {
        Self {
            algorithms,
            repository,
            policy,
            counter_checker: Arc::new(StrictCounterChecker),
        }
    }

    pub fn with_counter_checker(mut self, checker: Arc<dyn CounterChecker>) -> Self {
        self.counter_checker = checker;
        self
    }

    /// `user_handle` is the account the host identified before the
    /// ceremony started, if any; without it the assertion must carry one.
    pub fn check(
        &self,
        credential: &PublicKeyCredential,
        options: &PublicKeyCredentialRequestOptions,
        request: &dyn ServerRequest,
        user_handle: Option<&[u8]>,
    ) -> Result<PublicKeyCredentialSource> {
        let AuthenticatorResponse::Assertion {
            client_data,
            auth_data,
            signature,
            user_handle: response_user_handle,
        } = &credential.response
        else {
            return Err(WebauthnError::syntax("expected an assertion response"));
        };

        if !options.allow_credentials.is_empty()
            && !options
                .allow_credentials
                .iter()
                .any(|descriptor| descriptor.id == credential.raw_id)
        {
            return Err(WebauthnError::UnknownCredential);
        }
        passed(CEREMONY, "allow_list");

        let mut source = self
            .repository
            .find_by_credential_id(&credential.raw_id)?
            .ok_or(WebauthnError::UnknownCredential)?;
        passed(CEREMONY, "lookup");

        check_user_handle(&source, user_handle, response_user_handle.as_deref())?;
        passed(CEREMONY, "user_handle");

        let is_legacy_u2f = source.is_legacy_u2f();
        let public_key = source.public_key()?;

        check_client_data_type(client_data, TYPE_GET)?;
        check_challenge(client_data, &options.challenge)?;
        passed(CEREMONY, "challenge");

        let rp_id = resolve_rp_id(options.rp_id.as_deref(), request)?;
        let facet = Facet::resolve(&rp_id, &options.extensions, &credential.client_extension_results);
        check_origin(client_data.origin(), &facet, &self.policy)?;
        passed(CEREMONY, "origin");

        self.policy
            .token_binding
            .check(client_data.token_binding(), request)?;
        passed(CEREMONY, "token_binding");

        // Migrated U2F registrations were scoped to the full origin.
        let hashed = if is_legacy_u2f {
            client_data.origin()
        } else {
            facet.id.as_str()
        };
        check_rp_id_hash(auth_data, hashed)?;
        passed(CEREMONY, "rp_id_hash");

        check_user_flags(auth_data, options.user_verification)?;
        passed(CEREMONY, "user_flags");

        self.policy.extension_checkers.check(
            &options.extensions,
            &credential.client_extension_results,
            auth_data.extensions(),
        )?;
        passed(CEREMONY, "extensions");

        let client_data_hash = client_data.hash();
        let mut signed = auth_data.raw().to_vec();
        signed.extend_from_slice(&client_data_hash);
        if !self.algorithms.verify_with_key(&public_key, &signed, signature)? {
            return Err(WebauthnError::SignatureInvalid(
                "assertion signature did not verify".into(),
            ));
        }
        passed(CEREMONY, "signature");

        let presented = auth_data.sign_count();
        if source.counter != 0 || presented != 0 {
            self.counter_checker.check(&source, presented)?;
        }
        source.counter = source.counter.max(presented);
        self.repository.save(&source)?;

        debug!(
            credential_id = %source.credential_id_base64url(),
            counter = source.counter,
            "Authentication verified"
        );
        Ok(source)
    }
}

fn check_user_handle(
    source: &PublicKeyCredentialSource,
    expected: Option<&[u8]>,
    returned: Option<&[u8]>,
) -> Result<()> {
    match expected {
        Some(expected) => {
            if source.user_handle != expected {
                return Err(WebauthnError::UserHandleMismatch(
                    "credential belongs to another user".into(),
                ));
            }
            if returned.is_some_and(|returned| returned != source.user_handle) {
                return Err(WebauthnError::UserHandleMismatch(
                    "authenticator returned another user handle".into(),
                ));
            }
        }
        None => {
            let returned = returned.ok_or_else(|| {
                WebauthnError::UserHandleMismatch("user handle is mandatory".into())
            })?;
            if returned != source.user_handle {
                return Err(WebauthnError::UserHandleMismatch(
                    "authenticator returned another user handle".into(),
                ));
            }
        }
    }
    Ok(())
}

impl std::fmt::Debug for AuthenticationValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationValidator")
            .field("algorithms", &self.algorithms)
            .field("policy", &self.policy)
            .finish()
    }
}
