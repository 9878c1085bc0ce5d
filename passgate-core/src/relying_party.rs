//! Relying-party facade wiring configuration, loaders and both validators.

use std::sync::Arc;

use tracing::{debug, info};

use crate::attestation::{AttestationFormatRegistry, AttestationObjectLoader};
use crate::cbor::Decoder;
use crate::ceremony::{
    AuthenticationValidator, CeremonyPolicy, ExtensionOutputCheckers, RegistrationValidator,
    TokenBindingPolicy,
};
use crate::config::RelyingPartyConfig;
use crate::counter::CounterChecker;
use crate::credential::{PublicKeyCredential, PublicKeyCredentialLoader};
use crate::error::Result;
use crate::metadata::MetadataStatusCheck;
use crate::options::{
    generate_challenge, AuthenticatorSelectionCriteria, PublicKeyCredentialCreationOptions,
    PublicKeyCredentialParameters, PublicKeyCredentialRequestOptions, PublicKeyCredentialRpEntity,
    PublicKeyCredentialUserEntity,
};
use crate::repository::PublicKeyCredentialSourceRepository;
use crate::request::ServerRequest;
use crate::source::PublicKeyCredentialSource;

pub struct RelyingPartyBuilder {
    config: RelyingPartyConfig,
    repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    decoder: Decoder,
    registry: AttestationFormatRegistry,
    counter_checker: Option<Arc<dyn CounterChecker>>,
    token_binding: TokenBindingPolicy,
    extension_checkers: ExtensionOutputCheckers,
    metadata: Option<Arc<dyn MetadataStatusCheck>>,
}

impl RelyingPartyBuilder {
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_registry(mut self, registry: AttestationFormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides the checker selected by the configured counter policy.
    pub fn with_counter_checker(mut self, checker: Arc<dyn CounterChecker>) -> Self {
        self.counter_checker = Some(checker);
        self
    }

    pub fn with_token_binding(mut self, policy: TokenBindingPolicy) -> Self {
        self.token_binding = policy;
        self
    }

    pub fn with_extension_checkers(mut self, checkers: ExtensionOutputCheckers) -> Self {
        self.extension_checkers = checkers;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStatusCheck>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> RelyingParty {
        let policy = CeremonyPolicy::default()
            .with_secured_rp_ids(self.config.secured_rp_ids.clone())
            .with_token_binding(self.token_binding)
            .with_extension_checkers(self.extension_checkers);

        let counter_checker = self
            .counter_checker
            .unwrap_or_else(|| self.config.counter_policy.checker());

        let mut registration = RegistrationValidator::new(
            self.registry.clone(),
            Arc::clone(&self.repository),
            policy.clone(),
        );
        if let Some(metadata) = self.metadata {
            registration = registration.with_metadata(metadata);
        }

        let authentication = AuthenticationValidator::new(
            self.registry.algorithms().clone(),
            Arc::clone(&self.repository),
            policy,
        )
        .with_counter_checker(counter_checker);

        info!(
            rp_id = %self.config.rp_id,
            formats = ?self.registry.names(),
            counter_policy = ?self.config.counter_policy,
            "Relying party ready"
        );

        RelyingParty {
            credential_loader: PublicKeyCredentialLoader::new(AttestationObjectLoader::new(
                self.decoder,
                self.registry,
            )),
            config: self.config,
            repository: self.repository,
            registration,
            authentication,
        }
    }
}

/// One relying party: issues ceremony options and verifies the responses.
pub struct RelyingParty {
    config: RelyingPartyConfig,
    repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    credential_loader: PublicKeyCredentialLoader,
    registration: RegistrationValidator,
    authentication: AuthenticationValidator,
}

impl RelyingParty {
    pub fn builder(
        config: RelyingPartyConfig,
        repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    ) -> RelyingPartyBuilder {
        RelyingPartyBuilder {
            config,
            repository,
            decoder: Decoder::default(),
            registry: AttestationFormatRegistry::default(),
            counter_checker: None,
            token_binding: TokenBindingPolicy::default(),
            extension_checkers: ExtensionOutputCheckers::default(),
            metadata: None,
        }
    }

    pub fn new(
        config: RelyingPartyConfig,
        repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    ) -> Self {
        Self::builder(config, repository).build()
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn PublicKeyCredentialSourceRepository> {
        &self.repository
    }

    pub fn credential_loader(&self) -> &PublicKeyCredentialLoader {
        &self.credential_loader
    }

    /// Creation options for `user`, excluding credentials they already own.
    pub fn creation_options(
        &self,
        user: PublicKeyCredentialUserEntity,
    ) -> Result<PublicKeyCredentialCreationOptions> {
        let challenge = generate_challenge(self.config.challenge_length)?;
        let params = self
            .credential_loader
            .attestation_object_loader()
            .registry()
            .algorithms()
            .algorithms()
            .iter()
            .map(|alg| PublicKeyCredentialParameters::public_key(*alg))
            .collect();
        let exclude = self
            .repository
            .find_all_for_user(&user.id)?
            .iter()
            .map(PublicKeyCredentialSource::descriptor)
            .collect();

        let rp = PublicKeyCredentialRpEntity {
            name: self.config.rp_name.clone(),
            id: Some(self.config.rp_id.clone()),
        };
        let selection = AuthenticatorSelectionCriteria {
            authenticator_attachment: None,
            require_resident_key: false,
            resident_key: None,
            user_verification: self.config.user_verification,
        };

        debug!(rp_id = %self.config.rp_id, "Issued creation options");
        Ok(PublicKeyCredentialCreationOptions::new(rp, user, challenge, params)
            .with_timeout(self.config.timeout_ms)
            .with_exclude_credentials(exclude)
            .with_authenticator_selection(selection)
            .with_attestation(self.config.attestation))
    }

    /// Request options; with a known user the allow-list names their
    /// credentials, otherwise the browser offers discoverable ones.
    pub fn request_options(
        &self,
        user_handle: Option<&[u8]>,
    ) -> Result<PublicKeyCredentialRequestOptions> {
        let challenge = generate_challenge(self.config.challenge_length)?;
        let allow: Vec<_> = match user_handle {
            Some(handle) => self
                .repository
                .find_all_for_user(handle)?
                .iter()
                .map(PublicKeyCredentialSource::descriptor)
                .collect(),
            None => Vec::new(),
        };

        debug!(rp_id = %self.config.rp_id, allowed = allow.len(), "Issued request options");
        Ok(PublicKeyCredentialRequestOptions::new(challenge)
            .with_timeout(self.config.timeout_ms)
            .with_rp_id(self.config.rp_id.clone())
            .with_allow_credentials(allow)
            .with_user_verification(self.config.user_verification))
    }

    pub fn load_credential(&self, json: &str) -> Result<PublicKeyCredential> {
        self.credential_loader.load(json)
    }

    /// Verify a registration response. The returned source is not saved.
    pub fn finish_registration(
        &self,
        credential_json: &str,
        options: &PublicKeyCredentialCreationOptions,
        request: &dyn ServerRequest,
    ) -> Result<PublicKeyCredentialSource> {
        let credential = self.load_credential(credential_json)?;
        self.registration.check(&credential, options, request)
    }

    /// Verify an assertion and persist the updated counter.
    pub fn finish_authentication(
        &self,
        credential_json: &str,
        options: &PublicKeyCredentialRequestOptions,
        request: &dyn ServerRequest,
        user_handle: Option<&[u8]>,
    ) -> Result<PublicKeyCredentialSource> {
        let credential = self.load_credential(credential_json)?;
        self.authentication
            .check(&credential, options, request, user_handle)
    }
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("config", &self.config)
            .field("registration", &self.registration)
            .field("authentication", &self.authentication)
            .finish()
    }
}
