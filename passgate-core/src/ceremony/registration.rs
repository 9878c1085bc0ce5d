use std::sync::Arc;

use tracing::{debug, warn};

use crate::attestation::{AttestationFormatRegistry, AttestationStatement, AttestationType};
use crate::authenticator_data::AuthenticatorData;
use crate::client_data::TYPE_CREATE;
use crate::credential::{AuthenticatorResponse, PublicKeyCredential};
use crate::error::{Result, WebauthnError};
use crate::metadata::MetadataStatusCheck;
use crate::options::{AttestationConveyance, PublicKeyCredentialCreationOptions};
use crate::repository::PublicKeyCredentialSourceRepository;
use crate::request::ServerRequest;
use crate::source::PublicKeyCredentialSource;

use super::{
    check_challenge, check_client_data_type, check_origin, check_rp_id_hash, check_user_flags,
    passed, resolve_rp_id, CeremonyPolicy, Facet,
};

const CEREMONY: &str = "registration";

/// Verifies an attestation response against the creation options that were
/// sent to the browser (WebAuthn §7.1).
///
/// Nothing is persisted: the caller saves the returned source once it has
/// attached it to the user account.
pub struct RegistrationValidator {
    registry: AttestationFormatRegistry,
    repository: Arc<dyn PublicKeyCredentialSourceRepository>,
    policy: CeremonyPolicy,
    metadata: Option<Arc<dyn MetadataStatusCheck>>,
}

impl RegistrationValidator {
    pub fn new(
        registry: AttestationFormatRegistry,
        repository: Arc<dyn PublicKeyCredentialSourceRepository>,
        policy: CeremonyPolicy,
    ) -> Self {
        Self {
            registry,
            repository,
            policy,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStatusCheck>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn check(
        &self,
        credential: &PublicKeyCredential,
        options: &PublicKeyCredentialCreationOptions,
        request: &dyn ServerRequest,
    ) -> Result<PublicKeyCredentialSource> {
        let AuthenticatorResponse::Attestation {
            client_data,
            attestation_object,
            transports,
        } = &credential.response
        else {
            return Err(WebauthnError::syntax("expected an attestation response"));
        };

        check_client_data_type(client_data, TYPE_CREATE)?;
        passed(CEREMONY, "type");

        check_challenge(client_data, &options.challenge)?;
        passed(CEREMONY, "challenge");

        let rp_id = resolve_rp_id(options.rp.id.as_deref(), request)?;
        let facet = Facet::resolve(&rp_id, &options.extensions, &credential.client_extension_results);
        check_origin(client_data.origin(), &facet, &self.policy)?;
        passed(CEREMONY, "origin");

        self.policy
            .token_binding
            .check(client_data.token_binding(), request)?;
        passed(CEREMONY, "token_binding");

        let client_data_hash = client_data.hash();

        let mut auth_data = attestation_object.auth_data.clone();
        check_rp_id_hash(&auth_data, &facet.id)?;
        passed(CEREMONY, "rp_id_hash");

        check_user_flags(&auth_data, options.user_verification())?;
        passed(CEREMONY, "user_flags");

        self.policy.extension_checkers.check(
            &options.extensions,
            &credential.client_extension_results,
            auth_data.extensions(),
        )?;
        passed(CEREMONY, "extensions");

        let mut statement = attestation_object.statement.clone();
        let anonymized = options.attestation == AttestationConveyance::None
            && !is_anonymous(&statement, &auth_data);
        if anonymized {
            warn!(
                fmt = %statement.fmt,
                attestation_type = %statement.attestation_type,
                "Attestation was not requested; discarding the statement and AAGUID"
            );
            statement = AttestationStatement::none();
            auth_data.anonymize_aaguid();
        } else {
            if !self.registry.is_valid(&client_data_hash, &statement, &auth_data)? {
                return Err(WebauthnError::attestation("attestation signature did not verify"));
            }
            if statement.attestation_type == AttestationType::None {
                auth_data.anonymize_aaguid();
            }
            passed(CEREMONY, "attestation");
        }

        let attested = auth_data.attested_credential_data().ok_or_else(|| {
            WebauthnError::syntax("authenticator data has no attested credential data")
        })?;
        if attested.credential_id != credential.raw_id {
            return Err(WebauthnError::syntax(
                "attested credential id differs from the credential rawId",
            ));
        }

        if !anonymized {
            if let Some(metadata) = &self.metadata {
                metadata.check(&attested.aaguid)?;
                passed(CEREMONY, "metadata");
            }
        }

        if self
            .repository
            .find_by_credential_id(&attested.credential_id)?
            .is_some()
        {
            return Err(WebauthnError::DuplicateCredential);
        }
        passed(CEREMONY, "unique_credential");

        let other_ui = self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.describe(&attested.aaguid));

        let source = PublicKeyCredentialSource {
            credential_id: attested.credential_id.clone(),
            ty: credential.ty.clone(),
            transports: transports.clone(),
            attestation_type: statement.attestation_type,
            trust_path: statement.trust_path,
            aaguid: attested.aaguid,
            credential_public_key: attested.credential_public_key.clone(),
            user_handle: options.user.id.clone(),
            counter: auth_data.sign_count(),
            other_ui,
        };
        debug!(
            credential_id = %source.credential_id_base64url(),
            attestation_type = %source.attestation_type,
            aaguid = %source.aaguid,
            "Registration verified"
        );
        Ok(source)
    }
}

/// Already carries no identifying information: nil AAGUID and a statement
/// that does not chain to a vendor.
fn is_anonymous(statement: &AttestationStatement, auth_data: &AuthenticatorData) -> bool {
    let nil_aaguid = auth_data
        .attested_credential_data()
        .is_some_and(|data| data.aaguid.is_nil());
    nil_aaguid
        && matches!(
            statement.attestation_type,
            AttestationType::None | AttestationType::SelfAttestation
        )
}

impl std::fmt::Debug for RegistrationValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationValidator")
            .field("formats", &self.registry.names())
            .field("policy", &self.policy)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}
