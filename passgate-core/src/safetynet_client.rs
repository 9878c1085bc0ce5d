//! Online SafetyNet verdicts from Google's attestation verify endpoint.
//!
//! Blocking HTTP client with retry and backoff; plugs into the
//! `android-safetynet` format as a [`SafetyNetVerdictSource`].

use std::time::{Duration, Instant};

use backoff::{retry_notify, ExponentialBackoff};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::attestation::{SafetyNetVerdict, SafetyNetVerdictSource};
use crate::error::{Result, WebauthnError};

/// Verify endpoint of the Android device verification API.
pub const SAFETYNET_VERIFY_URL: &str =
    "https://www.googleapis.com/androidcheck/v1/attestations/verify";

/// Configuration for the verdict client.
#[derive(Debug, Clone)]
pub struct SafetyNetClientConfig {
    pub api_key: String,
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors.
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl SafetyNetClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: SAFETYNET_VERIFY_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    signed_attestation: &'a str,
}

pub struct GoogleSafetyNetClient {
    client: Client,
    config: SafetyNetClientConfig,
}

impl GoogleSafetyNetClient {
    pub fn new(config: SafetyNetClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .https_only(true)
            .build()
            .map_err(|e| service_error(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn verify_once(&self, jws: &str) -> std::result::Result<SafetyNetVerdict, backoff::Error<WebauthnError>> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&VerifyRequest {
                signed_attestation: jws,
            })
            .send()
            .map_err(|e| {
                let latency_ms = start.elapsed().as_millis() as u64;
                if is_transient_error(&e) {
                    warn!(error = %e, latency_ms, "Transient error, will retry");
                    backoff::Error::transient(service_error(format!("transient error: {e}")))
                } else {
                    warn!(error = %e, latency_ms, "Permanent error, aborting");
                    backoff::Error::permanent(service_error(format!("request failed: {e}")))
                }
            })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");
        if !status.is_success() {
            let err = service_error(format!("verify endpoint returned status: {status}"));
            return if is_transient_status(status) {
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            };
        }

        response.json::<SafetyNetVerdict>().map_err(|e| {
            backoff::Error::permanent(service_error(format!("failed to parse verdict: {e}")))
        })
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        }
    }
}

impl SafetyNetVerdictSource for GoogleSafetyNetClient {
    fn verify(&self, jws: &str) -> Result<SafetyNetVerdict> {
        retry_notify(
            self.build_backoff(),
            || self.verify_once(jws),
            |err: WebauthnError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .map_err(|err| match err {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

impl std::fmt::Debug for GoogleSafetyNetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSafetyNetClient")
            .field("endpoint", &self.config.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

fn service_error(msg: String) -> WebauthnError {
    WebauthnError::AttestationInvalid(format!("SafetyNet verify service: {msg}"))
}

fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = GoogleSafetyNetClient::new(SafetyNetClientConfig::new("secret-key")).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains(SAFETYNET_VERIFY_URL));
    }
}
