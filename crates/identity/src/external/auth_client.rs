//! Authorization service client.

use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::Endpoint;
use tracing::debug;

use super::AuthAuthority;
use crate::error::{AttestError, AttestResult};
use crate::identity::{ExternalAttestation, ValidationResult};
use crate::proto::user_auth::user_auth_service_client::UserAuthServiceClient;
use crate::proto::user_auth::ValidateDataRequest;

/// Submits fetched assertions to the authorization service.
#[derive(Debug, Clone)]
pub struct GrpcAuthAuthority {
    url: String,
    timeout: Duration,
}

impl GrpcAuthAuthority {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self { url, timeout }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthAuthority for GrpcAuthAuthority {
    async fn validate(&self, attestation: &ExternalAttestation) -> AttestResult<ValidationResult> {
        let endpoint = Endpoint::from_shared(self.url.clone())
            .map_err(|e| AttestError::Validation(format!("invalid endpoint {}: {}", self.url, e)))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);

        let channel = endpoint.connect().await.map_err(|e| {
            AttestError::Validation(format!("failed to connect to {}: {}", self.url, e))
        })?;

        let response = UserAuthServiceClient::new(channel)
            .validate_data(ValidateDataRequest::from(attestation))
            .await
            .map_err(|status| {
                AttestError::Validation(format!(
                    "validation call failed: {}: {}",
                    status.code(),
                    status.message()
                ))
            })?
            .into_inner();

        debug!(url = %self.url, is_valid = response.is_valid, "validation answered");

        Ok(ValidationResult {
            is_valid: response.is_valid,
            message: response.message,
        })
    }
}
