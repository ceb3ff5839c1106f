//! External attestation pipeline: module fetch and authority validation.
//!
//! An identity assertion is fetched from a local attestation module and then
//! submitted to an authorization service. Nothing fetched here may reach a
//! selector until the service has answered `is_valid = true`.
//!
//! # Failure semantics
//!
//! - Connection failure, timeout and RPC error are all `Fetch` / `Validation`
//! - A slow peer and a dead peer are indistinguishable to the caller
//! - One request per attestation, no retries, no caching

pub mod auth_client;
pub mod module_client;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use procattest_core::ExternalEndpoints;

use crate::error::AttestResult;
use crate::identity::{AttestedIdentity, ExternalAttestation, ProcessIdentity, ValidationResult};
use crate::proto::user_attestor::UserAttestation;
use crate::proto::user_auth::ValidateDataRequest;

pub use auth_client::GrpcAuthAuthority;
pub use module_client::GrpcAttestationModule;

/// Budget for one module request/response cycle.
pub const MODULE_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for one authority validation call.
pub const AUTH_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of pre-vouched identity assertions.
#[async_trait]
pub trait AttestationModule: Send + Sync {
    async fn fetch(&self) -> AttestResult<ExternalAttestation>;
}

/// Authority that validates fetched assertions.
#[async_trait]
pub trait AuthAuthority: Send + Sync {
    /// `Ok` with `is_valid = false` is an explicit rejection; `Err` means the
    /// authority could not be asked.
    async fn validate(&self, attestation: &ExternalAttestation) -> AttestResult<ValidationResult>;
}

/// Builds the external collaborators for a configuration snapshot.
pub trait ExternalConnector: Send + Sync {
    fn module(&self, endpoints: &ExternalEndpoints, timeout: Duration) -> Arc<dyn AttestationModule>;
    fn authority(&self, endpoints: &ExternalEndpoints, timeout: Duration) -> Arc<dyn AuthAuthority>;
}

/// Connects to the module over a unix socket and to the authority over gRPC.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrpcConnector;

impl ExternalConnector for GrpcConnector {
    fn module(&self, endpoints: &ExternalEndpoints, timeout: Duration) -> Arc<dyn AttestationModule> {
        Arc::new(GrpcAttestationModule::new(endpoints.module_socket.clone(), timeout))
    }

    fn authority(&self, endpoints: &ExternalEndpoints, timeout: Duration) -> Arc<dyn AuthAuthority> {
        Arc::new(GrpcAuthAuthority::new(endpoints.auth_service_url.clone(), timeout))
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl TryFrom<UserAttestation> for ExternalAttestation {
    type Error = String;

    fn try_from(message: UserAttestation) -> Result<Self, Self::Error> {
        let payload = message
            .user_info
            .ok_or_else(|| "attestation carries no user info".to_string())?;
        let system = payload
            .system_info
            .as_ref()
            .ok_or_else(|| "attestation carries no system info".to_string())?;

        if system.user_id.is_empty() {
            return Err("attestation carries no user id".to_string());
        }
        if system.group_id.is_empty() {
            return Err("attestation carries no group id".to_string());
        }

        let mut supplementary_gids = Vec::with_capacity(system.supplementary_groups.len());
        let mut supplementary_group_names: HashMap<String, Option<String>> = HashMap::new();
        for group in &system.supplementary_groups {
            let name = non_empty(group.group_name.clone());
            match supplementary_group_names.get(&group.group_id) {
                Some(known) if *known != name => {
                    return Err(format!(
                        "conflicting names for supplementary group {}",
                        group.group_id
                    ));
                }
                Some(_) => {}
                None => {
                    supplementary_group_names.insert(group.group_id.clone(), name);
                }
            }
            supplementary_gids.push(group.group_id.clone());
        }

        let identity = AttestedIdentity {
            subject_name: payload.name.clone(),
            secret: payload.secret.clone(),
            system: ProcessIdentity {
                uid: system.user_id.clone(),
                gid: system.group_id.clone(),
                supplementary_gids,
                user_name: non_empty(system.username.clone()),
                group_name: non_empty(system.group_name.clone()),
                supplementary_group_names,
                executable_path: None,
                content_digest: None,
            },
        };

        Ok(ExternalAttestation {
            token: message.token,
            identity,
            payload,
        })
    }
}

impl From<&ExternalAttestation> for ValidateDataRequest {
    fn from(attestation: &ExternalAttestation) -> Self {
        ValidateDataRequest {
            token: attestation.token.clone(),
            user_info: Some(attestation.payload.clone()),
        }
    }
}
