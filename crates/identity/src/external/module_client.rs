//! Attestation module client over a unix-domain socket.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use super::AttestationModule;
use crate::error::{AttestError, AttestResult};
use crate::identity::ExternalAttestation;
use crate::proto::user_attestor::attestation_service_client::AttestationServiceClient;
use crate::proto::user_attestor::Empty;

/// Fetches identity assertions from the attestation module.
#[derive(Debug, Clone)]
pub struct GrpcAttestationModule {
    socket_path: PathBuf,
    timeout: Duration,
}

impl GrpcAttestationModule {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl AttestationModule for GrpcAttestationModule {
    async fn fetch(&self) -> AttestResult<ExternalAttestation> {
        let channel = connect_unix(&self.socket_path, self.timeout)
            .await
            .map_err(|e| {
                AttestError::Fetch(format!(
                    "failed to connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;

        let response = AttestationServiceClient::new(channel)
            .get_user_attestation(Empty {})
            .await
            .map_err(|status| {
                AttestError::Fetch(format!(
                    "could not get attestation: {}: {}",
                    status.code(),
                    status.message()
                ))
            })?;

        debug!(socket = %self.socket_path.display(), "attestation fetched");

        ExternalAttestation::try_from(response.into_inner()).map_err(AttestError::Fetch)
    }
}

/// Open a channel whose transport is the unix socket at `path`.
///
/// The URI is a placeholder required by the endpoint builder; the connector
/// ignores it.
async fn connect_unix(path: &Path, timeout: Duration) -> Result<Channel, tonic::transport::Error> {
    let path = path.to_path_buf();

    Endpoint::from_static("http://[::]:50051")
        .connect_timeout(timeout)
        .timeout(timeout)
        .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(path.clone())))
        .await
}
