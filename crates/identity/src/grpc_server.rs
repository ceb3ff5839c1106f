//! gRPC surface of the attestor.
//!
//! Exposes `WorkloadAttestor.Attest` and `ConfigService.Configure` over TCP or
//! a unix-domain socket. Attestation failures are reported as gRPC statuses
//! carrying the stable error kind in the `x-attest-error-kind` metadata entry.

use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

use crate::attestor::Attestor;
use crate::error::{AttestError, ErrorKind};
use crate::proto::attestor::config_service_server::{ConfigService, ConfigServiceServer};
use crate::proto::attestor::workload_attestor_server::{WorkloadAttestor, WorkloadAttestorServer};
use crate::proto::attestor::{AttestRequest, AttestResponse, ConfigureRequest, ConfigureResponse};
use crate::selectors::selector_values;

/// Metadata key carrying the [`ErrorKind`] of a failed call.
pub const ERROR_KIND_METADATA: &str = "x-attest-error-kind";

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Serves both attestor RPC services from one shared [`Attestor`].
#[derive(Clone)]
pub struct AttestorService {
    attestor: Arc<Attestor>,
}

impl AttestorService {
    pub fn new(attestor: Arc<Attestor>) -> Self {
        Self { attestor }
    }

    /// Both services mounted on a fresh server builder.
    pub fn into_router(self) -> Router {
        Server::builder()
            .add_service(WorkloadAttestorServer::new(self.clone()))
            .add_service(ConfigServiceServer::new(self))
    }
}

#[tonic::async_trait]
impl WorkloadAttestor for AttestorService {
    async fn attest(
        &self,
        request: Request<AttestRequest>,
    ) -> Result<Response<AttestResponse>, Status> {
        let deadline = request_deadline(request.metadata());
        let pid = request.into_inner().pid;

        let selectors = self
            .attestor
            .attest_with_deadline(pid, deadline)
            .await
            .map_err(status_from)?;

        Ok(Response::new(AttestResponse {
            selector_values: selector_values(&selectors),
        }))
    }
}

#[tonic::async_trait]
impl ConfigService for AttestorService {
    async fn configure(
        &self,
        request: Request<ConfigureRequest>,
    ) -> Result<Response<ConfigureResponse>, Status> {
        let raw = request.into_inner().configuration;
        self.attestor.configure(&raw).map_err(|e| {
            tracing::warn!(error = %e, "configuration rejected");
            status_from(e)
        })?;

        Ok(Response::new(ConfigureResponse {}))
    }
}

/// Map an attestation error onto a gRPC status.
pub fn status_from(error: AttestError) -> Status {
    let kind = error.kind();
    let code = match kind {
        ErrorKind::NotConfigured => Code::FailedPrecondition,
        ErrorKind::InvalidConfig | ErrorKind::EmptyConfig => Code::InvalidArgument,
        ErrorKind::Fetch => Code::Unavailable,
        ErrorKind::ValidationRejected => Code::PermissionDenied,
        ErrorKind::Resolution | ErrorKind::Digest | ErrorKind::Validation => Code::Internal,
    };

    let mut metadata = MetadataMap::new();
    metadata.insert(ERROR_KIND_METADATA, MetadataValue::from_static(kind.as_str()));

    Status::with_metadata(code, error.to_string(), metadata)
}

/// Deadline announced by the caller through the `grpc-timeout` header.
fn request_deadline(metadata: &MetadataMap) -> Option<Instant> {
    let raw = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    let timeout = parse_grpc_timeout(raw)?;
    Instant::now().checked_add(timeout)
}

/// Parse a `grpc-timeout` value: up to eight ASCII digits and a unit.
fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if !raw.is_ascii() || raw.len() < 2 || raw.len() > 9 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(value * 3600)),
        "M" => Some(Duration::from_secs(value * 60)),
        "S" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_millis(value)),
        "u" => Some(Duration::from_micros(value)),
        "n" => Some(Duration::from_nanos(value)),
        _ => None,
    }
}

/// Start the attestor gRPC server on a TCP address.
pub async fn start_grpc_server(
    addr: SocketAddr,
    attestor: Arc<Attestor>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Attestor gRPC server listening on {}", addr);

    AttestorService::new(attestor)
        .into_router()
        .serve(addr)
        .await?;

    Ok(())
}

/// Serve the attestor on a unix-domain socket until `shutdown` resolves.
///
/// A stale socket left at `path` by a previous run is replaced; any other
/// file at that path is an error.
pub async fn serve_unix<F>(
    path: &Path,
    attestor: Arc<Attestor>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()>,
{
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(format!("{} exists and is not a socket", path.display()).into());
        }
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    tracing::info!("Attestor gRPC server listening on {}", path.display());

    AttestorService::new(attestor)
        .into_router()
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
        .await?;

    let _ = std::fs::remove_file(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DigestError;
    use procattest_core::ConfigError;
    use std::path::PathBuf;

    fn kind_of(status: &Status) -> &str {
        status
            .metadata()
            .get(ERROR_KIND_METADATA)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn test_parse_grpc_timeout() {
        assert_eq!(parse_grpc_timeout("1S"), Some(Duration::from_secs(1)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn test_request_deadline_from_metadata() {
        let mut metadata = MetadataMap::new();
        assert!(request_deadline(&metadata).is_none());

        metadata.insert(GRPC_TIMEOUT_HEADER, MetadataValue::from_static("500m"));
        let deadline = request_deadline(&metadata).unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(500));
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AttestError::from(ConfigError::NotConfigured), Code::FailedPrecondition, "not_configured"),
            (AttestError::from(ConfigError::Empty), Code::InvalidArgument, "empty_config"),
            (
                AttestError::from(ConfigError::Invalid("bad".into())),
                Code::InvalidArgument,
                "invalid_config",
            ),
            (AttestError::Fetch("down".into()), Code::Unavailable, "fetch_error"),
            (AttestError::Validation("down".into()), Code::Internal, "validation_error"),
            (
                AttestError::ValidationRejected("expired".into()),
                Code::PermissionDenied,
                "validation_rejected",
            ),
            (
                AttestError::Digest(DigestError::SizeLimitExceeded {
                    path: PathBuf::from("/bin/app"),
                    size: 500,
                    limit: 100,
                }),
                Code::Internal,
                "digest_error",
            ),
        ];

        for (error, code, kind) in cases {
            let message = error.to_string();
            let status = status_from(error);
            assert_eq!(status.code(), code);
            assert_eq!(kind_of(&status), kind);
            assert_eq!(status.message(), message);
        }
    }

    #[tokio::test]
    async fn test_serve_unix_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let result = serve_unix(&path, Arc::new(Attestor::default()), async {}).await;
        assert!(result.is_err());
        assert!(path.exists());
    }
}
