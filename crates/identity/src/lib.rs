//! Process identity attestation.
//!
//! Given the id of a running process, this crate produces an ordered list of
//! `kind:value` selectors describing who the process is. A policy engine
//! matches those selectors against registration entries to decide which
//! workload identity the process may receive.
//!
//! # Core Concepts
//!
//! - **Local attestation**: uid, gid, supplementary groups, their names, and
//!   optionally the executable path and its SHA-256, read from the OS
//! - **External attestation**: an assertion fetched from a local attestation
//!   module and validated by an authorization service before use
//! - **Configuration snapshots**: each request runs against one immutable,
//!   versioned configuration
//!
//! # Security Model
//!
//! - Identity facts are read fresh for every request, never cached
//! - Any failed stage aborts the request; partial selector lists are never returned
//! - Externally fetched data reaches selectors only after explicit validation

pub mod attestor;
pub mod digest;
pub mod error;
pub mod external;
pub mod grpc_server;
pub mod identity;
pub mod names;
pub mod process;
pub mod selectors;

/// Generated protocol types.
#[allow(missing_docs, clippy::all)]
pub mod proto {
    /// Services exposed by the attestor.
    pub mod attestor {
        tonic::include_proto!("attestor");
    }

    /// Attestation module protocol.
    pub mod user_attestor {
        tonic::include_proto!("user_attestor");
    }

    /// Authorization service protocol.
    pub mod user_auth {
        tonic::include_proto!("user_auth");
    }
}

pub use attestor::{Attestor, AttestorBuilder, Strategy};
pub use digest::sha256_digest;
pub use error::{AttestError, AttestResult, DigestError, ErrorKind};
pub use external::{AttestationModule, AuthAuthority, ExternalConnector, GrpcConnector};
pub use grpc_server::{serve_unix, start_grpc_server, AttestorService, ERROR_KIND_METADATA};
pub use identity::{AttestedIdentity, ExternalAttestation, ProcessIdentity, ValidationResult};
pub use names::{IdentityDatabase, NameResolver, SystemIdentityDatabase};
pub use process::{ProcessIdentityResolver, ProcessInfo, ProcessTable, ProcfsTable};
pub use selectors::{selector_values, Selector, SelectorBuilder};

// Re-export configuration types for convenience
pub use procattest_core::{Config, ConfigError, ConfigSnapshot, ConfigStore, DigestPolicy};
