//! Identity types produced by the attestation pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::proto::user_attestor::UserInfo;

/// OS-level identity of a process, resolved fresh for each request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// Effective user id
    pub uid: String,
    /// Effective group id
    pub gid: String,
    /// Supplementary group ids in the order the OS reports them
    pub supplementary_gids: Vec<String>,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    /// Resolved name for each supplementary gid (`None` when unknown)
    pub supplementary_group_names: HashMap<String, Option<String>>,
    pub executable_path: Option<String>,
    /// Lowercase hex SHA-256 of the executable
    pub content_digest: Option<String>,
}

/// Identity vouched for by the external attestation module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedIdentity {
    pub subject_name: String,
    pub secret: String,
    pub system: ProcessIdentity,
}

/// Assertion fetched from the external attestation module.
///
/// Untrusted until the authorization service has validated it. `payload` is
/// the message exactly as the module sent it and is what the authority sees.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalAttestation {
    pub token: String,
    pub identity: AttestedIdentity,
    pub payload: UserInfo,
}

/// Verdict returned by the authorization service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub message: String,
}
