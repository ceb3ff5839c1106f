//! Configuration management for the process attestor.
//!
//! A [`Config`] is decoded and validated in full before it is published to a
//! [`ConfigStore`]. Publication swaps a whole [`ConfigSnapshot`], so readers
//! observe either the previous snapshot or the new one.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{ConfigError, ConfigResult};

/// Recognised attestor options.
///
/// Unknown keys are ignored and missing keys take their defaults, so an
/// empty table resolves to the local strategy with path discovery disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Include the executable path (and digest, see [`DigestPolicy`]) in the selectors
    pub discover_workload_path: bool,
    /// Maximum executable size to hash: negative skips hashing, zero hashes without a cap
    pub workload_size_limit: i64,
    /// Unix socket of the external attestation module
    #[serde(alias = "user_attestation_module_path")]
    pub external_attestation_socket: Option<PathBuf>,
    /// Endpoint of the external authorization service
    #[serde(alias = "user_attestation_service_url")]
    pub external_auth_service_url: Option<String>,
}

/// How the executable digest is computed for a given size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPolicy {
    /// No digest is computed and no digest selector is emitted
    Skip,
    /// The whole file is hashed regardless of size
    Unbounded,
    /// Files larger than the limit fail attestation before any byte is read
    Capped(u64),
}

/// Endpoints used by the external attestation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEndpoints {
    pub module_socket: PathBuf,
    pub auth_service_url: String,
}

impl Config {
    /// Decode and validate a raw configuration document.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        if raw.trim().is_empty() {
            return Err(ConfigError::Empty);
        }

        let config: Config = toml::from_str(raw)
            .map_err(|e| ConfigError::Invalid(format!("failed to decode configuration: {}", e)))?;

        config.normalized().validate()
    }

    /// Treat empty endpoint values as unset.
    fn normalized(mut self) -> Self {
        if self
            .external_attestation_socket
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.external_attestation_socket = None;
        }
        if self
            .external_auth_service_url
            .as_ref()
            .is_some_and(|u| u.trim().is_empty())
        {
            self.external_auth_service_url = None;
        }
        self
    }

    fn validate(self) -> ConfigResult<Self> {
        match (&self.external_attestation_socket, &self.external_auth_service_url) {
            (Some(_), None) => Err(ConfigError::Invalid(
                "external_attestation_socket requires external_auth_service_url".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::Invalid(
                "external_auth_service_url requires external_attestation_socket".to_string(),
            )),
            (Some(_), Some(url)) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "external_auth_service_url must be an http(s) URL: {}",
                        url
                    )));
                }
                Ok(self)
            }
            (None, None) => Ok(self),
        }
    }

    /// Digest behaviour selected by `workload_size_limit`.
    pub fn digest_policy(&self) -> DigestPolicy {
        match self.workload_size_limit {
            limit if limit < 0 => DigestPolicy::Skip,
            0 => DigestPolicy::Unbounded,
            limit => DigestPolicy::Capped(limit as u64),
        }
    }

    /// External endpoints, present only when both are configured.
    pub fn external_endpoints(&self) -> Option<ExternalEndpoints> {
        match (&self.external_attestation_socket, &self.external_auth_service_url) {
            (Some(socket), Some(url)) => Some(ExternalEndpoints {
                module_socket: socket.clone(),
                auth_service_url: url.clone(),
            }),
            _ => None,
        }
    }
}

/// An immutable, versioned configuration as seen by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Publication counter, starting at 1
    pub version: u64,
    pub config: Config,
}

/// Holds the active configuration snapshot.
///
/// Readers take the shared lock only long enough to clone an `Arc`, so a
/// reconfiguration never waits behind an in-flight attestation.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Option<Arc<ConfigSnapshot>>>,
    versions: AtomicU64,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode, validate and publish a configuration document.
    pub fn configure(&self, raw: &str) -> ConfigResult<Arc<ConfigSnapshot>> {
        let config = Config::from_toml_str(raw)?;
        Ok(self.publish(config))
    }

    /// Publish an already validated configuration.
    pub fn publish(&self, config: Config) -> Arc<ConfigSnapshot> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(ConfigSnapshot { version, config });
        *current = Some(Arc::clone(&snapshot));

        info!(
            version,
            discover_workload_path = snapshot.config.discover_workload_path,
            workload_size_limit = snapshot.config.workload_size_limit,
            external = snapshot.config.external_endpoints().is_some(),
            "configuration published"
        );

        snapshot
    }

    /// The active snapshot.
    pub fn current(&self) -> ConfigResult<Arc<ConfigSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ConfigError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_defaults_from_unrelated_document() {
        let config = Config::from_toml_str("some_other_key = \"value\"").unwrap();

        assert_eq!(config, Config::default());
        assert!(!config.discover_workload_path);
        assert_eq!(config.workload_size_limit, 0);
        assert!(config.external_endpoints().is_none());
    }

    #[test]
    fn test_parse_all_keys() {
        let raw = r#"
            discover_workload_path = true
            workload_size_limit = 1048576
            external_attestation_socket = "/run/module.sock"
            external_auth_service_url = "http://127.0.0.1:9000"
        "#;
        let config = Config::from_toml_str(raw).unwrap();

        assert!(config.discover_workload_path);
        assert_eq!(config.digest_policy(), DigestPolicy::Capped(1_048_576));
        let endpoints = config.external_endpoints().unwrap();
        assert_eq!(endpoints.module_socket, PathBuf::from("/run/module.sock"));
        assert_eq!(endpoints.auth_service_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_legacy_endpoint_keys() {
        let raw = r#"
            user_attestation_module_path = "/tmp/uam.sock"
            user_attestation_service_url = "https://auth.example:8443"
        "#;
        let config = Config::from_toml_str(raw).unwrap();

        assert!(config.external_endpoints().is_some());
    }

    #[test]
    fn test_empty_document_rejected() {
        assert_eq!(Config::from_toml_str(""), Err(ConfigError::Empty));
        assert_eq!(Config::from_toml_str("  \n\t"), Err(ConfigError::Empty));
    }

    #[test]
    fn test_malformed_document_rejected() {
        let result = Config::from_toml_str("discover_workload_path = ");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::from_toml_str("workload_size_limit = \"big\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_half_configured_external_rejected() {
        let result = Config::from_toml_str("external_attestation_socket = \"/run/m.sock\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::from_toml_str("external_auth_service_url = \"http://a:1\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_endpoints_mean_local() {
        let raw = r#"
            external_attestation_socket = ""
            external_auth_service_url = ""
        "#;
        let config = Config::from_toml_str(raw).unwrap();

        assert!(config.external_endpoints().is_none());
    }

    #[test]
    fn test_non_http_auth_url_rejected() {
        let raw = r#"
            external_attestation_socket = "/run/m.sock"
            external_auth_service_url = "unix:///run/auth.sock"
        "#;
        assert!(matches!(
            Config::from_toml_str(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_digest_policy_three_way() {
        let mut config = Config::default();

        config.workload_size_limit = -1;
        assert_eq!(config.digest_policy(), DigestPolicy::Skip);

        config.workload_size_limit = 0;
        assert_eq!(config.digest_policy(), DigestPolicy::Unbounded);

        config.workload_size_limit = 100;
        assert_eq!(config.digest_policy(), DigestPolicy::Capped(100));
    }

    #[test]
    fn test_store_not_configured() {
        let store = ConfigStore::new();
        assert_eq!(store.current(), Err(ConfigError::NotConfigured));
    }

    #[test]
    fn test_store_failed_configure_keeps_previous() {
        let store = ConfigStore::new();
        store.configure("discover_workload_path = true").unwrap();

        assert!(store.configure("").is_err());
        assert!(store.configure("discover_workload_path = 3").is_err());

        let snapshot = store.current().unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.config.discover_workload_path);
    }

    #[test]
    fn test_store_configure_is_idempotent() {
        let store = ConfigStore::new();
        let raw = "discover_workload_path = true\nworkload_size_limit = 10";

        let first = store.configure(raw).unwrap();
        let second = store.configure(raw).unwrap();

        assert_eq!(first.config, second.config);
        assert!(second.version > first.version);
        assert_eq!(store.current().unwrap().config, first.config);
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(ConfigStore::new());
        let old = "discover_workload_path = false\nworkload_size_limit = -1";
        let new = "discover_workload_path = true\nworkload_size_limit = 4096";
        store.configure(old).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500 {
                    let raw = if i % 2 == 0 { new } else { old };
                    store.configure(raw).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let snapshot = store.current().unwrap();
                        let config = &snapshot.config;
                        match config.discover_workload_path {
                            true => assert_eq!(config.workload_size_limit, 4096),
                            false => assert_eq!(config.workload_size_limit, -1),
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
