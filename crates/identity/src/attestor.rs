//! Per-request attestation orchestration.
//!
//! # Request flow
//!
//! 1. Read the active configuration snapshot (`NotConfigured` is terminal)
//! 2. Select the strategy: external when both endpoints are configured, local otherwise
//! 3. Local: resolve the process, enrich names, hash the executable
//! 4. External: fetch the module's assertion, have the authority validate it
//! 5. Build the ordered selector list
//!
//! Any stage failure aborts the request. A partial selector list is never
//! returned, and nothing fetched from the module is turned into a selector
//! unless the authority answered `is_valid = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use procattest_core::{Config, ConfigSnapshot, ConfigStore, DigestPolicy, ExternalEndpoints};

use crate::digest::sha256_digest;
use crate::error::{AttestError, AttestResult};
use crate::external::{
    ExternalConnector, GrpcConnector, AUTH_VALIDATE_TIMEOUT, MODULE_FETCH_TIMEOUT,
};
use crate::identity::ProcessIdentity;
use crate::names::{IdentityDatabase, NameResolver, SystemIdentityDatabase};
use crate::process::{ProcessIdentityResolver, ProcessTable, ProcfsTable};
use crate::selectors::{Selector, SelectorBuilder};

/// Strategy selected for one request from the configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Resolve identity from the OS process table
    Local,
    /// Fetch and validate an assertion from external services
    External(ExternalEndpoints),
}

impl Strategy {
    pub fn for_config(config: &Config) -> Self {
        match config.external_endpoints() {
            Some(endpoints) => Strategy::External(endpoints),
            None => Strategy::Local,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Strategy::Local => "local",
            Strategy::External(_) => "external",
        }
    }
}

/// Resolves selectors for process ids.
pub struct Attestor {
    store: Arc<ConfigStore>,
    resolver: ProcessIdentityResolver,
    names: NameResolver,
    connector: Arc<dyn ExternalConnector>,
    selectors: SelectorBuilder,
    fetch_timeout: Duration,
    validate_timeout: Duration,
}

/// Injects the capabilities an [`Attestor`] runs against.
pub struct AttestorBuilder {
    store: Option<Arc<ConfigStore>>,
    process_table: Option<Arc<dyn ProcessTable>>,
    identity_database: Option<Arc<dyn IdentityDatabase>>,
    connector: Option<Arc<dyn ExternalConnector>>,
    fetch_timeout: Duration,
    validate_timeout: Duration,
}

impl Default for AttestorBuilder {
    fn default() -> Self {
        Self {
            store: None,
            process_table: None,
            identity_database: None,
            connector: None,
            fetch_timeout: MODULE_FETCH_TIMEOUT,
            validate_timeout: AUTH_VALIDATE_TIMEOUT,
        }
    }
}

impl AttestorBuilder {
    pub fn config_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.process_table = Some(table);
        self
    }

    pub fn identity_database(mut self, database: Arc<dyn IdentityDatabase>) -> Self {
        self.identity_database = Some(database);
        self
    }

    pub fn external_connector(mut self, connector: Arc<dyn ExternalConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Override the module fetch budget.
    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Override the authority validation budget.
    pub fn validate_timeout(mut self, validate_timeout: Duration) -> Self {
        self.validate_timeout = validate_timeout;
        self
    }

    pub fn build(self) -> Attestor {
        let table = self
            .process_table
            .unwrap_or_else(|| Arc::new(ProcfsTable::from_env()));
        let database = self
            .identity_database
            .unwrap_or_else(|| Arc::new(SystemIdentityDatabase));

        Attestor {
            store: self.store.unwrap_or_default(),
            resolver: ProcessIdentityResolver::new(table),
            names: NameResolver::new(database),
            connector: self.connector.unwrap_or_else(|| Arc::new(GrpcConnector)),
            selectors: SelectorBuilder::new(),
            fetch_timeout: self.fetch_timeout,
            validate_timeout: self.validate_timeout,
        }
    }
}

impl Default for Attestor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Attestor {
    pub fn builder() -> AttestorBuilder {
        AttestorBuilder::default()
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Decode, validate and publish a configuration document.
    pub fn configure(&self, raw: &str) -> AttestResult<Arc<ConfigSnapshot>> {
        Ok(self.store.configure(raw)?)
    }

    /// Resolve selectors for `pid` with no caller deadline.
    pub async fn attest(&self, pid: i32) -> AttestResult<Vec<Selector>> {
        self.attest_with_deadline(pid, None).await
    }

    /// Resolve selectors for `pid`, bounding external calls by `deadline`.
    pub async fn attest_with_deadline(
        &self,
        pid: i32,
        deadline: Option<Instant>,
    ) -> AttestResult<Vec<Selector>> {
        let snapshot = self.store.current().map_err(|e| {
            warn!(pid, error = %e, "attestation refused");
            AttestError::from(e)
        })?;

        let strategy = Strategy::for_config(&snapshot.config);
        let result = match &strategy {
            Strategy::Local => self.attest_local(pid, &snapshot.config).await,
            Strategy::External(endpoints) => self.attest_external(pid, endpoints, deadline).await,
        };

        match &result {
            Ok(selectors) => info!(
                pid,
                strategy = strategy.name(),
                config_version = snapshot.version,
                selectors = selectors.len(),
                "process attested"
            ),
            Err(e) => warn!(
                pid,
                strategy = strategy.name(),
                config_version = snapshot.version,
                kind = e.kind().as_str(),
                error = %e,
                "attestation failed"
            ),
        }

        result
    }

    async fn attest_local(&self, pid: i32, config: &Config) -> AttestResult<Vec<Selector>> {
        let resolver = self.resolver.clone();
        let names = self.names.clone();
        let discover_path = config.discover_workload_path;
        let policy = config.digest_policy();

        let identity = tokio::task::spawn_blocking(move || {
            resolve_local(&resolver, &names, pid, discover_path, policy)
        })
        .await
        .map_err(|e| AttestError::resolution("local resolution", e))??;

        Ok(self.selectors.build(&identity))
    }

    async fn attest_external(
        &self,
        pid: i32,
        endpoints: &ExternalEndpoints,
        deadline: Option<Instant>,
    ) -> AttestResult<Vec<Selector>> {
        let module = self.connector.module(endpoints, self.fetch_timeout);
        let authority = self.connector.authority(endpoints, self.validate_timeout);

        let budget = stage_budget(self.fetch_timeout, deadline);
        if budget.is_zero() {
            return Err(AttestError::Fetch("deadline exceeded before fetch".to_string()));
        }
        let attestation = timeout(budget, module.fetch())
            .await
            .map_err(|_| AttestError::Fetch(format!("no response within {:?}", budget)))??;

        let budget = stage_budget(self.validate_timeout, deadline);
        if budget.is_zero() {
            return Err(AttestError::Validation(
                "deadline exceeded before validation".to_string(),
            ));
        }
        let verdict = timeout(budget, authority.validate(&attestation))
            .await
            .map_err(|_| AttestError::Validation(format!("no response within {:?}", budget)))??;

        if !verdict.is_valid {
            let reason = if verdict.message.is_empty() {
                "authority reported invalid data".to_string()
            } else {
                verdict.message
            };
            return Err(AttestError::ValidationRejected(reason));
        }

        tracing::debug!(pid, subject = %attestation.identity.subject_name, "attestation validated");

        Ok(self.selectors.build_external(&attestation.identity))
    }
}

/// Fixed stage budget, shrunk to what remains of the caller's deadline.
fn stage_budget(fixed: Duration, deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => fixed.min(deadline.saturating_duration_since(Instant::now())),
        None => fixed,
    }
}

fn resolve_local(
    resolver: &ProcessIdentityResolver,
    names: &NameResolver,
    pid: i32,
    discover_path: bool,
    policy: DigestPolicy,
) -> AttestResult<ProcessIdentity> {
    let resolved = resolver.resolve(pid, discover_path)?;

    let user_name = names.user_name_for(&resolved.uid);
    let group_name = names.group_name_for(&resolved.gid);
    let supplementary_group_names = resolved
        .supplementary_gids
        .iter()
        .map(|gid| (gid.clone(), names.group_name_for(gid)))
        .collect();

    let (executable_path, content_digest) = match resolved.executable {
        Some(exe) => {
            let digest = match policy {
                DigestPolicy::Skip => None,
                DigestPolicy::Unbounded => Some(sha256_digest(&exe.digest_source, 0)?),
                DigestPolicy::Capped(limit) => Some(sha256_digest(
                    &exe.digest_source,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                )?),
            };
            (Some(exe.reported), digest)
        }
        None => (None, None),
    };

    Ok(ProcessIdentity {
        uid: resolved.uid,
        gid: resolved.gid,
        supplementary_gids: resolved.supplementary_gids,
        user_name,
        group_name,
        supplementary_group_names,
        executable_path,
        content_digest,
    })
}
