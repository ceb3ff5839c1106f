//! Node configuration file.

use anyhow::{bail, Context, Result};
use procattest_core::logging::LogSettings;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Where the node accepts gRPC connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listen {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// Unix socket to serve on
    #[serde(default)]
    pub listen_socket: Option<PathBuf>,
    /// TCP address to serve on
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
    #[serde(default)]
    pub logging: LogSettings,
    /// Initial attestor configuration, published before serving
    #[serde(default)]
    pub attestor: Option<toml::Table>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid node config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn listen(&self) -> Result<Listen> {
        match (&self.listen_socket, self.listen_addr) {
            (Some(path), None) => Ok(Listen::Unix(path.clone())),
            (None, Some(addr)) => Ok(Listen::Tcp(addr)),
            (Some(_), Some(_)) => bail!("listen_socket and listen_addr are mutually exclusive"),
            (None, None) => bail!("one of listen_socket or listen_addr is required"),
        }
    }

    /// The `[attestor]` table rendered back to a configuration document.
    pub fn attestor_document(&self) -> Result<Option<String>> {
        self.attestor
            .as_ref()
            .map(|table| toml::to_string(table).context("failed to encode [attestor] table"))
            .transpose()
    }
}
