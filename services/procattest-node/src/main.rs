use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use procattest_core::logging;
use procattest_identity::Attestor;

mod config;

use config::{Listen, NodeConfig};

const NODE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config_path = parse_config_path(&args)?;
    let config = NodeConfig::load(&config_path)?;

    logging::init(&config.logging);

    let attestor = Arc::new(Attestor::default());
    if let Some(document) = config.attestor_document()? {
        let snapshot = attestor
            .configure(&document)
            .context("invalid [attestor] configuration")?;
        info!(version = snapshot.version, "initial configuration applied");
    } else {
        info!("no initial configuration; waiting for Configure");
    }

    info!(
        service = "procattest-node",
        version = env!("CARGO_PKG_VERSION"),
        "service started"
    );

    match config.listen()? {
        Listen::Unix(path) => {
            procattest_identity::serve_unix(&path, attestor, shutdown_signal())
                .await
                .map_err(|e| anyhow!(e))?;
        }
        Listen::Tcp(addr) => {
            tokio::select! {
                result = procattest_identity::start_grpc_server(addr, attestor) => {
                    result.map_err(|e| anyhow!(e.to_string()))?;
                }
                _ = shutdown_signal() => {}
            }
        }
    }

    info!("service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn parse_config_path(args: &[String]) -> Result<PathBuf> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(PathBuf::from(path));
            }
            bail!("--config was provided without a path");
        }
    }

    bail!("missing required --config <path> argument")
}
