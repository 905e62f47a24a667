//! The routing daemon: a configured [`RouterSystem`] plus status reporting.

use crate::builder::SeqRouteDaemonBuilder;
use crate::config::Config;
use crate::Result;
use seqroute_core::{ConnectionRule, TopologySnapshot};
use seqroute_io::RouterSystem;
use serde::Serialize;

const HOSTNAME_PATH: &str = "/etc/hostname";

/// Running daemon.
///
/// Clone is cheap; the router shuts down when the last clone drops.
#[derive(Clone, Debug)]
pub struct SeqRouteDaemon {
    router: RouterSystem,
    config: Config,
    hostname: String,
}

/// Serializable view of the graph, the stored rules and the host.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub topology: TopologySnapshot,
    pub connections: Vec<ConnectionRule>,
    pub config: StatusConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusConfig {
    pub hostname: String,
    pub client_id: u8,
    pub client_name: String,
}

impl SeqRouteDaemon {
    pub fn builder() -> SeqRouteDaemonBuilder {
        SeqRouteDaemonBuilder::default()
    }

    pub(crate) fn from_parts(router: RouterSystem, config: Config) -> Self {
        Self {
            router,
            config,
            hostname: read_hostname(),
        }
    }

    pub fn router(&self) -> &RouterSystem {
        &self.router
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            topology: self.router.snapshot()?,
            connections: self.router.rules()?,
            config: StatusConfig {
                hostname: self.hostname.clone(),
                client_id: self.router.client_id(),
                client_name: self.router.client_name().to_string(),
            },
        })
    }

    /// Logs one line per device and edge.
    pub fn log_summary(&self) -> Result<()> {
        let status = self.status()?;
        for (id, device) in status.topology.devices() {
            tracing::info!("Device {} {:?}: {} port(s)", id, device.name, device.ports.len());
        }
        for (from, to) in status.topology.edges() {
            tracing::info!("Edge {} -> {}", from, to);
        }
        tracing::info!(
            "{} device(s), {} edge(s), {} stored rule(s)",
            status.topology.devices().len(),
            status.topology.edge_count(),
            status.connections.len()
        );
        Ok(())
    }

    pub fn shutdown(&self) {
        self.router.shutdown();
    }
}

fn read_hostname() -> String {
    match std::fs::read_to_string(HOSTNAME_PATH) {
        Ok(name) => name.trim().to_string(),
        Err(e) => {
            tracing::warn!("Could not read {}: {}", HOSTNAME_PATH, e);
            "unknown".to_string()
        }
    }
}
