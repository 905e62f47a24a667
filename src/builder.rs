//! Builder for configuring and constructing a `SeqRouteDaemon`.

use crate::config::Config;
use crate::{Result, SeqRouteDaemon};
use seqroute_core::{JsonRuleStore, MemoryRuleStore, RuleStore, Sequencer};
use seqroute_io::RouterSystem;
use std::path::PathBuf;
use std::sync::Arc;

/// Starts from [`Config::default`]; individual setters override it.
///
/// # Example
///
/// ```ignore
/// use seqroute::prelude::*;
///
/// let daemon = SeqRouteDaemon::builder()
///     .client_name("studio")
///     .rules_path(Some("/var/lib/seqroute/connections.json".into()))
///     .build(Arc::new(MemorySequencer::new(128)))?;
///
/// println!("{}", serde_json::to_string(&daemon.status()?)?);
/// ```
#[derive(Default)]
pub struct SeqRouteDaemonBuilder {
    config: Config,
    rules: Option<Arc<dyn RuleStore>>,
}

impl SeqRouteDaemonBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// `None` keeps rules in memory.
    pub fn rules_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.rules_path = path;
        self
    }

    /// Default: 10
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn startup_reconcile(mut self, enabled: bool) -> Self {
        self.config.startup_reconcile = enabled;
        self
    }

    /// Takes precedence over `rules_path`.
    pub fn rule_store(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn build(self, seq: Arc<dyn Sequencer>) -> Result<SeqRouteDaemon> {
        self.config.validate()?;

        let rules: Arc<dyn RuleStore> = match (self.rules, &self.config.rules_path) {
            (Some(rules), _) => rules,
            (None, Some(path)) => Arc::new(JsonRuleStore::open(path)?),
            (None, None) => {
                tracing::info!("Keeping rules in memory only");
                Arc::new(MemoryRuleStore::new())
            }
        };

        let router = RouterSystem::builder()
            .client_name(self.config.client_name.as_str())
            .queue_capacity(self.config.queue_capacity)
            .startup_reconcile(self.config.startup_reconcile)
            .rule_store(rules)
            .build(seq)?;

        Ok(SeqRouteDaemon::from_parts(router, self.config))
    }

    /// Opens the kernel sequencer and builds on it.
    #[cfg(feature = "alsa")]
    pub fn build_alsa(self) -> Result<SeqRouteDaemon> {
        let seq = seqroute_io::AlsaSequencer::open()?;
        self.build(Arc::new(seq))
    }
}
