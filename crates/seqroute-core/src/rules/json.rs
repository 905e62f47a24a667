//! Rule store persisted as a JSON document.
//!
//! Every mutation rewrites the whole file through a temporary sibling and a
//! rename, so a crash never leaves a half-written rule set behind.

use super::RuleStore;
use crate::error::Result;
use crate::model::ConnectionRule;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleFile {
    #[serde(default)]
    connections: Vec<ConnectionRule>,
}

#[derive(Debug)]
pub struct JsonRuleStore {
    path: PathBuf,
    rules: Mutex<Vec<ConnectionRule>>,
}

impl JsonRuleStore {
    /// Opens (or starts) the rule file at `path`. A missing file is an empty
    /// rule set; its parent directory is created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str::<RuleFile>(&text)?.connections
            }
        } else {
            Vec::new()
        };

        tracing::info!("Loaded {} rules from {}", rules.len(), path.display());

        Ok(Self {
            path,
            rules: Mutex::new(rules),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, rules: &[ConnectionRule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = RuleFile {
            connections: rules.to_vec(),
        };
        let text = serde_json::to_string_pretty(&file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RuleStore for JsonRuleStore {
    fn find_from(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.from_matches(device, port))
            .cloned()
            .collect())
    }

    fn find_to(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>> {
        Ok(self
            .rules
            .lock()
            .iter()
            .filter(|r| r.to_matches(device, port))
            .cloned()
            .collect())
    }

    // Mutations build the next rule set, write it, then swap it in, so
    // memory never runs ahead of the file.

    fn create(&self, rule: ConnectionRule) -> Result<()> {
        let mut rules = self.rules.lock();
        if rules.contains(&rule) {
            return Ok(());
        }
        let mut next = rules.clone();
        next.push(rule);
        self.persist(&next)?;
        *rules = next;
        Ok(())
    }

    fn delete(&self, rule: &ConnectionRule) -> Result<usize> {
        let mut rules = self.rules.lock();
        let next: Vec<ConnectionRule> = rules.iter().filter(|r| *r != rule).cloned().collect();
        let removed = rules.len() - next.len();
        if removed > 0 {
            self.persist(&next)?;
            *rules = next;
        }
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<ConnectionRule>> {
        Ok(self.rules.lock().clone())
    }
}
