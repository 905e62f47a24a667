use super::RuleStore;
use crate::error::Result;
use crate::model::ConnectionRule;
use parking_lot::RwLock;

/// Volatile rule store; rules live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<ConnectionRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = ConnectionRule>) -> Self {
        let store = Self::new();
        {
            let mut stored = store.rules.write();
            for rule in rules {
                if !stored.contains(&rule) {
                    stored.push(rule);
                }
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl RuleStore for MemoryRuleStore {
    fn find_from(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.from_matches(device, port))
            .cloned()
            .collect())
    }

    fn find_to(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.to_matches(device, port))
            .cloned()
            .collect())
    }

    fn create(&self, rule: ConnectionRule) -> Result<()> {
        let mut rules = self.rules.write();
        if !rules.contains(&rule) {
            rules.push(rule);
        }
        Ok(())
    }

    fn delete(&self, rule: &ConnectionRule) -> Result<usize> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r != rule);
        Ok(before - rules.len())
    }

    fn list(&self) -> Result<Vec<ConnectionRule>> {
        Ok(self.rules.read().clone())
    }
}
