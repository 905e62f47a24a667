//! Persisted routing rules.
//!
//! The reconciliation engine only needs name lookups from either side,
//! creation, and exact-key deletion. Storage is up to the implementation.

mod json;
mod memory;

pub use json::JsonRuleStore;
pub use memory::MemoryRuleStore;

use crate::error::Result;
use crate::model::ConnectionRule;

pub trait RuleStore: Send + Sync {
    /// Rules whose *from* side is `(device, port)`.
    fn find_from(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>>;

    /// Rules whose *to* side is `(device, port)`.
    fn find_to(&self, device: &str, port: &str) -> Result<Vec<ConnectionRule>>;

    /// Stores a rule. Creating a rule that already exists is not an error.
    fn create(&self, rule: ConnectionRule) -> Result<()>;

    /// Deletes rules equal to `rule` on all four fields; returns how many.
    fn delete(&self, rule: &ConnectionRule) -> Result<usize>;

    fn list(&self) -> Result<Vec<ConnectionRule>>;
}
