//! Persistence for installed rule metadata.
//!
//! The condition graph and trigger/action closures a rule is built from are runtime-only; what
//! gets persisted is the bookkeeping record needed to list active rules and detect duplicate
//! installs, mirroring the source `RuleHandler`'s `_active_rules` registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use hearth_common::{HearthError, Result};

/// Whether a rule reacts to a condition or runs on a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Trigger,
    Scheduled,
}

/// Metadata about an installed rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub name: String,
    pub kind: RuleKind,
    pub description: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl RuleRecord {
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            installed_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Tracks which rules are currently installed.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Register a rule. Fails with [`HearthError::DuplicateRule`] if a rule with this name is
    /// already installed.
    async fn install(&self, record: RuleRecord) -> Result<()>;

    /// Remove a rule. Fails with [`HearthError::RuleNotFound`] if no rule with this name exists.
    async fn uninstall(&self, name: &str) -> Result<RuleRecord>;

    async fn get(&self, name: &str) -> Result<Option<RuleRecord>>;

    async fn list(&self) -> Result<Vec<RuleRecord>>;
}

/// In-memory [`RuleStore`] suitable for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: DashMap<String, RuleRecord>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn install(&self, record: RuleRecord) -> Result<()> {
        if self.rules.contains_key(&record.name) {
            return Err(HearthError::DuplicateRule(record.name.clone()));
        }
        self.rules.insert(record.name.clone(), record);
        Ok(())
    }

    async fn uninstall(&self, name: &str) -> Result<RuleRecord> {
        self.rules
            .remove(name)
            .map(|(_, record)| record)
            .ok_or_else(|| HearthError::RuleNotFound(name.to_string()))
    }

    async fn get(&self, name: &str) -> Result<Option<RuleRecord>> {
        Ok(self.rules.get(name).map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<RuleRecord>> {
        Ok(self.rules.iter().map(|entry| entry.value().clone()).collect())
    }
}
