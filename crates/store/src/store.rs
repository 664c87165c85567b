//! Versioned audit-rule store.
//!
//! Rules are deduplicated by content: a save whose `(rule_type, conditions)`
//! signature matches an active rule supersedes it as a new version instead of
//! inserting a duplicate. Old versions are never deleted by `save`, only
//! flagged inactive, and every save appends to a version-history log.
//!
//! All operations are synchronous read-modify-write against the key-value
//! substrate. The store assumes a single logical writer — independent
//! processes sharing the same backing storage will lose updates; that is a
//! documented limitation of the design, not something this layer locks
//! around.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use regula_core::{AuditRule, ParsedRule, RuleType, VersionLogEntry};

use crate::kv::{KvStore, MemoryKv, StoreError};

/// Logical key holding the rules collection.
const RULES_KEY: &str = "audit_rules";
/// Logical key holding the append-only version-history log.
const HISTORY_KEY: &str = "rule_version_history";

/// Aggregate counts. `total` spans all rules; the breakdowns count active
/// rules only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub by_type: HashMap<String, usize>,
    pub by_action: HashMap<String, usize>,
}

pub struct RuleStore {
    kv: Box<dyn KvStore>,
}

impl RuleStore {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryKv::new()))
    }

    // ── Substrate I/O ─────────────────────────────────────────────

    fn load_rules(&self) -> Result<Vec<AuditRule>, StoreError> {
        match self.kv.get(RULES_KEY)? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_rules(&self, rules: &[AuditRule]) -> Result<(), StoreError> {
        self.kv.set(RULES_KEY, &serde_json::to_string(rules)?)
    }

    fn load_history(&self) -> Result<Vec<VersionLogEntry>, StoreError> {
        match self.kv.get(HISTORY_KEY)? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_history(&self, history: &[VersionLogEntry]) -> Result<(), StoreError> {
        self.kv.set(HISTORY_KEY, &serde_json::to_string(history)?)
    }

    // ── Operations ────────────────────────────────────────────────

    /// Persist a parsed rule.
    ///
    /// A matching active signature is superseded: the new entry clones the
    /// active version with a fresh id, incremented version, and re-stamped
    /// `created_at`/`created_by`/`confidence_score`; the prior version is
    /// deactivated. This is the only path that increments `version`.
    pub fn save(
        &self,
        parsed: &ParsedRule,
        original_instruction: &str,
        created_by: &str,
    ) -> Result<AuditRule, StoreError> {
        let mut rules = self.load_rules()?;

        let matching: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active && r.signature_matches(parsed))
            .map(|(i, _)| i)
            .collect();

        if matching.len() > 1 {
            // save/rollback keep at most one active version per lineage;
            // seeing more means the backing data was edited out-of-band.
            warn!(
                "{} active rules share one {} signature; superseding all",
                matching.len(),
                parsed.rule_type
            );
        }

        let rule = match matching.iter().copied().max_by_key(|&i| rules[i].version) {
            Some(prior) => {
                let mut next = rules[prior].clone();
                next.id = Uuid::new_v4().to_string();
                next.version += 1;
                next.confidence_score = parsed.confidence_score;
                next.created_at = Utc::now();
                next.created_by = created_by.to_string();
                next.is_active = true;
                next
            }
            None => AuditRule {
                id: Uuid::new_v4().to_string(),
                version: 1,
                rule_type: parsed.rule_type,
                conditions: parsed.conditions.clone(),
                action: parsed.action,
                reason: parsed.reason.clone(),
                confidence_score: parsed.confidence_score,
                original_instruction: original_instruction.to_string(),
                created_at: Utc::now(),
                created_by: created_by.to_string(),
                is_active: true,
            },
        };

        for &i in &matching {
            rules[i].is_active = false;
        }
        rules.push(rule.clone());
        self.save_rules(&rules)?;

        let mut history = self.load_history()?;
        history.push(VersionLogEntry {
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type,
            version: rule.version,
            timestamp: rule.created_at,
            created_by: rule.created_by.clone(),
            action: "created".to_string(),
        });
        self.save_history(&history)?;

        info!("Saved rule '{}' ({} v{})", rule.id, rule.rule_type, rule.version);
        Ok(rule)
    }

    /// All rules ever saved, in insertion order.
    pub fn get_all(&self) -> Result<Vec<AuditRule>, StoreError> {
        self.load_rules()
    }

    pub fn get_active(&self) -> Result<Vec<AuditRule>, StoreError> {
        Ok(self.load_rules()?.into_iter().filter(|r| r.is_active).collect())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<AuditRule>, StoreError> {
        Ok(self.load_rules()?.into_iter().find(|r| r.id == id))
    }

    /// All versions of a rule type, latest first.
    pub fn get_versions(&self, rule_type: RuleType) -> Result<Vec<AuditRule>, StoreError> {
        let mut versions: Vec<AuditRule> = self
            .load_rules()?
            .into_iter()
            .filter(|r| r.rule_type == rule_type)
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    /// The append-only version-history log, oldest first.
    pub fn get_history(&self) -> Result<Vec<VersionLogEntry>, StoreError> {
        self.load_history()
    }

    /// Flip a rule inactive. Returns false for an unknown id. Does not
    /// promote another version — a lineage may end with zero active rules.
    pub fn deactivate(&self, id: &str) -> Result<bool, StoreError> {
        let mut rules = self.load_rules()?;
        let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        rule.is_active = false;
        self.save_rules(&rules)?;
        info!("Deactivated rule '{}'", id);
        Ok(true)
    }

    /// Reactivate a prior version of a rule type.
    ///
    /// Deactivates every active rule of the type (defensively — there should
    /// be at most one), then activates the target. Returns `None` without
    /// touching anything when the `(rule_type, version)` pair does not
    /// exist; returns the target unchanged when it is already the active
    /// version.
    pub fn rollback(
        &self,
        rule_type: RuleType,
        version: u32,
    ) -> Result<Option<AuditRule>, StoreError> {
        let mut rules = self.load_rules()?;

        let Some(target) = rules
            .iter()
            .position(|r| r.rule_type == rule_type && r.version == version)
        else {
            return Ok(None);
        };

        let active: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(i, r)| *i != target && r.rule_type == rule_type && r.is_active)
            .map(|(i, _)| i)
            .collect();
        if active.len() > 1 {
            warn!(
                "{} active {} rules found during rollback; deactivating all",
                active.len(),
                rule_type
            );
        }

        if active.is_empty() && rules[target].is_active {
            // Rolling back to the already-active version: nothing to change.
            return Ok(Some(rules[target].clone()));
        }

        for &i in &active {
            rules[i].is_active = false;
        }
        rules[target].is_active = true;
        self.save_rules(&rules)?;

        info!("Rolled back {} to v{}", rule_type, version);
        Ok(Some(rules[target].clone()))
    }

    /// Hard removal, bypassing the append-only history guarantee for that
    /// lineage. Returns false for an unknown id.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut rules = self.load_rules()?;
        let len_before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == len_before {
            return Ok(false);
        }
        self.save_rules(&rules)?;
        info!("Deleted rule '{}'", id);
        Ok(true)
    }

    /// Pretty-printed dump of all rules, active or not.
    pub fn export_all(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.load_rules()?)?)
    }

    /// Replace the store contents with a previously exported dump.
    ///
    /// All-or-nothing: any element failing validation (non-empty `id`,
    /// `rule_type`, `action`, a `conditions` array, a `version` key) leaves
    /// the store untouched and returns false. Ids are preserved verbatim.
    pub fn import_all(&self, serialized: &str) -> Result<bool, StoreError> {
        let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(serialized) else {
            warn!("Import rejected: payload is not a JSON array");
            return Ok(false);
        };

        for (i, value) in values.iter().enumerate() {
            if !import_element_is_valid(value) {
                warn!("Import rejected: element {} failed validation", i);
                return Ok(false);
            }
        }

        // Full typed decode so nothing half-shaped lands in the store.
        let rules: Vec<AuditRule> = match serde_json::from_str(serialized) {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Import rejected: {}", e);
                return Ok(false);
            }
        };

        self.save_rules(&rules)?;
        info!("Imported {} rules", rules.len());
        Ok(true)
    }

    /// Wipe all rules and the version-history log.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.save_rules(&[])?;
        self.save_history(&[])?;
        info!("Cleared rule store");
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let rules = self.load_rules()?;
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_action: HashMap<String, usize> = HashMap::new();
        let mut active = 0;

        for rule in rules.iter().filter(|r| r.is_active) {
            active += 1;
            *by_type.entry(rule.rule_type.to_string()).or_insert(0) += 1;
            *by_action.entry(rule.action.to_string()).or_insert(0) += 1;
        }

        Ok(StoreStats {
            total: rules.len(),
            active,
            by_type,
            by_action,
        })
    }
}

fn import_element_is_valid(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let non_empty_str =
        |key: &str| obj.get(key).and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty());

    non_empty_str("id")
        && non_empty_str("rule_type")
        && non_empty_str("action")
        && obj.get("conditions").is_some_and(|v| v.is_array())
        && obj.contains_key("version")
}
