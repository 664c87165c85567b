//! Shared data model for audit rules.
//!
//! Defines the full type hierarchy flowing through the system:
//! - `ParsedRule`: ephemeral output of instruction parsing, not yet persisted
//! - `AuditRule`: a persisted rule version with provenance and lifecycle state
//! - `ConversionResult`: the uniform return contract of every parsing entry point
//! - `VersionLogEntry`: one line of the append-only version history

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Rule type enum ──────────────────────────────────────────────────

/// Supported audit rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    ExpenseAmountThreshold,
    VendorFrequency,
    CategoryAmountThreshold,
    DuplicateDetection,
    TimeBased,
    ComplianceCheck,
}

impl RuleType {
    /// All rule types, in heuristic precedence order (compliance_check is
    /// never produced by the heuristic extractor and sorts last).
    pub const ALL: [RuleType; 6] = [
        RuleType::ExpenseAmountThreshold,
        RuleType::VendorFrequency,
        RuleType::CategoryAmountThreshold,
        RuleType::DuplicateDetection,
        RuleType::TimeBased,
        RuleType::ComplianceCheck,
    ];

    /// Wire name as it appears in JSON payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::ExpenseAmountThreshold => "expense_amount_threshold",
            RuleType::VendorFrequency => "vendor_frequency",
            RuleType::CategoryAmountThreshold => "category_amount_threshold",
            RuleType::DuplicateDetection => "duplicate_detection",
            RuleType::TimeBased => "time_based",
            RuleType::ComplianceCheck => "compliance_check",
        }
    }

    /// Human-readable form used in synthesized reasons ("expense amount threshold").
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "expense_amount_threshold" => Ok(RuleType::ExpenseAmountThreshold),
            "vendor_frequency" => Ok(RuleType::VendorFrequency),
            "category_amount_threshold" => Ok(RuleType::CategoryAmountThreshold),
            "duplicate_detection" => Ok(RuleType::DuplicateDetection),
            "time_based" => Ok(RuleType::TimeBased),
            "compliance_check" => Ok(RuleType::ComplianceCheck),
            other => Err(format!("unknown rule type: '{}'", other)),
        }
    }
}

// ── Condition operators ─────────────────────────────────────────────

/// Comparison operators permitted inside rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Gt,
    Lt,
    Eq,
    Ne,
    Contains,
    NotContains,
    In,
    NotIn,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Gt => "gt",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
        }
    }
}

/// How a condition combines with the next one in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

// ── Actions ─────────────────────────────────────────────────────────

/// What happens when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Flag,
    Review,
    Reject,
    Approve,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Flag => "flag",
            RuleAction::Review => "review",
            RuleAction::Reject => "reject",
            RuleAction::Approve => "approve",
        }
    }

    /// Capitalized form used in synthesized reasons.
    pub fn label(&self) -> &'static str {
        match self {
            RuleAction::Flag => "Flag",
            RuleAction::Review => "Review",
            RuleAction::Reject => "Reject",
            RuleAction::Approve => "Approve",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// A single machine-evaluable condition. Sequence order is evaluation order.
///
/// `value` is deliberately untyped — scalars and sequences are both legal
/// (e.g. `1000`, `"capital"`, `["travel", "meals"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

// ── Parsed rule (ephemeral) ─────────────────────────────────────────

/// Output of instruction parsing, before persistence.
///
/// An empty `conditions` vec is legal (degenerate rule). `reason` is always
/// non-empty and `confidence_score` lies in `[0.0, 1.0]`; both are enforced
/// when a rule is built from untrusted model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRule {
    pub rule_type: RuleType,
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
    pub reason: String,
    pub confidence_score: f64,
}

// ── Audit rule (persisted) ──────────────────────────────────────────

/// A persisted rule version.
///
/// Rules with structurally equal `(rule_type, conditions)` form a lineage;
/// saving into an existing lineage appends a new version and deactivates the
/// prior one. Old versions are never deleted by `save`, only flagged inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRule {
    pub id: String,
    pub version: u32,
    pub rule_type: RuleType,
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
    pub reason: String,
    pub confidence_score: f64,
    pub original_instruction: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub is_active: bool,
}

impl AuditRule {
    /// Lineage identity: exact structural equality of rule type and
    /// conditions (order- and value-sensitive).
    pub fn signature_matches(&self, rule: &ParsedRule) -> bool {
        self.rule_type == rule.rule_type && self.conditions == rule.conditions
    }
}

// ── Version history ─────────────────────────────────────────────────

/// One line of the append-only version history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionLogEntry {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub created_by: String,
    pub action: String,
}

// ── Conversion result ───────────────────────────────────────────────

/// Discriminated result of every parsing entry point.
///
/// Serializes as `{"success":true,"rule":{...}}` or
/// `{"success":false,"error":"...","suggestions":[...]}` — the `success`
/// field is always present so clients can branch without probing keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversionResult {
    Success {
        success: bool,
        rule: ParsedRule,
    },
    Failure {
        success: bool,
        error: String,
        suggestions: Vec<String>,
    },
}

impl ConversionResult {
    pub fn success(rule: ParsedRule) -> Self {
        ConversionResult::Success { success: true, rule }
    }

    pub fn failure(error: impl Into<String>, suggestions: Vec<String>) -> Self {
        ConversionResult::Failure {
            success: false,
            error: error.into(),
            suggestions,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success { .. })
    }

    /// The parsed rule, when conversion succeeded.
    pub fn rule(&self) -> Option<&ParsedRule> {
        match self {
            ConversionResult::Success { rule, .. } => Some(rule),
            ConversionResult::Failure { .. } => None,
        }
    }
}
