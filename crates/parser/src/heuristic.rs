//! Deterministic keyword/regex extraction used when no generation capability
//! is available or the model response cannot be used.
//!
//! The extractor is a deliberate low-confidence approximation: it recognizes
//! an action, a rule type, and at most one numeric amount condition. Anything
//! richer requires the model-backed path.

use std::sync::LazyLock;

use regex::Regex;

use regula_core::{Condition, ConditionOperator, ParsedRule, RuleAction, RuleType};

/// Confidence assigned to every heuristic result — signals "fallback, verify manually".
const FALLBACK_CONFIDENCE: f64 = 0.6;

/// Action keyword sets, scanned in this fixed category order. First category
/// with any hit wins.
const ACTION_KEYWORDS: [(RuleAction, &[&str]); 4] = [
    (RuleAction::Flag, &["flag", "alert", "highlight", "mark", "catch"]),
    (RuleAction::Review, &["review", "check", "verify", "examine", "audit"]),
    (RuleAction::Reject, &["reject", "deny", "block", "decline", "refuse"]),
    (RuleAction::Approve, &["approve", "accept", "allow", "permit"]),
];

/// Rule-type patterns in precedence order; the first match wins.
/// `compliance_check` is intentionally absent — it cannot be inferred from
/// surface keywords with any confidence.
static RULE_TYPE_PATTERNS: LazyLock<Vec<(RuleType, Regex)>> = LazyLock::new(|| {
    vec![
        (
            RuleType::ExpenseAmountThreshold,
            Regex::new(
                r"(expense|amount|cost|spend|payment|transaction|invoice)s?\b.*\b(over|above|exceed\w*|more than|greater|under|below|less than)",
            )
            .expect("expense pattern"),
        ),
        (
            RuleType::VendorFrequency,
            Regex::new(r"\b(vendor|supplier|merchant|payee)s?\b").expect("vendor pattern"),
        ),
        (
            RuleType::CategoryAmountThreshold,
            Regex::new(r"\b(category|categories|account code|gl code)\b").expect("category pattern"),
        ),
        (
            RuleType::DuplicateDetection,
            Regex::new(r"\b(duplicate|double.?bill\w*|same invoice|paid twice)").expect("duplicate pattern"),
        ),
        (
            RuleType::TimeBased,
            Regex::new(r"\b(weekend|after.?hours|holiday|outside business|end of (month|quarter|year)|time|date)\b")
                .expect("time pattern"),
        ),
    ]
});

/// First decimal-like token: optional currency mark, optional thousands
/// separators, optional fraction. Grouped alternative first so "$1,000.50"
/// is taken whole rather than stopping at "1".
static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]?\s*(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?").expect("amount pattern")
});

/// Extract a partial rule from a normalized (lowercased, trimmed) instruction.
///
/// Returns `None` when no rule type is recognized — a hard failure signal to
/// the caller, not an empty rule.
pub fn extract(normalized_instruction: &str) -> Option<ParsedRule> {
    let rule_type = detect_rule_type(normalized_instruction)?;
    let action = detect_action(normalized_instruction);

    let conditions = match extract_amount(normalized_instruction) {
        Some(amount) => vec![Condition {
            field: "amount".to_string(),
            operator: ConditionOperator::Gt,
            value: serde_json::Value::from(amount),
            logical_operator: None,
        }],
        None => Vec::new(),
    };

    Some(ParsedRule {
        rule_type,
        conditions,
        action,
        reason: format!("{} based on {}", action.label(), rule_type.label()),
        confidence_score: FALLBACK_CONFIDENCE,
    })
}

fn detect_action(instruction: &str) -> RuleAction {
    for (action, keywords) in ACTION_KEYWORDS {
        if keywords.iter().any(|kw| instruction.contains(kw)) {
            return action;
        }
    }
    RuleAction::Flag
}

fn detect_rule_type(instruction: &str) -> Option<RuleType> {
    RULE_TYPE_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(instruction))
        .map(|(rule_type, _)| *rule_type)
}

/// Parse the first decimal-like token, tolerating a currency mark and
/// thousands separators.
fn extract_amount(instruction: &str) -> Option<f64> {
    let token = AMOUNT_PATTERN.find(instruction)?.as_str();
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expense_threshold_with_currency_amount() {
        let rule = extract("flag any expense above $1,000").unwrap();
        assert_eq!(rule.rule_type, RuleType::ExpenseAmountThreshold);
        assert_eq!(rule.action, RuleAction::Flag);
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.conditions[0].field, "amount");
        assert_eq!(rule.conditions[0].operator, ConditionOperator::Gt);
        assert_eq!(rule.conditions[0].value, json!(1000.0));
        assert_eq!(rule.confidence_score, 0.6);
        assert_eq!(rule.reason, "Flag based on expense amount threshold");
    }

    #[test]
    fn vendor_wins_over_time_based() {
        // Matches both the vendor pattern and the time pattern; precedence
        // order resolves to vendor_frequency.
        let rule = extract("review vendors paid on the weekend").unwrap();
        assert_eq!(rule.rule_type, RuleType::VendorFrequency);
        assert_eq!(rule.action, RuleAction::Review);
    }

    #[test]
    fn unrecognized_instruction_is_a_hard_failure() {
        assert!(extract("hello world").is_none());
    }

    #[test]
    fn action_defaults_to_flag() {
        let rule = extract("expenses over 500").unwrap();
        assert_eq!(rule.action, RuleAction::Flag);
    }

    #[test]
    fn action_category_order_is_fixed() {
        // "flag" appears after "review" in the text, but the flag category is
        // scanned first and wins.
        let rule = extract("review and flag expenses above 100").unwrap();
        assert_eq!(rule.action, RuleAction::Flag);
    }

    #[test]
    fn reject_keywords() {
        let rule = extract("deny duplicate invoices").unwrap();
        assert_eq!(rule.rule_type, RuleType::DuplicateDetection);
        assert_eq!(rule.action, RuleAction::Reject);
    }

    #[test]
    fn at_most_one_numeric_condition() {
        let rule = extract("flag payments over $2,500.75 or over 9000").unwrap();
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.conditions[0].value, json!(2500.75));
    }

    #[test]
    fn no_amount_yields_degenerate_rule() {
        let rule = extract("review transactions exceeding the usual amount").unwrap();
        assert_eq!(rule.rule_type, RuleType::ExpenseAmountThreshold);
        assert!(rule.conditions.is_empty());
    }

    #[test]
    fn plain_integer_amount() {
        let rule = extract("flag invoices above 750").unwrap();
        assert_eq!(rule.conditions[0].value, json!(750.0));
    }
}
