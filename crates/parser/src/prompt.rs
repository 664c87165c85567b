//! Fixed prompt template for the model-backed conversion call.
//!
//! The template never changes a condition or restructures meaning — only the
//! instruction text is substituted into the user prompt.

pub const SYSTEM_PROMPT: &str = r#"You are an audit rule converter. You turn one plain-English audit instruction into exactly one JSON object describing a machine-evaluable rule.

The object must have exactly these fields:
- "rule_type": one of "expense_amount_threshold", "vendor_frequency", "category_amount_threshold", "duplicate_detection", "time_based", "compliance_check"
- "conditions": array of {"field": string, "operator": string, "value": scalar or array, "logical_operator": "AND" or "OR" (optional, links to the next condition)}
- "action": one of "flag", "review", "reject", "approve"
- "reason": short human-readable explanation of what the rule catches
- "confidence_score": number between 0.0 and 1.0

Allowed operators: "gt", "lt", "eq", "ne", "contains", "not_contains", "in", "not_in".

Examples:

Instruction: Flag any expense over $1,000 that is not marked as capital expenditure
{"rule_type":"expense_amount_threshold","conditions":[{"field":"amount","operator":"gt","value":1000,"logical_operator":"AND"},{"field":"category","operator":"ne","value":"capital"}],"action":"flag","reason":"Large expenses outside capital expenditure need attention","confidence_score":0.95}

Instruction: Review vendors we paid more than 10 times this month
{"rule_type":"vendor_frequency","conditions":[{"field":"vendor_payment_count","operator":"gt","value":10}],"action":"review","reason":"High-frequency vendor payments can hide split invoices","confidence_score":0.9}

Instruction: Reject invoices submitted on weekends or holidays
{"rule_type":"time_based","conditions":[{"field":"submission_day","operator":"in","value":["saturday","sunday","holiday"]}],"action":"reject","reason":"Out-of-hours submissions bypass normal review","confidence_score":0.85}

Respond with a single JSON object and nothing else — no explanation, no code fences."#;

/// Build the user prompt for a single instruction.
pub fn user_prompt(instruction: &str) -> String {
    format!(
        "Convert this audit instruction to a rule JSON object:\n\n{}\n\nRespond ONLY with the JSON object.",
        instruction
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_every_permitted_value() {
        for rule_type in regula_core::RuleType::ALL {
            assert!(SYSTEM_PROMPT.contains(rule_type.as_str()), "missing {}", rule_type);
        }
        for op in ["gt", "lt", "eq", "ne", "contains", "not_contains", "in", "not_in"] {
            assert!(SYSTEM_PROMPT.contains(&format!("\"{}\"", op)), "missing {}", op);
        }
        for action in ["flag", "review", "reject", "approve"] {
            assert!(SYSTEM_PROMPT.contains(&format!("\"{}\"", action)), "missing {}", action);
        }
    }

    #[test]
    fn user_prompt_substitutes_only_the_instruction() {
        let a = user_prompt("flag weekend expenses");
        let b = user_prompt("review vendor payments");
        assert!(a.contains("flag weekend expenses"));
        assert_eq!(
            a.replace("flag weekend expenses", "X"),
            b.replace("review vendor payments", "X"),
        );
    }
}
