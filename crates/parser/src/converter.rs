//! Model-backed rule conversion with deterministic degradation.
//!
//! `RuleConverter` wraps an optional [`TextGenerator`] — the adapter is
//! "available" iff a provider was successfully constructed at startup. Every
//! failure mode (missing capability, transport error, malformed or missing
//! JSON, schema violation) is absorbed and demoted to the heuristic
//! extractor; callers always receive a terminal [`ConversionResult`].

use serde_json::Value;
use tracing::{debug, warn};

use regula_core::{Config, ConversionResult, ParsedRule};
use regula_llm::{LlmError, TextGenerator};

use crate::{extract, heuristic, prompt};

/// Queryable adapter state, independent of any parse call.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserStatus {
    pub available: bool,
    pub credential_present: bool,
}

#[derive(Debug, thiserror::Error)]
enum ConvertError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("No JSON found in response")]
    NoJson,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema validation failed: {0}")]
    Schema(String),
}

pub struct RuleConverter {
    provider: Option<Box<dyn TextGenerator>>,
    credential_present: bool,
    temperature: f32,
    max_tokens: u32,
}

impl RuleConverter {
    /// Build with an explicit (possibly absent) generation capability.
    /// Tests inject a deterministic fake provider here.
    pub fn new(
        provider: Option<Box<dyn TextGenerator>>,
        credential_present: bool,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            credential_present,
            temperature,
            max_tokens,
        }
    }

    /// Build from config. A provider that cannot be constructed (missing
    /// credential, unknown backend) degrades to heuristic-only parsing
    /// rather than failing startup.
    pub fn from_config(config: &Config) -> Self {
        let credential_present = config.llm.is_configured();
        let provider = match regula_llm::create_provider(&config.llm, &config.ollama) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("LLM provider unavailable, parsing falls back to heuristics: {}", e);
                None
            }
        };
        Self::new(
            provider,
            credential_present,
            config.llm.temperature,
            config.llm.max_tokens,
        )
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn status(&self) -> ParserStatus {
        ParserStatus {
            available: self.provider.is_some(),
            credential_present: self.credential_present,
        }
    }

    /// Convert an instruction into a rule. Never panics and never surfaces an
    /// error type — the model round-trip is the only suspend point, and every
    /// failure along it falls through to the heuristic extractor.
    pub async fn parse(&self, instruction: &str) -> ConversionResult {
        if let Some(provider) = &self.provider {
            match self.parse_with_model(provider.as_ref(), instruction).await {
                Ok(rule) => return ConversionResult::success(rule),
                Err(e) => warn!("model parse failed, falling back to heuristics: {}", e),
            }
        } else {
            debug!("no generation capability; using heuristic extraction");
        }

        self.heuristic_fallback(instruction)
    }

    async fn parse_with_model(
        &self,
        provider: &dyn TextGenerator,
        instruction: &str,
    ) -> Result<ParsedRule, ConvertError> {
        let response = provider
            .generate(
                prompt::SYSTEM_PROMPT,
                &prompt::user_prompt(instruction),
                self.temperature,
                self.max_tokens,
            )
            .await?;

        debug!("model response: {}", response);

        let json_str = extract::first_json_object(&response).ok_or(ConvertError::NoJson)?;
        let value: Value = serde_json::from_str(json_str)?;
        validate_shape(&value)?;

        serde_json::from_value(value).map_err(|e| ConvertError::Schema(e.to_string()))
    }

    fn heuristic_fallback(&self, instruction: &str) -> ConversionResult {
        let normalized = instruction.trim().to_lowercase();
        match heuristic::extract(&normalized) {
            Some(rule) => ConversionResult::success(rule),
            None => ConversionResult::failure(
                "Could not determine a rule type from the instruction",
                vec![
                    "Check that an LLM API key is configured to enable model-backed parsing"
                        .to_string(),
                    "Use clearer keywords such as amount, vendor, category, duplicate, or time"
                        .to_string(),
                    "Include a numeric threshold, e.g. \"over $1,000\"".to_string(),
                ],
            ),
        }
    }
}

/// Shape checks applied to the extracted object before the typed decode.
/// Violations reject the response; they never reject the request.
fn validate_shape(value: &Value) -> Result<(), ConvertError> {
    let schema = |msg: &str| ConvertError::Schema(msg.to_string());

    let obj = value
        .as_object()
        .ok_or_else(|| schema("response is not a JSON object"))?;

    if !obj.get("rule_type").is_some_and(Value::is_string) {
        return Err(schema("rule_type must be a string"));
    }
    let conditions = obj
        .get("conditions")
        .and_then(Value::as_array)
        .ok_or_else(|| schema("conditions must be an array"))?;
    if !obj.get("action").is_some_and(Value::is_string) {
        return Err(schema("action must be a string"));
    }
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| schema("reason must be a string"))?;
    if reason.is_empty() {
        return Err(schema("reason must not be empty"));
    }
    let score = obj
        .get("confidence_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| schema("confidence_score must be numeric"))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(ConvertError::Schema(format!(
            "confidence_score {} outside [0, 1]",
            score
        )));
    }

    for (i, condition) in conditions.iter().enumerate() {
        let cond = condition
            .as_object()
            .ok_or_else(|| ConvertError::Schema(format!("condition {} is not an object", i)))?;
        if !cond.get("field").and_then(Value::as_str).is_some_and(|f| !f.is_empty()) {
            return Err(ConvertError::Schema(format!("condition {} has no field", i)));
        }
        if !cond.get("operator").and_then(Value::as_str).is_some_and(|o| !o.is_empty()) {
            return Err(ConvertError::Schema(format!("condition {} has no operator", i)));
        }
        // A null value is a value; a missing key is not.
        if !cond.contains_key("value") {
            return Err(ConvertError::Schema(format!("condition {} has no value", i)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use regula_core::{ConditionOperator, RuleAction, RuleType};

    /// Deterministic stand-in for the generation capability.
    struct FakeGenerator {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeGenerator {
        fn replying(reply: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    reply: Some(reply.to_string()),
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(
            &self,
            _system: &str,
            _prompt: &str,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(LlmError::ApiError {
                    status: 500,
                    body: "backend down".to_string(),
                }),
            }
        }
    }

    fn converter_with(provider: FakeGenerator) -> RuleConverter {
        RuleConverter::new(Some(Box::new(provider)), true, 0.1, 1024)
    }

    fn converter_without_provider() -> RuleConverter {
        RuleConverter::new(None, false, 0.1, 1024)
    }

    const VALID_REPLY: &str = r#"{"rule_type":"category_amount_threshold","conditions":[{"field":"category","operator":"eq","value":"travel","logical_operator":"AND"},{"field":"amount","operator":"gt","value":500}],"action":"review","reason":"Travel expenses above policy limit","confidence_score":0.92}"#;

    #[tokio::test]
    async fn model_reply_is_parsed() {
        let (fake, _) = FakeGenerator::replying(VALID_REPLY);
        let result = converter_with(fake).parse("review travel expenses over 500").await;
        let rule = result.rule().expect("success");
        assert_eq!(rule.rule_type, RuleType::CategoryAmountThreshold);
        assert_eq!(rule.action, RuleAction::Review);
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.conditions[1].operator, ConditionOperator::Gt);
    }

    #[tokio::test]
    async fn model_reply_wrapped_in_prose_is_parsed() {
        let wrapped = format!("Here is your rule:\n{}\nHope this helps!", VALID_REPLY);
        let (fake, _) = FakeGenerator::replying(&wrapped);
        let result = converter_with(fake).parse("review travel expenses over 500").await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn unavailable_adapter_uses_heuristics_without_network() {
        let converter = converter_without_provider();
        assert!(!converter.is_available());

        let result = converter.parse("Flag any expense above $1,000").await;
        let rule = result.rule().expect("heuristic success");
        assert_eq!(rule.rule_type, RuleType::ExpenseAmountThreshold);
        assert_eq!(rule.action, RuleAction::Flag);
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.conditions[0].field, "amount");
        assert_eq!(rule.conditions[0].operator, ConditionOperator::Gt);
        assert_eq!(rule.conditions[0].value, json!(1000.0));
        assert_eq!(rule.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_heuristics() {
        let result = converter_with(FakeGenerator::failing())
            .parse("Flag any expense above $1,000")
            .await;
        let rule = result.rule().expect("heuristic success");
        assert_eq!(rule.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn garbage_reply_falls_back_to_heuristics() {
        let (fake, calls) = FakeGenerator::replying("I cannot help with that.");
        let result = converter_with(fake).parse("flag expenses over 100").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let rule = result.rule().expect("heuristic success");
        assert_eq!(rule.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn garbage_reply_and_no_heuristic_match_is_terminal_failure() {
        let (fake, _) = FakeGenerator::replying("no json here");
        let result = converter_with(fake).parse("do something unquantifiable").await;
        match result {
            ConversionResult::Failure { success, suggestions, .. } => {
                assert!(!success);
                assert!(!suggestions.is_empty());
            }
            ConversionResult::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let bad = VALID_REPLY.replace("0.92", "1.5");
        let (fake, _) = FakeGenerator::replying(&bad);
        // Falls back to heuristics, which recognize the amount keywords.
        let result = converter_with(fake).parse("review travel category expenses over 500").await;
        let rule = result.rule().expect("heuristic fallback");
        assert_eq!(rule.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn condition_missing_value_is_rejected() {
        let reply = r#"{"rule_type":"time_based","conditions":[{"field":"day","operator":"eq"}],"action":"flag","reason":"r","confidence_score":0.8}"#;
        let (fake, _) = FakeGenerator::replying(reply);
        let result = converter_with(fake).parse("flag weekend submissions by date").await;
        // Schema rejection, then the heuristic recognizes the time keywords.
        let rule = result.rule().expect("heuristic fallback");
        assert_eq!(rule.rule_type, RuleType::TimeBased);
    }

    #[tokio::test]
    async fn null_condition_value_is_accepted() {
        let reply = r#"{"rule_type":"compliance_check","conditions":[{"field":"approval","operator":"eq","value":null}],"action":"reject","reason":"Missing approvals are non-compliant","confidence_score":0.7}"#;
        let (fake, _) = FakeGenerator::replying(reply);
        let result = converter_with(fake).parse("reject entries without approval").await;
        let rule = result.rule().expect("success");
        assert_eq!(rule.rule_type, RuleType::ComplianceCheck);
        assert!(rule.conditions[0].value.is_null());
    }

    #[tokio::test]
    async fn unknown_rule_type_string_is_rejected_at_decode() {
        let reply = r#"{"rule_type":"made_up","conditions":[],"action":"flag","reason":"r","confidence_score":0.8}"#;
        let (fake, _) = FakeGenerator::replying(reply);
        let result = converter_with(fake).parse("flag expenses over 100").await;
        let rule = result.rule().expect("heuristic fallback");
        assert_eq!(rule.rule_type, RuleType::ExpenseAmountThreshold);
    }

    #[test]
    fn status_reports_availability_and_credential() {
        let status = converter_without_provider().status();
        assert!(!status.available);
        assert!(!status.credential_present);

        let (fake, _) = FakeGenerator::replying("{}");
        let status = converter_with(fake).status();
        assert!(status.available);
        assert!(status.credential_present);
    }

    #[test]
    fn validate_shape_error_messages() {
        let missing_json = extract::first_json_object("nothing");
        assert!(missing_json.is_none());

        let err = validate_shape(&json!({"rule_type": 7})).unwrap_err();
        assert!(err.to_string().contains("rule_type"));

        let err = validate_shape(&json!({
            "rule_type": "time_based",
            "conditions": "not an array",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("conditions"));
    }
}
