//! Rule evaluation service
//!
//! Guards on edges and stored business rules share one expression language,
//! JMESPath over the instance variables. Evaluation is pure: same variables,
//! same verdict, no clock, no randomness, no I/O.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::domain::repository::RuleRepository;
use crate::domain::rule::{BusinessRule, RuleId};
use crate::error::EngineError;
use crate::types::{is_truthy, Variables};

/// Evaluates guard expressions against instance variables
pub trait RuleEvaluator: Send + Sync {
    /// Evaluate an expression to its raw value
    fn evaluate_value(&self, expression: &str, variables: &Variables)
        -> Result<Value, EngineError>;

    /// Compile-check an expression without evaluating it
    fn check(&self, expression: &str) -> Result<(), EngineError>;

    /// Evaluate an expression to a boolean verdict
    ///
    /// Null, false, empty string, empty array, and empty object are falsy;
    /// everything else, including 0, is truthy.
    fn evaluate(&self, expression: &str, variables: &Variables) -> Result<bool, EngineError> {
        Ok(is_truthy(&self.evaluate_value(expression, variables)?))
    }
}

/// JMESPath-backed evaluator
///
/// Guard authors write `amount > 100` rather than JMESPath's literal form
/// ``amount > `100` ``, so bare numeric and keyword literals are wrapped in
/// backticks before compiling.
pub struct JmespathRuleEvaluator;

impl JmespathRuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Wrap bare number, true, false, and null tokens in backticks
    ///
    /// Tokens inside raw strings, quoted identifiers, or existing backtick
    /// literals are left untouched.
    fn rewrite_literals(expression: &str) -> String {
        let chars: Vec<char> = expression.chars().collect();
        let mut out = String::with_capacity(expression.len() + 8);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            // Skip over quoted and literal regions verbatim
            if c == '\'' || c == '"' || c == '`' {
                let quote = c;
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == quote && chars[i - 1] != '\\' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                continue;
            }

            let prev_is_ident = i > 0
                && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_' || chars[i - 1] == '.');

            // Bare number, optionally signed when the sign cannot bind to an
            // identifier
            if c.is_ascii_digit() && !prev_is_ident {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                out.push('`');
                out.extend(&chars[start..i]);
                out.push('`');
                continue;
            }

            // Bare keyword literal
            if c.is_alphabetic() && !prev_is_ident {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let next_is_member = i < chars.len() && chars[i] == '.';
                if !next_is_member && matches!(word.as_str(), "true" | "false" | "null") {
                    out.push('`');
                    out.push_str(&word);
                    out.push('`');
                } else {
                    out.push_str(&word);
                }
                continue;
            }

            out.push(c);
            i += 1;
        }

        out
    }
}

impl Default for JmespathRuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for JmespathRuleEvaluator {
    fn evaluate_value(
        &self,
        expression: &str,
        variables: &Variables,
    ) -> Result<Value, EngineError> {
        let rewritten = Self::rewrite_literals(expression);
        debug!(expression = %expression, rewritten = %rewritten, "Evaluating guard expression");

        let compiled = jmespath::compile(&rewritten).map_err(|e| {
            EngineError::Expression(format!("Failed to compile expression '{}': {}", expression, e))
        })?;

        let context = variables.as_value();
        let result = compiled.search(&context).map_err(|e| {
            EngineError::Expression(format!(
                "Failed to evaluate expression '{}': {}",
                expression, e
            ))
        })?;

        serde_json::to_value(result).map_err(|e| {
            EngineError::Expression(format!(
                "Failed to convert result of expression '{}': {}",
                expression, e
            ))
        })
    }

    fn check(&self, expression: &str) -> Result<(), EngineError> {
        let rewritten = Self::rewrite_literals(expression);
        jmespath::compile(&rewritten).map_err(|e| {
            EngineError::Expression(format!("Failed to compile expression '{}': {}", expression, e))
        })?;
        Ok(())
    }
}

/// Application service for stored business rules
pub struct RuleService {
    rules: Arc<dyn RuleRepository>,
    evaluator: Arc<dyn RuleEvaluator>,
}

impl RuleService {
    pub fn new(rules: Arc<dyn RuleRepository>, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self { rules, evaluator }
    }

    pub fn evaluator(&self) -> Arc<dyn RuleEvaluator> {
        self.evaluator.clone()
    }

    /// Create a rule, rejecting uncompilable expressions and duplicate names
    pub async fn create_rule(
        &self,
        name: String,
        description: Option<String>,
        expression: String,
    ) -> Result<BusinessRule, EngineError> {
        self.evaluator.check(&expression)?;

        if self.rules.find_by_name(&name).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "A rule named '{}' already exists",
                name
            )));
        }

        let rule = BusinessRule::new(name, description, expression);
        self.rules.save(&rule).await?;
        debug!(rule_id = %rule.id.0, rule_name = %rule.name, "Created business rule");
        Ok(rule)
    }

    /// Replace a rule's expression after a compile check
    pub async fn update_expression(
        &self,
        id: &RuleId,
        expression: String,
    ) -> Result<BusinessRule, EngineError> {
        self.evaluator.check(&expression)?;

        let mut rule = self
            .rules
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(id.0.clone()))?;
        rule.update_expression(expression);
        self.rules.save(&rule).await?;
        Ok(rule)
    }

    pub async fn get_rule(&self, id: &RuleId) -> Result<BusinessRule, EngineError> {
        self.rules
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(id.0.clone()))
    }

    pub async fn list_rules(&self) -> Result<Vec<BusinessRule>, EngineError> {
        self.rules.find_all().await
    }

    pub async fn delete_rule(&self, id: &RuleId) -> Result<(), EngineError> {
        self.get_rule(id).await?;
        self.rules.delete(id).await
    }

    /// Evaluate a stored rule against caller-supplied variables
    pub async fn test_rule(
        &self,
        id: &RuleId,
        variables: &Variables,
    ) -> Result<bool, EngineError> {
        let rule = self.get_rule(id).await?;
        self.evaluator.evaluate(&rule.expression, variables)
    }

    /// Evaluate an ad-hoc expression without storing it
    pub fn evaluate_adhoc(
        &self,
        expression: &str,
        variables: &Variables,
    ) -> Result<bool, EngineError> {
        self.evaluator.evaluate(expression, variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::memory::MemoryRuleRepository;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        Variables::from_value(value).unwrap()
    }

    fn evaluator() -> JmespathRuleEvaluator {
        JmespathRuleEvaluator::new()
    }

    #[test]
    fn test_rewrite_wraps_bare_numbers() {
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("amount > 100"),
            "amount > `100`"
        );
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("score >= 7.5 && score < 10"),
            "score >= `7.5` && score < `10`"
        );
    }

    #[test]
    fn test_rewrite_wraps_keywords() {
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("approved == true"),
            "approved == `true`"
        );
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("notes == null"),
            "notes == `null`"
        );
    }

    #[test]
    fn test_rewrite_leaves_identifiers_alone() {
        // field names that merely contain digits or keyword prefixes
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("score2 > 1"),
            "score2 > `1`"
        );
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("truthy == trueish"),
            "truthy == trueish"
        );
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("patient.age > 65"),
            "patient.age > `65`"
        );
    }

    #[test]
    fn test_rewrite_leaves_strings_alone() {
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("ward == 'icu 3'"),
            "ward == 'icu 3'"
        );
        assert_eq!(
            JmespathRuleEvaluator::rewrite_literals("amount > `100`"),
            "amount > `100`"
        );
    }

    #[test]
    fn test_numeric_comparison() {
        let e = evaluator();
        assert!(e.evaluate("amount > 100", &vars(json!({"amount": 250}))).unwrap());
        assert!(!e.evaluate("amount > 100", &vars(json!({"amount": 50}))).unwrap());
    }

    #[test]
    fn test_string_equality() {
        let e = evaluator();
        let variables = vars(json!({"severity": "high"}));
        assert!(e.evaluate("severity == 'high'", &variables).unwrap());
        assert!(!e.evaluate("severity == 'low'", &variables).unwrap());
    }

    #[test]
    fn test_boolean_combinators() {
        let e = evaluator();
        let variables = vars(json!({"age": 70, "admitted": true}));
        assert!(e.evaluate("age > 65 && admitted == true", &variables).unwrap());
        assert!(e.evaluate("age > 80 || admitted", &variables).unwrap());
        assert!(!e.evaluate("age > 80 && admitted", &variables).unwrap());
    }

    #[test]
    fn test_missing_variable_is_falsy() {
        let e = evaluator();
        assert!(!e.evaluate("missing", &vars(json!({}))).unwrap());
        assert!(!e.evaluate("missing > 10", &vars(json!({}))).unwrap());
    }

    #[test]
    fn test_nested_access() {
        let e = evaluator();
        let variables = vars(json!({"patient": {"age": 70, "flags": ["diabetic"]}}));
        assert!(e.evaluate("patient.age > 65", &variables).unwrap());
        assert!(e
            .evaluate("contains(patient.flags, 'diabetic')", &variables)
            .unwrap());
    }

    #[test]
    fn test_determinism() {
        let e = evaluator();
        let variables = vars(json!({"amount": 250, "severity": "high"}));
        let expr = "amount > 100 && severity == 'high'";
        let first = e.evaluate(expr, &variables).unwrap();
        for _ in 0..10 {
            assert_eq!(e.evaluate(expr, &variables).unwrap(), first);
        }
    }

    #[test]
    fn test_bad_expression_is_an_expression_error() {
        let e = evaluator();
        let err = e.evaluate("amount >", &vars(json!({}))).unwrap_err();
        assert!(matches!(err, EngineError::Expression(_)));
        assert!(e.check("amount >").is_err());
        assert!(e.check("amount > 100").is_ok());
    }

    fn service() -> RuleService {
        RuleService::new(
            Arc::new(MemoryRuleRepository::new()),
            Arc::new(JmespathRuleEvaluator::new()),
        )
    }

    #[tokio::test]
    async fn test_create_and_test_rule() {
        let service = service();
        let rule = service
            .create_rule(
                "high-risk".to_string(),
                Some("Risk score above threshold".to_string()),
                "riskScore > 7".to_string(),
            )
            .await
            .unwrap();

        assert!(service
            .test_rule(&rule.id, &vars(json!({"riskScore": 9})))
            .await
            .unwrap());
        assert!(!service
            .test_rule(&rule.id, &vars(json!({"riskScore": 3})))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_rule_rejects_bad_expression() {
        let service = service();
        let err = service
            .create_rule("broken".to_string(), None, "riskScore >".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Expression(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let service = service();
        service
            .create_rule("dup".to_string(), None, "a > 1".to_string())
            .await
            .unwrap();
        let err = service
            .create_rule("dup".to_string(), None, "b > 2".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_expression() {
        let service = service();
        let rule = service
            .create_rule("thresh".to_string(), None, "a > 1".to_string())
            .await
            .unwrap();

        let updated = service
            .update_expression(&rule.id, "a > 100".to_string())
            .await
            .unwrap();
        assert_eq!(updated.expression, "a > 100");

        let err = service
            .update_expression(&rule.id, "a >".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Expression(_)));
    }

    #[tokio::test]
    async fn test_delete_unknown_rule() {
        let service = service();
        let err = service
            .delete_rule(&RuleId("missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleNotFound(_)));
    }
}
