// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Scenario step failure resolution
//!
//! Decides whether the step producing a cell's metric failed, and turns the
//! step's error payload into a readable message.

use evalgrid_core::text::identifier_matches;
use evalgrid_core::{ScenarioStep, ScenarioStepsResult, StepBucket};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status and message of a failed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepFailure {
    fn from_step(step: &ScenarioStep) -> Self {
        Self {
            status: step.status.clone(),
            error: resolve_error_message(&step.error),
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn text_field<'a>(error: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| error.get(*key).and_then(Value::as_str))
        .filter(|text| !text.is_empty())
}

fn code_field(error: &Value) -> Option<String> {
    match error.get("code")? {
        Value::String(code) if !code.is_empty() => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// Turn an error payload into a message.
///
/// - strings pass through
/// - exception-like objects (`name` + `message`, no `code`) yield their
///   stack, else their message
/// - structured errors yield `(code) message`, then an optional
///   "More information" link, then an optional stack trace, one per line
/// - anything else is rendered as JSON
///
/// Falsy payloads (`null`, `false`, `""`, `0`) yield `None`.
pub fn resolve_error_message(error: &Value) -> Option<String> {
    if is_falsy(error) {
        return None;
    }
    if let Value::String(text) = error {
        return Some(text.clone());
    }
    if !error.is_object() {
        return Some(error.to_string());
    }

    let message = text_field(error, &["message", "detail"]);
    let stack = text_field(error, &["stacktrace", "stack"]);
    let code = code_field(error);

    if code.is_none() && error.get("name").is_some() {
        if let Some(message) = message {
            return Some(stack.unwrap_or(message).to_string());
        }
    }

    if message.is_none() && code.is_none() {
        return Some(serde_json::to_string(error).unwrap_or_else(|_| error.to_string()));
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push(match (code, message) {
        (Some(code), Some(message)) => format!("({}) {}", code, message),
        (Some(code), None) => format!("({})", code),
        (None, Some(message)) => message.to_string(),
        (None, None) => String::new(),
    });
    let link = text_field(error, &["link", "url", "documentation_url", "type"])
        .filter(|link| link.starts_with("http://") || link.starts_with("https://"));
    if let Some(link) = link {
        lines.push(format!("More information: {}", link));
    }
    if let Some(stack) = stack {
        lines.push(stack.to_string());
    }
    Some(lines.join("\n"))
}

/// Find the failed step that produced a metric.
///
/// Among failed steps, in order of preference:
/// 1. the step whose key equals `step_key`
/// 2. the first step matching a slug candidate (candidates in order) by
///    step key, evaluator slug, evaluator key or application slug
/// 3. any failed invocation step of `scenario_id`
pub fn resolve_step_failure(
    result: &ScenarioStepsResult,
    scenario_id: &str,
    slug_candidates: &[String],
    step_key: Option<&str>,
) -> Option<StepFailure> {
    let failing: Vec<(StepBucket, &ScenarioStep)> = result
        .all_steps()
        .filter(|(_, step)| step.is_failed())
        .collect();
    if failing.is_empty() {
        return None;
    }

    if let Some(key) = step_key.filter(|key| !key.is_empty()) {
        if let Some((_, step)) = failing.iter().find(|(_, step)| step.step_key == key) {
            return Some(StepFailure::from_step(step));
        }
    }

    for candidate in slug_candidates.iter().filter(|c| !c.is_empty()) {
        let matched = failing.iter().find(|(_, step)| {
            step.identifiers()
                .iter()
                .any(|id| identifier_matches(id, candidate))
        });
        if let Some((_, step)) = matched {
            return Some(StepFailure::from_step(step));
        }
    }

    failing
        .iter()
        .find(|(bucket, step)| *bucket == StepBucket::Invocation && step.belongs_to(scenario_id))
        .map(|(_, step)| StepFailure::from_step(step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slugs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_error_message_passthrough_and_falsy() {
        assert_eq!(resolve_error_message(&json!("timeout")).as_deref(), Some("timeout"));
        assert_eq!(resolve_error_message(&Value::Null), None);
        assert_eq!(resolve_error_message(&json!("")), None);
        assert_eq!(resolve_error_message(&json!(false)), None);
        assert_eq!(resolve_error_message(&json!(0)), None);
        assert_eq!(resolve_error_message(&json!(42)).as_deref(), Some("42"));
    }

    #[test]
    fn test_structured_error_message() {
        let message = resolve_error_message(&json!({
            "code": 500,
            "message": "boom",
            "type": "https://docs.example.com/errors/500",
            "stacktrace": "Traceback: line 1"
        }))
        .unwrap();
        assert_eq!(
            message,
            "(500) boom\nMore information: https://docs.example.com/errors/500\nTraceback: line 1"
        );
    }

    #[test]
    fn test_structured_error_without_code() {
        let message = resolve_error_message(&json!({ "message": "bad input", "type": "ValueError" }));
        assert_eq!(message.as_deref(), Some("bad input"));
    }

    #[test]
    fn test_exception_like_error() {
        let with_stack = json!({ "name": "TypeError", "message": "x is undefined", "stack": "at f()" });
        assert_eq!(resolve_error_message(&with_stack).as_deref(), Some("at f()"));

        let without_stack = json!({ "name": "TypeError", "message": "x is undefined" });
        assert_eq!(
            resolve_error_message(&without_stack).as_deref(),
            Some("x is undefined")
        );
    }

    #[test]
    fn test_unrecognized_object_is_json() {
        let message = resolve_error_message(&json!({ "reason": "quota" })).unwrap();
        assert_eq!(message, r#"{"reason":"quota"}"#);
    }

    #[test]
    fn test_no_failing_steps() {
        let result = ScenarioStepsResult {
            annotation_steps: vec![ScenarioStep::new("exact", "success")],
            ..Default::default()
        };
        assert!(resolve_step_failure(&result, "sc", &slugs(&["exact"]), None).is_none());
    }

    #[test]
    fn test_explicit_step_key_wins() {
        let result = ScenarioStepsResult {
            annotation_steps: vec![
                ScenarioStep::new("exact", "failed").with_error(json!("slug match")),
                ScenarioStep::new("s3", "error").with_error(json!("key match")),
            ],
            ..Default::default()
        };
        let failure = resolve_step_failure(&result, "sc", &slugs(&["exact"]), Some("s3")).unwrap();
        assert_eq!(failure.error.as_deref(), Some("key match"));
        assert_eq!(failure.status, "error");
    }

    #[test]
    fn test_slug_candidates_in_order() {
        let result = ScenarioStepsResult {
            annotation_steps: vec![
                ScenarioStep::new("a", "FAILED").with_evaluator("judge"),
                ScenarioStep::new("evaluatorA.isCorrect", "failure"),
            ],
            ..Default::default()
        };
        let failure =
            resolve_step_failure(&result, "sc", &slugs(&["isCorrect", "judge"]), None).unwrap();
        assert_eq!(failure.status, "failure");

        let failure = resolve_step_failure(&result, "sc", &slugs(&["JUDGE"]), None).unwrap();
        assert_eq!(failure.status, "FAILED");
    }

    #[test]
    fn test_invocation_fallback_respects_scenario() {
        let result = ScenarioStepsResult {
            invocation_steps: vec![
                ScenarioStep::new("app", "error")
                    .with_scenario("other")
                    .with_error(json!("wrong scenario")),
                ScenarioStep::new("app", "error")
                    .with_scenario("sc")
                    .with_error(json!("invocation failed")),
            ],
            ..Default::default()
        };
        let failure = resolve_step_failure(&result, "sc", &slugs(&["exact"]), None).unwrap();
        assert_eq!(failure.error.as_deref(), Some("invocation failed"));

        assert!(resolve_step_failure(&result, "missing", &slugs(&["exact"]), None).is_none());
    }

    #[test]
    fn test_failed_annotation_for_other_evaluator_is_ignored() {
        let result = ScenarioStepsResult {
            annotation_steps: vec![ScenarioStep::new("judge", "error")],
            ..Default::default()
        };
        assert!(resolve_step_failure(&result, "sc", &slugs(&["exact"]), None).is_none());
    }
}
