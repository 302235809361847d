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

//! Scenario steps
//!
//! A scenario is one row of an evaluation run. Its steps are fetched lazily
//! and arrive split into three buckets: generic `steps`, `annotationSteps`
//! and `invocationSteps`.

use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Step statuses that mark a failed execution (compared case-insensitively)
pub const FAILURE_STATUSES: &[&str] = &[
    "failure",
    "failed",
    "error",
    "errors",
    "aggregation_failed",
    "finished_with_errors",
];

pub fn is_failure_status(status: &str) -> bool {
    FAILURE_STATUSES
        .iter()
        .any(|failure| failure.eq_ignore_ascii_case(status))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorStepRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStepRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<EvaluatorStepRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationStepRef>,
}

/// One execution unit of a scenario
///
/// Deserialization goes through [`ScenarioStep::from_value`], so null or
/// oddly typed fields fall back to their defaults instead of failing the
/// whole step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ScenarioStep {
    #[serde(rename = "stepKey")]
    pub step_key: String,

    #[serde(rename = "scenarioId")]
    pub scenario_id: Option<String>,

    pub status: String,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub error: Value,

    pub references: StepReferences,

    /// Annotation payload; outputs live under `annotation.data.outputs`
    #[serde(skip_serializing_if = "Value::is_null")]
    pub annotation: Value,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub outputs: Value,
}

/// First field among `names` holding a non-empty string
fn first_str(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| value.get(*name).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn field(value: &Value, name: &str) -> Value {
    value.get(name).cloned().unwrap_or(Value::Null)
}

impl StepReferences {
    fn from_value(value: &Value) -> Self {
        let evaluator = value
            .get("evaluator")
            .filter(|e| e.is_object())
            .map(|e| EvaluatorStepRef {
                slug: first_str(e, &["slug"]),
                key: first_str(e, &["key"]),
                id: first_str(e, &["id"]),
            });
        let application = value
            .get("application")
            .filter(|a| a.is_object())
            .map(|a| ApplicationStepRef {
                slug: first_str(a, &["slug"]),
            });
        Self {
            evaluator,
            application,
        }
    }
}

impl TryFrom<Value> for ScenarioStep {
    type Error = GridError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
            .ok_or_else(|| GridError::InvalidPayload("scenario step is not an object".into()))
    }
}

impl ScenarioStep {
    /// Read a step from a raw payload; `None` when it is not an object.
    ///
    /// The step key is the first non-empty string among `stepKey`,
    /// `step_key` and `key`. A null or missing `references` means none.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Some(Self {
            step_key: first_str(value, &["stepKey", "step_key", "key"]).unwrap_or_default(),
            scenario_id: first_str(value, &["scenarioId", "scenario_id"]),
            status: first_str(value, &["status"]).unwrap_or_default(),
            error: field(value, "error"),
            references: value
                .get("references")
                .map(StepReferences::from_value)
                .unwrap_or_default(),
            annotation: field(value, "annotation"),
            data: field(value, "data"),
            outputs: field(value, "outputs"),
        })
    }

    pub fn new(step_key: &str, status: &str) -> Self {
        Self {
            step_key: step_key.to_string(),
            status: status.to_string(),
            ..Self::default()
        }
    }

    pub fn with_scenario(mut self, scenario_id: &str) -> Self {
        self.scenario_id = Some(scenario_id.to_string());
        self
    }

    pub fn with_error(mut self, error: Value) -> Self {
        self.error = error;
        self
    }

    pub fn with_evaluator(mut self, slug: &str) -> Self {
        self.references.evaluator = Some(EvaluatorStepRef {
            slug: Some(slug.to_string()),
            ..EvaluatorStepRef::default()
        });
        self
    }

    pub fn with_annotation_outputs(mut self, outputs: Value) -> Self {
        self.annotation = serde_json::json!({ "data": { "outputs": outputs } });
        self
    }

    pub fn is_failed(&self) -> bool {
        is_failure_status(&self.status)
    }

    /// Identifiers used to match the step against an evaluator slug:
    /// step key, evaluator slug, evaluator key, application slug
    pub fn identifiers(&self) -> Vec<&str> {
        let evaluator = self.references.evaluator.as_ref();
        [
            Some(self.step_key.as_str()),
            evaluator.and_then(|e| e.slug.as_deref()),
            evaluator.and_then(|e| e.key.as_deref()),
            self.references
                .application
                .as_ref()
                .and_then(|a| a.slug.as_deref()),
        ]
        .into_iter()
        .flatten()
        .filter(|id| !id.is_empty())
        .collect()
    }

    /// Output objects in lookup order: `annotation.data.outputs`,
    /// `data.outputs`, `outputs`
    pub fn output_objects(&self) -> Vec<&Value> {
        [
            self.annotation.get("data").and_then(|d| d.get("outputs")),
            self.data.get("outputs"),
            Some(&self.outputs),
        ]
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
        .collect()
    }

    /// Whether the step belongs to `scenario_id`; steps without a scenario
    /// id are assumed to belong to the scenario they were fetched for
    pub fn belongs_to(&self, scenario_id: &str) -> bool {
        self.scenario_id
            .as_deref()
            .map_or(true, |own| own == scenario_id)
    }
}

/// Which bucket of the fetch result a step came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepBucket {
    General,
    Annotation,
    Invocation,
}

/// Per-scenario step fetch result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStepsResult {
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,

    #[serde(default, rename = "annotationSteps", alias = "annotation_steps")]
    pub annotation_steps: Vec<ScenarioStep>,

    #[serde(default, rename = "invocationSteps", alias = "invocation_steps")]
    pub invocation_steps: Vec<ScenarioStep>,
}

impl ScenarioStepsResult {
    /// Read a fetch result, dropping entries that are not step objects
    pub fn from_value(value: &Value) -> Self {
        let bucket = |names: &[&str]| -> Vec<ScenarioStep> {
            names
                .iter()
                .find_map(|name| value.get(*name).and_then(Value::as_array))
                .map(|items| items.iter().filter_map(ScenarioStep::from_value).collect())
                .unwrap_or_default()
        };
        Self {
            steps: bucket(&["steps"]),
            annotation_steps: bucket(&["annotationSteps", "annotation_steps"]),
            invocation_steps: bucket(&["invocationSteps", "invocation_steps"]),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(GridError::InvalidPayload(
                "scenario steps response is not an object".into(),
            ));
        }
        Ok(Self::from_value(&value))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.annotation_steps.is_empty() && self.invocation_steps.is_empty()
    }

    /// Every step with its bucket, generic steps first
    pub fn all_steps(&self) -> impl Iterator<Item = (StepBucket, &ScenarioStep)> {
        self.steps
            .iter()
            .map(|s| (StepBucket::General, s))
            .chain(self.annotation_steps.iter().map(|s| (StepBucket::Annotation, s)))
            .chain(self.invocation_steps.iter().map(|s| (StepBucket::Invocation, s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_statuses_case_insensitive() {
        assert!(is_failure_status("ERROR"));
        assert!(is_failure_status("Finished_With_Errors"));
        assert!(!is_failure_status("success"));
        assert!(!is_failure_status(""));
    }

    #[test]
    fn test_steps_result_from_value() {
        let body = json!({
            "steps": [{ "stepKey": "input", "status": "success" }],
            "annotation_steps": [
                {
                    "step_key": "exact",
                    "scenario_id": "sc-1",
                    "status": "error",
                    "error": { "code": 500, "message": "boom" },
                    "references": { "evaluator": { "slug": "exact_match", "key": "exact" } }
                },
                "not a step"
            ],
            "invocationSteps": "not a list"
        });

        let result = ScenarioStepsResult::from_value(&body);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.annotation_steps.len(), 1);
        assert!(result.invocation_steps.is_empty());

        let step = &result.annotation_steps[0];
        assert!(step.is_failed());
        assert_eq!(step.scenario_id.as_deref(), Some("sc-1"));
        assert_eq!(step.identifiers(), vec!["exact", "exact_match", "exact"]);
        assert_eq!(result.all_steps().count(), 2);
    }

    #[test]
    fn test_step_with_null_references() {
        let body = json!({
            "annotationSteps": [{
                "stepKey": "exact",
                "status": "success",
                "references": null,
                "annotation": { "data": { "outputs": { "score": 0.9 } } }
            }]
        });
        let result = ScenarioStepsResult::from_value(&body);
        assert_eq!(result.annotation_steps.len(), 1);

        let step = &result.annotation_steps[0];
        assert_eq!(step.references, StepReferences::default());
        assert_eq!(step.identifiers(), vec!["exact"]);
        assert_eq!(step.output_objects(), vec![&json!({ "score": 0.9 })]);
    }

    #[test]
    fn test_step_with_several_key_fields() {
        let body = json!({
            "annotation_steps": [{
                "step_key": "exact",
                "key": "other",
                "status": "error",
                "error": { "code": 500, "message": "boom" }
            }]
        });
        let result = ScenarioStepsResult::from_value(&body);
        assert_eq!(result.annotation_steps.len(), 1);
        assert_eq!(result.annotation_steps[0].step_key, "exact");
        assert!(result.annotation_steps[0].is_failed());
    }

    #[test]
    fn test_step_tolerates_null_fields() {
        let step: ScenarioStep = serde_json::from_value(json!({
            "stepKey": "s",
            "status": null,
            "scenarioId": null,
            "references": { "evaluator": null, "application": { "slug": "app" } }
        }))
        .unwrap();
        assert_eq!(step.status, "");
        assert!(step.scenario_id.is_none());
        assert!(step.references.evaluator.is_none());
        assert_eq!(step.identifiers(), vec!["s", "app"]);
        assert!(serde_json::from_value::<ScenarioStep>(json!("s")).is_err());
    }

    #[test]
    fn test_output_objects_order() {
        let step: ScenarioStep = serde_json::from_value(json!({
            "stepKey": "s",
            "outputs": { "c": 3 },
            "data": { "outputs": { "b": 2 } },
            "annotation": { "data": { "outputs": { "a": 1 } } }
        }))
        .unwrap();
        let objects = step.output_objects();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0], &json!({ "a": 1 }));
        assert_eq!(objects[2], &json!({ "c": 3 }));
    }

    #[test]
    fn test_belongs_to() {
        assert!(ScenarioStep::new("s", "failed").belongs_to("sc-1"));
        assert!(!ScenarioStep::new("s", "failed")
            .with_scenario("sc-2")
            .belongs_to("sc-1"));
    }
}
