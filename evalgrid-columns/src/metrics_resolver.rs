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

//! Evaluator metrics resolution
//!
//! Turns an evaluator payload, whatever its shape, into a map of metric
//! name to [`MetricDefinition`].

use evalgrid_core::text::title_case;
use evalgrid_core::{EvaluatorDefinition, MetricDefinition, MetricsShape, SchemaSource};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metric name -> definition
pub type MetricsMap = BTreeMap<String, MetricDefinition>;

/// Fallback type when a metric declares none
const DEFAULT_METRIC_TYPE: &str = "string";

/// Extract metric definitions from `data.schemas.outputs.properties`.
///
/// This is the current evaluator payload layout; older layouts go through
/// [`resolve_evaluator_metrics_map`].
pub fn extract_metrics(evaluator: &EvaluatorDefinition) -> Vec<MetricDefinition> {
    SchemaSource::DataSchemasOutputs
        .probe(&evaluator.raw)
        .map(|properties| {
            properties
                .iter()
                .map(|(key, schema)| schema_metric(key, schema))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve the metrics map of an evaluator entry.
///
/// Tries a flat `metrics` map, then schema `properties` at the known nesting
/// paths, then a metric list. Returns the first non-empty result.
pub fn resolve_evaluator_metrics_map(entry: &Value) -> Option<MetricsMap> {
    let metrics: MetricsMap = match MetricsShape::detect(entry)? {
        MetricsShape::FlatMetrics(map) => map
            .iter()
            .map(|(name, meta)| (name.clone(), flat_metric(name, meta)))
            .collect(),
        MetricsShape::SchemaProperties { properties, .. } => properties
            .iter()
            .map(|(name, schema)| (name.clone(), schema_metric(name, schema)))
            .collect(),
        MetricsShape::MetricList(items) => items
            .iter()
            .filter_map(list_metric)
            .map(|metric| (metric.name.clone(), metric))
            .collect(),
    };
    (!metrics.is_empty()).then_some(metrics)
}

/// Metrics map for a parsed evaluator definition
pub fn resolve_definition_metrics(evaluator: &EvaluatorDefinition) -> Option<MetricsMap> {
    resolve_evaluator_metrics_map(&evaluator.raw)
}

fn schema_metric(name: &str, schema: &Value) -> MetricDefinition {
    MetricDefinition {
        name: name.to_string(),
        path: name.to_string(),
        metric_type: schema_type(schema).unwrap_or(DEFAULT_METRIC_TYPE).to_string(),
        display_label: str_at(schema, "title")
            .map(str::to_string)
            .unwrap_or_else(|| title_case(name)),
        description: str_at(schema, "description").map(str::to_string),
        meta: schema.clone(),
    }
}

fn flat_metric(name: &str, meta: &Value) -> MetricDefinition {
    // `metrics: {score: "number"}` declares only the type
    if let Some(metric_type) = meta.as_str() {
        return MetricDefinition {
            name: name.to_string(),
            path: name.to_string(),
            metric_type: metric_type.to_string(),
            display_label: title_case(name),
            description: None,
            meta: Value::Null,
        };
    }
    MetricDefinition {
        name: name.to_string(),
        path: str_at(meta, "path").unwrap_or(name).to_string(),
        metric_type: str_at(meta, "metricType")
            .or_else(|| schema_type(meta))
            .unwrap_or(DEFAULT_METRIC_TYPE)
            .to_string(),
        display_label: first_str(meta, &["label", "displayLabel", "title"])
            .map(str::to_string)
            .unwrap_or_else(|| title_case(name)),
        description: str_at(meta, "description").map(str::to_string),
        meta: meta.clone(),
    }
}

fn list_metric(item: &Value) -> Option<MetricDefinition> {
    let name = first_str(item, &["name", "key", "metricKey"])?;
    Some(flat_metric(name, item))
}

/// Declared JSON-schema type; the first non-null entry of a type list
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null"),
        _ => None,
    }
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| str_at(value, key))
}

/// Find the metric a column path refers to, by name or by path
pub fn match_metric<'a>(metrics: &'a MetricsMap, metric_key: &str) -> Option<&'a MetricDefinition> {
    metrics.get(metric_key).or_else(|| {
        metrics
            .values()
            .find(|metric| metric.name == metric_key || metric.path == metric_key)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exact_match() -> EvaluatorDefinition {
        EvaluatorDefinition::new("e1", "exact_match", "Exact Match").with_raw(json!({
            "data": {
                "schemas": {
                    "outputs": {
                        "properties": {
                            "isCorrect": { "type": "boolean", "description": "Output equals reference" },
                            "score": { "type": ["number", "null"], "title": "Match Score" },
                            "notes": {}
                        }
                    }
                }
            }
        }))
    }

    #[test]
    fn test_extract_metrics_from_schema() {
        let metrics = extract_metrics(&exact_match());
        assert_eq!(metrics.len(), 3);

        let correct = metrics.iter().find(|m| m.name == "isCorrect").unwrap();
        assert_eq!(correct.metric_type, "boolean");
        assert_eq!(correct.display_label, "Is Correct");
        assert_eq!(correct.description.as_deref(), Some("Output equals reference"));

        let score = metrics.iter().find(|m| m.name == "score").unwrap();
        assert_eq!(score.metric_type, "number");
        assert_eq!(score.display_label, "Match Score");

        let notes = metrics.iter().find(|m| m.name == "notes").unwrap();
        assert_eq!(notes.metric_type, "string");
    }

    #[test]
    fn test_extract_metrics_ignores_other_layouts() {
        let evaluator = EvaluatorDefinition::new("e2", "legacy", "Legacy")
            .with_raw(json!({ "output_schema": { "properties": { "x": {} } } }));
        assert!(extract_metrics(&evaluator).is_empty());
        assert!(resolve_definition_metrics(&evaluator).is_some());
    }

    #[test]
    fn test_resolve_flat_metrics() {
        let entry = json!({
            "metrics": {
                "score": "number",
                "verdict": { "type": "string", "label": "Verdict", "path": "outputs.verdict" }
            }
        });
        let metrics = resolve_evaluator_metrics_map(&entry).unwrap();
        assert_eq!(metrics["score"].metric_type, "number");
        assert_eq!(metrics["score"].display_label, "Score");
        assert_eq!(metrics["verdict"].display_label, "Verdict");
        assert_eq!(metrics["verdict"].path, "outputs.verdict");
    }

    #[test]
    fn test_resolve_service_format_schema() {
        let entry = json!({
            "data": {
                "service": {
                    "format": {
                        "properties": {
                            "outputs": { "properties": { "success": { "type": "boolean" } } }
                        }
                    }
                }
            }
        });
        let metrics = resolve_evaluator_metrics_map(&entry).unwrap();
        assert_eq!(metrics["success"].metric_type, "boolean");
    }

    #[test]
    fn test_resolve_metric_list() {
        let entry = json!({
            "data": {
                "metrics": [
                    { "key": "latency", "type": "number" },
                    { "type": "number" }
                ]
            }
        });
        let metrics = resolve_evaluator_metrics_map(&entry).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["latency"].metric_type, "number");
    }

    #[test]
    fn test_resolve_nothing() {
        assert!(resolve_evaluator_metrics_map(&json!({ "slug": "bare" })).is_none());
        assert!(resolve_evaluator_metrics_map(&Value::Null).is_none());
    }

    #[test]
    fn test_match_metric_by_name_or_path() {
        let metrics = resolve_evaluator_metrics_map(&json!({
            "metrics": { "verdict": { "path": "outputs.verdict" } }
        }))
        .unwrap();
        assert_eq!(match_metric(&metrics, "verdict").unwrap().name, "verdict");
        assert_eq!(match_metric(&metrics, "outputs.verdict").unwrap().name, "verdict");
        assert!(match_metric(&metrics, "missing").is_none());
    }
}
